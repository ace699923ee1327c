//! Logical field → column position resolution.
//!
//! Columns are 1-based like in a spreadsheet. A map is resolved once per run,
//! either from a static letter table (`company_name = "B"`) or by scanning the
//! header row for configured header names.

use crate::domain::model::Field;
use crate::utils::error::{EnrichError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnStrategy {
    #[default]
    Static,
    Header,
}

/// `"A"` → 1, `"Z"` → 26, `"AA"` → 27. Case-insensitive; `None` for anything
/// that is not a plain run of ASCII letters.
pub fn column_to_number(letters: &str) -> Option<usize> {
    let letters = letters.trim();
    if letters.is_empty() {
        return None;
    }

    letters.chars().try_fold(0usize, |acc, c| {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        let value = (c.to_ascii_uppercase() as u8 - b'A' + 1) as usize;
        acc.checked_mul(26)?.checked_add(value)
    })
}

pub fn number_to_column(mut number: usize) -> String {
    let mut letters = Vec::new();
    while number > 0 {
        let rem = (number - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        number = (number - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Parses an A1-style reference such as `"K1"` into `(row, col)`.
pub fn parse_cell_ref(reference: &str) -> Option<(usize, usize)> {
    let reference = reference.trim();
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    let col = column_to_number(letters)?;
    let row: usize = digits.parse().ok()?;
    (row > 0).then_some((row, col))
}

/// Finds `name` in the header row: exact (case-insensitive) match first,
/// then the first header that contains it.
pub fn find_header(header_row: &[String], name: &str) -> Option<usize> {
    let wanted = name.trim().to_lowercase();
    if wanted.is_empty() {
        return None;
    }

    header_row
        .iter()
        .position(|header| header.trim().to_lowercase() == wanted)
        .or_else(|| {
            header_row
                .iter()
                .position(|header| header.to_lowercase().contains(&wanted))
        })
        .map(|index| index + 1)
}

/// 檢查標題列是否包含所有必要欄位（子字串比對，忽略大小寫）
pub fn check_required_headers(header_row: &[String], required: &[String]) -> Result<()> {
    let missing: Vec<&str> = required
        .iter()
        .filter(|name| find_header(header_row, name).is_none())
        .map(String::as_str)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(EnrichError::StructuralValidation {
            message: format!("missing columns: {}", missing.join(", ")),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    positions: BTreeMap<Field, usize>,
}

impl ColumnMap {
    pub fn from_letters(table: &BTreeMap<Field, String>) -> Self {
        let mut positions = BTreeMap::new();
        for (field, letters) in table {
            match column_to_number(letters) {
                Some(col) => {
                    positions.insert(*field, col);
                }
                None => tracing::warn!(
                    "⚠️ Column letter '{}' for field '{}' is not valid, field unavailable",
                    letters,
                    field
                ),
            }
        }
        Self { positions }
    }

    pub fn from_headers(header_row: &[String], names: &BTreeMap<Field, String>) -> Self {
        let mut positions = BTreeMap::new();
        for (field, name) in names {
            match find_header(header_row, name) {
                Some(col) => {
                    tracing::debug!("Column '{}' resolved to {} for '{}'", name, col, field);
                    positions.insert(*field, col);
                }
                None => tracing::warn!(
                    "⚠️ Header '{}' for field '{}' not found in row 1, field unavailable",
                    name,
                    field
                ),
            }
        }
        Self { positions }
    }

    pub fn resolve(&self, field: Field) -> Option<usize> {
        self.positions.get(&field).copied()
    }

    /// Fails with a structural error naming every essential field that did not resolve.
    pub fn require(&self, fields: &[Field]) -> Result<()> {
        let missing: Vec<String> = fields
            .iter()
            .filter(|field| self.resolve(**field).is_none())
            .map(|field| field.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(EnrichError::StructuralValidation {
                message: format!("missing columns for fields: {}", missing.join(", ")),
            })
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, usize)> + '_ {
        self.positions.iter().map(|(field, col)| (*field, *col))
    }
}
