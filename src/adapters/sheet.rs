use crate::domain::ports::{Storage, TabularStore, ERROR_TEXT_PREFIX};
use crate::utils::error::{EnrichError, Result};
use std::collections::BTreeSet;

/// In-memory grid backed by a CSV file. Row 1 is the header row.
///
/// CSV has no cell styling, so error marks are not written out. Loading restores them
/// from cells whose text starts with `ERROR_TEXT_PREFIX`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    rows: Vec<Vec<String>>,
    error_cells: BTreeSet<(usize, usize)>,
}

impl Sheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows<R, C>(rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(Into::into).collect())
                .collect(),
            error_cells: BTreeSet::new(),
        }
    }

    pub fn from_csv(data: &[u8]) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(data);

        let mut rows: Vec<Vec<String>> = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        let error_cells = rows
            .iter()
            .enumerate()
            .flat_map(|(r, cells)| {
                cells
                    .iter()
                    .enumerate()
                    .filter(|(_, cell)| cell.starts_with(ERROR_TEXT_PREFIX))
                    .map(move |(c, _)| (r + 1, c + 1))
            })
            .collect();

        Ok(Self { rows, error_cells })
    }

    pub fn to_csv(&self) -> Result<Vec<u8>> {
        let width = self.last_column();
        let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());

        for row in self.rows.iter().take(self.last_row()) {
            let mut padded = row.clone();
            padded.resize(width, String::new());
            writer.write_record(&padded)?;
        }

        writer
            .into_inner()
            .map_err(|e| EnrichError::IoError(e.into_error()))
    }

    pub async fn load<S: Storage>(storage: &S, path: &str) -> Result<Self> {
        let data = storage.read_file(path).await?;
        let sheet = Self::from_csv(&data)?;
        tracing::debug!(
            "📄 Loaded sheet '{}' ({} rows x {} columns)",
            path,
            sheet.last_row(),
            sheet.last_column()
        );
        Ok(sheet)
    }

    pub async fn save<S: Storage>(&self, storage: &S, path: &str) -> Result<()> {
        let data = self.to_csv()?;
        storage.write_file(path, &data).await?;
        tracing::debug!("💾 Saved sheet '{}' ({} bytes)", path, data.len());
        Ok(())
    }

    pub fn is_error(&self, row: usize, col: usize) -> bool {
        self.error_cells.contains(&(row, col))
    }
}

impl TabularStore for Sheet {
    fn get_cell(&self, row: usize, col: usize) -> String {
        if row == 0 || col == 0 {
            return String::new();
        }
        self.rows
            .get(row - 1)
            .and_then(|cells| cells.get(col - 1))
            .cloned()
            .unwrap_or_default()
    }

    fn set_cell(&mut self, row: usize, col: usize, value: &str) {
        if row == 0 || col == 0 {
            tracing::warn!("Ignoring write to invalid cell ({}, {})", row, col);
            return;
        }
        if self.rows.len() < row {
            self.rows.resize(row, Vec::new());
        }
        let cells = &mut self.rows[row - 1];
        if cells.len() < col {
            cells.resize(col, String::new());
        }
        cells[col - 1] = value.to_string();
        self.error_cells.remove(&(row, col));
    }

    fn get_row(&self, row: usize) -> Vec<String> {
        if row == 0 {
            return Vec::new();
        }
        self.rows.get(row - 1).cloned().unwrap_or_default()
    }

    fn last_row(&self) -> usize {
        self.rows
            .iter()
            .rposition(|cells| cells.iter().any(|cell| !cell.trim().is_empty()))
            .map(|index| index + 1)
            .unwrap_or(0)
    }

    fn last_column(&self) -> usize {
        self.rows
            .iter()
            .filter_map(|cells| cells.iter().rposition(|cell| !cell.trim().is_empty()))
            .map(|index| index + 1)
            .max()
            .unwrap_or(0)
    }

    fn mark_error(&mut self, row: usize, col: usize) {
        self.error_cells.insert((row, col));
    }
}
