use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Placeholder written for text facts the model did not return.
pub const TEXT_SENTINEL: &str = "N/A";

/// Closed set of logical columns the pipeline knows how to read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    // company lookup
    CompanyName,
    Cui,
    Website,
    Revenue,
    Profit,
    Employees,

    // candidate evaluation
    FullName,
    LinkedinJobTitle,
    LinkedinCompany,
    LinkedinLocation,
    LinkedinSummary,
    LinkedinSkills,
    Criterion1Score,
    Criterion2Score,
    Criterion3Score,
    OverallScore,
    Recommendations,

    // shared
    Conclusion,
    Status,
}

impl Field {
    pub const ALL: [Field; 19] = [
        Field::CompanyName,
        Field::Cui,
        Field::Website,
        Field::Revenue,
        Field::Profit,
        Field::Employees,
        Field::FullName,
        Field::LinkedinJobTitle,
        Field::LinkedinCompany,
        Field::LinkedinLocation,
        Field::LinkedinSummary,
        Field::LinkedinSkills,
        Field::Criterion1Score,
        Field::Criterion2Score,
        Field::Criterion3Score,
        Field::OverallScore,
        Field::Recommendations,
        Field::Conclusion,
        Field::Status,
    ];

    /// Config key, e.g. `company_name`.
    pub fn key(self) -> &'static str {
        match self {
            Field::CompanyName => "company_name",
            Field::Cui => "cui",
            Field::Website => "website",
            Field::Revenue => "revenue",
            Field::Profit => "profit",
            Field::Employees => "employees",
            Field::FullName => "full_name",
            Field::LinkedinJobTitle => "linkedin_job_title",
            Field::LinkedinCompany => "linkedin_company",
            Field::LinkedinLocation => "linkedin_location",
            Field::LinkedinSummary => "linkedin_summary",
            Field::LinkedinSkills => "linkedin_skills",
            Field::Criterion1Score => "criterion1_score",
            Field::Criterion2Score => "criterion2_score",
            Field::Criterion3Score => "criterion3_score",
            Field::OverallScore => "overall_score",
            Field::Recommendations => "recommendations",
            Field::Conclusion => "conclusion",
            Field::Status => "status",
        }
    }

    pub fn from_key(key: &str) -> Option<Field> {
        Field::ALL.iter().copied().find(|field| field.key() == key)
    }

    /// Score column for the criterion at `index` (0-based).
    pub fn criterion_score(index: usize) -> Option<Field> {
        match index {
            0 => Some(Field::Criterion1Score),
            1 => Some(Field::Criterion2Score),
            2 => Some(Field::Criterion3Score),
            _ => None,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Which of the two prompt/parse flavours a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichMode {
    #[default]
    Company,
    Evaluation,
}

impl EnrichMode {
    pub fn required_inputs(self) -> &'static [Field] {
        match self {
            EnrichMode::Company => &[Field::CompanyName],
            EnrichMode::Evaluation => &[Field::FullName, Field::LinkedinJobTitle],
        }
    }

    pub fn profile_inputs(self) -> &'static [Field] {
        match self {
            EnrichMode::Company => &[Field::CompanyName],
            EnrichMode::Evaluation => &[
                Field::FullName,
                Field::LinkedinJobTitle,
                Field::LinkedinCompany,
                Field::LinkedinLocation,
                Field::LinkedinSummary,
                Field::LinkedinSkills,
            ],
        }
    }

    /// Cells whose presence means the row was already enriched.
    pub fn score_outputs(self, criteria_count: usize) -> Vec<Field> {
        match self {
            EnrichMode::Company => vec![
                Field::Cui,
                Field::Website,
                Field::Revenue,
                Field::Profit,
                Field::Employees,
            ],
            EnrichMode::Evaluation => {
                let mut fields: Vec<Field> =
                    (0..criteria_count).filter_map(Field::criterion_score).collect();
                fields.push(Field::OverallScore);
                fields
            }
        }
    }

    pub fn optional_outputs(self) -> &'static [Field] {
        match self {
            EnrichMode::Company => &[Field::Conclusion, Field::Status],
            EnrichMode::Evaluation => &[Field::Recommendations, Field::Conclusion, Field::Status],
        }
    }
}

/// One data row, keyed by logical field. Built fresh for every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub row: usize,
    pub data: BTreeMap<Field, String>,
}

impl Record {
    pub fn new(row: usize) -> Self {
        Self {
            row,
            data: BTreeMap::new(),
        }
    }

    /// Trimmed, non-blank value of `field`.
    pub fn get(&self, field: Field) -> Option<&str> {
        self.data
            .get(&field)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn is_blank(&self, field: Field) -> bool {
        self.get(field).is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationCriterion {
    pub title: String,
    #[serde(alias = "prompt")]
    pub prompt_fragment: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRequest {
    pub prompt_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelReply {
    pub status_code: u16,
    pub raw_text: String,
}

impl ModelReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Score(u32),
    List(Vec<String>),
}

impl FieldValue {
    pub fn is_sentinel(&self) -> bool {
        match self {
            FieldValue::Text(text) => text == TEXT_SENTINEL,
            FieldValue::Score(score) => *score == 0,
            FieldValue::List(items) => items.is_empty(),
        }
    }

    /// Cell rendering of the value.
    pub fn to_cell(&self) -> String {
        match self {
            FieldValue::Text(text) => text.clone(),
            FieldValue::Score(score) => score.to_string(),
            FieldValue::List(items) => items
                .iter()
                .map(|item| format!("- {}", item))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Output of one parsed reply, written once per row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedResult {
    pub values: BTreeMap<Field, FieldValue>,
}

impl ExtractedResult {
    pub fn get(&self, field: Field) -> Option<&FieldValue> {
        self.values.get(&field)
    }

    pub fn text(&self, field: Field) -> Option<&str> {
        match self.values.get(&field) {
            Some(FieldValue::Text(text)) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn score(&self, field: Field) -> Option<u32> {
        match self.values.get(&field) {
            Some(FieldValue::Score(score)) => Some(*score),
            _ => None,
        }
    }

    pub fn list(&self, field: Field) -> Option<&[String]> {
        match self.values.get(&field) {
            Some(FieldValue::List(items)) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn insert(&mut self, field: Field, value: FieldValue) {
        self.values.insert(field, value);
    }

    pub fn found_count(&self) -> usize {
        self.values.values().filter(|value| !value.is_sentinel()).count()
    }
}

/// Terminal state of one row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Skipped,
    Invalid { missing: Vec<Field> },
    Success { result: ExtractedResult, conclusion: String },
    Failed { error: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub skipped: usize,
    pub invalid: usize,
    pub failed: usize,
    pub checked: usize,
    pub cap_reached: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_keys_round_trip() {
        for field in Field::ALL {
            assert_eq!(Field::from_key(field.key()), Some(field));
        }
        assert_eq!(Field::from_key("unknown"), None);
    }

    #[test]
    fn test_record_get_trims_and_skips_blank() {
        let mut record = Record::new(2);
        record.data.insert(Field::CompanyName, "  ACME SRL ".to_string());
        record.data.insert(Field::Website, "   ".to_string());

        assert_eq!(record.get(Field::CompanyName), Some("ACME SRL"));
        assert!(record.is_blank(Field::Website));
        assert!(record.is_blank(Field::Profit));
    }

    #[test]
    fn test_evaluation_score_outputs_follow_criteria_count() {
        assert_eq!(
            EnrichMode::Evaluation.score_outputs(2),
            vec![Field::Criterion1Score, Field::Criterion2Score, Field::OverallScore]
        );
        assert_eq!(EnrichMode::Company.score_outputs(0).len(), 5);
    }

    #[test]
    fn test_list_value_renders_bullets() {
        let value = FieldValue::List(vec!["Learn Rust".to_string(), "Ship it".to_string()]);
        assert_eq!(value.to_cell(), "- Learn Rust\n- Ship it");
        assert!(FieldValue::List(vec![]).is_sentinel());
        assert!(FieldValue::Text(TEXT_SENTINEL.to_string()).is_sentinel());
    }
}
