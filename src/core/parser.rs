//! Tolerant extraction of structured fields from free-text model replies.
//!
//! Each expected field has a declared extractor (label regex + sentinel). A
//! field whose label is missing or whose value is blank falls back to its
//! sentinel; only a reply without any candidate text is an error.

use crate::core::prompt::{
    PromptBuilder, LABEL_CUI, LABEL_EMPLOYEES, LABEL_PROFIT, LABEL_RECOMMENDATIONS,
    LABEL_REVENUE, LABEL_WEBSITE,
};
use crate::domain::model::{
    EvaluationCriterion, ExtractedResult, Field, FieldValue, TEXT_SENTINEL,
};
use crate::utils::error::{EnrichError, Result};
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

const COMPANY_FIELDS: [(Field, &str); 5] = [
    (Field::Cui, LABEL_CUI),
    (Field::Website, LABEL_WEBSITE),
    (Field::Revenue, LABEL_REVENUE),
    (Field::Profit, LABEL_PROFIT),
    (Field::Employees, LABEL_EMPLOYEES),
];

static SCORE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{1,3}").expect("valid regex"));

/// `- x`, `• x`, `* x`, `1. x`, `2) x`. A bare `**` (markdown bold) is not a bullet.
static BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[-•]\s*|\*\s+|\d{1,2}[.)]\s+)").expect("valid regex"));

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ReplyError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ReplyPart>,
}

#[derive(Debug, Deserialize)]
struct ReplyPart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReplyError {
    code: Option<u16>,
    message: Option<String>,
    status: Option<String>,
}

/// Pulls `candidates[0].content.parts[*].text` out of a raw API body.
pub fn reply_text(raw: &str) -> Result<String> {
    let response: GenerateContentResponse =
        serde_json::from_str(raw).map_err(|e| EnrichError::MalformedReply {
            message: format!("reply is not valid JSON: {}", e),
        })?;

    if let Some(error) = response.error {
        let message = error.message.unwrap_or_else(|| "Unknown error".to_string());
        let body = match error.status {
            Some(status) => format!("API Error: {} ({})", message, status),
            None => format!("API Error: {}", message),
        };
        return Err(EnrichError::ApiError {
            status: error.code.unwrap_or(200),
            body,
        });
    }

    let text: Option<String> = response
        .candidates
        .and_then(|candidates| candidates.into_iter().next())
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<Vec<_>>()
        })
        .filter(|texts| !texts.is_empty())
        .map(|texts| texts.concat());

    text.ok_or_else(|| EnrichError::MalformedReply {
        message: "reply has no candidates[0].content.parts[0].text".to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorKind {
    Text,
    Score,
    List,
}

#[derive(Debug, Clone)]
pub struct Extractor {
    pub field: Field,
    pub label: String,
    pub kind: ExtractorKind,
    pattern: Regex,
}

impl Extractor {
    pub fn new(field: Field, label: &str, kind: ExtractorKind) -> Result<Self> {
        Ok(Self {
            field,
            label: label.to_string(),
            kind,
            pattern: label_pattern(label, kind)?,
        })
    }

    fn sentinel(&self) -> FieldValue {
        match self.kind {
            ExtractorKind::Text => FieldValue::Text(TEXT_SENTINEL.to_string()),
            ExtractorKind::Score => FieldValue::Score(0),
            ExtractorKind::List => FieldValue::List(Vec::new()),
        }
    }

    fn extract(&self, text: &str) -> FieldValue {
        match self.kind {
            ExtractorKind::List => FieldValue::List(self.extract_list(text)),
            ExtractorKind::Text => self
                .capture(text)
                .map(FieldValue::Text)
                .unwrap_or_else(|| self.sentinel()),
            ExtractorKind::Score => self
                .capture(text)
                .and_then(|value| parse_score(&value))
                .map(FieldValue::Score)
                .unwrap_or_else(|| self.sentinel()),
        }
    }

    fn capture(&self, text: &str) -> Option<String> {
        let caps = self.pattern.captures(text)?;
        let value = clean_value(caps.get(1)?.as_str());
        (!value.is_empty()).then_some(value)
    }

    /// Lines following the label, markers stripped, blanks dropped.
    ///
    /// Once a bullet has been seen, the first unbulleted line ends the list. Without
    /// bullets, the list runs until the first blank line after an item.
    fn extract_list(&self, text: &str) -> Vec<String> {
        let Some(found) = self.pattern.find(text) else {
            return Vec::new();
        };

        let mut items: Vec<String> = Vec::new();
        let mut bulleted = false;
        let mut after_gap = false;

        for (index, line) in text[found.end()..].lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                after_gap = !items.is_empty();
                continue;
            }

            let item = if let Some(marker) = BULLET.find(line) {
                bulleted = true;
                &line[marker.end()..]
            } else if index == 0 || !(bulleted || after_gap) {
                // 標籤之後同一行的內容也算一項
                line
            } else {
                break;
            };

            let item = item.trim();
            if !item.is_empty() {
                items.push(item.to_string());
            }
        }

        items
    }
}

/// `label:?<blanks>(rest of line)`, case-insensitive. Blanks never cross a newline.
/// List extractors only locate the label; their items follow on the next lines.
fn label_pattern(label: &str, kind: ExtractorKind) -> Result<Regex> {
    let boundary = if label
        .chars()
        .last()
        .map(|c| c.is_alphanumeric())
        .unwrap_or(false)
    {
        r"\b"
    } else {
        ""
    };
    let value = match kind {
        ExtractorKind::List => "",
        ExtractorKind::Text | ExtractorKind::Score => r"[^\S\n]*([^\n]+)",
    };
    let pattern = format!(
        r"(?i){}{}:?{}",
        regex::escape(label.trim()),
        boundary,
        value
    );
    Regex::new(&pattern).map_err(|e| EnrichError::ProcessingError {
        message: format!("cannot build extractor for '{}': {}", label, e),
    })
}

/// Drops markdown emphasis, a stray leading colon and `[...]` placeholders brackets.
fn clean_value(raw: &str) -> String {
    let value = raw
        .trim()
        .trim_start_matches(|c: char| c == '*' || c == ':' || c.is_whitespace())
        .trim_end_matches(|c: char| c == '*' || c.is_whitespace());

    let value = value
        .strip_prefix('[')
        .and_then(|inner| inner.strip_suffix(']'))
        .unwrap_or(value);

    value.trim().to_string()
}

fn parse_score(value: &str) -> Option<u32> {
    SCORE
        .find(value)
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .map(|score| score.min(100))
}

/// Declared extractor table for one run.
#[derive(Debug, Clone)]
pub struct ReplySchema {
    extractors: Vec<Extractor>,
    compute_overall: bool,
}

impl ReplySchema {
    pub fn company() -> Self {
        let extractors = COMPANY_FIELDS
            .iter()
            .map(|(field, label)| Extractor {
                field: *field,
                label: label.to_string(),
                kind: ExtractorKind::Text,
                pattern: label_pattern(label, ExtractorKind::Text)
                    .expect("static label pattern is valid"),
            })
            .collect();

        Self {
            extractors,
            compute_overall: false,
        }
    }

    pub fn evaluation(criteria: &[EvaluationCriterion]) -> Result<Self> {
        let mut extractors = Vec::with_capacity(criteria.len() + 1);
        for (index, criterion) in criteria.iter().enumerate() {
            let Some(field) = Field::criterion_score(index) else {
                break;
            };
            extractors.push(Extractor::new(field, &criterion.title, ExtractorKind::Score)?);
        }
        extractors.push(Extractor::new(
            Field::Recommendations,
            LABEL_RECOMMENDATIONS,
            ExtractorKind::List,
        )?);

        Ok(Self {
            extractors,
            compute_overall: true,
        })
    }

    pub fn for_builder(builder: &PromptBuilder) -> Result<Self> {
        match builder {
            PromptBuilder::Company => Ok(Self::company()),
            PromptBuilder::Evaluation { criteria, .. } => Self::evaluation(criteria),
        }
    }

    pub fn extractors(&self) -> &[Extractor] {
        &self.extractors
    }

    /// Pure extraction over already unwrapped reply text. Never fails.
    pub fn extract(&self, text: &str) -> ExtractedResult {
        let mut result = ExtractedResult::default();
        for extractor in &self.extractors {
            result.insert(extractor.field, extractor.extract(text));
        }

        if self.compute_overall {
            let scores: Vec<u32> = self
                .extractors
                .iter()
                .filter(|e| e.kind == ExtractorKind::Score)
                .filter_map(|e| result.score(e.field))
                .collect();
            let overall = if scores.is_empty() {
                0
            } else {
                (scores.iter().sum::<u32>() as f64 / scores.len() as f64).round() as u32
            };
            result.insert(Field::OverallScore, FieldValue::Score(overall));
        }

        result
    }

    /// Raw API body → fields. Errors only when the reply carries no text at all.
    pub fn parse(&self, raw: &str) -> Result<ExtractedResult> {
        let text = reply_text(raw)?;
        Ok(self.extract(&text))
    }

    /// Short human-readable summary written next to the extracted fields.
    pub fn conclusion(&self, result: &ExtractedResult) -> String {
        if self.compute_overall {
            let overall = result.score(Field::OverallScore).unwrap_or(0);
            let verdict = match overall {
                75..=100 => "potrivire puternică",
                50..=74 => "potrivire parțială",
                _ => "potrivire slabă",
            };
            let recommendations = result
                .list(Field::Recommendations)
                .map(|items| items.len())
                .unwrap_or(0);
            format!(
                "Scor general: {}/100 ({}). Recomandări: {}",
                overall, verdict, recommendations
            )
        } else {
            format!(
                "Date găsite: {}/{} câmpuri",
                result.found_count(),
                self.extractors.len()
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(text: &str) -> String {
        serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": text}]}}]
        })
        .to_string()
    }

    fn criteria() -> Vec<EvaluationCriterion> {
        ["Competențe tehnice", "Experiență relevantă", "Potrivire culturală"]
            .iter()
            .map(|title| EvaluationCriterion {
                title: title.to_string(),
                prompt_fragment: String::new(),
            })
            .collect()
    }

    #[test]
    fn test_company_reply_full() {
        let text = "Numele oficial: ACME SRL\nCodul fiscal: RO123456\nCifra de afaceri: 1.000.000 lei\n\
Profit: 120.000 lei\nNr de angajati: 42\nSite-ul: https://acme.ro\n";
        let result = ReplySchema::company().parse(&wrap(text)).unwrap();

        assert_eq!(result.text(Field::Cui), Some("RO123456"));
        assert_eq!(result.text(Field::Revenue), Some("1.000.000 lei"));
        assert_eq!(result.text(Field::Profit), Some("120.000 lei"));
        assert_eq!(result.text(Field::Employees), Some("42"));
        assert_eq!(result.text(Field::Website), Some("https://acme.ro"));
    }

    #[test]
    fn test_missing_labels_fall_back_to_sentinel() {
        let text = "Site-ul: example.ro\nCifra de afaceri: 1.000.000\n";
        let result = ReplySchema::company().parse(&wrap(text)).unwrap();

        assert_eq!(result.text(Field::Website), Some("example.ro"));
        assert_eq!(result.text(Field::Revenue), Some("1.000.000"));
        for field in [Field::Cui, Field::Profit, Field::Employees] {
            assert_eq!(result.text(field), Some(TEXT_SENTINEL));
        }
    }

    #[test]
    fn test_blank_value_does_not_steal_next_line() {
        let text = "Profit:\nNr de angajati: 12\n";
        let result = ReplySchema::company().extract(text);

        assert_eq!(result.text(Field::Profit), Some(TEXT_SENTINEL));
        assert_eq!(result.text(Field::Employees), Some("12"));
    }

    #[test]
    fn test_markdown_and_brackets_are_cleaned() {
        let text = "**Site-ul:** [www.acme.ro]\n**Profit**: 5 lei\ncodul FISCAL 998877";
        let result = ReplySchema::company().extract(text);

        assert_eq!(result.text(Field::Website), Some("www.acme.ro"));
        assert_eq!(result.text(Field::Profit), Some("5 lei"));
        assert_eq!(result.text(Field::Cui), Some("998877"));
    }

    #[test]
    fn test_label_is_not_matched_inside_longer_word() {
        let result = ReplySchema::company().extract("Profitul net: 10\n");
        assert_eq!(result.text(Field::Profit), Some(TEXT_SENTINEL));
    }

    #[test]
    fn test_evaluation_scores_and_overall() {
        let text = "Competențe tehnice: 80\nExperiență relevantă: [65/100]\nPotrivire culturală: 250\n\
Recomandări:\n- Aprofundează async Rust\n- Contribuie la open source\n";
        let schema = ReplySchema::evaluation(&criteria()).unwrap();
        let result = schema.parse(&wrap(text)).unwrap();

        assert_eq!(result.score(Field::Criterion1Score), Some(80));
        assert_eq!(result.score(Field::Criterion2Score), Some(65));
        assert_eq!(result.score(Field::Criterion3Score), Some(100));
        assert_eq!(result.score(Field::OverallScore), Some(82));
        assert_eq!(
            schema.conclusion(&result),
            "Scor general: 82/100 (potrivire puternică). Recomandări: 2"
        );
    }

    #[test]
    fn test_evaluation_missing_scores_default_to_zero() {
        let schema = ReplySchema::evaluation(&criteria()).unwrap();
        let result = schema.extract("Nu pot evalua acest profil.");

        assert_eq!(result.score(Field::Criterion1Score), Some(0));
        assert_eq!(result.score(Field::OverallScore), Some(0));
        assert_eq!(result.list(Field::Recommendations), Some(&[][..]));
    }

    #[test]
    fn test_recommendation_lists_keep_order_and_drop_blanks() {
        let schema = ReplySchema::evaluation(&criteria()[..1]).unwrap();
        let items = ["Unu", "Doi cu full-stack", "Trei", "Patru", "Cinci"];

        for n in 0..=5 {
            let mut text = String::from("Competențe tehnice: 50\nRecomandări:\n");
            for (i, item) in items.iter().take(n).enumerate() {
                text.push_str(&format!("- {}\n", item));
                if i % 2 == 0 {
                    text.push_str("   \n");
                }
            }

            let result = schema.extract(&text);
            let expected: Vec<String> = items.iter().take(n).map(|s| s.to_string()).collect();
            assert_eq!(result.list(Field::Recommendations).unwrap(), expected.as_slice());
        }
    }

    #[test]
    fn test_recommendation_on_same_line_as_label() {
        let schema = ReplySchema::evaluation(&criteria()[..1]).unwrap();
        let result = schema.extract("RECOMANDĂRI: Învață Tokio\n- Scrie teste");

        assert_eq!(
            result.list(Field::Recommendations).unwrap(),
            &["Învață Tokio".to_string(), "Scrie teste".to_string()]
        );
    }

    #[test]
    fn test_recommendation_list_ends_at_first_unbulleted_line() {
        let schema = ReplySchema::evaluation(&criteria()[..1]).unwrap();
        let result = schema.extract(
            "Recomandări:\n\
             - Aprofundează async\n\
             \n\
             2) Contribuie open source\n\
             În concluzie, candidatul este potrivit.\n\
             Competențe tehnice: 80\n\
             - Notă de subsol\n",
        );

        assert_eq!(
            result.list(Field::Recommendations).unwrap(),
            &[
                "Aprofundează async".to_string(),
                "Contribuie open source".to_string()
            ]
        );
        assert_eq!(result.score(Field::Criterion1Score), Some(80));
    }

    #[test]
    fn test_unbulleted_recommendations_end_at_blank_line() {
        let schema = ReplySchema::evaluation(&criteria()[..1]).unwrap();
        let result = schema.extract(
            "Recomandări:\nÎnvață Tokio\nScrie teste\n\nCompetențe tehnice: 40\n**Scor general:** 40",
        );

        assert_eq!(
            result.list(Field::Recommendations).unwrap(),
            &["Învață Tokio".to_string(), "Scrie teste".to_string()]
        );
    }

    #[test]
    fn test_reply_without_candidates_is_malformed() {
        let err = ReplySchema::company().parse(r#"{"candidates": []}"#).unwrap_err();
        assert!(matches!(err, EnrichError::MalformedReply { .. }));

        let err = ReplySchema::company().parse("not json").unwrap_err();
        assert!(matches!(err, EnrichError::MalformedReply { .. }));
    }

    #[test]
    fn test_reply_error_object_is_api_error() {
        let raw = r#"{"error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}}"#;
        let err = reply_text(raw).unwrap_err();

        assert!(matches!(err, EnrichError::ApiError { status: 429, .. }));
        assert!(err.is_rate_limited());
        assert!(err.to_string().contains("API Error: Quota exceeded"));
    }
}
