use crate::adapters::gemini::{DEFAULT_ENDPOINT, DEFAULT_MODEL};
use crate::adapters::log_book::DEFAULT_MAX_ENTRIES;
use crate::core::batch::{BatchOptions, DEFAULT_INTER_ROW_DELAY, DEFAULT_MAX_ROWS_PER_RUN};
use crate::core::column_index::{parse_cell_ref, ColumnMap, ColumnStrategy};
use crate::core::model_client::{DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS};
use crate::core::prompt::MAX_CRITERIA;
use crate::core::row_processor::{ErrorTarget, RowPolicy};
use crate::domain::model::{EnrichMode, EvaluationCriterion, Field};
use crate::utils::error::{EnrichError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

pub const API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const DEFAULT_STATUS_CELL: &str = "K1";
pub const DEFAULT_LOG_PATH: &str = "logs.csv";

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("valid env var pattern"));

const COMPANY_LETTERS: [(Field, &str); 6] = [
    (Field::CompanyName, "B"),
    (Field::Cui, "F"),
    (Field::Website, "G"),
    (Field::Revenue, "H"),
    (Field::Profit, "I"),
    (Field::Employees, "J"),
];

const COMPANY_REQUIRED_HEADERS: [&str; 6] = [
    "Companie",
    "Website",
    "Cifra afaceri (2023)",
    "Profit",
    "Nr. angajati",
    "CUI",
];

const EVALUATION_HEADERS: [(Field, &str); 12] = [
    (Field::FullName, "Nume"),
    (Field::LinkedinJobTitle, "Titlu LinkedIn"),
    (Field::LinkedinCompany, "Companie LinkedIn"),
    (Field::LinkedinLocation, "Locație"),
    (Field::LinkedinSummary, "Rezumat"),
    (Field::LinkedinSkills, "Competențe"),
    (Field::Criterion1Score, "Scor criteriu 1"),
    (Field::Criterion2Score, "Scor criteriu 2"),
    (Field::Criterion3Score, "Scor criteriu 3"),
    (Field::OverallScore, "Scor general"),
    (Field::Recommendations, "Recomandări"),
    (Field::Conclusion, "Concluzie"),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichConfig {
    pub run: RunConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub columns: ColumnsConfig,
    pub evaluation: Option<EvaluationConfig>,
    #[serde(default)]
    pub log: LogConfig,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub mode: EnrichMode,
    /// CSV file holding the sheet, relative to `base_path`.
    pub sheet: String,
    pub base_path: Option<String>,
    pub max_rows_per_run: Option<usize>,
    pub inter_row_delay_ms: Option<u64>,
    pub status_cell: Option<String>,
    /// Defaults to `status` when a status column resolves, `outputs` otherwise.
    pub error_target: Option<ErrorTarget>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub timeout_seconds: Option<u64>,
    pub search_grounding: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub cooldown_seconds: Option<u64>,
    pub max_cooldowns: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnsConfig {
    #[serde(default)]
    pub strategy: ColumnStrategy,
    pub letters: Option<BTreeMap<Field, String>>,
    pub headers: Option<BTreeMap<Field, String>>,
    pub required_headers: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationConfig {
    pub job_description: Option<String>,
    pub job_description_url: Option<String>,
    #[serde(default)]
    pub criteria: Vec<EvaluationCriterion>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogConfig {
    pub path: Option<String>,
    pub max_entries: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
}

impl EnrichConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| EnrichError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${GEMINI_API_KEY})，未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> String {
        ENV_VAR
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .to_string()
    }

    pub fn mode(&self) -> EnrichMode {
        self.run.mode
    }

    pub fn base_path(&self) -> &str {
        self.run.base_path.as_deref().unwrap_or(".")
    }

    /// Configured key, or `GEMINI_API_KEY` when the file leaves it empty or unresolved.
    pub fn api_key(&self) -> Option<String> {
        self.api
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty() && !ENV_VAR.is_match(key))
            .map(str::to_string)
            .or_else(|| {
                std::env::var(API_KEY_ENV)
                    .ok()
                    .filter(|key| !key.trim().is_empty())
            })
    }

    pub fn endpoint(&self) -> &str {
        self.api.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT)
    }

    pub fn model(&self) -> &str {
        self.api.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn max_attempts(&self) -> u32 {
        self.api.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS)
    }

    pub fn base_delay(&self) -> Duration {
        self.api
            .base_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_BASE_DELAY)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_seconds.unwrap_or(60))
    }

    pub fn search_grounding(&self) -> bool {
        self.api.search_grounding.unwrap_or(false)
    }

    pub fn max_rows_per_run(&self) -> usize {
        self.run.max_rows_per_run.unwrap_or(DEFAULT_MAX_ROWS_PER_RUN)
    }

    pub fn status_cell(&self) -> Option<(usize, usize)> {
        match (&self.run.status_cell, self.mode()) {
            (Some(cell), _) if cell.trim().is_empty() => None,
            (Some(cell), _) => parse_cell_ref(cell),
            (None, EnrichMode::Company) => parse_cell_ref(DEFAULT_STATUS_CELL),
            (None, EnrichMode::Evaluation) => None,
        }
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            max_rows_per_run: self.max_rows_per_run(),
            inter_row_delay: self
                .run
                .inter_row_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_INTER_ROW_DELAY),
            status_cell: self.status_cell(),
        }
    }

    /// 失敗訊息必須寫在看得見的欄位：沒有狀態欄時改寫入所有輸出欄
    pub fn error_target(&self, columns: &ColumnMap) -> ErrorTarget {
        self.run.error_target.unwrap_or_else(|| {
            if columns.resolve(Field::Status).is_some() {
                ErrorTarget::Status
            } else {
                ErrorTarget::Outputs
            }
        })
    }

    pub fn row_policy(&self, columns: &ColumnMap) -> RowPolicy {
        let defaults = RowPolicy::default();
        RowPolicy {
            cooldown: self
                .rate_limit
                .cooldown_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.cooldown),
            max_cooldowns: self.rate_limit.max_cooldowns.unwrap_or(defaults.max_cooldowns),
            error_target: self.error_target(columns),
        }
    }

    pub fn required_headers(&self) -> Vec<String> {
        match (&self.columns.required_headers, self.mode()) {
            (Some(headers), _) => headers.clone(),
            (None, EnrichMode::Company) => {
                COMPANY_REQUIRED_HEADERS.iter().map(|h| h.to_string()).collect()
            }
            (None, EnrichMode::Evaluation) => Vec::new(),
        }
    }

    /// Resolves every configured field once for the run.
    pub fn column_map(&self, header_row: &[String]) -> ColumnMap {
        match self.columns.strategy {
            ColumnStrategy::Static => {
                let letters = self.columns.letters.clone().unwrap_or_else(|| {
                    COMPANY_LETTERS
                        .iter()
                        .map(|(field, letter)| (*field, letter.to_string()))
                        .collect()
                });
                ColumnMap::from_letters(&letters)
            }
            ColumnStrategy::Header => {
                let names = self.columns.headers.clone().unwrap_or_else(|| {
                    EVALUATION_HEADERS
                        .iter()
                        .map(|(field, name)| (*field, name.to_string()))
                        .collect()
                });
                ColumnMap::from_headers(header_row, &names)
            }
        }
    }

    pub fn criteria(&self) -> &[EvaluationCriterion] {
        self.evaluation
            .as_ref()
            .map(|e| e.criteria.as_slice())
            .unwrap_or(&[])
    }

    pub fn log_path(&self) -> &str {
        self.log.path.as_deref().unwrap_or(DEFAULT_LOG_PATH)
    }

    pub fn log_max_entries(&self) -> usize {
        self.log.max_entries.unwrap_or(DEFAULT_MAX_ENTRIES)
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validation::validate_data_file("run.sheet", &self.run.sheet, &["csv"])?;
        validation::validate_url("api.endpoint", self.endpoint())?;
        validation::validate_non_empty("api.model", self.model())?;
        validation::validate_range("run.max_rows_per_run", self.max_rows_per_run(), 1, usize::MAX)?;
        validation::validate_range("api.max_attempts", self.max_attempts(), 1, 10)?;
        validation::validate_data_file("log.path", self.log_path(), &["csv"])?;
        validation::validate_range("log.max_entries", self.log_max_entries(), 1, usize::MAX)?;

        if let Some(cell) = &self.run.status_cell {
            if !cell.trim().is_empty() && parse_cell_ref(cell).is_none() {
                return Err(EnrichError::InvalidConfigValueError {
                    field: "run.status_cell".to_string(),
                    value: cell.clone(),
                    reason: "Expected an A1-style cell reference such as K1".to_string(),
                });
            }
        }

        if self.columns.strategy == ColumnStrategy::Static
            && self.columns.letters.is_none()
            && self.mode() == EnrichMode::Evaluation
        {
            return Err(EnrichError::MissingConfigError {
                field: "columns.letters".to_string(),
            });
        }

        if self.mode() == EnrichMode::Evaluation {
            let Some(evaluation) = &self.evaluation else {
                return Err(EnrichError::MissingConfigError {
                    field: "evaluation".to_string(),
                });
            };

            validation::validate_range(
                "evaluation.criteria",
                evaluation.criteria.len(),
                1,
                MAX_CRITERIA,
            )?;

            let has_text = evaluation
                .job_description
                .as_deref()
                .is_some_and(|text| !text.trim().is_empty());
            match evaluation.job_description_url.as_deref() {
                Some(url) if !has_text => validation::validate_url("evaluation.job_description_url", url)?,
                None if !has_text => {
                    return Err(EnrichError::MissingConfigError {
                        field: "evaluation.job_description".to_string(),
                    })
                }
                _ => {}
            }
        }

        Ok(())
    }
}

impl Validate for EnrichConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_minimal_company_config_uses_default_layout() {
        let config = EnrichConfig::from_toml_str(
            r#"
[run]
sheet = "companies.csv"
"#,
        )
        .unwrap();

        assert_eq!(config.mode(), EnrichMode::Company);
        assert_eq!(config.max_rows_per_run(), 5);
        assert_eq!(config.status_cell(), Some((1, 11)));
        assert_eq!(config.required_headers().len(), 6);
        assert_eq!(config.endpoint(), DEFAULT_ENDPOINT);
        assert_eq!(config.batch_options().inter_row_delay, Duration::from_millis(2000));

        let map = config.column_map(&[]);
        let policy = config.row_policy(&map);
        assert_eq!(policy.max_cooldowns, 3);
        assert_eq!(policy.cooldown, Duration::from_secs(120));
        // 預設版面沒有狀態欄，錯誤寫入輸出欄
        assert_eq!(policy.error_target, ErrorTarget::Outputs);
        assert_eq!(map.resolve(Field::CompanyName), Some(2));
        assert_eq!(map.resolve(Field::Employees), Some(10));
        assert_eq!(map.resolve(Field::Status), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_evaluation_config_with_headers() {
        let config = EnrichConfig::from_toml_str(
            r#"
[run]
mode = "evaluation"
sheet = "candidates.csv"
max_rows_per_run = 10
error_target = "outputs"

[columns]
strategy = "header"

[columns.headers]
full_name = "Nume"
linkedin_job_title = "Titlu"
criterion1_score = "Tehnic"
overall_score = "Scor"

[evaluation]
job_description = "Inginer Rust"

[[evaluation.criteria]]
title = "Competențe tehnice"
prompt = "Stack-ul cerut"
"#,
        )
        .unwrap();

        assert_eq!(config.mode(), EnrichMode::Evaluation);
        assert_eq!(config.status_cell(), None);
        assert_eq!(config.criteria()[0].prompt_fragment, "Stack-ul cerut");

        let header: Vec<String> = ["Nume", "Titlu", "Tehnic", "Scor"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let map = config.column_map(&header);
        assert_eq!(map.resolve(Field::OverallScore), Some(4));
        assert_eq!(config.row_policy(&map).error_target, ErrorTarget::Outputs);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_error_target_follows_status_column() {
        let config = EnrichConfig::from_toml_str(
            r#"
[run]
sheet = "companies.csv"

[columns.letters]
company_name = "B"
cui = "F"
website = "G"
revenue = "H"
profit = "I"
employees = "J"
status = "L"
"#,
        )
        .unwrap();
        let with_status = config.column_map(&[]);
        assert_eq!(config.error_target(&with_status), ErrorTarget::Status);

        let config = EnrichConfig::from_toml_str(
            "[run]\nsheet = \"companies.csv\"\nerror_target = \"status\"\n",
        )
        .unwrap();
        let without_status = config.column_map(&[]);
        // 明確設定的值不會被改寫，交由結構檢查拒絕
        assert_eq!(config.error_target(&without_status), ErrorTarget::Status);
    }

    #[test]
    fn test_evaluation_without_criteria_is_invalid() {
        let config = EnrichConfig::from_toml_str(
            r#"
[run]
mode = "evaluation"
sheet = "candidates.csv"

[columns]
strategy = "header"

[evaluation]
job_description_url = "https://docs.google.com/document/d/abc/edit"
"#,
        )
        .unwrap();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config = EnrichConfig::from_toml_str(
            r#"
[run]
sheet = "companies.xlsx"
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());

        let config = EnrichConfig::from_toml_str(
            r#"
[run]
sheet = "companies.csv"
status_cell = "1K"
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());

        let err = EnrichConfig::from_toml_str(
            r#"
[run]
sheet = "companies.csv"

[columns.letters]
unknown_field = "C"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, EnrichError::ConfigValidationError { .. }));
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("SHEET_ENRICHER_TEST_KEY", "secret-key");

        let config = EnrichConfig::from_toml_str(
            r#"
[run]
sheet = "companies.csv"

[api]
api_key = "${SHEET_ENRICHER_TEST_KEY}"
"#,
        )
        .unwrap();
        assert_eq!(config.api_key().as_deref(), Some("secret-key"));

        std::env::remove_var("SHEET_ENRICHER_TEST_KEY");
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(
                br#"
[run]
sheet = "data/companies.csv"
base_path = "/tmp/enricher"

[log]
path = "data/logs.csv"
max_entries = 50
"#,
            )
            .unwrap();

        let config = EnrichConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.base_path(), "/tmp/enricher");
        assert_eq!(config.log_path(), "data/logs.csv");
        assert_eq!(config.log_max_entries(), 50);
    }
}
