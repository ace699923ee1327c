use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnrichError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value for '{field}' ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    /// 結構驗證失敗：缺少欄位、API key 或評估設定，整個批次不會開始
    #[error("Structural validation failed: {message}")]
    StructuralValidation { message: String },

    #[error("Row {row} has incomplete data: missing {missing}")]
    InvalidRecord { row: usize, missing: String },

    #[error("Rate limit exceeded after {attempts} attempts")]
    RateLimitExhausted { attempts: u32 },

    #[error("API returned code {status}: {body}")]
    ApiError { status: u16, body: String },

    #[error("Malformed model reply: {message}")]
    MalformedReply { message: String },

    #[error("Document '{url}' is inaccessible or invalid URL: {reason}")]
    DocumentError { url: String, reason: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl EnrichError {
    /// 判斷是否為限流錯誤（429、RESOURCE_EXHAUSTED 或訊息含 rate limit）
    pub fn is_rate_limited(&self) -> bool {
        match self {
            EnrichError::RateLimitExhausted { .. } => true,
            EnrichError::ApiError { status: 429, .. } => true,
            other => {
                let message = other.to_string();
                message.contains("RESOURCE_EXHAUSTED")
                    || message.to_lowercase().contains("rate limit")
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            EnrichError::StructuralValidation { .. }
            | EnrichError::ConfigValidationError { .. }
            | EnrichError::InvalidConfigValueError { .. }
            | EnrichError::MissingConfigError { .. }
            | EnrichError::IoError(_) => ErrorSeverity::Critical,
            EnrichError::RateLimitExhausted { .. } | EnrichError::HttpError(_) => {
                ErrorSeverity::Medium
            }
            EnrichError::InvalidRecord { .. } => ErrorSeverity::Low,
            _ => ErrorSeverity::High,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            EnrichError::StructuralValidation { .. } => {
                "Check the header row, the API key and the evaluation settings, then run again"
            }
            EnrichError::ConfigValidationError { .. }
            | EnrichError::InvalidConfigValueError { .. }
            | EnrichError::MissingConfigError { .. } => {
                "Fix the configuration file and run again"
            }
            EnrichError::RateLimitExhausted { .. } => {
                "Wait a few minutes or lower max_rows_per_run before the next run"
            }
            EnrichError::HttpError(_) | EnrichError::DocumentError { .. } => {
                "Check network connectivity and the configured URLs"
            }
            EnrichError::ApiError { .. } | EnrichError::MalformedReply { .. } => {
                "Inspect the interaction log for the raw API response"
            }
            EnrichError::IoError(_) | EnrichError::CsvError(_) => {
                "Make sure the sheet file exists and is a valid CSV file"
            }
            _ => "Re-run with --verbose for more details",
        }
    }
}

pub type Result<T> = std::result::Result<T, EnrichError>;
