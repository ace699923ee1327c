use crate::domain::model::{ModelReply, ModelRequest};
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Text that starts every error written into a cell.
pub const ERROR_TEXT_PREFIX: &str = "Eroare: ";

/// Random-access view of a spreadsheet. Rows and columns are 1-based.
pub trait TabularStore: Send {
    fn get_cell(&self, row: usize, col: usize) -> String;
    fn set_cell(&mut self, row: usize, col: usize, value: &str);
    fn get_row(&self, row: usize) -> Vec<String>;
    fn last_row(&self) -> usize;
    fn last_column(&self) -> usize;

    /// Flags a cell as holding an error. Stores without styling ignore it; there the
    /// `ERROR_TEXT_PREFIX` text is the only trace of the failure.
    fn mark_error(&mut self, _row: usize, _col: usize) {}
}

/// Transport to the generative text API. Non-2xx statuses are returned, not raised.
#[async_trait]
pub trait GenerativeApi: Send + Sync {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelReply>;
}

#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub details: String,
    pub prompt: Option<String>,
    pub response: Option<String>,
    pub conclusion: Option<String>,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            details: details.into(),
            prompt: None,
            response: None,
            conclusion: None,
        }
    }

    pub fn with_exchange(
        mut self,
        prompt: impl Into<String>,
        response: impl Into<String>,
        conclusion: impl Into<String>,
    ) -> Self {
        self.prompt = Some(prompt.into());
        self.response = Some(response.into());
        self.conclusion = Some(conclusion.into());
        self
    }
}

/// Append-only audit journal. Never read back by the pipeline.
pub trait LogSink: Send + Sync {
    fn append(&self, entry: LogEntry);
}
