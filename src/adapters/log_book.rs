use crate::domain::ports::{LogEntry, LogLevel, LogSink, Storage};
use crate::utils::error::{EnrichError, Result};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;

pub const DEFAULT_MAX_ENTRIES: usize = 1000;

const HEADER: [&str; 7] = [
    "Timestamp",
    "Level",
    "Message",
    "Details",
    "Prompt",
    "Response",
    "Conclusion",
];

/// Retention-capped interaction journal, persisted as a CSV "Logs" sheet.
///
/// Every entry is also mirrored to `tracing` at the matching level. Once the
/// journal holds more than `max_entries` rows the oldest ones are dropped.
pub struct LogBook {
    entries: Mutex<VecDeque<LogEntry>>,
    max_entries: usize,
}

impl LogBook {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            max_entries: max_entries.max(1),
        }
    }

    /// 載入既有的日誌檔；檔案不存在時從空白開始
    pub async fn load<S: Storage>(storage: &S, path: &str, max_entries: usize) -> Result<Self> {
        let book = Self::new(max_entries);

        let data = match storage.read_file(path).await {
            Ok(data) => data,
            Err(EnrichError::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("📝 No existing log at '{}', starting a new one", path);
                return Ok(book);
            }
            Err(e) => return Err(e),
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(data.as_slice());

        let mut loaded = VecDeque::new();
        for record in reader.records() {
            let record = record?;
            let timestamp = match record
                .get(0)
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            {
                Some(timestamp) => timestamp.with_timezone(&Utc),
                None => {
                    tracing::warn!("Skipping log row with unreadable timestamp");
                    continue;
                }
            };
            let column = |index: usize| record.get(index).unwrap_or_default().to_string();
            let optional = |index: usize| record.get(index).filter(|v| !v.is_empty()).map(str::to_string);

            loaded.push_back(LogEntry {
                timestamp,
                level: parse_level(record.get(1).unwrap_or_default()),
                message: column(2),
                details: column(3),
                prompt: optional(4),
                response: optional(5),
                conclusion: optional(6),
            });
        }

        while loaded.len() > book.max_entries {
            loaded.pop_front();
        }
        if let Ok(mut entries) = book.entries.lock() {
            *entries = loaded;
        }
        Ok(book)
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_csv(&self) -> Result<Vec<u8>> {
        let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
        writer.write_record(HEADER)?;

        for entry in self.entries() {
            writer.write_record([
                entry.timestamp.to_rfc3339(),
                entry.level.to_string(),
                entry.message,
                entry.details,
                entry.prompt.unwrap_or_default(),
                entry.response.unwrap_or_default(),
                entry.conclusion.unwrap_or_default(),
            ])?;
        }

        writer
            .into_inner()
            .map_err(|e| EnrichError::IoError(e.into_error()))
    }

    pub async fn flush<S: Storage>(&self, storage: &S, path: &str) -> Result<()> {
        let data = self.to_csv()?;
        storage.write_file(path, &data).await?;
        tracing::debug!("📝 Interaction log written to '{}' ({} entries)", path, self.len());
        Ok(())
    }
}

impl Default for LogBook {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl LogSink for LogBook {
    fn append(&self, entry: LogEntry) {
        match entry.level {
            LogLevel::Debug => tracing::debug!("{} {}", entry.message, entry.details),
            LogLevel::Info => tracing::info!("{} {}", entry.message, entry.details),
            LogLevel::Warning => tracing::warn!("{} {}", entry.message, entry.details),
            LogLevel::Error => tracing::error!("{} {}", entry.message, entry.details),
        }

        // 日誌失敗不可中斷批次處理
        let Ok(mut entries) = self.entries.lock() else {
            eprintln!("Logging failed: interaction log lock poisoned");
            return;
        };
        entries.push_back(entry);
        while entries.len() > self.max_entries {
            entries.pop_front();
        }
    }
}

fn parse_level(raw: &str) -> LogLevel {
    match raw {
        "DEBUG" => LogLevel::Debug,
        "WARNING" => LogLevel::Warning,
        "ERROR" => LogLevel::Error,
        _ => LogLevel::Info,
    }
}
