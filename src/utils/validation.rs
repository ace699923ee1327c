use crate::utils::error::{EnrichError, Result};
use std::path::Path;
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn invalid(field: &str, value: impl ToString, reason: impl Into<String>) -> EnrichError {
    EnrichError::InvalidConfigValueError {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// Only http(s) endpoints are reachable by the API client and the document fetcher.
pub fn validate_url(field: &str, raw: &str) -> Result<()> {
    let url = Url::parse(raw.trim()).map_err(|e| invalid(field, raw, format!("Invalid URL: {}", e)))?;

    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(()),
        "http" | "https" => Err(invalid(field, raw, "URL has no host")),
        scheme => Err(invalid(field, raw, format!("Unsupported URL scheme: {}", scheme))),
    }
}

/// Sheet and log files: non-empty, with one of the given extensions.
pub fn validate_data_file(field: &str, file: &str, extensions: &[&str]) -> Result<()> {
    if file.trim().is_empty() {
        return Err(invalid(field, file, "File path cannot be empty"));
    }

    let extension = Path::new(file)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension {
        Some(ext) if extensions.contains(&ext.as_str()) => Ok(()),
        _ => Err(invalid(
            field,
            file,
            format!("Expected a .{} file", extensions.join(" / .")),
        )),
    }
}

pub fn validate_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(field, value, "Value cannot be empty"));
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(invalid(field, value, format!("Value must be between {} and {}", min, max)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("api.endpoint", "https://generativelanguage.googleapis.com/v1beta/models").is_ok());
        assert!(validate_url("api.endpoint", "http://127.0.0.1:8080/v1beta/models").is_ok());
        assert!(validate_url("api.endpoint", "").is_err());
        assert!(validate_url("api.endpoint", "not a url").is_err());
        assert!(validate_url("evaluation.job_description_url", "file:///tmp/jd.txt").is_err());
    }

    #[test]
    fn test_validate_data_file() {
        assert!(validate_data_file("run.sheet", "data/companies.csv", &["csv"]).is_ok());
        assert!(validate_data_file("run.sheet", "COMPANIES.CSV", &["csv"]).is_ok());
        assert!(validate_data_file("run.sheet", "companies.xlsx", &["csv"]).is_err());
        assert!(validate_data_file("run.sheet", "companies", &["csv"]).is_err());
        assert!(validate_data_file("log.path", " ", &["csv"]).is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("evaluation.criteria", 3, 1, 3).is_ok());
        assert!(validate_range("evaluation.criteria", 4, 1, 3).is_err());
        assert!(validate_range("run.max_rows_per_run", 0, 1, usize::MAX).is_err());
    }

    #[test]
    fn test_validate_non_empty() {
        assert!(validate_non_empty("api.model", "gemini-1.5-flash").is_ok());
        assert!(validate_non_empty("api.model", "  ").is_err());
    }
}
