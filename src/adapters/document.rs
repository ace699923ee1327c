use crate::domain::ports::DocumentSource;
use crate::utils::error::{EnrichError, Result};
use crate::utils::validation::validate_url;
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use std::sync::LazyLock;

static GOOGLE_DOC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://docs\.google\.com/document/d/([A-Za-z0-9_-]+)").expect("valid regex")
});
static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<script.*?</script>|<style.*?</style>|<[^>]+>").expect("valid regex"));

/// Fetches job descriptions over HTTP. Google Docs links go through the plain-text export.
pub struct HttpDocumentSource {
    client: Client,
}

impl HttpDocumentSource {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for HttpDocumentSource {
    fn default() -> Self {
        Self::new()
    }
}

pub fn export_url(url: &str) -> String {
    match GOOGLE_DOC.captures(url) {
        Some(caps) => format!(
            "https://docs.google.com/document/d/{}/export?format=txt",
            &caps[1]
        ),
        None => url.to_string(),
    }
}

pub fn strip_html(html: &str) -> String {
    let text = HTML_TAG.replace_all(html, " ");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl DocumentSource for HttpDocumentSource {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        let invalid = |reason: String| EnrichError::DocumentError {
            url: url.to_string(),
            reason,
        };

        validate_url("evaluation.job_description_url", url).map_err(|e| invalid(e.to_string()))?;

        let target = export_url(url);
        tracing::debug!("📄 Fetching document from: {}", target);

        let response = self
            .client
            .get(&target)
            .send()
            .await
            .map_err(|e| invalid(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(invalid(format!("HTTP status {}", status.as_u16())));
        }

        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.contains("text/html"))
            .unwrap_or(false);

        let body = response.text().await.map_err(|e| invalid(e.to_string()))?;
        let text = if is_html { strip_html(&body) } else { body.trim().to_string() };

        if text.is_empty() {
            return Err(invalid("document is empty".to_string()));
        }

        Ok(text)
    }
}
