use crate::domain::model::{ModelReply, ModelRequest};
use crate::domain::ports::GenerativeApi;
use crate::utils::error::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    model: &'a str,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Tools>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

/// Deterministic sampling: the parser relies on the model sticking to the format.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
}

#[derive(Debug, Serialize)]
struct Tools {
    google_search_retrieval: serde_json::Value,
}

/// HTTP transport for the Gemini `generateContent` endpoint.
pub struct GeminiApi {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
    search_grounding: bool,
}

impl GeminiApi {
    pub fn new(endpoint: String, model: String, api_key: String) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            model,
            api_key,
            search_grounding: false,
        }
    }

    pub fn with_search_grounding(mut self, enabled: bool) -> Self {
        self.search_grounding = enabled;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    fn url(&self) -> String {
        format!(
            "{}/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        )
    }
}

#[async_trait]
impl GenerativeApi for GeminiApi {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelReply> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: &request.prompt_text,
                }],
            }],
            model: &self.model,
            generation_config: GenerationConfig {
                temperature: 0.0,
                top_k: 1,
                top_p: 1.0,
            },
            tools: self.search_grounding.then(|| Tools {
                google_search_retrieval: serde_json::json!({}),
            }),
        };

        tracing::debug!("Making API request to: {}", self.url());

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status_code = response.status().as_u16();
        let raw_text = response.text().await?;
        tracing::debug!("API response status: {}", status_code);

        Ok(ModelReply {
            status_code,
            raw_text,
        })
    }
}
