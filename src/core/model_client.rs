use crate::domain::model::{ModelReply, ModelRequest};
use crate::domain::ports::{GenerativeApi, LogEntry, LogLevel, LogSink};
use crate::utils::error::{EnrichError, Result};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(2000);

/// Sends prompts with bounded retries and linear backoff (`base_delay * attempt`).
///
/// Every attempt, successful or not, is journaled with the prompt, the raw
/// response and what the client concluded from it.
pub struct ModelClient<A: GenerativeApi> {
    api: A,
    log: Arc<dyn LogSink>,
    max_attempts: u32,
    base_delay: Duration,
}

impl<A: GenerativeApi> ModelClient<A> {
    pub fn new(api: A, log: Arc<dyn LogSink>) -> Self {
        Self {
            api,
            log,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }

    pub fn with_retry(mut self, max_attempts: u32, base_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.base_delay = base_delay;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub async fn send(&self, prompt_text: &str) -> Result<ModelReply> {
        let request = ModelRequest {
            prompt_text: prompt_text.to_string(),
        };

        for attempt in 1..=self.max_attempts {
            let is_final = attempt == self.max_attempts;

            let (response_text, error) = match self.api.generate(&request).await {
                Ok(reply) if reply.is_success() => {
                    // 回應必須是 JSON，否則視為本次嘗試失敗
                    match serde_json::from_str::<serde_json::Value>(&reply.raw_text) {
                        Ok(_) => {
                            self.journal(
                                LogLevel::Info,
                                format!("API response received on attempt {}", attempt),
                                &request,
                                &reply.raw_text,
                                "success".to_string(),
                            );
                            return Ok(reply);
                        }
                        Err(e) => (reply.raw_text, EnrichError::SerializationError(e)),
                    }
                }
                Ok(reply) if reply.status_code == 429 => {
                    let error = if is_final {
                        EnrichError::RateLimitExhausted { attempts: attempt }
                    } else {
                        EnrichError::ApiError {
                            status: 429,
                            body: reply.raw_text.clone(),
                        }
                    };
                    (reply.raw_text, error)
                }
                Ok(reply) => {
                    let error = EnrichError::ApiError {
                        status: reply.status_code,
                        body: reply.raw_text.clone(),
                    };
                    (reply.raw_text, error)
                }
                Err(e) => (String::new(), e),
            };

            if is_final {
                self.journal(
                    LogLevel::Error,
                    format!("Attempt {} failed, giving up", attempt),
                    &request,
                    &response_text,
                    format!("failed: {}", error),
                );
                return Err(error);
            }

            let delay = self.base_delay * attempt;
            let message = match &error {
                EnrichError::ApiError { status: 429, .. } => {
                    format!("Rate limit hit on attempt {}", attempt)
                }
                other => format!("Attempt {} failed: {}", attempt, other),
            };
            self.journal(
                LogLevel::Warning,
                message,
                &request,
                &response_text,
                format!("retrying in {}ms", delay.as_millis()),
            );
            tokio::time::sleep(delay).await;
        }

        Err(EnrichError::RateLimitExhausted {
            attempts: self.max_attempts,
        })
    }

    fn journal(
        &self,
        level: LogLevel,
        message: String,
        request: &ModelRequest,
        response_text: &str,
        conclusion: String,
    ) {
        let details = format!("{} attempt(s) allowed", self.max_attempts);
        self.log.append(
            LogEntry::new(level, message, details).with_exchange(
                request.prompt_text.clone(),
                response_text,
                conclusion,
            ),
        );
    }
}
