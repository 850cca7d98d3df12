use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::types::{ChatRequest, ChatResponse, WireMessage};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const RETRY_BASE: Duration = Duration::from_millis(500);

/// Server-side trouble and rate limiting are worth retrying; other client
/// errors (bad key, malformed request) will fail the same way every time.
fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Chat client for any OpenAI-compatible completions endpoint.
///
/// Every request runs under a timeout and a small fixed retry budget with
/// exponential backoff. Non-retryable statuses (auth failures, malformed
/// requests) fail immediately; after the budget is exhausted the error
/// propagates to the caller, which decides how to degrade.
#[derive(Clone)]
pub struct OpenAi {
    api_key: String,
    model: String,
    base_url: String,
    temperature: Option<f32>,
    max_retries: u32,
    timeout: Duration,
    http: reqwest::Client,
}

impl OpenAi {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: None,
            max_retries: 3,
            timeout: Duration::from_secs(60),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// One system + user exchange, returning the assistant text.
    pub async fn chat_completion(
        &self,
        system: impl Into<String>,
        user: impl Into<String>,
    ) -> Result<String> {
        let mut request = ChatRequest::new(&self.model)
            .message(WireMessage::system(system))
            .message(WireMessage::user(user));
        if let Some(t) = self.temperature {
            request = request.temperature(t);
        }

        let response = self.chat(&request).await?;
        response
            .text()
            .ok_or_else(|| anyhow!("Empty completion from {}", self.base_url))
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut attempt = 0u32;

        loop {
            debug!(model = %request.model, attempt, "Chat completion request");

            let send = self
                .http
                .post(&url)
                .headers(self.headers()?)
                .json(request)
                .send();

            let outcome: Result<ChatResponse> = match tokio::time::timeout(self.timeout, send).await {
                Err(_) => Err(anyhow!("Request timed out after {:?}", self.timeout)),
                Ok(Err(e)) => Err(anyhow!("Request failed: {e}")),
                Ok(Ok(response)) => {
                    let status = response.status();
                    if status.is_success() {
                        match response.json::<ChatResponse>().await {
                            Ok(parsed) => return Ok(parsed),
                            Err(e) => Err(anyhow!("Malformed completion body: {e}")),
                        }
                    } else {
                        let body = response.text().await.unwrap_or_default();
                        if is_retryable_status(status) {
                            Err(anyhow!("API error ({status}): {body}"))
                        } else {
                            // 401/403/400 and friends: retrying only burns
                            // the backoff budget.
                            return Err(anyhow!("API error ({status}): {body}"));
                        }
                    }
                }
            };

            let err = outcome.unwrap_err();
            if attempt >= self.max_retries {
                return Err(err);
            }
            let backoff = RETRY_BASE * 3u32.pow(attempt);
            warn!(attempt = attempt + 1, error = %err, "Chat completion failed, retrying");
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_new() {
        let ai = OpenAi::new("sk-test", "deepseek-ai/DeepSeek-V3");
        assert_eq!(ai.model(), "deepseek-ai/DeepSeek-V3");
        assert_eq!(ai.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_openai_builders() {
        let ai = OpenAi::new("sk-test", "m")
            .with_base_url("https://api.siliconflow.cn/v1")
            .with_temperature(0.1)
            .with_max_retries(1)
            .with_timeout(Duration::from_secs(5));
        assert_eq!(ai.base_url, "https://api.siliconflow.cn/v1");
        assert_eq!(ai.temperature, Some(0.1));
        assert_eq!(ai.max_retries, 1);
        assert_eq!(ai.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));

        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
        assert!(!is_retryable_status(StatusCode::FORBIDDEN));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
    }
}
