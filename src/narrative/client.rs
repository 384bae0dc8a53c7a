//! LLM collaborator: submit a prompt, get text back. Only rate-limit failures are retried.

use crate::config::LlmConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected response: {0}")]
    Response(String),

    #[error("not configured: {0}")]
    NotConfigured(String),
}

impl LlmError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, LlmError::RateLimited(_))
    }
}

pub trait LlmClient: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Exponential backoff applied to rate-limited calls only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_backoff_ms),
        }
    }

    /// Delay before retry number `attempt` (1-based): base × 2^(attempt-1).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor)
    }

    pub fn call(&self, client: &dyn LlmClient, prompt: &str) -> Result<String, LlmError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match client.generate(prompt) {
                Ok(text) => return Ok(text),
                Err(e) if e.is_rate_limit() && attempt < self.max_attempts => {
                    let wait = self.delay(attempt);
                    warn!(attempt, wait_ms = wait.as_millis() as u64, error = %e, "llm rate limited; backing off");
                    std::thread::sleep(wait);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&LlmConfig::default())
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// 429, 503 and quota bodies are transient; anything else is terminal.
fn classify_failure(status: reqwest::StatusCode, body: &str) -> LlmError {
    let detail = format!("{} {}", status, body);
    let transient = status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::SERVICE_UNAVAILABLE
        || body.contains("RESOURCE_EXHAUSTED");
    if transient {
        LlmError::RateLimited(detail)
    } else {
        LlmError::Request(detail)
    }
}

/// Blocking client for a Gemini-style `models/{model}:generateContent` endpoint.
pub struct GeminiClient {
    client: reqwest::blocking::Client,
    url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config.resolve_api_key().ok_or_else(|| {
            LlmError::NotConfigured(format!(
                "no API key (set llm.api_key or {})",
                config.api_key_env
            ))
        })?;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| LlmError::NotConfigured(e.to_string()))?;
        let url = format!(
            "{}/models/{}:generateContent",
            config.endpoint.trim_end_matches('/'),
            config.model
        );
        Ok(Self {
            client,
            url,
            api_key,
        })
    }
}

impl LlmClient for GeminiClient {
    fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };
        let res = self
            .client
            .post(&self.url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().unwrap_or_default();
            return Err(classify_failure(status, &text));
        }

        let parsed: GenerateResponse = res
            .json()
            .map_err(|e| LlmError::Response(e.to_string()))?;
        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(LlmError::Response("no candidate text".into()));
        }
        debug!(chars = text.len(), "llm response received");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        calls: AtomicU32,
        fail_first: u32,
        error: LlmError,
    }

    impl LlmClient for Flaky {
        fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.fail_first {
                Err(self.error.clone())
            } else {
                Ok("{}".into())
            }
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn retries_rate_limits_until_success() {
        let c = Flaky {
            calls: AtomicU32::new(0),
            fail_first: 2,
            error: LlmError::RateLimited("429".into()),
        };
        assert!(policy(4).call(&c, "p").is_ok());
        assert_eq!(c.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn gives_up_after_bounded_attempts() {
        let c = Flaky {
            calls: AtomicU32::new(0),
            fail_first: 10,
            error: LlmError::RateLimited("429".into()),
        };
        assert!(policy(3).call(&c, "p").unwrap_err().is_rate_limit());
        assert_eq!(c.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn other_errors_are_terminal() {
        let c = Flaky {
            calls: AtomicU32::new(0),
            fail_first: 10,
            error: LlmError::Request("500".into()),
        };
        assert!(policy(5).call(&c, "p").is_err());
        assert_eq!(c.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delay_doubles() {
        let p = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
        };
        assert_eq!(p.delay(1), Duration::from_millis(500));
        assert_eq!(p.delay(3), Duration::from_millis(2000));
    }

    #[test]
    fn overload_and_quota_responses_are_retryable() {
        use reqwest::StatusCode;
        assert!(classify_failure(StatusCode::TOO_MANY_REQUESTS, "").is_rate_limit());
        assert!(classify_failure(StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE").is_rate_limit());
        assert!(classify_failure(StatusCode::BAD_REQUEST, "RESOURCE_EXHAUSTED").is_rate_limit());
        assert!(!classify_failure(StatusCode::INTERNAL_SERVER_ERROR, "boom").is_rate_limit());
        assert!(!classify_failure(StatusCode::UNAUTHORIZED, "").is_rate_limit());
    }

    #[test]
    fn missing_key_is_not_configured() {
        let config = LlmConfig {
            api_key: None,
            api_key_env: "TXN_SENTINEL_TEST_UNSET_KEY".into(),
            ..LlmConfig::default()
        };
        assert!(matches!(
            GeminiClient::new(&config),
            Err(LlmError::NotConfigured(_))
        ));
    }
}
