//! Text-generation provider used for entity suggestions.

use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::warn;

const CLAUDE_API_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone, Error)]
pub enum AiProviderError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("rate limited")]
    RateLimited,
    #[error("invalid api key")]
    InvalidApiKey,
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("missing api key: ANTHROPIC_API_KEY environment variable not set")]
    MissingApiKey,
}

impl AiProviderError {
    /// Transient failures worth another attempt.
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout | Self::RateLimited => true,
            Self::Http { status, .. } => (500..=599).contains(status),
            _ => false,
        }
    }
}

/// `(prompt) -> text`. Implementations may fail or return anything.
#[async_trait]
pub trait AiProvider: Send + Sync {
    async fn complete(&self, prompt: &str, system: Option<&str>) -> Result<String, AiProviderError>;
}

/// Sends `prompt` and deserializes the JSON found in the reply.
pub async fn ask_json<T: DeserializeOwned>(
    provider: &dyn AiProvider,
    prompt: &str,
    system: Option<&str>,
) -> Result<T, AiProviderError> {
    let response = provider.complete(prompt, system).await?;
    if response.trim().is_empty() {
        return Err(AiProviderError::Malformed("empty response".to_string()));
    }

    let json_str = extract_json(&response);
    serde_json::from_str(json_str).map_err(|e| {
        let preview = json_str.chars().take(200).collect::<String>();
        warn!(
            json_error = %e,
            response_length = response.len(),
            preview = %preview,
            "Failed to parse JSON from provider response"
        );
        AiProviderError::Malformed(format!("{e} (response preview: {preview})"))
    })
}

#[derive(Debug, Serialize)]
struct MessageParam<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<MessageParam<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

impl MessagesResponse {
    fn into_text(self) -> Option<String> {
        self.content.into_iter().find_map(|block| match block {
            ContentBlock::Text { text } => Some(text),
            ContentBlock::Other => None,
        })
    }
}

/// [`AiProvider`] over the Anthropic messages API.
#[derive(Debug, Clone)]
pub struct ClaudeProvider {
    http: Client,
    api_key: String,
    model: String,
}

impl ClaudeProvider {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

    /// Reads `ANTHROPIC_API_KEY` and optionally `ANTHROPIC_MODEL`.
    pub fn from_env() -> Result<Self, AiProviderError> {
        let api_key =
            std::env::var("ANTHROPIC_API_KEY").map_err(|_| AiProviderError::MissingApiKey)?;
        Self::new(api_key, std::env::var("ANTHROPIC_MODEL").ok())
    }

    pub fn new(api_key: String, model: Option<String>) -> Result<Self, AiProviderError> {
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("entity-codegen/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AiProviderError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }

    async fn send(&self, request: &MessagesRequest<'_>) -> Result<String, AiProviderError> {
        let res = self
            .http
            .post(CLAUDE_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        match res.status() {
            s if s.is_success() => res
                .json::<MessagesResponse>()
                .await
                .map_err(|e| AiProviderError::Malformed(e.to_string()))?
                .into_text()
                .ok_or_else(|| AiProviderError::Malformed("no text content".to_string())),
            StatusCode::UNAUTHORIZED => Err(AiProviderError::InvalidApiKey),
            StatusCode::TOO_MANY_REQUESTS => Err(AiProviderError::RateLimited),
            s => {
                let status = s.as_u16();
                let body = res.text().await.unwrap_or_default();
                Err(AiProviderError::Http { status, body })
            }
        }
    }
}

#[async_trait]
impl AiProvider for ClaudeProvider {
    async fn complete(&self, prompt: &str, system: Option<&str>) -> Result<String, AiProviderError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: DEFAULT_MAX_TOKENS,
            messages: vec![MessageParam {
                role: "user",
                content: prompt,
            }],
            system,
        };

        (|| async { self.send(&request).await })
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_secs(1))
                    .with_max_delay(Duration::from_secs(30))
                    .with_max_times(3)
                    .with_jitter(),
            )
            .when(|e: &AiProviderError| e.should_retry())
            .notify(|e, dur| {
                warn!(
                    "Provider call failed, retrying after {:.2}s: {}",
                    dur.as_secs_f64(),
                    e
                )
            })
            .await
    }
}

fn map_reqwest_error(e: reqwest::Error) -> AiProviderError {
    if e.is_timeout() {
        AiProviderError::Timeout
    } else {
        AiProviderError::Transport(e.to_string())
    }
}

/// The JSON payload of a reply that may wrap it in a fenced code block.
pub fn extract_json(text: &str) -> &str {
    let text = text.trim();

    if let Some(start) = text.find("```json") {
        let content_start = start + "```json".len();
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    if let Some(start) = text.find("```") {
        let after_fence = start + 3;
        // Skip a language tag on the fence line.
        let content_start = text[after_fence..]
            .find('\n')
            .map_or(after_fence, |i| after_fence + i + 1);
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedProvider(Result<String, AiProviderError>);

    #[async_trait]
    impl AiProvider for CannedProvider {
        async fn complete(&self, _: &str, _: Option<&str>) -> Result<String, AiProviderError> {
            self.0.clone()
        }
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Payload {
        key: String,
    }

    #[test]
    fn test_extract_json_plain() {
        assert_eq!(extract_json(r#" {"key": "value"} "#), r#"{"key": "value"}"#);
    }

    #[test]
    fn test_extract_json_code_block() {
        let input = "Here you go:\n```json\n{\"key\": \"value\"}\n```\nThanks";
        assert_eq!(extract_json(input), r#"{"key": "value"}"#);
    }

    #[test]
    fn test_extract_json_generic_code_block() {
        let input = "```javascript\n{\"key\": \"value\"}\n```";
        assert_eq!(extract_json(input), r#"{"key": "value"}"#);
    }

    #[test]
    fn test_retry_classification() {
        assert!(AiProviderError::Timeout.should_retry());
        assert!(AiProviderError::Http { status: 503, body: String::new() }.should_retry());
        assert!(!AiProviderError::Http { status: 400, body: String::new() }.should_retry());
        assert!(!AiProviderError::Malformed("x".to_string()).should_retry());
    }

    #[tokio::test]
    async fn test_ask_json() {
        let ok = CannedProvider(Ok("```json\n{\"key\": \"v\"}\n```".to_string()));
        let payload: Payload = ask_json(&ok, "prompt", None).await.unwrap();
        assert_eq!(payload, Payload { key: "v".to_string() });

        let garbage = CannedProvider(Ok("I cannot help with that".to_string()));
        let err = ask_json::<Payload>(&garbage, "prompt", None).await.unwrap_err();
        assert!(matches!(err, AiProviderError::Malformed(_)));

        let empty = CannedProvider(Ok("   ".to_string()));
        assert!(ask_json::<Payload>(&empty, "prompt", None).await.is_err());
    }
}
