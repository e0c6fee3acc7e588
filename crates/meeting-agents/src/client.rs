//! Chat completions gateway over HTTP.
//!
//! Speaks the OpenAI and Azure OpenAI dialects. Status codes are mapped to
//! [`GatewayError`] so [`coordination::RetryingGateway`] can classify them:
//! 429 becomes `RateLimited` (with the `Retry-After` hint), other failures
//! become `Api`, and connect timeouts become `Timeout`.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use coordination::gateway::{CompletionRequest, GatewayError, LanguageModelGateway};
use regex::Regex;
use reqwest::header::RETRY_AFTER;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::{ApiStyle, LlmEndpoint};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

static THINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<think>.*?</think>").expect("THINK_RE regex should compile")
});

/// Remove reasoning traces and surrounding whitespace.
pub fn strip_reasoning(content: &str) -> String {
    THINK_RE.replace_all(content, "").trim().to_string()
}

pub struct OpenAiGateway {
    client: reqwest::Client,
    endpoint: LlmEndpoint,
}

impl OpenAiGateway {
    pub fn new(endpoint: LlmEndpoint) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self { client, endpoint })
    }

    pub fn chat_url(&self) -> String {
        let base = self.endpoint.url.trim_end_matches('/');
        match self.endpoint.api_style {
            ApiStyle::OpenAi => format!("{base}/chat/completions"),
            ApiStyle::Azure => format!(
                "{base}/openai/deployments/{}/chat/completions?api-version={}",
                self.endpoint.model, self.endpoint.api_version
            ),
        }
    }

    /// Request body. Sampling parameters are fixed for reproducible output.
    pub fn payload(&self, request: &CompletionRequest) -> Value {
        let mut body = json!({
            "messages": request.messages,
            "max_tokens": request.max_output_tokens,
            "n": 1,
            "temperature": 0,
            "top_p": 0.95,
            "frequency_penalty": 0.5,
            "presence_penalty": 0.5,
        });
        if self.endpoint.api_style == ApiStyle::OpenAi {
            body["model"] = json!(self.endpoint.model);
        }
        if let Some(schema) = &request.schema {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": { "name": schema.name, "schema": schema.schema },
            });
        }
        body
    }

    fn map_send_error(e: reqwest::Error) -> GatewayError {
        classify_send_error(e.is_connect(), e.is_timeout(), e.to_string())
    }
}

/// Only the connect phase has a client-side limit; the per-call budget is
/// enforced by [`coordination::RetryingGateway`].
fn classify_send_error(is_connect: bool, is_timeout: bool, message: String) -> GatewayError {
    if is_connect && is_timeout {
        GatewayError::Timeout {
            after: CONNECT_TIMEOUT,
        }
    } else {
        GatewayError::Transport(message)
    }
}

/// Delay hint in seconds. Values a `Duration` cannot hold are ignored.
fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    let secs = value.trim().parse::<f64>().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

/// Text of the first choice's message.
fn first_choice_content(data: &Value) -> Result<&str, GatewayError> {
    data.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(|content| content.as_str())
        .ok_or_else(|| GatewayError::InvalidResponse("No message content in response".into()))
}

#[async_trait]
impl LanguageModelGateway for OpenAiGateway {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError> {
        let mut builder = self.client.post(self.chat_url()).json(&self.payload(request));
        if let Some(key) = &self.endpoint.api_key {
            builder = match self.endpoint.api_style {
                ApiStyle::OpenAi => builder.bearer_auth(key),
                ApiStyle::Azure => builder.header("api-key", key),
            };
        }

        let response = builder.send().await.map_err(Self::map_send_error)?;
        let status = response.status();
        if status.as_u16() == 429 {
            return Err(GatewayError::RateLimited {
                retry_after: retry_after(response.headers()),
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        let content = first_choice_content(&data)?;
        debug!(
            purpose = %request.purpose,
            chars = content.len(),
            "Completion received"
        );
        Ok(if self.endpoint.strip_reasoning {
            strip_reasoning(content)
        } else {
            content.to_string()
        })
    }

    fn model_name(&self) -> &str {
        &self.endpoint.model
    }
}
