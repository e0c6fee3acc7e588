//! Language model gateway
//!
//! The single seam through which the discussion, agreement, and acceptance
//! layers reach a model. Implementations are stateless request/response
//! adapters; retry and timeout behavior is layered on with
//! [`RetryingGateway`].
//!
//! # Modules
//!
//! - [`retry`]: backoff-with-jitter decorator and its policy
//! - [`scripted`]: deterministic in-memory gateway for tests and dry runs

pub mod retry;
pub mod scripted;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{CoordinationError, CoordinationResult};
use crate::extract::{self, Validate};

pub use retry::{RetryPolicy, RetryingGateway};
pub use scripted::ScriptedGateway;

/// What a completion call is for. Carried on every request so gateways can
/// route, log, and (in tests) script responses per call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallPurpose {
    StartingAgent,
    SocialRoles,
    Turn,
    StopVote,
    SummaryVote,
    SceneCheck,
    SpecialEffects,
    Refine,
    DetectAi,
    Humanize,
    Tldr,
    MeetingSummary,
}

impl std::fmt::Display for CallPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StartingAgent => write!(f, "starting_agent"),
            Self::SocialRoles => write!(f, "social_roles"),
            Self::Turn => write!(f, "turn"),
            Self::StopVote => write!(f, "stop_vote"),
            Self::SummaryVote => write!(f, "summary_vote"),
            Self::SceneCheck => write!(f, "scene_check"),
            Self::SpecialEffects => write!(f, "special_effects"),
            Self::Refine => write!(f, "refine"),
            Self::DetectAi => write!(f, "detect_ai"),
            Self::Humanize => write!(f, "humanize"),
            Self::Tldr => write!(f, "tldr"),
            Self::MeetingSummary => write!(f, "meeting_summary"),
        }
    }
}

/// Chat message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One message in a completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// JSON schema the response must satisfy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSchema {
    /// Schema name sent to providers that support named schemas.
    pub name: String,
    /// The JSON schema document.
    pub schema: serde_json::Value,
}

impl ResponseSchema {
    /// Derive a schema from a `JsonSchema` type.
    pub fn for_type<T: JsonSchema>(name: &str) -> Self {
        let root = schemars::schema_for!(T);
        Self {
            name: name.to_string(),
            schema: serde_json::to_value(root).unwrap_or_default(),
        }
    }
}

/// A single completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Call site this request belongs to.
    pub purpose: CallPurpose,
    /// Conversation to complete.
    pub messages: Vec<ChatMessage>,
    /// Upper bound on generated tokens.
    pub max_output_tokens: u32,
    /// Structured-output schema, when the caller expects JSON of a known shape.
    pub schema: Option<ResponseSchema>,
}

impl CompletionRequest {
    pub fn new(purpose: CallPurpose, max_output_tokens: u32) -> Self {
        Self {
            purpose,
            messages: Vec::new(),
            max_output_tokens,
            schema: None,
        }
    }

    pub fn system(mut self, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::system(content));
        self
    }

    pub fn user(mut self, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::user(content));
        self
    }

    pub fn with_schema(mut self, schema: ResponseSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// All message contents joined, for logging and test assertions.
    pub fn transcript(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// How the retry layer should treat a gateway error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryCategory {
    /// Provider throttling; back off exponentially.
    RateLimit,
    /// Timeouts; back off exponentially.
    Transient,
    /// Anything else; do not retry.
    Fatal,
}

impl std::fmt::Display for RetryCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Transient => write!(f, "transient"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// Errors from gateway calls.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// No answer within `after`: the per-call budget, or a transport's
    /// connect limit.
    #[error("Request timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Retries exhausted after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<GatewayError>,
    },
}

impl GatewayError {
    pub fn retry_category(&self) -> RetryCategory {
        match self {
            Self::RateLimited { .. } => RetryCategory::RateLimit,
            Self::Timeout { .. } => RetryCategory::Transient,
            _ => RetryCategory::Fatal,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.retry_category() != RetryCategory::Fatal
    }
}

/// Stateless request/response interface to a language model.
#[async_trait]
pub trait LanguageModelGateway: Send + Sync {
    /// Complete one request, returning the raw response text.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError>;

    /// Model identifier for logs.
    fn model_name(&self) -> &str {
        "unknown"
    }
}

#[async_trait]
impl<G: LanguageModelGateway + ?Sized> LanguageModelGateway for Arc<G> {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError> {
        (**self).complete(request).await
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

/// Complete a request whose response must deserialize into `T` and pass
/// `T`'s own validation. The schema is derived from `T` and attached to the
/// request; any extraction, parse, or validation failure is reported as
/// [`CoordinationError::MalformedResponse`].
pub async fn complete_structured<T>(
    gateway: &dyn LanguageModelGateway,
    request: CompletionRequest,
    schema_name: &str,
) -> CoordinationResult<T>
where
    T: DeserializeOwned + JsonSchema + Validate,
{
    let request = request.with_schema(ResponseSchema::for_type::<T>(schema_name));
    let raw = gateway.complete(&request).await?;
    let value: T = extract::parse_json(&raw)
        .map_err(|e| CoordinationError::malformed(request.purpose.to_string(), e.to_string()))?;
    value
        .validate()
        .map_err(|detail| CoordinationError::malformed(request.purpose.to_string(), detail))?;
    Ok(value)
}
