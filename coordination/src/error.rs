//! Coordination error taxonomy.
//!
//! Every failure that crosses a component boundary is one of these variants.
//! Callers ask [`CoordinationError::is_attempt_recoverable`] instead of
//! matching on strings.
//!
//! | Variant               | Scope of the failure                    |
//! |-----------------------|-----------------------------------------|
//! | Gateway               | whole meeting (provider retries spent)  |
//! | MalformedResponse     | current scene attempt                   |
//! | InvalidVote           | current scene attempt                   |
//! | SceneDeadlineExceeded | whole meeting                           |
//! | Sink                  | whole meeting (persistence failed)      |
//! | everything else       | whole meeting (caller or setup error)   |

use thiserror::Error;

use crate::gateway::GatewayError;
use crate::memory::MemoryError;
use crate::persona::PersonaError;
use crate::scene::TransitionError;

/// Unified error type for the discussion, agreement, and acceptance layers.
#[derive(Debug, Error)]
pub enum CoordinationError {
    /// The gateway gave up on a call (retries exhausted or a fatal status).
    #[error("Gateway failure: {0}")]
    Gateway(#[from] GatewayError),

    /// Model output could not be parsed into the expected shape.
    #[error("Malformed {context} response: {detail}")]
    MalformedResponse { context: String, detail: String },

    /// An agent's index vote could not be parsed or fell outside the candidates.
    #[error("Invalid vote from {agent}: {raw:?}")]
    InvalidVote { agent: String, raw: String },

    /// A configuration value violates a documented constraint.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Persona(#[from] PersonaError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// The per-scene deadline passed before any draft was produced.
    #[error("Scene {scene} exceeded its deadline before producing a draft")]
    SceneDeadlineExceeded { scene: usize },

    #[error("Meeting has no scene descriptions")]
    NoSceneDescriptions,

    /// A scene sink could not record a scene or rejection.
    #[error("Scene sink failed: {0}")]
    Sink(String),
}

impl CoordinationError {
    /// Build a [`CoordinationError::MalformedResponse`].
    pub fn malformed(context: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::MalformedResponse {
            context: context.into(),
            detail: detail.into(),
        }
    }

    /// Whether the scene acceptance loop may absorb this error by
    /// regenerating the scene.
    pub fn is_attempt_recoverable(&self) -> bool {
        matches!(
            self,
            Self::MalformedResponse { .. } | Self::InvalidVote { .. }
        )
    }
}

/// Result alias for coordination operations.
pub type CoordinationResult<T> = Result<T, CoordinationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_is_recoverable() {
        let err = CoordinationError::malformed("turn", "missing field `turn`");
        assert!(err.is_attempt_recoverable());
        assert!(err.to_string().contains("Malformed turn response"));
    }

    #[test]
    fn test_invalid_vote_is_recoverable() {
        let err = CoordinationError::InvalidVote {
            agent: "Historian".into(),
            raw: "the second one".into(),
        };
        assert!(err.is_attempt_recoverable());
    }

    #[test]
    fn test_gateway_failure_is_not_recoverable() {
        let err: CoordinationError = GatewayError::Exhausted {
            attempts: 6,
            last: Box::new(GatewayError::RateLimited { retry_after: None }),
        }
        .into();
        assert!(!err.is_attempt_recoverable());
    }

    #[test]
    fn test_deadline_is_not_recoverable() {
        let err = CoordinationError::SceneDeadlineExceeded { scene: 2 };
        assert!(!err.is_attempt_recoverable());
        assert_eq!(
            err.to_string(),
            "Scene 2 exceeded its deadline before producing a draft"
        );
    }
}
