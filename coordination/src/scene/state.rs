//! Scene acceptance state machine: phases, transitions, and session tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Phase of one scene's acceptance loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AcceptancePhase {
    /// A discussion run is producing a fresh draft.
    Generating,
    /// The critic is judging the draft.
    Evaluating,
    /// Critic accepted the draft.
    Accepted,
    /// Critic rejected the draft, or the attempt failed.
    Rejected,
    /// Rejection budget spent; the latest draft is used as is.
    ForcedAccept,
}

impl AcceptancePhase {
    /// Whether this is a terminal phase.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Accepted | Self::ForcedAccept)
    }

    /// Valid transitions from this phase.
    pub fn valid_transitions(self) -> &'static [AcceptancePhase] {
        match self {
            Self::Generating => &[Self::Evaluating, Self::Rejected, Self::ForcedAccept],
            Self::Evaluating => &[Self::Accepted, Self::Rejected],
            Self::Rejected => &[Self::Generating, Self::ForcedAccept],
            Self::Accepted | Self::ForcedAccept => &[],
        }
    }
}

impl std::fmt::Display for AcceptancePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Generating => write!(f, "generating"),
            Self::Evaluating => write!(f, "evaluating"),
            Self::Accepted => write!(f, "accepted"),
            Self::Rejected => write!(f, "rejected"),
            Self::ForcedAccept => write!(f, "forced_accept"),
        }
    }
}

/// A phase transition record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceTransition {
    pub from: AcceptancePhase,
    pub to: AcceptancePhase,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Error for invalid state transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition {from} -> {to}: {reason}")]
pub struct TransitionError {
    pub from: AcceptancePhase,
    pub to: AcceptancePhase,
    pub reason: String,
}

/// Acceptance bookkeeping for one scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneSession {
    pub scene_index: usize,
    pub phase: AcceptancePhase,
    /// Rejections so far.
    pub attempt: u32,
    pub max_rejections: u32,
    /// Generator invocations so far.
    pub generations: u32,
    pub transitions: Vec<AcceptanceTransition>,
    pub created_at: DateTime<Utc>,
}

impl SceneSession {
    /// A session in `Generating` with no rejections.
    pub fn new(scene_index: usize, max_rejections: u32) -> Self {
        Self {
            scene_index,
            phase: AcceptancePhase::Generating,
            attempt: 0,
            max_rejections,
            generations: 1,
            transitions: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Move to `to`, recording why. Entering `Rejected` counts a rejection;
    /// entering `Generating` counts a generator call.
    pub fn transition(&mut self, to: AcceptancePhase, reason: &str) -> Result<(), TransitionError> {
        if !self.phase.valid_transitions().contains(&to) {
            return Err(TransitionError {
                from: self.phase,
                to,
                reason: format!(
                    "not a valid transition (allowed: {:?})",
                    self.phase.valid_transitions()
                ),
            });
        }
        self.transitions.push(AcceptanceTransition {
            from: self.phase,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.phase = to;
        match to {
            AcceptancePhase::Rejected => self.attempt += 1,
            AcceptancePhase::Generating => self.generations += 1,
            _ => {}
        }
        Ok(())
    }

    /// Whether another regeneration is allowed.
    pub fn can_retry(&self) -> bool {
        self.attempt < self.max_rejections
    }

    pub fn is_complete(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn status_line(&self) -> String {
        format!(
            "[{}] scene {} | rejections {}/{} | generations {}",
            self.phase, self.scene_index, self.attempt, self.max_rejections, self.generations
        )
    }
}
