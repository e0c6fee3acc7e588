//! Turn caps and deadline guardrails for a discussion run.
//!
//! The soft cap is pushed forward by a fixed extension whenever the
//! discussion gets within one turn of it without a stop consensus, but never
//! past the hard cap. The hard cap and the scene deadline are absolute.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::DiscussionConfig;

/// Outcome of a guardrail check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuardDecision {
    /// Keep going.
    Continue,
    /// Soft cap moved forward.
    Extended { soft_max_turns: u32 },
    /// Hard cap reached; force agreement.
    HardCapReached { turns: u32 },
    /// Scene deadline passed.
    DeadlineExceeded { elapsed_ms: u64 },
}

impl GuardDecision {
    /// Whether the discussion must stop.
    pub fn should_stop(&self) -> bool {
        matches!(
            self,
            Self::HardCapReached { .. } | Self::DeadlineExceeded { .. }
        )
    }
}

impl std::fmt::Display for GuardDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Continue => write!(f, "continue"),
            Self::Extended { soft_max_turns } => write!(f, "extended ({})", soft_max_turns),
            Self::HardCapReached { turns } => write!(f, "hard_cap_reached ({})", turns),
            Self::DeadlineExceeded { elapsed_ms } => {
                write!(f, "deadline_exceeded ({}ms)", elapsed_ms)
            }
        }
    }
}

/// Mutable turn-cap state for one discussion run.
#[derive(Debug, Clone)]
pub struct TurnGuard {
    soft_max_turns: u32,
    hard_max_turns: u32,
    extension: u32,
    extensions: u32,
    started: Instant,
    deadline: Option<Instant>,
}

impl TurnGuard {
    /// Create a guard. The soft cap is clamped to the hard cap.
    pub fn new(config: &DiscussionConfig, deadline: Option<Instant>) -> Self {
        Self {
            soft_max_turns: config.soft_max_turns.min(config.hard_max_turns),
            hard_max_turns: config.hard_max_turns,
            extension: config.extension.max(1),
            extensions: 0,
            started: Instant::now(),
            deadline,
        }
    }

    pub fn soft_max_turns(&self) -> u32 {
        self.soft_max_turns
    }

    pub fn hard_max_turns(&self) -> u32 {
        self.hard_max_turns
    }

    pub fn extensions(&self) -> u32 {
        self.extensions
    }

    /// Loop condition: below the soft cap and no agreement yet.
    pub fn allows_turn(&self, turn: u32, agreement: bool) -> bool {
        !agreement && turn < self.soft_max_turns
    }

    /// Check the deadline before starting a turn.
    pub fn before_turn(&self) -> GuardDecision {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => GuardDecision::DeadlineExceeded {
                elapsed_ms: self.started.elapsed().as_millis() as u64,
            },
            _ => GuardDecision::Continue,
        }
    }

    /// Apply the hard cap and soft extension after `turn` turns.
    pub fn after_turn(&mut self, turn: u32, agreement: bool) -> GuardDecision {
        if turn >= self.hard_max_turns {
            return GuardDecision::HardCapReached { turns: turn };
        }
        if !agreement
            && turn + 1 >= self.soft_max_turns
            && self.soft_max_turns < self.hard_max_turns
        {
            self.soft_max_turns = (self.soft_max_turns + self.extension).min(self.hard_max_turns);
            self.extensions += 1;
            return GuardDecision::Extended {
                soft_max_turns: self.soft_max_turns,
            };
        }
        GuardDecision::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(soft: u32, hard: u32) -> DiscussionConfig {
        DiscussionConfig {
            soft_max_turns: soft,
            hard_max_turns: hard,
            ..DiscussionConfig::default()
        }
    }

    /// Drive the guard with no agreement and return the turn it stopped at.
    fn run_without_agreement(guard: &mut TurnGuard) -> (u32, GuardDecision) {
        let mut turn = 0;
        let mut last = GuardDecision::Continue;
        while guard.allows_turn(turn, false) {
            turn += 1;
            last = guard.after_turn(turn, false);
            if last.should_stop() {
                break;
            }
        }
        (turn, last)
    }

    #[test]
    fn test_extension_one_turn_before_soft_cap() {
        let mut guard = TurnGuard::new(&config(40, 45), None);
        assert_eq!(guard.after_turn(38, false), GuardDecision::Continue);
        assert_eq!(
            guard.after_turn(39, false),
            GuardDecision::Extended { soft_max_turns: 45 }
        );
        assert_eq!(guard.extensions(), 1);
    }

    #[test]
    fn test_no_extension_when_agreed() {
        let mut guard = TurnGuard::new(&config(5, 20), None);
        assert_eq!(guard.after_turn(4, true), GuardDecision::Continue);
        assert_eq!(guard.soft_max_turns(), 5);
    }

    #[test]
    fn test_runs_to_hard_cap_without_agreement() {
        let mut guard = TurnGuard::new(&config(40, 45), None);
        let (turn, last) = run_without_agreement(&mut guard);
        assert_eq!(turn, 45);
        assert_eq!(last, GuardDecision::HardCapReached { turns: 45 });
    }

    #[test]
    fn test_multiple_extensions() {
        let mut guard = TurnGuard::new(&config(5, 30), None);
        let (turn, _) = run_without_agreement(&mut guard);
        assert_eq!(turn, 30);
        assert_eq!(guard.extensions(), 3);
        assert_eq!(guard.soft_max_turns(), 30);
    }

    #[test]
    fn test_soft_equals_hard() {
        let mut guard = TurnGuard::new(&config(3, 3), None);
        let (turn, last) = run_without_agreement(&mut guard);
        assert_eq!(turn, 3);
        assert!(matches!(last, GuardDecision::HardCapReached { .. }));
        assert_eq!(guard.extensions(), 0);
    }

    #[test]
    fn test_soft_clamped_to_hard() {
        let guard = TurnGuard::new(&config(50, 10), None);
        assert_eq!(guard.soft_max_turns(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline() {
        let guard = TurnGuard::new(
            &config(40, 45),
            Some(Instant::now() + Duration::from_secs(10)),
        );
        assert_eq!(guard.before_turn(), GuardDecision::Continue);
        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(guard.before_turn().should_stop());
    }

    #[test]
    fn test_decision_display() {
        assert_eq!(GuardDecision::Continue.to_string(), "continue");
        assert_eq!(
            GuardDecision::HardCapReached { turns: 45 }.to_string(),
            "hard_cap_reached (45)"
        );
    }
}
