//! Protocol configuration.
//!
//! Every knob the discussion, voting, and acceptance layers read. All
//! sections default sensibly and can be partially overridden from TOML.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoordinationError;

/// Turn caps and time bounds for one discussion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscussionConfig {
    /// Initial soft cap; extended while no stop consensus exists.
    pub soft_max_turns: u32,
    /// Absolute cap on turns in one scene.
    pub hard_max_turns: u32,
    /// Turns added to the soft cap per extension.
    pub extension: u32,
    /// Wall-clock budget for a whole scene (all attempts).
    pub scene_deadline_secs: Option<u64>,
    /// Assumed `wants_vote` when a turn omits the field.
    pub wants_vote_default: bool,
}

impl Default for DiscussionConfig {
    fn default() -> Self {
        Self {
            soft_max_turns: 40,
            hard_max_turns: 45,
            extension: 10,
            scene_deadline_secs: None,
            wants_vote_default: true,
        }
    }
}

impl DiscussionConfig {
    pub fn scene_deadline(&self) -> Option<Duration> {
        self.scene_deadline_secs.map(Duration::from_secs)
    }
}

/// Scene acceptance loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcceptanceConfig {
    /// Rejections tolerated before the latest draft is force-accepted.
    pub max_rejections: u32,
    /// Chance of running the special-effects pass on an accepted scene.
    pub special_effects_probability: f64,
    /// Characters kept from each end of a rejected scene in director notes.
    pub snippet_chars: usize,
    /// Run refine, AI-detection, and humanize after acceptance.
    pub post_process: bool,
    /// Seed for the special-effects roll; drawn from entropy when unset.
    pub seed: Option<u64>,
}

impl Default for AcceptanceConfig {
    fn default() -> Self {
        Self {
            max_rejections: 3,
            special_effects_probability: 0.25,
            snippet_chars: 200,
            post_process: true,
            seed: None,
        }
    }
}

/// Agreement protocol settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VotingConfig {
    /// Request agent votes concurrently.
    pub parallel: bool,
    /// TL;DRs included as an agent's memory context when voting on summaries.
    pub memory_context_length: usize,
    /// Stop when the mean continue-vote falls below this.
    pub stop_threshold: f64,
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            memory_context_length: 5,
            stop_threshold: 0.5,
        }
    }
}

/// Output token ceilings per call site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenLimits {
    pub turn: u32,
    pub starting_agent: u32,
    pub stop_vote: u32,
    pub best_summary: u32,
    pub social_roles: u32,
    pub scene_check: u32,
    pub special_effects: u32,
    pub refine: u32,
    pub detect_ai: u32,
    pub humanize: u32,
    pub tldr: u32,
    pub meeting_summary: u32,
}

impl Default for TokenLimits {
    fn default() -> Self {
        Self {
            turn: 500,
            starting_agent: 10,
            stop_vote: 1000,
            best_summary: 1000,
            social_roles: 2500,
            scene_check: 4000,
            special_effects: 2000,
            refine: 4000,
            detect_ai: 2000,
            humanize: 3000,
            tldr: 350,
            meeting_summary: 350,
        }
    }
}

/// Top-level meeting generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeetingConfig {
    /// Language the meeting is conducted in.
    pub language: String,
    /// Kind of meeting, e.g. "brainstorming session".
    pub meeting_type: String,
    /// Re-assign social roles before each scene.
    pub assign_social_roles: bool,
    /// TL;DR candidates per scene; more than one triggers a summary vote.
    pub tldr_candidates: usize,
    pub discussion: DiscussionConfig,
    pub acceptance: AcceptanceConfig,
    pub voting: VotingConfig,
    pub tokens: TokenLimits,
}

impl Default for MeetingConfig {
    fn default() -> Self {
        Self {
            language: "English".to_string(),
            meeting_type: "team meeting".to_string(),
            assign_social_roles: true,
            tldr_candidates: 1,
            discussion: DiscussionConfig::default(),
            acceptance: AcceptanceConfig::default(),
            voting: VotingConfig::default(),
            tokens: TokenLimits::default(),
        }
    }
}

impl MeetingConfig {
    /// Parse from TOML, filling unspecified fields with defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, CoordinationError> {
        let config: Self =
            toml::from_str(text).map_err(|e| CoordinationError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoordinationError> {
        let d = &self.discussion;
        if d.soft_max_turns == 0 {
            return Err(CoordinationError::InvalidConfig(
                "soft_max_turns must be at least 1".into(),
            ));
        }
        if d.soft_max_turns > d.hard_max_turns {
            return Err(CoordinationError::InvalidConfig(format!(
                "soft_max_turns ({}) exceeds hard_max_turns ({})",
                d.soft_max_turns, d.hard_max_turns
            )));
        }
        if d.extension == 0 {
            return Err(CoordinationError::InvalidConfig(
                "extension must be at least 1".into(),
            ));
        }
        let p = self.acceptance.special_effects_probability;
        if !(0.0..=1.0).contains(&p) {
            return Err(CoordinationError::InvalidConfig(format!(
                "special_effects_probability {p} outside [0, 1]"
            )));
        }
        let t = self.voting.stop_threshold;
        if !(0.0..=1.0).contains(&t) {
            return Err(CoordinationError::InvalidConfig(format!(
                "stop_threshold {t} outside [0, 1]"
            )));
        }
        if self.tldr_candidates == 0 {
            return Err(CoordinationError::InvalidConfig(
                "tldr_candidates must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
