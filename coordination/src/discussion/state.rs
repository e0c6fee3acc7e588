//! Scene drafts and discussion outcomes.

use serde::{Deserialize, Serialize};

use crate::agreement::StopVoteOutcome;

/// Marker that opens every utterance in a rendered scene.
pub const UTTERANCE_MARKER: &str = ">>";

/// Text used when a discussion produced no utterances.
pub const FAILED_SCENE_TEXT: &str = "Scene failed.";

/// One line of dialogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    pub speaker: String,
    pub text: String,
}

/// Ordered utterances for one scene attempt. Rebuilt from scratch on every
/// attempt; never patched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneDraft {
    utterances: Vec<Utterance>,
}

impl SceneDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, speaker: &str, text: &str) {
        self.utterances.push(Utterance {
            speaker: speaker.to_string(),
            text: text.trim().to_string(),
        });
    }

    pub fn len(&self) -> usize {
        self.utterances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utterances.is_empty()
    }

    pub fn utterances(&self) -> &[Utterance] {
        &self.utterances
    }

    pub fn last_speaker(&self) -> Option<&str> {
        self.utterances.last().map(|u| u.speaker.as_str())
    }

    /// Each utterance as `\n>>{speaker}: {text}`.
    pub fn render(&self) -> String {
        self.utterances
            .iter()
            .map(|u| format!("\n{UTTERANCE_MARKER}{}: {}", u.speaker, u.text))
            .collect()
    }

    /// [`render`](Self::render), or the failed-scene marker when empty.
    pub fn render_or_failed(&self) -> String {
        if self.is_empty() {
            FAILED_SCENE_TEXT.to_string()
        } else {
            self.render()
        }
    }
}

/// Why a discussion run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// Agents voted to stop.
    Agreement,
    /// Hard turn cap reached.
    HardCap,
    /// Scene deadline passed.
    Deadline,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Agreement => write!(f, "agreement"),
            Self::HardCap => write!(f, "hard_cap"),
            Self::Deadline => write!(f, "deadline"),
        }
    }
}

/// A model-supplied index that had to be corrected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProtocolViolation {
    /// Starting-agent reply was not an integer.
    StartingAgentUnparsable { raw: String, fallback: String },
    /// Starting-agent index outside `1..=eligible`.
    StartingAgentOutOfRange {
        value: i64,
        eligible: usize,
        fallback: String,
    },
    /// `next_speaker` missing or not an integer.
    NextSpeakerMissing { turn: u32, fallback: String },
    /// `next_speaker` outside `1..=remaining`.
    NextSpeakerOutOfRange {
        turn: u32,
        value: i64,
        remaining: usize,
        fallback: String,
    },
}

impl ProtocolViolation {
    /// The role substituted for the invalid choice.
    pub fn fallback(&self) -> &str {
        match self {
            Self::StartingAgentUnparsable { fallback, .. }
            | Self::StartingAgentOutOfRange { fallback, .. }
            | Self::NextSpeakerMissing { fallback, .. }
            | Self::NextSpeakerOutOfRange { fallback, .. } => fallback,
        }
    }
}

/// A stop vote taken after a given turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopVoteRecord {
    pub turn: u32,
    pub outcome: StopVoteOutcome,
}

/// Result of one discussion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscussionOutcome {
    pub draft: SceneDraft,
    /// Utterances produced.
    pub turn_count: u32,
    /// Role of the final speaker.
    pub last_speaker: Option<String>,
    pub termination: TerminationReason,
    /// Soft cap at termination, after any extensions.
    pub soft_max_turns: u32,
    pub extensions: u32,
    pub violations: Vec<ProtocolViolation>,
    pub stop_votes: Vec<StopVoteRecord>,
}

impl DiscussionOutcome {
    /// Rendered scene text, or the failed-scene marker.
    pub fn scene_text(&self) -> String {
        self.draft.render_or_failed()
    }
}
