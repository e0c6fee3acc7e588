//! Discussion protocol: persona-bound agents taking turns on one scene.
//!
//! - [`guardrails`]: soft/hard turn caps and the scene deadline
//! - [`state`]: scene drafts, violations and run outcomes
//! - [`protocol`]: the turn loop and speaker selection

pub mod guardrails;
pub mod protocol;
pub mod state;

pub use guardrails::{GuardDecision, TurnGuard};
pub use protocol::{
    parse_turn_reply, resolve_next_speaker, resolve_starting_agent, DiscussionProtocol,
    DiscussionRun, SceneContext, TurnReply,
};
pub use state::{
    DiscussionOutcome, ProtocolViolation, SceneDraft, StopVoteRecord, TerminationReason,
    Utterance, FAILED_SCENE_TEXT, UTTERANCE_MARKER,
};
