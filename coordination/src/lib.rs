//! Multi-agent meeting transcript generation.
//!
//! This library provides:
//! - A turn-taking discussion engine for persona-bound LLM agents
//! - Agent voting on discussion end and on the best candidate summary
//! - A bounded generate/evaluate/retry loop with a director critic
//! - Scene memory threading finalized context from one scene to the next
//!
//! Models are reached only through [`gateway::LanguageModelGateway`]; wrap a
//! concrete client in [`gateway::RetryingGateway`] for backoff and per-call
//! timeouts.
//!
//! # Modules
//!
//! - [`discussion`]: turn loop, speaker selection, turn caps
//! - [`agreement`]: `vote_best_summary` and `vote_dialogue_end`
//! - [`scene`]: acceptance state machine, critic, finishing passes
//! - [`meeting`]: scene sequencing and transcript assembly
//! - [`memory`]: per-scene TL;DR and last-dialogue slots
//! - [`persona`]: typed participants and social roles
//! - [`extract`]: structured-response extraction
//! - [`summary`], [`transcript`]: minutes summary and transcript chunking

#![allow(clippy::uninlined_format_args)]

pub mod agreement;
pub mod config;
pub mod discussion;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod meeting;
pub mod memory;
pub mod persona;
pub mod scene;
pub mod summary;
pub mod templates;
pub mod transcript;

pub use agreement::{
    AgreementDecision, AgreementPayload, AgreementProtocol, AgreementStrategy, SelectionOutcome,
    StopVoteOutcome,
};
pub use config::{AcceptanceConfig, DiscussionConfig, MeetingConfig, TokenLimits, VotingConfig};
pub use discussion::{
    DiscussionOutcome, DiscussionProtocol, DiscussionRun, ProtocolViolation, SceneContext,
    SceneDraft, TerminationReason, TurnGuard,
};
pub use error::{CoordinationError, CoordinationResult};
pub use gateway::{
    CallPurpose, ChatMessage, ChatRole, CompletionRequest, GatewayError, LanguageModelGateway,
    ResponseSchema, RetryPolicy, RetryingGateway, ScriptedGateway,
};
pub use meeting::{
    MeetingGenerator, MeetingTranscript, NullSink, SceneRecord, SceneSink, SourceArticle,
};
pub use memory::{MemoryError, SceneMemory, SceneMemoryStore};
pub use persona::{Persona, PersonaError, Roster};
pub use scene::{
    AcceptanceKind, AcceptancePhase, AcceptedScene, DirectorCritic, RejectionRecord,
    SceneAcceptance, SceneCritic, SceneEvolution, SceneGenerator, SceneSession, SceneVerdict,
};
pub use summary::{MeetingSummarizer, MeetingSummary};
pub use templates::{PromptTemplates, TemplateError};
pub use transcript::{chunk_transcript, speaker_turns, SpeakerTurn};
