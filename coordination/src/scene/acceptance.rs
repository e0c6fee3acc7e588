//! Bounded generate/evaluate/retry loop for one scene.
//!
//! Every attempt regenerates the scene from scratch with the accumulated
//! director notes. After `max_rejections` rejections the latest draft is
//! accepted without further evaluation, so the generator runs at most
//! `max_rejections` times and the loop always makes progress.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

use super::critic::SceneCritic;
use super::state::{AcceptancePhase, SceneSession};
use crate::config::AcceptanceConfig;
use crate::discussion::{DiscussionOutcome, TerminationReason};
use crate::error::{CoordinationError, CoordinationResult};
use crate::meeting::SceneSink;
use crate::templates::{render, PromptTemplates};

/// Produces a fresh scene draft given the current director notes.
#[async_trait]
pub trait SceneGenerator: Send + Sync {
    async fn generate(&self, director_notes: &str) -> CoordinationResult<DiscussionOutcome>;

    /// Deadline shared by every attempt on this scene.
    fn deadline(&self) -> Option<Instant> {
        None
    }
}

/// How the final draft was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptanceKind {
    /// The critic approved it.
    Accepted,
    /// Rejection budget spent or deadline passed.
    Forced,
}

impl std::fmt::Display for AcceptanceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accepted => write!(f, "accepted"),
            Self::Forced => write!(f, "forced"),
        }
    }
}

/// One critic rejection, as written to the rejection log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionRecord {
    pub scene_index: usize,
    /// 1-based rejection count at the time of this rejection.
    pub attempt: u32,
    pub rejected_scene_snippet: String,
    pub director_feedback: String,
}

/// The draft the loop settled on.
#[derive(Debug, Clone)]
pub struct AcceptedScene {
    pub kind: AcceptanceKind,
    pub outcome: DiscussionOutcome,
    /// Rendered scene text.
    pub text: String,
    /// Most recent critic feedback, if any attempt was rejected.
    pub last_feedback: Option<String>,
    pub rejections: Vec<RejectionRecord>,
    pub session: SceneSession,
}

impl AcceptedScene {
    pub fn is_forced(&self) -> bool {
        self.kind == AcceptanceKind::Forced
    }

    /// Feedback the refine step should still address: only set when the
    /// critic never approved the final draft.
    pub fn outstanding_feedback(&self) -> Option<&str> {
        match self.kind {
            AcceptanceKind::Forced => self.last_feedback.as_deref(),
            AcceptanceKind::Accepted => None,
        }
    }
}

/// First and last `chars` characters of `text` around an ellipsis line, or
/// the whole text when it is short enough.
pub fn snippet(text: &str, chars: usize) -> String {
    let count = text.chars().count();
    if count <= chars * 2 {
        return text.to_string();
    }
    let head: String = text.chars().take(chars).collect();
    let tail: String = text.chars().skip(count - chars).collect();
    format!("{head}\n...\n{tail}")
}

/// The acceptance loop, parameterized by critic and templates.
pub struct SceneAcceptance<'a> {
    critic: &'a dyn SceneCritic,
    templates: &'a PromptTemplates,
    config: &'a AcceptanceConfig,
    sink: Option<&'a dyn SceneSink>,
}

impl<'a> SceneAcceptance<'a> {
    pub fn new(
        critic: &'a dyn SceneCritic,
        templates: &'a PromptTemplates,
        config: &'a AcceptanceConfig,
    ) -> Self {
        Self {
            critic,
            templates,
            config,
            sink: None,
        }
    }

    /// Emit each rejection to `sink` as soon as the critic returns it.
    pub fn with_sink(mut self, sink: &'a dyn SceneSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Generate, evaluate, and retry until a draft is accepted or forced.
    ///
    /// Malformed generations consume an attempt like a rejection. Any other
    /// error, including an exhausted gateway, propagates immediately.
    pub async fn run(
        &self,
        scene_index: usize,
        scene_description: &str,
        generator: &dyn SceneGenerator,
    ) -> CoordinationResult<AcceptedScene> {
        let mut session = SceneSession::new(scene_index, self.config.max_rejections);
        let mut notes = String::new();
        let mut latest: Option<DiscussionOutcome> = None;
        let mut last_feedback: Option<String> = None;
        let mut last_error: Option<CoordinationError> = None;
        let mut rejections = Vec::new();

        let kind = loop {
            match generator.generate(&notes).await {
                Ok(outcome) if outcome.termination == TerminationReason::Deadline => {
                    if !outcome.draft.is_empty() {
                        latest = Some(outcome);
                    }
                    if latest.is_none() {
                        return Err(CoordinationError::SceneDeadlineExceeded { scene: scene_index });
                    }
                    warn!(scene = scene_index, "Scene deadline passed, accepting latest draft");
                    session.transition(AcceptancePhase::ForcedAccept, "scene deadline passed")?;
                    break AcceptanceKind::Forced;
                }
                Ok(outcome) => {
                    let text = outcome.scene_text();
                    latest = Some(outcome);
                    session.transition(AcceptancePhase::Evaluating, "draft ready")?;

                    let verdict = self.critic.evaluate(scene_description, &text).await?;
                    if verdict.accept_scene {
                        session.transition(AcceptancePhase::Accepted, &verdict.explanation)?;
                        info!(scene = scene_index, generations = session.generations, "Scene accepted");
                        break AcceptanceKind::Accepted;
                    }

                    session.transition(AcceptancePhase::Rejected, &verdict.explanation)?;
                    info!(scene = scene_index, attempt = session.attempt, "Scene rejected by critic");
                    let record = RejectionRecord {
                        scene_index,
                        attempt: session.attempt,
                        rejected_scene_snippet: snippet(&text, self.config.snippet_chars),
                        director_feedback: verdict.explanation.clone(),
                    };
                    notes.push_str(&render(
                        &self.templates.director_rejection,
                        &[
                            ("snippet", &record.rejected_scene_snippet),
                            ("feedback", &record.director_feedback),
                        ],
                    ));
                    if let Some(sink) = self.sink {
                        sink.scene_rejected(&record)?;
                    }
                    last_feedback = Some(verdict.explanation);
                    rejections.push(record);
                }
                Err(e) if e.is_attempt_recoverable() => {
                    session.transition(AcceptancePhase::Rejected, &e.to_string())?;
                    warn!(scene = scene_index, attempt = session.attempt, error = %e, "Scene attempt failed");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }

            if session.can_retry() {
                session.transition(AcceptancePhase::Generating, "regenerating with director notes")?;
                continue;
            }
            if latest.is_none() {
                return Err(last_error.unwrap_or(CoordinationError::SceneDeadlineExceeded {
                    scene: scene_index,
                }));
            }
            warn!(
                scene = scene_index,
                rejections = session.attempt,
                "Rejection budget spent, forcing acceptance of latest draft"
            );
            session.transition(AcceptancePhase::ForcedAccept, "rejection budget spent")?;
            break AcceptanceKind::Forced;
        };

        let outcome = latest.ok_or(CoordinationError::SceneDeadlineExceeded { scene: scene_index })?;
        Ok(AcceptedScene {
            kind,
            text: outcome.scene_text(),
            outcome,
            last_feedback,
            rejections,
            session,
        })
    }
}
