//! The director critic: accepts or rejects a scene draft with feedback.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::MeetingConfig;
use crate::error::CoordinationResult;
use crate::extract::Validate;
use crate::gateway::{complete_structured, CallPurpose, CompletionRequest, LanguageModelGateway};
use crate::templates::{render, PromptTemplates};

/// Explanation used when the critic's reply cannot be parsed.
pub const UNPARSABLE_VERDICT: &str = "Failed to parse JSON from model response.";

/// The critic's structured verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SceneVerdict {
    /// Feedback addressed to the participants.
    pub explanation: String,
    pub accept_scene: bool,
}

impl Validate for SceneVerdict {}

impl SceneVerdict {
    pub fn accept(explanation: &str) -> Self {
        Self {
            explanation: explanation.to_string(),
            accept_scene: true,
        }
    }

    pub fn reject(explanation: &str) -> Self {
        Self {
            explanation: explanation.to_string(),
            accept_scene: false,
        }
    }
}

/// Judges scene drafts.
#[async_trait]
pub trait SceneCritic: Send + Sync {
    async fn evaluate(&self, scene_description: &str, scene: &str) -> CoordinationResult<SceneVerdict>;
}

/// Model-backed critic. An unparsable verdict counts as a rejection.
pub struct DirectorCritic<'a> {
    gateway: &'a dyn LanguageModelGateway,
    templates: &'a PromptTemplates,
    config: &'a MeetingConfig,
}

impl<'a> DirectorCritic<'a> {
    pub fn new(
        gateway: &'a dyn LanguageModelGateway,
        templates: &'a PromptTemplates,
        config: &'a MeetingConfig,
    ) -> Self {
        Self {
            gateway,
            templates,
            config,
        }
    }
}

#[async_trait]
impl SceneCritic for DirectorCritic<'_> {
    async fn evaluate(&self, scene_description: &str, scene: &str) -> CoordinationResult<SceneVerdict> {
        let request = CompletionRequest::new(CallPurpose::SceneCheck, self.config.tokens.scene_check)
            .system(render(
                &self.templates.scene_check_system,
                &[
                    ("meeting_type", &self.config.meeting_type),
                    ("language", &self.config.language),
                ],
            ))
            .user(render(
                &self.templates.scene_check_user,
                &[("scene_description", scene_description), ("scene", scene)],
            ));
        match complete_structured::<SceneVerdict>(self.gateway, request, "scene_verdict").await {
            Ok(verdict) => {
                debug!(accept = verdict.accept_scene, "Scene verdict");
                Ok(verdict)
            }
            Err(e) if e.is_attempt_recoverable() => {
                warn!(error = %e, "Unparsable scene verdict, treating as rejection");
                Ok(SceneVerdict::reject(UNPARSABLE_VERDICT))
            }
            Err(e) => Err(e),
        }
    }
}
