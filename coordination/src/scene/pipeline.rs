//! Post-acceptance finishing passes.
//!
//! special effects (random) -> refine -> AI-detection critique -> humanize.
//! Each pass is one round trip whose output is pulled from a delimiter or
//! tag, falling back to the raw response when the marker is missing.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::MeetingConfig;
use crate::error::CoordinationResult;
use crate::extract::{delimited_or_raw, tagged_or_raw};
use crate::gateway::{CallPurpose, CompletionRequest, LanguageModelGateway};
use crate::persona::Roster;
use crate::templates::{render, PromptTemplates};

pub const MODIFIED_SCENE_DELIMITER: &str = "###Modified Scene###:";
pub const REFINED_SCENE_DELIMITER: &str = "###Refined Scene###:";
pub const FEEDBACK_TAG: &str = "feedback";
pub const FINAL_SCENE_TAG: &str = "final_scene";

/// Every intermediate form of one scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneEvolution {
    /// Accepted draft, before any finishing pass.
    pub original: String,
    pub special_effects_applied: bool,
    pub refined: String,
    pub ai_feedback: String,
    pub finalized: String,
}

impl SceneEvolution {
    /// A scene that skips every finishing pass.
    pub fn unprocessed(original: &str) -> Self {
        Self {
            original: original.to_string(),
            special_effects_applied: false,
            refined: original.to_string(),
            ai_feedback: String::new(),
            finalized: original.to_string(),
        }
    }
}

pub struct ScenePostProcessor<'a> {
    gateway: &'a dyn LanguageModelGateway,
    templates: &'a PromptTemplates,
    config: &'a MeetingConfig,
}

impl<'a> ScenePostProcessor<'a> {
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

    /// Roll for the special-effects pass.
    pub fn roll_special_effects<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        rng.gen_bool(self.config.acceptance.special_effects_probability.clamp(0.0, 1.0))
    }

    /// Run the finishing passes in order. `director_feedback` reaches the
    /// refine pass only when the scene was force-accepted.
    pub async fn process(
        &self,
        scene_index: usize,
        scene_description: &str,
        scene: &str,
        roster: &Roster,
        special_effects: bool,
        director_feedback: Option<&str>,
    ) -> CoordinationResult<SceneEvolution> {
        if !self.config.acceptance.post_process {
            return Ok(SceneEvolution::unprocessed(scene));
        }

        let mut working = scene.to_string();
        if special_effects {
            working = self.special_effects(&working, roster).await?;
            info!(scene = scene_index, "Special effects applied");
        }
        let refined = self.refine(scene_description, &working, director_feedback).await?;
        let ai_feedback = self.detect_ai(&refined).await?;
        let finalized = self.humanize(&refined, &ai_feedback).await?;
        debug!(
            scene = scene_index,
            original_chars = scene.len(),
            final_chars = finalized.len(),
            "Scene finalized"
        );
        Ok(SceneEvolution {
            original: scene.to_string(),
            special_effects_applied: special_effects,
            refined,
            ai_feedback,
            finalized,
        })
    }

    async fn special_effects(&self, scene: &str, roster: &Roster) -> CoordinationResult<String> {
        let participants = roster
            .iter()
            .map(|p| p.role.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let request =
            CompletionRequest::new(CallPurpose::SpecialEffects, self.config.tokens.special_effects)
                .system(render(
                    &self.templates.special_effects_system,
                    &[
                        ("meeting_type", &self.config.meeting_type),
                        ("language", &self.config.language),
                    ],
                ))
                .user(render(
                    &self.templates.special_effects_user,
                    &[("scene", scene), ("participants", &participants)],
                ));
        let raw = self.gateway.complete(&request).await?;
        Ok(delimited_or_raw(&raw, MODIFIED_SCENE_DELIMITER))
    }

    async fn refine(
        &self,
        scene_description: &str,
        scene: &str,
        director_feedback: Option<&str>,
    ) -> CoordinationResult<String> {
        let feedback_section = director_feedback
            .filter(|f| !f.trim().is_empty())
            .map(|f| render(&self.templates.refine_director_feedback, &[("feedback", f)]))
            .unwrap_or_default();
        let request = CompletionRequest::new(CallPurpose::Refine, self.config.tokens.refine)
            .system(render(
                &self.templates.refine_system,
                &[
                    ("meeting_type", &self.config.meeting_type),
                    ("language", &self.config.language),
                ],
            ))
            .user(render(
                &self.templates.refine_user,
                &[
                    ("scene_description", scene_description),
                    ("director_feedback_section", &feedback_section),
                    ("scene", scene),
                ],
            ));
        let raw = self.gateway.complete(&request).await?;
        Ok(delimited_or_raw(&raw, REFINED_SCENE_DELIMITER))
    }

    async fn detect_ai(&self, scene: &str) -> CoordinationResult<String> {
        let request = CompletionRequest::new(CallPurpose::DetectAi, self.config.tokens.detect_ai)
            .system(render(
                &self.templates.detect_ai_system,
                &[("language", &self.config.language)],
            ))
            .user(render(&self.templates.detect_ai_user, &[("scene", scene)]));
        let raw = self.gateway.complete(&request).await?;
        Ok(tagged_or_raw(&raw, FEEDBACK_TAG))
    }

    async fn humanize(&self, scene: &str, feedback: &str) -> CoordinationResult<String> {
        let request = CompletionRequest::new(CallPurpose::Humanize, self.config.tokens.humanize)
            .system(render(
                &self.templates.humanize_system,
                &[("language", &self.config.language)],
            ))
            .user(render(
                &self.templates.humanize_user,
                &[("scene", scene), ("feedback", feedback)],
            ));
        let raw = self.gateway.complete(&request).await?;
        Ok(tagged_or_raw(&raw, FINAL_SCENE_TAG))
    }
}
