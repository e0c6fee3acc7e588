//! Meeting generation: scenes in plan order, with memory threaded between
//! them.
//!
//! For each scene: reassign social roles, run the acceptance loop around a
//! fresh discussion, apply the finishing passes, summarize, and only then
//! write the scene's memory slot. Scene `i + 1` therefore only ever sees
//! finalized context from scenes `0..=i`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agreement::{AgreementDecision, AgreementPayload, AgreementProtocol, AgreementStrategy};
use crate::config::MeetingConfig;
use crate::discussion::{
    DiscussionProtocol, DiscussionRun, ProtocolViolation, SceneContext, TerminationReason,
    UTTERANCE_MARKER,
};
use crate::error::{CoordinationError, CoordinationResult};
use crate::gateway::{complete_structured, CallPurpose, CompletionRequest, LanguageModelGateway};
use crate::memory::{SceneMemory, SceneMemoryStore};
use crate::persona::{catalog_listing, Persona, Roster, SocialRoleAssignments};
use crate::scene::{
    AcceptanceKind, DirectorCritic, RejectionRecord, SceneAcceptance, SceneEvolution,
    ScenePostProcessor,
};
use crate::templates::{render, PromptTemplates};

/// Separator between finalized scenes in the meeting text.
pub const SCENE_SEPARATOR: &str = " \n ";

/// The document a meeting discusses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceArticle {
    pub title: String,
    pub text: String,
    /// Subject area, used for output naming.
    #[serde(default)]
    pub domain: Option<String>,
}

impl SourceArticle {
    pub fn new(title: &str, text: &str) -> Self {
        Self {
            title: title.to_string(),
            text: text.to_string(),
            domain: None,
        }
    }
}

/// Everything recorded about one finished scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneRecord {
    pub scene_index: usize,
    pub description: String,
    pub acceptance: AcceptanceKind,
    pub rejections: u32,
    pub generations: u32,
    pub turn_count: u32,
    pub termination: TerminationReason,
    pub violations: Vec<ProtocolViolation>,
    pub evolution: SceneEvolution,
    pub tldr: String,
    pub last_dialogue: String,
    pub last_speaker: Option<String>,
    pub completed_at: DateTime<Utc>,
}

/// A generated meeting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingTranscript {
    pub id: Uuid,
    pub article_title: String,
    pub meeting_type: String,
    pub language: String,
    pub personas: Vec<Persona>,
    pub scene_plan: Vec<String>,
    pub scenes: Vec<SceneRecord>,
    /// Finalized scenes joined with [`SCENE_SEPARATOR`].
    pub text: String,
    #[serde(default)]
    pub summary: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Receives scene-level records as they are produced.
pub trait SceneSink: Send + Sync {
    fn scene_rejected(&self, record: &RejectionRecord) -> CoordinationResult<()>;
    fn scene_completed(&self, record: &SceneRecord) -> CoordinationResult<()>;
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl SceneSink for NullSink {
    fn scene_rejected(&self, _record: &RejectionRecord) -> CoordinationResult<()> {
        Ok(())
    }

    fn scene_completed(&self, _record: &SceneRecord) -> CoordinationResult<()> {
        Ok(())
    }
}

/// Text after the final utterance marker, trimmed; the whole scene when
/// there is no marker.
pub fn last_dialogue_of(scene: &str) -> String {
    scene
        .rsplit(UTTERANCE_MARKER)
        .next()
        .unwrap_or(scene)
        .trim()
        .to_string()
}

/// Speaker named before the first `:` of `line`, when it is on the roster.
pub fn speaker_of(line: &str, roster: &Roster) -> Option<String> {
    let (name, _) = line.split_once(':')?;
    let name = name.trim();
    roster.index_of(name).map(|_| name.to_string())
}

pub struct MeetingGenerator {
    gateway: Arc<dyn LanguageModelGateway>,
    templates: PromptTemplates,
    config: MeetingConfig,
}

impl MeetingGenerator {
    pub fn new(
        gateway: Arc<dyn LanguageModelGateway>,
        templates: PromptTemplates,
        config: MeetingConfig,
    ) -> CoordinationResult<Self> {
        config.validate()?;
        Ok(Self {
            gateway,
            templates,
            config,
        })
    }

    pub fn config(&self) -> &MeetingConfig {
        &self.config
    }

    /// Generate every scene in `scene_plan` order.
    ///
    /// A gateway failure aborts the whole meeting and nothing partial is
    /// returned; scenes already handed to `sink` stay recorded there.
    pub async fn generate_meeting(
        &self,
        article: &SourceArticle,
        mut roster: Roster,
        scene_plan: &[String],
        sink: &dyn SceneSink,
    ) -> CoordinationResult<MeetingTranscript> {
        if scene_plan.is_empty() {
            return Err(CoordinationError::NoSceneDescriptions);
        }
        let started_at = Utc::now();
        let gateway = self.gateway.as_ref();
        let mut memory = SceneMemoryStore::new(scene_plan.len());
        let mut rng = match self.config.acceptance.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut scenes: Vec<SceneRecord> = Vec::with_capacity(scene_plan.len());
        let mut last_speaker: Option<String> = None;

        info!(
            article = %article.title,
            scenes = scene_plan.len(),
            agents = roster.len(),
            model = gateway.model_name(),
            "Meeting generation started"
        );

        for (index, description) in scene_plan.iter().enumerate() {
            let deadline = self
                .config
                .discussion
                .scene_deadline()
                .map(|budget| Instant::now() + budget);

            if self.config.assign_social_roles {
                self.assign_social_roles(&mut roster, description).await?;
            }

            let context = self.scene_context(index, description, &memory, last_speaker.clone());
            let protocol =
                DiscussionProtocol::new(gateway, &self.templates, &self.config, &roster, article);
            let run = DiscussionRun::new(&protocol, context, deadline);
            let critic = DirectorCritic::new(gateway, &self.templates, &self.config);
            let accepted = SceneAcceptance::new(&critic, &self.templates, &self.config.acceptance)
                .with_sink(sink)
                .run(index, description, &run)
                .await?;

            let processor = ScenePostProcessor::new(gateway, &self.templates, &self.config);
            let special_effects = processor.roll_special_effects(&mut rng);
            let evolution = processor
                .process(
                    index,
                    description,
                    &accepted.text,
                    &roster,
                    special_effects,
                    accepted.outstanding_feedback(),
                )
                .await?;

            let tldr = self
                .scene_tldr(index, &evolution.finalized, &memory, &roster)
                .await?;
            let last_dialogue = last_dialogue_of(&evolution.finalized);
            memory.record(index, &tldr, &last_dialogue)?;

            last_speaker = speaker_of(&last_dialogue, &roster)
                .or_else(|| accepted.outcome.last_speaker.clone());

            let record = SceneRecord {
                scene_index: index,
                description: description.clone(),
                acceptance: accepted.kind,
                rejections: accepted.session.attempt,
                generations: accepted.session.generations,
                turn_count: accepted.outcome.turn_count,
                termination: accepted.outcome.termination,
                violations: accepted.outcome.violations.clone(),
                evolution,
                tldr,
                last_dialogue,
                last_speaker: last_speaker.clone(),
                completed_at: Utc::now(),
            };
            sink.scene_completed(&record)?;
            info!(
                scene = index,
                acceptance = %record.acceptance,
                turns = record.turn_count,
                "Scene complete"
            );
            scenes.push(record);
        }

        let text = scenes
            .iter()
            .map(|s| s.evolution.finalized.as_str())
            .collect::<Vec<_>>()
            .join(SCENE_SEPARATOR);
        info!(article = %article.title, scenes = scenes.len(), "Meeting generation finished");

        Ok(MeetingTranscript {
            id: Uuid::new_v4(),
            article_title: article.title.clone(),
            meeting_type: self.config.meeting_type.clone(),
            language: self.config.language.clone(),
            personas: roster.as_slice().to_vec(),
            scene_plan: scene_plan.to_vec(),
            scenes,
            text,
            summary: None,
            started_at,
            finished_at: Utc::now(),
        })
    }

    fn scene_context(
        &self,
        index: usize,
        description: &str,
        memory: &SceneMemoryStore,
        last_speaker: Option<String>,
    ) -> SceneContext {
        let previous = index.checked_sub(1);
        SceneContext {
            scene_index: index,
            scene_description: description.to_string(),
            director_notes: String::new(),
            previous_scenes: previous
                .map(|p| memory.summaries_through(p))
                .unwrap_or_default(),
            previous_summary: previous.and_then(|p| memory.summary(p)).map(str::to_string),
            last_dialogue: previous
                .and_then(|p| memory.last_dialogue(p))
                .map(str::to_string),
            last_speaker,
        }
    }

    /// Reassign social roles for the coming scene. A malformed reply keeps
    /// the previous roles; a gateway failure propagates.
    async fn assign_social_roles(
        &self,
        roster: &mut Roster,
        scene_description: &str,
    ) -> CoordinationResult<()> {
        let everyone: Vec<usize> = (0..roster.len()).collect();
        let request =
            CompletionRequest::new(CallPurpose::SocialRoles, self.config.tokens.social_roles)
                .system(render(
                    &self.templates.social_roles_system,
                    &[("catalog", &catalog_listing())],
                ))
                .user(render(
                    &self.templates.social_roles_user,
                    &[
                        ("scene_description", scene_description),
                        ("agents", &roster.listing(&everyone)),
                    ],
                ));
        match complete_structured::<SocialRoleAssignments>(
            self.gateway.as_ref(),
            request,
            "social_role_assignments",
        )
        .await
        {
            Ok(assignments) => {
                let updated = roster.apply_social_roles(&assignments);
                debug!(updated, "Social roles assigned");
                Ok(())
            }
            Err(e @ CoordinationError::Gateway(_)) => Err(e),
            Err(e) => {
                warn!(error = %e, "Social role assignment failed, keeping previous roles");
                Ok(())
            }
        }
    }

    async fn request_tldr(&self, scene: &str) -> CoordinationResult<String> {
        let request = CompletionRequest::new(CallPurpose::Tldr, self.config.tokens.tldr)
            .system(render(
                &self.templates.tldr_system,
                &[("language", &self.config.language)],
            ))
            .user(render(&self.templates.tldr_user, &[("scene", scene)]));
        Ok(self.gateway.complete(&request).await?.trim().to_string())
    }

    /// One TL;DR, or the agents' pick among several candidates. An invalid
    /// summary vote falls back to the first candidate.
    async fn scene_tldr(
        &self,
        index: usize,
        scene: &str,
        memory: &SceneMemoryStore,
        roster: &Roster,
    ) -> CoordinationResult<String> {
        let wanted = self.config.tldr_candidates.max(1);
        let mut candidates = Vec::with_capacity(wanted);
        for _ in 0..wanted {
            candidates.push(self.request_tldr(scene).await?);
        }
        if candidates.len() == 1 {
            return Ok(candidates.swap_remove(0));
        }

        let memory_context = index
            .checked_sub(1)
            .map(|p| memory.recent_summaries(p, self.config.voting.memory_context_length))
            .unwrap_or_default();
        let agreement = AgreementProtocol::new(
            AgreementStrategy::BestSummary,
            self.gateway.as_ref(),
            &self.templates,
            roster,
            &self.config,
        );
        let payload = AgreementPayload::Candidates {
            candidates: &candidates,
            memory_context: &memory_context,
        };
        match agreement.run(payload).await {
            Ok(AgreementDecision::Selected(outcome)) => Ok(outcome.text),
            Ok(AgreementDecision::Dialogue(_)) => Ok(candidates.swap_remove(0)),
            Err(e) if e.is_attempt_recoverable() => {
                warn!(scene = index, error = %e, "Summary vote failed, using first candidate");
                Ok(candidates.swap_remove(0))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayError, ScriptedGateway};
    use std::sync::Mutex;

    fn roster() -> Roster {
        Roster::new(vec![
            Persona::new("Chair", "Runs the meeting"),
            Persona::new("Historian", "Knows the background"),
            Persona::new("Engineer", "Builds things"),
        ])
        .unwrap()
    }

    fn quiet_config() -> MeetingConfig {
        let mut config = MeetingConfig::default();
        config.assign_social_roles = false;
        config.acceptance.post_process = false;
        config.acceptance.special_effects_probability = 0.0;
        config
    }

    /// One-turn scenes: starter 1, turn text from the scene description,
    /// unanimous stop, critic accepts.
    fn one_turn_gateway() -> ScriptedGateway {
        ScriptedGateway::new()
            .fallback(CallPurpose::StartingAgent, "1")
            .respond_with(CallPurpose::Turn, |req| {
                let said = if req.transcript().contains("Kickoff") {
                    "Let's begin."
                } else {
                    "Thanks, that's all."
                };
                format!(r#"{{"turn": "{said}", "wants_vote": true, "next_speaker": 1}}"#)
            })
            .fallback(CallPurpose::StopVote, r#"{"vote": 0}"#)
            .fallback(
                CallPurpose::SceneCheck,
                r#"{"explanation": "ok", "accept_scene": true}"#,
            )
            .respond_with(CallPurpose::Tldr, |req| {
                if req.transcript().contains("Let's begin.") {
                    "They kicked off.".to_string()
                } else {
                    "They wrapped up.".to_string()
                }
            })
    }

    #[derive(Default)]
    struct RecordingSink {
        completed: Mutex<Vec<usize>>,
        rejected: Mutex<Vec<RejectionRecord>>,
    }

    impl SceneSink for RecordingSink {
        fn scene_rejected(&self, record: &RejectionRecord) -> CoordinationResult<()> {
            self.rejected.lock().unwrap().push(record.clone());
            Ok(())
        }

        fn scene_completed(&self, record: &SceneRecord) -> CoordinationResult<()> {
            self.completed.lock().unwrap().push(record.scene_index);
            Ok(())
        }
    }

    #[test]
    fn test_last_dialogue_and_speaker() {
        let roster = roster();
        let scene = "\n>>Chair: Hi.\n>>Historian: See you: soon.";
        let line = last_dialogue_of(scene);
        assert_eq!(line, "Historian: See you: soon.");
        assert_eq!(speaker_of(&line, &roster).as_deref(), Some("Historian"));
        assert_eq!(speaker_of("Narrator: hi", &roster), None);
        assert_eq!(last_dialogue_of("no markers"), "no markers");
    }

    #[tokio::test]
    async fn test_two_scene_meeting() {
        let gateway = Arc::new(one_turn_gateway());
        let generator =
            MeetingGenerator::new(gateway.clone(), PromptTemplates::default(), quiet_config())
                .unwrap();
        let sink = RecordingSink::default();
        let plan = vec!["Kickoff".to_string(), "Wrap up".to_string()];

        let transcript = generator
            .generate_meeting(&SourceArticle::new("Bridges", "text"), roster(), &plan, &sink)
            .await
            .unwrap();

        assert_eq!(transcript.scenes.len(), 2);
        assert_eq!(
            transcript.text,
            "\n>>Chair: Let's begin. \n \n>>Historian: Thanks, that's all."
        );
        assert_eq!(transcript.scenes[0].tldr, "They kicked off.");
        assert_eq!(transcript.scenes[0].last_speaker.as_deref(), Some("Chair"));
        assert_eq!(*sink.completed.lock().unwrap(), vec![0, 1]);

        // Scene 2 excluded Chair and saw scene 1's memory.
        let starters = gateway.requests_for(CallPurpose::StartingAgent);
        assert!(!starters[1].transcript().contains("Chair: Runs the meeting"));
        assert!(starters[1].transcript().contains("They kicked off."));
        let turns = gateway.requests_for(CallPurpose::Turn);
        assert!(turns[1].transcript().contains(">Scene 1 They kicked off."));
        assert!(turns[1].transcript().contains("Chair: Let's begin."));
    }

    #[tokio::test]
    async fn test_rejections_reach_sink() {
        let gateway = Arc::new(
            one_turn_gateway().respond(
                CallPurpose::SceneCheck,
                r#"{"explanation": "too short", "accept_scene": false}"#,
            ),
        );
        let generator =
            MeetingGenerator::new(gateway.clone(), PromptTemplates::default(), quiet_config())
                .unwrap();
        let sink = RecordingSink::default();
        let plan = vec!["Kickoff".to_string()];

        let transcript = generator
            .generate_meeting(&SourceArticle::new("Bridges", "text"), roster(), &plan, &sink)
            .await
            .unwrap();
        assert_eq!(transcript.scenes[0].acceptance, AcceptanceKind::Accepted);
        assert_eq!(transcript.scenes[0].rejections, 1);
        let rejected = sink.rejected.lock().unwrap();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].director_feedback, "too short");
        assert_eq!(gateway.call_count(CallPurpose::Turn), 2);
    }

    #[tokio::test]
    async fn test_gateway_failure_aborts_meeting() {
        let gateway = Arc::new(ScriptedGateway::new().fail(
            CallPurpose::StartingAgent,
            GatewayError::Exhausted {
                attempts: 6,
                last: Box::new(GatewayError::RateLimited { retry_after: None }),
            },
        ));
        let generator =
            MeetingGenerator::new(gateway, PromptTemplates::default(), quiet_config()).unwrap();
        let err = generator
            .generate_meeting(
                &SourceArticle::new("Bridges", "text"),
                roster(),
                &["Kickoff".to_string()],
                &NullSink,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinationError::Gateway(_)));
    }

    #[tokio::test]
    async fn test_empty_plan_rejected() {
        let generator = MeetingGenerator::new(
            Arc::new(ScriptedGateway::new()),
            PromptTemplates::default(),
            quiet_config(),
        )
        .unwrap();
        let err = generator
            .generate_meeting(&SourceArticle::default(), roster(), &[], &NullSink)
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinationError::NoSceneDescriptions));
    }

    #[tokio::test]
    async fn test_social_roles_applied_and_failures_tolerated() {
        let mut config = quiet_config();
        config.assign_social_roles = true;
        let gateway = Arc::new(
            one_turn_gateway()
                .respond(
                    CallPurpose::SocialRoles,
                    r#"{"assignments": [{"role": "Chair", "social_roles": ["Coordinator"], "social_roles_descr": ["links ideas"]}]}"#,
                )
                .respond(CallPurpose::SocialRoles, "not json"),
        );
        let generator =
            MeetingGenerator::new(gateway.clone(), PromptTemplates::default(), config).unwrap();
        let plan = vec!["Kickoff".to_string(), "Wrap up".to_string()];
        let transcript = generator
            .generate_meeting(&SourceArticle::new("Bridges", "text"), roster(), &plan, &NullSink)
            .await
            .unwrap();
        assert_eq!(transcript.personas[0].social_roles, vec!["Coordinator"]);
        assert_eq!(gateway.call_count(CallPurpose::SocialRoles), 2);
    }

    #[tokio::test]
    async fn test_tldr_candidates_voted() {
        let mut config = quiet_config();
        config.tldr_candidates = 2;
        let gateway = Arc::new(
            one_turn_gateway()
                .respond(CallPurpose::Tldr, "first take")
                .respond(CallPurpose::Tldr, "second take")
                .fallback(CallPurpose::SummaryVote, "1"),
        );
        let generator =
            MeetingGenerator::new(gateway.clone(), PromptTemplates::default(), config).unwrap();
        let transcript = generator
            .generate_meeting(
                &SourceArticle::new("Bridges", "text"),
                roster(),
                &["Kickoff".to_string()],
                &NullSink,
            )
            .await
            .unwrap();
        assert_eq!(transcript.scenes[0].tldr, "second take");
        assert_eq!(gateway.call_count(CallPurpose::SummaryVote), 3);
    }
}
