//! The turn-taking engine.
//!
//! One run produces one scene draft: pick an opening speaker, then loop
//! persona-bound turns until the agents vote to stop, the hard cap is hit,
//! or the scene deadline passes. Model-supplied speaker indices are
//! bounds-checked and corrected with a deterministic fallback.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::guardrails::{GuardDecision, TurnGuard};
use super::state::{DiscussionOutcome, ProtocolViolation, SceneDraft, StopVoteRecord, TerminationReason};
use crate::agreement::{AgreementProtocol, AgreementStrategy};
use crate::config::MeetingConfig;
use crate::error::{CoordinationError, CoordinationResult};
use crate::extract;
use crate::gateway::{CallPurpose, CompletionRequest, LanguageModelGateway};
use crate::meeting::SourceArticle;
use crate::persona::Roster;
use crate::scene::SceneGenerator;
use crate::templates::{render, PromptTemplates};

/// Everything a discussion run needs to know about its scene.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneContext {
    /// 0-based position in the scene plan.
    pub scene_index: usize,
    pub scene_description: String,
    /// Accumulated director feedback from earlier rejected attempts.
    pub director_notes: String,
    /// `>Scene n summary` lines for every earlier scene.
    pub previous_scenes: String,
    /// TL;DR of the immediately preceding scene.
    pub previous_summary: Option<String>,
    /// Last utterance of the preceding scene, shown on the first turn.
    pub last_dialogue: Option<String>,
    /// Role that closed the preceding scene.
    pub last_speaker: Option<String>,
}

/// A parsed turn reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReply {
    pub turn: String,
    pub wants_vote: bool,
    /// 1-based index into the remaining agents, if the model gave one.
    pub next_speaker: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawTurnReply {
    #[serde(default)]
    turn: Option<Value>,
    #[serde(default)]
    wants_vote: Option<Value>,
    #[serde(default)]
    next_speaker: Option<Value>,
}

fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn coerce_index(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => extract::parse_integer(s),
        _ => None,
    }
}

/// Parse a turn reply. A missing or empty `turn` is malformed; `wants_vote`
/// and `next_speaker` are coerced leniently.
pub fn parse_turn_reply(raw: &str, wants_vote_default: bool) -> CoordinationResult<TurnReply> {
    let reply: RawTurnReply =
        extract::parse_json(raw).map_err(|e| CoordinationError::malformed("turn", e.to_string()))?;
    let turn = match reply.turn {
        Some(Value::String(s)) if !s.trim().is_empty() => s,
        Some(Value::String(_)) | None | Some(Value::Null) => {
            return Err(CoordinationError::malformed("turn", "missing utterance"));
        }
        Some(other) => other.to_string(),
    };
    Ok(TurnReply {
        turn,
        wants_vote: reply
            .wants_vote
            .as_ref()
            .and_then(coerce_bool)
            .unwrap_or(wants_vote_default),
        next_speaker: reply.next_speaker.as_ref().and_then(coerce_index),
    })
}

/// Resolve a 1-based starting-agent reply against `eligible` (roster
/// indices). Falls back to the first eligible agent.
pub fn resolve_starting_agent(
    roster: &Roster,
    eligible: &[usize],
    raw: &str,
) -> (usize, Option<ProtocolViolation>) {
    let fallback = eligible.first().copied().unwrap_or(0);
    let fallback_role = roster.role(fallback).to_string();
    match extract::parse_integer(raw) {
        Some(value) if value >= 1 && (value as usize) <= eligible.len() => {
            (eligible[value as usize - 1], None)
        }
        Some(value) => (
            fallback,
            Some(ProtocolViolation::StartingAgentOutOfRange {
                value,
                eligible: eligible.len(),
                fallback: fallback_role,
            }),
        ),
        None => (
            fallback,
            Some(ProtocolViolation::StartingAgentUnparsable {
                raw: raw.trim().to_string(),
                fallback: fallback_role,
            }),
        ),
    }
}

/// Resolve a 1-based `next_speaker` against everyone except `current`.
/// Invalid choices fall back round-robin to the agent after `current` in
/// roster order.
pub fn resolve_next_speaker(
    roster: &Roster,
    current: usize,
    choice: Option<i64>,
    turn: u32,
) -> (usize, Option<ProtocolViolation>) {
    let remaining = roster.remaining_after(current);
    let fallback = remaining
        .get(current)
        .or_else(|| remaining.first())
        .copied()
        .unwrap_or(current);
    let fallback_role = roster.role(fallback).to_string();
    match choice {
        Some(value) if value >= 1 && (value as usize) <= remaining.len() => {
            (remaining[value as usize - 1], None)
        }
        Some(value) => (
            fallback,
            Some(ProtocolViolation::NextSpeakerOutOfRange {
                turn,
                value,
                remaining: remaining.len(),
                fallback: fallback_role,
            }),
        ),
        None => (
            fallback,
            Some(ProtocolViolation::NextSpeakerMissing {
                turn,
                fallback: fallback_role,
            }),
        ),
    }
}

fn or_placeholder<'s>(text: &'s str, placeholder: &'s str) -> &'s str {
    if text.trim().is_empty() {
        placeholder
    } else {
        text
    }
}

/// Turn-taking engine bound to one roster and article.
pub struct DiscussionProtocol<'a> {
    gateway: &'a dyn LanguageModelGateway,
    templates: &'a PromptTemplates,
    config: &'a MeetingConfig,
    roster: &'a Roster,
    article: &'a SourceArticle,
    agreement: AgreementProtocol<'a>,
}

impl<'a> DiscussionProtocol<'a> {
    pub fn new(
        gateway: &'a dyn LanguageModelGateway,
        templates: &'a PromptTemplates,
        config: &'a MeetingConfig,
        roster: &'a Roster,
        article: &'a SourceArticle,
    ) -> Self {
        Self {
            gateway,
            templates,
            config,
            roster,
            article,
            agreement: AgreementProtocol::new(
                AgreementStrategy::DialogueEnd,
                gateway,
                templates,
                roster,
                config,
            ),
        }
    }

    /// Ask the model who opens the scene. The previous scene's last speaker
    /// is excluded from scene 1 onward.
    pub async fn select_starting_agent(
        &self,
        ctx: &SceneContext,
    ) -> CoordinationResult<(usize, Option<ProtocolViolation>)> {
        let last_speaker = if ctx.scene_index > 0 {
            ctx.last_speaker.as_deref()
        } else {
            None
        };
        let eligible = self.roster.eligible_starters(last_speaker);
        let listing = self.roster.listing(&eligible);
        let request = CompletionRequest::new(
            CallPurpose::StartingAgent,
            self.config.tokens.starting_agent,
        )
        .system(render(
            &self.templates.starting_agent_system,
            &[("meeting_type", &self.config.meeting_type)],
        ))
        .user(render(
            &self.templates.starting_agent_user,
            &[
                ("scene_description", &ctx.scene_description),
                (
                    "previous_summary",
                    ctx.previous_summary.as_deref().unwrap_or("None"),
                ),
                ("agents", &listing),
            ],
        ));
        let raw = self.gateway.complete(&request).await?;
        let (chosen, violation) = resolve_starting_agent(self.roster, &eligible, &raw);
        if let Some(v) = &violation {
            warn!(
                scene = ctx.scene_index,
                raw = %raw.trim(),
                fallback = %v.fallback(),
                "Invalid starting agent, using first eligible"
            );
        }
        Ok((chosen, violation))
    }

    fn turn_request(
        &self,
        ctx: &SceneContext,
        speaker: usize,
        draft: &SceneDraft,
        first_turn: bool,
    ) -> CompletionRequest {
        let persona = self.roster.get(speaker);
        let profile = persona.map(|p| p.profile()).unwrap_or_default();
        let last_dialogue_section = match (&ctx.last_dialogue, first_turn) {
            (Some(line), true) if !line.trim().is_empty() => render(
                &self.templates.turn_last_dialogue,
                &[("last_dialogue", line)],
            ),
            _ => String::new(),
        };
        let rendered_draft = draft.render();
        let remaining = self
            .roster
            .listing(&self.roster.remaining_after(speaker));

        CompletionRequest::new(CallPurpose::Turn, self.config.tokens.turn)
            .system(render(
                &self.templates.turn_system,
                &[
                    ("role", self.roster.role(speaker)),
                    ("meeting_type", &self.config.meeting_type),
                    ("language", &self.config.language),
                    ("persona", &profile),
                ],
            ))
            .user(render(
                &self.templates.turn_user,
                &[
                    ("scene_description", &ctx.scene_description),
                    ("director_notes", or_placeholder(&ctx.director_notes, "None")),
                    (
                        "previous_scenes",
                        or_placeholder(&ctx.previous_scenes, "None, this is the first scene."),
                    ),
                    ("last_dialogue_section", &last_dialogue_section),
                    ("draft", or_placeholder(&rendered_draft, "(no dialogue yet)")),
                    ("remaining_agents", &remaining),
                    ("language", &self.config.language),
                ],
            ))
    }

    /// Run one discussion from an empty draft.
    pub async fn run(
        &self,
        ctx: &SceneContext,
        deadline: Option<Instant>,
    ) -> CoordinationResult<DiscussionOutcome> {
        let mut guard = TurnGuard::new(&self.config.discussion, deadline);
        let mut violations = Vec::new();
        let mut stop_votes = Vec::new();
        let mut draft = SceneDraft::new();
        let mut turn: u32 = 0;
        let mut agreement = false;
        let mut termination = None;

        if let GuardDecision::DeadlineExceeded { elapsed_ms } = guard.before_turn() {
            warn!(scene = ctx.scene_index, elapsed_ms, "Scene deadline passed before discussion");
            return Ok(DiscussionOutcome {
                draft,
                turn_count: 0,
                last_speaker: None,
                termination: TerminationReason::Deadline,
                soft_max_turns: guard.soft_max_turns(),
                extensions: 0,
                violations,
                stop_votes,
            });
        }

        let (mut current, violation) = self.select_starting_agent(ctx).await?;
        violations.extend(violation);
        info!(
            scene = ctx.scene_index,
            starter = %self.roster.role(current),
            "Discussion started"
        );

        while guard.allows_turn(turn, agreement) {
            if let GuardDecision::DeadlineExceeded { elapsed_ms } = guard.before_turn() {
                warn!(scene = ctx.scene_index, turn, elapsed_ms, "Scene deadline passed, ending discussion");
                termination = Some(TerminationReason::Deadline);
                break;
            }

            let request = self.turn_request(ctx, current, &draft, turn == 0);
            turn += 1;
            let raw = self.gateway.complete(&request).await?;
            let reply = parse_turn_reply(&raw, self.config.discussion.wants_vote_default)?;
            draft.push(self.roster.role(current), &reply.turn);
            debug!(
                scene = ctx.scene_index,
                turn,
                speaker = %self.roster.role(current),
                wants_vote = reply.wants_vote,
                "Turn taken"
            );

            let (next, violation) =
                resolve_next_speaker(self.roster, current, reply.next_speaker, turn);
            if let Some(v) = violation {
                warn!(
                    scene = ctx.scene_index,
                    turn,
                    choice = ?reply.next_speaker,
                    fallback = %v.fallback(),
                    "Invalid next speaker, falling back round-robin"
                );
                violations.push(v);
            }

            if reply.wants_vote {
                let outcome = self
                    .agreement
                    .vote_dialogue_end(&draft.render(), &ctx.scene_description, &self.article.text)
                    .await?;
                agreement = outcome.stop;
                stop_votes.push(StopVoteRecord { turn, outcome });
            }

            match guard.after_turn(turn, agreement) {
                GuardDecision::HardCapReached { turns } => {
                    if !agreement {
                        info!(scene = ctx.scene_index, turns, "Hard turn cap reached, forcing end");
                        termination = Some(TerminationReason::HardCap);
                    }
                    agreement = true;
                }
                GuardDecision::Extended { soft_max_turns } => {
                    debug!(scene = ctx.scene_index, turn, soft_max_turns, "Soft turn cap extended");
                }
                _ => {}
            }
            current = next;
        }

        let termination = termination.unwrap_or(if agreement {
            TerminationReason::Agreement
        } else {
            TerminationReason::HardCap
        });
        info!(
            scene = ctx.scene_index,
            turns = turn,
            termination = %termination,
            violations = violations.len(),
            "Discussion finished"
        );
        Ok(DiscussionOutcome {
            last_speaker: draft.last_speaker().map(str::to_string),
            draft,
            turn_count: turn,
            termination,
            soft_max_turns: guard.soft_max_turns(),
            extensions: guard.extensions(),
            violations,
            stop_votes,
        })
    }
}

/// Binds a protocol to one scene so the acceptance loop can regenerate it.
pub struct DiscussionRun<'p, 'a> {
    protocol: &'p DiscussionProtocol<'a>,
    context: SceneContext,
    deadline: Option<Instant>,
}

impl<'p, 'a> DiscussionRun<'p, 'a> {
    pub fn new(
        protocol: &'p DiscussionProtocol<'a>,
        context: SceneContext,
        deadline: Option<Instant>,
    ) -> Self {
        Self {
            protocol,
            context,
            deadline,
        }
    }
}

#[async_trait]
impl SceneGenerator for DiscussionRun<'_, '_> {
    async fn generate(&self, director_notes: &str) -> CoordinationResult<DiscussionOutcome> {
        let mut ctx = self.context.clone();
        ctx.director_notes = director_notes.to_string();
        self.protocol.run(&ctx, self.deadline).await
    }

    fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiscussionConfig;
    use crate::gateway::ScriptedGateway;
    use crate::persona::Persona;
    use std::time::Duration;

    fn roster() -> Roster {
        Roster::new(vec![
            Persona::new("Chair", "Runs the meeting"),
            Persona::new("Historian", "Knows the background"),
            Persona::new("Engineer", "Builds things"),
        ])
        .unwrap()
    }

    fn article() -> SourceArticle {
        SourceArticle::new("Bridges", "Bridges span rivers.")
    }

    fn turn_json(text: &str, wants_vote: bool, next: i64) -> String {
        format!(r#"{{"turn": "{text}", "wants_vote": {wants_vote}, "next_speaker": {next}}}"#)
    }

    fn ctx() -> SceneContext {
        SceneContext {
            scene_description: "Open the meeting.".into(),
            ..SceneContext::default()
        }
    }

    #[test]
    fn test_parse_turn_reply_lenient_fields() {
        let reply = parse_turn_reply(
            r#"```json
{"turn": "Hello all.", "wants_vote": "false", "next_speaker": "2"}
```"#,
            true,
        )
        .unwrap();
        assert_eq!(reply.turn, "Hello all.");
        assert!(!reply.wants_vote);
        assert_eq!(reply.next_speaker, Some(2));
    }

    #[test]
    fn test_parse_turn_reply_defaults_wants_vote() {
        let reply = parse_turn_reply(r#"{"turn": "Hi"}"#, true).unwrap();
        assert!(reply.wants_vote);
        assert_eq!(reply.next_speaker, None);
    }

    #[test]
    fn test_parse_turn_reply_malformed() {
        let err = parse_turn_reply("I would like to say hello", true).unwrap_err();
        assert!(err.is_attempt_recoverable());
        let err = parse_turn_reply(r#"{"wants_vote": true}"#, true).unwrap_err();
        assert!(matches!(err, CoordinationError::MalformedResponse { .. }));
    }

    #[test]
    fn test_resolve_starting_agent() {
        let roster = roster();
        let eligible = roster.eligible_starters(Some("Chair"));
        assert_eq!(resolve_starting_agent(&roster, &eligible, "2"), (2, None));

        let (chosen, violation) = resolve_starting_agent(&roster, &eligible, "7");
        assert_eq!(chosen, 1);
        assert!(matches!(
            violation,
            Some(ProtocolViolation::StartingAgentOutOfRange { value: 7, eligible: 2, .. })
        ));

        let (chosen, violation) = resolve_starting_agent(&roster, &eligible, "Historian");
        assert_eq!(chosen, 1);
        assert_eq!(violation.unwrap().fallback(), "Historian");
    }

    #[test]
    fn test_resolve_next_speaker_in_range() {
        let roster = roster();
        // Remaining after Chair: [Historian, Engineer].
        assert_eq!(resolve_next_speaker(&roster, 0, Some(2), 1), (2, None));
        assert_eq!(resolve_next_speaker(&roster, 0, Some(1), 1), (1, None));
    }

    #[test]
    fn test_resolve_next_speaker_round_robin_fallback() {
        let roster = roster();
        assert_eq!(resolve_next_speaker(&roster, 0, Some(5), 1).0, 1);
        assert_eq!(resolve_next_speaker(&roster, 1, Some(0), 1).0, 2);
        assert_eq!(resolve_next_speaker(&roster, 2, Some(-3), 1).0, 0);
        let (next, violation) = resolve_next_speaker(&roster, 2, None, 4);
        assert_eq!(next, 0);
        assert_eq!(
            violation,
            Some(ProtocolViolation::NextSpeakerMissing {
                turn: 4,
                fallback: "Chair".into()
            })
        );
    }

    #[tokio::test]
    async fn test_single_turn_unanimous_stop() {
        let gateway = ScriptedGateway::new()
            .respond(CallPurpose::StartingAgent, "1")
            .respond(CallPurpose::Turn, turn_json("Welcome.", true, 1))
            .fallback(CallPurpose::StopVote, r#"{"reasoning": "done", "vote": 0}"#);
        let roster = roster();
        let templates = PromptTemplates::default();
        let config = MeetingConfig::default();
        let article = article();
        let protocol = DiscussionProtocol::new(&gateway, &templates, &config, &roster, &article);

        let outcome = protocol.run(&ctx(), None).await.unwrap();
        assert_eq!(outcome.turn_count, 1);
        assert_eq!(outcome.draft.len(), 1);
        assert_eq!(outcome.last_speaker.as_deref(), Some("Chair"));
        assert_eq!(outcome.termination, TerminationReason::Agreement);
        assert_eq!(outcome.scene_text(), "\n>>Chair: Welcome.");
        assert_eq!(gateway.call_count(CallPurpose::StopVote), 3);
    }

    #[tokio::test]
    async fn test_speakers_follow_next_speaker() {
        let gateway = ScriptedGateway::new()
            .respond(CallPurpose::StartingAgent, "2")
            .respond(CallPurpose::Turn, turn_json("I recall.", false, 2))
            .respond(CallPurpose::Turn, turn_json("I build.", false, 1))
            .respond(CallPurpose::Turn, turn_json("Let's wrap.", true, 1))
            .fallback(CallPurpose::StopVote, r#"{"vote": 0}"#);
        let roster = roster();
        let templates = PromptTemplates::default();
        let config = MeetingConfig::default();
        let article = article();
        let protocol = DiscussionProtocol::new(&gateway, &templates, &config, &roster, &article);

        let outcome = protocol.run(&ctx(), None).await.unwrap();
        let speakers: Vec<_> = outcome
            .draft
            .utterances()
            .iter()
            .map(|u| u.speaker.as_str())
            .collect();
        assert_eq!(speakers, vec!["Historian", "Engineer", "Chair"]);
        assert_eq!(outcome.stop_votes.len(), 1);
        assert!(outcome.violations.is_empty());
    }

    #[tokio::test]
    async fn test_hard_cap_without_agreement() {
        let gateway = ScriptedGateway::new()
            .respond(CallPurpose::StartingAgent, "1")
            .fallback(CallPurpose::Turn, turn_json("More.", true, 1))
            .fallback(CallPurpose::StopVote, r#"{"vote": 1}"#);
        let roster = roster();
        let templates = PromptTemplates::default();
        let config = MeetingConfig {
            discussion: DiscussionConfig {
                soft_max_turns: 3,
                hard_max_turns: 8,
                extension: 2,
                ..DiscussionConfig::default()
            },
            ..MeetingConfig::default()
        };
        let article = article();
        let protocol = DiscussionProtocol::new(&gateway, &templates, &config, &roster, &article);

        let outcome = protocol.run(&ctx(), None).await.unwrap();
        assert_eq!(outcome.turn_count, 8);
        assert_eq!(outcome.termination, TerminationReason::HardCap);
        assert!(outcome.extensions >= 1);
    }

    #[tokio::test]
    async fn test_first_turn_sees_last_dialogue_and_exclusion() {
        let gateway = ScriptedGateway::new()
            .respond(CallPurpose::StartingAgent, "1")
            .respond(CallPurpose::Turn, turn_json("Picking up.", false, 1))
            .respond(CallPurpose::Turn, turn_json("Agreed.", true, 1))
            .fallback(CallPurpose::StopVote, r#"{"vote": 0}"#);
        let roster = roster();
        let templates = PromptTemplates::default();
        let config = MeetingConfig::default();
        let article = article();
        let protocol = DiscussionProtocol::new(&gateway, &templates, &config, &roster, &article);
        let context = SceneContext {
            scene_index: 1,
            last_dialogue: Some("Chair: See you after the break.".into()),
            last_speaker: Some("Chair".into()),
            ..ctx()
        };

        let outcome = protocol.run(&context, None).await.unwrap();
        assert_eq!(outcome.draft.utterances()[0].speaker, "Historian");

        let starter = &gateway.requests_for(CallPurpose::StartingAgent)[0];
        assert!(!starter.transcript().contains("Chair: Runs the meeting"));
        let turns = gateway.requests_for(CallPurpose::Turn);
        assert!(turns[0].transcript().contains("See you after the break."));
        assert!(!turns[1].transcript().contains("See you after the break."));
    }

    #[tokio::test]
    async fn test_malformed_turn_propagates() {
        let gateway = ScriptedGateway::new()
            .respond(CallPurpose::StartingAgent, "1")
            .respond(CallPurpose::Turn, "Sorry, I can't answer in JSON.");
        let roster = roster();
        let templates = PromptTemplates::default();
        let config = MeetingConfig::default();
        let article = article();
        let protocol = DiscussionProtocol::new(&gateway, &templates, &config, &roster, &article);

        let err = protocol.run(&ctx(), None).await.unwrap_err();
        assert!(err.is_attempt_recoverable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_stops_between_turns() {
        let gateway = ScriptedGateway::new()
            .respond(CallPurpose::StartingAgent, "1")
            .respond_after(
                CallPurpose::Turn,
                turn_json("Long answer.", false, 1),
                Duration::from_secs(30),
            )
            .fallback(CallPurpose::Turn, turn_json("Never.", false, 1));
        let roster = roster();
        let templates = PromptTemplates::default();
        let config = MeetingConfig::default();
        let article = article();
        let protocol = DiscussionProtocol::new(&gateway, &templates, &config, &roster, &article);

        let deadline = Instant::now() + Duration::from_secs(10);
        let outcome = protocol.run(&ctx(), Some(deadline)).await.unwrap();
        assert_eq!(outcome.turn_count, 1);
        assert_eq!(outcome.termination, TerminationReason::Deadline);
    }
}
