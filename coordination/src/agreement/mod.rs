//! Agreement protocol: agent voting.
//!
//! Named strategies chosen at construction and dispatched through
//! [`AgreementProtocol::run`]:
//!
//! - `vote_best_summary`: every agent picks one candidate by index;
//!   plurality wins, ties go to the lowest index
//! - `vote_dialogue_end`: every agent votes stop (0) or continue (1);
//!   the discussion stops iff the mean is below the threshold
//!
//! Votes are requested in roster order, or concurrently when
//! `VotingConfig::parallel` is set; aggregation always sees roster order.

pub mod tally;

use std::future::Future;
use std::str::FromStr;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::MeetingConfig;
use crate::error::{CoordinationError, CoordinationResult};
use crate::gateway::{CallPurpose, CompletionRequest, LanguageModelGateway};
use crate::persona::{Persona, Roster};
use crate::templates::{render, PromptTemplates};

pub use tally::{
    parse_index_vote, parse_stop_vote, plurality, SelectionOutcome, StopVoteOutcome,
};

/// Voting strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgreementStrategy {
    BestSummary,
    DialogueEnd,
}

impl std::fmt::Display for AgreementStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BestSummary => write!(f, "vote_best_summary"),
            Self::DialogueEnd => write!(f, "vote_dialogue_end"),
        }
    }
}

impl FromStr for AgreementStrategy {
    type Err = CoordinationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vote_best_summary" | "best_summary" => Ok(Self::BestSummary),
            "vote_dialogue_end" | "dialogue_end" => Ok(Self::DialogueEnd),
            other => Err(CoordinationError::InvalidConfig(format!(
                "unknown agreement strategy: {other}"
            ))),
        }
    }
}

/// Input to one voting round.
#[derive(Debug, Clone, Copy)]
pub enum AgreementPayload<'p> {
    Candidates {
        candidates: &'p [String],
        memory_context: &'p str,
    },
    Dialogue {
        draft: &'p str,
        scene_plan: &'p str,
        article: &'p str,
    },
}

/// Result of one voting round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgreementDecision {
    Selected(SelectionOutcome),
    Dialogue(StopVoteOutcome),
}

/// Voting over the current roster.
pub struct AgreementProtocol<'a> {
    strategy: AgreementStrategy,
    gateway: &'a dyn LanguageModelGateway,
    templates: &'a PromptTemplates,
    roster: &'a Roster,
    config: &'a MeetingConfig,
}

impl<'a> AgreementProtocol<'a> {
    pub fn new(
        strategy: AgreementStrategy,
        gateway: &'a dyn LanguageModelGateway,
        templates: &'a PromptTemplates,
        roster: &'a Roster,
        config: &'a MeetingConfig,
    ) -> Self {
        Self {
            strategy,
            gateway,
            templates,
            roster,
            config,
        }
    }

    pub fn strategy(&self) -> AgreementStrategy {
        self.strategy
    }

    /// Run the configured strategy on `payload`.
    pub async fn run(&self, payload: AgreementPayload<'_>) -> CoordinationResult<AgreementDecision> {
        match (self.strategy, payload) {
            (
                AgreementStrategy::BestSummary,
                AgreementPayload::Candidates {
                    candidates,
                    memory_context,
                },
            ) => self
                .vote_best_summary(candidates, memory_context)
                .await
                .map(AgreementDecision::Selected),
            (
                AgreementStrategy::DialogueEnd,
                AgreementPayload::Dialogue {
                    draft,
                    scene_plan,
                    article,
                },
            ) => self
                .vote_dialogue_end(draft, scene_plan, article)
                .await
                .map(AgreementDecision::Dialogue),
            (strategy, _) => Err(CoordinationError::InvalidConfig(format!(
                "payload does not match strategy {strategy}"
            ))),
        }
    }

    /// Each agent votes for one candidate; the plurality choice wins.
    pub async fn vote_best_summary(
        &self,
        candidates: &[String],
        memory_context: &str,
    ) -> CoordinationResult<SelectionOutcome> {
        if candidates.is_empty() {
            return Err(CoordinationError::InvalidConfig(
                "vote_best_summary needs at least one candidate".into(),
            ));
        }
        let listing = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{i}. {c}"))
            .collect::<Vec<_>>()
            .join("\n");

        let votes = self
            .gather(|persona| self.request_index_vote(persona, &listing, memory_context, candidates.len()))
            .await
            .into_iter()
            .collect::<CoordinationResult<Vec<usize>>>()?;

        let (index, counts) = plurality(&votes, candidates.len()).ok_or_else(|| {
            CoordinationError::InvalidConfig("vote_best_summary needs at least one candidate".into())
        })?;
        info!(
            strategy = %self.strategy,
            winner = index,
            votes = ?votes,
            "Summary vote concluded"
        );
        Ok(SelectionOutcome {
            index,
            text: candidates[index].clone(),
            votes,
            counts,
        })
    }

    /// Each agent votes stop (0) or continue (1) on the running draft.
    pub async fn vote_dialogue_end(
        &self,
        draft: &str,
        scene_plan: &str,
        article: &str,
    ) -> CoordinationResult<StopVoteOutcome> {
        let votes = self
            .gather(|persona| self.request_stop_vote(persona, draft, scene_plan, article))
            .await
            .into_iter()
            .collect::<CoordinationResult<Vec<u8>>>()?;

        let outcome = StopVoteOutcome::from_votes(votes, self.config.voting.stop_threshold);
        debug!(
            strategy = %self.strategy,
            votes = ?outcome.votes,
            mean = outcome.mean,
            stop = outcome.stop,
            "Stop vote concluded"
        );
        Ok(outcome)
    }

    async fn gather<'s, T, F, Fut>(&'s self, per_agent: F) -> Vec<T>
    where
        F: Fn(&'s Persona) -> Fut,
        Fut: Future<Output = T>,
    {
        let pending = self.roster.iter().map(|p| per_agent(p));
        if self.config.voting.parallel {
            join_all(pending).await
        } else {
            let mut out = Vec::with_capacity(self.roster.len());
            for fut in pending {
                out.push(fut.await);
            }
            out
        }
    }

    async fn request_stop_vote(
        &self,
        persona: &Persona,
        draft: &str,
        scene_plan: &str,
        article: &str,
    ) -> CoordinationResult<u8> {
        let profile = persona.profile();
        let request = CompletionRequest::new(CallPurpose::StopVote, self.config.tokens.stop_vote)
            .system(render(
                &self.templates.stop_vote_system,
                &[("role", &persona.role), ("persona", &profile)],
            ))
            .user(render(
                &self.templates.stop_vote_user,
                &[
                    ("scene_plan", scene_plan),
                    ("article", article),
                    ("draft", draft),
                ],
            ));
        let raw = self.gateway.complete(&request).await?;
        let (vote, reasoning) = parse_stop_vote(&raw);
        debug!(agent = %persona.role, vote, reasoning = ?reasoning, "Stop vote");
        Ok(vote)
    }

    async fn request_index_vote(
        &self,
        persona: &Persona,
        listing: &str,
        memory_context: &str,
        candidates: usize,
    ) -> CoordinationResult<usize> {
        let profile = persona.profile();
        let request =
            CompletionRequest::new(CallPurpose::SummaryVote, self.config.tokens.best_summary)
                .system(render(
                    &self.templates.best_summary_system,
                    &[
                        ("role", &persona.role),
                        ("persona", &profile),
                        ("memory_context", memory_context),
                    ],
                ))
                .user(render(
                    &self.templates.best_summary_user,
                    &[("candidates", listing)],
                ));
        let raw = self.gateway.complete(&request).await?;
        parse_index_vote(&raw, candidates).map_err(|detail| {
            warn!(agent = %persona.role, %detail, "Invalid summary vote");
            CoordinationError::InvalidVote {
                agent: persona.role.clone(),
                raw: raw.trim().to_string(),
            }
        })
    }
}
