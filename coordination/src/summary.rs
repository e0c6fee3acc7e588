//! Meeting-minutes style summary of the source material.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::MeetingConfig;
use crate::error::CoordinationResult;
use crate::extract::Validate;
use crate::gateway::{complete_structured, CallPurpose, CompletionRequest, LanguageModelGateway};
use crate::meeting::SourceArticle;
use crate::templates::{render, PromptTemplates};

/// Words per output token assumed when sizing the summary.
pub const WORDS_PER_TOKEN: f64 = 0.66;

/// Structured summary reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MeetingSummary {
    pub summary: String,
}

impl Validate for MeetingSummary {
    fn validate(&self) -> Result<(), String> {
        if self.summary.trim().is_empty() {
            return Err("summary is empty".into());
        }
        Ok(())
    }
}

/// Word budget for a summary limited to `max_tokens` output tokens.
pub fn word_budget(max_tokens: u32) -> u32 {
    (f64::from(max_tokens) * WORDS_PER_TOKEN).floor() as u32
}

pub struct MeetingSummarizer<'a> {
    gateway: &'a dyn LanguageModelGateway,
    templates: &'a PromptTemplates,
    config: &'a MeetingConfig,
}

impl<'a> MeetingSummarizer<'a> {
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

    /// Summarize `content` (the article text or a generated transcript).
    pub async fn summarize(
        &self,
        article: &SourceArticle,
        content: &str,
    ) -> CoordinationResult<MeetingSummary> {
        let max_tokens = self.config.tokens.meeting_summary;
        let max_words = word_budget(max_tokens).to_string();
        let request = CompletionRequest::new(CallPurpose::MeetingSummary, max_tokens)
            .system(render(
                &self.templates.meeting_summary_system,
                &[
                    ("meeting_type", &self.config.meeting_type),
                    ("language", &self.config.language),
                    ("max_words", &max_words),
                ],
            ))
            .user(render(
                &self.templates.meeting_summary_user,
                &[
                    ("meeting_type", &self.config.meeting_type),
                    ("article_title", &article.title),
                    ("content", content),
                ],
            ));
        let summary: MeetingSummary =
            complete_structured(self.gateway, request, "meeting_summary").await?;
        info!(
            article = %article.title,
            words = summary.summary.split_whitespace().count(),
            "Meeting summary generated"
        );
        Ok(summary)
    }
}
