//! One end-to-end meeting run: generate, optionally summarize, persist.

use std::sync::Arc;

use anyhow::{Context, Result};
use coordination::{
    chunk_transcript, AcceptanceKind, LanguageModelGateway, MeetingGenerator, MeetingSummarizer,
    MeetingTranscript, PromptTemplates,
};
use tracing::info;

use crate::config::AppConfig;
use crate::input::MeetingInput;
use crate::persistence::{write_json, JsonlSceneSink, OutputPaths};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Generate a minutes-style summary of the finished transcript.
    pub summarize: bool,
    /// Also write the transcript split into chunks of at most this many words.
    pub chunk_words: Option<usize>,
}

#[derive(Debug)]
pub struct RunReport {
    pub transcript: MeetingTranscript,
    pub paths: OutputPaths,
    pub chunks: Vec<String>,
}

pub async fn run_meeting(
    config: &AppConfig,
    templates: PromptTemplates,
    input: &MeetingInput,
    gateway: Arc<dyn LanguageModelGateway>,
    options: &RunOptions,
) -> Result<RunReport> {
    let mut meeting = config.meeting.clone();
    if let Some(meeting_type) = &input.meeting_type {
        meeting.meeting_type = meeting_type.clone();
    }
    if let Some(language) = &input.language {
        meeting.language = language.clone();
    }

    let roster = input.roster()?;
    let paths = OutputPaths::new(
        &config.output_dir,
        input.article.domain.as_deref(),
        &meeting.meeting_type,
        &input.article.title,
    );
    let sink = JsonlSceneSink::create(paths.clone())?;

    info!(
        model = gateway.model_name(),
        title = %input.article.title,
        meeting_type = %meeting.meeting_type,
        scenes = input.scene_plan.len(),
        "Starting meeting run"
    );

    let generator = MeetingGenerator::new(gateway.clone(), templates.clone(), meeting.clone())?;
    let mut transcript = generator
        .generate_meeting(&input.article, roster, &input.scene_plan, &sink)
        .await
        .context("Meeting generation failed")?;

    if options.summarize {
        let summary = MeetingSummarizer::new(gateway.as_ref(), &templates, &meeting)
            .summarize(&input.article, &transcript.text)
            .await
            .context("Meeting summary failed")?;
        transcript.summary = Some(summary.summary);
    }
    sink.write_meeting(&transcript)?;

    let chunks = match options.chunk_words {
        Some(max_words) => {
            let chunks = chunk_transcript(&transcript.text, max_words);
            write_json(&paths.chunks, &chunks)?;
            chunks
        }
        None => Vec::new(),
    };

    info!(
        id = %transcript.id,
        scenes = transcript.scenes.len(),
        forced = transcript
            .scenes
            .iter()
            .filter(|s| s.acceptance == AcceptanceKind::Forced)
            .count(),
        path = %paths.meeting.display(),
        "Meeting run complete"
    );
    Ok(RunReport {
        transcript,
        paths,
        chunks,
    })
}
