use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use coordination::{LanguageModelGateway, RetryingGateway};
use meeting_agents::{run_meeting, ApiStyle, AppConfig, MeetingInput, OpenAiGateway, RunOptions};
use tracing::info;

/// Generate a multi-agent meeting transcript from an article and a scene plan.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Meeting input document (JSON with article, personas, scene_plan)
    input: PathBuf,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output directory (overrides MEETING_OUTPUT_DIR and the config file)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Endpoint dialect (overrides MEETING_LLM_API_STYLE)
    #[arg(long, value_enum)]
    api_style: Option<ApiStyle>,

    /// Meeting type (overrides the input document and config)
    #[arg(long)]
    meeting_type: Option<String>,

    /// Seed for the special-effects draw
    #[arg(long)]
    seed: Option<u64>,

    /// Summarize the finished transcript
    #[arg(long, default_value_t = false)]
    summary: bool,

    /// Also write the transcript in chunks of at most this many words
    #[arg(long)]
    chunk_words: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }
    if let Some(style) = args.api_style {
        config.endpoint.api_style = style;
    }
    if let Some(seed) = args.seed {
        config.meeting.acceptance.seed = Some(seed);
    }
    let templates = config.templates()?;

    let mut input = MeetingInput::from_file(&args.input)?;
    if let Some(meeting_type) = args.meeting_type {
        input.meeting_type = Some(meeting_type);
    }

    info!(
        url = %config.endpoint.url,
        model = %config.endpoint.model,
        output = %config.output_dir.display(),
        "Meeting generator starting"
    );

    let http = OpenAiGateway::new(config.endpoint.clone()).context("Failed to build HTTP client")?;
    let gateway: Arc<dyn LanguageModelGateway> =
        Arc::new(RetryingGateway::new(http, config.retry.to_policy()));

    let options = RunOptions {
        summarize: args.summary,
        chunk_words: args.chunk_words,
    };
    let report = run_meeting(&config, templates, &input, gateway, &options).await?;

    info!(
        scenes = report.transcript.scenes.len(),
        chunks = report.chunks.len(),
        meeting = %report.paths.meeting.display(),
        scenes_log = %report.paths.scenes.display(),
        rejections_log = %report.paths.rejections.display(),
        "Done"
    );
    Ok(())
}
