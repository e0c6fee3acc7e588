//! On-disk outputs for a meeting run.
//!
//! Three files share one stem, `{domain}_{meeting_type}_{title}`:
//! - `{stem}_scenes.jsonl`: append-only scene evolution log, one line per scene
//! - `{stem}_rejections.jsonl`: append-only critic rejection log
//! - `{stem}.json`: the finished meeting

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use coordination::discussion::TerminationReason;
use coordination::scene::{AcceptanceKind, RejectionRecord};
use coordination::{CoordinationError, CoordinationResult, MeetingTranscript, SceneRecord, SceneSink};
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<PersistenceError> for CoordinationError {
    fn from(e: PersistenceError) -> Self {
        CoordinationError::Sink(e.to_string())
    }
}

static UNSAFE_CHARS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^A-Za-z0-9_\-]+").expect("UNSAFE_CHARS_RE regex should compile")
});

/// Make `part` safe for a file name: runs of anything but ASCII letters,
/// digits, `-` and `_` become one `_`.
pub fn sanitize(part: &str) -> String {
    let cleaned = UNSAFE_CHARS_RE.replace_all(part.trim(), "_");
    let cleaned = cleaned.trim_matches('_');
    if cleaned.is_empty() {
        "untitled".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Output file locations for one meeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub scenes: PathBuf,
    pub rejections: PathBuf,
    pub meeting: PathBuf,
    pub chunks: PathBuf,
}

impl OutputPaths {
    pub fn new(dir: &Path, domain: Option<&str>, meeting_type: &str, title: &str) -> Self {
        let stem = format!(
            "{}_{}_{}",
            sanitize(domain.unwrap_or("general")),
            sanitize(meeting_type),
            sanitize(title)
        );
        Self {
            scenes: dir.join(format!("{stem}_scenes.jsonl")),
            rejections: dir.join(format!("{stem}_rejections.jsonl")),
            meeting: dir.join(format!("{stem}.json")),
            chunks: dir.join(format!("{stem}_chunks.json")),
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PersistenceError {
    let path = path.display().to_string();
    move |source| PersistenceError::Io { path, source }
}

fn append_jsonl<T: Serialize>(path: &Path, record: &T) -> Result<(), PersistenceError> {
    let json = serde_json::to_string(record)?;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_error(path))?;
    writeln!(file, "{json}").map_err(io_error(path))
}

/// Write `value` as pretty JSON, creating parent directories.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).map_err(io_error(path))?;
    info!(path = %path.display(), "Wrote meeting output");
    Ok(())
}

/// One line of the scene evolution log.
#[derive(Debug, Serialize)]
pub struct SceneLogEntry<'a> {
    pub scene_index: usize,
    pub description: &'a str,
    pub acceptance: AcceptanceKind,
    pub rejections: u32,
    pub generations: u32,
    pub turn_count: u32,
    pub termination: TerminationReason,
    pub special_effects_applied: bool,
    pub original: &'a str,
    pub refined: &'a str,
    pub ai_feedback: &'a str,
    pub finalized: &'a str,
    pub tldr: &'a str,
    pub completed_at: DateTime<Utc>,
}

impl<'a> From<&'a SceneRecord> for SceneLogEntry<'a> {
    fn from(record: &'a SceneRecord) -> Self {
        Self {
            scene_index: record.scene_index,
            description: &record.description,
            acceptance: record.acceptance,
            rejections: record.rejections,
            generations: record.generations,
            turn_count: record.turn_count,
            termination: record.termination,
            special_effects_applied: record.evolution.special_effects_applied,
            original: &record.evolution.original,
            refined: &record.evolution.refined,
            ai_feedback: &record.evolution.ai_feedback,
            finalized: &record.evolution.finalized,
            tldr: &record.tldr,
            completed_at: record.completed_at,
        }
    }
}

/// [`SceneSink`] appending to the scene and rejection JSONL logs.
pub struct JsonlSceneSink {
    paths: OutputPaths,
}

impl JsonlSceneSink {
    /// Create the output directory and start both logs empty.
    pub fn create(paths: OutputPaths) -> Result<Self, PersistenceError> {
        for path in [&paths.scenes, &paths.rejections] {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(io_error(parent))?;
            }
            std::fs::File::create(path).map_err(io_error(path))?;
        }
        Ok(Self { paths })
    }

    pub fn paths(&self) -> &OutputPaths {
        &self.paths
    }

    pub fn write_meeting(&self, transcript: &MeetingTranscript) -> Result<(), PersistenceError> {
        write_json(&self.paths.meeting, transcript)
    }
}

impl SceneSink for JsonlSceneSink {
    fn scene_rejected(&self, record: &RejectionRecord) -> CoordinationResult<()> {
        append_jsonl(&self.paths.rejections, record)?;
        debug!(
            scene = record.scene_index,
            attempt = record.attempt,
            "Logged scene rejection"
        );
        Ok(())
    }

    fn scene_completed(&self, record: &SceneRecord) -> CoordinationResult<()> {
        append_jsonl(&self.paths.scenes, &SceneLogEntry::from(record))?;
        debug!(scene = record.scene_index, "Logged scene evolution");
        Ok(())
    }
}
