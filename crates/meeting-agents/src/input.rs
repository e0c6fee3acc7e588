//! The meeting input document: what to discuss, who attends, and the scene plan.

use std::path::Path;

use coordination::{Persona, PersonaError, Roster, SourceArticle};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Input has an empty scene plan")]
    EmptyScenePlan,

    #[error(transparent)]
    Persona(#[from] PersonaError),
}

/// JSON input for one meeting.
///
/// ```json
/// {
///   "article": {"title": "Coral Reef", "text": "...", "domain": "Biology"},
///   "meeting_type": "brainstorming session",
///   "personas": [{"role": "Chair", "description": "Runs the meeting"}],
///   "scene_plan": ["The chair opens the meeting.", "..."]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingInput {
    pub article: SourceArticle,
    pub personas: Vec<Persona>,
    pub scene_plan: Vec<String>,
    /// Overrides the configured meeting type.
    #[serde(default)]
    pub meeting_type: Option<String>,
    /// Overrides the configured language.
    #[serde(default)]
    pub language: Option<String>,
}

impl MeetingInput {
    pub fn from_file(path: &Path) -> Result<Self, InputError> {
        let text = std::fs::read_to_string(path).map_err(|source| InputError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let input: Self = serde_json::from_str(&text).map_err(|source| InputError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        if input.scene_plan.is_empty() {
            return Err(InputError::EmptyScenePlan);
        }
        Ok(input)
    }

    pub fn roster(&self) -> Result<Roster, InputError> {
        Ok(Roster::new(self.personas.clone())?)
    }
}
