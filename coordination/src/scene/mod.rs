//! Scene acceptance: critic verdicts, bounded regeneration, and the
//! finishing passes applied to an accepted scene.

pub mod acceptance;
pub mod critic;
pub mod pipeline;
pub mod state;

pub use acceptance::{
    snippet, AcceptanceKind, AcceptedScene, RejectionRecord, SceneAcceptance, SceneGenerator,
};
pub use critic::{DirectorCritic, SceneCritic, SceneVerdict, UNPARSABLE_VERDICT};
pub use pipeline::{SceneEvolution, ScenePostProcessor};
pub use state::{AcceptancePhase, AcceptanceTransition, SceneSession, TransitionError};
