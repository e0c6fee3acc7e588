//! Scene memory: continuity context across scenes.
//!
//! One slot per planned scene, holding the scene's TL;DR and its last line
//! of dialogue. Slots are written once, in scene order, after a scene is
//! fully finalized; later scenes only ever read earlier slots.
//!
//! # Modules
//!
//! - [`store`]: SceneMemory trait, MemorySlot, in-memory implementation
//! - [`errors`]: Typed errors for out-of-order and repeated writes

pub mod errors;
pub mod store;

pub use errors::MemoryError;
pub use store::{MemorySlot, MemorySnapshot, SceneMemory, SceneMemoryStore};
