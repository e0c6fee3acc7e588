//! SceneMemory abstraction and its in-memory store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::MemoryError;

/// One scene's continuity record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySlot {
    /// TL;DR summaries; the first entry is the canonical one.
    pub summaries: Vec<String>,
    /// Last dialogue lines, parallel to `summaries`.
    pub last_dialogues: Vec<String>,
    /// When the slot was written.
    pub written_at: Option<DateTime<Utc>>,
}

impl MemorySlot {
    pub fn is_populated(&self) -> bool {
        self.written_at.is_some()
    }

    pub fn summary(&self) -> Option<&str> {
        self.summaries.first().map(String::as_str)
    }

    pub fn last_dialogue(&self) -> Option<&str> {
        self.last_dialogues.first().map(String::as_str)
    }
}

/// Snapshot of the memory state for inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    /// Planned scene count.
    pub slots: usize,
    /// Slots written so far.
    pub populated: usize,
    /// Index of the next slot to be written, if any remain.
    pub next_index: Option<usize>,
}

/// Trait for scene memory stores.
pub trait SceneMemory {
    /// Record an accepted scene's TL;DR and last dialogue line.
    fn record(&mut self, index: usize, summary: &str, last_dialogue: &str)
        -> Result<(), MemoryError>;

    /// The slot for scene `index`, if it has been written.
    fn slot(&self, index: usize) -> Option<&MemorySlot>;

    /// Number of planned scenes.
    fn slot_count(&self) -> usize;

    /// Get a snapshot of the memory state.
    fn snapshot(&self) -> MemorySnapshot;

    /// TL;DR of scene `index`.
    fn summary(&self, index: usize) -> Option<&str> {
        self.slot(index).and_then(MemorySlot::summary)
    }

    /// Last dialogue line of scene `index`.
    fn last_dialogue(&self, index: usize) -> Option<&str> {
        self.slot(index).and_then(MemorySlot::last_dialogue)
    }

    /// Every written TL;DR from scene 0 through `upto`, one per line as
    /// `>Scene {n} {summary}` with 1-based scene numbers.
    fn summaries_through(&self, upto: usize) -> String {
        (0..=upto)
            .filter_map(|i| self.summary(i).map(|s| format!(">Scene {} {}", i + 1, s)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// The last `count` TL;DRs through `upto`, space-joined.
    fn recent_summaries(&self, upto: usize, count: usize) -> String {
        let written: Vec<&str> = (0..=upto).filter_map(|i| self.summary(i)).collect();
        let start = written.len().saturating_sub(count);
        written[start..].join(" ")
    }
}

/// In-memory implementation of SceneMemory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneMemoryStore {
    slots: Vec<MemorySlot>,
}

impl SceneMemoryStore {
    /// Create a store with one empty slot per planned scene.
    pub fn new(scene_count: usize) -> Self {
        Self {
            slots: vec![MemorySlot::default(); scene_count],
        }
    }
}

impl SceneMemory for SceneMemoryStore {
    fn record(
        &mut self,
        index: usize,
        summary: &str,
        last_dialogue: &str,
    ) -> Result<(), MemoryError> {
        let slots = self.slots.len();
        if index >= slots {
            return Err(MemoryError::SlotOutOfRange { index, slots });
        }
        if self.slots[index].is_populated() {
            return Err(MemoryError::AlreadyWritten(index));
        }
        if let Some(missing) = (0..index).find(|&i| !self.slots[i].is_populated()) {
            return Err(MemoryError::OutOfOrder { index, missing });
        }

        let slot = &mut self.slots[index];
        slot.summaries.push(summary.to_string());
        slot.last_dialogues.push(last_dialogue.to_string());
        slot.written_at = Some(Utc::now());
        Ok(())
    }

    fn slot(&self, index: usize) -> Option<&MemorySlot> {
        self.slots.get(index).filter(|s| s.is_populated())
    }

    fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn snapshot(&self) -> MemorySnapshot {
        let populated = self.slots.iter().filter(|s| s.is_populated()).count();
        MemorySnapshot {
            slots: self.slots.len(),
            populated,
            next_index: (populated < self.slots.len()).then_some(populated),
        }
    }
}
