//! Splitting a meeting transcript into speaker turns and word-bounded chunks.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Default chunk size in words.
pub const DEFAULT_CHUNK_WORDS: usize = 500;

/// One speaker's contiguous contribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerTurn {
    pub speaker: String,
    pub text: String,
}

impl SpeakerTurn {
    pub fn word_count(&self) -> usize {
        self.speaker.split_whitespace().count() + self.text.split_whitespace().count()
    }
}

impl std::fmt::Display for SpeakerTurn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.speaker, self.text)
    }
}

static TURN_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)(?:^[ \t]*(?:>>)?|>>)[ \t]*([A-Za-z][\w .()\-,'/&]{0,80}?):\s")
        .expect("TURN_MARKER_RE regex should compile")
});

/// Speaker turns marked by `>>Role:` or a line starting with `Role:`. Text
/// before the first marker is dropped.
pub fn speaker_turns(transcript: &str) -> Vec<SpeakerTurn> {
    let markers: Vec<_> = TURN_MARKER_RE.captures_iter(transcript).collect();
    let mut turns = Vec::with_capacity(markers.len());
    for (i, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(transcript.len());
        let text = transcript[whole.end()..end].trim();
        turns.push(SpeakerTurn {
            speaker: name.as_str().trim().to_string(),
            text: text.to_string(),
        });
    }
    turns
}

/// Greedily pack whole speaker turns into chunks of at most `max_words`
/// words. A turn longer than `max_words` becomes a chunk of its own.
pub fn chunk_transcript(transcript: &str, max_words: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_words = 0;

    for turn in speaker_turns(transcript) {
        let words = turn.word_count();
        if current_words + words > max_words && !current.is_empty() {
            chunks.push(current.join(" "));
            current.clear();
            current_words = 0;
        }
        current.push(turn.to_string());
        current_words += words;
    }
    if !current.is_empty() {
        chunks.push(current.join(" "));
    }
    chunks
}
