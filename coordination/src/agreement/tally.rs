//! Vote parsing and aggregation.
//!
//! Pure functions over collected votes; the protocol layer gathers votes
//! from agents and hands them here.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::extract;

/// Outcome of a stop/continue vote round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopVoteOutcome {
    /// One vote per agent in roster order (0 = stop, 1 = continue).
    pub votes: Vec<u8>,
    /// Mean of `votes`.
    pub mean: f64,
    /// Whether the discussion should end.
    pub stop: bool,
}

impl StopVoteOutcome {
    /// Stop iff the mean vote is strictly below `threshold`. An exact tie at
    /// the threshold continues. No votes means no consensus to stop.
    pub fn from_votes(votes: Vec<u8>, threshold: f64) -> Self {
        if votes.is_empty() {
            return Self {
                votes,
                mean: 1.0,
                stop: false,
            };
        }
        let mean = votes.iter().map(|&v| f64::from(v)).sum::<f64>() / votes.len() as f64;
        Self {
            stop: mean < threshold,
            votes,
            mean,
        }
    }
}

/// Result of a best-candidate vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionOutcome {
    /// Winning candidate index.
    pub index: usize,
    /// Winning candidate text.
    pub text: String,
    /// One index vote per agent in roster order.
    pub votes: Vec<usize>,
    /// Votes received by each candidate.
    pub counts: Vec<usize>,
}

/// Plurality winner among `candidates` choices; ties go to the lowest index.
/// Returns `None` when there are no candidates. Out-of-range votes are ignored.
pub fn plurality(votes: &[usize], candidates: usize) -> Option<(usize, Vec<usize>)> {
    if candidates == 0 {
        return None;
    }
    let mut counts = vec![0usize; candidates];
    for &v in votes {
        if let Some(c) = counts.get_mut(v) {
            *c += 1;
        }
    }
    let mut best = 0;
    for (i, &c) in counts.iter().enumerate() {
        if c > counts[best] {
            best = i;
        }
    }
    Some((best, counts))
}

/// The structured stop-vote reply. Field types are loose because models
/// return `"1"`, `1`, and `true` interchangeably.
#[derive(Debug, Clone, Deserialize)]
struct StopVoteReply {
    #[serde(default)]
    reasoning: Option<Value>,
    #[serde(default)]
    vote: Option<Value>,
}

/// Parse a stop-vote reply into `(vote, reasoning)`. Anything unparsable,
/// missing, or outside {0, 1} becomes a stop vote (0).
pub fn parse_stop_vote(raw: &str) -> (u8, Option<String>) {
    let reply = match extract::parse_json::<StopVoteReply>(raw) {
        Ok(reply) => reply,
        Err(e) => {
            warn!(error = %e, "Unparsable stop vote, counting as stop");
            return (0, None);
        }
    };
    let reasoning = reply.reasoning.map(|r| match r {
        Value::String(s) => s,
        other => other.to_string(),
    });
    let vote = match reply.vote {
        Some(Value::Number(n)) => match n.as_i64() {
            Some(1) => 1,
            _ => 0,
        },
        Some(Value::Bool(true)) => 1,
        Some(Value::String(s)) if s.trim() == "1" => 1,
        _ => 0,
    };
    (vote, reasoning)
}

/// Parse a 0-based index vote into `0..candidates`.
pub fn parse_index_vote(raw: &str, candidates: usize) -> Result<usize, String> {
    let value = extract::parse_integer(raw).ok_or_else(|| format!("not an integer: {raw:?}"))?;
    match usize::try_from(value) {
        Ok(index) if index < candidates => Ok(index),
        _ => Err(format!("index {value} outside 0..{candidates}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_threshold_examples() {
        assert!(StopVoteOutcome::from_votes(vec![0, 0, 1], 0.5).stop);
        assert!(!StopVoteOutcome::from_votes(vec![1, 1, 0], 0.5).stop);
        assert!(!StopVoteOutcome::from_votes(vec![0, 1], 0.5).stop);
        assert!(StopVoteOutcome::from_votes(vec![0, 0, 0], 0.5).stop);
    }

    #[test]
    fn test_stop_mean() {
        let outcome = StopVoteOutcome::from_votes(vec![0, 0, 1], 0.5);
        assert!((outcome.mean - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_stop_no_votes_continues() {
        assert!(!StopVoteOutcome::from_votes(vec![], 0.5).stop);
    }

    #[test]
    fn test_plurality_simple() {
        let (winner, counts) = plurality(&[2, 2, 0], 3).unwrap();
        assert_eq!(winner, 2);
        assert_eq!(counts, vec![1, 0, 2]);
    }

    #[test]
    fn test_plurality_tie_lowest_index() {
        assert_eq!(plurality(&[2, 1, 1, 2], 3).unwrap().0, 1);
        assert_eq!(plurality(&[2, 0], 3).unwrap().0, 0);
    }

    #[test]
    fn test_plurality_no_votes_first_candidate() {
        assert_eq!(plurality(&[], 2).unwrap().0, 0);
        assert!(plurality(&[0], 0).is_none());
    }

    #[test]
    fn test_parse_stop_vote_variants() {
        assert_eq!(parse_stop_vote(r#"{"reasoning":"more","vote":1}"#).0, 1);
        assert_eq!(parse_stop_vote(r#"{"reasoning":"more","vote":"1"}"#).0, 1);
        assert_eq!(parse_stop_vote(r#"{"vote": true}"#).0, 1);
        assert_eq!(parse_stop_vote(r#"{"vote": 0}"#).0, 0);
        assert_eq!(parse_stop_vote(r#"{"vote": 7}"#).0, 0);
    }

    #[test]
    fn test_parse_stop_vote_defaults_to_stop() {
        assert_eq!(parse_stop_vote("let's keep talking"), (0, None));
        assert_eq!(parse_stop_vote("{}").0, 0);
    }

    #[test]
    fn test_parse_stop_vote_keeps_reasoning() {
        let (_, reasoning) = parse_stop_vote("```json\n{\"reasoning\": \"plan covered\", \"vote\": 0}\n```");
        assert_eq!(reasoning.as_deref(), Some("plan covered"));
    }

    #[test]
    fn test_parse_index_vote() {
        assert_eq!(parse_index_vote("1", 3), Ok(1));
        assert_eq!(parse_index_vote(" 2.\n", 3), Ok(2));
        assert_eq!(parse_index_vote("\"0\"", 3), Ok(0));
        assert!(parse_index_vote("3", 3).is_err());
        assert!(parse_index_vote("the first", 3).is_err());
        assert!(parse_index_vote("-1", 3).is_err());
    }
}
