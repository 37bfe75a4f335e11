use crate::core::posting::PostingId;
use crate::error::{ConsolidationError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unordered pair of posting ids, stored lowest id first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PostingPair {
    pub first: PostingId,
    pub second: PostingId,
}

impl PostingPair {
    pub fn new(a: PostingId, b: PostingId) -> Self {
        if a <= b {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }

    pub fn contains(&self, id: &PostingId) -> bool {
        &self.first == id || &self.second == id
    }
}

/// A reviewer's verdict on a proposed pairing. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchDecision {
    pub pair: PostingPair,
    pub accepted: bool,
    pub decided_by: String,
    pub decided_at: DateTime<Utc>,
}

impl MatchDecision {
    pub fn accept(pair: PostingPair, by: impl Into<String>) -> Self {
        Self {
            pair,
            accepted: true,
            decided_by: by.into(),
            decided_at: Utc::now(),
        }
    }

    pub fn reject(pair: PostingPair, by: impl Into<String>) -> Self {
        Self {
            pair,
            accepted: false,
            decided_by: by.into(),
            decided_at: Utc::now(),
        }
    }
}

/// Append-only record of manual match decisions for a group.
///
/// Accepted pairs are applied ahead of auto-matching on every later run and
/// are never proposed again. Rejected pairs are never proposed again, but
/// each posting stays free to pair with another candidate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionLog {
    decisions: BTreeMap<PostingPair, MatchDecision>,
}

impl DecisionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a decision. A pair can be decided once; a posting can belong to
    /// at most one accepted pair.
    pub fn record(&mut self, decision: MatchDecision) -> Result<()> {
        let already = || ConsolidationError::DecisionAlreadyRecorded {
            first: decision.pair.first.to_string(),
            second: decision.pair.second.to_string(),
        };
        if self.decisions.contains_key(&decision.pair) {
            return Err(already());
        }
        if decision.accepted {
            let conflict = self.accepted().any(|d| {
                d.pair.contains(&decision.pair.first) || d.pair.contains(&decision.pair.second)
            });
            if conflict {
                return Err(already());
            }
        }
        log::info!(
            "match {} / {} {} by {}",
            decision.pair.first,
            decision.pair.second,
            if decision.accepted { "accepted" } else { "rejected" },
            decision.decided_by
        );
        self.decisions.insert(decision.pair.clone(), decision);
        Ok(())
    }

    pub fn get(&self, pair: &PostingPair) -> Option<&MatchDecision> {
        self.decisions.get(pair)
    }

    pub fn is_rejected(&self, pair: &PostingPair) -> bool {
        self.decisions.get(pair).map_or(false, |d| !d.accepted)
    }

    /// Accepted decisions in pair order.
    pub fn accepted(&self) -> impl Iterator<Item = &MatchDecision> {
        self.decisions.values().filter(|d| d.accepted)
    }

    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(a: &str, b: &str) -> PostingPair {
        PostingPair::new(PostingId::new(a), PostingId::new(b))
    }

    #[test]
    fn test_pair_is_unordered() {
        assert_eq!(pair("B-1", "A-1"), pair("A-1", "B-1"));
        assert_eq!(pair("B-1", "A-1").first.as_str(), "A-1");
    }

    #[test]
    fn test_decision_is_immutable() {
        let mut log = DecisionLog::new();
        log.record(MatchDecision::accept(pair("A-1", "B-1"), "alice")).unwrap();
        let err = log
            .record(MatchDecision::reject(pair("B-1", "A-1"), "bob"))
            .unwrap_err();
        assert!(matches!(err, ConsolidationError::DecisionAlreadyRecorded { .. }));
        assert!(log.get(&pair("A-1", "B-1")).unwrap().accepted);
    }

    #[test]
    fn test_posting_in_one_accepted_pair_only() {
        let mut log = DecisionLog::new();
        log.record(MatchDecision::accept(pair("A-1", "B-1"), "alice")).unwrap();
        assert!(log.record(MatchDecision::accept(pair("A-1", "B-2"), "alice")).is_err());
        // A rejection involving the same posting is still recordable.
        log.record(MatchDecision::reject(pair("A-1", "B-3"), "alice")).unwrap();
        assert!(log.is_rejected(&pair("A-1", "B-3")));
        assert_eq!(log.accepted().count(), 1);
    }
}
