use crate::config::elimination_rule::EliminationRule;
use crate::config::settings::LedgerPresentation;
use crate::core::ledger::{ConsolLine, LineTag};
use crate::core::posting::{IntercompanyPosting, PostingId, PostingSet};
use crate::elimination::decisions::{DecisionLog, PostingPair};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Candidate pairing of two reciprocal intercompany postings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchProposal {
    pub pair: PostingPair,
    pub rule_id: String,
    pub first_amount: Decimal,
    pub second_amount: Decimal,
    /// Signed sum of the two amounts; zero for an exact match.
    pub delta: Decimal,
    /// `1 - |delta| / max(|first|, |second|)`, in `[0, 1]`.
    pub confidence: Decimal,
    pub date_gap_days: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Auto,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedMatch {
    pub proposal: MatchProposal,
    pub source: MatchSource,
}

/// Result of one matching pass over a run's intercompany postings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub accepted: Vec<AcceptedMatch>,
    /// Pairings waiting for a manual decision.
    pub pending: Vec<MatchProposal>,
    /// Postings not eliminated, in id order. Includes postings held by a
    /// pending proposal.
    pub unresolved: Vec<IntercompanyPosting>,
    pub lines: Vec<ConsolLine>,
    pub posting_count: usize,
}

impl MatchOutcome {
    /// Share of postings eliminated by an accepted match.
    pub fn match_rate(&self) -> f64 {
        if self.posting_count == 0 {
            return 1.0;
        }
        (self.accepted.len() * 2) as f64 / self.posting_count as f64
    }
}

/// Pairs reciprocal intercompany postings under the group's elimination rules.
///
/// The input is a fully materialized [`PostingSet`], sorted by id, so the
/// result never depends on the order entity translations finished in.
///
/// Within a rule, candidate pairs are taken greedily by smallest absolute
/// delta, then earliest dates (the pair's earlier date, then its later one),
/// then lowest posting ids.
pub struct EliminationMatcher<'a> {
    rules: &'a [EliminationRule],
    presentation: &'a LedgerPresentation,
}

struct Candidate {
    pair: PostingPair,
    first: usize,
    second: usize,
    delta: Decimal,
    earliest: NaiveDate,
    latest: NaiveDate,
    gap: i64,
}

impl<'a> EliminationMatcher<'a> {
    pub fn new(rules: &'a [EliminationRule], presentation: &'a LedgerPresentation) -> Self {
        Self { rules, presentation }
    }

    /// First rule, in id order, covering the posting's account.
    fn rule_for(&self, posting: &IntercompanyPosting) -> Option<&'a EliminationRule> {
        self.rules
            .iter()
            .filter(|r| r.covers(&posting.account))
            .min_by(|a, b| a.id.cmp(&b.id))
    }

    pub fn run(&self, postings: &PostingSet, decisions: &DecisionLog) -> MatchOutcome {
        let items = postings.postings();
        // A shared id cannot be paired unambiguously; such postings stay unresolved.
        let mut taken: HashSet<PostingId> = items
            .iter()
            .filter(|p| postings.is_ambiguous(&p.id))
            .map(|p| p.id.clone())
            .collect();
        let mut outcome = MatchOutcome {
            posting_count: items.len(),
            ..Default::default()
        };

        // Accepted decisions are terminal and applied first.
        for decision in decisions.accepted() {
            let first = postings.get(&decision.pair.first);
            let second = postings.get(&decision.pair.second);
            let (Some(first), Some(second)) = (first, second) else {
                continue;
            };
            let rule_id = self
                .rule_for(first)
                .map_or_else(|| "manual".to_string(), |r| r.id.clone());
            let proposal = proposal_for(decision.pair.clone(), &rule_id, first, second);
            taken.insert(first.id.clone());
            taken.insert(second.id.clone());
            self.eliminate(&mut outcome, first, second, &proposal);
            outcome.accepted.push(AcceptedMatch {
                proposal,
                source: MatchSource::Manual,
            });
        }

        let mut rules: Vec<&EliminationRule> = self.rules.iter().collect();
        rules.sort_by(|a, b| a.id.cmp(&b.id));

        for rule in rules {
            let members: Vec<usize> = (0..items.len())
                .filter(|&i| !taken.contains(&items[i].id))
                .filter(|&i| self.rule_for(&items[i]).map_or(false, |r| r.id == rule.id))
                .collect();

            let mut candidates = Vec::new();
            for (pos, &i) in members.iter().enumerate() {
                for &j in &members[pos + 1..] {
                    if let Some(c) = candidate(rule, decisions, i, &items[i], j, &items[j]) {
                        candidates.push(c);
                    }
                }
            }
            candidates.sort_by(|a, b| {
                (a.delta.abs(), a.earliest, a.latest, &a.pair).cmp(&(b.delta.abs(), b.earliest, b.latest, &b.pair))
            });

            for c in candidates {
                let (first, second) = (&items[c.first], &items[c.second]);
                if taken.contains(&first.id) || taken.contains(&second.id) {
                    continue;
                }
                taken.insert(first.id.clone());
                taken.insert(second.id.clone());

                let mut proposal = proposal_for(c.pair, &rule.id, first, second);
                proposal.date_gap_days = c.gap;
                if rule.auto_match && proposal.confidence >= rule.min_confidence {
                    log::debug!(
                        "auto-matched {} / {} (delta {})",
                        proposal.pair.first,
                        proposal.pair.second,
                        proposal.delta
                    );
                    self.eliminate(&mut outcome, first, second, &proposal);
                    outcome.accepted.push(AcceptedMatch {
                        proposal,
                        source: MatchSource::Auto,
                    });
                } else {
                    outcome.pending.push(proposal);
                }
            }
        }

        let eliminated: HashSet<&PostingId> = outcome
            .accepted
            .iter()
            .flat_map(|m| [&m.proposal.pair.first, &m.proposal.pair.second])
            .collect();
        outcome.unresolved = items
            .iter()
            .filter(|p| !eliminated.contains(&p.id))
            .cloned()
            .collect();

        log::info!(
            "matched {} pairs, {} pending, {} unresolved postings",
            outcome.accepted.len(),
            outcome.pending.len(),
            outcome.unresolved.len()
        );
        outcome
    }

    /// Reverse both postings; any delta goes to the difference account.
    fn eliminate(
        &self,
        outcome: &mut MatchOutcome,
        first: &IntercompanyPosting,
        second: &IntercompanyPosting,
        proposal: &MatchProposal,
    ) {
        let currency = self.presentation.presentation_currency.clone();
        for posting in [first, second] {
            outcome.lines.push(ConsolLine::new(
                posting.account.clone(),
                LineTag::Elimination,
                -posting.amount,
                currency.clone(),
            ));
        }
        if proposal.delta != Decimal::ZERO {
            outcome.lines.push(ConsolLine::new(
                self.presentation.elimination_difference_account.clone(),
                LineTag::Elimination,
                proposal.delta,
                currency,
            ));
        }
    }
}

fn candidate(
    rule: &EliminationRule,
    decisions: &DecisionLog,
    i: usize,
    a: &IntercompanyPosting,
    j: usize,
    b: &IntercompanyPosting,
) -> Option<Candidate> {
    if !a.is_reciprocal_of(b) {
        return None;
    }
    let opposite = (a.amount > Decimal::ZERO && b.amount < Decimal::ZERO)
        || (a.amount < Decimal::ZERO && b.amount > Decimal::ZERO);
    if !opposite {
        return None;
    }
    let delta = a.amount + b.amount;
    if delta.abs() > rule.tolerance {
        return None;
    }
    let gap = (a.date - b.date).num_days().abs();
    if gap > rule.window_days {
        return None;
    }
    let pair = PostingPair::new(a.id.clone(), b.id.clone());
    if decisions.is_rejected(&pair) {
        return None;
    }
    let (first, second) = if a.id <= b.id { (i, j) } else { (j, i) };
    Some(Candidate {
        pair,
        first,
        second,
        delta,
        earliest: a.date.min(b.date),
        latest: a.date.max(b.date),
        gap,
    })
}

fn proposal_for(
    pair: PostingPair,
    rule_id: &str,
    first: &IntercompanyPosting,
    second: &IntercompanyPosting,
) -> MatchProposal {
    let delta = first.amount + second.amount;
    let scale = first.amount.abs().max(second.amount.abs());
    let confidence = if scale == Decimal::ZERO {
        Decimal::ONE
    } else {
        (Decimal::ONE - delta.abs() / scale).max(Decimal::ZERO).min(Decimal::ONE)
    };
    MatchProposal {
        pair,
        rule_id: rule_id.to_string(),
        first_amount: first.amount,
        second_amount: second.amount,
        delta,
        confidence,
        date_gap_days: (first.date - second.date).num_days().abs(),
    }
}
