use chrono::NaiveDate;
use consolidation_engine::config::account_map::AccountMap;
use consolidation_engine::config::elimination_rule::EliminationRule;
use consolidation_engine::config::nci_map::NciMap;
use consolidation_engine::config::rate_policy::RatePolicy;
use consolidation_engine::config::settings::{EngineSettings, LedgerPresentation};
use consolidation_engine::core::account::{AccountCode, AccountPurpose, TrialBalance, TrialBalanceLine};
use consolidation_engine::core::currency::{CurrencyCode, RateBasis, RateTable};
use consolidation_engine::core::entity::EntityCode;
use consolidation_engine::core::ledger::ConsolLedger;
use consolidation_engine::core::period::Period;
use consolidation_engine::core::posting::{IntercompanyPosting, PostingSet};
use consolidation_engine::elimination::decisions::{DecisionLog, MatchDecision};
use consolidation_engine::elimination::matcher::{EliminationMatcher, MatchSource};
use consolidation_engine::error::ConsolidationError;
use consolidation_engine::graph::ownership_graph::OwnershipEdge;
use consolidation_engine::graph::resolver::{ConsolidationMethod, OwnershipResolver, ResolvedEntity};
use consolidation_engine::nci::calculator::NciCalculator;
use consolidation_engine::translation::engine::{TranslatedBalance, TranslatedLine, TranslationEngine};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet, HashMap};

fn code(i: usize) -> EntityCode {
    EntityCode::new(format!("E{}", i))
}

fn from() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
}

fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 11, 30).unwrap()
}

fn period() -> Period {
    Period::new(2025, 11).unwrap()
}

/// Edges where entity `j` is only owned by entities `< j`; entity 0 is the root.
fn build_edges(children: &[Vec<(usize, u32)>]) -> Vec<OwnershipEdge> {
    let mut edges = Vec::new();
    for (k, parents) in children.iter().enumerate() {
        let child = k + 1;
        let mut seen = BTreeSet::new();
        let picked: Vec<(usize, u32)> = parents
            .iter()
            .map(|(p, pct)| (p % child, *pct))
            .filter(|(p, _)| seen.insert(*p))
            .collect();
        let shared = picked.len() > 1;
        for (parent, pct) in picked {
            let edge = OwnershipEdge::new(code(parent), code(child), Decimal::new(i64::from(pct), 2), from());
            edges.push(if shared { edge.shared() } else { edge });
        }
    }
    edges
}

/// Random acyclic ownership graph of 2..8 entities.
fn arb_dag() -> impl Strategy<Value = Vec<OwnershipEdge>> {
    (2usize..8).prop_flat_map(|n| {
        prop::collection::vec(prop::collection::vec((0usize..100, 1u32..=100), 1..3), n - 1)
            .prop_map(|children| build_edges(&children))
    })
}

/// Sum over all paths of the product of percentages, computed recursively.
fn uncapped_effective(edges: &[OwnershipEdge]) -> HashMap<EntityCode, Decimal> {
    let mut effective: HashMap<EntityCode, Decimal> = HashMap::new();
    effective.insert(code(0), Decimal::ONE);
    let mut ordered: Vec<&OwnershipEdge> = edges.iter().collect();
    // Children are numbered after all their parents.
    ordered.sort_by_key(|e| e.child.as_str()[1..].parse::<usize>().unwrap_or(0));
    for edge in ordered {
        let parent = effective.get(&edge.parent).copied().unwrap_or(Decimal::ZERO);
        *effective.entry(edge.child.clone()).or_insert(Decimal::ZERO) += parent * edge.percentage;
    }
    effective
}

fn account_map() -> AccountMap {
    AccountMap::new()
        .with_pattern("1*", AccountPurpose::MonetaryAsset)
        .with_pattern("2*", AccountPurpose::MonetaryLiability)
        .with_pattern("15*", AccountPurpose::NonMonetary)
        .with_pattern("3*", AccountPurpose::Equity)
        .with_pattern("4*", AccountPurpose::ProfitAndLoss)
}

fn rates() -> RateTable {
    RateTable::new(CurrencyCode::new("USD"))
        .with_rate("EUR", RateBasis::Closing, period(), Decimal::new(10834, 4))
        .and_then(|r| r.with_rate("EUR", RateBasis::Average, period(), Decimal::new(10777, 4)))
        .and_then(|r| r.with_rate("EUR", RateBasis::Historical, period(), Decimal::new(11203, 4)))
        .unwrap()
}

/// Trial balance with distinct accounts and random amounts in cents.
fn arb_trial_balance() -> impl Strategy<Value = TrialBalance> {
    let accounts = vec!["1000", "1100", "1500", "2000", "2100", "3000", "3100", "4000", "4100"];
    prop::collection::btree_map(prop::sample::select(accounts), -10_000_000i64..10_000_000, 1..9).prop_map(
        |lines: BTreeMap<&str, i64>| {
            TrialBalance::new(
                EntityCode::new("X"),
                lines
                    .into_iter()
                    .map(|(account, cents)| TrialBalanceLine::new(account, Decimal::new(cents, 2), "EUR"))
                    .collect(),
            )
        },
    )
}

fn translated_line(account: &str, purpose: AccountPurpose, cents: i64) -> TranslatedLine {
    let amount = Decimal::new(cents, 2);
    TranslatedLine {
        account: AccountCode::new(account),
        purpose,
        local_amount: amount,
        local_currency: CurrencyCode::new("USD"),
        basis: None,
        rate: Decimal::ONE,
        amount,
    }
}

/// Reciprocal posting pairs between a few entities, some with small deltas.
fn arb_postings() -> impl Strategy<Value = Vec<IntercompanyPosting>> {
    let entities = vec!["A", "B", "C", "D"];
    prop::collection::vec(
        (
            prop::sample::select(entities.clone()),
            prop::sample::select(entities),
            1_000i64..10_000_000,
            0i64..500,
            0u32..3,
        ),
        1..12,
    )
    .prop_map(|pairs| {
        let mut postings = Vec::new();
        for (k, (lender, borrower, cents, delta, day)) in pairs.into_iter().enumerate() {
            if lender == borrower {
                continue;
            }
            let date = NaiveDate::from_ymd_opt(2025, 11, 20 + day).unwrap();
            postings.push(IntercompanyPosting::new(
                format!("R{:03}", k),
                lender,
                borrower,
                "1400",
                Decimal::new(cents, 2),
                "USD",
                date,
            ));
            postings.push(IntercompanyPosting::new(
                format!("P{:03}", k),
                borrower,
                lender,
                "2400",
                -Decimal::new(cents - delta, 2),
                "USD",
                date,
            ));
        }
        postings
    })
}

fn elimination_rules() -> Vec<EliminationRule> {
    vec![EliminationRule::new("IC", "*400").with_tolerance(Decimal::new(5, 0))]
}

proptest! {
    // ===================================================================
    // INVARIANT 1: Cyclic ownership is always detected.
    //
    // Closing any acyclic group with an edge back into the root must be
    // rejected, never resolved.
    // ===================================================================
    #[test]
    fn cycles_are_always_detected(mut edges in arb_dag()) {
        let last = edges.iter().map(|e| e.child.clone()).max_by_key(|c| c.as_str()[1..].parse::<usize>().unwrap_or(0)).unwrap();
        edges.push(OwnershipEdge::new(last, code(0), Decimal::new(1, 2), from()));

        let result = OwnershipResolver::new(EngineSettings::default()).resolve(&code(0), &edges, as_of());
        match result {
            Err(ConsolidationError::CyclicOwnership { path }) => prop_assert!(path.len() >= 2),
            other => prop_assert!(false, "expected a cycle, got {:?}", other.map(|r| r.len())),
        }
    }

    // ===================================================================
    // INVARIANT 2: Effective ownership is the path-product sum, capped at 1.
    // ===================================================================
    #[test]
    fn effective_is_capped_path_sum(edges in arb_dag()) {
        let resolution = OwnershipResolver::new(EngineSettings::default())
            .resolve(&code(0), &edges, as_of())
            .unwrap();
        let expected = uncapped_effective(&edges);

        for resolved in resolution.entities() {
            prop_assert!(resolved.effective_percentage <= Decimal::ONE);
            prop_assert!(resolved.effective_percentage > Decimal::ZERO);
            let want = expected[&resolved.entity].min(Decimal::ONE);
            prop_assert_eq!(resolved.effective_percentage, want, "entity {}", resolved.entity);
            if resolved.entity != code(0) {
                let path_sum: Decimal = resolved.paths.iter().map(|p| p.percentage).sum();
                prop_assert_eq!(path_sum.min(Decimal::ONE), resolved.effective_percentage);
            }
        }
    }

    // ===================================================================
    // INVARIANT 3: Full consolidation requires controlled holding at or
    // above the threshold; NCI share is only ever positive for full.
    // ===================================================================
    #[test]
    fn classification_respects_thresholds(edges in arb_dag()) {
        let settings = EngineSettings::default();
        let resolution = OwnershipResolver::new(settings.clone())
            .resolve(&code(0), &edges, as_of())
            .unwrap();
        for r in resolution.entities() {
            if r.method == ConsolidationMethod::Full && r.entity != code(0) {
                prop_assert!(r.controlled_holding >= settings.control_threshold);
            }
            if r.method != ConsolidationMethod::Full {
                prop_assert_eq!(r.nci_share(), Decimal::ZERO);
            }
        }
    }

    // ===================================================================
    // INVARIANT 4: Translation is deterministic and balances with CTA.
    //
    // Line order in the source trial balance never changes the result,
    // and translated lines plus the CTA residual sum to exactly zero.
    // ===================================================================
    #[test]
    fn translation_is_deterministic_and_balanced(tb in arb_trial_balance()) {
        let policy = RatePolicy::default();
        let accounts = account_map();
        let rates = rates();
        let presentation = LedgerPresentation::new("USD");
        let engine = TranslationEngine::new(&policy, &[], &accounts, &rates, &presentation, period());

        let forward = engine.translate(&tb).unwrap();
        let mut reversed = tb.clone();
        reversed.lines.reverse();
        let backward = engine.translate(&reversed).unwrap();

        prop_assert_eq!(&forward, &backward);
        prop_assert_eq!(forward.total() + forward.cta, Decimal::ZERO);
        for line in &forward.lines {
            prop_assert_eq!(line.amount, line.amount.round_dp(2));
        }
    }

    // ===================================================================
    // INVARIANT 5: NCI is the minority share of the participating lines,
    // rounded once per output account.
    // ===================================================================
    #[test]
    fn nci_is_share_of_equity_and_pl(
        equity in prop::collection::vec(-10_000_000i64..10_000_000, 1..4),
        pl in prop::collection::vec(-10_000_000i64..10_000_000, 1..4),
        ownership in 1u32..=100,
    ) {
        let mut lines = Vec::new();
        for (i, cents) in equity.iter().enumerate() {
            lines.push(translated_line(&format!("30{:02}", i), AccountPurpose::Equity, *cents));
        }
        for (i, cents) in pl.iter().enumerate() {
            lines.push(translated_line(&format!("40{:02}", i), AccountPurpose::ProfitAndLoss, *cents));
        }
        let balance = TranslatedBalance {
            entity: EntityCode::new("S"),
            currency: CurrencyCode::new("USD"),
            lines,
            cta: Decimal::ZERO,
        };
        let effective = Decimal::new(i64::from(ownership), 2);
        let resolved = ResolvedEntity {
            entity: EntityCode::new("S"),
            effective_percentage: effective,
            controlled_holding: effective,
            method: ConsolidationMethod::Full,
            exclusion: None,
            paths: Vec::new(),
        };
        let map = NciMap::default();
        let presentation = LedgerPresentation::new("USD");
        let nci = NciCalculator::new(&map, &presentation).compute(&resolved, &balance);

        let share = Decimal::ONE - effective;
        let equity_total: Decimal = equity.iter().map(|c| Decimal::new(*c, 2)).sum();
        let pl_total: Decimal = pl.iter().map(|c| Decimal::new(*c, 2)).sum();
        let mut ledger = ConsolLedger::new();
        ledger.extend(nci);

        let nci_equity = ledger.total_for(|l| l.account.as_str() == "NCI-EQUITY");
        let nci_pl = ledger.total_for(|l| l.account.as_str() == "NCI-PL");
        prop_assert_eq!(nci_equity, presentation.round(equity_total * share));
        prop_assert_eq!(nci_pl, presentation.round(pl_total * share));
        prop_assert!((nci_equity - equity_total * share).abs() <= Decimal::new(5, 3));
        if share == Decimal::ZERO {
            prop_assert!(ledger.is_empty());
        }
    }

    // ===================================================================
    // INVARIANT 6: Accepted pairs are never proposed again.
    //
    // Accepting every pending proposal and re-running leaves nothing
    // pending, and each accepted pair is eliminated as a manual match.
    // ===================================================================
    #[test]
    fn accepted_pairs_are_never_reproposed(postings in arb_postings()) {
        let rules = elimination_rules();
        let presentation = LedgerPresentation::new("USD");
        let matcher = EliminationMatcher::new(&rules, &presentation);
        let set: PostingSet = postings.into_iter().collect();

        let first = matcher.run(&set, &DecisionLog::new());
        let mut log = DecisionLog::new();
        for proposal in &first.pending {
            log.record(MatchDecision::accept(proposal.pair.clone(), "reviewer")).unwrap();
        }

        let second = matcher.run(&set, &log);
        prop_assert!(second.pending.is_empty());
        for proposal in &first.pending {
            prop_assert!(second
                .accepted
                .iter()
                .any(|m| m.proposal.pair == proposal.pair && m.source == MatchSource::Manual));
        }
        prop_assert!(second.accepted.len() >= first.accepted.len());

        let mut ledger = ConsolLedger::new();
        ledger.extend(second.lines.iter().cloned());
        prop_assert!(ledger.is_balanced(), "elimination entries must net to zero");
    }

    // ===================================================================
    // INVARIANT 7: Matching does not depend on input order.
    // ===================================================================
    #[test]
    fn matching_is_order_independent(postings in arb_postings()) {
        let rules = elimination_rules();
        let presentation = LedgerPresentation::new("USD");
        let matcher = EliminationMatcher::new(&rules, &presentation);

        let mut reversed = postings.clone();
        reversed.reverse();
        let a = matcher.run(&postings.into_iter().collect(), &DecisionLog::new());
        let b = matcher.run(&reversed.into_iter().collect(), &DecisionLog::new());
        prop_assert_eq!(a, b);
    }
}
