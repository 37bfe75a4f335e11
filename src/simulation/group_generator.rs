//! Random consolidation groups for benchmarks and the CLI `generate` command.
//!
//! Every generated group is acyclic: entity `i` is only ever owned by
//! entities with a lower index. Trial balances balance in local currency and
//! intercompany balances are carried in the presentation currency, so
//! reciprocal postings eliminate exactly unless a mismatch is injected.

use crate::config::account_map::AccountMap;
use crate::config::elimination_rule::EliminationRule;
use crate::config::settings::LedgerPresentation;
use crate::config::store::GroupConfig;
use crate::core::account::{AccountPurpose, TrialBalance, TrialBalanceLine};
use crate::core::currency::{CurrencyCode, RateBasis, RateTable};
use crate::core::entity::{Entity, EntityCode};
use crate::core::period::Period;
use crate::core::posting::IntercompanyPosting;
use crate::graph::ownership_graph::OwnershipEdge;
use crate::scenario::{PeriodData, Scenario};
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

pub const IC_RECEIVABLE: &str = "IC-REC";
pub const IC_PAYABLE: &str = "IC-PAY";

/// Shape of a generated group.
#[derive(Debug, Clone)]
pub struct GroupGeneratorConfig {
    pub group: String,
    /// Number of entities including the group parent.
    pub entity_count: usize,
    pub presentation_currency: CurrencyCode,
    /// Functional currencies drawn for subsidiaries.
    pub currencies: Vec<CurrencyCode>,
    /// Reciprocal intercompany posting pairs to generate.
    pub intercompany_pairs: usize,
    /// Probability that an entity gets a second, shared parent.
    pub multi_parent_ratio: f64,
    /// Probability that a posting pair carries a small mismatch.
    pub mismatch_ratio: f64,
    pub period: Period,
    /// Fixed seed for reproducible groups.
    pub seed: Option<u64>,
}

impl Default for GroupGeneratorConfig {
    fn default() -> Self {
        Self {
            group: "GEN".to_string(),
            entity_count: 10,
            presentation_currency: CurrencyCode::new("USD"),
            currencies: vec![
                CurrencyCode::new("USD"),
                CurrencyCode::new("EUR"),
                CurrencyCode::new("GBP"),
            ],
            intercompany_pairs: 10,
            multi_parent_ratio: 0.1,
            mismatch_ratio: 0.1,
            period: Period { year: 2025, month: 11 },
            seed: None,
        }
    }
}

/// Generate a random group as a ready-to-install scenario.
pub fn generate_group(config: &GroupGeneratorConfig) -> Scenario {
    match config.seed {
        Some(seed) => generate_group_with(config, &mut StdRng::seed_from_u64(seed)),
        None => generate_group_with(config, &mut rand::thread_rng()),
    }
}

pub fn generate_group_with<R: Rng>(config: &GroupGeneratorConfig, rng: &mut R) -> Scenario {
    let count = config.entity_count.max(1);
    let period = config.period;
    let presentation = config.presentation_currency.clone();
    let acquired = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or(NaiveDate::MIN);

    let codes: Vec<EntityCode> = (0..count).map(|i| EntityCode::new(format!("E{:03}", i))).collect();
    let entities: Vec<Entity> = codes
        .iter()
        .enumerate()
        .map(|(i, code)| {
            let currency = if i == 0 {
                presentation.clone()
            } else {
                config
                    .currencies
                    .choose(rng)
                    .cloned()
                    .unwrap_or_else(|| presentation.clone())
            };
            Entity::new(code.clone(), currency)
        })
        .collect();

    let mut ownership = Vec::new();
    for i in 1..count {
        let parent = rng.gen_range(0..i);
        let shared = i >= 2 && rng.gen_bool(config.multi_parent_ratio.clamp(0.0, 1.0));
        if shared {
            let mut other = rng.gen_range(0..i);
            while other == parent {
                other = rng.gen_range(0..i);
            }
            let first = rng.gen_range(30..=60u32);
            let second = rng.gen_range(10..=(100 - first));
            ownership.push(
                OwnershipEdge::new(codes[parent].clone(), codes[i].clone(), percent(first), acquired).shared(),
            );
            ownership.push(
                OwnershipEdge::new(codes[other].clone(), codes[i].clone(), percent(second), acquired).shared(),
            );
        } else {
            let pct = rng.gen_range(15..=100u32);
            ownership.push(OwnershipEdge::new(codes[parent].clone(), codes[i].clone(), percent(pct), acquired));
        }
    }

    let mut rates = RateTable::new(presentation.clone());
    for currency in &config.currencies {
        if currency == &presentation {
            continue;
        }
        for basis in [RateBasis::Closing, RateBasis::Average, RateBasis::Historical] {
            let rate = Decimal::new(rng.gen_range(5_000..20_000), 4);
            // Generated rates are always positive.
            let _ = rates.set_rate(currency.clone(), basis, period, rate);
        }
    }

    let date = period.as_of();
    let mut postings = Vec::new();
    let mut ic_balances: BTreeMap<(usize, &str), Decimal> = BTreeMap::new();
    if count >= 2 {
        for k in 0..config.intercompany_pairs {
            let lender = rng.gen_range(0..count);
            let mut borrower = rng.gen_range(0..count);
            while borrower == lender {
                borrower = rng.gen_range(0..count);
            }
            let gross = amount(rng, 1_000, 1_000_000);
            let counter = if rng.gen_bool(config.mismatch_ratio.clamp(0.0, 1.0)) {
                gross - Decimal::new(rng.gen_range(1..500), 2)
            } else {
                gross
            };
            postings.push(IntercompanyPosting::new(
                format!("{}-R{:04}", codes[lender], k),
                codes[lender].clone(),
                codes[borrower].clone(),
                IC_RECEIVABLE,
                gross,
                presentation.clone(),
                date,
            ));
            postings.push(IntercompanyPosting::new(
                format!("{}-P{:04}", codes[borrower], k),
                codes[borrower].clone(),
                codes[lender].clone(),
                IC_PAYABLE,
                -counter,
                presentation.clone(),
                date,
            ));
            *ic_balances.entry((lender, IC_RECEIVABLE)).or_default() += gross;
            *ic_balances.entry((borrower, IC_PAYABLE)).or_default() -= counter;
        }
    }

    let trial_balances = entities
        .iter()
        .enumerate()
        .map(|(i, entity)| {
            let local = entity.functional_currency.clone();
            let mut lines = vec![
                TrialBalanceLine::new("1000", amount(rng, 10_000, 5_000_000), local.clone()),
                TrialBalanceLine::new("1500", amount(rng, 10_000, 5_000_000), local.clone()),
                TrialBalanceLine::new("2000", -amount(rng, 10_000, 2_000_000), local.clone()),
                TrialBalanceLine::new("3000", -amount(rng, 10_000, 1_000_000), local.clone()),
                TrialBalanceLine::new("4000", -amount(rng, 10_000, 3_000_000), local.clone()),
                TrialBalanceLine::new("5000", amount(rng, 10_000, 2_000_000), local.clone()),
            ];
            let local_total: Decimal = lines.iter().map(|l| l.amount).sum();
            lines.push(TrialBalanceLine::new("3100", -local_total, local.clone()));
            for side in [IC_RECEIVABLE, IC_PAYABLE] {
                if let Some(balance) = ic_balances.get(&(i, side)) {
                    lines.push(TrialBalanceLine::new(side, *balance, presentation.clone()));
                }
            }
            TrialBalance::new(entity.code.clone(), lines)
        })
        .collect();

    let mut group = GroupConfig::new(codes[0].clone(), LedgerPresentation::new(presentation.clone()));
    group.entities = entities;
    group.ownership = ownership;
    group.account_map = AccountMap::new()
        .with_account(IC_RECEIVABLE, AccountPurpose::MonetaryAsset)
        .with_account(IC_PAYABLE, AccountPurpose::MonetaryLiability)
        .with_account("1000", AccountPurpose::MonetaryAsset)
        .with_pattern("15*", AccountPurpose::NonMonetary)
        .with_pattern("2*", AccountPurpose::MonetaryLiability)
        .with_pattern("3*", AccountPurpose::Equity)
        .with_pattern("4*", AccountPurpose::ProfitAndLoss)
        .with_pattern("5*", AccountPurpose::ProfitAndLoss);
    group.elimination_rules = vec![EliminationRule::new("IC", "IC-*")
        .with_tolerance(Decimal::new(5, 0))
        .with_min_confidence(Decimal::new(999, 3))];

    Scenario {
        group: config.group.clone(),
        config: group,
        rates,
        periods: vec![PeriodData {
            year: period.year,
            month: period.month,
            trial_balances,
            postings,
        }],
    }
}

fn percent(value: u32) -> Decimal {
    Decimal::new(i64::from(value), 2)
}

/// Random amount with two decimals in `[min, max)` whole units.
fn amount<R: Rng>(rng: &mut R, min: i64, max: i64) -> Decimal {
    Decimal::new(rng.gen_range(min * 100..max * 100), 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ownership_graph::validate_edges;
    use crate::graph::resolver::OwnershipResolver;

    fn seeded(entity_count: usize, seed: u64) -> Scenario {
        generate_group(&GroupGeneratorConfig {
            entity_count,
            seed: Some(seed),
            ..Default::default()
        })
    }

    #[test]
    fn test_generated_group_is_valid_and_resolves() {
        let scenario = seeded(25, 7);
        assert_eq!(scenario.config.entities.len(), 25);
        validate_edges(&scenario.config.ownership).unwrap();

        let resolution = OwnershipResolver::new(scenario.config.settings.clone())
            .resolve(
                &scenario.config.root,
                &scenario.config.ownership,
                scenario.periods[0].period().unwrap().as_of(),
            )
            .unwrap();
        assert!(resolution
            .entities()
            .iter()
            .all(|r| r.effective_percentage <= Decimal::ONE));
    }

    #[test]
    fn test_local_trial_balance_lines_balance() {
        let scenario = seeded(12, 11);
        for tb in &scenario.periods[0].trial_balances {
            let local: Decimal = tb
                .lines
                .iter()
                .filter(|l| l.account.as_str() != IC_RECEIVABLE && l.account.as_str() != IC_PAYABLE)
                .map(|l| l.amount)
                .sum();
            assert_eq!(local, Decimal::ZERO, "entity {}", tb.entity);
        }
    }

    #[test]
    fn test_same_seed_same_group() {
        let a = seeded(8, 42);
        let b = seeded(8, 42);
        assert_eq!(a.config, b.config);
        assert_eq!(a.periods[0].postings, b.periods[0].postings);
    }

    #[test]
    fn test_postings_come_in_reciprocal_pairs() {
        let scenario = seeded(6, 3);
        let postings = &scenario.periods[0].postings;
        assert_eq!(postings.len(), 20);
        for pair in postings.chunks(2) {
            assert!(pair[0].is_reciprocal_of(&pair[1]));
        }
    }
}
