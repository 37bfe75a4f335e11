//! Interfaces to the engine's collaborators, with in-memory implementations
//! used by the CLI, the scenario loader and tests.

use crate::config::account_map::AccountMap;
use crate::core::account::{AccountCode, AccountPurpose, TrialBalance};
use crate::core::currency::{CurrencyCode, RateBasis, RateTable};
use crate::core::entity::EntityCode;
use crate::core::ledger::ConsolLine;
use crate::core::period::Period;
use crate::core::posting::IntercompanyPosting;
use crate::error::{ConsolidationError, Result};
use crate::run::store::RunRecord;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Source of local-currency trial balances and intercompany postings.
pub trait TrialBalanceProvider: Send + Sync {
    fn trial_balance(&self, entity: &EntityCode, period: Period) -> Result<TrialBalance>;

    /// Intercompany-tagged postings of `entity` for `period`. Empty when the
    /// entity has none.
    fn intercompany_postings(&self, entity: &EntityCode, period: Period) -> Result<Vec<IntercompanyPosting>>;
}

/// Classifies accounts by purpose.
pub trait AccountMapProvider: Send + Sync {
    fn classify(&self, account: &AccountCode) -> Option<AccountPurpose>;
}

/// Supplies exchange rates; the engine never fetches them itself.
pub trait RateProvider: Send + Sync {
    /// Units of presentation currency per unit of `currency`.
    fn rate(&self, currency: &CurrencyCode, basis: RateBasis, period: Period) -> Option<Decimal>;
}

/// Write interface that receives a run's lines when it is locked.
pub trait PostingSink: Send + Sync {
    fn publish(&self, run: &RunRecord, lines: &[ConsolLine]) -> Result<()>;
}

impl AccountMapProvider for AccountMap {
    fn classify(&self, account: &AccountCode) -> Option<AccountPurpose> {
        AccountMap::classify(self, account)
    }
}

impl RateProvider for RateTable {
    fn rate(&self, currency: &CurrencyCode, basis: RateBasis, period: Period) -> Option<Decimal> {
        RateTable::rate(self, currency, basis, period)
    }
}

/// Trial balances and intercompany postings held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    balances: Arc<RwLock<HashMap<(EntityCode, Period), TrialBalance>>>,
    postings: Arc<RwLock<HashMap<(EntityCode, Period), Vec<IntercompanyPosting>>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_trial_balance(&self, period: Period, balance: TrialBalance) {
        self.balances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((balance.entity.clone(), period), balance);
    }

    pub fn add_posting(&self, period: Period, posting: IntercompanyPosting) {
        self.postings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((posting.entity.clone(), period))
            .or_default()
            .push(posting);
    }
}

impl TrialBalanceProvider for MemoryLedger {
    fn trial_balance(&self, entity: &EntityCode, period: Period) -> Result<TrialBalance> {
        self.balances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(entity.clone(), period))
            .cloned()
            .ok_or_else(|| ConsolidationError::MissingTrialBalance {
                entity: entity.clone(),
                period,
            })
    }

    fn intercompany_postings(&self, entity: &EntityCode, period: Period) -> Result<Vec<IntercompanyPosting>> {
        Ok(self
            .postings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(entity.clone(), period))
            .cloned()
            .unwrap_or_default())
    }
}

/// Collects published runs; stands in for the general ledger.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    published: Arc<RwLock<Vec<(RunRecord, Vec<ConsolLine>)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<(RunRecord, Vec<ConsolLine>)> {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl PostingSink for MemorySink {
    fn publish(&self, run: &RunRecord, lines: &[ConsolLine]) -> Result<()> {
        log::info!("publishing {} lines for run {}", lines.len(), run.id);
        self.published
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((run.clone(), lines.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::account::TrialBalanceLine;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    #[test]
    fn test_missing_trial_balance_is_configuration_error() {
        let ledger = MemoryLedger::new();
        let period = Period::new(2025, 11).unwrap();
        let err = ledger.trial_balance(&EntityCode::new("A"), period).unwrap_err();
        assert_eq!(err.class(), crate::error::ErrorClass::Configuration);
        assert!(ledger
            .intercompany_postings(&EntityCode::new("A"), period)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_ledger_keyed_by_period() {
        let ledger = MemoryLedger::new();
        let nov = Period::new(2025, 11).unwrap();
        let a = EntityCode::new("A");
        ledger.put_trial_balance(
            nov,
            TrialBalance::new(a.clone(), vec![TrialBalanceLine::new("1000", dec!(10), "EUR")]),
        );
        ledger.add_posting(
            nov,
            IntercompanyPosting::new(
                "A-1",
                "A",
                "B",
                "1400",
                dec!(10),
                "EUR",
                NaiveDate::from_ymd_opt(2025, 11, 3).unwrap(),
            ),
        );
        assert!(ledger.trial_balance(&a, nov).is_ok());
        assert!(ledger.trial_balance(&a, nov.next()).is_err());
        assert_eq!(ledger.intercompany_postings(&a, nov).unwrap().len(), 1);
    }
}
