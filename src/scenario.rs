//! JSON scenarios: a whole group configuration plus the ledger data and
//! rates for one or more periods, loaded into in-memory providers.
//!
//! ```json
//! {
//!   "group": "G",
//!   "config": { "root": "P", "presentation": { "presentation_currency": "USD" }, ... },
//!   "rates": { "presentation_currency": "USD", "rates": [ ... ] },
//!   "periods": [
//!     { "year": 2025, "month": 11, "trial_balances": [ ... ], "postings": [ ... ] }
//!   ]
//! }
//! ```

use crate::config::store::{GroupConfig, PolicyStore};
use crate::core::account::TrialBalance;
use crate::core::currency::RateTable;
use crate::core::period::Period;
use crate::core::posting::IntercompanyPosting;
use crate::error::{ConsolidationError, Result};
use crate::graph::ownership_graph::validate_edges;
use crate::run::orchestrator::Orchestrator;
use crate::run::providers::MemoryLedger;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Ledger data of one period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodData {
    pub year: i32,
    pub month: u32,
    #[serde(default)]
    pub trial_balances: Vec<TrialBalance>,
    #[serde(default)]
    pub postings: Vec<IntercompanyPosting>,
}

impl PeriodData {
    pub fn period(&self) -> Result<Period> {
        Period::new(self.year, self.month).ok_or_else(|| {
            ConsolidationError::InvalidConfiguration(format!("invalid period {}-{}", self.year, self.month))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub group: String,
    pub config: GroupConfig,
    #[serde(default)]
    pub rates: RateTable,
    #[serde(default)]
    pub periods: Vec<PeriodData>,
}

impl Scenario {
    pub fn from_json(json: &str) -> Result<Self> {
        let scenario: Scenario = serde_json::from_str(json)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ConsolidationError::InvalidConfiguration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject scenarios whose ownership history or periods are malformed
    /// before anything is installed.
    pub fn validate(&self) -> Result<()> {
        if self.group.trim().is_empty() {
            return Err(ConsolidationError::InvalidConfiguration(
                "scenario has no group name".to_string(),
            ));
        }
        validate_edges(&self.config.ownership)?;
        for data in &self.periods {
            data.period()?;
        }
        Ok(())
    }

    /// Periods in the scenario, sorted and deduplicated.
    pub fn periods(&self) -> Vec<Period> {
        let mut periods: Vec<Period> = self.periods.iter().filter_map(|d| d.period().ok()).collect();
        periods.sort();
        periods.dedup();
        periods
    }

    pub fn latest_period(&self) -> Option<Period> {
        self.periods().last().copied()
    }

    /// Load every period's trial balances and postings into a ledger.
    pub fn ledger(&self) -> Result<MemoryLedger> {
        let ledger = MemoryLedger::new();
        for data in &self.periods {
            let period = data.period()?;
            for balance in &data.trial_balances {
                ledger.put_trial_balance(period, balance.clone());
            }
            for posting in &data.postings {
                ledger.add_posting(period, posting.clone());
            }
        }
        Ok(ledger)
    }

    pub fn policy_store(&self) -> PolicyStore {
        let store = PolicyStore::new();
        store.put_group(self.group.clone(), self.config.clone());
        store
    }

    /// An orchestrator over in-memory providers holding this scenario.
    pub fn orchestrator(&self) -> Result<Orchestrator> {
        self.validate()?;
        let ledger = self.ledger()?;
        log::debug!(
            "scenario {}: {} entities, {} edges, {} period(s), {} rates",
            self.group,
            self.config.entities.len(),
            self.config.ownership.len(),
            self.periods.len(),
            self.rates.len()
        );
        Ok(Orchestrator::new(
            self.policy_store(),
            Arc::new(ledger),
            Arc::new(self.rates.clone()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::EntityCode;
    use crate::run::providers::TrialBalanceProvider;

    const SCENARIO: &str = r#"{
        "group": "G",
        "config": {
            "root": "P",
            "entities": [
                { "code": "P", "functional_currency": "USD" },
                { "code": "A", "functional_currency": "USD" }
            ],
            "ownership": [
                { "parent": "P", "child": "A", "percentage": "0.8", "effective_from": "2020-01-01" }
            ],
            "account_map": { "patterns": [["1*", "monetary_asset"], ["3*", "equity"]] },
            "presentation": { "presentation_currency": "USD" }
        },
        "rates": { "presentation_currency": "USD", "rates": [] },
        "periods": [
            {
                "year": 2025,
                "month": 11,
                "trial_balances": [
                    { "entity": "A", "lines": [
                        { "account": "1000", "amount": "500", "currency": "USD" },
                        { "account": "3000", "amount": "-500", "currency": "USD" }
                    ] }
                ]
            }
        ]
    }"#;

    #[test]
    fn test_load_and_install() {
        let scenario = Scenario::from_json(SCENARIO).unwrap();
        assert_eq!(scenario.latest_period(), Period::new(2025, 11));

        let ledger = scenario.ledger().unwrap();
        let tb = ledger
            .trial_balance(&EntityCode::new("A"), Period::new(2025, 11).unwrap())
            .unwrap();
        assert!(tb.is_balanced());

        let store = scenario.policy_store();
        assert_eq!(store.groups(), vec!["G".to_string()]);
    }

    #[test]
    fn test_invalid_period_rejected() {
        let json = SCENARIO.replace("\"month\": 11", "\"month\": 13");
        let err = Scenario::from_json(&json).unwrap_err();
        assert!(matches!(err, ConsolidationError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_malformed_json_is_serialization_error() {
        let err = Scenario::from_json("{ not json").unwrap_err();
        assert!(matches!(err, ConsolidationError::Serialization(_)));
    }

    #[test]
    fn test_json_round_trip_keeps_group() {
        let scenario = Scenario::from_json(SCENARIO).unwrap();
        let again = Scenario::from_json(&scenario.to_json().unwrap()).unwrap();
        assert_eq!(again.group, "G");
        assert_eq!(again.config, scenario.config);
    }
}
