use crate::core::account::AccountCode;
use crate::core::currency::CurrencyCode;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Thresholds and execution knobs for a consolidation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Direct controlled holding at or above this consolidates fully.
    pub control_threshold: Decimal,
    /// Effective holding at or above this (without control) uses the equity method.
    pub significant_influence_threshold: Decimal,
    /// Entities whose effective holding is below this are excluded from the run.
    pub materiality_threshold: Decimal,
    pub parallel_translation: bool,
    pub max_translation_workers: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            control_threshold: dec!(0.50),
            significant_influence_threshold: dec!(0.20),
            materiality_threshold: Decimal::ZERO,
            parallel_translation: true,
            max_translation_workers: 4,
        }
    }
}

/// How consolidated amounts are presented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerPresentation {
    pub presentation_currency: CurrencyCode,
    #[serde(default = "default_decimal_places")]
    pub decimal_places: u32,
    #[serde(default = "default_nci_equity")]
    pub nci_equity_account: AccountCode,
    #[serde(default = "default_nci_pl")]
    pub nci_pl_account: AccountCode,
    #[serde(default = "default_elimination_difference")]
    pub elimination_difference_account: AccountCode,
}

fn default_decimal_places() -> u32 {
    2
}

fn default_nci_equity() -> AccountCode {
    AccountCode::new("NCI-EQUITY")
}

fn default_nci_pl() -> AccountCode {
    AccountCode::new("NCI-PL")
}

fn default_elimination_difference() -> AccountCode {
    AccountCode::new("IC-DIFF")
}

impl LedgerPresentation {
    pub fn new(presentation_currency: impl Into<CurrencyCode>) -> Self {
        Self {
            presentation_currency: presentation_currency.into(),
            decimal_places: default_decimal_places(),
            nci_equity_account: default_nci_equity(),
            nci_pl_account: default_nci_pl(),
            elimination_difference_account: default_elimination_difference(),
        }
    }

    /// Round to the smallest presentation unit, half away from zero.
    pub fn round(&self, amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(self.decimal_places, RoundingStrategy::MidpointAwayFromZero)
    }
}
