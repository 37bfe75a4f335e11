use crate::core::account::AccountCode;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Intercompany elimination rule for a group.
///
/// Postings whose account matches `account_pattern` are candidates for this
/// rule. Two reciprocal postings pair when their signed amounts net to within
/// `tolerance` and their dates are at most `window_days` apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EliminationRule {
    pub id: String,
    pub account_pattern: String,
    #[serde(default)]
    pub tolerance: Decimal,
    #[serde(default = "default_window")]
    pub window_days: i64,
    #[serde(default = "default_auto_match")]
    pub auto_match: bool,
    /// Proposals at or above this confidence are accepted automatically.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_from: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_to: Option<NaiveDate>,
}

fn default_window() -> i64 {
    31
}

fn default_auto_match() -> bool {
    true
}

fn default_min_confidence() -> Decimal {
    Decimal::ONE
}

impl EliminationRule {
    pub fn new(id: impl Into<String>, account_pattern: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            account_pattern: account_pattern.into(),
            tolerance: Decimal::ZERO,
            window_days: default_window(),
            auto_match: true,
            min_confidence: Decimal::ONE,
            effective_from: None,
            effective_to: None,
        }
    }

    pub fn with_tolerance(mut self, tolerance: Decimal) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_window_days(mut self, days: i64) -> Self {
        self.window_days = days;
        self
    }

    pub fn with_min_confidence(mut self, confidence: Decimal) -> Self {
        self.min_confidence = confidence;
        self
    }

    pub fn manual_only(mut self) -> Self {
        self.auto_match = false;
        self
    }

    pub fn covers(&self, account: &AccountCode) -> bool {
        account.matches(&self.account_pattern)
    }

    pub fn is_effective(&self, as_of: NaiveDate) -> bool {
        self.effective_from.map_or(true, |from| from <= as_of)
            && self.effective_to.map_or(true, |to| as_of < to)
    }
}
