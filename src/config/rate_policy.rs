use crate::core::account::{AccountCode, AccountPurpose};
use crate::core::currency::RateBasis;
use crate::core::entity::EntityCode;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Group default: which rate basis translates each account purpose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatePolicy {
    bases: BTreeMap<AccountPurpose, RateBasis>,
}

impl Default for RatePolicy {
    /// Monetary items at closing, non-monetary items and equity at historical,
    /// income and expense at average.
    fn default() -> Self {
        let mut bases = BTreeMap::new();
        bases.insert(AccountPurpose::MonetaryAsset, RateBasis::Closing);
        bases.insert(AccountPurpose::MonetaryLiability, RateBasis::Closing);
        bases.insert(AccountPurpose::NonMonetary, RateBasis::Historical);
        bases.insert(AccountPurpose::Equity, RateBasis::Historical);
        bases.insert(AccountPurpose::ProfitAndLoss, RateBasis::Average);
        Self { bases }
    }
}

impl RatePolicy {
    pub fn with_basis(mut self, purpose: AccountPurpose, basis: RateBasis) -> Self {
        self.bases.insert(purpose, basis);
        self
    }

    pub fn basis_for(&self, purpose: AccountPurpose) -> RateBasis {
        self.bases
            .get(&purpose)
            .copied()
            .unwrap_or_else(|| RatePolicy::default().bases[&purpose])
    }
}

/// Entity-specific exception to the group rate policy.
///
/// An override either swaps the basis, pins a fixed rate (the usual way to
/// supply a historical rate when origination dates are not tracked per line),
/// or both; a fixed rate wins over the basis. Narrowing to a single account is
/// optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateOverride {
    pub entity: EntityCode,
    pub purpose: AccountPurpose,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<AccountCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basis: Option<RateBasis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_rate: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_from: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_to: Option<NaiveDate>,
}

impl RateOverride {
    pub fn basis(entity: impl Into<EntityCode>, purpose: AccountPurpose, basis: RateBasis) -> Self {
        Self {
            entity: entity.into(),
            purpose,
            account: None,
            basis: Some(basis),
            fixed_rate: None,
            effective_from: None,
            effective_to: None,
        }
    }

    pub fn fixed(entity: impl Into<EntityCode>, purpose: AccountPurpose, rate: Decimal) -> Self {
        Self {
            entity: entity.into(),
            purpose,
            account: None,
            basis: None,
            fixed_rate: Some(rate),
            effective_from: None,
            effective_to: None,
        }
    }

    pub fn for_account(mut self, account: impl Into<AccountCode>) -> Self {
        self.account = Some(account.into());
        self
    }

    /// `[from, to)` window; open bounds always match.
    pub fn is_effective(&self, as_of: NaiveDate) -> bool {
        self.effective_from.map_or(true, |from| from <= as_of)
            && self.effective_to.map_or(true, |to| as_of < to)
    }

    /// True when both overrides would compete for the same lines on some date.
    pub fn conflicts_with(&self, other: &RateOverride) -> bool {
        let starts_before_end = |from: Option<NaiveDate>, to: Option<NaiveDate>| match (from, to) {
            (Some(from), Some(to)) => from < to,
            _ => true,
        };
        self.entity == other.entity
            && self.purpose == other.purpose
            && self.account == other.account
            && starts_before_end(self.effective_from, other.effective_to)
            && starts_before_end(other.effective_from, self.effective_to)
    }

    /// Human-readable target of the override, for error messages.
    pub fn scope(&self) -> String {
        match &self.account {
            Some(account) => format!("{}, account {}", self.purpose, account),
            None => format!("{}, all accounts", self.purpose),
        }
    }

    fn applies_to(&self, entity: &EntityCode, account: &AccountCode, purpose: AccountPurpose) -> bool {
        &self.entity == entity
            && self.purpose == purpose
            && self.account.as_ref().map_or(true, |a| a == account)
    }
}

/// How one trial-balance line should be translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateSelection {
    Basis(RateBasis),
    Fixed(Decimal),
}

/// Pick the rate for a line: an account-specific override first, then an
/// entity-wide override for the purpose, then the group default. Conflicting
/// overrides are refused when added, so at most one of each kind applies.
pub fn select_rate(
    policy: &RatePolicy,
    overrides: &[RateOverride],
    entity: &EntityCode,
    account: &AccountCode,
    purpose: AccountPurpose,
) -> RateSelection {
    let applicable = overrides
        .iter()
        .filter(|o| o.applies_to(entity, account, purpose));
    let best = applicable.max_by_key(|o| o.account.is_some());

    match best {
        Some(RateOverride {
            fixed_rate: Some(rate),
            ..
        }) => RateSelection::Fixed(*rate),
        Some(RateOverride {
            basis: Some(basis), ..
        }) => RateSelection::Basis(*basis),
        _ => RateSelection::Basis(policy.basis_for(purpose)),
    }
}
