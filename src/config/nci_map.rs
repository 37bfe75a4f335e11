use crate::core::account::{AccountCode, AccountPurpose};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One rule selecting accounts that participate in NCI attribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NciMapping {
    /// Account pattern (`*` wildcard). Absent means every account of `purpose`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Restricts the rule to one purpose. Only equity and P&L purposes attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<AccountPurpose>,
    /// Fixed NCI share overriding `1 - effective ownership`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share: Option<Decimal>,
}

/// Which equity and P&L accounts carry a minority share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NciMap {
    pub mappings: Vec<NciMapping>,
}

impl Default for NciMap {
    /// Every equity and P&L account participates at `1 - ownership`.
    fn default() -> Self {
        Self {
            mappings: vec![
                NciMapping {
                    pattern: None,
                    purpose: Some(AccountPurpose::Equity),
                    share: None,
                },
                NciMapping {
                    pattern: None,
                    purpose: Some(AccountPurpose::ProfitAndLoss),
                    share: None,
                },
            ],
        }
    }
}

impl NciMap {
    pub fn empty() -> Self {
        Self {
            mappings: Vec::new(),
        }
    }

    pub fn with_mapping(mut self, mapping: NciMapping) -> Self {
        self.mappings.push(mapping);
        self
    }

    /// The NCI share for an account, or `None` if it does not participate.
    ///
    /// The first matching rule wins; `default_share` is `1 - ownership`.
    pub fn share_for(
        &self,
        account: &AccountCode,
        purpose: AccountPurpose,
        default_share: Decimal,
    ) -> Option<Decimal> {
        if !matches!(purpose, AccountPurpose::Equity | AccountPurpose::ProfitAndLoss) {
            return None;
        }
        self.mappings
            .iter()
            .find(|m| {
                m.purpose.map_or(true, |p| p == purpose)
                    && m.pattern.as_deref().map_or(true, |pat| account.matches(pat))
            })
            .map(|m| m.share.unwrap_or(default_share))
    }
}
