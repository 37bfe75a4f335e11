use crate::core::account::{AccountCode, AccountPurpose};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Account-purpose map: exact codes first, then ordered pattern rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMap {
    #[serde(default)]
    pub exact: BTreeMap<AccountCode, AccountPurpose>,
    #[serde(default)]
    pub patterns: Vec<(String, AccountPurpose)>,
}

impl AccountMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(mut self, account: impl Into<AccountCode>, purpose: AccountPurpose) -> Self {
        self.exact.insert(account.into(), purpose);
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>, purpose: AccountPurpose) -> Self {
        self.patterns.push((pattern.into(), purpose));
        self
    }

    pub fn classify(&self, account: &AccountCode) -> Option<AccountPurpose> {
        if let Some(purpose) = self.exact.get(account) {
            return Some(*purpose);
        }
        self.patterns
            .iter()
            .find(|(pattern, _)| account.matches(pattern))
            .map(|(_, purpose)| *purpose)
    }
}
