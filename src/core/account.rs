use crate::core::currency::CurrencyCode;
use crate::core::entity::EntityCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Chart-of-accounts code as it appears in an entity's trial balance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountCode(String);

impl AccountCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Match against a pattern where `*` stands for any run of characters.
    ///
    /// ```
    /// use consolidation_engine::core::account::AccountCode;
    ///
    /// let acct = AccountCode::new("1400-IC");
    /// assert!(acct.matches("14*"));
    /// assert!(acct.matches("*-IC"));
    /// assert!(!acct.matches("2*"));
    /// ```
    pub fn matches(&self, pattern: &str) -> bool {
        glob_match(pattern.as_bytes(), self.0.as_bytes())
    }
}

fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && pattern[p] == b'*' {
            star = Some((p, t));
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == b'*')
}

impl fmt::Display for AccountCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for AccountCode {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Classification of an account for translation and NCI purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountPurpose {
    MonetaryAsset,
    MonetaryLiability,
    NonMonetary,
    Equity,
    ProfitAndLoss,
}

impl AccountPurpose {
    pub const ALL: [AccountPurpose; 5] = [
        AccountPurpose::MonetaryAsset,
        AccountPurpose::MonetaryLiability,
        AccountPurpose::NonMonetary,
        AccountPurpose::Equity,
        AccountPurpose::ProfitAndLoss,
    ];

    pub fn is_monetary(&self) -> bool {
        matches!(
            self,
            AccountPurpose::MonetaryAsset | AccountPurpose::MonetaryLiability
        )
    }
}

impl fmt::Display for AccountPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccountPurpose::MonetaryAsset => "monetary-asset",
            AccountPurpose::MonetaryLiability => "monetary-liability",
            AccountPurpose::NonMonetary => "non-monetary",
            AccountPurpose::Equity => "equity",
            AccountPurpose::ProfitAndLoss => "p&l",
        };
        f.write_str(s)
    }
}

/// One trial-balance row. Debits are positive, credits negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialBalanceLine {
    pub account: AccountCode,
    pub amount: Decimal,
    pub currency: CurrencyCode,
}

impl TrialBalanceLine {
    pub fn new(account: impl Into<AccountCode>, amount: Decimal, currency: impl Into<CurrencyCode>) -> Self {
        Self {
            account: account.into(),
            amount,
            currency: currency.into(),
        }
    }
}

/// An entity's local-currency trial balance for one period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialBalance {
    pub entity: EntityCode,
    pub lines: Vec<TrialBalanceLine>,
}

impl TrialBalance {
    pub fn new(entity: EntityCode, lines: Vec<TrialBalanceLine>) -> Self {
        Self { entity, lines }
    }

    /// Sum of all lines. A balanced trial balance sums to zero.
    pub fn total(&self) -> Decimal {
        self.lines.iter().map(|l| l.amount).sum()
    }

    pub fn is_balanced(&self) -> bool {
        self.total() == Decimal::ZERO
    }

    pub fn balance_of(&self, account: &AccountCode) -> Decimal {
        self.lines
            .iter()
            .filter(|l| &l.account == account)
            .map(|l| l.amount)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_glob_patterns() {
        let acct = AccountCode::new("2100-IC-PAY");
        assert!(acct.matches("*"));
        assert!(acct.matches("2100-IC-PAY"));
        assert!(acct.matches("21*PAY"));
        assert!(acct.matches("*IC*"));
        assert!(!acct.matches("21*REC"));
        assert!(!acct.matches("2100"));
    }

    #[test]
    fn test_trial_balance_totals() {
        let tb = TrialBalance::new(
            EntityCode::new("A"),
            vec![
                TrialBalanceLine::new("1000", dec!(500), "EUR"),
                TrialBalanceLine::new("1000", dec!(250), "EUR"),
                TrialBalanceLine::new("3000", dec!(-750), "EUR"),
            ],
        );
        assert!(tb.is_balanced());
        assert_eq!(tb.balance_of(&AccountCode::new("1000")), dec!(750));
    }

    #[test]
    fn test_monetary_purposes() {
        assert!(AccountPurpose::MonetaryAsset.is_monetary());
        assert!(!AccountPurpose::Equity.is_monetary());
    }
}
