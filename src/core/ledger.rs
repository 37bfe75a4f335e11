use crate::core::account::AccountCode;
use crate::core::currency::CurrencyCode;
use crate::core::entity::EntityCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// What produced a consolidated line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "entity", rename_all = "snake_case")]
pub enum LineTag {
    /// Translated (and for proportional entities, scaled) balance of an entity.
    Entity(EntityCode),
    /// Translation difference of an entity, posted per CTA policy.
    Cta(EntityCode),
    /// Group-level CTA line when the policy aggregates to a single account.
    GroupCta,
    /// Intercompany elimination entry.
    Elimination,
    /// Non-controlling interest attributed from an entity.
    Nci(EntityCode),
}

impl fmt::Display for LineTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineTag::Entity(e) => write!(f, "{}", e),
            LineTag::Cta(e) => write!(f, "CTA:{}", e),
            LineTag::GroupCta => f.write_str("CTA"),
            LineTag::Elimination => f.write_str("ELIM"),
            LineTag::Nci(e) => write!(f, "NCI:{}", e),
        }
    }
}

/// One output row of a consolidation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolLine {
    pub account: AccountCode,
    pub tag: LineTag,
    pub amount: Decimal,
    pub currency: CurrencyCode,
    /// Unmatched intercompany balance still contained in this line.
    #[serde(default)]
    pub unresolved: bool,
}

impl ConsolLine {
    pub fn new(account: AccountCode, tag: LineTag, amount: Decimal, currency: CurrencyCode) -> Self {
        Self {
            account,
            tag,
            amount,
            currency,
            unresolved: false,
        }
    }

    pub fn flagged_unresolved(mut self) -> Self {
        self.unresolved = true;
        self
    }

    fn sort_key(&self) -> (&LineTag, &AccountCode) {
        (&self.tag, &self.account)
    }
}

/// The set of lines a run accumulates.
///
/// Lines are kept in a canonical order so that two computations over the
/// same inputs compare equal line by line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolLedger {
    lines: Vec<ConsolLine>,
}

impl ConsolLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: ConsolLine) {
        if line.amount != Decimal::ZERO {
            self.lines.push(line);
        }
    }

    pub fn extend(&mut self, lines: impl IntoIterator<Item = ConsolLine>) {
        for line in lines {
            self.push(line);
        }
    }

    /// Sort lines by tag then account. Stable, so equal keys keep insertion order.
    pub fn canonicalize(&mut self) {
        self.lines.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    }

    pub fn lines(&self) -> &[ConsolLine] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<ConsolLine> {
        self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Consolidated balance per account, excluding NCI disclosure lines.
    pub fn balance_by_account(&self) -> BTreeMap<AccountCode, Decimal> {
        let mut balances = BTreeMap::new();
        for line in self.lines.iter().filter(|l| !matches!(l.tag, LineTag::Nci(_))) {
            *balances.entry(line.account.clone()).or_insert(Decimal::ZERO) += line.amount;
        }
        balances
    }

    pub fn total_for(&self, predicate: impl Fn(&ConsolLine) -> bool) -> Decimal {
        self.lines.iter().filter(|l| predicate(l)).map(|l| l.amount).sum()
    }

    /// Sum of every non-NCI line. Zero when each entity's translation plus
    /// CTA balances and every elimination entry nets out.
    pub fn is_balanced(&self) -> bool {
        self.total_for(|l| !matches!(l.tag, LineTag::Nci(_))) == Decimal::ZERO
    }
}
