use crate::core::account::AccountCode;
use crate::core::currency::CurrencyCode;
use crate::core::entity::EntityCode;
use crate::error::ConsolidationError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of an intercompany posting.
///
/// Ordering on this identifier is the final tie-break in matching, so it must
/// come from the source ledger rather than be generated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostingId(String);

impl PostingId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PostingId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PostingId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A posting one group entity holds against another group entity.
///
/// `amount` is signed: a receivable is positive, the matching payable on the
/// counterparty's books is negative.
///
/// # Examples
///
/// ```
/// use consolidation_engine::core::posting::IntercompanyPosting;
/// use chrono::NaiveDate;
/// use rust_decimal_macros::dec;
///
/// let date = NaiveDate::from_ymd_opt(2025, 11, 30).unwrap();
/// let receivable = IntercompanyPosting::new("A-001", "A", "B", "1400", dec!(1000), "USD", date);
/// let payable = IntercompanyPosting::new("B-001", "B", "A", "2400", dec!(-1000), "USD", date);
/// assert!(receivable.is_reciprocal_of(&payable));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntercompanyPosting {
    pub id: PostingId,
    pub entity: EntityCode,
    pub counterparty: EntityCode,
    pub account: AccountCode,
    pub amount: Decimal,
    pub currency: CurrencyCode,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl IntercompanyPosting {
    pub fn new(
        id: impl Into<PostingId>,
        entity: impl Into<EntityCode>,
        counterparty: impl Into<EntityCode>,
        account: impl Into<AccountCode>,
        amount: Decimal,
        currency: impl Into<CurrencyCode>,
        date: NaiveDate,
    ) -> Self {
        Self {
            id: id.into(),
            entity: entity.into(),
            counterparty: counterparty.into(),
            account: account.into(),
            amount,
            currency: currency.into(),
            date,
            reference: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// True when the two postings sit on opposite sides of the same relationship.
    pub fn is_reciprocal_of(&self, other: &IntercompanyPosting) -> bool {
        self.entity == other.counterparty
            && self.counterparty == other.entity
            && self.entity != self.counterparty
    }
}

/// A fully materialized, sorted collection of intercompany postings.
///
/// Sorting by id makes every downstream consumer independent of the order in
/// which entity translations completed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostingSet {
    postings: Vec<IntercompanyPosting>,
}

impl PostingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn postings(&self) -> &[IntercompanyPosting] {
        &self.postings
    }

    /// The posting with this id, or `None` when the id is missing or
    /// shared by more than one posting.
    pub fn get(&self, id: &PostingId) -> Option<&IntercompanyPosting> {
        match self.with_id(id) {
            [only] => Some(only),
            _ => None,
        }
    }

    fn with_id(&self, id: &PostingId) -> &[IntercompanyPosting] {
        let start = self.postings.partition_point(|p| &p.id < id);
        let end = self.postings.partition_point(|p| &p.id <= id);
        &self.postings[start..end]
    }

    /// True when more than one distinct posting carries `id`.
    pub fn is_ambiguous(&self, id: &PostingId) -> bool {
        self.with_id(id).len() > 1
    }

    /// One error per posting whose id was already used by another entity's
    /// posting (or a different posting of the same entity).
    pub fn id_collisions(&self) -> Vec<ConsolidationError> {
        self.postings
            .windows(2)
            .filter(|w| w[0].id == w[1].id)
            .map(|w| ConsolidationError::DuplicatePostingId {
                id: w[1].id.to_string(),
                first: w[0].entity.clone(),
                second: w[1].entity.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    /// Sum of all signed amounts. Zero when every receivable has its payable.
    pub fn net_total(&self) -> Decimal {
        self.postings.iter().map(|p| p.amount).sum()
    }
}

impl FromIterator<IntercompanyPosting> for PostingSet {
    fn from_iter<T: IntoIterator<Item = IntercompanyPosting>>(iter: T) -> Self {
        let mut postings: Vec<IntercompanyPosting> = iter.into_iter().collect();
        postings.sort_by(|a, b| {
            (&a.id, &a.entity, &a.counterparty, &a.account, a.date, a.amount, &a.reference).cmp(&(
                &b.id,
                &b.entity,
                &b.counterparty,
                &b.account,
                b.date,
                b.amount,
                &b.reference,
            ))
        });
        // Only exact repeats collapse; colliding ids stay visible.
        postings.dedup();
        Self { postings }
    }
}
