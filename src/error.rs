use crate::core::account::AccountCode;
use crate::core::currency::{CurrencyCode, RateBasis};
use crate::core::entity::EntityCode;
use crate::core::period::Period;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Broad category of a failure, used to decide whether a run aborts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Missing rate, unmapped account, missing ownership. Reported per entity.
    Configuration,
    /// Cyclic or overlapping ownership. Aborts the run.
    Structural,
    /// Run already in progress, locked run mutation. Rejected synchronously.
    Concurrency,
    /// Invalid state transitions, unknown identifiers, cancellation.
    Lifecycle,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorClass::Configuration => "configuration",
            ErrorClass::Structural => "structural",
            ErrorClass::Concurrency => "concurrency",
            ErrorClass::Lifecycle => "lifecycle",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConsolidationError {
    #[error("cyclic ownership detected: {}", format_path(.path))]
    CyclicOwnership { path: Vec<EntityCode> },

    #[error(
        "overlapping ownership windows for {child}: edge {first} overlaps edge {second}"
    )]
    OverlappingOwnership {
        child: EntityCode,
        first: String,
        second: String,
    },

    #[error("invalid ownership edge {parent} -> {child}: {reason}")]
    InvalidOwnershipEdge {
        parent: EntityCode,
        child: EntityCode,
        reason: String,
    },

    #[error("account {account} of entity {entity} has no mapped purpose")]
    UnmappedAccount {
        entity: EntityCode,
        account: AccountCode,
    },

    #[error("no {basis} rate for {currency} in {period} (entity {entity})")]
    MissingRate {
        entity: EntityCode,
        currency: CurrencyCode,
        basis: RateBasis,
        period: Period,
    },

    #[error("posting id {id} is used by both {first} and {second}")]
    DuplicatePostingId {
        id: String,
        first: EntityCode,
        second: EntityCode,
    },

    #[error("rate override for {entity} ({scope}) overlaps an existing override")]
    DuplicateRateOverride { entity: EntityCode, scope: String },

    #[error("active entity {entity} has no ownership edge reaching the group parent")]
    MissingOwnership { entity: EntityCode },

    #[error("no trial balance available for entity {entity} in {period}")]
    MissingTrialBalance { entity: EntityCode, period: Period },

    #[error("run {run_id} is already computing for group {group} period {period}")]
    RunInProgress {
        group: String,
        period: Period,
        run_id: Uuid,
    },

    #[error("run {run_id} is locked and cannot be modified")]
    RunLocked { run_id: Uuid },

    #[error("run {run_id} cannot move from {from} to {to}")]
    InvalidTransition {
        run_id: Uuid,
        from: String,
        to: String,
    },

    #[error("run {0} not found")]
    RunNotFound(Uuid),

    #[error("run {run_id} cannot be locked: {issues} unresolved configuration issue(s)")]
    LockBlocked { run_id: Uuid, issues: usize },

    #[error("run {0} has no computed result")]
    NotComputed(Uuid),

    #[error("dry-run {0} cannot be locked")]
    DryRunNotLockable(Uuid),

    #[error("match decision already recorded for {first} / {second}")]
    DecisionAlreadyRecorded { first: String, second: String },

    #[error("posting {0} is not part of the run")]
    UnknownPosting(String),

    #[error("run {run_id} cancelled: {reason}")]
    Cancelled { run_id: Uuid, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ConsolidationError {
    pub fn class(&self) -> ErrorClass {
        use ConsolidationError::*;
        match self {
            UnmappedAccount { .. }
            | MissingRate { .. }
            | MissingOwnership { .. }
            | MissingTrialBalance { .. }
            | DuplicatePostingId { .. }
            | DuplicateRateOverride { .. }
            | InvalidConfiguration(_) => ErrorClass::Configuration,
            CyclicOwnership { .. } | OverlappingOwnership { .. } | InvalidOwnershipEdge { .. } => {
                ErrorClass::Structural
            }
            RunInProgress { .. } | RunLocked { .. } => ErrorClass::Concurrency,
            InvalidTransition { .. }
            | RunNotFound(_)
            | LockBlocked { .. }
            | NotComputed(_)
            | DryRunNotLockable(_)
            | DecisionAlreadyRecorded { .. }
            | UnknownPosting(_)
            | Cancelled { .. }
            | Serialization(_) => ErrorClass::Lifecycle,
        }
    }

    /// Structural errors abort a run immediately.
    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::Structural
    }
}

impl From<serde_json::Error> for ConsolidationError {
    fn from(e: serde_json::Error) -> Self {
        ConsolidationError::Serialization(e.to_string())
    }
}

fn format_path(path: &[EntityCode]) -> String {
    path.iter()
        .map(|e| e.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

pub type Result<T> = std::result::Result<T, ConsolidationError>;
