//! Consolidation run lifecycle.
//!
//! ```text
//!   DRAFT ──► COMPUTING ──► COMPUTED ──► LOCKED (terminal)
//!     │           │
//!     └───────────┴──────► FAILED (terminal)
//! ```
//!
//! A run leaves `DRAFT` only through the orchestrator, which holds the
//! (group, year, month) lock for the whole `COMPUTING` phase. `DRAFT ─► FAILED`
//! covers a run cancelled before it started.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    /// Created, no lines yet.
    Draft,
    /// Resolver, translation, elimination and NCI in progress.
    Computing,
    /// All lines computed. Dry runs stop here with their lines discarded.
    Computed,
    /// Final. Lines are immutable.
    Locked,
    /// Final. Lines of the failed attempt were discarded.
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Draft => "DRAFT",
            RunState::Computing => "COMPUTING",
            RunState::Computed => "COMPUTED",
            RunState::Locked => "LOCKED",
            RunState::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Locked | RunState::Failed)
    }

    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Draft, Computing) | (Draft, Failed) | (Computing, Computed) | (Computing, Failed) | (Computed, Locked)
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
