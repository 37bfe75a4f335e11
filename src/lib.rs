//! # consolidation-engine
//!
//! Multi-entity financial consolidation: ownership resolution, currency
//! translation, intercompany elimination and non-controlling interest.
//!
//! Given a group's ownership graph, per-entity trial balances in local
//! currency, supplied exchange rates and the group's policies, a run
//! produces consolidated lines in the presentation currency for one period.
//!
//! ## Architecture
//!
//! - **core** — Foundational types: entities, currencies, periods, accounts, postings, consolidated lines
//! - **config** — Rate & policy store: rate policy, CTA policy, NCI map, elimination rules, thresholds
//! - **graph** — Ownership graph, cycle detection, effective-percentage resolution
//! - **translation** — Local-to-presentation translation and CTA posting
//! - **elimination** — Intercompany matching and manual match decisions
//! - **nci** — Non-controlling interest attribution
//! - **run** — Run lifecycle, provider interfaces and the orchestrator
//! - **scenario** — JSON scenario loading
//! - **simulation** — Random group generation for benchmarks

pub mod config;
pub mod core;
pub mod elimination;
pub mod error;
pub mod graph;
pub mod nci;
pub mod run;
pub mod scenario;
pub mod simulation;
pub mod translation;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::config::account_map::AccountMap;
    pub use crate::config::cta::CtaPolicy;
    pub use crate::config::elimination_rule::EliminationRule;
    pub use crate::config::nci_map::NciMap;
    pub use crate::config::rate_policy::{RateOverride, RatePolicy};
    pub use crate::config::settings::{EngineSettings, LedgerPresentation};
    pub use crate::config::store::{GroupConfig, PolicyStore};
    pub use crate::core::account::{AccountCode, AccountPurpose, TrialBalance, TrialBalanceLine};
    pub use crate::core::currency::{CurrencyCode, RateBasis, RateTable};
    pub use crate::core::entity::{Entity, EntityCode};
    pub use crate::core::ledger::{ConsolLedger, ConsolLine, LineTag};
    pub use crate::core::period::Period;
    pub use crate::core::posting::{IntercompanyPosting, PostingId};
    pub use crate::error::ConsolidationError;
    pub use crate::graph::ownership_graph::OwnershipEdge;
    pub use crate::graph::resolver::{ConsolidationMethod, OwnershipResolver, ResolvedEntity};
    pub use crate::run::orchestrator::Orchestrator;
    pub use crate::run::providers::{MemoryLedger, MemorySink};
    pub use crate::run::state::RunState;
    pub use crate::scenario::Scenario;
}
