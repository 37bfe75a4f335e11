//! Consolidation runs: lifecycle, persistence, collaborator interfaces and
//! the orchestrator that computes a group for a period.

pub mod orchestrator;
pub mod providers;
pub mod state;
pub mod store;
