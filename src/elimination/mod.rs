//! Intercompany elimination: rule-driven matching of reciprocal postings,
//! manual match decisions, and the elimination entries they produce.

pub mod decisions;
pub mod matcher;
