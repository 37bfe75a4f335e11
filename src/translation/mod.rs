//! Currency translation of entity trial balances and posting of the
//! resulting translation differences.

pub mod cta;
pub mod engine;
