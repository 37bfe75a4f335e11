//! Rate & Policy Store.
//!
//! Administrators maintain group configuration through [`store::PolicyStore`].
//! A run reads it exactly once, as an immutable [`store::ConfigSnapshot`].

pub mod account_map;
pub mod cta;
pub mod elimination_rule;
pub mod nci_map;
pub mod rate_policy;
pub mod settings;
pub mod store;
