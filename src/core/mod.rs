//! Foundational types: entities, currencies and rates, periods, accounts,
//! intercompany postings and consolidated lines.

pub mod account;
pub mod currency;
pub mod entity;
pub mod ledger;
pub mod period;
pub mod posting;
