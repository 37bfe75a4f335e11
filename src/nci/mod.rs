//! Non-controlling interest.

pub mod calculator;
