//! # Integration Scenarios
//!
//! Every scenario builds its own in-memory database, so tests run in
//! parallel without sharing state.

pub mod execution;
pub mod lifecycle;
pub mod recovery;
pub mod resilience;
