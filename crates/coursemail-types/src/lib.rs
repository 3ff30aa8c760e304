//! Shared types, adapter traits, and core utilities for the coursemail pipeline.
//!
//! Adapter crates depend only on this crate, so they compile independently of
//! the scheduling and delivery crates.

pub mod error;
pub mod prelude;
pub mod queue_adapter;
pub mod types;
pub mod utils;

// vim: ts=4
