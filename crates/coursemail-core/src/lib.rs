//! Core infrastructure shared by the scheduling and delivery crates.

pub mod app;
pub mod extensions;
pub mod prelude;
pub mod scheduler;
pub mod send_time;
pub mod settings;

pub use app::{App, AppBuilderOpts, AppState};

// vim: ts=4
