//! coursemail schedules and delivers the emails around a training batch.
//!
//! # Features
//!
//! - Templates with `{{placeholder}}` substitution
//! - Send times relative to the batch start date, in IST
//! - Learner welcome, internal role, course application and reminder mails
//! - One idempotent queue with an atomic claim, SMTP delivery and bounded retries
//! - Absence mails from an uploaded attendance sheet
//! - A JSON HTTP API for all of the above

// Re-export shared types and adapter traits from coursemail-types
pub use coursemail_types::error;
pub use coursemail_types::queue_adapter;
pub use coursemail_types::types;
pub use coursemail_types::utils;

// Feature crate re-exports
pub use coursemail_core::scheduler;
pub use coursemail_core::send_time;
pub use coursemail_core::settings;
pub use coursemail_email as email;
pub use coursemail_planner as planner;

// Local modules
pub mod app;
pub mod handler;
pub mod prelude;
pub mod routes;

pub use crate::app::{App, AppBuilder};

// vim: ts=4
