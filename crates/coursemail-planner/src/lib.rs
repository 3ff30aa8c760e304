//! Mail planning: fills the delivery queue from templates and course
//! planner data.
//!
//! One [`Planner`] serves every category (learner welcome, internal roles,
//! course application follow-ups, quiz and assessment reminders) through a
//! single insert-if-absent path.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod course_application;
pub mod internal;
pub mod learner;
pub mod plan;
pub mod reminders;
pub mod settings;
pub mod task;

mod prelude;

pub use course_application::CourseApplicationRequest;
pub use internal::{InternalScheduleRequest, RoleRecipients};
pub use learner::LearnerScheduleRequest;
pub use plan::{PlanReport, Planner};
pub use reminders::{ReminderOptions, ReminderRequest};
pub use task::RemindersTask;

use std::sync::Arc;

use coursemail_core::scheduler::RetryPolicy;
use coursemail_core::settings::SettingsRegistry;

use crate::prelude::*;

pub fn register_settings(registry: &mut SettingsRegistry) -> ClResult<()> {
	settings::register_settings(registry)
}

/// Register the daily reminder planning task with the scheduler
pub async fn init(app: &App) -> ClResult<()> {
	let cron = app.settings.get_string("planner.reminder_cron").await?;
	app.scheduler
		.task(Arc::new(RemindersTask))
		.cron(&cron)?
		.with_retry(RetryPolicy::new((60, 900), 3))
		.register()?;
	info!("Reminder planning scheduled at '{}' (UTC)", cron);
	Ok(())
}

// vim: ts=4
