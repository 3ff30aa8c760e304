//! Daily reminder planning task

use async_trait::async_trait;
use std::sync::Arc;

use coursemail_core::scheduler::Task;
use coursemail_core::send_time::date_ist;

use crate::Planner;
use crate::prelude::*;
use crate::reminders::ReminderOptions;

#[derive(Debug, Default)]
pub struct RemindersTask;

#[async_trait]
impl Task<App> for RemindersTask {
	fn kind_of(&self) -> &'static str {
		"planner.reminders"
	}

	async fn run(&self, app: &App) -> ClResult<()> {
		let planner = app.ext::<Arc<Planner>>()?;
		let opts = ReminderOptions::load(&app.settings).await?;
		let today = date_ist(Timestamp::now());

		let quiz = planner.schedule_weekly_quiz_reminders(&opts, today, None).await?;
		let assessment = planner.schedule_assessment_reminders(&opts, today, None).await?;
		info!(
			quiz_inserted = quiz.inserted,
			assessment_inserted = assessment.inserted,
			"Reminder planning finished for {}",
			today
		);
		Ok(())
	}
}

// vim: ts=4
