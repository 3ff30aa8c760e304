//! Weekly quiz and intermediate assessment reminders
//!
//! Driven by course planner topics in a look-ahead window rather than by a
//! batch start date.

use chrono::{Datelike, NaiveDate, NaiveTime, TimeDelta};
use serde::Deserialize;
use serde_json::json;

use coursemail_core::send_time::{compute_send_at, format_display_date, parse_reference_date, parse_send_time};
use coursemail_core::settings::SettingsService;
use coursemail_types::queue_adapter::{ListTopicOptions, PlannerTopic, TemplateCategory};
use coursemail_types::utils::looks_like_email;

use crate::plan::{PlanReport, Planned, Planner};
use crate::prelude::*;

pub const LEARNER_QUIZ_TEMPLATE: &str = "Learner Weekly Quiz Reminder";
pub const TRAINER_QUIZ_TEMPLATE: &str = "Trainer Weekly Quiz Reminder";
pub const TRAINER_ASSESSMENT_TEMPLATE: &str = "Trainer Intermediate Assessment Reminder";

const LEARNER_QUIZ_SUBJECT: &str = "Reminder: Weekly Quiz scheduled today for batch {{batch_no}}";
const LEARNER_QUIZ_BODY: &str = "<p>Dear {{name}},</p>\
<p>This is a reminder that the Weekly Quiz for your batch <b>{{batch_no}}</b> is scheduled today ({{quiz_date}}). Please prepare accordingly.</p>\
<p>Best regards,</p><p>Training Team</p>";

const TRAINER_QUIZ_SUBJECT: &str = "Reminder: Prepare question paper for Weekly Quiz on {{quiz_date}}";
const TRAINER_QUIZ_BODY: &str = "<p>Dear {{trainer_name}},</p>\
<p>Please prepare the question paper for the Weekly Quiz scheduled for batch <b>{{batch_no}}</b> on <b>{{quiz_date}}</b>.</p>\
<p>Thank you for your cooperation.</p>";

const TRAINER_ASSESSMENT_SUBJECT: &str = "Reminder: {{topic_name}} for batch {{batch_no}}";
const TRAINER_ASSESSMENT_BODY: &str = "<p>Dear {{trainer_name}},</p>\
<p>This is the reminder for the <b>{{topic_name}}</b> on {{assessment_date}}. Kindly get ready with the question papers and the necessary things.</p>";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReminderRequest {
	pub batch_no: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReminderOptions {
	pub quiz_lookahead_days: i64,
	pub assessment_lookahead_days: i64,
	pub quiz_learner_time: NaiveTime,
}

impl Default for ReminderOptions {
	fn default() -> Self {
		Self {
			quiz_lookahead_days: 7,
			assessment_lookahead_days: 40,
			quiz_learner_time: parse_send_time(None),
		}
	}
}

impl ReminderOptions {
	pub async fn load(settings: &SettingsService) -> ClResult<Self> {
		let learner_time = settings.get_string("planner.quiz_learner_time").await?;
		Ok(Self {
			quiz_lookahead_days: settings.get_int("planner.quiz_lookahead_days").await?,
			assessment_lookahead_days: settings.get_int("planner.assessment_lookahead_days").await?,
			quiz_learner_time: parse_send_time(Some(&learner_time)),
		})
	}
}

/// Thursday on or before the quiz date (the quiz date itself when it is a Thursday)
pub fn trainer_quiz_date(quiz_date: NaiveDate) -> NaiveDate {
	let weekday = i64::from(quiz_date.weekday().num_days_from_sunday());
	let back = if weekday >= 4 { weekday - 4 } else { 3 + weekday };
	quiz_date - TimeDelta::days(back)
}

fn nine_am() -> NaiveTime {
	parse_send_time(None)
}

fn window(today: NaiveDate, days: i64, batch_no: Option<&str>, pattern: &str) -> ListTopicOptions {
	let to = today.checked_add_signed(TimeDelta::days(days)).unwrap_or(today);
	ListTopicOptions {
		batch_no: batch_no.map(str::trim).filter(|s| !s.is_empty()).map(ToOwned::to_owned),
		topic_like: Some(pattern.to_string()),
		date_from: Some(today.format("%Y-%m-%d").to_string()),
		date_to: Some(to.format("%Y-%m-%d").to_string()),
	}
}

fn topic_date(topic: &PlannerTopic) -> Option<NaiveDate> {
	let date = parse_reference_date(&topic.date);
	if date.is_none() {
		warn!(batch_no = %topic.batch_no, "Skipping topic with invalid date '{}'", topic.date);
	}
	date
}

fn trainer_email(topic: &PlannerTopic) -> Option<&str> {
	topic.trainer_email.as_deref().map(str::trim).filter(|e| looks_like_email(e))
}

impl Planner {
	/// Learners on the quiz day, the trainer on the preceding Thursday
	pub async fn schedule_weekly_quiz_reminders(
		&self,
		opts: &ReminderOptions,
		today: NaiveDate,
		batch_no: Option<&str>,
	) -> ClResult<PlanReport> {
		let topics = self
			.adapter
			.list_planner_topics(&window(today, opts.quiz_lookahead_days, batch_no, "%Weekly Quiz%"))
			.await?;
		let mut report = PlanReport::default();
		if topics.is_empty() {
			info!("No Weekly Quiz scheduled in the next {} days", opts.quiz_lookahead_days);
			return Ok(report);
		}

		let learner_source = self
			.reminder_source(LEARNER_QUIZ_TEMPLATE, LEARNER_QUIZ_SUBJECT, LEARNER_QUIZ_BODY)
			.await?;
		let trainer_source = self
			.reminder_source(TRAINER_QUIZ_TEMPLATE, TRAINER_QUIZ_SUBJECT, TRAINER_QUIZ_BODY)
			.await?;

		for topic in &topics {
			let Some(quiz_date) = topic_date(topic) else {
				report.skipped += 1;
				continue;
			};
			let batch_no: &str = &topic.batch_no;
			let quiz_display = format_display_date(Some(quiz_date));
			let trainer_name = topic.trainer_name.as_deref().unwrap_or("Trainer");

			match self.adapter.list_learners(batch_no).await {
				Ok(learners) => {
					let learner_at = compute_send_at(quiz_date, 0, opts.quiz_learner_time);
					for learner in &learners {
						let (Some(at), true) = (learner_at, looks_like_email(&learner.email)) else {
							report.skipped += 1;
							continue;
						};
						let name = learner.name.as_deref().filter(|n| !n.trim().is_empty());
						let vars = json!({
							"batch_no": batch_no,
							"name": name.unwrap_or("Learner"),
							"quiz_date": quiz_display,
							"topic_name": topic.topic_name,
							"trainer_name": trainer_name,
						});
						self.enqueue(
							Planned {
								batch_no,
								source: &learner_source,
								category: TemplateCategory::Reminder,
								recipient_email: &learner.email,
								recipient_name: name,
								user_role: None,
								scheduled_at: at,
								vars: &vars,
							},
							&mut report,
						)
						.await;
					}
				}
				Err(err) => {
					warn!(batch_no, "Failed to fetch learners: {}", err);
					report.skipped += 1;
				}
			}

			let Some(trainer) = trainer_email(topic) else {
				debug!(batch_no, "No trainer email for Weekly Quiz on {}", quiz_display);
				continue;
			};
			let Some(at) = compute_send_at(trainer_quiz_date(quiz_date), 0, nine_am()) else {
				report.skipped += 1;
				continue;
			};
			let vars = json!({
				"batch_no": batch_no,
				"quiz_date": quiz_display,
				"topic_name": topic.topic_name,
				"trainer_name": trainer_name,
			});
			self.enqueue(
				Planned {
					batch_no,
					source: &trainer_source,
					category: TemplateCategory::Reminder,
					recipient_email: trainer,
					recipient_name: topic.trainer_name.as_deref(),
					user_role: Some("Trainer"),
					scheduled_at: at,
					vars: &vars,
				},
				&mut report,
			)
			.await;
		}

		info!(?report, "Weekly Quiz reminders scheduled");
		Ok(report)
	}

	/// Trainer reminder at 09:00 a week before each intermediate assessment
	pub async fn schedule_assessment_reminders(
		&self,
		opts: &ReminderOptions,
		today: NaiveDate,
		batch_no: Option<&str>,
	) -> ClResult<PlanReport> {
		let topics = self
			.adapter
			.list_planner_topics(&window(
				today,
				opts.assessment_lookahead_days,
				batch_no,
				"Intermediate Assessment%",
			))
			.await?;
		let mut report = PlanReport::default();
		if topics.is_empty() {
			info!(batch_no, "No Intermediate Assessment found");
			return Ok(report);
		}

		let source = self
			.reminder_source(
				TRAINER_ASSESSMENT_TEMPLATE,
				TRAINER_ASSESSMENT_SUBJECT,
				TRAINER_ASSESSMENT_BODY,
			)
			.await?;

		for topic in &topics {
			let Some(trainer) = trainer_email(topic) else {
				warn!(batch_no = %topic.batch_no, "Skipping assessment reminder, missing trainer email");
				report.skipped += 1;
				continue;
			};
			let Some(assessment_date) = topic_date(topic) else {
				report.skipped += 1;
				continue;
			};
			let reminder_date = assessment_date - TimeDelta::days(7);
			if reminder_date < today {
				debug!(batch_no = %topic.batch_no, "Reminder date {} already past", reminder_date);
				report.skipped += 1;
				continue;
			}
			let Some(at) = compute_send_at(reminder_date, 0, nine_am()) else {
				report.skipped += 1;
				continue;
			};

			let vars = json!({
				"batch_no": topic.batch_no,
				"topic_name": topic.topic_name,
				"trainer_name": topic.trainer_name.as_deref().unwrap_or("Trainer"),
				"assessment_date": format_display_date(Some(assessment_date)),
			});
			self.enqueue(
				Planned {
					batch_no: &topic.batch_no,
					source: &source,
					category: TemplateCategory::Reminder,
					recipient_email: trainer,
					recipient_name: topic.trainer_name.as_deref(),
					user_role: Some("Trainer"),
					scheduled_at: at,
					vars: &vars,
				},
				&mut report,
			)
			.await;
		}

		info!(?report, "Intermediate Assessment reminders scheduled");
		Ok(report)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn date(s: &str) -> NaiveDate {
		NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
	}

	#[test]
	fn test_trainer_quiz_date() {
		// 2025-01-09 is a Thursday
		assert_eq!(trainer_quiz_date(date("2025-01-09")), date("2025-01-09"));
		// Saturday -> Thursday two days earlier
		assert_eq!(trainer_quiz_date(date("2025-01-11")), date("2025-01-09"));
		// Sunday -> previous Thursday
		assert_eq!(trainer_quiz_date(date("2025-01-12")), date("2025-01-09"));
		// Monday -> previous Thursday
		assert_eq!(trainer_quiz_date(date("2025-01-13")), date("2025-01-09"));
		// Wednesday -> previous week's Thursday
		assert_eq!(trainer_quiz_date(date("2025-01-15")), date("2025-01-09"));
	}

	#[test]
	fn test_window() {
		let w = window(date("2025-01-06"), 7, Some(" "), "%Weekly Quiz%");
		assert!(w.batch_no.is_none());
		assert_eq!(w.date_from.as_deref(), Some("2025-01-06"));
		assert_eq!(w.date_to.as_deref(), Some("2025-01-13"));
	}
}

// vim: ts=4
