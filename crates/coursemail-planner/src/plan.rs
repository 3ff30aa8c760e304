//! Shared planning path
//!
//! Every category scheduler resolves its templates and recipients, then funnels
//! each (template, recipient) pair through [`Planner::enqueue`]. Duplicate
//! prevention is left to the queue's unique key, so repeated runs are safe.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use coursemail_core::send_time::{format_display_date, parse_reference_date};
use coursemail_email::template::{MissingKey, TemplateEngine};
use coursemail_types::queue_adapter::{
	EnqueueResult, ListTemplateOptions, NewScheduledEmail, QueueAdapter, Template,
	TemplateCategory,
};

use crate::prelude::*;

/// Outcome counters of one scheduling run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlanReport {
	pub inserted: usize,
	pub duplicates: usize,
	pub skipped: usize,
}

impl PlanReport {
	pub fn merge(&mut self, other: &PlanReport) {
		self.inserted += other.inserted;
		self.duplicates += other.duplicates;
		self.skipped += other.skipped;
	}
}

/// A subject/body pair with the name it is queued under
#[derive(Debug, Clone)]
pub(crate) struct MailSource {
	pub template_id: Option<i64>,
	pub template_name: Box<str>,
	pub subject: Box<str>,
	pub body_html: Box<str>,
}

impl From<&Template> for MailSource {
	fn from(t: &Template) -> Self {
		Self {
			template_id: Some(t.template_id),
			template_name: t.template_name.clone(),
			subject: t.subject.clone(),
			body_html: t.body_html.clone(),
		}
	}
}

/// One (template, recipient) pair ready for rendering
pub(crate) struct Planned<'a> {
	pub batch_no: &'a str,
	pub source: &'a MailSource,
	pub category: TemplateCategory,
	pub recipient_email: &'a str,
	pub recipient_name: Option<&'a str>,
	pub user_role: Option<&'a str>,
	pub scheduled_at: Timestamp,
	pub vars: &'a Value,
}

pub struct Planner {
	pub(crate) adapter: Arc<dyn QueueAdapter>,
	pub(crate) engine: TemplateEngine,
}

impl Planner {
	pub fn new(adapter: Arc<dyn QueueAdapter>) -> ClResult<Self> {
		Ok(Self { adapter, engine: TemplateEngine::new(MissingKey::Blank)? })
	}

	/// Render and insert one pair; failures are logged and counted as skipped
	pub(crate) async fn enqueue(&self, planned: Planned<'_>, report: &mut PlanReport) {
		let rendered = self.engine.render_mail(
			&planned.source.subject,
			&planned.source.body_html,
			planned.vars,
		);

		let email = NewScheduledEmail {
			batch_no: planned.batch_no.into(),
			recipient_email: planned.recipient_email.trim().into(),
			recipient_name: planned.recipient_name.map(Into::into),
			template_id: planned.source.template_id,
			template_name: planned.source.template_name.clone(),
			category: planned.category,
			user_role: planned.user_role.map(Into::into),
			subject: rendered.subject.into(),
			body_html: rendered.html_body.into(),
			attachment_name: None,
			attachment_data: None,
			scheduled_at: planned.scheduled_at,
		};

		match self.adapter.enqueue_email(&email).await {
			Ok(EnqueueResult::Inserted(id)) => {
				report.inserted += 1;
				debug!(
					id,
					to = %email.recipient_email,
					template = %email.template_name,
					at = %email.scheduled_at.to_iso_string(),
					"Email scheduled"
				);
			}
			Ok(EnqueueResult::Duplicate) => {
				report.duplicates += 1;
				debug!(
					to = %email.recipient_email,
					template = %email.template_name,
					"Email already scheduled"
				);
			}
			Err(err) => {
				report.skipped += 1;
				warn!(
					to = %email.recipient_email,
					template = %email.template_name,
					"Failed to schedule email: {}",
					err
				);
			}
		}
	}

	/// Active templates of a category, optionally narrowed further
	pub(crate) async fn templates(&self, opts: ListTemplateOptions) -> ClResult<Vec<Template>> {
		self.adapter.list_templates(&ListTemplateOptions { active_only: true, ..opts }).await
	}

	/// Named reminder template, or the built-in text
	pub(crate) async fn reminder_source(
		&self,
		name: &str,
		subject: &str,
		body_html: &str,
	) -> ClResult<MailSource> {
		let found = self
			.templates(ListTemplateOptions {
				category: Some(TemplateCategory::Reminder),
				template_name: Some(name.to_string()),
				..Default::default()
			})
			.await?;

		Ok(match found.first() {
			Some(t) => MailSource::from(t),
			None => {
				debug!("No stored '{}' template, using built-in text", name);
				MailSource {
					template_id: None,
					template_name: name.into(),
					subject: subject.into(),
					body_html: body_html.into(),
				}
			}
		})
	}

	/// Batch start date, failing with NotFound when the planner has no rows
	pub(crate) async fn start_date(&self, batch_no: &str) -> ClResult<Box<str>> {
		self.adapter.read_batch_start_date(batch_no).await?.ok_or_else(|| {
			warn!("No course planner data for batch {}", batch_no);
			Error::NotFound
		})
	}

	pub(crate) async fn form_url(&self, batch_no: &str) -> ClResult<String> {
		Ok(self.adapter.read_batch_form_url(batch_no).await?.map(String::from).unwrap_or_default())
	}
}

/// `dd-Mon-yyyy` rendering of a stored date string
pub(crate) fn display_date(raw: &str) -> String {
	format_display_date(parse_reference_date(raw))
}

pub(crate) fn require(field: &str, value: &str) -> ClResult<()> {
	if value.trim().is_empty() {
		return Err(Error::ValidationError(format!("{} is required", field)));
	}
	Ok(())
}

// vim: ts=4
