//! Adapter that persists templates, reference data, and the outgoing mail queue.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::{collections::HashMap, fmt::Debug};

use crate::prelude::*;

/// Queue row lifecycle: scheduled → processing → sent | failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailStatus {
	Scheduled,
	Processing,
	Sent,
	Failed,
}

impl EmailStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			EmailStatus::Scheduled => "scheduled",
			EmailStatus::Processing => "processing",
			EmailStatus::Sent => "sent",
			EmailStatus::Failed => "failed",
		}
	}
}

impl std::str::FromStr for EmailStatus {
	type Err = Error;

	fn from_str(s: &str) -> ClResult<Self> {
		match s {
			"scheduled" => Ok(EmailStatus::Scheduled),
			"processing" => Ok(EmailStatus::Processing),
			"sent" => Ok(EmailStatus::Sent),
			"failed" => Ok(EmailStatus::Failed),
			_ => Err(Error::ValidationError(format!("invalid email status: {}", s))),
		}
	}
}

/// Which scheduler a template belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateCategory {
	Learner,
	Internal,
	CourseApplication,
	Reminder,
	Attendance,
}

impl TemplateCategory {
	pub fn as_str(self) -> &'static str {
		match self {
			TemplateCategory::Learner => "learner",
			TemplateCategory::Internal => "internal",
			TemplateCategory::CourseApplication => "course_application",
			TemplateCategory::Reminder => "reminder",
			TemplateCategory::Attendance => "attendance",
		}
	}
}

impl std::str::FromStr for TemplateCategory {
	type Err = Error;

	fn from_str(s: &str) -> ClResult<Self> {
		match s {
			"learner" => Ok(TemplateCategory::Learner),
			"internal" => Ok(TemplateCategory::Internal),
			"course_application" => Ok(TemplateCategory::CourseApplication),
			"reminder" => Ok(TemplateCategory::Reminder),
			"attendance" => Ok(TemplateCategory::Attendance),
			_ => Err(Error::ValidationError(format!("invalid template category: {}", s))),
		}
	}
}

/// Delivery mode of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryMode {
	Online,
	Offline,
}

impl DeliveryMode {
	pub fn as_str(self) -> &'static str {
		match self {
			DeliveryMode::Online => "Online",
			DeliveryMode::Offline => "Offline",
		}
	}
}

impl std::str::FromStr for DeliveryMode {
	type Err = Error;

	fn from_str(s: &str) -> ClResult<Self> {
		match s {
			"Online" => Ok(DeliveryMode::Online),
			"Offline" => Ok(DeliveryMode::Offline),
			_ => Err(Error::ValidationError(format!("invalid mode: {}", s))),
		}
	}
}

// Templates
//***********
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct Template {
	pub template_id: i64,
	pub template_name: Box<str>,
	pub category: TemplateCategory,
	pub mode: Option<DeliveryMode>,
	pub batch_type: Option<Box<str>>,
	pub user_role: Option<Box<str>>,
	/// Comma-separated fixed recipients
	pub recipient_emails: Option<Box<str>>,
	pub offset_days: i64,
	pub send_time: Box<str>,
	pub subject: Box<str>,
	pub body_html: Box<str>,
	pub active: bool,
	pub created_at: Timestamp,
	pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTemplate {
	pub template_name: String,
	pub category: TemplateCategory,
	pub mode: Option<DeliveryMode>,
	pub batch_type: Option<String>,
	pub user_role: Option<String>,
	pub recipient_emails: Option<String>,
	#[serde(default)]
	pub offset_days: i64,
	pub send_time: Option<String>,
	pub subject: String,
	pub body_html: String,
	#[serde(default = "default_true")]
	pub active: bool,
}

fn default_true() -> bool {
	true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTemplate {
	#[serde(default)]
	pub template_name: Patch<String>,
	#[serde(default)]
	pub mode: Patch<DeliveryMode>,
	#[serde(default)]
	pub batch_type: Patch<String>,
	#[serde(default)]
	pub user_role: Patch<String>,
	#[serde(default)]
	pub recipient_emails: Patch<String>,
	#[serde(default)]
	pub offset_days: Patch<i64>,
	#[serde(default)]
	pub send_time: Patch<String>,
	#[serde(default)]
	pub subject: Patch<String>,
	#[serde(default)]
	pub body_html: Patch<String>,
	#[serde(default)]
	pub active: Patch<bool>,
}

/// How a template's batch type must match
#[derive(Debug, Clone, Default)]
pub enum BatchTypeFilter {
	/// No constraint
	#[default]
	Any,
	/// batch_type IS NULL
	Unset,
	/// batch_type = value
	Is(String),
}

#[derive(Debug, Clone, Default)]
pub struct ListTemplateOptions {
	pub category: Option<TemplateCategory>,
	pub mode: Option<DeliveryMode>,
	pub batch_type: BatchTypeFilter,
	pub user_role: Option<String>,
	pub template_name: Option<String>,
	pub active_only: bool,
}

// Reference data
//****************
/// One dated entry of a batch's course planner
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerTopic {
	pub batch_no: Box<str>,
	/// Calendar date, `YYYY-MM-DD`
	pub date: Box<str>,
	pub topic_name: Box<str>,
	pub trainer_name: Option<Box<str>>,
	pub trainer_email: Option<Box<str>>,
	pub mode: Option<Box<str>>,
}

#[derive(Debug, Clone, Default)]
pub struct ListTopicOptions {
	pub batch_no: Option<String>,
	/// SQL LIKE pattern on the topic name
	pub topic_like: Option<String>,
	/// Inclusive date range, `YYYY-MM-DD`
	pub date_from: Option<String>,
	pub date_to: Option<String>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Learner {
	pub batch_no: Box<str>,
	pub name: Option<Box<str>>,
	pub email: Box<str>,
	pub status: Option<Box<str>>,
}

// Queue
//*******
/// Row produced by a scheduler
#[derive(Debug, Clone)]
pub struct NewScheduledEmail {
	pub batch_no: Box<str>,
	pub recipient_email: Box<str>,
	pub recipient_name: Option<Box<str>>,
	pub template_id: Option<i64>,
	pub template_name: Box<str>,
	pub category: TemplateCategory,
	pub user_role: Option<Box<str>>,
	pub subject: Box<str>,
	pub body_html: Box<str>,
	pub attachment_name: Option<Box<str>>,
	/// Base64 encoded
	pub attachment_data: Option<Box<str>>,
	pub scheduled_at: Timestamp,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledEmail {
	pub id: i64,
	pub batch_no: Box<str>,
	pub recipient_email: Box<str>,
	pub recipient_name: Option<Box<str>>,
	pub template_id: Option<i64>,
	pub template_name: Box<str>,
	pub category: TemplateCategory,
	pub user_role: Option<Box<str>>,
	pub subject: Box<str>,
	pub body_html: Box<str>,
	pub attachment_name: Option<Box<str>>,
	#[serde(skip)]
	pub attachment_data: Option<Box<str>>,
	pub scheduled_at: Timestamp,
	pub status: EmailStatus,
	pub retry_count: u16,
	pub next_attempt_at: Option<Timestamp>,
	pub last_attempt_at: Option<Timestamp>,
	pub error: Option<Box<str>>,
	pub message_id: Option<Box<str>>,
	pub sent_at: Option<Timestamp>,
	/// Set by a claim, identifies the dispatch pass holding the row
	#[serde(skip)]
	pub claim_token: Option<Box<str>>,
	pub created_at: Timestamp,
	pub updated_at: Timestamp,
}

/// Result of one delivery attempt on a claimed row
#[derive(Debug, Clone)]
pub enum DeliveryOutcome {
	Sent { message_id: Option<Box<str>>, sent_at: Timestamp },
	Failed { error: String, next_attempt_at: Option<Timestamp> },
}

/// Outcome of an insert-if-absent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
	Inserted(i64),
	Duplicate,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListEmailOptions {
	pub batch_no: Option<String>,
	/// Case-insensitive substring match on the recipient
	#[serde(alias = "recipient_email")]
	pub recipient: Option<String>,
	pub status: Option<EmailStatus>,
	pub limit: Option<u32>,
	pub offset: Option<u32>,
}

#[derive(Debug, Clone, Copy)]
pub struct ClaimOptions {
	pub now: Timestamp,
	pub limit: u32,
	/// Rows with retry_count at or above this are never claimed
	pub max_attempts: u16,
}

#[async_trait]
pub trait QueueAdapter: Debug + Send + Sync {
	// Templates
	//***********
	async fn list_templates(&self, opts: &ListTemplateOptions) -> ClResult<Vec<Template>>;
	async fn read_template(&self, template_id: i64) -> ClResult<Template>;
	async fn create_template(&self, template: &CreateTemplate) -> ClResult<i64>;
	async fn update_template(&self, template_id: i64, patch: &UpdateTemplate) -> ClResult<()>;
	async fn delete_template(&self, template_id: i64) -> ClResult<()>;

	// Reference data
	//****************
	/// Earliest planner date of a batch
	async fn read_batch_start_date(&self, batch_no: &str) -> ClResult<Option<Box<str>>>;
	async fn list_planner_topics(&self, opts: &ListTopicOptions) -> ClResult<Vec<PlannerTopic>>;
	/// Distinct non-empty trainer addresses of a batch
	async fn list_trainer_emails(&self, batch_no: &str) -> ClResult<Vec<Box<str>>>;
	async fn list_learners(&self, batch_no: &str) -> ClResult<Vec<Learner>>;
	async fn read_batch_form_url(&self, batch_no: &str) -> ClResult<Option<Box<str>>>;
	async fn add_planner_topic(&self, topic: &PlannerTopic) -> ClResult<()>;
	async fn add_learner(&self, learner: &Learner) -> ClResult<()>;
	async fn set_batch_form_url(&self, batch_no: &str, form_url: &str) -> ClResult<()>;
	/// Returns the number of learner records changed
	async fn update_learner_email(
		&self,
		batch_no: &str,
		old_email: &str,
		new_email: &str,
	) -> ClResult<u64>;

	// Queue
	//*******
	/// Inserts unless a row with the same (recipient, batch, template, scheduled_at) exists
	async fn enqueue_email(&self, email: &NewScheduledEmail) -> ClResult<EnqueueResult>;
	async fn list_emails(&self, opts: &ListEmailOptions) -> ClResult<Vec<ScheduledEmail>>;
	/// Rows matching the filters of `opts`, ignoring limit and offset
	async fn count_emails(&self, opts: &ListEmailOptions) -> ClResult<u64>;
	async fn read_email(&self, id: i64) -> ClResult<ScheduledEmail>;
	/// Atomically moves due rows to processing under a fresh claim token and returns them
	async fn claim_due_emails(&self, opts: &ClaimOptions) -> ClResult<Vec<ScheduledEmail>>;
	/// Records that the send of a claimed row begins now. False when the row is
	/// no longer held by `claim_token`, in which case it must not be sent.
	async fn start_delivery(&self, id: i64, claim_token: &str, now: Timestamp) -> ClResult<bool>;
	/// Stores the result of a send started under `claim_token`. False when another
	/// claim has taken the row over since.
	async fn complete_delivery(
		&self,
		id: i64,
		claim_token: &str,
		outcome: &DeliveryOutcome,
	) -> ClResult<bool>;
	/// Marks a row sent regardless of claims (manual resend)
	async fn mark_email_sent(&self, id: i64, message_id: Option<&str>, sent_at: Timestamp)
	-> ClResult<()>;
	/// Marks a row failed regardless of claims
	async fn mark_email_failed(
		&self,
		id: i64,
		error: &str,
		next_attempt_at: Option<Timestamp>,
	) -> ClResult<()>;
	/// Recovers rows held in processing since before `older_than`. Rows whose send
	/// never started go back to scheduled without using up an attempt; rows
	/// interrupted mid-send become failed and retry at `retry_at`.
	async fn requeue_stale_emails(&self, older_than: Timestamp, retry_at: Timestamp)
	-> ClResult<u64>;
	/// Resets failed rows to scheduled at `scheduled_at` with a fresh retry budget
	async fn requeue_failed_emails(
		&self,
		batch_no: Option<&str>,
		scheduled_at: Timestamp,
	) -> ClResult<u64>;
	async fn update_email_recipient(&self, id: i64, recipient_email: &str) -> ClResult<()>;
	async fn update_email_content(
		&self,
		id: i64,
		recipient_email: &str,
		subject: &str,
		body_html: &str,
	) -> ClResult<()>;

	// Settings
	//**********
	async fn list_settings(&self) -> ClResult<HashMap<String, serde_json::Value>>;
	async fn read_setting(&self, name: &str) -> ClResult<Option<serde_json::Value>>;
	async fn update_setting(&self, name: &str, value: Option<serde_json::Value>) -> ClResult<()>;
}


// vim: ts=4
