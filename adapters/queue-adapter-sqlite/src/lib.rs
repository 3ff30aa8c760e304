//! SQLite implementation of the coursemail queue adapter.

use async_trait::async_trait;
use sqlx::sqlite::{self, SqlitePool};
use std::{collections::HashMap, path::Path};

use coursemail::{prelude::*, queue_adapter::*};

mod email;
mod reference;
mod schema;
mod setting;
mod template;
mod utils;

use schema::init_db;

const DB_FILE: &str = "coursemail.db";

#[derive(Debug)]
pub struct QueueAdapterSqlite {
	db: SqlitePool,
}

impl QueueAdapterSqlite {
	/// Opens (or creates) the database inside `dir`
	pub async fn new(dir: impl AsRef<Path>) -> ClResult<Self> {
		tokio::fs::create_dir_all(dir.as_ref()).await?;
		let opts = sqlite::SqliteConnectOptions::new()
			.filename(dir.as_ref().join(DB_FILE))
			.create_if_missing(true)
			.journal_mode(sqlite::SqliteJournalMode::Wal);
		let db = sqlite::SqlitePoolOptions::new()
			.max_connections(5)
			.connect_with(opts)
			.await
			.inspect_err(|err| error!("DbError: {:#?}", err))
			.or(Err(Error::DbError))?;

		init_db(&db)
			.await
			.inspect_err(|err| error!("DbError: {:#?}", err))
			.or(Err(Error::DbError))?;

		info!("Queue database opened at {}", dir.as_ref().display());
		Ok(Self { db })
	}
}

#[async_trait]
impl QueueAdapter for QueueAdapterSqlite {
	// Templates
	//***********
	async fn list_templates(&self, opts: &ListTemplateOptions) -> ClResult<Vec<Template>> {
		template::list(&self.db, opts).await
	}

	async fn read_template(&self, template_id: i64) -> ClResult<Template> {
		template::read(&self.db, template_id).await
	}

	async fn create_template(&self, tpl: &CreateTemplate) -> ClResult<i64> {
		template::create(&self.db, tpl).await
	}

	async fn update_template(&self, template_id: i64, patch: &UpdateTemplate) -> ClResult<()> {
		template::update(&self.db, template_id, patch).await
	}

	async fn delete_template(&self, template_id: i64) -> ClResult<()> {
		template::delete(&self.db, template_id).await
	}

	// Reference data
	//****************
	async fn read_batch_start_date(&self, batch_no: &str) -> ClResult<Option<Box<str>>> {
		reference::read_start_date(&self.db, batch_no).await
	}

	async fn list_planner_topics(&self, opts: &ListTopicOptions) -> ClResult<Vec<PlannerTopic>> {
		reference::list_topics(&self.db, opts).await
	}

	async fn list_trainer_emails(&self, batch_no: &str) -> ClResult<Vec<Box<str>>> {
		reference::list_trainer_emails(&self.db, batch_no).await
	}

	async fn list_learners(&self, batch_no: &str) -> ClResult<Vec<Learner>> {
		reference::list_learners(&self.db, batch_no).await
	}

	async fn read_batch_form_url(&self, batch_no: &str) -> ClResult<Option<Box<str>>> {
		reference::read_form_url(&self.db, batch_no).await
	}

	async fn add_planner_topic(&self, topic: &PlannerTopic) -> ClResult<()> {
		reference::add_topic(&self.db, topic).await
	}

	async fn add_learner(&self, learner: &Learner) -> ClResult<()> {
		reference::add_learner(&self.db, learner).await
	}

	async fn set_batch_form_url(&self, batch_no: &str, form_url: &str) -> ClResult<()> {
		reference::set_form_url(&self.db, batch_no, form_url).await
	}

	async fn update_learner_email(
		&self,
		batch_no: &str,
		old_email: &str,
		new_email: &str,
	) -> ClResult<u64> {
		reference::update_learner_email(&self.db, batch_no, old_email, new_email).await
	}

	// Queue
	//*******
	async fn enqueue_email(&self, email: &NewScheduledEmail) -> ClResult<EnqueueResult> {
		email::enqueue(&self.db, email).await
	}

	async fn list_emails(&self, opts: &ListEmailOptions) -> ClResult<Vec<ScheduledEmail>> {
		email::list(&self.db, opts).await
	}

	async fn count_emails(&self, opts: &ListEmailOptions) -> ClResult<u64> {
		email::count(&self.db, opts).await
	}

	async fn read_email(&self, id: i64) -> ClResult<ScheduledEmail> {
		email::read(&self.db, id).await
	}

	async fn claim_due_emails(&self, opts: &ClaimOptions) -> ClResult<Vec<ScheduledEmail>> {
		email::claim_due(&self.db, opts).await
	}

	async fn start_delivery(&self, id: i64, claim_token: &str, now: Timestamp) -> ClResult<bool> {
		email::start_delivery(&self.db, id, claim_token, now).await
	}

	async fn complete_delivery(
		&self,
		id: i64,
		claim_token: &str,
		outcome: &DeliveryOutcome,
	) -> ClResult<bool> {
		email::complete_delivery(&self.db, id, claim_token, outcome).await
	}

	async fn mark_email_sent(
		&self,
		id: i64,
		message_id: Option<&str>,
		sent_at: Timestamp,
	) -> ClResult<()> {
		email::mark_sent(&self.db, id, message_id, sent_at).await
	}

	async fn mark_email_failed(
		&self,
		id: i64,
		error: &str,
		next_attempt_at: Option<Timestamp>,
	) -> ClResult<()> {
		email::mark_failed(&self.db, id, error, next_attempt_at).await
	}

	async fn requeue_stale_emails(
		&self,
		older_than: Timestamp,
		retry_at: Timestamp,
	) -> ClResult<u64> {
		email::requeue_stale(&self.db, older_than, retry_at).await
	}

	async fn requeue_failed_emails(
		&self,
		batch_no: Option<&str>,
		scheduled_at: Timestamp,
	) -> ClResult<u64> {
		email::requeue_failed(&self.db, batch_no, scheduled_at).await
	}

	async fn update_email_recipient(&self, id: i64, recipient_email: &str) -> ClResult<()> {
		email::update_recipient(&self.db, id, recipient_email).await
	}

	async fn update_email_content(
		&self,
		id: i64,
		recipient_email: &str,
		subject: &str,
		body_html: &str,
	) -> ClResult<()> {
		email::update_content(&self.db, id, recipient_email, subject, body_html).await
	}

	// Settings
	//**********
	async fn list_settings(&self) -> ClResult<HashMap<String, serde_json::Value>> {
		setting::list(&self.db).await
	}

	async fn read_setting(&self, name: &str) -> ClResult<Option<serde_json::Value>> {
		setting::read(&self.db, name).await
	}

	async fn update_setting(&self, name: &str, value: Option<serde_json::Value>) -> ClResult<()> {
		setting::update(&self.db, name, value).await
	}
}

// vim: ts=4
