//! Database schema initialization
//!
//! Creates tables and indexes so the database schema is up to date.

use sqlx::SqlitePool;

/// Initialize the database schema with all required tables and indexes
pub(crate) async fn init_db(db: &SqlitePool) -> Result<(), sqlx::Error> {
	let mut tx = db.begin().await?;

	// Settings
	//**********
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS settings (
		name text NOT NULL,
		value text,
		PRIMARY KEY(name)
	)",
	)
	.execute(&mut *tx)
	.await?;

	// Templates
	//***********
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS email_templates (
		template_id integer NOT NULL,
		template_name text NOT NULL,
		category text NOT NULL,
		mode text,
		batch_type text,
		user_role text,
		recipient_emails text,
		offset_days integer NOT NULL DEFAULT 0,
		send_time text NOT NULL DEFAULT '09:00',
		subject text NOT NULL,
		body_html text NOT NULL,
		active boolean NOT NULL DEFAULT 1,
		created_at datetime DEFAULT (unixepoch()),
		updated_at datetime DEFAULT (unixepoch()),
		PRIMARY KEY(template_id)
	)",
	)
	.execute(&mut *tx)
	.await?;
	sqlx::query(
		"CREATE INDEX IF NOT EXISTS idx_email_templates_category
		ON email_templates(category, active, offset_days)",
	)
	.execute(&mut *tx)
	.await?;

	// Reference data
	//****************
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS course_planner (
		topic_id integer NOT NULL,
		batch_no text NOT NULL,
		date text NOT NULL,
		topic_name text NOT NULL,
		trainer_name text,
		trainer_email text,
		mode text,
		PRIMARY KEY(topic_id)
	)",
	)
	.execute(&mut *tx)
	.await?;
	sqlx::query(
		"CREATE INDEX IF NOT EXISTS idx_course_planner_batch ON course_planner(batch_no, date)",
	)
	.execute(&mut *tx)
	.await?;
	sqlx::query("CREATE INDEX IF NOT EXISTS idx_course_planner_date ON course_planner(date)")
		.execute(&mut *tx)
		.await?;

	sqlx::query(
		"CREATE TABLE IF NOT EXISTS learners (
		learner_id integer NOT NULL,
		batch_no text NOT NULL,
		name text,
		email text NOT NULL,
		status text,
		PRIMARY KEY(learner_id)
	)",
	)
	.execute(&mut *tx)
	.await?;
	sqlx::query("CREATE INDEX IF NOT EXISTS idx_learners_batch ON learners(batch_no)")
		.execute(&mut *tx)
		.await?;

	sqlx::query(
		"CREATE TABLE IF NOT EXISTS batch_forms (
		batch_no text NOT NULL,
		form_url text NOT NULL,
		PRIMARY KEY(batch_no)
	)",
	)
	.execute(&mut *tx)
	.await?;

	// Queue
	//*******
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS scheduled_emails (
		id integer NOT NULL,
		batch_no text NOT NULL,
		recipient_email text NOT NULL,
		recipient_name text,
		template_id integer,
		template_name text NOT NULL,
		category text NOT NULL,
		user_role text,
		subject text NOT NULL,
		body_html text NOT NULL,
		attachment_name text,
		attachment_data text,
		scheduled_at integer NOT NULL,
		status text NOT NULL DEFAULT 'scheduled',
		retry_count integer NOT NULL DEFAULT 0,
		next_attempt_at integer,
		last_attempt_at integer,
		error text,
		message_id text,
		sent_at integer,
		claim_token text,
		sending_at integer,
		created_at datetime DEFAULT (unixepoch()),
		updated_at datetime DEFAULT (unixepoch()),
		PRIMARY KEY(id)
	)",
	)
	.execute(&mut *tx)
	.await?;
	// One row per (recipient, batch, template, send time)
	sqlx::query(
		"CREATE UNIQUE INDEX IF NOT EXISTS idx_scheduled_emails_dedup
		ON scheduled_emails(recipient_email, batch_no, template_name, scheduled_at)",
	)
	.execute(&mut *tx)
	.await?;
	sqlx::query(
		"CREATE INDEX IF NOT EXISTS idx_scheduled_emails_due
		ON scheduled_emails(status, scheduled_at)",
	)
	.execute(&mut *tx)
	.await?;
	sqlx::query(
		"CREATE INDEX IF NOT EXISTS idx_scheduled_emails_batch ON scheduled_emails(batch_no)",
	)
	.execute(&mut *tx)
	.await?;

	// Claim ownership columns for queues created before they existed
	let _ = sqlx::query("ALTER TABLE scheduled_emails ADD COLUMN claim_token text")
		.execute(&mut *tx)
		.await;
	let _ = sqlx::query("ALTER TABLE scheduled_emails ADD COLUMN sending_at integer")
		.execute(&mut *tx)
		.await;

	tx.commit().await?;

	Ok(())
}

// vim: ts=4
