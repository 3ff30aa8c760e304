//! Outgoing mail queue (`scheduled_emails`)
//!
//! Inserts are idempotent through the dedup index, and claims are a single
//! `UPDATE ... RETURNING` statement so two dispatchers never get the same row.
//! Each claim stamps a random `claim_token`; sending and recording a result
//! only succeed while the row still carries the token of the pass doing it.

use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use coursemail::prelude::*;
use coursemail::queue_adapter::*;

use crate::utils::*;

const EMAIL_COLS: &str = "id, batch_no, recipient_email, recipient_name, template_id, template_name,
	category, user_role, subject, body_html, attachment_name, attachment_data, scheduled_at, status,
	retry_count, next_attempt_at, last_attempt_at, error, message_id, sent_at, claim_token, created_at,
	updated_at";

const DEFAULT_LIST_LIMIT: u32 = 500;

fn email_from_row(row: &SqliteRow) -> Result<ScheduledEmail, sqlx::Error> {
	let category: &str = row.try_get("category")?;
	let status: &str = row.try_get("status")?;
	let retry_count: i64 = row.try_get("retry_count")?;
	Ok(ScheduledEmail {
		id: row.try_get("id")?,
		batch_no: row.try_get("batch_no")?,
		recipient_email: row.try_get("recipient_email")?,
		recipient_name: row.try_get("recipient_name")?,
		template_id: row.try_get("template_id")?,
		template_name: row.try_get("template_name")?,
		category: parse_col(category)?,
		user_role: row.try_get("user_role")?,
		subject: row.try_get("subject")?,
		body_html: row.try_get("body_html")?,
		attachment_name: row.try_get("attachment_name")?,
		attachment_data: row.try_get("attachment_data")?,
		scheduled_at: row.try_get("scheduled_at").map(Timestamp)?,
		status: parse_col(status)?,
		retry_count: u16::try_from(retry_count).unwrap_or(u16::MAX),
		next_attempt_at: row.try_get::<Option<i64>, _>("next_attempt_at")?.map(Timestamp),
		last_attempt_at: row.try_get::<Option<i64>, _>("last_attempt_at")?.map(Timestamp),
		error: row.try_get("error")?,
		message_id: row.try_get("message_id")?,
		sent_at: row.try_get::<Option<i64>, _>("sent_at")?.map(Timestamp),
		claim_token: row.try_get("claim_token")?,
		created_at: row.try_get("created_at").map(Timestamp)?,
		updated_at: row.try_get("updated_at").map(Timestamp)?,
	})
}

pub(crate) async fn enqueue(db: &SqlitePool, email: &NewScheduledEmail) -> ClResult<EnqueueResult> {
	let res = sqlx::query(
		"INSERT INTO scheduled_emails (batch_no, recipient_email, recipient_name, template_id,
			template_name, category, user_role, subject, body_html, attachment_name,
			attachment_data, scheduled_at, status)
		VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'scheduled')
		ON CONFLICT DO NOTHING RETURNING id",
	)
	.bind(&*email.batch_no)
	.bind(&*email.recipient_email)
	.bind(email.recipient_name.as_deref())
	.bind(email.template_id)
	.bind(&*email.template_name)
	.bind(email.category.as_str())
	.bind(email.user_role.as_deref())
	.bind(&*email.subject)
	.bind(&*email.body_html)
	.bind(email.attachment_name.as_deref())
	.bind(email.attachment_data.as_deref())
	.bind(email.scheduled_at.0)
	.fetch_optional(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;

	match res {
		Some(row) => Ok(EnqueueResult::Inserted(row.get(0))),
		None => Ok(EnqueueResult::Duplicate),
	}
}

fn push_filters<'a>(query: &mut sqlx::QueryBuilder<'a, sqlx::Sqlite>, opts: &'a ListEmailOptions) {
	if let Some(batch_no) = &opts.batch_no {
		query.push(" AND batch_no=").push_bind(batch_no.as_str());
	}
	if let Some(recipient) = &opts.recipient {
		// LIKE is case-insensitive for ASCII in SQLite
		query.push(" AND recipient_email LIKE '%' || ").push_bind(recipient.as_str()).push(" || '%'");
	}
	if let Some(status) = opts.status {
		query.push(" AND status=").push_bind(status.as_str());
	}
}

pub(crate) async fn list(db: &SqlitePool, opts: &ListEmailOptions) -> ClResult<Vec<ScheduledEmail>> {
	let mut query =
		sqlx::QueryBuilder::new(format!("SELECT {} FROM scheduled_emails WHERE 1=1", EMAIL_COLS));
	push_filters(&mut query, opts);
	query
		.push(" ORDER BY scheduled_at DESC, id DESC LIMIT ")
		.push_bind(i64::from(opts.limit.unwrap_or(DEFAULT_LIST_LIMIT)))
		.push(" OFFSET ")
		.push_bind(i64::from(opts.offset.unwrap_or(0)));

	let rows = query.build().fetch_all(db).await.inspect_err(inspect).map_err(|_| Error::DbError)?;

	collect_res(rows.iter().map(email_from_row))
}

/// Rows matching the filters of `opts`, ignoring limit and offset
pub(crate) async fn count(db: &SqlitePool, opts: &ListEmailOptions) -> ClResult<u64> {
	let mut query = sqlx::QueryBuilder::new("SELECT count(*) FROM scheduled_emails WHERE 1=1");
	push_filters(&mut query, opts);

	let total: i64 = query
		.build_query_scalar()
		.fetch_one(db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;

	Ok(u64::try_from(total).unwrap_or_default())
}

pub(crate) async fn read(db: &SqlitePool, id: i64) -> ClResult<ScheduledEmail> {
	let res = sqlx::query(&format!("SELECT {} FROM scheduled_emails WHERE id=?", EMAIL_COLS))
		.bind(id)
		.fetch_one(db)
		.await;

	map_res(res, |row| email_from_row(&row))
}

/// Claim due rows: scheduled or retryable failed rows whose time has come
pub(crate) async fn claim_due(db: &SqlitePool, opts: &ClaimOptions) -> ClResult<Vec<ScheduledEmail>> {
	let rows = sqlx::query(&format!(
		"UPDATE scheduled_emails
		SET status='processing', retry_count=retry_count+1, last_attempt_at=?1, updated_at=?1,
			claim_token=lower(hex(randomblob(12))), sending_at=NULL
		WHERE id IN (
			SELECT id FROM scheduled_emails
			WHERE status IN ('scheduled', 'failed')
				AND scheduled_at<=?1
				AND (next_attempt_at IS NULL OR next_attempt_at<=?1)
				AND retry_count<?2
			ORDER BY scheduled_at, id
			LIMIT ?3
		)
		RETURNING {}",
		EMAIL_COLS
	))
	.bind(opts.now.0)
	.bind(i64::from(opts.max_attempts))
	.bind(i64::from(opts.limit))
	.fetch_all(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;

	let mut emails = collect_res(rows.iter().map(email_from_row))?;
	// RETURNING does not preserve the subquery order
	emails.sort_by_key(|e| (e.scheduled_at, e.id));

	Ok(emails)
}

pub(crate) async fn mark_sent(
	db: &SqlitePool,
	id: i64,
	message_id: Option<&str>,
	sent_at: Timestamp,
) -> ClResult<()> {
	let res = sqlx::query(
		"UPDATE scheduled_emails
		SET status='sent', sent_at=?1, message_id=?2, error=NULL, next_attempt_at=NULL,
			claim_token=NULL, sending_at=NULL, updated_at=?1
		WHERE id=?3",
	)
	.bind(sent_at.0)
	.bind(message_id)
	.bind(id)
	.execute(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;
	if res.rows_affected() == 0 {
		return Err(Error::NotFound);
	}

	Ok(())
}

pub(crate) async fn mark_failed(
	db: &SqlitePool,
	id: i64,
	error: &str,
	next_attempt_at: Option<Timestamp>,
) -> ClResult<()> {
	let res = sqlx::query(
		"UPDATE scheduled_emails
		SET status='failed', error=?, next_attempt_at=?, claim_token=NULL, sending_at=NULL,
			updated_at=unixepoch()
		WHERE id=?",
	)
	.bind(error)
	.bind(next_attempt_at.map(|ts| ts.0))
	.bind(id)
	.execute(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;
	if res.rows_affected() == 0 {
		return Err(Error::NotFound);
	}

	Ok(())
}

pub(crate) async fn start_delivery(
	db: &SqlitePool,
	id: i64,
	claim_token: &str,
	now: Timestamp,
) -> ClResult<bool> {
	let res = sqlx::query(
		"UPDATE scheduled_emails
		SET sending_at=?1, last_attempt_at=?1, updated_at=?1
		WHERE id=?2 AND claim_token=?3 AND status='processing' AND sending_at IS NULL",
	)
	.bind(now.0)
	.bind(id)
	.bind(claim_token)
	.execute(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;

	Ok(res.rows_affected() == 1)
}

/// A row recovered as interrupted keeps its token until it is claimed again,
/// so a late result from the interrupted pass is still recorded
pub(crate) async fn complete_delivery(
	db: &SqlitePool,
	id: i64,
	claim_token: &str,
	outcome: &DeliveryOutcome,
) -> ClResult<bool> {
	let query = match outcome {
		DeliveryOutcome::Sent { message_id, sent_at } => sqlx::query(
			"UPDATE scheduled_emails
			SET status='sent', sent_at=?1, message_id=?2, error=NULL, next_attempt_at=NULL,
				claim_token=NULL, sending_at=NULL, updated_at=?1
			WHERE id=?3 AND claim_token=?4 AND status IN ('processing', 'failed')",
		)
		.bind(sent_at.0)
		.bind(message_id.as_deref()),
		DeliveryOutcome::Failed { error, next_attempt_at } => sqlx::query(
			"UPDATE scheduled_emails
			SET status='failed', error=?1, next_attempt_at=?2, claim_token=NULL, sending_at=NULL,
				updated_at=unixepoch()
			WHERE id=?3 AND claim_token=?4 AND status IN ('processing', 'failed')",
		)
		.bind(error.as_str())
		.bind(next_attempt_at.map(|ts| ts.0)),
	};
	let res = query
		.bind(id)
		.bind(claim_token)
		.execute(db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;

	Ok(res.rows_affected() == 1)
}

/// Unstarted rows give their attempt back and drop the claim. Interrupted rows
/// keep it, see `complete_delivery`.
pub(crate) async fn requeue_stale(
	db: &SqlitePool,
	older_than: Timestamp,
	retry_at: Timestamp,
) -> ClResult<u64> {
	let res = sqlx::query(
		"UPDATE scheduled_emails
		SET status=CASE WHEN sending_at IS NULL THEN 'scheduled' ELSE 'failed' END,
			retry_count=CASE WHEN sending_at IS NULL THEN max(retry_count-1, 0) ELSE retry_count END,
			error=CASE WHEN sending_at IS NULL THEN error ELSE 'delivery attempt interrupted' END,
			next_attempt_at=CASE WHEN sending_at IS NULL THEN next_attempt_at ELSE ?2 END,
			claim_token=CASE WHEN sending_at IS NULL THEN NULL ELSE claim_token END,
			sending_at=NULL,
			updated_at=unixepoch()
		WHERE status='processing' AND (last_attempt_at IS NULL OR last_attempt_at<?1)",
	)
	.bind(older_than.0)
	.bind(retry_at.0)
	.execute(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;

	Ok(res.rows_affected())
}

/// The dedup key includes scheduled_at, so it is kept and the retry is timed
/// through next_attempt_at instead
pub(crate) async fn requeue_failed(
	db: &SqlitePool,
	batch_no: Option<&str>,
	scheduled_at: Timestamp,
) -> ClResult<u64> {
	let mut query = sqlx::QueryBuilder::new(
		"UPDATE scheduled_emails
		SET status='scheduled', retry_count=0, error=NULL, claim_token=NULL, sending_at=NULL,
			updated_at=unixepoch(), next_attempt_at=",
	);
	query.push_bind(scheduled_at.0).push(" WHERE status='failed'");
	if let Some(batch_no) = batch_no {
		query.push(" AND batch_no=").push_bind(batch_no);
	}

	let res = query.build().execute(db).await.inspect_err(inspect).map_err(|_| Error::DbError)?;

	Ok(res.rows_affected())
}

pub(crate) async fn update_recipient(db: &SqlitePool, id: i64, recipient_email: &str) -> ClResult<()> {
	let res = sqlx::query(
		"UPDATE scheduled_emails SET recipient_email=?, updated_at=unixepoch() WHERE id=?",
	)
	.bind(recipient_email)
	.bind(id)
	.execute(db)
	.await
	.map_err(db_err)?;
	if res.rows_affected() == 0 {
		return Err(Error::NotFound);
	}

	Ok(())
}

pub(crate) async fn update_content(
	db: &SqlitePool,
	id: i64,
	recipient_email: &str,
	subject: &str,
	body_html: &str,
) -> ClResult<()> {
	let res = sqlx::query(
		"UPDATE scheduled_emails
		SET recipient_email=?, subject=?, body_html=?, updated_at=unixepoch()
		WHERE id=?",
	)
	.bind(recipient_email)
	.bind(subject)
	.bind(body_html)
	.bind(id)
	.execute(db)
	.await
	.map_err(db_err)?;
	if res.rows_affected() == 0 {
		return Err(Error::NotFound);
	}

	Ok(())
}

// vim: ts=4
