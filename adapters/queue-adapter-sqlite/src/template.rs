//! Email template storage

use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use coursemail::prelude::*;
use coursemail::queue_adapter::*;

use crate::utils::*;

const TEMPLATE_COLS: &str = "template_id, template_name, category, mode, batch_type, user_role,
	recipient_emails, offset_days, send_time, subject, body_html, active, created_at, updated_at";

fn template_from_row(row: &SqliteRow) -> Result<Template, sqlx::Error> {
	let category: &str = row.try_get("category")?;
	let mode: Option<&str> = row.try_get("mode")?;
	Ok(Template {
		template_id: row.try_get("template_id")?,
		template_name: row.try_get("template_name")?,
		category: parse_col(category)?,
		mode: mode.map(parse_col).transpose()?,
		batch_type: row.try_get("batch_type")?,
		user_role: row.try_get("user_role")?,
		recipient_emails: row.try_get("recipient_emails")?,
		offset_days: row.try_get("offset_days")?,
		send_time: row.try_get("send_time")?,
		subject: row.try_get("subject")?,
		body_html: row.try_get("body_html")?,
		active: row.try_get("active")?,
		created_at: row.try_get("created_at").map(Timestamp)?,
		updated_at: row.try_get("updated_at").map(Timestamp)?,
	})
}

pub(crate) async fn list(db: &SqlitePool, opts: &ListTemplateOptions) -> ClResult<Vec<Template>> {
	let mut query = sqlx::QueryBuilder::new(format!(
		"SELECT {} FROM email_templates WHERE 1=1",
		TEMPLATE_COLS
	));
	if let Some(category) = opts.category {
		query.push(" AND category=").push_bind(category.as_str());
	}
	if let Some(mode) = opts.mode {
		query.push(" AND mode=").push_bind(mode.as_str());
	}
	match &opts.batch_type {
		BatchTypeFilter::Any => {}
		BatchTypeFilter::Unset => {
			query.push(" AND batch_type IS NULL");
		}
		BatchTypeFilter::Is(batch_type) => {
			query.push(" AND batch_type=").push_bind(batch_type.as_str());
		}
	}
	if let Some(role) = &opts.user_role {
		query.push(" AND user_role=").push_bind(role.as_str());
	}
	if let Some(name) = &opts.template_name {
		query.push(" AND template_name=").push_bind(name.as_str());
	}
	if opts.active_only {
		query.push(" AND active");
	}
	query.push(" ORDER BY category, offset_days, template_id");

	let rows = query.build().fetch_all(db).await.inspect_err(inspect).map_err(|_| Error::DbError)?;

	collect_res(rows.iter().map(template_from_row))
}

pub(crate) async fn read(db: &SqlitePool, template_id: i64) -> ClResult<Template> {
	let res = sqlx::query(&format!(
		"SELECT {} FROM email_templates WHERE template_id=?",
		TEMPLATE_COLS
	))
	.bind(template_id)
	.fetch_one(db)
	.await;

	map_res(res, |row| template_from_row(&row))
}

pub(crate) async fn create(db: &SqlitePool, tpl: &CreateTemplate) -> ClResult<i64> {
	let res = sqlx::query(
		"INSERT INTO email_templates (template_name, category, mode, batch_type, user_role,
			recipient_emails, offset_days, send_time, subject, body_html, active)
		VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING template_id",
	)
	.bind(&tpl.template_name)
	.bind(tpl.category.as_str())
	.bind(tpl.mode.map(DeliveryMode::as_str))
	.bind(&tpl.batch_type)
	.bind(&tpl.user_role)
	.bind(&tpl.recipient_emails)
	.bind(tpl.offset_days)
	.bind(tpl.send_time.as_deref().unwrap_or("09:00"))
	.bind(&tpl.subject)
	.bind(&tpl.body_html)
	.bind(tpl.active)
	.fetch_one(db)
	.await
	.map_err(db_err)?;

	Ok(res.get(0))
}

pub(crate) async fn update(
	db: &SqlitePool,
	template_id: i64,
	patch: &UpdateTemplate,
) -> ClResult<()> {
	let mut query = sqlx::QueryBuilder::new("UPDATE email_templates SET ");
	let mut has_updates = false;

	has_updates = push_patch!(query, has_updates, "template_name", &patch.template_name);
	has_updates = push_patch!(query, has_updates, "mode", &patch.mode, |v| v.as_str());
	has_updates = push_patch!(query, has_updates, "batch_type", &patch.batch_type);
	has_updates = push_patch!(query, has_updates, "user_role", &patch.user_role);
	has_updates = push_patch!(query, has_updates, "recipient_emails", &patch.recipient_emails);
	has_updates = push_patch!(query, has_updates, "offset_days", &patch.offset_days);
	has_updates = push_patch!(query, has_updates, "send_time", &patch.send_time);
	has_updates = push_patch!(query, has_updates, "subject", &patch.subject);
	has_updates = push_patch!(query, has_updates, "body_html", &patch.body_html);
	has_updates = push_patch!(query, has_updates, "active", &patch.active);

	if !has_updates {
		return Ok(());
	}

	query.push(", updated_at=unixepoch() WHERE template_id=").push_bind(template_id);

	let res = query.build().execute(db).await.map_err(db_err)?;
	if res.rows_affected() == 0 {
		return Err(Error::NotFound);
	}

	Ok(())
}

pub(crate) async fn delete(db: &SqlitePool, template_id: i64) -> ClResult<()> {
	let res = sqlx::query("DELETE FROM email_templates WHERE template_id=?")
		.bind(template_id)
		.execute(db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;
	if res.rows_affected() == 0 {
		return Err(Error::NotFound);
	}

	Ok(())
}

// vim: ts=4
