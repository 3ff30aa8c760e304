//! Batch reference data: course planner, learners, and batch forms

use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use coursemail::prelude::*;
use coursemail::queue_adapter::*;

use crate::utils::*;

fn topic_from_row(row: &SqliteRow) -> Result<PlannerTopic, sqlx::Error> {
	Ok(PlannerTopic {
		batch_no: row.try_get("batch_no")?,
		date: row.try_get("date")?,
		topic_name: row.try_get("topic_name")?,
		trainer_name: row.try_get("trainer_name")?,
		trainer_email: row.try_get("trainer_email")?,
		mode: row.try_get("mode")?,
	})
}

pub(crate) async fn read_start_date(db: &SqlitePool, batch_no: &str) -> ClResult<Option<Box<str>>> {
	let row = sqlx::query("SELECT MIN(date) AS start_date FROM course_planner WHERE batch_no=?")
		.bind(batch_no)
		.fetch_one(db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;

	row.try_get("start_date").inspect_err(inspect).map_err(|_| Error::DbError)
}

pub(crate) async fn list_topics(
	db: &SqlitePool,
	opts: &ListTopicOptions,
) -> ClResult<Vec<PlannerTopic>> {
	let mut query = sqlx::QueryBuilder::new(
		"SELECT batch_no, date, topic_name, trainer_name, trainer_email, mode
		FROM course_planner WHERE 1=1",
	);
	if let Some(batch_no) = &opts.batch_no {
		query.push(" AND batch_no=").push_bind(batch_no.as_str());
	}
	if let Some(pattern) = &opts.topic_like {
		query.push(" AND topic_name LIKE ").push_bind(pattern.as_str());
	}
	if let Some(from) = &opts.date_from {
		query.push(" AND date>=").push_bind(from.as_str());
	}
	if let Some(to) = &opts.date_to {
		query.push(" AND date<=").push_bind(to.as_str());
	}
	query.push(" ORDER BY date, batch_no, topic_id");

	let rows = query.build().fetch_all(db).await.inspect_err(inspect).map_err(|_| Error::DbError)?;

	collect_res(rows.iter().map(topic_from_row))
}

pub(crate) async fn list_trainer_emails(db: &SqlitePool, batch_no: &str) -> ClResult<Vec<Box<str>>> {
	let rows = sqlx::query(
		"SELECT DISTINCT trim(trainer_email) AS trainer_email FROM course_planner
		WHERE batch_no=? AND trainer_email IS NOT NULL AND trim(trainer_email)<>''
		ORDER BY 1",
	)
	.bind(batch_no)
	.fetch_all(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;

	collect_res(rows.iter().map(|row| row.try_get("trainer_email")))
}

pub(crate) async fn list_learners(db: &SqlitePool, batch_no: &str) -> ClResult<Vec<Learner>> {
	let rows = sqlx::query(
		"SELECT batch_no, name, email, status FROM learners
		WHERE batch_no=? AND (status IS NULL OR lower(status) NOT IN ('inactive', 'dropped'))
		ORDER BY learner_id",
	)
	.bind(batch_no)
	.fetch_all(db)
	.await
	.inspect_err(inspect)
	.map_err(|_| Error::DbError)?;

	collect_res(rows.iter().map(|row| {
		Ok(Learner {
			batch_no: row.try_get("batch_no")?,
			name: row.try_get("name")?,
			email: row.try_get("email")?,
			status: row.try_get("status")?,
		})
	}))
}

pub(crate) async fn read_form_url(db: &SqlitePool, batch_no: &str) -> ClResult<Option<Box<str>>> {
	let row = sqlx::query("SELECT form_url FROM batch_forms WHERE batch_no=?")
		.bind(batch_no)
		.fetch_optional(db)
		.await
		.inspect_err(inspect)
		.map_err(|_| Error::DbError)?;

	match row {
		Some(row) => row.try_get("form_url").inspect_err(inspect).map_err(|_| Error::DbError),
		None => Ok(None),
	}
}

pub(crate) async fn add_topic(db: &SqlitePool, topic: &PlannerTopic) -> ClResult<()> {
	sqlx::query(
		"INSERT INTO course_planner (batch_no, date, topic_name, trainer_name, trainer_email, mode)
		VALUES (?, ?, ?, ?, ?, ?)",
	)
	.bind(&*topic.batch_no)
	.bind(&*topic.date)
	.bind(&*topic.topic_name)
	.bind(topic.trainer_name.as_deref())
	.bind(topic.trainer_email.as_deref())
	.bind(topic.mode.as_deref())
	.execute(db)
	.await
	.map_err(db_err)?;

	Ok(())
}

pub(crate) async fn add_learner(db: &SqlitePool, learner: &Learner) -> ClResult<()> {
	sqlx::query("INSERT INTO learners (batch_no, name, email, status) VALUES (?, ?, ?, ?)")
		.bind(&*learner.batch_no)
		.bind(learner.name.as_deref())
		.bind(&*learner.email)
		.bind(learner.status.as_deref())
		.execute(db)
		.await
		.map_err(db_err)?;

	Ok(())
}

pub(crate) async fn set_form_url(db: &SqlitePool, batch_no: &str, form_url: &str) -> ClResult<()> {
	sqlx::query("INSERT OR REPLACE INTO batch_forms (batch_no, form_url) VALUES (?, ?)")
		.bind(batch_no)
		.bind(form_url)
		.execute(db)
		.await
		.map_err(db_err)?;

	Ok(())
}

pub(crate) async fn update_learner_email(
	db: &SqlitePool,
	batch_no: &str,
	old_email: &str,
	new_email: &str,
) -> ClResult<u64> {
	let res = sqlx::query("UPDATE learners SET email=? WHERE batch_no=? AND email=?")
		.bind(new_email)
		.bind(batch_no)
		.bind(old_email)
		.execute(db)
		.await
		.map_err(db_err)?;

	Ok(res.rows_affected())
}

// vim: ts=4
