//! Stored setting values, one JSON document per key

use std::collections::HashMap;

use sqlx::SqlitePool;

use coursemail::prelude::*;

use crate::utils::inspect;

fn decode(raw: Option<String>) -> Option<serde_json::Value> {
	raw.and_then(|v| serde_json::from_str(&v).inspect_err(|e| warn!("Bad stored setting: {}", e)).ok())
}

pub(crate) async fn list(db: &SqlitePool) -> ClResult<HashMap<String, serde_json::Value>> {
	let rows: Vec<(String, Option<String>)> = sqlx::query_as("SELECT name, value FROM settings")
		.fetch_all(db)
		.await
		.inspect_err(inspect)
		.or(Err(Error::DbError))?;

	Ok(rows
		.into_iter()
		.map(|(name, raw)| (name, decode(raw).unwrap_or(serde_json::Value::Null)))
		.collect())
}

pub(crate) async fn read(db: &SqlitePool, name: &str) -> ClResult<Option<serde_json::Value>> {
	let raw: Option<Option<String>> = sqlx::query_scalar("SELECT value FROM settings WHERE name=?")
		.bind(name)
		.fetch_optional(db)
		.await
		.inspect_err(inspect)
		.or(Err(Error::DbError))?;

	Ok(raw.and_then(decode))
}

/// `None` removes the stored value
pub(crate) async fn update(
	db: &SqlitePool,
	name: &str,
	value: Option<serde_json::Value>,
) -> ClResult<()> {
	let query = match value {
		Some(val) => sqlx::query(
			"INSERT INTO settings (name, value) VALUES (?1, ?2)
			ON CONFLICT(name) DO UPDATE SET value=excluded.value",
		)
		.bind(name)
		.bind(val.to_string()),
		None => sqlx::query("DELETE FROM settings WHERE name=?").bind(name),
	};
	query.execute(db).await.inspect_err(inspect).or(Err(Error::DbError))?;
	Ok(())
}

// vim: ts=4
