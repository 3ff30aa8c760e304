//! Error mapping and query helpers shared by the table modules

use coursemail::prelude::*;
use sqlx::sqlite::SqliteRow;

/// Appends `field=value` (or `field=NULL`) to an UPDATE for a defined patch.
/// Evaluates to whether anything has been appended so far.
macro_rules! push_patch {
	($query:expr, $has_updates:expr, $field:literal, $patch:expr) => {
		push_patch!($query, $has_updates, $field, $patch, |v| v)
	};
	($query:expr, $has_updates:expr, $field:literal, $patch:expr, |$v:ident| $convert:expr) => {{
		match $patch {
			Patch::Undefined => $has_updates,
			patch => {
				if $has_updates {
					$query.push(", ");
				}
				$query.push(concat!($field, "="));
				match patch {
					Patch::Value($v) => {
						$query.push_bind($convert);
					}
					_ => {
						$query.push("NULL");
					}
				}
				true
			}
		}
	}};
}

pub(crate) use push_patch;

/// Log database error for debugging
pub(crate) fn inspect(err: &sqlx::Error) {
	warn!("DB: {:#?}", err);
}

/// Translate a statement error, keeping unique violations distinguishable
pub(crate) fn db_err(err: sqlx::Error) -> Error {
	match err {
		sqlx::Error::RowNotFound => Error::NotFound,
		sqlx::Error::Database(ref db) if db.is_unique_violation() => {
			debug!("DB: unique violation: {}", db.message());
			Error::Conflict("duplicate entry".into())
		}
		err => {
			inspect(&err);
			Error::DbError
		}
	}
}

/// Map a single-row query result, translating SQL errors to ClResult
pub(crate) fn map_res<T, F>(row: Result<SqliteRow, sqlx::Error>, f: F) -> ClResult<T>
where
	F: FnOnce(SqliteRow) -> Result<T, sqlx::Error>,
{
	match row {
		Ok(row) => f(row).inspect_err(inspect).map_err(|_| Error::DbError),
		Err(sqlx::Error::RowNotFound) => Err(Error::NotFound),
		Err(err) => {
			inspect(&err);
			Err(Error::DbError)
		}
	}
}

/// Collect an iterator of query results, translating errors
pub(crate) fn collect_res<T>(
	iter: impl Iterator<Item = Result<T, sqlx::Error>> + Unpin,
) -> ClResult<Vec<T>> {
	let mut items = Vec::new();
	for item in iter {
		items.push(item.inspect_err(inspect).map_err(|_| Error::DbError)?);
	}
	Ok(items)
}

/// Parse a stored enum column, surfacing bad values as decode errors
pub(crate) fn parse_col<T>(value: &str) -> Result<T, sqlx::Error>
where
	T: std::str::FromStr<Err = Error>,
{
	value.parse::<T>().map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

// vim: ts=4
