//! Common types used throughout the pipeline.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_with::skip_serializing_none;
use std::time::SystemTime;

// Timestamp //
//***********//
/// Unix timestamp in seconds
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub i64);

impl Timestamp {
	pub fn now() -> Timestamp {
		let res = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default();
		Timestamp(i64::try_from(res.as_secs()).unwrap_or(i64::MAX))
	}

	pub fn from_now(seconds: i64) -> Timestamp {
		Self::now().add_seconds(seconds)
	}

	pub fn add_seconds(self, seconds: i64) -> Timestamp {
		Timestamp(self.0.saturating_add(seconds))
	}

	pub fn to_datetime(self) -> Option<DateTime<Utc>> {
		DateTime::<Utc>::from_timestamp(self.0, 0)
	}

	/// ISO-8601 in UTC with millisecond precision, e.g. `2025-01-06T03:30:00.000Z`
	pub fn to_iso_string(self) -> String {
		self.to_datetime()
			.map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
			.unwrap_or_default()
	}
}

impl From<DateTime<Utc>> for Timestamp {
	fn from(dt: DateTime<Utc>) -> Self {
		Timestamp(dt.timestamp())
	}
}

impl std::fmt::Display for Timestamp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl Serialize for Timestamp {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		serializer.serialize_i64(self.0)
	}
}

impl<'de> Deserialize<'de> for Timestamp {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		Ok(Timestamp(i64::deserialize(deserializer)?))
	}
}

// Patch //
//*******//
/// Three-state update field: absent (keep), null (clear), or a new value
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Patch<T> {
	#[default]
	Undefined,
	Null,
	Value(T),
}

impl<T> Patch<T> {
	pub fn is_undefined(&self) -> bool {
		matches!(self, Patch::Undefined)
	}

	pub fn as_ref(&self) -> Patch<&T> {
		match self {
			Patch::Undefined => Patch::Undefined,
			Patch::Null => Patch::Null,
			Patch::Value(v) => Patch::Value(v),
		}
	}
}

impl<'de, T> Deserialize<'de> for Patch<T>
where
	T: Deserialize<'de>,
{
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		// Absent fields never reach this point, they use the Default impl
		Ok(match Option::<T>::deserialize(deserializer)? {
			Some(v) => Patch::Value(v),
			None => Patch::Null,
		})
	}
}

// API responses //
//***************//
#[skip_serializing_none]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
	pub offset: usize,
	pub limit: usize,
	pub total: usize,
}

/// Success envelope for every JSON endpoint
#[skip_serializing_none]
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
	pub data: T,
	pub pagination: Option<Pagination>,
	pub time: Timestamp,
}

impl<T> ApiResponse<T> {
	pub fn new(data: T) -> Self {
		Self { data, pagination: None, time: Timestamp::now() }
	}

	pub fn with_pagination(data: T, offset: usize, limit: usize, total: usize) -> Self {
		Self { data, pagination: Some(Pagination { offset, limit, total }), time: Timestamp::now() }
	}
}

#[derive(Debug, Serialize)]
pub struct ErrorDetails {
	pub code: String,
	pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
	pub error: ErrorDetails,
}

impl ErrorResponse {
	pub fn new(code: String, message: String) -> Self {
		Self { error: ErrorDetails { code, message } }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[derive(Debug, Deserialize)]
	struct Update {
		#[serde(default)]
		subject: Patch<String>,
		#[serde(default)]
		mode: Patch<String>,
		#[serde(default)]
		offset_days: Patch<i64>,
	}

	#[test]
	fn test_patch_three_states() {
		let upd: Update =
			serde_json::from_str(r#"{"subject": "Welcome", "mode": null}"#).unwrap();
		assert_eq!(upd.subject, Patch::Value("Welcome".to_string()));
		assert_eq!(upd.mode, Patch::Null);
		assert!(upd.offset_days.is_undefined());
	}

	#[test]
	fn test_timestamp_iso() {
		assert_eq!(Timestamp(1_736_134_200).to_iso_string(), "2025-01-06T03:30:00.000Z");
	}

	#[test]
	fn test_timestamp_serializes_as_seconds() {
		let json = serde_json::to_string(&ApiResponse { data: 1, pagination: None, time: Timestamp(5) })
			.unwrap();
		assert_eq!(json, r#"{"data":1,"time":5}"#);
	}
}

// vim: ts=4
