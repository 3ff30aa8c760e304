//! Send-time computation
//!
//! Batch dates and template times are wall-clock values in India Standard
//! Time. Queue rows store the resulting instant as a UTC timestamp.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Offset, TimeDelta, Timelike, Utc};

use crate::prelude::*;

/// Asia/Kolkata has no DST, so a fixed offset is exact
pub const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

pub const DEFAULT_SEND_TIME: &str = "09:00";

pub fn ist() -> FixedOffset {
	FixedOffset::east_opt(IST_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Accepts `YYYY-MM-DD` or an RFC 3339 datetime (its IST calendar date)
pub fn parse_reference_date(s: &str) -> Option<NaiveDate> {
	let s = s.trim();
	if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
		return Some(date);
	}
	DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&ist()).date_naive())
}

/// Non-numeric offsets count as zero
pub fn parse_offset_days(s: &str) -> i64 {
	s.trim().parse().unwrap_or_else(|_| {
		warn!("Invalid offset_days '{}', using 0", s);
		0
	})
}

/// `HH:MM` or `HH:MM:SS`; anything else falls back to 09:00
pub fn parse_send_time(s: Option<&str>) -> NaiveTime {
	let fallback = NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN);
	let Some(raw) = s.map(str::trim).filter(|s| !s.is_empty()) else {
		return fallback;
	};
	NaiveTime::parse_from_str(raw, "%H:%M")
		.or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
		.map(|t| t.with_second(0).unwrap_or(t))
		.unwrap_or_else(|_| {
			warn!("Invalid send_time '{}', using {}", raw, DEFAULT_SEND_TIME);
			fallback
		})
}

/// Instant of `reference + offset_days` at `send_time` IST
pub fn compute_send_at(reference: NaiveDate, offset_days: i64, send_time: NaiveTime) -> Option<Timestamp> {
	let date = reference.checked_add_signed(TimeDelta::try_days(offset_days)?)?;
	let local = date.and_time(send_time).and_local_timezone(ist()).single()?;
	Some(Timestamp::from(local.with_timezone(&Utc)))
}

/// Lenient variant used by the schedulers: raw inputs, logged skips
pub fn compute_scheduled_at(
	reference: Option<&str>,
	offset_days: i64,
	send_time: Option<&str>,
) -> Option<Timestamp> {
	let Some(raw) = reference.map(str::trim).filter(|s| !s.is_empty()) else {
		warn!("No reference date, skipping send time computation");
		return None;
	};
	let Some(date) = parse_reference_date(raw) else {
		warn!("Unparseable reference date '{}', skipping", raw);
		return None;
	};
	let at = compute_send_at(date, offset_days, parse_send_time(send_time));
	if at.is_none() {
		warn!("Send time out of range for {} + {} days", date, offset_days);
	}
	at
}

/// Calendar date in IST at the given instant
pub fn date_ist(at: Timestamp) -> NaiveDate {
	let dt = at.to_datetime().unwrap_or_else(Utc::now);
	dt.with_timezone(&ist()).date_naive()
}

/// `06-Jan-2025` style date for mail bodies, `TBD` when unknown
pub fn format_display_date(date: Option<NaiveDate>) -> String {
	date.map_or_else(|| "TBD".to_string(), |d| d.format("%d-%b-%Y").to_string())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn date(s: &str) -> NaiveDate {
		NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
	}

	#[test]
	fn test_batch_start_nine_am_ist() {
		let at = compute_send_at(date("2025-01-06"), 0, parse_send_time(Some("09:00"))).unwrap();
		assert_eq!(at.to_iso_string(), "2025-01-06T03:30:00.000Z");
	}

	#[test]
	fn test_offset_crosses_utc_midnight() {
		// 02:00 IST is the previous day in UTC
		let at = compute_send_at(date("2025-03-01"), 2, parse_send_time(Some("02:00"))).unwrap();
		assert_eq!(at.to_iso_string(), "2025-03-02T20:30:00.000Z");
	}

	#[test]
	fn test_negative_offset() {
		let at = compute_send_at(date("2025-01-06"), -3, parse_send_time(Some("18:30"))).unwrap();
		assert_eq!(at.to_iso_string(), "2025-01-03T13:00:00.000Z");
	}

	#[test]
	fn test_deterministic() {
		let a = compute_scheduled_at(Some("2025-01-06"), 5, Some("10:15"));
		let b = compute_scheduled_at(Some("2025-01-06"), 5, Some("10:15"));
		assert_eq!(a, b);
		assert!(a.is_some());
	}

	#[test]
	fn test_invalid_time_falls_back() {
		let at = compute_scheduled_at(Some("2025-01-06"), 0, Some("quarter past")).unwrap();
		assert_eq!(at.to_iso_string(), "2025-01-06T03:30:00.000Z");
		let at = compute_scheduled_at(Some("2025-01-06"), 0, Some("25:00")).unwrap();
		assert_eq!(at.to_iso_string(), "2025-01-06T03:30:00.000Z");
		let at = compute_scheduled_at(Some("2025-01-06"), 0, None).unwrap();
		assert_eq!(at.to_iso_string(), "2025-01-06T03:30:00.000Z");
	}

	#[test]
	fn test_time_with_seconds() {
		assert_eq!(
			parse_send_time(Some("14:45:30")),
			NaiveTime::from_hms_opt(14, 45, 0).unwrap()
		);
	}

	#[test]
	fn test_missing_reference_date() {
		assert!(compute_scheduled_at(None, 0, Some("09:00")).is_none());
		assert!(compute_scheduled_at(Some("  "), 0, Some("09:00")).is_none());
		assert!(compute_scheduled_at(Some("06/01/2025"), 0, Some("09:00")).is_none());
	}

	#[test]
	fn test_rfc3339_reference_uses_ist_date() {
		// 20:00 UTC on the 5th is already the 6th in IST
		assert_eq!(parse_reference_date("2025-01-05T20:00:00Z"), Some(date("2025-01-06")));
	}

	#[test]
	fn test_parse_offset_days() {
		assert_eq!(parse_offset_days(" 7 "), 7);
		assert_eq!(parse_offset_days("-2"), -2);
		assert_eq!(parse_offset_days("one"), 0);
	}

	#[test]
	fn test_format_display_date() {
		assert_eq!(format_display_date(Some(date("2025-01-06"))), "06-Jan-2025");
		assert_eq!(format_display_date(None), "TBD");
	}

	#[test]
	fn test_date_ist() {
		// 2025-01-05T20:00:00Z
		assert_eq!(date_ist(Timestamp(1_736_107_200)), date("2025-01-06"));
	}
}

// vim: ts=4
