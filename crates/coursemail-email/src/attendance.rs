//! Attendance sheet absence mailer
//!
//! Parses an exported attendance CSV and sends one "Absence Notification" to
//! every learner marked absent (`A`) or on leave (`OL`) in any date column.

use regex::Regex;
use serde::Serialize;
use serde_json::json;

use coursemail_types::queue_adapter::{ListTemplateOptions, QueueAdapter, TemplateCategory};
use coursemail_types::utils::looks_like_email;

use crate::prelude::*;
use crate::sender::{EmailMessage, MailTransport};
use crate::template::TemplateEngine;

pub const ABSENCE_TEMPLATE: &str = "Absence Notification";

const FALLBACK_SUBJECT: &str = "Absence Notification";
const FALLBACK_BODY: &str = "<p>Dear {{name}},</p>\
<p>We noticed that you were absent for your enrolled course <b>{{session_name}}</b> on: {{absent_dates}}</p>\
<p>Regular attendance is essential to stay aligned with the course content and placement activities. \
Please go through the missed sessions before attending the upcoming ones.</p>\
<p>Please maintain attendance for certification and placement eligibility.</p>\
<p>Regards,<br/>Learning Coordinator</p>";

const DEFAULT_SESSION: &str = "Attendance Session";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Absentee {
	pub email: String,
	pub name: String,
	pub absent_dates: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceSheet {
	/// Course name from the sheet's preamble, if present
	pub session_name: Option<String>,
	pub date_columns: Vec<String>,
	pub absentees: Vec<Absentee>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
	Sent,
	Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct AbsenceResult {
	pub email: String,
	pub name: String,
	pub absent_dates: Vec<String>,
	pub status: DeliveryStatus,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttendanceReport {
	pub message: String,
	pub results: Vec<AbsenceResult>,
}

fn is_absent(cell: &str) -> bool {
	matches!(cell.trim().to_ascii_uppercase().as_str(), "A" | "OL")
}

/// Parse an attendance CSV. Rows before the `Email`/`Learners` header row
/// are treated as preamble.
pub fn parse_attendance(data: &[u8]) -> ClResult<AttendanceSheet> {
	let date_col = Regex::new(r"^\d{1,2}-[A-Za-z]{3}$")
		.map_err(|e| Error::Internal(format!("date column pattern: {}", e)))?;
	let course_name = Regex::new(r"(?i)course\s*name\s*[:\-]*\s*(.*)")
		.map_err(|e| Error::Internal(format!("course name pattern: {}", e)))?;

	let mut reader = csv::ReaderBuilder::new()
		.has_headers(false)
		.flexible(true)
		.trim(csv::Trim::All)
		.from_reader(data);

	let mut session_name = None;
	let mut header: Option<(usize, usize, Vec<(usize, String)>)> = None;
	let mut absentees: Vec<Absentee> = Vec::new();

	for record in reader.records() {
		let record = record.map_err(|e| Error::ValidationError(format!("invalid CSV: {}", e)))?;

		let Some((email_idx, name_idx, dates)) = &header else {
			let email_idx = record.iter().position(|c| c.eq_ignore_ascii_case("Email"));
			let name_idx = record.iter().position(|c| c.eq_ignore_ascii_case("Learners"));
			if let (Some(email_idx), Some(name_idx)) = (email_idx, name_idx) {
				let dates = record
					.iter()
					.enumerate()
					.filter(|(_, c)| date_col.is_match(c) && !c.to_ascii_lowercase().contains("notes"))
					.map(|(i, c)| (i, c.to_string()))
					.collect();
				header = Some((email_idx, name_idx, dates));
			} else if session_name.is_none() {
				let line = record.iter().collect::<Vec<_>>().join(" ");
				session_name = course_name
					.captures(&line)
					.and_then(|c| c.get(1))
					.map(|m| m.as_str().trim().to_string())
					.filter(|s| !s.is_empty());
			}
			continue;
		};

		let email = record.get(*email_idx).unwrap_or_default();
		let name = record.get(*name_idx).unwrap_or_default();
		if !looks_like_email(email) || name.is_empty() || name.eq_ignore_ascii_case("NA") {
			continue;
		}

		let absent: Vec<String> = dates
			.iter()
			.filter(|(i, _)| record.get(*i).is_some_and(is_absent))
			.map(|(_, label)| label.clone())
			.collect();
		if absent.is_empty() {
			continue;
		}

		// One mail per address, even when a learner appears twice
		if let Some(existing) = absentees.iter_mut().find(|a| a.email.eq_ignore_ascii_case(email)) {
			for date in absent {
				if !existing.absent_dates.contains(&date) {
					existing.absent_dates.push(date);
				}
			}
		} else {
			absentees.push(Absentee {
				email: email.to_string(),
				name: name.to_string(),
				absent_dates: absent,
			});
		}
	}

	let Some((_, _, dates)) = header else {
		return Err(Error::ValidationError(
			"attendance sheet needs 'Email' and 'Learners' columns".into(),
		));
	};

	Ok(AttendanceSheet {
		session_name,
		date_columns: dates.into_iter().map(|(_, label)| label).collect(),
		absentees,
	})
}

/// Subject and body of the absence mail, from an active `attendance`
/// template when one exists
async fn absence_template(adapter: &dyn QueueAdapter) -> ClResult<(String, String)> {
	let templates = adapter
		.list_templates(&ListTemplateOptions {
			category: Some(TemplateCategory::Attendance),
			template_name: Some(ABSENCE_TEMPLATE.into()),
			active_only: true,
			..Default::default()
		})
		.await?;

	Ok(match templates.first() {
		Some(t) => (t.subject.to_string(), t.body_html.to_string()),
		None => (FALLBACK_SUBJECT.to_string(), FALLBACK_BODY.to_string()),
	})
}

/// Send one absence notification per absentee
pub async fn send_absence_notifications(
	adapter: &dyn QueueAdapter,
	transport: &dyn MailTransport,
	engine: &TemplateEngine,
	sheet: &AttendanceSheet,
) -> ClResult<AttendanceReport> {
	let (subject, body) = absence_template(adapter).await?;
	let session = sheet.session_name.as_deref().unwrap_or(DEFAULT_SESSION);

	let mut results = Vec::with_capacity(sheet.absentees.len());
	for absentee in &sheet.absentees {
		let vars = json!({
			"name": absentee.name,
			"email": absentee.email,
			"session_name": session,
			"absent_dates": absentee.absent_dates.join(", "),
		});
		let rendered = engine.render_mail(&subject, &body, &vars);
		let message = EmailMessage {
			to: absentee.email.clone(),
			subject: rendered.subject,
			html_body: rendered.html_body,
			text_body: rendered.text_body,
			attachment: None,
		};

		let (status, error) = match transport.send(&message).await {
			Ok(_) => (DeliveryStatus::Sent, None),
			Err(e) => {
				warn!(to = %absentee.email, "Absence notification failed: {}", e);
				(DeliveryStatus::Failed, Some(e.to_string()))
			}
		};
		results.push(AbsenceResult {
			email: absentee.email.clone(),
			name: absentee.name.clone(),
			absent_dates: absentee.absent_dates.clone(),
			status,
			error,
		});
	}

	let sent = results.iter().filter(|r| r.status == DeliveryStatus::Sent).count();
	info!(sent, total = results.len(), "Absence notifications processed");
	Ok(AttendanceReport { message: format!("Emails sent to {} learners", sent), results })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_single_absence() {
		let csv = "Learners,Email,07-Jul,08-Jul\nJane,a@b.com,A,P\n";
		let sheet = parse_attendance(csv.as_bytes()).unwrap();
		assert_eq!(sheet.date_columns, vec!["07-Jul", "08-Jul"]);
		assert_eq!(
			sheet.absentees,
			vec![Absentee {
				email: "a@b.com".into(),
				name: "Jane".into(),
				absent_dates: vec!["07-Jul".into()],
			}]
		);
	}

	#[test]
	fn test_leave_counts_and_notes_ignored() {
		let csv = "S.No,Learners,Email,07-Jul,08-Jul,09-Jul Notes,Notes\n\
			1,Jane,a@b.com, ol ,A,A,A\n\
			2,Ravi,r@b.com,P,P,P,A\n";
		let sheet = parse_attendance(csv.as_bytes()).unwrap();
		assert_eq!(sheet.absentees.len(), 1);
		assert_eq!(sheet.absentees[0].absent_dates, vec!["07-Jul", "08-Jul"]);
	}

	#[test]
	fn test_invalid_rows_skipped() {
		let csv = "Learners,Email,07-Jul\nNA,na@b.com,A\nJane,not-an-email,A\n,x@b.com,A\n";
		let sheet = parse_attendance(csv.as_bytes()).unwrap();
		assert!(sheet.absentees.is_empty());
	}

	#[test]
	fn test_preamble_and_course_name() {
		let csv = "Attendance Report\n\
			Batch,PDFT-101\n\
			Course Name: Physical Design\n\
			\n\
			Learners,Email,07-Jul\n\
			Jane,a@b.com,A\n";
		let sheet = parse_attendance(csv.as_bytes()).unwrap();
		assert_eq!(sheet.session_name.as_deref(), Some("Physical Design"));
		assert_eq!(sheet.absentees.len(), 1);
	}

	#[test]
	fn test_duplicate_learner_merged() {
		let csv = "Learners,Email,07-Jul,08-Jul\nJane,a@b.com,A,P\nJane,a@b.com,A,A\n";
		let sheet = parse_attendance(csv.as_bytes()).unwrap();
		assert_eq!(sheet.absentees.len(), 1);
		assert_eq!(sheet.absentees[0].absent_dates, vec!["07-Jul", "08-Jul"]);
	}

	#[test]
	fn test_missing_columns() {
		let res = parse_attendance(b"Name,Mail\nJane,a@b.com\n");
		assert!(matches!(res, Err(Error::ValidationError(_))));
	}
}

// vim: ts=4
