//! Attendance sheet upload

use axum::{
	Json,
	extract::{Multipart, State},
	http::StatusCode,
};
use std::sync::Arc;

use crate::prelude::*;
use coursemail_email::EmailModule;
use coursemail_email::attendance::AttendanceReport;

const FILE_FIELD: &str = "file";

fn is_csv(file_name: &str, content_type: &str) -> bool {
	let ext_ok = std::path::Path::new(file_name)
		.extension()
		.is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
	let type_ok = matches!(content_type, "text/csv" | "application/csv");
	ext_ok || (file_name.is_empty() && type_ok)
}

/// POST /api/attendance/upload - Multipart CSV in field `file`, mails every absentee
pub async fn post_attendance(
	State(app): State<App>,
	mut multipart: Multipart,
) -> ClResult<(StatusCode, Json<ApiResponse<AttendanceReport>>)> {
	let mut upload = None;
	while let Some(field) = multipart
		.next_field()
		.await
		.map_err(|e| Error::ValidationError(format!("invalid multipart body: {}", e)))?
	{
		if field.name() != Some(FILE_FIELD) {
			continue;
		}
		let file_name = field.file_name().unwrap_or_default().to_string();
		let content_type = field.content_type().unwrap_or_default().to_string();
		if !is_csv(&file_name, &content_type) {
			warn!("Rejected attendance upload '{}' ({})", file_name, content_type);
			return Err(Error::ValidationError("attendance sheet must be a CSV file".into()));
		}
		let data = field
			.bytes()
			.await
			.map_err(|e| Error::ValidationError(format!("cannot read upload: {}", e)))?;
		info!("Attendance sheet '{}' received, {} bytes", file_name, data.len());
		upload = Some(data);
	}

	let Some(data) = upload else {
		return Err(Error::ValidationError("No file uploaded".into()));
	};
	let email = app.ext::<Arc<EmailModule>>()?;
	let report = email.send_attendance(&app, &data).await?;
	Ok((StatusCode::OK, Json(ApiResponse::new(report))))
}


// vim: ts=4
