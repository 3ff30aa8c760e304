//! HTTP handlers

use axum::{Json, http::StatusCode};
use serde::Serialize;

use crate::app::VERSION;
use crate::prelude::*;

pub mod attendance;
pub mod mail;
pub mod schedule;
pub mod settings;
pub mod template;

#[derive(Debug, Serialize)]
pub struct Health {
	pub status: &'static str,
	pub version: &'static str,
}

/// GET /api/health
pub async fn get_health() -> (StatusCode, Json<ApiResponse<Health>>) {
	(StatusCode::OK, Json(ApiResponse::new(Health { status: "ok", version: VERSION })))
}

/// Trimmed value, or a validation error naming the field
pub(crate) fn required<'a>(field: &str, value: &'a str) -> ClResult<&'a str> {
	let value = value.trim();
	if value.is_empty() {
		return Err(Error::ValidationError(format!("{} is required", field)));
	}
	Ok(value)
}

// vim: ts=4
