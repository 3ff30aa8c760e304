//! Settings management handlers

use axum::{
	Json,
	extract::{Path, State},
	http::StatusCode,
};
use serde::{Deserialize, Serialize};

use crate::prelude::*;
use coursemail_core::settings::{SettingDefinition, SettingScope, SettingValue};

const SECRET_MASK: &str = "********";

/// Response for a single setting with metadata
#[derive(Debug, Serialize)]
pub struct SettingResponse {
	pub key: String,
	/// Absent for optional settings that are not configured
	#[serde(skip_serializing_if = "Option::is_none")]
	pub value: Option<SettingValue>,
	pub scope: SettingScope,
	pub secret: bool,
	pub description: String,
}

async fn describe(app: &App, def: &SettingDefinition) -> SettingResponse {
	let value = match app.settings.get(&def.key).await {
		Ok(_) if def.secret => Some(SettingValue::String(SECRET_MASK.to_string())),
		Ok(value) => Some(value),
		Err(_) => None,
	};
	SettingResponse {
		key: def.key.clone(),
		value,
		scope: def.scope,
		secret: def.secret,
		description: def.description.clone(),
	}
}

/// GET /api/settings - All registered settings with their current values
pub async fn list_settings(
	State(app): State<App>,
) -> ClResult<(StatusCode, Json<ApiResponse<Vec<SettingResponse>>>)> {
	let mut settings = Vec::new();
	for def in app.settings_registry.list() {
		settings.push(describe(&app, def).await);
	}

	let total = settings.len();
	Ok((StatusCode::OK, Json(ApiResponse::with_pagination(settings, 0, total, total))))
}

#[derive(Debug, Deserialize)]
pub struct UpdateSettingRequest {
	pub value: SettingValue,
}

/// PUT /api/settings/{key} - Store a new value (system settings are read-only)
pub async fn update_setting(
	State(app): State<App>,
	Path(key): Path<String>,
	Json(req): Json<UpdateSettingRequest>,
) -> ClResult<(StatusCode, Json<ApiResponse<SettingResponse>>)> {
	let def = app.settings_registry.get(&key).ok_or(Error::NotFound)?;
	app.settings.set(&key, req.value).await?;

	Ok((StatusCode::OK, Json(ApiResponse::new(describe(&app, def).await))))
}

/// DELETE /api/settings/{key} - Drop the stored value, falling back to override or default
pub async fn delete_setting(
	State(app): State<App>,
	Path(key): Path<String>,
) -> ClResult<(StatusCode, Json<ApiResponse<SettingResponse>>)> {
	let def = app.settings_registry.get(&key).ok_or(Error::NotFound)?;
	if def.scope == SettingScope::System {
		return Err(Error::PermissionDenied);
	}
	app.settings.delete(&key).await?;

	Ok((StatusCode::OK, Json(ApiResponse::new(describe(&app, def).await))))
}

// vim: ts=4
