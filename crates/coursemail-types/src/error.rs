//! Error handling subsystem. Implements a custom Error type.

use axum::{Json, http::StatusCode, response::IntoResponse};

use crate::types::ErrorResponse;

pub type ClResult<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	NotFound,
	PermissionDenied,
	DbError,
	Parse,
	Io(std::io::Error),

	ValidationError(String),
	ConfigError(String),
	Conflict(String),
	ServiceUnavailable(String),
	Internal(String),
}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Error::NotFound => write!(f, "not found"),
			Error::PermissionDenied => write!(f, "permission denied"),
			Error::DbError => write!(f, "database error"),
			Error::Parse => write!(f, "parse error"),
			Error::Io(err) => write!(f, "io error: {}", err),
			Error::ValidationError(msg) => write!(f, "validation error: {}", msg),
			Error::ConfigError(msg) => write!(f, "configuration error: {}", msg),
			Error::Conflict(msg) => write!(f, "conflict: {}", msg),
			Error::ServiceUnavailable(msg) => write!(f, "service unavailable: {}", msg),
			Error::Internal(msg) => write!(f, "internal error: {}", msg),
		}
	}
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		Error::Io(err)
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		tracing::warn!("json error: {}", err);
		Error::Parse
	}
}

impl From<std::num::ParseIntError> for Error {
	fn from(_err: std::num::ParseIntError) -> Self {
		Error::Parse
	}
}

impl From<chrono::ParseError> for Error {
	fn from(_err: chrono::ParseError) -> Self {
		Error::Parse
	}
}

impl Error {
	/// HTTP status and stable error code for the response body
	fn status_and_code(&self) -> (StatusCode, &'static str) {
		match self {
			Error::NotFound => (StatusCode::NOT_FOUND, "E-NOT-FOUND"),
			Error::PermissionDenied => (StatusCode::FORBIDDEN, "E-PERMISSION"),
			Error::ValidationError(_) | Error::Parse => (StatusCode::BAD_REQUEST, "E-VALIDATION"),
			Error::Conflict(_) => (StatusCode::CONFLICT, "E-CONFLICT"),
			Error::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "E-UNAVAILABLE"),
			Error::DbError => (StatusCode::INTERNAL_SERVER_ERROR, "E-DB"),
			Error::Io(_) | Error::ConfigError(_) | Error::Internal(_) => {
				(StatusCode::INTERNAL_SERVER_ERROR, "E-INTERNAL")
			}
		}
	}
}

impl IntoResponse for Error {
	fn into_response(self) -> axum::response::Response {
		let (status, code) = self.status_and_code();
		// Internal details stay in the log
		let message = match &self {
			Error::Io(_) | Error::ConfigError(_) | Error::Internal(_) => {
				tracing::error!("request failed: {}", self);
				"internal server error".to_string()
			}
			_ => self.to_string(),
		};
		(status, Json(ErrorResponse::new(code.to_string(), message))).into_response()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_status_mapping() {
		assert_eq!(Error::NotFound.status_and_code().0, StatusCode::NOT_FOUND);
		assert_eq!(
			Error::ValidationError("batch_no is required".into()).status_and_code().0,
			StatusCode::BAD_REQUEST
		);
		assert_eq!(Error::DbError.status_and_code().0, StatusCode::INTERNAL_SERVER_ERROR);
		assert_eq!(
			Error::ServiceUnavailable("smtp".into()).status_and_code().1,
			"E-UNAVAILABLE"
		);
	}

	#[test]
	fn test_display() {
		assert_eq!(Error::Conflict("dup".into()).to_string(), "conflict: dup");
	}
}

// vim: ts=4
