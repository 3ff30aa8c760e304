//! Template management handlers

use axum::{
	Json,
	extract::{Path, Query, State},
	http::StatusCode,
};
use serde::Deserialize;

use crate::prelude::*;
use coursemail_planner::learner::parse_mode;
use coursemail_types::queue_adapter::{
	BatchTypeFilter, CreateTemplate, ListTemplateOptions, Template, TemplateCategory,
	UpdateTemplate,
};

#[derive(Debug, Default, Deserialize)]
pub struct ListTemplatesQuery {
	pub mode: Option<String>,
	pub category: Option<String>,
	pub batch_type: Option<String>,
	pub user_role: Option<String>,
	pub template_name: Option<String>,
	#[serde(default)]
	pub active_only: bool,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
	value.map(str::trim).filter(|v| !v.is_empty())
}

impl ListTemplatesQuery {
	fn to_options(&self) -> ClResult<ListTemplateOptions> {
		Ok(ListTemplateOptions {
			category: non_empty(self.category.as_deref())
				.map(str::parse::<TemplateCategory>)
				.transpose()?,
			mode: non_empty(self.mode.as_deref()).map(parse_mode).transpose()?,
			batch_type: non_empty(self.batch_type.as_deref())
				.map_or(BatchTypeFilter::Any, |bt| BatchTypeFilter::Is(bt.to_string())),
			user_role: non_empty(self.user_role.as_deref()).map(ToOwned::to_owned),
			template_name: non_empty(self.template_name.as_deref()).map(ToOwned::to_owned),
			active_only: self.active_only,
		})
	}
}

/// GET /api/templates - List templates, 404 when nothing matches
pub async fn list_templates(
	State(app): State<App>,
	Query(query): Query<ListTemplatesQuery>,
) -> ClResult<(StatusCode, Json<ApiResponse<Vec<Template>>>)> {
	let opts = query.to_options()?;
	let templates = app.queue_adapter.list_templates(&opts).await?;
	if templates.is_empty() {
		return Err(Error::NotFound);
	}

	let total = templates.len();
	Ok((StatusCode::OK, Json(ApiResponse::with_pagination(templates, 0, total, total))))
}

fn validate_template(tpl: &CreateTemplate) -> ClResult<()> {
	super::required("template_name", &tpl.template_name)?;
	super::required("subject", &tpl.subject)?;
	super::required("body_html", &tpl.body_html)?;
	if tpl.category == TemplateCategory::Learner && tpl.mode.is_none() {
		return Err(Error::ValidationError("learner templates need a mode".into()));
	}
	if tpl.category == TemplateCategory::Internal
		&& non_empty(tpl.user_role.as_deref()).is_none()
	{
		return Err(Error::ValidationError("internal templates need a user_role".into()));
	}
	Ok(())
}

/// POST /api/templates
pub async fn post_template(
	State(app): State<App>,
	Json(tpl): Json<CreateTemplate>,
) -> ClResult<(StatusCode, Json<ApiResponse<Template>>)> {
	validate_template(&tpl)?;
	let template_id = app.queue_adapter.create_template(&tpl).await?;
	info!(template_id, category = tpl.category.as_str(), "Template {} created", tpl.template_name);

	let template = app.queue_adapter.read_template(template_id).await?;
	Ok((StatusCode::CREATED, Json(ApiResponse::new(template))))
}

/// PATCH /api/templates/{id}
pub async fn patch_template(
	State(app): State<App>,
	Path(template_id): Path<i64>,
	Json(patch): Json<UpdateTemplate>,
) -> ClResult<(StatusCode, Json<ApiResponse<Template>>)> {
	app.queue_adapter.update_template(template_id, &patch).await?;
	info!(template_id, "Template updated");

	let template = app.queue_adapter.read_template(template_id).await?;
	Ok((StatusCode::OK, Json(ApiResponse::new(template))))
}

/// DELETE /api/templates/{id}
pub async fn delete_template(
	State(app): State<App>,
	Path(template_id): Path<i64>,
) -> ClResult<StatusCode> {
	app.queue_adapter.delete_template(template_id).await?;
	info!(template_id, "Template deleted");
	Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
	use super::*;
	use coursemail_types::queue_adapter::DeliveryMode;

	#[test]
	fn test_query_to_options() {
		let query = ListTemplatesQuery {
			mode: Some("online".into()),
			category: Some("learner".into()),
			batch_type: Some(" ".into()),
			..Default::default()
		};
		let opts = query.to_options().unwrap();
		assert_eq!(opts.mode, Some(DeliveryMode::Online));
		assert_eq!(opts.category, Some(TemplateCategory::Learner));
		assert!(matches!(opts.batch_type, BatchTypeFilter::Any));
	}

	#[test]
	fn test_invalid_mode_rejected() {
		let query = ListTemplatesQuery { mode: Some("hybrid".into()), ..Default::default() };
		assert!(matches!(query.to_options(), Err(Error::ValidationError(_))));
	}
}

// vim: ts=4
