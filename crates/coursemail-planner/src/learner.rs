//! Learner welcome scheduling

use serde::Deserialize;
use serde_json::json;

use coursemail_core::send_time::compute_scheduled_at;
use coursemail_types::queue_adapter::{
	BatchTypeFilter, DeliveryMode, ListTemplateOptions, TemplateCategory,
};
use coursemail_types::utils::looks_like_email;

use crate::plan::{MailSource, PlanReport, Planned, Planner, display_date, require};
use crate::prelude::*;

#[derive(Debug, Clone, Deserialize)]
pub struct LearnerScheduleRequest {
	#[serde(default)]
	pub batch_no: String,
	#[serde(default)]
	pub mode: String,
	pub batch_type: Option<String>,
	pub class_room: Option<String>,
}

/// Mode names are matched case-insensitively
pub fn parse_mode(mode: &str) -> ClResult<DeliveryMode> {
	match mode.trim().to_ascii_lowercase().as_str() {
		"online" => Ok(DeliveryMode::Online),
		"offline" => Ok(DeliveryMode::Offline),
		_ => Err(Error::ValidationError(format!("mode must be Online or Offline, got '{}'", mode))),
	}
}

impl Planner {
	pub async fn schedule_learner_emails(&self, req: &LearnerScheduleRequest) -> ClResult<PlanReport> {
		require("batch_no", &req.batch_no)?;
		require("mode", &req.mode)?;
		let batch_no = req.batch_no.trim();
		let mode = parse_mode(&req.mode)?;
		let batch_type = req.batch_type.as_deref().map(str::trim).filter(|s| !s.is_empty());

		let batch_type_filter = match (mode, batch_type) {
			(DeliveryMode::Offline, Some(bt)) => BatchTypeFilter::Is(bt.to_string()),
			(DeliveryMode::Offline, None) => {
				return Err(Error::ValidationError("batch_type is required for Offline mode".into()));
			}
			(DeliveryMode::Online, _) => BatchTypeFilter::Unset,
		};

		let start = self.start_date(batch_no).await?;

		let learners = self.adapter.list_learners(batch_no).await?;
		if learners.is_empty() {
			warn!("No learners found for batch {}", batch_no);
			return Err(Error::NotFound);
		}

		let templates = self
			.templates(ListTemplateOptions {
				category: Some(TemplateCategory::Learner),
				mode: Some(mode),
				batch_type: batch_type_filter,
				..Default::default()
			})
			.await?;
		if templates.is_empty() {
			warn!("No active learner templates for {} / {:?}", mode.as_str(), batch_type);
			return Err(Error::NotFound);
		}

		let form_link = self.form_url(batch_no).await?;
		let start_date = display_date(&start);
		let class_name = req.class_room.as_deref().unwrap_or_default();

		info!(
			batch_no,
			mode = mode.as_str(),
			learners = learners.len(),
			templates = templates.len(),
			"Scheduling learner emails"
		);

		let mut report = PlanReport::default();
		for template in &templates {
			let Some(scheduled_at) =
				compute_scheduled_at(Some(&*start), template.offset_days, Some(&*template.send_time))
			else {
				warn!("Could not compute send time for template {}", template.template_name);
				report.skipped += learners.len();
				continue;
			};
			let source = MailSource::from(template);

			for learner in &learners {
				if !looks_like_email(&learner.email) {
					warn!("Skipping learner with invalid email '{}'", learner.email);
					report.skipped += 1;
					continue;
				}
				let name = learner.name.as_deref().filter(|n| !n.trim().is_empty());
				let vars = json!({
					"batch_no": batch_no,
					"name": name.unwrap_or("Learner"),
					"email": learner.email,
					"start_date": start_date,
					"class_name": class_name,
					"form_link": form_link,
				});

				self.enqueue(
					Planned {
						batch_no,
						source: &source,
						category: TemplateCategory::Learner,
						recipient_email: &learner.email,
						recipient_name: name,
						user_role: None,
						scheduled_at,
						vars: &vars,
					},
					&mut report,
				)
				.await;
			}
		}

		info!(batch_no, ?report, "Learner scheduling finished");
		Ok(report)
	}
}


// vim: ts=4
