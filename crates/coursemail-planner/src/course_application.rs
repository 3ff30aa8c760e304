//! Course application follow-ups, pointing learners at the batch form

use serde::Deserialize;
use serde_json::json;

use coursemail_core::send_time::compute_scheduled_at;
use coursemail_types::queue_adapter::{ListTemplateOptions, TemplateCategory};
use coursemail_types::utils::looks_like_email;

use crate::plan::{MailSource, PlanReport, Planned, Planner, display_date, require};
use crate::prelude::*;

#[derive(Debug, Clone, Deserialize)]
pub struct CourseApplicationRequest {
	#[serde(default)]
	pub batch_no: String,
}

impl Planner {
	pub async fn schedule_course_application(
		&self,
		req: &CourseApplicationRequest,
	) -> ClResult<PlanReport> {
		require("batch_no", &req.batch_no)?;
		let batch_no = req.batch_no.trim();

		let start = self.start_date(batch_no).await?;
		let form_link = self.form_url(batch_no).await?;
		if form_link.is_empty() {
			return Err(Error::ValidationError(format!(
				"No application form registered for batch {}",
				batch_no
			)));
		}

		let templates = self
			.templates(ListTemplateOptions {
				category: Some(TemplateCategory::CourseApplication),
				..Default::default()
			})
			.await?;
		if templates.is_empty() {
			warn!("No active course application templates");
			return Err(Error::NotFound);
		}

		let learners = self.adapter.list_learners(batch_no).await?;
		if learners.is_empty() {
			warn!("No learners found for batch {}", batch_no);
			return Err(Error::NotFound);
		}

		let start_date = display_date(&start);
		let mut report = PlanReport::default();
		for template in &templates {
			let Some(scheduled_at) =
				compute_scheduled_at(Some(&*start), template.offset_days, Some(&*template.send_time))
			else {
				report.skipped += learners.len();
				continue;
			};
			let source = MailSource::from(template);

			for learner in &learners {
				if !looks_like_email(&learner.email) {
					report.skipped += 1;
					continue;
				}
				let name = learner.name.as_deref().filter(|n| !n.trim().is_empty());
				let vars = json!({
					"batch_no": batch_no,
					"name": name.unwrap_or("Learner"),
					"start_date": start_date,
					"form_link": form_link,
					"batch_form_link": form_link,
				});

				self.enqueue(
					Planned {
						batch_no,
						source: &source,
						category: TemplateCategory::CourseApplication,
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

		info!(batch_no, ?report, "Course application scheduling finished");
		Ok(report)
	}
}

// vim: ts=4
