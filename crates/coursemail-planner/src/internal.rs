//! Internal role scheduling (trainers, coordinators, admins)

use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;

use coursemail_core::send_time::compute_scheduled_at;
use coursemail_types::queue_adapter::{ListTemplateOptions, TemplateCategory};
use coursemail_types::utils::{looks_like_email, parse_email_list};

use crate::plan::{MailSource, PlanReport, Planned, Planner, display_date, require};
use crate::prelude::*;

pub const ROLE_TRAINER: &str = "Trainer";
pub const ROLE_LEARNER: &str = "Learner";

#[derive(Debug, Clone, Deserialize)]
pub struct InternalScheduleRequest {
	#[serde(default)]
	pub batch_no: String,
	#[serde(default)]
	pub roles: Vec<String>,
	/// Single-role form
	pub user_role: Option<String>,
	pub domain: Option<String>,
}

impl InternalScheduleRequest {
	fn all_roles(&self) -> Vec<&str> {
		let mut roles: Vec<&str> = Vec::new();
		for role in self.roles.iter().map(String::as_str).chain(self.user_role.as_deref()) {
			let role = role.trim();
			if !role.is_empty() && !roles.contains(&role) {
				roles.push(role);
			}
		}
		roles
	}
}

/// Fixed recipients per role, from `planner.role_recipients`
#[derive(Debug, Clone, Default)]
pub struct RoleRecipients(HashMap<String, Vec<String>>);

impl RoleRecipients {
	/// Accepts `{"Role": ["a@x", "b@x"]}` or `{"Role": "a@x, b@x"}`
	pub fn from_json(value: &Value) -> ClResult<Self> {
		let Value::Object(map) = value else {
			return Err(Error::ValidationError("role recipients must be a JSON object".into()));
		};

		let mut roles = HashMap::new();
		for (role, entry) in map {
			let list = match entry {
				Value::String(s) => parse_email_list(s),
				Value::Array(items) => items
					.iter()
					.filter_map(Value::as_str)
					.map(str::trim)
					.filter(|s| !s.is_empty())
					.map(ToOwned::to_owned)
					.collect(),
				_ => {
					return Err(Error::ValidationError(format!(
						"recipients of role '{}' must be a string or an array",
						role
					)));
				}
			};
			roles.insert(role.clone(), list);
		}
		Ok(Self(roles))
	}

	pub fn get(&self, role: &str) -> &[String] {
		self.0.get(role).map(Vec::as_slice).unwrap_or_default()
	}
}

fn push_unique(list: &mut Vec<String>, email: &str) {
	let email = email.trim();
	if !email.is_empty() && !list.iter().any(|e| e.eq_ignore_ascii_case(email)) {
		list.push(email.to_string());
	}
}

impl Planner {
	/// Recipients every template of a role goes to
	async fn role_recipients(
		&self,
		batch_no: &str,
		role: &str,
		configured: &RoleRecipients,
	) -> ClResult<Vec<String>> {
		let mut recipients = Vec::new();
		if role.eq_ignore_ascii_case(ROLE_TRAINER) {
			for email in self.adapter.list_trainer_emails(batch_no).await? {
				push_unique(&mut recipients, &email);
			}
		} else if role.eq_ignore_ascii_case(ROLE_LEARNER) {
			for learner in self.adapter.list_learners(batch_no).await? {
				push_unique(&mut recipients, &learner.email);
			}
		}
		for email in configured.get(role) {
			push_unique(&mut recipients, email);
		}
		Ok(recipients)
	}

	pub async fn schedule_internal_emails(
		&self,
		req: &InternalScheduleRequest,
		configured: &RoleRecipients,
	) -> ClResult<PlanReport> {
		require("batch_no", &req.batch_no)?;
		let batch_no = req.batch_no.trim();
		let roles = req.all_roles();
		if roles.is_empty() {
			return Err(Error::ValidationError("at least one role is required".into()));
		}

		let start = self.start_date(batch_no).await?;
		let start_date = display_date(&start);
		let form_link = self.form_url(batch_no).await?;
		let domain = req.domain.as_deref().unwrap_or_default();

		let mut report = PlanReport::default();
		for role in roles {
			let templates = self
				.templates(ListTemplateOptions {
					category: Some(TemplateCategory::Internal),
					user_role: Some(role.to_string()),
					..Default::default()
				})
				.await?;
			if templates.is_empty() {
				info!(batch_no, role, "No active internal templates for role");
				continue;
			}

			let base = self.role_recipients(batch_no, role, configured).await?;
			info!(
				batch_no,
				role,
				templates = templates.len(),
				recipients = base.len(),
				"Scheduling internal emails"
			);

			for template in &templates {
				let mut recipients = base.clone();
				for email in parse_email_list(template.recipient_emails.as_deref().unwrap_or_default()) {
					push_unique(&mut recipients, &email);
				}
				if recipients.is_empty() {
					warn!(batch_no, role, "No recipients for template {}", template.template_name);
					continue;
				}

				let Some(scheduled_at) = compute_scheduled_at(
					Some(&*start),
					template.offset_days,
					Some(&*template.send_time),
				) else {
					report.skipped += recipients.len();
					continue;
				};
				let source = MailSource::from(template);

				for recipient in &recipients {
					if !looks_like_email(recipient) {
						warn!("Skipping invalid {} address '{}'", role, recipient);
						report.skipped += 1;
						continue;
					}
					let vars = json!({
						"batch_no": batch_no,
						"start_date": start_date,
						"recipient_email": recipient,
						"form_link": form_link,
						"domain": domain,
						"user_role": role,
					});

					self.enqueue(
						Planned {
							batch_no,
							source: &source,
							category: TemplateCategory::Internal,
							recipient_email: recipient,
							recipient_name: None,
							user_role: Some(role),
							scheduled_at,
							vars: &vars,
						},
						&mut report,
					)
					.await;
				}
			}
		}

		info!(batch_no, ?report, "Internal scheduling finished");
		Ok(report)
	}
}


// vim: ts=4
