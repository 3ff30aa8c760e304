//! Planner settings registration

use coursemail_core::settings::{SettingDefinition, SettingScope, SettingValue, SettingsRegistry};

use crate::internal::RoleRecipients;
use crate::prelude::*;

fn days(v: &SettingValue) -> ClResult<()> {
	match v {
		SettingValue::Int(n) if (0..=366).contains(n) => Ok(()),
		_ => Err(Error::ValidationError("Look-ahead must be between 0 and 366 days".into())),
	}
}

pub fn register_settings(registry: &mut SettingsRegistry) -> ClResult<()> {
	registry.register(
		SettingDefinition::builder("planner.role_recipients")
			.description("Fixed recipients per internal role, e.g. {\"IT Admin\": [\"it@example.com\"]}")
			.default(SettingValue::Json(serde_json::json!({})))
			.validator(|v| match v {
				SettingValue::Json(json) => RoleRecipients::from_json(json).map(|_| ()),
				_ => Err(Error::ValidationError("Role recipients must be a JSON object".into())),
			})
			.build()?,
	)?;

	registry.register(
		SettingDefinition::builder("planner.quiz_lookahead_days")
			.description("Days ahead scanned for Weekly Quiz topics")
			.default(SettingValue::Int(7))
			.validator(days)
			.build()?,
	)?;

	registry.register(
		SettingDefinition::builder("planner.assessment_lookahead_days")
			.description("Days ahead scanned for Intermediate Assessment topics")
			.default(SettingValue::Int(40))
			.validator(days)
			.build()?,
	)?;

	registry.register(
		SettingDefinition::builder("planner.quiz_learner_time")
			.description("IST time of day (HH:MM) for learner Weekly Quiz reminders")
			.default(SettingValue::String("09:00".into()))
			.validator(|v| {
				if let SettingValue::String(s) = v
					&& chrono::NaiveTime::parse_from_str(s.trim(), "%H:%M").is_ok()
				{
					return Ok(());
				}
				Err(Error::ValidationError("Time must be HH:MM".into()))
			})
			.build()?,
	)?;

	registry.register(
		SettingDefinition::builder("planner.reminder_cron")
			.description("Cron expression (UTC) for the daily reminder planning run")
			.default(SettingValue::String("30 0 * * *".into()))
			.scope(SettingScope::System)
			.build()?,
	)?;

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_register_all() {
		let mut registry = SettingsRegistry::new();
		register_settings(&mut registry).unwrap();
		let frozen = registry.freeze();

		let rr = frozen.get("planner.role_recipients").unwrap();
		assert!(rr.validate(&SettingValue::Json(serde_json::json!({ "IT Admin": "it@x.in" }))).is_ok());
		assert!(rr.validate(&SettingValue::Json(serde_json::json!([1]))).is_err());

		let time = frozen.get("planner.quiz_learner_time").unwrap();
		assert!(time.validate(&SettingValue::String("25:99".into())).is_err());
	}
}

// vim: ts=4
