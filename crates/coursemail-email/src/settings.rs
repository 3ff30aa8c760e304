//! Email settings registration
//!
//! SMTP connection, sender identity, and queue dispatch tuning.

use coursemail_core::settings::{SettingDefinition, SettingScope, SettingValue, SettingsRegistry};

use crate::prelude::*;

fn positive(key: &'static str) -> impl Fn(&SettingValue) -> ClResult<()> + Send + Sync + 'static {
	move |v| match v {
		SettingValue::Int(n) if *n > 0 => Ok(()),
		_ => Err(Error::ValidationError(format!("{} must be a positive integer", key))),
	}
}

fn port(v: &SettingValue) -> ClResult<()> {
	if let SettingValue::Int(port) = v
		&& *port > 0
		&& *port < 65536
	{
		return Ok(());
	}
	Err(Error::ValidationError("Port must be between 1 and 65535".into()))
}

/// Register all email and dispatch settings
pub fn register_settings(registry: &mut SettingsRegistry) -> ClResult<()> {
	registry.register(
		SettingDefinition::builder("email.enabled")
			.description("Enable email sending (disable for testing)")
			.default(SettingValue::Bool(true))
			.build()?,
	)?;

	registry.register(
		SettingDefinition::builder("email.smtp.host")
			.description("SMTP server hostname. If not set, delivery is skipped.")
			.scope(SettingScope::System)
			.optional()
			.build()?,
	)?;

	registry.register(
		SettingDefinition::builder("email.smtp.port")
			.description("Primary SMTP port (465 uses implicit TLS)")
			.default(SettingValue::Int(465))
			.validator(port)
			.build()?,
	)?;

	registry.register(
		SettingDefinition::builder("email.smtp.fallback_port")
			.description("SMTP port tried once with STARTTLS when the primary port fails")
			.default(SettingValue::Int(587))
			.validator(port)
			.build()?,
	)?;

	registry.register(
		SettingDefinition::builder("email.smtp.tls_mode")
			.description("TLS mode: auto (by port), none, starttls, or tls")
			.default(SettingValue::String("auto".into()))
			.validator(|v| {
				if let SettingValue::String(mode) = v
					&& ["auto", "none", "starttls", "tls"].contains(&mode.as_str())
				{
					return Ok(());
				}
				Err(Error::ValidationError("TLS mode must be: auto, none, starttls, or tls".into()))
			})
			.build()?,
	)?;

	registry.register(
		SettingDefinition::builder("email.smtp.timeout_seconds")
			.description("SMTP connection timeout in seconds")
			.default(SettingValue::Int(20))
			.validator(positive("email.smtp.timeout_seconds"))
			.build()?,
	)?;

	registry.register(
		SettingDefinition::builder("email.smtp.username")
			.description("SMTP authentication username")
			.scope(SettingScope::System)
			.optional()
			.build()?,
	)?;

	registry.register(
		SettingDefinition::builder("email.smtp.password")
			.description("SMTP authentication password")
			.scope(SettingScope::System)
			.optional()
			.secret()
			.build()?,
	)?;

	registry.register(
		SettingDefinition::builder("email.from.address")
			.description("Sender address; defaults to the SMTP username")
			.scope(SettingScope::System)
			.optional()
			.validator(|v| {
				if let SettingValue::String(email) = v
					&& email.contains('@')
				{
					return Ok(());
				}
				Err(Error::ValidationError("Invalid email address format".into()))
			})
			.build()?,
	)?;

	registry.register(
		SettingDefinition::builder("email.from.name")
			.description("Sender display name")
			.default(SettingValue::String("Training Team".into()))
			.build()?,
	)?;

	registry.register(
		SettingDefinition::builder("dispatch.poll_seconds")
			.description("Seconds between queue dispatch passes")
			.default(SettingValue::Int(60))
			.scope(SettingScope::System)
			.validator(positive("dispatch.poll_seconds"))
			.build()?,
	)?;

	registry.register(
		SettingDefinition::builder("dispatch.batch_size")
			.description("Maximum rows claimed per dispatch pass")
			.default(SettingValue::Int(50))
			.validator(positive("dispatch.batch_size"))
			.build()?,
	)?;

	registry.register(
		SettingDefinition::builder("dispatch.max_attempts")
			.description("Delivery attempts before a row stays failed")
			.default(SettingValue::Int(5))
			.validator(positive("dispatch.max_attempts"))
			.build()?,
	)?;

	registry.register(
		SettingDefinition::builder("dispatch.throttle_ms")
			.description("Pause between two sends within a pass, in milliseconds")
			.default(SettingValue::Int(0))
			.validator(|v| match v {
				SettingValue::Int(n) if *n >= 0 => Ok(()),
				_ => Err(Error::ValidationError("dispatch.throttle_ms must not be negative".into())),
			})
			.build()?,
	)?;

	registry.register(
		SettingDefinition::builder("dispatch.retry_min_seconds")
			.description("Backoff after the first failed attempt")
			.default(SettingValue::Int(60))
			.validator(positive("dispatch.retry_min_seconds"))
			.build()?,
	)?;

	registry.register(
		SettingDefinition::builder("dispatch.retry_max_seconds")
			.description("Upper bound of the retry backoff")
			.default(SettingValue::Int(3600))
			.validator(positive("dispatch.retry_max_seconds"))
			.build()?,
	)?;

	registry.register(
		SettingDefinition::builder("dispatch.stale_after_seconds")
			.description("Processing rows older than this are considered interrupted")
			.default(SettingValue::Int(600))
			.validator(positive("dispatch.stale_after_seconds"))
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

		let port = frozen.get("email.smtp.port").unwrap();
		assert_eq!(port.default, Some(SettingValue::Int(465)));
		assert!(port.validate(&SettingValue::Int(70000)).is_err());

		assert!(frozen.get("email.smtp.password").unwrap().secret);
		assert!(frozen.get("dispatch.max_attempts").is_some());
	}
}

// vim: ts=4
