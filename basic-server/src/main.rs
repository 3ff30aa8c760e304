use std::{env, path, sync::Arc};

use coursemail::AppBuilder;
use coursemail::error::ClResult;
use coursemail_queue_adapter_sqlite::QueueAdapterSqlite;

/// Environment variables mapped onto startup setting overrides
const SETTING_ENV: &[(&str, &str)] = &[
	("SMTP_HOST", "email.smtp.host"),
	("SMTP_PORT", "email.smtp.port"),
	("SMTP_FALLBACK_PORT", "email.smtp.fallback_port"),
	("SMTP_TLS_MODE", "email.smtp.tls_mode"),
	("EMAIL_USER", "email.smtp.username"),
	("EMAIL_PASS", "email.smtp.password"),
	("EMAIL_FROM", "email.from.address"),
	("EMAIL_FROM_NAME", "email.from.name"),
	("EMAIL_ENABLED", "email.enabled"),
	("DISPATCH_POLL_SECONDS", "dispatch.poll_seconds"),
	("REMINDER_CRON", "planner.reminder_cron"),
];

pub struct Config {
	pub db_dir: path::PathBuf,
	pub listen: String,
}

#[tokio::main]
async fn main() -> ClResult<()> {
	let config = Config {
		db_dir: path::PathBuf::from(env::var("DB_PATH").unwrap_or_else(|_| "./data".to_string())),
		listen: env::var("LISTEN").unwrap_or_else(|_| "127.0.0.1:3000".to_string()),
	};
	tokio::fs::create_dir_all(&config.db_dir).await?;

	let queue_adapter = Arc::new(QueueAdapterSqlite::new(&config.db_dir).await?);

	let mut builder = AppBuilder::new();
	builder.listen(config.listen).queue_adapter(queue_adapter);
	for (var, key) in SETTING_ENV {
		if let Ok(value) = env::var(var)
			&& !value.trim().is_empty()
		{
			builder.setting_override(*key, value);
		}
	}
	builder.run().await
}

// vim: ts=4
