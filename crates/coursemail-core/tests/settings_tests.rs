//! Settings resolution tests
//!
//! Stored value, startup override and default, backed by the SQLite adapter

use coursemail_core::settings::{
	SettingDefinition, SettingScope, SettingValue, SettingsRegistry, SettingsService,
};
use coursemail_queue_adapter_sqlite::QueueAdapterSqlite;
use coursemail_types::error::Error;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

fn registry() -> SettingsRegistry {
	let mut registry = SettingsRegistry::new();
	registry
		.register(
			SettingDefinition::builder("dispatch.batch_size")
				.description("Rows claimed per pass")
				.default(SettingValue::Int(50))
				.validator(|v| match v {
					SettingValue::Int(n) if *n > 0 => Ok(()),
					_ => Err(Error::ValidationError("must be positive".into())),
				})
				.build()
				.unwrap(),
		)
		.unwrap();
	registry
		.register(
			SettingDefinition::builder("email.smtp.host")
				.description("SMTP host")
				.scope(SettingScope::System)
				.optional()
				.build()
				.unwrap(),
		)
		.unwrap();
	registry
		.register(
			SettingDefinition::builder("email.enabled")
				.description("Enable delivery")
				.default(SettingValue::Bool(true))
				.build()
				.unwrap(),
		)
		.unwrap();
	registry
}

async fn create_service(overrides: &[(&str, &str)]) -> (SettingsService, TempDir) {
	let temp_dir = TempDir::new().expect("Failed to create temp directory");
	let adapter = QueueAdapterSqlite::new(temp_dir.path()).await.expect("Failed to create adapter");
	let overrides: HashMap<String, String> =
		overrides.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();

	let service =
		SettingsService::new(Arc::new(registry().freeze()), Arc::new(adapter), overrides, 16)
			.expect("Failed to create settings service");

	(service, temp_dir)
}

#[tokio::test]
async fn test_default_value() {
	let (service, _tmp) = create_service(&[]).await;
	assert_eq!(service.get_int("dispatch.batch_size").await.unwrap(), 50);
	assert!(service.get_bool("email.enabled").await.unwrap());
}

#[tokio::test]
async fn test_override_beats_default() {
	let (service, _tmp) =
		create_service(&[("dispatch.batch_size", "10"), ("email.smtp.host", "smtp.test")]).await;
	assert_eq!(service.get_num::<u32>("dispatch.batch_size").await.unwrap(), 10);
	assert_eq!(
		service.get_string_opt("email.smtp.host").await.unwrap().as_deref(),
		Some("smtp.test")
	);
}

#[tokio::test]
async fn test_unset_optional_setting() {
	let (service, _tmp) = create_service(&[]).await;
	assert!(service.get_string_opt("email.smtp.host").await.unwrap().is_none());
}

#[tokio::test]
async fn test_bad_override_rejected() {
	let temp_dir = TempDir::new().unwrap();
	let adapter = QueueAdapterSqlite::new(temp_dir.path()).await.unwrap();
	let overrides = HashMap::from([("dispatch.batch_size".to_string(), "many".to_string())]);
	let res = SettingsService::new(Arc::new(registry().freeze()), Arc::new(adapter), overrides, 16);
	assert!(matches!(res, Err(Error::ConfigError(_))));
}

#[tokio::test]
async fn test_stored_value_beats_override() {
	let (service, _tmp) = create_service(&[("dispatch.batch_size", "10")]).await;
	service.set("dispatch.batch_size", SettingValue::Int(25)).await.unwrap();
	assert_eq!(service.get_int("dispatch.batch_size").await.unwrap(), 25);

	service.delete("dispatch.batch_size").await.unwrap();
	assert_eq!(service.get_int("dispatch.batch_size").await.unwrap(), 10);
}

#[tokio::test]
async fn test_set_validates() {
	let (service, _tmp) = create_service(&[]).await;

	let res = service.set("dispatch.batch_size", SettingValue::Int(0)).await;
	assert!(matches!(res, Err(Error::ValidationError(_))));

	let res = service.set("dispatch.batch_size", SettingValue::String("ten".into())).await;
	assert!(matches!(res, Err(Error::ValidationError(_))));

	let res = service.set("email.smtp.host", SettingValue::String("x".into())).await;
	assert!(matches!(res, Err(Error::PermissionDenied)));

	let res = service.set("no.such.key", SettingValue::Int(1)).await;
	assert!(matches!(res, Err(Error::ValidationError(_))));
}

#[tokio::test]
async fn test_required_settings() {
	let mut registry = registry();
	registry
		.register(
			SettingDefinition::builder("email.from.address")
				.description("Sender address")
				.build()
				.unwrap(),
		)
		.unwrap();
	let temp_dir = TempDir::new().unwrap();
	let adapter = Arc::new(QueueAdapterSqlite::new(temp_dir.path()).await.unwrap());
	let service =
		SettingsService::new(Arc::new(registry.freeze()), adapter, HashMap::new(), 16).unwrap();

	assert!(service.validate_required_settings().await.is_err());
	service
		.set("email.from.address", SettingValue::String("ops@example.com".into()))
		.await
		.unwrap();
	assert!(service.validate_required_settings().await.is_ok());
}

// vim: ts=4
