//! Settings service with caching and validation

use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use coursemail_types::queue_adapter::QueueAdapter;

use super::types::{FrozenSettingsRegistry, SettingScope, SettingValue};
use crate::prelude::*;

const MIN_CACHE_SIZE: NonZeroUsize = NonZeroUsize::MIN;

/// LRU cache for resolved settings values
pub struct SettingsCache {
	cache: parking_lot::RwLock<LruCache<String, SettingValue>>,
}

impl SettingsCache {
	pub fn new(capacity: usize) -> Self {
		let capacity = NonZeroUsize::new(capacity).unwrap_or(MIN_CACHE_SIZE);
		Self { cache: parking_lot::RwLock::new(LruCache::new(capacity)) }
	}

	pub fn get(&self, key: &str) -> Option<SettingValue> {
		// LruCache::get updates recency, so it needs the write lock
		self.cache.write().get(key).cloned()
	}

	pub fn put(&self, key: String, value: SettingValue) {
		self.cache.write().put(key, value);
	}

	pub fn invalidate(&self, key: &str) {
		self.cache.write().pop(key);
	}
}

/// Settings service - main interface for accessing and managing settings
///
/// Resolution order: stored value (global scope only), startup override, default.
pub struct SettingsService {
	registry: Arc<FrozenSettingsRegistry>,
	cache: SettingsCache,
	overrides: HashMap<String, SettingValue>,
	store: Arc<dyn QueueAdapter>,
}

impl SettingsService {
	/// `overrides` holds raw startup values (usually from the environment)
	pub fn new(
		registry: Arc<FrozenSettingsRegistry>,
		store: Arc<dyn QueueAdapter>,
		overrides: HashMap<String, String>,
		cache_size: usize,
	) -> ClResult<Self> {
		let mut parsed = HashMap::new();
		for (key, raw) in overrides {
			let def = registry
				.get(&key)
				.ok_or_else(|| Error::ConfigError(format!("Unknown setting override: {}", key)))?;
			let value = match &def.default {
				Some(default) => SettingValue::parse_as(&raw, default)
					.map_err(|e| Error::ConfigError(format!("Setting '{}': {}", key, e)))?,
				None => SettingValue::String(raw),
			};
			def.validate(&value)?;
			debug!("Setting '{}' overridden at startup", key);
			parsed.insert(key, value);
		}

		Ok(Self { registry, cache: SettingsCache::new(cache_size), overrides: parsed, store })
	}

	/// Get setting value with full resolution
	pub async fn get(&self, key: &str) -> ClResult<SettingValue> {
		if let Some(value) = self.cache.get(key) {
			return Ok(value);
		}

		let def = self
			.registry
			.get(key)
			.ok_or_else(|| Error::ValidationError(format!("Unknown setting: {}", key)))?;

		if def.scope == SettingScope::Global
			&& let Some(json_value) = self.store.read_setting(key).await?
		{
			let value = serde_json::from_value::<SettingValue>(json_value)
				.map_err(|e| Error::ValidationError(format!("Invalid setting value: {}", e)))?;
			self.cache.put(key.to_string(), value.clone());
			return Ok(value);
		}

		let resolved = self.overrides.get(key).or(def.default.as_ref());
		match resolved {
			Some(value) => {
				self.cache.put(key.to_string(), value.clone());
				Ok(value.clone())
			}
			None => Err(Error::ValidationError(format!(
				"Setting '{}' has no default and must be configured",
				key
			))),
		}
	}

	/// Store a new global value with type and validator checks
	pub async fn set(&self, key: &str, value: SettingValue) -> ClResult<()> {
		let def = self
			.registry
			.get(key)
			.ok_or_else(|| Error::ValidationError(format!("Unknown setting: {}", key)))?;

		if def.scope == SettingScope::System {
			warn!("Refusing runtime change of system setting '{}'", key);
			return Err(Error::PermissionDenied);
		}

		def.validate(&value)?;

		let json_value = serde_json::to_value(&value)
			.map_err(|e| Error::ValidationError(format!("Failed to serialize setting: {}", e)))?;
		self.store.update_setting(key, Some(json_value)).await?;
		self.cache.invalidate(key);

		info!("Setting '{}' updated", key);
		Ok(())
	}

	/// Remove a stored value (falls back to override or default)
	pub async fn delete(&self, key: &str) -> ClResult<()> {
		self.store.update_setting(key, None).await?;
		self.cache.invalidate(key);

		info!("Setting '{}' reset", key);
		Ok(())
	}

	/// Validate that all required settings (no default and not optional) are configured
	pub async fn validate_required_settings(&self) -> ClResult<()> {
		for def in self.registry.list() {
			if def.optional || def.default.is_some() || self.overrides.contains_key(&def.key) {
				continue;
			}

			if def.scope == SettingScope::System || self.store.read_setting(&def.key).await?.is_none()
			{
				return Err(Error::ValidationError(format!(
					"Required setting '{}' is not configured",
					def.key
				)));
			}
		}
		Ok(())
	}

	pub async fn get_string(&self, key: &str) -> ClResult<String> {
		match self.get(key).await? {
			SettingValue::String(s) => Ok(s),
			v => Err(type_error(key, "a string", &v)),
		}
	}

	pub async fn get_int(&self, key: &str) -> ClResult<i64> {
		match self.get(key).await? {
			SettingValue::Int(i) => Ok(i),
			v => Err(type_error(key, "an integer", &v)),
		}
	}

	pub async fn get_bool(&self, key: &str) -> ClResult<bool> {
		match self.get(key).await? {
			SettingValue::Bool(b) => Ok(b),
			v => Err(type_error(key, "a boolean", &v)),
		}
	}

	pub async fn get_json(&self, key: &str) -> ClResult<serde_json::Value> {
		match self.get(key).await? {
			SettingValue::Json(j) => Ok(j),
			v => Err(type_error(key, "JSON", &v)),
		}
	}

	/// Returns None when the setting is optional and unconfigured
	pub async fn get_string_opt(&self, key: &str) -> ClResult<Option<String>> {
		match self.get(key).await {
			Ok(SettingValue::String(s)) => Ok(Some(s)),
			Ok(v) => Err(type_error(key, "a string", &v)),
			Err(Error::ValidationError(msg)) if msg.contains("has no default") => Ok(None),
			Err(e) => Err(e),
		}
	}

	/// Integer setting converted to the caller's numeric type
	pub async fn get_num<T: TryFrom<i64>>(&self, key: &str) -> ClResult<T> {
		let value = self.get_int(key).await?;
		T::try_from(value)
			.map_err(|_| Error::ValidationError(format!("Setting '{}' is out of range", key)))
	}

	pub fn registry(&self) -> &Arc<FrozenSettingsRegistry> {
		&self.registry
	}
}

fn type_error(key: &str, expected: &str, got: &SettingValue) -> Error {
	Error::ValidationError(format!("Setting '{}' is not {}, got {}", key, expected, got.type_name()))
}

// vim: ts=4
