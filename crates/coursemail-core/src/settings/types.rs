//! Settings types and definitions

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;

use crate::prelude::*;

/// Setting scope defines where a setting value may come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingScope {
	/// Startup configuration only (environment or default), cannot be changed at runtime
	System,
	/// Stored in the database, changeable through the settings API
	Global,
}

/// Setting value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)] // No type tag - type inferred from SettingDefinition
pub enum SettingValue {
	Bool(bool), // Must be before Int to avoid bool -> int coercion
	Int(i64),
	String(String),
	Json(serde_json::Value),
}

impl SettingValue {
	/// Check if this value matches the type of another value
	pub fn matches_type(&self, other: &SettingValue) -> bool {
		matches!(
			(self, other),
			(SettingValue::String(_), SettingValue::String(_))
				| (SettingValue::Int(_), SettingValue::Int(_))
				| (SettingValue::Bool(_), SettingValue::Bool(_))
				| (SettingValue::Json(_), SettingValue::Json(_))
		)
	}

	/// Get the type name for error messages
	pub fn type_name(&self) -> &'static str {
		match self {
			SettingValue::String(_) => "string",
			SettingValue::Int(_) => "int",
			SettingValue::Bool(_) => "bool",
			SettingValue::Json(_) => "json",
		}
	}

	/// Convert a raw environment string to the type of `like`
	pub fn parse_as(raw: &str, like: &SettingValue) -> ClResult<SettingValue> {
		match like {
			SettingValue::String(_) => Ok(SettingValue::String(raw.to_string())),
			SettingValue::Int(_) => raw
				.trim()
				.parse()
				.map(SettingValue::Int)
				.map_err(|_| Error::ConfigError(format!("expected an integer, got '{}'", raw))),
			SettingValue::Bool(_) => match raw.trim().to_ascii_lowercase().as_str() {
				"1" | "true" | "yes" | "on" => Ok(SettingValue::Bool(true)),
				"0" | "false" | "no" | "off" => Ok(SettingValue::Bool(false)),
				_ => Err(Error::ConfigError(format!("expected a boolean, got '{}'", raw))),
			},
			SettingValue::Json(_) => serde_json::from_str(raw)
				.map(SettingValue::Json)
				.map_err(|e| Error::ConfigError(format!("invalid JSON: {}", e))),
		}
	}
}

/// Check run on defaults at registration and on every stored or overridden value
pub struct Validator(Box<dyn Fn(&SettingValue) -> ClResult<()> + Send + Sync>);

impl Validator {
	pub fn check(&self, value: &SettingValue) -> ClResult<()> {
		(self.0)(value)
	}
}

impl Debug for Validator {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str("Validator")
	}
}

/// One registered setting
#[derive(Debug)]
pub struct SettingDefinition {
	/// Dot-separated key, e.g. `dispatch.batch_size`
	pub key: String,
	pub description: String,
	/// Also fixes the value type. Without a default the setting must be
	/// configured unless `optional` is set.
	pub default: Option<SettingValue>,
	pub scope: SettingScope,
	pub optional: bool,
	/// Masked by the settings API
	pub secret: bool,
	pub validator: Option<Validator>,
}

impl SettingDefinition {
	pub fn builder(key: impl Into<String>) -> SettingDefinitionBuilder {
		SettingDefinitionBuilder {
			def: SettingDefinition {
				key: key.into(),
				description: String::new(),
				default: None,
				scope: SettingScope::Global,
				optional: false,
				secret: false,
				validator: None,
			},
		}
	}

	/// Type check against the default, then the validator
	pub fn validate(&self, value: &SettingValue) -> ClResult<()> {
		if let Some(default) = &self.default
			&& !value.matches_type(default)
		{
			return Err(Error::ValidationError(format!(
				"Type mismatch for setting '{}': expected {}, got {}",
				self.key,
				default.type_name(),
				value.type_name()
			)));
		}
		self.validator.as_ref().map_or(Ok(()), |v| v.check(value))
	}
}

pub struct SettingDefinitionBuilder {
	def: SettingDefinition,
}

impl SettingDefinitionBuilder {
	pub fn description(mut self, description: impl Into<String>) -> Self {
		self.def.description = description.into();
		self
	}

	pub fn default(mut self, value: SettingValue) -> Self {
		self.def.default = Some(value);
		self
	}

	pub fn scope(mut self, scope: SettingScope) -> Self {
		self.def.scope = scope;
		self
	}

	/// May stay unconfigured without a default
	pub fn optional(mut self) -> Self {
		self.def.optional = true;
		self
	}

	pub fn secret(mut self) -> Self {
		self.def.secret = true;
		self
	}

	pub fn validator<F>(mut self, f: F) -> Self
	where
		F: Fn(&SettingValue) -> ClResult<()> + Send + Sync + 'static,
	{
		self.def.validator = Some(Validator(Box::new(f)));
		self
	}

	/// Fails without a description or when the default does not validate
	pub fn build(self) -> ClResult<SettingDefinition> {
		let def = self.def;
		if def.description.trim().is_empty() {
			return Err(Error::ConfigError(format!("Setting '{}' needs a description", def.key)));
		}
		if let (Some(default), Some(validator)) = (&def.default, &def.validator) {
			validator.check(default).map_err(|e| {
				Error::ConfigError(format!("Default of '{}' fails validation: {}", def.key, e))
			})?;
		}
		Ok(def)
	}
}

/// Collects definitions from every module during startup
#[derive(Debug, Default)]
pub struct SettingsRegistry {
	definitions: BTreeMap<String, SettingDefinition>,
}

impl SettingsRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(&mut self, def: SettingDefinition) -> ClResult<()> {
		if self.definitions.contains_key(&def.key) {
			return Err(Error::ConfigError(format!("Setting '{}' is already registered", def.key)));
		}
		debug!(key = %def.key, scope = ?def.scope, "Setting registered");
		self.definitions.insert(def.key.clone(), def);
		Ok(())
	}

	pub fn freeze(self) -> FrozenSettingsRegistry {
		info!("Settings registry frozen with {} definitions", self.definitions.len());
		FrozenSettingsRegistry { definitions: self.definitions }
	}

	pub fn len(&self) -> usize {
		self.definitions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.definitions.is_empty()
	}
}

/// Read-only view shared through the app state
#[derive(Debug)]
pub struct FrozenSettingsRegistry {
	definitions: BTreeMap<String, SettingDefinition>,
}

impl FrozenSettingsRegistry {
	pub fn get(&self, key: &str) -> Option<&SettingDefinition> {
		self.definitions.get(key)
	}

	/// Ordered by key
	pub fn list(&self) -> Vec<&SettingDefinition> {
		self.definitions.values().collect()
	}
}


// vim: ts=4
