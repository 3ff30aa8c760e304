//! Settings subsystem: a registry of typed definitions frozen at startup,
//! resolved at runtime through [`SettingsService`].

pub mod service;
pub mod types;

pub use service::SettingsService;
pub use types::{
	FrozenSettingsRegistry, SettingDefinition, SettingScope, SettingValue, SettingsRegistry,
};

// vim: ts=4
