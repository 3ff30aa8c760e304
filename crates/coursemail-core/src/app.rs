//! App state type

use std::sync::Arc;

use crate::extensions::Extensions;
use crate::prelude::*;
use crate::scheduler;
use crate::settings::{FrozenSettingsRegistry, SettingsService};

use coursemail_types::queue_adapter::QueueAdapter;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct AppState {
	pub scheduler: Arc<scheduler::Scheduler<App>>,
	pub opts: AppBuilderOpts,

	pub queue_adapter: Arc<dyn QueueAdapter>,

	// Settings subsystem
	pub settings: Arc<SettingsService>,
	pub settings_registry: Arc<FrozenSettingsRegistry>,

	// Type-erased extension map for feature-specific state
	pub extensions: Extensions,
}

impl AppState {
	/// Get a registered extension by type. Returns error if not found.
	pub fn ext<T: Send + Sync + 'static>(&self) -> ClResult<&T> {
		self.extensions.get::<T>().ok_or_else(|| {
			Error::Internal(format!("Extension {} not registered", std::any::type_name::<T>()))
		})
	}
}

pub type App = Arc<AppState>;

#[derive(Debug, Clone)]
pub struct AppBuilderOpts {
	pub listen: Box<str>,
	/// Capacity of the settings LRU cache
	pub settings_cache_size: usize,
}

impl Default for AppBuilderOpts {
	fn default() -> Self {
		Self { listen: "127.0.0.1:3000".into(), settings_cache_size: 256 }
	}
}

// vim: ts=4
