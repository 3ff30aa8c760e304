//! App builder - constructs and runs the coursemail application

use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc};

use crate::prelude::*;
use crate::routes;
pub use coursemail_core::app::{App, AppBuilderOpts, AppState, VERSION};
use coursemail_core::extensions::Extensions;
use coursemail_core::scheduler;
use coursemail_core::settings::{SettingsRegistry, SettingsService};
use coursemail_email::{EmailModule, MailTransport};
use coursemail_planner::Planner;
use coursemail_types::queue_adapter::QueueAdapter;

/// Type alias for async initialization callbacks
type InitCallback =
	Box<dyn FnOnce(App) -> Pin<Box<dyn Future<Output = ClResult<()>> + Send>> + Send>;

pub struct AppBuilder {
	opts: AppBuilderOpts,
	queue_adapter: Option<Arc<dyn QueueAdapter>>,
	transport: Option<Arc<dyn MailTransport>>,
	setting_overrides: HashMap<String, String>,
	on_init: Vec<InitCallback>,
}

impl AppBuilder {
	pub fn new() -> Self {
		// A second builder in the same process keeps the first subscriber
		let _ = tracing_subscriber::fmt()
			.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
			.with_target(false)
			.try_init();
		AppBuilder {
			opts: AppBuilderOpts::default(),
			queue_adapter: None,
			transport: None,
			setting_overrides: HashMap::new(),
			on_init: Vec::new(),
		}
	}

	// Opts
	pub fn listen(&mut self, listen: impl Into<Box<str>>) -> &mut Self {
		self.opts.listen = listen.into();
		self
	}
	pub fn settings_cache_size(&mut self, size: usize) -> &mut Self {
		self.opts.settings_cache_size = size;
		self
	}

	/// Startup value for a registered setting, parsed to the setting's type
	pub fn setting_override(
		&mut self,
		key: impl Into<String>,
		value: impl Into<String>,
	) -> &mut Self {
		self.setting_overrides.insert(key.into(), value.into());
		self
	}

	// Adapters
	pub fn queue_adapter(&mut self, queue_adapter: Arc<dyn QueueAdapter>) -> &mut Self {
		self.queue_adapter = Some(queue_adapter);
		self
	}

	/// Replace SMTP delivery, e.g. with a recording transport
	pub fn transport(&mut self, transport: Arc<dyn MailTransport>) -> &mut Self {
		self.transport = Some(transport);
		self
	}

	/// Register an async initialization callback that runs after App is created
	/// but before the scheduler starts.
	pub fn on_init<F, Fut>(&mut self, f: F) -> &mut Self
	where
		F: FnOnce(App) -> Fut + Send + 'static,
		Fut: Future<Output = ClResult<()>> + Send + 'static,
	{
		self.on_init.push(Box::new(move |app| Box::pin(f(app))));
		self
	}

	/// Create the app state and register periodic tasks without serving
	pub async fn build(self) -> ClResult<App> {
		let Some(queue_adapter) = self.queue_adapter else {
			error!("FATAL: No queue adapter configured");
			return Err(Error::Internal("No queue adapter configured".to_string()));
		};

		// Initialize settings registry and service
		let mut settings_registry = SettingsRegistry::new();
		coursemail_email::register_settings(&mut settings_registry)?;
		coursemail_planner::register_settings(&mut settings_registry)?;
		info!("Registered {} settings", settings_registry.len());

		let frozen_registry = Arc::new(settings_registry.freeze());
		let settings_service = Arc::new(SettingsService::new(
			frozen_registry.clone(),
			queue_adapter.clone(),
			self.setting_overrides,
			self.opts.settings_cache_size,
		)?);
		settings_service.validate_required_settings().await?;
		info!("Settings subsystem initialized and validated");

		let email_module = Arc::new(match self.transport {
			Some(transport) => EmailModule::with_transport(settings_service.clone(), transport)?,
			None => EmailModule::new(settings_service.clone())?,
		});
		let planner = Arc::new(Planner::new(queue_adapter.clone())?);

		// Build extensions map for feature-specific state
		let mut extensions = Extensions::new();
		extensions.insert(email_module);
		extensions.insert(planner);

		let app: App = Arc::new(AppState {
			scheduler: scheduler::Scheduler::new(),
			opts: self.opts,
			queue_adapter,
			settings: settings_service,
			settings_registry: frozen_registry,
			extensions,
		});

		// Init modules
		coursemail_email::init(&app).await?;
		coursemail_planner::init(&app).await?;

		for callback in self.on_init {
			callback(app.clone()).await?;
		}

		Ok(app)
	}

	pub async fn run(self) -> ClResult<()> {
		info!("coursemail V{}", VERSION);

		let app = self.build().await?;
		let router = routes::init(app.clone());

		app.scheduler.start(app.clone());

		let listener = tokio::net::TcpListener::bind(app.opts.listen.as_ref()).await.map_err(|e| {
			error!("FATAL: Cannot listen on {}: {}", app.opts.listen, e);
			e
		})?;
		info!("Listening on HTTP {}", app.opts.listen);

		let res = axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await;
		app.scheduler.shutdown();
		info!("Shut down");
		Ok(res?)
	}
}

impl Default for AppBuilder {
	fn default() -> Self {
		Self::new()
	}
}

async fn shutdown_signal() {
	if let Err(e) = tokio::signal::ctrl_c().await {
		warn!("Cannot listen for Ctrl-C: {}", e);
		std::future::pending::<()>().await;
	}
	info!("Shutdown requested");
}

// vim: ts=4
