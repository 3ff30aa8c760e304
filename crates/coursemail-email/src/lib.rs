//! Email delivery for the coursemail pipeline
//!
//! This crate provides:
//! - Placeholder template rendering
//! - SMTP sending with lettre, with a fallback port
//! - The queue dispatch pass and its periodic task
//! - The attendance sheet absence mailer
//! - Configuration via the global settings module

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod attendance;
pub mod dispatch;
pub mod sender;
pub mod settings;
pub mod template;

pub use dispatch::{DispatchOptions, DispatchReport, DispatchTask};
pub use sender::{EmailMessage, EmailSender, MailTransport, SendReceipt};
pub use template::{MissingKey, TemplateEngine};

mod prelude;

use std::sync::Arc;
use std::time::Duration;

use coursemail_core::scheduler::RetryPolicy;
use coursemail_core::settings::{SettingsRegistry, SettingsService};

use crate::attendance::AttendanceReport;
use crate::prelude::*;

/// Email module - main orchestrator for email operations
pub struct EmailModule {
	pub settings: Arc<SettingsService>,
	pub template_engine: Arc<TemplateEngine>,
	pub transport: Arc<dyn MailTransport>,
}

impl EmailModule {
	/// Module delivering over SMTP
	pub fn new(settings: Arc<SettingsService>) -> ClResult<Self> {
		let transport = Arc::new(EmailSender::new(settings.clone()));
		Self::with_transport(settings, transport)
	}

	pub fn with_transport(
		settings: Arc<SettingsService>,
		transport: Arc<dyn MailTransport>,
	) -> ClResult<Self> {
		let template_engine = Arc::new(TemplateEngine::new(MissingKey::Blank)?);
		Ok(Self { settings, template_engine, transport })
	}

	/// Run one dispatch pass now with the current settings
	pub async fn dispatch_now(&self, app: &App) -> ClResult<DispatchReport> {
		let opts = DispatchOptions::load(&self.settings).await?;
		dispatch::dispatch_due(
			app.queue_adapter.as_ref(),
			self.transport.as_ref(),
			&self.template_engine,
			&opts,
			Timestamp::now(),
		)
		.await
	}

	/// `ServiceUnavailable` unless direct sends can go out
	pub async fn ensure_available(&self) -> ClResult<()> {
		if !self.settings.get_bool("email.enabled").await? {
			return Err(Error::ServiceUnavailable("email delivery is disabled".into()));
		}
		self.transport.check_ready().await
	}

	/// Send immediately, bypassing the queue
	pub async fn send_now(&self, message: &EmailMessage) -> ClResult<SendReceipt> {
		self.ensure_available().await?;
		self.transport.send(message).await
	}

	/// Parse an attendance CSV and mail every absentee
	pub async fn send_attendance(&self, app: &App, csv: &[u8]) -> ClResult<AttendanceReport> {
		let sheet = attendance::parse_attendance(csv)?;
		self.ensure_available().await?;
		info!(
			absentees = sheet.absentees.len(),
			dates = sheet.date_columns.len(),
			"Attendance sheet parsed"
		);
		attendance::send_absence_notifications(
			app.queue_adapter.as_ref(),
			self.transport.as_ref(),
			&self.template_engine,
			&sheet,
		)
		.await
	}
}

pub fn register_settings(registry: &mut SettingsRegistry) -> ClResult<()> {
	settings::register_settings(registry)
}

/// Register the periodic dispatch task with the scheduler
pub async fn init(app: &App) -> ClResult<()> {
	let poll_seconds: u64 = app.settings.get_num("dispatch.poll_seconds").await?;
	app.scheduler
		.task(Arc::new(DispatchTask))
		.every(Duration::from_secs(poll_seconds))
		.immediately()
		.with_retry(RetryPolicy::new((5, 60), 2))
		.register()?;
	Ok(())
}

// vim: ts=4
