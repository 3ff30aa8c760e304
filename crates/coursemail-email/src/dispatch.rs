//! Queue dispatch
//!
//! One pass recovers stale rows, claims due rows atomically, and hands each
//! claimed row to the transport at most once. The claim token decides which
//! pass may record the outcome; a row whose outcome cannot be recorded stays
//! `processing` until stale recovery picks it up.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use coursemail_core::scheduler::{RetryPolicy, Task};
use coursemail_core::settings::SettingsService;
use coursemail_types::queue_adapter::{ClaimOptions, DeliveryOutcome, QueueAdapter, ScheduledEmail};

use crate::EmailModule;
use crate::prelude::*;
use crate::sender::{EmailAttachment, EmailMessage, MailTransport};
use crate::template::TemplateEngine;

#[derive(Debug, Clone)]
pub struct DispatchOptions {
	pub enabled: bool,
	pub batch_size: u32,
	pub max_attempts: u16,
	pub throttle: Duration,
	pub retry: RetryPolicy,
	pub stale_after_secs: i64,
}

impl Default for DispatchOptions {
	fn default() -> Self {
		Self {
			enabled: true,
			batch_size: 50,
			max_attempts: 5,
			throttle: Duration::ZERO,
			retry: RetryPolicy::new((60, 3600), 5),
			stale_after_secs: 600,
		}
	}
}

impl DispatchOptions {
	pub async fn load(settings: &SettingsService) -> ClResult<Self> {
		let max_attempts = settings.get_num("dispatch.max_attempts").await?;
		Ok(Self {
			enabled: settings.get_bool("email.enabled").await?,
			batch_size: settings.get_num("dispatch.batch_size").await?,
			max_attempts,
			throttle: Duration::from_millis(settings.get_num("dispatch.throttle_ms").await?),
			retry: RetryPolicy::new(
				(
					settings.get_num("dispatch.retry_min_seconds").await?,
					settings.get_num("dispatch.retry_max_seconds").await?,
				),
				max_attempts,
			),
			stale_after_secs: settings.get_int("dispatch.stale_after_seconds").await?,
		})
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
	pub recovered: u64,
	pub claimed: usize,
	pub sent: usize,
	pub failed: usize,
	/// Claimed rows another pass took over before this one reached them
	pub skipped: usize,
	/// Queue updates that could not be written
	pub errors: usize,
}

/// Convert a queue row into a transport message
fn to_message(engine: &TemplateEngine, email: &ScheduledEmail) -> ClResult<EmailMessage> {
	let attachment = match (&email.attachment_name, &email.attachment_data) {
		(Some(name), Some(data)) => Some(EmailAttachment {
			filename: name.to_string(),
			content: STANDARD
				.decode(data.trim())
				.map_err(|e| Error::ValidationError(format!("invalid attachment encoding: {}", e)))?,
		}),
		_ => None,
	};

	Ok(EmailMessage {
		to: email.recipient_email.trim().to_string(),
		subject: email.subject.to_string(),
		html_body: email.body_html.to_string(),
		text_body: engine.html_to_text(&email.body_html),
		attachment,
	})
}

async fn deliver(
	engine: &TemplateEngine,
	transport: &dyn MailTransport,
	email: &ScheduledEmail,
) -> ClResult<Option<Box<str>>> {
	if !email.recipient_email.contains('@') {
		return Err(Error::ValidationError(format!(
			"Invalid recipient address: {}",
			email.recipient_email
		)));
	}
	let message = to_message(engine, email)?;
	let receipt = transport.send(&message).await?;
	Ok(Some(receipt.message_id.into()))
}

fn retry_at(opts: &DispatchOptions, email: &ScheduledEmail, now: Timestamp) -> Option<Timestamp> {
	// retry_count already includes this attempt
	(email.retry_count < opts.max_attempts).then(|| {
		let backoff = opts.retry.calculate_backoff(email.retry_count.saturating_sub(1));
		now.add_seconds(i64::try_from(backoff).unwrap_or(i64::MAX))
	})
}

/// Store a delivery result, once more on a database error. Returns false when
/// the result was not written.
async fn record(
	adapter: &dyn QueueAdapter,
	email: &ScheduledEmail,
	claim_token: &str,
	outcome: &DeliveryOutcome,
	report: &mut DispatchReport,
) -> bool {
	let mut res = adapter.complete_delivery(email.id, claim_token, outcome).await;
	if res.is_err() {
		res = adapter.complete_delivery(email.id, claim_token, outcome).await;
	}
	match res {
		Ok(true) => true,
		Ok(false) => {
			warn!(id = email.id, "Queued email was taken over by another dispatch pass");
			false
		}
		Err(err) => {
			report.errors += 1;
			error!(id = email.id, ?outcome, "Cannot record delivery result: {}", err);
			false
		}
	}
}

/// Run one dispatch pass at `now`
///
/// Each row is re-checked against its claim right before sending. A row whose
/// claim was lost to stale recovery is skipped, never sent twice. Errors while
/// updating one row are logged and counted, and the pass carries on.
pub async fn dispatch_due(
	adapter: &dyn QueueAdapter,
	transport: &dyn MailTransport,
	engine: &TemplateEngine,
	opts: &DispatchOptions,
	now: Timestamp,
) -> ClResult<DispatchReport> {
	let mut report = DispatchReport::default();
	if !opts.enabled {
		debug!("Email delivery disabled, dispatch pass skipped");
		return Ok(report);
	}

	let interrupted_retry_at =
		now.add_seconds(i64::try_from(opts.retry.calculate_backoff(0)).unwrap_or(i64::MAX));
	report.recovered = adapter
		.requeue_stale_emails(now.add_seconds(-opts.stale_after_secs), interrupted_retry_at)
		.await?;
	if report.recovered > 0 {
		warn!(count = report.recovered, "Recovered interrupted deliveries");
	}

	let claimed = adapter
		.claim_due_emails(&ClaimOptions {
			now,
			limit: opts.batch_size,
			max_attempts: opts.max_attempts,
		})
		.await?;
	report.claimed = claimed.len();
	if claimed.is_empty() {
		return Ok(report);
	}
	info!(count = claimed.len(), "Claimed due emails");

	// pass clock, advances with real time from `now`
	let started = Instant::now();
	let clock = || now.add_seconds(i64::try_from(started.elapsed().as_secs()).unwrap_or(i64::MAX));

	for (idx, email) in claimed.iter().enumerate() {
		if idx > 0 && !opts.throttle.is_zero() {
			tokio::time::sleep(opts.throttle).await;
		}
		let Some(claim_token) = email.claim_token.as_deref() else {
			warn!(id = email.id, "Claimed email has no claim token, skipped");
			report.skipped += 1;
			continue;
		};

		match adapter.start_delivery(email.id, claim_token, clock()).await {
			Ok(true) => {}
			Ok(false) => {
				info!(id = email.id, "Queued email taken over by another dispatch pass, skipped");
				report.skipped += 1;
				continue;
			}
			Err(err) => {
				error!(id = email.id, "Cannot start delivery: {}", err);
				report.errors += 1;
				// Nothing went out, so hand the row back for a later pass
				let outcome = DeliveryOutcome::Failed {
					error: format!("cannot start delivery: {}", err),
					next_attempt_at: retry_at(opts, email, clock()),
				};
				record(adapter, email, claim_token, &outcome, &mut report).await;
				continue;
			}
		}

		match deliver(engine, transport, email).await {
			Ok(message_id) => {
				report.sent += 1;
				info!(id = email.id, to = %email.recipient_email, "Queued email delivered");
				let outcome = DeliveryOutcome::Sent { message_id, sent_at: Timestamp::now() };
				record(adapter, email, claim_token, &outcome, &mut report).await;
			}
			Err(err) => {
				report.failed += 1;
				let next_attempt_at = retry_at(opts, email, clock());
				warn!(
					id = email.id,
					to = %email.recipient_email,
					attempt = email.retry_count,
					retry_at = ?next_attempt_at,
					"Queued email failed: {}",
					err
				);
				let outcome = DeliveryOutcome::Failed { error: err.to_string(), next_attempt_at };
				record(adapter, email, claim_token, &outcome, &mut report).await;
			}
		}
	}

	Ok(report)
}

/// Periodic dispatch task
#[derive(Debug, Default)]
pub struct DispatchTask;

#[async_trait]
impl Task<App> for DispatchTask {
	fn kind_of(&self) -> &'static str {
		"email.dispatch"
	}

	async fn run(&self, app: &App) -> ClResult<()> {
		let module = app.ext::<Arc<EmailModule>>()?;
		let report = module.dispatch_now(app).await?;
		if report.claimed > 0 {
			info!(
				sent = report.sent,
				failed = report.failed,
				skipped = report.skipped,
				errors = report.errors,
				"Dispatch pass finished"
			);
		}
		Ok(())
	}
}


// vim: ts=4
