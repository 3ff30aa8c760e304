//! Dispatch and attendance tests
//!
//! A recording transport stands in for SMTP; the queue is a temporary SQLite
//! database.

use async_trait::async_trait;
use coursemail_email::attendance::{self, DeliveryStatus};
use coursemail_email::dispatch::{DispatchOptions, dispatch_due};
use coursemail_email::sender::{EmailMessage, MailTransport, SendReceipt};
use coursemail_email::template::{MissingKey, TemplateEngine};
use coursemail_queue_adapter_sqlite::QueueAdapterSqlite;
use coursemail_types::error::{ClResult, Error};
use coursemail_types::queue_adapter::{
	ClaimOptions, CreateTemplate, DeliveryOutcome, EmailStatus, EnqueueResult, Learner,
	ListEmailOptions, ListTemplateOptions, ListTopicOptions, NewScheduledEmail, PlannerTopic,
	QueueAdapter, ScheduledEmail, Template, TemplateCategory, UpdateTemplate,
};
use coursemail_types::types::Timestamp;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Debug, Default)]
struct RecordingTransport {
	sent: Mutex<Vec<EmailMessage>>,
	fail_for: HashSet<String>,
}

impl RecordingTransport {
	fn failing(recipients: &[&str]) -> Self {
		Self { fail_for: recipients.iter().map(|r| (*r).to_string()).collect(), ..Self::default() }
	}

	fn sent(&self) -> Vec<EmailMessage> {
		self.sent.lock().clone()
	}
}

#[async_trait]
impl MailTransport for RecordingTransport {
	async fn send(&self, message: &EmailMessage) -> ClResult<SendReceipt> {
		if self.fail_for.contains(&message.to) {
			return Err(Error::ServiceUnavailable("SMTP send failed: connection refused".into()));
		}
		let mut sent = self.sent.lock();
		sent.push(message.clone());
		Ok(SendReceipt { message_id: format!("<{}@test>", sent.len()) })
	}
}

/// Transport that takes a while per message
#[derive(Debug)]
struct SlowTransport {
	delay: Duration,
	sent: Mutex<Vec<String>>,
}

#[async_trait]
impl MailTransport for SlowTransport {
	async fn send(&self, message: &EmailMessage) -> ClResult<SendReceipt> {
		tokio::time::sleep(self.delay).await;
		let mut sent = self.sent.lock();
		sent.push(message.to.clone());
		Ok(SendReceipt { message_id: format!("<{}@slow>", sent.len()) })
	}
}

/// SQLite queue whose delivery bookkeeping fails on demand
#[derive(Debug)]
struct FlakyQueue {
	inner: QueueAdapterSqlite,
	fail_start: HashSet<i64>,
	/// Remaining `complete_delivery` failures per row
	fail_complete: Mutex<HashMap<i64, u32>>,
}

#[async_trait]
impl QueueAdapter for FlakyQueue {
	async fn list_templates(&self, opts: &ListTemplateOptions) -> ClResult<Vec<Template>> {
		self.inner.list_templates(opts).await
	}
	async fn read_template(&self, template_id: i64) -> ClResult<Template> {
		self.inner.read_template(template_id).await
	}
	async fn create_template(&self, template: &CreateTemplate) -> ClResult<i64> {
		self.inner.create_template(template).await
	}
	async fn update_template(&self, template_id: i64, patch: &UpdateTemplate) -> ClResult<()> {
		self.inner.update_template(template_id, patch).await
	}
	async fn delete_template(&self, template_id: i64) -> ClResult<()> {
		self.inner.delete_template(template_id).await
	}
	async fn read_batch_start_date(&self, batch_no: &str) -> ClResult<Option<Box<str>>> {
		self.inner.read_batch_start_date(batch_no).await
	}
	async fn list_planner_topics(&self, opts: &ListTopicOptions) -> ClResult<Vec<PlannerTopic>> {
		self.inner.list_planner_topics(opts).await
	}
	async fn list_trainer_emails(&self, batch_no: &str) -> ClResult<Vec<Box<str>>> {
		self.inner.list_trainer_emails(batch_no).await
	}
	async fn list_learners(&self, batch_no: &str) -> ClResult<Vec<Learner>> {
		self.inner.list_learners(batch_no).await
	}
	async fn read_batch_form_url(&self, batch_no: &str) -> ClResult<Option<Box<str>>> {
		self.inner.read_batch_form_url(batch_no).await
	}
	async fn add_planner_topic(&self, topic: &PlannerTopic) -> ClResult<()> {
		self.inner.add_planner_topic(topic).await
	}
	async fn add_learner(&self, learner: &Learner) -> ClResult<()> {
		self.inner.add_learner(learner).await
	}
	async fn set_batch_form_url(&self, batch_no: &str, form_url: &str) -> ClResult<()> {
		self.inner.set_batch_form_url(batch_no, form_url).await
	}
	async fn update_learner_email(
		&self,
		batch_no: &str,
		old_email: &str,
		new_email: &str,
	) -> ClResult<u64> {
		self.inner.update_learner_email(batch_no, old_email, new_email).await
	}
	async fn enqueue_email(&self, email: &NewScheduledEmail) -> ClResult<EnqueueResult> {
		self.inner.enqueue_email(email).await
	}
	async fn list_emails(&self, opts: &ListEmailOptions) -> ClResult<Vec<ScheduledEmail>> {
		self.inner.list_emails(opts).await
	}
	async fn count_emails(&self, opts: &ListEmailOptions) -> ClResult<u64> {
		self.inner.count_emails(opts).await
	}
	async fn read_email(&self, id: i64) -> ClResult<ScheduledEmail> {
		self.inner.read_email(id).await
	}
	async fn claim_due_emails(&self, opts: &ClaimOptions) -> ClResult<Vec<ScheduledEmail>> {
		self.inner.claim_due_emails(opts).await
	}
	async fn start_delivery(&self, id: i64, claim_token: &str, now: Timestamp) -> ClResult<bool> {
		if self.fail_start.contains(&id) {
			return Err(Error::DbError);
		}
		self.inner.start_delivery(id, claim_token, now).await
	}
	async fn complete_delivery(
		&self,
		id: i64,
		claim_token: &str,
		outcome: &DeliveryOutcome,
	) -> ClResult<bool> {
		let fail = match self.fail_complete.lock().get_mut(&id) {
			Some(left) if *left > 0 => {
				*left -= 1;
				true
			}
			_ => false,
		};
		if fail {
			return Err(Error::DbError);
		}
		self.inner.complete_delivery(id, claim_token, outcome).await
	}
	async fn mark_email_sent(
		&self,
		id: i64,
		message_id: Option<&str>,
		sent_at: Timestamp,
	) -> ClResult<()> {
		self.inner.mark_email_sent(id, message_id, sent_at).await
	}
	async fn mark_email_failed(
		&self,
		id: i64,
		error: &str,
		next_attempt_at: Option<Timestamp>,
	) -> ClResult<()> {
		self.inner.mark_email_failed(id, error, next_attempt_at).await
	}
	async fn requeue_stale_emails(
		&self,
		older_than: Timestamp,
		retry_at: Timestamp,
	) -> ClResult<u64> {
		self.inner.requeue_stale_emails(older_than, retry_at).await
	}
	async fn requeue_failed_emails(
		&self,
		batch_no: Option<&str>,
		scheduled_at: Timestamp,
	) -> ClResult<u64> {
		self.inner.requeue_failed_emails(batch_no, scheduled_at).await
	}
	async fn update_email_recipient(&self, id: i64, recipient_email: &str) -> ClResult<()> {
		self.inner.update_email_recipient(id, recipient_email).await
	}
	async fn update_email_content(
		&self,
		id: i64,
		recipient_email: &str,
		subject: &str,
		body_html: &str,
	) -> ClResult<()> {
		self.inner.update_email_content(id, recipient_email, subject, body_html).await
	}
	async fn list_settings(&self) -> ClResult<HashMap<String, serde_json::Value>> {
		self.inner.list_settings().await
	}
	async fn read_setting(&self, name: &str) -> ClResult<Option<serde_json::Value>> {
		self.inner.read_setting(name).await
	}
	async fn update_setting(&self, name: &str, value: Option<serde_json::Value>) -> ClResult<()> {
		self.inner.update_setting(name, value).await
	}
}

async fn create_test_adapter() -> (QueueAdapterSqlite, TempDir) {
	let temp_dir = TempDir::new().expect("Failed to create temp directory");
	let adapter = QueueAdapterSqlite::new(temp_dir.path()).await.expect("Failed to create adapter");
	(adapter, temp_dir)
}

fn engine() -> TemplateEngine {
	TemplateEngine::new(MissingKey::Blank).unwrap()
}

fn opts() -> DispatchOptions {
	DispatchOptions { max_attempts: 3, ..DispatchOptions::default() }
}

async fn enqueue(adapter: &QueueAdapterSqlite, recipient: &str, scheduled_at: i64) -> i64 {
	let res = adapter
		.enqueue_email(&NewScheduledEmail {
			batch_no: "PDFT-101".into(),
			recipient_email: recipient.into(),
			recipient_name: Some("Jane".into()),
			template_id: None,
			template_name: "Welcome".into(),
			category: TemplateCategory::Learner,
			user_role: None,
			subject: "Welcome to PDFT-101".into(),
			body_html: "<p>Dear Jane,</p><p>Welcome aboard.</p>".into(),
			attachment_name: None,
			attachment_data: None,
			scheduled_at: Timestamp(scheduled_at),
		})
		.await
		.unwrap();
	match res {
		EnqueueResult::Inserted(id) => id,
		EnqueueResult::Duplicate => panic!("unexpected duplicate"),
	}
}

#[tokio::test]
async fn test_due_row_is_sent() {
	let (adapter, _tmp) = create_test_adapter().await;
	let transport = RecordingTransport::default();
	let id = enqueue(&adapter, "jane@example.com", 1_000).await;
	let later = enqueue(&adapter, "ravi@example.com", 5_000).await;

	let report = dispatch_due(&adapter, &transport, &engine(), &opts(), Timestamp(2_000))
		.await
		.unwrap();
	assert_eq!(report.claimed, 1);
	assert_eq!(report.sent, 1);

	let sent = transport.sent();
	assert_eq!(sent.len(), 1);
	assert_eq!(sent[0].to, "jane@example.com");
	assert_eq!(sent[0].text_body, "Dear Jane,\nWelcome aboard.");

	let row = adapter.read_email(id).await.unwrap();
	assert_eq!(row.status, EmailStatus::Sent);
	assert_eq!(row.message_id.as_deref(), Some("<1@test>"));
	assert!(row.sent_at.is_some());

	let row = adapter.read_email(later).await.unwrap();
	assert_eq!(row.status, EmailStatus::Scheduled);
}

#[tokio::test]
async fn test_failed_send_is_not_left_processing() {
	let (adapter, _tmp) = create_test_adapter().await;
	let transport = RecordingTransport::failing(&["jane@example.com"]);
	let id = enqueue(&adapter, "jane@example.com", 1_000).await;

	let report = dispatch_due(&adapter, &transport, &engine(), &opts(), Timestamp(2_000))
		.await
		.unwrap();
	assert_eq!(report.failed, 1);

	let row = adapter.read_email(id).await.unwrap();
	assert_eq!(row.status, EmailStatus::Failed);
	assert_eq!(row.retry_count, 1);
	assert!(row.error.as_deref().unwrap_or_default().contains("connection refused"));
	// First backoff is the configured minimum
	assert_eq!(row.next_attempt_at, Some(Timestamp(2_060)));

	// Not due again before the backoff expires
	let report = dispatch_due(&adapter, &transport, &engine(), &opts(), Timestamp(2_030))
		.await
		.unwrap();
	assert_eq!(report.claimed, 0);
}

#[tokio::test]
async fn test_retries_are_bounded() {
	let (adapter, _tmp) = create_test_adapter().await;
	let transport = RecordingTransport::failing(&["jane@example.com"]);
	let id = enqueue(&adapter, "jane@example.com", 1_000).await;

	let mut now = 2_000;
	for _ in 0..3 {
		let report =
			dispatch_due(&adapter, &transport, &engine(), &opts(), Timestamp(now)).await.unwrap();
		assert_eq!(report.claimed, 1);
		now += 10_000;
	}

	let row = adapter.read_email(id).await.unwrap();
	assert_eq!(row.status, EmailStatus::Failed);
	assert_eq!(row.retry_count, 3);
	assert!(row.next_attempt_at.is_none());

	let report =
		dispatch_due(&adapter, &transport, &engine(), &opts(), Timestamp(now)).await.unwrap();
	assert_eq!(report.claimed, 0);
}

#[tokio::test]
async fn test_retry_succeeds_after_backoff() {
	let (adapter, _tmp) = create_test_adapter().await;
	let failing = RecordingTransport::failing(&["jane@example.com"]);
	let id = enqueue(&adapter, "jane@example.com", 1_000).await;

	dispatch_due(&adapter, &failing, &engine(), &opts(), Timestamp(2_000)).await.unwrap();

	let working = RecordingTransport::default();
	let report =
		dispatch_due(&adapter, &working, &engine(), &opts(), Timestamp(2_100)).await.unwrap();
	assert_eq!(report.sent, 1);

	let row = adapter.read_email(id).await.unwrap();
	assert_eq!(row.status, EmailStatus::Sent);
	assert_eq!(row.retry_count, 2);
	assert!(row.error.is_none());
}

#[tokio::test]
async fn test_invalid_recipient_fails_without_sending() {
	let (adapter, _tmp) = create_test_adapter().await;
	let transport = RecordingTransport::default();
	let id = enqueue(&adapter, "jane.example.com", 1_000).await;

	let report = dispatch_due(&adapter, &transport, &engine(), &opts(), Timestamp(2_000))
		.await
		.unwrap();
	assert_eq!(report.failed, 1);
	assert!(transport.sent().is_empty());

	let row = adapter.read_email(id).await.unwrap();
	assert_eq!(row.status, EmailStatus::Failed);
	assert!(row.error.as_deref().unwrap_or_default().contains("Invalid recipient"));
}

#[tokio::test]
async fn test_disabled_delivery_claims_nothing() {
	let (adapter, _tmp) = create_test_adapter().await;
	let transport = RecordingTransport::default();
	let id = enqueue(&adapter, "jane@example.com", 1_000).await;

	let disabled = DispatchOptions { enabled: false, ..opts() };
	let report =
		dispatch_due(&adapter, &transport, &engine(), &disabled, Timestamp(2_000)).await.unwrap();
	assert_eq!(report.claimed, 0);
	assert_eq!(adapter.read_email(id).await.unwrap().status, EmailStatus::Scheduled);
}

#[tokio::test]
async fn test_batch_size_limits_claim() {
	let (adapter, _tmp) = create_test_adapter().await;
	let transport = RecordingTransport::default();
	for i in 0..5 {
		enqueue(&adapter, &format!("learner{}@example.com", i), 1_000 + i).await;
	}

	let small = DispatchOptions { batch_size: 2, ..opts() };
	let report =
		dispatch_due(&adapter, &transport, &engine(), &small, Timestamp(2_000)).await.unwrap();
	assert_eq!(report.sent, 2);
	let to: Vec<_> = transport.sent().into_iter().map(|m| m.to).collect();
	assert_eq!(to, vec!["learner0@example.com", "learner1@example.com"]);
}

#[tokio::test]
async fn test_overlapping_passes_deliver_each_row_once() {
	let (adapter, _tmp) = create_test_adapter().await;
	let ids = [
		enqueue(&adapter, "a@example.com", 1_000).await,
		enqueue(&adapter, "b@example.com", 1_001).await,
		enqueue(&adapter, "c@example.com", 1_002).await,
	];
	let transport = SlowTransport { delay: Duration::from_millis(600), sent: Mutex::default() };
	let (engine, opts) = (engine(), opts());

	// The second pass starts while the first is busy with its first row and,
	// by its own clock, sees everything the first pass holds as stale
	let late = Timestamp(2_000 + opts.stale_after_secs + 1);
	let (first, second) = tokio::join!(
		dispatch_due(&adapter, &transport, &engine, &opts, Timestamp(2_000)),
		async {
			tokio::time::sleep(Duration::from_millis(150)).await;
			dispatch_due(&adapter, &transport, &engine, &opts, late).await
		}
	);
	let (first, second) = (first.unwrap(), second.unwrap());

	let mut sent = transport.sent.lock().clone();
	sent.sort();
	assert_eq!(sent, vec!["a@example.com", "b@example.com", "c@example.com"]);
	assert_eq!(first.sent + second.sent, 3);
	assert_eq!(first.errors + second.errors, 0);
	for id in ids {
		assert_eq!(adapter.read_email(id).await.unwrap().status, EmailStatus::Sent);
	}
}

#[tokio::test]
async fn test_bookkeeping_errors_do_not_abort_pass() {
	let (inner, _tmp) = create_test_adapter().await;
	let unstarted = enqueue(&inner, "a@example.com", 1_000).await;
	let flaky_once = enqueue(&inner, "b@example.com", 1_001).await;
	let unrecorded = enqueue(&inner, "c@example.com", 1_002).await;
	let fresh = enqueue(&inner, "d@example.com", 1_003).await;
	let adapter = FlakyQueue {
		inner,
		fail_start: HashSet::from([unstarted]),
		fail_complete: Mutex::new(HashMap::from([(flaky_once, 1), (unrecorded, 10)])),
	};
	let transport = RecordingTransport::default();

	let report = dispatch_due(&adapter, &transport, &engine(), &opts(), Timestamp(2_000))
		.await
		.unwrap();
	assert_eq!(report.claimed, 4);
	assert_eq!(report.sent, 3);
	assert_eq!(report.errors, 2);

	let to: Vec<_> = transport.sent().into_iter().map(|m| m.to).collect();
	assert_eq!(to, vec!["b@example.com", "c@example.com", "d@example.com"]);

	// never sent, handed back for a retry
	let row = adapter.read_email(unstarted).await.unwrap();
	assert_eq!(row.status, EmailStatus::Failed);
	assert_eq!(row.next_attempt_at, Some(Timestamp(2_060)));

	assert_eq!(adapter.read_email(flaky_once).await.unwrap().status, EmailStatus::Sent);
	assert_eq!(adapter.read_email(fresh).await.unwrap().status, EmailStatus::Sent);

	// sent, but the result could not be stored; stale recovery keeps the claim
	// so the stored result can still land instead of a second send
	let row = adapter.read_email(unrecorded).await.unwrap();
	assert_eq!(row.status, EmailStatus::Processing);
}

#[tokio::test]
async fn test_attendance_single_absence() {
	let (adapter, _tmp) = create_test_adapter().await;
	let transport = RecordingTransport::default();

	let sheet =
		attendance::parse_attendance(b"Learners,Email,07-Jul,08-Jul\nJane,a@b.com,A,P\n").unwrap();
	let report = attendance::send_absence_notifications(&adapter, &transport, &engine(), &sheet)
		.await
		.unwrap();

	assert_eq!(report.message, "Emails sent to 1 learners");
	let sent = transport.sent();
	assert_eq!(sent.len(), 1);
	assert_eq!(sent[0].to, "a@b.com");
	assert_eq!(sent[0].subject, "Absence Notification");
	assert!(sent[0].html_body.contains("Dear Jane"));
	assert!(sent[0].html_body.contains("07-Jul"));
	assert!(!sent[0].html_body.contains("08-Jul"));
}

#[tokio::test]
async fn test_attendance_uses_stored_template() {
	let (adapter, _tmp) = create_test_adapter().await;
	adapter
		.create_template(&CreateTemplate {
			template_name: "Absence Notification".into(),
			category: TemplateCategory::Attendance,
			mode: None,
			batch_type: None,
			user_role: None,
			recipient_emails: None,
			offset_days: 0,
			send_time: None,
			subject: "Missed {{session_name}}".into(),
			body_html: "<p>{{name}}: {{absent_dates}}</p>".into(),
			active: true,
		})
		.await
		.unwrap();
	let transport = RecordingTransport::failing(&["r@b.com"]);

	let csv = "Course Name: Verilog\nLearners,Email,07-Jul,08-Jul\nJane,a@b.com,A,OL\nRavi,r@b.com,A,P\n";
	let sheet = attendance::parse_attendance(csv.as_bytes()).unwrap();
	let report = attendance::send_absence_notifications(&adapter, &transport, &engine(), &sheet)
		.await
		.unwrap();

	assert_eq!(report.message, "Emails sent to 1 learners");
	assert_eq!(report.results.len(), 2);
	assert_eq!(report.results[1].status, DeliveryStatus::Failed);

	let sent = transport.sent();
	assert_eq!(sent[0].subject, "Missed Verilog");
	assert_eq!(sent[0].html_body, "<p>Jane: 07-Jul, 08-Jul</p>");
}

// vim: ts=4
