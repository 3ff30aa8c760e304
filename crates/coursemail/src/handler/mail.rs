//! Queue inspection and manual delivery handlers

use axum::{
	Json,
	extract::{Query, State},
	http::StatusCode,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::prelude::*;
use coursemail_email::{DispatchReport, EmailMessage, EmailModule};
use coursemail_types::queue_adapter::{EmailStatus, ListEmailOptions, ScheduledEmail};
use coursemail_types::utils::looks_like_email;

const DEBUG_LIST_LIMIT: u32 = 50;
const MAIL_PAGE_SIZE: u32 = 100;
/// Delay before requeued failures become due again
const REQUEUE_DELAY_SECS: i64 = 60;

/// POST /api/dispatch/run - One dispatch pass now
pub async fn post_dispatch_run(
	State(app): State<App>,
) -> ClResult<(StatusCode, Json<ApiResponse<DispatchReport>>)> {
	let email = app.ext::<Arc<EmailModule>>()?;
	let report = email.dispatch_now(&app).await?;
	Ok((StatusCode::OK, Json(ApiResponse::new(report))))
}

/// GET /api/mail-dashboard/list?batch_no=&recipient=&status=&limit=&offset=
pub async fn list_mails(
	State(app): State<App>,
	Query(mut opts): Query<ListEmailOptions>,
) -> ClResult<(StatusCode, Json<ApiResponse<Vec<ScheduledEmail>>>)> {
	let limit = *opts.limit.get_or_insert(MAIL_PAGE_SIZE);
	let rows = app.queue_adapter.list_emails(&opts).await?;
	let total = app.queue_adapter.count_emails(&opts).await?;

	let offset = usize::try_from(opts.offset.unwrap_or_default()).unwrap_or_default();
	let limit = usize::try_from(limit).unwrap_or_default();
	let total = usize::try_from(total).unwrap_or(usize::MAX);
	Ok((StatusCode::OK, Json(ApiResponse::with_pagination(rows, offset, limit, total))))
}

/// GET /api/debug/scheduled-emails - Latest queue rows
pub async fn list_latest(
	State(app): State<App>,
) -> ClResult<(StatusCode, Json<ApiResponse<Vec<ScheduledEmail>>>)> {
	let opts = ListEmailOptions { limit: Some(DEBUG_LIST_LIMIT), ..Default::default() };
	let rows = app.queue_adapter.list_emails(&opts).await?;
	Ok((StatusCode::OK, Json(ApiResponse::new(rows))))
}

#[derive(Debug, Deserialize)]
pub struct MailContentQuery {
	pub mail_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct MailContent {
	pub id: i64,
	pub batch_no: Box<str>,
	pub recipient_email: Box<str>,
	pub template_name: Box<str>,
	pub subject: String,
	pub body: Box<str>,
	pub status: EmailStatus,
}

impl From<ScheduledEmail> for MailContent {
	fn from(row: ScheduledEmail) -> Self {
		let subject = if row.subject.trim().is_empty() {
			format!("Email for {}", row.template_name)
		} else {
			row.subject.to_string()
		};
		Self {
			id: row.id,
			batch_no: row.batch_no,
			recipient_email: row.recipient_email,
			template_name: row.template_name,
			subject,
			body: row.body_html,
			status: row.status,
		}
	}
}

/// GET /api/mail/content?mail_id=
pub async fn get_mail_content(
	State(app): State<App>,
	Query(query): Query<MailContentQuery>,
) -> ClResult<(StatusCode, Json<ApiResponse<MailContent>>)> {
	let mail_id =
		query.mail_id.ok_or_else(|| Error::ValidationError("mail_id is required".into()))?;
	let row = app.queue_adapter.read_email(mail_id).await?;
	Ok((StatusCode::OK, Json(ApiResponse::new(MailContent::from(row)))))
}

#[derive(Debug, Deserialize)]
pub struct ResendRequest {
	pub mail_id: i64,
	#[serde(default)]
	pub recipient_email: String,
	#[serde(default)]
	pub subject: String,
	#[serde(default, alias = "body_html")]
	pub body: String,
}

#[derive(Debug, Serialize)]
pub struct ResendResponse {
	pub mail_id: i64,
	pub message_id: String,
	/// Set when the mail went out but the queue row could not be updated
	#[serde(skip_serializing_if = "Option::is_none")]
	pub warning: Option<String>,
}

/// POST /api/mail/resend - Send edited content now and record it as sent
pub async fn post_resend(
	State(app): State<App>,
	Json(req): Json<ResendRequest>,
) -> ClResult<(StatusCode, Json<ApiResponse<ResendResponse>>)> {
	let recipient = super::required("recipient_email", &req.recipient_email)?;
	let subject = super::required("subject", &req.subject)?;
	let body = super::required("body", &req.body)?;
	if !looks_like_email(recipient) {
		return Err(Error::ValidationError(format!("invalid recipient address: {}", recipient)));
	}
	// 404 before anything goes out
	app.queue_adapter.read_email(req.mail_id).await?;

	let email = app.ext::<Arc<EmailModule>>()?;
	let message = EmailMessage {
		to: recipient.to_string(),
		subject: subject.to_string(),
		html_body: body.to_string(),
		text_body: email.template_engine.html_to_text(body),
		attachment: None,
	};
	let receipt = email.send_now(&message).await?;
	info!(mail_id = req.mail_id, to = recipient, "Mail resent with edited content");

	let recorded =
		record_resend(&app, req.mail_id, (recipient, subject, body), &receipt.message_id).await;
	let warning = recorded.err().map(|e| {
		warn!(mail_id = req.mail_id, "Mail sent but queue row not updated: {}", e);
		format!("mail sent but queue row not updated: {}", e)
	});

	Ok((
		StatusCode::OK,
		Json(ApiResponse::new(ResendResponse {
			mail_id: req.mail_id,
			message_id: receipt.message_id,
			warning,
		})),
	))
}

async fn record_resend(
	app: &App,
	mail_id: i64,
	(recipient, subject, body): (&str, &str, &str),
	message_id: &str,
) -> ClResult<()> {
	app.queue_adapter.update_email_content(mail_id, recipient, subject, body).await?;
	app.queue_adapter.mark_email_sent(mail_id, Some(message_id), Timestamp::now()).await
}

#[derive(Debug, Deserialize)]
pub struct UpdateRecipientRequest {
	pub mail_id: i64,
	#[serde(default)]
	pub new_email: String,
}

#[derive(Debug, Serialize)]
pub struct UpdateRecipientResponse {
	pub mail_id: i64,
	pub old_email: Box<str>,
	pub new_email: String,
	pub learners_updated: u64,
}

/// POST /api/mail/update-email - Fix a recipient on the queue row and the learner record
pub async fn post_update_recipient(
	State(app): State<App>,
	Json(req): Json<UpdateRecipientRequest>,
) -> ClResult<(StatusCode, Json<ApiResponse<UpdateRecipientResponse>>)> {
	let new_email = super::required("new_email", &req.new_email)?;
	if !looks_like_email(new_email) {
		return Err(Error::ValidationError(format!("invalid email address: {}", new_email)));
	}

	let row = app.queue_adapter.read_email(req.mail_id).await?;
	app.queue_adapter.update_email_recipient(req.mail_id, new_email).await?;
	let learners_updated = app
		.queue_adapter
		.update_learner_email(&row.batch_no, &row.recipient_email, new_email)
		.await?;
	info!(
		mail_id = req.mail_id,
		batch_no = %row.batch_no,
		learners_updated,
		"Recipient changed from {} to {}",
		row.recipient_email,
		new_email
	);

	Ok((
		StatusCode::OK,
		Json(ApiResponse::new(UpdateRecipientResponse {
			mail_id: req.mail_id,
			old_email: row.recipient_email,
			new_email: new_email.to_string(),
			learners_updated,
		})),
	))
}

#[derive(Debug, Default, Deserialize)]
pub struct RequeueRequest {
	pub batch_no: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RequeueResponse {
	pub count: u64,
	pub scheduled_at: Timestamp,
}

/// POST /api/resend-failed-emails - Put failed rows back in the queue
pub async fn post_requeue_failed(
	State(app): State<App>,
	Json(req): Json<RequeueRequest>,
) -> ClResult<(StatusCode, Json<ApiResponse<RequeueResponse>>)> {
	let batch_no = req.batch_no.as_deref().map(str::trim).filter(|b| !b.is_empty());
	let scheduled_at = Timestamp::from_now(REQUEUE_DELAY_SECS);
	let count = app.queue_adapter.requeue_failed_emails(batch_no, scheduled_at).await?;
	info!(batch_no, count, "Failed mails requeued for {}", scheduled_at.to_iso_string());

	Ok((StatusCode::OK, Json(ApiResponse::new(RequeueResponse { count, scheduled_at }))))
}

// vim: ts=4
