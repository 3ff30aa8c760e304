//! SMTP email sender using lettre
//!
//! Handles SMTP connection and email delivery with settings integration. When
//! the primary port cannot be connected to, the fallback port is used instead.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use coursemail_core::settings::SettingsService;

use crate::prelude::*;

/// Email message to be sent
#[derive(Debug, Clone)]
pub struct EmailMessage {
	pub to: String,
	pub subject: String,
	pub html_body: String,
	pub text_body: String,
	pub attachment: Option<EmailAttachment>,
}

#[derive(Debug, Clone)]
pub struct EmailAttachment {
	pub filename: String,
	pub content: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
	pub message_id: String,
}

/// Outbound mail delivery
#[async_trait]
pub trait MailTransport: Debug + Send + Sync {
	async fn send(&self, message: &EmailMessage) -> ClResult<SendReceipt>;

	/// Fails with `ServiceUnavailable` when nothing could be sent right now
	async fn check_ready(&self) -> ClResult<()> {
		Ok(())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
	None,
	StartTls,
	Tls,
}

impl TlsMode {
	/// `auto` picks implicit TLS for port 465 and STARTTLS otherwise
	pub fn resolve(mode: &str, port: u16) -> ClResult<Self> {
		match mode {
			"auto" if port == 465 => Ok(TlsMode::Tls),
			"auto" | "starttls" => Ok(TlsMode::StartTls),
			"tls" => Ok(TlsMode::Tls),
			"none" => Ok(TlsMode::None),
			_ => Err(Error::ConfigError(format!(
				"Invalid TLS mode: {}. Must be 'auto', 'none', 'starttls', or 'tls'",
				mode
			))),
		}
	}
}

/// Resolved SMTP connection settings
#[derive(Clone)]
pub struct SmtpConfig {
	pub host: String,
	pub port: u16,
	pub fallback_port: u16,
	pub tls_mode: String,
	pub timeout: Duration,
	pub username: Option<String>,
	pub password: Option<String>,
	pub from_address: String,
	pub from_name: String,
}

impl Debug for SmtpConfig {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SmtpConfig")
			.field("host", &self.host)
			.field("port", &self.port)
			.field("fallback_port", &self.fallback_port)
			.field("tls_mode", &self.tls_mode)
			.field("username", &self.username)
			.field("from_address", &self.from_address)
			.finish_non_exhaustive()
	}
}

impl SmtpConfig {
	/// None when delivery is disabled or no SMTP host is configured
	pub async fn load(settings: &SettingsService) -> ClResult<Option<Self>> {
		if !settings.get_bool("email.enabled").await? {
			return Ok(None);
		}
		let Some(host) = settings.get_string_opt("email.smtp.host").await? else {
			return Ok(None);
		};

		let username = settings.get_string_opt("email.smtp.username").await?;
		let from_address = match settings.get_string_opt("email.from.address").await? {
			Some(addr) => addr,
			None => username.clone().ok_or_else(|| {
				Error::ConfigError("Neither email.from.address nor a username is configured".into())
			})?,
		};

		Ok(Some(Self {
			host,
			port: settings.get_num("email.smtp.port").await?,
			fallback_port: settings.get_num("email.smtp.fallback_port").await?,
			tls_mode: settings.get_string("email.smtp.tls_mode").await?,
			timeout: Duration::from_secs(settings.get_num("email.smtp.timeout_seconds").await?),
			username,
			password: settings.get_string_opt("email.smtp.password").await?,
			from_address,
			from_name: settings.get_string("email.from.name").await?,
		}))
	}

	/// Domain part of the sender address, used for Message-ID
	fn id_domain(&self) -> &str {
		self.from_address.rsplit_once('@').map_or("localhost", |(_, domain)| domain)
	}
}

/// Build the MIME message: HTML with a text alternative, plus an optional attachment
pub fn build_message(config: &SmtpConfig, message: &EmailMessage, message_id: &str) -> ClResult<Message> {
	if !message.to.contains('@') {
		return Err(Error::ValidationError(format!("Invalid recipient address: {}", message.to)));
	}

	let from = Mailbox::new(
		Some(config.from_name.clone()),
		config
			.from_address
			.parse()
			.map_err(|_| Error::ConfigError("Invalid from email format".into()))?,
	);
	let to: Mailbox = message
		.to
		.trim()
		.parse()
		.map_err(|_| Error::ValidationError(format!("Invalid recipient address: {}", message.to)))?;

	let builder = Message::builder()
		.from(from)
		.to(to)
		.subject(&message.subject)
		.message_id(Some(message_id.to_string()));

	let alternative = MultiPart::alternative()
		.singlepart(SinglePart::plain(message.text_body.clone()))
		.singlepart(SinglePart::html(message.html_body.clone()));

	let email = match &message.attachment {
		Some(attachment) => {
			let content_type = ContentType::parse(guess_mime(&attachment.filename))
				.map_err(|e| Error::Internal(format!("content type: {}", e)))?;
			let part = Attachment::new(attachment.filename.clone())
				.body(attachment.content.clone(), content_type);
			builder.multipart(MultiPart::mixed().multipart(alternative).singlepart(part))
		}
		None => builder.multipart(alternative),
	};

	email.map_err(|e| Error::ValidationError(format!("Failed to build email: {}", e)))
}

fn guess_mime(filename: &str) -> &'static str {
	let ext = filename.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
	match ext.as_deref() {
		Some("pdf") => "application/pdf",
		Some("png") => "image/png",
		Some("jpg" | "jpeg") => "image/jpeg",
		Some("csv") => "text/csv",
		Some("txt") => "text/plain",
		Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
		_ => "application/octet-stream",
	}
}

/// SMTP transport reading its configuration from settings on every send
pub struct EmailSender {
	settings: Arc<SettingsService>,
}

impl Debug for EmailSender {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EmailSender").finish_non_exhaustive()
	}
}

impl EmailSender {
	pub fn new(settings: Arc<SettingsService>) -> Self {
		Self { settings }
	}

	fn transport(
		config: &SmtpConfig,
		port: u16,
		tls_mode: TlsMode,
	) -> ClResult<AsyncSmtpTransport<Tokio1Executor>> {
		let tls = match tls_mode {
			TlsMode::None => Tls::None,
			TlsMode::StartTls | TlsMode::Tls => {
				let params = TlsParameters::new(config.host.clone())
					.map_err(|e| Error::ConfigError(format!("TLS configuration error: {}", e)))?;
				if tls_mode == TlsMode::Tls { Tls::Wrapper(params) } else { Tls::Required(params) }
			}
		};

		let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
			.port(port)
			.timeout(Some(config.timeout))
			.tls(tls);
		if let (Some(user), Some(pass)) = (&config.username, &config.password) {
			builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
		}
		Ok(builder.build())
	}

	/// Connects, greets and authenticates without sending anything
	async fn open(
		config: &SmtpConfig,
		port: u16,
		tls_mode: TlsMode,
	) -> ClResult<AsyncSmtpTransport<Tokio1Executor>> {
		debug!(host = %config.host, port, ?tls_mode, "Connecting to SMTP server");
		let mailer = Self::transport(config, port, tls_mode)?;
		match mailer.test_connection().await {
			Ok(true) => Ok(mailer),
			Ok(false) => {
				Err(Error::ServiceUnavailable(format!("SMTP server on port {} did not answer", port)))
			}
			Err(e) => Err(Error::ServiceUnavailable(format!(
				"SMTP connection failed on port {}: {}",
				port, e
			))),
		}
	}

	/// The primary port, or the fallback port when the primary cannot be
	/// connected to
	async fn connect(config: &SmtpConfig) -> ClResult<(AsyncSmtpTransport<Tokio1Executor>, u16)> {
		let primary_tls = TlsMode::resolve(&config.tls_mode, config.port)?;
		let err = match Self::open(config, config.port, primary_tls).await {
			Ok(mailer) => return Ok((mailer, config.port)),
			Err(err) if config.fallback_port == config.port => return Err(err),
			Err(err) => err,
		};

		warn!("{}; trying port {}", err, config.fallback_port);
		let fallback_tls = if primary_tls == TlsMode::None { TlsMode::None } else { TlsMode::StartTls };
		let mailer = Self::open(config, config.fallback_port, fallback_tls).await?;
		Ok((mailer, config.fallback_port))
	}

	/// Once the message is handed to a server there is no second try: a
	/// timeout after DATA may still mean it was delivered
	async fn deliver(config: &SmtpConfig, message: &EmailMessage) -> ClResult<SendReceipt> {
		let message_id = format!("<{}@{}>", uuid::Uuid::new_v4(), config.id_domain());
		let email = build_message(config, message, &message_id)?;

		let (mailer, port) = Self::connect(config).await?;
		mailer
			.send(email)
			.await
			.map_err(|e| Error::ServiceUnavailable(format!("SMTP send failed on port {}: {}", port, e)))?;

		info!(to = %message.to, message_id = %message_id, port, "Email sent");
		Ok(SendReceipt { message_id })
	}
}

#[async_trait]
impl MailTransport for EmailSender {
	async fn send(&self, message: &EmailMessage) -> ClResult<SendReceipt> {
		let Some(config) = SmtpConfig::load(&self.settings).await? else {
			info!("Email sending disabled, skipping send to {}", message.to);
			return Err(Error::ServiceUnavailable("email delivery is disabled".into()));
		};

		Self::deliver(&config, message)
			.await
			.inspect_err(|e| warn!(to = %message.to, "Failed to send email: {}", e))
	}

	async fn check_ready(&self) -> ClResult<()> {
		match SmtpConfig::load(&self.settings).await? {
			Some(_) => Ok(()),
			None => Err(Error::ServiceUnavailable(
				"email delivery is disabled or no SMTP host is configured".into(),
			)),
		}
	}
}


// vim: ts=4
