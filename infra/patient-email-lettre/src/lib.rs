use std::{fmt::Display, str::FromStr};

use lettre::{
    Message, SmtpTransport, Transport,
    message::{Attachment as MimeAttachment, Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use patient_email_app::{
    domain::message::EmailMessage,
    extension::ConfigurationError,
    ports::email::{EmailPort, TransportError},
};

pub const SMTP_HOST_VAR: &str = "PATIENT_EMAIL_SMTP_HOST";
pub const SMTP_PORT_VAR: &str = "PATIENT_EMAIL_SMTP_PORT";
pub const SMTP_USER_VAR: &str = "PATIENT_EMAIL_SMTP_USER";
pub const SMTP_PASSWORD_VAR: &str = "PATIENT_EMAIL_SMTP_PASSWORD";
pub const FROM_VAR: &str = "PATIENT_EMAIL_FROM";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SmtpConfig {
    pub host: String,
    pub port: Option<u16>,
    pub user: String,
    pub password: String,
    pub from: String,
}

impl SmtpConfig {
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigurationError> {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or(ConfigurationError::MissingSetting(key))
        };
        let port = match lookup(SMTP_PORT_VAR).filter(|value| !value.trim().is_empty()) {
            Some(value) => Some(value.trim().parse::<u16>().map_err(|e| {
                ConfigurationError::InvalidSetting(format!("{}: {}", SMTP_PORT_VAR, e))
            })?),
            None => None,
        };
        Ok(Self {
            host: required(SMTP_HOST_VAR)?,
            port,
            user: required(SMTP_USER_VAR)?,
            password: required(SMTP_PASSWORD_VAR)?,
            from: required(FROM_VAR)?,
        })
    }
}

pub struct LettreEmailAdapter<T: Transport = SmtpTransport> {
    transport: T,
    from: Mailbox,
}

impl LettreEmailAdapter<SmtpTransport> {
    pub fn new(config: &SmtpConfig) -> Result<Self, ConfigurationError> {
        let mut builder = SmtpTransport::relay(&config.host).map_err(|e| {
            ConfigurationError::InvalidSetting(format!("{}: {}", SMTP_HOST_VAR, e))
        })?;
        if let Some(port) = config.port {
            builder = builder.port(port);
        }
        let transport = builder
            .credentials(Credentials::new(
                config.user.clone(),
                config.password.clone(),
            ))
            .build();
        log::info!("SMTP transport configured for {}", config.host);
        Self::with_transport(transport, &config.from)
    }
}

impl<T: Transport> LettreEmailAdapter<T> {
    pub fn with_transport(transport: T, from: &str) -> Result<Self, ConfigurationError> {
        let from = Mailbox::from_str(from)
            .map_err(|e| ConfigurationError::InvalidSetting(format!("{}: {}", FROM_VAR, e)))?;
        Ok(Self { transport, from })
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn build_message(&self, message: &EmailMessage) -> Result<Message, TransportError> {
        let to = Mailbox::from_str(message.to.as_str())
            .map_err(|e| TransportError::InvalidRecipient(format!("{}: {}", message.to, e)))?;
        let from = match &message.from {
            Some(from) => Mailbox::from_str(from.as_str())
                .map_err(|e| TransportError::Build(format!("invalid sender {}: {}", from, e)))?,
            None => self.from.clone(),
        };
        let builder = Message::builder()
            .from(from)
            .to(to)
            .subject(message.subject.clone());

        let text = message.text_body.clone();
        let email = if message.attachments.is_empty() {
            match &message.html_body {
                Some(html) => {
                    builder.multipart(MultiPart::alternative_plain_html(text, html.clone()))
                }
                None => builder.singlepart(SinglePart::plain(text)),
            }
        } else {
            let mut mixed = match &message.html_body {
                Some(html) => MultiPart::mixed()
                    .multipart(MultiPart::alternative_plain_html(text, html.clone())),
                None => MultiPart::mixed().singlepart(SinglePart::plain(text)),
            };
            for attachment in &message.attachments {
                let content_type = ContentType::parse(&attachment.content_type).map_err(|e| {
                    TransportError::Build(format!(
                        "invalid content type {:?} of {}: {}",
                        attachment.content_type, attachment.filename, e
                    ))
                })?;
                mixed = mixed.singlepart(
                    MimeAttachment::new(attachment.filename.clone())
                        .body(attachment.content.clone(), content_type),
                );
            }
            builder.multipart(mixed)
        };
        email.map_err(|e| TransportError::Build(e.to_string()))
    }
}

impl<T> EmailPort for LettreEmailAdapter<T>
where
    T: Transport,
    T::Error: Display,
{
    fn send_email(&self, message: &EmailMessage) -> Result<(), TransportError> {
        let email = self.build_message(message)?;
        self.transport.send(&email).map_err(|e| {
            log::error!("SMTP delivery to {} failed: {}", message.to, e);
            TransportError::Send(e.to_string())
        })?;
        log::debug!("Handed email {:?} to SMTP transport", message.subject);
        Ok(())
    }
}
