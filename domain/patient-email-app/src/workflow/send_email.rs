use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;

use crate::{
    domain::{
        OrganizationId, PatientId, RepoRetrieveError, ValidationError,
        address::EmailAddress,
        message::{Attachment, EmailMessage},
        profile::{PatientEmailProfile, ProfileRepository},
        template::{
            BuiltinTemplate, MAX_SUBJECT_LEN, TemplateContext, TemplateError, TemplateRenderer,
            TemplateRepository, normalize_template_name, strip_tags,
        },
    },
    ports::{
        email::{EmailPort, TransportError},
        patient::PatientRecord,
    },
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendEmailError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("email notifications are disabled for patient {0}")]
    NotificationsDisabled(PatientId),

    #[error("emails to patient {0} have bounced")]
    Bounced(PatientId),

    #[error("patient {0} not found")]
    UnknownPatient(PatientId),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("email profile storage failed: {0}")]
    Repository(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TemplateSource {
    Builtin(BuiltinTemplate),
    /// Name of a template stored for the patient's organization.
    Stored(String),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SendEmailRequest {
    pub subject: String,
    pub message: Option<String>,
    pub html_message: Option<String>,
    pub template: Option<TemplateSource>,
    pub context: TemplateContext,
    pub from: Option<EmailAddress>,
    pub attachments: Vec<Attachment>,
}

impl SendEmailRequest {
    pub fn plain(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            message: Some(body.into()),
            ..Default::default()
        }
    }

    pub fn templated(
        subject: impl Into<String>,
        template: TemplateSource,
        context: TemplateContext,
    ) -> Self {
        Self {
            subject: subject.into(),
            template: Some(template),
            context,
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub recipient: EmailAddress,
    pub sent_at: DateTime<Utc>,
}

pub trait SendEmailUseCase {
    fn send_email(
        &self,
        patient: &dyn PatientRecord,
        request: SendEmailRequest,
    ) -> Result<DeliveryReceipt, SendEmailError>;

    /// Renders the request as if for a sample patient and sends it to `to`,
    /// prefixing the subject with `[TEST] `. No profile is touched.
    fn send_test_email(
        &self,
        organization: OrganizationId,
        to: &EmailAddress,
        request: SendEmailRequest,
    ) -> Result<DeliveryReceipt, SendEmailError>;
}

pub fn validate_subject(subject: &str) -> Result<(), ValidationError> {
    if subject.trim().is_empty() {
        return Err(ValidationError::Subject("subject must not be empty".to_string()));
    }
    if subject.chars().count() > MAX_SUBJECT_LEN {
        return Err(ValidationError::Subject(format!(
            "subject must be at most {} characters",
            MAX_SUBJECT_LEN
        )));
    }
    if subject.contains(['\r', '\n']) {
        return Err(ValidationError::Subject(
            "subject must be a single line".to_string(),
        ));
    }
    Ok(())
}

struct ComposedEmail {
    subject: String,
    text_body: String,
    html_body: Option<String>,
}

pub struct SendEmailUseCaseImpl<E: EmailPort, PR: ProfileRepository, TR: TemplateRepository> {
    email_port: Arc<E>,
    profile_repository: Arc<PR>,
    template_repository: Arc<TR>,
    renderer: Arc<TemplateRenderer>,
}

impl<E: EmailPort, PR: ProfileRepository, TR: TemplateRepository>
    SendEmailUseCaseImpl<E, PR, TR>
{
    pub fn new(
        email_port: Arc<E>,
        profile_repository: Arc<PR>,
        template_repository: Arc<TR>,
        renderer: Arc<TemplateRenderer>,
    ) -> Self {
        Self {
            email_port,
            profile_repository,
            template_repository,
            renderer,
        }
    }

    fn patient_context(
        patient: &dyn PatientRecord,
        profile: &PatientEmailProfile,
        extra: &TemplateContext,
    ) -> TemplateContext {
        let mut context = extra.clone();
        context.insert(
            "patient".to_string(),
            json!({ "id": patient.id().0, "full_name": patient.full_name() }),
        );
        context.insert("email_profile".to_string(), profile.template_context());
        context
    }

    fn compose(
        &self,
        organization: OrganizationId,
        request: &SendEmailRequest,
        context: &TemplateContext,
    ) -> Result<ComposedEmail, SendEmailError> {
        let plain_message = request
            .message
            .clone()
            .filter(|message| !message.trim().is_empty());
        match &request.template {
            None => Ok(ComposedEmail {
                subject: request.subject.clone(),
                text_body: plain_message.unwrap_or_default(),
                html_body: request.html_message.clone(),
            }),
            Some(TemplateSource::Builtin(template)) => {
                let html_body = self.renderer.render_builtin(*template, context)?;
                Ok(ComposedEmail {
                    subject: request.subject.clone(),
                    text_body: plain_message.unwrap_or_else(|| strip_tags(&html_body)),
                    html_body: Some(html_body),
                })
            }
            Some(TemplateSource::Stored(name)) => {
                let template = match self
                    .template_repository
                    .get_template(organization, &normalize_template_name(name))
                {
                    Ok(template) => template,
                    Err(RepoRetrieveError::NotFound) => {
                        return Err(TemplateError::NotFound(name.clone()).into());
                    }
                    Err(RepoRetrieveError::StorageError(e)) => {
                        return Err(TemplateError::Storage(e).into());
                    }
                };
                if !template.is_active {
                    return Err(TemplateError::Inactive(template.name).into());
                }
                let rendered = self.renderer.render_stored(&template, context)?;
                let subject = if request.subject.trim().is_empty() {
                    rendered.subject
                } else {
                    request.subject.clone()
                };
                Ok(ComposedEmail {
                    subject,
                    text_body: plain_message.unwrap_or(rendered.text_body),
                    html_body: Some(rendered.html_body),
                })
            }
        }
    }

    fn dispatch(&self, message: EmailMessage) -> Result<DeliveryReceipt, SendEmailError> {
        self.email_port.send_email(&message)?;
        Ok(DeliveryReceipt {
            recipient: message.to,
            sent_at: Utc::now(),
        })
    }
}

impl<E, PR, TR> SendEmailUseCase for SendEmailUseCaseImpl<E, PR, TR>
where
    E: EmailPort + Send + Sync + 'static,
    PR: ProfileRepository + Send + Sync + 'static,
    TR: TemplateRepository + Send + Sync + 'static,
{
    fn send_email(
        &self,
        patient: &dyn PatientRecord,
        request: SendEmailRequest,
    ) -> Result<DeliveryReceipt, SendEmailError> {
        let patient_id = patient.id();
        let profile = self
            .profile_repository
            .get_or_create_profile(patient_id, patient.organization())
            .map_err(|e| SendEmailError::Repository(e.to_string()))?;

        if !profile.notifications_enabled {
            log::debug!("Not emailing patient {}: notifications disabled", patient_id);
            return Err(SendEmailError::NotificationsDisabled(patient_id));
        }
        if profile.bounced {
            log::debug!("Not emailing patient {}: address bounced", patient_id);
            return Err(SendEmailError::Bounced(patient_id));
        }
        let Some(to) = profile.preferred_email().cloned() else {
            return Err(ValidationError::MissingAddress.into());
        };

        let context = Self::patient_context(patient, &profile, &request.context);
        let composed = self.compose(patient.organization(), &request, &context)?;
        validate_subject(&composed.subject)?;

        let message = EmailMessage::new(to, composed.subject, composed.text_body)
            .with_html(composed.html_body)
            .with_from(request.from)
            .with_attachments(request.attachments);

        let receipt = match self.dispatch(message) {
            Ok(receipt) => receipt,
            Err(e) => {
                log::error!("Failed to send email to patient {}: {}", patient_id, e);
                return Err(e);
            }
        };
        log::info!("Sent email to patient {} at {}", patient_id, receipt.recipient);

        // Already delivered, so this only warns.
        if let Err(e) = self
            .profile_repository
            .record_email_sent(patient_id, receipt.sent_at)
        {
            log::warn!(
                "Failed to record last email sent for patient {}: {}",
                patient_id,
                e
            );
        }
        Ok(receipt)
    }

    fn send_test_email(
        &self,
        organization: OrganizationId,
        to: &EmailAddress,
        request: SendEmailRequest,
    ) -> Result<DeliveryReceipt, SendEmailError> {
        let mut context = request.context.clone();
        context.insert(
            "patient".to_string(),
            json!({ "id": null, "full_name": "Test Patient" }),
        );
        context.insert(
            "email_profile".to_string(),
            json!({ "email": to, "preferred_email": to, "email_verified": false }),
        );
        let composed = self.compose(organization, &request, &context)?;
        validate_subject(&composed.subject)?;

        let message = EmailMessage::new(
            to.clone(),
            format!("[TEST] {}", composed.subject),
            composed.text_body,
        )
        .with_html(composed.html_body)
        .with_from(request.from)
        .with_attachments(request.attachments);

        let receipt = self.dispatch(message).inspect_err(|e| {
            log::error!("Failed to send test email to {}: {}", to, e);
        })?;
        log::info!("Sent test email to {}", to);
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::{
        domain::{
            profile::InMemoryProfileRepository,
            template::{EmailTemplate, InMemoryTemplateRepository, TemplateDraft},
        },
        ports::{email::MockEmailPort, patient::PatientSummary},
    };

    use super::*;

    type TestUseCase =
        SendEmailUseCaseImpl<MockEmailPort, InMemoryProfileRepository, InMemoryTemplateRepository>;

    struct Fixture {
        email_port: MockEmailPort,
        profiles: Arc<InMemoryProfileRepository>,
        templates: Arc<InMemoryTemplateRepository>,
        use_case: TestUseCase,
    }

    fn fixture_with_port(email_port: MockEmailPort) -> Fixture {
        let profiles = Arc::new(InMemoryProfileRepository::new());
        let templates = Arc::new(InMemoryTemplateRepository::new());
        let use_case = SendEmailUseCaseImpl::new(
            Arc::new(email_port.clone()),
            profiles.clone(),
            templates.clone(),
            Arc::new(TemplateRenderer::new()),
        );
        Fixture {
            email_port,
            profiles,
            templates,
            use_case,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_port(MockEmailPort::default())
    }

    fn patient() -> PatientSummary {
        PatientSummary {
            id: PatientId(42),
            full_name: "Ada Lovelace".to_string(),
            organization: OrganizationId(1),
        }
    }

    fn set_email(fixture: &Fixture, email: Option<&str>) {
        let mut profile = fixture
            .profiles
            .get_or_create_profile(PatientId(42), OrganizationId(1))
            .unwrap();
        profile.email = email.map(|e| EmailAddress::parse(e).unwrap());
        fixture.profiles.save_profile(&profile).unwrap();
    }

    #[test]
    fn test_send_plain_email() {
        let fixture = fixture();
        set_email(&fixture, Some("a@b.com"));

        let receipt = fixture
            .use_case
            .send_email(&patient(), SendEmailRequest::plain("Hi", "Test"))
            .expect("email should be sent");
        assert_eq!(receipt.recipient.as_str(), "a@b.com");

        let messages = fixture.email_port.get_messages();
        assert_eq!(messages.len(), 1);
        assert!(matches!(
            &messages[0],
            EmailMessage { to, subject, text_body, html_body: None, .. }
                if to.as_str() == "a@b.com" && subject == "Hi" && text_body == "Test"
        ));

        let profile = fixture.profiles.get_profile(PatientId(42)).unwrap();
        assert_eq!(profile.last_email_sent, Some(receipt.sent_at));
    }

    #[test]
    fn test_missing_address_never_reaches_transport() {
        let fixture = fixture();
        assert_eq!(
            fixture
                .use_case
                .send_email(&patient(), SendEmailRequest::plain("Hi", "Test")),
            Err(SendEmailError::Validation(ValidationError::MissingAddress))
        );
        assert!(fixture.email_port.get_messages().is_empty());
        let profile = fixture.profiles.get_profile(PatientId(42)).unwrap();
        assert_eq!(profile.last_email_sent, None);
    }

    #[test]
    fn test_transport_failure_is_reported() {
        let fixture = fixture_with_port(MockEmailPort::failing(TransportError::Send(
            "connection refused".to_string(),
        )));
        set_email(&fixture, Some("a@b.com"));

        assert_eq!(
            fixture
                .use_case
                .send_email(&patient(), SendEmailRequest::plain("Hi", "Test")),
            Err(SendEmailError::Transport(TransportError::Send(
                "connection refused".to_string()
            )))
        );
        let profile = fixture.profiles.get_profile(PatientId(42)).unwrap();
        assert_eq!(profile.last_email_sent, None);
    }

    #[test]
    fn test_disabled_and_bounced_profiles() {
        let fixture = fixture();
        set_email(&fixture, Some("a@b.com"));
        let mut profile = fixture.profiles.get_profile(PatientId(42)).unwrap();

        profile.notifications_enabled = false;
        fixture.profiles.save_profile(&profile).unwrap();
        assert_eq!(
            fixture
                .use_case
                .send_email(&patient(), SendEmailRequest::plain("Hi", "Test")),
            Err(SendEmailError::NotificationsDisabled(PatientId(42)))
        );

        profile.notifications_enabled = true;
        profile.bounced = true;
        fixture.profiles.save_profile(&profile).unwrap();
        assert_eq!(
            fixture
                .use_case
                .send_email(&patient(), SendEmailRequest::plain("Hi", "Test")),
            Err(SendEmailError::Bounced(PatientId(42)))
        );
        assert!(fixture.email_port.get_messages().is_empty());
    }

    #[test]
    fn test_subject_validation() {
        let fixture = fixture();
        set_email(&fixture, Some("a@b.com"));
        for subject in ["", "   ", "two\nlines"] {
            assert!(matches!(
                fixture
                    .use_case
                    .send_email(&patient(), SendEmailRequest::plain(subject, "Test")),
                Err(SendEmailError::Validation(ValidationError::Subject(..)))
            ));
        }
        let long = "x".repeat(MAX_SUBJECT_LEN + 1);
        assert!(
            fixture
                .use_case
                .send_email(&patient(), SendEmailRequest::plain(long, "Test"))
                .is_err()
        );
        assert!(fixture.email_port.get_messages().is_empty());
    }

    #[test]
    fn test_builtin_template_renders_patient_context() {
        let fixture = fixture();
        set_email(&fixture, Some("a@b.com"));

        let mut context = TemplateContext::new();
        context.insert("appointment_date".to_string(), json!("2024-01-15"));
        fixture
            .use_case
            .send_email(
                &patient(),
                SendEmailRequest::templated(
                    "Appointment Reminder",
                    TemplateSource::Builtin(BuiltinTemplate::AppointmentReminder),
                    context,
                ),
            )
            .unwrap();

        let messages = fixture.email_port.get_messages();
        assert_eq!(messages.len(), 1);
        let html = messages[0].html_body.as_deref().unwrap();
        assert!(html.contains("Dear Ada Lovelace,"));
        assert!(html.contains("2024-01-15"));
        assert!(!messages[0].text_body.contains('<'));
        assert!(messages[0].text_body.contains("Dear Ada Lovelace,"));
    }

    #[test]
    fn test_stored_template() {
        let fixture = fixture();
        set_email(&fixture, Some("a@b.com"));
        let mut template = EmailTemplate::from_draft(
            OrganizationId(1),
            TemplateDraft {
                name: "Flu Shot".to_string(),
                subject: "Flu shot for {{ patient.full_name }}".to_string(),
                html_content: "<p>Book your flu shot, {{ patient.full_name }}.</p>".to_string(),
                text_content: String::new(),
                description: String::new(),
                is_active: true,
            },
        )
        .unwrap();
        fixture.templates.insert_template(&template).unwrap();

        let request = SendEmailRequest::templated(
            "",
            TemplateSource::Stored("flu shot".to_string()),
            TemplateContext::new(),
        );
        fixture
            .use_case
            .send_email(&patient(), request.clone())
            .unwrap();
        let messages = fixture.email_port.get_messages();
        assert_eq!(messages[0].subject, "Flu shot for Ada Lovelace");
        assert_eq!(messages[0].text_body, "Book your flu shot, Ada Lovelace.");

        template.is_active = false;
        fixture.templates.update_template(&template).unwrap();
        assert_eq!(
            fixture.use_case.send_email(&patient(), request),
            Err(SendEmailError::Template(TemplateError::Inactive(
                "flu_shot".to_string()
            )))
        );

        let missing = SendEmailRequest::templated(
            "Hi",
            TemplateSource::Stored("nope".to_string()),
            TemplateContext::new(),
        );
        assert!(matches!(
            fixture.use_case.send_email(&patient(), missing),
            Err(SendEmailError::Template(TemplateError::NotFound(..)))
        ));
    }

    #[test]
    fn test_send_test_email() {
        let fixture = fixture();
        let tester = EmailAddress::parse("staff@clinic.org").unwrap();
        fixture
            .use_case
            .send_test_email(
                OrganizationId(1),
                &tester,
                SendEmailRequest::plain("Newsletter", "Hello"),
            )
            .unwrap();
        let messages = fixture.email_port.get_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].to, tester);
        assert_eq!(messages[0].subject, "[TEST] Newsletter");
        assert!(fixture.profiles.get_profile(PatientId(42)).is_err());
    }

    #[test]
    fn test_html_sender_and_attachments_reach_transport() {
        let fixture = fixture();
        set_email(&fixture, Some("a@b.com"));

        let request = SendEmailRequest {
            subject: "Lab results".to_string(),
            message: Some("Your results are attached.".to_string()),
            html_message: Some("<p>Your results are attached.</p>".to_string()),
            from: Some(EmailAddress::parse("lab@clinic.org").unwrap()),
            attachments: vec![Attachment::new(
                "results.pdf",
                "application/pdf",
                b"%PDF-1.4".to_vec(),
            )],
            ..Default::default()
        };
        fixture.use_case.send_email(&patient(), request).unwrap();

        let messages = fixture.email_port.get_messages();
        assert_eq!(messages.len(), 1);
        let message = &messages[0];
        assert_eq!(message.to.as_str(), "a@b.com");
        assert_eq!(message.text_body, "Your results are attached.");
        assert_eq!(
            message.html_body.as_deref(),
            Some("<p>Your results are attached.</p>")
        );
        assert_eq!(message.from.as_ref().map(|f| f.as_str()), Some("lab@clinic.org"));
        assert_eq!(
            message.attachments,
            vec![Attachment::new(
                "results.pdf",
                "application/pdf",
                b"%PDF-1.4".to_vec()
            )]
        );
    }
}
