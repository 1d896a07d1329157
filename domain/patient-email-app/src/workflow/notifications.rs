use std::sync::Arc;

use serde_json::json;

use crate::{
    domain::template::{BuiltinTemplate, TemplateContext},
    ports::patient::PatientRecord,
    workflow::send_email::{
        DeliveryReceipt, SendEmailError, SendEmailRequest, SendEmailUseCase, TemplateSource,
    },
};

pub const APPOINTMENT_REMINDER_SUBJECT: &str = "Appointment Reminder";
pub const WELCOME_SUBJECT: &str = "Welcome to our healthcare system";
pub const CARE_PLAN_UPDATE_SUBJECT: &str = "Care Plan Update";
pub const VERIFY_EMAIL_SUBJECT: &str = "Please verify your email address";

/// Canned patient emails built on the shipped templates.
pub trait PatientNotificationUseCase {
    fn send_appointment_reminder(
        &self,
        patient: &dyn PatientRecord,
        appointment_date: &str,
        appointment_time: Option<&str>,
    ) -> Result<DeliveryReceipt, SendEmailError>;
    fn send_welcome_email(&self, patient: &dyn PatientRecord)
    -> Result<DeliveryReceipt, SendEmailError>;
    fn send_care_plan_update(
        &self,
        patient: &dyn PatientRecord,
        care_plan_details: &str,
    ) -> Result<DeliveryReceipt, SendEmailError>;
    fn send_verification_email(
        &self,
        patient: &dyn PatientRecord,
    ) -> Result<DeliveryReceipt, SendEmailError>;
}

pub struct PatientNotificationUseCaseImpl<S: SendEmailUseCase> {
    send_email_use_case: Arc<S>,
}

impl<S: SendEmailUseCase> PatientNotificationUseCaseImpl<S> {
    pub fn new(send_email_use_case: Arc<S>) -> Self {
        Self {
            send_email_use_case,
        }
    }

    fn send(
        &self,
        patient: &dyn PatientRecord,
        subject: &str,
        template: BuiltinTemplate,
        context: TemplateContext,
    ) -> Result<DeliveryReceipt, SendEmailError> {
        self.send_email_use_case.send_email(
            patient,
            SendEmailRequest::templated(subject, TemplateSource::Builtin(template), context),
        )
    }
}

impl<S: SendEmailUseCase + Send + Sync + 'static> PatientNotificationUseCase
    for PatientNotificationUseCaseImpl<S>
{
    fn send_appointment_reminder(
        &self,
        patient: &dyn PatientRecord,
        appointment_date: &str,
        appointment_time: Option<&str>,
    ) -> Result<DeliveryReceipt, SendEmailError> {
        let mut context = TemplateContext::new();
        context.insert("appointment_date".to_string(), json!(appointment_date));
        context.insert("appointment_time".to_string(), json!(appointment_time));
        self.send(
            patient,
            APPOINTMENT_REMINDER_SUBJECT,
            BuiltinTemplate::AppointmentReminder,
            context,
        )
    }

    fn send_welcome_email(
        &self,
        patient: &dyn PatientRecord,
    ) -> Result<DeliveryReceipt, SendEmailError> {
        self.send(
            patient,
            WELCOME_SUBJECT,
            BuiltinTemplate::Welcome,
            TemplateContext::new(),
        )
    }

    fn send_care_plan_update(
        &self,
        patient: &dyn PatientRecord,
        care_plan_details: &str,
    ) -> Result<DeliveryReceipt, SendEmailError> {
        let mut context = TemplateContext::new();
        context.insert("care_plan_details".to_string(), json!(care_plan_details));
        self.send(
            patient,
            CARE_PLAN_UPDATE_SUBJECT,
            BuiltinTemplate::CarePlanUpdate,
            context,
        )
    }

    fn send_verification_email(
        &self,
        patient: &dyn PatientRecord,
    ) -> Result<DeliveryReceipt, SendEmailError> {
        self.send(
            patient,
            VERIFY_EMAIL_SUBJECT,
            BuiltinTemplate::VerifyEmail,
            TemplateContext::new(),
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        domain::{
            OrganizationId, PatientId,
            address::EmailAddress,
            profile::{InMemoryProfileRepository, PreferredEmail, ProfileRepository},
            template::{InMemoryTemplateRepository, TemplateRenderer},
        },
        ports::{email::MockEmailPort, patient::PatientSummary},
        workflow::send_email::SendEmailUseCaseImpl,
    };

    use super::*;

    type TestSendEmail =
        SendEmailUseCaseImpl<MockEmailPort, InMemoryProfileRepository, InMemoryTemplateRepository>;

    fn setup() -> (
        MockEmailPort,
        PatientNotificationUseCaseImpl<TestSendEmail>,
        PatientSummary,
    ) {
        setup_with_addresses(Some("florence@example.com"), None, PreferredEmail::Primary)
    }

    fn setup_with_addresses(
        email: Option<&str>,
        secondary_email: Option<&str>,
        preferred: PreferredEmail,
    ) -> (
        MockEmailPort,
        PatientNotificationUseCaseImpl<TestSendEmail>,
        PatientSummary,
    ) {
        let email_port = MockEmailPort::default();
        let profiles = Arc::new(InMemoryProfileRepository::new());
        let patient = PatientSummary {
            id: PatientId(9),
            full_name: "Florence Nightingale".to_string(),
            organization: OrganizationId(2),
        };
        let mut profile = profiles
            .get_or_create_profile(patient.id, patient.organization)
            .unwrap();
        profile.email = email.map(|e| EmailAddress::parse(e).unwrap());
        profile.secondary_email = secondary_email.map(|e| EmailAddress::parse(e).unwrap());
        profile.preferred = preferred;
        profiles.save_profile(&profile).unwrap();

        let send_email = Arc::new(SendEmailUseCaseImpl::new(
            Arc::new(email_port.clone()),
            profiles,
            Arc::new(InMemoryTemplateRepository::new()),
            Arc::new(TemplateRenderer::new()),
        ));
        (
            email_port,
            PatientNotificationUseCaseImpl::new(send_email),
            patient,
        )
    }

    #[test]
    fn test_appointment_reminder() {
        let (email_port, use_case, patient) = setup();
        use_case
            .send_appointment_reminder(&patient, "2024-01-15", Some("09:30"))
            .unwrap();
        let messages = email_port.get_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].subject, APPOINTMENT_REMINDER_SUBJECT);
        assert!(
            messages[0]
                .text_body
                .contains("upcoming appointment on 2024-01-15 at 09:30.")
        );
    }

    #[test]
    fn test_appointment_reminder_without_time() {
        let (email_port, use_case, patient) = setup();
        use_case
            .send_appointment_reminder(&patient, "2024-01-15", None)
            .unwrap();
        let messages = email_port.get_messages();
        assert!(
            messages[0]
                .text_body
                .contains("upcoming appointment on 2024-01-15.")
        );
    }

    #[test]
    fn test_canned_subjects() {
        let (email_port, use_case, patient) = setup();
        use_case.send_welcome_email(&patient).unwrap();
        use_case
            .send_care_plan_update(&patient, "Physiotherapy twice a week")
            .unwrap();
        use_case.send_verification_email(&patient).unwrap();

        let messages = email_port.get_messages();
        let subjects: Vec<&str> = messages.iter().map(|m| m.subject.as_str()).collect();
        assert_eq!(
            subjects,
            vec![WELCOME_SUBJECT, CARE_PLAN_UPDATE_SUBJECT, VERIFY_EMAIL_SUBJECT]
        );
        assert!(messages[1].text_body.contains("Physiotherapy twice a week"));
        assert!(messages[0].text_body.ends_with("Kind regards,\nYour care team"));
        assert!(messages[2].text_body.contains("florence@example.com"));
    }

    #[test]
    fn test_verification_names_the_receiving_address() {
        let (email_port, use_case, patient) =
            setup_with_addresses(None, Some("sec@example.com"), PreferredEmail::Secondary);
        use_case.send_verification_email(&patient).unwrap();

        let messages = email_port.get_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].to.as_str(), "sec@example.com");
        assert!(
            messages[0]
                .text_body
                .contains("Please confirm that sec@example.com is the right address")
        );
        assert!(!messages[0].text_body.contains("None"));

        let (email_port, use_case, patient) = setup_with_addresses(
            Some("florence@example.com"),
            Some("sec@example.com"),
            PreferredEmail::Secondary,
        );
        use_case.send_verification_email(&patient).unwrap();
        let messages = email_port.get_messages();
        assert_eq!(messages[0].to.as_str(), "sec@example.com");
        assert!(messages[0].text_body.contains("sec@example.com"));
        assert!(!messages[0].text_body.contains("florence@example.com"));
    }
}
