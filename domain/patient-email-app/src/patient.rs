//! Email operations on a host patient.
//!
//! ```ignore
//! let receipt = patient.with_email(&plugin).send_email("Hi", "Test")?;
//! ```

use crate::{
    PatientEmailPlugin,
    domain::{
        address::EmailAddress,
        profile::{PatientEmailProfile, ProfileUpdate},
    },
    ports::patient::PatientRecord,
    workflow::{
        profile::ProfileError,
        send_email::{DeliveryReceipt, SendEmailError, SendEmailRequest},
    },
};

pub struct EmailablePatient<'a, P: PatientRecord> {
    patient: &'a P,
    plugin: &'a PatientEmailPlugin,
}

impl<'a, P: PatientRecord> EmailablePatient<'a, P> {
    pub fn new(patient: &'a P, plugin: &'a PatientEmailPlugin) -> Self {
        Self { patient, plugin }
    }

    pub fn send_email(&self, subject: &str, body: &str) -> Result<DeliveryReceipt, SendEmailError> {
        self.send(SendEmailRequest::plain(subject, body))
    }

    pub fn send(&self, request: SendEmailRequest) -> Result<DeliveryReceipt, SendEmailError> {
        self.plugin
            .send_email_use_case
            .send_email(self.patient, request)
    }

    /// The preferred address, if one is configured.
    pub fn email(&self) -> Option<EmailAddress> {
        self.plugin.profile_use_case.get_email(self.patient.id())
    }

    pub fn has_email(&self) -> bool {
        self.plugin.profile_use_case.has_email(self.patient.id())
    }

    pub fn email_profile(&self) -> Result<PatientEmailProfile, ProfileError> {
        self.plugin
            .profile_use_case
            .get_or_create_profile(self.patient)
    }

    /// Replaces the primary address and keeps the other settings. An empty
    /// string clears it.
    pub fn set_email(&self, email: &str) -> Result<PatientEmailProfile, ProfileError> {
        let profile = self.email_profile()?;
        let update = ProfileUpdate {
            email: Some(email.to_string()),
            secondary_email: profile.secondary_email.map(|e| e.to_string()),
            notifications_enabled: profile.notifications_enabled,
            preferred: profile.preferred,
        };
        self.plugin
            .profile_use_case
            .update_profile(self.patient, &update)
    }

    pub fn send_appointment_reminder(
        &self,
        appointment_date: &str,
        appointment_time: Option<&str>,
    ) -> Result<DeliveryReceipt, SendEmailError> {
        self.plugin.notification_use_case.send_appointment_reminder(
            self.patient,
            appointment_date,
            appointment_time,
        )
    }

    pub fn send_welcome_email(&self) -> Result<DeliveryReceipt, SendEmailError> {
        self.plugin
            .notification_use_case
            .send_welcome_email(self.patient)
    }

    pub fn send_care_plan_update(
        &self,
        care_plan_details: &str,
    ) -> Result<DeliveryReceipt, SendEmailError> {
        self.plugin
            .notification_use_case
            .send_care_plan_update(self.patient, care_plan_details)
    }
}

pub trait PatientEmailExt: PatientRecord + Sized {
    fn with_email<'a>(&'a self, plugin: &'a PatientEmailPlugin) -> EmailablePatient<'a, Self> {
        EmailablePatient::new(self, plugin)
    }
}

impl<P: PatientRecord> PatientEmailExt for P {}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{
        build_plugin,
        domain::{
            OrganizationId, PatientId, ValidationError,
            message::EmailMessage,
            profile::InMemoryProfileRepository,
            template::InMemoryTemplateRepository,
        },
        ports::{
            email::{MockEmailPort, TransportError},
            patient::InMemoryPatientDirectory,
        },
        workflow::notifications::WELCOME_SUBJECT,
    };

    use super::*;

    /// A host type the plugin knows nothing about beyond the port.
    struct HostPatient {
        pk: i64,
        first_name: &'static str,
        last_name: &'static str,
    }

    impl PatientRecord for HostPatient {
        fn id(&self) -> PatientId {
            PatientId(self.pk)
        }

        fn full_name(&self) -> String {
            format!("{} {}", self.first_name, self.last_name)
        }

        fn organization(&self) -> OrganizationId {
            OrganizationId(1)
        }
    }

    fn host_patient() -> HostPatient {
        HostPatient {
            pk: 8,
            first_name: "Grace",
            last_name: "Hopper",
        }
    }

    fn plugin_with_port(email_port: MockEmailPort) -> PatientEmailPlugin {
        build_plugin(
            Arc::new(email_port),
            Arc::new(InMemoryProfileRepository::new()),
            Arc::new(InMemoryTemplateRepository::new()),
            Arc::new(InMemoryPatientDirectory::new()),
        )
    }

    #[test]
    fn test_send_email_to_configured_address() {
        let email_port = MockEmailPort::default();
        let plugin = plugin_with_port(email_port.clone());
        let host = host_patient();
        let patient = host.with_email(&plugin);

        assert!(!patient.has_email());
        patient.set_email("a@b.com").unwrap();
        assert!(patient.has_email());
        assert_eq!(patient.email().map(|e| e.to_string()), Some("a@b.com".to_string()));

        patient.send_email("Hi", "Test").unwrap();

        let messages = email_port.get_messages();
        assert_eq!(messages.len(), 1);
        assert!(matches!(
            &messages[0],
            EmailMessage { to, subject, text_body, .. }
                if to.as_str() == "a@b.com" && subject == "Hi" && text_body == "Test"
        ));
        assert!(patient.email_profile().unwrap().last_email_sent.is_some());
    }

    #[test]
    fn test_empty_address_is_a_validation_error() {
        let email_port = MockEmailPort::default();
        let plugin = plugin_with_port(email_port.clone());
        let host = host_patient();
        let patient = host.with_email(&plugin);

        assert!(matches!(
            patient.set_email(""),
            Err(ProfileError::Validation(..))
        ));
        assert_eq!(
            patient.send_email("Hi", "Test"),
            Err(SendEmailError::Validation(ValidationError::MissingAddress))
        );
        assert!(matches!(
            patient.set_email("not-an-address"),
            Err(ProfileError::Validation(ValidationError::MalformedAddress(..)))
        ));
        assert!(email_port.get_messages().is_empty());
    }

    #[test]
    fn test_unreachable_transport_is_reported() {
        let email_port = MockEmailPort::failing(TransportError::Send(
            "connection refused".to_string(),
        ));
        let plugin = plugin_with_port(email_port);
        let host = host_patient();
        let patient = host.with_email(&plugin);
        patient.set_email("a@b.com").unwrap();

        assert!(matches!(
            patient.send_email("Hi", "Test"),
            Err(SendEmailError::Transport(TransportError::Send(..)))
        ));
        assert_eq!(patient.email_profile().unwrap().last_email_sent, None);
    }

    #[test]
    fn test_canned_notifications() {
        let email_port = MockEmailPort::default();
        let plugin = plugin_with_port(email_port.clone());
        let host = host_patient();
        let patient = host.with_email(&plugin);
        patient.set_email("grace@example.com").unwrap();

        patient.send_welcome_email().unwrap();
        patient
            .send_appointment_reminder("2026-11-02", Some("09:30"))
            .unwrap();
        patient.send_care_plan_update("Walk daily.").unwrap();

        let messages = email_port.get_messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].subject, WELCOME_SUBJECT);
        assert!(
            messages[0]
                .html_body
                .as_deref()
                .is_some_and(|html| html.contains("Grace Hopper"))
        );
        assert!(messages[1].text_body.contains("2026-11-02 at 09:30"));
        assert!(messages[2].text_body.contains("Walk daily."));
    }
}
