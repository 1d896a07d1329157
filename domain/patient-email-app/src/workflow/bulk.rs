use std::sync::Arc;

use crate::{
    domain::{OrganizationId, PatientId, address::EmailAddress, template::TemplateContext},
    ports::patient::{PatientDirectory, PatientSummary},
    workflow::{
        profile::ManageProfileUseCase,
        send_email::{
            DeliveryReceipt, SendEmailError, SendEmailRequest, SendEmailUseCase, TemplateSource,
        },
    },
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecipientFilter {
    AllActive,
    /// Active patients whose profile resolves to an address.
    WithEmail,
    Custom(Vec<PatientId>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct BulkEmailRequest {
    pub filter: RecipientFilter,
    pub subject: String,
    pub message: String,
    pub template: Option<TemplateSource>,
    /// When set, only this address receives a single test message.
    pub test_recipient: Option<EmailAddress>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BulkEmailReport {
    pub sent: Vec<PatientId>,
    pub failed: Vec<(PatientId, SendEmailError)>,
    pub test_delivery: Option<DeliveryReceipt>,
}

pub trait BulkEmailUseCase {
    fn send_bulk(
        &self,
        organization: OrganizationId,
        request: BulkEmailRequest,
    ) -> Result<BulkEmailReport, SendEmailError>;
}

pub struct BulkEmailUseCaseImpl<S: SendEmailUseCase, P: ManageProfileUseCase, D: PatientDirectory>
{
    send_email_use_case: Arc<S>,
    profile_use_case: Arc<P>,
    patient_directory: Arc<D>,
}

impl<S: SendEmailUseCase, P: ManageProfileUseCase, D: PatientDirectory>
    BulkEmailUseCaseImpl<S, P, D>
{
    pub fn new(
        send_email_use_case: Arc<S>,
        profile_use_case: Arc<P>,
        patient_directory: Arc<D>,
    ) -> Self {
        Self {
            send_email_use_case,
            profile_use_case,
            patient_directory,
        }
    }

    fn resolve_recipients(
        &self,
        organization: OrganizationId,
        filter: &RecipientFilter,
        report: &mut BulkEmailReport,
    ) -> Vec<PatientSummary> {
        match filter {
            RecipientFilter::AllActive => self.patient_directory.active_patients(organization),
            RecipientFilter::WithEmail => self
                .patient_directory
                .active_patients(organization)
                .into_iter()
                .filter(|patient| self.profile_use_case.has_email(patient.id))
                .collect(),
            RecipientFilter::Custom(ids) => {
                let mut patients = Vec::with_capacity(ids.len());
                for id in ids {
                    match self.patient_directory.find_patient(organization, *id) {
                        Some(patient) => patients.push(patient),
                        None => report
                            .failed
                            .push((*id, SendEmailError::UnknownPatient(*id))),
                    }
                }
                patients
            }
        }
    }
}

impl<S, P, D> BulkEmailUseCase for BulkEmailUseCaseImpl<S, P, D>
where
    S: SendEmailUseCase + Send + Sync + 'static,
    P: ManageProfileUseCase + Send + Sync + 'static,
    D: PatientDirectory + Send + Sync + 'static,
{
    fn send_bulk(
        &self,
        organization: OrganizationId,
        request: BulkEmailRequest,
    ) -> Result<BulkEmailReport, SendEmailError> {
        let email_request = SendEmailRequest {
            subject: request.subject,
            message: Some(request.message),
            template: request.template,
            context: TemplateContext::new(),
            ..Default::default()
        };

        let mut report = BulkEmailReport::default();
        if let Some(tester) = &request.test_recipient {
            let receipt =
                self.send_email_use_case
                    .send_test_email(organization, tester, email_request)?;
            report.test_delivery = Some(receipt);
            return Ok(report);
        }

        let recipients = self.resolve_recipients(organization, &request.filter, &mut report);
        for patient in &recipients {
            match self
                .send_email_use_case
                .send_email(patient, email_request.clone())
            {
                Ok(_) => report.sent.push(patient.id),
                Err(e) => report.failed.push((patient.id, e)),
            }
        }
        log::info!(
            "Bulk email for organization {}: {} sent, {} failed",
            organization,
            report.sent.len(),
            report.failed.len()
        );
        Ok(report)
    }
}
