use std::sync::Arc;

use crate::{
    domain::{
        profile::ProfileRepository,
        template::{TemplateRenderer, TemplateRepository},
    },
    hooks::{ArcTemplateHook, HookPoint, PatientEmailHook, PatientEmailHookKind},
    ports::{email::EmailPort, patient::PatientDirectory},
    workflow::{
        bulk::{BulkEmailUseCase, BulkEmailUseCaseImpl},
        notifications::{PatientNotificationUseCase, PatientNotificationUseCaseImpl},
        profile::{ManageProfileUseCase, ManageProfileUseCaseImpl},
        send_email::{SendEmailUseCase, SendEmailUseCaseImpl},
        templates::{ManageTemplatesUseCase, ManageTemplatesUseCaseImpl},
    },
};

pub mod domain;
pub mod extension;
pub mod hooks;
pub mod patient;
pub mod ports;
pub mod workflow;

pub const PLUGIN_ID: &str = "patient_email_plugin";

pub struct RegisteredTemplateHook {
    pub hook_point: HookPoint,
    pub priority: i32,
    pub hook: ArcTemplateHook,
}

pub struct PatientEmailPlugin {
    pub send_email_use_case: Arc<dyn SendEmailUseCase + Send + Sync>,
    pub profile_use_case: Arc<dyn ManageProfileUseCase + Send + Sync>,
    pub notification_use_case: Arc<dyn PatientNotificationUseCase + Send + Sync>,
    pub templates_use_case: Arc<dyn ManageTemplatesUseCase + Send + Sync>,
    pub bulk_email_use_case: Arc<dyn BulkEmailUseCase + Send + Sync>,

    pub template_hooks: Vec<RegisteredTemplateHook>,
}

pub fn build_plugin<
    E: EmailPort + Send + Sync + 'static,
    PR: ProfileRepository + Send + Sync + 'static,
    TR: TemplateRepository + Send + Sync + 'static,
    D: PatientDirectory + Send + Sync + 'static,
>(
    email_port: Arc<E>,
    profile_repository: Arc<PR>,
    template_repository: Arc<TR>,
    patient_directory: Arc<D>,
) -> PatientEmailPlugin {
    let renderer = Arc::new(TemplateRenderer::new());

    let send_email_use_case = Arc::new(SendEmailUseCaseImpl::new(
        email_port,
        profile_repository.clone(),
        template_repository.clone(),
        renderer.clone(),
    ));
    let profile_use_case = Arc::new(ManageProfileUseCaseImpl::new(profile_repository.clone()));

    let template_hooks = [
        PatientEmailHookKind::DetailSection,
        PatientEmailHookKind::EditSection,
        PatientEmailHookKind::SidebarWidget,
    ]
    .into_iter()
    .map(|kind| {
        let hook = PatientEmailHook::new(kind, profile_use_case.clone(), renderer.clone());
        RegisteredTemplateHook {
            hook_point: hook.hook_point(),
            priority: hook.priority(),
            hook: Arc::new(hook),
        }
    })
    .collect();

    PatientEmailPlugin {
        send_email_use_case: send_email_use_case.clone(),
        profile_use_case: profile_use_case.clone(),
        notification_use_case: Arc::new(PatientNotificationUseCaseImpl::new(
            send_email_use_case.clone(),
        )),
        templates_use_case: Arc::new(ManageTemplatesUseCaseImpl::new(template_repository)),
        bulk_email_use_case: Arc::new(BulkEmailUseCaseImpl::new(
            send_email_use_case,
            profile_use_case,
            patient_directory,
        )),
        template_hooks,
    }
}
