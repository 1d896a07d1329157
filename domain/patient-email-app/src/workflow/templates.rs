use std::sync::Arc;

use crate::domain::{
    OrganizationId, RepoCreateError, RepoRetrieveError, RepoUpdateError,
    template::{
        EmailTemplate, TemplateDraft, TemplateError, TemplateRepository, normalize_template_name,
    },
};

pub trait ManageTemplatesUseCase {
    fn create_template(
        &self,
        organization: OrganizationId,
        draft: TemplateDraft,
    ) -> Result<EmailTemplate, TemplateError>;
    fn update_template(
        &self,
        organization: OrganizationId,
        draft: TemplateDraft,
    ) -> Result<EmailTemplate, TemplateError>;
    fn get_template(
        &self,
        organization: OrganizationId,
        name: &str,
    ) -> Result<EmailTemplate, TemplateError>;
    fn list_active_templates(
        &self,
        organization: OrganizationId,
    ) -> Result<Vec<EmailTemplate>, TemplateError>;
}

pub struct ManageTemplatesUseCaseImpl<TR: TemplateRepository> {
    template_repository: Arc<TR>,
}

impl<TR: TemplateRepository> ManageTemplatesUseCaseImpl<TR> {
    pub fn new(template_repository: Arc<TR>) -> Self {
        Self {
            template_repository,
        }
    }
}

impl<TR: TemplateRepository + Send + Sync + 'static> ManageTemplatesUseCase
    for ManageTemplatesUseCaseImpl<TR>
{
    fn create_template(
        &self,
        organization: OrganizationId,
        draft: TemplateDraft,
    ) -> Result<EmailTemplate, TemplateError> {
        let template = EmailTemplate::from_draft(organization, draft)?;
        match self.template_repository.insert_template(&template) {
            Ok(()) => {
                log::info!(
                    "Created email template {} for organization {}",
                    template.name,
                    organization
                );
                Ok(template)
            }
            Err(RepoCreateError::Conflict) => Err(TemplateError::DuplicateName(template.name)),
            Err(RepoCreateError::StorageError(e)) => Err(TemplateError::Storage(e)),
        }
    }

    fn update_template(
        &self,
        organization: OrganizationId,
        draft: TemplateDraft,
    ) -> Result<EmailTemplate, TemplateError> {
        let template = EmailTemplate::from_draft(organization, draft)?;
        match self.template_repository.update_template(&template) {
            Ok(()) => Ok(template),
            Err(RepoUpdateError::NotFound) => Err(TemplateError::NotFound(template.name)),
            Err(RepoUpdateError::StorageError(e)) => Err(TemplateError::Storage(e)),
        }
    }

    fn get_template(
        &self,
        organization: OrganizationId,
        name: &str,
    ) -> Result<EmailTemplate, TemplateError> {
        let name = normalize_template_name(name);
        match self.template_repository.get_template(organization, &name) {
            Ok(template) => Ok(template),
            Err(RepoRetrieveError::NotFound) => Err(TemplateError::NotFound(name)),
            Err(RepoRetrieveError::StorageError(e)) => Err(TemplateError::Storage(e)),
        }
    }

    fn list_active_templates(
        &self,
        organization: OrganizationId,
    ) -> Result<Vec<EmailTemplate>, TemplateError> {
        let templates = self
            .template_repository
            .list_templates(organization)
            .map_err(|e| TemplateError::Storage(e.to_string()))?;
        Ok(templates.into_iter().filter(|t| t.is_active).collect())
    }
}
