use std::sync::LazyLock;

use dashmap::DashMap;
use minijinja::Environment;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::domain::{
    OrganizationId, RepoCreateError, RepoError, RepoRetrieveError, RepoUpdateError,
};

pub const MAX_TEMPLATE_NAME_LEN: usize = 100;
pub const MAX_SUBJECT_LEN: usize = 200;

pub type TemplateContext = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("a template named {0:?} already exists")]
    DuplicateName(String),

    #[error("template {0:?} not found")]
    NotFound(String),

    #[error("template {0:?} is not active")]
    Inactive(String),

    #[error("invalid template: {0}")]
    Invalid(String),

    #[error("failed to render template: {0}")]
    Render(String),

    #[error("template storage failed: {0}")]
    Storage(String),
}

impl From<minijinja::Error> for TemplateError {
    fn from(value: minijinja::Error) -> Self {
        TemplateError::Render(value.to_string())
    }
}

/// Templates shipped with the plugin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuiltinTemplate {
    AppointmentReminder,
    Welcome,
    CarePlanUpdate,
    VerifyEmail,
    DetailEmailSection,
    EditEmailSection,
    SidebarEmailWidget,
}

impl BuiltinTemplate {
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinTemplate::AppointmentReminder => {
                "patient_email/emails/appointment_reminder.html"
            }
            BuiltinTemplate::Welcome => "patient_email/emails/welcome.html",
            BuiltinTemplate::CarePlanUpdate => "patient_email/emails/care_plan_update.html",
            BuiltinTemplate::VerifyEmail => "patient_email/emails/verify_email.html",
            BuiltinTemplate::DetailEmailSection => {
                "patient_email/partials/patient_detail_email_section.html"
            }
            BuiltinTemplate::EditEmailSection => {
                "patient_email/partials/patient_edit_email_section.html"
            }
            BuiltinTemplate::SidebarEmailWidget => {
                "patient_email/partials/patient_detail_sidebar_email_widget.html"
            }
        }
    }

    fn source(&self) -> &'static str {
        match self {
            BuiltinTemplate::AppointmentReminder => {
                include_str!("../../templates/patient_email/emails/appointment_reminder.html")
            }
            BuiltinTemplate::Welcome => {
                include_str!("../../templates/patient_email/emails/welcome.html")
            }
            BuiltinTemplate::CarePlanUpdate => {
                include_str!("../../templates/patient_email/emails/care_plan_update.html")
            }
            BuiltinTemplate::VerifyEmail => {
                include_str!("../../templates/patient_email/emails/verify_email.html")
            }
            BuiltinTemplate::DetailEmailSection => include_str!(
                "../../templates/patient_email/partials/patient_detail_email_section.html"
            ),
            BuiltinTemplate::EditEmailSection => include_str!(
                "../../templates/patient_email/partials/patient_edit_email_section.html"
            ),
            BuiltinTemplate::SidebarEmailWidget => include_str!(
                "../../templates/patient_email/partials/patient_detail_sidebar_email_widget.html"
            ),
        }
    }
}

/// Lowercases the name and replaces spaces with underscores.
pub fn normalize_template_name(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

static LINE_BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").expect("line break pattern is valid"));

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag pattern is valid"));

static BLANK_LINES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*(\n[ \t]*)+").expect("blank line pattern is valid"));

/// Plain-text rendition of an HTML body.
pub fn strip_tags(html: &str) -> String {
    let text = LINE_BREAK_RE.replace_all(html, "\n");
    let text = TAG_RE.replace_all(&text, "");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&#x2f;", "/")
        .replace("&#47;", "/")
        .replace("&amp;", "&");
    let text = BLANK_LINES_RE.replace_all(&text, "\n\n");
    text.lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

pub struct RenderedEmail {
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

pub struct TemplateRenderer {
    env: Environment<'static>,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self {
            env: Environment::new(),
        }
    }

    pub fn render_builtin<S: Serialize>(
        &self,
        template: BuiltinTemplate,
        context: S,
    ) -> Result<String, TemplateError> {
        Ok(self
            .env
            .render_named_str(template.name(), template.source(), context)?)
    }

    /// Renders subject, HTML and text of an organization template.
    pub fn render_stored<S: Serialize>(
        &self,
        template: &EmailTemplate,
        context: S,
    ) -> Result<RenderedEmail, TemplateError> {
        let subject = self
            .env
            .render_named_str("subject.txt", &template.subject, &context)?;
        let html_body = self.env.render_named_str(
            &format!("{}.html", template.name),
            &template.html_content,
            &context,
        )?;
        let text_body = if template.text_content.trim().is_empty() {
            strip_tags(&html_body)
        } else {
            self.env.render_named_str(
                &format!("{}.txt", template.name),
                &template.text_content,
                &context,
            )?
        };
        Ok(RenderedEmail {
            subject: subject.trim().to_string(),
            html_body,
            text_body,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TemplateDraft {
    pub name: String,
    pub subject: String,
    pub html_content: String,
    pub text_content: String,
    pub description: String,
    pub is_active: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailTemplate {
    pub organization: OrganizationId,
    pub name: String,
    pub subject: String,
    pub html_content: String,
    pub text_content: String,
    pub description: String,
    pub is_active: bool,
}

impl EmailTemplate {
    pub fn from_draft(
        organization: OrganizationId,
        draft: TemplateDraft,
    ) -> Result<Self, TemplateError> {
        let name = normalize_template_name(&draft.name);
        if name.is_empty() {
            return Err(TemplateError::Invalid("name must not be empty".to_string()));
        }
        if name.chars().count() > MAX_TEMPLATE_NAME_LEN {
            return Err(TemplateError::Invalid(format!(
                "name must be at most {} characters",
                MAX_TEMPLATE_NAME_LEN
            )));
        }
        if draft.subject.trim().is_empty() {
            return Err(TemplateError::Invalid("subject must not be empty".to_string()));
        }
        if draft.subject.chars().count() > MAX_SUBJECT_LEN {
            return Err(TemplateError::Invalid(format!(
                "subject must be at most {} characters",
                MAX_SUBJECT_LEN
            )));
        }
        if draft.html_content.trim().is_empty() {
            return Err(TemplateError::Invalid(
                "html content must not be empty".to_string(),
            ));
        }
        Ok(Self {
            organization,
            name,
            subject: draft.subject,
            html_content: draft.html_content,
            text_content: draft.text_content,
            description: draft.description,
            is_active: draft.is_active,
        })
    }
}

pub trait TemplateRepository {
    fn get_template(
        &self,
        organization: OrganizationId,
        name: &str,
    ) -> Result<EmailTemplate, RepoRetrieveError>;
    fn insert_template(&self, template: &EmailTemplate) -> Result<(), RepoCreateError>;
    fn update_template(&self, template: &EmailTemplate) -> Result<(), RepoUpdateError>;
    fn list_templates(&self, organization: OrganizationId) -> Result<Vec<EmailTemplate>, RepoError>;
}

pub struct InMemoryTemplateRepository {
    templates: DashMap<(OrganizationId, String), EmailTemplate>,
}

impl InMemoryTemplateRepository {
    pub fn new() -> Self {
        Self {
            templates: DashMap::new(),
        }
    }
}

impl TemplateRepository for InMemoryTemplateRepository {
    fn get_template(
        &self,
        organization: OrganizationId,
        name: &str,
    ) -> Result<EmailTemplate, RepoRetrieveError> {
        self.templates
            .get(&(organization, name.to_string()))
            .map(|t| t.clone())
            .ok_or(RepoRetrieveError::NotFound)
    }

    fn insert_template(&self, template: &EmailTemplate) -> Result<(), RepoCreateError> {
        let key = (template.organization, template.name.clone());
        match self.templates.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(RepoCreateError::Conflict),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(template.clone());
                Ok(())
            }
        }
    }

    fn update_template(&self, template: &EmailTemplate) -> Result<(), RepoUpdateError> {
        let key = (template.organization, template.name.clone());
        let Some(mut existing) = self.templates.get_mut(&key) else {
            return Err(RepoUpdateError::NotFound);
        };
        *existing = template.clone();
        Ok(())
    }

    fn list_templates(
        &self,
        organization: OrganizationId,
    ) -> Result<Vec<EmailTemplate>, RepoError> {
        let mut templates: Vec<EmailTemplate> = self
            .templates
            .iter()
            .filter(|entry| entry.key().0 == organization)
            .map(|entry| entry.value().clone())
            .collect();
        templates.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(templates)
    }
}
