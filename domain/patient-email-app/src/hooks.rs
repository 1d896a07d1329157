//! HTML fragments the plugin contributes to the host's patient pages.
//!
//! The host renders a hook point by asking the registry for every fragment
//! registered there, in ascending priority order.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use thiserror::Error;

use crate::{
    domain::template::{BuiltinTemplate, TemplateError, TemplateRenderer},
    ports::patient::PatientRecord,
    workflow::profile::{ManageProfileUseCase, ProfileError},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookPoint {
    PatientDetailSections,
    PatientEditSections,
    PatientSidebarWidgets,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Profile(#[from] ProfileError),
}

pub struct HookContext<'a> {
    pub patient: Option<&'a dyn PatientRecord>,
    pub can_manage_emails: bool,
}

pub trait TemplateHook {
    fn id(&self) -> &'static str;
    fn render(&self, context: &HookContext<'_>) -> Result<String, HookError>;
}

pub type ArcTemplateHook = Arc<dyn TemplateHook + Send + Sync + 'static>;

struct RegisteredHook {
    hook_point: HookPoint,
    plugin_id: String,
    priority: i32,
    hook: ArcTemplateHook,
}

pub struct TemplateHookRegistry {
    hooks: Mutex<Vec<RegisteredHook>>,
}

impl TemplateHookRegistry {
    pub fn new() -> Self {
        Self {
            hooks: Mutex::new(Vec::new()),
        }
    }

    /// Returns false when the same plugin already registered a hook with
    /// this id at this hook point.
    pub fn register_hook(
        &self,
        hook_point: HookPoint,
        plugin_id: &str,
        priority: i32,
        hook: ArcTemplateHook,
    ) -> bool {
        let mut hooks = self.hooks.lock();
        if hooks.iter().any(|registered| {
            registered.hook_point == hook_point
                && registered.plugin_id == plugin_id
                && registered.hook.id() == hook.id()
        }) {
            return false;
        }
        log::debug!(
            "Registered template hook {} of {} at {:?}",
            hook.id(),
            plugin_id,
            hook_point
        );
        hooks.push(RegisteredHook {
            hook_point,
            plugin_id: plugin_id.to_string(),
            priority,
            hook,
        });
        true
    }

    /// (plugin id, hook id) pairs in render order.
    pub fn hooks_at(&self, hook_point: HookPoint) -> Vec<(String, &'static str)> {
        self.ordered(hook_point)
            .iter()
            .map(|(plugin_id, hook)| (plugin_id.clone(), hook.id()))
            .collect()
    }

    pub fn render(
        &self,
        hook_point: HookPoint,
        context: &HookContext<'_>,
    ) -> Result<String, HookError> {
        let mut output = String::new();
        for (_, hook) in self.ordered(hook_point) {
            output.push_str(&hook.render(context)?);
        }
        Ok(output)
    }

    pub(crate) fn ordered(&self, hook_point: HookPoint) -> Vec<(String, ArcTemplateHook)> {
        let hooks = self.hooks.lock();
        let mut matching: Vec<&RegisteredHook> = hooks
            .iter()
            .filter(|registered| registered.hook_point == hook_point)
            .collect();
        matching.sort_by_key(|registered| registered.priority);
        matching
            .into_iter()
            .map(|registered| (registered.plugin_id.clone(), registered.hook.clone()))
            .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatientEmailHookKind {
    DetailSection,
    EditSection,
    SidebarWidget,
}

pub struct PatientEmailHook<P: ManageProfileUseCase> {
    kind: PatientEmailHookKind,
    profile_use_case: Arc<P>,
    renderer: Arc<TemplateRenderer>,
}

impl<P: ManageProfileUseCase> PatientEmailHook<P> {
    pub fn new(
        kind: PatientEmailHookKind,
        profile_use_case: Arc<P>,
        renderer: Arc<TemplateRenderer>,
    ) -> Self {
        Self {
            kind,
            profile_use_case,
            renderer,
        }
    }

    pub fn hook_point(&self) -> HookPoint {
        match self.kind {
            PatientEmailHookKind::DetailSection => HookPoint::PatientDetailSections,
            PatientEmailHookKind::EditSection => HookPoint::PatientEditSections,
            PatientEmailHookKind::SidebarWidget => HookPoint::PatientSidebarWidgets,
        }
    }

    pub fn priority(&self) -> i32 {
        match self.kind {
            PatientEmailHookKind::SidebarWidget => 5,
            _ => 10,
        }
    }
}

impl<P: ManageProfileUseCase> TemplateHook for PatientEmailHook<P> {
    fn id(&self) -> &'static str {
        match self.kind {
            PatientEmailHookKind::DetailSection => "patient_detail_email_section",
            PatientEmailHookKind::EditSection => "patient_edit_email_section",
            PatientEmailHookKind::SidebarWidget => "patient_detail_sidebar_email_widget",
        }
    }

    fn render(&self, context: &HookContext<'_>) -> Result<String, HookError> {
        let Some(patient) = context.patient else {
            return Ok(String::new());
        };
        let patient_context = json!({ "id": patient.id().0, "full_name": patient.full_name() });

        let html = match self.kind {
            PatientEmailHookKind::DetailSection => {
                let profile = self.profile_use_case.find_profile(patient.id())?;
                self.renderer.render_builtin(
                    BuiltinTemplate::DetailEmailSection,
                    json!({
                        "patient": patient_context,
                        "email_profile": profile.map(|p| p.template_context()),
                        "has_email_permission": context.can_manage_emails,
                    }),
                )?
            }
            PatientEmailHookKind::EditSection => {
                let profile = self.profile_use_case.get_or_create_profile(patient)?;
                self.renderer.render_builtin(
                    BuiltinTemplate::EditEmailSection,
                    json!({
                        "patient": patient_context,
                        "email_profile": profile.template_context(),
                        "has_email_permission": context.can_manage_emails,
                    }),
                )?
            }
            PatientEmailHookKind::SidebarWidget => self.renderer.render_builtin(
                BuiltinTemplate::SidebarEmailWidget,
                json!({
                    "patient": patient_context,
                    "has_email": self.profile_use_case.has_email(patient.id()),
                }),
            )?,
        };
        Ok(html)
    }
}
