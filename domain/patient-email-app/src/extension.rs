//! Registration of the plugin's capabilities on the host's `Patient` model.
//!
//! The host declares its models on an [`ExtensionRegistry`] before plugins
//! load. [`register_patient_email`] then records which capabilities and
//! fields this plugin attaches and registers its template hooks. Running it
//! again is a no-op.

use dashmap::{DashMap, mapref::entry::Entry};
use thiserror::Error;

use crate::{PLUGIN_ID, PatientEmailPlugin, hooks::TemplateHookRegistry};

pub const PATIENT_MODEL: &str = "Patient";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CapabilityKind {
    Method,
    Field,
}

pub const PATIENT_EMAIL_CAPABILITIES: [(&str, CapabilityKind); 8] = [
    ("get_email_profile", CapabilityKind::Method),
    ("send_email", CapabilityKind::Method),
    ("has_email", CapabilityKind::Method),
    ("get_email", CapabilityKind::Method),
    ("send_appointment_reminder", CapabilityKind::Method),
    ("send_welcome_email", CapabilityKind::Method),
    ("send_care_plan_update", CapabilityKind::Method),
    ("email_profile", CapabilityKind::Field),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("host model {0:?} is not declared")]
    MissingHostModel(String),

    #[error("host model {model:?} cannot be extended: {reason}")]
    IncompatibleHostModel { model: String, reason: String },

    #[error("capability {capability:?} on {model:?} is already provided by {owner:?}")]
    CapabilityConflict {
        model: String,
        capability: String,
        owner: String,
    },

    #[error("missing setting {0}")]
    MissingSetting(&'static str),

    #[error("invalid setting: {0}")]
    InvalidSetting(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Registered,
    AlreadyRegistered,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostModel {
    pub name: String,
    pub primary_key: Option<String>,
    pub fields: Vec<String>,
}

impl HostModel {
    pub fn new(name: &str, primary_key: Option<&str>, fields: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            primary_key: primary_key.map(str::to_string),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct CapabilityOwner {
    plugin_id: String,
    kind: CapabilityKind,
}

pub struct ExtensionRegistry {
    models: DashMap<String, HostModel>,
    capabilities: DashMap<(String, String), CapabilityOwner>,
    template_hooks: TemplateHookRegistry,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self {
            models: DashMap::new(),
            capabilities: DashMap::new(),
            template_hooks: TemplateHookRegistry::new(),
        }
    }

    pub fn declare_model(&self, model: HostModel) {
        self.models.insert(model.name.clone(), model);
    }

    pub fn model(&self, name: &str) -> Option<HostModel> {
        self.models.get(name).map(|m| m.clone())
    }

    pub fn template_hooks(&self) -> &TemplateHookRegistry {
        &self.template_hooks
    }

    pub fn capability_owner(&self, model: &str, capability: &str) -> Option<String> {
        self.capabilities
            .get(&(model.to_string(), capability.to_string()))
            .map(|owner| owner.plugin_id.clone())
    }

    /// Capabilities attached to `model`, sorted by name.
    pub fn capabilities_of(&self, model: &str) -> Vec<(String, CapabilityKind)> {
        let mut capabilities: Vec<(String, CapabilityKind)> = self
            .capabilities
            .iter()
            .filter(|entry| entry.key().0 == model)
            .map(|entry| (entry.key().1.clone(), entry.value().kind))
            .collect();
        capabilities.sort_by(|a, b| a.0.cmp(&b.0));
        capabilities
    }

    /// Checks every capability before attaching any, so a conflict leaves
    /// the registry untouched.
    pub fn attach_capabilities(
        &self,
        model: &str,
        plugin_id: &str,
        capabilities: &[(&str, CapabilityKind)],
    ) -> Result<RegistrationOutcome, ConfigurationError> {
        let mut missing = Vec::new();
        for (capability, kind) in capabilities {
            match self.capability_owner(model, capability) {
                Some(owner) if owner != plugin_id => {
                    return Err(ConfigurationError::CapabilityConflict {
                        model: model.to_string(),
                        capability: capability.to_string(),
                        owner,
                    });
                }
                Some(_) => {}
                None => missing.push((*capability, *kind)),
            }
        }

        if missing.is_empty() {
            return Ok(RegistrationOutcome::AlreadyRegistered);
        }

        for (capability, kind) in missing {
            match self
                .capabilities
                .entry((model.to_string(), capability.to_string()))
            {
                Entry::Occupied(entry) if entry.get().plugin_id != plugin_id => {
                    return Err(ConfigurationError::CapabilityConflict {
                        model: model.to_string(),
                        capability: capability.to_string(),
                        owner: entry.get().plugin_id.clone(),
                    });
                }
                Entry::Occupied(_) => {}
                Entry::Vacant(entry) => {
                    entry.insert(CapabilityOwner {
                        plugin_id: plugin_id.to_string(),
                        kind,
                    });
                }
            }
        }
        Ok(RegistrationOutcome::Registered)
    }
}

/// Attaches the email capabilities and template hooks to the host patient
/// model. Registering again is a no-op that reports `AlreadyRegistered`,
/// even with a different plugin instance: the hooks of the first
/// registration stay in place.
pub fn register_patient_email(
    registry: &ExtensionRegistry,
    plugin: &PatientEmailPlugin,
) -> Result<RegistrationOutcome, ConfigurationError> {
    let model = registry
        .model(PATIENT_MODEL)
        .ok_or_else(|| ConfigurationError::MissingHostModel(PATIENT_MODEL.to_string()))?;

    if model.primary_key.is_none() {
        return Err(ConfigurationError::IncompatibleHostModel {
            model: model.name,
            reason: "model has no primary key".to_string(),
        });
    }
    if let Some((name, _)) = PATIENT_EMAIL_CAPABILITIES
        .iter()
        .find(|(name, _)| model.fields.iter().any(|field| field == name))
    {
        return Err(ConfigurationError::IncompatibleHostModel {
            model: model.name,
            reason: format!("model already defines a native {:?} field", name),
        });
    }

    let outcome =
        registry.attach_capabilities(PATIENT_MODEL, PLUGIN_ID, &PATIENT_EMAIL_CAPABILITIES)?;

    for registered in &plugin.template_hooks {
        registry.template_hooks().register_hook(
            registered.hook_point,
            PLUGIN_ID,
            registered.priority,
            registered.hook.clone(),
        );
    }

    match outcome {
        RegistrationOutcome::Registered => {
            log::info!("Patient email extension registered on {}", PATIENT_MODEL)
        }
        RegistrationOutcome::AlreadyRegistered => {
            log::debug!("Patient email extension already registered")
        }
    }
    Ok(outcome)
}
