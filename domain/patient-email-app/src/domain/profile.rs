use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::json;

use crate::domain::{
    OrganizationId, PatientId, RepoError, RepoRetrieveError, ValidationError,
    address::EmailAddress,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PreferredEmail {
    #[default]
    Primary,
    Secondary,
}

/// Email settings the plugin keeps for each patient of the host application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatientEmailProfile {
    pub patient_id: PatientId,
    pub organization: OrganizationId,
    pub email: Option<EmailAddress>,
    pub secondary_email: Option<EmailAddress>,
    pub email_verified: bool,
    pub notifications_enabled: bool,
    pub preferred: PreferredEmail,
    pub bounced: bool,
    pub last_email_sent: Option<DateTime<Utc>>,
}

impl PatientEmailProfile {
    pub fn new(patient_id: PatientId, organization: OrganizationId) -> Self {
        Self {
            patient_id,
            organization,
            email: None,
            secondary_email: None,
            email_verified: false,
            notifications_enabled: true,
            preferred: PreferredEmail::Primary,
            bounced: false,
            last_email_sent: None,
        }
    }

    /// The address notifications go to: the secondary one only when it is
    /// preferred and present, otherwise primary with secondary as fallback.
    pub fn preferred_email(&self) -> Option<&EmailAddress> {
        if self.preferred == PreferredEmail::Secondary && self.secondary_email.is_some() {
            return self.secondary_email.as_ref();
        }
        self.email.as_ref().or(self.secondary_email.as_ref())
    }

    pub fn has_email(&self) -> bool {
        self.preferred_email().is_some()
    }

    pub fn template_context(&self) -> serde_json::Value {
        json!({
            "email": self.email,
            "secondary_email": self.secondary_email,
            "preferred_email": self.preferred_email(),
            "preferred": self.preferred,
            "email_verified": self.email_verified,
            "notifications_enabled": self.notifications_enabled,
            "bounced": self.bounced,
            "last_email_sent": self
                .last_email_sent
                .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string()),
        })
    }

    /// Validates the whole update before touching any field.
    pub fn apply_update(&mut self, update: &ProfileUpdate) -> Result<(), ValidationError> {
        let email = EmailAddress::parse_optional(update.email.as_deref())?;
        let secondary_email = EmailAddress::parse_optional(update.secondary_email.as_deref())?;

        if update.notifications_enabled && email.is_none() && secondary_email.is_none() {
            return Err(ValidationError::Profile(
                "At least one email address is required when email notifications are enabled."
                    .to_string(),
            ));
        }
        match update.preferred {
            PreferredEmail::Secondary if secondary_email.is_none() => {
                return Err(ValidationError::Profile(
                    "Secondary email address is required when it's set as preferred.".to_string(),
                ));
            }
            PreferredEmail::Primary if email.is_none() => {
                return Err(ValidationError::Profile(
                    "Primary email address is required when it's set as preferred.".to_string(),
                ));
            }
            _ => {}
        }

        self.email = email;
        self.secondary_email = secondary_email;
        self.notifications_enabled = update.notifications_enabled;
        self.preferred = update.preferred;
        Ok(())
    }
}

impl std::fmt::Display for PatientEmailProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.preferred_email() {
            Some(email) => write!(f, "patient {} - {}", self.patient_id, email),
            None => write!(f, "patient {} - no email", self.patient_id),
        }
    }
}

/// Raw values submitted when editing a profile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub email: Option<String>,
    pub secondary_email: Option<String>,
    pub notifications_enabled: bool,
    pub preferred: PreferredEmail,
}

pub trait ProfileRepository {
    fn get_profile(&self, patient_id: PatientId) -> Result<PatientEmailProfile, RepoRetrieveError>;
    fn get_or_create_profile(
        &self,
        patient_id: PatientId,
        organization: OrganizationId,
    ) -> Result<PatientEmailProfile, RepoError>;
    fn save_profile(&self, profile: &PatientEmailProfile) -> Result<(), RepoError>;
    fn record_email_sent(&self, patient_id: PatientId, at: DateTime<Utc>) -> Result<(), RepoError>;
}

pub struct InMemoryProfileRepository {
    profiles: DashMap<PatientId, PatientEmailProfile>,
}

impl InMemoryProfileRepository {
    pub fn new() -> Self {
        Self {
            profiles: DashMap::new(),
        }
    }
}

impl ProfileRepository for InMemoryProfileRepository {
    fn get_profile(&self, patient_id: PatientId) -> Result<PatientEmailProfile, RepoRetrieveError> {
        self.profiles
            .get(&patient_id)
            .map(|profile| profile.clone())
            .ok_or(RepoRetrieveError::NotFound)
    }

    fn get_or_create_profile(
        &self,
        patient_id: PatientId,
        organization: OrganizationId,
    ) -> Result<PatientEmailProfile, RepoError> {
        let profile = self
            .profiles
            .entry(patient_id)
            .or_insert_with(|| PatientEmailProfile::new(patient_id, organization));
        Ok(profile.clone())
    }

    fn save_profile(&self, profile: &PatientEmailProfile) -> Result<(), RepoError> {
        self.profiles.insert(profile.patient_id, profile.clone());
        Ok(())
    }

    fn record_email_sent(&self, patient_id: PatientId, at: DateTime<Utc>) -> Result<(), RepoError> {
        let Some(mut profile) = self.profiles.get_mut(&patient_id) else {
            return Err(RepoError::StorageError(format!(
                "no email profile for patient {}",
                patient_id
            )));
        };
        profile.last_email_sent = Some(at);
        Ok(())
    }
}
