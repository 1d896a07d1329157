use std::sync::Arc;

use thiserror::Error;

use crate::{
    domain::{
        PatientId, RepoError, RepoRetrieveError, ValidationError,
        address::EmailAddress,
        profile::{PatientEmailProfile, ProfileRepository, ProfileUpdate},
    },
    ports::patient::PatientRecord,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("no email profile for patient {0}")]
    NotFound(PatientId),

    #[error("email profile storage failed: {0}")]
    Repository(String),
}

impl From<RepoError> for ProfileError {
    fn from(value: RepoError) -> Self {
        ProfileError::Repository(value.to_string())
    }
}

pub trait ManageProfileUseCase {
    fn get_or_create_profile(
        &self,
        patient: &dyn PatientRecord,
    ) -> Result<PatientEmailProfile, ProfileError>;
    /// Existing profile only; never creates one.
    fn find_profile(
        &self,
        patient_id: PatientId,
    ) -> Result<Option<PatientEmailProfile>, ProfileError>;
    fn update_profile(
        &self,
        patient: &dyn PatientRecord,
        update: &ProfileUpdate,
    ) -> Result<PatientEmailProfile, ProfileError>;
    fn has_email(&self, patient_id: PatientId) -> bool;
    fn get_email(&self, patient_id: PatientId) -> Option<EmailAddress>;
    fn mark_verified(&self, patient: &dyn PatientRecord) -> Result<(), ProfileError>;
    fn mark_bounced(&self, patient: &dyn PatientRecord, bounced: bool) -> Result<(), ProfileError>;
}

pub struct ManageProfileUseCaseImpl<PR: ProfileRepository> {
    profile_repository: Arc<PR>,
}

impl<PR: ProfileRepository> ManageProfileUseCaseImpl<PR> {
    pub fn new(profile_repository: Arc<PR>) -> Self {
        Self { profile_repository }
    }

    fn modify(
        &self,
        patient: &dyn PatientRecord,
        change: impl FnOnce(&mut PatientEmailProfile) -> Result<(), ValidationError>,
    ) -> Result<PatientEmailProfile, ProfileError> {
        let mut profile = self
            .profile_repository
            .get_or_create_profile(patient.id(), patient.organization())?;
        change(&mut profile)?;
        self.profile_repository.save_profile(&profile)?;
        Ok(profile)
    }
}

impl<PR: ProfileRepository + Send + Sync + 'static> ManageProfileUseCase
    for ManageProfileUseCaseImpl<PR>
{
    fn get_or_create_profile(
        &self,
        patient: &dyn PatientRecord,
    ) -> Result<PatientEmailProfile, ProfileError> {
        Ok(self
            .profile_repository
            .get_or_create_profile(patient.id(), patient.organization())?)
    }

    fn find_profile(
        &self,
        patient_id: PatientId,
    ) -> Result<Option<PatientEmailProfile>, ProfileError> {
        match self.profile_repository.get_profile(patient_id) {
            Ok(profile) => Ok(Some(profile)),
            Err(RepoRetrieveError::NotFound) => Ok(None),
            Err(RepoRetrieveError::StorageError(e)) => Err(ProfileError::Repository(e)),
        }
    }

    fn update_profile(
        &self,
        patient: &dyn PatientRecord,
        update: &ProfileUpdate,
    ) -> Result<PatientEmailProfile, ProfileError> {
        let profile = self.modify(patient, |profile| profile.apply_update(update))?;
        log::info!("Updated email settings of patient {}", patient.id());
        Ok(profile)
    }

    fn has_email(&self, patient_id: PatientId) -> bool {
        self.get_email(patient_id).is_some()
    }

    fn get_email(&self, patient_id: PatientId) -> Option<EmailAddress> {
        match self.profile_repository.get_profile(patient_id) {
            Ok(profile) => profile.preferred_email().cloned(),
            Err(RepoRetrieveError::NotFound) => None,
            Err(RepoRetrieveError::StorageError(e)) => {
                log::error!(
                    "Failed to load email profile of patient {}: {}",
                    patient_id,
                    e
                );
                None
            }
        }
    }

    fn mark_verified(&self, patient: &dyn PatientRecord) -> Result<(), ProfileError> {
        self.modify(patient, |profile| {
            if !profile.has_email() {
                return Err(ValidationError::MissingAddress);
            }
            profile.email_verified = true;
            Ok(())
        })?;
        Ok(())
    }

    fn mark_bounced(&self, patient: &dyn PatientRecord, bounced: bool) -> Result<(), ProfileError> {
        self.modify(patient, |profile| {
            profile.bounced = bounced;
            Ok(())
        })?;
        if bounced {
            log::warn!("Email address of patient {} bounced", patient.id());
        }
        Ok(())
    }
}
