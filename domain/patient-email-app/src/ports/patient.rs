use dashmap::DashMap;

use crate::domain::{OrganizationId, PatientId};

/// What the plugin needs to know about the host application's patient.
pub trait PatientRecord {
    fn id(&self) -> PatientId;
    fn full_name(&self) -> String;
    fn organization(&self) -> OrganizationId;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatientSummary {
    pub id: PatientId,
    pub full_name: String,
    pub organization: OrganizationId,
}

impl PatientRecord for PatientSummary {
    fn id(&self) -> PatientId {
        self.id
    }

    fn full_name(&self) -> String {
        self.full_name.clone()
    }

    fn organization(&self) -> OrganizationId {
        self.organization
    }
}

/// Lookup of the host's patients, used when emailing many at once.
pub trait PatientDirectory {
    fn active_patients(&self, organization: OrganizationId) -> Vec<PatientSummary>;
    fn find_patient(&self, organization: OrganizationId, id: PatientId) -> Option<PatientSummary>;
}

pub struct InMemoryPatientDirectory {
    patients: DashMap<PatientId, (PatientSummary, bool)>,
}

impl InMemoryPatientDirectory {
    pub fn new() -> Self {
        Self {
            patients: DashMap::new(),
        }
    }

    pub fn insert(&self, patient: PatientSummary, active: bool) {
        self.patients.insert(patient.id, (patient, active));
    }
}

impl PatientDirectory for InMemoryPatientDirectory {
    fn active_patients(&self, organization: OrganizationId) -> Vec<PatientSummary> {
        let mut patients: Vec<PatientSummary> = self
            .patients
            .iter()
            .filter(|entry| entry.value().1 && entry.value().0.organization == organization)
            .map(|entry| entry.value().0.clone())
            .collect();
        patients.sort_by_key(|p| p.id);
        patients
    }

    fn find_patient(&self, organization: OrganizationId, id: PatientId) -> Option<PatientSummary> {
        self.patients
            .get(&id)
            .map(|entry| entry.0.clone())
            .filter(|patient| patient.organization == organization)
    }
}
