use thiserror::Error;

pub mod address;
pub mod message;
pub mod profile;
pub mod template;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatientId(pub i64);

impl std::fmt::Display for PatientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OrganizationId(pub i64);

impl std::fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no email address configured")]
    MissingAddress,

    #[error("malformed email address: {0}")]
    MalformedAddress(String),

    #[error("invalid subject: {0}")]
    Subject(String),

    #[error("{0}")]
    Profile(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepoError {
    #[error("Storage error: {0}")]
    StorageError(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepoRetrieveError {
    #[error("Resource not found")]
    NotFound,

    #[error("Storage error: {0}")]
    StorageError(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepoCreateError {
    #[error("Resource conflict")]
    Conflict,

    #[error("Storage error: {0}")]
    StorageError(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepoUpdateError {
    #[error("Resource not found")]
    NotFound,

    #[error("Storage error: {0}")]
    StorageError(String),
}
