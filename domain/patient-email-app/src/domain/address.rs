use serde::Serialize;
use validator::Validate;

use crate::domain::ValidationError;

#[derive(Validate)]
struct EmailValidator {
    #[validate(email)]
    email: String,
}

/// A trimmed, syntactically valid email address.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let validator = EmailValidator {
            email: raw.trim().to_string(),
        };
        if validator.email.is_empty() {
            return Err(ValidationError::MissingAddress);
        }
        if let Err(e) = validator.validate() {
            log::debug!("Rejected email address {:?}: {}", validator.email, e);
            return Err(ValidationError::MalformedAddress(validator.email));
        }
        Ok(Self(validator.email))
    }

    /// Parses an optional form value, treating blank input as absent.
    pub fn parse_optional(raw: Option<&str>) -> Result<Option<Self>, ValidationError> {
        match raw.map(str::trim) {
            None | Some("") => Ok(None),
            Some(value) => Self::parse(value).map(Some),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
