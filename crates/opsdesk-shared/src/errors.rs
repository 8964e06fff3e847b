use thiserror::Error;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConversionError {
    #[error("Empty not allowed")]
    Empty,
    #[error("Maximum length exceeded. {max} allowed but found {actual}")]
    MaxExceeded { max: usize, actual: usize },
    #[error("Invalid value: {0}")]
    Invalid(String),
}

/// Sign in / sign up failures reported by the identity service
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("identity service error: {0}")]
    Service(String),
}

/// Failure anywhere in the admin -> grants -> businesses lookup chain.
/// Recoverable, the selector stays usable and a refresh retries.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("failed to load businesses: {0}")]
pub struct BusinessLoadError(pub String);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusinessCreateError {
    #[error("no admin record exists for the signed in user")]
    NoAdminRecord,
    #[error("not signed in")]
    NotSignedIn,
    #[error("failed to create business: {0}")]
    Backend(String),
}
