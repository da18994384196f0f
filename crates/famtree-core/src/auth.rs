//! Account credentials, validation and the identity provider seam.

use crate::types::SessionContext;
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

pub const MIN_PASSWORD_LEN: usize = 6;

/// Input that blocks a submission before any backend is contacted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("All fields are required")]
    MissingFields,
    #[error("Password must be at least 6 characters")]
    PasswordTooShort,
    #[error("Person's name is required")]
    EmptyPersonName,
    #[error("Relationship is required")]
    MissingRelationship,
    #[error("Unknown relationship: {0}")]
    UnknownRelationship(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("An account with this email already exists")]
    EmailTaken,
    #[error("identity backend failed: {0}")]
    Backend(String),
}

/// Email + password sign-in request.
///
/// Absent fields deserialize as empty so they fail [`Credentials::validate`]
/// with the usual message.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.email.trim().is_empty() || self.password.is_empty() {
            return Err(ValidationError::MissingFields);
        }
        Ok(())
    }

    /// Email trimmed and lowercased, the form accounts are keyed by.
    pub fn normalized_email(&self) -> String {
        normalize_email(&self.email)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Account creation request.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct SignUp {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl SignUp {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() || self.email.trim().is_empty() || self.password.is_empty() {
            return Err(ValidationError::MissingFields);
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ValidationError::PasswordTooShort);
        }
        Ok(())
    }

    pub fn normalized_email(&self) -> String {
        normalize_email(&self.email)
    }
}

impl fmt::Debug for SignUp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignUp")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// A newly issued session. The raw token is only returned here.
#[derive(Debug, Clone)]
pub struct SessionGrant {
    pub token: String,
    pub session: SessionContext,
}

/// Account and session management.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(&self, request: &SignUp) -> Result<SessionGrant, AuthError>;

    async fn sign_in(&self, credentials: &Credentials) -> Result<SessionGrant, AuthError>;

    /// Look up the session behind a bearer token. Unknown tokens yield `None`.
    async fn resolve(&self, token: &str) -> Result<Option<SessionContext>, AuthError>;

    /// Revoke a session. Revoking an unknown token succeeds.
    async fn sign_out(&self, token: &str) -> Result<(), AuthError>;
}
