use rocket::http::Status;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreError;

pub type AuthResult<T> = Result<T, AuthError>;

/// One violated rule, tagged with the request fields it concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FieldError {
    pub error: String,
    pub fields: Vec<String>,
}

impl FieldError {
    pub fn new(error: impl Into<String>, fields: &[&str]) -> Self {
        Self {
            error: error.into(),
            fields: fields.iter().map(|field| field.to_string()).collect(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("malformed request body")]
    MalformedRequest,
    #[error("validation failed")]
    ValidationFailed(Vec<FieldError>),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("authentication required")]
    Unauthenticated,
    #[error("malformed authorization header")]
    MalformedAuthHeader,
    #[error("token invalid")]
    InvalidToken,
    #[error("forbidden")]
    Forbidden,
    #[error("authorization code exchange failed: {0}")]
    FederationExchangeFailed(String),
    #[error("provider profile fetch failed: {0}")]
    FederationProfileFailed(String),
    #[error("federated account resolution failed: {0}")]
    FederationAccountFailed(String),
    #[error("identity provider '{0}' is not configured")]
    ProviderNotConfigured(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("argon2 parameter error: {0}")]
    Argon2(String),
    #[error("password hashing error: {0}")]
    PasswordHash(String),
    #[error("unexpected error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn status(&self) -> Status {
        match self {
            AuthError::MalformedRequest => Status::BadRequest,
            AuthError::ValidationFailed(_) => Status::UnprocessableEntity,
            AuthError::InvalidCredentials
            | AuthError::Unauthenticated
            | AuthError::MalformedAuthHeader
            | AuthError::InvalidToken => Status::Unauthorized,
            AuthError::Forbidden => Status::Forbidden,
            AuthError::FederationExchangeFailed(_)
            | AuthError::FederationProfileFailed(_)
            | AuthError::FederationAccountFailed(_) => Status::BadRequest,
            AuthError::ProviderNotConfigured(_) => Status::NotFound,
            AuthError::Store(_)
            | AuthError::Config(_)
            | AuthError::Jwt(_)
            | AuthError::Argon2(_)
            | AuthError::PasswordHash(_)
            | AuthError::Internal(_) => Status::InternalServerError,
        }
    }

    /// Whether the failure came from the caller's input rather than this
    /// server or its dependencies.
    pub fn is_client_error(&self) -> bool {
        self.status().code < 500
    }
}

impl From<argon2::Error> for AuthError {
    fn from(err: argon2::Error) -> Self {
        AuthError::Argon2(err.to_string())
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(err: argon2::password_hash::Error) -> Self {
        AuthError::PasswordHash(err.to_string())
    }
}
