//! Credential store adapter.
//!
//! The authentication core talks to account storage only through
//! [`UserStore`]. `PgUserStore` is the production implementation;
//! `MemoryUserStore` satisfies the same contract in-process so the
//! authenticators can be exercised without a database.

use rocket_db_pools::sqlx;
use thiserror::Error;

use crate::models::{NewUser, User};

pub mod memory;
pub mod postgres;

pub use memory::MemoryUserStore;
pub use postgres::PgUserStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated: {}", constraint.as_deref().unwrap_or("unknown"))]
    Conflict { constraint: Option<String> },
    #[error("database error: {0}")]
    Database(sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => StoreError::Conflict {
                constraint: db_err.constraint().map(str::to_string),
            },
            _ => StoreError::Database(err),
        }
    }
}

/// Lookup and insert operations the authentication core needs.
///
/// Lookups return `Ok(None)` when no row matches; errors are reserved for
/// the store itself failing.
#[rocket::async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>>;

    /// Email lookups are case-insensitive.
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn find_by_federated_id(
        &self,
        provider: &str,
        provider_user_id: &str,
    ) -> StoreResult<Option<User>>;

    async fn create_user(&self, user: NewUser) -> StoreResult<User>;

    /// Create a federation-only user and its identity link as one unit.
    ///
    /// Either both rows exist afterwards or neither does.
    async fn create_federated_user(
        &self,
        provider: &str,
        provider_user_id: &str,
        email: &str,
    ) -> StoreResult<User>;
}
