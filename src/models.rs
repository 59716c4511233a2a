use chrono::{DateTime, Utc};
use rocket_db_pools::sqlx::FromRow;
use uuid::Uuid;

// ===== Account Models =====

/// A local account as stored in `users`.
///
/// The authentication core only ever reads these rows; creation happens via
/// the admin CLI or the first successful federated login.
#[derive(Debug, Clone, FromRow, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub username: Option<String>,
    pub email: String,
    /// PHC-encoded password hash; `None` for federation-only accounts.
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Link between a provider-assigned identity and a local user.
#[derive(Debug, Clone, FromRow, PartialEq, Eq)]
pub struct FederatedIdentity {
    pub provider: String,
    pub provider_user_id: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to insert a local account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: Option<String>,
    pub email: String,
    pub password_hash: Option<String>,
}

impl NewUser {
    pub fn federated(email: impl Into<String>) -> Self {
        Self {
            username: None,
            email: email.into(),
            password_hash: None,
        }
    }

    /// Materialise the row with a fresh identifier.
    pub(crate) fn into_user(self, now: DateTime<Utc>) -> User {
        User {
            id: Uuid::new_v4(),
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
            created_at: now,
        }
    }
}
