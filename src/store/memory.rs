use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::models::{NewUser, User};
use crate::store::{StoreError, StoreResult, UserStore};

#[derive(Default)]
struct Accounts {
    users: HashMap<Uuid, User>,
    links: HashMap<(String, String), Uuid>,
}

impl Accounts {
    fn email_taken(&self, email: &str) -> bool {
        self.users
            .values()
            .any(|user| user.email.eq_ignore_ascii_case(email))
    }

    fn username_taken(&self, username: &str) -> bool {
        self.users
            .values()
            .any(|user| user.username.as_deref() == Some(username))
    }
}

/// In-process `UserStore` with the same uniqueness rules as the Postgres schema.
///
/// All mutations happen under one lock, so `create_federated_user` is atomic.
#[derive(Clone, Default)]
pub struct MemoryUserStore {
    accounts: Arc<Mutex<Accounts>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail as if the database were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn user_count(&self) -> usize {
        self.accounts.lock().users.len()
    }

    pub fn link_count(&self) -> usize {
        self.accounts.lock().links.len()
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store marked unavailable".into()));
        }
        Ok(())
    }
}

fn conflict(constraint: &str) -> StoreError {
    StoreError::Conflict {
        constraint: Some(constraint.to_string()),
    }
}

#[rocket::async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        self.check_available()?;
        let accounts = self.accounts.lock();
        Ok(accounts
            .users
            .values()
            .find(|user| user.username.as_deref() == Some(username))
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.check_available()?;
        let accounts = self.accounts.lock();
        Ok(accounts
            .users
            .values()
            .find(|user| user.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_federated_id(
        &self,
        provider: &str,
        provider_user_id: &str,
    ) -> StoreResult<Option<User>> {
        self.check_available()?;
        let accounts = self.accounts.lock();
        let key = (provider.to_string(), provider_user_id.to_string());
        Ok(accounts
            .links
            .get(&key)
            .and_then(|user_id| accounts.users.get(user_id))
            .cloned())
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        self.check_available()?;
        let mut accounts = self.accounts.lock();
        if accounts.email_taken(&user.email) {
            return Err(conflict("users_email_key"));
        }
        if let Some(username) = user.username.as_deref() {
            if accounts.username_taken(username) {
                return Err(conflict("users_username_key"));
            }
        }
        let user = user.into_user(Utc::now());
        accounts.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn create_federated_user(
        &self,
        provider: &str,
        provider_user_id: &str,
        email: &str,
    ) -> StoreResult<User> {
        self.check_available()?;
        let mut accounts = self.accounts.lock();
        let key = (provider.to_string(), provider_user_id.to_string());
        if accounts.links.contains_key(&key) {
            return Err(conflict("federated_identities_pkey"));
        }
        if accounts.email_taken(email) {
            return Err(conflict("users_email_key"));
        }
        let user = NewUser::federated(email).into_user(Utc::now());
        accounts.users.insert(user.id, user.clone());
        accounts.links.insert(key, user.id);
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_duplicate_email_without_partial_writes() {
        let store = MemoryUserStore::new();
        store
            .create_user(NewUser {
                username: Some("bob".into()),
                email: "bob@example.com".into(),
                password_hash: None,
            })
            .await
            .expect("first user");

        let err = store
            .create_federated_user("facebook", "fb-7", "BOB@example.com")
            .await
            .expect_err("email already taken");
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(store.user_count(), 1);
        assert_eq!(store.link_count(), 0);
    }

    #[tokio::test]
    async fn resolves_federated_links() {
        let store = MemoryUserStore::new();
        let created = store
            .create_federated_user("facebook", "fb-1", "fed@example.com")
            .await
            .expect("create");

        let found = store
            .find_by_federated_id("facebook", "fb-1")
            .await
            .expect("lookup")
            .expect("linked user");
        assert_eq!(found.id, created.id);

        let other_provider = store
            .find_by_federated_id("google", "fb-1")
            .await
            .expect("lookup");
        assert!(other_provider.is_none());
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_operation() {
        let store = MemoryUserStore::new();
        store.set_unavailable(true);
        let err = store
            .find_by_username("anyone")
            .await
            .expect_err("store is down");
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
