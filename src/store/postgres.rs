use chrono::Utc;
use rocket_db_pools::sqlx::{self, PgPool};

use crate::models::{NewUser, User};
use crate::store::{StoreResult, UserStore};

const USER_COLUMNS: &str = "u.id, u.username, u.email, u.password_hash, u.created_at";

/// `UserStore` backed by the `users` and `federated_identities` tables.
///
/// Every operation checks a connection out of the pool for its own duration;
/// the pool itself is owned by Rocket.
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[rocket::async_trait]
impl UserStore for PgUserStore {
    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.username = $1");
        let user = sqlx::query_as::<_, User>(&query)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users u WHERE lower(u.email) = lower($1)");
        let user = sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_federated_id(
        &self,
        provider: &str,
        provider_user_id: &str,
    ) -> StoreResult<Option<User>> {
        let query = format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users u
            JOIN federated_identities f ON f.user_id = u.id
            WHERE f.provider = $1 AND f.provider_user_id = $2
            "#
        );
        let user = sqlx::query_as::<_, User>(&query)
            .bind(provider)
            .bind(provider_user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let user = user.into_user(Utc::now());
        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_federated_user(
        &self,
        provider: &str,
        provider_user_id: &str,
        email: &str,
    ) -> StoreResult<User> {
        let now = Utc::now();
        let user = NewUser::federated(email).into_user(now);

        // Dropping the transaction on any early return rolls back the user row.
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, created_at) VALUES ($1, NULL, $2, NULL, $3)",
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO federated_identities (provider, provider_user_id, user_id, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(provider)
        .bind(provider_user_id)
        .bind(user.id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(user)
    }
}
