use rocket_db_pools::Database;
use sqlx::PgPool;
use sqlx::migrate::{MigrateError, Migrator};

/// Postgres pool backing the user store, configured under
/// `databases.kubrik_db`.
#[derive(Database)]
#[database("kubrik_db")]
pub struct KubrikDb(PgPool);

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}
