#[macro_use]
extern crate rocket;

pub mod auth;
pub mod db;
pub mod error;
pub mod models;
pub mod request_logger;
pub mod routes;
pub mod store;

use crate::auth::{AuthConfig, AuthState};
use crate::db::KubrikDb;
use crate::request_logger::RequestLogger;
use crate::store::PgUserStore;
use env_logger::Env;
use rocket::fairing::AdHoc;
use rocket::http::Method;
use rocket::{Build, Rocket, Route};
use rocket_cors::{AllowedOrigins, CorsOptions};
use rocket_db_pools::Database;
use rocket_okapi::{
    openapi_get_routes,
    swagger_ui::{SwaggerUIConfig, make_swagger_ui},
};
use std::sync::{Arc, Once};

static LOGGER: Once = Once::new();

fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(
            Env::default().default_filter_or("info,rocket::server=warn,rocket::request=warn"),
        )
        .init();
    });
}

/// Every API route plus the generated `/openapi.json`.
pub fn api_routes() -> Vec<Route> {
    openapi_get_routes![
        // Health routes
        routes::health::health_check,
        // Auth routes
        auth::routes::login,
        auth::routes::facebook_login,
        auth::routes::google_login,
        auth::routes::deauth_facebook,
        auth::routes::whoami,
    ]
}

fn cors_options() -> CorsOptions {
    CorsOptions::default()
        .allowed_origins(AllowedOrigins::all())
        .allowed_methods(
            vec![Method::Get, Method::Post]
                .into_iter()
                .map(From::from)
                .collect(),
        )
        .allow_credentials(true)
}

pub fn rocket() -> Rocket<Build> {
    init_logger();
    log::info!("starting Kubrik API server");

    rocket::build()
        .attach(RequestLogger)
        .attach(KubrikDb::init())
        .attach(AdHoc::try_on_ignite("CORS", |rocket| async move {
            match cors_options().to_cors() {
                Ok(cors) => Ok(rocket.attach(cors)),
                Err(e) => {
                    log::error!("invalid CORS configuration: {}", e);
                    Err(rocket)
                }
            }
        }))
        // Run database migrations on startup
        .attach(AdHoc::try_on_ignite(
            "Run Migrations",
            |rocket| async move {
                match KubrikDb::fetch(&rocket) {
                    Some(kubrik_db) => match db::run_migrations(&(**kubrik_db).clone()).await {
                        Ok(_) => {
                            log::info!("database migrations successful");
                            Ok(rocket)
                        }
                        Err(e) => {
                            log::error!("database migrations failed: {}", e);
                            Err(rocket)
                        }
                    },
                    None => {
                        log::error!("database pool not available for migrations");
                        Err(rocket)
                    }
                }
            },
        ))
        .attach(AdHoc::try_on_ignite(
            "Auth State",
            |rocket| async move {
                let config = match AuthConfig::from_env() {
                    Ok(config) => config,
                    Err(e) => {
                        log::error!("auth configuration invalid: {}", e);
                        return Err(rocket);
                    }
                };
                let pool = match KubrikDb::fetch(&rocket) {
                    Some(kubrik_db) => (**kubrik_db).clone(),
                    None => {
                        log::error!("database pool not available for the user store");
                        return Err(rocket);
                    }
                };
                let store = Arc::new(PgUserStore::new(pool));

                match AuthState::from_config(config, store) {
                    Ok(state) => Ok(rocket.manage(state)),
                    Err(e) => {
                        log::error!("failed to initialize auth state: {}", e);
                        Err(rocket)
                    }
                }
            },
        ))
        .mount("/", api_routes())
        .mount(
            "/docs/swagger/",
            make_swagger_ui(&SwaggerUIConfig {
                url: "../../openapi.json".to_owned(),
                ..Default::default()
            }),
        )
        .register("/", error::catchers())
}

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rocket::config::LogLevel;
    use rocket::figment::Figment;
    use rocket::local::asynchronous::Client as AsyncClient;
    use rocket::local::blocking::Client;
    use rocket::{Build, Rocket, Route};

    use crate::auth::oauth::{AuthorizationGrant, ProviderAccessToken, ProviderProfile};
    use crate::auth::{AuthConfig, AuthError, AuthResult, AuthState, OAuthProvider, PasswordService};
    use crate::store::{MemoryUserStore, UserStore};

    pub use database::{TestDatabase, TestDatabaseError};

    /// Secret shared by test configs, long enough for `JwtService`.
    pub const TEST_JWT_SECRET: &str = "kubrik-test-secret-0123456789abcdefghijklmnop";

    /// Auth configuration for tests: no providers, one hour tokens.
    pub fn test_auth_config() -> AuthConfig {
        AuthConfig {
            jwt_secret: TEST_JWT_SECRET.to_string(),
            token_ttl_secs: 3600,
            token_leeway_secs: 0,
            facebook: None,
            google: None,
        }
    }

    /// Cheap argon2 parameters so tests do not spend seconds hashing.
    pub fn test_password_service() -> PasswordService {
        PasswordService::with_params(4 * 1024, 1, 1).expect("test password service")
    }

    /// `AuthState` over an in-memory store with the given providers.
    pub fn memory_auth_state(
        store: &MemoryUserStore,
        providers: Vec<Arc<dyn OAuthProvider>>,
    ) -> AuthState {
        let store: Arc<dyn UserStore> = Arc::new(store.clone());
        AuthState::new(test_auth_config(), store, test_password_service(), providers)
            .expect("test auth state")
    }

    /// Identity provider with a scripted outcome for each stage.
    pub struct StubProvider {
        name: &'static str,
        access_token: Option<&'static str>,
        profile: Option<ProviderProfile>,
        exchanges: AtomicUsize,
        profile_fetches: AtomicUsize,
    }

    impl StubProvider {
        /// A provider whose exchange and profile fetch both succeed.
        pub fn returning(name: &'static str, provider_user_id: &str, email: &str) -> Self {
            Self {
                name,
                access_token: Some("stub-access-token"),
                profile: Some(ProviderProfile {
                    provider_user_id: provider_user_id.to_string(),
                    email: email.to_string(),
                }),
                exchanges: AtomicUsize::new(0),
                profile_fetches: AtomicUsize::new(0),
            }
        }

        /// A provider that rejects every authorization code.
        pub fn rejecting_codes(name: &'static str) -> Self {
            Self {
                access_token: None,
                ..Self::returning(name, "unused", "unused@example.com")
            }
        }

        /// A provider whose profile endpoint never yields a usable profile.
        pub fn without_profile(name: &'static str) -> Self {
            Self {
                profile: None,
                ..Self::returning(name, "unused", "unused@example.com")
            }
        }

        pub fn exchanges(&self) -> usize {
            self.exchanges.load(Ordering::SeqCst)
        }

        pub fn profile_fetches(&self) -> usize {
            self.profile_fetches.load(Ordering::SeqCst)
        }
    }

    #[rocket::async_trait]
    impl OAuthProvider for StubProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn exchange_code(&self, _grant: &AuthorizationGrant) -> AuthResult<ProviderAccessToken> {
            self.exchanges.fetch_add(1, Ordering::SeqCst);
            self.access_token
                .map(ProviderAccessToken::new)
                .ok_or_else(|| AuthError::FederationExchangeFailed("code rejected".into()))
        }

        async fn fetch_profile(&self, _token: &ProviderAccessToken) -> AuthResult<ProviderProfile> {
            self.profile_fetches.fetch_add(1, Ordering::SeqCst);
            self.profile
                .clone()
                .ok_or_else(|| AuthError::FederationProfileFailed("no profile".into()))
        }
    }

    pub mod database {
        use std::env;

        use log::LevelFilter;
        use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
        use sqlx::{ConnectOptions, PgPool};
        use testcontainers::{GenericImage, ImageExt, core::WaitFor};
        use testcontainers_modules::testcontainers::{
            ContainerAsync, core::error::TestcontainersError, runners::AsyncRunner,
        };
        use thiserror::Error;
        use tokio::runtime::Handle;
        use uuid::Uuid;

        use crate::db::MIGRATOR;

        #[derive(Debug, Error)]
        pub enum TestDatabaseError {
            #[error("TEST_DATABASE_URL not set and TEST_DATABASE_CONTAINER not enabled")]
            MissingUrl,
            #[error("database error: {0}")]
            Sqlx(#[from] sqlx::Error),
            #[error("migration error: {0}")]
            Migration(#[from] sqlx::migrate::MigrateError),
            #[error("container error: {0}")]
            Container(#[from] TestcontainersError),
        }

        /// Ephemeral, migrated database for integration tests.
        ///
        /// Each instance creates its own uniquely named database and drops it
        /// on `close` (or, best effort, on drop).
        pub struct TestDatabase {
            pool: Option<PgPool>,
            admin_options: PgConnectOptions,
            database_name: String,
            container: Option<ContainerAsync<GenericImage>>,
        }

        impl TestDatabase {
            /// Use `TEST_DATABASE_URL` when set, otherwise a disposable Postgres
            /// container when `TEST_DATABASE_CONTAINER=1`.
            pub async fn new_from_env() -> Result<Self, TestDatabaseError> {
                if let Ok(url) = env::var("TEST_DATABASE_URL") {
                    return Self::new(&url, None).await;
                }
                if env::var("TEST_DATABASE_CONTAINER").as_deref() == Ok("1") {
                    return Self::new_in_container().await;
                }
                Err(TestDatabaseError::MissingUrl)
            }

            async fn new_in_container() -> Result<Self, TestDatabaseError> {
                let container = GenericImage::new("postgres", "16-alpine")
                    .with_wait_for(WaitFor::message_on_stderr(
                        "database system is ready to accept connections",
                    ))
                    .with_env_var("POSTGRES_DB", "postgres")
                    .with_env_var("POSTGRES_USER", "postgres")
                    .with_env_var("POSTGRES_PASSWORD", "postgres")
                    .start()
                    .await?;

                let host = container.get_host().await?.to_string();
                let port = container.get_host_port_ipv4(5432).await?;
                let url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

                Self::new(&url, Some(container)).await
            }

            async fn new(
                base_url: &str,
                container: Option<ContainerAsync<GenericImage>>,
            ) -> Result<Self, TestDatabaseError> {
                let base_options: PgConnectOptions = base_url.parse()?;
                let base_options = base_options.log_statements(LevelFilter::Off);

                let base_name = base_options
                    .get_database()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "postgres".to_string());

                let admin_options = base_options.clone().database("postgres");
                let admin_pool = PgPoolOptions::new()
                    .max_connections(1)
                    .connect_with(admin_options.clone())
                    .await?;

                let database_name = format!("{}_{}", base_name, Uuid::new_v4().simple());
                let create_sql = format!("CREATE DATABASE \"{}\" TEMPLATE template0", database_name);
                sqlx::query(&create_sql).execute(&admin_pool).await?;
                admin_pool.close().await;

                let pool = PgPoolOptions::new()
                    .max_connections(5)
                    .connect_with(base_options.database(&database_name))
                    .await?;

                MIGRATOR.run(&pool).await?;

                Ok(Self {
                    pool: Some(pool),
                    admin_options,
                    database_name,
                    container,
                })
            }

            pub fn pool(&self) -> &PgPool {
                self.pool.as_ref().expect("test database pool is available")
            }

            pub fn pool_clone(&self) -> PgPool {
                self.pool().clone()
            }

            /// Close pool connections and drop the ephemeral database.
            pub async fn close(mut self) -> Result<(), TestDatabaseError> {
                if let Some(pool) = self.pool.take() {
                    pool.close().await;
                }

                drop_database_with_fallback(self.admin_options.clone(), &self.database_name)
                    .await?;

                if let Some(container) = self.container.take() {
                    drop(container);
                }

                Ok(())
            }
        }

        async fn drop_database_with_fallback(
            admin_options: PgConnectOptions,
            database_name: &str,
        ) -> Result<(), sqlx::Error> {
            let admin_pool = PgPoolOptions::new()
                .max_connections(1)
                .connect_with(admin_options)
                .await?;

            let drop_force = format!("DROP DATABASE \"{}\" WITH (FORCE)", database_name);
            match sqlx::query(&drop_force).execute(&admin_pool).await {
                Ok(_) => Ok(()),
                Err(err) if force_drop_unsupported(&err) => {
                    let drop_sql = format!("DROP DATABASE \"{}\"", database_name);
                    sqlx::query(&drop_sql).execute(&admin_pool).await?;
                    Ok(())
                }
                Err(err) => Err(err),
            }
        }

        fn force_drop_unsupported(err: &sqlx::Error) -> bool {
            matches!(
                err,
                sqlx::Error::Database(db_err)
                    if db_err
                        .code()
                        .map(|code| code == "42601" || code == "0A000")
                        .unwrap_or(false)
            )
        }

        impl Drop for TestDatabase {
            fn drop(&mut self) {
                if let Some(pool) = self.pool.take() {
                    let admin_options = self.admin_options.clone();
                    let db_name = self.database_name.clone();
                    if let Ok(handle) = Handle::try_current() {
                        handle.spawn(async move {
                            pool.close().await;
                            let _ = drop_database_with_fallback(admin_options, &db_name).await;
                        });
                    }
                }
            }
        }
    }

    /// Builder for Rocket instances used by route tests.
    ///
    /// Catchers are always registered so error bodies match production.
    #[derive(Default)]
    pub struct TestRocketBuilder {
        figment: Figment,
        mounts: Vec<(String, Vec<Route>)>,
        auth_state: Option<AuthState>,
    }

    impl TestRocketBuilder {
        /// Start a builder with sensible defaults: random port, logging disabled.
        pub fn new() -> Self {
            let figment = rocket::Config::figment()
                .merge(("port", 0))
                .merge(("log_level", LogLevel::Off))
                .merge(("cli_colors", false));

            Self {
                figment,
                mounts: Vec::new(),
                auth_state: None,
            }
        }

        /// Mount every API route at the root, as the server does.
        pub fn mount_api_routes(self) -> Self {
            self.mount("/", crate::api_routes())
        }

        pub fn mount(mut self, base: &str, routes: Vec<Route>) -> Self {
            self.mounts.push((base.to_string(), routes));
            self
        }

        pub fn manage_auth_state(mut self, state: AuthState) -> Self {
            self.auth_state = Some(state);
            self
        }

        /// Finish building the Rocket instance.
        pub fn build(self) -> Rocket<Build> {
            let mut rocket = rocket::custom(self.figment).register("/", crate::error::catchers());

            for (base, routes) in self.mounts {
                rocket = rocket.mount(base, routes);
            }

            if let Some(state) = self.auth_state {
                rocket = rocket.manage(state);
            }

            rocket
        }

        /// Convenience helper to produce a blocking local client.
        pub fn blocking_client(self) -> Client {
            Client::tracked(self.build()).expect("valid Rocket instance")
        }

        /// Convenience helper to produce an asynchronous local client.
        pub async fn async_client(self) -> AsyncClient {
            AsyncClient::tracked(self.build())
                .await
                .expect("valid Rocket instance")
        }
    }
}
