//! Authentication module: configuration, password verification, session
//! tokens, local and federated login, the bearer-token request guard, and the
//! HTTP route handlers.

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod guards;
pub mod jwt;
pub mod local;
pub mod oauth;
pub mod passwords;
pub mod responses;
pub mod routes;

pub use config::AuthConfig;
pub use error::{AuthError, AuthResult};
pub use guards::{AuthUser, JsonBody};
pub use jwt::JwtService;
pub use local::LocalAuthenticator;
pub use oauth::{FacebookProvider, Federator, GoogleProvider, OAuthProvider};
pub use passwords::PasswordService;

use crate::store::UserStore;

/// Everything the auth routes and guards need, managed as Rocket state.
///
/// All collaborators are passed in, so tests can swap the store and the
/// identity providers for fakes.
#[derive(Clone)]
pub struct AuthState {
    pub jwt_service: Arc<JwtService>,
    pub local: LocalAuthenticator,
    pub federator: Federator,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn UserStore>,
        password_service: PasswordService,
        providers: Vec<Arc<dyn OAuthProvider>>,
    ) -> AuthResult<Self> {
        let password_service = Arc::new(password_service);
        let jwt_service = Arc::new(JwtService::from_config(&config)?);

        let local = LocalAuthenticator::new(
            Arc::clone(&store),
            Arc::clone(&password_service),
            Arc::clone(&jwt_service),
        );
        let federator = providers
            .into_iter()
            .fold(Federator::new(store, Arc::clone(&jwt_service)), |federator, provider| {
                federator.with_provider(provider)
            });

        Ok(Self {
            jwt_service,
            local,
            federator,
        })
    }

    /// Build state from configuration, enabling each provider whose secret
    /// is configured.
    pub fn from_config(config: AuthConfig, store: Arc<dyn UserStore>) -> AuthResult<Self> {
        let mut providers: Vec<Arc<dyn OAuthProvider>> = Vec::new();
        if let Some(facebook) = config.facebook.clone() {
            providers.push(Arc::new(FacebookProvider::new(facebook)?));
        }
        if let Some(google) = config.google.clone() {
            providers.push(Arc::new(GoogleProvider::new(google)?));
        }
        for provider in &providers {
            log::info!("identity provider enabled: {}", provider.name());
        }

        Self::new(config, store, PasswordService::new()?, providers)
    }
}
