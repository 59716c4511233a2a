//! OAuth2 authorization-code federation.
//!
//! A login runs four strictly ordered stages: exchange the caller's code for
//! a provider access token, fetch the provider profile with that token,
//! resolve (or create) the linked local account, and issue a session token.
//! Any stage failing ends the flow; nothing is retried, because authorization
//! codes are single-use.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Response};
use serde::Deserialize;

use crate::auth::config::ProviderConfig;
use crate::auth::jwt::SignedSessionToken;
use crate::auth::responses::FederatedLoginRequest;
use crate::auth::{AuthError, AuthResult, JwtService};
use crate::models::User;
use crate::store::{StoreError, UserStore};

pub mod facebook;
pub mod google;

pub use facebook::FacebookProvider;
pub use google::GoogleProvider;

/// What the caller hands us after the provider redirected back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationGrant {
    pub code: String,
    pub client_id: String,
    pub redirect_uri: String,
}

impl FederatedLoginRequest {
    pub fn validate(self) -> AuthResult<AuthorizationGrant> {
        let blank = |value: &str| value.trim().is_empty();
        if blank(&self.code) || blank(&self.client_id) || blank(&self.redirect_uri) {
            return Err(AuthError::MalformedRequest);
        }
        Ok(AuthorizationGrant {
            code: self.code,
            client_id: self.client_id,
            redirect_uri: self.redirect_uri,
        })
    }
}

/// Provider access token. Only lives for the duration of one login.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderAccessToken(String);

impl ProviderAccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ProviderAccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ProviderAccessToken(<redacted>)")
    }
}

/// The provider attributes a local account is resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub provider_user_id: String,
    pub email: String,
}

/// One OAuth2 identity provider.
///
/// Adding a provider means adding an implementation of this trait and
/// registering it with the [`Federator`]; the flow itself is shared.
#[rocket::async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Stable key stored in `federated_identities.provider`.
    fn name(&self) -> &str;

    async fn exchange_code(&self, grant: &AuthorizationGrant) -> AuthResult<ProviderAccessToken>;

    async fn fetch_profile(&self, token: &ProviderAccessToken) -> AuthResult<ProviderProfile>;
}

/// Runs the federation flow against whichever registered provider is named.
#[derive(Clone)]
pub struct Federator {
    store: Arc<dyn UserStore>,
    jwt: Arc<JwtService>,
    providers: HashMap<String, Arc<dyn OAuthProvider>>,
}

impl Federator {
    pub fn new(store: Arc<dyn UserStore>, jwt: Arc<JwtService>) -> Self {
        Self {
            store,
            jwt,
            providers: HashMap::new(),
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn OAuthProvider>) -> Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    pub fn provider(&self, name: &str) -> AuthResult<&Arc<dyn OAuthProvider>> {
        self.providers
            .get(name)
            .ok_or_else(|| AuthError::ProviderNotConfigured(name.to_string()))
    }

    pub async fn login(
        &self,
        provider_name: &str,
        request: FederatedLoginRequest,
    ) -> AuthResult<SignedSessionToken> {
        let provider = self.provider(provider_name)?;
        let grant = request.validate()?;

        let access_token = provider.exchange_code(&grant).await?;
        let profile = provider.fetch_profile(&access_token).await?;
        let user = self.resolve_account(provider.name(), &profile).await?;

        log::debug!("federated login via {} resolved to user {}", provider.name(), user.id);
        self.jwt.issue_session_token(user.id)
    }

    /// Find the user linked to this provider identity, creating user and
    /// link together on first sight.
    async fn resolve_account(&self, provider: &str, profile: &ProviderProfile) -> AuthResult<User> {
        if let Some(user) = self
            .store
            .find_by_federated_id(provider, &profile.provider_user_id)
            .await?
        {
            return Ok(user);
        }

        match self
            .store
            .create_federated_user(provider, &profile.provider_user_id, &profile.email)
            .await
        {
            Ok(user) => {
                log::info!("created user {} for new {} identity", user.id, provider);
                Ok(user)
            }
            Err(StoreError::Conflict { constraint }) => {
                // A concurrent first login may have won the race for the link.
                if let Some(user) = self
                    .store
                    .find_by_federated_id(provider, &profile.provider_user_id)
                    .await?
                {
                    return Ok(user);
                }
                Err(AuthError::FederationAccountFailed(format!(
                    "account conflicts with existing data ({})",
                    constraint.as_deref().unwrap_or("unique constraint")
                )))
            }
            Err(err) => Err(AuthError::Store(err)),
        }
    }
}

/// Build the HTTP client shared by a provider's calls.
///
/// The timeout covers the whole call, from connecting until the response
/// body has been read.
pub(crate) fn http_client(config: &ProviderConfig) -> AuthResult<Client> {
    let timeout = Duration::from_secs(config.timeout_secs.max(1));
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .build()
        .map_err(|err| AuthError::Config(format!("failed to build HTTP client: {err}")))
}

/// Token endpoint payload. Providers add fields we do not need.
#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: Option<String>,
}

/// Send a prepared token request and pull a non-empty access token out of it.
pub(crate) async fn send_token_request(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> AuthResult<ProviderAccessToken> {
    let response = send(provider, "token", request)
        .await
        .map_err(AuthError::FederationExchangeFailed)?;

    let body: TokenEndpointResponse = response.json().await.map_err(|err| {
        AuthError::FederationExchangeFailed(format!("malformed token response: {err}"))
    })?;

    match body.access_token {
        Some(token) if !token.trim().is_empty() => Ok(ProviderAccessToken::new(token)),
        _ => Err(AuthError::FederationExchangeFailed(
            "token response did not include an access token".into(),
        )),
    }
}

/// Send a prepared profile request and decode the body as `T`.
pub(crate) async fn send_profile_request<T: serde::de::DeserializeOwned>(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> AuthResult<T> {
    let response = send(provider, "profile", request)
        .await
        .map_err(AuthError::FederationProfileFailed)?;

    response.json::<T>().await.map_err(|err| {
        AuthError::FederationProfileFailed(format!("malformed profile response: {err}"))
    })
}

/// Require a present, non-blank attribute from a provider profile.
pub(crate) fn required(field: &str, value: Option<String>) -> AuthResult<String> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(AuthError::FederationProfileFailed(format!(
            "profile is missing `{field}`"
        ))),
    }
}

async fn send(
    provider: &str,
    stage: &str,
    request: reqwest::RequestBuilder,
) -> Result<Response, String> {
    let response = request.send().await.map_err(|err| {
        if err.is_timeout() {
            format!("{stage} request timed out")
        } else {
            format!("{stage} request failed: {err}")
        }
    })?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "failed to read error body".to_string());
    log::warn!("{} {} endpoint returned {}: {}", provider, stage, status, body);
    Err(format!("{stage} endpoint returned status {status}"))
}
