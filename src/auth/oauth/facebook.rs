use reqwest::Client;
use serde::Deserialize;

use crate::auth::config::ProviderConfig;
use crate::auth::oauth::{
    AuthorizationGrant, OAuthProvider, ProviderAccessToken, ProviderProfile, http_client,
    required, send_profile_request, send_token_request,
};
use crate::auth::{AuthError, AuthResult};

/// Graph API `/me` payload.
#[derive(Debug, Deserialize)]
struct FacebookProfile {
    id: Option<String>,
    email: Option<String>,
}

/// Facebook Login via the Graph API.
pub struct FacebookProvider {
    config: ProviderConfig,
    http: Client,
}

impl FacebookProvider {
    pub const NAME: &'static str = "facebook";

    pub fn new(config: ProviderConfig) -> AuthResult<Self> {
        let http = http_client(&config)?;
        Ok(Self { config, http })
    }
}

#[rocket::async_trait]
impl OAuthProvider for FacebookProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn exchange_code(&self, grant: &AuthorizationGrant) -> AuthResult<ProviderAccessToken> {
        if let Some(expected) = self.config.client_id.as_deref() {
            if expected != grant.client_id {
                return Err(AuthError::FederationExchangeFailed(
                    "client id is not accepted by this server".into(),
                ));
            }
        }

        let request = self.http.post(&self.config.token_url).form(&[
            ("client_id", grant.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", grant.redirect_uri.as_str()),
            ("code", grant.code.as_str()),
        ]);

        send_token_request(Self::NAME, request).await
    }

    async fn fetch_profile(&self, token: &ProviderAccessToken) -> AuthResult<ProviderProfile> {
        let request = self
            .http
            .get(&self.config.profile_url)
            .query(&[("fields", "id,email")])
            .bearer_auth(token.secret());

        let profile: FacebookProfile = send_profile_request(Self::NAME, request).await?;

        Ok(ProviderProfile {
            provider_user_id: required("id", profile.id)?,
            email: required("email", profile.email)?,
        })
    }
}
