use reqwest::Client;
use serde::Deserialize;

use crate::auth::config::ProviderConfig;
use crate::auth::oauth::{
    AuthorizationGrant, OAuthProvider, ProviderAccessToken, ProviderProfile, http_client,
    required, send_profile_request, send_token_request,
};
use crate::auth::{AuthError, AuthResult};

/// OpenID Connect userinfo payload.
#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    sub: Option<String>,
    email: Option<String>,
    email_verified: Option<bool>,
}

/// Google sign-in through the standard OAuth2 code flow.
pub struct GoogleProvider {
    config: ProviderConfig,
    http: Client,
}

impl GoogleProvider {
    pub const NAME: &'static str = "google";

    pub fn new(config: ProviderConfig) -> AuthResult<Self> {
        let http = http_client(&config)?;
        Ok(Self { config, http })
    }
}

#[rocket::async_trait]
impl OAuthProvider for GoogleProvider {
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
            ("grant_type", "authorization_code"),
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
            .bearer_auth(token.secret());

        let info: GoogleUserInfo = send_profile_request(Self::NAME, request).await?;

        if info.email_verified == Some(false) {
            return Err(AuthError::FederationProfileFailed(
                "email address is not verified".into(),
            ));
        }

        Ok(ProviderProfile {
            provider_user_id: required("sub", info.sub)?,
            email: required("email", info.email)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn provider_for(server: &MockServer) -> GoogleProvider {
        GoogleProvider::new(ProviderConfig {
            client_id: None,
            client_secret: "google-secret".into(),
            token_url: format!("{}/token", server.uri()),
            profile_url: format!("{}/userinfo", server.uri()),
            timeout_secs: 5,
        })
        .expect("provider")
    }

    #[tokio::test]
    async fn sends_authorization_code_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.token",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let token = provider_for(&server)
            .exchange_code(&AuthorizationGrant {
                code: "4/code".into(),
                client_id: "client.apps.googleusercontent.com".into(),
                redirect_uri: "https://app.example.com/cb".into(),
            })
            .await
            .expect("exchange");
        assert_eq!(token.secret(), "ya29.token");
    }

    #[tokio::test]
    async fn unverified_email_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sub": "1234",
                "email": "someone@example.com",
                "email_verified": false
            })))
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .fetch_profile(&ProviderAccessToken::new("ya29.token"))
            .await
            .expect_err("unverified");
        assert!(matches!(err, AuthError::FederationProfileFailed(_)));
    }

    #[tokio::test]
    async fn maps_sub_to_provider_user_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sub": "1234",
                "email": "someone@example.com",
                "email_verified": true
            })))
            .mount(&server)
            .await;

        let profile = provider_for(&server)
            .fetch_profile(&ProviderAccessToken::new("ya29.token"))
            .await
            .expect("profile");
        assert_eq!(profile.provider_user_id, "1234");
        assert_eq!(profile.email, "someone@example.com");
    }
}
