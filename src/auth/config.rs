use crate::auth::{AuthError, AuthResult};

const MIN_SECRET_LEN: usize = 32;

pub const FACEBOOK_TOKEN_URL: &str = "https://graph.facebook.com/v2.8/oauth/access_token";
pub const FACEBOOK_PROFILE_URL: &str = "https://graph.facebook.com/v2.8/me";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_PROFILE_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// Server-side settings for one OAuth2 identity provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// When set, callers must present exactly this client id.
    pub client_id: Option<String>,
    pub client_secret: String,
    pub token_url: String,
    pub profile_url: String,
    pub timeout_secs: u64,
}

/// Authentication configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_secs: i64,
    pub token_leeway_secs: u64,
    pub facebook: Option<ProviderConfig>,
    pub google: Option<ProviderConfig>,
}

impl AuthConfig {
    pub fn from_env() -> AuthResult<Self> {
        let jwt_secret = std::env::var("KUBRIK_JWT_SECRET")
            .map_err(|_| AuthError::Config("KUBRIK_JWT_SECRET is required".into()))?;
        if jwt_secret.len() < MIN_SECRET_LEN {
            return Err(AuthError::Config(format!(
                "KUBRIK_JWT_SECRET must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
        let token_ttl_secs = std::env::var("KUBRIK_TOKEN_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|ttl| *ttl > 0)
            .unwrap_or(24 * 60 * 60);
        let token_leeway_secs = std::env::var("KUBRIK_TOKEN_LEEWAY_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        let timeout_secs = std::env::var("KUBRIK_PROVIDER_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(10);

        let facebook = provider_from_env(
            "FACEBOOK",
            FACEBOOK_TOKEN_URL,
            FACEBOOK_PROFILE_URL,
            timeout_secs,
        );
        let google = provider_from_env(
            "GOOGLE",
            GOOGLE_TOKEN_URL,
            GOOGLE_PROFILE_URL,
            timeout_secs,
        );

        Ok(Self {
            jwt_secret,
            token_ttl_secs,
            token_leeway_secs,
            facebook,
            google,
        })
    }
}

/// A provider is enabled only when its client secret is configured.
fn provider_from_env(
    prefix: &str,
    default_token_url: &str,
    default_profile_url: &str,
    timeout_secs: u64,
) -> Option<ProviderConfig> {
    let var = |name: &str| std::env::var(format!("KUBRIK_{prefix}_{name}")).ok();
    let client_secret = var("CLIENT_SECRET").filter(|secret| !secret.is_empty())?;

    Some(ProviderConfig {
        client_id: var("CLIENT_ID").filter(|id| !id.is_empty()),
        client_secret,
        token_url: var("TOKEN_URL").unwrap_or_else(|| default_token_url.into()),
        profile_url: var("PROFILE_URL").unwrap_or_else(|| default_profile_url.into()),
        timeout_secs,
    })
}
