use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::jwt::SignedSessionToken;

/// Body of `POST /auth/login`: exactly one of `username` or `email`, plus
/// `password`.
#[derive(Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct LoginRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Body of `POST /auth/{provider}`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FederatedLoginRequest {
    pub code: String,
    pub client_id: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TokenResponse {
    pub token: String,
    pub token_type: String,
}

impl From<SignedSessionToken> for TokenResponse {
    fn from(token: SignedSessionToken) -> Self {
        Self {
            token: token.token,
            token_type: "bearer".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WhoAmIResponse {
    #[schemars(with = "String")]
    pub user_id: Uuid,
}
