use rocket::response::status::NoContent;
use rocket::serde::json::Json;
use rocket::{State, get, post};
use rocket_okapi::openapi;

use crate::auth::guards::{AuthUser, JsonBody};
use crate::auth::oauth::{FacebookProvider, GoogleProvider};
use crate::auth::responses::{
    FederatedLoginRequest, LoginRequest, TokenResponse, WhoAmIResponse,
};
use crate::auth::{AuthError, AuthState};
use crate::error::ApiError;

type AuthRouteResult<T> = Result<Json<T>, ApiError>;

/// Exchange a username or email plus password for a session token.
#[openapi(tag = "Auth")]
#[post("/auth/login", data = "<payload>")]
pub async fn login(
    state: &State<AuthState>,
    payload: JsonBody<LoginRequest>,
) -> AuthRouteResult<TokenResponse> {
    let token = state.local.login(payload.into_inner()).await?;
    Ok(Json(token.into()))
}

/// Log in with a Facebook authorization code, creating the account on first use.
#[openapi(tag = "Auth")]
#[post("/auth/facebook", data = "<payload>")]
pub async fn facebook_login(
    state: &State<AuthState>,
    payload: JsonBody<FederatedLoginRequest>,
) -> AuthRouteResult<TokenResponse> {
    let token = state
        .federator
        .login(FacebookProvider::NAME, payload.into_inner())
        .await
        .map_err(|err| match err {
            // Facebook is a core login path; a missing secret is a deployment fault.
            AuthError::ProviderNotConfigured(name) => {
                AuthError::Config(format!("identity provider '{name}' is not configured"))
            }
            other => other,
        })?;
    Ok(Json(token.into()))
}

/// Log in with a Google authorization code, creating the account on first use.
#[openapi(tag = "Auth")]
#[post("/auth/google", data = "<payload>")]
pub async fn google_login(
    state: &State<AuthState>,
    payload: JsonBody<FederatedLoginRequest>,
) -> AuthRouteResult<TokenResponse> {
    let token = state
        .federator
        .login(GoogleProvider::NAME, payload.into_inner())
        .await?;
    Ok(Json(token.into()))
}

/// Facebook deauthorization callback. Accepted and ignored.
#[openapi(tag = "Auth")]
#[post("/deauth/facebook")]
pub async fn deauth_facebook() -> NoContent {
    log::debug!("facebook deauthorization callback received");
    NoContent
}

/// Identify the caller of a bearer-authenticated request.
#[openapi(tag = "Auth")]
#[get("/auth/whoami")]
pub async fn whoami(user: AuthUser) -> Json<WhoAmIResponse> {
    Json(WhoAmIResponse { user_id: user.id })
}
