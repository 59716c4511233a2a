use rocket::data::{self, Data, FromData};
use rocket::http::Status;
use rocket::outcome::Outcome;
use rocket::request::{self, FromRequest, Request};
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::okapi::openapi3::{
    Object, RequestBody, SecurityRequirement, SecurityScheme, SecuritySchemeData,
};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::request::{OpenApiFromData, OpenApiFromRequest, RequestHeaderInput};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::auth::{AuthError, AuthResult, AuthState, JwtService};
use crate::error::ApiError;

/// Turn the raw `Authorization` header into a verified user id.
///
/// An absent or blank header is `Unauthenticated`; anything else that fails
/// is `MalformedAuthHeader` or `InvalidToken`. `Forbidden` is never produced
/// here: that decision belongs to the endpoint.
pub fn authenticate(jwt: &JwtService, authorization: Option<&str>) -> AuthResult<Uuid> {
    match authorization.map(str::trim) {
        None | Some("") => Err(AuthError::Unauthenticated),
        Some(header) => jwt.verify_bearer(header),
    }
}

/// The caller of a protected endpoint, established from its bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
}

impl AuthUser {
    /// Trivial allow/deny hook for endpoints that need one.
    pub fn require(self, allowed: bool) -> AuthResult<Self> {
        if allowed {
            Ok(self)
        } else {
            Err(AuthError::Forbidden)
        }
    }
}

/// Why the most recent guard in this request refused it; read by catchers.
#[derive(Debug, Clone, Default)]
pub struct GuardRejection(pub Option<ApiError>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthUser {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let state = match request.guard::<&State<AuthState>>().await {
            Outcome::Success(state) => state,
            _ => {
                let err = AuthError::Config("AuthState not available".into());
                return reject(request, err);
            }
        };

        let header = request.headers().get_one("Authorization");
        match authenticate(&state.jwt_service, header) {
            Ok(id) => Outcome::Success(AuthUser { id }),
            Err(err) => reject(request, err),
        }
    }
}

fn reject<T>(request: &Request<'_>, err: AuthError) -> request::Outcome<T, AuthError> {
    let status = err.status();
    let api_error = ApiError::from(&err);
    request.local_cache(|| GuardRejection(Some(api_error)));
    Outcome::Error((status, err))
}

impl<'r> OpenApiFromRequest<'r> for AuthUser {
    fn from_request_input(
        _generator: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        let scheme = SecurityScheme {
            description: Some("Session token from `POST /auth/login`.".to_owned()),
            data: SecuritySchemeData::Http {
                scheme: "bearer".to_owned(),
                bearer_format: Some("JWT".to_owned()),
            },
            extensions: Object::default(),
        };
        let mut requirement = SecurityRequirement::new();
        requirement.insert("BearerAuth".to_owned(), Vec::new());
        Ok(RequestHeaderInput::Security(
            "BearerAuth".to_owned(),
            scheme,
            requirement,
        ))
    }
}

/// JSON request body whose parse failures are always `400 Bad request`.
///
/// Rocket's own `Json` answers 422 for well-formed JSON of the wrong shape;
/// here 422 is reserved for semantic validation done by the handlers.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

impl<T> JsonBody<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

#[rocket::async_trait]
impl<'r, T: DeserializeOwned + Send> FromData<'r> for JsonBody<T> {
    type Error = AuthError;

    async fn from_data(request: &'r Request<'_>, data: Data<'r>) -> data::Outcome<'r, Self> {
        match Json::<T>::from_data(request, data).await {
            Outcome::Success(Json(value)) => Outcome::Success(JsonBody(value)),
            Outcome::Forward(forward) => Outcome::Forward(forward),
            Outcome::Error((_, err)) => {
                log::debug!("malformed JSON body: {}", err);
                let err = AuthError::MalformedRequest;
                let api_error = ApiError::from(&err);
                request.local_cache(|| GuardRejection(Some(api_error)));
                Outcome::Error((Status::BadRequest, err))
            }
        }
    }
}

impl<'r, T: DeserializeOwned + JsonSchema + Send> OpenApiFromData<'r> for JsonBody<T> {
    fn request_body(generator: &mut OpenApiGenerator) -> rocket_okapi::Result<RequestBody> {
        Json::<T>::request_body(generator)
    }
}
