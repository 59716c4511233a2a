use std::io::Cursor;

use rocket::http::{ContentType, Header, Status};
use rocket::response::{self, Responder};
use rocket::{Catcher, Request, Response, catch, catchers};
use rocket_okapi::okapi::Map;
use rocket_okapi::okapi::openapi3::{MediaType, RefOr, Response as OpenApiResponse, Responses};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::response::OpenApiResponderInner;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::auth::AuthError;
use crate::auth::error::FieldError;
use crate::auth::guards::GuardRejection;

/// Challenge sent with every 401 so clients know where to obtain a token.
pub const WWW_AUTHENTICATE: &str = r#"Bearer login="/auth/login""#;

/// JSON body of every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ErrorResponse {
    #[serde(rename = "httpStatus")]
    pub http_status: u16,
    pub message: String,
    pub errors: Vec<FieldError>,
}

/// An error ready to be written to the client.
///
/// Built from [`AuthError`] so that internal detail stays in the log: the
/// client only ever sees the status, a fixed message per status, and the
/// field-tagged entries chosen here.
#[derive(Debug, Clone)]
pub struct ApiError {
    status: Status,
    errors: Vec<FieldError>,
}

impl ApiError {
    pub fn new(status: Status, errors: Vec<FieldError>) -> Self {
        Self { status, errors }
    }

    pub fn for_status(status: Status) -> Self {
        Self::new(status, Vec::new())
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn body(&self) -> ErrorResponse {
        ErrorResponse {
            http_status: self.status.code,
            message: status_message(self.status).to_string(),
            errors: self.errors.clone(),
        }
    }
}

fn status_message(status: Status) -> &'static str {
    match status.code {
        400 => "Bad request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Resource not found",
        422 => "Unprocessable entity. JSON was parsed but did not match the expected structure",
        500 => "Internal server error",
        _ => status.reason().unwrap_or("Error"),
    }
}

fn authorization_header_error(error: &str) -> Vec<FieldError> {
    vec![FieldError::new(error, &["header: authorization"])]
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::from(&err)
    }
}

impl From<&AuthError> for ApiError {
    fn from(err: &AuthError) -> Self {
        let status = err.status();
        if err.is_client_error() {
            log::debug!("request rejected: {}", err);
        } else {
            log::error!("request failed: {}", err);
        }

        let errors = match err {
            AuthError::ValidationFailed(errors) => errors.clone(),
            AuthError::InvalidCredentials => vec![FieldError::new(
                "Invalid Login/Password combination",
                &["password", "email", "username"],
            )],
            AuthError::Unauthenticated => {
                authorization_header_error("This endpoint requires a logged in user.")
            }
            AuthError::MalformedAuthHeader => {
                authorization_header_error("Authorization header must have the form 'Bearer <token>'")
            }
            AuthError::InvalidToken => authorization_header_error("Token is invalid or expired"),
            AuthError::FederationExchangeFailed(_) => vec![FieldError::new(
                "Authorization code could not be exchanged with the identity provider",
                &["code", "client_id", "redirect_uri"],
            )],
            AuthError::FederationProfileFailed(_) => vec![FieldError::new(
                "Identity provider did not return a usable profile",
                &[],
            )],
            AuthError::FederationAccountFailed(_) => vec![FieldError::new(
                "Federated identity could not be linked to an account",
                &["email"],
            )],
            AuthError::ProviderNotConfigured(_) => vec![FieldError::new(
                "Identity provider is not configured",
                &["provider"],
            )],
            _ => Vec::new(),
        };

        ApiError::new(status, errors)
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let json = serde_json::to_string(&self.body()).unwrap_or_else(|_| {
            r#"{"httpStatus":500,"message":"Internal server error","errors":[]}"#.to_string()
        });

        let mut builder = Response::build();
        builder
            .status(self.status)
            .header(ContentType::JSON)
            .sized_body(json.len(), Cursor::new(json));
        if self.status == Status::Unauthorized {
            builder.header(Header::new("WWW-Authenticate", WWW_AUTHENTICATE));
        }
        builder.ok()
    }
}

impl OpenApiResponderInner for ApiError {
    fn responses(generator: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        let schema = generator.json_schema::<ErrorResponse>();
        let mut responses = Responses::default();
        for status in [
            Status::BadRequest,
            Status::Unauthorized,
            Status::NotFound,
            Status::UnprocessableEntity,
            Status::InternalServerError,
        ] {
            let mut content = Map::new();
            content.insert(
                "application/json".to_owned(),
                MediaType {
                    schema: Some(schema.clone()),
                    ..Default::default()
                },
            );
            responses.responses.insert(
                status.code.to_string(),
                RefOr::Object(OpenApiResponse {
                    description: status_message(status).to_owned(),
                    content,
                    ..Default::default()
                }),
            );
        }
        Ok(responses)
    }
}

/// Prefer the error a guard cached for this request; fall back to a bare
/// body for the status.
fn rejection_for(status: Status, request: &Request<'_>) -> ApiError {
    match &request.local_cache(GuardRejection::default).0 {
        Some(api_error) if api_error.status() == status => api_error.clone(),
        _ => ApiError::for_status(status),
    }
}

#[catch(400)]
fn bad_request(request: &Request<'_>) -> ApiError {
    rejection_for(Status::BadRequest, request)
}

#[catch(401)]
fn unauthorized(request: &Request<'_>) -> ApiError {
    rejection_for(Status::Unauthorized, request)
}

#[catch(403)]
fn forbidden(request: &Request<'_>) -> ApiError {
    rejection_for(Status::Forbidden, request)
}

#[catch(404)]
fn not_found(request: &Request<'_>) -> ApiError {
    rejection_for(Status::NotFound, request)
}

#[catch(422)]
fn unprocessable_entity(request: &Request<'_>) -> ApiError {
    rejection_for(Status::UnprocessableEntity, request)
}

#[catch(500)]
fn internal_error(request: &Request<'_>) -> ApiError {
    rejection_for(Status::InternalServerError, request)
}

#[catch(default)]
fn default_catcher(status: Status, request: &Request<'_>) -> ApiError {
    rejection_for(status, request)
}

/// Catchers that render Rocket-level failures in the same body shape as
/// handler errors.
pub fn catchers() -> Vec<Catcher> {
    catchers![
        bad_request,
        unauthorized,
        forbidden,
        not_found,
        unprocessable_entity,
        internal_error,
        default_catcher,
    ]
}
