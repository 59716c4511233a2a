//! Username/email + password login.

use std::sync::Arc;

use uuid::Uuid;

use crate::auth::error::FieldError;
use crate::auth::jwt::SignedSessionToken;
use crate::auth::responses::LoginRequest;
use crate::auth::{AuthError, AuthResult, JwtService, PasswordService};
use crate::store::UserStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginIdentifier {
    Username(String),
    Email(String),
}

/// A login request that has passed shape validation.
#[derive(Clone, PartialEq, Eq)]
pub struct LoginCredentials {
    pub identifier: LoginIdentifier,
    pub password: String,
}

impl std::fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("identifier", &self.identifier)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl LoginRequest {
    /// Enforce "exactly one of username/email, and a password".
    ///
    /// Every violated rule is reported, so a request with both identifiers
    /// and no password yields two entries.
    pub fn validate(self) -> AuthResult<LoginCredentials> {
        let mut errors = Vec::new();

        let identifier = match (self.username, self.email) {
            (Some(username), None) => Some(LoginIdentifier::Username(username)),
            (None, Some(email)) => Some(LoginIdentifier::Email(email)),
            (None, None) => {
                errors.push(FieldError::new(
                    "Request must have either an email or username",
                    &["username", "email"],
                ));
                None
            }
            (Some(_), Some(_)) => {
                errors.push(FieldError::new(
                    "Request must have only an email or username, not both",
                    &["username", "email"],
                ));
                None
            }
        };

        if self.password.is_none() {
            errors.push(FieldError::new(
                "Request must have a password",
                &["password"],
            ));
        }

        match (identifier, self.password) {
            (Some(identifier), Some(password)) if errors.is_empty() => Ok(LoginCredentials {
                identifier,
                password,
            }),
            _ => Err(AuthError::ValidationFailed(errors)),
        }
    }
}

/// Verifies locally stored credentials and issues session tokens.
#[derive(Clone)]
pub struct LocalAuthenticator {
    store: Arc<dyn UserStore>,
    passwords: Arc<PasswordService>,
    jwt: Arc<JwtService>,
}

impl LocalAuthenticator {
    pub fn new(
        store: Arc<dyn UserStore>,
        passwords: Arc<PasswordService>,
        jwt: Arc<JwtService>,
    ) -> Self {
        Self {
            store,
            passwords,
            jwt,
        }
    }

    pub async fn login(&self, request: LoginRequest) -> AuthResult<SignedSessionToken> {
        let credentials = request.validate()?;
        let user_id = self.authenticate(&credentials).await?;
        self.jwt.issue_session_token(user_id)
    }

    /// Resolve the account and check its password.
    ///
    /// Unknown accounts, accounts without a password, wrong passwords and
    /// corrupt stored hashes all return `InvalidCredentials` after the same
    /// amount of hashing work.
    pub async fn authenticate(&self, credentials: &LoginCredentials) -> AuthResult<Uuid> {
        let user = match &credentials.identifier {
            LoginIdentifier::Username(username) => self.store.find_by_username(username).await?,
            LoginIdentifier::Email(email) => self.store.find_by_email(email).await?,
        };

        let stored_hash = user.as_ref().and_then(|user| user.password_hash.clone());
        let passwords = Arc::clone(&self.passwords);
        let password = credentials.password.clone();
        let verified = tokio::task::spawn_blocking(move || {
            passwords.verify_or_dummy(&password, stored_hash.as_deref())
        })
        .await
        .map_err(|err| AuthError::Internal(format!("password verification task failed: {err}")))?;

        match user {
            Some(user) if verified => {
                log::debug!("local login succeeded for user {}", user.id);
                Ok(user.id)
            }
            _ => {
                log::debug!("local login rejected");
                Err(AuthError::InvalidCredentials)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthConfig;
    use crate::models::NewUser;
    use crate::store::MemoryUserStore;

    fn request(username: Option<&str>, email: Option<&str>, password: Option<&str>) -> LoginRequest {
        LoginRequest {
            username: username.map(str::to_string),
            email: email.map(str::to_string),
            password: password.map(str::to_string),
        }
    }

    fn fields_of(err: AuthError) -> Vec<Vec<String>> {
        match err {
            AuthError::ValidationFailed(errors) => {
                errors.into_iter().map(|error| error.fields).collect()
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn accepts_exactly_one_identifier() {
        let by_username = request(Some("alice"), None, Some("pw"))
            .validate()
            .expect("valid");
        assert_eq!(
            by_username.identifier,
            LoginIdentifier::Username("alice".into())
        );

        let by_email = request(None, Some("a@example.com"), Some("pw"))
            .validate()
            .expect("valid");
        assert_eq!(
            by_email.identifier,
            LoginIdentifier::Email("a@example.com".into())
        );
    }

    #[test]
    fn rejects_both_or_neither_identifier() {
        for req in [
            request(Some("alice"), Some("a@example.com"), Some("pw")),
            request(None, None, Some("pw")),
        ] {
            let err = req.validate().expect_err("invalid shape");
            assert_eq!(fields_of(err), vec![vec!["username", "email"]]);
        }
    }

    #[test]
    fn rejects_missing_password() {
        let err = request(Some("alice"), None, None)
            .validate()
            .expect_err("missing password");
        assert_eq!(fields_of(err), vec![vec!["password"]]);
    }

    #[test]
    fn reports_every_violated_rule() {
        let err = request(None, None, None)
            .validate()
            .expect_err("nothing supplied");
        assert_eq!(
            fields_of(err),
            vec![vec!["username", "email"], vec!["password"]]
        );
    }

    struct Fixture {
        store: MemoryUserStore,
        authenticator: LocalAuthenticator,
        jwt: Arc<JwtService>,
    }

    async fn fixture() -> Fixture {
        let config = AuthConfig {
            jwt_secret: "local-authenticator-test-secret-0123456789".into(),
            token_ttl_secs: 600,
            token_leeway_secs: 0,
            facebook: None,
            google: None,
        };
        let store = MemoryUserStore::new();
        let passwords =
            Arc::new(PasswordService::with_params(4 * 1024, 1, 1).expect("password service"));
        let jwt = Arc::new(JwtService::from_config(&config).expect("jwt service"));

        store
            .create_user(NewUser {
                username: Some("alice".into()),
                email: "alice@example.com".into(),
                password_hash: Some(passwords.hash_password("correct horse").expect("hash")),
            })
            .await
            .expect("seed alice");
        store
            .create_user(NewUser::federated("fed-only@example.com"))
            .await
            .expect("seed federated user");

        let authenticator = LocalAuthenticator::new(
            Arc::new(store.clone()),
            Arc::clone(&passwords),
            Arc::clone(&jwt),
        );
        Fixture {
            store,
            authenticator,
            jwt,
        }
    }

    #[tokio::test]
    async fn valid_login_issues_token_for_resolved_user() {
        let fx = fixture().await;
        let alice = fx
            .store
            .find_by_username("alice")
            .await
            .expect("lookup")
            .expect("alice exists");

        for req in [
            request(Some("alice"), None, Some("correct horse")),
            request(None, Some("ALICE@example.com"), Some("correct horse")),
        ] {
            let token = fx.authenticator.login(req).await.expect("login succeeds");
            let claims = fx
                .jwt
                .decode_session_token(&token.token)
                .expect("token verifies");
            assert_eq!(claims.sub, alice.id);
        }
    }

    #[tokio::test]
    async fn unknown_user_and_wrong_password_fail_identically() {
        let fx = fixture().await;

        let cases = [
            request(Some("alice"), None, Some("wrong")),
            request(Some("mallory"), None, Some("correct horse")),
            request(None, Some("nobody@example.com"), Some("pw")),
            request(None, Some("fed-only@example.com"), Some("")),
        ];
        for req in cases {
            let err = fx.authenticator.login(req).await.expect_err("must fail");
            assert!(matches!(err, AuthError::InvalidCredentials), "{err:?}");
        }
    }

    #[tokio::test]
    async fn store_outage_is_not_reported_as_bad_credentials() {
        let fx = fixture().await;
        fx.store.set_unavailable(true);

        let err = fx
            .authenticator
            .login(request(Some("alice"), None, Some("correct horse")))
            .await
            .expect_err("store is down");
        assert!(matches!(err, AuthError::Store(_)));
    }

    #[tokio::test]
    async fn invalid_shape_never_reaches_the_store() {
        let fx = fixture().await;
        fx.store.set_unavailable(true);

        let err = fx
            .authenticator
            .login(request(Some("alice"), Some("alice@example.com"), Some("pw")))
            .await
            .expect_err("invalid shape");
        assert!(matches!(err, AuthError::ValidationFailed(_)));
    }
}
