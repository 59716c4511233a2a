use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use crate::auth::{AuthConfig, AuthError, AuthResult};

/// The only algorithm tokens are signed or accepted with.
const SIGNING_ALGORITHM: Algorithm = Algorithm::HS512;

/// Claims carried by a session token.
///
/// `sub` is typed as a UUID, so a token whose subject is missing or not a
/// well-formed identifier fails to decode.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone)]
pub struct SignedSessionToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    token_ttl: Duration,
}

impl JwtService {
    pub fn from_config(config: &AuthConfig) -> AuthResult<Self> {
        if config.jwt_secret.is_empty() {
            return Err(AuthError::Config("jwt secret must not be empty".into()));
        }
        let secret_bytes = config.jwt_secret.as_bytes();
        let encoding_key = EncodingKey::from_secret(secret_bytes);
        let decoding_key = DecodingKey::from_secret(secret_bytes);

        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "iat", "sub"]);
        validation.leeway = config.token_leeway_secs;

        Ok(Self {
            encoding_key,
            decoding_key,
            validation,
            token_ttl: Duration::seconds(config.token_ttl_secs),
        })
    }

    pub fn issue_session_token(&self, user_id: Uuid) -> AuthResult<SignedSessionToken> {
        let now = Utc::now();
        let expires_at = now + self.token_ttl;

        let claims = SessionClaims {
            sub: user_id,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(SIGNING_ALGORITHM), &claims, &self.encoding_key)?;

        Ok(SignedSessionToken { token, expires_at })
    }

    /// Verify signature and expiry, returning the claims.
    ///
    /// Every failure, whether a bad signature, expiry, a foreign algorithm or
    /// a malformed subject, collapses to `InvalidToken`.
    pub fn decode_session_token(&self, token: &str) -> AuthResult<SessionClaims> {
        decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| {
                log::debug!("session token rejected: {}", err);
                AuthError::InvalidToken
            })
    }

    /// Turn a raw `Authorization` header value into the authenticated user id.
    ///
    /// The user is not looked up again: a valid signature is proof enough.
    pub fn verify_bearer(&self, header: &str) -> AuthResult<Uuid> {
        let token = bearer_token(header)?;
        let claims = self.decode_session_token(token)?;
        Ok(claims.sub)
    }
}

/// Extract the token from a header of the exact form `Bearer <token>`.
pub fn bearer_token(header: &str) -> AuthResult<&str> {
    let mut parts = header.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("Bearer") => Ok(token),
        _ => Err(AuthError::MalformedAuthHeader),
    }
}

#[cfg(test)]
mod tests {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    use super::*;
    use crate::auth::AuthConfig;

    const TEST_JWT_SECRET: &str = "super-secret-test-key-with-enough-bytes";

    fn make_test_config() -> AuthConfig {
        AuthConfig {
            jwt_secret: TEST_JWT_SECRET.into(),
            token_ttl_secs: 900,
            token_leeway_secs: 0,
            facebook: None,
            google: None,
        }
    }

    fn service_with(config: &AuthConfig) -> JwtService {
        JwtService::from_config(config).expect("jwt service")
    }

    #[test]
    fn issues_and_verifies_session_tokens() {
        let service = service_with(&make_test_config());
        let user_id = Uuid::new_v4();

        let token = service.issue_session_token(user_id).expect("issue token");
        let claims = service
            .decode_session_token(&token.token)
            .expect("decode token");

        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.exp - claims.iat, 900);
        assert_eq!(
            service
                .verify_bearer(&format!("Bearer {}", token.token))
                .expect("bearer verifies"),
            user_id
        );
    }

    #[test]
    fn bearer_scheme_is_case_insensitive_but_shape_is_strict() {
        assert_eq!(bearer_token("bearer abc").expect("lowercase"), "abc");
        assert_eq!(bearer_token("BEARER abc").expect("uppercase"), "abc");

        for header in ["abc", "Bearer", "Bearer a b", "Basic abc", "Token abc", ""] {
            assert!(
                matches!(bearer_token(header), Err(AuthError::MalformedAuthHeader)),
                "{header:?} should be malformed"
            );
        }
    }

    #[test]
    fn flipped_signature_is_rejected() {
        let service = service_with(&make_test_config());
        let token = service
            .issue_session_token(Uuid::new_v4())
            .expect("issue token")
            .token;

        let (unsigned, signature) = token.rsplit_once('.').expect("three segments");
        let mut sig = URL_SAFE_NO_PAD.decode(signature).expect("signature is base64");
        sig[0] ^= 0x01;
        let tampered = format!("{unsigned}.{}", URL_SAFE_NO_PAD.encode(sig));

        assert!(matches!(
            service.decode_session_token(&tampered),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let mut config = make_test_config();
        config.token_ttl_secs = -120;
        let service = service_with(&config);
        let token = service
            .issue_session_token(Uuid::new_v4())
            .expect("issue token");

        assert!(matches!(
            service.decode_session_token(&token.token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn token_from_another_secret_is_rejected() {
        let service = service_with(&make_test_config());
        let mut other_config = make_test_config();
        other_config.jwt_secret = "a-completely-different-secret-value!!".into();
        let other = service_with(&other_config);

        let token = other
            .issue_session_token(Uuid::new_v4())
            .expect("issue token");
        assert!(matches!(
            service.decode_session_token(&token.token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn other_algorithms_are_rejected() {
        let service = service_with(&make_test_config());
        let now = Utc::now().timestamp();
        let claims = SessionClaims {
            sub: Uuid::new_v4(),
            iat: now,
            exp: now + 600,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
        )
        .expect("encode");

        assert!(matches!(
            service.decode_session_token(&token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn subject_must_be_a_uuid() {
        let service = service_with(&make_test_config());
        let now = Utc::now().timestamp();
        let key = EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes());
        let header = Header::new(SIGNING_ALGORITHM);

        let bad_subject = serde_json::json!({ "sub": "42", "iat": now, "exp": now + 600 });
        let missing_subject = serde_json::json!({ "uid": Uuid::new_v4(), "iat": now, "exp": now + 600 });

        for claims in [bad_subject, missing_subject] {
            let token = encode(&header, &claims, &key).expect("encode");
            assert!(matches!(
                service.decode_session_token(&token),
                Err(AuthError::InvalidToken)
            ));
        }
    }
}
