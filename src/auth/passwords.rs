use argon2::{
    Algorithm, Argon2, ParamsBuilder, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::SaltString,
};
use base64::Engine;
use rand::RngCore;

use crate::auth::{AuthError, AuthResult};

const SALT_LEN: usize = 16;
const DUMMY_SECRET_LEN: usize = 32;

/// Argon2id hashing and verification.
///
/// Verification on the login path goes through [`PasswordService::verify_or_dummy`],
/// which always performs exactly one full hash computation. When there is no
/// usable stored hash (unknown account, federation-only account, corrupt row)
/// the candidate is checked against `dummy_hash` instead: a well-formed hash of
/// 32 random bytes generated at construction with this service's own
/// parameters. Nobody knows its preimage, so the comparison always fails, and
/// it costs the same as checking a real hash.
#[derive(Clone)]
pub struct PasswordService {
    argon2: Argon2<'static>,
    dummy_hash: String,
}

impl PasswordService {
    pub fn new() -> AuthResult<Self> {
        Self::with_params(19 * 1024, 2, 1) // 19 MiB
    }

    pub fn with_params(m_cost_kib: u32, t_cost: u32, p_cost: u32) -> AuthResult<Self> {
        let mut builder = ParamsBuilder::new();
        builder.m_cost(m_cost_kib);
        builder.t_cost(t_cost);
        builder.p_cost(p_cost);
        let params = builder.build().map_err(AuthError::from)?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut secret = [0u8; DUMMY_SECRET_LEN];
        rand::thread_rng().fill_bytes(&mut secret);
        let secret = base64::engine::general_purpose::STANDARD_NO_PAD.encode(secret);
        let dummy_hash = hash_with(&argon2, &secret)?;

        Ok(Self { argon2, dummy_hash })
    }

    pub fn hash_password(&self, password: &str) -> AuthResult<String> {
        hash_with(&self.argon2, password)
    }

    /// Check `password` against `stored`, paying the full hashing cost on
    /// every path.
    ///
    /// Returns `true` only for a real match. A missing hash, an unparsable
    /// hash, or any verifier error all yield `false` after a comparison
    /// against the dummy hash.
    pub fn verify_or_dummy(&self, password: &str, stored: Option<&str>) -> bool {
        let parsed = stored.and_then(|encoded| match PasswordHash::new(encoded) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                log::warn!("stored password hash is malformed: {}", err);
                None
            }
        });

        match parsed {
            Some(parsed) => match self.argon2.verify_password(password.as_bytes(), &parsed) {
                Ok(()) => true,
                Err(argon2::password_hash::Error::Password) => false,
                Err(err) => {
                    log::warn!("password verification error: {}", err);
                    self.burn_dummy(password);
                    false
                }
            },
            None => {
                self.burn_dummy(password);
                false
            }
        }
    }

    fn burn_dummy(&self, password: &str) {
        if let Ok(dummy) = PasswordHash::new(&self.dummy_hash) {
            let _ = self.argon2.verify_password(password.as_bytes(), &dummy);
        }
    }
}

fn hash_with(argon2: &Argon2<'static>, password: &str) -> AuthResult<String> {
    let mut salt_bytes = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes).map_err(AuthError::from)?;
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(AuthError::from)?
        .to_string();
    Ok(hash)
}
