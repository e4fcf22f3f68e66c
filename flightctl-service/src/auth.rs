//! Bearer-token authentication for the REST boundary (§6, §7
//! AuthN/AuthZ), grounded in the teacher's `api::auth::AuthManager` —
//! same `jsonwebtoken` HS256 claims shape and minimum-secret-length
//! fail-fast-on-startup check, simplified from the teacher's
//! challenge/nonce wallet flow (no client holds a signing keypair here)
//! down to a single org-scoped subject claim.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Mirrors the teacher's `MIN_JWT_SECRET_LEN` fail-fast check.
pub const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthClaims {
    /// The caller's identity, scoped to a single `orgId` (§7 "never leaks
    /// resource existence across orgs" starts with knowing which org a
    /// caller belongs to).
    pub sub: String,
    pub org_id: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthConfigError {
    MissingJwtSecret,
    JwtSecretTooShort { min_len: usize, actual_len: usize },
}

impl fmt::Display for AuthConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthConfigError::MissingJwtSecret => write!(f, "JWT_SECRET must be set"),
            AuthConfigError::JwtSecretTooShort { min_len, actual_len } => write!(
                f,
                "JWT_SECRET must be at least {min_len} characters (got {actual_len})"
            ),
        }
    }
}

impl std::error::Error for AuthConfigError {}

pub struct AuthManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl AuthManager {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Disabling auth for tests is an explicit env toggle (§6): when
    /// `FLIGHTCTL_DISABLE_AUTH=true`, the middleware is never installed and
    /// this constructor never runs, so there is no insecure default secret
    /// lurking in the binary.
    pub fn from_env() -> Result<Self, AuthConfigError> {
        let secret = std::env::var("JWT_SECRET").map_err(|_| AuthConfigError::MissingJwtSecret)?;
        Self::validate_jwt_secret(&secret)?;
        Ok(Self::new(&secret))
    }

    fn validate_jwt_secret(secret: &str) -> Result<(), AuthConfigError> {
        let actual_len = secret.len();
        if actual_len < MIN_JWT_SECRET_LEN {
            return Err(AuthConfigError::JwtSecretTooShort {
                min_len: MIN_JWT_SECRET_LEN,
                actual_len,
            });
        }
        Ok(())
    }

    pub fn issue(&self, subject: &str, org_id: &str, ttl_seconds: i64) -> Result<String, jsonwebtoken::errors::Error> {
        let now = chrono::Utc::now().timestamp();
        let claims = AuthClaims {
            sub: subject.to_string(),
            org_id: org_id.to_string(),
            iat: now,
            exp: now + ttl_seconds,
        };
        encode(&Header::default(), &claims, &self.encoding_key)
    }

    pub fn validate(&self, token: &str) -> Result<AuthClaims, jsonwebtoken::errors::Error> {
        let data = decode::<AuthClaims>(token, &self.decoding_key, &Validation::default())?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_round_trips() {
        let mgr = AuthManager::new("0123456789abcdef0123456789abcdef");
        let token = mgr.issue("operator-1", "org1", 3600).unwrap();
        let claims = mgr.validate(&token).unwrap();
        assert_eq!(claims.sub, "operator-1");
        assert_eq!(claims.org_id, "org1");
    }

    #[test]
    fn short_secret_is_rejected() {
        let err = AuthManager::validate_jwt_secret("short").unwrap_err();
        assert!(matches!(err, AuthConfigError::JwtSecretTooShort { .. }));
    }
}
