//! Bearer-credential verification for the `/ws` upgrade.

use std::str::FromStr;

use callwire_core::UserId;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing token")]
    MissingToken,
    #[error("token expired")]
    Expired,
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("token subject is not a user id")]
    InvalidSubject,
    #[error("unsupported jwt algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

impl AuthError {
    /// Short classification for logs and metrics labels.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingToken => "missing",
            Self::Expired => "expired",
            Self::InvalidToken(_) => "invalid",
            Self::InvalidSubject => "invalid_subject",
            Self::UnsupportedAlgorithm(_) => "unsupported_algorithm",
        }
    }
}

/// Resolves a bearer credential to the user it was issued for.
#[cfg_attr(test, mockall::automock)]
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, token: &str) -> Result<UserId, AuthError>;
}

#[derive(Deserialize)]
struct Claims {
    sub: String,
}

/// Verifies HMAC-signed JWTs whose `sub` is the user UUID.
pub struct JwtIdentityResolver {
    key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityResolver {
    /// `algorithm` is a JOSE name; only the HMAC family is accepted since the
    /// key is a shared secret.
    pub fn new(secret: &str, algorithm: &str) -> Result<Self, AuthError> {
        let alg = Algorithm::from_str(algorithm.trim())
            .map_err(|_| AuthError::UnsupportedAlgorithm(algorithm.to_owned()))?;
        if !matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(AuthError::UnsupportedAlgorithm(algorithm.to_owned()));
        }

        let mut validation = Validation::new(alg);
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }
}

impl IdentityResolver for JwtIdentityResolver {
    fn resolve(&self, token: &str) -> Result<UserId, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken(e.to_string()),
            }
        })?;

        UserId::parse(&data.claims.sub).ok_or(AuthError::InvalidSubject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &str = "test-secret";

    fn now() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    fn mint(claims: serde_json::Value, alg: Algorithm, secret: &str) -> String {
        encode(
            &Header::new(alg),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn resolver() -> JwtIdentityResolver {
        JwtIdentityResolver::new(SECRET, "HS256").unwrap()
    }

    #[test]
    fn valid_token_resolves_subject() {
        let user = UserId::new();
        let token = mint(
            json!({"sub": user.to_string(), "exp": now() + 3600}),
            Algorithm::HS256,
            SECRET,
        );
        assert_eq!(resolver().resolve(&token).unwrap(), user);
    }

    #[test]
    fn empty_token_is_missing() {
        assert_eq!(resolver().resolve(""), Err(AuthError::MissingToken));
        assert_eq!(resolver().resolve("   "), Err(AuthError::MissingToken));
    }

    #[test]
    fn expired_token_rejected() {
        let token = mint(
            json!({"sub": UserId::new().to_string(), "exp": now() - 3600}),
            Algorithm::HS256,
            SECRET,
        );
        assert_eq!(resolver().resolve(&token), Err(AuthError::Expired));
    }

    #[test]
    fn wrong_secret_rejected() {
        let token = mint(
            json!({"sub": UserId::new().to_string(), "exp": now() + 3600}),
            Algorithm::HS256,
            "other-secret",
        );
        assert!(matches!(
            resolver().resolve(&token),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn missing_exp_rejected() {
        let token = mint(
            json!({"sub": UserId::new().to_string()}),
            Algorithm::HS256,
            SECRET,
        );
        assert!(matches!(
            resolver().resolve(&token),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn non_uuid_subject_rejected() {
        let token = mint(
            json!({"sub": "alice", "exp": now() + 3600}),
            Algorithm::HS256,
            SECRET,
        );
        assert_eq!(resolver().resolve(&token), Err(AuthError::InvalidSubject));
    }

    #[test]
    fn algorithm_mismatch_rejected() {
        let token = mint(
            json!({"sub": UserId::new().to_string(), "exp": now() + 3600}),
            Algorithm::HS512,
            SECRET,
        );
        assert!(matches!(
            resolver().resolve(&token),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn garbage_rejected() {
        assert!(matches!(
            resolver().resolve("not.a.jwt"),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn hs384_configurable() {
        let user = UserId::new();
        let r = JwtIdentityResolver::new(SECRET, "HS384").unwrap();
        let token = mint(
            json!({"sub": user.to_string(), "exp": now() + 60}),
            Algorithm::HS384,
            SECRET,
        );
        assert_eq!(r.resolve(&token).unwrap(), user);
    }

    #[test]
    fn asymmetric_algorithms_unsupported() {
        assert!(matches!(
            JwtIdentityResolver::new(SECRET, "RS256"),
            Err(AuthError::UnsupportedAlgorithm(_))
        ));
        assert!(matches!(
            JwtIdentityResolver::new(SECRET, "bogus"),
            Err(AuthError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn reasons_are_stable() {
        assert_eq!(AuthError::MissingToken.reason(), "missing");
        assert_eq!(AuthError::Expired.reason(), "expired");
        assert_eq!(AuthError::InvalidSubject.reason(), "invalid_subject");
    }
}
