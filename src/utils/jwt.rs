//! Signed member session tokens. The signer owns the issuer, audience and
//! lifetime, so callers only ever hand it a user or a token.

use std::collections::HashSet;

use jsonwebtoken::{decode, encode, errors::Error, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use time::Duration;

use crate::config::Config;
use crate::models::user::User;
use crate::routes::auth::claims::Claims;

/// Minimum acceptable size for the JWT secret in bytes.
pub const MIN_JWT_SECRET_LENGTH: usize = 32;
const MIN_UNIQUE_JWT_BYTES: usize = 8;

#[derive(Debug, Error)]
pub enum JwtSecretError {
    #[error("JWT_SECRET must be at least {required} bytes, but {actual} bytes were provided")]
    TooShort { actual: usize, required: usize },
    #[error("JWT_SECRET needs at least {required} distinct bytes; only {actual} found")]
    LowEntropy { actual: usize, required: usize },
    #[error("AUTH_TOKEN_TTL_MINUTES must be positive")]
    NonPositiveTtl,
}

#[derive(Clone)]
pub struct SessionTokens {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl std::fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTokens")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl SessionTokens {
    pub fn from_config(config: &Config) -> Result<Self, JwtSecretError> {
        let ttl = Duration::minutes(config.auth_token_ttl_minutes);
        if !ttl.is_positive() {
            return Err(JwtSecretError::NonPositiveTtl);
        }
        Self::new(
            &config.jwt_secret,
            &config.jwt_issuer,
            &config.jwt_audience,
            ttl,
        )
    }

    pub fn new(
        secret: impl AsRef<[u8]>,
        issuer: &str,
        audience: &str,
        ttl: Duration,
    ) -> Result<Self, JwtSecretError> {
        let bytes = secret.as_ref();
        validate_secret(bytes)?;

        Ok(Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            issuer: issuer.to_owned(),
            audience: audience.to_owned(),
            ttl,
        })
    }

    /// Lifetime of issued tokens; the auth cookie uses the same max-age.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issues a token asserting the user's current membership.
    pub fn issue(&self, user: &User) -> Result<String, Error> {
        let mut claims = Claims::for_user(user, self.ttl);
        claims.iss = self.issuer.clone();
        claims.aud = self.audience.clone();
        encode(&Header::default(), &claims, &self.encoding)
    }

    /// Checks signature, expiry, issuer and audience.
    pub fn verify(&self, token: &str) -> Result<Claims, Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&[&self.issuer]);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        Ok(decode::<Claims>(token, &self.decoding, &validation)?.claims)
    }
}

fn validate_secret(secret: &[u8]) -> Result<(), JwtSecretError> {
    if secret.len() < MIN_JWT_SECRET_LENGTH {
        return Err(JwtSecretError::TooShort {
            actual: secret.len(),
            required: MIN_JWT_SECRET_LENGTH,
        });
    }

    let unique = secret.iter().copied().collect::<HashSet<_>>().len();
    if unique < MIN_UNIQUE_JWT_BYTES {
        return Err(JwtSecretError::LowEntropy {
            actual: unique,
            required: MIN_UNIQUE_JWT_BYTES,
        });
    }

    Ok(())
}

#[cfg(test)]
pub(crate) fn test_session_tokens() -> SessionTokens {
    SessionTokens::from_config(&crate::config::test_config())
        .expect("test JWT settings should be valid")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::mock_db::sample_user;
    use crate::models::membership::{MembershipStatus, MembershipTier};
    use crate::models::user::AccountOrigin;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn member() -> User {
        sample_user("member@example.com", AccountOrigin::Credentials, MembershipTier::Diamond)
    }

    #[test]
    fn rejects_short_secret() {
        let err = SessionTokens::new("too-short", "iss", "aud", Duration::minutes(5)).unwrap_err();
        assert!(matches!(
            err,
            JwtSecretError::TooShort {
                actual,
                required: MIN_JWT_SECRET_LENGTH
            } if actual < MIN_JWT_SECRET_LENGTH
        ));
    }

    #[test]
    fn rejects_low_entropy_secret() {
        let err = SessionTokens::new(
            "a".repeat(MIN_JWT_SECRET_LENGTH),
            "iss",
            "aud",
            Duration::minutes(5),
        )
        .unwrap_err();
        assert!(matches!(err, JwtSecretError::LowEntropy { actual: 1, .. }));
    }

    #[test]
    fn config_without_positive_ttl_is_rejected() {
        let mut config = crate::config::test_config();
        config.auth_token_ttl_minutes = 0;
        assert!(matches!(
            SessionTokens::from_config(&config),
            Err(JwtSecretError::NonPositiveTtl)
        ));
    }

    #[test]
    fn issued_token_carries_membership_and_configured_audience() {
        let tokens = test_session_tokens();
        let user = member();

        let claims = tokens.verify(&tokens.issue(&user).unwrap()).unwrap();
        assert_eq!(claims.user_id, user.id.to_string());
        assert_eq!(claims.membership, MembershipTier::Diamond);
        assert_eq!(claims.membership_status, MembershipStatus::Active);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-audience");
    }

    #[test]
    fn token_for_another_audience_is_rejected() {
        let ours = SessionTokens::new(SECRET, "concierge", "concierge-web", Duration::minutes(5)).unwrap();
        let theirs = SessionTokens::new(SECRET, "concierge", "partner-portal", Duration::minutes(5)).unwrap();

        let token = theirs.issue(&member()).unwrap();
        assert!(ours.verify(&token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let tokens = SessionTokens::new(SECRET, "concierge", "concierge-web", Duration::hours(-1)).unwrap();
        let token = tokens.issue(&member()).unwrap();
        assert!(tokens.verify(&token).is_err());
    }
}
