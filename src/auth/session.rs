//! Session tokens identifying the caller (HS256 JWT, `sub` = account email).

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::AuthError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Account email of the caller
    pub sub: String,
    /// Issued-at unix seconds
    pub iat: i64,
    /// Expiration unix seconds
    pub exp: i64,
}

/// Issue a session token. Returns the token and its expiry (unix seconds).
pub fn issue(secret: &str, user: &str, ttl_days: i64) -> Result<(String, i64), AuthError> {
    let now = Utc::now();
    let exp = now + Duration::days(ttl_days.max(1));
    let claims = SessionClaims {
        sub: user.to_string(),
        iat: now.timestamp(),
        exp: exp.timestamp(),
    };
    let token = jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok((token, claims.exp))
}

pub fn verify(token: &str, secret: &str) -> Result<SessionClaims, AuthError> {
    let token_data = jsonwebtoken::decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies() {
        let (token, exp) = issue("secret", "a@example.com", 30).unwrap();
        let claims = verify(&token, "secret").unwrap();
        assert_eq!(claims.sub, "a@example.com");
        assert_eq!(claims.exp, exp);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let (token, _) = issue("secret", "a@example.com", 30).unwrap();
        assert!(matches!(verify(&token, "other"), Err(AuthError::Session(_))));
    }

    #[test]
    fn bearer_parsing() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer abc "), Some("abc"));
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Basic abc"), None);
    }
}
