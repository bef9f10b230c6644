//! Delegated credentials and caller sessions.
//!
//! ## Flow
//!
//! 1. `GET /auth/login` starts an authorization (state + PKCE verifier kept in memory)
//! 2. The provider redirects to `/auth/callback` with a code
//! 3. The code is exchanged for [`Credentials`], saved per user in the [`CredentialStore`]
//! 4. The caller gets a session token (JWT, `sub` = account email) for later requests
//!
//! Expired access tokens are refreshed transparently by the store on load.

mod credentials;
pub mod session;

pub use credentials::{user_file_key, FileCredentialStore};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Refresh access tokens that expire within this many seconds.
pub const EXPIRY_BUFFER_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Credentials for {0} expired and cannot be refreshed. Please login again.")]
    Expired(String),

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Token endpoint returned HTTP {status}: {message}")]
    TokenEndpoint { status: u16, message: String },

    #[error("OAuth request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected token response: {0}")]
    Malformed(String),

    #[error("Credential storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Credential file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Invalid session: {0}")]
    Session(#[from] jsonwebtoken::errors::Error),
}

/// Delegated OAuth credentials for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Unix seconds
    pub expires_at: i64,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub email: String,
}

impl Credentials {
    /// Whether the access token expires within `buffer_secs` of `now` (unix seconds).
    pub fn is_expired_at(&self, now: i64, buffer_secs: i64) -> bool {
        self.expires_at <= now + buffer_secs
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(chrono::Utc::now().timestamp(), EXPIRY_BUFFER_SECS)
    }
}

/// Per-user credential persistence.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load a user's credentials, refreshing and persisting them first if expired.
    async fn load(&self, user: &str) -> Result<Option<Credentials>, AuthError>;

    async fn save(&self, user: &str, credentials: &Credentials) -> Result<(), AuthError>;
}

/// Exchanges a refresh token for a new access token.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, credentials: &Credentials) -> Result<Credentials, AuthError>;
}

/// A started authorization: where to send the user, and what to remember.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
    pub verifier: String,
}

/// Authorization-code delegation flow.
#[async_trait]
pub trait AuthorizationFlow: Send + Sync {
    fn begin(&self) -> Result<AuthorizationRequest, AuthError>;

    /// Exchange the code; returns the credentials and the user they belong to.
    async fn complete(&self, code: &str, verifier: &str) -> Result<(Credentials, String), AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(expires_at: i64) -> Credentials {
        Credentials {
            access_token: "at".to_string(),
            refresh_token: Some("rt".to_string()),
            expires_at,
            scopes: vec![],
            email: "a@b.test".to_string(),
        }
    }

    #[test]
    fn expiry_honours_buffer() {
        let now = 1_000_000;
        assert!(creds(now - 1).is_expired_at(now, 0));
        assert!(creds(now + 30).is_expired_at(now, 60));
        assert!(!creds(now + 120).is_expired_at(now, 60));
    }

    #[test]
    fn credentials_round_trip_without_refresh_token() {
        let mut c = creds(42);
        c.refresh_token = None;
        let json = serde_json::to_string(&c).unwrap();
        assert!(!json.contains("refresh_token"));
        let back: Credentials = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }
}
