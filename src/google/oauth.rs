//! Google OAuth 2.0 authorization-code flow (with PKCE) for Drive delegation.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::auth::{AuthError, AuthorizationFlow, AuthorizationRequest, Credentials, TokenRefresher};
use crate::config::OAuthClientConfig;

const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// Drive access limited to files this app creates, plus the account email.
pub const GOOGLE_SCOPES: &str = "https://www.googleapis.com/auth/drive.file openid email";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    email: Option<String>,
}

fn generate_pkce() -> (String, String) {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let chars: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let verifier: String = (0..64)
        .map(|_| chars[rng.gen_range(0..chars.len())] as char)
        .collect();

    let challenge = pkce_challenge(&verifier);
    (verifier, challenge)
}

fn pkce_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

fn generate_state() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Identity used when the userinfo endpoint does not yield an email.
fn fallback_identity(access_token: &str) -> String {
    format!("{:x}", md5::compute(access_token.as_bytes()))
}

fn scopes_of(response: &TokenResponse) -> Vec<String> {
    response
        .scope
        .as_deref()
        .unwrap_or(GOOGLE_SCOPES)
        .split_whitespace()
        .map(|s| s.to_string())
        .collect()
}

/// Google OAuth client bound to one redirect URI.
#[derive(Clone)]
pub struct GoogleOAuth {
    http: reqwest::Client,
    client: OAuthClientConfig,
    redirect_uri: String,
}

impl GoogleOAuth {
    pub fn new(http: reqwest::Client, client: OAuthClientConfig, redirect_uri: String) -> Self {
        Self {
            http,
            client,
            redirect_uri,
        }
    }

    /// Consent URL for the given state and PKCE challenge.
    pub fn authorize_url(&self, state: &str, challenge: &str) -> Result<String, AuthError> {
        let mut url = url::Url::parse(GOOGLE_AUTHORIZE_URL)
            .map_err(|e| AuthError::Malformed(format!("Failed to parse URL: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.client.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", GOOGLE_SCOPES)
            .append_pair("code_challenge", challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("state", state)
            .append_pair("access_type", "offline")
            .append_pair("include_granted_scopes", "true")
            .append_pair("prompt", "consent");

        Ok(url.to_string())
    }

    async fn token_request(&self, body: String) -> Result<TokenResponse, AuthError> {
        let response = self
            .http
            .post(GOOGLE_TOKEN_URL)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            tracing::error!("Google token endpoint returned {}: {}", status, message);
            return Err(AuthError::TokenEndpoint { status, message });
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::Malformed(format!("Failed to parse token response: {}", e)))
    }

    async fn account_email(&self, access_token: &str) -> String {
        let result = async {
            let info: UserInfo = self
                .http
                .get(GOOGLE_USERINFO_URL)
                .bearer_auth(access_token)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            Ok::<_, reqwest::Error>(info.email)
        }
        .await;

        match result {
            Ok(Some(email)) => email,
            Ok(None) => fallback_identity(access_token),
            Err(e) => {
                tracing::warn!("Failed to fetch account email, using token digest: {}", e);
                fallback_identity(access_token)
            }
        }
    }
}

#[async_trait]
impl AuthorizationFlow for GoogleOAuth {
    fn begin(&self) -> Result<AuthorizationRequest, AuthError> {
        let (verifier, challenge) = generate_pkce();
        let state = generate_state();
        let url = self.authorize_url(&state, &challenge)?;
        Ok(AuthorizationRequest {
            url,
            state,
            verifier,
        })
    }

    async fn complete(&self, code: &str, verifier: &str) -> Result<(Credentials, String), AuthError> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("client_id", &self.client.client_id)
            .append_pair("client_secret", &self.client.client_secret)
            .append_pair("code", code)
            .append_pair("grant_type", "authorization_code")
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("code_verifier", verifier)
            .finish();

        let token = self.token_request(body).await?;
        let email = self.account_email(&token.access_token).await;
        let expires_in = token.expires_in.unwrap_or(3600);

        let credentials = Credentials {
            scopes: scopes_of(&token),
            expires_at: chrono::Utc::now().timestamp() + expires_in,
            refresh_token: token.refresh_token,
            access_token: token.access_token,
            email: email.clone(),
        };

        if credentials.refresh_token.is_none() {
            tracing::warn!(user = %email, "No refresh token granted; credentials will expire");
        }
        Ok((credentials, email))
    }
}

#[async_trait]
impl TokenRefresher for GoogleOAuth {
    async fn refresh(&self, credentials: &Credentials) -> Result<Credentials, AuthError> {
        let refresh_token = credentials
            .refresh_token
            .as_deref()
            .ok_or_else(|| AuthError::Expired(credentials.email.clone()))?;

        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("client_id", &self.client.client_id)
            .append_pair("client_secret", &self.client.client_secret)
            .append_pair("refresh_token", refresh_token)
            .append_pair("grant_type", "refresh_token")
            .finish();

        let token = match self.token_request(body).await {
            Ok(token) => token,
            Err(AuthError::TokenEndpoint { status, message }) if message.contains("invalid_grant") => {
                return Err(AuthError::RefreshFailed(format!(
                    "refresh token rejected ({}). Please login again.",
                    status
                )));
            }
            Err(e) => return Err(e),
        };

        let expires_in = token.expires_in.unwrap_or(3600);
        tracing::info!(
            user = %credentials.email,
            "Refreshed Google OAuth token, expires in {} seconds",
            expires_in
        );

        Ok(Credentials {
            scopes: if token.scope.is_some() {
                scopes_of(&token)
            } else {
                credentials.scopes.clone()
            },
            expires_at: chrono::Utc::now().timestamp() + expires_in,
            refresh_token: token
                .refresh_token
                .or_else(|| credentials.refresh_token.clone()),
            access_token: token.access_token,
            email: credentials.email.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oauth() -> GoogleOAuth {
        GoogleOAuth::new(
            reqwest::Client::new(),
            OAuthClientConfig {
                client_id: "client-123".to_string(),
                client_secret: "secret".to_string(),
            },
            "http://localhost:8000/auth/callback".to_string(),
        )
    }

    #[test]
    fn begin_builds_consent_url_with_state_and_challenge() {
        let request = oauth().begin().unwrap();
        let url = url::Url::parse(&request.url).unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(url.host_str(), Some("accounts.google.com"));
        assert_eq!(params["client_id"], "client-123");
        assert_eq!(params["redirect_uri"], "http://localhost:8000/auth/callback");
        assert_eq!(params["state"], request.state);
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["code_challenge"], pkce_challenge(&request.verifier));
        assert!(params["scope"].contains("drive.file"));
    }

    #[test]
    fn states_are_unique_hex() {
        let a = generate_state();
        let b = generate_state();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn pkce_challenge_matches_rfc_example() {
        // RFC 7636 appendix B
        assert_eq!(
            pkce_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn fallback_identity_is_stable_md5_hex() {
        let id = fallback_identity("token");
        assert_eq!(id.len(), 32);
        assert_eq!(id, fallback_identity("token"));
        assert_ne!(id, fallback_identity("other"));
    }

    #[test]
    fn scopes_default_when_absent() {
        let token: TokenResponse = serde_json::from_str(r#"{"access_token":"x"}"#).unwrap();
        assert_eq!(scopes_of(&token).len(), 3);
    }
}
