//! Configuration management for channel-report.
//!
//! Configuration is read from environment variables:
//! - `YOUTUBE_API_KEY` - Required. YouTube Data API v3 key.
//! - `GOOGLE_DRIVE_FOLDER_ID` - Required. Parent Drive folder for daily output folders.
//! - `GOOGLE_CLIENT_ID` / `GOOGLE_CLIENT_SECRET` - OAuth client. When unset, the
//!   client is read from `GOOGLE_CLIENT_SECRET_JSON` (defaults to `./client_secret.json`).
//! - `BACKEND_URL` - Optional. Public URL of this server. Defaults to `http://localhost:8000`.
//! - `FRONTEND_URL` - Optional. Where the OAuth callback redirects. Defaults to `http://localhost:5173`.
//! - `SESSION_SECRET` - Optional. HS256 secret for session tokens.
//! - `SESSION_TTL_DAYS` - Optional. Session token lifetime. Defaults to `30`.
//! - `TOKENS_DIR` - Optional. Per-user credential files. Defaults to `./tokens`.
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `8000`.
//! - `CORS_ORIGINS` - Optional. Comma-separated allowed origins. Defaults to `FRONTEND_URL`.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Secret used when `SESSION_SECRET` is not set. Only acceptable for local runs.
pub const DEV_SESSION_SECRET: &str = "dev-secret-change-in-production";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Failed to read OAuth client file {0}: {1}")]
    ClientSecretFile(String, String),
}

/// OAuth client registration used for the Drive delegation flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
}

/// Layout of the client secret file downloaded from the Google console.
#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    web: Option<ClientSecretEntry>,
    installed: Option<ClientSecretEntry>,
}

#[derive(Debug, Deserialize)]
struct ClientSecretEntry {
    client_id: String,
    client_secret: String,
}

impl OAuthClientConfig {
    /// Parse a Google client secret JSON document (`web` or `installed` flavour).
    pub fn from_json(contents: &str) -> Result<Self, String> {
        let file: ClientSecretFile = serde_json::from_str(contents).map_err(|e| e.to_string())?;
        let entry = file
            .web
            .or(file.installed)
            .ok_or_else(|| "expected a \"web\" or \"installed\" section".to_string())?;
        Ok(Self {
            client_id: entry.client_id,
            client_secret: entry.client_secret,
        })
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ClientSecretFile(display.clone(), e.to_string()))?;
        Self::from_json(&contents).map_err(|e| ConfigError::ClientSecretFile(display, e))
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// YouTube Data API key
    pub youtube_api_key: String,

    /// Drive folder that holds one sub-folder per day
    pub drive_parent_folder_id: String,

    /// OAuth client for the Drive delegation flow
    pub oauth_client: OAuthClientConfig,

    /// Public base URL of this server (used to build the OAuth redirect URI)
    pub backend_url: String,

    /// Frontend URL the OAuth callback redirects back to
    pub frontend_url: String,

    /// Secret for signing session tokens
    pub session_secret: String,

    /// Session token lifetime in days
    pub session_ttl_days: i64,

    /// Directory with one credential file per user
    pub tokens_dir: PathBuf,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Allowed CORS origins
    pub cors_origins: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if a required variable is not set,
    /// and `ConfigError::ClientSecretFile` if no OAuth client can be found.
    pub fn from_env() -> Result<Self, ConfigError> {
        let youtube_api_key = required("YOUTUBE_API_KEY")?;
        let drive_parent_folder_id = required("GOOGLE_DRIVE_FOLDER_ID")?;

        let oauth_client = match (
            std::env::var("GOOGLE_CLIENT_ID").ok(),
            std::env::var("GOOGLE_CLIENT_SECRET").ok(),
        ) {
            (Some(client_id), Some(client_secret)) => OAuthClientConfig {
                client_id,
                client_secret,
            },
            _ => {
                let path = std::env::var("GOOGLE_CLIENT_SECRET_JSON")
                    .unwrap_or_else(|_| "./client_secret.json".to_string());
                OAuthClientConfig::from_file(Path::new(&path))?
            }
        };

        let backend_url = std::env::var("BACKEND_URL")
            .unwrap_or_else(|_| "http://localhost:8000".to_string())
            .trim_end_matches('/')
            .to_string();

        let frontend_url = std::env::var("FRONTEND_URL")
            .unwrap_or_else(|_| "http://localhost:5173".to_string())
            .trim_end_matches('/')
            .to_string();

        let session_secret = std::env::var("SESSION_SECRET").unwrap_or_else(|_| {
            tracing::warn!("SESSION_SECRET not set, using the development secret");
            DEV_SESSION_SECRET.to_string()
        });

        let session_ttl_days = parse_var("SESSION_TTL_DAYS", "30")?;

        let tokens_dir = std::env::var("TOKENS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./tokens"));

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = parse_var("PORT", "8000")?;

        let cors_origins = std::env::var("CORS_ORIGINS")
            .map(|v| parse_origins(&v))
            .unwrap_or_else(|_| vec![frontend_url.clone()]);

        Ok(Self {
            youtube_api_key,
            drive_parent_folder_id,
            oauth_client,
            backend_url,
            frontend_url,
            session_secret,
            session_ttl_days,
            tokens_dir,
            host,
            port,
            cors_origins,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(youtube_api_key: String, drive_parent_folder_id: String, tokens_dir: PathBuf) -> Self {
        Self {
            youtube_api_key,
            drive_parent_folder_id,
            oauth_client: OAuthClientConfig {
                client_id: "test-client".to_string(),
                client_secret: "test-secret".to_string(),
            },
            backend_url: "http://localhost:8000".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            session_secret: DEV_SESSION_SECRET.to_string(),
            session_ttl_days: 30,
            tokens_dir,
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_origins: vec!["http://localhost:5173".to_string()],
        }
    }

    /// Redirect URI registered with the OAuth client.
    pub fn oauth_redirect_uri(&self) -> String {
        format!("{}/auth/callback", self.backend_url)
    }
}

fn required(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

fn parse_var<T>(name: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}

fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().trim_end_matches('/'))
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}
