//! File-backed credential store, one JSON file per user.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use super::{AuthError, CredentialStore, Credentials, TokenRefresher};

/// File stem for a user's credentials: hex SHA-256 of the account email.
///
/// Distinct emails never share a file, and the stem is always a safe file name.
pub fn user_file_key(user: &str) -> String {
    hex::encode(Sha256::digest(user.as_bytes()))
}

/// Stores credentials under `{dir}/{sha256(email)}.json`.
///
/// Loads of one user are serialized so a refresh happens at most once per expiry;
/// different users never share state.
pub struct FileCredentialStore {
    dir: PathBuf,
    refresher: Arc<dyn TokenRefresher>,
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FileCredentialStore {
    pub fn new(dir: impl Into<PathBuf>, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            dir: dir.into(),
            refresher,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn path_for(&self, user: &str) -> PathBuf {
        self.dir.join(format!("{}.json", user_file_key(user)))
    }

    async fn user_lock(&self, user: &str) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().await;
        Arc::clone(locks.entry(user.to_string()).or_default())
    }

    async fn read(path: &Path) -> Result<Option<Credentials>, AuthError> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, user: &str, credentials: &Credentials) -> Result<(), AuthError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(user);
        let contents = serde_json::to_string_pretty(credentials)?;
        tokio::fs::write(&path, contents).await?;
        tracing::debug!("Saved credentials to {}", path.display());
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self, user: &str) -> Result<Option<Credentials>, AuthError> {
        let lock = self.user_lock(user).await;
        let _guard = lock.lock().await;

        let Some(credentials) = Self::read(&self.path_for(user)).await? else {
            return Ok(None);
        };

        if !credentials.is_expired() {
            return Ok(Some(credentials));
        }

        if credentials.refresh_token.is_none() {
            return Err(AuthError::Expired(user.to_string()));
        }

        tracing::info!(user, "Access token expired, refreshing");
        let refreshed = self.refresher.refresh(&credentials).await?;
        self.write(user, &refreshed).await?;
        Ok(Some(refreshed))
    }

    async fn save(&self, user: &str, credentials: &Credentials) -> Result<(), AuthError> {
        let lock = self.user_lock(user).await;
        let _guard = lock.lock().await;
        self.write(user, credentials).await
    }
}
