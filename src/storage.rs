//! Storage destination abstraction.
//!
//! Reports land in a per-day folder under a fixed parent folder. The backend is
//! always bound to one user's delegated credentials; [`StorageProvider`] hands
//! out a backend for a given user.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::NaiveDate;
use std::sync::Arc;
use thiserror::Error;

use crate::auth::AuthError;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("User not authenticated. Please login first. ({0})")]
    NotAuthenticated(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Storage request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Storage API returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected storage response: {0}")]
    Malformed(String),
}

/// Folder and file operations against one user's storage.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Id of the folder `name` directly under `parent_id`, created if absent.
    async fn find_or_create_folder(&self, parent_id: &str, name: &str)
        -> Result<String, StorageError>;

    /// Number of non-trashed entries directly under `folder_id`.
    async fn count_entries(&self, folder_id: &str) -> Result<usize, StorageError>;

    /// Upload a file and return its id.
    async fn upload(
        &self,
        folder_id: &str,
        name: &str,
        mime_type: &str,
        data: Bytes,
    ) -> Result<String, StorageError>;

    /// Shareable link for an uploaded file.
    fn file_link(&self, file_id: &str) -> String;
}

/// Builds a [`StorageBackend`] acting with a user's delegated credentials.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    async fn for_user(&self, user: &str) -> Result<Arc<dyn StorageBackend>, StorageError>;
}

/// Name of the daily folder (`MM-DD-YYYY`).
pub fn daily_folder_name(date: NaiveDate) -> String {
    date.format("%m-%d-%Y").to_string()
}

/// Today's date in the server's local time zone.
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}
