//! Google Drive v3 storage backend.

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::CredentialStore;
use crate::storage::{StorageBackend, StorageError, StorageProvider};

const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";
const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<FileRef>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileRef {
    id: String,
}

/// Quote a value for use inside a Drive search query.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn folder_query(parent_id: &str, name: &str) -> String {
    format!(
        "name={} and {} in parents and mimeType='{}' and trashed=false",
        quote(name),
        quote(parent_id),
        FOLDER_MIME_TYPE
    )
}

fn children_query(folder_id: &str) -> String {
    format!("{} in parents and trashed=false", quote(folder_id))
}

/// Build a `multipart/related` body: JSON metadata part followed by the media part.
fn multipart_related(boundary: &str, metadata: &serde_json::Value, mime_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(data.len() + 512);
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata.to_string().as_bytes());
    body.extend_from_slice(format!("\r\n--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime_type).as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

/// Drive client acting with one user's access token.
#[derive(Clone)]
pub struct DriveClient {
    http: reqwest::Client,
    access_token: String,
}

impl DriveClient {
    pub fn new(http: reqwest::Client, access_token: String) -> Self {
        Self { http, access_token }
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, StorageError> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(StorageError::Api { status, message });
        }
        response
            .json()
            .await
            .map_err(|e| StorageError::Malformed(e.to_string()))
    }

    async fn list(&self, query: &str, page_token: Option<&str>) -> Result<FileList, StorageError> {
        let mut request = self
            .http
            .get(format!("{}/files", DRIVE_API_BASE))
            .bearer_auth(&self.access_token)
            .query(&[
                ("q", query),
                ("fields", "nextPageToken,files(id)"),
                ("pageSize", "1000"),
                ("spaces", "drive"),
            ]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }
        Self::parse(request.send().await?).await
    }
}

#[async_trait]
impl StorageBackend for DriveClient {
    async fn find_or_create_folder(
        &self,
        parent_id: &str,
        name: &str,
    ) -> Result<String, StorageError> {
        let existing = self.list(&folder_query(parent_id, name), None).await?;
        if let Some(folder) = existing.files.into_iter().next() {
            return Ok(folder.id);
        }

        let metadata = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
            "parents": [parent_id],
        });
        let response = self
            .http
            .post(format!("{}/files", DRIVE_API_BASE))
            .bearer_auth(&self.access_token)
            .query(&[("fields", "id")])
            .json(&metadata)
            .send()
            .await?;
        let created: FileRef = Self::parse(response).await?;
        tracing::info!("Created Drive folder {} ({})", name, created.id);
        Ok(created.id)
    }

    async fn count_entries(&self, folder_id: &str) -> Result<usize, StorageError> {
        let query = children_query(folder_id);
        let mut total = 0;
        let mut page_token: Option<String> = None;
        loop {
            let page = self.list(&query, page_token.as_deref()).await?;
            total += page.files.len();
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(total)
    }

    async fn upload(
        &self,
        folder_id: &str,
        name: &str,
        mime_type: &str,
        data: Bytes,
    ) -> Result<String, StorageError> {
        let boundary = format!("channel-report-{}", uuid::Uuid::new_v4().simple());
        let metadata = serde_json::json!({
            "name": name,
            "parents": [folder_id],
        });
        let body = multipart_related(&boundary, &metadata, mime_type, &data);

        let response = self
            .http
            .post(format!("{}/files", DRIVE_UPLOAD_BASE))
            .bearer_auth(&self.access_token)
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .body(body)
            .send()
            .await?;
        let file: FileRef = Self::parse(response).await?;
        tracing::info!("Uploaded {} to folder {} as {}", name, folder_id, file.id);
        Ok(file.id)
    }

    fn file_link(&self, file_id: &str) -> String {
        format!("https://drive.google.com/file/d/{}/view", file_id)
    }
}

/// Hands out [`DriveClient`]s using credentials from a [`CredentialStore`].
pub struct GoogleDriveProvider {
    http: reqwest::Client,
    credentials: Arc<dyn CredentialStore>,
}

impl GoogleDriveProvider {
    pub fn new(http: reqwest::Client, credentials: Arc<dyn CredentialStore>) -> Self {
        Self { http, credentials }
    }
}

#[async_trait]
impl StorageProvider for GoogleDriveProvider {
    async fn for_user(&self, user: &str) -> Result<Arc<dyn StorageBackend>, StorageError> {
        let credentials = self
            .credentials
            .load(user)
            .await?
            .ok_or_else(|| StorageError::NotAuthenticated(user.to_string()))?;
        Ok(Arc::new(DriveClient::new(
            self.http.clone(),
            credentials.access_token,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthError, Credentials};

    #[test]
    fn queries_escape_quotes() {
        assert_eq!(
            folder_query("parent", "01-02-2024"),
            "name='01-02-2024' and 'parent' in parents and mimeType='application/vnd.google-apps.folder' and trashed=false"
        );
        assert_eq!(children_query("it's"), "'it\\'s' in parents and trashed=false");
    }

    #[test]
    fn multipart_body_has_both_parts() {
        let metadata = serde_json::json!({"name": "Task 1 Output.xlsx"});
        let body = multipart_related("b", &metadata, "application/octet-stream", b"DATA");
        let text = String::from_utf8(body).unwrap();

        assert!(text.starts_with("--b\r\nContent-Type: application/json"));
        assert!(text.contains("\"name\":\"Task 1 Output.xlsx\""));
        assert!(text.contains("Content-Type: application/octet-stream\r\n\r\nDATA\r\n--b--"));
    }

    #[test]
    fn file_links_point_at_drive_viewer() {
        let client = DriveClient::new(reqwest::Client::new(), "token".to_string());
        assert_eq!(client.file_link("abc"), "https://drive.google.com/file/d/abc/view");
    }

    struct EmptyStore;

    #[async_trait]
    impl CredentialStore for EmptyStore {
        async fn load(&self, _user: &str) -> Result<Option<Credentials>, AuthError> {
            Ok(None)
        }

        async fn save(&self, _user: &str, _credentials: &Credentials) -> Result<(), AuthError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn provider_requires_credentials() {
        let provider = GoogleDriveProvider::new(reqwest::Client::new(), Arc::new(EmptyStore));
        let err = provider.for_user("a@example.com").await.err().unwrap();
        assert!(matches!(err, StorageError::NotAuthenticated(_)));
    }
}
