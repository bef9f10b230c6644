//! In-process fakes for exercising handlers without Google.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::routes::AppState;
use crate::auth::{session, AuthError, AuthorizationFlow, AuthorizationRequest, CredentialStore, Credentials};
use crate::config::Config;
use crate::export::SpreadsheetExporter;
use crate::jobs::{AnalysisRunner, JobStore, TaskNumberAllocator};
use crate::metrics::ChannelStats;
use crate::storage::testing::MemoryStorage;
use crate::youtube::{ChannelResolver, StatsFetcher, YouTubeError};

pub const USER: &str = "a@example.com";
pub const PARENT: &str = "parent-folder";

/// `https://www.youtube.com/@name` resolves to `UC-name`; every channel has three videos.
pub struct FakeChannels;

#[async_trait]
impl ChannelResolver for FakeChannels {
    async fn resolve(&self, url: &str) -> Result<String, YouTubeError> {
        url.strip_prefix("https://www.youtube.com/@")
            .map(|handle| format!("UC-{}", handle))
            .ok_or_else(|| YouTubeError::ChannelNotFound {
                kind: "url",
                value: url.to_string(),
            })
    }
}

#[async_trait]
impl StatsFetcher for FakeChannels {
    async fn fetch(&self, channel_id: &str) -> Result<ChannelStats, YouTubeError> {
        Ok(ChannelStats {
            channel_name: channel_id.trim_start_matches("UC-").to_string(),
            num_videos: 3,
            views: 6000,
            likes: 60,
            comments: 12,
            engagement_score: 1.2,
            video_views: vec![1000, 2000, 3000],
        })
    }
}

/// Accepts the code `good-code` for [`USER`]; anything else is rejected.
pub struct FakeFlow;

#[async_trait]
impl AuthorizationFlow for FakeFlow {
    fn begin(&self) -> Result<AuthorizationRequest, AuthError> {
        let state = uuid::Uuid::new_v4().simple().to_string();
        Ok(AuthorizationRequest {
            url: format!("https://accounts.example.test/auth?state={}", state),
            state,
            verifier: "verifier".to_string(),
        })
    }

    async fn complete(&self, code: &str, verifier: &str) -> Result<(Credentials, String), AuthError> {
        if code != "good-code" || verifier != "verifier" {
            return Err(AuthError::TokenEndpoint {
                status: 400,
                message: "invalid_grant".to_string(),
            });
        }
        Ok((credentials(USER), USER.to_string()))
    }
}

pub fn credentials(email: &str) -> Credentials {
    Credentials {
        access_token: "access".to_string(),
        refresh_token: Some("refresh".to_string()),
        expires_at: chrono::Utc::now().timestamp() + 3600,
        scopes: vec!["https://www.googleapis.com/auth/drive.file".to_string()],
        email: email.to_string(),
    }
}

#[derive(Default)]
pub struct MemoryCredentials {
    entries: RwLock<HashMap<String, Credentials>>,
}

impl MemoryCredentials {
    pub async fn contains(&self, user: &str) -> bool {
        self.entries.read().await.contains_key(user)
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentials {
    async fn load(&self, user: &str) -> Result<Option<Credentials>, AuthError> {
        Ok(self.entries.read().await.get(user).cloned())
    }

    async fn save(&self, user: &str, credentials: &Credentials) -> Result<(), AuthError> {
        self.entries
            .write()
            .await
            .insert(user.to_string(), credentials.clone());
        Ok(())
    }
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub storage: Arc<MemoryStorage>,
    pub credentials: Arc<MemoryCredentials>,
}

impl TestApp {
    pub fn session_for(&self, user: &str) -> String {
        let (token, _) = session::issue(&self.state.config.session_secret, user, 1).unwrap();
        token
    }
}

/// App state whose storage and credential store know `users`.
pub fn app_state(users: &[&str]) -> TestApp {
    let config = Config::new(
        "test-key".to_string(),
        PARENT.to_string(),
        PathBuf::from("unused-tokens"),
    );
    let storage = MemoryStorage::with_users(users);
    let credentials = Arc::new(MemoryCredentials::default());
    {
        let mut entries = credentials
            .entries
            .try_write()
            .expect("fresh credential store is unlocked");
        for user in users {
            entries.insert(user.to_string(), self::credentials(user));
        }
    }

    let jobs = Arc::new(JobStore::new());
    let exporter = Arc::new(SpreadsheetExporter::new(
        Arc::new(storage.clone()),
        PARENT.to_string(),
    ));
    let runner = Arc::new(AnalysisRunner::new(
        Arc::clone(&jobs),
        Arc::new(FakeChannels),
        Arc::new(FakeChannels),
        exporter,
    ));

    let state = Arc::new(AppState {
        config,
        jobs,
        allocator: TaskNumberAllocator::new(Arc::new(storage.clone()), PARENT.to_string()),
        runner,
        oauth: Arc::new(FakeFlow),
        credentials: credentials.clone(),
        pending_oauth: RwLock::new(HashMap::new()),
    });

    TestApp {
        state,
        storage,
        credentials,
    }
}
