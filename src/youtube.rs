//! YouTube Data API v3 client.
//!
//! Resolves channel URLs to channel ids and samples the most recent uploads of a
//! channel to build [`ChannelStats`].

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use crate::metrics::{self, ChannelStats};

const YOUTUBE_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// Number of most recent videos sampled per channel.
pub const RECENT_VIDEO_SAMPLE: u32 = 20;

#[derive(Debug, Error)]
pub enum YouTubeError {
    #[error("Invalid YouTube URL: {0}")]
    InvalidUrl(String),

    #[error("Channel not found for {kind}: {value}")]
    ChannelNotFound { kind: &'static str, value: String },

    #[error("YouTube API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("YouTube API returned HTTP {status}: {message}")]
    Api { status: u16, message: String },
}

/// A channel reference extracted from a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRef {
    /// `/@handle` (and legacy `/c/name`)
    Handle(String),
    /// `/channel/UC...`
    Id(String),
    /// `/user/name`
    Username(String),
}

/// Parse a channel URL without touching the network.
pub fn parse_channel_url(input: &str) -> Result<ChannelRef, YouTubeError> {
    let trimmed = input.trim();
    let parsed = url::Url::parse(trimmed)
        .or_else(|_| url::Url::parse(&format!("https://{}", trimmed)))
        .map_err(|_| YouTubeError::InvalidUrl(trimmed.to_string()))?;

    let host = parsed.host_str().unwrap_or_default().to_lowercase();
    if host != "youtube.com" && !host.ends_with(".youtube.com") {
        return Err(YouTubeError::InvalidUrl(trimmed.to_string()));
    }

    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    let invalid = || YouTubeError::InvalidUrl(trimmed.to_string());
    match segments.as_slice() {
        [first, ..] if first.starts_with('@') && first.len() > 1 => {
            Ok(ChannelRef::Handle(first[1..].to_string()))
        }
        ["channel", id, ..] => Ok(ChannelRef::Id(id.to_string())),
        ["user", name, ..] => Ok(ChannelRef::Username(name.to_string())),
        ["c", name, ..] => Ok(ChannelRef::Handle(name.to_string())),
        _ => Err(invalid()),
    }
}

/// Resolves a channel URL to a channel id.
#[async_trait]
pub trait ChannelResolver: Send + Sync {
    async fn resolve(&self, url: &str) -> Result<String, YouTubeError>;
}

/// Fetches recent statistics for a channel id.
#[async_trait]
pub trait StatsFetcher: Send + Sync {
    async fn fetch(&self, channel_id: &str) -> Result<ChannelStats, YouTubeError>;
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ChannelIdItem {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ChannelSnippetItem {
    snippet: ChannelSnippet,
}

#[derive(Debug, Deserialize)]
struct ChannelSnippet {
    title: String,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    #[serde(default)]
    statistics: VideoStatistics,
}

/// Counts arrive as decimal strings and are omitted when hidden.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoStatistics {
    view_count: Option<String>,
    like_count: Option<String>,
    comment_count: Option<String>,
}

fn count(value: &Option<String>) -> u64 {
    value
        .as_deref()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// Sum per-video statistics into channel statistics.
fn aggregate(channel_name: String, video_count: usize, videos: &[VideoItem]) -> ChannelStats {
    let mut stats = ChannelStats {
        channel_name,
        num_videos: video_count as u64,
        ..Default::default()
    };
    for video in videos {
        let views = count(&video.statistics.view_count);
        stats.views += views;
        stats.likes += count(&video.statistics.like_count);
        stats.comments += count(&video.statistics.comment_count);
        stats.video_views.push(views);
    }
    stats.engagement_score = metrics::engagement_score(stats.views, stats.likes, stats.comments);
    stats
}

/// YouTube Data API client authenticated with an API key.
#[derive(Clone)]
pub struct YouTubeClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl YouTubeClient {
    pub fn new(http: reqwest::Client, api_key: String) -> Self {
        Self {
            http,
            api_key,
            base_url: YOUTUBE_API_BASE.to_string(),
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        resource: &str,
        params: &[(&str, &str)],
    ) -> Result<T, YouTubeError> {
        let response = self
            .http
            .get(format!("{}/{}", self.base_url, resource))
            .query(params)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(YouTubeError::Api { status, message });
        }

        Ok(response.json().await?)
    }

    async fn lookup_channel_id(
        &self,
        filter: &str,
        kind: &'static str,
        value: &str,
    ) -> Result<String, YouTubeError> {
        let response: ListResponse<ChannelIdItem> = self
            .get("channels", &[("part", "id"), (filter, value)])
            .await?;
        response
            .items
            .into_iter()
            .next()
            .map(|item| item.id)
            .ok_or_else(|| YouTubeError::ChannelNotFound {
                kind,
                value: value.to_string(),
            })
    }
}

#[async_trait]
impl ChannelResolver for YouTubeClient {
    async fn resolve(&self, url: &str) -> Result<String, YouTubeError> {
        match parse_channel_url(url)? {
            ChannelRef::Id(id) => Ok(id),
            ChannelRef::Handle(handle) => {
                self.lookup_channel_id("forHandle", "handle", &handle).await
            }
            ChannelRef::Username(name) => {
                self.lookup_channel_id("forUsername", "username", &name).await
            }
        }
    }
}

#[async_trait]
impl StatsFetcher for YouTubeClient {
    async fn fetch(&self, channel_id: &str) -> Result<ChannelStats, YouTubeError> {
        let info: ListResponse<ChannelSnippetItem> = self
            .get("channels", &[("part", "snippet"), ("id", channel_id)])
            .await?;
        let channel_name = info
            .items
            .into_iter()
            .next()
            .map(|item| item.snippet.title)
            .unwrap_or_else(|| "Unknown".to_string());

        let max_results = RECENT_VIDEO_SAMPLE.to_string();
        let search: ListResponse<SearchItem> = self
            .get(
                "search",
                &[
                    ("part", "snippet"),
                    ("type", "video"),
                    ("channelId", channel_id),
                    ("maxResults", max_results.as_str()),
                    ("order", "date"),
                ],
            )
            .await?;
        let video_ids: Vec<String> = search
            .items
            .into_iter()
            .filter_map(|item| item.id.video_id)
            .collect();

        if video_ids.is_empty() {
            tracing::debug!(channel_id, "Channel has no recent videos");
            return Ok(aggregate(channel_name, 0, &[]));
        }

        let ids = video_ids.join(",");
        let videos: ListResponse<VideoItem> = self
            .get("videos", &[("part", "statistics"), ("id", ids.as_str())])
            .await?;

        tracing::debug!(
            channel_id,
            videos = video_ids.len(),
            "Fetched recent video statistics"
        );
        Ok(aggregate(channel_name, video_ids.len(), &videos.items))
    }
}
