//! Engagement metrics derived from raw channel statistics.

use serde::{Deserialize, Serialize};

/// Raw statistics for one channel, summed over its recent videos.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub channel_name: String,
    pub num_videos: u64,
    pub views: u64,
    pub likes: u64,
    pub comments: u64,
    /// `(likes + comments) / views` as a percentage
    pub engagement_score: f64,
    /// View count of each sampled video
    #[serde(default)]
    pub video_views: Vec<u64>,
}

/// One spreadsheet row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub channel_name: String,
    pub num_videos: u64,
    pub total_views: u64,
    pub avg_views: f64,
    pub avg_likes: f64,
    pub avg_comments: f64,
    /// Comments per thousand views
    pub comment_to_view_ratio: f64,
    /// Likes per thousand views
    pub like_to_view_ratio: f64,
    pub engagement_score: f64,
    pub standard_deviation: f64,
    /// Filled in by hand after export
    pub price: f64,
}

impl MetricsRecord {
    /// Column headers, in the order values are written.
    pub const COLUMNS: [&'static str; 11] = [
        "Channel Name",
        "Number of Videos",
        "Total Views",
        "Avg Views",
        "Avg Likes",
        "Avg Comments",
        "Comment to View Ratio",
        "Like to View Ratio",
        "Engagement Score",
        "Standard Deviation",
        "Price",
    ];

    /// Zero-based column of `avg_views`.
    pub const AVG_VIEWS_COLUMN: usize = 3;

    /// Zero-based column of `price`.
    pub const PRICE_COLUMN: usize = 10;

    /// Cost per thousand average views, `None` while no price is set.
    pub fn cpm(&self) -> Option<f64> {
        if self.price == 0.0 {
            return None;
        }
        Some(self.price / (self.avg_views / 1000.0))
    }
}

/// Turn raw statistics into a report row. Never fails: zero counts are floored.
pub fn compute(stats: &ChannelStats) -> MetricsRecord {
    let divisor = stats.num_videos.max(1) as f64;
    let views = stats.views.max(1) as f64;
    let per_thousand = views / 1000.0;

    MetricsRecord {
        channel_name: stats.channel_name.clone(),
        num_videos: stats.num_videos,
        total_views: stats.views,
        avg_views: stats.views as f64 / divisor,
        avg_likes: stats.likes as f64 / divisor,
        avg_comments: stats.comments as f64 / divisor,
        comment_to_view_ratio: stats.comments as f64 / per_thousand,
        like_to_view_ratio: stats.likes as f64 / per_thousand,
        engagement_score: stats.engagement_score,
        standard_deviation: sample_std_dev(&stats.video_views),
        price: 0.0,
    }
}

/// Sample standard deviation (n - 1 denominator), 0 below two samples.
pub fn sample_std_dev(samples: &[u64]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().map(|&v| v as f64).sum::<f64>() / n;
    let variance = samples
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / (n - 1.0);
    variance.sqrt()
}

/// Engagement percentage as reported by the statistics fetcher.
pub fn engagement_score(views: u64, likes: u64, comments: u64) -> f64 {
    if views == 0 {
        return 0.0;
    }
    (likes + comments) as f64 / views as f64 * 100.0
}
