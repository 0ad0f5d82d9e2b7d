//! Row types shared by the CSV snapshots and the SQLite tables.
//!
//! Field names double as column names in both places, so renaming a field is
//! a schema change.

use serde::{Deserialize, Serialize};

use crate::engagement::engagement_rate;
use crate::table::Tabular;

/// One row of the `channel` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRow {
    pub channel_id: String,
    pub channel_handle: String,
    pub channel_title: String,
    pub channel_subscribers: Option<i64>,
    pub channel_description: String,
}

/// One row of the `video` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRow {
    pub video_id: String,
    pub channel_id: String,
    pub video_title: String,
    pub video_views: Option<i64>,
    pub video_likes: Option<i64>,
    pub video_comments: Option<i64>,
    pub video_engagement: Option<f64>,
    pub video_published_at: Option<String>,
    pub video_description: Option<String>,
}

/// One row of the `transcript` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptRow {
    pub video_id: String,
    pub channel_id: String,
    pub video_transcript: String,
}

/// Per-video metadata as returned by the fetcher.
///
/// Every field is optional: a video the platform no longer knows about comes
/// back as [`VideoStats::missing`] instead of an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoStats {
    pub title: Option<String>,
    pub description: Option<String>,
    pub published_at: Option<String>,
    pub views: Option<i64>,
    pub likes: Option<i64>,
    pub comments: Option<i64>,
}

impl VideoStats {
    pub fn missing() -> Self {
        Self::default()
    }

    pub fn is_missing(&self) -> bool {
        self == &Self::missing()
    }

    /// Builds the table row, deriving engagement from the raw counters.
    /// Returns `None` for a missing record since `video_title` is required.
    pub fn into_row(self, video_id: &str, channel_id: &str) -> Option<VideoRow> {
        let title = self.title?;
        Some(VideoRow {
            video_id: video_id.to_owned(),
            channel_id: channel_id.to_owned(),
            video_title: title,
            video_engagement: engagement_rate(self.views, self.likes, self.comments),
            video_views: self.views,
            video_likes: self.likes,
            video_comments: self.comments,
            video_published_at: self.published_at,
            video_description: self.description,
        })
    }
}

impl Tabular for ChannelRow {
    const TAG: &'static str = "channel";
    const COLUMNS: &'static [&'static str] = &[
        "channel_id",
        "channel_handle",
        "channel_title",
        "channel_subscribers",
        "channel_description",
    ];
}

impl Tabular for VideoRow {
    const TAG: &'static str = "videos";
    const COLUMNS: &'static [&'static str] = &[
        "video_id",
        "channel_id",
        "video_title",
        "video_views",
        "video_likes",
        "video_comments",
        "video_engagement",
        "video_published_at",
        "video_description",
    ];
}

impl Tabular for TranscriptRow {
    const TAG: &'static str = "transcripts";
    const COLUMNS: &'static [&'static str] = &["video_id", "channel_id", "video_transcript"];
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats() -> VideoStats {
        VideoStats {
            title: Some("First Video".into()),
            description: Some("An amazing video".into()),
            published_at: Some("2023-11-01T00:00:00Z".into()),
            views: Some(100),
            likes: Some(10),
            comments: Some(5),
        }
    }

    #[test]
    fn into_row_derives_engagement() {
        let row = stats().into_row("v1", "123").expect("row built");
        assert_eq!(row.video_id, "v1");
        assert_eq!(row.channel_id, "123");
        assert_eq!(row.video_engagement, Some(15.0));
    }

    #[test]
    fn missing_stats_do_not_build_a_row() {
        let missing = VideoStats::missing();
        assert!(missing.is_missing());
        assert!(missing.into_row("ghost", "123").is_none());
    }

    #[test]
    fn zero_views_leave_engagement_empty() {
        let mut zero = stats();
        zero.views = Some(0);
        let row = zero.into_row("v2", "123").expect("row built");
        assert_eq!(row.video_engagement, None);
    }

    #[test]
    fn columns_match_serialized_field_order() {
        let row = stats().into_row("v1", "123").unwrap();
        let value = serde_json::to_value(&row).unwrap();
        let keys: Vec<&str> = value
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, VideoRow::COLUMNS);
    }
}
