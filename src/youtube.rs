//! YouTube Data API v3 access: channel lookup by handle, per-video statistics
//! and the uploads playlist listing.
//!
//! Responses stay untyped `serde_json::Value` documents; the extraction
//! helpers below apply the defaults used when a field is absent.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::PlatformError;
use crate::models::{ChannelRow, VideoStats};

/// Largest page the playlist endpoint hands out.
pub const MAX_PAGE_SIZE: &str = "50";

pub const UNKNOWN_CHANNEL_TITLE: &str = "Unknown Channel Title";
pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const NO_DESCRIPTION: &str = "No Description";
pub const UNKNOWN_PUBLISH_DATE: &str = "Unknown Publish Date";

/// Request/response access to the Data API. `resource` is the path segment
/// after the API base (`channels`, `videos`, `playlistItems`).
pub trait DataApi {
    fn get(&self, resource: &str, query: &[(&str, &str)]) -> Result<Value, PlatformError>;
}

/// Blocking HTTP implementation of [`DataApi`].
pub struct UreqApi {
    agent: ureq::Agent,
    api_key: String,
    base_url: String,
}

impl UreqApi {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl DataApi for UreqApi {
    fn get(&self, resource: &str, query: &[(&str, &str)]) -> Result<Value, PlatformError> {
        let url = format!("{}/{resource}", self.base_url);
        debug!(resource, ?query, "data api request");
        let mut request = self.agent.get(&url);
        for (name, value) in query {
            request = request.query(name, value);
        }
        let response = request.query("key", &self.api_key).call()?;
        response
            .into_json()
            .map_err(|err| PlatformError::Malformed(format!("{resource} response: {err}")))
    }
}

pub struct MetadataFetcher<A> {
    api: A,
}

impl<A: DataApi> MetadataFetcher<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Looks the channel up by handle. `Ok(None)` means the platform knows no
    /// channel with that handle.
    pub fn fetch_channel(&self, handle: &str) -> Result<Option<ChannelRow>, PlatformError> {
        let response = self.api.get(
            "channels",
            &[("part", "snippet,statistics"), ("forHandle", handle)],
        )?;
        let Some(item) = first_item(&response) else {
            warn!(handle, "no channel found for handle");
            return Ok(None);
        };
        let channel_id = item
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| PlatformError::Malformed(format!("channel item for {handle} has no id")))?;

        let snippet = &item["snippet"];
        Ok(Some(ChannelRow {
            channel_id: channel_id.to_owned(),
            channel_handle: handle.to_owned(),
            channel_title: text_or(snippet, "title", UNKNOWN_CHANNEL_TITLE),
            channel_subscribers: count(&item["statistics"], "subscriberCount"),
            channel_description: text_or(snippet, "description", ""),
        }))
    }

    /// Typed lookup of one video; `Ok(None)` when the id is unknown.
    pub fn try_fetch_video(&self, video_id: &str) -> Result<Option<VideoStats>, PlatformError> {
        let response = self
            .api
            .get("videos", &[("part", "snippet,statistics"), ("id", video_id)])?;
        let Some(item) = first_item(&response) else {
            return Ok(None);
        };
        let snippet = &item["snippet"];
        let statistics = &item["statistics"];
        Ok(Some(VideoStats {
            title: Some(text_or(snippet, "title", UNKNOWN_TITLE)),
            description: Some(text_or(snippet, "description", NO_DESCRIPTION)),
            published_at: Some(text_or(snippet, "publishedAt", UNKNOWN_PUBLISH_DATE)),
            views: Some(count(statistics, "viewCount").unwrap_or(0)),
            likes: Some(count(statistics, "likeCount").unwrap_or(0)),
            comments: Some(count(statistics, "commentCount").unwrap_or(0)),
        }))
    }

    /// Like [`Self::try_fetch_video`], but an unknown video or a failed call is
    /// logged and comes back as [`VideoStats::missing`].
    pub fn fetch_video(&self, video_id: &str) -> VideoStats {
        match self.try_fetch_video(video_id) {
            Ok(Some(stats)) => stats,
            Ok(None) => {
                warn!(video_id, "no video found; recording missing metadata");
                VideoStats::missing()
            }
            Err(err) => {
                error!(video_id, "fetching video metadata failed: {err}");
                VideoStats::missing()
            }
        }
    }

    /// Resolves the channel's uploads playlist and returns a lazy listing of
    /// its video ids.
    pub fn uploads(&self, channel_id: &str) -> Result<Uploads<'_, A>, PlatformError> {
        let response = self
            .api
            .get("channels", &[("part", "contentDetails"), ("id", channel_id)])?;
        let playlist_id = first_item(&response)
            .and_then(|item| item.pointer("/contentDetails/relatedPlaylists/uploads"))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| PlatformError::not_found("uploads playlist", channel_id))?;
        Ok(Uploads::new(&self.api, playlist_id.to_owned()))
    }

    pub fn collect_uploads(&self, channel_id: &str) -> Result<Vec<String>, PlatformError> {
        self.uploads(channel_id)?.collect()
    }
}

/// Video ids of an uploads playlist in listing order, one page fetched at a
/// time. Ids already yielded are skipped. A page error is yielded once and
/// ends the listing.
pub struct Uploads<'a, A> {
    api: &'a A,
    playlist_id: String,
    buffer: VecDeque<String>,
    next_token: Option<String>,
    seen_ids: HashSet<String>,
    seen_tokens: HashSet<String>,
    pages: usize,
    finished: bool,
}

impl<'a, A: DataApi> Uploads<'a, A> {
    fn new(api: &'a A, playlist_id: String) -> Self {
        Self {
            api,
            playlist_id,
            buffer: VecDeque::new(),
            next_token: None,
            seen_ids: HashSet::new(),
            seen_tokens: HashSet::new(),
            pages: 0,
            finished: false,
        }
    }

    pub fn playlist_id(&self) -> &str {
        &self.playlist_id
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    fn fetch_page(&mut self) -> Result<(), PlatformError> {
        let mut query = vec![
            ("part", "contentDetails"),
            ("playlistId", self.playlist_id.as_str()),
            ("maxResults", MAX_PAGE_SIZE),
        ];
        if let Some(token) = self.next_token.as_deref() {
            query.push(("pageToken", token));
        }
        let page = self.api.get("playlistItems", &query)?;
        self.pages += 1;

        let items = page.get("items").and_then(Value::as_array);
        for item in items.into_iter().flatten() {
            match item.pointer("/contentDetails/videoId").and_then(Value::as_str) {
                Some(id) if !id.is_empty() => {
                    if self.seen_ids.insert(id.to_owned()) {
                        self.buffer.push_back(id.to_owned());
                    }
                }
                _ => warn!(playlist = %self.playlist_id, "playlist item without a video id"),
            }
        }

        match page
            .get("nextPageToken")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
        {
            Some(token) => {
                if !self.seen_tokens.insert(token.to_owned()) {
                    return Err(PlatformError::Malformed(format!(
                        "page token {token} repeated while listing {}",
                        self.playlist_id
                    )));
                }
                self.next_token = Some(token.to_owned());
            }
            None => self.finished = true,
        }
        Ok(())
    }
}

impl<A: DataApi> Iterator for Uploads<'_, A> {
    type Item = Result<String, PlatformError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(id) = self.buffer.pop_front() {
                return Some(Ok(id));
            }
            if self.finished {
                return None;
            }
            if let Err(err) = self.fetch_page() {
                self.finished = true;
                self.buffer.clear();
                return Some(Err(err));
            }
        }
    }
}

fn first_item(response: &Value) -> Option<&Value> {
    response.get("items")?.as_array()?.first()
}

fn text_or(object: &Value, field: &str, default: &str) -> String {
    object
        .get(field)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_owned()
}

/// Statistics arrive as decimal strings; plain numbers are accepted too.
fn count(statistics: &Value, field: &str) -> Option<i64> {
    match statistics.get(field)? {
        Value::String(text) => text.trim().parse().ok(),
        Value::Number(number) => number.as_i64(),
        _ => None,
    }
}


#[cfg(test)]
mod tests {
    use super::fake::FakeApi;
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn channel_response() -> Value {
        json!({
            "items": [{
                "id": "UC123",
                "snippet": { "title": "Example", "description": "About us" },
                "statistics": { "subscriberCount": "1500" },
                "contentDetails": { "relatedPlaylists": { "uploads": "UU123" } }
            }]
        })
    }

    fn playlist_page(ids: &[&str], next: Option<&str>) -> Value {
        let items: Vec<Value> = ids
            .iter()
            .map(|id| json!({ "contentDetails": { "videoId": id } }))
            .collect();
        match next {
            Some(token) => json!({ "items": items, "nextPageToken": token }),
            None => json!({ "items": items }),
        }
    }

    fn paged_api(
        pages: HashMap<Option<&'static str>, Value>,
    ) -> FakeApi<impl Fn(&str, &HashMap<String, String>) -> Result<Value, PlatformError>> {
        FakeApi::new(move |resource, params| match resource {
            "channels" => Ok(channel_response()),
            "playlistItems" => {
                let token = params.get("pageToken").map(String::as_str);
                pages
                    .iter()
                    .find(|(key, _)| **key == token)
                    .map(|(_, page)| page.clone())
                    .ok_or_else(|| PlatformError::Malformed(format!("unexpected token {token:?}")))
            }
            other => Err(PlatformError::Malformed(format!("unexpected resource {other}"))),
        })
    }

    #[test]
    fn fetch_channel_extracts_fields() -> Result<(), PlatformError> {
        let api = FakeApi::new(|_, _| Ok(channel_response()));
        let fetcher = MetadataFetcher::new(api);
        let channel = fetcher.fetch_channel("@example")?.expect("channel found");
        assert_eq!(channel.channel_id, "UC123");
        assert_eq!(channel.channel_handle, "@example");
        assert_eq!(channel.channel_title, "Example");
        assert_eq!(channel.channel_subscribers, Some(1500));
        assert_eq!(channel.channel_description, "About us");

        let calls = fetcher.api().calls();
        assert_eq!(calls[0].0, "channels");
        assert_eq!(calls[0].1["forHandle"], "@example");
        assert_eq!(calls[0].1["part"], "snippet,statistics");
        Ok(())
    }

    #[test]
    fn fetch_channel_applies_defaults() -> Result<(), PlatformError> {
        let api = FakeApi::new(|_, _| {
            Ok(json!({ "items": [{ "id": "UC9", "statistics": { "hiddenSubscriberCount": true } }] }))
        });
        let channel = MetadataFetcher::new(api)
            .fetch_channel("@quiet")?
            .expect("channel found");
        assert_eq!(channel.channel_title, UNKNOWN_CHANNEL_TITLE);
        assert_eq!(channel.channel_description, "");
        assert_eq!(channel.channel_subscribers, None);
        Ok(())
    }

    #[test]
    fn unknown_handle_is_none() -> Result<(), PlatformError> {
        let api = FakeApi::new(|_, _| Ok(json!({ "items": [] })));
        assert!(MetadataFetcher::new(api).fetch_channel("@nobody")?.is_none());
        let api = FakeApi::new(|_, _| Ok(json!({ "pageInfo": { "totalResults": 0 } })));
        assert!(MetadataFetcher::new(api).fetch_channel("@nobody")?.is_none());
        Ok(())
    }

    #[test]
    fn channel_api_errors_propagate() {
        let api = FakeApi::new(|_, _| {
            Err(PlatformError::Api {
                status: 403,
                message: "quotaExceeded".into(),
            })
        });
        let err = MetadataFetcher::new(api).fetch_channel("@example").unwrap_err();
        assert!(matches!(err, PlatformError::Api { status: 403, .. }));
    }

    #[test]
    fn fetch_video_parses_string_and_numeric_counts() {
        let api = FakeApi::new(|_, _| {
            Ok(json!({
                "items": [{
                    "snippet": {
                        "title": "First Video",
                        "description": "An amazing video",
                        "publishedAt": "2023-11-01T00:00:00Z"
                    },
                    "statistics": { "viewCount": "100", "likeCount": 10, "commentCount": "5" }
                }]
            }))
        });
        let stats = MetadataFetcher::new(api).fetch_video("v1");
        assert_eq!(stats.title.as_deref(), Some("First Video"));
        assert_eq!(stats.published_at.as_deref(), Some("2023-11-01T00:00:00Z"));
        assert_eq!(stats.views, Some(100));
        assert_eq!(stats.likes, Some(10));
        assert_eq!(stats.comments, Some(5));
    }

    #[test]
    fn fetch_video_defaults_absent_fields() {
        let api = FakeApi::new(|_, _| Ok(json!({ "items": [{ "statistics": { "viewCount": "7" } }] })));
        let stats = MetadataFetcher::new(api).fetch_video("v1");
        assert_eq!(stats.title.as_deref(), Some(UNKNOWN_TITLE));
        assert_eq!(stats.description.as_deref(), Some(NO_DESCRIPTION));
        assert_eq!(stats.published_at.as_deref(), Some(UNKNOWN_PUBLISH_DATE));
        assert_eq!((stats.views, stats.likes, stats.comments), (Some(7), Some(0), Some(0)));
    }

    #[test]
    fn missing_video_yields_empty_stats() {
        let api = FakeApi::new(|_, _| Ok(json!({ "items": [] })));
        assert!(MetadataFetcher::new(api).fetch_video("ghost").is_missing());
    }

    #[test]
    fn failing_video_call_yields_empty_stats() {
        let api = FakeApi::new(|_, _| Err(PlatformError::Transport("connection reset".into())));
        let fetcher = MetadataFetcher::new(api);
        assert!(fetcher.fetch_video("v1").is_missing());
        assert!(fetcher.try_fetch_video("v1").is_err());
    }

    #[test]
    fn uploads_walks_every_page_without_duplicates() -> Result<(), PlatformError> {
        let pages = HashMap::from([
            (None, playlist_page(&["a", "b"], Some("p2"))),
            (Some("p2"), playlist_page(&["c", "a"], Some("p3"))),
            (Some("p3"), playlist_page(&["d"], None)),
        ]);
        let fetcher = MetadataFetcher::new(paged_api(pages));
        let ids = fetcher.collect_uploads("UC123")?;
        assert_eq!(ids, vec!["a", "b", "c", "d"]);

        let api = fetcher.api();
        assert_eq!(api.calls_to("playlistItems"), 3);
        let first_page = &api.calls()[1].1;
        assert_eq!(first_page["playlistId"], "UU123");
        assert_eq!(first_page["maxResults"], MAX_PAGE_SIZE);
        assert!(!first_page.contains_key("pageToken"));
        Ok(())
    }

    #[test]
    fn uploads_is_lazy() -> Result<(), PlatformError> {
        let pages = HashMap::from([
            (None, playlist_page(&["a", "b"], Some("p2"))),
            (Some("p2"), playlist_page(&["c"], None)),
        ]);
        let fetcher = MetadataFetcher::new(paged_api(pages));
        let mut uploads = fetcher.uploads("UC123")?;
        assert_eq!(uploads.playlist_id(), "UU123");
        assert_eq!(uploads.pages_fetched(), 0);
        assert_eq!(uploads.next().transpose()?, Some("a".to_string()));
        assert_eq!(uploads.pages_fetched(), 1);
        assert_eq!(uploads.next().transpose()?, Some("b".to_string()));
        assert_eq!(uploads.pages_fetched(), 1);
        assert_eq!(uploads.next().transpose()?, Some("c".to_string()));
        assert_eq!(uploads.next().transpose()?, None);
        assert_eq!(uploads.pages_fetched(), 2);
        Ok(())
    }

    #[test]
    fn repeated_page_token_is_an_error() {
        let pages = HashMap::from([
            (None, playlist_page(&["a"], Some("loop"))),
            (Some("loop"), playlist_page(&["b"], Some("loop"))),
        ]);
        let fetcher = MetadataFetcher::new(paged_api(pages));
        let err = fetcher.collect_uploads("UC123").unwrap_err();
        assert!(matches!(err, PlatformError::Malformed(_)));
        assert_eq!(fetcher.api().calls_to("playlistItems"), 2);
    }

    #[test]
    fn page_error_ends_listing() {
        let api = FakeApi::new(|resource, _| match resource {
            "channels" => Ok(channel_response()),
            _ => Err(PlatformError::Api {
                status: 500,
                message: "backend".into(),
            }),
        });
        let fetcher = MetadataFetcher::new(api);
        let mut uploads = fetcher.uploads("UC123").unwrap();
        assert!(matches!(uploads.next(), Some(Err(PlatformError::Api { status: 500, .. }))));
        assert!(uploads.next().is_none());
    }

    #[test]
    fn items_without_video_id_are_skipped() -> Result<(), PlatformError> {
        let page = json!({
            "items": [
                { "contentDetails": { "videoId": "a" } },
                { "contentDetails": {} },
                { "contentDetails": { "videoId": "b" } }
            ]
        });
        let fetcher = MetadataFetcher::new(paged_api(HashMap::from([(None, page)])));
        assert_eq!(fetcher.collect_uploads("UC123")?, vec!["a", "b"]);
        Ok(())
    }

    #[test]
    fn channel_without_uploads_playlist_is_not_found() {
        let api = FakeApi::new(|_, _| Ok(json!({ "items": [{ "id": "UC1" }] })));
        let err = MetadataFetcher::new(api).collect_uploads("UC1").unwrap_err();
        assert!(err.is_not_found());
    }
}
