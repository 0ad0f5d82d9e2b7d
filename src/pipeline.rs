//! Channel → videos → transcripts ingestion.
//!
//! One channel at a time: resolve the handle, drain the uploads listing, make
//! sure every video has a cached transcript when one exists, fetch per-video
//! statistics, snapshot the three tables as CSV and upsert them.

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::layout::ChannelPaths;
use crate::models::TranscriptRow;
use crate::store::Store;
use crate::table::materialize;
use crate::transcripts::{TranscriptCache, TranscriptSource};
use crate::youtube::{DataApi, MetadataFetcher};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelSummary {
    pub handle: String,
    pub channel_id: String,
    pub videos_listed: usize,
    pub videos_stored: usize,
    pub transcripts_fetched: usize,
    pub transcripts_cached: usize,
    pub transcripts_missing: usize,
    pub transcripts_stored: usize,
    /// Listed videos whose metadata could not be fetched.
    pub skipped_videos: Vec<String>,
    /// Cached transcripts for videos no longer in the uploads listing.
    pub stale_transcripts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOutcome {
    Completed(ChannelSummary),
    NotFound(String),
}

pub struct Pipeline<A, S> {
    fetcher: MetadataFetcher<A>,
    source: S,
    output_root: PathBuf,
}

impl<A: DataApi, S: TranscriptSource> Pipeline<A, S> {
    pub fn new(fetcher: MetadataFetcher<A>, source: S, output_root: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            source,
            output_root: output_root.into(),
        }
    }

    pub fn fetcher(&self) -> &MetadataFetcher<A> {
        &self.fetcher
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Processes `handles` in order. The first failing channel is logged with
    /// its full context and ends the run.
    pub async fn run(&self, handles: &[String]) -> Result<Vec<ChannelOutcome>> {
        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            match self.run_channel(handle).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    error!(handle = %handle, "processing channel failed: {err:#}");
                    return Err(err);
                }
            }
        }
        Ok(outcomes)
    }

    pub async fn run_channel(&self, handle: &str) -> Result<ChannelOutcome> {
        info!(handle, "processing channel");
        let paths = ChannelPaths::for_handle(&self.output_root, handle);
        paths.prepare()?;

        let Some(channel) = self
            .fetcher
            .fetch_channel(handle)
            .with_context(|| format!("fetching channel info for {handle}"))?
        else {
            return Ok(ChannelOutcome::NotFound(handle.to_owned()));
        };
        let channel_id = channel.channel_id.clone();
        let channel_table = materialize(std::slice::from_ref(&channel), handle, &paths.tables)?;
        info!(handle, channel_id = %channel_id, "stored channel info");

        let video_ids = self
            .fetcher
            .collect_uploads(&channel_id)
            .with_context(|| format!("listing uploads for {handle}"))?;
        info!(handle, videos = video_ids.len(), "downloading transcripts");

        let mut summary = ChannelSummary {
            handle: handle.to_owned(),
            channel_id: channel_id.clone(),
            videos_listed: video_ids.len(),
            ..ChannelSummary::default()
        };
        let cache = TranscriptCache::new(&paths.transcripts, &self.source);
        let mut videos = Vec::new();
        let mut transcripts = Vec::new();

        for video_id in &video_ids {
            let transcript = match cache.ensure(video_id) {
                Ok(outcome) => {
                    if outcome.was_fetched() {
                        summary.transcripts_fetched += 1;
                        info!(
                            video_id = %video_id,
                            count = summary.transcripts_fetched,
                            "downloaded transcript"
                        );
                    } else {
                        summary.transcripts_cached += 1;
                    }
                    Some(outcome.into_text())
                }
                Err(err) => {
                    summary.transcripts_missing += 1;
                    warn!(video_id = %video_id, "could not download transcript: {err}");
                    None
                }
            };

            let Some(row) = self.fetcher.fetch_video(video_id).into_row(video_id, &channel_id)
            else {
                warn!(video_id = %video_id, "no metadata for video; leaving it and its transcript out");
                summary.skipped_videos.push(video_id.clone());
                continue;
            };
            videos.push(row);
            if let Some(text) = transcript {
                transcripts.push(TranscriptRow {
                    video_id: video_id.clone(),
                    channel_id: channel_id.clone(),
                    video_transcript: text,
                });
            }
        }

        let listed: HashSet<&str> = video_ids.iter().map(String::as_str).collect();
        summary.stale_transcripts = cache
            .cached_ids()?
            .into_iter()
            .filter(|id| !listed.contains(id.as_str()))
            .collect();
        if !summary.stale_transcripts.is_empty() {
            warn!(
                handle,
                stale = ?summary.stale_transcripts,
                "cached transcripts for videos missing from the uploads listing"
            );
        }

        let video_table = materialize(&videos, handle, &paths.tables)?;
        let transcript_table = materialize(&transcripts, handle, &paths.tables)?;
        info!(
            handle,
            fetched = summary.transcripts_fetched,
            cached = summary.transcripts_cached,
            "finished retrieving transcripts"
        );

        let store = Store::open(&paths.db).await?;
        let counts = store
            .commit_run(
                &channel_table.records()?,
                &video_table.records()?,
                &transcript_table.records()?,
            )
            .await
            .with_context(|| format!("storing {handle} in {}", paths.db.display()))?;
        drop(store);

        summary.videos_stored = counts.videos;
        summary.transcripts_stored = counts.transcripts;
        info!(
            handle,
            videos = counts.videos,
            transcripts = counts.transcripts,
            "finished processing channel"
        );
        Ok(ChannelOutcome::Completed(summary))
    }
}
