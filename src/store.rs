//! SQLite persistence for channels, videos and transcripts.
//!
//! Every write is an upsert keyed by the platform identifier: re-running a
//! channel overwrites the previous values instead of duplicating rows.

use std::path::Path;

use anyhow::{Context, Result, bail};
use libsql::{Builder, Connection, Row, Value, params, params::Params};
use tracing::{debug, warn};

use crate::models::{ChannelRow, TranscriptRow, VideoRow};

pub const CHANNEL_TABLE: &str = "channel";
pub const VIDEO_TABLE: &str = "video";
pub const TRANSCRIPT_TABLE: &str = "transcript";
const TABLES: [&str; 3] = [CHANNEL_TABLE, VIDEO_TABLE, TRANSCRIPT_TABLE];

async fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;
        PRAGMA foreign_keys=ON;
        "#,
    )
    .await?;
    Ok(())
}

async fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS channel (
            channel_id TEXT PRIMARY KEY,
            channel_handle TEXT NOT NULL,
            channel_title TEXT NOT NULL,
            channel_subscribers INTEGER,
            channel_description TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS video (
            video_id TEXT PRIMARY KEY,
            channel_id TEXT NOT NULL
                REFERENCES channel(channel_id) ON DELETE CASCADE,
            video_title TEXT NOT NULL,
            video_views INTEGER,
            video_likes INTEGER,
            video_comments INTEGER,
            video_engagement REAL,
            video_published_at TEXT,
            video_description TEXT
        );

        CREATE TABLE IF NOT EXISTS transcript (
            video_id TEXT PRIMARY KEY
                REFERENCES video(video_id) ON DELETE CASCADE,
            channel_id TEXT NOT NULL,
            video_transcript TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_video_channel ON video(channel_id);
        "#,
    )
    .await?;
    Ok(())
}

fn text(value: &str) -> Value {
    Value::Text(value.to_owned())
}

fn opt_text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, text)
}

fn opt_integer(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::Integer)
}

fn opt_real(value: Option<f64>) -> Value {
    value.map_or(Value::Null, Value::Real)
}

/// Row types with an `INSERT .. ON CONFLICT DO UPDATE` statement whose
/// positional parameters are produced by [`Upsert::values`].
pub trait Upsert {
    const TABLE: &'static str;
    const SQL: &'static str;

    fn key(&self) -> &str;
    fn values(&self) -> Vec<Value>;
}

impl Upsert for ChannelRow {
    const TABLE: &'static str = CHANNEL_TABLE;
    const SQL: &'static str = r#"
        INSERT INTO channel (
            channel_id, channel_handle, channel_title,
            channel_subscribers, channel_description
        ) VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(channel_id) DO UPDATE SET
            channel_handle = excluded.channel_handle,
            channel_title = excluded.channel_title,
            channel_subscribers = excluded.channel_subscribers,
            channel_description = excluded.channel_description
    "#;

    fn key(&self) -> &str {
        &self.channel_id
    }

    fn values(&self) -> Vec<Value> {
        vec![
            text(&self.channel_id),
            text(&self.channel_handle),
            text(&self.channel_title),
            opt_integer(self.channel_subscribers),
            text(&self.channel_description),
        ]
    }
}

impl Upsert for VideoRow {
    const TABLE: &'static str = VIDEO_TABLE;
    const SQL: &'static str = r#"
        INSERT INTO video (
            video_id, channel_id, video_title, video_views, video_likes,
            video_comments, video_engagement, video_published_at, video_description
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(video_id) DO UPDATE SET
            channel_id = excluded.channel_id,
            video_title = excluded.video_title,
            video_views = excluded.video_views,
            video_likes = excluded.video_likes,
            video_comments = excluded.video_comments,
            video_engagement = excluded.video_engagement,
            video_published_at = excluded.video_published_at,
            video_description = excluded.video_description
    "#;

    fn key(&self) -> &str {
        &self.video_id
    }

    fn values(&self) -> Vec<Value> {
        vec![
            text(&self.video_id),
            text(&self.channel_id),
            text(&self.video_title),
            opt_integer(self.video_views),
            opt_integer(self.video_likes),
            opt_integer(self.video_comments),
            opt_real(self.video_engagement),
            opt_text(self.video_published_at.as_deref()),
            opt_text(self.video_description.as_deref()),
        ]
    }
}

impl Upsert for TranscriptRow {
    const TABLE: &'static str = TRANSCRIPT_TABLE;
    const SQL: &'static str = r#"
        INSERT INTO transcript (video_id, channel_id, video_transcript)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(video_id) DO UPDATE SET
            channel_id = excluded.channel_id,
            video_transcript = excluded.video_transcript
    "#;

    fn key(&self) -> &str {
        &self.video_id
    }

    fn values(&self) -> Vec<Value> {
        vec![
            text(&self.video_id),
            text(&self.channel_id),
            text(&self.video_transcript),
        ]
    }
}

async fn upsert_rows<R: Upsert>(conn: &Connection, rows: &[R]) -> Result<usize> {
    for row in rows {
        conn.execute(R::SQL, Params::Positional(row.values()))
            .await
            .with_context(|| format!("upserting {} row {}", R::TABLE, row.key()))?;
    }
    Ok(rows.len())
}

/// Rows written by [`Store::commit_run`], per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounts {
    pub channels: usize,
    pub videos: usize,
    pub transcripts: usize,
}

pub struct Store {
    conn: Connection,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    /// Opens (and if necessary creates) the database file and its tables.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {}", parent.display()))?;
        }

        let db = Builder::new_local(path)
            .build()
            .await
            .with_context(|| format!("opening database {}", path.display()))?;
        let conn = db.connect()?;
        configure_connection(&conn).await?;
        ensure_schema(&conn).await?;
        Ok(Self { conn })
    }

    /// Writes `rows` in one transaction. The first failing row rolls the whole
    /// call back.
    pub async fn upsert<R: Upsert>(&self, rows: &[R]) -> Result<usize> {
        let tx = self.conn.transaction().await?;
        match upsert_rows(&tx, rows).await {
            Ok(written) => {
                tx.commit().await?;
                debug!(table = R::TABLE, rows = written, "upserted rows");
                Ok(written)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(table = R::TABLE, "rollback failed after {err:#}: {rollback_err}");
                }
                Err(err)
            }
        }
    }

    /// Upserts a channel run in foreign-key order inside a single transaction.
    pub async fn commit_run(
        &self,
        channels: &[ChannelRow],
        videos: &[VideoRow],
        transcripts: &[TranscriptRow],
    ) -> Result<RunCounts> {
        let tx = self.conn.transaction().await?;
        let result = async {
            Ok::<_, anyhow::Error>(RunCounts {
                channels: upsert_rows(&tx, channels).await?,
                videos: upsert_rows(&tx, videos).await?,
                transcripts: upsert_rows(&tx, transcripts).await?,
            })
        }
        .await;

        match result {
            Ok(counts) => {
                tx.commit().await.context("committing channel run")?;
                Ok(counts)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!("rollback of channel run failed after {err:#}: {rollback_err}");
                }
                Err(err)
            }
        }
    }

    pub async fn channel(&self, channel_id: &str) -> Result<Option<ChannelRow>> {
        let mut rows = self
            .conn
            .query(
                r#"
                SELECT channel_id, channel_handle, channel_title,
                       channel_subscribers, channel_description
                FROM channel
                WHERE channel_id = ?1
                "#,
                [channel_id],
            )
            .await?;
        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        Ok(Some(ChannelRow {
            channel_id: row.get(0)?,
            channel_handle: row.get(1)?,
            channel_title: row.get(2)?,
            channel_subscribers: row.get(3)?,
            channel_description: row.get(4)?,
        }))
    }

    pub async fn video(&self, video_id: &str) -> Result<Option<VideoRow>> {
        let mut rows = self
            .conn
            .query(
                r#"
                SELECT video_id, channel_id, video_title, video_views, video_likes,
                       video_comments, video_engagement, video_published_at,
                       video_description
                FROM video
                WHERE video_id = ?1
                "#,
                [video_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_video(&row)?)),
            None => Ok(None),
        }
    }

    /// Videos of one channel, newest first.
    pub async fn videos_for_channel(&self, channel_id: &str) -> Result<Vec<VideoRow>> {
        let mut rows = self
            .conn
            .query(
                r#"
                SELECT video_id, channel_id, video_title, video_views, video_likes,
                       video_comments, video_engagement, video_published_at,
                       video_description
                FROM video
                WHERE channel_id = ?1
                ORDER BY video_published_at IS NULL, video_published_at DESC, video_id ASC
                "#,
                [channel_id],
            )
            .await?;
        let mut videos = Vec::new();
        while let Some(row) = rows.next().await? {
            videos.push(row_to_video(&row)?);
        }
        Ok(videos)
    }

    pub async fn transcript(&self, video_id: &str) -> Result<Option<TranscriptRow>> {
        let mut rows = self
            .conn
            .query(
                r#"
                SELECT video_id, channel_id, video_transcript
                FROM transcript
                WHERE video_id = ?1
                "#,
                [video_id],
            )
            .await?;
        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        Ok(Some(TranscriptRow {
            video_id: row.get(0)?,
            channel_id: row.get(1)?,
            video_transcript: row.get(2)?,
        }))
    }

    pub async fn count(&self, table: &str) -> Result<i64> {
        if !TABLES.contains(&table) {
            bail!("unknown table {table}");
        }
        let mut rows = self
            .conn
            .query(&format!("SELECT COUNT(*) FROM {table}"), params![])
            .await?;
        let row = rows.next().await?.context("COUNT returned no row")?;
        Ok(row.get(0)?)
    }
}

fn row_to_video(row: &Row) -> Result<VideoRow> {
    // Column order must match the SELECTs in `video` and `videos_for_channel`.
    Ok(VideoRow {
        video_id: row.get(0)?,
        channel_id: row.get(1)?,
        video_title: row.get(2)?,
        video_views: row.get(3)?,
        video_likes: row.get(4)?,
        video_comments: row.get(5)?,
        video_engagement: row.get(6)?,
        video_published_at: row.get(7)?,
        video_description: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    async fn create_store() -> Result<(tempfile::TempDir, Store, PathBuf)> {
        let dir = tempdir()?;
        let path = dir.path().join("output/tubescriber.db");
        let store = Store::open(&path).await?;
        Ok((dir, store, path))
    }

    fn channel(title: &str) -> ChannelRow {
        ChannelRow {
            channel_id: "UC123".into(),
            channel_handle: "@example".into(),
            channel_title: title.into(),
            channel_subscribers: Some(1500),
            channel_description: "About".into(),
        }
    }

    fn video(id: &str, title: &str, published_at: Option<&str>) -> VideoRow {
        VideoRow {
            video_id: id.into(),
            channel_id: "UC123".into(),
            video_title: title.into(),
            video_views: Some(100),
            video_likes: Some(10),
            video_comments: Some(5),
            video_engagement: Some(15.0),
            video_published_at: published_at.map(str::to_owned),
            video_description: None,
        }
    }

    fn transcript(id: &str) -> TranscriptRow {
        TranscriptRow {
            video_id: id.into(),
            channel_id: "UC123".into(),
            video_transcript: format!("words of {id}"),
        }
    }

    #[tokio::test]
    async fn opens_store_and_creates_schema() -> Result<()> {
        let (_temp, store, path) = create_store().await?;
        assert!(path.exists(), "database file should be created");

        let mut rows = store.conn.query("PRAGMA journal_mode", params![]).await?;
        let journal: String = rows.next().await?.context("missing journal_mode row")?.get(0)?;
        assert_eq!(journal.to_lowercase(), "wal");

        let mut rows = store.conn.query("PRAGMA foreign_keys", params![]).await?;
        let flag: i64 = rows.next().await?.context("missing foreign_keys row")?.get(0)?;
        assert_eq!(flag, 1);

        for table in TABLES {
            assert_eq!(store.count(table).await?, 0);
        }
        let mut rows = store
            .conn
            .query(
                "SELECT name FROM sqlite_master WHERE type='index' AND name=?1",
                ["idx_video_channel"],
            )
            .await?;
        assert!(rows.next().await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn reopening_keeps_rows() -> Result<()> {
        let (_temp, store, path) = create_store().await?;
        store.upsert(&[channel("Example")]).await?;
        drop(store);

        let reopened = Store::open(&path).await?;
        assert_eq!(reopened.count(CHANNEL_TABLE).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn upsert_is_last_write_wins() -> Result<()> {
        let (_temp, store, _path) = create_store().await?;
        store.upsert(&[channel("Example")]).await?;
        store.upsert(&[video("v1", "First", Some("2024-01-01T00:00:00Z"))]).await?;

        let mut updated = video("v1", "Renamed", Some("2024-01-01T00:00:00Z"));
        updated.video_views = Some(0);
        updated.video_engagement = None;
        updated.video_description = Some("now described".into());
        store.upsert(&[updated.clone()]).await?;

        assert_eq!(store.count(VIDEO_TABLE).await?, 1);
        let stored = store.video("v1").await?.expect("video stored");
        assert_eq!(stored, updated);
        Ok(())
    }

    #[tokio::test]
    async fn channel_upsert_overwrites_every_column() -> Result<()> {
        let (_temp, store, _path) = create_store().await?;
        store.upsert(&[channel("Old")]).await?;
        let mut renamed = channel("New");
        renamed.channel_handle = "@renamed".into();
        renamed.channel_subscribers = None;
        store.upsert(&[renamed.clone()]).await?;

        assert_eq!(store.channel("UC123").await?, Some(renamed));
        assert_eq!(store.count(CHANNEL_TABLE).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn failing_row_rolls_back_the_batch() -> Result<()> {
        let (_temp, store, _path) = create_store().await?;
        store.upsert(&[channel("Example")]).await?;
        let mut orphan = video("v2", "Orphan", None);
        orphan.channel_id = "UC-missing".into();

        let err = store
            .upsert(&[video("v1", "Fine", None), orphan])
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("video row v2"));
        assert_eq!(store.count(VIDEO_TABLE).await?, 0);

        assert_eq!(store.upsert(&[video("v1", "Fine", None)]).await?, 1);
        assert_eq!(store.count(VIDEO_TABLE).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn commit_run_writes_all_tables() -> Result<()> {
        let (_temp, store, _path) = create_store().await?;
        let counts = store
            .commit_run(
                &[channel("Example")],
                &[
                    video("v1", "One", Some("2023-01-01T00:00:00Z")),
                    video("v2", "Two", Some("2024-01-01T00:00:00Z")),
                ],
                &[transcript("v1")],
            )
            .await?;
        assert_eq!(
            counts,
            RunCounts {
                channels: 1,
                videos: 2,
                transcripts: 1
            }
        );

        let ids: Vec<String> = store
            .videos_for_channel("UC123")
            .await?
            .into_iter()
            .map(|row| row.video_id)
            .collect();
        assert_eq!(ids, vec!["v2", "v1"]);
        assert_eq!(
            store.transcript("v1").await?.map(|row| row.video_transcript),
            Some("words of v1".to_string())
        );
        assert_eq!(store.transcript("v2").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn commit_run_rejects_transcript_without_video() -> Result<()> {
        let (_temp, store, _path) = create_store().await?;
        let err = store
            .commit_run(&[channel("Example")], &[], &[transcript("ghost")])
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("transcript row ghost"));
        assert_eq!(store.count(CHANNEL_TABLE).await?, 0);

        // The rolled back transaction leaves the connection usable.
        let counts = store
            .commit_run(&[channel("Example")], &[video("v1", "One", None)], &[transcript("v1")])
            .await?;
        assert_eq!(counts.transcripts, 1);
        assert_eq!(store.count(TRANSCRIPT_TABLE).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn deleting_channel_cascades() -> Result<()> {
        let (_temp, store, _path) = create_store().await?;
        store
            .commit_run(
                &[channel("Example")],
                &[video("v1", "One", None), video("v2", "Two", None)],
                &[transcript("v1"), transcript("v2")],
            )
            .await?;

        store
            .conn
            .execute("DELETE FROM channel WHERE channel_id = ?1", ["UC123"])
            .await?;
        for table in TABLES {
            assert_eq!(store.count(table).await?, 0, "{table} should be empty");
        }
        Ok(())
    }

    #[tokio::test]
    async fn count_rejects_unknown_tables() -> Result<()> {
        let (_temp, store, _path) = create_store().await?;
        assert!(store.count("sqlite_master; DROP TABLE video").await.is_err());
        Ok(())
    }
}
