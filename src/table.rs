//! In-memory tables built from uniformly keyed records, and their CSV
//! snapshots under `output/<handle>/tables/`.

use std::cmp::Reverse;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::DateTime;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

/// Column the snapshots are ordered by, newest first, when present.
pub const PUBLISHED_AT_COLUMN: &str = "video_published_at";

/// Record types that can be materialized into a [`Table`].
///
/// `COLUMNS` must list the serialized field names in declaration order.
pub trait Tabular: Serialize + DeserializeOwned {
    /// Suffix of the CSV artifact, e.g. `videos` in `@handle_videos.csv`.
    const TAG: &'static str;
    const COLUMNS: &'static [&'static str];
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    tag: String,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(tag: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            tag: tag.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Serializes every record into a row following `R::COLUMNS`.
    pub fn from_records<R: Tabular>(records: &[R]) -> Result<Self> {
        let columns = R::COLUMNS.iter().map(|column| column.to_string()).collect();
        let mut table = Self::new(R::TAG, columns);
        for record in records {
            let value = serde_json::to_value(record).context("serializing table record")?;
            let Value::Object(mut fields) = value else {
                bail!("{} records must serialize to objects", R::TAG);
            };
            let row = R::COLUMNS
                .iter()
                .map(|column| fields.remove(*column).unwrap_or(Value::Null))
                .collect();
            table.rows.push(row);
        }
        Ok(table)
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Replaces embedded line breaks in text cells with a single space so each
    /// record stays on one CSV line.
    pub fn scrub_newlines(&mut self) {
        for cell in self.rows.iter_mut().flatten() {
            if let Value::String(text) = cell
                && text.contains(['\n', '\r'])
            {
                *text = text.replace("\r\n", " ").replace(['\n', '\r'], " ");
            }
        }
    }

    /// Orders rows newest first by [`PUBLISHED_AT_COLUMN`]. Cells that are not
    /// RFC 3339 timestamps, placeholders included, sink to the bottom in their
    /// input order. Returns `false` when the column is absent.
    pub fn sort_by_published_at(&mut self) -> bool {
        let Some(index) = self.column_index(PUBLISHED_AT_COLUMN) else {
            return false;
        };
        self.rows.sort_by_cached_key(|row| {
            let published = row[index]
                .as_str()
                .and_then(|text| DateTime::parse_from_rfc3339(text).ok());
            (published.is_none(), Reverse(published))
        });
        true
    }

    /// Drops exact duplicate rows, keeping the first occurrence.
    pub fn dedup(&mut self) {
        let mut seen = HashSet::new();
        self.rows.retain(|row| {
            // Value has no Hash impl; its canonical JSON text stands in.
            let key = serde_json::to_string(row).unwrap_or_default();
            seen.insert(key)
        });
    }

    /// Writes the header and every row to `path` via a temp file + rename.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let tmp_path = path.with_extension("csv.tmp");
        {
            let mut writer = csv::Writer::from_path(&tmp_path)
                .with_context(|| format!("opening {}", tmp_path.display()))?;
            writer
                .write_record(&self.columns)
                .with_context(|| format!("writing header to {}", tmp_path.display()))?;
            for row in &self.rows {
                writer
                    .write_record(row.iter().map(cell_text))
                    .with_context(|| format!("writing row to {}", tmp_path.display()))?;
            }
            writer
                .flush()
                .with_context(|| format!("flushing {}", tmp_path.display()))?;
        }
        fs::rename(&tmp_path, path)
            .with_context(|| format!("finalizing {}", path.display()))?;
        Ok(())
    }

    /// Turns the rows back into typed records for the store.
    pub fn records<R: DeserializeOwned>(&self) -> Result<Vec<R>> {
        self.rows
            .iter()
            .map(|row| {
                let fields: Map<String, Value> = self
                    .columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect();
                serde_json::from_value(Value::Object(fields))
                    .with_context(|| format!("decoding {} row", self.tag))
            })
            .collect()
    }
}

fn cell_text(cell: &Value) -> String {
    match cell {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Path of the snapshot for `tag`: `<dir>/<handle>_<tag>.csv`.
pub fn artifact_path(dir: &Path, handle: &str, tag: &str) -> PathBuf {
    dir.join(format!("{handle}_{tag}.csv"))
}

/// Normalizes `records` (newlines, sort, dedup), writes the CSV snapshot named
/// after `handle` and the record tag, and returns the table.
pub fn materialize<R: Tabular>(records: &[R], handle: &str, dir: &Path) -> Result<Table> {
    let mut table = Table::from_records(records)?;
    table.scrub_newlines();
    if !table.sort_by_published_at() {
        debug!(
            tag = table.tag(),
            "no {PUBLISHED_AT_COLUMN} column; keeping input order"
        );
    }
    table.dedup();

    let path = artifact_path(dir, handle, table.tag());
    table.write_csv(&path)?;
    debug!(path = %path.display(), rows = table.len(), "wrote table snapshot");
    Ok(table)
}
