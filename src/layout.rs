use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const DB_FILE: &str = "tubescriber.db";

/// Shared store file for every channel: `<root>/tubescriber.db`.
pub fn db_path(root: &Path) -> PathBuf {
    root.join(DB_FILE)
}

/// Per-channel output locations under the output root:
///
/// ```text
/// <root>/<handle>/tables/<handle>_<tag>.csv
/// <root>/<handle>/transcripts/<video_id>.txt
/// <root>/tubescriber.db
/// ```
#[derive(Debug, Clone)]
pub struct ChannelPaths {
    pub base: PathBuf,
    pub tables: PathBuf,
    pub transcripts: PathBuf,
    pub db: PathBuf,
}

impl ChannelPaths {
    pub fn for_handle(root: &Path, handle: &str) -> Self {
        let base = root.join(handle);
        Self {
            tables: base.join("tables"),
            transcripts: base.join("transcripts"),
            db: db_path(root),
            base,
        }
    }

    pub fn prepare(&self) -> Result<()> {
        for dir in [&self.base, &self.tables, &self.transcripts] {
            fs::create_dir_all(dir).with_context(|| format!("Creating {}", dir.display()))?;
        }
        Ok(())
    }
}
