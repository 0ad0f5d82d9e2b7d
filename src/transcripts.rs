//! File-backed transcript cache: one `<video_id>.txt` per video, one caption
//! line per text line. An existing file is never refetched.

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::PlatformError;

pub const TRANSCRIPT_EXT: &str = "txt";

/// Anything that can produce the caption lines of a video.
pub trait TranscriptSource {
    fn fetch_lines(&self, video_id: &str) -> Result<Vec<String>, PlatformError>;
}

impl<T: TranscriptSource + ?Sized> TranscriptSource for &T {
    fn fetch_lines(&self, video_id: &str) -> Result<Vec<String>, PlatformError> {
        (**self).fetch_lines(video_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOutcome {
    /// The artifact already existed; nothing was fetched.
    Cached(String),
    Fetched(String),
}

impl CacheOutcome {
    pub fn into_text(self) -> String {
        match self {
            Self::Cached(text) | Self::Fetched(text) => text,
        }
    }

    pub fn was_fetched(&self) -> bool {
        matches!(self, Self::Fetched(_))
    }
}

pub struct TranscriptCache<S> {
    dir: PathBuf,
    source: S,
}

impl<S: TranscriptSource> TranscriptCache<S> {
    pub fn new(dir: impl Into<PathBuf>, source: S) -> Self {
        Self {
            dir: dir.into(),
            source,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn path_for(&self, video_id: &str) -> PathBuf {
        self.dir.join(format!("{video_id}.{TRANSCRIPT_EXT}"))
    }

    /// Returns the cached transcript, fetching and storing it first when no
    /// artifact exists. An empty caption list counts as unavailable and leaves
    /// no file behind.
    pub fn ensure(&self, video_id: &str) -> Result<CacheOutcome, PlatformError> {
        let path = self.path_for(video_id);
        if path.is_file() {
            debug!(video_id, path = %path.display(), "transcript already cached");
            return Ok(CacheOutcome::Cached(fs::read_to_string(&path)?));
        }

        let lines = self.source.fetch_lines(video_id)?;
        if lines.is_empty() {
            return Err(PlatformError::TranscriptUnavailable {
                video_id: video_id.to_owned(),
                reason: "no caption lines".into(),
            });
        }

        let mut text = String::new();
        for line in &lines {
            text.push_str(line);
            text.push('\n');
        }

        fs::create_dir_all(&self.dir)?;
        let tmp_path = path.with_extension(format!("{TRANSCRIPT_EXT}.tmp"));
        fs::write(&tmp_path, &text)?;
        fs::rename(&tmp_path, &path)?;
        Ok(CacheOutcome::Fetched(text))
    }

    /// Video ids with an artifact in the cache directory, sorted.
    pub fn cached_ids(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1) {
            let entry = entry.with_context(|| format!("scanning {}", self.dir.display()))?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|ext| ext.to_str()) != Some(TRANSCRIPT_EXT)
            {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                ids.push(stem.to_owned());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// Caption source backed by `yt-dlp`: manual and automatic subtitles are
/// written as WebVTT into a scratch directory and the first track is parsed.
#[derive(Debug, Clone)]
pub struct YtDlpTranscripts {
    program: PathBuf,
    sub_langs: String,
}

impl YtDlpTranscripts {
    pub fn new(program: impl Into<PathBuf>, sub_langs: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            sub_langs: sub_langs.into(),
        }
    }

    /// Fails when the configured program cannot be started.
    pub fn ensure_available(&self) -> Result<()> {
        let status = Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .with_context(|| format!("running {} --version", self.program.display()))?;
        if !status.success() {
            bail!("{} --version exited with {status}", self.program.display());
        }
        Ok(())
    }

    fn unavailable(video_id: &str, reason: impl Into<String>) -> PlatformError {
        PlatformError::TranscriptUnavailable {
            video_id: video_id.to_owned(),
            reason: reason.into(),
        }
    }
}

impl TranscriptSource for YtDlpTranscripts {
    fn fetch_lines(&self, video_id: &str) -> Result<Vec<String>, PlatformError> {
        let workdir = tempfile::tempdir()?;
        let output_pattern = workdir.path().join(video_id);
        let video_url = format!("https://www.youtube.com/watch?v={video_id}");

        let output = Command::new(&self.program)
            .arg("--skip-download")
            .arg("--write-sub")
            .arg("--write-auto-sub")
            .arg("--sub-langs")
            .arg(&self.sub_langs)
            .arg("--sub-format")
            .arg("vtt")
            .arg("--output")
            .arg(&output_pattern)
            .arg(&video_url)
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let last_line = stderr.lines().rev().find(|line| !line.trim().is_empty());
            return Err(Self::unavailable(
                video_id,
                format!(
                    "yt-dlp exited with {}: {}",
                    output.status,
                    last_line.unwrap_or("no output")
                ),
            ));
        }

        let mut tracks: Vec<PathBuf> = fs::read_dir(workdir.path())?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("vtt"))
            .collect();
        tracks.sort();
        let Some(track) = tracks.first() else {
            return Err(Self::unavailable(video_id, "no subtitle track produced"));
        };
        debug!(video_id, track = %track.display(), "parsing subtitle track");
        Ok(parse_vtt(&fs::read_to_string(track)?))
    }
}

/// Extracts the spoken text from a WebVTT document, one entry per caption
/// line. Rolling auto-captions repeat the previous line, so consecutive
/// duplicates are collapsed.
pub fn parse_vtt(input: &str) -> Vec<String> {
    let mut blocks: Vec<Vec<&str>> = Vec::new();
    let mut current = Vec::new();
    for line in input.lines() {
        let line = line.trim_start_matches('\u{feff}').trim_end();
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }

    let mut lines: Vec<String> = Vec::new();
    for block in blocks {
        let first = block[0].trim_start();
        if first.starts_with("WEBVTT")
            || first.starts_with("NOTE")
            || first == "STYLE"
            || first == "REGION"
        {
            continue;
        }
        let Some(timing) = block.iter().position(|line| line.contains("-->")) else {
            continue;
        };
        for raw in &block[timing + 1..] {
            let text = clean_cue_text(raw);
            if text.is_empty() || lines.last() == Some(&text) {
                continue;
            }
            lines.push(text);
        }
    }
    lines
}

fn clean_cue_text(raw: &str) -> String {
    let mut text = String::with_capacity(raw.len());
    let mut in_tag = false;
    for ch in raw.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(ch),
            _ => {}
        }
    }
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}
