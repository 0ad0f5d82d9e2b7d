#![forbid(unsafe_code)]

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use tubescriber::{
    cli,
    config::{self, SettingsOverrides},
    logging,
    pipeline::{ChannelOutcome, Pipeline},
    transcripts::YtDlpTranscripts,
    youtube::{MetadataFetcher, UreqApi},
};

/// Archive YouTube channels: channel info, per-video statistics and caption
/// transcripts as CSV snapshots plus a shared SQLite database.
#[derive(Debug, Parser)]
#[command(name = "tubescriber", version)]
struct Args {
    /// Channel handles such as `@example`. Prompted for when omitted.
    handles: Vec<String>,

    /// Root of the per-channel output tree [env: OUTPUT_DIR]
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Env file holding the API key and settings
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Name of the API key entry
    #[arg(long)]
    api_key_name: Option<String>,

    /// Directory for the error log [env: LOG_DIR]
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// yt-dlp executable [env: YT_DLP_PATH]
    #[arg(long = "yt-dlp")]
    yt_dlp: Option<PathBuf>,

    /// Subtitle languages passed to yt-dlp [env: SUB_LANGS]
    #[arg(long)]
    sub_langs: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let Args {
        handles,
        output_dir,
        env_file,
        api_key_name,
        log_dir,
        yt_dlp,
        sub_langs,
    } = Args::parse();

    let settings = config::resolve_settings(SettingsOverrides {
        output_root: output_dir,
        log_dir,
        yt_dlp,
        sub_langs,
        env_path: env_file,
        api_key_name,
    })?;
    let log_path = logging::init(&settings.log_dir)?;

    let handles = cli::parse_handles(&handles, || cli::prompt_line(cli::HANDLE_PROMPT))?;
    let api_key = config::resolve_api_key(&settings, || cli::prompt_line(cli::API_KEY_PROMPT))?;

    let transcripts = YtDlpTranscripts::new(&settings.yt_dlp, settings.sub_langs.clone());
    if let Err(err) = transcripts.ensure_available() {
        warn!("yt-dlp is not usable, transcripts will be missing: {err:#}");
    }
    let api = UreqApi::new(api_key, settings.api_base.clone(), settings.http_timeout);
    let pipeline = Pipeline::new(MetadataFetcher::new(api), transcripts, &settings.output_root);

    info!(
        channels = handles.len(),
        output = %settings.output_root.display(),
        errors_log = %log_path.display(),
        "starting"
    );
    for outcome in pipeline.run(&handles).await? {
        match outcome {
            ChannelOutcome::Completed(summary) => info!(
                handle = %summary.handle,
                videos = summary.videos_stored,
                transcripts = summary.transcripts_stored,
                skipped = summary.skipped_videos.len(),
                "channel summary"
            ),
            ChannelOutcome::NotFound(handle) => {
                warn!(handle = %handle, "no channel found for handle; skipped")
            }
        }
    }
    Ok(())
}
