use anyhow::{Context, Result, bail};
use std::io::{self, BufRead, Write};

pub const HANDLE_PROMPT: &str = "Enter YouTube channel handles (comma-separated): ";
pub const API_KEY_PROMPT: &str = "Enter your YouTube Data API key: ";

/// Channel handles to process. Positional arguments win; without any, a single
/// comma-separated line is read through `prompt`. Blank entries are dropped.
pub fn parse_handles(args: &[String], prompt: impl FnOnce() -> Result<String>) -> Result<Vec<String>> {
    let handles: Vec<String> = if args.is_empty() {
        let line = prompt()?;
        split_handles(&line)
    } else {
        args.iter().flat_map(|arg| split_handles(arg)).collect()
    };
    if handles.is_empty() {
        bail!("no channel handles given");
    }
    Ok(handles)
}

fn split_handles(line: &str) -> Vec<String> {
    line.split(',')
        .map(str::trim)
        .filter(|handle| !handle.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Prints `message` and reads one line from stdin. Fails on end of input so
/// callers that loop on blank answers cannot spin forever.
pub fn prompt_line(message: &str) -> Result<String> {
    let mut stdout = io::stdout();
    stdout.write_all(message.as_bytes())?;
    stdout.flush()?;

    let mut line = String::new();
    let read = io::stdin()
        .lock()
        .read_line(&mut line)
        .context("reading from stdin")?;
    if read == 0 {
        bail!("stdin closed before an answer was given");
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
