#![forbid(unsafe_code)]

use anyhow::{Context, Result, anyhow, bail};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_API_KEY_NAME: &str = "API_KEY";
pub const DEFAULT_OUTPUT_DIR: &str = "output";
pub const DEFAULT_LOG_DIR: &str = ".logs";
pub const DEFAULT_YT_DLP: &str = "yt-dlp";
pub const DEFAULT_SUB_LANGS: &str = "en.*,en";
pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/youtube/v3";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Settings {
    pub output_root: PathBuf,
    pub log_dir: PathBuf,
    pub yt_dlp: PathBuf,
    pub sub_langs: String,
    pub api_base: String,
    pub http_timeout: Duration,
    pub env_path: PathBuf,
    pub api_key_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub output_root: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub yt_dlp: Option<PathBuf>,
    pub sub_langs: Option<String>,
    pub env_path: Option<PathBuf>,
    pub api_key_name: Option<String>,
}

pub fn resolve_settings(overrides: SettingsOverrides) -> Result<Settings> {
    let env_path = overrides
        .env_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(&env_path)?;
    build_settings_with_overrides(&file_vars, env_var_string, env_path, overrides)
}

fn build_settings_with_overrides(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    env_path: PathBuf,
    overrides: SettingsOverrides,
) -> Result<Settings> {
    let output_root = overrides
        .output_root
        .or_else(|| lookup_value("OUTPUT_DIR", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
    let log_dir = overrides
        .log_dir
        .or_else(|| lookup_value("LOG_DIR", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR));
    let yt_dlp = overrides
        .yt_dlp
        .or_else(|| lookup_value("YT_DLP_PATH", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_YT_DLP));
    let sub_langs = non_blank(overrides.sub_langs)
        .or_else(|| lookup_value("SUB_LANGS", file_vars, &env_lookup))
        .unwrap_or_else(|| DEFAULT_SUB_LANGS.to_string());
    let api_base = lookup_value("YOUTUBE_API_BASE", file_vars, &env_lookup)
        .map(|value| value.trim_end_matches('/').to_string())
        .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
    let http_timeout = lookup_value("HTTP_TIMEOUT_SECS", file_vars, &env_lookup)
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS);
    let api_key_name = non_blank(overrides.api_key_name)
        .unwrap_or_else(|| DEFAULT_API_KEY_NAME.to_string());
    if api_key_name.contains('=') {
        bail!("API key name must not contain '=': {api_key_name}");
    }

    Ok(Settings {
        output_root,
        log_dir,
        yt_dlp,
        sub_langs,
        api_base,
        http_timeout: Duration::from_secs(http_timeout),
        env_path,
        api_key_name,
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn env_var_string(key: &str) -> Option<String> {
    non_blank(env::var(key).ok())
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| non_blank(file_vars.get(key).cloned()))
}

/// Returns the API key named in `settings`, prompting until a non-empty value
/// is entered when neither the environment nor the env file has one. A
/// prompted key is written back to the env file.
pub fn resolve_api_key(settings: &Settings, prompt: impl FnMut() -> Result<String>) -> Result<String> {
    let file_vars = read_env_file(&settings.env_path)?;
    resolve_api_key_with(
        &settings.env_path,
        &settings.api_key_name,
        &file_vars,
        env_var_string,
        prompt,
    )
}

fn resolve_api_key_with(
    env_path: &Path,
    key_name: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    mut prompt: impl FnMut() -> Result<String>,
) -> Result<String> {
    if let Some(value) = lookup_value(key_name, file_vars, &env_lookup) {
        return Ok(value);
    }

    let value = loop {
        let entered = prompt().context("reading API key")?;
        let trimmed = entered.trim();
        if !trimmed.is_empty() {
            break trimmed.to_string();
        }
    };

    upsert_env_value(env_path, key_name, &value)
        .with_context(|| format!("saving {key_name} to {}", env_path.display()))?;
    Ok(value)
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}

/// Updates or appends a single env var inside the target file while preserving
/// unrelated lines and comments.
pub fn upsert_env_value(path: &Path, key: &str, value: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(anyhow!("cannot store an empty key in {}", path.display()));
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| format!("Creating {}", parent.display()))?;
    }

    let raw = fs::read_to_string(path).unwrap_or_default();
    let mut lines = Vec::new();
    let mut updated = false;
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");

    for line in raw.lines() {
        let trimmed = line.trim_start();
        let indent_len = line.len() - trimmed.len();
        let indent = &line[..indent_len];
        let (prefix, rest) = if let Some(stripped) = trimmed.strip_prefix("export ") {
            ("export ", stripped)
        } else {
            ("", trimmed)
        };
        let Some((candidate, _)) = rest.split_once('=') else {
            lines.push(line.to_string());
            continue;
        };
        if candidate.trim() == key && !updated {
            lines.push(format!("{indent}{prefix}{key}=\"{escaped}\""));
            updated = true;
        } else {
            lines.push(line.to_string());
        }
    }

    if !updated {
        lines.push(format!("{key}=\"{escaped}\""));
    }

    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, lines.join("\n") + "\n")?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}
