//! Error taxonomy for everything that talks to the platform.
//!
//! Store and filesystem failures outside the platform boundary travel as
//! `anyhow::Error` with context, the way the rest of the crate propagates.

/// Failures raised by the Data API client and the transcript sources.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("YouTube API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP transport failed: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transcript unavailable for {video_id}: {reason}")]
    TranscriptUnavailable { video_id: String, reason: String },
}

impl PlatformError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<ureq::Error> for PlatformError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(status, response) => {
                let body = response.into_string().unwrap_or_default();
                Self::Api {
                    status,
                    message: api_error_message(&body),
                }
            }
            // The transport's Display includes the URL, which carries the API key.
            ureq::Error::Transport(transport) => Self::Transport(match transport.message() {
                Some(message) => format!("{}: {message}", transport.kind()),
                None => transport.kind().to_string(),
            }),
        }
    }
}

/// Pulls `error.message` out of a Data API error body, falling back to the raw
/// body when it is not the documented JSON shape.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(|message| message.as_str())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| body.trim().to_owned())
}
