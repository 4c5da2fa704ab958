use serde::{Deserialize, Serialize};

/// Outcome of a single audio download attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DownloadResult {
    Success(Vec<u8>),
    RetryableFailure(String),
    TerminalFailure(String),
}

impl DownloadResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::RetryableFailure(reason) | Self::TerminalFailure(reason) => Some(reason),
        }
    }
}

/// How a record's retrieval ended, after all attempts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AudioOutcome {
    Saved { path: String, bytes: usize, attempts: u32, via_proxy: bool },
    Failed { attempts: u32, reason: String },
    /// The download step could not finish locally (file write or store update).
    Errored { reason: String },
}

impl AudioOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved { .. })
    }
}

/// Checks that a 200 response actually carries audio rather than a login or
/// error page.
pub fn validate_audio_body(body: &[u8], min_bytes: usize) -> Result<(), String> {
    if body.len() < min_bytes {
        return Err(format!("body too small ({} bytes, expected at least {min_bytes})", body.len()));
    }

    let head = &body[..body.len().min(64)];
    let head = String::from_utf8_lossy(head);
    let head = head.trim_start().to_ascii_lowercase();
    if head.starts_with("<!doctype") || head.starts_with("<html") {
        return Err("body is an HTML document".to_string());
    }

    Ok(())
}
