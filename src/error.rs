use thiserror::Error;

#[derive(Error, Debug)]
pub enum VidsegError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Please upload a valid video file ({0})")]
    UnsupportedMedia(String),

    #[error("Error: {0}")]
    Submission(String),

    #[error("Processing failed: {0}")]
    JobFailed(String),

    #[error("Error checking processing status: {0}")]
    Transport(String),

    #[error("Processing did not finish within {0} seconds")]
    PollTimeout(u64),

    #[error("Processing was cancelled")]
    Cancelled,

    #[error("File not found: {0}")]
    FileNotFound(String),
}

/// The user-facing failure categories of a processing episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing file or empty prompt; gated silently, never alerted.
    Validation,
    /// Job creation rejected or unreachable.
    Submission,
    /// Backend reported `failed`.
    JobFailure,
    /// Network failure while polling.
    Transport,
    /// Anything outside the episode lifecycle (config, local IO).
    Other,
}

impl VidsegError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::UnsupportedMedia(_) => ErrorKind::Validation,
            Self::Submission(_) => ErrorKind::Submission,
            Self::JobFailed(_) | Self::PollTimeout(_) => ErrorKind::JobFailure,
            Self::Transport(_) | Self::Http(_) => ErrorKind::Transport,
            _ => ErrorKind::Other,
        }
    }
}

pub type Result<T> = std::result::Result<T, VidsegError>;
