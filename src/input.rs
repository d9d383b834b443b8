use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Result, VidsegError};

const VIDEO_TYPES: &[(&str, &str)] = &[
    ("mp4", "video/mp4"),
    ("m4v", "video/x-m4v"),
    ("mov", "video/quicktime"),
    ("avi", "video/x-msvideo"),
    ("mkv", "video/x-matroska"),
    ("webm", "video/webm"),
    ("wmv", "video/x-ms-wmv"),
    ("flv", "video/x-flv"),
    ("mpeg", "video/mpeg"),
    ("mpg", "video/mpeg"),
];

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Content type declared for a file, derived from its extension
pub fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    match extension {
        Some(ext) => VIDEO_TYPES
            .iter()
            .find(|(known, _)| *known == ext)
            .map(|(_, mime)| *mime)
            .unwrap_or(FALLBACK_CONTENT_TYPE),
        None => FALLBACK_CONTENT_TYPE,
    }
}

/// A media file the user selected for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadCandidate {
    pub path: PathBuf,
    pub file_name: String,
    pub content_type: String,
}

impl UploadCandidate {
    pub fn new(path: PathBuf, file_name: String, content_type: String) -> Self {
        Self { path, file_name, content_type }
    }

    /// Build a candidate from a file on disk
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(VidsegError::FileNotFound(path.display().to_string()));
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| VidsegError::Validation("Invalid video filename".to_string()))?;

        Ok(Self::new(path.to_path_buf(), file_name, content_type_for(path).to_string()))
    }

    pub fn is_video(&self) -> bool {
        self.content_type.starts_with("video/")
    }

    /// Open the file for a streamed upload, along with its length in bytes
    pub async fn open(&self) -> Result<(tokio::fs::File, u64)> {
        let file = tokio::fs::File::open(&self.path).await?;
        let length = file.metadata().await?.len();
        Ok((file, length))
    }
}

pub struct InputValidator;

impl InputValidator {
    /// Submission is permitted iff a file is selected and the trimmed prompt is non-empty
    pub fn permits(candidate: Option<&UploadCandidate>, prompt: &str) -> bool {
        candidate.is_some() && !prompt.trim().is_empty()
    }
}

/// The editable inputs of a session, with the submit affordance recomputed on every change
#[derive(Debug, Default)]
pub struct FormState {
    candidate: Option<UploadCandidate>,
    prompt: String,
    submit_enabled: bool,
}

impl FormState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the selected file; non-video files are rejected and the previous selection kept
    pub fn select_file(&mut self, candidate: UploadCandidate) -> Result<()> {
        if !candidate.is_video() {
            info!("Rejected non-video file: {} ({})", candidate.file_name, candidate.content_type);
            return Err(VidsegError::UnsupportedMedia(candidate.file_name));
        }

        info!("Selected video: {}", candidate.file_name);
        self.candidate = Some(candidate);
        self.revalidate();
        Ok(())
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
        self.revalidate();
    }

    pub fn submit_enabled(&self) -> bool {
        self.submit_enabled
    }

    pub fn candidate(&self) -> Option<&UploadCandidate> {
        self.candidate.as_ref()
    }

    /// Snapshot of the inputs for submission, rechecked even when the affordance says yes
    pub fn submission(&self) -> Result<(UploadCandidate, String)> {
        let candidate = self
            .candidate
            .clone()
            .ok_or_else(|| VidsegError::Validation("No video file selected".to_string()))?;

        let prompt = self.prompt.trim();
        if prompt.is_empty() {
            return Err(VidsegError::Validation("Prompt is empty".to_string()));
        }

        Ok((candidate, prompt.to_string()))
    }

    fn revalidate(&mut self) {
        self.submit_enabled = InputValidator::permits(self.candidate.as_ref(), &self.prompt);
        debug!("Submit enabled: {}", self.submit_enabled);
    }
}
