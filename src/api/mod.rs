// Backend job API
//
// This module describes the HTTP contract with the segmentation backend:
// - Wire types for the upload and status endpoints
// - JobApi: the seam the workflow talks through
// - Http: reqwest implementation of JobApi

pub mod http;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use http::*;

use crate::config::ServerConfig;
use crate::error::Result;
use crate::input::UploadCandidate;

/// Response of `POST /api/upload`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl UploadResponse {
    pub fn accepted(job_id: impl Into<String>) -> Self {
        Self {
            success: true,
            job_id: Some(job_id.into()),
            ..Default::default()
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Job status as reported by the backend; anything unrecognised counts as still pending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Completed,
    Failed,
    #[serde(other)]
    Pending,
}

/// Response of `GET /api/status/{job_id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: JobStatus,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl StatusResponse {
    pub fn pending() -> Self {
        Self { status: JobStatus::Pending, video_url: None, error: None }
    }

    pub fn completed(video_url: Option<&str>) -> Self {
        Self {
            status: JobStatus::Completed,
            video_url: video_url.map(str::to_string),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { status: JobStatus::Failed, video_url: None, error: Some(error.into()) }
    }
}

/// A job accepted by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    /// Present only once completed
    pub result_url: Option<String>,
    /// Present only once failed
    pub error: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl Job {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Pending,
            result_url: None,
            error: None,
            submitted_at: Utc::now(),
        }
    }

    pub fn complete(&mut self, result_url: Option<String>) {
        self.status = JobStatus::Completed;
        self.result_url = result_url;
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
    }

    /// Wall-clock time since the backend accepted the job
    pub fn elapsed(&self) -> chrono::Duration {
        Utc::now().signed_duration_since(self.submitted_at)
    }
}

/// Main trait for talking to the segmentation backend
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobApi: Send + Sync {
    /// Create a job from a video and prompt
    async fn submit(&self, candidate: &UploadCandidate, prompt: &str) -> Result<UploadResponse>;

    /// Query the status of a job
    async fn status(&self, job_id: &str) -> Result<StatusResponse>;

    /// Fetch the finished artifact into `destination`, returning the byte count
    async fn download(&self, job_id: &str, destination: &Path) -> Result<u64>;
}

/// Factory for creating job API clients
pub struct JobApiFactory;

impl JobApiFactory {
    /// Create the default HTTP-backed client
    pub fn create_client(config: ServerConfig) -> Result<Box<dyn JobApi>> {
        Ok(Box::new(http::HttpJobApi::new(config)?))
    }
}

/// Endpoint paths of the backend contract
pub mod endpoints {
    pub const UPLOAD: &str = "/api/upload";

    pub fn status(job_id: &str) -> String {
        format!("/api/status/{}", job_id)
    }

    pub fn download(job_id: &str) -> String {
        format!("/api/download/{}", job_id)
    }

    pub fn fallback_video(job_id: &str) -> String {
        format!("/video/{}.mp4", job_id)
    }
}
