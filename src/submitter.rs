use std::sync::Arc;
use tracing::{info, warn};

use crate::api::{Job, JobApi};
use crate::error::{Result, VidsegError};
use crate::input::UploadCandidate;

/// Packages the video and prompt into a job-creation request
pub struct JobSubmitter {
    api: Arc<dyn JobApi>,
}

impl JobSubmitter {
    pub fn new(api: Arc<dyn JobApi>) -> Self {
        Self { api }
    }

    /// Issue exactly one creation request; any failure is a submission error
    pub async fn submit(&self, candidate: &UploadCandidate, prompt: &str) -> Result<Job> {
        if !candidate.is_video() {
            return Err(VidsegError::UnsupportedMedia(candidate.file_name.clone()));
        }
        if prompt.trim().is_empty() {
            return Err(VidsegError::Validation("Prompt is empty".to_string()));
        }

        info!("Submitting {} with prompt {:?}", candidate.file_name, prompt);
        let response = self.api.submit(candidate, prompt).await.map_err(|e| match e {
            VidsegError::Submission(_) => e,
            other => VidsegError::Submission(other.to_string()),
        })?;

        if !response.success {
            let error = response.error.unwrap_or_else(|| "Upload was rejected".to_string());
            warn!("Submission rejected: {}", error);
            return Err(VidsegError::Submission(error));
        }

        match response.job_id.filter(|id| !id.trim().is_empty()) {
            Some(job_id) => {
                info!("Job {} accepted", job_id);
                Ok(Job::new(job_id))
            }
            None => Err(VidsegError::Submission(
                "Backend accepted the upload without a job id".to_string(),
            )),
        }
    }
}
