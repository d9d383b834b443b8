use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{multipart, Client, Response};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{Result, VidsegError};
use crate::input::UploadCandidate;
use super::{endpoints, JobApi, StatusResponse, UploadResponse};

/// reqwest-backed client for the segmentation backend
pub struct HttpJobApi {
    client: Client,
    base_url: String,
    // whole-request deadline for status queries only; transfers of full-size
    // videos are bounded by the connect timeout alone
    status_timeout: Duration,
}

impl HttpJobApi {
    pub fn new(config: ServerConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(timeout)
            .build()
            .map_err(VidsegError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            status_timeout: timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Pull the `error` field out of a non-2xx JSON body, if there is one
    async fn error_detail(response: Response) -> String {
        let status = response.status();
        match response.json::<serde_json::Value>().await {
            Ok(body) => body
                .get("error")
                .and_then(|e| e.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {}", status)),
            Err(_) => format!("HTTP {}", status),
        }
    }

    /// Stream the body into `temp_path`, then move it over `destination`
    async fn write_body(
        mut response: Response,
        temp_path: &Path,
        destination: &Path,
        pb: &ProgressBar,
    ) -> Result<u64> {
        let mut file = fs::File::create(temp_path).await?;

        let mut downloaded = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            pb.set_position(downloaded);
        }

        file.flush().await?;
        drop(file);

        fs::rename(temp_path, destination).await?;
        Ok(downloaded)
    }
}

#[async_trait]
impl JobApi for HttpJobApi {
    async fn submit(&self, candidate: &UploadCandidate, prompt: &str) -> Result<UploadResponse> {
        let (file, length) = candidate.open().await?;
        info!("Uploading {} ({} bytes)", candidate.file_name, length);

        let part = multipart::Part::stream_with_length(file, length)
            .file_name(candidate.file_name.clone())
            .mime_str(&candidate.content_type)
            .map_err(|e| VidsegError::Submission(format!("Invalid content type: {}", e)))?;
        let form = multipart::Form::new()
            .part("video", part)
            .text("prompt", prompt.to_string());

        let response = self
            .client
            .post(self.url(endpoints::UPLOAD))
            .multipart(form)
            .send()
            .await
            .map_err(|e| VidsegError::Submission(format!("Failed to reach backend: {}", e)))?;

        if !response.status().is_success() {
            return Ok(UploadResponse::rejected(Self::error_detail(response).await));
        }

        response
            .json::<UploadResponse>()
            .await
            .map_err(|e| VidsegError::Submission(format!("Malformed upload response: {}", e)))
    }

    async fn status(&self, job_id: &str) -> Result<StatusResponse> {
        let response = self
            .client
            .get(self.url(&endpoints::status(job_id)))
            .timeout(self.status_timeout)
            .send()
            .await
            .map_err(|e| VidsegError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(VidsegError::Transport(Self::error_detail(response).await));
        }

        let body = response
            .json::<StatusResponse>()
            .await
            .map_err(|e| VidsegError::Transport(format!("Malformed status response: {}", e)))?;

        debug!("Status of {}: {:?}", job_id, body.status);
        Ok(body)
    }

    async fn download(&self, job_id: &str, destination: &Path) -> Result<u64> {
        let response = self.client.get(self.url(&endpoints::download(job_id))).send().await?;

        if !response.status().is_success() {
            return Err(VidsegError::Transport(Self::error_detail(response).await));
        }

        let pb = ProgressBar::new(response.content_length().unwrap_or(0));
        pb.set_style(ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .map_err(|e| VidsegError::Config(format!("Invalid progress template: {}", e)))?
            .progress_chars("#>-"));

        let temp_path = destination.with_extension("part");
        match Self::write_body(response, &temp_path, destination, &pb).await {
            Ok(downloaded) => {
                pb.finish_with_message(format!("Downloaded {}", destination.display()));
                Ok(downloaded)
            }
            Err(e) => {
                pb.abandon();
                if let Err(cleanup) = fs::remove_file(&temp_path).await {
                    debug!("Could not remove {}: {}", temp_path.display(), cleanup);
                }
                warn!("Download of {} failed: {}", job_id, e);
                Err(e)
            }
        }
    }
}
