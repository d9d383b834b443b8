use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::api::{endpoints, JobApi};
use crate::config::DownloadConfig;
use crate::error::Result;

/// A finished job bound to a playable location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultView {
    pub job_id: String,
    pub media_url: String,
}

/// Binds a finished job to the URL its media can be streamed from
#[derive(Debug, Clone)]
pub struct ResultPresenter {
    base_url: String,
}

impl ResultPresenter {
    pub fn new(base_url: &str) -> Self {
        Self { base_url: base_url.trim_end_matches('/').to_string() }
    }

    /// Use the reported reference, falling back to `/video/{job_id}.mp4`
    pub fn present(&self, job_id: &str, video_url: Option<&str>) -> ResultView {
        let reference = match video_url.filter(|u| !u.trim().is_empty()) {
            Some(url) => url.to_string(),
            None => endpoints::fallback_video(job_id),
        };

        ResultView {
            job_id: job_id.to_string(),
            media_url: self.resolve(&reference),
        }
    }

    fn resolve(&self, reference: &str) -> String {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            reference.to_string()
        } else if reference.starts_with('/') {
            format!("{}{}", self.base_url, reference)
        } else {
            format!("{}/{}", self.base_url, reference)
        }
    }
}

/// Saves the finished artifact next to (but distinct from) the source name
pub struct DownloadTrigger {
    api: Arc<dyn JobApi>,
    config: DownloadConfig,
}

impl DownloadTrigger {
    pub fn new(api: Arc<dyn JobApi>, config: DownloadConfig) -> Self {
        Self { api, config }
    }

    pub fn download_name(&self, original_name: &str) -> String {
        format!("{}{}", self.config.prefix, original_name)
    }

    pub fn destination(&self, original_name: &str, output_dir: Option<&Path>) -> PathBuf {
        let dir = output_dir
            .map(Path::to_path_buf)
            .or_else(|| self.config.output_dir.clone())
            .unwrap_or_else(|| PathBuf::from("."));
        dir.join(self.download_name(original_name))
    }

    pub async fn trigger(
        &self,
        job_id: &str,
        original_name: &str,
        output_dir: Option<&Path>,
    ) -> Result<PathBuf> {
        let destination = self.destination(original_name, output_dir);
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        info!("Downloading result of {} to {}", job_id, destination.display());
        let bytes = self.api.download(job_id, &destination).await?;
        info!("Saved {} bytes to {}", bytes, destination.display());

        Ok(destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockJobApi;

    #[test]
    fn test_present_uses_reported_url() {
        let presenter = ResultPresenter::new("http://localhost:5001/");
        let view = presenter.present("abc123", Some("/results/abc123.mp4"));
        assert_eq!(view.media_url, "http://localhost:5001/results/abc123.mp4");
        assert_eq!(view.job_id, "abc123");
    }

    #[test]
    fn test_present_falls_back_to_job_video() {
        let presenter = ResultPresenter::new("http://localhost:5001");
        assert_eq!(
            presenter.present("abc123", None).media_url,
            "http://localhost:5001/video/abc123.mp4"
        );
        assert_eq!(
            presenter.present("abc123", Some("")).media_url,
            "http://localhost:5001/video/abc123.mp4"
        );
    }

    #[test]
    fn test_present_keeps_absolute_url() {
        let presenter = ResultPresenter::new("http://localhost:5001");
        let view = presenter.present("abc123", Some("https://cdn.example.com/abc123.mp4"));
        assert_eq!(view.media_url, "https://cdn.example.com/abc123.mp4");
    }

    #[tokio::test]
    async fn test_download_is_prefixed_and_targets_job() {
        let dir = tempfile::tempdir().unwrap();
        let mut api = MockJobApi::new();
        api.expect_download()
            .times(1)
            .returning(|job_id, destination| {
                assert_eq!(job_id, "abc123");
                assert!(destination.ends_with("segmented_clip.mp4"));
                Ok(42)
            });

        let trigger = DownloadTrigger::new(
            Arc::new(api),
            DownloadConfig { prefix: "segmented_".to_string(), output_dir: None },
        );
        let path = trigger.trigger("abc123", "clip.mp4", Some(dir.path())).await.unwrap();
        assert_eq!(path, dir.path().join("segmented_clip.mp4"));
    }
}
