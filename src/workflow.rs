use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::api::{JobApi, JobApiFactory, StatusResponse};
use crate::config::Config;
use crate::episode::{EpisodeId, TimerKind};
use crate::error::{Result, VidsegError};
use crate::poller::StatusPoller;
use crate::present::{DownloadTrigger, ResultPresenter, ResultView};
use crate::progress::ProgressSimulator;
use crate::session::{Session, SessionEvent, Transition};
use crate::submitter::JobSubmitter;
use crate::view::SessionView;

pub struct Workflow {
    config: Config,
    api: Arc<dyn JobApi>,
}

impl Workflow {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let api: Arc<dyn JobApi> = Arc::from(JobApiFactory::create_client(config.server.clone())?);
        Ok(Self::with_api(config, api))
    }

    /// Build a workflow over an existing API client
    pub fn with_api(config: Config, api: Arc<dyn JobApi>) -> Self {
        Self { config, api }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A fresh session rendering into `view`
    pub fn session(&self, view: Box<dyn SessionView>) -> Session {
        Session::new(ResultPresenter::new(&self.config.server.base_url), view)
    }

    /// Run one processing episode from submission to a terminal outcome.
    ///
    /// Resolving `interrupt` performs a user reset and yields `Cancelled`.
    /// On every error path the session has already been reset.
    pub async fn process<F>(&self, session: &mut Session, interrupt: F) -> Result<ResultView>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(interrupt);

        let (episode, candidate, prompt) = session.begin_submission()?;
        let token = session
            .episode_token()
            .ok_or_else(|| VidsegError::Validation("Episode was not opened".to_string()))?;
        let (events, mut inbox) = mpsc::unbounded_channel::<SessionEvent>();

        // the simulator runs while the upload is still in flight
        let simulator = ProgressSimulator::new(self.config.progress.clone());
        let handle = simulator.spawn(episode, token.clone(), events.clone());
        session.install_timer(episode, TimerKind::Progress, handle);

        let submitter = JobSubmitter::new(self.api.clone());
        let submission = submitter.submit(&candidate, &prompt);
        tokio::pin!(submission);

        let job = loop {
            tokio::select! {
                result = &mut submission => match result {
                    Ok(job) => break job,
                    Err(e) => {
                        session.submission_failed(episode, &e);
                        return Err(e);
                    }
                },
                Some(event) = inbox.recv() => {
                    session.handle_event(event);
                }
                _ = &mut interrupt => return Err(Self::cancel(session, episode)),
            }
        };

        let job_id = job.id.clone();
        session.submission_succeeded(episode, job)?;

        let poller = StatusPoller::new(self.api.clone(), self.config.polling.clone());
        let handle = poller.spawn(episode, job_id.clone(), token, events.clone());
        session.install_timer(episode, TimerKind::Poll, handle);

        loop {
            tokio::select! {
                Some(event) = inbox.recv() => match session.handle_event(event) {
                    Transition::Ignored | Transition::Progressed => {}
                    Transition::Failed(e) => return Err(e),
                    Transition::AwaitingPresentation { video_url } => {
                        tokio::select! {
                            _ = tokio::time::sleep(self.config.polling.display_delay()) => {}
                            _ = &mut interrupt => return Err(Self::cancel(session, episode)),
                        }
                        return session
                            .present_result(episode, video_url.as_deref())
                            .ok_or(VidsegError::Cancelled);
                    }
                },
                _ = &mut interrupt => return Err(Self::cancel(session, episode)),
            }
        }
    }

    /// Download the artifact of the session's completed job
    pub async fn download_result(&self, session: &Session, output_dir: Option<&Path>) -> Result<PathBuf> {
        let (job_id, file_name) = session.download_target().ok_or_else(|| {
            VidsegError::Validation("No processed video is available to download".to_string())
        })?;
        self.download(&job_id, &file_name, output_dir).await
    }

    pub async fn download(&self, job_id: &str, original_name: &str, output_dir: Option<&Path>) -> Result<PathBuf> {
        DownloadTrigger::new(self.api.clone(), self.config.download.clone())
            .trigger(job_id, original_name, output_dir)
            .await
    }

    /// One status query, outside of any episode
    pub async fn status(&self, job_id: &str) -> Result<StatusResponse> {
        self.api.status(job_id).await
    }

    fn cancel(session: &mut Session, episode: EpisodeId) -> VidsegError {
        warn!("{}: interrupted by user", episode);
        session.reset();
        info!("Session reset after interrupt");
        VidsegError::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MockJobApi, UploadResponse};
    use crate::input::UploadCandidate;
    use crate::session::SessionState;
    use crate::view::testing::RecordingView;
    use crate::view::ViewMode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    fn clip() -> UploadCandidate {
        UploadCandidate::new(PathBuf::from("clip.mp4"), "clip.mp4".to_string(), "video/mp4".to_string())
    }

    fn workflow(api: MockJobApi) -> Workflow {
        Workflow::with_api(Config::default(), Arc::new(api))
    }

    fn ready_session(workflow: &Workflow) -> (Session, RecordingView) {
        let view = RecordingView::default();
        let mut session = workflow.session(Box::new(view.clone()));
        session.select_file(clip()).unwrap();
        session.set_prompt("segment the dog");
        (session, view)
    }

    fn never() -> std::future::Pending<()> {
        std::future::pending()
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_then_completed() {
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();

        let mut api = MockJobApi::new();
        api.expect_submit()
            .times(1)
            .returning(|_, _| Ok(UploadResponse::accepted("abc123")));
        api.expect_status().returning(move |job_id| {
            assert_eq!(job_id, "abc123");
            if counter.fetch_add(1, Ordering::SeqCst) < 5 {
                Ok(StatusResponse::pending())
            } else {
                Ok(StatusResponse::completed(Some("/results/abc123.mp4")))
            }
        });

        let workflow = workflow(api);
        let (mut session, view) = ready_session(&workflow);

        let started = Instant::now();
        let result = workflow.process(&mut session, never()).await.unwrap();

        assert_eq!(result.media_url, "http://localhost:5001/results/abc123.mp4");
        assert_eq!(polls.load(Ordering::SeqCst), 6);
        // five pending responses at 2s each, then the 500ms display delay
        assert_eq!(started.elapsed(), Duration::from_millis(10_500));

        let percents = view.percents();
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(percents.last(), Some(&100));
        assert!(percents[..percents.len() - 1].iter().all(|p| *p < 95));
        assert_eq!(view.last_mode(), Some(ViewMode::Result));
        assert_eq!(session.active_timers(), 0);
        assert!(matches!(session.state(), SessionState::Completed { .. }));

        // nothing keeps ticking once completed
        let calls = view.calls().len();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(view.calls().len(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_without_url_uses_fallback() {
        let mut api = MockJobApi::new();
        api.expect_submit().returning(|_, _| Ok(UploadResponse::accepted("abc123")));
        api.expect_status().returning(|_| Ok(StatusResponse::completed(None)));

        let workflow = workflow(api);
        let (mut session, _) = ready_session(&workflow);
        let result = workflow.process(&mut session, never()).await.unwrap();
        assert_eq!(result.media_url, "http://localhost:5001/video/abc123.mp4");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_returns_to_input() {
        let mut api = MockJobApi::new();
        api.expect_submit().returning(|_, _| Ok(UploadResponse::accepted("abc123")));
        api.expect_status().returning(|_| Ok(StatusResponse::failed("decode error")));

        let workflow = workflow(api);
        let (mut session, view) = ready_session(&workflow);
        let err = workflow.process(&mut session, never()).await.unwrap_err();

        assert!(matches!(err, VidsegError::JobFailed(_)));
        assert!(view.alerts().iter().any(|a| a.contains("decode error")));
        assert_eq!(view.last_mode(), Some(ViewMode::Input));
        assert_eq!(session.active_timers(), 0);
        assert_eq!(session.progress().percent, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_submission_never_polls() {
        let mut api = MockJobApi::new();
        api.expect_submit()
            .returning(|_, _| Ok(UploadResponse::rejected("unsupported codec")));
        api.expect_status().never();

        let workflow = workflow(api);
        let (mut session, view) = ready_session(&workflow);
        let err = workflow.process(&mut session, never()).await.unwrap_err();

        assert!(matches!(err, VidsegError::Submission(_)));
        assert_eq!(view.alerts(), vec!["Error: unsupported codec".to_string()]);
        assert_eq!(view.last_mode(), Some(ViewMode::Input));
        assert_eq!(session.active_timers(), 0);
        assert!(session.current_episode().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_while_polling_resets() {
        let mut api = MockJobApi::new();
        api.expect_submit().returning(|_, _| Ok(UploadResponse::accepted("abc123")));
        api.expect_status()
            .times(1)
            .returning(|_| Err(VidsegError::Transport("connection reset".to_string())));

        let workflow = workflow(api);
        let (mut session, view) = ready_session(&workflow);
        let err = workflow.process(&mut session, never()).await.unwrap_err();

        assert!(matches!(err, VidsegError::Transport(_)));
        assert!(view.alerts()[0].starts_with("Error checking processing status"));
        assert_eq!(session.active_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_cancels_both_timers() {
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();

        let mut api = MockJobApi::new();
        api.expect_submit().returning(|_, _| Ok(UploadResponse::accepted("abc123")));
        api.expect_status().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(StatusResponse::pending())
        });

        let workflow = workflow(api);
        let (mut session, view) = ready_session(&workflow);
        let err = workflow
            .process(&mut session, tokio::time::sleep(Duration::from_millis(5_100)))
            .await
            .unwrap_err();

        assert!(matches!(err, VidsegError::Cancelled));
        assert_eq!(session.active_timers(), 0);
        assert_eq!(session.state(), &SessionState::Idle);
        assert_eq!(view.last_mode(), Some(ViewMode::Input));

        let polled = polls.load(Ordering::SeqCst);
        let calls = view.calls().len();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(polls.load(Ordering::SeqCst), polled);
        assert_eq!(view.calls().len(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_episode_after_failure_is_isolated() {
        let submissions = Arc::new(AtomicUsize::new(0));
        let counter = submissions.clone();

        let mut api = MockJobApi::new();
        api.expect_submit().returning(move |_, _| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Ok(UploadResponse::accepted(format!("job-{}", n)))
        });
        api.expect_status().returning(|job_id| {
            if job_id == "job-0" {
                Ok(StatusResponse::failed("decode error"))
            } else {
                Ok(StatusResponse::completed(None))
            }
        });

        let workflow = workflow(api);
        let (mut session, _) = ready_session(&workflow);
        assert!(workflow.process(&mut session, never()).await.is_err());

        let result = workflow.process(&mut session, never()).await.unwrap();
        assert_eq!(result.job_id, "job-1");
        assert_eq!(
            session.download_target(),
            Some(("job-1".to_string(), "clip.mp4".to_string()))
        );
    }

    #[tokio::test]
    async fn test_download_requires_completed_job() {
        let mut api = MockJobApi::new();
        api.expect_download().never();

        let workflow = workflow(api);
        let (session, _) = ready_session(&workflow);
        let err = workflow.download_result(&session, None).await.unwrap_err();
        assert!(matches!(err, VidsegError::Validation(_)));
    }
}
