use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::{JobApi, JobStatus};
use crate::config::PollingConfig;
use crate::episode::{CancelToken, EpisodeId};
use crate::session::{EventKind, PollOutcome, SessionEvent};

/// Queries job status at a fixed cadence until a terminal state is reached.
///
/// The next query is scheduled only after the previous response has arrived,
/// so at most one request is ever outstanding for a job.
pub struct StatusPoller {
    api: Arc<dyn JobApi>,
    config: PollingConfig,
}

impl StatusPoller {
    pub fn new(api: Arc<dyn JobApi>, config: PollingConfig) -> Self {
        Self { api, config }
    }

    pub fn spawn(
        self,
        episode: EpisodeId,
        job_id: String,
        token: CancelToken,
        events: UnboundedSender<SessionEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = token.cancelled() => None,
                outcome = self.run(&job_id, &token) => outcome,
            };

            match outcome {
                Some(outcome) if !token.is_cancelled() => {
                    let _ = events.send(SessionEvent { episode, kind: EventKind::Poll(outcome) });
                }
                _ => debug!("{}: polling for {} cancelled", episode, job_id),
            }
        })
    }

    /// Poll until a terminal outcome; `None` means the token was cancelled between polls
    pub async fn run(&self, job_id: &str, token: &CancelToken) -> Option<PollOutcome> {
        let started = Instant::now();
        let mut attempt = 0u64;
        let mut transport_failures = 0u32;

        loop {
            attempt += 1;
            debug!("Polling status of {} (attempt {})", job_id, attempt);

            match self.api.status(job_id).await {
                Ok(response) => {
                    transport_failures = 0;
                    match response.status {
                        JobStatus::Completed => {
                            info!("Job {} completed after {} poll(s)", job_id, attempt);
                            return Some(PollOutcome::Completed { video_url: response.video_url });
                        }
                        JobStatus::Failed => {
                            let error = response.error.unwrap_or_else(|| "Unknown error".to_string());
                            warn!("Job {} failed: {}", job_id, error);
                            return Some(PollOutcome::Failed { error });
                        }
                        JobStatus::Pending => {}
                    }
                }
                Err(e) => {
                    transport_failures += 1;
                    if transport_failures > self.config.transport_retries {
                        warn!("Status query for {} failed: {}", job_id, e);
                        return Some(PollOutcome::TransportError { error: e.to_string() });
                    }
                    warn!(
                        "Status query for {} failed ({}/{} retries): {}",
                        job_id, transport_failures, self.config.transport_retries, e
                    );
                }
            }

            if let Some(limit) = self.config.max_duration() {
                if started.elapsed() >= limit {
                    warn!("Job {} still pending after {:?}, giving up", job_id, limit);
                    return Some(PollOutcome::TimedOut { after_secs: limit.as_secs() });
                }
            }

            // cancellation is checked before every reschedule
            if token.is_cancelled() {
                return None;
            }
            tokio::select! {
                _ = token.cancelled() => return None,
                _ = tokio::time::sleep(self.config.interval()) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MockJobApi, StatusResponse};
    use crate::error::VidsegError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn polling() -> PollingConfig {
        PollingConfig {
            interval_ms: 2000,
            display_delay_ms: 500,
            max_duration_secs: None,
            transport_retries: 0,
        }
    }

    /// Mock that answers `pending` until call number `completes_on`
    fn pending_then_completed(completes_on: usize, calls: Arc<AtomicUsize>) -> MockJobApi {
        let mut api = MockJobApi::new();
        api.expect_status()
            .returning(move |job_id| {
                assert_eq!(job_id, "abc123");
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n >= completes_on {
                    Ok(StatusResponse::completed(Some("/results/abc123.mp4")))
                } else {
                    Ok(StatusResponse::pending())
                }
            });
        api
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_at_fixed_interval_until_completed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let api = pending_then_completed(4, calls.clone());
        let poller = StatusPoller::new(Arc::new(api), polling());

        let started = Instant::now();
        let outcome = poller.run("abc123", &CancelToken::new()).await;

        assert_eq!(
            outcome,
            Some(PollOutcome::Completed { video_url: Some("/results/abc123.mp4".to_string()) })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // three pending responses, each followed by one interval
        assert_eq!(started.elapsed(), Duration::from_millis(6000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_carries_error() {
        let mut api = MockJobApi::new();
        api.expect_status()
            .times(1)
            .returning(|_| Ok(StatusResponse::failed("decode error")));
        let poller = StatusPoller::new(Arc::new(api), polling());

        let outcome = poller.run("abc123", &CancelToken::new()).await;
        assert_eq!(outcome, Some(PollOutcome::Failed { error: "decode error".to_string() }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_is_terminal_by_default() {
        let mut api = MockJobApi::new();
        api.expect_status()
            .times(1)
            .returning(|_| Err(VidsegError::Transport("connection reset".to_string())));
        let poller = StatusPoller::new(Arc::new(api), polling());

        let outcome = poller.run("abc123", &CancelToken::new()).await;
        assert!(matches!(outcome, Some(PollOutcome::TransportError { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_retries_are_consecutive() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut api = MockJobApi::new();
        api.expect_status().returning(move |_| {
            match counter.fetch_add(1, Ordering::SeqCst) {
                0 => Err(VidsegError::Transport("blip".to_string())),
                1 => Ok(StatusResponse::pending()),
                2 => Err(VidsegError::Transport("blip".to_string())),
                _ => Ok(StatusResponse::completed(None)),
            }
        });
        let mut config = polling();
        config.transport_retries = 1;
        let poller = StatusPoller::new(Arc::new(api), config);

        let outcome = poller.run("abc123", &CancelToken::new()).await;
        assert_eq!(outcome, Some(PollOutcome::Completed { video_url: None }));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_duration_times_out() {
        let mut api = MockJobApi::new();
        api.expect_status().returning(|_| Ok(StatusResponse::pending()));
        let mut config = polling();
        config.max_duration_secs = Some(10);
        let poller = StatusPoller::new(Arc::new(api), config);

        let outcome = poller.run("abc123", &CancelToken::new()).await;
        assert_eq!(outcome, Some(PollOutcome::TimedOut { after_secs: 10 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_rescheduling() {
        let calls = Arc::new(AtomicUsize::new(0));
        let api = pending_then_completed(usize::MAX, calls.clone());
        let poller = StatusPoller::new(Arc::new(api), polling());
        let token = CancelToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handle = poller.spawn(EpisodeId(3), "abc123".to_string(), token.clone(), tx);
        tokio::time::sleep(Duration::from_millis(4500)).await;
        token.cancel();
        handle.await.unwrap();

        let polled = calls.load(Ordering::SeqCst);
        assert_eq!(polled, 3);
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), polled);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_reports_outcome_with_episode() {
        let calls = Arc::new(AtomicUsize::new(0));
        let api = pending_then_completed(2, calls);
        let poller = StatusPoller::new(Arc::new(api), polling());
        let (tx, mut rx) = mpsc::unbounded_channel();

        poller.spawn(EpisodeId(9), "abc123".to_string(), CancelToken::new(), tx).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.episode, EpisodeId(9));
        assert!(matches!(event.kind, EventKind::Poll(PollOutcome::Completed { .. })));
    }
}
