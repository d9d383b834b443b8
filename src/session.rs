//! Explicit state machine over one user session.
//!
//! A session moves `Idle → Submitting → Processing → Completed`, with any
//! failure ending in `Failed` after a full reset. Every background report
//! arrives as a [`SessionEvent`] tagged with the [`EpisodeId`] that produced
//! it; reports from any episode other than the current one are dropped, so a
//! tick or poll response that outlives a reset can never touch the view.

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::Job;
use crate::episode::{CancelToken, Episode, EpisodeId, TimerKind};
use crate::error::{ErrorKind, Result, VidsegError};
use crate::input::{FormState, UploadCandidate};
use crate::present::{ResultPresenter, ResultView};
use crate::progress::ProgressState;
use crate::view::{SessionView, ViewMode};

/// Terminal result of a polling run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Completed { video_url: Option<String> },
    Failed { error: String },
    TransportError { error: String },
    TimedOut { after_secs: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Progress(ProgressState),
    Poll(PollOutcome),
}

/// A report from a background task, tagged with its owning episode
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub episode: EpisodeId,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    Submitting { episode: EpisodeId },
    Processing { episode: EpisodeId, job: Job },
    Completed { job: Job, result: ResultView },
    Failed { error: String },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Submitting { .. } => "submitting",
            Self::Processing { .. } => "processing",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }

    fn episode(&self) -> Option<EpisodeId> {
        match self {
            Self::Submitting { episode } | Self::Processing { episode, .. } => Some(*episode),
            _ => None,
        }
    }
}

/// What the driver should do after an event was applied
#[derive(Debug)]
pub enum Transition {
    /// Stale or irrelevant event, nothing changed
    Ignored,
    /// Progress was redrawn
    Progressed,
    /// The job finished; present the result after the display delay
    AwaitingPresentation { video_url: Option<String> },
    /// The episode ended in failure and the session has been reset
    Failed(VidsegError),
}

pub struct Session {
    form: FormState,
    state: SessionState,
    progress: ProgressState,
    episode: Option<Episode>,
    next_episode: u64,
    presenter: ResultPresenter,
    view: Box<dyn SessionView>,
}

impl Session {
    pub fn new(presenter: ResultPresenter, view: Box<dyn SessionView>) -> Self {
        let mut session = Self {
            form: FormState::new(),
            state: SessionState::Idle,
            progress: ProgressState::default(),
            episode: None,
            next_episode: 1,
            presenter,
            view,
        };
        session.view.show(ViewMode::Input);
        session.view.set_submit_enabled(false);
        session
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn progress(&self) -> ProgressState {
        self.progress
    }

    pub fn form(&self) -> &FormState {
        &self.form
    }

    pub fn current_episode(&self) -> Option<EpisodeId> {
        self.episode.as_ref().map(|e| e.id)
    }

    pub fn episode_token(&self) -> Option<CancelToken> {
        self.episode.as_ref().map(|e| e.token.clone())
    }

    pub fn active_timers(&self) -> usize {
        self.episode.as_ref().map_or(0, |e| e.timers.active_count())
    }

    /// Select a file; non-video files are alerted and the previous selection kept
    pub fn select_file(&mut self, candidate: UploadCandidate) -> Result<()> {
        let result = self.form.select_file(candidate);
        if let Err(e) = &result {
            self.view.alert(&e.to_string());
        }
        self.view.set_submit_enabled(self.form.submit_enabled());
        result
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.form.set_prompt(prompt);
        self.view.set_submit_enabled(self.form.submit_enabled());
    }

    /// Open a new episode and switch to the processing view
    pub fn begin_submission(&mut self) -> Result<(EpisodeId, UploadCandidate, String)> {
        if let Some(episode) = self.state.episode() {
            return Err(VidsegError::Validation(format!(
                "A submission is already in progress ({})",
                episode
            )));
        }
        // gated silently: the submit action is disabled, nothing is alerted
        let (candidate, prompt) = self.form.submission()?;

        if matches!(self.state, SessionState::Completed { .. }) {
            self.reset();
        }

        let id = EpisodeId(self.next_episode);
        self.next_episode += 1;
        self.episode = Some(Episode::new(id));
        self.progress = ProgressState::default();

        self.view.show(ViewMode::Processing);
        self.view.update_progress(&self.progress);
        self.transition(SessionState::Submitting { episode: id });

        Ok((id, candidate, prompt))
    }

    /// Attach a timer to its episode; handles for any other episode are aborted
    pub fn install_timer(&mut self, episode: EpisodeId, kind: TimerKind, handle: JoinHandle<()>) -> bool {
        match self.episode.as_mut() {
            Some(current) if current.id == episode && !current.token.is_cancelled() => {
                if current.timers.is_active(kind) {
                    debug!("{}: replacing running {:?} timer", episode, kind);
                }
                current.timers.install(kind, handle);
                true
            }
            _ => {
                debug!("{}: refusing {:?} timer for a finished episode", episode, kind);
                handle.abort();
                false
            }
        }
    }

    pub fn submission_succeeded(&mut self, episode: EpisodeId, job: Job) -> Result<()> {
        if !matches!(&self.state, SessionState::Submitting { episode: current } if *current == episode) {
            return Err(VidsegError::Validation(format!(
                "{}: job accepted while session is {}",
                episode,
                self.state.name()
            )));
        }

        info!("{}: processing job {}", episode, job.id);
        self.transition(SessionState::Processing { episode, job });
        Ok(())
    }

    pub fn submission_failed(&mut self, episode: EpisodeId, error: &VidsegError) {
        if self.state.episode() != Some(episode) {
            debug!("{}: ignoring submission failure for a stale episode", episode);
            return;
        }
        self.fail(error);
    }

    /// Apply a background report
    pub fn handle_event(&mut self, event: SessionEvent) -> Transition {
        if self.state.episode() != Some(event.episode) {
            debug!("Dropping stale event from {}: {:?}", event.episode, event.kind);
            return Transition::Ignored;
        }

        match event.kind {
            EventKind::Progress(next) => {
                // only a real completion may move past the simulated range
                if next.is_complete() || next.percent < self.progress.percent {
                    return Transition::Ignored;
                }
                self.progress = next;
                self.view.update_progress(&self.progress);
                Transition::Progressed
            }
            EventKind::Poll(outcome) => self.apply_outcome(outcome),
        }
    }

    fn apply_outcome(&mut self, outcome: PollOutcome) -> Transition {
        let SessionState::Processing { job, .. } = &mut self.state else {
            return Transition::Ignored;
        };

        match outcome {
            PollOutcome::Completed { video_url } => {
                job.complete(video_url.clone());
                if let Some(episode) = self.episode.as_mut() {
                    episode.cancel();
                }
                self.progress = ProgressState::complete();
                self.view.update_progress(&self.progress);
                Transition::AwaitingPresentation { video_url }
            }
            PollOutcome::Failed { error } => {
                job.fail(error.as_str());
                let error = VidsegError::JobFailed(error);
                self.fail(&error);
                Transition::Failed(error)
            }
            PollOutcome::TransportError { error } => {
                let error = VidsegError::Transport(error);
                self.fail(&error);
                Transition::Failed(error)
            }
            PollOutcome::TimedOut { after_secs } => {
                let error = VidsegError::PollTimeout(after_secs);
                self.fail(&error);
                Transition::Failed(error)
            }
        }
    }

    /// Bind the finished job to the result view, if the episode is still current
    pub fn present_result(&mut self, episode: EpisodeId, video_url: Option<&str>) -> Option<ResultView> {
        let job = match &self.state {
            SessionState::Processing { episode: current, job } if *current == episode => job.clone(),
            _ => {
                debug!("{}: result arrived after the episode ended", episode);
                return None;
            }
        };

        let result = self.presenter.present(&job.id, video_url);
        self.view.show(ViewMode::Result);
        self.view.bind_result(&result);
        info!(
            "{}: job {} finished in {}s, result bound to {}",
            episode,
            job.id,
            job.elapsed().num_seconds(),
            result.media_url
        );

        // the episode's timers were cancelled on completion; nothing of it outlives presentation
        self.episode = None;
        self.transition(SessionState::Completed { job, result: result.clone() });
        Some(result)
    }

    /// Job id and source filename, available only once a result is bound
    pub fn download_target(&self) -> Option<(String, String)> {
        match &self.state {
            SessionState::Completed { job, .. } => {
                let name = self.form.candidate()?.file_name.clone();
                Some((job.id.clone(), name))
            }
            _ => None,
        }
    }

    /// Cancel every timer and return to the input view. Safe to call at any time.
    pub fn reset(&mut self) {
        if let Some(mut episode) = self.episode.take() {
            episode.cancel();
            debug!("{}: torn down", episode.id);
        }

        self.progress = ProgressState::default();
        self.view.update_progress(&self.progress);
        self.view.show(ViewMode::Input);
        self.view.set_submit_enabled(self.form.submit_enabled());

        if !matches!(self.state, SessionState::Idle | SessionState::Failed { .. }) {
            self.transition(SessionState::Idle);
        }
    }

    fn fail(&mut self, error: &VidsegError) {
        match error.kind() {
            // missing inputs are gated by the disabled submit action, never alerted
            ErrorKind::Validation => debug!("Episode aborted: {}", error),
            _ => {
                warn!("Episode failed: {}", error);
                self.view.alert(&error.to_string());
            }
        }
        self.reset();
        self.transition(SessionState::Failed { error: error.to_string() });
    }

    fn transition(&mut self, next: SessionState) {
        debug!("Session {} -> {}", self.state.name(), next.name());
        self.state = next;
    }
}
