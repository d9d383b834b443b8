//! Ownership of the timers belonging to one processing episode.
//!
//! Every submission opens a new [`Episode`] with its own [`CancelToken`] and
//! [`SessionTimers`]. Background tasks carry the [`EpisodeId`] they were
//! started for, so anything they report after the episode has ended can be
//! recognised as stale and dropped.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::debug;

/// Identity of one submission-to-terminal-outcome cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EpisodeId(pub u64);

impl fmt::Display for EpisodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "episode-{}", self.0)
    }
}

/// Cooperative cancellation flag shared between an episode and its tasks
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<TokenState>,
}

#[derive(Debug, Default)]
struct TokenState {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Progress,
    Poll,
}

/// The periodic handles of an episode, at most one per kind
#[derive(Debug, Default)]
pub struct SessionTimers {
    progress: Option<JoinHandle<()>>,
    poll: Option<JoinHandle<()>>,
}

impl SessionTimers {
    /// Install a handle, aborting any previous handle of the same kind
    pub fn install(&mut self, kind: TimerKind, handle: JoinHandle<()>) {
        let slot = self.slot(kind);
        if let Some(previous) = slot.replace(handle) {
            debug!("Replacing active {:?} timer", kind);
            previous.abort();
        }
    }

    /// Abort one kind of timer; returns whether a handle was present
    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        match self.slot(kind).take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) -> usize {
        [TimerKind::Progress, TimerKind::Poll]
            .into_iter()
            .filter(|kind| self.cancel(*kind))
            .count()
    }

    /// Handles still installed and not yet finished
    pub fn active_count(&self) -> usize {
        [&self.progress, &self.poll]
            .into_iter()
            .flatten()
            .filter(|h| !h.is_finished())
            .count()
    }

    pub fn is_active(&self, kind: TimerKind) -> bool {
        let slot = match kind {
            TimerKind::Progress => &self.progress,
            TimerKind::Poll => &self.poll,
        };
        slot.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn slot(&mut self, kind: TimerKind) -> &mut Option<JoinHandle<()>> {
        match kind {
            TimerKind::Progress => &mut self.progress,
            TimerKind::Poll => &mut self.poll,
        }
    }
}

/// One processing episode: its identity, cancellation token and timers
#[derive(Debug)]
pub struct Episode {
    pub id: EpisodeId,
    pub token: CancelToken,
    pub timers: SessionTimers,
}

impl Episode {
    pub fn new(id: EpisodeId) -> Self {
        Self {
            id,
            token: CancelToken::new(),
            timers: SessionTimers::default(),
        }
    }

    /// Cancel the token and abort every timer. Safe to call repeatedly.
    pub fn cancel(&mut self) -> usize {
        self.token.cancel();
        let aborted = self.timers.cancel_all();
        if aborted > 0 {
            debug!("{}: aborted {} timer(s)", self.id, aborted);
        }
        aborted
    }
}

impl Drop for Episode {
    fn drop(&mut self) {
        self.cancel();
    }
}
