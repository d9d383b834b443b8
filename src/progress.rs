use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use crate::config::ProgressConfig;
use crate::episode::{CancelToken, EpisodeId};
use crate::session::{EventKind, SessionEvent};

pub const COMPLETE_PERCENT: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    Waiting,
    ExtractingFrames,
    ApplyingMasks,
    GeneratingVideo,
    Finalizing,
    Complete,
}

impl Phase {
    /// Narrative phase for a simulated percentage
    pub fn for_percent(percent: u8) -> Self {
        match percent {
            0 => Self::Waiting,
            1..=29 => Self::ExtractingFrames,
            30..=59 => Self::ApplyingMasks,
            60..=89 => Self::GeneratingVideo,
            90..=99 => Self::Finalizing,
            _ => Self::Complete,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Waiting => "Uploading video...",
            Self::ExtractingFrames => "Extracting frames...",
            Self::ApplyingMasks => "Applying segmentation masks...",
            Self::GeneratingVideo => "Generating segmented video...",
            Self::Finalizing => "Finalizing...",
            Self::Complete => "Complete!",
        }
    }
}

/// Displayed, locally simulated progress. Advisory only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressState {
    pub percent: u8,
    pub phase: Phase,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self { percent: 0, phase: Phase::Waiting }
    }
}

impl ProgressState {
    pub fn complete() -> Self {
        Self { percent: COMPLETE_PERCENT, phase: Phase::Complete }
    }

    pub fn is_complete(&self) -> bool {
        self.percent >= COMPLETE_PERCENT
    }
}

/// Manufactures a plausible progress indicator while the backend reports only coarse status
#[derive(Debug, Clone)]
pub struct ProgressSimulator {
    config: ProgressConfig,
}

impl ProgressSimulator {
    pub fn new(config: ProgressConfig) -> Self {
        Self { config }
    }

    /// Highest value a running simulation may show
    pub fn cap(&self) -> u8 {
        self.config.ceiling.saturating_sub(1)
    }

    /// Apply one tick. Returns `false` once the cap is reached and ticking should stop.
    pub fn advance(&self, state: &mut ProgressState) -> bool {
        let cap = self.cap();
        if state.percent >= cap {
            return false;
        }

        state.percent = state.percent.saturating_add(self.config.step).min(cap);
        state.phase = Phase::for_percent(state.percent);
        state.percent < cap
    }

    /// Start ticking for `episode`, reporting every new state to `events`
    pub fn spawn(
        &self,
        episode: EpisodeId,
        token: CancelToken,
        events: UnboundedSender<SessionEvent>,
    ) -> JoinHandle<()> {
        let simulator = self.clone();
        let period = self.config.tick();

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut state = ProgressState::default();

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("{}: progress simulation cancelled at {}%", episode, state.percent);
                        return;
                    }
                    _ = ticker.tick() => {}
                }

                // a cancel racing the tick must still win
                if token.is_cancelled() {
                    return;
                }

                let keep_going = simulator.advance(&mut state);
                let event = SessionEvent { episode, kind: EventKind::Progress(state) };
                if events.send(event).is_err() || !keep_going {
                    debug!("{}: progress simulation stopped at {}%", episode, state.percent);
                    return;
                }
            }
        })
    }
}
