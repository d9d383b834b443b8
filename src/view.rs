// Rendering surface of a session
//
// The session never prints directly; it drives a SessionView:
// - TerminalView: indicatif progress bar plus stdout/stderr messages
// - RecordingView (tests): captures every call for assertions

use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use crate::present::ResultView;
use crate::progress::ProgressState;

/// Which section of the interface is visible
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    Input,
    Processing,
    Result,
}

pub trait SessionView: Send {
    /// Enable or disable the submission action
    fn set_submit_enabled(&mut self, enabled: bool);

    /// Switch the visible section
    fn show(&mut self, mode: ViewMode);

    /// Redraw the progress indicator
    fn update_progress(&mut self, progress: &ProgressState);

    /// Bind the finished media to the playable view
    fn bind_result(&mut self, result: &ResultView);

    /// Tell the user something went wrong
    fn alert(&mut self, message: &str);
}

pub struct TerminalView {
    bar: Option<ProgressBar>,
    style: ProgressStyle,
}

impl TerminalView {
    pub fn new() -> Self {
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");

        Self { bar: None, style }
    }

    fn clear_bar(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

impl Default for TerminalView {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionView for TerminalView {
    fn set_submit_enabled(&mut self, _enabled: bool) {}

    fn show(&mut self, mode: ViewMode) {
        match mode {
            ViewMode::Processing => {
                self.clear_bar();
                let bar = ProgressBar::new(100);
                bar.set_style(self.style.clone());
                self.bar = Some(bar);
            }
            ViewMode::Input | ViewMode::Result => self.clear_bar(),
        }
    }

    fn update_progress(&mut self, progress: &ProgressState) {
        if let Some(bar) = &self.bar {
            bar.set_position(progress.percent as u64);
            bar.set_message(progress.phase.label());
        }
    }

    fn bind_result(&mut self, result: &ResultView) {
        println!("Processed video for job {}: {}", result.job_id, result.media_url);
    }

    fn alert(&mut self, message: &str) {
        warn!("{}", message);
        match &self.bar {
            Some(bar) => bar.println(message),
            None => eprintln!("{}", message),
        }
    }
}
