use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::error::{Result, VidsegError};

// Defaults for optional policy fields
fn default_transport_retries() -> u32 {
    0
}

fn default_display_delay_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub polling: PollingConfig,
    pub progress: ProgressConfig,
    pub download: DownloadConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the segmentation backend
    pub base_url: String,
    /// Deadline for a status query; uploads and downloads only bound connection setup
    pub request_timeout_secs: u64,
    /// User agent sent with every request
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay between a status response and the next status query
    pub interval_ms: u64,
    /// How long the 100% state stays on screen before the result is shown
    #[serde(default = "default_display_delay_ms")]
    pub display_delay_ms: u64,
    /// Give up on a job that is still pending after this long (unbounded when absent)
    #[serde(default)]
    pub max_duration_secs: Option<u64>,
    /// Consecutive transport failures tolerated before the episode fails
    #[serde(default = "default_transport_retries")]
    pub transport_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Interval between simulated progress ticks
    pub tick_ms: u64,
    /// Percentage added on every tick
    pub step: u8,
    /// Simulated progress never reaches this value
    pub ceiling: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Prefix distinguishing the artifact from the uploaded source
    pub prefix: String,
    /// Where downloads are written (current directory when absent)
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                base_url: "http://localhost:5001".to_string(),
                request_timeout_secs: 300,
                user_agent: "vidseg/0.1.0".to_string(),
            },
            polling: PollingConfig {
                interval_ms: 2000,
                display_delay_ms: default_display_delay_ms(),
                max_duration_secs: None,
                transport_retries: default_transport_retries(),
            },
            progress: ProgressConfig {
                tick_ms: 500,
                step: 2,
                ceiling: 95,
            },
            download: DownloadConfig {
                prefix: "segmented_".to_string(),
                output_dir: None,
            },
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn display_delay(&self) -> Duration {
        Duration::from_millis(self.display_delay_ms)
    }

    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration_secs.map(Duration::from_secs)
    }
}

impl ProgressConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| VidsegError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| VidsegError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| VidsegError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| VidsegError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.base_url.trim().is_empty() {
            return Err(VidsegError::Config("server.base_url must not be empty".to_string()));
        }
        if self.polling.interval_ms == 0 {
            return Err(VidsegError::Config("polling.interval_ms must be positive".to_string()));
        }
        if self.progress.tick_ms == 0 {
            return Err(VidsegError::Config("progress.tick_ms must be positive".to_string()));
        }
        if self.progress.step == 0 {
            return Err(VidsegError::Config("progress.step must be positive".to_string()));
        }
        if !(1..=99).contains(&self.progress.ceiling) {
            return Err(VidsegError::Config(format!(
                "progress.ceiling must be between 1 and 99, got {}",
                self.progress.ceiling
            )));
        }
        Ok(())
    }
}
