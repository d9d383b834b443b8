use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload a video with a prompt and follow the job to completion
    Process {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,

        /// What to segment, e.g. "the dog"
        #[arg(short, long)]
        prompt: String,

        /// Download the processed video once it is ready
        #[arg(short, long)]
        download: bool,

        /// Directory for the downloaded video
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Query the status of a job once
    Status {
        /// Job identifier returned on submission
        job_id: String,
    },

    /// Download the processed video of a completed job
    Download {
        /// Job identifier returned on submission
        job_id: String,

        /// Filename of the originally uploaded video
        #[arg(short, long)]
        name: String,

        /// Directory for the downloaded video
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Check whether a file and prompt would be accepted, without uploading
    Check {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,

        /// Segmentation prompt
        #[arg(short, long, default_value = "")]
        prompt: String,
    },

    /// Write the default configuration file
    InitConfig {
        /// Where to write the configuration
        #[arg(short, long, default_value = "vidseg.toml")]
        path: PathBuf,
    },
}
