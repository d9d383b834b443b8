//! Vidseg - Prompt-driven Video Segmentation Client
//!
//! This is the main entry point for the vidseg command-line client, which
//! uploads a video with a segmentation prompt, follows the job on the
//! backend and retrieves the processed result.

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tracing_appender::{non_blocking, rolling};

use vidseg::api::JobStatus;
use vidseg::cli::{Args, Commands};
use vidseg::config::Config;
use vidseg::input::{content_type_for, InputValidator, UploadCandidate};
use vidseg::view::TerminalView;
use vidseg::workflow::Workflow;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Setup logging to both console and file
    setup_logging(args.verbose)?;
    info!("Starting vidseg - Prompt-driven Video Segmentation Client");

    // Load configuration
    let config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            // Try to load vidseg.toml from current directory first
            if std::path::Path::new("vidseg.toml").exists() {
                info!("Found vidseg.toml in current directory, loading...");
                Config::from_file("vidseg.toml")?
            } else {
                Config::default()
            }
        }
    };

    match args.command {
        Commands::Process { input, prompt, download, output_dir } => {
            info!("Processing video file: {}", input.display());

            let workflow = Workflow::new(config)?;
            let mut session = workflow.session(Box::new(TerminalView::new()));

            session.select_file(UploadCandidate::from_path(&input)?)?;
            session.set_prompt(prompt);
            if !session.form().submit_enabled() {
                anyhow::bail!("A video file and a non-empty prompt are required");
            }

            let interrupt = async {
                if tokio::signal::ctrl_c().await.is_err() {
                    std::future::pending::<()>().await;
                }
            };
            let result = workflow.process(&mut session, interrupt).await?;
            info!("Job {} completed: {}", result.job_id, result.media_url);

            if download {
                let path = workflow.download_result(&session, output_dir.as_deref()).await?;
                println!("Saved processed video to {}", path.display());
            }
        }
        Commands::Status { job_id } => {
            let workflow = Workflow::new(config)?;
            let status = workflow.status(&job_id).await?;

            match status.status {
                JobStatus::Pending => println!("{}: pending", job_id),
                JobStatus::Completed => println!(
                    "{}: completed ({})",
                    job_id,
                    status.video_url.as_deref().unwrap_or("no video url")
                ),
                JobStatus::Failed => println!(
                    "{}: failed ({})",
                    job_id,
                    status.error.as_deref().unwrap_or("unknown error")
                ),
            }
        }
        Commands::Download { job_id, name, output_dir } => {
            let workflow = Workflow::new(config)?;
            let path = workflow.download(&job_id, &name, output_dir.as_deref()).await?;
            println!("Saved processed video to {}", path.display());
        }
        Commands::Check { input, prompt } => {
            let content_type = content_type_for(&input);
            let candidate = UploadCandidate::from_path(&input)
                .ok()
                .filter(|c| c.is_video());

            println!("{:<12} {}", "File", input.display());
            println!("{:<12} {}", "Type", content_type);
            println!("{:<12} {:?}", "Prompt", prompt.trim());

            if InputValidator::permits(candidate.as_ref(), &prompt) {
                println!("Submission permitted");
            } else {
                anyhow::bail!("Submission not permitted: a video file and a non-empty prompt are required");
            }
        }
        Commands::InitConfig { path } => {
            config.save_to_file(&path)?;
            println!("Wrote configuration to {}", path.display());
        }
    }

    info!("vidseg finished successfully");
    Ok(())
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = std::env::current_dir()?.join(".vidseg").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(&log_dir, "vidseg.log");
    let (non_blocking_file, _guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(_guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    // Console output goes to stderr so it does not interleave with results on stdout
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(verbose)
        .with_line_number(verbose);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer);

    subscriber.try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized - console: {}, file: {}",
          log_level, log_dir.join("vidseg.log").display());

    Ok(())
}
