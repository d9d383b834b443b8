//! Vidseg - Prompt-driven Video Segmentation Client
//!
//! Submits a video and a text prompt to a segmentation backend, follows the
//! asynchronous job to completion while simulating progress locally, and
//! presents or downloads the processed result.

pub mod cli;
pub mod config;
pub mod workflow;
pub mod session;
pub mod input;
pub mod submitter;
pub mod api;
pub mod progress;
pub mod poller;
pub mod present;
pub mod view;
pub mod episode;
pub mod error;
