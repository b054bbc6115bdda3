//! mediagrab - download media through yt-dlp from a browser
//!
//! A user submits a URL and an output mode, polls the job's progress, then
//! fetches the produced file once. Downloading and transcoding are left to
//! yt-dlp; this crate keeps track of jobs, runs them in the background and
//! hands the result back over HTTP.

pub mod cli;
pub mod config;
pub mod extractors;
pub mod jobs;
pub mod server;
pub mod tasks;
pub mod utils;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use extractors::{MediaExtractor, Mode, YtDlpExtractor};
pub use jobs::JobRunner;
pub use tasks::{MemoryTaskStore, Task, TaskId, TaskStatus, TaskStore};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Error types specific to mediagrab
#[derive(thiserror::Error, Debug)]
pub enum MediaGrabError {
    #[error("Invalid mode: {0}")]
    InvalidMode(String),

    /// Failure reported by the extraction tool, carrying its own message
    #[error("{0}")]
    Extraction(String),

    #[error("no output file produced")]
    NoArtifact,

    #[error("no such task")]
    NotFound,

    #[error("Not ready")]
    NotReady,
}
