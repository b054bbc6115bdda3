use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "mediagrab",
    about = "mediagrab - download video or audio from media sites through yt-dlp",
    version,
    long_about = "A small web app that downloads media through yt-dlp. Submit a URL and a mode from the browser, watch the progress bar, and the finished file is handed back once. The same job runner is available from the command line."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (default: ./config.yaml, then the user config dir)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the web app
    Serve {
        /// Address to listen on (overrides the config file)
        #[arg(short, long, value_name = "ADDR")]
        bind: Option<SocketAddr>,

        /// Listen on 0.0.0.0 with this port
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,
    },

    /// Download a single URL from the command line
    Fetch {
        /// Media page URL
        url: String,

        /// Output mode: combined, audio_only or video_only
        #[arg(short, long, default_value = "combined")]
        mode: String,

        /// Directory the finished file is moved to
        #[arg(short, long, value_name = "DIR", default_value = ".")]
        output: PathBuf,
    },

    /// Check that yt-dlp and ffmpeg are available
    Check,

    /// Show the configuration file location and contents
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },
}

/// Effective listen address: `--bind`, then `PORT`, then the config file
pub fn bind_address(
    bind: Option<SocketAddr>,
    port: Option<u16>,
    configured: SocketAddr,
) -> SocketAddr {
    match (bind, port) {
        (Some(addr), _) => addr,
        (None, Some(port)) => SocketAddr::from(([0, 0, 0, 0], port)),
        (None, None) => configured,
    }
}
