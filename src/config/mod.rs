use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings
    pub server: ServerConfig,

    /// yt-dlp and job settings
    pub download: DownloadConfig,

    /// Task retention
    pub tasks: TaskConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the web app listens on
    pub bind_address: SocketAddr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// yt-dlp executable
    pub yt_dlp_path: String,

    /// Extra arguments placed before all others (e.g. `["-m", "yt_dlp"]` with python3)
    pub yt_dlp_args: Vec<String>,

    /// Root for per-job directories (system temp dir if not set)
    pub download_dir: Option<PathBuf>,

    /// Container used when merging video and audio
    pub merge_format: String,

    /// Codec for audio-only downloads
    pub audio_format: String,

    /// Audio quality passed to yt-dlp (`0`-`10` or a bitrate like `192K`)
    pub audio_quality: String,

    /// Maximum jobs running at once, 0 for no limit
    pub max_concurrent_jobs: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Tasks older than this are swept with their files, 0 keeps them forever
    pub ttl_secs: u64,

    /// How often the sweeper runs
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 5000)),
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            yt_dlp_path: "yt-dlp".to_string(),
            yt_dlp_args: Vec::new(),
            download_dir: None,
            merge_format: "mp4".to_string(),
            audio_format: "mp3".to_string(),
            audio_quality: "192K".to_string(),
            max_concurrent_jobs: 0,
        }
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 0,
            sweep_interval_secs: 60,
        }
    }
}

impl DownloadConfig {
    /// Directory under which job directories are created
    pub fn download_root(&self) -> PathBuf {
        self.download_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

impl TaskConfig {
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_secs > 0).then(|| Duration::from_secs(self.ttl_secs))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl Config {
    /// Load configuration from file or create default
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = Self::resolve_path(path)?;

        if config_path.exists() {
            let config = Self::from_file(&config_path)?;
            tracing::debug!("Loaded configuration from {}", config_path.display());
            Ok(config)
        } else {
            let config = Self::default();
            config.save(&config_path).await?;
            tracing::info!("Wrote default configuration to {}", config_path.display());
            Ok(config)
        }
    }

    /// Read and validate a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs_err::read_to_string(path)
            .context("Failed to read config file")?;

        let config: Config = serde_yaml::from_str(&content)
            .context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs_err::create_dir_all(parent)?;
            }
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// The explicit path if given, otherwise the default location
    pub fn resolve_path(path: Option<&Path>) -> Result<PathBuf> {
        match path {
            Some(path) => Ok(path.to_path_buf()),
            None => Self::config_path(),
        }
    }

    /// Get configuration file path
    fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("mediagrab").join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.download.yt_dlp_path.trim().is_empty() {
            anyhow::bail!("download.yt_dlp_path must not be empty");
        }

        if self.download.merge_format.trim().is_empty()
            || self.download.audio_format.trim().is_empty()
        {
            anyhow::bail!("download.merge_format and download.audio_format must be set");
        }

        if self.tasks.ttl_secs > 0 && self.tasks.sweep_interval_secs == 0 {
            anyhow::bail!("tasks.sweep_interval_secs must be positive when tasks.ttl_secs is set");
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Bind Address: {}", self.server.bind_address);
        println!("  yt-dlp: {} {}", self.download.yt_dlp_path, self.download.yt_dlp_args.join(" "));
        println!("  Download Root: {}", self.download.download_root().display());
        println!("  Merge Format: {}", self.download.merge_format);
        println!(
            "  Audio: {} ({})",
            self.download.audio_format, self.download.audio_quality
        );
        match self.download.max_concurrent_jobs {
            0 => println!("  Max Concurrent Jobs: unlimited"),
            n => println!("  Max Concurrent Jobs: {}", n),
        }
        match self.tasks.ttl() {
            Some(ttl) => println!(
                "  Task TTL: {}s (sweep every {}s)",
                ttl.as_secs(),
                self.tasks.sweep_interval_secs
            ),
            None => println!("  Task TTL: never expire"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.bind_address.port(), 5000);
        assert_eq!(config.download.audio_format, "mp3");
        assert_eq!(config.download.max_concurrent_jobs, 0);
        assert!(config.tasks.ttl().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "download:\n  audio_format: opus\ntasks:\n  ttl_secs: 3600\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.download.audio_format, "opus");
        assert_eq!(config.download.yt_dlp_path, "yt-dlp");
        assert_eq!(config.tasks.ttl(), Some(Duration::from_secs(3600)));
        assert_eq!(config.tasks.sweep_interval_secs, 60);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.download.yt_dlp_path = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.tasks.ttl_secs = 10;
        config.tasks.sweep_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_load_creates_default_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let config = Config::load(Some(&path)).await.unwrap();
        assert!(path.exists());
        assert_eq!(config.download.merge_format, "mp4");

        let reloaded = Config::from_file(&path).unwrap();
        assert_eq!(reloaded.server.bind_address, config.server.bind_address);
    }
}
