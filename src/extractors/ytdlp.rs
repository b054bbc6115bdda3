use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use super::progress::{parse_line, LineEvent};
use super::{ExtractionOutcome, ExtractionRequest, MediaExtractor, Mode, ProgressSender};
use crate::config::DownloadConfig;
use crate::{MediaGrabError, Result};

/// Extractor driving the `yt-dlp` command line tool
pub struct YtDlpExtractor {
    yt_dlp_path: String,
    /// Arguments placed before everything else, e.g. `-m yt_dlp` for a python launcher
    base_args: Vec<String>,
    merge_format: String,
    audio_format: String,
    audio_quality: String,
}

impl YtDlpExtractor {
    pub fn new() -> Self {
        Self::from_config(&DownloadConfig::default())
    }

    pub fn from_config(config: &DownloadConfig) -> Self {
        Self {
            yt_dlp_path: config.yt_dlp_path.clone(),
            base_args: config.yt_dlp_args.clone(),
            merge_format: config.merge_format.clone(),
            audio_format: config.audio_format.clone(),
            audio_quality: config.audio_quality.clone(),
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.yt_dlp_path);
        command.args(&self.base_args);
        command
    }

    /// Check if yt-dlp is available
    pub async fn check_availability(&self) -> bool {
        self.command()
            .arg("--version")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    /// Get media information without downloading anything
    async fn get_media_info(&self, url: &str) -> Result<Value> {
        tracing::debug!("Extracting media info for: {}", url);

        let output = self
            .command()
            .args(["--dump-single-json", "--flat-playlist", url])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.yt_dlp_path))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MediaGrabError::Extraction(error_message(&stderr, output.status)).into());
        }

        let info: Value = serde_json::from_slice(&output.stdout)
            .context("Failed to parse yt-dlp metadata")?;

        Ok(info)
    }

    /// Format selection and post-processing arguments for a mode
    pub fn mode_args(&self, mode: Mode) -> Vec<String> {
        let args: Vec<&str> = match mode {
            Mode::Combined => vec![
                "--format",
                "bestvideo+bestaudio/best",
                "--merge-output-format",
                self.merge_format.as_str(),
            ],
            Mode::AudioOnly => vec![
                "--format",
                "bestaudio/best",
                "--extract-audio",
                "--audio-format",
                self.audio_format.as_str(),
                "--audio-quality",
                self.audio_quality.as_str(),
            ],
            Mode::VideoOnly => vec!["--format", "bestvideo[ext=mp4]/bestvideo"],
        };
        args.into_iter().map(String::from).collect()
    }

    /// Full argument list for the download run
    pub fn download_args(&self, request: &ExtractionRequest) -> Vec<String> {
        let template = request.output_dir.join("%(title)s.%(ext)s");

        let mut args = vec![
            "--newline".to_string(),
            "--output".to_string(),
            template.to_string_lossy().into_owned(),
            "--encoding".to_string(),
            "utf-8".to_string(),
        ];
        args.extend(self.mode_args(request.mode));
        args.push(request.url.clone());
        args
    }

    async fn download(
        &self,
        request: &ExtractionRequest,
        progress: &ProgressSender,
    ) -> Result<Option<PathBuf>> {
        let args = self.download_args(request);
        tracing::debug!("Running {} {}", self.yt_dlp_path, args.join(" "));

        let mut child = self
            .command()
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to run {}", self.yt_dlp_path))?;

        let stdout = child.stdout.take().context("yt-dlp stdout not captured")?;
        let mut stderr = child.stderr.take().context("yt-dlp stderr not captured")?;

        // stderr is collected on its own task while stdout is streamed
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            String::from_utf8_lossy(&buf).into_owned()
        });

        let mut downloaded: Option<PathBuf> = None;
        let mut postprocessed: Option<PathBuf> = None;

        // Titles may arrive in a non-UTF-8 console encoding
        let mut lines = BufReader::new(stdout).split(b'\n');
        while let Some(raw) = lines.next_segment().await.context("Failed to read yt-dlp output")? {
            let line = String::from_utf8_lossy(&raw);
            for event in parse_line(line.trim_end_matches('\r')) {
                match event {
                    LineEvent::Progress(event) => {
                        // The receiver only goes away when the job was abandoned
                        let _ = progress.send(event);
                    }
                    LineEvent::Output(path) => downloaded = Some(path),
                    LineEvent::FinalOutput(path) => postprocessed = Some(path),
                }
            }
        }

        let status = child.wait().await.context("Failed to wait for yt-dlp")?;
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(MediaGrabError::Extraction(error_message(&stderr, status)).into());
        }

        Ok(postprocessed.or(downloaded))
    }
}

impl Default for YtDlpExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaExtractor for YtDlpExtractor {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn extract(
        &self,
        request: &ExtractionRequest,
        progress: ProgressSender,
    ) -> Result<ExtractionOutcome> {
        let info = self.get_media_info(&request.url).await?;

        let title = info["title"].as_str().map(|s| s.to_string());
        let entries = match info["_type"].as_str() {
            Some("playlist") => info["entries"].as_array().map_or(0, |e| e.len()),
            _ => 1,
        };

        let reported = self.download(request, &progress).await?;

        // A reported path only identifies the artifact for a single entry
        let artifact = reported.filter(|path| entries == 1 && path.is_file());

        Ok(ExtractionOutcome {
            title,
            artifact,
            entries,
        })
    }
}

/// The tool's own error text: its `ERROR:` lines, else all of stderr
fn error_message(stderr: &str, status: ExitStatus) -> String {
    let errors: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("ERROR"))
        .collect();

    if !errors.is_empty() {
        return errors.join("\n");
    }

    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("yt-dlp exited with {}", status)
    } else {
        stderr.to_string()
    }
}
