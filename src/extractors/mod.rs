use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tokio::sync::mpsc;
use url::Url;

pub mod progress;
pub mod ytdlp;

pub use progress::ProgressEvent;
pub use ytdlp::YtDlpExtractor;

use crate::{MediaGrabError, Result};

/// Requested output shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Best video and best audio merged into one container
    Combined,
    /// Best audio stream, converted to the configured audio codec
    AudioOnly,
    /// Best video-only stream
    VideoOnly,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Combined => "combined",
            Mode::AudioOnly => "audio_only",
            Mode::VideoOnly => "video_only",
        }
    }
}

impl FromStr for Mode {
    type Err = MediaGrabError;

    /// Also accepts the short form names used by the web form (`video`, `audio`)
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "combined" | "video" => Ok(Mode::Combined),
            "audio_only" | "audio" => Ok(Mode::AudioOnly),
            "video_only" => Ok(Mode::VideoOnly),
            _ => Err(MediaGrabError::InvalidMode(s.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container formats we know how to label when delivering a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFormat {
    Mp3,
    M4a,
    Opus,
    Wav,
    Flac,
    Ogg,
    Mp4,
    Webm,
    Mkv,
}

impl MediaFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "mp3" => Some(MediaFormat::Mp3),
            "m4a" | "aac" => Some(MediaFormat::M4a),
            "opus" => Some(MediaFormat::Opus),
            "wav" => Some(MediaFormat::Wav),
            "flac" => Some(MediaFormat::Flac),
            "ogg" => Some(MediaFormat::Ogg),
            "mp4" | "m4v" => Some(MediaFormat::Mp4),
            "webm" => Some(MediaFormat::Webm),
            "mkv" => Some(MediaFormat::Mkv),
            _ => None,
        }
    }

    /// Get MIME type for the format
    pub fn mime_type(&self) -> &'static str {
        match self {
            MediaFormat::Mp3 => "audio/mpeg",
            MediaFormat::M4a => "audio/mp4",
            MediaFormat::Opus => "audio/opus",
            MediaFormat::Wav => "audio/wav",
            MediaFormat::Flac => "audio/flac",
            MediaFormat::Ogg => "audio/ogg",
            MediaFormat::Mp4 => "video/mp4",
            MediaFormat::Webm => "video/webm",
            MediaFormat::Mkv => "video/x-matroska",
        }
    }
}

/// Content type for a delivered file, `application/octet-stream` when unknown
pub fn content_type_for_extension(ext: &str) -> &'static str {
    MediaFormat::from_extension(ext)
        .map(|format| format.mime_type())
        .unwrap_or("application/octet-stream")
}

/// One extraction job as seen by an extractor
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub url: String,
    pub mode: Mode,
    /// Dedicated directory the extractor must write into
    pub output_dir: PathBuf,
}

/// Metadata reported by the extractor once it finished
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionOutcome {
    /// Title reported by the source
    pub title: Option<String>,

    /// Final file path, if the extractor could tell
    pub artifact: Option<PathBuf>,

    /// Number of entries produced (more than one for playlists)
    pub entries: usize,
}

pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressEvent>;

pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Boundary to the external media library.
///
/// Implementations download `request.url` into `request.output_dir`, report
/// transfer progress on `progress`, and fail with the library's own message.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Name of the extractor (for logging)
    fn name(&self) -> &'static str;

    async fn extract(
        &self,
        request: &ExtractionRequest,
        progress: ProgressSender,
    ) -> Result<ExtractionOutcome>;
}

/// Validate and normalize URLs
pub fn validate_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url.trim())
        .map_err(|_| anyhow::anyhow!("Invalid URL format: {}", url))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("URL must use HTTP or HTTPS protocol");
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("combined".parse::<Mode>().unwrap(), Mode::Combined);
        assert_eq!("video".parse::<Mode>().unwrap(), Mode::Combined);
        assert_eq!("audio_only".parse::<Mode>().unwrap(), Mode::AudioOnly);
        assert_eq!("Audio".parse::<Mode>().unwrap(), Mode::AudioOnly);
        assert_eq!("video_only".parse::<Mode>().unwrap(), Mode::VideoOnly);
    }

    #[test]
    fn test_invalid_mode() {
        let err = "subtitles".parse::<Mode>().unwrap_err();
        assert_eq!(err.to_string(), "Invalid mode: subtitles");
        assert!("".parse::<Mode>().is_err());
    }

    #[test]
    fn test_content_type() {
        assert_eq!(content_type_for_extension("mp3"), "audio/mpeg");
        assert_eq!(content_type_for_extension(".MP4"), "video/mp4");
        assert_eq!(content_type_for_extension("bin"), "application/octet-stream");
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://example.com/watch?v=abc").is_ok());
        assert!(validate_url("  http://example.com  ").is_ok());
        assert!(validate_url("ftp://example.com").is_err());
        assert!(validate_url("not-a-url").is_err());
    }
}
