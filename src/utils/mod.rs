use anyhow::Result;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::extractors::YtDlpExtractor;

/// Characters that are not allowed in file names on at least one platform
const ILLEGAL_FILENAME_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Name used when a title sanitizes down to nothing
pub const FALLBACK_TITLE: &str = "download";

/// Format file size in human-readable format
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let unit_index = (bytes_f.log10() / THRESHOLD.log10()).floor() as usize;
    let unit_index = unit_index.min(UNITS.len() - 1);

    let size = bytes_f / THRESHOLD.powi(unit_index as i32);

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Sanitize a media title into a filename stem
pub fn sanitize_filename(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| !ILLEGAL_FILENAME_CHARS.contains(c) && !c.is_control())
        .collect();

    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        FALLBACK_TITLE.to_string()
    } else {
        cleaned.to_string()
    }
}

/// ASCII-only rendition of a filename for the plain `filename=` header parameter
pub fn ascii_filename(name: &str) -> String {
    let ascii: String = name
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
        .filter(|c| *c != '"' && *c != '\\')
        .collect();

    if ascii.trim().is_empty() {
        FALLBACK_TITLE.to_string()
    } else {
        ascii
    }
}

/// Name a delivered file after its title, keeping the artifact's extension
pub fn download_filename(title: Option<&str>, artifact: &Path) -> String {
    let title = title.unwrap_or(FALLBACK_TITLE);
    match artifact.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if !ext.is_empty() => format!("{}.{}", title, ext),
        _ => title.to_string(),
    }
}

/// The largest regular file directly inside `dir`, if any
pub fn largest_file_in(dir: &Path) -> Result<Option<PathBuf>> {
    let mut largest: Option<(u64, PathBuf)> = None;

    for entry in fs_err::read_dir(dir)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }

        let size = metadata.len();
        let is_larger = largest.as_ref().map_or(true, |(best, _)| size > *best);
        if is_larger {
            largest = Some((size, entry.path()));
        }
    }

    Ok(largest.map(|(_, path)| path))
}

/// Remove a job directory, tolerating one that is already gone
pub async fn remove_job_dir(dir: &Path) {
    if let Err(error) = tokio::fs::remove_dir_all(dir).await {
        if error.kind() != ErrorKind::NotFound {
            tracing::warn!("Failed to remove job directory {}: {}", dir.display(), error);
        }
    }
}

/// Move `source` into `dest_dir` as `file_name`, copying when a rename
/// cannot cross filesystems
pub fn move_artifact(source: &Path, dest_dir: &Path, file_name: &str) -> Result<PathBuf> {
    fs_err::create_dir_all(dest_dir)?;
    let destination = dest_dir.join(file_name);

    if fs_err::rename(source, &destination).is_err() {
        fs_err::copy(source, &destination)?;
        fs_err::remove_file(source)?;
    }

    Ok(destination)
}

/// Check if the current environment has required tools
pub async fn check_dependencies(extractor: &YtDlpExtractor) -> Vec<String> {
    let mut missing = Vec::new();

    if !extractor.check_availability().await {
        missing.push("yt-dlp - required for every download".to_string());
    }

    // yt-dlp needs ffmpeg for merging and audio extraction
    if !check_command_available("ffmpeg", "-version").await {
        missing.push("ffmpeg - required for combined and audio-only modes".to_string());
    }

    missing
}

/// Check if a command is available in PATH
async fn check_command_available(command: &str, version_flag: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg(version_flag)
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}
