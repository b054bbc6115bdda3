//! Parsing of yt-dlp's `--newline` console output.
//!
//! Each stdout line is classified into either a progress event or a hint
//! about where the final file ended up.

use lazy_static::lazy_static;
use regex::Regex;
use std::path::PathBuf;

lazy_static! {
    // [download]  12.5% of ~ 310.04MiB at  374.36KiB/s ETA 11:59 (frag 56/454)
    static ref PROGRESS_RE: Regex = Regex::new(r"^\[download\]\s+(\d+(?:\.\d+)?)%").unwrap();
    static ref DEST_RE: Regex = Regex::new(r"^\[download\]\s+Destination:\s+(.+)$").unwrap();
    static ref ALREADY_RE: Regex =
        Regex::new(r"^\[download\]\s+(.+?) has already been downloaded").unwrap();
    static ref MERGE_RE: Regex =
        Regex::new(r#"^\[Merger\]\s+Merging formats into "(.+)"$"#).unwrap();
    static ref EXTRACT_AUDIO_RE: Regex =
        Regex::new(r"^\[ExtractAudio\]\s+Destination:\s+(.+)$").unwrap();
    static ref POSTPROCESS_RE: Regex =
        Regex::new(r"^\[(?:Merger|ExtractAudio|VideoConvertor|VideoRemuxer|Fixup\w*)\]").unwrap();
}

/// Progress reported by an extractor while it works
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressEvent {
    /// Transfer in progress, percentage as the library reports it
    Downloading { percent: f64 },
    /// The transfer phase is over
    Finished,
}

/// What a single output line tells us
#[derive(Debug, Clone, PartialEq)]
pub enum LineEvent {
    Progress(ProgressEvent),
    /// A file the tool is writing or has written
    Output(PathBuf),
    /// A post-processed file replacing the downloaded one
    FinalOutput(PathBuf),
}

/// Classify one line of yt-dlp stdout. A line can carry several facts, e.g.
/// the merger line both ends the transfer phase and names the final file.
pub fn parse_line(line: &str) -> Vec<LineEvent> {
    let line = line.trim();
    let mut events = Vec::new();

    if let Some(caps) = PROGRESS_RE.captures(line) {
        if let Ok(percent) = caps[1].parse::<f64>() {
            events.push(LineEvent::Progress(ProgressEvent::Downloading { percent }));
            if percent >= 100.0 {
                events.push(LineEvent::Progress(ProgressEvent::Finished));
            }
        }
        return events;
    }

    if let Some(caps) = DEST_RE.captures(line) {
        events.push(LineEvent::Output(PathBuf::from(&caps[1])));
        return events;
    }

    if let Some(caps) = ALREADY_RE.captures(line) {
        events.push(LineEvent::Progress(ProgressEvent::Finished));
        events.push(LineEvent::Output(PathBuf::from(&caps[1])));
        return events;
    }

    if POSTPROCESS_RE.is_match(line) {
        events.push(LineEvent::Progress(ProgressEvent::Finished));
        if let Some(caps) = MERGE_RE.captures(line) {
            events.push(LineEvent::FinalOutput(PathBuf::from(&caps[1])));
        } else if let Some(caps) = EXTRACT_AUDIO_RE.captures(line) {
            events.push(LineEvent::FinalOutput(PathBuf::from(&caps[1])));
        }
    }

    events
}

/// Normalize a reported percentage to an integer in 0..=100.
///
/// Fractions are truncated, out of range values clamped, and non-finite
/// values rejected.
pub fn normalize_percent(percent: f64) -> Option<u8> {
    if !percent.is_finite() {
        return None;
    }
    Some(percent.clamp(0.0, 100.0).trunc() as u8)
}
