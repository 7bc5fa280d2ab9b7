//! Probe module for reading source video metrics.
//!
//! Runs the configured ffprobe binary against the first playlist item to learn
//! the canvas size and frame rate the stream should be configured with.

use playout_daemon_config::{parse_ratio, FrameRate};
use std::path::Path;
use std::process::Command;
use thiserror::Error;

/// Error type for probe operations.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// ffprobe ran but exited unsuccessfully.
    #[error("ffprobe failed: {0}")]
    FfprobeFailed(String),

    /// ffprobe output could not be interpreted.
    #[error("Failed to parse ffprobe output: {0}")]
    ParseError(String),

    /// ffprobe could not be started.
    #[error("Failed to run ffprobe: {0}")]
    Io(#[from] std::io::Error),
}

/// Metrics of the first video stream of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: FrameRate,
}

/// Raw ffprobe JSON structures for parsing.
mod ffprobe_json {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct FfprobeOutput {
        pub streams: Option<Vec<Stream>>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Stream {
        pub width: Option<u32>,
        pub height: Option<u32>,
        pub r_frame_rate: Option<String>,
    }
}

/// Probes the first video stream of `path` with the ffprobe at `ffprobe`.
pub fn probe_video(ffprobe: &str, path: &Path) -> Result<VideoInfo, ProbeError> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,r_frame_rate",
            "-of",
            "json",
        ])
        .arg(path)
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProbeError::FfprobeFailed(format!(
            "ffprobe exited with status {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_ffprobe_output(&stdout)
}

/// Parses ffprobe JSON output into a VideoInfo.
///
/// Width and height are required; a missing or unusable `r_frame_rate`
/// falls back to 24/1.
pub fn parse_ffprobe_output(json_str: &str) -> Result<VideoInfo, ProbeError> {
    let ffprobe: ffprobe_json::FfprobeOutput =
        serde_json::from_str(json_str).map_err(|e| ProbeError::ParseError(e.to_string()))?;

    let stream = ffprobe
        .streams
        .and_then(|streams| streams.into_iter().next())
        .ok_or_else(|| ProbeError::ParseError("No video stream in ffprobe output".to_string()))?;

    let width = stream
        .width
        .filter(|w| *w > 0)
        .ok_or_else(|| ProbeError::ParseError("Missing video width".to_string()))?;
    let height = stream
        .height
        .filter(|h| *h > 0)
        .ok_or_else(|| ProbeError::ParseError("Missing video height".to_string()))?;

    let fps = stream
        .r_frame_rate
        .as_deref()
        .and_then(parse_ratio)
        .unwrap_or(FrameRate::FALLBACK);

    Ok(VideoInfo { width, height, fps })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ntsc_stream() {
        let json = r#"{"programs":[],"streams":[{"width":1920,"height":1080,"r_frame_rate":"30000/1001"}]}"#;
        let info = parse_ffprobe_output(json).unwrap();
        assert_eq!(info.width, 1920);
        assert_eq!(info.height, 1080);
        assert_eq!(info.fps, FrameRate { num: 30000, den: 1001 });
    }

    #[test]
    fn test_missing_or_bad_frame_rate_defaults() {
        for rate in [r#""#, r#","r_frame_rate":"0/0""#, r#","r_frame_rate":"n/a""#] {
            let json = format!(r#"{{"streams":[{{"width":1280,"height":720{}}}]}}"#, rate);
            let info = parse_ffprobe_output(&json).unwrap();
            assert_eq!(info.fps, FrameRate::FALLBACK, "input: {}", json);
        }
    }

    #[test]
    fn test_missing_dimensions_is_error() {
        let json = r#"{"streams":[{"height":720,"r_frame_rate":"25/1"}]}"#;
        assert!(matches!(
            parse_ffprobe_output(json),
            Err(ProbeError::ParseError(_))
        ));
    }

    #[test]
    fn test_no_streams_is_error() {
        assert!(parse_ffprobe_output(r#"{"streams":[]}"#).is_err());
        assert!(parse_ffprobe_output(r#"{}"#).is_err());
        assert!(parse_ffprobe_output("not json").is_err());
    }

    #[test]
    fn test_missing_binary_is_io_error() {
        let result = probe_video(
            "/nonexistent/ffprobe-for-playout-tests",
            Path::new("/nonexistent.mkv"),
        );
        assert!(matches!(result, Err(ProbeError::Io(_))));
    }
}
