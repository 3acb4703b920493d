// atva (andrew's tool for video annotation)
// Copyright (C) 2025 Andrew Nissen

use crate::config::AtvaConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("failed to run ffprobe: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("ffprobe exited with {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
    #[error("failed to parse ffprobe output: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Technical metadata of a file. Every field is independently optional.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct MediaInfo {
    pub size_mb: Option<f64>,
    pub duration: Option<f64>,
    pub fps: Option<f64>,
    /// The smaller of width and height.
    pub resolution: Option<u32>,
}

impl MediaInfo {
    pub fn duration_label(&self) -> Option<String> {
        let duration = self.duration?;
        let total = duration.max(0.0) as u64;
        Some(format!("{} min {} s", total / 60, total % 60))
    }
}

#[derive(Deserialize, Debug)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Deserialize, Debug)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Deserialize, Debug)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Parses fractions like "30/1" or "30000/1001" as well as plain numbers.
pub fn parse_frame_rate(rate: &str) -> Option<f64> {
    let rate = rate.trim();
    let value = match rate.split_once('/') {
        Some((numerator, denominator)) => {
            let numerator: f64 = numerator.trim().parse().ok()?;
            let denominator: f64 = denominator.trim().parse().ok()?;
            if denominator == 0.0 {
                return None;
            }
            numerator / denominator
        }
        None => rate.parse::<f64>().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

/// Extracts (duration, fps, resolution) from `ffprobe -print_format json` output.
pub fn parse_probe_output(json: &str) -> Result<(Option<f64>, Option<f64>, Option<u32>), ProbeError> {
    let output: FfprobeOutput = serde_json::from_str(json)?;
    let video = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));

    let duration = output
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or_else(|| video.and_then(|v| v.duration.as_deref()))
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0);

    let fps = video.and_then(|v| {
        v.r_frame_rate
            .as_deref()
            .and_then(parse_frame_rate)
            .or_else(|| v.avg_frame_rate.as_deref().and_then(parse_frame_rate))
    });

    let resolution = video.and_then(|v| match (v.width, v.height) {
        (Some(w), Some(h)) => Some(w.min(h)),
        _ => None,
    });

    Ok((duration, fps, resolution))
}

pub fn run_ffprobe(ffprobe_path: &Path, video_path: &Path) -> Result<String, ProbeError> {
    let output = Command::new(ffprobe_path)
        .args([
            "-v", "quiet",
            "-print_format", "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(video_path)
        .output()?;

    if !output.status.success() {
        return Err(ProbeError::Failed {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Never fails: whatever cannot be determined is left as `None`.
pub fn probe(cfg: &AtvaConfig, video_path: &Path) -> MediaInfo {
    let size_mb = fs::metadata(video_path)
        .ok()
        .map(|m| m.len() as f64 / (1024.0 * 1024.0));

    let mut info = MediaInfo {
        size_mb,
        ..MediaInfo::default()
    };

    match run_ffprobe(&cfg.ffprobe(), video_path).and_then(|json| parse_probe_output(&json)) {
        Ok((duration, fps, resolution)) => {
            info.duration = duration;
            info.fps = fps;
            info.resolution = resolution;
        }
        Err(e) => {
            tracing::warn!(path = %video_path.display(), error = %e, "probe failed");
        }
    }

    info
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "audio", "r_frame_rate": "0/0"},
            {"index": 1, "codec_type": "video", "width": 1920, "height": 1080,
             "r_frame_rate": "24000/1001", "avg_frame_rate": "24000/1001"}
        ],
        "format": {"duration": "2712.480000", "size": "1048576"}
    }"#;

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("abc"), None);
    }

    #[test]
    fn test_parse_probe_output_picks_video_stream() {
        let (duration, fps, resolution) = parse_probe_output(SAMPLE).unwrap();
        assert_eq!(duration, Some(2712.48));
        assert!((fps.unwrap() - 23.976).abs() < 0.001);
        assert_eq!(resolution, Some(1080));
    }

    #[test]
    fn test_portrait_resolution_is_width() {
        let json = r#"{"streams":[{"codec_type":"video","width":720,"height":1280,"r_frame_rate":"30/1"}],"format":{}}"#;
        let (duration, fps, resolution) = parse_probe_output(json).unwrap();
        assert_eq!(duration, None);
        assert_eq!(fps, Some(30.0));
        assert_eq!(resolution, Some(720));
    }

    #[test]
    fn test_garbage_output_is_an_error() {
        assert!(matches!(parse_probe_output("not json"), Err(ProbeError::Parse(_))));
    }

    #[test]
    fn test_probe_with_missing_tool_keeps_size() {
        let dir = tempfile::TempDir::new().unwrap();
        let video = dir.path().join("clip.mp4");
        std::fs::write(&video, vec![0u8; 2 * 1024 * 1024]).unwrap();
        let cfg = AtvaConfig {
            ffprobe_path: dir.path().join("no-ffprobe").to_string_lossy().to_string(),
            ..AtvaConfig::default()
        };

        let info = probe(&cfg, &video);
        assert_eq!(info.size_mb, Some(2.0));
        assert_eq!(info.duration, None);
        assert_eq!(info.fps, None);
        assert_eq!(info.resolution, None);
    }

    #[test]
    fn test_duration_label() {
        let info = MediaInfo {
            duration: Some(125.7),
            ..MediaInfo::default()
        };
        assert_eq!(info.duration_label().as_deref(), Some("2 min 5 s"));
        assert_eq!(MediaInfo::default().duration_label(), None);
    }
}
