// atva (andrew's tool for video annotation)
// Copyright (C) 2025 Andrew Nissen

use crate::annotation::TAIL_WINDOW_SECONDS;
use crate::config::{AtvaConfig, ClipMode, Schema};
use crate::files;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Condvar, LazyLock, Mutex};

#[derive(Debug, thiserror::Error)]
pub enum ClipError {
    #[error("source video does not exist: {0}")]
    SourceMissing(PathBuf),
    #[error("failed to run ffmpeg: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("ffmpeg exited with {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
    #[error("ffmpeg reported success but wrote no output: {0}")]
    NoOutput(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClipRequest {
    pub source: PathBuf,
    pub start: f64,
    pub duration: f64,
    pub suffix: String,
}

/// Suffixes produced for an item, in display order.
pub fn preview_suffixes(mode: ClipMode) -> &'static [&'static str] {
    match mode {
        ClipMode::Single => &["preview"],
        ClipMode::HeadTail => &["head", "tail"],
    }
}

/// Clip requests for one source. The tail clip needs a known duration.
pub fn preview_plan(cfg: &AtvaConfig, source: &Path, duration: Option<f64>) -> Vec<ClipRequest> {
    match cfg.clip_mode {
        ClipMode::Single => vec![ClipRequest {
            source: source.to_path_buf(),
            start: 0.0,
            duration: cfg.preview_seconds as f64,
            suffix: "preview".to_string(),
        }],
        ClipMode::HeadTail => {
            let mut plan = vec![ClipRequest {
                source: source.to_path_buf(),
                start: 0.0,
                duration: cfg.head_seconds as f64,
                suffix: "head".to_string(),
            }];
            if let Some(duration) = duration.filter(|d| d.is_finite() && *d > 0.0) {
                let window = TAIL_WINDOW_SECONDS as f64;
                plan.push(ClipRequest {
                    source: source.to_path_buf(),
                    start: (duration - window).max(0.0),
                    duration: window,
                    suffix: "tail".to_string(),
                });
            }
            plan
        }
    }
}

fn output_extension(schema: Schema, source: &Path) -> String {
    match schema {
        Schema::Rich => "mp4".to_string(),
        Schema::Minimal => source
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .unwrap_or_else(|| "mp4".to_string()),
    }
}

/// `<parent>_<stem>_<suffix>.<ext>` inside `clip_dir`.
pub fn clip_output_path(clip_dir: &Path, schema: Schema, source: &Path, suffix: &str) -> PathBuf {
    let folder_name = source
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let extension = output_extension(schema, source);
    clip_dir.join(format!("{}_{}_{}.{}", folder_name, stem, suffix, extension))
}

/// True when every clip `source` can ever have is already on disk.
pub fn previews_exist(cfg: &AtvaConfig, clip_dir: &Path, source: &Path) -> bool {
    preview_suffixes(cfg.clip_mode)
        .iter()
        .all(|suffix| clip_output_path(clip_dir, cfg.schema, source, suffix).exists())
}

fn copy_args(request: &ClipRequest, output_path: &Path) -> Vec<String> {
    vec![
        "-y",
        "-ss",
        &format!("{}", request.start),
        "-i",
        &request.source.to_string_lossy(),
        "-t",
        &format!("{}", request.duration),
        "-map",
        "0",
        "-c",
        "copy",
        "-avoid_negative_ts",
        "make_zero",
        &output_path.to_string_lossy(),
    ]
    .into_iter()
    .map(|s| s.to_string())
    .collect()
}

fn reencode_args(request: &ClipRequest, output_path: &Path) -> Vec<String> {
    vec![
        "-y",
        "-ss",
        &format!("{}", request.start),
        "-i",
        &request.source.to_string_lossy(),
        "-t",
        &format!("{}", request.duration),
        "-an",
        "-sn",
        "-r",
        "25",
        "-vf",
        "scale=-2:480",
        "-c:v",
        "libx264",
        "-preset",
        "veryfast",
        "-pix_fmt",
        "yuv420p",
        "-movflags",
        "faststart",
        "-map_chapters",
        "-1",
        &output_path.to_string_lossy(),
    ]
    .into_iter()
    .map(|s| s.to_string())
    .collect()
}

pub fn ffmpeg_args(schema: Schema, request: &ClipRequest, output_path: &Path) -> Vec<String> {
    match schema {
        Schema::Minimal => copy_args(request, output_path),
        Schema::Rich => reencode_args(request, output_path),
    }
}

/// Outputs currently being cut by some thread of this process.
static CUTTING: LazyLock<(Mutex<HashSet<PathBuf>>, Condvar)> =
    LazyLock::new(|| (Mutex::new(HashSet::new()), Condvar::new()));

/// Releases a claimed output and wakes threads waiting on it.
struct CutClaim {
    output_path: PathBuf,
}

impl Drop for CutClaim {
    fn drop(&mut self) {
        let (lock, cvar) = &*CUTTING;
        lock.lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.output_path);
        cvar.notify_all();
    }
}

/// Waits for any running cut of `output_path`. Returns `None` when that cut
/// produced the file, otherwise a claim to cut it ourselves.
fn claim_output(output_path: &Path) -> Option<CutClaim> {
    let (lock, cvar) = &*CUTTING;
    let mut cutting = lock.lock().unwrap_or_else(|e| e.into_inner());
    while cutting.contains(output_path) {
        cutting = cvar.wait(cutting).unwrap_or_else(|e| e.into_inner());
    }
    if output_path.exists() {
        return None;
    }
    cutting.insert(output_path.to_path_buf());
    Some(CutClaim {
        output_path: output_path.to_path_buf(),
    })
}

/// `name.part.ext` next to the final clip. The extension stays last so
/// ffmpeg still picks the container from it.
pub fn partial_path(output_path: &Path) -> PathBuf {
    let stem = output_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = match output_path.extension() {
        Some(ext) => format!("{}.part.{}", stem, ext.to_string_lossy()),
        None => format!("{}.part", stem),
    };
    output_path.with_file_name(name)
}

pub fn is_partial(path: &Path) -> bool {
    path.file_stem()
        .map(|s| s.to_string_lossy().ends_with(".part"))
        .unwrap_or(false)
}

/// A finished clip that may be handed to a browser.
pub fn is_servable_clip(path: &Path, schema: Schema) -> bool {
    files::is_video_file(path, schema) && !is_partial(path)
}

/// Cuts `request` into `clip_dir` unless the output already exists.
///
/// ffmpeg writes to a `.part` file that is renamed into place on success,
/// so the final path only ever holds a complete clip. Concurrent callers
/// asking for the same output wait for the first cut instead of repeating it.
pub fn produce_clip(
    cfg: &AtvaConfig,
    clip_dir: &Path,
    request: &ClipRequest,
) -> Result<PathBuf, ClipError> {
    let output_path = clip_output_path(clip_dir, cfg.schema, &request.source, &request.suffix);
    if output_path.exists() {
        return Ok(output_path);
    }

    if !request.source.is_file() {
        return Err(ClipError::SourceMissing(request.source.clone()));
    }

    let Some(_claim) = claim_output(&output_path) else {
        return Ok(output_path);
    };

    fs::create_dir_all(clip_dir)?;
    let part_path = partial_path(&output_path);

    tracing::debug!(
        source = %request.source.display(),
        output = %output_path.display(),
        start = request.start,
        duration = request.duration,
        "cutting preview clip"
    );

    let output = Command::new(cfg.ffmpeg())
        .args(ffmpeg_args(cfg.schema, request, &part_path))
        .output()?;

    if !output.status.success() {
        let _ = fs::remove_file(&part_path);
        return Err(ClipError::Failed {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    if !part_path.exists() {
        return Err(ClipError::NoOutput(output_path));
    }

    fs::rename(&part_path, &output_path)?;
    Ok(output_path)
}
