// atva (andrew's tool for video annotation)
// Copyright (C) 2025 Andrew Nissen

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// How preview clips are cut for an item.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClipMode {
    /// One short preview from the start of the file.
    #[default]
    Single,
    /// Separate previews of the opening and of the last ten minutes.
    HeadTail,
}

/// Column layout of the annotation file.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Schema {
    Minimal,
    #[default]
    Rich,
}

impl FromStr for ClipMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(ClipMode::Single),
            "head_tail" => Ok(ClipMode::HeadTail),
            _ => Err(format!("Invalid clip mode: {} (expected single or head_tail)", s)),
        }
    }
}

impl fmt::Display for ClipMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClipMode::Single => write!(f, "single"),
            ClipMode::HeadTail => write!(f, "head_tail"),
        }
    }
}

impl FromStr for Schema {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minimal" => Ok(Schema::Minimal),
            "rich" => Ok(Schema::Rich),
            _ => Err(format!("Invalid schema: {} (expected minimal or rich)", s)),
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schema::Minimal => write!(f, "minimal"),
            Schema::Rich => write!(f, "rich"),
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_preview_seconds() -> u32 {
    10
}

fn default_head_seconds() -> u32 {
    300
}

fn default_true() -> bool {
    true
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AtvaConfig {
    #[serde(default)]
    pub ffmpeg_path: String,
    #[serde(default)]
    pub ffprobe_path: String,
    /// Plain text file listing one task directory per line.
    #[serde(default)]
    pub task_list_path: String,
    /// Task directories used when no task list is configured.
    #[serde(default)]
    pub root_dirs: Vec<String>,
    #[serde(default)]
    pub temp_dir: String,
    #[serde(default)]
    pub clip_mode: ClipMode,
    #[serde(default)]
    pub schema: Schema,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_preview_seconds")]
    pub preview_seconds: u32,
    #[serde(default = "default_head_seconds")]
    pub head_seconds: u32,
    #[serde(default = "default_true")]
    pub warm_on_start: bool,
}

impl Default for AtvaConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: String::new(),
            ffprobe_path: String::new(),
            task_list_path: String::new(),
            root_dirs: Vec::new(),
            temp_dir: String::new(),
            clip_mode: ClipMode::default(),
            schema: Schema::default(),
            workers: default_workers(),
            preview_seconds: default_preview_seconds(),
            head_seconds: default_head_seconds(),
            warm_on_start: true,
        }
    }
}

impl AtvaConfig {
    pub fn ffmpeg(&self) -> PathBuf {
        resolve_tool(&self.ffmpeg_path, "ffmpeg")
    }

    pub fn ffprobe(&self) -> PathBuf {
        resolve_tool(&self.ffprobe_path, "ffprobe")
    }

    pub fn temp_dir(&self) -> PathBuf {
        if !self.temp_dir.is_empty() {
            return PathBuf::from(&self.temp_dir);
        }
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home_dir.join(".atva").join("tmp")
    }

    /// Environment overrides are applied on top of the stored file and never written back.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(task_list) = std::env::var("ATVA_TASK_LIST")
            && !task_list.trim().is_empty()
        {
            self.task_list_path = task_list;
        }
        if let Ok(temp_dir) = std::env::var("ATVA_TEMP_DIR")
            && !temp_dir.trim().is_empty()
        {
            self.temp_dir = temp_dir;
        }
    }
}

fn resolve_tool(configured: &str, tool: &str) -> PathBuf {
    if !configured.is_empty() {
        return PathBuf::from(configured);
    }
    which::which(tool).unwrap_or_else(|_| PathBuf::from(tool))
}

pub fn load_stored_config() -> Result<AtvaConfig, confy::ConfyError> {
    if let Ok(config_path) = std::env::var("ATVA_CONFIG_PATH") {
        confy::load_path(&config_path)
    } else {
        confy::load("atva", "config")
    }
}

pub fn load_config() -> Result<AtvaConfig, confy::ConfyError> {
    let mut cfg = load_stored_config()?;
    cfg.apply_env_overrides();
    Ok(cfg)
}

pub fn store_config(config: &AtvaConfig) -> Result<(), confy::ConfyError> {
    if let Ok(config_path) = std::env::var("ATVA_CONFIG_PATH") {
        confy::store_path(&config_path, config)
    } else {
        confy::store("atva", "config", config)
    }
}

pub fn config_file_path() -> Result<PathBuf, confy::ConfyError> {
    if let Ok(config_path) = std::env::var("ATVA_CONFIG_PATH") {
        Ok(PathBuf::from(config_path))
    } else {
        confy::get_configuration_file_path("atva", "config")
    }
}

/// Creates `path` (and parents) and opens it up to the owning group.
pub fn ensure_shared_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o775))?;
        }
    }
    Ok(())
}

pub const CONFIG_FIELDS: &[&str] = &[
    "ffmpeg_path",
    "ffprobe_path",
    "task_list_path",
    "root_dirs",
    "temp_dir",
    "clip_mode",
    "schema",
    "workers",
    "preview_seconds",
    "head_seconds",
    "warm_on_start",
];

pub fn is_valid_config_field(field: &str) -> bool {
    CONFIG_FIELDS.contains(&field)
}

pub fn set_config_field(cfg: &mut AtvaConfig, field: &str, value: &str) -> Result<(), String> {
    match field {
        "ffmpeg_path" => cfg.ffmpeg_path = value.to_string(),
        "ffprobe_path" => cfg.ffprobe_path = value.to_string(),
        "task_list_path" => cfg.task_list_path = value.to_string(),
        "temp_dir" => cfg.temp_dir = value.to_string(),
        "root_dirs" => {
            // For root_dirs, treat the value as a single directory to add
            if !cfg.root_dirs.contains(&value.to_string()) {
                cfg.root_dirs.push(value.to_string());
            }
        }
        "clip_mode" => cfg.clip_mode = value.parse()?,
        "schema" => cfg.schema = value.parse()?,
        "workers" => {
            let workers = value
                .parse::<usize>()
                .map_err(|_| format!("Invalid number value for workers: {}", value))?;
            if workers == 0 {
                return Err("workers must be at least 1".to_string());
            }
            cfg.workers = workers;
        }
        "preview_seconds" => {
            cfg.preview_seconds = value
                .parse::<u32>()
                .map_err(|_| format!("Invalid number value for preview_seconds: {}", value))?;
        }
        "head_seconds" => {
            cfg.head_seconds = value
                .parse::<u32>()
                .map_err(|_| format!("Invalid number value for head_seconds: {}", value))?;
        }
        "warm_on_start" => {
            cfg.warm_on_start = value
                .parse::<bool>()
                .map_err(|_| format!("Invalid boolean value for warm_on_start: {}", value))?;
        }
        _ => return Err(format!("Unknown field: {}", field)),
    }
    Ok(())
}

pub fn unset_config_field(cfg: &mut AtvaConfig, field: &str) -> Result<(), String> {
    let defaults = AtvaConfig::default();
    match field {
        "ffmpeg_path" => cfg.ffmpeg_path = defaults.ffmpeg_path,
        "ffprobe_path" => cfg.ffprobe_path = defaults.ffprobe_path,
        "task_list_path" => cfg.task_list_path = defaults.task_list_path,
        "root_dirs" => cfg.root_dirs.clear(),
        "temp_dir" => cfg.temp_dir = defaults.temp_dir,
        "clip_mode" => cfg.clip_mode = defaults.clip_mode,
        "schema" => cfg.schema = defaults.schema,
        "workers" => cfg.workers = defaults.workers,
        "preview_seconds" => cfg.preview_seconds = defaults.preview_seconds,
        "head_seconds" => cfg.head_seconds = defaults.head_seconds,
        "warm_on_start" => cfg.warm_on_start = defaults.warm_on_start,
        _ => return Err(format!("Unknown field: {}", field)),
    }
    Ok(())
}
