// atva (andrew's tool for video annotation)
// Copyright (C) 2025 Andrew Nissen

use crate::config::Schema;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One subdirectory of a task root; the unit of navigation and of broadcast writes.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub name: String,
    pub absolute_path: PathBuf,
}

pub fn get_video_extensions(schema: Schema) -> &'static [&'static str] {
    match schema {
        Schema::Minimal => &["mp4", "mkv", "avi"],
        Schema::Rich => &["mp4", "mkv", "avi", "rmvb", "flv", "mov", "wmv"],
    }
}

pub fn is_video_file(path: &Path, schema: Schema) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .is_some_and(|ext| get_video_extensions(schema).contains(&ext.as_str()))
}

fn immediate_children(dir: &Path) -> impl Iterator<Item = walkdir::DirEntry> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
}

/// Immediate subdirectories of `root`, sorted by name.
pub fn list_items(root: &Path) -> io::Result<Vec<Item>> {
    if !root.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Task directory does not exist: {}", root.display()),
        ));
    }

    let items = immediate_children(root)
        .filter(|entry| entry.path().is_dir())
        .map(|entry| Item {
            name: entry.file_name().to_string_lossy().to_string(),
            absolute_path: entry.path().to_path_buf(),
        })
        .collect();

    Ok(items)
}

/// Recognized video files directly inside `dir`, sorted by name.
pub fn list_videos(dir: &Path, schema: Schema) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }
    immediate_children(dir)
        .map(|entry| entry.into_path())
        .filter(|path| path.is_file() && is_video_file(path, schema))
        .collect()
}

/// The file that stands in for its item when probing and previewing.
/// The rich layout skips the first file (often a trailer) when there is a second.
pub fn representative_file(files: &[PathBuf], schema: Schema) -> Option<&PathBuf> {
    match schema {
        Schema::Minimal => files.first(),
        Schema::Rich => files.get(1).or_else(|| files.first()),
    }
}

/// Every recognized video path across all items, in item order.
pub fn all_video_paths(items: &[Item], schema: Schema) -> Vec<String> {
    items
        .iter()
        .flat_map(|item| list_videos(&item.absolute_path, schema))
        .map(|path| path.to_string_lossy().to_string())
        .collect()
}
