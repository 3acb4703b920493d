// atva (andrew's tool for video annotation)
// Copyright (C) 2025 Andrew Nissen

use crate::config::{self, AtvaConfig};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const ANNOTATION_FILENAME: &str = "meta.csv";

/// A root directory whose subdirectories are annotated together, plus the
/// scratch workspace that holds its annotation file and preview clips.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub index: usize,
    pub name: String,
    pub root: PathBuf,
    pub workspace: PathBuf,
}

impl Task {
    pub fn store_path(&self) -> PathBuf {
        self.workspace.join(ANNOTATION_FILENAME)
    }

    pub fn clip_dir(&self) -> &Path {
        &self.workspace
    }

    pub fn ensure_workspace(&self) -> io::Result<()> {
        config::ensure_shared_dir(&self.workspace)
    }
}

/// One task directory per line; blank lines and `#` comments are skipped.
pub fn parse_task_list(content: &str) -> Vec<PathBuf> {
    content
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(PathBuf::from)
        .collect()
}

/// Task roots often share a final component (`.../task_3/_series`,
/// `.../task_4/_series`), so the workspace name carries a hash of the full path.
pub fn workspace_name(root: &Path) -> String {
    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "root".to_string());
    let mut hasher = Sha256::new();
    hasher.update(root.to_string_lossy().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{}-{}", name, &digest[..8])
}

pub fn task_roots(cfg: &AtvaConfig) -> io::Result<Vec<PathBuf>> {
    if !cfg.task_list_path.is_empty() {
        let content = fs::read_to_string(&cfg.task_list_path).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("Could not read task list {}: {}", cfg.task_list_path, e),
            )
        })?;
        return Ok(parse_task_list(&content));
    }
    Ok(cfg.root_dirs.iter().map(PathBuf::from).collect())
}

pub fn load_tasks(cfg: &AtvaConfig) -> io::Result<Vec<Task>> {
    let temp_dir = cfg.temp_dir();
    let tasks = task_roots(cfg)?
        .into_iter()
        .enumerate()
        .map(|(index, root)| Task {
            index,
            name: root.to_string_lossy().to_string(),
            workspace: temp_dir.join(workspace_name(&root)),
            root,
        })
        .collect();
    Ok(tasks)
}
