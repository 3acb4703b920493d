// atva (andrew's tool for video annotation)
// Copyright (C) 2025 Andrew Nissen

//! Bounded background pool that cuts preview clips ahead of the operator.
//!
//! Jobs are fire-and-forget. Their outputs are keyed by deterministic paths,
//! so callers observe completion by checking whether the clip exists.

use crate::clipper;
use crate::config::{AtvaConfig, ClipMode};
use crate::probe;
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub struct Prefetcher {
    pool: rayon::ThreadPool,
    in_flight: Arc<Mutex<HashSet<PathBuf>>>,
    /// Sources whose whole plan was cut. A head_tail source without a known
    /// duration settles after its head clip.
    settled: Arc<Mutex<HashSet<PathBuf>>>,
}

pub struct Prepared {
    pub clips: Vec<PathBuf>,
    /// Every clip of the plan exists.
    pub complete: bool,
}

/// Produces every preview clip of `source`, probing first when the plan needs a duration.
pub fn prepare_previews(cfg: &AtvaConfig, clip_dir: &Path, source: &Path) -> Prepared {
    let duration = match cfg.clip_mode {
        ClipMode::Single => None,
        ClipMode::HeadTail => probe::probe(cfg, source).duration,
    };

    let plan = clipper::preview_plan(cfg, source, duration);
    let clips: Vec<PathBuf> = plan
        .iter()
        .filter_map(|request| match clipper::produce_clip(cfg, clip_dir, request) {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(source = %source.display(), suffix = %request.suffix, error = %e, "pre-cut failed");
                None
            }
        })
        .collect();
    Prepared {
        complete: clips.len() == plan.len(),
        clips,
    }
}

impl Prefetcher {
    pub fn new(workers: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("atva-prefetch-{}", i))
            .build()?;
        Ok(Prefetcher {
            pool,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            settled: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().map(|set| set.len()).unwrap_or_else(|e| e.into_inner().len())
    }

    fn is_settled(&self, source: &Path) -> bool {
        self.settled
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(source)
    }

    /// Queues the previews of `source`. Returns false when they already exist
    /// or a job for the same source is still running.
    pub fn submit(&self, cfg: &AtvaConfig, clip_dir: &Path, source: &Path) -> bool {
        if clipper::previews_exist(cfg, clip_dir, source) || self.is_settled(source) {
            return false;
        }

        {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            if !in_flight.insert(source.to_path_buf()) {
                return false;
            }
        }

        let cfg = cfg.clone();
        let clip_dir = clip_dir.to_path_buf();
        let source = source.to_path_buf();
        let in_flight = Arc::clone(&self.in_flight);
        let settled = Arc::clone(&self.settled);

        self.pool.spawn(move || {
            let prepared = prepare_previews(&cfg, &clip_dir, &source);
            tracing::debug!(
                source = %source.display(),
                clips = prepared.clips.len(),
                complete = prepared.complete,
                "prefetch finished"
            );
            if prepared.complete {
                settled
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(source.clone());
            }
            in_flight
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&source);
        });
        true
    }

    /// Queues every source; returns how many jobs were actually started.
    pub fn warm(&self, cfg: &AtvaConfig, clip_dir: &Path, sources: &[PathBuf]) -> usize {
        sources
            .iter()
            .filter(|source| self.submit(cfg, clip_dir, source))
            .count()
    }

    /// Cuts every source on the pool and waits. Returns the clips that exist afterwards.
    pub fn warm_blocking<F>(&self, cfg: &AtvaConfig, clip_dir: &Path, sources: &[PathBuf], on_done: F) -> Vec<PathBuf>
    where
        F: Fn() + Sync,
    {
        self.pool.install(|| {
            sources
                .par_iter()
                .flat_map_iter(|source| {
                    let prepared = prepare_previews(cfg, clip_dir, source);
                    if prepared.complete {
                        self.settled
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .insert(source.clone());
                    }
                    on_done();
                    prepared.clips
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipper::tests::run_count;
    use std::fs;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn make_sources(root: &Path, count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|i| {
                let dir = root.join(format!("show_{}", i));
                fs::create_dir_all(&dir).unwrap();
                let source = dir.join("ep01.mp4");
                fs::write(&source, b"fake video content").unwrap();
                source
            })
            .collect()
    }

    #[test]
    fn test_submit_skips_existing_previews() {
        let dir = TempDir::new().unwrap();
        let sources = make_sources(dir.path(), 1);
        let cfg = AtvaConfig::default();
        let clip_dir = dir.path().join("clips");
        fs::create_dir_all(&clip_dir).unwrap();
        fs::write(clip_dir.join("show_0_ep01_preview.mp4"), b"cut").unwrap();

        let prefetcher = Prefetcher::new(2).unwrap();
        assert!(!prefetcher.submit(&cfg, &clip_dir, &sources[0]));
        assert_eq!(prefetcher.in_flight(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_warm_blocking_cuts_each_source_once() {
        let dir = TempDir::new().unwrap();
        let counter = dir.path().join("runs.log");
        let sources = make_sources(dir.path(), 6);
        let cfg = AtvaConfig {
            ffmpeg_path: crate::clipper::tests::fake_ffmpeg(dir.path(), &counter)
                .to_string_lossy()
                .to_string(),
            ..AtvaConfig::default()
        };
        let clip_dir = dir.path().join("clips");
        let prefetcher = Prefetcher::new(4).unwrap();

        let done = std::sync::atomic::AtomicUsize::new(0);
        let produced = prefetcher.warm_blocking(&cfg, &clip_dir, &sources, || {
            done.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });
        assert_eq!(produced.len(), 6);
        assert_eq!(done.load(std::sync::atomic::Ordering::SeqCst), 6);
        assert_eq!(run_count(&counter), 6);

        let again = prefetcher.warm_blocking(&cfg, &clip_dir, &sources, || {});
        assert_eq!(again.len(), 6);
        assert_eq!(run_count(&counter), 6);
    }

    #[cfg(unix)]
    #[test]
    fn test_fire_and_forget_completes_in_background() {
        let dir = TempDir::new().unwrap();
        let counter = dir.path().join("runs.log");
        let sources = make_sources(dir.path(), 3);
        let cfg = AtvaConfig {
            ffmpeg_path: crate::clipper::tests::fake_ffmpeg(dir.path(), &counter)
                .to_string_lossy()
                .to_string(),
            ..AtvaConfig::default()
        };
        let clip_dir = dir.path().join("clips");
        let prefetcher = Prefetcher::new(4).unwrap();

        assert_eq!(prefetcher.warm(&cfg, &clip_dir, &sources), 3);

        let deadline = Instant::now() + Duration::from_secs(10);
        while !sources.iter().all(|s| clipper::previews_exist(&cfg, &clip_dir, s)) {
            assert!(Instant::now() < deadline, "prefetch did not finish in time");
            std::thread::sleep(Duration::from_millis(20));
        }
        while prefetcher.in_flight() > 0 {
            assert!(Instant::now() < deadline, "in-flight set was not drained");
            std::thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(run_count(&counter), 3);
        assert_eq!(prefetcher.warm(&cfg, &clip_dir, &sources), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_head_only_source_is_not_resubmitted() {
        let dir = TempDir::new().unwrap();
        let counter = dir.path().join("runs.log");
        let sources = make_sources(dir.path(), 1);
        let cfg = AtvaConfig {
            clip_mode: ClipMode::HeadTail,
            ffprobe_path: dir.path().join("no-ffprobe").to_string_lossy().to_string(),
            ffmpeg_path: crate::clipper::tests::fake_ffmpeg(dir.path(), &counter)
                .to_string_lossy()
                .to_string(),
            ..AtvaConfig::default()
        };
        let clip_dir = dir.path().join("clips");
        let prefetcher = Prefetcher::new(2).unwrap();

        assert!(prefetcher.submit(&cfg, &clip_dir, &sources[0]));
        let deadline = Instant::now() + Duration::from_secs(10);
        while prefetcher.in_flight() > 0 {
            assert!(Instant::now() < deadline, "prefetch did not finish in time");
            std::thread::sleep(Duration::from_millis(20));
        }

        // No duration means no tail clip, so the fixed suffix list never completes.
        assert!(clip_dir.join("show_0_ep01_head.mp4").exists());
        assert!(!clipper::previews_exist(&cfg, &clip_dir, &sources[0]));

        assert!(!prefetcher.submit(&cfg, &clip_dir, &sources[0]));
        assert_eq!(prefetcher.in_flight(), 0);
        assert_eq!(run_count(&counter), 1);
    }
}
