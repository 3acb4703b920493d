// atva (andrew's tool for video annotation)
// Copyright (C) 2025 Andrew Nissen

//! Request handling without the web layer: every handler rescans the
//! filesystem and reloads the annotation file, mutates the session, and
//! returns either a message or a full render description.

use crate::annotation::{self, AnnotationValues, Category, Hms, TimestampPair, WatermarkPosition};
use crate::clipper;
use crate::config::{AtvaConfig, Schema};
use crate::files::{self, Item};
use crate::prefetch::Prefetcher;
use crate::probe::{self, MediaInfo};
use crate::session::SessionState;
use crate::store::{AnnotationRow, AnnotationStore};
use crate::tasks::{self, Task};
use chrono::{DateTime, Utc};
use rocket::FromForm;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Success,
    Info,
    Warning,
    Error,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Success => "success",
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
        }
    }

    pub fn from_kind(kind: &str) -> Self {
        match kind {
            "success" => Level::Success,
            "warning" => Level::Warning,
            "error" => Level::Error,
            _ => Level::Info,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub level: Level,
    pub text: String,
}

impl Message {
    pub fn new(level: Level, text: impl Into<String>) -> Self {
        Message {
            level,
            text: text.into(),
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self::new(Level::Success, text)
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(Level::Info, text)
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(Level::Warning, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(Level::Error, text)
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub index: usize,
    pub label: String,
    pub selected: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CodeOption {
    pub code: u8,
    pub label: &'static str,
    pub checked: bool,
}

#[derive(Serialize, Debug, Clone)]
pub struct ClipView {
    pub label: String,
    pub url: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct FormView {
    pub task_index: usize,
    pub item_index: usize,
    pub rich: bool,
    pub discard: bool,
    pub subtitle: bool,
    pub border: bool,
    pub watermarks: Vec<CodeOption>,
    pub categories: Vec<CodeOption>,
    pub intro: Hms,
    /// Unset outros render empty inputs, which post back as unset.
    pub outro: Option<Hms>,
    pub outro_base: String,
    pub new_name: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct ItemView {
    pub name: String,
    pub path: String,
    pub file_count: usize,
    pub representative: String,
    pub size_mb: Option<String>,
    pub duration: Option<String>,
    pub fps: Option<String>,
    pub resolution: Option<u32>,
    pub clips: Vec<ClipView>,
    pub form: Option<FormView>,
}

/// Everything the `annotate` template needs.
#[derive(Serialize, Debug, Clone, Default)]
pub struct PageView {
    pub fatal: Option<String>,
    pub messages: Vec<Message>,
    pub tasks: Vec<Choice>,
    pub items: Vec<Choice>,
    pub item: Option<ItemView>,
    pub refresh_counter: u64,
    pub schema: String,
    pub clip_mode: String,
}

impl PageView {
    pub fn fatal(message: impl Into<String>) -> Self {
        PageView {
            fatal: Some(message.into()),
            ..PageView::default()
        }
    }
}

/// The annotation form as posted by the browser.
#[derive(FromForm, Debug, Clone, Default)]
pub struct AnnotationForm {
    pub task_index: usize,
    pub item_index: usize,
    pub discard: bool,
    pub subtitle: bool,
    pub border: bool,
    pub watermark: Vec<u8>,
    pub category: Option<u8>,
    pub intro_hours: Option<u32>,
    pub intro_minutes: Option<u32>,
    pub intro_seconds: Option<u32>,
    pub outro_hours: Option<u32>,
    pub outro_minutes: Option<u32>,
    pub outro_seconds: Option<u32>,
    pub new_name: Option<String>,
}

impl AnnotationForm {
    fn intro(&self) -> Hms {
        Hms::normalized(
            self.intro_hours.unwrap_or(0),
            self.intro_minutes.unwrap_or(0),
            self.intro_seconds.unwrap_or(0) as u64,
        )
    }

    fn outro_entered(&self) -> bool {
        self.outro_hours.is_some() || self.outro_minutes.is_some() || self.outro_seconds.is_some()
    }

    /// Converts the submission into the values written to every row of the item.
    pub fn to_values(&self, schema: Schema, outro_base: u64, used_time: u64) -> AnnotationValues {
        let new_name = self
            .new_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        if self.discard {
            return AnnotationValues::discarded(new_name, used_time);
        }

        let mut watermark: Vec<WatermarkPosition> = self
            .watermark
            .iter()
            .filter_map(|code| WatermarkPosition::from_code(*code))
            .collect();
        watermark.sort();
        watermark.dedup();

        let outro = match schema {
            Schema::Rich if self.outro_entered() => Some(annotation::outro_from_entry(
                self.outro_hours.unwrap_or(0),
                self.outro_minutes.unwrap_or(0),
                self.outro_seconds.unwrap_or(0),
                outro_base,
            )),
            _ => None,
        };

        AnnotationValues {
            discard: false,
            subtitle: self.subtitle,
            border: self.border,
            watermark,
            timestamps: TimestampPair {
                intro: Some(self.intro()),
                outro,
            },
            category: match schema {
                Schema::Rich => self.category.and_then(Category::from_code),
                Schema::Minimal => None,
            },
            new_name: match schema {
                Schema::Rich => new_name,
                Schema::Minimal => None,
            },
            used_time,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavAction {
    Previous,
    Next,
    Refresh,
    Item(usize),
    Task(usize),
}

/// Tasks and items for the session, with indices pulled back into range.
struct Resolved {
    tasks: Vec<Task>,
    items: Vec<Item>,
}

impl Resolved {
    fn task(&self, session: &SessionState) -> &Task {
        &self.tasks[session.task_index]
    }
}

fn resolve(cfg: &AtvaConfig, session: &mut SessionState, now: DateTime<Utc>) -> Result<Resolved, String> {
    let tasks = tasks::load_tasks(cfg).map_err(|e| e.to_string())?;
    if tasks.is_empty() {
        return Err("No task directories configured. Set task_list_path or root_dirs.".to_string());
    }
    session.clamp(tasks.len(), None, now);

    let items = files::list_items(&tasks[session.task_index].root).map_err(|e| e.to_string())?;
    session.clamp(tasks.len(), Some(items.len()), now);

    Ok(Resolved { tasks, items })
}

fn clip_url(task_index: usize, clip: &std::path::Path) -> String {
    let file_name = clip
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    format!("/clips/{}/{}", task_index, urlencoding::encode(&file_name))
}

fn seed_form(
    cfg: &AtvaConfig,
    session: &SessionState,
    row: Option<&AnnotationRow>,
    info: &MediaInfo,
) -> FormView {
    let default_row;
    let row = match row {
        Some(row) => row,
        None => {
            default_row = AnnotationRow::new(String::new());
            &default_row
        }
    };
    let outro_base = annotation::outro_base_offset(info.duration);

    FormView {
        task_index: session.task_index,
        item_index: session.item_index,
        rich: cfg.schema == Schema::Rich,
        discard: row.discard,
        subtitle: row.subtitle,
        border: row.border,
        watermarks: WatermarkPosition::ALL
            .iter()
            .map(|p| CodeOption {
                code: p.code(),
                label: p.label(),
                checked: row.watermark.contains(p),
            })
            .collect(),
        categories: Category::ALL
            .iter()
            .map(|c| CodeOption {
                code: c.code(),
                label: c.label(),
                checked: row.category == Some(*c),
            })
            .collect(),
        intro: row.timestamps.intro.unwrap_or_default(),
        outro: row
            .timestamps
            .outro
            .map(|stored| annotation::outro_to_entry(stored, outro_base)),
        outro_base: Hms::from_seconds(outro_base).to_string(),
        new_name: row.new_name.clone().unwrap_or_default(),
    }
}

/// Builds the whole page from the filesystem and the annotation file.
/// Problems with tools or single items become messages; only an unusable
/// task list, task root or annotation file is fatal.
pub fn build_page(
    cfg: &AtvaConfig,
    session: &mut SessionState,
    prefetcher: Option<&Prefetcher>,
    now: DateTime<Utc>,
) -> PageView {
    let resolved = match resolve(cfg, session, now) {
        Ok(resolved) => resolved,
        Err(e) => return PageView::fatal(e),
    };
    let task = resolved.task(session);

    let mut page = PageView {
        refresh_counter: session.refresh_counter,
        schema: cfg.schema.to_string(),
        clip_mode: cfg.clip_mode.to_string(),
        tasks: resolved
            .tasks
            .iter()
            .map(|t| Choice {
                index: t.index,
                label: t.name.clone(),
                selected: t.index == session.task_index,
            })
            .collect(),
        items: resolved
            .items
            .iter()
            .enumerate()
            .map(|(index, item)| Choice {
                index,
                label: item.name.clone(),
                selected: index == session.item_index,
            })
            .collect(),
        ..PageView::default()
    };

    if let Err(e) = task.ensure_workspace() {
        return PageView::fatal(format!(
            "Could not create workspace {}: {}",
            task.workspace.display(),
            e
        ));
    }

    let (store, created) = match AnnotationStore::load_or_create(&task.store_path(), cfg.schema, || {
        files::all_video_paths(&resolved.items, cfg.schema)
    }) {
        Ok(loaded) => loaded,
        Err(e) => return PageView::fatal(format!("Error reading annotation file: {}", e)),
    };
    if created {
        page.messages.push(Message::success(format!(
            "Created a new annotation file with {} rows: {}",
            store.rows().len(),
            store.path().display()
        )));
    }
    for warning in store.load_warnings() {
        page.messages.push(Message::warning(warning.clone()));
    }

    let Some(item) = resolved.items.get(session.item_index) else {
        page.messages.push(Message::info(format!(
            "No directories found in {}",
            task.root.display()
        )));
        return page;
    };

    if let Some(prefetcher) = prefetcher {
        schedule_next(cfg, prefetcher, task, &resolved.items, session.item_index);
    }

    let videos = files::list_videos(&item.absolute_path, cfg.schema);
    let Some(representative) = files::representative_file(&videos, cfg.schema) else {
        page.messages.push(Message::info(format!(
            "No video files found in {}",
            item.name
        )));
        page.item = Some(ItemView {
            name: item.name.clone(),
            path: item.absolute_path.to_string_lossy().to_string(),
            file_count: 0,
            representative: String::new(),
            size_mb: None,
            duration: None,
            fps: None,
            resolution: None,
            clips: Vec::new(),
            form: None,
        });
        return page;
    };

    let info = probe::probe(cfg, representative);
    if info.duration.is_none() {
        page.messages.push(Message::warning(
            "Could not read the video duration (unsupported format or ffprobe failure)",
        ));
    }

    let mut clips = Vec::new();
    for request in clipper::preview_plan(cfg, representative, info.duration) {
        match clipper::produce_clip(cfg, task.clip_dir(), &request) {
            Ok(path) => clips.push(ClipView {
                label: request.suffix.clone(),
                url: clip_url(task.index, &path),
            }),
            Err(e) => page
                .messages
                .push(Message::warning(format!("Error cutting {} clip: {}", request.suffix, e))),
        }
    }

    let form = seed_form(cfg, session, store.row(representative), &info);

    page.item = Some(ItemView {
        name: item.name.clone(),
        path: item.absolute_path.to_string_lossy().to_string(),
        file_count: videos.len(),
        representative: representative
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        size_mb: info.size_mb.map(|mb| format!("{:.2}", mb)),
        duration: info.duration_label(),
        fps: info.fps.map(|fps| format!("{:.2}", fps)),
        resolution: info.resolution,
        clips,
        form: Some(form),
    });

    page
}

fn schedule_next(cfg: &AtvaConfig, prefetcher: &Prefetcher, task: &Task, items: &[Item], current: usize) {
    let Some(next) = items.get(current + 1) else {
        return;
    };
    let videos = files::list_videos(&next.absolute_path, cfg.schema);
    if let Some(source) = files::representative_file(&videos, cfg.schema)
        && prefetcher.submit(cfg, task.clip_dir(), source)
    {
        tracing::debug!(item = %next.name, in_flight = prefetcher.in_flight(), "prefetching next item");
    }
}

/// Representative files of every item in the session's task, for warming.
pub fn representative_files(cfg: &AtvaConfig, task: &Task) -> std::io::Result<Vec<PathBuf>> {
    let items = files::list_items(&task.root)?;
    Ok(items
        .iter()
        .filter_map(|item| {
            let videos = files::list_videos(&item.absolute_path, cfg.schema);
            files::representative_file(&videos, cfg.schema).cloned()
        })
        .collect())
}

/// Writes the form to every row of the current item and persists the file.
pub fn save_annotation(
    cfg: &AtvaConfig,
    session: &mut SessionState,
    form: &AnnotationForm,
    now: DateTime<Utc>,
) -> Message {
    let resolved = match resolve(cfg, session, now) {
        Ok(resolved) => resolved,
        Err(e) => return Message::error(e),
    };

    if form.task_index != session.task_index || form.item_index != session.item_index {
        return Message::warning("The form belongs to a different directory than the one selected. Nothing was saved.");
    }

    let task = resolved.task(session);
    let Some(item) = resolved.items.get(session.item_index) else {
        return Message::info(format!("No directories found in {}", task.root.display()));
    };

    let videos = files::list_videos(&item.absolute_path, cfg.schema);
    let Some(representative) = files::representative_file(&videos, cfg.schema) else {
        return Message::info(format!("No video files found in {}", item.name));
    };

    let info = probe::probe(cfg, representative);
    let values = form.to_values(
        cfg.schema,
        annotation::outro_base_offset(info.duration),
        session.elapsed_seconds(now),
    );

    let (mut store, _) = match AnnotationStore::load_or_create(&task.store_path(), cfg.schema, || {
        files::all_video_paths(&resolved.items, cfg.schema)
    }) {
        Ok(loaded) => loaded,
        Err(e) => return Message::error(format!("Error reading annotation file: {}", e)),
    };

    let touched = store.update_rows(&item.absolute_path, &values);
    if cfg.schema == Schema::Rich {
        store.record_probe(&item.absolute_path, info.fps, info.resolution);
    }

    if let Err(e) = store.save() {
        return Message::error(format!("Error writing annotation file: {}", e));
    }

    tracing::info!(
        item = %item.name,
        rows = touched,
        discard = values.discard,
        used_time = values.used_time,
        "saved annotation"
    );

    if touched == 0 {
        Message::warning(format!(
            "No rows for {} exist in the annotation file; nothing was updated",
            item.name
        ))
    } else if values.discard {
        Message::warning(format!("Discarded all {} files in {}", touched, item.name))
    } else {
        Message::success(format!("Saved settings for all {} files in {}", touched, item.name))
    }
}

/// Applies a navigation action. Returns a message only when there is something to say.
pub fn navigate(
    cfg: &AtvaConfig,
    session: &mut SessionState,
    action: NavAction,
    now: DateTime<Utc>,
) -> Option<Message> {
    let resolved = match resolve(cfg, session, now) {
        Ok(resolved) => resolved,
        Err(e) => return Some(Message::error(e)),
    };
    let item_count = resolved.items.len();

    let result = match action {
        NavAction::Previous => session.previous(now),
        NavAction::Next => session.next(item_count, now),
        NavAction::Item(index) => session.select_item(index, item_count, now),
        NavAction::Task(index) => session.select_task(index, resolved.tasks.len(), now),
        NavAction::Refresh => {
            session.refresh();
            Ok(())
        }
    };

    result.err().map(|warning| Message::warning(warning.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
    }

    struct Fixture {
        _dir: TempDir,
        root: PathBuf,
        cfg: AtvaConfig,
    }

    /// Three items: show_a (2 files), show_b (1 file), show_c (no videos).
    fn fixture(schema: Schema) -> Fixture {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("task");
        for (item, names) in [
            ("show_a", vec!["ep01.mp4", "ep02.mp4"]),
            ("show_b", vec!["movie.mkv"]),
            ("show_c", vec!["readme.txt"]),
        ] {
            fs::create_dir_all(root.join(item)).unwrap();
            for name in names {
                fs::write(root.join(item).join(name), b"fake video content").unwrap();
            }
        }
        let cfg = AtvaConfig {
            ffmpeg_path: dir.path().join("no-ffmpeg").to_string_lossy().to_string(),
            ffprobe_path: dir.path().join("no-ffprobe").to_string_lossy().to_string(),
            root_dirs: vec![root.to_string_lossy().to_string()],
            temp_dir: dir.path().join("tmp").to_string_lossy().to_string(),
            schema,
            ..AtvaConfig::default()
        };
        Fixture {
            _dir: dir,
            root,
            cfg,
        }
    }

    fn store_for(fx: &Fixture) -> AnnotationStore {
        let task = tasks::load_tasks(&fx.cfg).unwrap().remove(0);
        AnnotationStore::load(&task.store_path(), fx.cfg.schema).unwrap()
    }

    #[test]
    fn test_first_page_creates_store_and_seeds_form() {
        let fx = fixture(Schema::Rich);
        let mut session = SessionState::new(t0());
        let page = build_page(&fx.cfg, &mut session, None, t0());

        assert!(page.fatal.is_none());
        assert_eq!(page.items.len(), 3);
        assert!(page.items[0].selected);
        assert!(page.messages.iter().any(|m| m.level == Level::Success));
        // ffmpeg is missing: the page still renders, with a warning
        assert!(page.messages.iter().any(|m| m.level == Level::Warning && m.text.contains("clip")));

        let item = page.item.unwrap();
        assert_eq!(item.name, "show_a");
        assert_eq!(item.file_count, 2);
        assert_eq!(item.representative, "ep02.mp4");
        assert!(item.clips.is_empty());
        let form = item.form.unwrap();
        assert!(!form.discard);
        assert_eq!(form.watermarks.len(), 5);
        assert!(form.watermarks.iter().all(|w| !w.checked));

        assert_eq!(store_for(&fx).rows().len(), 3);
    }

    #[test]
    fn test_item_without_videos_has_no_form() {
        let fx = fixture(Schema::Rich);
        let mut session = SessionState::new(t0());
        session.select_item(2, 3, t0()).unwrap();
        let page = build_page(&fx.cfg, &mut session, None, t0());

        let item = page.item.unwrap();
        assert_eq!(item.name, "show_c");
        assert!(item.form.is_none());
        assert!(page.messages.iter().any(|m| m.level == Level::Info));
    }

    #[test]
    fn test_save_broadcasts_to_current_item_only() {
        let fx = fixture(Schema::Rich);
        let mut session = SessionState::new(t0());
        build_page(&fx.cfg, &mut session, None, t0());

        let form = AnnotationForm {
            subtitle: true,
            watermark: vec![3, 1, 9],
            category: Some(1),
            intro_minutes: Some(1),
            intro_seconds: Some(75),
            outro_hours: Some(1),
            outro_minutes: Some(10),
            outro_seconds: Some(70),
            new_name: Some("  Show A  ".to_string()),
            ..AnnotationForm::default()
        };
        let message = save_annotation(&fx.cfg, &mut session, &form, t0() + Duration::seconds(42));
        assert_eq!(message.level, Level::Success, "{}", message.text);

        let store = store_for(&fx);
        let a = fx.root.join("show_a");
        for row in store.rows().iter().filter(|r| r.is_under(&a)) {
            assert!(row.subtitle);
            assert_eq!(
                row.watermark,
                vec![WatermarkPosition::TopRight, WatermarkPosition::BottomRight]
            );
            assert_eq!(row.category, Some(Category::Movie));
            assert_eq!(row.timestamps.intro.map(|h| h.to_string()).as_deref(), Some("00:02:15"));
            // duration unknown, so the base offset is zero
            assert_eq!(row.timestamps.outro.map(|h| h.to_string()).as_deref(), Some("01:11:10"));
            assert_eq!(row.new_name.as_deref(), Some("Show A"));
            assert_eq!(row.used_time, 42);
        }
        let b = store.row(&fx.root.join("show_b").join("movie.mkv")).unwrap();
        assert_eq!(b, &AnnotationRow::new(b.path.clone()));

        let page = build_page(&fx.cfg, &mut session, None, t0());
        let seeded = page.item.unwrap().form.unwrap();
        assert!(seeded.subtitle);
        assert!(seeded.watermarks[1].checked && seeded.watermarks[3].checked);
        assert!(seeded.categories[1].checked);
        assert_eq!(seeded.new_name, "Show A");
    }

    #[test]
    fn test_discard_resets_annotation_fields() {
        let fx = fixture(Schema::Rich);
        let mut session = SessionState::new(t0());
        build_page(&fx.cfg, &mut session, None, t0());

        let keep = AnnotationForm {
            border: true,
            watermark: vec![0],
            ..AnnotationForm::default()
        };
        save_annotation(&fx.cfg, &mut session, &keep, t0());

        let discard = AnnotationForm {
            discard: true,
            border: true,
            watermark: vec![0],
            new_name: Some("Trailer pack".to_string()),
            ..AnnotationForm::default()
        };
        let message = save_annotation(&fx.cfg, &mut session, &discard, t0());
        assert_eq!(message.level, Level::Warning);

        let store = store_for(&fx);
        let row = store.row(&fx.root.join("show_a").join("ep01.mp4")).unwrap();
        assert!(row.discard);
        assert!(!row.border);
        assert!(row.watermark.is_empty());
        assert_eq!(row.timestamps, TimestampPair::default());
        assert_eq!(row.new_name.as_deref(), Some("Trailer pack"));
    }

    #[test]
    fn test_stale_form_is_rejected() {
        let fx = fixture(Schema::Rich);
        let mut session = SessionState::new(t0());
        build_page(&fx.cfg, &mut session, None, t0());
        let form = AnnotationForm {
            item_index: 1,
            subtitle: true,
            ..AnnotationForm::default()
        };
        let message = save_annotation(&fx.cfg, &mut session, &form, t0());
        assert_eq!(message.level, Level::Warning);
        assert!(store_for(&fx).rows().iter().all(|r| !r.subtitle));
    }

    #[test]
    fn test_minimal_schema_saves_beginning_only() {
        let fx = fixture(Schema::Minimal);
        let mut session = SessionState::new(t0());
        build_page(&fx.cfg, &mut session, None, t0());

        let form = AnnotationForm {
            intro_hours: Some(0),
            intro_minutes: Some(1),
            intro_seconds: Some(30),
            outro_minutes: Some(5),
            category: Some(2),
            ..AnnotationForm::default()
        };
        save_annotation(&fx.cfg, &mut session, &form, t0());

        let task = tasks::load_tasks(&fx.cfg).unwrap().remove(0);
        let content = fs::read_to_string(task.store_path()).unwrap();
        let ep01 = fx.root.join("show_a").join("ep01.mp4");
        let line = content
            .lines()
            .find(|l| l.starts_with(&*ep01.to_string_lossy()))
            .unwrap();
        assert!(line.ends_with(",0,0,[],00:01:30,0"), "{}", line);
    }

    #[test]
    fn test_navigation_boundaries() {
        let fx = fixture(Schema::Rich);
        let mut session = SessionState::new(t0());

        let warning = navigate(&fx.cfg, &mut session, NavAction::Previous, t0()).unwrap();
        assert_eq!(warning.level, Level::Warning);
        assert_eq!(session.item_index, 0);

        assert!(navigate(&fx.cfg, &mut session, NavAction::Next, t0()).is_none());
        assert!(navigate(&fx.cfg, &mut session, NavAction::Next, t0()).is_none());
        assert_eq!(session.item_index, 2);
        let warning = navigate(&fx.cfg, &mut session, NavAction::Next, t0()).unwrap();
        assert_eq!(warning.level, Level::Warning);
        assert_eq!(session.item_index, 2);

        assert!(navigate(&fx.cfg, &mut session, NavAction::Item(1), t0()).is_none());
        assert_eq!(session.item_index, 1);
        assert!(navigate(&fx.cfg, &mut session, NavAction::Item(7), t0()).is_some());

        navigate(&fx.cfg, &mut session, NavAction::Refresh, t0());
        assert_eq!(session.refresh_counter, 1);
    }

    #[test]
    fn test_missing_key_column_is_fatal() {
        let fx = fixture(Schema::Rich);
        let task = tasks::load_tasks(&fx.cfg).unwrap().remove(0);
        task.ensure_workspace().unwrap();
        fs::write(task.store_path(), "file,discard\nx,0\n").unwrap();

        let mut session = SessionState::new(t0());
        let page = build_page(&fx.cfg, &mut session, None, t0());
        assert!(page.fatal.unwrap().contains("'path'"));
        assert!(page.item.is_none());
    }

    #[test]
    fn test_external_edits_are_picked_up() {
        let fx = fixture(Schema::Rich);
        let mut session = SessionState::new(t0());
        build_page(&fx.cfg, &mut session, None, t0());

        let task = tasks::load_tasks(&fx.cfg).unwrap().remove(0);
        let mut store = AnnotationStore::load(&task.store_path(), Schema::Rich).unwrap();
        store.update_rows(
            &fx.root.join("show_a"),
            &AnnotationValues {
                border: true,
                ..AnnotationValues::default()
            },
        );
        store.save().unwrap();

        let page = build_page(&fx.cfg, &mut session, None, t0());
        assert!(page.item.unwrap().form.unwrap().border);
    }

    #[test]
    fn test_missing_task_root_is_fatal() {
        let fx = fixture(Schema::Rich);
        let cfg = AtvaConfig {
            root_dirs: vec![fx.root.join("gone").to_string_lossy().to_string()],
            ..fx.cfg.clone()
        };
        let mut session = SessionState::new(t0());
        let page = build_page(&cfg, &mut session, None, t0());
        assert!(page.fatal.is_some());
    }

    #[test]
    fn test_clip_urls_are_encoded() {
        assert_eq!(
            clip_url(2, Path::new("/tmp/w/show a_ep01_preview.mp4")),
            "/clips/2/show%20a_ep01_preview.mp4"
        );
    }

    #[test]
    fn test_outro_seeds_relative_to_tail_window() {
        let fx = fixture(Schema::Rich);
        let session = SessionState::new(t0());
        let mut row = AnnotationRow::new("/x/1.mp4");
        row.timestamps.outro = Some(Hms::from_seconds(2100 + 95));
        let info = MediaInfo {
            duration: Some(2700.0),
            ..MediaInfo::default()
        };
        let form = seed_form(&fx.cfg, &session, Some(&row), &info);
        assert_eq!(form.outro.map(|h| h.to_string()).as_deref(), Some("00:01:35"));
        assert_eq!(form.outro_base, "00:35:00");

        let unset = seed_form(&fx.cfg, &session, Some(&AnnotationRow::new("/x/1.mp4")), &info);
        assert!(unset.outro.is_none());
    }
}
