// atva (andrew's tool for video annotation)
// Copyright (C) 2025 Andrew Nissen

//! The annotation file: one CSV row per video path, reloaded in full and
//! rewritten in full. Last write wins.

use crate::annotation::{
    self, AnnotationValues, Category, ParseError, TimestampPair, WatermarkPosition,
};
use crate::config::Schema;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const KEY_COLUMN: &str = "path";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("annotation file {0} has no 'path' column")]
    MissingKeyColumn(PathBuf),
    #[error("failed to read or write annotation file: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error on annotation file: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Path,
    Id,
    Discard,
    Subtitle,
    Border,
    Watermark,
    Timestamp,
    Beginning,
    Category,
    NewName,
    RawFps,
    RawResolution,
    UsedTime,
}

impl Column {
    fn name(self) -> &'static str {
        match self {
            Column::Path => KEY_COLUMN,
            Column::Id => "id",
            Column::Discard => "discard",
            Column::Subtitle => "human_subtitle",
            Column::Border => "human_border",
            Column::Watermark => "human_watermark",
            Column::Timestamp => "human_timestamp",
            Column::Beginning => "human_beginning",
            Column::Category => "human_category",
            Column::NewName => "new_name",
            Column::RawFps => "raw_fps",
            Column::RawResolution => "raw_resolution",
            Column::UsedTime => "used_time",
        }
    }
}

fn schema_columns(schema: Schema) -> &'static [Column] {
    match schema {
        Schema::Minimal => &[
            Column::Path,
            Column::Subtitle,
            Column::Border,
            Column::Watermark,
            Column::Beginning,
            Column::Discard,
        ],
        Schema::Rich => &[
            Column::Path,
            Column::Id,
            Column::Discard,
            Column::Subtitle,
            Column::Border,
            Column::Watermark,
            Column::Timestamp,
            Column::Category,
            Column::NewName,
            Column::RawFps,
            Column::RawResolution,
            Column::UsedTime,
        ],
    }
}

pub fn column_names(schema: Schema) -> Vec<&'static str> {
    schema_columns(schema).iter().map(|c| c.name()).collect()
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AnnotationRow {
    pub path: String,
    pub id: Option<String>,
    pub discard: bool,
    pub subtitle: bool,
    pub border: bool,
    pub watermark: Vec<WatermarkPosition>,
    pub timestamps: TimestampPair,
    pub category: Option<Category>,
    pub new_name: Option<String>,
    pub raw_fps: Option<f64>,
    pub raw_resolution: u32,
    pub used_time: u64,
    /// Cells of columns this schema does not know, in file order.
    #[serde(skip)]
    extra: Vec<String>,
}

impl AnnotationRow {
    pub fn new(path: impl Into<String>) -> Self {
        AnnotationRow {
            path: path.into(),
            id: None,
            discard: false,
            subtitle: false,
            border: false,
            watermark: Vec::new(),
            timestamps: TimestampPair::default(),
            category: None,
            new_name: None,
            raw_fps: None,
            raw_resolution: 0,
            used_time: 0,
            extra: Vec::new(),
        }
    }

    pub fn is_under(&self, directory: &Path) -> bool {
        Path::new(&self.path).starts_with(directory)
    }

    pub fn apply(&mut self, values: &AnnotationValues) {
        self.discard = values.discard;
        self.subtitle = values.subtitle;
        self.border = values.border;
        self.watermark = values.watermark.clone();
        self.timestamps = values.timestamps;
        self.category = values.category;
        self.new_name = values.new_name.clone();
        self.used_time = values.used_time;
    }

    fn encode(&self, column: Column) -> String {
        match column {
            Column::Path => self.path.clone(),
            Column::Id => self.id.clone().unwrap_or_default(),
            Column::Discard => annotation::encode_flag(self.discard).to_string(),
            Column::Subtitle => annotation::encode_flag(self.subtitle).to_string(),
            Column::Border => annotation::encode_flag(self.border).to_string(),
            Column::Watermark => annotation::encode_watermarks(&self.watermark),
            Column::Timestamp => self.timestamps.encode(),
            Column::Beginning => annotation::encode_beginning(self.timestamps.intro),
            Column::Category => annotation::encode_category(self.category),
            Column::NewName => self.new_name.clone().unwrap_or_default(),
            Column::RawFps => self.raw_fps.map(|f| f.to_string()).unwrap_or_default(),
            Column::RawResolution => self.raw_resolution.to_string(),
            Column::UsedTime => self.used_time.to_string(),
        }
    }

    fn decode(&mut self, column: Column, cell: &str) -> Result<(), ParseError> {
        match column {
            Column::Path => self.path = cell.to_string(),
            Column::Id => self.id = annotation::parse_optional_text(cell),
            Column::Discard => self.discard = annotation::parse_flag(cell)?,
            Column::Subtitle => self.subtitle = annotation::parse_flag(cell)?,
            Column::Border => self.border = annotation::parse_flag(cell)?,
            Column::Watermark => self.watermark = annotation::parse_watermarks(cell)?,
            Column::Timestamp => self.timestamps = TimestampPair::parse(cell)?,
            Column::Beginning => self.timestamps.intro = annotation::parse_beginning(cell)?,
            Column::Category => self.category = annotation::parse_category(cell)?,
            Column::NewName => self.new_name = annotation::parse_optional_text(cell),
            Column::RawFps => self.raw_fps = annotation::parse_optional_float(cell)?,
            Column::RawResolution => {
                let value = annotation::parse_whole_number(cell)?;
                self.raw_resolution = u32::try_from(value)
                    .map_err(|_| ParseError::InvalidNumber(cell.to_string()))?;
            }
            Column::UsedTime => self.used_time = annotation::parse_whole_number(cell)?,
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct AnnotationStore {
    path: PathBuf,
    schema: Schema,
    rows: Vec<AnnotationRow>,
    extra_columns: Vec<String>,
    load_warnings: Vec<String>,
}

impl AnnotationStore {
    /// Reads the whole file. Missing schema columns are backfilled with
    /// defaults; cells that fail to parse fall back to the default and are
    /// reported through [`AnnotationStore::load_warnings`].
    pub fn load(path: &Path, schema: Schema) -> Result<Self, StoreError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;

        let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
        if !headers.iter().any(|h| h == KEY_COLUMN) {
            return Err(StoreError::MissingKeyColumn(path.to_path_buf()));
        }

        let mut known: HashMap<usize, Column> = HashMap::new();
        let mut extra_columns = Vec::new();
        let mut extra_indices = Vec::new();
        for (index, header) in headers.iter().enumerate() {
            match schema_columns(schema).iter().find(|c| c.name() == header) {
                Some(column) if !known.values().any(|c| c == column) => {
                    known.insert(index, *column);
                }
                _ => {
                    extra_columns.push(header.clone());
                    extra_indices.push(index);
                }
            }
        }

        let mut rows = Vec::new();
        let mut load_warnings = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record?;
            let mut row = AnnotationRow::new(String::new());
            for (index, column) in &known {
                let cell = record.get(*index).unwrap_or("");
                if let Err(e) = row.decode(*column, cell) {
                    load_warnings.push(format!(
                        "row {}: column {}: {} (using default)",
                        line + 1,
                        column.name(),
                        e
                    ));
                }
            }
            row.extra = extra_indices
                .iter()
                .map(|i| record.get(*i).unwrap_or("").to_string())
                .collect();
            rows.push(row);
        }

        for warning in &load_warnings {
            tracing::warn!(file = %path.display(), "{}", warning);
        }

        Ok(AnnotationStore {
            path: path.to_path_buf(),
            schema,
            rows,
            extra_columns,
            load_warnings,
        })
    }

    /// One default row per path, written out immediately.
    pub fn create(path: &Path, schema: Schema, video_paths: Vec<String>) -> Result<Self, StoreError> {
        let store = AnnotationStore {
            path: path.to_path_buf(),
            schema,
            rows: video_paths.into_iter().map(AnnotationRow::new).collect(),
            extra_columns: Vec::new(),
            load_warnings: Vec::new(),
        };
        store.save()?;
        tracing::info!(file = %path.display(), rows = store.rows.len(), "created annotation file");
        Ok(store)
    }

    /// Loads the file, or creates it from `discover` when it does not exist yet.
    /// The flag is true when the file was created.
    pub fn load_or_create<F>(path: &Path, schema: Schema, discover: F) -> Result<(Self, bool), StoreError>
    where
        F: FnOnce() -> Vec<String>,
    {
        if path.exists() {
            Ok((Self::load(path, schema)?, false))
        } else {
            Ok((Self::create(path, schema, discover())?, true))
        }
    }

    pub fn save(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let mut writer = csv::Writer::from_path(&self.path)?;
        let columns = schema_columns(self.schema);

        let mut header: Vec<&str> = columns.iter().map(|c| c.name()).collect();
        header.extend(self.extra_columns.iter().map(String::as_str));
        writer.write_record(&header)?;

        for row in &self.rows {
            let mut record: Vec<String> = columns.iter().map(|c| row.encode(*c)).collect();
            record.extend(
                (0..self.extra_columns.len()).map(|i| row.extra.get(i).cloned().unwrap_or_default()),
            );
            writer.write_record(&record)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Broadcast write: every row under `directory` takes `values`.
    /// Returns the number of rows touched.
    pub fn update_rows(&mut self, directory: &Path, values: &AnnotationValues) -> usize {
        let mut touched = 0;
        for row in self.rows.iter_mut().filter(|r| r.is_under(directory)) {
            row.apply(values);
            touched += 1;
        }
        touched
    }

    /// Fills the probed columns of every row under `directory`. Unknown values
    /// leave the existing cells alone.
    pub fn record_probe(&mut self, directory: &Path, fps: Option<f64>, resolution: Option<u32>) -> usize {
        let mut touched = 0;
        for row in self.rows.iter_mut().filter(|r| r.is_under(directory)) {
            if fps.is_some() {
                row.raw_fps = fps;
            }
            if let Some(resolution) = resolution {
                row.raw_resolution = resolution;
            }
            touched += 1;
        }
        touched
    }

    pub fn row(&self, video_path: &Path) -> Option<&AnnotationRow> {
        let key = video_path.to_string_lossy();
        self.rows.iter().find(|r| r.path == key)
    }

    pub fn rows(&self) -> &[AnnotationRow] {
        &self.rows
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> Schema {
        self.schema
    }

    pub fn extra_columns(&self) -> &[String] {
        &self.extra_columns
    }

    pub fn load_warnings(&self) -> &[String] {
        &self.load_warnings
    }
}
