// atva (andrew's tool for video annotation)
// Copyright (C) 2025 Andrew Nissen

//! Per-operator navigation state, carried between requests in a cookie.

use base64::{Engine, engine::general_purpose};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SESSION_COOKIE: &str = "atva_session";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NavWarning {
    #[error("Already at the first directory")]
    AtFirst,
    #[error("Already at the last directory")]
    AtLast,
    #[error("Selection {index} is out of range (only {len} available)")]
    OutOfRange { index: usize, len: usize },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SessionState {
    pub task_index: usize,
    pub item_index: usize,
    pub refresh_counter: u64,
    /// When the operator arrived at the current item; used for `used_time`.
    pub item_started_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(now: DateTime<Utc>) -> Self {
        SessionState {
            task_index: 0,
            item_index: 0,
            refresh_counter: 0,
            item_started_at: now,
        }
    }

    fn move_to_item(&mut self, index: usize, now: DateTime<Utc>) {
        if index != self.item_index {
            self.item_index = index;
            self.item_started_at = now;
        }
    }

    pub fn previous(&mut self, now: DateTime<Utc>) -> Result<(), NavWarning> {
        if self.item_index == 0 {
            return Err(NavWarning::AtFirst);
        }
        self.move_to_item(self.item_index - 1, now);
        Ok(())
    }

    pub fn next(&mut self, item_count: usize, now: DateTime<Utc>) -> Result<(), NavWarning> {
        if self.item_index + 1 >= item_count {
            return Err(NavWarning::AtLast);
        }
        self.move_to_item(self.item_index + 1, now);
        Ok(())
    }

    pub fn select_item(&mut self, index: usize, item_count: usize, now: DateTime<Utc>) -> Result<(), NavWarning> {
        if index >= item_count {
            return Err(NavWarning::OutOfRange { index, len: item_count });
        }
        self.move_to_item(index, now);
        Ok(())
    }

    pub fn select_task(&mut self, index: usize, task_count: usize, now: DateTime<Utc>) -> Result<(), NavWarning> {
        if index >= task_count {
            return Err(NavWarning::OutOfRange { index, len: task_count });
        }
        if index != self.task_index {
            self.task_index = index;
            self.item_index = 0;
            self.item_started_at = now;
        }
        Ok(())
    }

    pub fn refresh(&mut self) {
        self.refresh_counter = self.refresh_counter.wrapping_add(1);
    }

    /// Pulls indices back into range after directories disappeared on disk.
    pub fn clamp(&mut self, task_count: usize, item_count: Option<usize>, now: DateTime<Utc>) {
        if task_count > 0 && self.task_index >= task_count {
            self.task_index = task_count - 1;
            self.item_index = 0;
            self.item_started_at = now;
        }
        if let Some(item_count) = item_count
            && item_count > 0
            && self.item_index >= item_count
        {
            self.move_to_item(item_count - 1, now);
        }
    }

    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> u64 {
        (now - self.item_started_at).num_seconds().max(0) as u64
    }

    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        general_purpose::URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(value: &str) -> Option<Self> {
        let bytes = general_purpose::URL_SAFE_NO_PAD.decode(value).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}
