//! Persists widget window positions/sizes across shell restarts.
//!
//! Grounded on `position_store.py`: an in-memory map flushed to JSON on a
//! dirty-bit plus interval, not on every move.

use log::warn;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SavedPosition {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

struct Inner {
    positions: HashMap<String, SavedPosition>,
    dirty: bool,
    last_save: Instant,
}

/// Thread-safe; `update_position` (via `WidgetManager::collect_positions`)
/// and `poll_save` are both called once per main-loop tick, throttled so
/// neither samples window rects nor flushes to disk on every tick.
pub struct PositionStore {
    store_path: PathBuf,
    save_interval: Duration,
    inner: Mutex<Inner>,
}

impl PositionStore {
    pub fn new(store_path: PathBuf) -> Self {
        let positions = Self::load(&store_path);
        Self {
            store_path,
            save_interval: Duration::from_secs(30),
            inner: Mutex::new(Inner {
                positions,
                dirty: false,
                last_save: Instant::now(),
            }),
        }
    }

    fn load(path: &PathBuf) -> HashMap<String, SavedPosition> {
        if !path.is_file() {
            return HashMap::new();
        }
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => HashMap::new(),
        }
    }

    pub fn get_position(&self, widget_name: &str) -> Option<SavedPosition> {
        self.inner.lock().positions.get(widget_name).copied()
    }

    pub fn update_position(&self, widget_name: &str, x: i32, y: i32, width: u32, height: u32) {
        let mut inner = self.inner.lock();
        inner
            .positions
            .insert(widget_name.to_string(), SavedPosition { x, y, width, height });
        inner.dirty = true;
    }

    /// Called once per main-loop tick. Flushes to disk if dirty and the
    /// save interval has elapsed.
    pub fn poll_save(&self) {
        let should_save = {
            let inner = self.inner.lock();
            inner.dirty && inner.last_save.elapsed() >= self.save_interval
        };
        if should_save {
            self.save();
        }
    }

    pub fn save(&self) {
        let mut inner = self.inner.lock();
        if let Some(parent) = self.store_path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!("position store: failed to create directory: {}", e);
                return;
            }
        }
        match serde_json::to_string_pretty(&inner.positions) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.store_path, json) {
                    warn!("position store: failed to save: {}", e);
                    return;
                }
                inner.dirty = false;
                inner.last_save = Instant::now();
            }
            Err(e) => warn!("position store: failed to serialize: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = PositionStore::new(dir.path().join("positions.json"));
        assert!(store.get_position("clock").is_none());
    }

    #[test]
    fn update_then_save_then_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("positions.json");

        let store = PositionStore::new(path.clone());
        store.update_position("clock", 10, 20, 200, 80);
        store.save();

        let reloaded = PositionStore::new(path);
        let pos = reloaded.get_position("clock").unwrap();
        assert_eq!((pos.x, pos.y, pos.width, pos.height), (10, 20, 200, 80));
    }

    #[test]
    fn poll_save_skips_when_not_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("positions.json");
        let store = PositionStore::new(path.clone());
        store.poll_save();
        assert!(!path.exists());
    }

    #[test]
    fn corrupt_file_falls_back_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("positions.json");
        std::fs::write(&path, "not json").unwrap();
        let store = PositionStore::new(path);
        assert!(store.get_position("anything").is_none());
    }
}
