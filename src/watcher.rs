//! Per-widget hot-reload file watcher.
//!
//! Grounded on `hot_reload.py`: one recursive watcher per widget directory,
//! filtered to front-end source and manifest extensions, debounced 200ms so
//! a burst of saves collapses into a single reload. The teacher's
//! `notify`-less codebase has no equivalent; this module is new, built in
//! the teacher's error-handling idiom (log and skip rather than propagate).

use log::{debug, warn};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::time::{Duration, Instant};

const DEBOUNCE: Duration = Duration::from_millis(200);

fn is_watched_extension(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(|e| e.to_lowercase()),
        Some(ext) if matches!(ext.as_str(), "html" | "css" | "js" | "json")
    )
}

struct WatchedWidget {
    _watcher: RecommendedWatcher,
    last_event: Instant,
    pending: bool,
}

/// Owns one `notify` watcher per registered widget and exposes a
/// debounced, drainable queue of widget names that need reloading.
pub struct HotReloadWatcher {
    widgets: Vec<(String, WatchedWidget)>,
    event_rx: Receiver<(String, Instant)>,
    event_tx: Sender<(String, Instant)>,
}

impl HotReloadWatcher {
    pub fn new() -> Self {
        let (event_tx, event_rx) = channel();
        Self {
            widgets: Vec::new(),
            event_rx,
            event_tx,
        }
    }

    /// Start watching `dir` recursively for a widget named `widget_name`.
    /// Failure to start a watcher is logged and the widget simply runs
    /// without hot reload, per spec.md §7.
    pub fn watch(&mut self, widget_name: &str, dir: &Path) {
        let name = widget_name.to_string();
        let tx = self.event_tx.clone();

        let result = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    warn!("watcher error for '{}': {}", name, e);
                    return;
                }
            };
            if !matches!(
                event.kind,
                EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
            ) {
                return;
            }
            if event.paths.iter().any(|p| is_watched_extension(p)) {
                let _ = tx.send((name.clone(), Instant::now()));
            }
        });

        let mut watcher = match result {
            Ok(w) => w,
            Err(e) => {
                warn!("failed to create watcher for '{}': {}", widget_name, e);
                return;
            }
        };

        if let Err(e) = watcher.watch(dir, RecursiveMode::Recursive) {
            warn!("failed to watch '{:?}' for '{}': {}", dir, widget_name, e);
            return;
        }

        debug!("watching '{:?}' for widget '{}'", dir, widget_name);
        self.widgets.push((
            widget_name.to_string(),
            WatchedWidget {
                _watcher: watcher,
                last_event: Instant::now(),
                pending: false,
            },
        ));
    }

    pub fn unwatch(&mut self, widget_name: &str) {
        self.widgets.retain(|(name, _)| name != widget_name);
    }

    /// Called once per main-loop tick: drains raw filesystem events into
    /// the per-widget debounce state, then returns the names of widgets
    /// whose debounce window has elapsed since their last event.
    pub fn poll_reloaded(&mut self) -> Vec<String> {
        for (name, at) in self.event_rx.try_iter().collect::<Vec<_>>() {
            if let Some((_, widget)) = self.widgets.iter_mut().find(|(n, _)| *n == name) {
                widget.last_event = at;
                widget.pending = true;
            }
        }

        let mut ready = Vec::new();
        for (name, widget) in &mut self.widgets {
            if widget.pending && widget.last_event.elapsed() >= DEBOUNCE {
                widget.pending = false;
                ready.push(name.clone());
            }
        }
        ready
    }
}

impl Default for HotReloadWatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watched_extensions() {
        assert!(is_watched_extension(Path::new("index.html")));
        assert!(is_watched_extension(Path::new("style.CSS")));
        assert!(is_watched_extension(Path::new("widget.json")));
        assert!(!is_watched_extension(Path::new("readme.md")));
        assert!(!is_watched_extension(Path::new("backend.py")));
    }

    #[test]
    fn unwatch_removes_widget() {
        let dir = tempfile::tempdir().unwrap();
        let mut watcher = HotReloadWatcher::new();
        watcher.watch("clock", dir.path());
        assert_eq!(watcher.widgets.len(), 1);
        watcher.unwatch("clock");
        assert_eq!(watcher.widgets.len(), 0);
    }

    #[test]
    fn poll_reloaded_empty_without_events() {
        let mut watcher = HotReloadWatcher::new();
        assert!(watcher.poll_reloaded().is_empty());
    }
}
