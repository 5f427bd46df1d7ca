//! Shell manager (C10): owns configuration and every other component,
//! runs the single ~60 Hz main loop, and dispatches hotkey/tray actions.
//!
//! Grounded directly on `shell_manager.py`'s `ShellManager` — the same
//! constructor order, the same `_handle_hotkey`/`_handle_tray_action`
//! dispatch tables, the same `run`/`shutdown` shape. `self.running` plus
//! `widget_manager.any_running()` gate the loop exactly as the teacher's
//! `while self.running and self.widget_manager.any_running()` does.

use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::time::Duration;

use crate::browser::BackendRegistry;
use crate::config::ShellConfig;
use crate::error::{ShellError, ShellResult};
use crate::hotkey::{HotkeyAction, HotkeyListener};
use crate::position_store::PositionStore;
use crate::system_services::SystemServices;
use crate::theme::Theme;
use crate::tray::{self, SystemTray, TrayWidgetEntry};
use crate::watcher::HotReloadWatcher;
use crate::widget_manager::WidgetManager;

const TICK: Duration = Duration::from_millis(16);
/// How often `collect_positions` samples current widget window rects into
/// the position store (≈1s at a 16ms tick) so `poll_save`'s ≈30s interval
/// always has a recent rect to flush, not just whatever was captured at
/// shutdown.
const POSITION_COLLECT_TICKS: u32 = 60;

pub struct ShellManager {
    config: ShellConfig,
    widgets_dir: PathBuf,
    theme: Theme,
    backends: BackendRegistry,

    widget_manager: WidgetManager,
    system_services: SystemServices,
    position_store: PositionStore,
    watcher: HotReloadWatcher,

    hotkeys: HotkeyListener,
    hotkey_sender: Option<Sender<HotkeyAction>>,

    tray: Option<SystemTray>,
    tray_receiver: Option<std::sync::mpsc::Receiver<HotkeyAction>>,
    tray_snapshot: tray::SharedTraySnapshot,

    position_poll_counter: u32,
    running: bool,
}

impl ShellManager {
    pub fn new(
        widgets_dir: PathBuf,
        config: ShellConfig,
        theme: Theme,
        backends: BackendRegistry,
    ) -> Self {
        let positions_path = widgets_dir
            .parent()
            .unwrap_or(Path::new("."))
            .join("widget_positions.json");

        let (hotkeys, hotkey_sender) = HotkeyListener::new();

        Self {
            config,
            widgets_dir,
            theme,
            backends,
            widget_manager: WidgetManager::new(),
            system_services: SystemServices::new(),
            position_store: PositionStore::new(positions_path),
            watcher: HotReloadWatcher::new(),
            hotkeys,
            hotkey_sender: Some(hotkey_sender),
            tray: None,
            tray_receiver: None,
            tray_snapshot: tray::new_shared_snapshot(),
            position_poll_counter: 0,
            running: true,
        }
    }

    /// Load widgets, start services, register hotkeys/tray, and run the
    /// main loop until quit or every widget has closed. Mirrors
    /// `shell_manager.py::run`.
    pub fn run(&mut self) -> ShellResult<()> {
        info!("PytoniumShell: starting");

        self.widget_manager.load_all(
            &self.widgets_dir,
            &self.theme,
            &self.backends,
            &self.position_store,
            &mut self.watcher,
        )?;

        if self.widget_manager.widgets().is_empty() {
            return Err(ShellError::NoWidgetsLoaded);
        }

        self.system_services.start();

        self.hotkeys.add(&self.config.dashboard_hotkey, HotkeyAction::ToggleDashboard);
        if let Some(chord) = &self.config.quit_hotkey {
            self.hotkeys.add(chord, HotkeyAction::Quit);
        }
        if let Some(chord) = &self.config.reload_hotkey {
            self.hotkeys.add(chord, HotkeyAction::ReloadAll);
        }
        for widget in self.widget_manager.widgets() {
            if let Some(chord) = &widget.manifest.hotkey {
                self.hotkeys.add(chord, HotkeyAction::ToggleWidget(widget.name.clone()));
            }
        }

        if let Some(sender) = self.hotkey_sender.take() {
            self.hotkeys.start(sender);
        }

        match SystemTray::start(self.tray_snapshot.clone()) {
            Some((tray, receiver)) => {
                self.tray = Some(tray);
                self.tray_receiver = Some(receiver);
            }
            None => warn!("system tray unavailable, continuing without one"),
        }

        let n_widgets = self.widget_manager.widgets().len();
        let n_dashboard = self
            .widget_manager
            .widgets()
            .iter()
            .filter(|w| w.mode == crate::manifest::WindowMode::Dashboard)
            .count();
        info!("{} widget(s) loaded ({} dashboard)", n_widgets, n_dashboard);

        while self.running && self.widget_manager.any_running() {
            self.tick();
            std::thread::sleep(TICK);
        }

        self.shutdown();
        Ok(())
    }

    /// One iteration of the main loop. Ordering per spec.md §5: hotkey
    /// drain, tray drain, widget update, system-services sample,
    /// position collection, position-store save.
    fn tick(&mut self) {
        for action in self.hotkeys.poll_triggered() {
            self.dispatch(action);
        }

        if let Some(receiver) = &self.tray_receiver {
            let actions: Vec<HotkeyAction> = receiver.try_iter().collect();
            for action in actions {
                self.dispatch(action);
            }
        }

        self.widget_manager.update();

        for reloaded in self.watcher.poll_reloaded() {
            self.widget_manager.reload_widget(&reloaded);
        }

        for update in self.system_services.poll() {
            self.widget_manager.push_state(update.namespace, update.key, update.value);
        }

        self.position_poll_counter += 1;
        if self.position_poll_counter >= POSITION_COLLECT_TICKS {
            self.position_poll_counter = 0;
            self.widget_manager.collect_positions(&self.position_store);
        }
        self.position_store.poll_save();

        self.refresh_tray_snapshot();
    }

    fn dispatch(&mut self, action: HotkeyAction) {
        match action {
            HotkeyAction::ToggleDashboard => self.widget_manager.toggle_dashboard(),
            HotkeyAction::ToggleWidget(name) => self.widget_manager.toggle_widget(&name),
            HotkeyAction::ReloadAll => {
                info!("reloading all widgets");
                self.widget_manager.reload_all();
            }
            HotkeyAction::Quit => {
                info!("quit requested");
                self.running = false;
            }
        }
    }

    fn refresh_tray_snapshot(&self) {
        let widgets: Vec<TrayWidgetEntry> = self
            .widget_manager
            .widgets()
            .iter()
            .map(|w| TrayWidgetEntry {
                name: w.name.clone(),
                mode: format!("{:?}", w.mode).to_lowercase(),
                visible: w.visible,
            })
            .collect();
        let has_dashboards = widgets.iter().any(|w| w.mode == "dashboard");
        *self.tray_snapshot.lock() = tray::TraySnapshot { widgets, has_dashboards };
    }

    /// Reverse of setup, per spec.md §4.1: collect positions, flush the
    /// store, stop tray/hotkeys/services, then tear down every widget.
    fn shutdown(&mut self) {
        info!("PytoniumShell: shutting down");

        self.widget_manager.collect_positions(&self.position_store);
        self.position_store.save();

        if let Some(mut tray) = self.tray.take() {
            tray.stop();
        }
        self.hotkeys.stop();
        self.system_services.stop();
        self.widget_manager.shutdown_all(&mut self.watcher);

        info!("PytoniumShell: done");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_shell_manager_starts_in_running_state() {
        let manager = ShellManager::new(
            PathBuf::from("widgets"),
            ShellConfig::default(),
            Theme::default(),
            BackendRegistry::new(),
        );
        assert!(manager.running);
    }
}
