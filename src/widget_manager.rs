//! Widget discovery, per-mode window setup, dashboard show/hide, per-widget
//! toggle, wallpaper health check, and orderly shutdown.
//!
//! This is the shell's largest component (spec.md §2 budgets it ~35% of
//! the core). Grounded directly on `widget_manager.py`'s control flow;
//! the raw `CreateWindowExW`/`RegisterClassExW` host-window creation is
//! grounded on the teacher's `window/manager.rs` (`register_window_class`,
//! `create_window`), generalized from one fixed bar window to one window
//! per widget.

use anyhow::Context;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use windows::core::PCWSTR;
use windows::Win32::Foundation::{HINSTANCE, HWND};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DispatchMessageW, LoadCursorW, PeekMessageW, RegisterClassExW,
    TranslateMessage, IDC_ARROW, MSG, PM_REMOVE, WNDCLASSEXW, WS_EX_LAYERED, WS_EX_NOACTIVATE,
    WS_EX_TOOLWINDOW, WS_EX_TOPMOST, WS_POPUP,
};

use crate::browser::{BackendRegistry, BrowserInstance};
use crate::error::{ShellError, ShellResult};
use crate::manifest::{Anchor, Manifest, WindowMode};
use crate::position_store::PositionStore;
use crate::theme::Theme;
use crate::watcher::HotReloadWatcher;
use crate::widget::WidgetInstance;
use crate::win32::{self, AppBarHandle, MonitorInfo};

const HOST_WINDOW_CLASS: &str = "PytoniumShellWidgetWindow";
const DASHBOARD_HIDE_DEADLINE: Duration = Duration::from_millis(300);
const WALLPAPER_CHECK_TICKS: u32 = 300;

/// Default dimensions synthesized when monitor enumeration returns nothing
/// (headless/RDP edge case), matching `_resolve_monitor`'s GetSystemMetrics
/// fallback in the Python source.
fn fallback_monitor() -> MonitorInfo {
    let size = crate::utils::get_screen_size();
    MonitorInfo {
        index: 0,
        x: 0,
        y: 0,
        width: size.width,
        height: size.height,
        work_x: 0,
        work_y: 0,
        work_width: size.width,
        work_height: size.height,
        is_primary: true,
    }
}

fn resolve_monitor(spec: &crate::manifest::MonitorSpec) -> MonitorInfo {
    let monitors = win32::enumerate_monitors();
    if monitors.is_empty() {
        return fallback_monitor();
    }
    win32::resolve_monitor(&monitors, spec).unwrap_or_else(fallback_monitor)
}

pub struct WidgetManager {
    widgets: Vec<WidgetInstance>,
    dashboard_names: Vec<String>,
    dashboard_visible: bool,
    pending_hide_deadline: Option<Instant>,
    wallpaper_check_counter: u32,
    window_class_registered: bool,
}

impl WidgetManager {
    pub fn new() -> Self {
        Self {
            widgets: Vec::new(),
            dashboard_names: Vec::new(),
            dashboard_visible: false,
            pending_hide_deadline: None,
            wallpaper_check_counter: 0,
            window_class_registered: false,
        }
    }

    /// Discover widgets under `widgets_dir` in sorted order. Failures to
    /// load an individual widget are logged and skipped; they never abort
    /// discovery (spec.md §4.2, §7).
    pub fn load_all(
        &mut self,
        widgets_dir: &Path,
        theme: &Theme,
        backends: &BackendRegistry,
        position_store: &PositionStore,
        watcher: &mut HotReloadWatcher,
    ) -> ShellResult<()> {
        if !widgets_dir.is_dir() {
            return Err(ShellError::WidgetsDirNotFound(widgets_dir.display().to_string()));
        }

        self.ensure_window_class()?;

        let mut entries: Vec<PathBuf> = std::fs::read_dir(widgets_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        entries.sort();

        for widget_path in entries {
            let manifest_path = widget_path.join("widget.json");
            if !manifest_path.is_file() {
                continue;
            }
            let name = widget_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            if self.widgets.iter().any(|w| w.name == name) {
                warn!("duplicate widget name '{}', skipping", name);
                continue;
            }

            let outcome = self
                .load_widget(&name, &widget_path, &manifest_path, theme, backends, position_store)
                .with_context(|| format!("loading widget '{}'", name));

            match outcome {
                Ok(instance) => {
                    info!("loaded widget '{}' (mode: {:?})", name, instance.mode);
                    if instance.manifest.hot_reload {
                        watcher.watch(&name, &widget_path);
                    }
                    if instance.mode == WindowMode::Dashboard {
                        self.dashboard_names.push(name.clone());
                    }
                    self.widgets.push(instance);
                }
                Err(e) => warn!("{:#}", e),
            }
        }

        Ok(())
    }

    fn ensure_window_class(&mut self) -> ShellResult<()> {
        if self.window_class_registered {
            return Ok(());
        }
        unsafe {
            let hinstance: HINSTANCE = GetModuleHandleW(None)?.into();
            let class_name = crate::utils::to_wide_string(HOST_WINDOW_CLASS);
            let wc = WNDCLASSEXW {
                cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
                lpfnWndProc: Some(windows::Win32::UI::WindowsAndMessaging::DefWindowProcW),
                hInstance: hinstance,
                hCursor: LoadCursorW(None, IDC_ARROW)?,
                lpszClassName: crate::utils::to_pcwstr(&class_name),
                ..Default::default()
            };
            if RegisterClassExW(&wc) == 0 {
                return Err(ShellError::WindowsApi(windows::core::Error::from_win32()));
            }
        }
        self.window_class_registered = true;
        Ok(())
    }

    fn create_host_window(&self, x: i32, y: i32, width: i32, height: i32) -> ShellResult<HWND> {
        unsafe {
            let hinstance: HINSTANCE = GetModuleHandleW(None)?.into();
            let class_name = crate::utils::to_wide_string(HOST_WINDOW_CLASS);
            let hwnd = CreateWindowExW(
                WS_EX_TOPMOST | WS_EX_TOOLWINDOW | WS_EX_LAYERED | WS_EX_NOACTIVATE,
                crate::utils::to_pcwstr(&class_name),
                PCWSTR::null(),
                WS_POPUP,
                x,
                y,
                width,
                height,
                None,
                None,
                hinstance,
                None,
            )?;
            win32::apply_windows11_chrome(hwnd);
            Ok(hwnd)
        }
    }

    fn load_widget(
        &self,
        name: &str,
        widget_path: &Path,
        manifest_path: &Path,
        theme: &Theme,
        backends: &BackendRegistry,
        position_store: &PositionStore,
    ) -> ShellResult<WidgetInstance> {
        let bytes = std::fs::read(manifest_path)?;
        let manifest = Manifest::parse(&bytes).map_err(|e| ShellError::Manifest {
            widget: name.to_string(),
            reason: e.to_string(),
        })?;

        let entry_path = widget_path.join(&manifest.entry);
        let entry_url = format!("file:///{}", entry_path.display().to_string().replace('\\', "/"));

        let backend = manifest
            .backend
            .as_ref()
            .and_then(|backend_name| backends.create(backend_name));
        if manifest.backend.is_some() && backend.is_none() {
            warn!("widget '{}' names backend '{}' which is not registered", name, manifest.backend.as_deref().unwrap());
        }

        let mut instance = match manifest.window.mode {
            WindowMode::Widget => self.setup_widget_mode(name, &manifest, &entry_url, backend, position_store)?,
            WindowMode::Dashboard => self.setup_dashboard_mode(name, &manifest, &entry_url, backend)?,
            WindowMode::Bar => self.setup_bar_mode(name, &manifest, &entry_url, backend)?,
            WindowMode::Wallpaper => self.setup_wallpaper_mode(name, &manifest, &entry_url, backend)?,
        };

        instance.browser.execute_script(&theme.inject_script());
        Ok(instance)
    }

    fn setup_widget_mode(
        &self,
        name: &str,
        manifest: &Manifest,
        entry_url: &str,
        backend: Option<Box<dyn crate::browser::WidgetBackend>>,
        position_store: &PositionStore,
    ) -> ShellResult<WidgetInstance> {
        let width = manifest.window.width as i32;
        let height = manifest.window.height as i32;
        let (mut x, mut y) = manifest
            .window
            .position
            .map(|p| (p.x, p.y))
            .unwrap_or((0, 0));
        let mut final_width = width;
        let mut final_height = height;

        if let Some(saved) = position_store.get_position(name) {
            x = saved.x;
            y = saved.y;
            final_width = saved.width as i32;
            final_height = saved.height as i32;
        }

        let hwnd = self.create_host_window(x, y, final_width, final_height)?;

        if manifest.window.always_on_top {
            win32::make_always_on_top(hwnd);
        }
        if !manifest.window.show_in_taskbar {
            win32::hide_from_taskbar(hwnd);
        }
        if manifest.effective_click_through() {
            win32::make_click_through(hwnd);
        }
        win32::set_position(hwnd, x, y, final_width, final_height);
        win32::show_window(hwnd);

        let browser = BrowserInstance::new(hwnd, entry_url, manifest.window.transparent_background, backend)?;
        Ok(WidgetInstance::new(name.to_string(), manifest.clone(), browser))
    }

    fn setup_dashboard_mode(
        &self,
        name: &str,
        manifest: &Manifest,
        entry_url: &str,
        backend: Option<Box<dyn crate::browser::WidgetBackend>>,
    ) -> ShellResult<WidgetInstance> {
        let monitor = resolve_monitor(&manifest.window.monitor);
        let hwnd = self.create_host_window(monitor.x, monitor.y, monitor.width, monitor.height)?;

        win32::make_always_on_top(hwnd);
        win32::hide_from_taskbar(hwnd);
        win32::set_position(hwnd, monitor.x, monitor.y, monitor.width, monitor.height);
        win32::hide_window(hwnd);

        let browser = BrowserInstance::new(hwnd, entry_url, manifest.window.transparent_background, backend)?;
        let mut instance = WidgetInstance::new(name.to_string(), manifest.clone(), browser);
        instance.visible = false;
        Ok(instance)
    }

    fn setup_bar_mode(
        &self,
        name: &str,
        manifest: &Manifest,
        entry_url: &str,
        backend: Option<Box<dyn crate::browser::WidgetBackend>>,
    ) -> ShellResult<WidgetInstance> {
        let anchor = manifest.window.anchor;
        let bar_size = manifest.window.height as i32;
        let monitor = resolve_monitor(&manifest.window.monitor);

        let (width, height) = match anchor {
            Anchor::Top | Anchor::Bottom => (monitor.width, bar_size),
            Anchor::Left | Anchor::Right => (bar_size, monitor.height),
        };

        let (x, y) = bar_fallback_position(anchor, bar_size, &monitor);
        let hwnd = self.create_host_window(x, y, width, height)?;

        win32::make_always_on_top(hwnd);
        win32::hide_from_taskbar(hwnd);

        let mut appbar = None;
        if manifest.window.reserve_space {
            match win32::register_appbar(hwnd, anchor, bar_size, monitor) {
                Ok(handle) => appbar = Some(handle),
                Err(e) => {
                    warn!("AppBar registration failed for '{}': {}, falling back to direct positioning", name, e);
                    win32::set_position(hwnd, x, y, width, height);
                }
            }
        } else {
            win32::set_position(hwnd, x, y, width, height);
        }
        win32::show_window(hwnd);

        let browser = BrowserInstance::new(hwnd, entry_url, manifest.window.transparent_background, backend)?;
        let mut instance = WidgetInstance::new(name.to_string(), manifest.clone(), browser);
        instance.appbar = appbar;
        Ok(instance)
    }

    fn setup_wallpaper_mode(
        &self,
        name: &str,
        manifest: &Manifest,
        entry_url: &str,
        backend: Option<Box<dyn crate::browser::WidgetBackend>>,
    ) -> ShellResult<WidgetInstance> {
        let monitor = resolve_monitor(&manifest.window.monitor);
        let hwnd = self.create_host_window(monitor.x, monitor.y, monitor.width, monitor.height)?;

        win32::hide_from_taskbar(hwnd);
        let became_wallpaper = win32::make_wallpaper(hwnd, monitor);
        if !became_wallpaper {
            warn!("wallpaper mode failed for '{}', falling back to a visible window", name);
        } else if manifest.effective_click_through() {
            // Only applied on success, per spec.md §7: a failed reparent must
            // not leave a ghost click-through window behind.
            win32::make_click_through(hwnd);
        }
        win32::show_window(hwnd);

        let browser = BrowserInstance::new(hwnd, entry_url, manifest.window.transparent_background, backend)?;
        let mut instance = WidgetInstance::new(name.to_string(), manifest.clone(), browser);
        instance.is_wallpaper = became_wallpaper;
        Ok(instance)
    }

    // -- Dashboard toggle -------------------------------------------------

    pub fn toggle_dashboard(&mut self) {
        if self.dashboard_visible {
            self.hide_dashboard();
        } else {
            self.show_dashboard();
        }
    }

    pub fn show_dashboard(&mut self) {
        self.dashboard_visible = true;
        self.pending_hide_deadline = None;
        for name in self.dashboard_names.clone() {
            if let Some(w) = self.widgets.iter_mut().find(|w| w.name == name) {
                win32::show_window(w.browser.hwnd());
                w.browser.execute_script(
                    "document.body.classList.remove('fade-out');document.body.classList.add('fade-in');",
                );
                w.visible = true;
            }
        }
    }

    pub fn hide_dashboard(&mut self) {
        self.dashboard_visible = false;
        for name in self.dashboard_names.clone() {
            if let Some(w) = self.widgets.iter_mut().find(|w| w.name == name) {
                w.browser.execute_script(
                    "document.body.classList.remove('fade-in');document.body.classList.add('fade-out');",
                );
            }
        }
        self.pending_hide_deadline = Some(Instant::now() + DASHBOARD_HIDE_DEADLINE);
    }

    fn check_pending_hide(&mut self) {
        let Some(deadline) = self.pending_hide_deadline else { return };
        if Instant::now() < deadline {
            return;
        }
        self.pending_hide_deadline = None;
        if self.dashboard_visible {
            return;
        }
        for name in self.dashboard_names.clone() {
            if let Some(w) = self.widgets.iter_mut().find(|w| w.name == name) {
                win32::hide_window(w.browser.hwnd());
                w.visible = false;
            }
        }
    }

    // -- Per-widget toggle --------------------------------------------------

    pub fn toggle_widget(&mut self, widget_name: &str) {
        if let Some(w) = self.widgets.iter_mut().find(|w| w.name == widget_name) {
            if w.visible {
                win32::hide_window(w.browser.hwnd());
                w.visible = false;
            } else {
                win32::show_window(w.browser.hwnd());
                w.visible = true;
            }
        }
    }

    // -- Wallpaper health check ----------------------------------------------

    fn check_wallpaper_health(&mut self) {
        for w in self.widgets.iter_mut().filter(|w| w.is_wallpaper) {
            let hwnd = w.browser.hwnd();
            if !win32::is_wallpaper_parent_valid(hwnd) {
                let monitor = resolve_monitor(&w.manifest.window.monitor);
                win32::make_wallpaper(hwnd, monitor);
            }
        }
    }

    // -- Reload all -----------------------------------------------------------

    pub fn reload_widget(&self, name: &str) {
        if let Some(w) = self.widgets.iter().find(|w| w.name == name) {
            if w.browser.is_running() {
                w.browser.reload();
            }
        }
    }

    pub fn reload_all(&self) {
        for w in &self.widgets {
            if w.browser.is_running() {
                w.browser.reload();
            }
        }
    }

    // -- State push -----------------------------------------------------------

    pub fn push_state(&self, namespace: &str, key: &str, value: serde_json::Value) {
        for w in self.widgets.iter().filter(|w| w.subscribes_to(namespace)) {
            w.browser.set_state(namespace, key, value.clone());
        }
    }

    // -- Update loop ----------------------------------------------------------

    /// Called once per tick. Drains every pending message on this thread's
    /// queue non-blockingly, which is the one `update_message_loop` call
    /// spec.md §5/§8 property 5 requires: every widget's host `HWND` (and
    /// therefore its WebView2 child) was created on this thread, so they
    /// all share the same thread message queue — pumping it once services
    /// every widget regardless of how many are running, mirroring the
    /// teacher's `run_message_loop`, made non-blocking for the 60 Hz tick.
    pub fn update(&mut self) {
        let mut msg = MSG::default();
        unsafe {
            while PeekMessageW(&mut msg, HWND(0), 0, 0, PM_REMOVE).as_bool() {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }

        self.check_pending_hide();

        self.wallpaper_check_counter += 1;
        if self.wallpaper_check_counter >= WALLPAPER_CHECK_TICKS {
            self.wallpaper_check_counter = 0;
            self.check_wallpaper_health();
        }
    }

    pub fn any_running(&self) -> bool {
        self.widgets.iter().any(|w| w.browser.is_running())
    }

    pub fn widgets(&self) -> &[WidgetInstance] {
        &self.widgets
    }

    pub fn collect_positions(&self, position_store: &PositionStore) {
        for w in self.widgets.iter().filter(|w| w.mode == WindowMode::Widget) {
            if !w.browser.is_running() {
                continue;
            }
            let (x, y) = w.browser.window_position();
            let (width, height) = w.browser.window_size();
            position_store.update_position(&w.name, x, y, width, height);
        }
    }

    // -- Shutdown ---------------------------------------------------------

    pub fn shutdown_all(&mut self, watcher: &mut HotReloadWatcher) {
        for w in &self.widgets {
            watcher.unwatch(&w.name);
        }

        for w in &mut self.widgets {
            if let Some(appbar) = w.appbar.take() {
                win32::unregister_appbar(appbar);
            }
        }

        for w in &self.widgets {
            if w.is_wallpaper {
                win32::restore_from_wallpaper(w.browser.hwnd());
            }
        }

        self.widgets.clear();
        self.dashboard_names.clear();
    }
}

impl Default for WidgetManager {
    fn default() -> Self {
        Self::new()
    }
}

fn bar_fallback_position(anchor: Anchor, bar_size: i32, monitor: &MonitorInfo) -> (i32, i32) {
    match anchor {
        Anchor::Top => (monitor.x, monitor.y),
        Anchor::Bottom => (monitor.x, monitor.y + monitor.height - bar_size),
        Anchor::Left => (monitor.x, monitor.y),
        Anchor::Right => (monitor.x + monitor.width - bar_size, monitor.y),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::MonitorSpec;

    fn monitor(width: i32, height: i32) -> MonitorInfo {
        MonitorInfo {
            index: 0,
            x: 0,
            y: 0,
            width,
            height,
            work_x: 0,
            work_y: 0,
            work_width: width,
            work_height: height,
            is_primary: true,
        }
    }

    #[test]
    fn bar_fallback_top_covers_top_edge() {
        let m = monitor(1920, 1080);
        assert_eq!(bar_fallback_position(Anchor::Top, 36, &m), (0, 0));
    }

    #[test]
    fn bar_fallback_bottom_sits_at_monitor_bottom() {
        let m = monitor(1920, 1080);
        assert_eq!(bar_fallback_position(Anchor::Bottom, 36, &m), (0, 1044));
    }

    #[test]
    fn bar_fallback_right_sits_at_monitor_right() {
        let m = monitor(1920, 1080);
        assert_eq!(bar_fallback_position(Anchor::Right, 40, &m), (1880, 0));
    }

    #[test]
    fn fallback_monitor_is_marked_primary() {
        assert!(fallback_monitor().is_primary);
    }

    #[test]
    fn new_manager_has_no_widgets() {
        let manager = WidgetManager::new();
        assert!(manager.widgets().is_empty());
        assert!(!manager.any_running());
    }

    #[test]
    fn monitor_spec_default_is_primary() {
        assert_eq!(MonitorSpec::default(), MonitorSpec::Primary("primary".to_string()));
    }
}
