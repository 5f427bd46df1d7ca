//! Widget manifest (`widget.json`) parsing.
//!
//! Mirrors the defaulting rules of spec.md §6 exactly. Unknown keys are
//! ignored (no `deny_unknown_fields`) so a widget author can carry
//! forward-looking fields without breaking the shell.

use serde::{Deserialize, Serialize};

fn default_entry() -> String {
    "index.html".to_string()
}

fn default_width() -> u32 {
    300
}

fn default_height() -> u32 {
    200
}

fn default_true() -> bool {
    true
}

/// Window composition mode, see GLOSSARY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WindowMode {
    #[default]
    Widget,
    Dashboard,
    Bar,
    Wallpaper,
}

/// Which screen edge a `bar`-mode widget docks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Anchor {
    #[default]
    Top,
    Bottom,
    Left,
    Right,
}

/// `"primary"` or a zero-based monitor index, per spec.md §3.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MonitorSpec {
    Primary(String),
    Index(i32),
}

impl Default for MonitorSpec {
    fn default() -> Self {
        MonitorSpec::Primary("primary".to_string())
    }
}

/// Initial `{x, y}` position for `widget` mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(default)]
    pub mode: WindowMode,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub always_on_top: bool,
    #[serde(default = "default_true")]
    pub show_in_taskbar: bool,
    /// `None` means "use the mode-dependent default" (false, except true
    /// for `wallpaper`) — see `Manifest::effective_click_through`.
    #[serde(default)]
    pub click_through: Option<bool>,
    #[serde(default)]
    pub transparent_background: bool,
    #[serde(default)]
    pub anchor: Anchor,
    #[serde(default = "default_true")]
    pub reserve_space: bool,
    #[serde(default)]
    pub monitor: MonitorSpec,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            mode: WindowMode::default(),
            width: default_width(),
            height: default_height(),
            position: None,
            always_on_top: false,
            show_in_taskbar: true,
            click_through: None,
            transparent_background: false,
            anchor: Anchor::default(),
            reserve_space: true,
            monitor: MonitorSpec::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default = "default_entry")]
    pub entry: String,
    #[serde(default)]
    pub backend: Option<String>,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub hotkey: Option<String>,
    #[serde(default)]
    pub state_namespaces: Vec<String>,
    #[serde(default)]
    pub hot_reload: bool,
}

impl Manifest {
    /// Parse a manifest from `widget.json` bytes. Malformed JSON is reported
    /// to the caller, which (per spec.md §7) skips the widget and logs.
    pub fn parse(bytes: &[u8]) -> serde_json::Result<Manifest> {
        serde_json::from_slice(bytes)
    }

    /// Resolve the `click_through` default, which depends on `mode` and so
    /// cannot be expressed as a plain serde field default.
    pub fn effective_click_through(&self) -> bool {
        self.window
            .click_through
            .unwrap_or(matches!(self.window.mode, WindowMode::Wallpaper))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let m = Manifest::parse(br#"{}"#).unwrap();
        assert_eq!(m.entry, "index.html");
        assert_eq!(m.window.mode, WindowMode::Widget);
        assert_eq!(m.window.width, 300);
        assert_eq!(m.window.height, 200);
        assert!(m.window.show_in_taskbar);
        assert!(m.window.reserve_space);
        assert!(!m.hot_reload);
        assert!(!m.effective_click_through());
    }

    #[test]
    fn wallpaper_defaults_click_through_true() {
        let m = Manifest::parse(br#"{"window":{"mode":"wallpaper"}}"#).unwrap();
        assert!(m.effective_click_through());
    }

    #[test]
    fn explicit_click_through_overrides_mode_default() {
        let m = Manifest::parse(br#"{"window":{"mode":"wallpaper","click_through":false}}"#)
            .unwrap();
        assert!(!m.effective_click_through());
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let m = Manifest::parse(br#"{"totally_unknown_field": 42, "entry": "app.html"}"#)
            .unwrap();
        assert_eq!(m.entry, "app.html");
    }

    #[test]
    fn monitor_spec_accepts_string_or_index() {
        let m = Manifest::parse(br#"{"window":{"monitor":"primary"}}"#).unwrap();
        assert_eq!(m.window.monitor, MonitorSpec::Primary("primary".into()));

        let m = Manifest::parse(br#"{"window":{"monitor":1}}"#).unwrap();
        assert_eq!(m.window.monitor, MonitorSpec::Index(1));
    }

    #[test]
    fn full_manifest_parses() {
        let json = br#"{
            "entry": "index.html",
            "backend": "system-monitor",
            "window": {
                "mode": "widget",
                "width": 200,
                "height": 80,
                "position": {"x": 100, "y": 200},
                "always_on_top": true,
                "show_in_taskbar": false
            },
            "state_namespaces": ["datetime"]
        }"#;
        let m = Manifest::parse(json).unwrap();
        assert_eq!(m.backend.as_deref(), Some("system-monitor"));
        assert_eq!(m.window.position, Some(Position { x: 100, y: 200 }));
        assert!(m.window.always_on_top);
        assert!(!m.window.show_in_taskbar);
        assert_eq!(m.state_namespaces, vec!["datetime".to_string()]);
    }
}
