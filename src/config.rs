//! Shell-level configuration (`shell_config.json`).
//!
//! Keeps the teacher's `load_or_default`/path-resolution shape but swaps
//! TOML for JSON (spec.md names JSON as the shell's config format) and
//! narrows the schema to the hotkey chords spec.md §6 lists. Grounded on
//! `shell_manager.py`'s `load_config`: only `dashboard_hotkey` carries a
//! built-in default, `quit_hotkey` and `reload_hotkey` register nothing
//! unless the config names them.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ShellResult;

fn default_dashboard_hotkey() -> String {
    "ctrl+alt+d".to_string()
}

/// Shell-wide settings, distinct from a per-widget [`crate::manifest::Manifest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    #[serde(default = "default_dashboard_hotkey")]
    pub dashboard_hotkey: String,
    #[serde(default)]
    pub quit_hotkey: Option<String>,
    #[serde(default)]
    pub reload_hotkey: Option<String>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            dashboard_hotkey: default_dashboard_hotkey(),
            quit_hotkey: None,
            reload_hotkey: None,
        }
    }
}

impl ShellConfig {
    /// Default per-user config file location, used when `--config` is absent.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pytonium-shell")
            .join("shell_config.json")
    }

    /// Load `path` if given (error if it doesn't parse), otherwise fall back
    /// to the default per-user path if present, otherwise built-in defaults.
    /// Matches spec.md §6: "optional JSON; defaults applied for missing keys".
    pub fn load(path: Option<&Path>) -> ShellResult<Self> {
        if let Some(path) = path {
            info!("loading shell config from {:?}", path);
            let content = std::fs::read_to_string(path)?;
            let config: ShellConfig = serde_json::from_str(&content)?;
            return Ok(config);
        }

        let default_path = Self::default_path();
        if default_path.exists() {
            info!("loading shell config from {:?}", default_path);
            match std::fs::read_to_string(&default_path)
                .map_err(crate::error::ShellError::from)
                .and_then(|content| {
                    serde_json::from_str(&content).map_err(crate::error::ShellError::from)
                }) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    warn!("failed to parse {:?}, using defaults: {}", default_path, e);
                }
            }
        }

        Ok(Self::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let c = ShellConfig::default();
        assert_eq!(c.dashboard_hotkey, "ctrl+alt+d");
        assert!(c.quit_hotkey.is_none());
        assert!(c.reload_hotkey.is_none());
    }

    #[test]
    fn partial_json_fills_remaining_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shell_config.json");
        std::fs::write(&path, r#"{"dashboard_hotkey": "ctrl+alt+w"}"#).unwrap();

        let c = ShellConfig::load(Some(&path)).unwrap();
        assert_eq!(c.dashboard_hotkey, "ctrl+alt+w");
        assert!(c.quit_hotkey.is_none());
    }

    #[test]
    fn explicit_quit_and_reload_hotkeys_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shell_config.json");
        std::fs::write(
            &path,
            r#"{"quit_hotkey": "ctrl+alt+q", "reload_hotkey": "ctrl+alt+r"}"#,
        )
        .unwrap();

        let c = ShellConfig::load(Some(&path)).unwrap();
        assert_eq!(c.quit_hotkey.as_deref(), Some("ctrl+alt+q"));
        assert_eq!(c.reload_hotkey.as_deref(), Some("ctrl+alt+r"));
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does_not_exist.json");
        assert!(ShellConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn no_path_and_no_default_file_uses_defaults() {
        let c = ShellConfig::load(None).unwrap();
        // Exercises the no-explicit-path branch without assuming a
        // per-user config happens to exist on the test machine.
        assert!(!c.dashboard_hotkey.is_empty());
    }
}
