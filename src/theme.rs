//! Theme loading and CSS custom-property injection.
//!
//! Grounded on `theme.py`: a built-in default (Tokyo Night) plus an
//! optional `<name>.json` lookup under a themes directory, flattened into
//! a single `:root { --shell-<key>: <value>; … }` style block injected
//! into each widget's web view once it becomes ready. Spec.md's theme is
//! JSON-driven only, so the teacher's OS dark-mode registry detection
//! (`detect_system_dark_mode`) and its fixed light/dark `Theme` structs
//! have no counterpart here and are dropped.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeFont {
    pub family: String,
    pub size: String,
}

impl Default for ThemeFont {
    fn default() -> Self {
        Self {
            family: "'Segoe UI', 'JetBrains Mono', 'Consolas', monospace".to_string(),
            size: "13px".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Theme {
    pub name: String,
    #[serde(default)]
    pub colors: BTreeMap<String, String>,
    #[serde(default)]
    pub font: ThemeFont,
    #[serde(default = "default_radius")]
    pub border_radius: String,
}

fn default_radius() -> String {
    "12px".to_string()
}

impl Default for Theme {
    /// The built-in "Tokyo Night" theme, used when no `--theme` is given
    /// or the named theme file can't be found/parsed.
    fn default() -> Self {
        let mut colors = BTreeMap::new();
        colors.insert("background".to_string(), "rgba(26, 27, 38, 0.85)".to_string());
        colors.insert("foreground".to_string(), "#a9b1d6".to_string());
        colors.insert("accent".to_string(), "#7aa2f7".to_string());
        colors.insert("accent2".to_string(), "#bb9af7".to_string());
        colors.insert("success".to_string(), "#9ece6a".to_string());
        colors.insert("warning".to_string(), "#e0af68".to_string());
        colors.insert("error".to_string(), "#f7768e".to_string());
        colors.insert("muted".to_string(), "#565f89".to_string());
        colors.insert("border".to_string(), "rgba(255, 255, 255, 0.08)".to_string());

        Self {
            name: "Tokyo Night".to_string(),
            colors,
            font: ThemeFont::default(),
            border_radius: default_radius(),
        }
    }
}

impl Theme {
    /// Load `<name>.json` from `themes_dir`, falling back to the built-in
    /// default when `name` is `"default"`, the file is missing, or it
    /// fails to parse (logged, per spec.md §7).
    pub fn load(name: &str, themes_dir: Option<&Path>) -> Theme {
        if name == "default" {
            return Theme::default();
        }

        let Some(dir) = themes_dir else {
            warn!("theme '{}' requested but no themes directory configured, using default", name);
            return Theme::default();
        };

        let path = dir.join(format!("{}.json", name));
        if !path.is_file() {
            warn!("theme file not found: {:?}, using default", path);
            return Theme::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(theme) => {
                    info!("loaded theme '{}' from {:?}", name, path);
                    theme
                }
                Err(e) => {
                    warn!("failed to parse theme {:?}: {}, using default", path, e);
                    Theme::default()
                }
            },
            Err(e) => {
                warn!("failed to read theme {:?}: {}, using default", path, e);
                Theme::default()
            }
        }
    }

    /// Build the `:root { --shell-key: value; … }` CSS block for this theme.
    pub fn css_block(&self) -> String {
        let mut parts: Vec<String> = self
            .colors
            .iter()
            .map(|(key, val)| format!("--shell-{}: {}", key, val))
            .collect();
        parts.push(format!("--shell-font: {}", self.font.family));
        parts.push(format!("--shell-font-size: {}", self.font.size));
        parts.push(format!("--shell-radius: {}", self.border_radius));
        format!(":root {{ {} }}", parts.join("; "))
    }

    /// Build the JS snippet a `BrowserInstance` runs once its page loads,
    /// injecting the theme as a `<style>` element.
    pub fn inject_script(&self) -> String {
        let css = self.css_block().replace('\'', "\\'");
        format!(
            "document.head.insertAdjacentHTML('beforeend', '<style>{}</style>')",
            css
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_theme_has_expected_colors() {
        let theme = Theme::default();
        assert_eq!(theme.colors.get("accent").unwrap(), "#7aa2f7");
        assert_eq!(theme.border_radius, "12px");
    }

    #[test]
    fn css_block_contains_every_color() {
        let theme = Theme::default();
        let css = theme.css_block();
        for key in theme.colors.keys() {
            assert!(css.contains(&format!("--shell-{}", key)));
        }
        assert!(css.contains("--shell-font:"));
        assert!(css.contains("--shell-radius:"));
    }

    #[test]
    fn load_missing_theme_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let theme = Theme::load("nonexistent", Some(dir.path()));
        assert_eq!(theme.name, "Tokyo Night");
    }

    #[test]
    fn load_custom_theme_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("neon.json"),
            r#"{"name": "Neon", "colors": {"accent": "#ff00ff"}}"#,
        )
        .unwrap();

        let theme = Theme::load("neon", Some(dir.path()));
        assert_eq!(theme.name, "Neon");
        assert_eq!(theme.colors.get("accent").unwrap(), "#ff00ff");
        // Unset fields still carry their own defaults.
        assert_eq!(theme.border_radius, "12px");
    }

    #[test]
    fn inject_script_escapes_single_quotes() {
        let theme = Theme::default();
        let script = theme.inject_script();
        assert!(script.starts_with("document.head.insertAdjacentHTML"));
        assert!(script.contains("\\'"));
    }
}
