//! A single loaded widget: its manifest, embedded browser, and
//! mode-specific resources. Grounded on `widget_instance.py`.

use crate::browser::BrowserInstance;
use crate::manifest::{Manifest, WindowMode};
use crate::win32::AppBarHandle;

/// Opaque runtime record binding one browser instance to its manifest,
/// backend, watcher, and mode-specific resources (spec.md §3 "Widget
/// instance"). Owned exclusively by the widget manager.
pub struct WidgetInstance {
    pub name: String,
    pub manifest: Manifest,
    pub browser: BrowserInstance,
    pub mode: WindowMode,
    pub visible: bool,
    pub is_wallpaper: bool,
    pub appbar: Option<AppBarHandle>,
}

impl WidgetInstance {
    pub fn new(name: String, manifest: Manifest, browser: BrowserInstance) -> Self {
        let mode = manifest.window.mode;
        Self {
            name,
            manifest,
            browser,
            mode,
            visible: true,
            is_wallpaper: false,
            appbar: None,
        }
    }

    /// True if this widget subscribed to `namespace` via its manifest's
    /// `state_namespaces`.
    pub fn subscribes_to(&self, namespace: &str) -> bool {
        self.manifest.state_namespaces.iter().any(|n| n == namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Manifest;

    fn dummy_manifest() -> Manifest {
        Manifest::parse(br#"{"state_namespaces": ["datetime"]}"#).unwrap()
    }

    #[test]
    fn subscribes_to_reflects_manifest() {
        let manifest = dummy_manifest();
        assert!(manifest.state_namespaces.iter().any(|n| n == "datetime"));
        assert!(!manifest.state_namespaces.iter().any(|n| n == "system"));
    }
}
