//! PytoniumShell — a desktop widget framework composing independent
//! embedded-browser windows into a Windows desktop shell.
#![cfg_attr(not(test), windows_subsystem = "windows")]

mod browser;
mod cli;
mod config;
mod demos_backends;
mod error;
mod hotkey;
mod manifest;
mod position_store;
mod shell;
mod system_services;
mod theme;
mod tray;
mod utils;
mod watcher;
mod widget;
mod widget_manager;
mod win32;

use log::{error, info};
use std::path::PathBuf;

use crate::browser::BackendRegistry;
use crate::config::ShellConfig;
use crate::error::ShellError;
use crate::shell::ShellManager;
use crate::theme::Theme;

/// Widgets directory shipped next to the executable when `--widgets-dir`
/// is not given, analogous to the original's bundled `example_widgets`.
fn default_widgets_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.join("demos")))
        .unwrap_or_else(|| PathBuf::from("demos"))
}

fn default_themes_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.join("themes")))
        .unwrap_or_else(|| PathBuf::from("themes"))
}

fn main() {
    env_logger::builder()
        .parse_filters(&std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .format_timestamp_millis()
        .init();

    info!("PytoniumShell v{}", env!("CARGO_PKG_VERSION"));

    let args = match cli::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("pytonium-shell: {}", e);
            std::process::exit(2);
        }
    };

    win32::enable_dpi_awareness();

    let widgets_dir = args.widgets_dir.unwrap_or_else(default_widgets_dir);
    if !widgets_dir.is_dir() {
        error!("widgets directory not found: {}", widgets_dir.display());
        std::process::exit(1);
    }

    let config = match ShellConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("failed to load shell config: {}", e);
            std::process::exit(2);
        }
    };

    let theme = Theme::load(&args.theme, Some(&default_themes_dir()));

    let mut backends = BackendRegistry::new();
    demos_backends::register_all(&mut backends);

    let mut shell = ShellManager::new(widgets_dir, config, theme, backends);

    match shell.run() {
        Ok(()) => {
            info!("PytoniumShell exited cleanly");
        }
        Err(ShellError::NoWidgetsLoaded) => {
            error!("no widgets loaded, exiting");
            std::process::exit(1);
        }
        Err(e) => {
            error!("fatal error: {}", e);
            std::process::exit(1);
        }
    }
}
