//! Error types for PytoniumShell.

use thiserror::Error;

/// Errors surfaced by shell-kernel subsystems.
///
/// Per spec.md §7 almost all of these are caught at the call site, logged,
/// and downgraded to a skip or fallback; only a handful (see `shell::run`)
/// are allowed to propagate out of `main`.
#[derive(Error, Debug)]
pub enum ShellError {
    #[error("widgets directory not found: {0}")]
    WidgetsDirNotFound(String),

    #[error("manifest error in '{widget}': {reason}")]
    Manifest { widget: String, reason: String },

    #[error("no widgets loaded")]
    NoWidgetsLoaded,

    #[error("Windows API error: {0}")]
    WindowsApi(#[from] windows::core::Error),

    #[error("browser runtime error: {0}")]
    Browser(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ShellResult<T> = Result<T, ShellError>;
