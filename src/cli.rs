//! Command-line argument parsing.
//!
//! Per spec.md §1's scope note the CLI parser is an out-of-scope "standard
//! library" concern, so this is a small hand-rolled loop over
//! `std::env::args()` rather than a `clap` dependency — mirroring how the
//! teacher keeps genuinely peripheral concerns (e.g. its own config
//! loading) free of extra crates where the source spec says so.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub widgets_dir: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub theme: String,
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            widgets_dir: None,
            config: None,
            theme: "default".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("unrecognized argument: {0}")]
    Unrecognized(String),
    #[error("flag '{0}' requires a value")]
    MissingValue(String),
}

/// Parse `--widgets-dir <path>`, `--config <path>`, `--theme <name>`.
/// Unknown flags or a flag missing its value are errors; everything else
/// in spec.md §6's CLI surface has a default.
pub fn parse(args: impl Iterator<Item = String>) -> Result<CliArgs, CliError> {
    let mut result = CliArgs::default();
    let mut args = args.peekable();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--widgets-dir" => {
                let value = args.next().ok_or_else(|| CliError::MissingValue(arg.clone()))?;
                result.widgets_dir = Some(PathBuf::from(value));
            }
            "--config" => {
                let value = args.next().ok_or_else(|| CliError::MissingValue(arg.clone()))?;
                result.config = Some(PathBuf::from(value));
            }
            "--theme" => {
                let value = args.next().ok_or_else(|| CliError::MissingValue(arg.clone()))?;
                result.theme = value;
            }
            other => return Err(CliError::Unrecognized(other.to_string())),
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> impl Iterator<Item = String> {
        items.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn defaults_when_no_args() {
        let parsed = parse(args(&[])).unwrap();
        assert!(parsed.widgets_dir.is_none());
        assert!(parsed.config.is_none());
        assert_eq!(parsed.theme, "default");
    }

    #[test]
    fn parses_all_three_flags() {
        let parsed = parse(args(&[
            "--widgets-dir", "C:/widgets",
            "--config", "C:/shell.json",
            "--theme", "neon",
        ]))
        .unwrap();
        assert_eq!(parsed.widgets_dir, Some(PathBuf::from("C:/widgets")));
        assert_eq!(parsed.config, Some(PathBuf::from("C:/shell.json")));
        assert_eq!(parsed.theme, "neon");
    }

    #[test]
    fn unrecognized_flag_errors() {
        assert!(parse(args(&["--bogus"])).is_err());
    }

    #[test]
    fn missing_value_errors() {
        assert!(parse(args(&["--theme"])).is_err());
    }
}
