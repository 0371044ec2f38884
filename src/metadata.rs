//! Script metadata parsing.
//!
//! Scripts declare their triggers in `// Key: value` comment headers:
//!
//! ```text
//! // Name: Deploy Blog
//! // Shortcut: cmd shift d
//! // Watch: ~/projects/blog/content
//! // Background: auto
//! // Cron: */5 * * * *
//! // Schedule: every tuesday at 2pm
//! ```
//!
//! String-dispatched fields are decoded once into closed enums here;
//! downstream managers never re-inspect raw strings. Unrecognized values
//! log a warning and take the explicit default branch.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;
use tracing::warn;

use crate::error::OrchestratorError;

/// Decoded `// Background:` directive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundMode {
    /// `auto` - (re)started on every definition change.
    Auto,
    /// `true` - started once, toggled only explicitly.
    Manual,
    /// Absent or `false`.
    #[default]
    Off,
}

impl BackgroundMode {
    fn decode(raw: &str, script: &Path) -> Self {
        match raw.trim() {
            "auto" => BackgroundMode::Auto,
            "true" => BackgroundMode::Manual,
            "false" => BackgroundMode::Off,
            other => {
                warn!(
                    script = %script.display(),
                    value = other,
                    "Unrecognized Background mode, treating as off"
                );
                BackgroundMode::Off
            }
        }
    }

    pub fn is_enabled(self) -> bool {
        !matches!(self, BackgroundMode::Off)
    }
}

/// Trigger-relevant metadata for one script.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptMeta {
    pub name: Option<String>,
    pub description: Option<String>,
    pub shortcut: Option<String>,
    /// Path expression to watch (`~` and script-relative paths allowed).
    pub watch: Option<String>,
    pub background: BackgroundMode,
    /// Raw cron expression. Takes precedence over `schedule`.
    pub cron: Option<String>,
    /// Natural-language schedule, converted to cron by the scheduler.
    pub schedule: Option<String>,
}

impl ScriptMeta {
    /// Whether any trigger manager cares about this script.
    pub fn has_triggers(&self) -> bool {
        self.shortcut.is_some()
            || self.watch.is_some()
            || self.background.is_enabled()
            || self.cron.is_some()
            || self.schedule.is_some()
    }
}

fn header_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^//\s*([A-Za-z][A-Za-z0-9_-]*)\s*:\s*(.+?)\s*$").unwrap())
}

/// Parse the comment header of `content`.
///
/// Scanning stops at the first line that is neither blank nor a `//`
/// comment; directives buried in the body are intentionally ignored.
pub fn parse_metadata(content: &str, script: &Path) -> ScriptMeta {
    let mut meta = ScriptMeta::default();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !trimmed.starts_with("//") {
            break;
        }
        let Some(caps) = header_line_regex().captures(trimmed) else {
            continue;
        };
        let key = caps[1].to_ascii_lowercase();
        let value = caps[2].to_string();
        match key.as_str() {
            "name" => meta.name = Some(value),
            "description" => meta.description = Some(value),
            "shortcut" => meta.shortcut = Some(value),
            "watch" => meta.watch = Some(value),
            "background" => meta.background = BackgroundMode::decode(&value, script),
            "cron" => meta.cron = Some(value),
            "schedule" => meta.schedule = Some(value),
            // Other keys (Author, Alias, ...) belong to the UI layer.
            _ => {}
        }
    }
    meta
}

/// Read and parse a script file's metadata.
pub fn parse_script_file(path: &Path) -> Result<ScriptMeta, OrchestratorError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| OrchestratorError::Metadata(format!("{}: {}", path.display(), e)))?;
    Ok(parse_metadata(&content, path))
}

/// Whether a path looks like a runnable script (ts or js, not hidden).
pub fn is_script_file(path: &Path) -> bool {
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        if name.starts_with('.') {
            return false;
        }
    }
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("ts") | Some("js")
    )
}
