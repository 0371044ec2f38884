//! Prompt bounds cache.
//!
//! Geometry is remembered per `(display, script)` pair in a JSON document
//! (`db/prompt.json`) so a script reopens where the user left it, on the
//! display it was left on. Writes clamp width/height up to the configured
//! minimums and are skipped entirely when the bounds fall outside every
//! known display - stale geometry from a since-removed monitor must not be
//! persisted. Reads return exactly what was stored.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::PromptSizing;
use crate::error::OrchestratorError;

/// A stored prompt rectangle, canonical top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PromptBounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// One physical display's work area.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayInfo {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl DisplayInfo {
    /// Whether `bounds` lies entirely within this display.
    pub fn contains(&self, bounds: &PromptBounds) -> bool {
        bounds.x >= self.x
            && bounds.y >= self.y
            && bounds.x + bounds.width <= self.x + self.width
            && bounds.y + bounds.height <= self.y + self.height
    }
}

/// Source of display information. Enumeration itself belongs to the UI
/// layer; the orchestrator only consumes work areas.
pub trait DisplayProvider: Send {
    fn displays(&self) -> Vec<DisplayInfo>;

    /// The display new prompts open on.
    fn current(&self) -> DisplayInfo {
        self.displays()
            .into_iter()
            .next()
            .unwrap_or_else(fallback_display)
    }
}

/// Fixed display list, for configuration-driven setups and tests.
pub struct StaticDisplays(pub Vec<DisplayInfo>);

impl DisplayProvider for StaticDisplays {
    fn displays(&self) -> Vec<DisplayInfo> {
        self.0.clone()
    }
}

fn fallback_display() -> DisplayInfo {
    DisplayInfo {
        id: "0".to_string(),
        x: 0.0,
        y: 0.0,
        width: crate::config::FALLBACK_DISPLAY_WIDTH,
        height: crate::config::FALLBACK_DISPLAY_HEIGHT,
    }
}

/// Surface flavors with distinct default sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UiKind {
    #[default]
    None,
    Arg,
    Drop,
    Editor,
    Div,
    Term,
    Form,
}

/// Compute the default geometry for a surface kind on `display`: centered
/// horizontally in the work area, one eighth down from the top.
pub fn default_bounds(display: &DisplayInfo, ui: UiKind, sizing: &PromptSizing) -> PromptBounds {
    let mut width = sizing.default_width;
    let mut height = sizing.default_height;

    match ui {
        UiKind::Drop => height /= 2.0,
        UiKind::Form => width /= 2.0,
        UiKind::Editor => {
            width = width.max(sizing.default_width);
            height = height.max(crate::config::EDITOR_HEIGHT);
        }
        UiKind::None | UiKind::Arg | UiKind::Div | UiKind::Term => {}
    }

    let x = (display.x + display.width / 2.0 - width / 2.0).round();
    let y = (display.y + display.height / 8.0).round();
    PromptBounds {
        x,
        y,
        width,
        height,
    }
}

/// Persisted document shape: displayId -> scriptPath -> bounds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PromptDb {
    #[serde(default)]
    screens: HashMap<String, HashMap<String, PromptBounds>>,
}

/// The per-display, per-script bounds cache.
pub struct BoundsCache {
    path: PathBuf,
    db: PromptDb,
    sizing: PromptSizing,
    /// Gated by the `cachePrompt` preference; when off, writes are dropped.
    enabled: bool,
}

impl BoundsCache {
    /// Load the cache from `path`; a missing or malformed document starts
    /// empty (logged, never fatal).
    pub fn load(path: PathBuf, sizing: PromptSizing, enabled: bool) -> Self {
        let db = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<PromptDb>(&contents) {
                Ok(db) => db,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Malformed prompt db, starting empty");
                    PromptDb::default()
                }
            },
            Err(_) => PromptDb::default(),
        };
        BoundsCache {
            path,
            db,
            sizing,
            enabled,
        }
    }

    /// Flip persistence on or off (the `cachePrompt` preference changed).
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Look up stored bounds. Values are returned as stored - clamping
    /// happens on write, never on read.
    pub fn get(&self, display_id: &str, script_path: &Path) -> Option<PromptBounds> {
        self.db
            .screens
            .get(display_id)
            .and_then(|scripts| scripts.get(&script_path.display().to_string()))
            .copied()
    }

    /// Store bounds for `(display, script)`.
    ///
    /// Skipped when caching is disabled or when the bounds fall outside
    /// every display in `displays`. Width/height below the configured
    /// minimums are clamped up before the write.
    pub fn put(
        &mut self,
        displays: &[DisplayInfo],
        display_id: &str,
        script_path: &Path,
        bounds: PromptBounds,
    ) -> Result<(), OrchestratorError> {
        if !self.enabled {
            debug!("Prompt cache disabled, ignoring bounds");
            return Ok(());
        }
        if !displays.iter().any(|d| d.contains(&bounds)) {
            debug!(
                script = %script_path.display(),
                "Bounds outside all known displays, not persisting"
            );
            return Ok(());
        }

        let clamped = PromptBounds {
            x: bounds.x,
            y: bounds.y,
            width: bounds.width.max(self.sizing.min_width),
            height: bounds.height.max(self.sizing.min_height),
        };

        self.db
            .screens
            .entry(display_id.to_string())
            .or_default()
            .insert(script_path.display().to_string(), clamped);
        self.save()
    }

    /// Drop stored bounds for a script on every display (the script file
    /// changed; its prompt may be shaped differently now).
    pub fn clear_for_script(&mut self, script_path: &Path) {
        let key = script_path.display().to_string();
        let mut removed = false;
        for scripts in self.db.screens.values_mut() {
            removed |= scripts.remove(&key).is_some();
        }
        if removed {
            let _ = self.save();
        }
    }

    /// Guarded write: temp file, then atomic rename.
    fn save(&self) -> Result<(), OrchestratorError> {
        let persist = || -> std::io::Result<()> {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_string_pretty(&self.db)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            let tmp = self.path.with_extension("json.tmp");
            fs::write(&tmp, json)?;
            fs::rename(&tmp, &self.path)?;
            Ok(())
        };
        persist().map_err(|source| {
            warn!(path = %self.path.display(), error = %source, "Failed to persist prompt bounds");
            OrchestratorError::PersistenceWriteFailed {
                path: self.path.display().to_string(),
                source,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn display() -> DisplayInfo {
        DisplayInfo {
            id: "1".to_string(),
            x: 0.0,
            y: 0.0,
            width: 1920.0,
            height: 1080.0,
        }
    }

    fn cache(dir: &TempDir) -> BoundsCache {
        BoundsCache::load(
            dir.path().join("prompt.json"),
            PromptSizing::default(),
            true,
        )
    }

    #[test]
    fn test_put_get_round_trip_clamped() {
        let dir = TempDir::new().unwrap();
        let mut cache = cache(&dir);
        let script = Path::new("/kenv/scripts/foo.js");

        // Below minimums: clamped up before the write
        let tiny = PromptBounds {
            x: 100.0,
            y: 100.0,
            width: 10.0,
            height: 10.0,
        };
        cache.put(&[display()], "1", script, tiny).unwrap();

        let stored = cache.get("1", script).unwrap();
        assert_eq!(stored.width, PromptSizing::default().min_width);
        assert_eq!(stored.height, PromptSizing::default().min_height);
        assert_eq!(stored.x, 100.0);
        assert_eq!(stored.y, 100.0);
    }

    #[test]
    fn test_put_get_exact_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut cache = cache(&dir);
        let script = Path::new("/kenv/scripts/bar.ts");

        let bounds = PromptBounds {
            x: 400.0,
            y: 120.0,
            width: 800.0,
            height: 600.0,
        };
        cache.put(&[display()], "1", script, bounds).unwrap();
        assert_eq!(cache.get("1", script), Some(bounds));
    }

    #[test]
    fn test_offscreen_bounds_not_persisted() {
        let dir = TempDir::new().unwrap();
        let mut cache = cache(&dir);
        let script = Path::new("/kenv/scripts/foo.js");

        // From a since-removed monitor to the right
        let stale = PromptBounds {
            x: 2500.0,
            y: 100.0,
            width: 400.0,
            height: 400.0,
        };
        cache.put(&[display()], "1", script, stale).unwrap();
        assert_eq!(cache.get("1", script), None);
    }

    #[test]
    fn test_disabled_cache_drops_writes() {
        let dir = TempDir::new().unwrap();
        let mut cache = BoundsCache::load(
            dir.path().join("prompt.json"),
            PromptSizing::default(),
            false,
        );
        let script = Path::new("/kenv/scripts/foo.js");
        let bounds = PromptBounds {
            x: 10.0,
            y: 10.0,
            width: 400.0,
            height: 400.0,
        };
        cache.put(&[display()], "1", script, bounds).unwrap();
        assert_eq!(cache.get("1", script), None);
    }

    #[test]
    fn test_persists_across_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prompt.json");
        let script = Path::new("/kenv/scripts/baz.ts");
        let bounds = PromptBounds {
            x: 50.0,
            y: 60.0,
            width: 700.0,
            height: 500.0,
        };

        {
            let mut cache = BoundsCache::load(path.clone(), PromptSizing::default(), true);
            cache.put(&[display()], "1", script, bounds).unwrap();
        }

        let reloaded = BoundsCache::load(path, PromptSizing::default(), true);
        assert_eq!(reloaded.get("1", script), Some(bounds));
    }

    #[test]
    fn test_per_display_keying() {
        let dir = TempDir::new().unwrap();
        let mut cache = cache(&dir);
        let script = Path::new("/kenv/scripts/foo.js");
        let second = DisplayInfo {
            id: "2".to_string(),
            x: 1920.0,
            y: 0.0,
            width: 1920.0,
            height: 1080.0,
        };
        let displays = [display(), second];

        let on_first = PromptBounds {
            x: 100.0,
            y: 100.0,
            width: 400.0,
            height: 400.0,
        };
        let on_second = PromptBounds {
            x: 2000.0,
            y: 100.0,
            width: 500.0,
            height: 400.0,
        };
        cache.put(&displays, "1", script, on_first).unwrap();
        cache.put(&displays, "2", script, on_second).unwrap();

        assert_eq!(cache.get("1", script), Some(on_first));
        assert_eq!(cache.get("2", script), Some(on_second));
    }

    #[test]
    fn test_clear_for_script() {
        let dir = TempDir::new().unwrap();
        let mut cache = cache(&dir);
        let script = Path::new("/kenv/scripts/foo.js");
        let bounds = PromptBounds {
            x: 100.0,
            y: 100.0,
            width: 400.0,
            height: 400.0,
        };
        cache.put(&[display()], "1", script, bounds).unwrap();
        cache.clear_for_script(script);
        assert_eq!(cache.get("1", script), None);
    }

    #[test]
    fn test_default_bounds_kinds() {
        let sizing = PromptSizing::default();
        let d = display();

        let plain = default_bounds(&d, UiKind::Arg, &sizing);
        assert_eq!(plain.width, sizing.default_width);
        assert_eq!(plain.height, sizing.default_height);
        // Centered horizontally, one eighth down
        assert_eq!(plain.x, (1920.0 / 2.0 - sizing.default_width / 2.0).round());
        assert_eq!(plain.y, (1080.0_f64 / 8.0).round());

        let drop = default_bounds(&d, UiKind::Drop, &sizing);
        assert_eq!(drop.height, sizing.default_height / 2.0);

        let editor = default_bounds(&d, UiKind::Editor, &sizing);
        assert!(editor.height >= crate::config::EDITOR_HEIGHT);

        let form = default_bounds(&d, UiKind::Form, &sizing);
        assert_eq!(form.width, sizing.default_width / 2.0);
    }

    #[test]
    fn test_malformed_db_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prompt.json");
        fs::write(&path, "{broken").unwrap();
        let cache = BoundsCache::load(path, PromptSizing::default(), true);
        assert_eq!(cache.get("1", Path::new("/x.ts")), None);
    }
}
