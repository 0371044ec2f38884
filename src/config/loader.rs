//! Preference document loading and guarded persistence.
//!
//! `app.json` is a flat key-value document under `<KIT>/db/`. Reads fall
//! back to defaults on any failure; writes go to a temp file first and are
//! atomically renamed into place so a crash mid-write never corrupts the
//! previously valid document.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::types::{AppPrefs, Config};
use crate::error::OrchestratorError;
use crate::paths;

/// Default location of the preferences document.
pub fn prefs_path() -> PathBuf {
    paths::db_path("app.json")
}

/// Load preferences from `path`, falling back to defaults when the file is
/// missing or malformed. A malformed document is logged, never fatal.
pub fn load_prefs(path: &Path) -> AppPrefs {
    if !path.exists() {
        info!(path = %path.display(), "Preferences not found, using defaults");
        return AppPrefs::default();
    }
    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<AppPrefs>(&contents) {
            Ok(prefs) => prefs,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Malformed preferences, using defaults");
                AppPrefs::default()
            }
        },
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read preferences, using defaults");
            AppPrefs::default()
        }
    }
}

/// Persist preferences with a guarded write: temp file, then atomic rename.
pub fn save_prefs(path: &Path, prefs: &AppPrefs) -> Result<(), OrchestratorError> {
    let persist = |p: &Path| -> std::io::Result<()> {
        if let Some(parent) = p.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(prefs)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let tmp = p.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, p)?;
        Ok(())
    };
    persist(path).map_err(|source| OrchestratorError::PersistenceWriteFailed {
        path: path.display().to_string(),
        source,
    })
}

/// Assemble the startup configuration: built-in sizing and pool limits plus
/// the persisted preference document.
pub fn load_config() -> Config {
    Config {
        prefs: load_prefs(&prefs_path()),
        ..Config::default()
    }
}
