//! Well-known paths and the worker environment contract.
//!
//! Two roots drive everything:
//! - `KIT` - the runtime root (bundled SDK, trigger files, databases, logs)
//! - `KENV` - the user environment root (scripts, .env, assets)
//!
//! Both honor the environment variable of the same name and fall back to
//! dot-directories in the user's home. Worker processes inherit these plus a
//! `PATH` with `<KIT>/bin` prepended ahead of whatever the orchestrator
//! inherited.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Resolve the kit runtime root: `$KIT` or `~/.kit`.
pub fn kit_path() -> PathBuf {
    if let Some(kit) = env::var_os("KIT") {
        return PathBuf::from(kit);
    }
    dirs::home_dir()
        .map(|h| h.join(".kit"))
        .unwrap_or_else(|| std::env::temp_dir().join(".kit"))
}

/// Resolve the user environment root: `$KENV` or `~/.kenv`.
pub fn kenv_path() -> PathBuf {
    if let Some(kenv) = env::var_os("KENV") {
        return PathBuf::from(kenv);
    }
    dirs::home_dir()
        .map(|h| h.join(".kenv"))
        .unwrap_or_else(|| std::env::temp_dir().join(".kenv"))
}

/// The user's scripts directory: `<KENV>/scripts`.
pub fn scripts_path() -> PathBuf {
    kenv_path().join("scripts")
}

/// The watched trigger file: `<KIT>/run.txt`.
pub fn run_txt_path() -> PathBuf {
    kit_path().join("run.txt")
}

/// A database document under `<KIT>/db/`.
pub fn db_path(name: &str) -> PathBuf {
    kit_path().join("db").join(name)
}

/// Scratch directory for pasted clipboard images.
pub fn images_path() -> PathBuf {
    kit_path().join("images")
}

/// Log directory: `<KIT>/logs`.
pub fn logs_path() -> PathBuf {
    kit_path().join("logs")
}

/// Build a `PATH` value with `<kit>/bin` prepended ahead of the inherited
/// search path, so workers resolve kit-managed binaries first.
pub fn kit_first_path(kit: &Path) -> OsString {
    let bin = kit.join("bin");
    let mut joined = OsString::from(bin);
    if let Some(inherited) = env::var_os("PATH") {
        joined.push(":");
        joined.push(inherited);
    }
    joined
}

/// Expand a user-supplied path: `~` prefix, absolute, or relative to `base`.
pub fn expand_relative_to(raw: &str, base: &Path) -> PathBuf {
    let expanded = shellexpand::tilde(raw);
    let path = Path::new(expanded.as_ref());
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
