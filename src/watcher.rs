//! Filesystem event source.
//!
//! One watcher covers the orchestrator's trigger surfaces:
//! - `<KENV>/scripts/` (recursive) - script definitions
//! - `<KENV>/` (non-recursive) - `.env`
//! - `<KIT>/` (non-recursive) - `run.txt`
//! - `<KIT>/db/` (non-recursive) - `app.json`
//!
//! Raw notify events are classified into `(WatchEventKind, path)` pairs and
//! forwarded to the event loop; all debouncing and dispatch happens there,
//! in event-loop order. Dropping the watcher tears everything down
//! (suspend does this; resume builds a fresh one).

use notify::{recommended_watcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use tracing::{debug, info, warn};

use crate::event_loop::AppEvent;
use crate::paths;

/// Classified filesystem event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Add,
    Change,
    Unlink,
}

impl WatchEventKind {
    fn from_notify(kind: &notify::EventKind) -> Option<Self> {
        match kind {
            notify::EventKind::Create(_) => Some(WatchEventKind::Add),
            notify::EventKind::Modify(_) => Some(WatchEventKind::Change),
            notify::EventKind::Remove(_) => Some(WatchEventKind::Unlink),
            _ => None,
        }
    }
}

/// Owns the notify handle; events flow out through the app event channel.
pub struct ScriptsWatcher {
    _watcher: Box<dyn Watcher + Send>,
}

impl ScriptsWatcher {
    /// Install watches over the standard roots. Missing directories are
    /// tolerated - a fresh install grows them later and a restart picks
    /// them up.
    pub fn start(events: Sender<AppEvent>) -> notify::Result<Self> {
        let mut watcher: Box<dyn Watcher + Send> = Box::new(recommended_watcher(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    let Some(kind) = WatchEventKind::from_notify(&event.kind) else {
                        return;
                    };
                    for path in event.paths {
                        debug!(kind = ?kind, path = %path.display(), "Filesystem event");
                        if events.send(AppEvent::File { event: kind, path }).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Filesystem watcher error"),
            },
        )?);

        let targets = [
            (paths::scripts_path(), RecursiveMode::Recursive),
            (paths::kenv_path(), RecursiveMode::NonRecursive),
            (paths::kit_path(), RecursiveMode::NonRecursive),
            (paths::kit_path().join("db"), RecursiveMode::NonRecursive),
        ];
        for (target, mode) in targets {
            if !target.exists() {
                debug!(path = %target.display(), "Watch target missing, skipping");
                continue;
            }
            match watcher.watch(&target, mode) {
                Ok(()) => info!(path = %target.display(), recursive = (mode == RecursiveMode::Recursive), "Watching"),
                Err(e) => warn!(path = %target.display(), error = %e, "Could not watch"),
            }
        }

        Ok(ScriptsWatcher { _watcher: watcher })
    }
}

/// Parse the trigger file: `<scriptPath> <arg>...` on one line.
pub fn parse_run_txt(contents: &str) -> Option<(String, Vec<String>)> {
    let mut tokens = contents.trim().split_whitespace();
    let script = tokens.next()?.to_string();
    let args = tokens.map(str::to_string).collect();
    Some((script, args))
}

/// Resolve a possibly bare script name against the scripts directory.
/// Absolute paths pass through; bare names try `<scripts>/<name>`, then
/// `.ts` and `.js` extensions.
pub fn resolve_script_path(name: &str, scripts_dir: &Path) -> PathBuf {
    let raw = Path::new(name);
    if raw.is_absolute() {
        return raw.to_path_buf();
    }
    let direct = scripts_dir.join(raw);
    if direct.exists() {
        return direct;
    }
    for ext in ["ts", "js"] {
        let candidate = scripts_dir.join(format!("{}.{}", name, ext));
        if candidate.exists() {
            return candidate;
        }
    }
    direct
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_txt_script_and_args() {
        let (script, args) = parse_run_txt("/kenv/scripts/deploy.ts staging --fast\n").unwrap();
        assert_eq!(script, "/kenv/scripts/deploy.ts");
        assert_eq!(args, vec!["staging", "--fast"]);
    }

    #[test]
    fn test_parse_run_txt_bare_script() {
        let (script, args) = parse_run_txt("deploy\n").unwrap();
        assert_eq!(script, "deploy");
        assert!(args.is_empty());
    }

    #[test]
    fn test_parse_run_txt_empty_is_none() {
        assert!(parse_run_txt("").is_none());
        assert!(parse_run_txt("   \n").is_none());
    }

    #[test]
    fn test_resolve_absolute_passthrough() {
        let resolved = resolve_script_path("/abs/path.ts", Path::new("/kenv/scripts"));
        assert_eq!(resolved, PathBuf::from("/abs/path.ts"));
    }

    #[test]
    fn test_resolve_bare_name_with_extension_probe() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("deploy.ts"), "// Name: Deploy\n").unwrap();

        let resolved = resolve_script_path("deploy", dir.path());
        assert_eq!(resolved, dir.path().join("deploy.ts"));
    }

    #[test]
    fn test_resolve_missing_falls_back_to_join() {
        let dir = tempfile::TempDir::new().unwrap();
        let resolved = resolve_script_path("ghost", dir.path());
        assert_eq!(resolved, dir.path().join("ghost"));
    }

    #[test]
    fn test_event_kind_classification() {
        use notify::event::{CreateKind, ModifyKind, RemoveKind};
        assert_eq!(
            WatchEventKind::from_notify(&notify::EventKind::Create(CreateKind::File)),
            Some(WatchEventKind::Add)
        );
        assert_eq!(
            WatchEventKind::from_notify(&notify::EventKind::Modify(ModifyKind::Any)),
            Some(WatchEventKind::Change)
        );
        assert_eq!(
            WatchEventKind::from_notify(&notify::EventKind::Remove(RemoveKind::File)),
            Some(WatchEventKind::Unlink)
        );
        assert_eq!(WatchEventKind::from_notify(&notify::EventKind::Any), None);
    }
}
