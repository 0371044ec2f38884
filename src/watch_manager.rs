//! Per-script `// Watch:` handles.
//!
//! A script that declares a watch expression gets its own filesystem
//! watcher; add/change/unlink events on the watched paths run the script
//! with the affected path and event kind as arguments.
//!
//! The handle map follows strict remove-then-recreate semantics: every
//! definition change closes the existing watcher for that script before
//! deciding whether to install a new one. A half-updated entry is never
//! observable, and edits can never leak duplicate watchers.

use notify::{recommended_watcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use tracing::{debug, info, warn};

use crate::arbitrator::{RunRequest, Trigger};
use crate::event_loop::AppEvent;
use crate::metadata::ScriptMeta;
use crate::paths;

/// One installed watch: the watcher plus what it watches, for inspection.
struct WatchHandle {
    _watcher: Box<dyn Watcher + Send>,
    targets: Vec<PathBuf>,
}

pub struct WatchManager {
    entries: HashMap<PathBuf, WatchHandle>,
    events: Sender<AppEvent>,
}

impl WatchManager {
    pub fn new(events: Sender<AppEvent>) -> Self {
        WatchManager {
            entries: HashMap::new(),
            events,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_watching(&self, script: &Path) -> bool {
        self.entries.contains_key(script)
    }

    /// Paths watched on behalf of `script`.
    pub fn targets(&self, script: &Path) -> Vec<PathBuf> {
        self.entries
            .get(script)
            .map(|h| h.targets.clone())
            .unwrap_or_default()
    }

    /// Apply a script's (possibly changed) watch metadata: always tear down
    /// the existing handle, then recreate when a watch is declared.
    pub fn script_changed(&mut self, script: &Path, meta: &ScriptMeta) {
        self.remove(script);
        let Some(watch) = meta.watch.as_deref() else {
            return;
        };
        if let Err(e) = self.add(script, watch) {
            // A bad expression must not leave a half-installed entry
            self.remove(script);
            warn!(script = %script.display(), error = %e, "Failed to install watch");
        }
    }

    /// Close and forget the watch for `script`.
    pub fn remove(&mut self, script: &Path) -> bool {
        if self.entries.remove(script).is_some() {
            info!(script = %script.display(), "Removed watch");
            true
        } else {
            false
        }
    }

    /// Close every handle (suspend, shutdown).
    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            info!(count = self.entries.len(), "Clearing script watches");
            self.entries.clear();
        }
    }

    fn add(&mut self, script: &Path, watch: &str) -> notify::Result<()> {
        let base = script.parent().unwrap_or_else(|| Path::new("."));
        let targets = parse_watch_expression(watch, base);
        if targets.is_empty() {
            return Ok(());
        }

        let script_path = script.to_path_buf();
        let events = self.events.clone();
        let mut watcher: Box<dyn Watcher + Send> = Box::new(recommended_watcher(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    let Some(kind) = watch_event_name(&event.kind) else {
                        return;
                    };
                    for path in &event.paths {
                        debug!(
                            script = %script_path.display(),
                            path = %path.display(),
                            kind = kind,
                            "Watched path changed"
                        );
                        let request = RunRequest::new(
                            script_path.clone(),
                            vec![path.display().to_string(), kind.to_string()],
                            Trigger::Watch,
                            false,
                        );
                        if events.send(AppEvent::Run(request)).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Watch handle error"),
            },
        )?);

        for target in &targets {
            // Missing targets are tolerated; the watch installs for the
            // paths that exist
            if let Err(e) = watcher.watch(target, RecursiveMode::Recursive) {
                warn!(target = %target.display(), error = %e, "Could not watch target");
            }
        }

        info!(script = %script.display(), targets = ?targets, "Watch installed");
        self.entries.insert(
            script.to_path_buf(),
            WatchHandle {
                _watcher: watcher,
                targets,
            },
        );
        Ok(())
    }
}

/// Expand a watch expression into concrete paths. Either a single path or a
/// JSON array of paths; entries may be `~`-prefixed, absolute, or relative
/// to the declaring script's directory.
fn parse_watch_expression(watch: &str, base: &Path) -> Vec<PathBuf> {
    let spec = watch.trim();
    if spec.starts_with('[') {
        match serde_json::from_str::<Vec<String>>(spec) {
            Ok(list) => list
                .iter()
                .map(|raw| paths::expand_relative_to(raw, base))
                .collect(),
            Err(e) => {
                warn!(expression = spec, error = %e, "Malformed watch list");
                Vec::new()
            }
        }
    } else {
        vec![paths::expand_relative_to(spec, base)]
    }
}

/// Map a notify event kind onto the wire vocabulary; uninteresting kinds
/// (access, metadata-only) return `None`.
fn watch_event_name(kind: &notify::EventKind) -> Option<&'static str> {
    match kind {
        notify::EventKind::Create(_) => Some("add"),
        notify::EventKind::Modify(_) => Some("change"),
        notify::EventKind::Remove(_) => Some("unlink"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    fn meta_with_watch(expr: &str) -> ScriptMeta {
        ScriptMeta {
            watch: Some(expr.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_single_path() {
        let base = Path::new("/kenv/scripts");
        let targets = parse_watch_expression("data/config.json", base);
        assert_eq!(targets, vec![PathBuf::from("/kenv/scripts/data/config.json")]);
    }

    #[test]
    fn test_parse_path_list() {
        let base = Path::new("/kenv/scripts");
        let targets = parse_watch_expression(r#"["/tmp/a.txt", "b.txt"]"#, base);
        assert_eq!(
            targets,
            vec![PathBuf::from("/tmp/a.txt"), PathBuf::from("/kenv/scripts/b.txt")]
        );
    }

    #[test]
    fn test_parse_malformed_list_is_empty() {
        let targets = parse_watch_expression("[not json", Path::new("/kenv/scripts"));
        assert!(targets.is_empty());
    }

    #[test]
    fn test_event_name_mapping() {
        use notify::event::{CreateKind, ModifyKind, RemoveKind};
        assert_eq!(
            watch_event_name(&notify::EventKind::Create(CreateKind::File)),
            Some("add")
        );
        assert_eq!(
            watch_event_name(&notify::EventKind::Modify(ModifyKind::Any)),
            Some("change")
        );
        assert_eq!(
            watch_event_name(&notify::EventKind::Remove(RemoveKind::File)),
            Some("unlink")
        );
        assert_eq!(watch_event_name(&notify::EventKind::Any), None);
    }

    #[test]
    fn test_script_changed_installs_and_removes() {
        let (tx, _rx) = channel();
        let mut mgr = WatchManager::new(tx);
        let script = Path::new("/kenv/scripts/watcher.ts");
        let dir = tempfile::TempDir::new().unwrap();

        mgr.script_changed(script, &meta_with_watch(&dir.path().display().to_string()));
        assert!(mgr.is_watching(script));
        assert_eq!(mgr.targets(script), vec![dir.path().to_path_buf()]);

        // Definition dropped the watch: handle is closed
        mgr.script_changed(script, &ScriptMeta::default());
        assert!(!mgr.is_watching(script));
    }

    #[test]
    fn test_change_replaces_handle_without_duplicates() {
        let (tx, _rx) = channel();
        let mut mgr = WatchManager::new(tx);
        let script = Path::new("/kenv/scripts/watcher.ts");
        let dir_a = tempfile::TempDir::new().unwrap();
        let dir_b = tempfile::TempDir::new().unwrap();

        mgr.script_changed(script, &meta_with_watch(&dir_a.path().display().to_string()));
        mgr.script_changed(script, &meta_with_watch(&dir_b.path().display().to_string()));

        assert_eq!(mgr.len(), 1);
        assert_eq!(mgr.targets(script), vec![dir_b.path().to_path_buf()]);
    }

    #[test]
    fn test_clear_closes_all() {
        let (tx, _rx) = channel();
        let mut mgr = WatchManager::new(tx);
        let dir = tempfile::TempDir::new().unwrap();
        let spec = dir.path().display().to_string();

        mgr.script_changed(Path::new("/s/a.ts"), &meta_with_watch(&spec));
        mgr.script_changed(Path::new("/s/b.ts"), &meta_with_watch(&spec));
        assert_eq!(mgr.len(), 2);

        mgr.clear();
        assert!(mgr.is_empty());
    }
}
