//! Background task manager.
//!
//! Scripts with `// Background: auto` run headless and are restarted on
//! every definition change; `// Background: true` tasks only start and stop
//! through an explicit toggle. The entry map follows remove-then-recreate
//! semantics: a change event unconditionally tears down the running task
//! for that path before deciding whether to start a new one.
//!
//! Starting goes through the arbitrator like every other trigger - the
//! manager emits a run request and records the pid once the worker is
//! actually acquired, so the entry map never points at a worker the pool
//! does not know about.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use tracing::{info, warn};

use crate::arbitrator::{RunRequest, Trigger};
use crate::event_loop::AppEvent;
use crate::metadata::{BackgroundMode, ScriptMeta};
use crate::pool::WorkerPool;

/// One running background task.
#[derive(Debug, Clone)]
pub struct BackgroundEntry {
    pub pid: u32,
    pub started: DateTime<Utc>,
}

pub struct BackgroundManager {
    entries: HashMap<PathBuf, BackgroundEntry>,
    events: Sender<AppEvent>,
}

impl BackgroundManager {
    pub fn new(events: Sender<AppEvent>) -> Self {
        BackgroundManager {
            entries: HashMap::new(),
            events,
        }
    }

    pub fn is_running(&self, script: &Path) -> bool {
        self.entries.contains_key(script)
    }

    pub fn entries(&self) -> Vec<(PathBuf, BackgroundEntry)> {
        self.entries
            .iter()
            .map(|(path, entry)| (path.clone(), entry.clone()))
            .collect()
    }

    /// Definition changed: tear down any running task, then restart when
    /// the mode is auto.
    pub fn script_changed(&mut self, pool: &mut WorkerPool, script: &Path, meta: &ScriptMeta) {
        self.remove(pool, script);
        if meta.background == BackgroundMode::Auto {
            self.request_start(script);
        }
    }

    /// Startup scan: kick off declared tasks that are not yet running.
    /// Unlike the change path, manual (`true`) tasks start here too.
    pub fn startup(&mut self, script: &Path, meta: &ScriptMeta) {
        if meta.background.is_enabled() && !self.is_running(script) {
            self.request_start(script);
        }
    }

    /// Explicit toggle from the UI or a worker message.
    pub fn toggle(&mut self, pool: &mut WorkerPool, script: &Path, meta: &ScriptMeta) {
        if self.is_running(script) {
            self.remove(pool, script);
        } else if meta.background.is_enabled() {
            self.request_start(script);
        } else {
            warn!(script = %script.display(), "Toggle on a script with no background mode");
        }
    }

    /// Record the worker acquired for a requested start.
    pub fn record(&mut self, script: &Path, pid: u32) {
        info!(script = %script.display(), pid = pid, "Background task running");
        self.entries.insert(
            script.to_path_buf(),
            BackgroundEntry {
                pid,
                started: Utc::now(),
            },
        );
    }

    /// Stop and forget a task. Returns whether one was running.
    pub fn remove(&mut self, pool: &mut WorkerPool, script: &Path) -> bool {
        let Some(entry) = self.entries.remove(script) else {
            return false;
        };
        info!(script = %script.display(), pid = entry.pid, "Removing background task");
        pool.remove_by_pid(entry.pid);
        true
    }

    /// A worker exited; drop the entry that pointed at it, if any.
    pub fn on_worker_exit(&mut self, pid: u32) {
        self.entries.retain(|path, entry| {
            if entry.pid == pid {
                info!(script = %path.display(), pid = pid, "Background task exited");
                false
            } else {
                true
            }
        });
    }

    fn request_start(&self, script: &Path) {
        let request = RunRequest::new(script.to_path_buf(), vec![], Trigger::Background, false);
        if self.events.send(AppEvent::Run(request)).is_err() {
            warn!("Event loop receiver dropped, background start lost");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::pool::testing::MockSpawner;
    use std::sync::mpsc::{channel, Receiver};
    use std::sync::Arc;

    fn fixture() -> (BackgroundManager, WorkerPool, Receiver<AppEvent>) {
        let (tx, rx) = channel();
        let spawner = Arc::new(MockSpawner::new());
        let (pool_tx, pool_rx) = channel();
        std::mem::drop(pool_rx);
        let pool = WorkerPool::new(Box::new(spawner), pool_tx, PoolConfig::default());
        (BackgroundManager::new(tx), pool, rx)
    }

    fn auto_meta() -> ScriptMeta {
        ScriptMeta {
            background: BackgroundMode::Auto,
            ..Default::default()
        }
    }

    fn manual_meta() -> ScriptMeta {
        ScriptMeta {
            background: BackgroundMode::Manual,
            ..Default::default()
        }
    }

    fn drain_runs(rx: &Receiver<AppEvent>) -> Vec<RunRequest> {
        rx.try_iter()
            .filter_map(|e| match e {
                AppEvent::Run(req) => Some(req),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_auto_change_requests_restart() {
        let (mut mgr, mut pool, rx) = fixture();
        let script = Path::new("/kenv/scripts/daemon.ts");

        mgr.script_changed(&mut pool, script, &auto_meta());
        let runs = drain_runs(&rx);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].options.trigger, Trigger::Background);
        assert_eq!(runs[0].script_path, script);
    }

    #[test]
    fn test_change_tears_down_running_task() {
        let (mut mgr, mut pool, rx) = fixture();
        let script = Path::new("/kenv/scripts/daemon.ts");

        let pid = pool.acquire_idle_worker().unwrap();
        mgr.record(script, pid);
        assert!(mgr.is_running(script));

        // Mode switched off: removal without restart
        mgr.script_changed(&mut pool, script, &ScriptMeta::default());
        assert!(!mgr.is_running(script));
        assert!(pool.get(pid).is_none());
        assert!(drain_runs(&rx).is_empty());
    }

    #[test]
    fn test_manual_not_restarted_on_change() {
        let (mut mgr, mut pool, rx) = fixture();
        let script = Path::new("/kenv/scripts/manual.ts");

        mgr.script_changed(&mut pool, script, &manual_meta());
        assert!(drain_runs(&rx).is_empty());

        // But the startup scan does start it
        mgr.startup(script, &manual_meta());
        assert_eq!(drain_runs(&rx).len(), 1);
    }

    #[test]
    fn test_toggle_round_trip() {
        let (mut mgr, mut pool, rx) = fixture();
        let script = Path::new("/kenv/scripts/manual.ts");

        mgr.toggle(&mut pool, script, &manual_meta());
        assert_eq!(drain_runs(&rx).len(), 1);

        let pid = pool.acquire_idle_worker().unwrap();
        mgr.record(script, pid);

        // Second toggle stops it
        mgr.toggle(&mut pool, script, &manual_meta());
        assert!(!mgr.is_running(script));
        assert!(pool.get(pid).is_none());
    }

    #[test]
    fn test_startup_skips_running_task() {
        let (mut mgr, mut pool, rx) = fixture();
        let script = Path::new("/kenv/scripts/daemon.ts");

        let pid = pool.acquire_idle_worker().unwrap();
        mgr.record(script, pid);
        mgr.startup(script, &auto_meta());
        assert!(drain_runs(&rx).is_empty());
    }

    #[test]
    fn test_worker_exit_drops_entry() {
        let (mut mgr, mut pool, _rx) = fixture();
        let script = Path::new("/kenv/scripts/daemon.ts");
        let pid = pool.acquire_idle_worker().unwrap();
        mgr.record(script, pid);

        mgr.on_worker_exit(pid);
        assert!(!mgr.is_running(script));
    }
}
