//! Process registry.
//!
//! Crash-recovery bookkeeping for worker processes:
//! - pid file at `<KIT>/orchestrator.pid` for the orchestrator itself
//! - live worker pids at `<KIT>/db/active-workers.json`
//! - orphan detection on startup, bulk kill on shutdown
//!
//! The registry is deliberately dumb: it mirrors the pool's view of the
//! world onto disk so a crashed orchestrator's workers can be reaped by the
//! next launch.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use sysinfo::{Pid, System};
use tracing::{info, warn};

use crate::paths;
use crate::pool::{kill_process_group, SIGKILL};

/// One tracked worker process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub pid: u32,
    pub script_path: String,
    pub started_at: DateTime<Utc>,
}

/// Thread-safe registry of live worker processes.
#[derive(Debug)]
pub struct ProcessRegistry {
    workers: RwLock<HashMap<u32, WorkerRecord>>,
    main_pid_path: PathBuf,
    workers_path: PathBuf,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::with_paths(
            paths::kit_path().join("orchestrator.pid"),
            paths::db_path("active-workers.json"),
        )
    }

    pub fn with_paths(main_pid_path: PathBuf, workers_path: PathBuf) -> Self {
        ProcessRegistry {
            workers: RwLock::new(HashMap::new()),
            main_pid_path,
            workers_path,
        }
    }

    /// Write the orchestrator's own pid. Called once at startup; overwrites
    /// a leftover file from a previous run.
    pub fn write_main_pid(&self) -> std::io::Result<()> {
        let pid = std::process::id();
        if let Some(parent) = self.main_pid_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.main_pid_path, pid.to_string())?;
        info!(pid = pid, path = %self.main_pid_path.display(), "Wrote orchestrator pid");
        Ok(())
    }

    /// Remove the pid file on clean shutdown.
    pub fn remove_main_pid(&self) {
        if self.main_pid_path.exists() {
            if let Err(e) = fs::remove_file(&self.main_pid_path) {
                warn!(error = %e, "Failed to remove orchestrator pid file");
            }
        }
    }

    /// Read the previously written orchestrator pid, if any.
    pub fn read_main_pid(&self) -> Option<u32> {
        fs::read_to_string(&self.main_pid_path)
            .ok()?
            .trim()
            .parse()
            .ok()
    }

    /// Whether a previously written orchestrator pid refers to a live
    /// process. Used by second launches to decide between forwarding and
    /// becoming the instance.
    pub fn main_instance_alive(&self) -> bool {
        self.read_main_pid()
            .is_some_and(|pid| pid != std::process::id() && is_process_running(pid))
    }

    /// Track a freshly spawned worker and persist the live set.
    pub fn register(&self, pid: u32, script_path: &str) {
        self.workers.write().insert(
            pid,
            WorkerRecord {
                pid,
                script_path: script_path.to_string(),
                started_at: Utc::now(),
            },
        );
        if let Err(e) = self.persist() {
            warn!(error = %e, "Failed to persist active worker pids");
        }
    }

    /// Stop tracking a worker (normal exit, kill, or release).
    pub fn unregister(&self, pid: u32) {
        self.workers.write().remove(&pid);
        if let Err(e) = self.persist() {
            warn!(error = %e, "Failed to persist active worker pids");
        }
    }

    pub fn active_count(&self) -> usize {
        self.workers.read().len()
    }

    pub fn active_records(&self) -> Vec<WorkerRecord> {
        self.workers.read().values().cloned().collect()
    }

    /// Kill every tracked worker's process group. Graceful-shutdown path.
    pub fn kill_all(&self) {
        let records: Vec<WorkerRecord> = self.workers.read().values().cloned().collect();
        if records.is_empty() {
            return;
        }
        info!(count = records.len(), "Killing tracked worker processes");
        for record in &records {
            if let Err(e) = kill_process_group(record.pid, SIGKILL) {
                info!(pid = record.pid, reason = e, "Worker group already gone");
            }
        }
        self.workers.write().clear();
        if self.workers_path.exists() {
            let _ = fs::remove_file(&self.workers_path);
        }
    }

    /// Reap workers left behind by a previous crash.
    ///
    /// Reads the persisted pid set, kills whichever processes still exist,
    /// and clears the file. Returns the number of orphans killed.
    pub fn cleanup_orphans(&self) -> usize {
        let orphans = self.load_persisted();
        if orphans.is_empty() {
            return 0;
        }
        info!(count = orphans.len(), "Found potentially orphaned workers");

        let mut killed = 0;
        for record in &orphans {
            if is_process_running(record.pid) {
                info!(
                    pid = record.pid,
                    script = %record.script_path,
                    "Killing orphaned worker"
                );
                let _ = kill_process_group(record.pid, SIGKILL);
                killed += 1;
            }
        }
        if self.workers_path.exists() {
            if let Err(e) = fs::remove_file(&self.workers_path) {
                warn!(error = %e, "Failed to remove orphan pid file");
            }
        }
        if killed > 0 {
            info!(killed = killed, "Cleaned up orphaned workers");
        }
        killed
    }

    fn persist(&self) -> std::io::Result<()> {
        let records: Vec<WorkerRecord> = self.workers.read().values().cloned().collect();
        if let Some(parent) = self.workers_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&records)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let tmp = self.workers_path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.workers_path)?;
        Ok(())
    }

    fn load_persisted(&self) -> Vec<WorkerRecord> {
        let Ok(contents) = fs::read_to_string(&self.workers_path) else {
            return Vec::new();
        };
        match serde_json::from_str(&contents) {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Failed to parse active worker pids");
                Vec::new()
            }
        }
    }
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Check whether a pid refers to a live process.
pub fn is_process_running(pid: u32) -> bool {
    let mut system = System::new();
    system.refresh_processes(sysinfo::ProcessesToUpdate::All, true);
    system.process(Pid::from_u32(pid)).is_some()
}
