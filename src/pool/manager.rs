//! The worker pool.
//!
//! Keeps warm idle workers so the first keystroke of a new session never
//! waits on process startup. Acquisition is an O(1) pop from the idle set;
//! a replacement spawn is fired immediately after every acquisition so the
//! steady-state idle count is restored before the next request arrives.
//!
//! Invariants:
//! - idle count is kept >= the configured target (bounded by max size)
//! - a worker that exits is removed here; clearing surface ownership is the
//!   event loop's job, because only it knows whether the pid was bound

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::mpsc::Sender;
use tracing::{debug, info, warn};

use super::worker::{WorkerHandle, WorkerKind, WorkerSpawner};
use crate::config::PoolConfig;
use crate::error::OrchestratorError;
use crate::event_loop::AppEvent;

pub struct WorkerPool {
    spawner: Box<dyn WorkerSpawner>,
    events: Sender<AppEvent>,
    workers: HashMap<u32, WorkerHandle>,
    /// Pids with no script assignment, oldest first.
    idle: VecDeque<u32>,
    config: PoolConfig,
}

impl WorkerPool {
    pub fn new(spawner: Box<dyn WorkerSpawner>, events: Sender<AppEvent>, config: PoolConfig) -> Self {
        WorkerPool {
            spawner,
            events,
            workers: HashMap::new(),
            idle: VecDeque::new(),
            config,
        }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }

    pub fn get(&self, pid: u32) -> Option<&WorkerHandle> {
        self.workers.get(&pid)
    }

    pub fn get_mut(&mut self, pid: u32) -> Option<&mut WorkerHandle> {
        self.workers.get_mut(&pid)
    }

    pub fn pids(&self) -> Vec<u32> {
        self.workers.keys().copied().collect()
    }

    /// Guarantee at least the configured number of idle workers, bounded by
    /// the maximum pool size. Spawn failures are logged and left for the
    /// caller's trigger layer to retry on the next request.
    pub fn ensure_idle_worker(&mut self) {
        while self.idle.len() < self.config.idle_target && self.workers.len() < self.config.max_size
        {
            match self.spawner.spawn(&self.events) {
                Ok(handle) => {
                    debug!(pid = handle.pid, idle = self.idle.len() + 1, "Idle worker ready");
                    self.idle.push_back(handle.pid);
                    self.workers.insert(handle.pid, handle);
                }
                Err(e) => {
                    warn!(error = %e, "Failed to replenish idle worker");
                    return;
                }
            }
        }
    }

    /// Take one worker from the idle set.
    ///
    /// Falls back to a direct spawn when the set is empty; errs with
    /// `PoolExhausted` only when that spawn also fails. Fires replenishment
    /// immediately after a successful acquisition.
    pub fn acquire_idle_worker(&mut self) -> Result<u32, OrchestratorError> {
        // Stale pids can linger in the queue if a worker died while idle
        while let Some(pid) = self.idle.pop_front() {
            if self.workers.contains_key(&pid) {
                debug!(pid = pid, remaining_idle = self.idle.len(), "Acquired idle worker");
                self.ensure_idle_worker();
                return Ok(pid);
            }
        }

        match self.spawner.spawn(&self.events) {
            Ok(handle) => {
                let pid = handle.pid;
                self.workers.insert(pid, handle);
                info!(pid = pid, "Acquired freshly spawned worker (pool was empty)");
                self.ensure_idle_worker();
                Ok(pid)
            }
            Err(e) => Err(OrchestratorError::PoolExhausted(e.to_string())),
        }
    }

    /// Bind a worker to a script session.
    pub fn assign(&mut self, pid: u32, script: &Path, kind: WorkerKind) {
        self.idle.retain(|p| *p != pid);
        if let Some(worker) = self.workers.get_mut(&pid) {
            worker.assign(script, kind);
        }
    }

    /// Put a still-unassigned worker back in the idle set (a superseded
    /// request discarding its acquisition instead of binding).
    pub fn return_to_idle(&mut self, pid: u32) {
        if let Some(worker) = self.workers.get(&pid) {
            if worker.is_idle() && !self.idle.contains(&pid) {
                self.idle.push_back(pid);
            }
        }
    }

    /// Drop bookkeeping for a worker that exited (normally or not) and
    /// replenish the idle set. Returns the removed handle so the caller can
    /// inspect what the worker was doing.
    pub fn release(&mut self, pid: u32) -> Option<WorkerHandle> {
        self.idle.retain(|p| *p != pid);
        let mut handle = self.workers.remove(&pid)?;
        handle.mark_disconnected();
        info!(pid = pid, script = ?handle.script_path, "Worker released");
        self.ensure_idle_worker();
        Some(handle)
    }

    /// Explicit teardown: terminate the worker's process group and drop it.
    pub fn remove_by_pid(&mut self, pid: u32) -> bool {
        self.idle.retain(|p| *p != pid);
        match self.workers.remove(&pid) {
            Some(mut handle) => {
                info!(pid = pid, "Removing worker");
                handle.kill();
                true
            }
            None => false,
        }
    }

    /// Reap prompt workers that kept a script assignment after losing
    /// ownership without a clean handoff. `current_owner` survives.
    pub fn remove_abandoned(&mut self, current_owner: Option<u32>) -> usize {
        let abandoned: Vec<u32> = self
            .workers
            .values()
            .filter(|w| {
                w.kind == WorkerKind::Prompt
                    && w.script_path.is_some()
                    && Some(w.pid) != current_owner
            })
            .map(|w| w.pid)
            .collect();
        for pid in &abandoned {
            debug!(pid = pid, "Removing abandoned worker");
            self.remove_by_pid(*pid);
        }
        abandoned.len()
    }

    /// Kill everything. App-teardown path.
    pub fn shutdown(&mut self) {
        info!(count = self.workers.len(), "Shutting down worker pool");
        for (_, mut handle) in self.workers.drain() {
            handle.kill();
        }
        self.idle.clear();
    }
}
