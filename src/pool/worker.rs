//! Worker processes and the spawner seam.
//!
//! A worker is one OS process running the script runtime with the kit
//! bootstrap preloaded, speaking JSONL over stdin/stdout. The pool talks to
//! workers only through [`WorkerHandle`]; how a worker comes to exist is
//! behind [`WorkerSpawner`] so tests can fabricate channel-backed workers
//! with synthetic pids.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, warn};

#[cfg(unix)]
use std::os::unix::process::CommandExt;

use crate::error::OrchestratorError;
use crate::event_loop::AppEvent;
use crate::logging;
use crate::paths;
use crate::protocol::{serialize_message, JsonlReader, WorkerMessage};
use crate::registry::ProcessRegistry;

// Unix process-group control. Workers spawn with process_group(0) so the
// worker's pid doubles as its pgid and signalling the group reaps any
// children the script forked.
#[cfg(unix)]
mod unix_process {
    use libc::{c_int, pid_t, ESRCH};

    /// Send a signal to a process group (negative pid targets the group).
    pub fn kill_process_group(pgid: u32, signal: c_int) -> Result<(), &'static str> {
        // Safety: kill() is a plain syscall with no memory safety concerns
        let rc = unsafe { libc::kill(-(pgid as pid_t), signal) };
        if rc == 0 {
            Ok(())
        } else {
            let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
            match errno {
                libc::ESRCH => Err("No such process group"),
                libc::EPERM => Err("Permission denied"),
                libc::EINVAL => Err("Invalid signal"),
                _ => Err("Unknown error"),
            }
        }
    }

    /// Check whether any process in the group is still alive. Signal 0
    /// probes without delivering; EPERM still counts as alive.
    pub fn process_group_alive(pgid: u32) -> bool {
        let rc = unsafe { libc::kill(-(pgid as pid_t), 0) };
        if rc == 0 {
            true
        } else {
            let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
            errno != ESRCH
        }
    }
}

#[cfg(unix)]
pub use unix_process::{kill_process_group, process_group_alive};

/// SIGTERM signal number.
#[cfg(unix)]
pub const SIGTERM: libc::c_int = libc::SIGTERM;
/// SIGKILL signal number.
#[cfg(unix)]
pub const SIGKILL: libc::c_int = libc::SIGKILL;

/// Whether a worker drives the shared prompt surface or runs headless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerKind {
    Prompt,
    Background,
}

/// Owns termination of one spawned worker's process group.
///
/// Dropping the handle kills the group, so it must stay alive as long as
/// the worker is wanted.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: u32,
    killed: bool,
    registry: Arc<ProcessRegistry>,
}

impl ProcessHandle {
    pub fn new(pid: u32, script_path: &str, registry: Arc<ProcessRegistry>) -> Self {
        registry.register(pid, script_path);
        ProcessHandle {
            pid,
            killed: false,
            registry,
        }
    }

    /// Kill the process group with graceful escalation:
    /// SIGTERM, a grace window polling group liveness, then SIGKILL.
    pub fn kill(&mut self) {
        /// Grace period after SIGTERM before escalating.
        const TERM_GRACE_MS: u64 = 250;
        const POLL_INTERVAL_MS: u64 = 50;

        if self.killed {
            return;
        }
        self.killed = true;

        #[cfg(unix)]
        {
            let pgid = self.pid;
            match kill_process_group(pgid, SIGTERM) {
                Ok(()) => debug!(pgid = pgid, "SIGTERM sent to worker group"),
                Err("No such process group") => {
                    debug!(pgid = pgid, "Worker group already exited");
                    return;
                }
                Err(e) => warn!(pgid = pgid, reason = e, "Failed to SIGTERM worker group"),
            }

            let start = std::time::Instant::now();
            let grace = std::time::Duration::from_millis(TERM_GRACE_MS);
            while start.elapsed() < grace {
                // Check the whole group, not just the leader: the leader
                // exiting while children linger must not end escalation.
                if !process_group_alive(pgid) {
                    debug!(pgid = pgid, "Worker group terminated gracefully");
                    return;
                }
                thread::sleep(std::time::Duration::from_millis(POLL_INTERVAL_MS));
            }

            match kill_process_group(pgid, SIGKILL) {
                Ok(()) => info!(pgid = pgid, "Worker group killed after grace period"),
                Err("No such process group") => {
                    debug!(pgid = pgid, "Worker group exited before SIGKILL")
                }
                Err(e) => warn!(pgid = pgid, reason = e, "SIGKILL failed for worker group"),
            }
        }
    }

    #[cfg(unix)]
    pub fn is_alive(&self) -> bool {
        process_group_alive(self.pid)
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.registry.unregister(self.pid);
        self.kill();
    }
}

/// The pool's view of one worker.
#[derive(Debug)]
pub struct WorkerHandle {
    pub pid: u32,
    pub kind: WorkerKind,
    /// Empty while idle; set on assignment.
    pub script_path: Option<PathBuf>,
    pub assigned_at: Option<DateTime<Utc>>,
    /// False once the transport channel closes.
    pub connected: bool,
    sender: Sender<WorkerMessage>,
    process: Option<ProcessHandle>,
}

impl WorkerHandle {
    pub fn new(pid: u32, sender: Sender<WorkerMessage>, process: Option<ProcessHandle>) -> Self {
        WorkerHandle {
            pid,
            kind: WorkerKind::Prompt,
            script_path: None,
            assigned_at: None,
            connected: true,
            sender,
            process,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.script_path.is_none()
    }

    /// Bind this worker to a script session.
    pub fn assign(&mut self, script: &Path, kind: WorkerKind) {
        self.script_path = Some(script.to_path_buf());
        self.assigned_at = Some(Utc::now());
        self.kind = kind;
        info!(pid = self.pid, script = %script.display(), kind = ?kind, "Worker assigned");
    }

    /// Forward a message over the worker's transport.
    pub fn send(&self, msg: &WorkerMessage) -> Result<(), OrchestratorError> {
        if !self.connected {
            return Err(OrchestratorError::TransportDropped { pid: self.pid });
        }
        self.sender
            .send(msg.clone())
            .map_err(|_| OrchestratorError::TransportDropped { pid: self.pid })
    }

    /// Mark the transport closed without killing the process.
    pub fn mark_disconnected(&mut self) {
        self.connected = false;
    }

    /// Terminate the worker's process group.
    pub fn kill(&mut self) {
        self.connected = false;
        if let Some(process) = self.process.as_mut() {
            process.kill();
        }
    }
}

/// How workers come to exist. The production implementation forks the
/// script runtime; tests fabricate channel-backed handles.
pub trait WorkerSpawner: Send {
    fn spawn(&self, events: &Sender<AppEvent>) -> anyhow::Result<WorkerHandle>;
}

/// Find an executable, checking common install locations GUI-launched
/// processes miss before falling back to the inherited PATH.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    let common_paths = [
        dirs::home_dir().map(|h| h.join(".bun/bin")),
        dirs::home_dir().map(|h| h.join(".volta/bin")),
        dirs::home_dir().map(|h| h.join(".local/bin")),
        Some(PathBuf::from("/opt/homebrew/bin")),
        Some(PathBuf::from("/usr/local/bin")),
        Some(PathBuf::from("/usr/bin")),
        Some(PathBuf::from("/bin")),
    ];

    for path in common_paths.iter().flatten() {
        let exe = path.join(name);
        if exe.exists() {
            debug!(name = name, path = %exe.display(), "Found executable");
            return Some(exe);
        }
    }
    which::which(name).ok()
}

/// Spawns real worker processes: the script runtime running the kit
/// bootstrap, with the fixed environment contract.
pub struct ProcessSpawner {
    runtime: PathBuf,
    bootstrap: PathBuf,
    kit: PathBuf,
    kenv: PathBuf,
    registry: Arc<ProcessRegistry>,
}

impl ProcessSpawner {
    /// Discover the runtime (bun preferred, node fallback) and wire the
    /// standard kit paths. Fails only when no runtime exists anywhere -
    /// the one unrecoverable startup condition.
    pub fn new(registry: Arc<ProcessRegistry>) -> anyhow::Result<Self> {
        let runtime = find_executable("bun")
            .or_else(|| find_executable("node"))
            .ok_or_else(|| {
                anyhow::anyhow!("no script runtime found: install bun or node")
            })?;
        let kit = paths::kit_path();
        Ok(ProcessSpawner {
            bootstrap: kit.join("run").join("worker.js"),
            kenv: paths::kenv_path(),
            kit,
            runtime,
            registry,
        })
    }

    pub fn with_parts(
        runtime: PathBuf,
        bootstrap: PathBuf,
        kit: PathBuf,
        kenv: PathBuf,
        registry: Arc<ProcessRegistry>,
    ) -> Self {
        ProcessSpawner {
            runtime,
            bootstrap,
            kit,
            kenv,
            registry,
        }
    }
}

impl WorkerSpawner for ProcessSpawner {
    fn spawn(&self, events: &Sender<AppEvent>) -> anyhow::Result<WorkerHandle> {
        let mut command = Command::new(&self.runtime);
        command
            .arg(&self.bootstrap)
            .current_dir(dirs::home_dir().unwrap_or_else(std::env::temp_dir))
            .env("KIT", &self.kit)
            .env("KENV", &self.kenv)
            .env("PATH", paths::kit_first_path(&self.kit))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // New process group so the whole script tree can be signalled
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| {
            error!(runtime = %self.runtime.display(), error = %e, "Worker spawn failed");
            anyhow::anyhow!("failed to spawn '{}': {}", self.runtime.display(), e)
        })?;

        let pid = child.id();
        info!(pid = pid, runtime = %self.runtime.display(), "Worker spawned");

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow::anyhow!("failed to open worker stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("failed to open worker stdout"))?;
        let stderr = child.stderr.take();

        // Writer: drain the handle's outbox onto the worker's stdin.
        let (tx, rx): (Sender<WorkerMessage>, Receiver<WorkerMessage>) = channel();
        thread::spawn(move || {
            let mut stdin = stdin;
            while let Ok(msg) = rx.recv() {
                let json = match serialize_message(&msg) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(pid = pid, error = %e, "Failed to serialize outbound message");
                        continue;
                    }
                };
                logging::log_protocol_send(pid, &json);
                if writeln!(stdin, "{}", json).and_then(|_| stdin.flush()).is_err() {
                    debug!(pid = pid, "Worker stdin closed");
                    break;
                }
            }
        });

        // Reader: forward worker records to the event loop, then report the
        // exit once the stream ends.
        let events_tx = events.clone();
        thread::spawn(move || {
            let mut reader = JsonlReader::new(stdout);
            loop {
                match reader.next_message() {
                    Ok(Some(message)) => {
                        logging::log_protocol_recv(
                            pid,
                            message.channel.as_str(),
                            std::mem::size_of_val(&message),
                        );
                        if events_tx.send(AppEvent::Worker { pid, message }).is_err() {
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(pid = pid, error = %e, "Worker transport read error");
                        break;
                    }
                }
            }
            let code = child.wait().ok().and_then(|status| status.code());
            info!(pid = pid, code = ?code, "Worker exited");
            let _ = events_tx.send(AppEvent::WorkerExit { pid, code });
        });

        // Stderr: drain into the log so script errors are visible.
        if let Some(stderr) = stderr {
            thread::spawn(move || {
                // Bounded tail kept for post-mortems in the log
                let mut tail: VecDeque<String> = VecDeque::with_capacity(50);
                for line in BufReader::new(stderr).lines().map_while(|l| l.ok()) {
                    debug!(pid = pid, "worker stderr: {}", line);
                    if tail.len() == 50 {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            });
        }

        let process = ProcessHandle::new(
            pid,
            &self.bootstrap.display().to_string(),
            Arc::clone(&self.registry),
        );
        Ok(WorkerHandle::new(pid, tx, Some(process)))
    }
}

#[cfg(test)]
pub mod testing {
    //! Channel-backed fake workers for pool and arbitration tests.

    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    pub struct MockSpawner {
        next_pid: AtomicU32,
        pub fail: AtomicBool,
        outboxes: Mutex<HashMap<u32, Receiver<WorkerMessage>>>,
        spawned: Mutex<Vec<u32>>,
    }

    impl MockSpawner {
        pub fn new() -> Self {
            MockSpawner {
                next_pid: AtomicU32::new(1000),
                fail: AtomicBool::new(false),
                outboxes: Mutex::new(HashMap::new()),
                spawned: Mutex::new(Vec::new()),
            }
        }

        /// Drain every message the orchestrator sent to `pid`.
        pub fn sent_to(&self, pid: u32) -> Vec<WorkerMessage> {
            let outboxes = self.outboxes.lock();
            let Some(rx) = outboxes.get(&pid) else {
                return Vec::new();
            };
            let mut drained = Vec::new();
            while let Ok(msg) = rx.try_recv() {
                drained.push(msg);
            }
            drained
        }

        pub fn spawn_count(&self) -> usize {
            self.spawned.lock().len()
        }
    }

    impl Default for MockSpawner {
        fn default() -> Self {
            Self::new()
        }
    }

    impl WorkerSpawner for Arc<MockSpawner> {
        fn spawn(&self, _events: &Sender<AppEvent>) -> anyhow::Result<WorkerHandle> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("mock spawn failure");
            }
            let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = channel();
            self.outboxes.lock().insert(pid, rx);
            self.spawned.lock().push(pid);
            Ok(WorkerHandle::new(pid, tx, None))
        }
    }
}
