//! Scheduled script execution.
//!
//! Scripts opt in through metadata:
//! - `// Cron: */5 * * * *` - raw cron expressions
//! - `// Schedule: every tuesday at 2pm` - natural language, converted to
//!   cron once at registration
//!
//! Entries follow remove-then-recreate semantics: every definition change
//! tears down the existing entry for that path before deciding whether to
//! create a new one, so a rapidly edited script never accumulates duplicate
//! timers. The due-check loop runs in a background thread and emits run
//! requests into the orchestrator's event channel; while the system is
//! suspended the loop idles, and waking recomputes every next-run so a
//! sleep backlog never fires as a burst.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use croner::Cron;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::arbitrator::{RunRequest, Trigger};
use crate::config::SCHEDULE_CHECK_INTERVAL_SECS;
use crate::event_loop::AppEvent;
use crate::metadata::ScriptMeta;
use parking_lot::Mutex;

/// Where a schedule came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleSource {
    Cron,
    NaturalLanguage,
}

/// One scheduled script.
#[derive(Debug, Clone)]
pub struct ScheduledEntry {
    pub path: PathBuf,
    pub cron_expr: String,
    pub next_run: DateTime<Utc>,
    pub source: ScheduleSource,
}

pub struct ScheduleManager {
    entries: Arc<Mutex<Vec<ScheduledEntry>>>,
    events: Sender<AppEvent>,
    running: Arc<AtomicBool>,
    asleep: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ScheduleManager {
    pub fn new(events: Sender<AppEvent>) -> Self {
        ScheduleManager {
            entries: Arc::new(Mutex::new(Vec::new())),
            events,
            running: Arc::new(AtomicBool::new(false)),
            asleep: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    /// Apply a script's (possibly changed) schedule metadata: always remove
    /// the existing entry, then recreate when a schedule is declared.
    pub fn script_changed(&self, path: &Path, meta: &ScriptMeta) {
        self.remove(path);
        if meta.cron.is_none() && meta.schedule.is_none() {
            return;
        }
        if let Err(e) = self.replace(path, meta.cron.clone(), meta.schedule.clone()) {
            warn!(script = %path.display(), error = %e, "Failed to schedule script");
        }
    }

    /// Install a schedule for `path`, replacing any existing entry.
    ///
    /// A raw cron expression takes precedence over a natural-language
    /// schedule when both are declared.
    pub fn replace(
        &self,
        path: &Path,
        cron: Option<String>,
        schedule: Option<String>,
    ) -> Result<()> {
        let (cron_expr, source) = match (cron, schedule) {
            (Some(expr), _) => (expr, ScheduleSource::Cron),
            (None, Some(natural)) => {
                let expr = natural_to_cron(&natural).with_context(|| {
                    format!("failed to parse natural language schedule: {}", natural)
                })?;
                (expr, ScheduleSource::NaturalLanguage)
            }
            (None, None) => anyhow::bail!("either cron or schedule must be provided"),
        };

        let parsed = parse_cron(&cron_expr)
            .with_context(|| format!("failed to parse cron expression: {}", cron_expr))?;
        let next_run = find_next_occurrence(&parsed, &Utc::now())
            .context("failed to calculate next run time")?;

        let entry = ScheduledEntry {
            path: path.to_path_buf(),
            cron_expr: cron_expr.clone(),
            next_run,
            source,
        };

        let mut entries = self.entries.lock();
        entries.retain(|e| e.path != path);
        entries.push(entry);
        info!(
            script = %path.display(),
            cron = %cron_expr,
            next_run = %next_run,
            "Scheduled script"
        );
        Ok(())
    }

    /// Remove a script's schedule. Returns whether an entry existed.
    pub fn remove(&self, path: &Path) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| e.path != path);
        let removed = entries.len() < before;
        if removed {
            info!(script = %path.display(), "Unscheduled script");
        }
        removed
    }

    pub fn entries(&self) -> Vec<ScheduledEntry> {
        self.entries.lock().clone()
    }

    /// Stop firing while the system sleeps.
    pub fn sleep(&self) {
        self.asleep.store(true, Ordering::SeqCst);
        info!("Scheduler sleeping");
    }

    /// Resume after system wake. Every next-run is recomputed from now so
    /// runs missed during sleep do not fire as a burst.
    pub fn wake(&self) {
        let now = Utc::now();
        let mut entries = self.entries.lock();
        for entry in entries.iter_mut() {
            if let Ok(cron) = parse_cron(&entry.cron_expr) {
                if let Ok(next) = find_next_occurrence(&cron, &now) {
                    entry.next_run = next;
                }
            }
        }
        drop(entries);
        self.asleep.store(false, Ordering::SeqCst);
        info!("Scheduler awake");
    }

    /// Emit run requests for every entry that is due at `now` and advance
    /// its next-run. Returns how many fired.
    pub fn fire_due(&self, now: DateTime<Utc>) -> usize {
        if self.asleep.load(Ordering::SeqCst) {
            return 0;
        }
        let mut fired = 0;
        let mut entries = self.entries.lock();
        for entry in entries.iter_mut() {
            if now < entry.next_run {
                continue;
            }
            debug!(script = %entry.path.display(), "Scheduled script due");
            let request = RunRequest::new(entry.path.clone(), vec![], Trigger::Schedule, false);
            if self.events.send(AppEvent::Run(request)).is_err() {
                warn!("Event loop receiver dropped, scheduler firing stops");
                return fired;
            }
            fired += 1;
            if let Ok(cron) = parse_cron(&entry.cron_expr) {
                if let Ok(next) = find_next_occurrence(&cron, &now) {
                    entry.next_run = next;
                }
            }
        }
        fired
    }

    /// Start the background due-check loop.
    pub fn start(&mut self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            anyhow::bail!("scheduler already running");
        }
        let entries = Arc::clone(&self.entries);
        let events = self.events.clone();
        let running = Arc::clone(&self.running);
        let asleep = Arc::clone(&self.asleep);

        let manager = ScheduleManager {
            entries,
            events,
            running: Arc::clone(&running),
            asleep,
            thread: None,
        };
        let handle = thread::spawn(move || {
            let interval = Duration::from_secs(SCHEDULE_CHECK_INTERVAL_SECS);
            info!(interval_secs = SCHEDULE_CHECK_INTERVAL_SECS, "Scheduler loop started");
            while running.load(Ordering::SeqCst) {
                manager.fire_due(Utc::now());
                thread::sleep(interval);
            }
            info!("Scheduler loop stopped");
        });
        self.thread = Some(handle);
        Ok(())
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ScheduleManager {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.stop();
        }
    }
}

/// Parse a cron expression (5-field, or 6-field with seconds).
pub fn parse_cron(expr: &str) -> Result<Cron> {
    Cron::from_str(expr).map_err(|e| anyhow::anyhow!("invalid cron expression '{}': {}", expr, e))
}

/// Convert a natural language schedule to a cron expression.
pub fn natural_to_cron(text: &str) -> Result<String> {
    english_to_cron::str_cron_syntax(text)
        .map_err(|e| anyhow::anyhow!("failed to convert '{}' to cron: {:?}", text, e))
}

fn find_next_occurrence(cron: &Cron, after: &DateTime<Utc>) -> Result<DateTime<Utc>> {
    cron.find_next_occurrence(after, false)
        .map_err(|e| anyhow::anyhow!("failed to find next occurrence: {:?}", e))
}
