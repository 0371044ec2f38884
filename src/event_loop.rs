//! The orchestrating event loop.
//!
//! One thread owns every mutable component - pool, arbitrator, router,
//! bounds cache, trigger managers, shared state - and drains a single
//! event channel. Watchers, the scheduler, hotkeys, and per-worker
//! transport readers are producers only. Arbitration decisions and pool
//! acquisitions therefore process strictly in event order: two requests
//! never interleave mid-acquisition, and per-pid message routing preserves
//! send order.
//!
//! The loop wakes on a short timeout to drive the trailing debouncers
//! (bounds persistence, prompt-error reload) and the leading windows.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::arbitrator::{Arbitrator, RunOutcome, RunRequest, Trigger};
use crate::background::BackgroundManager;
use crate::bounds::{BoundsCache, DisplayProvider, PromptBounds};
use crate::config::{
    Config, RUN_TXT_DEBOUNCE_MS, SCRIPT_CHANGE_DEBOUNCE_MS,
};
use crate::debounce::Debouncer;
use crate::error::ResultExt;
use crate::hotkeys::{HotkeyManager, HotkeyPause};
use crate::metadata::{self, ScriptMeta};
use crate::pool::{WorkerPool, WorkerSpawner};
use crate::protocol::{Channel, WorkerMessage};
use crate::router::{ClipboardImages, Router};
use crate::scheduler::ScheduleManager;
use crate::state::{KitState, StateChange, StateKey, SubscriptionSet};
use crate::surface::{SurfaceCommand, SurfaceLink};
use crate::watch_manager::WatchManager;
use crate::watcher::{self, ScriptsWatcher, WatchEventKind};
use crate::{config, paths};

/// OS power and session events, injected by platform glue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerEvent {
    Suspend,
    Resume,
    LockScreen,
    UnlockScreen,
}

/// Everything that can happen to the orchestrator.
#[derive(Debug)]
pub enum AppEvent {
    /// A trigger wants a script to run.
    Run(RunRequest),
    /// An inbound message from the surface (routed by pid).
    Ui(WorkerMessage),
    /// A message a worker wrote on its transport.
    Worker { pid: u32, message: WorkerMessage },
    /// A worker's process ended (reported by its transport reader).
    WorkerExit { pid: u32, code: Option<i32> },
    /// The surface settled on new geometry.
    SurfaceBounds {
        display_id: String,
        bounds: PromptBounds,
    },
    /// A filesystem event from the scripts watcher.
    File {
        event: WatchEventKind,
        path: PathBuf,
    },
    Power(PowerEvent),
    /// Re-enable global hotkeys after a submission returned focus.
    ResumeShortcuts,
    /// Explicit background task toggle for a script.
    ToggleBackground(PathBuf),
    Shutdown,
}

pub struct Orchestrator {
    state: KitState,
    pool: WorkerPool,
    arbitrator: Arbitrator,
    router: Router,
    bounds: BoundsCache,
    displays: Box<dyn DisplayProvider>,
    surface: SurfaceLink,
    schedule: ScheduleManager,
    watches: WatchManager,
    background: BackgroundManager,
    hotkeys: Option<HotkeyManager>,
    hotkey_pause: HotkeyPause,
    watcher: Option<ScriptsWatcher>,
    events_tx: Sender<AppEvent>,
    events_rx: Receiver<AppEvent>,
    run_txt_debounce: Debouncer,
    change_debounces: HashMap<PathBuf, Debouncer>,
    bounds_settle: Debouncer,
    pending_bounds: Option<(String, PathBuf, PromptBounds)>,
    subscriptions: SubscriptionSet,
    fanout_count: u64,
    shutdown: bool,
}

impl Orchestrator {
    /// Wire the orchestrator. Returns the surface command receiver for the
    /// UI layer to attach to; the event sender is available from
    /// [`Orchestrator::events`].
    pub fn new(
        spawner: Box<dyn WorkerSpawner>,
        displays: Box<dyn DisplayProvider>,
        config: &Config,
        main_script: PathBuf,
        clipboard: Box<dyn ClipboardImages>,
    ) -> (Self, Receiver<SurfaceCommand>) {
        let (events_tx, events_rx) = channel();
        let (surface, surface_rx) = SurfaceLink::new();
        let state = KitState::new();

        let pool = WorkerPool::new(spawner, events_tx.clone(), config.pool);
        let bounds = BoundsCache::load(
            paths::db_path("prompt.json"),
            config.sizing,
            config.prefs.cache_prompt,
        );
        let router = Router::new(paths::images_path(), clipboard);
        let schedule = ScheduleManager::new(events_tx.clone());
        let watches = WatchManager::new(events_tx.clone());
        let background = BackgroundManager::new(events_tx.clone());

        let mut subscriptions = SubscriptionSet::new();
        // Watcher suspension is observed through the store so any component
        // (worker message, preference, debugger) can flip it; the handler
        // runs as an event, never inside the notification.
        let suspend_tx = events_tx.clone();
        subscriptions.add(state.subscribe(StateKey::SuspendWatchers, move |change| {
            if let StateChange::SuspendWatchers(suspend) = change {
                let event = if *suspend {
                    AppEvent::Power(PowerEvent::Suspend)
                } else {
                    AppEvent::Power(PowerEvent::Resume)
                };
                let _ = suspend_tx.send(event);
            }
        }));

        let orchestrator = Orchestrator {
            state,
            pool,
            arbitrator: Arbitrator::new(main_script, config.sizing),
            router,
            bounds,
            displays,
            surface,
            schedule,
            watches,
            background,
            hotkeys: None,
            hotkey_pause: HotkeyPause::new(),
            watcher: None,
            events_tx,
            events_rx,
            run_txt_debounce: Debouncer::leading(RUN_TXT_DEBOUNCE_MS),
            change_debounces: HashMap::new(),
            bounds_settle: Debouncer::trailing(config::BOUNDS_SETTLE_DEBOUNCE_MS),
            pending_bounds: None,
            subscriptions,
            fanout_count: 0,
            shutdown: false,
        };
        (orchestrator, surface_rx)
    }

    pub fn events(&self) -> Sender<AppEvent> {
        self.events_tx.clone()
    }

    pub fn state(&self) -> &KitState {
        &self.state
    }

    /// Attach the hotkey layer (created on the main thread by the binary).
    pub fn set_hotkeys(&mut self, manager: HotkeyManager) {
        self.hotkey_pause = manager.pause_handle();
        self.hotkeys = Some(manager);
    }

    /// Start the filesystem watcher and the scheduler loop.
    pub fn start_triggers(&mut self) {
        match ScriptsWatcher::start(self.events_tx.clone()) {
            Ok(watcher) => self.watcher = Some(watcher),
            Err(e) => warn!(error = %e, "Scripts watcher failed to start"),
        }
        self.schedule.start().warn_on_err();
    }

    /// Warm the pool and register triggers for every script on disk.
    pub fn bootstrap(&mut self) {
        self.pool.ensure_idle_worker();
        self.scan_scripts();
    }

    /// Run until shutdown. The timeout tick drives the debouncers.
    pub fn run(&mut self) {
        info!("Orchestrator event loop running");
        while !self.shutdown {
            match self.events_rx.recv_timeout(Duration::from_millis(100)) {
                Ok(event) => self.handle_event(event),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            self.tick(Instant::now());
        }
        self.teardown();
    }

    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Run(request) => self.handle_run(request),
            AppEvent::Ui(message) => {
                self.router.route(
                    &mut self.pool,
                    &self.state,
                    &self.events_tx,
                    Instant::now(),
                    message,
                );
            }
            AppEvent::Worker { pid, message } => self.handle_worker_message(pid, message),
            AppEvent::WorkerExit { pid, code } => self.on_worker_exit(pid, code),
            AppEvent::SurfaceBounds { display_id, bounds } => {
                self.state.set_modified_by_user(true);
                if let Some(script) = self.state.script_path() {
                    self.pending_bounds = Some((display_id, script, bounds));
                    self.bounds_settle.signal(Instant::now());
                }
            }
            AppEvent::File { event, path } => self.handle_file_event(event, path),
            AppEvent::Power(power) => self.handle_power(power),
            AppEvent::ResumeShortcuts => self.hotkey_pause.resume(),
            AppEvent::ToggleBackground(path) => match metadata::parse_script_file(&path) {
                Ok(meta) => self.background.toggle(&mut self.pool, &path, &meta),
                Err(e) => warn!(script = %path.display(), error = %e, "Toggle failed"),
            },
            AppEvent::Shutdown => self.shutdown = true,
        }
    }

    /// Drive time-based work: trailing debouncers and window expiry.
    pub fn tick(&mut self, now: Instant) {
        let _ = self.run_txt_debounce.poll(now);
        self.change_debounces.retain(|_, debouncer| {
            let _ = debouncer.poll(now);
            debouncer.phase() != crate::debounce::Phase::Idle
        });
        if self.bounds_settle.poll(now) {
            self.flush_pending_bounds();
        }
        self.router.tick(now, &self.state, &self.surface);
    }

    fn handle_run(&mut self, request: RunRequest) {
        let script = request.script_path.clone();
        let trigger = request.options.trigger;
        match self.arbitrator.request_run(
            &mut self.pool,
            &self.state,
            &mut self.bounds,
            self.displays.as_ref(),
            &self.surface,
            request,
        ) {
            Ok(RunOutcome::Started { .. }) => {
                // The surface is about to take input focus; global hotkeys
                // stay quiet until a submission hands focus back.
                self.hotkey_pause.pause();
            }
            Ok(RunOutcome::StartedBackground { pid }) => {
                self.background.record(&script, pid);
            }
            Ok(RunOutcome::AlreadyFocused) => {}
            Err(e @ crate::error::OrchestratorError::OwnershipDenied { .. }) => {
                // Informational: a newer request already took the surface
                debug!(error = %e, "Run request lost arbitration");
            }
            Err(e) => {
                warn!(script = %script.display(), trigger = trigger.as_str(), error = %e, "Run request failed");
            }
        }
    }

    fn handle_worker_message(&mut self, pid: u32, message: WorkerMessage) {
        match message.channel {
            Channel::Exit => {
                debug!(pid = pid, "Worker requested exit");
                self.pool.remove_by_pid(pid);
                self.on_worker_exit(pid, None);
            }
            _ => {
                if self.pool.get(pid).is_some() {
                    self.router.forward_to_surface(&self.surface, pid, message);
                } else {
                    debug!(pid = pid, "Message from unknown worker dropped");
                }
            }
        }
    }

    fn on_worker_exit(&mut self, pid: u32, code: Option<i32>) {
        info!(pid = pid, code = ?code, "Worker exit resolved");
        let was_owner = self.state.pid() == Some(pid);
        let _ = self.pool.release(pid);
        // The release path replenishes; a worker that was already removed
        // (escape kill, background teardown) still needs the idle floor
        self.pool.ensure_idle_worker();
        self.background.on_worker_exit(pid);
        if was_owner {
            // The surface is now unowned; nothing may assume the script is
            // still running behind it.
            self.flush_pending_bounds();
            self.arbitrator.on_owner_released(&self.state, &self.surface);
        }
    }

    fn handle_file_event(&mut self, event: WatchEventKind, path: PathBuf) {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        if file_name == "run.txt" {
            if event != WatchEventKind::Unlink && self.run_txt_debounce.signal(Instant::now()) {
                self.trigger_run_txt();
            }
            return;
        }

        if file_name == ".env" {
            info!("kenv .env changed, rescanning scripts");
            self.scan_scripts();
            return;
        }

        if file_name == "app.json" {
            info!("Preferences changed, reloading");
            let prefs = config::load_prefs(&config::prefs_path());
            self.bounds.set_enabled(prefs.cache_prompt);
            return;
        }

        if !metadata::is_script_file(&path) {
            return;
        }

        match event {
            WatchEventKind::Unlink => self.unlink_script(&path),
            WatchEventKind::Add | WatchEventKind::Change => {
                let fire = self
                    .change_debounces
                    .entry(path.clone())
                    .or_insert_with(|| Debouncer::leading(SCRIPT_CHANGE_DEBOUNCE_MS))
                    .signal(Instant::now());
                if fire {
                    self.script_changed(&path);
                }
            }
        }
    }

    /// Fan a script definition change out to every trigger manager. Each
    /// manager applies remove-then-recreate on its own handle.
    fn script_changed(&mut self, path: &Path) {
        let meta = match metadata::parse_script_file(path) {
            Ok(meta) => meta,
            Err(e) => {
                warn!(script = %path.display(), error = %e, "Script unreadable, tearing down triggers");
                self.unlink_script(path);
                return;
            }
        };
        debug!(script = %path.display(), "Script definition changed");
        self.fanout_count += 1;
        self.apply_meta(path, &meta, false);
        // Shape may have changed; stale geometry would fight the new prompt
        self.bounds.clear_for_script(path);
    }

    /// Remove every trigger handle owned by a deleted script.
    fn unlink_script(&mut self, path: &Path) {
        info!(script = %path.display(), "Script removed, tearing down triggers");
        if let Some(hotkeys) = self.hotkeys.as_mut() {
            hotkeys.unregister(path);
        }
        self.schedule.remove(path);
        self.watches.remove(path);
        self.background.remove(&mut self.pool, path);
        self.bounds.clear_for_script(path);
        self.change_debounces.remove(path);
    }

    fn apply_meta(&mut self, path: &Path, meta: &ScriptMeta, startup: bool) {
        if let Some(hotkeys) = self.hotkeys.as_mut() {
            hotkeys.script_changed(path, meta);
        }
        self.schedule.script_changed(path, meta);
        self.watches.script_changed(path, meta);
        if startup {
            self.background.startup(path, meta);
        } else {
            self.background.script_changed(&mut self.pool, path, meta);
        }
    }

    /// Register triggers for everything on disk (startup and .env refresh).
    fn scan_scripts(&mut self) {
        let root = paths::scripts_path();
        let mut scripts = Vec::new();
        collect_scripts(&root, &mut scripts);
        info!(count = scripts.len(), root = %root.display(), "Scanning scripts");
        for script in scripts {
            match metadata::parse_script_file(&script) {
                Ok(meta) => {
                    if meta.has_triggers() {
                        self.apply_meta(&script, &meta, true);
                    }
                }
                Err(e) => warn!(script = %script.display(), error = %e, "Skipping unreadable script"),
            }
        }
    }

    fn trigger_run_txt(&mut self) {
        let run_txt = paths::run_txt_path();
        let contents = match std::fs::read_to_string(&run_txt) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(error = %e, "run.txt unreadable");
                return;
            }
        };
        let Some((name, args)) = watcher::parse_run_txt(&contents) else {
            debug!("run.txt empty");
            return;
        };
        let script = watcher::resolve_script_path(&name, &paths::scripts_path());
        info!(script = %script.display(), args = ?args, "run.txt trigger");
        self.handle_run(RunRequest::new(script, args, Trigger::Kit, true));
    }

    fn handle_power(&mut self, power: PowerEvent) {
        match power {
            PowerEvent::Suspend => {
                info!("System suspending, removing watchers");
                self.watcher = None;
                self.schedule.sleep();
                self.state.set_suspended(true);
            }
            PowerEvent::Resume => {
                info!("System waking, starting watchers");
                match ScriptsWatcher::start(self.events_tx.clone()) {
                    Ok(watcher) => self.watcher = Some(watcher),
                    Err(e) => warn!(error = %e, "Scripts watcher failed to restart"),
                }
                self.schedule.wake();
                self.state.set_suspended(false);
            }
            PowerEvent::LockScreen => self.state.set_screen_locked(true),
            PowerEvent::UnlockScreen => self.state.set_screen_locked(false),
        }
    }

    fn flush_pending_bounds(&mut self) {
        let Some((display_id, script, bounds)) = self.pending_bounds.take() else {
            return;
        };
        let displays = self.displays.displays();
        self.bounds
            .put(&displays, &display_id, &script, bounds)
            .warn_on_err();
        self.state.set_modified_by_user(false);
    }

    fn teardown(&mut self) {
        info!(
            script_changes = self.fanout_count,
            "Orchestrator shutting down"
        );
        self.flush_pending_bounds();
        self.subscriptions.clear();
        self.watcher = None;
        self.watches.clear();
        self.schedule.stop();
        self.pool.shutdown();
        self.surface.send(SurfaceCommand::Hide);
    }

    #[cfg(test)]
    pub(crate) fn fanout_count(&self) -> u64 {
        self.fanout_count
    }

    #[cfg(test)]
    pub(crate) fn set_bounds_cache(&mut self, cache: BoundsCache) {
        self.bounds = cache;
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &WorkerPool {
        &self.pool
    }
}

fn collect_scripts(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_scripts(&path, out);
        } else if metadata::is_script_file(&path) {
            out.push(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::{DisplayInfo, StaticDisplays};
    use crate::pool::testing::MockSpawner;
    use crate::router::ClipboardImages;
    use std::sync::Arc;

    struct NoClipboard;
    impl ClipboardImages for NoClipboard {
        fn read_image_png(&mut self) -> Option<Vec<u8>> {
            None
        }
    }

    fn orchestrator() -> (Orchestrator, Arc<MockSpawner>, Receiver<SurfaceCommand>) {
        let spawner = Arc::new(MockSpawner::new());
        let displays = StaticDisplays(vec![DisplayInfo {
            id: "1".to_string(),
            x: 0.0,
            y: 0.0,
            width: 1920.0,
            height: 1080.0,
        }]);
        let (orch, surface_rx) = Orchestrator::new(
            Box::new(Arc::clone(&spawner)),
            Box::new(displays),
            &Config::default(),
            PathBuf::from("/kit/main/index.js"),
            Box::new(NoClipboard),
        );
        (orch, spawner, surface_rx)
    }

    fn run_event(script: &str, trigger: Trigger, force: bool) -> AppEvent {
        AppEvent::Run(RunRequest::new(
            PathBuf::from(script),
            vec![],
            trigger,
            force,
        ))
    }

    #[test]
    fn test_worker_exit_clears_ownership_and_replenishes() {
        // Scenario D end to end through the loop
        let (mut orch, _spawner, _surface_rx) = orchestrator();
        orch.handle_event(run_event("/kenv/scripts/foo.js", Trigger::Shortcut, false));

        let pid = orch.state().pid().expect("owner bound");
        orch.handle_event(AppEvent::WorkerExit { pid, code: Some(1) });

        assert_eq!(orch.state().pid(), None);
        assert_eq!(orch.state().script_path(), None);
        assert!(!orch.state().surface_visible());
        assert!(orch.pool().idle_count() >= 1);

        // A subsequent request for any script succeeds
        orch.handle_event(run_event("/kenv/scripts/bar.js", Trigger::App, false));
        assert!(orch.state().pid().is_some());
    }

    #[test]
    fn test_change_events_within_window_fan_out_once() {
        // Scenario E: two change events inside the debounce window
        let (mut orch, _spawner, _surface_rx) = orchestrator();
        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("watched.ts");
        std::fs::write(&script, "// Cron: * * * * *\n").unwrap();

        orch.handle_event(AppEvent::File {
            event: WatchEventKind::Change,
            path: script.clone(),
        });
        orch.handle_event(AppEvent::File {
            event: WatchEventKind::Change,
            path: script.clone(),
        });

        assert_eq!(orch.fanout_count(), 1);
        assert_eq!(orch.schedule.entries().len(), 1);
    }

    #[test]
    fn test_unlink_tears_down_all_handles() {
        let (mut orch, _spawner, _surface_rx) = orchestrator();
        let dir = tempfile::TempDir::new().unwrap();
        let watched_dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("full.ts");
        std::fs::write(
            &script,
            format!(
                "// Cron: * * * * *\n// Watch: {}\n// Background: auto\nexport {{}};\n",
                watched_dir.path().display()
            ),
        )
        .unwrap();

        orch.handle_event(AppEvent::File {
            event: WatchEventKind::Change,
            path: script.clone(),
        });
        assert_eq!(orch.schedule.entries().len(), 1);
        assert!(orch.watches.is_watching(&script));

        orch.handle_event(AppEvent::File {
            event: WatchEventKind::Unlink,
            path: script.clone(),
        });
        assert!(orch.schedule.entries().is_empty());
        assert!(!orch.watches.is_watching(&script));
        assert!(!orch.background.is_running(&script));
    }

    #[test]
    fn test_background_run_records_entry() {
        let (mut orch, _spawner, _surface_rx) = orchestrator();
        let script = "/kenv/scripts/daemon.ts";
        orch.handle_event(run_event(script, Trigger::Background, false));

        assert!(orch.background.is_running(Path::new(script)));
        // Headless: no surface ownership
        assert_eq!(orch.state().pid(), None);
    }

    #[test]
    fn test_worker_message_multiplexed_to_surface() {
        let (mut orch, _spawner, surface_rx) = orchestrator();
        orch.handle_event(run_event("/kenv/scripts/foo.js", Trigger::Shortcut, false));
        let pid = orch.state().pid().unwrap();
        while surface_rx.try_recv().is_ok() {}

        orch.handle_event(AppEvent::Worker {
            pid,
            message: WorkerMessage::new(Channel::Choices, pid as i64),
        });

        match surface_rx.try_recv().unwrap() {
            SurfaceCommand::Forward { pid: from, message } => {
                assert_eq!(from, pid);
                assert_eq!(message.channel, Channel::Choices);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_worker_exit_message_releases_worker() {
        let (mut orch, _spawner, _surface_rx) = orchestrator();
        orch.handle_event(run_event("/kenv/scripts/foo.js", Trigger::Shortcut, false));
        let pid = orch.state().pid().unwrap();

        orch.handle_event(AppEvent::Worker {
            pid,
            message: WorkerMessage::new(Channel::Exit, pid as i64),
        });

        assert!(orch.pool().get(pid).is_none());
        assert_eq!(orch.state().pid(), None);
    }

    #[test]
    fn test_suspend_resume_cycle() {
        let (mut orch, _spawner, _surface_rx) = orchestrator();
        orch.handle_event(AppEvent::Power(PowerEvent::Suspend));
        assert!(orch.state().suspended());

        orch.handle_event(AppEvent::Power(PowerEvent::Resume));
        assert!(!orch.state().suspended());
    }

    #[test]
    fn test_lock_screen_flags_state() {
        let (mut orch, _spawner, _surface_rx) = orchestrator();
        orch.handle_event(AppEvent::Power(PowerEvent::LockScreen));
        assert!(orch.state().screen_locked());
        orch.handle_event(AppEvent::Power(PowerEvent::UnlockScreen));
        assert!(!orch.state().screen_locked());
    }

    #[test]
    fn test_bounds_settle_persists_after_quiet_window() {
        let (mut orch, _spawner, _surface_rx) = orchestrator();
        let dir = tempfile::TempDir::new().unwrap();
        orch.set_bounds_cache(BoundsCache::load(
            dir.path().join("prompt.json"),
            Config::default().sizing,
            true,
        ));
        orch.handle_event(run_event("/kenv/scripts/foo.js", Trigger::Shortcut, false));
        let script = orch.state().script_path().unwrap();

        let settled = PromptBounds {
            x: 400.0,
            y: 150.0,
            width: 700.0,
            height: 520.0,
        };
        orch.handle_event(AppEvent::SurfaceBounds {
            display_id: "1".to_string(),
            bounds: settled,
        });
        assert!(orch.state().modified_by_user());

        // Trailing edge: only the settled state is persisted
        orch.tick(Instant::now() + Duration::from_millis(600));
        assert_eq!(orch.bounds.get("1", &script), Some(settled));
        assert!(!orch.state().modified_by_user());
    }

    #[test]
    fn test_resume_shortcuts_unpauses() {
        let (mut orch, _spawner, _surface_rx) = orchestrator();
        orch.handle_event(run_event("/kenv/scripts/foo.js", Trigger::Shortcut, false));
        assert!(orch.hotkey_pause.is_paused());

        orch.handle_event(AppEvent::ResumeShortcuts);
        assert!(!orch.hotkey_pause.is_paused());
    }

    #[test]
    fn test_shutdown_event_stops_loop_flag() {
        let (mut orch, _spawner, _surface_rx) = orchestrator();
        orch.handle_event(AppEvent::Shutdown);
        assert!(orch.shutdown);
    }
}
