//! Message routing between the surface and worker processes.
//!
//! Inbound surface messages carry the pid of the worker they address; the
//! router looks the worker up and forwards, in arrival order, with a small
//! set of special-cased channels. Messages carrying the "no owner" sentinel
//! pid are dropped silently; an unknown pid is logged as a warning and
//! dropped. Channels outside the fixed vocabulary are forwarded to the
//! worker verbatim - the surface and the SDK version together, the router
//! does not gatekeep.
//!
//! Special cases:
//! - *paste*: a clipboard image is written to a timestamped file under the
//!   scratch directory and the file path substituted into the message
//! - *escape*: a worker whose value was already submitted (or any worker in
//!   debug mode) is terminated instead of receiving the event
//! - *value-submitted* / *tab-changed*: re-enable global hotkeys that were
//!   paused while the surface had input focus
//! - *prompt-error*: schedules a debounced surface reload (unresponsive
//!   worker recovery)

use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::PROMPT_ERROR_RELOAD_DEBOUNCE_MS;
use crate::debounce::Debouncer;
use crate::event_loop::AppEvent;
use crate::pool::WorkerPool;
use crate::protocol::{Channel, WorkerMessage, ANONYMOUS_PID, NO_OWNER_PID};
use crate::state::KitState;
use crate::surface::{SurfaceCommand, SurfaceLink};

/// Clipboard image access, as PNG bytes. Seam for tests and for headless
/// environments with no clipboard at all.
pub trait ClipboardImages: Send {
    fn read_image_png(&mut self) -> Option<Vec<u8>>;
}

/// System clipboard via arboard. The connection is opened lazily per read;
/// clipboard owners come and go and a stale handle reads stale data.
pub struct SystemClipboard;

impl ClipboardImages for SystemClipboard {
    fn read_image_png(&mut self) -> Option<Vec<u8>> {
        let mut clipboard = arboard::Clipboard::new().ok()?;
        let img = clipboard.get_image().ok()?;
        let rgba = image::RgbaImage::from_raw(
            img.width as u32,
            img.height as u32,
            img.bytes.into_owned(),
        )?;
        let mut png = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(rgba)
            .write_to(&mut png, image::ImageFormat::Png)
            .ok()?;
        Some(png.into_inner())
    }
}

/// How a routed message resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    Forwarded,
    Dropped,
    /// The escape special case terminated the worker.
    Killed,
}

pub struct Router {
    scratch_dir: PathBuf,
    clipboard: Box<dyn ClipboardImages>,
    reload_debounce: Debouncer,
}

impl Router {
    pub fn new(scratch_dir: PathBuf, clipboard: Box<dyn ClipboardImages>) -> Self {
        Router {
            scratch_dir,
            clipboard,
            reload_debounce: Debouncer::trailing(PROMPT_ERROR_RELOAD_DEBOUNCE_MS),
        }
    }

    /// Route one inbound surface message.
    pub fn route(
        &mut self,
        pool: &mut WorkerPool,
        state: &KitState,
        events: &Sender<AppEvent>,
        now: Instant,
        mut msg: WorkerMessage,
    ) -> RouteOutcome {
        let channel = msg.channel.clone();

        // Surface-level error channel: not addressed to a worker
        if channel == Channel::PromptError {
            match u32::try_from(msg.pid) {
                Ok(pid) if pid != 0 && pool.get(pid).is_some() => {
                    let stall = crate::error::OrchestratorError::UnresponsiveWorker { pid };
                    warn!(error = %stall, value = ?msg.value, "Prompt error reported");
                }
                _ => warn!(value = ?msg.value, "Prompt error reported"),
            }
            if state.surface_visible() {
                self.reload_debounce.signal(now);
            }
            return RouteOutcome::Dropped;
        }

        if msg.pid == NO_OWNER_PID {
            return RouteOutcome::Dropped;
        }
        let pid = match u32::try_from(msg.pid) {
            Ok(pid) if pool.get(pid).is_some() => pid,
            _ => {
                if msg.pid != ANONYMOUS_PID {
                    warn!(
                        channel = channel.as_str(),
                        pid = msg.pid,
                        "Message addressed to unknown pid, dropping"
                    );
                }
                return RouteOutcome::Dropped;
            }
        };

        // Submission hands input focus back; global hotkeys wake up
        if matches!(channel, Channel::ValueSubmitted | Channel::TabChanged) {
            let _ = events.send(AppEvent::ResumeShortcuts);
        }

        if channel == Channel::ValueSubmitted {
            state.set_ignore_blur(false);
            if let Some(ui_state) = msg.state.as_mut() {
                if ui_state.value.as_ref().and_then(|v| v.as_str())
                    == Some(Channel::Terminal.as_str())
                {
                    ui_state.value = Some(serde_json::Value::String(String::new()));
                }
            }
        }

        if channel == Channel::OnPaste {
            return self.route_paste(pool, pid, msg);
        }

        if channel == Channel::Blur && state.debugging() {
            return RouteOutcome::Dropped;
        }

        let escape_shortcut = channel == Channel::Shortcut
            && msg
                .state
                .as_ref()
                .and_then(|s| s.shortcut.as_deref())
                .is_some_and(|s| s == "escape");
        if channel == Channel::Escape || escape_shortcut {
            let submitted = msg.state.as_ref().is_some_and(|s| s.submitted);
            if submitted || state.debugging() {
                debug!(pid = pid, submitted = submitted, "Escape terminates worker");
                state.set_debugging(false);
                pool.remove_by_pid(pid);
                let _ = events.send(AppEvent::WorkerExit { pid, code: None });
                return RouteOutcome::Killed;
            }
        }

        self.forward(pool, pid, &msg)
    }

    /// Drive the trailing reload debounce. Called on every loop tick.
    pub fn tick(&mut self, now: Instant, state: &KitState, surface: &SurfaceLink) {
        if self.reload_debounce.poll(now) && state.surface_visible() {
            warn!("Reloading surface after prompt error");
            surface.send(SurfaceCommand::Reload);
        }
    }

    /// Multiplex a worker's message back to the surface.
    pub fn forward_to_surface(&self, surface: &SurfaceLink, pid: u32, message: WorkerMessage) {
        surface.send(SurfaceCommand::Forward { pid, message });
    }

    fn route_paste(
        &mut self,
        pool: &mut WorkerPool,
        pid: u32,
        mut msg: WorkerMessage,
    ) -> RouteOutcome {
        let Some(png) = self.clipboard.read_image_png() else {
            // Plain-text paste reaches the worker through the input channel;
            // the paste event itself is image-only.
            return RouteOutcome::Dropped;
        };

        let timestamp = Utc::now().format("%Y-%m-%d-%H-%M-%S");
        let file_path = self.scratch_dir.join(format!("{}.png", timestamp));
        if let Err(e) = fs::create_dir_all(&self.scratch_dir).and_then(|_| fs::write(&file_path, &png)) {
            warn!(error = %e, "Failed to write pasted image, dropping paste");
            return RouteOutcome::Dropped;
        }
        debug!(path = %file_path.display(), bytes = png.len(), "Clipboard image captured");

        let ui_state = msg.state.get_or_insert_with(Default::default);
        ui_state.paste = Some(file_path.display().to_string());
        ui_state.is_paste_image = true;
        self.forward(pool, pid, &msg)
    }

    fn forward(&self, pool: &mut WorkerPool, pid: u32, msg: &WorkerMessage) -> RouteOutcome {
        let Some(worker) = pool.get(pid) else {
            return RouteOutcome::Dropped;
        };
        match worker.send(msg) {
            Ok(()) => RouteOutcome::Forwarded,
            Err(e) => {
                warn!(pid = pid, channel = msg.channel.as_str(), error = %e, "Forward failed");
                if let Some(worker) = pool.get_mut(pid) {
                    worker.mark_disconnected();
                }
                RouteOutcome::Dropped
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::pool::testing::MockSpawner;
    use crate::pool::WorkerKind;
    use crate::protocol::UiState;
    use std::path::Path;
    use std::sync::mpsc::{channel, Receiver};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    struct NoClipboard;
    impl ClipboardImages for NoClipboard {
        fn read_image_png(&mut self) -> Option<Vec<u8>> {
            None
        }
    }

    struct FakeImage(Vec<u8>);
    impl ClipboardImages for FakeImage {
        fn read_image_png(&mut self) -> Option<Vec<u8>> {
            Some(self.0.clone())
        }
    }

    struct Fixture {
        spawner: Arc<MockSpawner>,
        pool: WorkerPool,
        state: KitState,
        router: Router,
        events_tx: Sender<AppEvent>,
        events_rx: Receiver<AppEvent>,
        pid: u32,
        _dir: TempDir,
    }

    fn fixture_with_clipboard(clipboard: Box<dyn ClipboardImages>) -> Fixture {
        let spawner = Arc::new(MockSpawner::new());
        let (pool_tx, _pool_rx) = channel();
        let mut pool = WorkerPool::new(
            Box::new(Arc::clone(&spawner)),
            pool_tx,
            PoolConfig::default(),
        );
        let pid = pool.acquire_idle_worker().unwrap();
        pool.assign(pid, Path::new("/kenv/scripts/foo.js"), WorkerKind::Prompt);
        // Drain the kickoff-free outbox so tests start clean
        let _ = spawner.sent_to(pid);

        let dir = TempDir::new().unwrap();
        let router = Router::new(dir.path().join("images"), clipboard);
        let (events_tx, events_rx) = channel();
        Fixture {
            spawner,
            pool,
            state: KitState::new(),
            router,
            events_tx,
            events_rx,
            pid,
            _dir: dir,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_clipboard(Box::new(NoClipboard))
    }

    fn route(f: &mut Fixture, msg: WorkerMessage) -> RouteOutcome {
        f.router
            .route(&mut f.pool, &f.state, &f.events_tx, Instant::now(), msg)
    }

    #[test]
    fn test_no_owner_sentinel_dropped_silently() {
        let mut f = fixture();
        let outcome = route(&mut f, WorkerMessage::new(Channel::Input, NO_OWNER_PID));
        assert_eq!(outcome, RouteOutcome::Dropped);
        assert!(f.spawner.sent_to(f.pid).is_empty());
    }

    #[test]
    fn test_unknown_pid_dropped() {
        let mut f = fixture();
        let outcome = route(&mut f, WorkerMessage::new(Channel::Input, 999_999));
        assert_eq!(outcome, RouteOutcome::Dropped);
    }

    #[test]
    fn test_known_pid_forwarded_in_order() {
        let mut f = fixture();
        let pid = f.pid as i64;
        route(&mut f, WorkerMessage::new(Channel::Up, pid));
        route(&mut f, WorkerMessage::new(Channel::Down, pid));
        route(&mut f, WorkerMessage::new(Channel::Input, pid));

        let sent = f.spawner.sent_to(f.pid);
        let channels: Vec<&str> = sent.iter().map(|m| m.channel.as_str()).collect();
        assert_eq!(channels, ["UP", "DOWN", "INPUT"]);
    }

    #[test]
    fn test_unknown_channel_forwarded_verbatim() {
        let mut f = fixture();
        let mut msg = WorkerMessage::new(Channel::Other("WIDGET_MOVED".into()), f.pid as i64);
        msg.value = Some(serde_json::json!({"x": 7}));

        let outcome = route(&mut f, msg);
        assert_eq!(outcome, RouteOutcome::Forwarded);
        let sent = f.spawner.sent_to(f.pid);
        assert_eq!(sent[0].channel.as_str(), "WIDGET_MOVED");
        assert_eq!(sent[0].value, Some(serde_json::json!({"x": 7})));
    }

    #[test]
    fn test_escape_after_submit_kills_worker() {
        let mut f = fixture();
        let mut msg = WorkerMessage::new(Channel::Escape, f.pid as i64);
        msg.state = Some(UiState {
            submitted: true,
            ..Default::default()
        });

        let outcome = route(&mut f, msg);
        assert_eq!(outcome, RouteOutcome::Killed);
        assert!(f.pool.get(f.pid).is_none());
        // Pool bookkeeping resolves through the exit event
        assert!(f
            .events_rx
            .try_iter()
            .any(|e| matches!(e, AppEvent::WorkerExit { pid, .. } if pid == f.pid)));
    }

    #[test]
    fn test_escape_before_submit_forwarded() {
        let mut f = fixture();
        let mut msg = WorkerMessage::new(Channel::Escape, f.pid as i64);
        msg.state = Some(UiState::default());

        let outcome = route(&mut f, msg);
        assert_eq!(outcome, RouteOutcome::Forwarded);
        assert!(f.pool.get(f.pid).is_some());
    }

    #[test]
    fn test_escape_shortcut_while_debugging_kills() {
        let mut f = fixture();
        f.state.set_debugging(true);
        let mut msg = WorkerMessage::new(Channel::Shortcut, f.pid as i64);
        msg.state = Some(UiState {
            shortcut: Some("escape".into()),
            ..Default::default()
        });

        let outcome = route(&mut f, msg);
        assert_eq!(outcome, RouteOutcome::Killed);
        // Debug flag is consumed by the kill
        assert!(!f.state.debugging());
    }

    #[test]
    fn test_blur_dropped_while_debugging() {
        let mut f = fixture();
        f.state.set_debugging(true);
        let pid = f.pid;
        let outcome = route(&mut f, WorkerMessage::new(Channel::Blur, pid as i64));
        assert_eq!(outcome, RouteOutcome::Dropped);

        f.state.set_debugging(false);
        let pid = f.pid;
        let outcome = route(&mut f, WorkerMessage::new(Channel::Blur, pid as i64));
        assert_eq!(outcome, RouteOutcome::Forwarded);
    }

    #[test]
    fn test_value_submitted_resumes_shortcuts_and_clears_blur_guard() {
        let mut f = fixture();
        f.state.set_ignore_blur(true);

        let pid = f.pid;
        route(&mut f, WorkerMessage::new(Channel::ValueSubmitted, pid as i64));
        assert!(!f.state.ignore_blur());
        assert!(f
            .events_rx
            .try_iter()
            .any(|e| matches!(e, AppEvent::ResumeShortcuts)));
    }

    #[test]
    fn test_tab_changed_resumes_shortcuts() {
        let mut f = fixture();
        let pid = f.pid;
        route(&mut f, WorkerMessage::new(Channel::TabChanged, pid as i64));
        assert!(f
            .events_rx
            .try_iter()
            .any(|e| matches!(e, AppEvent::ResumeShortcuts)));
    }

    #[test]
    fn test_terminal_sentinel_value_blanked() {
        let mut f = fixture();
        let mut msg = WorkerMessage::new(Channel::ValueSubmitted, f.pid as i64);
        msg.state = Some(UiState {
            value: Some(serde_json::json!("TERMINAL")),
            ..Default::default()
        });

        route(&mut f, msg);
        let sent = f.spawner.sent_to(f.pid);
        let forwarded_value = sent[0].state.as_ref().unwrap().value.clone();
        assert_eq!(forwarded_value, Some(serde_json::json!("")));
    }

    #[test]
    fn test_paste_with_image_substitutes_path() {
        let png = vec![0x89, 0x50, 0x4E, 0x47];
        let mut f = fixture_with_clipboard(Box::new(FakeImage(png.clone())));

        let pid = f.pid;
        let outcome = route(&mut f, WorkerMessage::new(Channel::OnPaste, pid as i64));
        assert_eq!(outcome, RouteOutcome::Forwarded);

        let sent = f.spawner.sent_to(f.pid);
        let ui_state = sent[0].state.as_ref().unwrap();
        assert!(ui_state.is_paste_image);
        let path = PathBuf::from(ui_state.paste.as_ref().unwrap());
        assert!(path.extension().is_some_and(|e| e == "png"));
        assert_eq!(fs::read(&path).unwrap(), png);
    }

    #[test]
    fn test_paste_without_image_dropped() {
        let mut f = fixture();
        let pid = f.pid;
        let outcome = route(&mut f, WorkerMessage::new(Channel::OnPaste, pid as i64));
        assert_eq!(outcome, RouteOutcome::Dropped);
        assert!(f.spawner.sent_to(f.pid).is_empty());
    }

    #[test]
    fn test_prompt_error_schedules_reload_when_visible() {
        let mut f = fixture();
        f.state.set_surface_visible(true);
        let (surface, surface_rx) = SurfaceLink::new();

        let t0 = Instant::now();
        f.router.route(
            &mut f.pool,
            &f.state,
            &f.events_tx,
            t0,
            WorkerMessage::new(Channel::PromptError, ANONYMOUS_PID),
        );

        // Not yet: the reload waits out the quiet window
        f.router.tick(t0 + Duration::from_millis(100), &f.state, &surface);
        assert!(surface_rx.try_recv().is_err());

        f.router.tick(t0 + Duration::from_millis(1100), &f.state, &surface);
        assert!(matches!(surface_rx.try_recv().unwrap(), SurfaceCommand::Reload));
    }

    #[test]
    fn test_prompt_error_ignored_when_hidden() {
        let mut f = fixture();
        let (surface, surface_rx) = SurfaceLink::new();
        let t0 = Instant::now();

        f.router.route(
            &mut f.pool,
            &f.state,
            &f.events_tx,
            t0,
            WorkerMessage::new(Channel::PromptError, ANONYMOUS_PID),
        );
        f.router.tick(t0 + Duration::from_millis(2000), &f.state, &surface);
        assert!(surface_rx.try_recv().is_err());
    }

    #[test]
    fn test_forward_to_surface_wraps_message() {
        let f = fixture();
        let (surface, surface_rx) = SurfaceLink::new();
        f.router.forward_to_surface(
            &surface,
            f.pid,
            WorkerMessage::new(Channel::Choices, f.pid as i64),
        );
        match surface_rx.try_recv().unwrap() {
            SurfaceCommand::Forward { pid, message } => {
                assert_eq!(pid, f.pid);
                assert_eq!(message.channel, Channel::Choices);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
