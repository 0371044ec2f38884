//! Ownership arbitration.
//!
//! Exactly one worker may drive the shared surface at a time. Every run
//! request - hotkey, schedule, watch, background toggle, relaunch, trigger
//! file - funnels through [`Arbitrator::request_run`], which decides
//! whether the request takes over, no-ops, or runs headless.
//!
//! The state machine: `Idle` (nothing owns the surface) -> `Requesting`
//! (evaluating a request) -> `Owned` (a worker is bound) -> `Handoff` (a
//! new request arrived while owned) -> back to `Owned` or `Idle`.
//!
//! Requests are serialized by the event loop, so two arbitrations never
//! interleave mid-acquisition. The generation stamp covers the one
//! remaining hole: a state subscriber re-entering `request_run` beneath an
//! in-flight request. The most recently accepted request always wins;
//! anything that observes a newer generation after acquiring discards its
//! worker back to the idle set instead of rebinding.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::bounds::{default_bounds, BoundsCache, DisplayProvider, UiKind};
use crate::error::{OrchestratorError, ResultExt};
use crate::pool::{WorkerKind, WorkerPool};
use crate::protocol::WorkerMessage;
use crate::state::KitState;
use crate::surface::{SurfaceCommand, SurfaceLink};

/// What caused a run request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Shortcut,
    Schedule,
    Watch,
    Background,
    SecondInstance,
    Kit,
    App,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Shortcut => "Shortcut",
            Trigger::Schedule => "Schedule",
            Trigger::Watch => "Watch",
            Trigger::Background => "Background",
            Trigger::SecondInstance => "SecondInstance",
            Trigger::Kit => "Kit",
            Trigger::App => "App",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub trigger: Trigger,
    pub force: bool,
}

/// One run request, created per invocation and consumed here.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub script_path: PathBuf,
    pub args: Vec<String>,
    pub options: RunOptions,
}

impl RunRequest {
    pub fn new(script_path: PathBuf, args: Vec<String>, trigger: Trigger, force: bool) -> Self {
        RunRequest {
            script_path,
            args,
            options: RunOptions { trigger, force },
        }
    }
}

/// Arbitration state machine phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Requesting,
    Owned,
    Handoff,
}

/// How a request resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// A worker was bound to the surface.
    Started { pid: u32 },
    /// A headless background worker was started; ownership untouched.
    StartedBackground { pid: u32 },
    /// The surface already shows this script; nothing was acquired.
    AlreadyFocused,
}

pub struct Arbitrator {
    phase: Phase,
    generation: u64,
    main_script: PathBuf,
    sizing: crate::config::PromptSizing,
}

impl Arbitrator {
    pub fn new(main_script: PathBuf, sizing: crate::config::PromptSizing) -> Self {
        Arbitrator {
            phase: Phase::Idle,
            generation: 0,
            main_script,
            sizing,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_main(&self, script: &Path) -> bool {
        script == self.main_script
    }

    /// Evaluate one run request against current ownership.
    #[allow(clippy::too_many_arguments)]
    pub fn request_run(
        &mut self,
        pool: &mut WorkerPool,
        state: &KitState,
        bounds: &mut BoundsCache,
        displays: &dyn DisplayProvider,
        surface: &SurfaceLink,
        req: RunRequest,
    ) -> Result<RunOutcome, OrchestratorError> {
        let script = req.script_path.clone();
        info!(
            script = %script.display(),
            trigger = req.options.trigger.as_str(),
            force = req.options.force,
            "Run requested"
        );

        if self.is_main(&script) {
            // One-shot sweep: workers that lost ownership without a clean
            // handoff are reaped before the main menu binds.
            let swept = pool.remove_abandoned(state.pid());
            if swept > 0 {
                debug!(swept = swept, "Removed abandoned workers");
            }
        }

        // Background runs never contend for the surface.
        if req.options.trigger == Trigger::Background {
            let pid = pool.acquire_idle_worker()?;
            pool.assign(pid, &script, WorkerKind::Background);
            self.kickoff(pool, pid, &script, &req);
            return Ok(RunOutcome::StartedBackground { pid });
        }

        self.phase = if state.surface_visible() {
            Phase::Handoff
        } else {
            Phase::Requesting
        };

        if state.surface_visible() {
            // Tell the current session a new target is starting.
            surface.send(SurfaceCommand::Start(script.clone()));

            let owns_already = state.script_path().as_deref() == Some(script.as_path());
            if owns_already && !req.options.force {
                debug!(script = %script.display(), "Already focused, no reassignment");
                self.phase = Phase::Owned;
                return Ok(RunOutcome::AlreadyFocused);
            }
        }

        self.generation += 1;
        let generation = self.generation;

        let pid = match pool.acquire_idle_worker() {
            Ok(pid) => pid,
            Err(e) => {
                self.phase = if state.script_path().is_some() {
                    Phase::Owned
                } else {
                    Phase::Idle
                };
                surface.send(SurfaceCommand::CouldNotStart(script));
                return Err(e);
            }
        };

        if generation != self.generation {
            // A nested request was accepted beneath us; it owns the surface
            // now. Discard rather than rebind.
            pool.return_to_idle(pid);
            debug!(script = %script.display(), "Request superseded before binding");
            return Err(OrchestratorError::OwnershipDenied {
                script: script.display().to_string(),
            });
        }

        let previous = state.script_path();
        if previous.as_deref() != Some(script.as_path()) {
            state.set_ignore_blur(false);
        }

        pool.assign(pid, &script, WorkerKind::Prompt);
        state.set_pid(Some(pid));
        state.set_script_path(Some(script.clone()));
        self.phase = Phase::Owned;

        surface.send(SurfaceCommand::SetPid(pid));
        let display = displays.current();
        let geometry = bounds
            .get(&display.id, &script)
            .unwrap_or_else(|| default_bounds(&display, UiKind::None, &self.sizing));
        surface.send(SurfaceCommand::SetBounds(geometry));
        surface.send(SurfaceCommand::Show);
        state.set_surface_visible(true);

        self.kickoff(pool, pid, &script, &req);
        info!(pid = pid, script = %script.display(), "Ownership bound");
        Ok(RunOutcome::Started { pid })
    }

    /// The bound worker went away (exit, crash, or explicit kill): the
    /// surface is now unowned and must not be assumed to have a script
    /// behind it.
    pub fn on_owner_released(&mut self, state: &KitState, surface: &SurfaceLink) {
        info!(pid = ?state.pid(), script = ?state.script_path(), "Owner released");
        state.clear_ownership();
        state.set_surface_visible(false);
        surface.send(SurfaceCommand::Hide);
        self.phase = Phase::Idle;
    }

    fn kickoff(&self, pool: &WorkerPool, pid: u32, script: &Path, req: &RunRequest) {
        let message = WorkerMessage::run_script(
            pid,
            script,
            &req.args,
            req.options.trigger.as_str(),
            req.options.force,
        );
        if let Some(worker) = pool.get(pid) {
            worker.send(&message).warn_on_err();
        }
    }
}
