//! Binary entry point: wiring and startup sequencing.
//!
//! Startup order matters:
//! 1. logging, then the second-instance check (forward and exit early)
//! 2. orphan cleanup from a previous crash, then claim the pid file
//! 3. component wiring, trigger registration, pool warm-up
//! 4. the event loop, on this thread, until shutdown

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use script_kit_orchestrator::arbitrator::{RunRequest, Trigger};
use script_kit_orchestrator::bounds::{DisplayInfo, StaticDisplays};
use script_kit_orchestrator::config;
use script_kit_orchestrator::event_loop::{AppEvent, Orchestrator};
use script_kit_orchestrator::hotkeys::HotkeyManager;
use script_kit_orchestrator::instance;
use script_kit_orchestrator::logging;
use script_kit_orchestrator::paths;
use script_kit_orchestrator::pool::ProcessSpawner;
use script_kit_orchestrator::registry::ProcessRegistry;
use script_kit_orchestrator::router::SystemClipboard;

#[derive(Parser, Debug)]
#[command(name = "script-kit-orchestrator", about = "Script Kit worker-pool orchestrator")]
struct Cli {
    /// Script to run on startup (forwarded when an instance already runs)
    script: Option<PathBuf>,
    /// Arguments passed to the script
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = logging::init();

    let registry = Arc::new(ProcessRegistry::new());
    let main_script = paths::kit_path().join("main").join("index.js");

    // A second launch hands its request to the running instance and exits;
    // with no script argument it summons the main menu instead.
    let relaunch_target = cli.script.clone().unwrap_or_else(|| main_script.clone());
    if instance::forward_to_running_instance(&registry, &relaunch_target, &cli.args)? {
        return Ok(());
    }

    let orphans = registry.cleanup_orphans();
    if orphans > 0 {
        info!(orphans = orphans, "Reaped workers from previous session");
    }
    registry
        .write_main_pid()
        .context("failed to write orchestrator pid file")?;

    let config = config::load_config();

    // No runtime anywhere is the one unrecoverable condition: no worker
    // can ever be spawned.
    let spawner =
        ProcessSpawner::new(Arc::clone(&registry)).context("cannot start worker pool")?;

    // Display discovery belongs to the UI layer; until one attaches, the
    // bounds cache validates against a single configured work area.
    let displays = StaticDisplays(vec![DisplayInfo {
        id: "0".to_string(),
        x: 0.0,
        y: 0.0,
        width: config::FALLBACK_DISPLAY_WIDTH,
        height: config::FALLBACK_DISPLAY_HEIGHT,
    }]);

    let (mut orchestrator, surface_rx) = Orchestrator::new(
        Box::new(spawner),
        Box::new(displays),
        &config,
        main_script.clone(),
        Box::new(SystemClipboard),
    );
    let events = orchestrator.events();

    // Until a real UI attaches, surface commands are drained to the log so
    // the channel never backs up.
    std::thread::spawn(move || {
        for command in surface_rx {
            tracing::debug!(command = ?command, "surface");
        }
    });

    match HotkeyManager::new() {
        Ok(mut hotkeys) => {
            if let Err(e) = hotkeys.register_main(&config.prefs.main_shortcut) {
                warn!(error = %e, "Main shortcut not registered");
            }
            hotkeys.start_listener(events.clone(), main_script);
            orchestrator.set_hotkeys(hotkeys);
        }
        Err(e) => warn!(error = %e, "Global hotkeys unavailable"),
    }

    orchestrator.start_triggers();
    orchestrator.bootstrap();

    if let Some(script) = cli.script {
        let _ = events.send(AppEvent::Run(RunRequest::new(
            script,
            cli.args,
            Trigger::App,
            false,
        )));
    }

    orchestrator.run();

    registry.kill_all();
    registry.remove_main_pid();
    info!("Orchestrator exited cleanly");
    Ok(())
}
