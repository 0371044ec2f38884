//! Second-instance handling.
//!
//! Only one orchestrator runs per user. A second launch with a script
//! argument does not start its own pool: it checks the registry's pid file
//! for a live instance and, if one exists, forwards `<script> <args...>`
//! through the watched trigger file (run.txt), which the running instance's
//! watcher picks up as a forced run request. The second process then exits.
//!
//! A stale pid file (crashed previous run) is removed so the new launch can
//! become the instance.

use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::paths;
use crate::registry::ProcessRegistry;

/// Try to hand this launch's run request to an already-running instance.
///
/// Returns `Ok(true)` when a live instance exists and the request was
/// forwarded (the caller should exit), `Ok(false)` when this launch should
/// become the instance.
pub fn forward_to_running_instance(
    registry: &ProcessRegistry,
    script: &Path,
    args: &[String],
) -> std::io::Result<bool> {
    if !registry.main_instance_alive() {
        if registry.read_main_pid().is_some() {
            info!("Stale orchestrator pid file found, taking over");
            registry.remove_main_pid();
        }
        return Ok(false);
    }

    let run_txt = paths::run_txt_path();
    write_run_txt(&run_txt, script, args)?;
    info!(
        script = %script.display(),
        args = ?args,
        "Forwarded run request to running instance"
    );
    Ok(true)
}

/// Write the trigger line atomically so the watcher never reads a torn
/// file: `<script> <arg>...`.
fn write_run_txt(run_txt: &Path, script: &Path, args: &[String]) -> std::io::Result<()> {
    if let Some(parent) = run_txt.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut line = script.display().to_string();
    for arg in args {
        if arg.contains(char::is_whitespace) {
            warn!(arg = %arg, "run.txt args are whitespace-delimited; argument will split");
        }
        line.push(' ');
        line.push_str(arg);
    }
    line.push('\n');

    let tmp = run_txt.with_extension("txt.tmp");
    fs::write(&tmp, line)?;
    fs::rename(&tmp, run_txt)?;
    Ok(())
}
