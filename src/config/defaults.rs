//! Default constant values for all configuration.

/// Default prompt width in logical pixels.
pub const DEFAULT_WIDTH: f64 = 370.0;
/// Default prompt height, letter-paper aspect over the default width.
pub const DEFAULT_HEIGHT: f64 = 479.0;
/// Height of a bare input row; also the floor for prompt height.
pub const INPUT_HEIGHT: f64 = 64.0;
/// Minimum persistable prompt width.
pub const MIN_WIDTH: f64 = 320.0;
/// Minimum persistable prompt height.
pub const MIN_HEIGHT: f64 = INPUT_HEIGHT;

/// Editor-style surfaces never open smaller than this.
pub const EDITOR_HEIGHT: f64 = 480.0;

/// Upper bound on pool size (idle + active workers).
pub const MAX_POOL_SIZE: usize = 8;
/// Idle workers kept warm by eager replenishment.
pub const IDLE_TARGET: usize = 1;

/// Quiet window for the run.txt trigger (leading edge).
pub const RUN_TXT_DEBOUNCE_MS: u64 = 1000;
/// Quiet window for per-script definition-change fan-out (leading edge).
pub const SCRIPT_CHANGE_DEBOUNCE_MS: u64 = 500;
/// Quiet window before persisting settled bounds (trailing edge).
pub const BOUNDS_SETTLE_DEBOUNCE_MS: u64 = 500;
/// Quiet window before reloading the surface after a prompt error
/// (trailing edge).
pub const PROMPT_ERROR_RELOAD_DEBOUNCE_MS: u64 = 1000;

/// Scheduler due-check interval in seconds.
pub const SCHEDULE_CHECK_INTERVAL_SECS: u64 = 30;

/// Whether prompt bounds are cached per display/script by default.
pub const DEFAULT_CACHE_PROMPT: bool = true;

/// Default hotkey for summoning the main menu.
pub const DEFAULT_MAIN_SHORTCUT: &str = "cmd ;";

/// Fallback display used when no display information was provided.
pub const FALLBACK_DISPLAY_WIDTH: f64 = 1920.0;
/// See [`FALLBACK_DISPLAY_WIDTH`].
pub const FALLBACK_DISPLAY_HEIGHT: f64 = 1080.0;
