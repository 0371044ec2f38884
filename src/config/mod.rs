//! Configuration module - sizing rules, pool limits, and user preferences.
//!
//! # Module Structure
//!
//! - `defaults` - all default constant values
//! - `types` - configuration struct definitions
//! - `loader` - preference document loading and guarded persistence

mod defaults;
mod loader;
mod types;

pub use defaults::{
    BOUNDS_SETTLE_DEBOUNCE_MS, EDITOR_HEIGHT, FALLBACK_DISPLAY_HEIGHT, FALLBACK_DISPLAY_WIDTH,
    PROMPT_ERROR_RELOAD_DEBOUNCE_MS, RUN_TXT_DEBOUNCE_MS, SCHEDULE_CHECK_INTERVAL_SECS,
    SCRIPT_CHANGE_DEBOUNCE_MS,
};
pub use loader::{load_config, load_prefs, prefs_path, save_prefs};
pub use types::{AppPrefs, Config, PoolConfig, PromptSizing};
