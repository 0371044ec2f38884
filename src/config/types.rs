//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::defaults::*;

/// Prompt sizing rules consumed by the bounds cache and the arbitrator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptSizing {
    #[serde(default = "default_width")]
    pub default_width: f64,
    #[serde(default = "default_height")]
    pub default_height: f64,
    #[serde(default = "default_min_width")]
    pub min_width: f64,
    #[serde(default = "default_min_height")]
    pub min_height: f64,
}

fn default_width() -> f64 {
    DEFAULT_WIDTH
}
fn default_height() -> f64 {
    DEFAULT_HEIGHT
}
fn default_min_width() -> f64 {
    MIN_WIDTH
}
fn default_min_height() -> f64 {
    MIN_HEIGHT
}

impl Default for PromptSizing {
    fn default() -> Self {
        PromptSizing {
            default_width: DEFAULT_WIDTH,
            default_height: DEFAULT_HEIGHT,
            min_width: MIN_WIDTH,
            min_height: MIN_HEIGHT,
        }
    }
}

/// Worker pool limits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolConfig {
    /// Upper bound on total workers (idle + active).
    #[serde(default = "default_max_pool_size")]
    pub max_size: usize,
    /// Idle workers kept warm.
    #[serde(default = "default_idle_target")]
    pub idle_target: usize,
}

fn default_max_pool_size() -> usize {
    MAX_POOL_SIZE
}
fn default_idle_target() -> usize {
    IDLE_TARGET
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            max_size: MAX_POOL_SIZE,
            idle_target: IDLE_TARGET,
        }
    }
}

/// Flat application preferences persisted as `db/app.json`.
///
/// Unrecognized keys are preserved across read-modify-write cycles so a
/// newer build never strips fields an older build wrote.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppPrefs {
    /// Persist prompt bounds per display/script.
    #[serde(default = "default_cache_prompt")]
    pub cache_prompt: bool,
    /// Hotkey that summons the main menu.
    #[serde(default = "default_main_shortcut")]
    pub main_shortcut: String,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

fn default_cache_prompt() -> bool {
    DEFAULT_CACHE_PROMPT
}
fn default_main_shortcut() -> String {
    DEFAULT_MAIN_SHORTCUT.to_string()
}

impl Default for AppPrefs {
    fn default() -> Self {
        AppPrefs {
            cache_prompt: DEFAULT_CACHE_PROMPT,
            main_shortcut: DEFAULT_MAIN_SHORTCUT.to_string(),
            extra: HashMap::new(),
        }
    }
}

/// Top-level configuration assembled at startup.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub sizing: PromptSizing,
    pub pool: PoolConfig,
    pub prefs: AppPrefs,
}
