//! Wire messages exchanged between the surface, the orchestrator, and
//! worker processes.
//!
//! Every record has the shape `{channel, pid, value?, state?}`. The channel
//! vocabulary is fixed and versioned with the surface's UI layer; channels
//! this build does not recognize round-trip through [`Channel::Other`] and
//! are forwarded to the worker without interpretation.

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Sentinel pid meaning "no worker owns the surface". Messages carrying it
/// are dropped silently.
pub const NO_OWNER_PID: i64 = 0;

/// Sentinel pid for messages that intentionally carry no addressee (surface
/// chrome events). Dropped without a warning.
pub const ANONYMOUS_PID: i64 = -1;

/// The fixed channel vocabulary.
///
/// Wire names are SCREAMING_SNAKE strings. `Other` preserves any name this
/// build does not know so the payload can be forwarded verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    Input,
    Change,
    ChoiceFocused,
    Choices,
    NoChoices,
    Back,
    Forward,
    Up,
    Down,
    Left,
    Right,
    Tab,
    TabChanged,
    Escape,
    ValueSubmitted,
    Blur,
    Abandon,
    Shortcut,
    OnPaste,
    OnDrop,
    OnInit,
    OnSubmit,
    PromptError,
    Start,
    Exit,
    Terminal,
    Other(String),
}

impl Channel {
    pub fn as_str(&self) -> &str {
        match self {
            Channel::Input => "INPUT",
            Channel::Change => "CHANGE",
            Channel::ChoiceFocused => "CHOICE_FOCUSED",
            Channel::Choices => "CHOICES",
            Channel::NoChoices => "NO_CHOICES",
            Channel::Back => "BACK",
            Channel::Forward => "FORWARD",
            Channel::Up => "UP",
            Channel::Down => "DOWN",
            Channel::Left => "LEFT",
            Channel::Right => "RIGHT",
            Channel::Tab => "TAB",
            Channel::TabChanged => "TAB_CHANGED",
            Channel::Escape => "ESCAPE",
            Channel::ValueSubmitted => "VALUE_SUBMITTED",
            Channel::Blur => "BLUR",
            Channel::Abandon => "ABANDON",
            Channel::Shortcut => "SHORTCUT",
            Channel::OnPaste => "ON_PASTE",
            Channel::OnDrop => "ON_DROP",
            Channel::OnInit => "ON_INIT",
            Channel::OnSubmit => "ON_SUBMIT",
            Channel::PromptError => "PROMPT_ERROR",
            Channel::Start => "START",
            Channel::Exit => "EXIT",
            Channel::Terminal => "TERMINAL",
            Channel::Other(name) => name,
        }
    }

    /// Whether this channel is part of the fixed vocabulary.
    pub fn is_known(&self) -> bool {
        !matches!(self, Channel::Other(_))
    }
}

impl From<&str> for Channel {
    fn from(name: &str) -> Self {
        match name {
            "INPUT" => Channel::Input,
            "CHANGE" => Channel::Change,
            "CHOICE_FOCUSED" => Channel::ChoiceFocused,
            "CHOICES" => Channel::Choices,
            "NO_CHOICES" => Channel::NoChoices,
            "BACK" => Channel::Back,
            "FORWARD" => Channel::Forward,
            "UP" => Channel::Up,
            "DOWN" => Channel::Down,
            "LEFT" => Channel::Left,
            "RIGHT" => Channel::Right,
            "TAB" => Channel::Tab,
            "TAB_CHANGED" => Channel::TabChanged,
            "ESCAPE" => Channel::Escape,
            "VALUE_SUBMITTED" => Channel::ValueSubmitted,
            "BLUR" => Channel::Blur,
            "ABANDON" => Channel::Abandon,
            "SHORTCUT" => Channel::Shortcut,
            "ON_PASTE" => Channel::OnPaste,
            "ON_DROP" => Channel::OnDrop,
            "ON_INIT" => Channel::OnInit,
            "ON_SUBMIT" => Channel::OnSubmit,
            "PROMPT_ERROR" => Channel::PromptError,
            "START" => Channel::Start,
            "EXIT" => Channel::Exit,
            "TERMINAL" => Channel::Terminal,
            other => Channel::Other(other.to_string()),
        }
    }
}

impl Serialize for Channel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Channel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Channel::from(name.as_str()))
    }
}

/// UI state snapshot attached to surface messages.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(default)]
    pub submitted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortcut: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paste: Option<String>,
    #[serde(default)]
    pub is_paste_image: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// Fields this build does not interpret, preserved verbatim.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// A single wire record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerMessage {
    pub channel: Channel,
    #[serde(default)]
    pub pid: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<UiState>,
    /// Top-level fields outside the fixed shape, preserved verbatim.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl WorkerMessage {
    pub fn new(channel: Channel, pid: i64) -> Self {
        WorkerMessage {
            channel,
            pid,
            value: None,
            state: None,
            extra: HashMap::new(),
        }
    }

    pub fn with_value(channel: Channel, pid: i64, value: serde_json::Value) -> Self {
        WorkerMessage {
            channel,
            pid,
            value: Some(value),
            state: None,
            extra: HashMap::new(),
        }
    }

    /// The kickoff message handed to a freshly assigned worker: which
    /// script to run, with the trigger and force flag appended to the args.
    pub fn run_script(pid: u32, script: &Path, args: &[String], trigger: &str, force: bool) -> Self {
        let mut full_args: Vec<String> = args.to_vec();
        full_args.push("--trigger".to_string());
        full_args.push(trigger.to_string());
        full_args.push("--force".to_string());
        full_args.push(force.to_string());
        WorkerMessage::with_value(
            Channel::ValueSubmitted,
            pid as i64,
            serde_json::json!({
                "script": script.display().to_string(),
                "args": full_args,
                "trigger": trigger,
            }),
        )
    }
}
