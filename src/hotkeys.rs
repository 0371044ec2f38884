//! Global hotkey triggers.
//!
//! The main-menu shortcut and per-script `// Shortcut:` declarations are
//! registered with the OS through global-hotkey. Pressing one emits a run
//! request into the event loop. While the surface has input focus the whole
//! layer is paused; the router's resume-shortcuts signal re-enables it.
//!
//! Registration follows the same remove-then-recreate discipline as the
//! other managers: a definition change unregisters the script's hotkey
//! before deciding whether to bind a new one.

use global_hotkey::{
    hotkey::{Code, HotKey, Modifiers},
    GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

use crate::arbitrator::{RunRequest, Trigger};
use crate::event_loop::AppEvent;
use crate::metadata::ScriptMeta;

/// Shared pause gate. The event loop flips it; the listener thread reads it.
#[derive(Clone)]
pub struct HotkeyPause(Arc<AtomicBool>);

impl HotkeyPause {
    pub fn new() -> Self {
        HotkeyPause(Arc::new(AtomicBool::new(false)))
    }

    pub fn pause(&self) {
        self.0.store(true, Ordering::SeqCst);
        debug!("Global hotkeys paused");
    }

    pub fn resume(&self) {
        self.0.store(false, Ordering::SeqCst);
        debug!("Global hotkeys resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for HotkeyPause {
    fn default() -> Self {
        Self::new()
    }
}

/// Registered-binding table shared with the listener thread.
#[derive(Default)]
struct Bindings {
    by_id: HashMap<u32, PathBuf>,
    by_script: HashMap<PathBuf, (u32, HotKey)>,
    main_id: Option<u32>,
}

pub struct HotkeyManager {
    manager: GlobalHotKeyManager,
    bindings: Arc<Mutex<Bindings>>,
    main_hotkey: Option<HotKey>,
    paused: HotkeyPause,
}

impl HotkeyManager {
    /// Must be created on the main thread on platforms that care.
    pub fn new() -> anyhow::Result<Self> {
        let manager = GlobalHotKeyManager::new()
            .map_err(|e| anyhow::anyhow!("failed to create hotkey manager: {}", e))?;
        Ok(HotkeyManager {
            manager,
            bindings: Arc::new(Mutex::new(Bindings::default())),
            main_hotkey: None,
            paused: HotkeyPause::new(),
        })
    }

    pub fn pause_handle(&self) -> HotkeyPause {
        self.paused.clone()
    }

    /// Bind the shortcut that summons the main menu.
    pub fn register_main(&mut self, shortcut: &str) -> anyhow::Result<()> {
        let (mods, code) = parse_shortcut(shortcut)
            .ok_or_else(|| anyhow::anyhow!("failed to parse shortcut: {}", shortcut))?;
        let hotkey = HotKey::new(Some(mods), code);

        if let Some(previous) = self.main_hotkey.take() {
            let _ = self.manager.unregister(previous);
        }
        self.manager.register(hotkey).map_err(|e| {
            anyhow::anyhow!("failed to register main shortcut '{}': {}", shortcut, e)
        })?;

        self.bindings.lock().main_id = Some(hotkey.id());
        self.main_hotkey = Some(hotkey);
        info!(shortcut = shortcut, "Main menu shortcut registered");
        Ok(())
    }

    /// Bind a script's declared shortcut.
    pub fn register(&mut self, script: &Path, shortcut: &str) -> anyhow::Result<()> {
        let (mods, code) = parse_shortcut(shortcut)
            .ok_or_else(|| anyhow::anyhow!("failed to parse shortcut: {}", shortcut))?;
        let hotkey = HotKey::new(Some(mods), code);

        self.manager.register(hotkey).map_err(|e| {
            anyhow::anyhow!(
                "failed to register hotkey '{}' for {}: {}",
                shortcut,
                script.display(),
                e
            )
        })?;

        let mut bindings = self.bindings.lock();
        bindings.by_id.insert(hotkey.id(), script.to_path_buf());
        bindings
            .by_script
            .insert(script.to_path_buf(), (hotkey.id(), hotkey));
        info!(script = %script.display(), shortcut = shortcut, "Script shortcut registered");
        Ok(())
    }

    /// Unbind a script's shortcut, if one is registered.
    pub fn unregister(&mut self, script: &Path) {
        let removed = {
            let mut bindings = self.bindings.lock();
            let removed = bindings.by_script.remove(script);
            if let Some((id, _)) = &removed {
                bindings.by_id.remove(id);
            }
            removed
        };
        if let Some((_, hotkey)) = removed {
            if let Err(e) = self.manager.unregister(hotkey) {
                warn!(script = %script.display(), error = %e, "Hotkey unregister failed");
            }
        }
    }

    /// Apply a script's (possibly changed) shortcut metadata.
    pub fn script_changed(&mut self, script: &Path, meta: &ScriptMeta) {
        self.unregister(script);
        if let Some(shortcut) = meta.shortcut.as_deref() {
            if let Err(e) = self.register(script, shortcut) {
                warn!(script = %script.display(), error = %e, "Shortcut not bound");
            }
        }
    }

    /// Spawn the listener thread mapping hotkey presses to run requests.
    /// The main shortcut forces the main menu open; script shortcuts run
    /// their script without force.
    pub fn start_listener(&self, events: Sender<AppEvent>, main_script: PathBuf) {
        let bindings = Arc::clone(&self.bindings);
        let paused = self.paused.clone();
        thread::spawn(move || {
            let receiver = GlobalHotKeyEvent::receiver();
            while let Ok(event) = receiver.recv() {
                if event.state != HotKeyState::Pressed {
                    continue;
                }
                if paused.is_paused() {
                    debug!(id = event.id, "Hotkey ignored while paused");
                    continue;
                }
                let request = {
                    let bindings = bindings.lock();
                    if bindings.main_id == Some(event.id) {
                        Some(RunRequest::new(
                            main_script.clone(),
                            vec![],
                            Trigger::Shortcut,
                            true,
                        ))
                    } else {
                        bindings.by_id.get(&event.id).map(|script| {
                            RunRequest::new(script.clone(), vec![], Trigger::Shortcut, false)
                        })
                    }
                };
                match request {
                    Some(request) => {
                        if events.send(AppEvent::Run(request)).is_err() {
                            return;
                        }
                    }
                    None => debug!(id = event.id, "Press for unknown hotkey id"),
                }
            }
        });
    }
}

/// Parse a shortcut expression like `cmd shift k` or `ctrl ;`.
pub fn parse_shortcut(shortcut: &str) -> Option<(Modifiers, Code)> {
    let mut mods = Modifiers::empty();
    let mut code = None;

    for token in shortcut.split_whitespace() {
        match token.to_ascii_lowercase().as_str() {
            "cmd" | "meta" | "super" => mods |= Modifiers::META,
            "ctrl" | "control" => mods |= Modifiers::CONTROL,
            "opt" | "alt" | "option" => mods |= Modifiers::ALT,
            "shift" => mods |= Modifiers::SHIFT,
            key => {
                if code.is_some() {
                    return None;
                }
                code = Some(parse_key(key)?);
            }
        }
    }
    Some((mods, code?))
}

fn parse_key(key: &str) -> Option<Code> {
    let code = match key {
        "a" => Code::KeyA,
        "b" => Code::KeyB,
        "c" => Code::KeyC,
        "d" => Code::KeyD,
        "e" => Code::KeyE,
        "f" => Code::KeyF,
        "g" => Code::KeyG,
        "h" => Code::KeyH,
        "i" => Code::KeyI,
        "j" => Code::KeyJ,
        "k" => Code::KeyK,
        "l" => Code::KeyL,
        "m" => Code::KeyM,
        "n" => Code::KeyN,
        "o" => Code::KeyO,
        "p" => Code::KeyP,
        "q" => Code::KeyQ,
        "r" => Code::KeyR,
        "s" => Code::KeyS,
        "t" => Code::KeyT,
        "u" => Code::KeyU,
        "v" => Code::KeyV,
        "w" => Code::KeyW,
        "x" => Code::KeyX,
        "y" => Code::KeyY,
        "z" => Code::KeyZ,
        "0" => Code::Digit0,
        "1" => Code::Digit1,
        "2" => Code::Digit2,
        "3" => Code::Digit3,
        "4" => Code::Digit4,
        "5" => Code::Digit5,
        "6" => Code::Digit6,
        "7" => Code::Digit7,
        "8" => Code::Digit8,
        "9" => Code::Digit9,
        ";" | "semicolon" => Code::Semicolon,
        "," | "comma" => Code::Comma,
        "." | "period" => Code::Period,
        "/" | "slash" => Code::Slash,
        "-" | "minus" => Code::Minus,
        "=" | "equal" => Code::Equal,
        "`" | "backquote" => Code::Backquote,
        "space" => Code::Space,
        "enter" | "return" => Code::Enter,
        "tab" => Code::Tab,
        "escape" | "esc" => Code::Escape,
        "up" => Code::ArrowUp,
        "down" => Code::ArrowDown,
        "left" => Code::ArrowLeft,
        "right" => Code::ArrowRight,
        _ => return None,
    };
    Some(code)
}
