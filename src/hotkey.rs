//! Global hotkey listener.
//!
//! Grounded on `hotkey_listener.py`'s background-thread design, generalized
//! from a single chord to the shell's full set (dashboard toggle, quit,
//! reload-all, and one per-widget toggle chord). The teacher registered
//! `WM_HOTKEY` on its main window and handled it inline in the window
//! procedure; spec.md §4.5 instead requires an independent background
//! thread, since the shell's main loop is the embedded-browser pump, not a
//! native message loop. `RegisterHotKey(None, ...)` binds to the calling
//! thread's message queue, so every chord is registered from inside the
//! listener thread itself.

use log::{info, warn};
use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use windows::Win32::Foundation::{HWND, LPARAM, WPARAM};
use windows::Win32::UI::Input::KeyboardAndMouse::{
    RegisterHotKey, UnregisterHotKey, HOT_KEY_MODIFIERS, MOD_ALT, MOD_CONTROL, MOD_NOREPEAT,
    MOD_SHIFT, MOD_WIN,
};
use windows::Win32::UI::WindowsAndMessaging::{
    DispatchMessageW, PeekMessageW, PostThreadMessageW, TranslateMessage, MSG, PM_REMOVE,
    WM_HOTKEY, WM_QUIT,
};

/// What a registered chord does once triggered. Per-widget toggles carry
/// the widget's manifest-directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HotkeyAction {
    ToggleDashboard,
    Quit,
    ReloadAll,
    ToggleWidget(String),
}

#[derive(Debug, Clone, Copy)]
struct Chord {
    modifiers: u32,
    vk_code: u32,
}

impl Chord {
    /// Parse a chord string like `"ctrl+alt+d"`. Case-insensitive, `+`-joined.
    fn parse(s: &str) -> Option<Chord> {
        let mut modifiers = MOD_NOREPEAT.0;
        let mut vk_code = 0u32;

        for part in s.split('+').map(|p| p.trim().to_lowercase()) {
            match part.as_str() {
                "ctrl" | "control" => modifiers |= MOD_CONTROL.0,
                "alt" => modifiers |= MOD_ALT.0,
                "shift" => modifiers |= MOD_SHIFT.0,
                "win" | "super" | "windows" => modifiers |= MOD_WIN.0,
                other => vk_code = Self::parse_key(other)?,
            }
        }

        if vk_code == 0 {
            return None;
        }
        Some(Chord { modifiers, vk_code })
    }

    fn parse_key(s: &str) -> Option<u32> {
        if s.len() == 1 {
            let c = s.chars().next()?;
            if c.is_ascii_alphanumeric() {
                return Some(c.to_ascii_uppercase() as u32);
            }
        }
        match s {
            "space" => Some(0x20),
            "tab" => Some(0x09),
            "escape" | "esc" => Some(0x1B),
            "f1" => Some(0x70),
            "f2" => Some(0x71),
            "f3" => Some(0x72),
            "f4" => Some(0x73),
            "f5" => Some(0x74),
            "f6" => Some(0x75),
            "f7" => Some(0x76),
            "f8" => Some(0x77),
            "f9" => Some(0x78),
            "f10" => Some(0x79),
            "f11" => Some(0x7A),
            "f12" => Some(0x7B),
            _ => None,
        }
    }
}

/// Runs the background hotkey thread and exposes a non-blocking queue of
/// triggered actions to the main loop.
pub struct HotkeyListener {
    thread: Option<JoinHandle<()>>,
    thread_id: Arc<parking_lot::Mutex<Option<u32>>>,
    receiver: Receiver<HotkeyAction>,
    requested: Vec<(String, HotkeyAction)>,
    started: bool,
}

impl HotkeyListener {
    pub fn new() -> (Self, Sender<HotkeyAction>) {
        let (sender, receiver) = channel();
        (
            Self {
                thread: None,
                thread_id: Arc::new(parking_lot::Mutex::new(None)),
                receiver,
                requested: Vec::new(),
                started: false,
            },
            sender,
        )
    }

    /// Queue a chord for registration. Invalid chord strings are logged and
    /// skipped (spec.md §7: hotkey registration failure never aborts startup).
    /// Per spec.md §3's invariant, a call after `start` is rejected outright.
    pub fn add(&mut self, chord: &str, action: HotkeyAction) {
        if self.started {
            warn!("hotkey: register('{}') called after start, rejected", chord);
            return;
        }
        if Chord::parse(chord).is_none() {
            warn!("hotkey: invalid chord '{}', skipping", chord);
            return;
        }
        self.requested.push((chord.to_string(), action));
    }

    /// Start the background thread, registering every chord queued via `add`.
    pub fn start(&mut self, sender: Sender<HotkeyAction>) {
        if self.started {
            return;
        }
        self.started = true;
        let chords = self.requested.clone();
        let thread_id_slot = self.thread_id.clone();

        let handle = std::thread::Builder::new()
            .name("hotkey-listener".to_string())
            .spawn(move || run_listener_thread(chords, sender, thread_id_slot))
            .expect("failed to spawn hotkey-listener thread");

        self.thread = Some(handle);
    }

    /// Stop the background thread by posting `WM_QUIT` to its message queue.
    pub fn stop(&mut self) {
        if let Some(id) = *self.thread_id.lock() {
            unsafe {
                let _ = PostThreadMessageW(id, WM_QUIT, WPARAM(0), LPARAM(0));
            }
        }
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }

    /// Drain all actions triggered since the last poll. Called once per
    /// main-loop tick.
    pub fn poll_triggered(&self) -> Vec<HotkeyAction> {
        self.receiver.try_iter().collect()
    }
}

impl Drop for HotkeyListener {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_listener_thread(
    chords: Vec<(String, HotkeyAction)>,
    sender: Sender<HotkeyAction>,
    thread_id_slot: Arc<parking_lot::Mutex<Option<u32>>>,
) {
    let thread_id = unsafe { windows::Win32::System::Threading::GetCurrentThreadId() };
    *thread_id_slot.lock() = Some(thread_id);

    let mut by_id: HashMap<i32, HotkeyAction> = HashMap::new();
    let mut next_id = 1i32;

    for (chord_str, action) in chords {
        let Some(chord) = Chord::parse(&chord_str) else {
            continue;
        };
        let id = next_id;
        next_id += 1;
        let registered = unsafe {
            RegisterHotKey(
                HWND(0),
                id,
                HOT_KEY_MODIFIERS(chord.modifiers),
                chord.vk_code,
            )
        };
        match registered {
            Ok(()) => {
                info!("registered hotkey '{}' -> {:?}", chord_str, action);
                by_id.insert(id, action);
            }
            Err(e) => warn!("failed to register hotkey '{}': {}", chord_str, e),
        }
    }

    let mut msg = MSG::default();
    loop {
        let has_msg = unsafe { PeekMessageW(&mut msg, HWND(0), 0, 0, PM_REMOVE) };
        if has_msg.as_bool() {
            if msg.message == WM_QUIT {
                break;
            }
            if msg.message == WM_HOTKEY {
                let id = msg.wParam.0 as i32;
                if let Some(action) = by_id.get(&id) {
                    let _ = sender.send(action.clone());
                }
            }
            unsafe {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        } else {
            std::thread::sleep(std::time::Duration::from_millis(50));
        }
    }

    for id in by_id.keys() {
        unsafe {
            let _ = UnregisterHotKey(HWND(0), *id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_chord() {
        let c = Chord::parse("ctrl+alt+d").unwrap();
        assert_eq!(c.vk_code, 'D' as u32);
        assert_eq!(c.modifiers & MOD_CONTROL.0, MOD_CONTROL.0);
        assert_eq!(c.modifiers & MOD_ALT.0, MOD_ALT.0);
    }

    #[test]
    fn parses_function_key() {
        let c = Chord::parse("ctrl+f5").unwrap();
        assert_eq!(c.vk_code, 0x74);
    }

    #[test]
    fn rejects_chord_with_no_key() {
        assert!(Chord::parse("ctrl+alt").is_none());
    }

    #[test]
    fn rejects_unknown_component() {
        assert!(Chord::parse("ctrl+bogus").is_none());
    }

    #[test]
    fn chord_always_includes_norepeat() {
        let c = Chord::parse("alt+q").unwrap();
        assert_eq!(c.modifiers & MOD_NOREPEAT.0, MOD_NOREPEAT.0);
    }

    #[test]
    fn registration_after_start_is_rejected() {
        let (mut listener, sender) = HotkeyListener::new();
        listener.add("ctrl+alt+d", HotkeyAction::ToggleDashboard);
        listener.start(sender);
        assert_eq!(listener.requested.len(), 1);

        listener.add("ctrl+alt+q", HotkeyAction::Quit);
        assert_eq!(listener.requested.len(), 1, "register after start must be a no-op");

        listener.stop();
    }
}
