//! Optional system tray icon and right-click menu.
//!
//! Grounded on the teacher's `tray.rs` (`Shell_NotifyIconW`/`TrackPopupMenu`
//! via raw `windows` calls, no external tray crate) but restructured per
//! spec.md §4.9/§5: the teacher's tray lived on the app's single window
//! thread, while here the tray owns its own background thread with its own
//! hidden message-only window and message pump, posting actions onto a
//! thread-safe queue the shell drains once per tick — the same shape as
//! [`crate::hotkey::HotkeyListener`].

use log::{info, warn};
use parking_lot::Mutex;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use windows::core::PCWSTR;
use windows::Win32::Foundation::{HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::Shell::{
    Shell_NotifyIconW, NIF_ICON, NIF_MESSAGE, NIF_TIP, NIM_ADD, NIM_DELETE, NOTIFYICONDATAW,
};
use windows::Win32::UI::WindowsAndMessaging::{
    CreatePopupMenu, CreateWindowExW, DefWindowProcW, DestroyMenu, DestroyWindow,
    DispatchMessageW, GetCursorPos, InsertMenuW, LoadIconW, PeekMessageW,
    PostQuitMessage, PostThreadMessageW, RegisterClassExW, SetForegroundWindow, TrackPopupMenu,
    TranslateMessage, CW_USEDEFAULT, HICON, HMENU, IDI_APPLICATION, MF_CHECKED, MF_GRAYED,
    MF_SEPARATOR, MF_STRING, MSG, PM_REMOVE, TPM_RETURNCMD, TPM_RIGHTBUTTON, WM_DESTROY,
    WM_LBUTTONUP, WM_QUIT, WM_RBUTTONUP, WM_USER, WNDCLASSEXW, WS_EX_LEFT, WS_OVERLAPPED,
};
use windows::Win32::Foundation::POINT;

use crate::hotkey::HotkeyAction;

const WINDOW_CLASS: &str = "PytoniumShellTrayWindow";
const TRAY_ICON_ID: u32 = 1;
const WM_TRAY_CALLBACK: u32 = WM_USER + 1;

const ID_TOGGLE_DASHBOARD: u32 = 1;
const ID_RELOAD_ALL: u32 = 2;
const ID_QUIT: u32 = 3;
const ID_WIDGET_BASE: u32 = 1000;

/// One widget's entry in the tray menu, refreshed by the shell every tick
/// so the menu reflects current visibility without the tray thread ever
/// locking the widget manager itself.
#[derive(Debug, Clone)]
pub struct TrayWidgetEntry {
    pub name: String,
    pub mode: String,
    pub visible: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TraySnapshot {
    pub widgets: Vec<TrayWidgetEntry>,
    pub has_dashboards: bool,
}

/// Snapshot shared between the main thread (writer) and the tray thread
/// (reader, only while building a menu on right-click). Per spec.md §9's
/// named race: the writer replaces the whole `Vec` atomically under the
/// lock, so the tray thread never observes a torn read even if the widget
/// list shrinks between ticks.
pub type SharedTraySnapshot = Arc<Mutex<TraySnapshot>>;

pub fn new_shared_snapshot() -> SharedTraySnapshot {
    Arc::new(Mutex::new(TraySnapshot::default()))
}

/// Runs the tray icon on a background thread. If tray creation fails
/// (e.g. `Shell_NotifyIconW` rejected), the shell is told to skip the
/// tray entirely (spec.md §4.9, §7).
pub struct SystemTray {
    thread: Option<JoinHandle<()>>,
    thread_id: Arc<Mutex<Option<u32>>>,
}

impl SystemTray {
    /// Spawn the tray thread. Returns `None` (logged) if the platform tray
    /// is unavailable; the shell runs without one in that case.
    pub fn start(snapshot: SharedTraySnapshot) -> Option<(Self, Receiver<HotkeyAction>)> {
        let (sender, receiver) = channel();
        let thread_id_slot = Arc::new(Mutex::new(None));
        let thread_id_for_thread = thread_id_slot.clone();

        let handle = std::thread::Builder::new()
            .name("system-tray".to_string())
            .spawn(move || run_tray_thread(snapshot, sender, thread_id_for_thread))
            .ok()?;

        Some((
            Self {
                thread: Some(handle),
                thread_id: thread_id_slot,
            },
            receiver,
        ))
    }

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
}

impl Drop for SystemTray {
    fn drop(&mut self) {
        self.stop();
    }
}

thread_local! {
    static TRAY_STATE: std::cell::RefCell<Option<ThreadState>> = const { std::cell::RefCell::new(None) };
}

struct ThreadState {
    snapshot: SharedTraySnapshot,
    sender: Sender<HotkeyAction>,
    hwnd: HWND,
}

fn run_tray_thread(
    snapshot: SharedTraySnapshot,
    sender: Sender<HotkeyAction>,
    thread_id_slot: Arc<Mutex<Option<u32>>>,
) {
    let thread_id = unsafe { windows::Win32::System::Threading::GetCurrentThreadId() };
    *thread_id_slot.lock() = Some(thread_id);

    let hwnd = match create_message_window() {
        Ok(hwnd) => hwnd,
        Err(e) => {
            warn!("tray: failed to create message window: {}", e);
            return;
        }
    };

    if !add_icon(hwnd) {
        warn!("tray: Shell_NotifyIconW(NIM_ADD) failed, tray disabled");
        unsafe {
            let _ = DestroyWindow(hwnd);
        }
        return;
    }
    info!("tray icon started");

    TRAY_STATE.with(|s| {
        *s.borrow_mut() = Some(ThreadState { snapshot, sender, hwnd });
    });

    let mut msg = MSG::default();
    loop {
        let has_msg = unsafe { PeekMessageW(&mut msg, HWND(0), 0, 0, PM_REMOVE) };
        if has_msg.as_bool() {
            if msg.message == WM_QUIT {
                break;
            }
            unsafe {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        } else {
            std::thread::sleep(std::time::Duration::from_millis(50));
        }
    }

    remove_icon(hwnd);
    unsafe {
        let _ = DestroyWindow(hwnd);
    }
}

fn create_message_window() -> windows::core::Result<HWND> {
    unsafe {
        let hinstance = GetModuleHandleW(None)?;
        let class_name = crate::utils::to_wide_string(WINDOW_CLASS);

        let wc = WNDCLASSEXW {
            cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
            lpfnWndProc: Some(tray_wndproc),
            hInstance: hinstance.into(),
            lpszClassName: crate::utils::to_pcwstr(&class_name),
            ..Default::default()
        };
        RegisterClassExW(&wc);

        CreateWindowExW(
            WS_EX_LEFT,
            crate::utils::to_pcwstr(&class_name),
            PCWSTR::null(),
            WS_OVERLAPPED,
            CW_USEDEFAULT,
            CW_USEDEFAULT,
            CW_USEDEFAULT,
            CW_USEDEFAULT,
            None,
            None,
            hinstance,
            None,
        )
    }
}

fn add_icon(hwnd: HWND) -> bool {
    unsafe {
        let icon = LoadIconW(None, IDI_APPLICATION).unwrap_or(HICON::default());
        let tooltip = crate::utils::to_wide_string("PytoniumShell");
        let mut nid = NOTIFYICONDATAW {
            cbSize: std::mem::size_of::<NOTIFYICONDATAW>() as u32,
            hWnd: hwnd,
            uID: TRAY_ICON_ID,
            uFlags: NIF_ICON | NIF_MESSAGE | NIF_TIP,
            uCallbackMessage: WM_TRAY_CALLBACK,
            hIcon: icon,
            ..Default::default()
        };
        let len = tooltip.len().min(128);
        nid.szTip[..len].copy_from_slice(&tooltip[..len]);
        Shell_NotifyIconW(NIM_ADD, &nid).as_bool()
    }
}

fn remove_icon(hwnd: HWND) {
    let nid = NOTIFYICONDATAW {
        cbSize: std::mem::size_of::<NOTIFYICONDATAW>() as u32,
        hWnd: hwnd,
        uID: TRAY_ICON_ID,
        ..Default::default()
    };
    unsafe {
        let _ = Shell_NotifyIconW(NIM_DELETE, &nid);
    }
}

/// Build the popup menu from a cloned snapshot (no lock held across
/// `TrackPopupMenu`), show it at the cursor, and translate the chosen
/// command id back into a [`HotkeyAction`].
fn show_menu(state: &ThreadState) {
    let snapshot = state.snapshot.lock().clone();

    let menu = match unsafe { CreatePopupMenu() } {
        Ok(m) => m,
        Err(e) => {
            warn!("tray: CreatePopupMenu failed: {}", e);
            return;
        }
    };

    for (i, entry) in snapshot.widgets.iter().enumerate() {
        let id = ID_WIDGET_BASE + i as u32;
        let label = format!("{} [{}]", entry.name, entry.mode);
        insert_item(menu, id, &label, entry.visible, false);
    }

    if snapshot.has_dashboards {
        insert_item(menu, ID_TOGGLE_DASHBOARD, "Toggle Dashboard", false, false);
    }
    insert_separator(menu);
    insert_item(menu, ID_RELOAD_ALL, "Reload All", false, false);
    insert_item(menu, ID_QUIT, "Quit", false, false);

    let mut pt = POINT::default();
    unsafe {
        let _ = GetCursorPos(&mut pt);
        let _ = SetForegroundWindow(state.hwnd);
        let cmd = TrackPopupMenu(
            menu,
            TPM_RIGHTBUTTON | TPM_RETURNCMD,
            pt.x,
            pt.y,
            0,
            state.hwnd,
            None,
        );
        let _ = DestroyMenu(menu);

        if !cmd.as_bool() {
            return;
        }
        let id = cmd.0 as u32;
        let action = match id {
            ID_TOGGLE_DASHBOARD => Some(HotkeyAction::ToggleDashboard),
            ID_RELOAD_ALL => Some(HotkeyAction::ReloadAll),
            ID_QUIT => Some(HotkeyAction::Quit),
            id if id >= ID_WIDGET_BASE => {
                let index = (id - ID_WIDGET_BASE) as usize;
                snapshot
                    .widgets
                    .get(index)
                    .map(|e| HotkeyAction::ToggleWidget(e.name.clone()))
            }
            _ => None,
        };
        if let Some(action) = action {
            let _ = state.sender.send(action);
        }
    }
}

fn insert_item(menu: HMENU, id: u32, label: &str, checked: bool, disabled: bool) {
    let mut flags = MF_STRING;
    if checked {
        flags |= MF_CHECKED;
    }
    if disabled {
        flags |= MF_GRAYED;
    }
    let wide = crate::utils::to_wide_string(label);
    unsafe {
        let _ = InsertMenuW(menu, u32::MAX, flags, id as usize, crate::utils::to_pcwstr(&wide));
    }
}

fn insert_separator(menu: HMENU) {
    unsafe {
        let _ = InsertMenuW(menu, u32::MAX, MF_SEPARATOR, 0, PCWSTR::null());
    }
}

unsafe extern "system" fn tray_wndproc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    if msg == WM_TRAY_CALLBACK {
        let event = (lparam.0 & 0xFFFF) as u32;
        if event == WM_RBUTTONUP || event == WM_LBUTTONUP {
            TRAY_STATE.with(|s| {
                if let Some(state) = s.borrow().as_ref() {
                    show_menu(state);
                }
            });
        }
        return LRESULT(0);
    }
    if msg == WM_DESTROY {
        PostQuitMessage(0);
        return LRESULT(0);
    }
    DefWindowProcW(hwnd, msg, wparam, lparam)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_defaults_empty() {
        let shared = new_shared_snapshot();
        let snap = shared.lock().clone();
        assert!(snap.widgets.is_empty());
        assert!(!snap.has_dashboards);
    }

    #[test]
    fn snapshot_replace_is_atomic_swap() {
        let shared = new_shared_snapshot();
        *shared.lock() = TraySnapshot {
            widgets: vec![TrayWidgetEntry { name: "clock".into(), mode: "widget".into(), visible: true }],
            has_dashboards: true,
        };
        let snap = shared.lock().clone();
        assert_eq!(snap.widgets.len(), 1);
        assert!(snap.has_dashboards);
    }
}
