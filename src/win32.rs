//! Stateless Win32 window manipulation helpers.
//!
//! The entry points mirror `win32_window_helper.py` one-to-one (always-on-top,
//! click-through, taskbar visibility, AppBar docking, wallpaper reparenting);
//! the `windows` crate call patterns (`SetWindowPos`, `SHAppBarMessage`,
//! `DwmSetWindowAttribute`) are grounded on the teacher's `window/manager.rs`.
//! Every function here is a thin, free function taking an `HWND` — there is
//! no long-lived window-manager object, since in this shell each widget owns
//! its own `HWND` via `browser::BrowserInstance`.

use crate::error::{ShellError, ShellResult};
use crate::manifest::Anchor;
use log::{debug, warn};
use windows::core::PCWSTR;
use windows::Win32::Foundation::{HWND, LPARAM, RECT, WPARAM};
use windows::Win32::Graphics::Dwm::{
    DwmSetWindowAttribute, DWMWA_USE_IMMERSIVE_DARK_MODE, DWMWA_WINDOW_CORNER_PREFERENCE,
    DWMWCP_ROUND,
};
use windows::Win32::Graphics::Gdi::{
    GetMonitorInfoW, MonitorFromWindow, HMONITOR, MONITORINFOEXW, MONITOR_DEFAULTTONEAREST,
};
use windows::Win32::UI::HiDpi::{
    SetProcessDpiAwarenessContext, DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2,
};
use windows::Win32::UI::Shell::{
    SHAppBarMessage, ABE_BOTTOM, ABE_LEFT, ABE_RIGHT, ABE_TOP, ABM_NEW, ABM_QUERYPOS, ABM_REMOVE,
    ABM_SETPOS, APPBARDATA,
};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumDisplayMonitors, EnumWindows, FindWindowExW, GetParent, GetWindowLongPtrW, IsWindow,
    SendMessageTimeoutW, SetParent, SetWindowLongPtrW, SetWindowPos, ShowWindow, GWL_EXSTYLE,
    HWND_TOPMOST, SMTO_NORMAL, SWP_NOACTIVATE, SWP_NOMOVE, SWP_NOSIZE,
    SWP_NOZORDER, SW_HIDE, SW_SHOW, WS_EX_APPWINDOW, WS_EX_LAYERED, WS_EX_TOOLWINDOW,
    WS_EX_TRANSPARENT,
};

/// Called once at startup, before any window is created — per-monitor DPI
/// awareness so `windows::Win32::UI::HiDpi::GetDpiForWindow` reports real
/// values instead of the virtualized 96.
pub fn enable_dpi_awareness() {
    unsafe {
        let _ = SetProcessDpiAwarenessContext(DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2);
    }
}

pub fn make_always_on_top(hwnd: HWND) {
    unsafe {
        let _ = SetWindowPos(
            hwnd,
            HWND_TOPMOST,
            0,
            0,
            0,
            0,
            SWP_NOMOVE | SWP_NOSIZE | SWP_NOACTIVATE,
        );
    }
}

pub fn hide_from_taskbar(hwnd: HWND) {
    unsafe {
        let mut ex_style = GetWindowLongPtrW(hwnd, GWL_EXSTYLE);
        ex_style |= WS_EX_TOOLWINDOW.0 as isize;
        ex_style &= !(WS_EX_APPWINDOW.0 as isize);
        SetWindowLongPtrW(hwnd, GWL_EXSTYLE, ex_style);
    }
}

pub fn make_click_through(hwnd: HWND) {
    unsafe {
        let mut ex_style = GetWindowLongPtrW(hwnd, GWL_EXSTYLE);
        ex_style |= (WS_EX_TRANSPARENT.0 | WS_EX_LAYERED.0) as isize;
        SetWindowLongPtrW(hwnd, GWL_EXSTYLE, ex_style);
    }
}

pub fn set_position(hwnd: HWND, x: i32, y: i32, width: i32, height: i32) {
    unsafe {
        let _ = SetWindowPos(
            hwnd,
            HWND(0),
            x,
            y,
            width,
            height,
            SWP_NOZORDER | SWP_NOACTIVATE,
        );
    }
}

pub fn show_window(hwnd: HWND) {
    unsafe {
        let _ = ShowWindow(hwnd, SW_SHOW);
    }
}

pub fn hide_window(hwnd: HWND) {
    unsafe {
        let _ = ShowWindow(hwnd, SW_HIDE);
    }
}

/// Rounded corners + immersive dark title bar. Called once per host window
/// right after creation; a no-op on Windows versions that don't support it.
pub fn apply_windows11_chrome(hwnd: HWND) {
    unsafe {
        let dark: i32 = 1;
        let _ = DwmSetWindowAttribute(
            hwnd,
            DWMWA_USE_IMMERSIVE_DARK_MODE,
            &dark as *const _ as *const _,
            std::mem::size_of::<i32>() as u32,
        );
        let corner = DWMWCP_ROUND;
        let _ = DwmSetWindowAttribute(
            hwnd,
            DWMWA_WINDOW_CORNER_PREFERENCE,
            &corner as *const _ as *const _,
            std::mem::size_of_val(&corner) as u32,
        );
    }
}

/// One display monitor, primary-first-then-by-position ordered by
/// [`enumerate_monitors`].
#[derive(Debug, Clone, Copy)]
pub struct MonitorInfo {
    pub index: usize,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub work_x: i32,
    pub work_y: i32,
    pub work_width: i32,
    pub work_height: i32,
    pub is_primary: bool,
}

unsafe extern "system" fn enum_monitor_proc(
    hmonitor: HMONITOR,
    _hdc: windows::Win32::Graphics::Gdi::HDC,
    _rect: *mut RECT,
    lparam: LPARAM,
) -> windows::Win32::Foundation::BOOL {
    let handles = &mut *(lparam.0 as *mut Vec<HMONITOR>);
    handles.push(hmonitor);
    windows::Win32::Foundation::BOOL(1)
}

fn monitor_info_for(hmonitor: HMONITOR) -> Option<MonitorInfo> {
    let mut info = MONITORINFOEXW::default();
    info.monitorInfo.cbSize = std::mem::size_of::<MONITORINFOEXW>() as u32;
    let ok = unsafe { GetMonitorInfoW(hmonitor, &mut info.monitorInfo) };
    if !ok.as_bool() {
        return None;
    }
    let rc = info.monitorInfo.rcMonitor;
    let wk = info.monitorInfo.rcWork;
    Some(MonitorInfo {
        index: 0,
        x: rc.left,
        y: rc.top,
        width: rc.right - rc.left,
        height: rc.bottom - rc.top,
        work_x: wk.left,
        work_y: wk.top,
        work_width: wk.right - wk.left,
        work_height: wk.bottom - wk.top,
        is_primary: info.monitorInfo.dwFlags
            & windows::Win32::Graphics::Gdi::MONITORINFOF_PRIMARY
            != 0,
    })
}

/// Enumerate all monitors, primary first, then sorted by (x, y).
pub fn enumerate_monitors() -> Vec<MonitorInfo> {
    let mut handles: Vec<HMONITOR> = Vec::new();
    unsafe {
        let _ = EnumDisplayMonitors(
            None,
            None,
            Some(enum_monitor_proc),
            LPARAM(&mut handles as *mut _ as isize),
        );
    }

    let mut monitors: Vec<MonitorInfo> = handles.into_iter().filter_map(monitor_info_for).collect();
    monitors.sort_by_key(|m| (!m.is_primary, m.x, m.y));
    for (i, m) in monitors.iter_mut().enumerate() {
        m.index = i;
    }
    monitors
}

pub fn primary_monitor() -> Option<MonitorInfo> {
    enumerate_monitors().into_iter().find(|m| m.is_primary)
}

/// Resolve a manifest `monitor` field to a concrete monitor, falling back
/// to the primary monitor for an out-of-range index (spec.md §7).
pub fn resolve_monitor(monitors: &[MonitorInfo], spec: &crate::manifest::MonitorSpec) -> Option<MonitorInfo> {
    match spec {
        crate::manifest::MonitorSpec::Primary(_) => monitors.iter().find(|m| m.is_primary).copied(),
        crate::manifest::MonitorSpec::Index(i) => monitors
            .get(*i as usize)
            .copied()
            .or_else(|| monitors.iter().find(|m| m.is_primary).copied()),
    }
    .or_else(|| monitors.first().copied())
}

/// Opaque handle returned by [`register_appbar`]; pass back to
/// [`unregister_appbar`] to release the reservation.
pub struct AppBarHandle {
    hwnd: HWND,
}

/// Register `hwnd` as a docked AppBar along `anchor`, reserving `size`
/// pixels (height for top/bottom, width for left/right) on `monitor`.
/// Moves the window into its final position as a side effect.
pub fn register_appbar(hwnd: HWND, anchor: Anchor, size: i32, monitor: MonitorInfo) -> ShellResult<AppBarHandle> {
    let edge = match anchor {
        Anchor::Top => ABE_TOP,
        Anchor::Bottom => ABE_BOTTOM,
        Anchor::Left => ABE_LEFT,
        Anchor::Right => ABE_RIGHT,
    };

    let mut abd = APPBARDATA {
        cbSize: std::mem::size_of::<APPBARDATA>() as u32,
        hWnd: hwnd,
        uCallbackMessage: 0,
        uEdge: edge.0 as u32,
        rc: RECT::default(),
        lParam: LPARAM(0),
    };

    unsafe {
        if SHAppBarMessage(ABM_NEW, &mut abd) == 0 {
            return Err(ShellError::WindowsApi(windows::core::Error::from_win32()));
        }
    }

    abd.rc = match anchor {
        Anchor::Top => RECT {
            left: monitor.x,
            top: monitor.y,
            right: monitor.x + monitor.width,
            bottom: monitor.y + size,
        },
        Anchor::Bottom => RECT {
            left: monitor.x,
            top: monitor.y + monitor.height - size,
            right: monitor.x + monitor.width,
            bottom: monitor.y + monitor.height,
        },
        Anchor::Left => RECT {
            left: monitor.x,
            top: monitor.y,
            right: monitor.x + size,
            bottom: monitor.y + monitor.height,
        },
        Anchor::Right => RECT {
            left: monitor.x + monitor.width - size,
            top: monitor.y,
            right: monitor.x + monitor.width,
            bottom: monitor.y + monitor.height,
        },
    };

    unsafe {
        SHAppBarMessage(ABM_QUERYPOS, &mut abd);
    }

    match anchor {
        Anchor::Top => abd.rc.bottom = abd.rc.top + size,
        Anchor::Bottom => abd.rc.top = abd.rc.bottom - size,
        Anchor::Left => abd.rc.right = abd.rc.left + size,
        Anchor::Right => abd.rc.left = abd.rc.right - size,
    }

    unsafe {
        SHAppBarMessage(ABM_SETPOS, &mut abd);
        let _ = SetWindowPos(
            hwnd,
            HWND_TOPMOST,
            abd.rc.left,
            abd.rc.top,
            abd.rc.right - abd.rc.left,
            abd.rc.bottom - abd.rc.top,
            SWP_NOACTIVATE,
        );
    }

    Ok(AppBarHandle { hwnd })
}

pub fn unregister_appbar(handle: AppBarHandle) {
    let mut abd = APPBARDATA {
        cbSize: std::mem::size_of::<APPBARDATA>() as u32,
        hWnd: handle.hwnd,
        uCallbackMessage: 0,
        uEdge: 0,
        rc: RECT::default(),
        lParam: LPARAM(0),
    };
    unsafe {
        SHAppBarMessage(ABM_REMOVE, &mut abd);
    }
}

// -- Wallpaper mode (WorkerW / Progman) --------------------------------

struct EnumState {
    target: HWND,
}

unsafe extern "system" fn enum_worker_proc(hwnd: HWND, lparam: LPARAM) -> windows::Win32::Foundation::BOOL {
    let state = &mut *(lparam.0 as *mut EnumState);
    let shell_view = FindWindowExW(hwnd, HWND(0), windows::core::w!("SHELLDLL_DefView"), PCWSTR::null());
    if shell_view.is_ok() && !shell_view.unwrap_or(HWND(0)).0.is_null() {
        if let Ok(worker) = FindWindowExW(HWND(0), hwnd, windows::core::w!("WorkerW"), PCWSTR::null()) {
            if !worker.0.is_null() {
                state.target = worker;
            }
        }
    }
    windows::Win32::Foundation::BOOL(1)
}

/// Find (spawning if necessary) the WorkerW window that sits behind the
/// desktop icons, per `win32_window_helper.py`'s `find_wallpaper_worker_w`.
fn find_wallpaper_worker_w() -> Option<HWND> {
    let progman = unsafe { windows::Win32::UI::WindowsAndMessaging::FindWindowW(windows::core::w!("Progman"), PCWSTR::null()) }.ok()?;
    if progman.0.is_null() {
        return None;
    }

    let mut result: usize = 0;
    unsafe {
        let _ = SendMessageTimeoutW(
            progman,
            0x052C,
            WPARAM(0),
            LPARAM(0),
            SMTO_NORMAL,
            1000,
            Some(&mut result as *mut usize as *mut usize),
        );
    }

    let mut state = EnumState { target: HWND(0) };
    unsafe {
        let _ = EnumWindows(Some(enum_worker_proc), LPARAM(&mut state as *mut _ as isize));
    }

    if state.target.0.is_null() {
        None
    } else {
        Some(state.target)
    }
}

/// Reparent `hwnd` behind the desktop icons and size it to cover `monitor`.
pub fn make_wallpaper(hwnd: HWND, monitor: MonitorInfo) -> bool {
    let Some(worker_w) = find_wallpaper_worker_w() else {
        warn!("wallpaper: could not locate WorkerW");
        return false;
    };
    unsafe {
        let _ = SetParent(hwnd, worker_w);
    }
    set_position(hwnd, monitor.x, monitor.y, monitor.width, monitor.height);
    debug!("wallpaper: reparented to WorkerW {:?}", worker_w);
    true
}

pub fn restore_from_wallpaper(hwnd: HWND) {
    unsafe {
        let _ = SetParent(hwnd, HWND(0));
    }
}

/// True if the widget's wallpaper parent is still a live window. Used by
/// the widget manager's periodic wallpaper health check (spec.md §4.8):
/// Explorer restarts destroy and recreate WorkerW, orphaning any window
/// still parented to the old one.
pub fn is_wallpaper_parent_valid(hwnd: HWND) -> bool {
    unsafe {
        let parent = GetParent(hwnd);
        match parent {
            Ok(parent) if !parent.0.is_null() => IsWindow(parent).as_bool(),
            _ => false,
        }
    }
}

/// The monitor a given window currently lives on, falling back to primary.
pub fn monitor_for_window(hwnd: HWND) -> Option<MonitorInfo> {
    let hmonitor = unsafe { MonitorFromWindow(hwnd, MONITOR_DEFAULTTONEAREST) };
    if hmonitor.0.is_null() {
        return primary_monitor();
    }
    monitor_info_for(hmonitor).or_else(primary_monitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::MonitorSpec;

    fn fake_monitors() -> Vec<MonitorInfo> {
        vec![
            MonitorInfo {
                index: 0,
                x: 0,
                y: 0,
                width: 1920,
                height: 1080,
                work_x: 0,
                work_y: 0,
                work_width: 1920,
                work_height: 1040,
                is_primary: true,
            },
            MonitorInfo {
                index: 1,
                x: 1920,
                y: 0,
                width: 1280,
                height: 1024,
                work_x: 1920,
                work_y: 0,
                work_width: 1280,
                work_height: 1024,
                is_primary: false,
            },
        ]
    }

    #[test]
    fn resolve_monitor_primary() {
        let monitors = fake_monitors();
        let resolved = resolve_monitor(&monitors, &MonitorSpec::Primary("primary".into())).unwrap();
        assert!(resolved.is_primary);
    }

    #[test]
    fn resolve_monitor_by_index() {
        let monitors = fake_monitors();
        let resolved = resolve_monitor(&monitors, &MonitorSpec::Index(1)).unwrap();
        assert_eq!(resolved.index, 1);
    }

    #[test]
    fn resolve_monitor_out_of_range_falls_back_to_primary() {
        let monitors = fake_monitors();
        let resolved = resolve_monitor(&monitors, &MonitorSpec::Index(99)).unwrap();
        assert!(resolved.is_primary);
    }
}
