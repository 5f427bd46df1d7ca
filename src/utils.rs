//! Small shared helpers used across the shell kernel.

#![allow(dead_code)]

use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;
use windows::core::PCWSTR;

/// Convert a Rust string to a null-terminated wide string for Windows API calls.
pub fn to_wide_string(s: &str) -> Vec<u16> {
    OsStr::new(s)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

/// Create a PCWSTR from a wide string slice. The slice must outlive the PCWSTR.
pub fn to_pcwstr(s: &[u16]) -> PCWSTR {
    PCWSTR::from_raw(s.as_ptr())
}

/// Format a byte count for log lines (position store, state payload sizes).
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Axis-aligned pixel rectangle in screen coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }
}

/// Screen/monitor pixel dimensions.
#[derive(Debug, Clone, Copy, Default)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

/// Calculate the DPI scaling factor relative to the 96-DPI baseline.
pub fn get_dpi_scale(dpi: u32) -> f32 {
    dpi as f32 / 96.0
}

/// Scale a logical-pixel value by a window's DPI.
pub fn scale_by_dpi(value: i32, dpi: u32) -> i32 {
    ((value as f32) * get_dpi_scale(dpi)) as i32
}

/// Primary-monitor screen size via `GetSystemMetrics`, used only as a
/// fallback when monitor enumeration (see `win32::enumerate_monitors`)
/// returns nothing.
pub fn get_screen_size() -> Size {
    use windows::Win32::UI::WindowsAndMessaging::{GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN};

    unsafe {
        Size {
            width: GetSystemMetrics(SM_CXSCREEN),
            height: GetSystemMetrics(SM_CYSCREEN),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dpi_scale_at_96_is_one() {
        assert_eq!(get_dpi_scale(96), 1.0);
        assert_eq!(scale_by_dpi(200, 96), 200);
    }

    #[test]
    fn dpi_scale_at_144_is_one_point_five() {
        assert_eq!(get_dpi_scale(144), 1.5);
        assert_eq!(scale_by_dpi(200, 144), 300);
    }

    #[test]
    fn rect_edges() {
        let r = Rect::new(10, 20, 100, 50);
        assert_eq!(r.right(), 110);
        assert_eq!(r.bottom(), 70);
    }

    #[test]
    fn format_bytes_thresholds() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
    }
}
