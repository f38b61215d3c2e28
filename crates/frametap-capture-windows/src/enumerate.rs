use std::ffi::c_void;
use std::mem::size_of;

use frametap_core::{Monitor, Window};
use tracing::debug;
use windows::core::{w, PCWSTR};
use windows::Win32::Foundation::{BOOL, HWND, LPARAM};
use windows::Win32::Graphics::Dwm::{DwmGetWindowAttribute, DWMWA_CLOAKED};
use windows::Win32::Graphics::Gdi::{CreateDCW, DeleteDC, GetDeviceCaps, HORZRES};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetWindowLongW, GetWindowTextLengthW, GetWindowTextW, IsWindowVisible, GWL_EXSTYLE,
    WS_EX_TOOLWINDOW,
};

use super::dxgi::{self, desktop_size};
use super::gdi::window_bounds;

fn wide_to_string(wide: &[u16]) -> String {
    let end = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
    String::from_utf16_lossy(&wide[..end])
}

/// Ratio of desktop-coordinate width to the device's `HORZRES`.
pub(crate) fn dpi_scale(desktop_width: i32, horzres: i32) -> f32 {
    if horzres > 0 && desktop_width > 0 {
        desktop_width as f32 / horzres as f32
    } else {
        1.0
    }
}

fn horzres(device: &[u16]) -> i32 {
    let dc = unsafe { CreateDCW(w!("DISPLAY"), PCWSTR(device.as_ptr()), PCWSTR::null(), None) };
    if dc.is_invalid() {
        return 0;
    }
    let res = unsafe { GetDeviceCaps(dc, HORZRES) };
    unsafe {
        let _ = DeleteDC(dc);
    }
    res
}

/// DXGI outputs across all adapters; `id` is the position in that order.
pub fn monitors() -> Vec<Monitor> {
    let outputs = match dxgi::outputs() {
        Ok(outputs) => outputs,
        Err(e) => {
            debug!("DXGI enumeration failed: {e}");
            return Vec::new();
        }
    };
    outputs
        .iter()
        .enumerate()
        .filter_map(|(i, (_, output))| {
            let desc = unsafe { output.GetDesc() }.ok()?;
            let (width, height) = desktop_size(&desc);
            Some(Monitor {
                id: i as i32,
                name: wide_to_string(&desc.DeviceName),
                x: desc.DesktopCoordinates.left,
                y: desc.DesktopCoordinates.top,
                width,
                height,
                scale: dpi_scale(width, horzres(&desc.DeviceName)),
            })
        })
        .collect()
}

/// Whether a top-level window belongs in the capture list.
pub(crate) fn listable(visible: bool, title_len: i32, ex_style: u32, cloaked: bool) -> bool {
    visible && title_len > 0 && ex_style & WS_EX_TOOLWINDOW.0 == 0 && !cloaked
}

unsafe extern "system" fn collect_window(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let windows = &mut *(lparam.0 as *mut Vec<Window>);

    let visible = IsWindowVisible(hwnd).as_bool();
    let title_len = GetWindowTextLengthW(hwnd);
    let ex_style = GetWindowLongW(hwnd, GWL_EXSTYLE) as u32;
    let mut cloaked: u32 = 0;
    let _ = DwmGetWindowAttribute(
        hwnd,
        DWMWA_CLOAKED,
        &mut cloaked as *mut u32 as *mut c_void,
        size_of::<u32>() as u32,
    );
    if !listable(visible, title_len, ex_style, cloaked != 0) {
        return BOOL(1);
    }

    let mut title = vec![0u16; title_len as usize + 1];
    let copied = GetWindowTextW(hwnd, &mut title);
    let name = wide_to_string(&title[..copied.max(0) as usize]);
    let Some(rect) = window_bounds(hwnd) else { return BOOL(1) };

    windows.push(Window {
        id: hwnd.0 as usize as u64,
        name,
        x: rect.left,
        y: rect.top,
        width: rect.right - rect.left,
        height: rect.bottom - rect.top,
    });
    BOOL(1)
}

/// Visible, titled, non-tool, non-cloaked top-level windows.
pub fn windows() -> Vec<Window> {
    let mut list: Vec<Window> = Vec::new();
    let result = unsafe { EnumWindows(Some(collect_window), LPARAM(&mut list as *mut Vec<Window> as isize)) };
    if let Err(e) = result {
        debug!("EnumWindows failed: {e}");
    }
    list
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_from_horzres() {
        assert_eq!(dpi_scale(3840, 1920), 2.0);
        assert_eq!(dpi_scale(1920, 0), 1.0);
    }

    #[test]
    fn filter_skips_hidden_tool_and_cloaked() {
        assert!(listable(true, 5, 0, false));
        assert!(!listable(false, 5, 0, false));
        assert!(!listable(true, 0, 0, false));
        assert!(!listable(true, 5, WS_EX_TOOLWINDOW.0, false));
        assert!(!listable(true, 5, 0, true));
    }

    #[test]
    fn wide_names_stop_at_nul() {
        let mut wide: Vec<u16> = "\\\\.\\DISPLAY1".encode_utf16().collect();
        wide.extend([0, 65, 66]);
        assert_eq!(wide_to_string(&wide), "\\\\.\\DISPLAY1");
    }
}
