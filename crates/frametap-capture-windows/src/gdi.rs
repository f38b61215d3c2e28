//! GDI capture: every window capture, and monitors when DXGI is out.
//!
//! GDI bitmaps carry no meaningful alpha, so pixels are read as BGRx and
//! come out opaque.

use std::ffi::c_void;
use std::mem::size_of;

use frametap_core::pixel::{checked_rgba_size, copy_plane, SourceLayout};
use frametap_core::{clamp_to_surface, crop_rgba, CaptureArea, CaptureError, Image, Rect, Result};
use tracing::debug;
use windows::Win32::Foundation::{HWND, RECT};
use windows::Win32::Graphics::Dwm::{DwmGetWindowAttribute, DWMWA_EXTENDED_FRAME_BOUNDS};
use windows::Win32::Graphics::Gdi::{
    BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject, GetDC, GetDIBits,
    ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS, HBITMAP, HDC,
    HGDIOBJ, SRCCOPY,
};
use windows::Win32::Storage::Xps::{PrintWindow, PW_RENDERFULLCONTENT};
use windows::Win32::UI::WindowsAndMessaging::{GetSystemMetrics, GetWindowRect, IsWindow, SM_CXSCREEN, SM_CYSCREEN};

// ── RAII handles ──────────────────────────────────────────────────────────────

/// `GetDC` result, released on drop.
struct WindowDc {
    hwnd: HWND,
    hdc: HDC,
}

impl WindowDc {
    fn get(hwnd: HWND) -> Result<Self> {
        let hdc = unsafe { GetDC(hwnd) };
        if hdc.is_invalid() {
            return Err(CaptureError::transient("GetDC failed"));
        }
        Ok(Self { hwnd, hdc })
    }
}

impl Drop for WindowDc {
    fn drop(&mut self) {
        unsafe { ReleaseDC(self.hwnd, self.hdc) };
    }
}

/// Memory DC with a compatible bitmap selected into it.
struct MemoryBitmap {
    dc: HDC,
    bitmap: HBITMAP,
    previous: HGDIOBJ,
    width: i32,
    height: i32,
}

impl MemoryBitmap {
    fn new(source: HDC, width: i32, height: i32) -> Result<Self> {
        let dc = unsafe { CreateCompatibleDC(source) };
        if dc.is_invalid() {
            return Err(CaptureError::transient("CreateCompatibleDC failed"));
        }
        let bitmap = unsafe { CreateCompatibleBitmap(source, width, height) };
        if bitmap.is_invalid() {
            unsafe {
                let _ = DeleteDC(dc);
            }
            return Err(CaptureError::transient(format!("CreateCompatibleBitmap {width}x{height} failed")));
        }
        let previous = unsafe { SelectObject(dc, bitmap) };
        Ok(Self { dc, bitmap, previous, width, height })
    }

    /// The bitmap as tightly packed top-down 32-bit BGRx.
    fn read(&self) -> Result<Vec<u8>> {
        let mut pixels = vec![0u8; checked_rgba_size(self.width as usize, self.height as usize)?];
        let mut info = BITMAPINFO {
            bmiHeader: BITMAPINFOHEADER {
                biSize: size_of::<BITMAPINFOHEADER>() as u32,
                biWidth: self.width,
                biHeight: -self.height,
                biPlanes: 1,
                biBitCount: 32,
                biCompression: BI_RGB.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let lines = unsafe {
            GetDIBits(
                self.dc,
                self.bitmap,
                0,
                self.height as u32,
                Some(pixels.as_mut_ptr() as *mut c_void),
                &mut info,
                DIB_RGB_COLORS,
            )
        };
        if lines == 0 {
            return Err(CaptureError::transient("GetDIBits copied no lines"));
        }
        Ok(pixels)
    }
}

impl Drop for MemoryBitmap {
    fn drop(&mut self) {
        unsafe {
            SelectObject(self.dc, self.previous);
            let _ = DeleteObject(self.bitmap);
            let _ = DeleteDC(self.dc);
        }
    }
}

// ── Capture ───────────────────────────────────────────────────────────────────

pub(crate) fn hwnd(raw: isize) -> HWND {
    HWND(raw as *mut c_void)
}

pub(crate) fn is_window(raw: isize) -> bool {
    unsafe { IsWindow(hwnd(raw)) }.as_bool()
}

/// Visible bounds of a window: DWM's extended frame bounds, which exclude
/// the invisible resize border, else `GetWindowRect`.
pub(crate) fn window_bounds(window: HWND) -> Option<RECT> {
    let mut rect = RECT::default();
    let dwm = unsafe {
        DwmGetWindowAttribute(
            window,
            DWMWA_EXTENDED_FRAME_BOUNDS,
            &mut rect as *mut RECT as *mut c_void,
            size_of::<RECT>() as u32,
        )
    };
    if dwm.is_ok() {
        return Some(rect);
    }
    unsafe { GetWindowRect(window, &mut rect) }.ok().map(|_| rect)
}

/// One window, cropped by `region` in window coordinates.
pub(crate) fn capture_window(raw: isize, region: Rect) -> Result<Image> {
    let window = hwnd(raw);
    let rect = window_bounds(window).ok_or_else(|| CaptureError::transient("window bounds unavailable"))?;
    let (width, height) = (rect.right - rect.left, rect.bottom - rect.top);
    if width <= 0 || height <= 0 {
        return Ok(Image::empty());
    }
    let area = clamp_to_surface(region, width as u32, height as u32)?;
    if area.is_empty() {
        return Ok(Image::empty());
    }

    let source = WindowDc::get(window)?;
    let bitmap = MemoryBitmap::new(source.hdc, width, height)?;
    // PW_RENDERFULLCONTENT also renders DirectComposition content.
    if !unsafe { PrintWindow(window, bitmap.dc, PW_RENDERFULLCONTENT) }.as_bool() {
        debug!("PrintWindow failed; falling back to BitBlt");
        unsafe { BitBlt(bitmap.dc, 0, 0, width, height, source.hdc, 0, 0, SRCCOPY) }
            .map_err(|e| CaptureError::transient(format!("BitBlt: {e}")))?;
    }
    let pixels = bitmap.read()?;
    let whole = CaptureArea::full(width as u32, height as u32);
    let full = copy_plane(&pixels, width as usize * 4, whole, SourceLayout::Bgrx)?;
    crop_rgba(full, area)
}

/// Desktop rectangle of the primary screen.
pub(crate) fn primary_bounds() -> Result<RECT> {
    let width = unsafe { GetSystemMetrics(SM_CXSCREEN) };
    let height = unsafe { GetSystemMetrics(SM_CYSCREEN) };
    if width <= 0 || height <= 0 {
        return Err(CaptureError::transient("screen metrics unavailable"));
    }
    Ok(RECT { left: 0, top: 0, right: width, bottom: height })
}

/// Screen-DC coordinates of `area`, given relative to the origin of `bounds`.
fn blit_origin(bounds: &RECT, area: &CaptureArea) -> (i32, i32) {
    (bounds.left + area.x as i32, bounds.top + area.y as i32)
}

/// The desktop rectangle `bounds` of one monitor through the screen DC,
/// cropped by `region` relative to that monitor.
pub(crate) fn capture_desktop(bounds: RECT, region: Rect) -> Result<Image> {
    let (width, height) = (bounds.right - bounds.left, bounds.bottom - bounds.top);
    if width <= 0 || height <= 0 {
        return Err(CaptureError::transient("monitor has no desktop area"));
    }
    let area = clamp_to_surface(region, width as u32, height as u32)?;
    if area.is_empty() {
        return Ok(Image::empty());
    }
    let (w, h) = (area.width as i32, area.height as i32);
    let (x, y) = blit_origin(&bounds, &area);

    let source = WindowDc::get(HWND::default())?;
    let bitmap = MemoryBitmap::new(source.hdc, w, h)?;
    unsafe { BitBlt(bitmap.dc, 0, 0, w, h, source.hdc, x, y, SRCCOPY) }
        .map_err(|e| CaptureError::transient(format!("BitBlt: {e}")))?;
    let pixels = bitmap.read()?;
    copy_plane(&pixels, w as usize * 4, CaptureArea::full(area.width, area.height), SourceLayout::Bgrx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secondary_monitor_blits_from_its_desktop_origin() {
        let left_of_primary = RECT { left: -1920, top: 0, right: 0, bottom: 1080 };
        let area = clamp_to_surface(Rect::new(10.0, 20.0, 100.0, 50.0), 1920, 1080).unwrap();
        assert_eq!(blit_origin(&left_of_primary, &area), (-1910, 20));

        let below = RECT { left: 0, top: 1080, right: 2560, bottom: 2520 };
        assert_eq!(blit_origin(&below, &CaptureArea::full(2560, 1440)), (0, 1080));
    }

    #[test]
    fn degenerate_monitor_bounds_are_transient() {
        let err = capture_desktop(RECT::default(), Rect::default()).unwrap_err();
        assert!(err.is_transient());
    }
}
