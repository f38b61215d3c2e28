//! frametap-capture-windows — DXGI Desktop Duplication with a GDI fallback.
//!
//! Monitor and region capture use DXGI; window capture always goes through
//! GDI. On non-Windows targets a stub is compiled for CI compatibility.
//!
//! # Windows pipeline
//!
//! ```text
//! CreateDXGIFactory1 → adapters × outputs → output[Monitor::id]
//!   │  D3D11CreateDevice(adapter) + DuplicateOutput
//!   ▼
//! AcquireNextFrame(acquire_timeout_ms)
//!   │  WAIT_TIMEOUT → retry   ACCESS_LOST → reopen duplication
//!   ▼
//! CopyResource → staging texture (BGRA8, CPU read) → Map
//!   │  crop by RowPitch, BGRA → RGBA
//!   ▼
//! callback(&Frame) on the capture worker
//!
//! HWND → DWM frame bounds → PrintWindow / BitBlt → GetDIBits → crop → RGBA
//! ```

// ── Platform split ─────────────────────────────────────────────────────────────

#[cfg(target_os = "windows")]
mod backend;
#[cfg(target_os = "windows")]
mod dxgi;
#[cfg(target_os = "windows")]
mod enumerate;
#[cfg(target_os = "windows")]
mod gdi;
#[cfg(target_os = "windows")]
mod permissions;

#[cfg(target_os = "windows")]
pub use backend::WindowsBackend;
#[cfg(target_os = "windows")]
pub use enumerate::{monitors, windows};

#[cfg(target_os = "windows")]
pub fn open_backend(
    target: &frametap_core::Target,
    config: frametap_core::CaptureConfig,
) -> frametap_core::Result<Box<dyn frametap_core::Backend>> {
    Ok(Box::new(WindowsBackend::new(target, config)?))
}

#[cfg(target_os = "windows")]
pub fn check_permissions() -> frametap_core::PermissionCheck {
    permissions::check()
}

#[cfg(not(target_os = "windows"))]
mod stub;
#[cfg(not(target_os = "windows"))]
pub use stub::{check_permissions, monitors, open_backend, windows};
