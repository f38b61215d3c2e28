//! frametap-capture-linux — screen capture on X11 and Wayland.
//!
//! # Backends
//!
//! | Backend | Session | Transport |
//! |---------|---------|-----------|
//! | [`X11Backend`] | `$DISPLAY` | MIT-SHM, `XGetImage` fallback |
//! | [`WaylandBackend`] | `$WAYLAND_DISPLAY` | ScreenCast portal + PipeWire |
//!
//! Wayland wins when both variables are set: under XWayland the X root
//! window only shows X clients.
//!
//! On non-Linux targets a stub is compiled so the workspace builds on
//! every host.

use std::ffi::OsStr;

use tracing::debug;

// ── Display server detection ──────────────────────────────────────────────────

/// Which Linux display protocol a session should speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayServer {
    Wayland,
    X11,
}

impl DisplayServer {
    /// Read `$WAYLAND_DISPLAY` and `$DISPLAY` from the environment.
    pub fn detect() -> Option<Self> {
        let server = Self::from_env_values(
            std::env::var_os("WAYLAND_DISPLAY").as_deref(),
            std::env::var_os("DISPLAY").as_deref(),
        );
        debug!("display server: {:?}", server);
        server
    }

    /// Presence decides, not the value: an empty variable still counts.
    pub fn from_env_values(wayland_display: Option<&OsStr>, display: Option<&OsStr>) -> Option<Self> {
        match (wayland_display, display) {
            (Some(_), _) => Some(Self::Wayland),
            (None, Some(_)) => Some(Self::X11),
            (None, None) => None,
        }
    }
}

impl std::fmt::Display for DisplayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Wayland => write!(f, "Wayland"),
            Self::X11 => write!(f, "X11"),
        }
    }
}

// ── Platform split ────────────────────────────────────────────────────────────

#[cfg(target_os = "linux")]
mod permissions;
#[cfg(target_os = "linux")]
mod wayland;
#[cfg(target_os = "linux")]
mod x11;

#[cfg(target_os = "linux")]
pub use linux::{check_permissions, monitors, open_backend, windows};
#[cfg(target_os = "linux")]
pub use wayland::WaylandBackend;
#[cfg(target_os = "linux")]
pub use x11::X11Backend;

#[cfg(not(target_os = "linux"))]
mod stub;
#[cfg(not(target_os = "linux"))]
pub use stub::{check_permissions, monitors, open_backend, windows};

#[cfg(target_os = "linux")]
mod linux {
    use frametap_core::{
        Backend, CaptureConfig, CaptureError, Monitor, PermissionCheck, Result, Target, Window,
    };

    use super::{permissions, wayland, x11, DisplayServer};

    /// Backend for the detected display server, bound to `target`.
    pub fn open_backend(target: &Target, config: CaptureConfig) -> Result<Box<dyn Backend>> {
        match DisplayServer::detect() {
            Some(DisplayServer::Wayland) => Ok(Box::new(wayland::WaylandBackend::new(target, config)?)),
            Some(DisplayServer::X11) => Ok(Box::new(x11::X11Backend::new(target, config)?)),
            None => Err(CaptureError::NoDisplayServer),
        }
    }

    pub fn monitors() -> Vec<Monitor> {
        match DisplayServer::detect() {
            Some(DisplayServer::Wayland) => wayland::monitors(),
            Some(DisplayServer::X11) => x11::monitors(),
            None => Vec::new(),
        }
    }

    pub fn windows() -> Vec<Window> {
        match DisplayServer::detect() {
            Some(DisplayServer::Wayland) => wayland::windows(),
            Some(DisplayServer::X11) => x11::windows(),
            None => Vec::new(),
        }
    }

    pub fn check_permissions() -> PermissionCheck {
        permissions::check(DisplayServer::detect())
    }
}
