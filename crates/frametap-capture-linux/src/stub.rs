//! Non-Linux stub (CI + cross-compilation).

use frametap_core::{
    Backend, CaptureConfig, CaptureError, Monitor, PermissionCheck, PermissionStatus, Result, Target,
    Window,
};

pub fn open_backend(_target: &Target, _config: CaptureConfig) -> Result<Box<dyn Backend>> {
    tracing::warn!("open_backend stub (non-Linux)");
    Err(CaptureError::platform("X11 and Wayland capture are only available on Linux"))
}

pub fn monitors() -> Vec<Monitor> {
    Vec::new()
}

pub fn windows() -> Vec<Window> {
    Vec::new()
}

pub fn check_permissions() -> PermissionCheck {
    PermissionCheck::new(PermissionStatus::Error, "Linux capture unavailable")
        .detail("This build targets a platform without X11 or Wayland capture.")
}
