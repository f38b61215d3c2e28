//! Non-Windows stub (CI + cross-compilation).

use frametap_core::{
    Backend, CaptureConfig, CaptureError, Monitor, PermissionCheck, PermissionStatus, Result, Target,
    Window,
};

pub fn open_backend(_target: &Target, _config: CaptureConfig) -> Result<Box<dyn Backend>> {
    tracing::warn!("open_backend stub (non-Windows)");
    Err(CaptureError::platform("DXGI and GDI capture are only available on Windows"))
}

pub fn monitors() -> Vec<Monitor> {
    Vec::new()
}

pub fn windows() -> Vec<Window> {
    Vec::new()
}

pub fn check_permissions() -> PermissionCheck {
    PermissionCheck::new(PermissionStatus::Error, "Windows capture unavailable")
        .detail("This build targets a platform without DXGI or GDI.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_refuses_to_capture() {
        assert!(open_backend(&Target::Screen, CaptureConfig::default()).is_err());
        assert!(monitors().is_empty());
        assert_eq!(check_permissions().status, PermissionStatus::Error);
    }
}
