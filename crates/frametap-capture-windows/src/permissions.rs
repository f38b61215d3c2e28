use frametap_core::{PermissionCheck, PermissionStatus};
use windows::Win32::UI::WindowsAndMessaging::{GetSystemMetrics, SM_REMOTESESSION};

use super::dxgi;

/// What probing DXGI found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DxgiProbe {
    Available,
    NoOutputs,
    Unavailable,
}

pub(crate) fn check() -> PermissionCheck {
    let dxgi = match dxgi::outputs() {
        Ok(outputs) if !outputs.is_empty() => DxgiProbe::Available,
        Ok(_) => DxgiProbe::NoOutputs,
        Err(_) => DxgiProbe::Unavailable,
    };
    let remote = unsafe { GetSystemMetrics(SM_REMOTESESSION) } != 0;
    report(dxgi, remote)
}

pub(crate) fn report(dxgi: DxgiProbe, remote_session: bool) -> PermissionCheck {
    let mut report = PermissionCheck::new(PermissionStatus::Ok, "");
    match dxgi {
        DxgiProbe::Available => report.details.push("DXGI Desktop Duplication available.".into()),
        DxgiProbe::NoOutputs => report.warn(
            "No DXGI outputs found. This may happen in RDP sessions or headless environments. \
             GDI fallback will be used.",
        ),
        DxgiProbe::Unavailable => report.warn("DXGI unavailable. GDI fallback will be used for capture."),
    }
    if remote_session {
        report.warn(
            "Remote Desktop session detected. DXGI Desktop Duplication may not work; \
             GDI fallback will be used.",
        );
    }
    report.summary = match report.status {
        PermissionStatus::Ok => "Windows (DXGI)".into(),
        _ => "Windows (GDI fallback)".into(),
    };
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dxgi_with_outputs_is_ok() {
        let r = report(DxgiProbe::Available, false);
        assert_eq!(r.status, PermissionStatus::Ok);
        assert_eq!(r.summary, "Windows (DXGI)");
    }

    #[test]
    fn rdp_session_warns_about_gdi() {
        let r = report(DxgiProbe::Available, true);
        assert_eq!(r.status, PermissionStatus::Warning);
        assert_eq!(r.summary, "Windows (GDI fallback)");
        assert!(r.details.iter().any(|d| d.contains("Remote Desktop")));
    }

    #[test]
    fn missing_dxgi_warns() {
        assert_eq!(report(DxgiProbe::Unavailable, false).status, PermissionStatus::Warning);
        assert_eq!(report(DxgiProbe::NoOutputs, false).status, PermissionStatus::Warning);
    }
}
