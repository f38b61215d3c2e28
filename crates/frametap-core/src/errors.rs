use thiserror::Error;

/// Every failure the capture engine can report.
///
/// `Transient` never leaves a capture worker: the worker drops the frame,
/// re-initializes, or continues.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error(
        "No display server found. Set $WAYLAND_DISPLAY or $DISPLAY. \
         Run from within a graphical session (GNOME, KDE, Sway, X11, etc.)."
    )]
    NoDisplayServer,

    #[error("Platform initialization failed: {reason}")]
    PlatformInit { reason: String },

    #[error("Screen capture request was denied by the portal ({step}, status {status})")]
    PortalDenied { step: &'static str, status: u32 },

    #[error("Portal did not answer {step} within {secs}s")]
    PortalTimeout { step: &'static str, secs: u64 },

    #[error("Screen-cast portal unavailable: {reason}")]
    PortalMissing { reason: String },

    #[error("No frame callback set; call on_frame() before start()")]
    NoCallback,

    #[error("Invalid capture target: {reason}")]
    InvalidTarget { reason: String },

    #[error("No frame received within {ms}ms")]
    CaptureTimeout { ms: u64 },

    #[error("Image dimensions too large: {width}x{height} RGBA overflows the address space")]
    AllocationOverflow { width: usize, height: usize },

    #[error("Capture failed: {reason}")]
    CaptureFailed { reason: String },

    #[error("Transient capture condition: {reason}")]
    Transient { reason: String },
}

impl CaptureError {
    pub fn platform(reason: impl Into<String>) -> Self {
        Self::PlatformInit { reason: reason.into() }
    }

    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient { reason: reason.into() }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

pub type Result<T, E = CaptureError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::CaptureError;

    #[test]
    fn no_display_message_is_actionable() {
        let msg = CaptureError::NoDisplayServer.to_string();
        assert!(msg.contains("$WAYLAND_DISPLAY"));
        assert!(msg.contains("$DISPLAY"));
    }

    #[test]
    fn portal_errors_name_the_step() {
        let denied = CaptureError::PortalDenied { step: "Start", status: 1 };
        assert_eq!(
            denied.to_string(),
            "Screen capture request was denied by the portal (Start, status 1)"
        );
        let timeout = CaptureError::PortalTimeout { step: "CreateSession", secs: 60 };
        assert!(timeout.to_string().contains("60s"));
    }

    #[test]
    fn only_transient_is_transient() {
        assert!(CaptureError::transient("WAIT_TIMEOUT").is_transient());
        assert!(!CaptureError::NoCallback.is_transient());
    }
}
