use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the portal should treat the pointer in screen-cast streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CursorMode {
    Hidden,
    Embedded,
    Metadata,
}

/// Timing knobs of the capture engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Polling period of the X11 worker and the GDI monitor fallback.
    #[serde(alias = "frameIntervalMs")]
    pub frame_interval_ms: u64,
    /// Budget for `CreateSession` and `SelectSources`.
    #[serde(alias = "portalTimeoutSecs")]
    pub portal_timeout_secs: u64,
    /// Budget for `Start`, which waits on the user's picker dialog.
    #[serde(alias = "pickerTimeoutSecs")]
    pub picker_timeout_secs: u64,
    #[serde(alias = "screenshotTimeoutSecs")]
    pub screenshot_timeout_secs: u64,
    /// `AcquireNextFrame` timeout; also bounds stop latency on Windows.
    #[serde(alias = "acquireTimeoutMs")]
    pub acquire_timeout_ms: u32,
    #[serde(alias = "cursorMode")]
    pub cursor_mode: CursorMode,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 16,
            portal_timeout_secs: 60,
            picker_timeout_secs: 120,
            screenshot_timeout_secs: 5,
            acquire_timeout_ms: 100,
            cursor_mode: CursorMode::Embedded,
        }
    }
}

impl CaptureConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }

    pub fn screenshot_timeout(&self) -> Duration {
        Duration::from_secs(self.screenshot_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::{CaptureConfig, CursorMode};

    #[test]
    fn defaults_match_platform_budgets() {
        let cfg = CaptureConfig::default();
        assert_eq!(cfg.frame_interval_ms, 16);
        assert_eq!(cfg.portal_timeout_secs, 60);
        assert_eq!(cfg.picker_timeout_secs, 120);
        assert_eq!(cfg.screenshot_timeout_secs, 5);
        assert_eq!(cfg.acquire_timeout_ms, 100);
        assert_eq!(cfg.cursor_mode, CursorMode::Embedded);
    }

    #[test]
    fn deserializes_partial_snake_case() {
        let json = r#"{ "frame_interval_ms": 33, "cursor_mode": "hidden" }"#;
        let cfg: CaptureConfig = serde_json::from_str(json).expect("valid snake_case config");
        assert_eq!(cfg.frame_interval_ms, 33);
        assert_eq!(cfg.cursor_mode, CursorMode::Hidden);
        assert_eq!(cfg.picker_timeout_secs, 120);
    }

    #[test]
    fn deserializes_camel_case_aliases() {
        let json = r#"{ "pickerTimeoutSecs": 30, "acquireTimeoutMs": 50 }"#;
        let cfg: CaptureConfig = serde_json::from_str(json).expect("valid camelCase config");
        assert_eq!(cfg.picker_timeout_secs, 30);
        assert_eq!(cfg.acquire_timeout_ms, 50);
        assert_eq!(cfg.frame_interval_ms, 16);
    }

    #[test]
    fn zero_interval_never_spins() {
        let cfg = CaptureConfig { frame_interval_ms: 0, ..Default::default() };
        assert_eq!(cfg.frame_interval().as_millis(), 1);
    }
}
