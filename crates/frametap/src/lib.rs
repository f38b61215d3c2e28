//! frametap — screenshots and screen streaming behind one API.
//!
//! ```text
//! FrameTap::new / with_region / with_monitor / with_window
//!   │  open_backend(target) for the host platform
//!   ▼
//! Linux:   $WAYLAND_DISPLAY → portal + PipeWire   $DISPLAY → X11 MIT-SHM
//! Windows: DXGI Desktop Duplication, GDI for windows and RDP
//!   │
//!   ▼
//! on_frame(cb) → start → [pause ⇄ resume] → stop
//! ```
//!
//! ```no_run
//! use frametap::FrameTap;
//!
//! # fn main() -> frametap::Result<()> {
//! let mut tap = FrameTap::new()?;
//! let shot = tap.screenshot()?;
//! println!("{}x{}", shot.width, shot.height);
//!
//! tap.on_frame(|frame| println!("{}x{} +{:.1}ms", frame.image.width, frame.image.height, frame.duration_ms));
//! tap.start()?;
//! std::thread::sleep(std::time::Duration::from_secs(1));
//! tap.stop();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tracing::{debug, info};

pub use frametap_core::{
    CaptureConfig, CaptureError, CursorMode, Frame, FrameCallback, FrameQueue, Image, Monitor,
    PermissionCheck, PermissionStatus, Rect, Result, Target, Window,
};
pub use frametap_core::Backend;

// ── Platform dispatch ─────────────────────────────────────────────────────────

#[cfg(target_os = "linux")]
use frametap_capture_linux as imp;

#[cfg(target_os = "windows")]
use frametap_capture_windows as imp;

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
mod imp {
    use frametap_core::{
        Backend, CaptureConfig, CaptureError, Monitor, PermissionCheck, PermissionStatus, Result,
        Target, Window,
    };

    pub fn open_backend(_target: &Target, _config: CaptureConfig) -> Result<Box<dyn Backend>> {
        Err(CaptureError::platform("screen capture is not supported on this platform"))
    }

    pub fn monitors() -> Vec<Monitor> {
        Vec::new()
    }

    pub fn windows() -> Vec<Window> {
        Vec::new()
    }

    pub fn check_permissions() -> PermissionCheck {
        PermissionCheck::new(PermissionStatus::Error, "Unsupported platform")
            .detail("Frametap captures on Linux (X11, Wayland) and Windows only.")
    }
}

/// Every monitor the platform reports. Empty when none can be listed.
pub fn get_monitors() -> Vec<Monitor> {
    imp::monitors()
}

/// Capturable top-level windows. Always empty on Wayland.
pub fn get_windows() -> Vec<Window> {
    imp::windows()
}

/// Probe the capture stack. Never fails; problems land in the report.
pub fn check_permissions() -> PermissionCheck {
    imp::check_permissions()
}

// ── FrameTap ──────────────────────────────────────────────────────────────────

/// A capture session bound to one target.
///
/// Dropping a running session stops it.
pub struct FrameTap {
    backend: Box<dyn Backend>,
    callback: Option<FrameCallback>,
}

impl FrameTap {
    /// Primary monitor (Windows) or the whole root window (X11). On Wayland
    /// the portal picker decides.
    pub fn new() -> Result<Self> {
        Self::with_config(Target::Screen, CaptureConfig::default())
    }

    /// A screen-space rectangle, in logical pixels.
    pub fn with_region(region: Rect) -> Result<Self> {
        Self::with_config(Target::Region(region), CaptureConfig::default())
    }

    pub fn with_monitor(monitor: Monitor) -> Result<Self> {
        Self::with_config(Target::Monitor(monitor), CaptureConfig::default())
    }

    pub fn with_window(window: Window) -> Result<Self> {
        Self::with_config(Target::Window(window), CaptureConfig::default())
    }

    pub fn with_config(target: Target, config: CaptureConfig) -> Result<Self> {
        debug!("opening backend for {:?}", target);
        let backend = imp::open_backend(&target, config)?;
        Ok(Self::from_backend(backend))
    }

    /// Wrap an already constructed backend.
    pub fn from_backend(backend: Box<dyn Backend>) -> Self {
        Self { backend, callback: None }
    }

    /// Applies to frames acquired after the call; safe while streaming.
    pub fn set_region(&self, region: Rect) {
        self.backend.set_region(region);
    }

    /// Install the frame callback. It runs on the capture worker; takes
    /// effect on the next `start`.
    pub fn on_frame<F>(&mut self, callback: F)
    where
        F: Fn(&Frame) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
    }

    /// Begin streaming. A running session is left as is; one that was
    /// stopped from its callback or ended on an error starts over.
    pub fn start(&mut self) -> Result<()> {
        if self.backend.is_running() {
            return Ok(());
        }
        let callback = self.callback.clone().ok_or(CaptureError::NoCallback)?;
        self.backend.start(callback)?;
        info!("capture session started");
        Ok(())
    }

    /// Stop streaming and join the worker. Idempotent.
    pub fn stop(&mut self) {
        let was_running = self.backend.is_running();
        self.backend.stop();
        if was_running {
            info!("capture session stopped");
        }
    }

    /// A worker is delivering frames.
    pub fn is_running(&self) -> bool {
        self.backend.is_running()
    }

    pub fn pause(&self) {
        self.backend.pause();
    }

    pub fn resume(&self) {
        self.backend.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.backend.is_paused()
    }

    /// One frame of the target, cropped by the session region.
    pub fn screenshot(&self) -> Result<Image> {
        self.backend.screenshot(Rect::default())
    }

    /// One frame of the target cropped by `region`; an empty rectangle
    /// falls back to the session region.
    pub fn screenshot_region(&self, region: Rect) -> Result<Image> {
        self.backend.screenshot(region)
    }
}

impl Drop for FrameTap {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for FrameTap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameTap")
            .field("running", &self.backend.is_running())
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frametap_core::{checked_rgba_size, clamp_to_surface, validate_region, CaptureWorker, StreamState};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Mutex, PoisonError};
    use std::thread;
    use std::time::{Duration, Instant};

    const SURFACE: (u32, u32) = (64, 48);

    /// Paints a solid surface every few milliseconds on a real worker.
    struct Synthetic {
        region: Arc<Mutex<Rect>>,
        state: Arc<StreamState>,
        worker: Option<CaptureWorker>,
        starts: Arc<AtomicUsize>,
        // Ends the worker as a persistent capture failure would.
        fail: Arc<AtomicBool>,
    }

    impl Synthetic {
        fn new(region: Rect) -> Self {
            Self {
                region: Arc::new(Mutex::new(region)),
                state: StreamState::new(),
                worker: None,
                starts: Arc::new(AtomicUsize::new(0)),
                fail: Arc::new(AtomicBool::new(false)),
            }
        }

        fn paint(region: Rect) -> Result<Image> {
            let area = clamp_to_surface(region, SURFACE.0, SURFACE.1)?;
            let len = checked_rgba_size(area.width as usize, area.height as usize)?;
            Ok(Image { data: vec![0x80; len], width: area.width as usize, height: area.height as usize })
        }
    }

    impl Backend for Synthetic {
        fn screenshot(&self, region: Rect) -> Result<Image> {
            let region = if region.is_empty() {
                *self.region.lock().unwrap_or_else(PoisonError::into_inner)
            } else {
                region
            };
            Self::paint(region)
        }

        fn start(&mut self, callback: FrameCallback) -> Result<()> {
            if self.state.is_active() {
                return Ok(());
            }
            self.stop();
            if self.worker.is_some() {
                return Err(CaptureError::platform("cannot restart from inside the frame callback"));
            }
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.state.begin();
            let state = Arc::clone(&self.state);
            let region = Arc::clone(&self.region);
            let fail = Arc::clone(&self.fail);
            let worker = CaptureWorker::spawn("synthetic", Arc::clone(&self.state), move || {
                while !state.stop_requested() && !fail.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(5));
                    if state.is_paused() {
                        continue;
                    }
                    let crop = *region.lock().unwrap_or_else(PoisonError::into_inner);
                    if let Ok(image) = Self::paint(crop) {
                        let duration_ms = state.tick();
                        callback(&Frame { image, duration_ms });
                    }
                }
            })?;
            self.worker = Some(worker);
            Ok(())
        }

        fn stop(&mut self) {
            let Some(worker) = self.worker.as_mut() else { return };
            self.state.request_stop();
            if worker.join() {
                self.worker = None;
            }
        }

        fn is_running(&self) -> bool {
            self.state.is_active()
        }

        fn pause(&self) {
            self.state.pause();
        }

        fn resume(&self) {
            self.state.resume();
        }

        fn is_paused(&self) -> bool {
            self.state.is_paused()
        }

        fn set_region(&self, region: Rect) {
            if validate_region(&region).is_ok() {
                *self.region.lock().unwrap_or_else(PoisonError::into_inner) = region;
            }
        }
    }

    fn failing_tap() -> (FrameTap, Arc<AtomicUsize>, Arc<AtomicBool>) {
        let backend = Synthetic::new(Rect::default());
        let starts = Arc::clone(&backend.starts);
        let fail = Arc::clone(&backend.fail);
        (FrameTap::from_backend(Box::new(backend)), starts, fail)
    }

    fn synthetic_tap() -> (FrameTap, Arc<AtomicUsize>) {
        let backend = Synthetic::new(Rect::default());
        let starts = Arc::clone(&backend.starts);
        (FrameTap::from_backend(Box::new(backend)), starts)
    }

    fn counting(tap: &mut FrameTap) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        tap.on_frame(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    fn wait_for(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        done()
    }

    #[test]
    fn start_without_callback_fails() {
        let (mut tap, starts) = synthetic_tap();
        assert!(matches!(tap.start(), Err(CaptureError::NoCallback)));
        assert_eq!(starts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stop_before_start_and_twice_is_a_no_op() {
        let (mut tap, _) = synthetic_tap();
        tap.stop();
        let _count = counting(&mut tap);
        tap.start().unwrap();
        tap.stop();
        tap.stop();
        assert!(!tap.is_paused());
    }

    #[test]
    fn second_start_keeps_the_running_worker() {
        let (mut tap, starts) = synthetic_tap();
        let _count = counting(&mut tap);
        tap.start().unwrap();
        tap.start().unwrap();
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        tap.stop();
        tap.start().unwrap();
        assert_eq!(starts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn pause_before_start_is_ignored() {
        let (tap, _) = synthetic_tap();
        tap.pause();
        assert!(!tap.is_paused());
    }

    #[test]
    fn pause_suppresses_and_resume_restores_delivery() {
        let (mut tap, _) = synthetic_tap();
        let count = counting(&mut tap);
        tap.start().unwrap();
        assert!(wait_for(Duration::from_secs(3), || count.load(Ordering::SeqCst) >= 1));

        tap.pause();
        tap.pause();
        assert!(tap.is_paused());
        // A frame already past the pause check may still land.
        thread::sleep(Duration::from_millis(50));
        let frozen = count.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(500));
        assert_eq!(count.load(Ordering::SeqCst), frozen);

        tap.resume();
        assert!(!tap.is_paused());
        assert!(wait_for(Duration::from_secs(3), || count.load(Ordering::SeqCst) > frozen));
        tap.stop();
    }

    #[test]
    fn first_frame_after_start_and_resume_reports_zero() {
        let (mut tap, _) = synthetic_tap();
        let durations = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&durations);
        tap.on_frame(move |frame| sink.lock().unwrap().push(frame.duration_ms));
        tap.start().unwrap();
        assert!(wait_for(Duration::from_secs(3), || durations.lock().unwrap().len() >= 3));

        tap.pause();
        thread::sleep(Duration::from_millis(50));
        let before_resume = durations.lock().unwrap().len();
        tap.resume();
        assert!(wait_for(Duration::from_secs(3), || durations.lock().unwrap().len() > before_resume));
        tap.stop();

        let durations = durations.lock().unwrap();
        assert_eq!(durations[0], 0.0);
        assert!(durations[1] > 0.0);
        assert_eq!(durations[before_resume], 0.0);
    }

    #[test]
    fn frames_follow_set_region() {
        let (mut tap, _) = synthetic_tap();
        let widths = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&widths);
        tap.on_frame(move |frame| sink.lock().unwrap().push(frame.image.width));
        tap.start().unwrap();
        assert!(wait_for(Duration::from_secs(3), || !widths.lock().unwrap().is_empty()));
        tap.set_region(Rect::new(0.0, 0.0, 10.0, 10.0));
        assert!(wait_for(Duration::from_secs(3), || widths.lock().unwrap().last() == Some(&10)));
        tap.stop();
        assert_eq!(widths.lock().unwrap()[0], SURFACE.0 as usize);
    }

    #[test]
    fn stop_from_the_callback_does_not_deadlock() {
        let (tap, _) = synthetic_tap();
        let tap = Arc::new(Mutex::new(tap));
        let fired = Arc::new(AtomicUsize::new(0));
        {
            let inner = Arc::clone(&tap);
            let fired = Arc::clone(&fired);
            let mut guard = tap.lock().unwrap();
            guard.on_frame(move |_| {
                fired.fetch_add(1, Ordering::SeqCst);
                // The owner lock is held by the test thread only briefly.
                if let Ok(mut owner) = inner.try_lock() {
                    owner.stop();
                }
            });
            guard.start().unwrap();
        }
        assert!(wait_for(Duration::from_secs(3), || fired.load(Ordering::SeqCst) >= 1));
        tap.lock().unwrap().stop();
        let settled = fired.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(fired.load(Ordering::SeqCst), settled);
        // Break the callback's reference cycle before the session drops.
        tap.lock().unwrap().callback = None;
    }

    #[test]
    fn restart_after_stop_from_the_callback_delivers_frames() {
        let (tap, starts) = synthetic_tap();
        let tap = Arc::new(Mutex::new(tap));
        let fired = Arc::new(AtomicUsize::new(0));
        let armed = Arc::new(AtomicBool::new(true));
        {
            let inner = Arc::clone(&tap);
            let fired = Arc::clone(&fired);
            let armed = Arc::clone(&armed);
            let mut guard = tap.lock().unwrap();
            guard.on_frame(move |_| {
                fired.fetch_add(1, Ordering::SeqCst);
                if armed.load(Ordering::SeqCst) {
                    if let Ok(mut owner) = inner.try_lock() {
                        owner.stop();
                        armed.store(false, Ordering::SeqCst);
                    }
                }
            });
            guard.start().unwrap();
        }
        assert!(wait_for(Duration::from_secs(3), || !armed.load(Ordering::SeqCst)));
        assert!(wait_for(Duration::from_secs(3), || !tap.lock().unwrap().is_running()));

        tap.lock().unwrap().start().unwrap();
        assert!(tap.lock().unwrap().is_running());
        assert_eq!(starts.load(Ordering::SeqCst), 2);
        let before = fired.load(Ordering::SeqCst);
        assert!(wait_for(Duration::from_secs(3), || fired.load(Ordering::SeqCst) > before));

        tap.lock().unwrap().stop();
        tap.lock().unwrap().callback = None;
    }

    #[test]
    fn restart_after_the_worker_died() {
        let (mut tap, starts, fail) = failing_tap();
        let count = counting(&mut tap);
        tap.start().unwrap();
        fail.store(true, Ordering::SeqCst);
        assert!(wait_for(Duration::from_secs(3), || !tap.is_running()));

        fail.store(false, Ordering::SeqCst);
        tap.start().unwrap();
        assert_eq!(starts.load(Ordering::SeqCst), 2);
        let before = count.load(Ordering::SeqCst);
        assert!(wait_for(Duration::from_secs(3), || count.load(Ordering::SeqCst) > before));
        tap.stop();
        assert!(!tap.is_running());
    }

    #[test]
    fn overflowing_region_is_rejected() {
        let huge = Rect::new(0.0, 0.0, (usize::MAX / 4 + 1) as f64, 1.0);
        let tap = FrameTap::from_backend(Box::new(Synthetic::new(huge)));
        assert!(matches!(tap.screenshot(), Err(CaptureError::AllocationOverflow { .. })));
    }

    #[test]
    fn negative_origin_is_clamped() {
        let (tap, _) = synthetic_tap();
        let shot = tap.screenshot_region(Rect::new(-10.0, -10.0, 20.0, 20.0)).unwrap();
        assert_eq!((shot.width, shot.height), (10, 10));
        assert_eq!(shot.data.len(), 10 * 10 * 4);
    }

    #[test]
    fn screenshot_works_before_start_and_after_stop() {
        let (mut tap, _) = synthetic_tap();
        assert_eq!(tap.screenshot().unwrap().width, SURFACE.0 as usize);
        let _count = counting(&mut tap);
        tap.start().unwrap();
        assert!(!tap.screenshot().unwrap().is_empty());
        tap.stop();
        assert!(!tap.screenshot().unwrap().is_empty());
    }

    #[test]
    fn live_screenshot_when_a_display_is_available() {
        if check_permissions().status == PermissionStatus::Error {
            return;
        }
        // The portal picker needs a human.
        if std::env::var_os("WAYLAND_DISPLAY").is_some() {
            return;
        }
        let Ok(tap) = FrameTap::new() else { return };
        // Headless CI sessions can report a display they cannot read.
        let Ok(shot) = tap.screenshot() else { return };
        assert_eq!(shot.data.len(), shot.width * shot.height * 4);
    }
}
