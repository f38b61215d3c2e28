use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use frametap_core::{
    validate_region, Backend, CaptureConfig, CaptureError, CaptureWorker, Frame, FrameCallback, Image, Rect,
    Result, StreamState, Target,
};
use tracing::{debug, error, info, warn};
use windows::Win32::Foundation::RECT;

use super::dxgi::{self, Duplicator};
use super::gdi;

/// What a Windows session reads pixels from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    /// DXGI output index (`Monitor::id`).
    Output(u32),
    /// Raw `HWND`; the handle type itself is not `Send`.
    Window(isize),
}

/// DXGI Desktop Duplication for monitors and regions, GDI for windows and
/// as the monitor fallback.
pub struct WindowsBackend {
    source: Source,
    region: Arc<Mutex<Rect>>,
    state: Arc<StreamState>,
    worker: Option<CaptureWorker>,
    config: CaptureConfig,
}

impl WindowsBackend {
    pub fn new(target: &Target, config: CaptureConfig) -> Result<Self> {
        let source = match target {
            Target::Screen | Target::Region(_) => Source::Output(0),
            Target::Monitor(monitor) => Source::Output(u32::try_from(monitor.id).map_err(|_| {
                CaptureError::InvalidTarget { reason: format!("monitor id {} is negative", monitor.id) }
            })?),
            Target::Window(window) => {
                let raw = window.id as isize;
                if !gdi::is_window(raw) {
                    return Err(CaptureError::InvalidTarget {
                        reason: format!("window {:#x} no longer exists", window.id),
                    });
                }
                Source::Window(raw)
            }
        };
        let region = target.region();
        info!("Windows backend ready ({:?})", source);
        Ok(Self {
            source,
            region: Arc::new(Mutex::new(region)),
            state: StreamState::new(),
            worker: None,
            config,
        })
    }

    fn current_region(&self) -> Rect {
        *self.region.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Backend for WindowsBackend {
    fn screenshot(&self, region: Rect) -> Result<Image> {
        let region = if region.is_empty() { self.current_region() } else { region };
        validate_region(&region)?;
        let shot = match self.source {
            Source::Window(raw) => gdi::capture_window(raw, region),
            Source::Output(index) => match dxgi::screenshot(index, region) {
                Err(e @ (CaptureError::InvalidTarget { .. } | CaptureError::AllocationOverflow { .. })) => Err(e),
                Err(e) => {
                    debug!("DXGI screenshot failed ({e}); using GDI");
                    fallback_bounds(index).and_then(|bounds| gdi::capture_desktop(bounds, region))
                }
                shot => shot,
            },
        };
        shot.map_err(|e| match e {
            CaptureError::Transient { reason } => CaptureError::CaptureFailed { reason },
            other => other,
        })
    }

    fn start(&mut self, callback: FrameCallback) -> Result<()> {
        if self.state.is_active() {
            return Ok(());
        }
        // Reap a worker stopped from its own callback or ended by an error.
        self.stop();
        if self.worker.is_some() {
            return Err(CaptureError::platform("cannot restart from inside the frame callback"));
        }
        validate_region(&self.current_region())?;

        self.state.begin();
        let source = self.source;
        let region = Arc::clone(&self.region);
        let state = Arc::clone(&self.state);
        let config = self.config.clone();
        let name = match source {
            Source::Output(_) => "frametap-dxgi",
            Source::Window(_) => "frametap-gdi",
        };
        let worker = CaptureWorker::spawn(name, Arc::clone(&self.state), move || match source {
            // COM objects are thread-affine: open the duplication on the worker.
            Source::Output(index) => match Duplicator::open(index) {
                Ok(duplicator) => dxgi_loop(duplicator, &region, &state, &callback, config.acquire_timeout_ms),
                Err(e) => match fallback_bounds(index) {
                    Ok(bounds) => {
                        warn!("DXGI unavailable ({e}); polling GDI");
                        gdi_loop(
                            move |r| gdi::capture_desktop(bounds, r),
                            &region,
                            &state,
                            &callback,
                            config.frame_interval(),
                        )
                    }
                    Err(fallback) => error!("DXGI unavailable ({e}) and no GDI fallback: {fallback}"),
                },
            },
            Source::Window(raw) => gdi_loop(
                move |r| gdi::capture_window(raw, r),
                &region,
                &state,
                &callback,
                config.frame_interval(),
            ),
        })?;
        self.worker = Some(worker);
        info!("Windows streaming started ({:?})", self.source);
        Ok(())
    }

    fn stop(&mut self) {
        let Some(worker) = self.worker.as_mut() else { return };
        // The worker notices within one acquire timeout or frame interval.
        self.state.request_stop();
        if worker.join() {
            self.worker = None;
            info!("Windows streaming stopped");
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
        if let Err(e) = validate_region(&region) {
            warn!("Windows set_region({region}) rejected: {e}");
            return;
        }
        *self.region.lock().unwrap_or_else(PoisonError::into_inner) = region;
    }
}

impl Drop for WindowsBackend {
    fn drop(&mut self) {
        self.stop();
    }
}

fn deliver(state: &StreamState, callback: &FrameCallback, image: Image) {
    if image.is_empty() || state.is_paused() {
        return;
    }
    let duration_ms = state.tick();
    callback(&Frame { image, duration_ms });
}

fn dxgi_loop(
    mut duplicator: Duplicator,
    region: &Mutex<Rect>,
    state: &StreamState,
    callback: &FrameCallback,
    timeout_ms: u32,
) {
    while !state.stop_requested() {
        if state.is_paused() {
            state.reset_clock();
            thread::sleep(Duration::from_millis(16));
            continue;
        }
        let crop = *region.lock().unwrap_or_else(PoisonError::into_inner);
        match duplicator.next_frame(timeout_ms, crop) {
            Ok(Some(image)) => deliver(state, callback, image),
            Ok(None) => {}
            Err(e) if e.is_transient() => debug!("DXGI frame dropped: {e}"),
            Err(e) => {
                error!("DXGI capture worker exiting: {e}");
                break;
            }
        }
    }
}

/// Where GDI should read output `index` from when duplication is out.
/// Only the primary screen is known without DXGI.
fn fallback_bounds(index: u32) -> Result<RECT> {
    match dxgi::output_bounds(index) {
        Ok(bounds) => Ok(bounds),
        Err(e @ CaptureError::InvalidTarget { .. }) => Err(e),
        Err(e) if index == 0 => {
            debug!("output bounds unavailable ({e}); using the primary screen");
            gdi::primary_bounds()
        }
        Err(e) => Err(CaptureError::InvalidTarget {
            reason: format!("monitor {index} cannot be located without DXGI: {e}"),
        }),
    }
}

fn gdi_loop<F>(capture: F, region: &Mutex<Rect>, state: &StreamState, callback: &FrameCallback, interval: Duration)
where
    F: Fn(Rect) -> Result<Image>,
{
    while !state.stop_requested() {
        let tick = Instant::now();
        if state.is_paused() {
            state.reset_clock();
            thread::sleep(interval);
            continue;
        }
        let crop = *region.lock().unwrap_or_else(PoisonError::into_inner);
        match capture(crop) {
            Ok(image) => deliver(state, callback, image),
            Err(e) if e.is_transient() => debug!("GDI frame dropped: {e}"),
            Err(e) => {
                error!("GDI capture worker exiting: {e}");
                break;
            }
        }
        if let Some(rest) = interval.checked_sub(tick.elapsed()) {
            thread::sleep(rest);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frametap_core::{Monitor, Window};

    #[test]
    fn negative_monitor_id_is_invalid() {
        let monitor = Monitor { id: -1, name: "x".into(), x: 0, y: 0, width: 1, height: 1, scale: 1.0 };
        let err = WindowsBackend::new(&Target::Monitor(monitor), CaptureConfig::default()).err().unwrap();
        assert!(matches!(err, CaptureError::InvalidTarget { .. }));
    }

    #[test]
    fn stale_window_is_invalid() {
        let window = Window { id: 0, name: "gone".into(), x: 0, y: 0, width: 1, height: 1 };
        let err = WindowsBackend::new(&Target::Window(window), CaptureConfig::default()).err().unwrap();
        assert!(matches!(err, CaptureError::InvalidTarget { .. }));
    }

    #[test]
    fn overflowing_region_fails_on_screenshot() {
        let rect = Rect::new(0.0, 0.0, (usize::MAX / 4 + 1) as f64, 1.0);
        let backend = WindowsBackend::new(&Target::Region(rect), CaptureConfig::default()).unwrap();
        let err = backend.screenshot(Rect::default()).err().unwrap();
        assert!(matches!(err, CaptureError::AllocationOverflow { .. }));
    }

    #[test]
    fn unknown_output_has_no_gdi_fallback() {
        let err = fallback_bounds(u32::MAX).err().unwrap();
        assert!(matches!(err, CaptureError::InvalidTarget { .. }));
    }

    #[test]
    fn region_target_reads_primary_output() {
        let rect = Rect::new(10.0, 10.0, 100.0, 100.0);
        let backend = WindowsBackend::new(&Target::Region(rect), CaptureConfig::default()).unwrap();
        assert_eq!(backend.source, Source::Output(0));
        assert_eq!(backend.current_region(), rect);
    }
}
