use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use frametap_core::{
    validate_region, Backend, CaptureConfig, CaptureError, CaptureWorker, Frame, FrameCallback, Image,
    Rect, Result, StreamState, Target,
};
use tracing::{debug, error, info, warn};

use super::capture::{Capturer, Drawable};

/// X11 capture over MIT-SHM, polled at `frame_interval_ms`.
pub struct X11Backend {
    source: Drawable,
    // Also guards the SHM segment, so set_region cannot resize it mid-read.
    capturer: Arc<Mutex<Capturer>>,
    state: Arc<StreamState>,
    worker: Option<CaptureWorker>,
    config: CaptureConfig,
}

impl X11Backend {
    pub fn new(target: &Target, config: CaptureConfig) -> Result<Self> {
        let (source, region) = match target {
            Target::Screen => (Drawable::Root, Rect::default()),
            Target::Region(rect) => (Drawable::Root, *rect),
            Target::Monitor(monitor) => (Drawable::Root, monitor.bounds()),
            Target::Window(window) => (Drawable::Window(window.id as ::x11::xlib::Window), Rect::default()),
        };
        let capturer = Capturer::open(source, region)?;
        if let Drawable::Window(_) = source {
            // Fail construction on a stale id rather than on first frame.
            capturer.surface_size()?;
        }
        info!("X11 backend ready ({:?})", source);
        Ok(Self {
            source,
            capturer: Arc::new(Mutex::new(capturer)),
            state: StreamState::new(),
            worker: None,
            config,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Capturer> {
        self.capturer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Backend for X11Backend {
    fn screenshot(&self, region: Rect) -> Result<Image> {
        let region = if region.is_empty() { self.lock().region } else { region };
        // Own connection: never contends with the streaming worker.
        let mut shot = Capturer::open(self.source, region)?;
        shot.resolve_area()?;
        shot.grab_once().map_err(|e| match e {
            CaptureError::Transient { reason } => CaptureError::CaptureFailed {
                reason: format!(
                    "{reason}; the window may have been closed or the region is outside the screen"
                ),
            },
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
        let area = self.lock().resolve_area()?;
        info!("X11 streaming {} every {}ms", area, self.config.frame_interval_ms);

        self.state.begin();
        let capturer = Arc::clone(&self.capturer);
        let state = Arc::clone(&self.state);
        let interval = self.config.frame_interval();
        let worker = CaptureWorker::spawn("frametap-x11", Arc::clone(&self.state), move || {
            capture_loop(&capturer, &state, &callback, interval)
        });
        match worker {
            Ok(worker) => {
                self.worker = Some(worker);
                Ok(())
            }
            Err(e) => {
                self.lock().release_shm();
                Err(e)
            }
        }
    }

    fn stop(&mut self) {
        let Some(worker) = self.worker.as_mut() else { return };
        self.state.request_stop();
        if worker.join() {
            self.worker = None;
            self.lock().release_shm();
            info!("X11 streaming stopped");
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
            warn!("X11 set_region({region}) rejected: {e}");
            return;
        }
        let mut capturer = self.lock();
        capturer.region = region;
        if self.state.is_running() {
            if let Err(e) = capturer.resolve_area() {
                warn!("X11 set_region({region}) not applied: {e}");
            }
        }
    }
}

impl Drop for X11Backend {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_loop(
    capturer: &Mutex<Capturer>,
    state: &StreamState,
    callback: &FrameCallback,
    interval: Duration,
) {
    while !state.stop_requested() {
        let tick = Instant::now();
        if state.is_paused() {
            state.reset_clock();
            thread::sleep(interval);
            continue;
        }

        let grabbed = capturer.lock().unwrap_or_else(PoisonError::into_inner).grab();
        match grabbed {
            Ok(image) if !image.is_empty() && !state.is_paused() => {
                let duration_ms = state.tick();
                callback(&Frame { image, duration_ms });
            }
            Ok(_) => {}
            Err(e) if e.is_transient() => debug!("X11 frame dropped: {e}"),
            Err(e) => {
                error!("X11 capture worker exiting: {e}");
                break;
            }
        }

        if let Some(rest) = interval.checked_sub(tick.elapsed()) {
            thread::sleep(rest);
        }
    }
}
