use std::os::fd::OwnedFd;
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use frametap_core::{
    validate_region, Backend, CaptureConfig, CaptureError, CaptureWorker, FrameCallback, Image, Rect,
    Result, StreamState, Target,
};
use ashpd::desktop::screencast::SourceType;
use ashpd::enumflags2::BitFlags;
use pipewire as pw;
use tracing::{debug, info, warn};

use super::portal::PortalSession;
use super::stream::{grab_frame, run_stream, Terminate};

/// How long `start` waits for the worker to report its pipeline.
const READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Wayland capture through the ScreenCast portal and a PipeWire stream.
///
/// The portal session is opened on first use and kept until drop, so a
/// restart or a screenshot during streaming does not prompt again.
pub struct WaylandBackend {
    source_types: BitFlags<SourceType>,
    config: CaptureConfig,
    region: Arc<Mutex<Rect>>,
    state: Arc<StreamState>,
    worker: Option<CaptureWorker>,
    terminate: Mutex<Option<pw::channel::Sender<Terminate>>>,
    // Last: the pipeline must be gone before the portal session closes.
    portal: Mutex<Option<PortalSession>>,
}

impl WaylandBackend {
    pub fn new(target: &Target, config: CaptureConfig) -> Result<Self> {
        let source_types = match target {
            Target::Window(_) => BitFlags::from(SourceType::Window),
            Target::Monitor(_) | Target::Region(_) => BitFlags::from(SourceType::Monitor),
            Target::Screen => SourceType::Monitor | SourceType::Window,
        };
        let region = target.region();
        debug!("Wayland backend for {:?} (source types {:?})", target, source_types);
        Ok(Self {
            source_types,
            config,
            region: Arc::new(Mutex::new(region)),
            state: StreamState::new(),
            worker: None,
            terminate: Mutex::new(None),
            portal: Mutex::new(None),
        })
    }

    /// PipeWire remote and node of the portal session, opening it first if
    /// needed. Blocks on the picker dialog the first time.
    fn portal_handles(&self) -> Result<(OwnedFd, u32)> {
        let mut portal = self.portal.lock().unwrap_or_else(PoisonError::into_inner);
        if portal.is_none() {
            *portal = Some(PortalSession::open(self.source_types, &self.config)?);
        }
        match portal.as_ref() {
            Some(session) => Ok((session.remote_fd()?, session.node_id())),
            None => Err(CaptureError::platform("portal session unavailable")),
        }
    }

    fn region(&self) -> MutexGuard<'_, Rect> {
        self.region.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Backend for WaylandBackend {
    fn screenshot(&self, region: Rect) -> Result<Image> {
        let region = if region.is_empty() { *self.region() } else { region };
        validate_region(&region)?;
        let (fd, node_id) = self.portal_handles()?;
        grab_frame(fd, node_id, region, self.config.screenshot_timeout())
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
        validate_region(&self.region())?;
        let (fd, node_id) = self.portal_handles()?;

        self.state.begin();
        let (terminate_tx, terminate_rx) = pw::channel::channel::<Terminate>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let region = Arc::clone(&self.region);
        let state = Arc::clone(&self.state);
        let mut worker = CaptureWorker::spawn("frametap-pipewire", Arc::clone(&self.state), move || {
            run_stream(fd, node_id, region, state, callback, terminate_rx, ready_tx)
        })?;

        let ready = ready_rx
            .recv_timeout(READY_TIMEOUT)
            .unwrap_or_else(|_| Err(CaptureError::platform("PipeWire worker did not come up")));
        if let Err(e) = ready {
            self.state.request_stop();
            let _ = terminate_tx.send(Terminate);
            worker.join();
            return Err(e);
        }

        *self.terminate.lock().unwrap_or_else(PoisonError::into_inner) = Some(terminate_tx);
        self.worker = Some(worker);
        info!("Wayland streaming from PipeWire node {}", node_id);
        Ok(())
    }

    fn stop(&mut self) {
        let Some(worker) = self.worker.as_mut() else { return };
        self.state.request_stop();
        if let Some(terminate) = self.terminate.lock().unwrap_or_else(PoisonError::into_inner).take() {
            // The loop may already be gone after a stream error.
            if terminate.send(Terminate).is_err() {
                debug!("PipeWire loop already exited");
            }
        }
        if worker.join() {
            self.worker = None;
            info!("Wayland streaming stopped");
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
            warn!("Wayland set_region({region}) rejected: {e}");
            return;
        }
        *self.region() = region;
    }
}

impl Drop for WaylandBackend {
    fn drop(&mut self) {
        self.stop();
    }
}
