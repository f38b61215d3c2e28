use std::sync::Arc;

use crate::errors::Result;
use crate::types::{Frame, Image, Rect};

/// User frame callback. Runs on the capture worker, one frame at a time.
///
/// Shared rather than boxed so a stopped session can be started again.
pub type FrameCallback = Arc<dyn Fn(&Frame) + Send + Sync + 'static>;

/// What every platform capture stack provides.
///
/// All methods may be called from any thread except the capture worker.
/// `stop` from the worker (i.e. from inside the frame callback) only raises
/// the stop token; see [`crate::CaptureWorker::join`].
pub trait Backend: Send + Sync {
    /// One RGBA image of the target, cropped by `region` when non-empty,
    /// else by the session region. Blocks until a frame or a timeout.
    fn screenshot(&self, region: Rect) -> Result<Image>;

    /// Acquire platform resources and deliver frames to `callback` on a
    /// dedicated worker until [`Backend::stop`]. A no-op while a worker is
    /// active; a worker that was stopped from its callback or died on an
    /// error is joined and replaced.
    fn start(&mut self, callback: FrameCallback) -> Result<()>;

    /// Wake and join the worker, then release platform resources. Idempotent.
    fn stop(&mut self);

    /// A worker is delivering frames and has not been asked to stop.
    fn is_running(&self) -> bool;

    fn pause(&self);
    fn resume(&self);
    fn is_paused(&self) -> bool;

    /// Honored by frames acquired after the call returns.
    fn set_region(&self, region: Rect);
}
