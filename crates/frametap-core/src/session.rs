//! Streaming plumbing shared by all backends.
//!
//! ```text
//!  caller thread                         capture worker
//!  ─────────────                         ──────────────
//!  start ─► StreamState::begin ─► spawn ─► loop {
//!  pause/resume ─► atomics ◄──────────────    is_paused? drop frame
//!                                             acquire ─► tick ─► callback
//!  stop ─► request_stop ─► wake ─► join ◄─  } StreamState::finish
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{debug, error, warn};

use crate::errors::{CaptureError, Result};

// ── FrameClock ────────────────────────────────────────────────────────────────

/// Wall-clock baseline for `Frame::duration_ms`.
#[derive(Debug, Default)]
pub struct FrameClock {
    last: Option<Instant>,
}

impl FrameClock {
    /// The next tick reports 0.
    pub fn reset(&mut self) {
        self.last = None;
    }

    /// Milliseconds since the previous tick.
    pub fn tick(&mut self) -> f64 {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> f64 {
        let elapsed = self
            .last
            .map(|prev| now.saturating_duration_since(prev).as_secs_f64() * 1000.0)
            .unwrap_or(0.0);
        self.last = Some(now);
        elapsed
    }
}

// ── StreamState ───────────────────────────────────────────────────────────────

/// Flags shared between a backend and its capture worker.
///
/// The pause flag is read on every worker iteration without locking; only
/// the duration baseline sits behind a mutex.
#[derive(Debug, Default)]
pub struct StreamState {
    stop: AtomicBool,
    paused: AtomicBool,
    running: AtomicBool,
    clock: Mutex<FrameClock>,
}

impl StreamState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Arm for a fresh run: not stopped, not paused, zero baseline.
    pub fn begin(&self) {
        self.stop.store(false, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        self.reset_clock();
        self.running.store(true, Ordering::SeqCst);
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// True between `begin` and the worker exiting.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Running and not asked to stop. A worker that is winding down after
    /// `request_stop` no longer counts.
    pub fn is_active(&self) -> bool {
        self.is_running() && !self.stop_requested()
    }

    /// No-op unless a worker is running.
    pub fn pause(&self) {
        if self.is_running() {
            self.paused.store(true, Ordering::SeqCst);
        }
    }

    /// No-op unless a worker is running. Resets the duration baseline.
    pub fn resume(&self) {
        if self.is_running() && self.is_paused() {
            // Baseline first: the worker may deliver as soon as the flag drops.
            self.reset_clock();
            self.paused.store(false, Ordering::SeqCst);
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Duration to stamp on the frame about to be delivered.
    pub fn tick(&self) -> f64 {
        self.clock.lock().unwrap_or_else(PoisonError::into_inner).tick()
    }

    pub fn reset_clock(&self) {
        self.clock.lock().unwrap_or_else(PoisonError::into_inner).reset();
    }

    fn finish(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

// ── CaptureWorker ─────────────────────────────────────────────────────────────

/// Marks the stream finished however the worker body exits, panics included.
struct FinishGuard(Arc<StreamState>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.finish();
    }
}

/// Handle to the one capture thread a session owns.
#[derive(Debug)]
pub struct CaptureWorker {
    handle: Option<JoinHandle<()>>,
}

impl CaptureWorker {
    /// Spawn `body` on a named thread. `state` must already be armed with
    /// [`StreamState::begin`]; it is marked finished when `body` returns.
    pub fn spawn<F>(name: &str, state: Arc<StreamState>, body: F) -> Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                let _finish = FinishGuard(state);
                body();
            })
            .map_err(|e| CaptureError::platform(format!("spawning {name} worker: {e}")))?;
        debug!("{} worker spawned", name);
        Ok(Self { handle: Some(handle) })
    }

    /// True when called from the worker thread itself.
    pub fn is_current(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|h| h.thread().id() == thread::current().id())
    }

    /// Join the worker. The caller must have raised the stop token and woken
    /// the worker's event source first.
    ///
    /// Called from the worker itself (a frame callback calling `stop`), the
    /// join is deferred: returns `false` and keeps the handle so the owner's
    /// next `stop` or drop joins it.
    pub fn join(&mut self) -> bool {
        if self.is_current() {
            warn!("stop() called from the frame callback; worker exits after the callback returns");
            return false;
        }
        if let Some(handle) = self.handle.take() {
            let name = handle.thread().name().unwrap_or("capture").to_owned();
            if handle.join().is_err() {
                error!("{} worker panicked", name);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn clock_reports_zero_then_elapsed() {
        let mut clock = FrameClock::default();
        let t0 = Instant::now();
        assert_eq!(clock.tick_at(t0), 0.0);
        let d = clock.tick_at(t0 + Duration::from_millis(16));
        assert!((d - 16.0).abs() < 1e-6);
        clock.reset();
        assert_eq!(clock.tick_at(t0 + Duration::from_millis(40)), 0.0);
    }

    #[test]
    fn pause_is_a_no_op_before_begin() {
        let state = StreamState::new();
        state.pause();
        assert!(!state.is_paused());
    }

    #[test]
    fn pause_and_resume_are_idempotent() {
        let state = StreamState::new();
        state.begin();
        state.pause();
        state.pause();
        assert!(state.is_paused());
        state.resume();
        state.resume();
        assert!(!state.is_paused());
    }

    #[test]
    fn resume_resets_duration_baseline() {
        let state = StreamState::new();
        state.begin();
        state.tick();
        thread::sleep(Duration::from_millis(5));
        state.pause();
        state.resume();
        assert_eq!(state.tick(), 0.0);
    }

    #[test]
    fn stop_request_ends_activity_before_the_worker_exits() {
        let state = StreamState::new();
        assert!(!state.is_active());
        state.begin();
        assert!(state.is_active());
        state.request_stop();
        assert!(state.is_running());
        assert!(!state.is_active());
        state.begin();
        assert!(state.is_active());
    }

    #[test]
    fn begin_clears_previous_pause() {
        let state = StreamState::new();
        state.begin();
        state.pause();
        state.begin();
        assert!(!state.is_paused());
    }

    #[test]
    fn worker_finishes_state_on_exit() {
        let state = StreamState::new();
        state.begin();
        let body_state = Arc::clone(&state);
        let mut worker = CaptureWorker::spawn("test", Arc::clone(&state), move || {
            while !body_state.stop_requested() {
                thread::sleep(Duration::from_millis(1));
            }
        })
        .unwrap();
        assert!(state.is_running());
        state.request_stop();
        assert!(worker.join());
        assert!(!state.is_running());

        // Finished stream ignores pause.
        state.pause();
        assert!(!state.is_paused());
        // Second join is a no-op.
        assert!(worker.join());
    }

    #[test]
    fn join_from_the_worker_is_deferred() {
        let state = StreamState::new();
        state.begin();
        let (handle_tx, handle_rx) = mpsc::channel::<Arc<Mutex<CaptureWorker>>>();
        let (result_tx, result_rx) = mpsc::channel();
        let worker = CaptureWorker::spawn("self-join", Arc::clone(&state), move || {
            let me = handle_rx.recv().unwrap();
            let joined = me.lock().unwrap().join();
            result_tx.send(joined).unwrap();
        })
        .unwrap();
        let worker = Arc::new(Mutex::new(worker));
        handle_tx.send(Arc::clone(&worker)).unwrap();

        assert!(!result_rx.recv_timeout(Duration::from_secs(5)).unwrap());
        assert!(worker.lock().unwrap().join());
        assert!(!state.is_running());
    }
}
