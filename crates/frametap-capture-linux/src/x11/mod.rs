//! X11 capture via MIT-SHM, with an `XGetImage` fallback.
//!
//! ```text
//! XOpenDisplay ──► root window / client window
//!      │  XShmQueryExtension
//!      ▼
//! shmget ─► shmat ─► XShmAttach ─► IPC_RMID     (once per capture size)
//!      │
//!      ▼  every frame_interval_ms, under the capturer lock
//! XShmGetImage ─► XSync ─► error slot ─► BGRx → RGBA ─► callback
//! ```

mod backend;
mod capture;
mod display;
mod enumerate;
mod ffi;
mod image;
mod shm;
mod trap;

pub use backend::X11Backend;
pub use enumerate::{monitors, windows};

/// True when an X connection can be opened with the current `$DISPLAY`.
pub(crate) fn can_connect() -> bool {
    display::XDisplay::open().is_ok()
}
