//! Wayland capture through `xdg-desktop-portal` and PipeWire.
//!
//! ```text
//! session bus ──► ScreenCast portal ──► picker dialog (user)
//!                      │ OpenPipeWireRemote
//!                      ▼
//!               PipeWire fd + node id          (kept until the backend drops)
//!                      │ connect_fd
//!                      ▼
//! worker: MainLoop ─► Stream(node) ─► param_changed: remember format
//!                                 └─► process: dequeue ─► crop ─► RGBA ─► callback
//! ```

mod backend;
mod enumerate;
mod portal;
mod stream;

pub use backend::WaylandBackend;
pub use enumerate::{monitors, windows};

pub(crate) use portal::screencast_available;
