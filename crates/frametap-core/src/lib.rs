//! frametap-core — platform-independent pieces shared by every capture backend.
//!
//! Contains the data model ([`Rect`], [`Monitor`], [`Window`], [`Image`],
//! [`Frame`]), the error taxonomy, the pixel and region utilities, the
//! [`Backend`] contract that each platform crate implements, and the
//! streaming plumbing (pause flag, stop token, duration baseline, worker
//! thread handle) that keeps the session lifecycle identical across them.

pub mod backend;
pub mod config;
pub mod errors;
pub mod pixel;
pub mod queue;
pub mod region;
pub mod session;
pub mod types;

pub use backend::{Backend, FrameCallback};
pub use config::{CaptureConfig, CursorMode};
pub use errors::{CaptureError, Result};
pub use pixel::{checked_rgba_size, crop_rgba};
pub use queue::FrameQueue;
pub use region::{clamp_to_surface, validate_region, CaptureArea};
pub use session::{CaptureWorker, FrameClock, StreamState};
pub use types::*;
