use std::ffi::CString;
use std::mem::MaybeUninit;
use std::ptr::{self, NonNull};

use ::x11::xlib;
use frametap_core::{CaptureError, Result};

use super::ffi;
use super::trap::{self, XErrorCode};

/// Owned Xlib connection, closed on drop.
pub(crate) struct XDisplay {
    ptr: NonNull<xlib::Display>,
}

// Xlib connections are not thread-safe, but an XDisplay is only ever used
// by one thread at a time: it lives behind the capturer mutex or on the
// stack of the function that opened it.
unsafe impl Send for XDisplay {}

impl XDisplay {
    pub(crate) fn open() -> Result<Self> {
        trap::install();
        let raw = unsafe { xlib::XOpenDisplay(ptr::null()) };
        NonNull::new(raw).map(|ptr| Self { ptr }).ok_or_else(|| {
            CaptureError::platform(
                "failed to open X11 display; check that $DISPLAY is set and \
                 X11 authorization (xauth) allows connections",
            )
        })
    }

    pub(crate) fn raw(&self) -> *mut xlib::Display {
        self.ptr.as_ptr()
    }

    fn screen(&self) -> i32 {
        unsafe { xlib::XDefaultScreen(self.raw()) }
    }

    pub(crate) fn root(&self) -> xlib::Window {
        unsafe { xlib::XDefaultRootWindow(self.raw()) }
    }

    pub(crate) fn size(&self) -> (u32, u32) {
        let screen = self.screen();
        unsafe {
            (
                xlib::XDisplayWidth(self.raw(), screen).max(0) as u32,
                xlib::XDisplayHeight(self.raw(), screen).max(0) as u32,
            )
        }
    }

    pub(crate) fn default_visual(&self) -> *mut xlib::Visual {
        unsafe { xlib::XDefaultVisual(self.raw(), self.screen()) }
    }

    pub(crate) fn default_depth(&self) -> u32 {
        unsafe { xlib::XDefaultDepth(self.raw(), self.screen()).max(0) as u32 }
    }

    pub(crate) fn has_shm(&self) -> bool {
        unsafe { ffi::XShmQueryExtension(self.raw()) != 0 }
    }

    /// Run an Xlib call with error trapping; see [`trap::trapped`].
    pub(crate) fn trap<T>(&self, call: impl FnOnce(*mut xlib::Display) -> T) -> Result<T, XErrorCode> {
        let raw = self.raw();
        unsafe { trap::trapped(raw, || call(raw)) }
    }

    /// Attributes of `window`, or the X error raised for a stale id.
    pub(crate) fn window_attributes(&self, window: xlib::Window) -> Result<xlib::XWindowAttributes, XErrorCode> {
        let mut attrs = MaybeUninit::<xlib::XWindowAttributes>::zeroed();
        let status = self.trap(|d| unsafe { xlib::XGetWindowAttributes(d, window, attrs.as_mut_ptr()) })?;
        if status == 0 {
            return Err(XErrorCode(xlib::BadWindow));
        }
        Ok(unsafe { attrs.assume_init() })
    }

    /// Existing atom named `name`, or `None` if the server never interned it.
    pub(crate) fn atom(&self, name: &str) -> Option<xlib::Atom> {
        let name = CString::new(name).ok()?;
        let atom = unsafe { xlib::XInternAtom(self.raw(), name.as_ptr(), xlib::True) };
        (atom != 0).then_some(atom)
    }
}

impl Drop for XDisplay {
    fn drop(&mut self) {
        unsafe {
            xlib::XCloseDisplay(self.raw());
        }
    }
}
