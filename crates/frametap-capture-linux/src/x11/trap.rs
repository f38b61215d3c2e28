//! Non-fatal X error handling.
//!
//! Xlib's default handler prints and calls `exit()`, which would take the
//! host application down whenever a captured window disappears. One
//! process-wide handler is installed instead; it parks the error code in a
//! thread-local slot read back by [`trapped`].

use std::cell::Cell;
use std::os::raw::c_int;
use std::sync::Once;

use ::x11::xlib;

static INSTALL: Once = Once::new();

thread_local! {
    static LAST_ERROR: Cell<u8> = const { Cell::new(0) };
}

unsafe extern "C" fn record_error(_display: *mut xlib::Display, event: *mut xlib::XErrorEvent) -> c_int {
    if let Some(event) = event.as_ref() {
        LAST_ERROR.with(|slot| slot.set(event.error_code));
    }
    0
}

/// Install the handler. Cheap after the first call.
pub(crate) fn install() {
    INSTALL.call_once(|| unsafe {
        xlib::XSetErrorHandler(Some(record_error));
    });
}

/// An X protocol error code (`BadWindow`, `BadMatch`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct XErrorCode(pub u8);

impl std::fmt::Display for XErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self.0 {
            xlib::BadRequest => "BadRequest",
            xlib::BadValue => "BadValue",
            xlib::BadWindow => "BadWindow",
            xlib::BadMatch => "BadMatch",
            xlib::BadDrawable => "BadDrawable",
            xlib::BadAccess => "BadAccess",
            xlib::BadAlloc => "BadAlloc",
            _ => return write!(f, "X error {}", self.0),
        };
        f.write_str(name)
    }
}

/// Run `call`, flush it with `XSync`, and report any error it raised.
///
/// # Safety
/// `display` must be a live connection used by this thread only for the
/// duration of the call.
pub(crate) unsafe fn trapped<T>(
    display: *mut xlib::Display,
    call: impl FnOnce() -> T,
) -> Result<T, XErrorCode> {
    install();
    LAST_ERROR.with(|slot| slot.set(0));
    let value = call();
    xlib::XSync(display, xlib::False);
    match LAST_ERROR.with(|slot| slot.replace(0)) {
        0 => Ok(value),
        code => Err(XErrorCode(code)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_have_names() {
        assert_eq!(XErrorCode(xlib::BadWindow).to_string(), "BadWindow");
        assert_eq!(XErrorCode(xlib::BadDrawable).to_string(), "BadDrawable");
        assert_eq!(XErrorCode(200).to_string(), "X error 200");
    }

    #[test]
    fn handler_records_into_this_thread_only() {
        let mut event: xlib::XErrorEvent = unsafe { std::mem::zeroed() };
        event.error_code = xlib::BadMatch;
        unsafe { record_error(std::ptr::null_mut(), &mut event) };
        let other = std::thread::spawn(|| LAST_ERROR.with(|s| s.get())).join().unwrap();
        assert_eq!(other, 0);
        assert_eq!(LAST_ERROR.with(|s| s.replace(0)), xlib::BadMatch);
    }
}
