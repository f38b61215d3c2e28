use std::ptr::{self, NonNull};

use ::x11::xlib;
use tracing::{debug, warn};

use super::display::XDisplay;
use super::ffi::{self, XShmSegmentInfo};
use super::trap::XErrorCode;

/// A shared-memory `XImage` reused for every frame of one capture size.
///
/// The segment is marked `IPC_RMID` right after the server attaches, so the
/// kernel frees it once both sides detach even if this process crashes.
///
/// Must be dropped before the `XDisplay` it was created on.
pub(crate) struct ShmImage {
    display: *mut xlib::Display,
    image: NonNull<xlib::XImage>,
    // Boxed: the XImage keeps a pointer to it.
    info: Box<XShmSegmentInfo>,
    width: u32,
    height: u32,
}

// Owned alongside its XDisplay and used under the same lock.
unsafe impl Send for ShmImage {}

impl ShmImage {
    /// Allocate and attach a segment for `width x height`. `None` when the
    /// server refuses (remote display, SHM disabled); callers fall back to
    /// `XGetImage`.
    pub(crate) fn create(display: &XDisplay, width: u32, height: u32) -> Option<Self> {
        let mut info = Box::<XShmSegmentInfo>::default();
        let raw = unsafe {
            ffi::XShmCreateImage(
                display.raw(),
                display.default_visual(),
                display.default_depth(),
                xlib::ZPixmap,
                ptr::null_mut(),
                &mut *info,
                width,
                height,
            )
        };
        let image = NonNull::new(raw)?;
        let destroy_image = || unsafe {
            xlib::XDestroyImage(image.as_ptr());
        };

        let bytes_per_line = unsafe { image.as_ref().bytes_per_line }.max(0) as usize;
        let Some(size) = bytes_per_line.checked_mul(height as usize) else {
            destroy_image();
            return None;
        };

        info.shmid = unsafe { libc::shmget(libc::IPC_PRIVATE, size, libc::IPC_CREAT | 0o600) };
        if info.shmid < 0 {
            warn!("shmget({} bytes) failed: {}", size, std::io::Error::last_os_error());
            destroy_image();
            return None;
        }

        let addr = unsafe { libc::shmat(info.shmid, ptr::null(), 0) };
        // shmat reports failure as (void*)-1, not NULL.
        if addr as isize == -1 {
            warn!("shmat failed: {}", std::io::Error::last_os_error());
            unsafe { libc::shmctl(info.shmid, libc::IPC_RMID, ptr::null_mut()) };
            destroy_image();
            return None;
        }
        info.shmaddr = addr.cast();
        info.read_only = xlib::False;
        unsafe { (*image.as_ptr()).data = info.shmaddr };

        let info_ptr: *mut XShmSegmentInfo = &mut *info;
        let attached = display.trap(|d| unsafe { ffi::XShmAttach(d, info_ptr) });
        unsafe { libc::shmctl(info.shmid, libc::IPC_RMID, ptr::null_mut()) };

        if !matches!(attached, Ok(status) if status != 0) {
            warn!("XShmAttach refused, falling back to XGetImage");
            unsafe {
                (*image.as_ptr()).data = ptr::null_mut();
                xlib::XDestroyImage(image.as_ptr());
                libc::shmdt(info.shmaddr as *const _);
            }
            return None;
        }

        debug!("SHM segment {} attached for {}x{}", info.shmid, width, height);
        Some(Self { display: display.raw(), image, info, width, height })
    }

    pub(crate) fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Fill the segment from `drawable` at `(x, y)`.
    pub(crate) fn capture(&mut self, display: &XDisplay, drawable: xlib::Drawable, x: i32, y: i32) -> Result<(), XErrorCode> {
        let image = self.image.as_ptr();
        let status = display.trap(|d| unsafe { ffi::XShmGetImage(d, drawable, image, x, y, xlib::XAllPlanes()) })?;
        if status == 0 {
            return Err(XErrorCode(xlib::BadMatch));
        }
        Ok(())
    }

    pub(crate) fn image(&self) -> &xlib::XImage {
        unsafe { self.image.as_ref() }
    }
}

impl Drop for ShmImage {
    fn drop(&mut self) {
        unsafe {
            ffi::XShmDetach(self.display, &mut *self.info);
            xlib::XSync(self.display, xlib::False);
            // The pixels belong to the segment, not to Xlib's allocator.
            (*self.image.as_ptr()).data = ptr::null_mut();
            xlib::XDestroyImage(self.image.as_ptr());
            libc::shmdt(self.info.shmaddr as *const _);
        }
        debug!("SHM segment {} detached", self.info.shmid);
    }
}
