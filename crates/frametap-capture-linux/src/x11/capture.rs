use ::x11::xlib;
use frametap_core::{clamp_to_surface, CaptureArea, CaptureError, Image, Rect, Result};
use tracing::debug;

use super::display::XDisplay;
use super::image::{self, OwnedXImage};
use super::shm::ShmImage;

/// What an X11 session reads pixels from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Drawable {
    Root,
    Window(xlib::Window),
}

/// One X connection plus everything needed to grab frames from it.
///
/// Field order matters: the SHM segment must be released before the
/// connection it was attached on.
pub(crate) struct Capturer {
    shm: Option<ShmImage>,
    display: XDisplay,
    source: Drawable,
    use_shm: bool,
    pub(crate) region: Rect,
    area: CaptureArea,
}

impl Capturer {
    pub(crate) fn open(source: Drawable, region: Rect) -> Result<Self> {
        let display = XDisplay::open()?;
        let use_shm = display.has_shm();
        if !use_shm {
            debug!("MIT-SHM unavailable, using XGetImage");
        }
        Ok(Self { shm: None, display, source, use_shm, region, area: CaptureArea::default() })
    }

    fn drawable(&self) -> xlib::Drawable {
        match self.source {
            Drawable::Root => self.display.root(),
            Drawable::Window(id) => id,
        }
    }

    /// Size of the surface regions are clamped against.
    pub(crate) fn surface_size(&self) -> Result<(u32, u32)> {
        match self.source {
            Drawable::Root => Ok(self.display.size()),
            Drawable::Window(id) => {
                let attrs = self.display.window_attributes(id).map_err(|code| CaptureError::InvalidTarget {
                    reason: format!("window 0x{id:x} is not resolvable ({code}); it may have been closed"),
                })?;
                Ok((attrs.width.max(0) as u32, attrs.height.max(0) as u32))
            }
        }
    }

    /// Recompute the capture area from the region and the current surface
    /// size, reallocating the SHM segment if the size changed.
    pub(crate) fn resolve_area(&mut self) -> Result<CaptureArea> {
        let (width, height) = self.surface_size()?;
        let area = clamp_to_surface(self.region, width, height)?;
        if area != self.area {
            debug!("X11 capture area {} on {}x{} surface", area, width, height);
        }
        self.area = area;

        let wanted = (area.width, area.height);
        let stale = self.shm.as_ref().is_some_and(|shm| shm.size() != wanted);
        if stale || area.is_empty() {
            self.shm = None;
        }
        if self.use_shm && self.shm.is_none() && !area.is_empty() {
            self.shm = ShmImage::create(&self.display, area.width, area.height);
            if self.shm.is_none() {
                self.use_shm = false;
            }
        }
        Ok(area)
    }

    /// Drop the SHM segment; the next `resolve_area` recreates it.
    pub(crate) fn release_shm(&mut self) {
        self.shm = None;
    }

    /// Grab one frame of the resolved area. X errors come back as
    /// `Transient`.
    pub(crate) fn grab(&mut self) -> Result<Image> {
        let area = self.area;
        if area.is_empty() {
            return Ok(Image::empty());
        }
        let drawable = self.drawable();
        let (x, y) = (area.x as i32, area.y as i32);

        if let Some(shm) = self.shm.as_mut() {
            shm.capture(&self.display, drawable, x, y)
                .map_err(|code| CaptureError::transient(format!("XShmGetImage: {code}")))?;
            return unsafe { image::to_rgba(shm.image(), area.width, area.height) };
        }
        self.grab_with_get_image(drawable, area)
    }

    fn grab_with_get_image(&self, drawable: xlib::Drawable, area: CaptureArea) -> Result<Image> {
        let raw = self
            .display
            .trap(|d| unsafe {
                xlib::XGetImage(
                    d,
                    drawable,
                    area.x as i32,
                    area.y as i32,
                    area.width,
                    area.height,
                    xlib::XAllPlanes(),
                    xlib::ZPixmap,
                )
            })
            .map_err(|code| CaptureError::transient(format!("XGetImage: {code}")))?;
        let ximage = OwnedXImage::new(raw).ok_or_else(|| CaptureError::transient("XGetImage returned no image"))?;
        unsafe { image::to_rgba(ximage.get(), area.width, area.height) }
    }

    /// One-shot capture: SHM first, `XGetImage` if that fails.
    pub(crate) fn grab_once(&mut self) -> Result<Image> {
        match self.grab() {
            Err(e) if e.is_transient() && self.shm.is_some() => {
                debug!("SHM grab failed ({e}), retrying with XGetImage");
                self.shm = None;
                self.grab_with_get_image(self.drawable(), self.area)
            }
            other => other,
        }
    }
}
