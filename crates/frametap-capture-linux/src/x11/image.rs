use std::ptr::NonNull;

use ::x11::xlib;
use frametap_core::pixel::{copy_plane, SourceLayout};
use frametap_core::{CaptureArea, CaptureError, Image, Result};

/// The parts of an `XImage` header that decide how its bytes are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct XImageLayout {
    pub bits_per_pixel: i32,
    pub bytes_per_line: i32,
    pub byte_order: i32,
    pub depth: i32,
}

impl XImageLayout {
    fn of(image: &xlib::XImage) -> Self {
        Self {
            bits_per_pixel: image.bits_per_pixel,
            bytes_per_line: image.bytes_per_line,
            byte_order: image.byte_order,
            depth: image.depth,
        }
    }

    /// Source byte order of the pixels. Only 32-bpp ZPixmaps are handled,
    /// which is what every TrueColor server hands out.
    pub(crate) fn source_layout(&self) -> Result<SourceLayout> {
        if self.bits_per_pixel != 32 {
            return Err(CaptureError::CaptureFailed {
                reason: format!("unsupported X image format: {} bits per pixel", self.bits_per_pixel),
            });
        }
        let opaque = self.depth <= 24;
        Ok(match (self.byte_order == xlib::LSBFirst, opaque) {
            (true, true) => SourceLayout::Bgrx,
            (true, false) => SourceLayout::Bgra,
            (false, true) => SourceLayout::Xrgb,
            (false, false) => SourceLayout::Argb,
        })
    }
}

/// Convert the top-left `width x height` pixels of `image` to RGBA.
///
/// # Safety
/// `image.data` must point at `bytes_per_line * height` readable bytes.
pub(crate) unsafe fn to_rgba(image: &xlib::XImage, width: u32, height: u32) -> Result<Image> {
    let layout = XImageLayout::of(image);
    let source = layout.source_layout()?;
    if image.data.is_null() || layout.bytes_per_line <= 0 {
        return Err(CaptureError::transient("X image has no pixel data"));
    }
    let stride = layout.bytes_per_line as usize;
    let len = stride * height as usize;
    let bytes = std::slice::from_raw_parts(image.data as *const u8, len);
    copy_plane(bytes, stride, CaptureArea::full(width, height), source)
}

/// An `XImage` allocated by `XGetImage`, destroyed on drop.
pub(crate) struct OwnedXImage(NonNull<xlib::XImage>);

impl OwnedXImage {
    pub(crate) fn new(raw: *mut xlib::XImage) -> Option<Self> {
        NonNull::new(raw).map(Self)
    }

    pub(crate) fn get(&self) -> &xlib::XImage {
        unsafe { self.0.as_ref() }
    }
}

impl Drop for OwnedXImage {
    fn drop(&mut self) {
        unsafe {
            xlib::XDestroyImage(self.0.as_ptr());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(byte_order: i32, depth: i32) -> XImageLayout {
        XImageLayout { bits_per_pixel: 32, bytes_per_line: 4, byte_order, depth }
    }

    #[test]
    fn lsb_first_is_bgra() {
        assert_eq!(layout(xlib::LSBFirst, 24).source_layout().unwrap(), SourceLayout::Bgrx);
        assert_eq!(layout(xlib::LSBFirst, 32).source_layout().unwrap(), SourceLayout::Bgra);
    }

    #[test]
    fn msb_first_is_argb() {
        assert_eq!(layout(xlib::MSBFirst, 24).source_layout().unwrap(), SourceLayout::Xrgb);
        assert_eq!(layout(xlib::MSBFirst, 32).source_layout().unwrap(), SourceLayout::Argb);
    }

    #[test]
    fn sixteen_bit_is_rejected() {
        let l = XImageLayout { bits_per_pixel: 16, bytes_per_line: 2, byte_order: xlib::LSBFirst, depth: 16 };
        assert!(matches!(l.source_layout(), Err(CaptureError::CaptureFailed { .. })));
    }

    #[test]
    fn converts_padded_depth_24_image() {
        // 2x1 image, BGRx with garbage padding byte, 4 bytes of row padding.
        let mut bytes = vec![10u8, 20, 30, 0, 40, 50, 60, 7, 0, 0, 0, 0];
        let mut image: xlib::XImage = unsafe { std::mem::zeroed() };
        image.bits_per_pixel = 32;
        image.bytes_per_line = 12;
        image.byte_order = xlib::LSBFirst;
        image.depth = 24;
        image.data = bytes.as_mut_ptr() as *mut _;

        let rgba = unsafe { to_rgba(&image, 2, 1) }.unwrap();
        assert_eq!(rgba.data, vec![30, 20, 10, 255, 60, 50, 40, 255]);
    }
}
