//! Pixel utilities shared by every backend.
//!
//! All images leaving the engine are RGBA8, top-down and tightly packed.
//! Platform surfaces arrive as 32-bit planes in one of a handful of byte
//! orders, with a row stride that is usually larger than `width * 4`.

use crate::errors::{CaptureError, Result};
use crate::region::CaptureArea;
use crate::types::Image;

// ── Byte counts ───────────────────────────────────────────────────────────────

/// `width * height * 4`, or `AllocationOverflow` if that does not fit a `usize`.
///
/// Zero when either side is zero.
pub fn checked_rgba_size(width: usize, height: usize) -> Result<usize> {
    if width == 0 || height == 0 {
        return Ok(0);
    }
    width
        .checked_mul(height)
        .and_then(|px| px.checked_mul(4))
        .ok_or(CaptureError::AllocationOverflow { width, height })
}

// ── Channel swaps ─────────────────────────────────────────────────────────────

/// Swap B and R of every pixel in place. Trailing bytes that do not form a
/// whole pixel are left alone.
pub fn bgra_to_rgba_in_place(buf: &mut [u8]) {
    for px in buf.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
}

/// Swap B and R from `src` into `dst`. Converts `min(src, dst)` whole pixels.
pub fn bgra_to_rgba(src: &[u8], dst: &mut [u8]) {
    for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
        d[0] = s[2];
        d[1] = s[1];
        d[2] = s[0];
        d[3] = s[3];
    }
}

/// Overwrite the alpha byte of every RGBA pixel with 0xFF.
pub fn force_opaque(buf: &mut [u8]) {
    for px in buf.chunks_exact_mut(4) {
        px[3] = 0xFF;
    }
}

// ── 32-bit plane conversion ───────────────────────────────────────────────────

/// Byte order of a 32-bit source pixel, as laid out in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceLayout {
    Bgra,
    /// BGRA whose fourth byte is padding (24-bit depth).
    Bgrx,
    Rgba,
    Rgbx,
    /// Big-endian ARGB words.
    Argb,
    Xrgb,
}

impl SourceLayout {
    fn convert_row(self, src: &[u8], dst: &mut [u8]) {
        match self {
            Self::Bgra => bgra_to_rgba(src, dst),
            Self::Bgrx => {
                bgra_to_rgba(src, dst);
                force_opaque(dst);
            }
            Self::Rgba => dst.copy_from_slice(src),
            Self::Rgbx => {
                dst.copy_from_slice(src);
                force_opaque(dst);
            }
            Self::Argb | Self::Xrgb => {
                for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
                    d[0] = s[1];
                    d[1] = s[2];
                    d[2] = s[3];
                    d[3] = if self == Self::Argb { s[0] } else { 0xFF };
                }
            }
        }
    }
}

/// Copy `area` out of a 32-bit plane with the given row `stride`, converting
/// to packed RGBA.
///
/// A plane too short for the requested area is reported as `Transient`: it
/// happens when a surface is resized between negotiation and delivery.
pub fn copy_plane(
    src: &[u8],
    stride: usize,
    area: CaptureArea,
    layout: SourceLayout,
) -> Result<Image> {
    let width = area.width as usize;
    let height = area.height as usize;
    let total = checked_rgba_size(width, height)?;
    if total == 0 {
        return Ok(Image::empty());
    }

    let row_bytes = width * 4;
    let x_offset = area.x as usize * 4;
    let first_row = area.y as usize;
    let needed = (first_row + height - 1)
        .checked_mul(stride)
        .and_then(|n| n.checked_add(x_offset + row_bytes));
    match needed {
        Some(n) if n <= src.len() && x_offset + row_bytes <= stride => {}
        _ => {
            return Err(CaptureError::transient(format!(
                "plane of {} bytes (stride {stride}) too small for {area}",
                src.len()
            )))
        }
    }

    let mut data = vec![0u8; total];
    for (row, dst) in data.chunks_exact_mut(row_bytes).enumerate() {
        let start = (first_row + row) * stride + x_offset;
        layout.convert_row(&src[start..start + row_bytes], dst);
    }
    Ok(Image { data, width, height })
}

/// Crop an already-packed RGBA image. An `area` reaching past the image
/// fails like a short plane in [`copy_plane`].
pub fn crop_rgba(image: Image, area: CaptureArea) -> Result<Image> {
    if area.x == 0
        && area.y == 0
        && area.width as usize == image.width
        && area.height as usize == image.height
    {
        return Ok(image);
    }
    if area.is_empty() {
        return Ok(Image::empty());
    }
    // Packed RGBA is just another 32-bit plane.
    copy_plane(&image.data, image.width * 4, area, SourceLayout::Rgba)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_pixel_bgra_to_rgba() {
        let mut px = [100u8, 150, 200, 255];
        bgra_to_rgba_in_place(&mut px);
        assert_eq!(px, [200, 150, 100, 255]);

        let mut out = [0u8; 4];
        bgra_to_rgba(&[100, 150, 200, 255], &mut out);
        assert_eq!(out, [200, 150, 100, 255]);
    }

    #[test]
    fn swap_is_an_involution() {
        let original: Vec<u8> = (0..=255u8).cycle().take(4 * 97).collect();
        let mut buf = original.clone();
        bgra_to_rgba_in_place(&mut buf);
        assert_ne!(buf, original);
        bgra_to_rgba_in_place(&mut buf);
        assert_eq!(buf, original);
    }

    #[test]
    fn checked_size_zero_and_normal() {
        assert_eq!(checked_rgba_size(0, 1080).unwrap(), 0);
        assert_eq!(checked_rgba_size(1920, 0).unwrap(), 0);
        assert_eq!(checked_rgba_size(1920, 1080).unwrap(), 1920 * 1080 * 4);
    }

    #[test]
    fn checked_size_rejects_overflow() {
        match checked_rgba_size(usize::MAX / 4 + 1, 1) {
            Err(CaptureError::AllocationOverflow { width, height }) => {
                assert_eq!(width, usize::MAX / 4 + 1);
                assert_eq!(height, 1);
            }
            other => panic!("expected AllocationOverflow, got {other:?}"),
        }
        assert!(checked_rgba_size(usize::MAX, usize::MAX).is_err());
    }

    #[test]
    fn copy_plane_honors_stride_and_offset() {
        // 3x2 BGRx plane with 4 bytes of row padding.
        let stride = 16;
        let mut plane = vec![0u8; stride * 2];
        for y in 0..2 {
            for x in 0..3 {
                let i = y * stride + x * 4;
                plane[i..i + 4].copy_from_slice(&[x as u8, y as u8, 9, 0]);
            }
        }
        let area = CaptureArea { x: 1, y: 1, width: 2, height: 1 };
        let image = copy_plane(&plane, stride, area, SourceLayout::Bgrx).unwrap();
        assert_eq!((image.width, image.height), (2, 1));
        assert_eq!(image.data, vec![9, 1, 1, 255, 9, 1, 2, 255]);
    }

    #[test]
    fn copy_plane_layouts() {
        let area = CaptureArea { x: 0, y: 0, width: 1, height: 1 };
        let px = [10u8, 20, 30, 40];
        let out = |layout| copy_plane(&px, 4, area, layout).unwrap().data;
        assert_eq!(out(SourceLayout::Bgra), vec![30, 20, 10, 40]);
        assert_eq!(out(SourceLayout::Rgba), vec![10, 20, 30, 40]);
        assert_eq!(out(SourceLayout::Rgbx), vec![10, 20, 30, 255]);
        assert_eq!(out(SourceLayout::Argb), vec![20, 30, 40, 10]);
        assert_eq!(out(SourceLayout::Xrgb), vec![20, 30, 40, 255]);
    }

    #[test]
    fn copy_plane_short_buffer_is_transient() {
        let area = CaptureArea { x: 0, y: 0, width: 4, height: 4 };
        let err = copy_plane(&[0u8; 32], 16, area, SourceLayout::Rgba).unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn crop_keeps_full_image_and_cuts_subarea() {
        let image = Image { data: (0..16).collect(), width: 2, height: 2 };
        let full = CaptureArea { x: 0, y: 0, width: 2, height: 2 };
        assert_eq!(crop_rgba(image.clone(), full).unwrap(), image);

        let corner = crop_rgba(image, CaptureArea { x: 1, y: 1, width: 1, height: 1 }).unwrap();
        assert_eq!(corner.data, vec![12, 13, 14, 15]);
        assert_eq!(corner.data.len(), corner.width * corner.height * 4);
    }

    #[test]
    fn crop_outside_the_image_is_an_error() {
        let image = Image { data: vec![0; 16], width: 2, height: 2 };
        let err = crop_rgba(image.clone(), CaptureArea { x: 1, y: 1, width: 2, height: 2 }).unwrap_err();
        assert!(err.is_transient());
        let empty = crop_rgba(image, CaptureArea { x: 0, y: 0, width: 0, height: 0 }).unwrap();
        assert!(empty.is_empty());
    }
}
