use crate::errors::Result;
use crate::pixel::checked_rgba_size;
use crate::types::Rect;

/// Final integer capture rectangle, inside the surface it was clamped to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureArea {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CaptureArea {
    pub fn full(width: u32, height: u32) -> Self {
        Self { x: 0, y: 0, width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for CaptureArea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// Reject a region whose requested extent cannot be allocated as RGBA.
pub fn validate_region(region: &Rect) -> Result<()> {
    if region.is_empty() {
        return Ok(());
    }
    checked_rgba_size(region.width as usize, region.height as usize).map(drop)
}

/// Resolve a requested region against a `surface_width x surface_height`
/// surface.
///
/// An empty region selects the whole surface. Negative origins shrink the
/// extent before clamping (`x < 0 => w += x, x = 0`). The result is empty
/// when nothing of the region is on the surface.
///
/// The requested extent is checked against `AllocationOverflow` before
/// anything else, so an absurd region fails even if clamping would have
/// rescued it.
pub fn clamp_to_surface(region: Rect, surface_width: u32, surface_height: u32) -> Result<CaptureArea> {
    if region.is_empty() {
        return Ok(CaptureArea::full(surface_width, surface_height));
    }
    validate_region(&region)?;

    let surface_w = i64::from(surface_width);
    let surface_h = i64::from(surface_height);
    let (x, w) = absorb_negative(region.x as i64, region.width as i64);
    let (y, h) = absorb_negative(region.y as i64, region.height as i64);

    if x >= surface_w || y >= surface_h {
        return Ok(CaptureArea::default());
    }
    let w = w.min(surface_w - x);
    let h = h.min(surface_h - y);
    if w <= 0 || h <= 0 {
        return Ok(CaptureArea::default());
    }

    // All four values are now within [0, surface] and fit a u32.
    Ok(CaptureArea { x: x as u32, y: y as u32, width: w as u32, height: h as u32 })
}

fn absorb_negative(origin: i64, extent: i64) -> (i64, i64) {
    if origin < 0 {
        (0, extent.saturating_add(origin))
    } else {
        (origin, extent)
    }
}
