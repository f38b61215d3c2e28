//! DXGI Desktop Duplication.
//!
//! COM objects here are not `Send`: a [`Duplicator`] is created and used on
//! one thread (the capture worker, or the caller for a screenshot).

use frametap_core::pixel::{copy_plane, SourceLayout};
use frametap_core::{clamp_to_surface, CaptureError, Image, Rect, Result};
use tracing::{debug, info, warn};
use windows::core::Interface;
use windows::Win32::Foundation::{HMODULE, RECT};
use windows::Win32::Graphics::Direct3D::D3D_DRIVER_TYPE_UNKNOWN;
use windows::Win32::Graphics::Direct3D11::{
    D3D11CreateDevice, ID3D11Device, ID3D11DeviceContext, ID3D11Texture2D, D3D11_CPU_ACCESS_READ,
    D3D11_CREATE_DEVICE_FLAG, D3D11_MAPPED_SUBRESOURCE, D3D11_MAP_READ, D3D11_SDK_VERSION,
    D3D11_TEXTURE2D_DESC, D3D11_USAGE_STAGING,
};
use windows::Win32::Graphics::Dxgi::Common::{DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_SAMPLE_DESC};
use windows::Win32::Graphics::Dxgi::{
    CreateDXGIFactory1, IDXGIAdapter1, IDXGIFactory1, IDXGIOutput, IDXGIOutput1, IDXGIOutputDuplication,
    IDXGIResource, DXGI_ERROR_ACCESS_LOST, DXGI_ERROR_NOT_FOUND, DXGI_ERROR_WAIT_TIMEOUT,
    DXGI_OUTDUPL_FRAME_INFO, DXGI_OUTPUT_DESC,
};

/// Acquire budget for a one-shot screenshot.
const SCREENSHOT_ACQUIRE_MS: u32 = 500;

fn dxgi_err(step: &str, e: windows::core::Error) -> CaptureError {
    CaptureError::platform(format!("{step}: {e}"))
}

// ── Output enumeration ────────────────────────────────────────────────────────

/// Every output of every adapter, in declaration order. The position in
/// this list is the `Monitor::id`.
pub(crate) fn outputs() -> Result<Vec<(IDXGIAdapter1, IDXGIOutput)>> {
    let factory: IDXGIFactory1 = unsafe { CreateDXGIFactory1() }.map_err(|e| dxgi_err("CreateDXGIFactory1", e))?;
    let mut result = Vec::new();
    for ai in 0.. {
        let adapter = match unsafe { factory.EnumAdapters1(ai) } {
            Ok(adapter) => adapter,
            Err(e) if e.code() == DXGI_ERROR_NOT_FOUND => break,
            Err(e) => return Err(dxgi_err("EnumAdapters1", e)),
        };
        for oi in 0.. {
            match unsafe { adapter.EnumOutputs(oi) } {
                Ok(output) => result.push((adapter.clone(), output)),
                Err(e) if e.code() == DXGI_ERROR_NOT_FOUND => break,
                Err(e) => {
                    debug!("EnumOutputs({ai}, {oi}) failed: {e}");
                    break;
                }
            }
        }
    }
    Ok(result)
}

pub(crate) fn desktop_size(desc: &DXGI_OUTPUT_DESC) -> (i32, i32) {
    let r = desc.DesktopCoordinates;
    (r.right - r.left, r.bottom - r.top)
}

/// Desktop rectangle of output `index`.
pub(crate) fn output_bounds(index: u32) -> Result<RECT> {
    let outputs = outputs()?;
    let (_, output) = outputs
        .get(index as usize)
        .ok_or_else(|| CaptureError::InvalidTarget { reason: format!("monitor ID {index} not found") })?;
    let desc = unsafe { output.GetDesc() }.map_err(|e| dxgi_err("IDXGIOutput::GetDesc", e))?;
    Ok(desc.DesktopCoordinates)
}

// ── Duplication ───────────────────────────────────────────────────────────────

/// Result of one `AcquireNextFrame`.
enum Acquired {
    Frame(Image),
    /// Timed out, or the frame carried no new pixels.
    Idle,
    /// Secure desktop, mode change or session switch: start over.
    AccessLost,
}

/// Live duplication of one output plus a reusable staging texture sized to
/// the whole desktop of that output.
struct Duplication {
    _device: ID3D11Device,
    context: ID3D11DeviceContext,
    duplication: IDXGIOutputDuplication,
    staging: ID3D11Texture2D,
    width: u32,
    height: u32,
}

/// `ReleaseFrame` on scope exit.
struct HeldFrame<'a>(&'a IDXGIOutputDuplication);

impl Drop for HeldFrame<'_> {
    fn drop(&mut self) {
        let _ = unsafe { self.0.ReleaseFrame() };
    }
}

/// `Unmap` on scope exit.
struct Mapped<'a>(&'a ID3D11DeviceContext, &'a ID3D11Texture2D);

impl Drop for Mapped<'_> {
    fn drop(&mut self) {
        unsafe { self.0.Unmap(self.1, 0) };
    }
}

impl Duplication {
    fn open(index: u32) -> Result<Self> {
        let (adapter, output) = outputs()?
            .into_iter()
            .nth(index as usize)
            .ok_or_else(|| CaptureError::InvalidTarget { reason: format!("no DXGI output {index}") })?;
        let desc = unsafe { output.GetDesc() }.map_err(|e| dxgi_err("IDXGIOutput::GetDesc", e))?;
        let (width, height) = desktop_size(&desc);
        if width <= 0 || height <= 0 {
            return Err(CaptureError::platform(format!("output {index} has no desktop area")));
        }

        let mut device: Option<ID3D11Device> = None;
        let mut context: Option<ID3D11DeviceContext> = None;
        unsafe {
            D3D11CreateDevice(
                &adapter,
                D3D_DRIVER_TYPE_UNKNOWN,
                HMODULE::default(),
                D3D11_CREATE_DEVICE_FLAG(0),
                None,
                D3D11_SDK_VERSION,
                Some(&mut device),
                None,
                Some(&mut context),
            )
        }
        .map_err(|e| dxgi_err("D3D11CreateDevice", e))?;
        let device = device.ok_or_else(|| CaptureError::platform("D3D11CreateDevice returned no device"))?;
        let context = context.ok_or_else(|| CaptureError::platform("D3D11CreateDevice returned no context"))?;

        let output1: IDXGIOutput1 = output.cast().map_err(|e| dxgi_err("IDXGIOutput1", e))?;
        let duplication = unsafe { output1.DuplicateOutput(&device) }.map_err(|e| dxgi_err("DuplicateOutput", e))?;
        let staging = create_staging_texture(&device, width as u32, height as u32)?;

        info!("DXGI duplicating output {} ({}x{})", index, width, height);
        Ok(Self { _device: device, context, duplication, staging, width: width as u32, height: height as u32 })
    }

    fn acquire(&self, timeout_ms: u32, region: Rect, require_new: bool) -> Result<Acquired> {
        let mut info = DXGI_OUTDUPL_FRAME_INFO::default();
        let mut resource: Option<IDXGIResource> = None;
        match unsafe { self.duplication.AcquireNextFrame(timeout_ms, &mut info, &mut resource) } {
            Ok(()) => {}
            Err(e) if e.code() == DXGI_ERROR_WAIT_TIMEOUT => return Ok(Acquired::Idle),
            Err(e) if e.code() == DXGI_ERROR_ACCESS_LOST => return Ok(Acquired::AccessLost),
            Err(e) => return Err(CaptureError::transient(format!("AcquireNextFrame: {e}"))),
        }
        let _frame = HeldFrame(&self.duplication);

        // Pointer-only updates leave LastPresentTime at zero.
        if require_new && info.LastPresentTime == 0 {
            return Ok(Acquired::Idle);
        }
        let texture: ID3D11Texture2D = resource
            .ok_or_else(|| CaptureError::transient("AcquireNextFrame returned no resource"))?
            .cast()
            .map_err(|e| CaptureError::transient(format!("desktop resource is not a texture: {e}")))?;

        let area = clamp_to_surface(region, self.width, self.height)?;
        if area.is_empty() {
            return Ok(Acquired::Frame(Image::empty()));
        }

        unsafe { self.context.CopyResource(&self.staging, &texture) };
        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        unsafe { self.context.Map(&self.staging, 0, D3D11_MAP_READ, 0, Some(&mut mapped)) }
            .map_err(|e| CaptureError::transient(format!("Map staging texture: {e}")))?;
        let _unmap = Mapped(&self.context, &self.staging);
        if mapped.pData.is_null() {
            return Err(CaptureError::transient("mapped staging texture has no data"));
        }

        let pitch = mapped.RowPitch as usize;
        let bytes = unsafe { std::slice::from_raw_parts(mapped.pData as *const u8, pitch * self.height as usize) };
        copy_plane(bytes, pitch, area, SourceLayout::Bgra).map(Acquired::Frame)
    }
}

fn create_staging_texture(device: &ID3D11Device, width: u32, height: u32) -> Result<ID3D11Texture2D> {
    let desc = D3D11_TEXTURE2D_DESC {
        Width: width,
        Height: height,
        MipLevels: 1,
        ArraySize: 1,
        Format: DXGI_FORMAT_B8G8R8A8_UNORM,
        SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
        Usage: D3D11_USAGE_STAGING,
        BindFlags: 0,
        CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
        MiscFlags: 0,
    };
    let mut texture: Option<ID3D11Texture2D> = None;
    unsafe { device.CreateTexture2D(&desc, None, Some(&mut texture)) }
        .map_err(|e| dxgi_err("CreateTexture2D staging", e))?;
    texture.ok_or_else(|| CaptureError::platform("CreateTexture2D returned no texture"))
}

// ── Duplicator ────────────────────────────────────────────────────────────────

/// Frame source for the DXGI worker. Reopens the duplication once per
/// access loss; a failed reopen ends the stream.
pub(crate) struct Duplicator {
    index: u32,
    live: Option<Duplication>,
}

impl Duplicator {
    /// Fails when DXGI cannot duplicate this output at all; callers fall
    /// back to GDI.
    pub(crate) fn open(index: u32) -> Result<Self> {
        Ok(Self { index, live: Some(Duplication::open(index)?) })
    }

    /// One frame with new pixels, `Ok(None)` when there was nothing to show
    /// within `timeout_ms`.
    pub(crate) fn next_frame(&mut self, timeout_ms: u32, region: Rect) -> Result<Option<Image>> {
        let live = self
            .live
            .as_ref()
            .ok_or_else(|| CaptureError::platform(format!("duplication of output {} is closed", self.index)))?;
        match live.acquire(timeout_ms, region, true)? {
            Acquired::Frame(image) if image.is_empty() => Ok(None),
            Acquired::Frame(image) => Ok(Some(image)),
            Acquired::Idle => Ok(None),
            Acquired::AccessLost => {
                warn!("DXGI access lost on output {}; reinitializing", self.index);
                // Release the dead duplication before asking for a new one.
                self.live = None;
                self.live = Some(Duplication::open(self.index)?);
                Ok(None)
            }
        }
    }
}

/// One frame from output `index` on a throwaway duplication.
pub(crate) fn screenshot(index: u32, region: Rect) -> Result<Image> {
    let live = Duplication::open(index)?;
    match live.acquire(SCREENSHOT_ACQUIRE_MS, region, false)? {
        Acquired::Frame(image) => Ok(image),
        Acquired::Idle => Err(CaptureError::CaptureTimeout { ms: u64::from(SCREENSHOT_ACQUIRE_MS) }),
        Acquired::AccessLost => Err(CaptureError::transient("DXGI access lost during screenshot")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use windows::Win32::Foundation::RECT;

    #[test]
    fn desktop_size_from_coordinates() {
        let desc = DXGI_OUTPUT_DESC {
            DesktopCoordinates: RECT { left: -1920, top: 0, right: 0, bottom: 1080 },
            ..Default::default()
        };
        assert_eq!(desktop_size(&desc), (1920, 1080));
    }
}
