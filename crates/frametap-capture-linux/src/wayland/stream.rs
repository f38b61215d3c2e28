//! PipeWire video stream fed by the portal's remote.
//!
//! Everything here runs on the thread that created the main loop: the
//! capture worker for streaming, the caller for one-shot screenshots.
//! Per-stream state travels as listener user data, so concurrent sessions
//! never share it.

use std::cell::RefCell;
use std::os::fd::OwnedFd;
use std::rc::Rc;
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::time::Duration;

use frametap_core::pixel::{copy_plane, SourceLayout};
use frametap_core::{
    clamp_to_surface, CaptureError, Frame, FrameCallback, Image, Rect, Result, StreamState,
};
use pipewire as pw;
use pw::context::Context;
use pw::core::Core;
use pw::main_loop::MainLoop;
use pw::spa;
use pw::spa::param::format::{FormatProperties, MediaSubtype, MediaType};
use pw::spa::param::format_utils;
use pw::spa::param::video::{VideoFormat, VideoInfoRaw};
use pw::spa::pod::{self, Pod};
use pw::stream::{Stream, StreamFlags, StreamListener};
use tracing::{debug, error, info, warn};

/// Message that quits a streaming main loop.
pub(crate) struct Terminate;

// ── Format handling ───────────────────────────────────────────────────────────

/// What `param_changed` negotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PlaneFormat {
    pub layout: SourceLayout,
    pub width: u32,
    pub height: u32,
}

pub(crate) fn layout_for(format: VideoFormat) -> SourceLayout {
    if format == VideoFormat::RGBA {
        SourceLayout::Rgba
    } else if format == VideoFormat::RGBx {
        SourceLayout::Rgbx
    } else if format == VideoFormat::BGRx {
        SourceLayout::Bgrx
    } else {
        // BGRA, and anything a compositor sends despite our EnumFormat.
        SourceLayout::Bgra
    }
}

/// Crop `region` out of one mapped plane and convert it to RGBA.
pub(crate) fn decode_plane(bytes: &[u8], stride: i32, format: PlaneFormat, region: Rect) -> Result<Image> {
    let area = clamp_to_surface(region, format.width, format.height)?;
    let stride = match usize::try_from(stride) {
        Ok(s) if s > 0 => s,
        _ => format.width as usize * 4,
    };
    copy_plane(bytes, stride, area, format.layout)
}

/// `EnumFormat`: raw video in one of the four 32-bit orders, any size up
/// to 8192x8192.
fn format_param() -> Result<Vec<u8>> {
    let object = pod::object!(
        spa::utils::SpaTypes::ObjectParamFormat,
        spa::param::ParamType::EnumFormat,
        pod::property!(FormatProperties::MediaType, Id, MediaType::Video),
        pod::property!(FormatProperties::MediaSubtype, Id, MediaSubtype::Raw),
        pod::property!(
            FormatProperties::VideoFormat,
            Choice,
            Enum,
            Id,
            VideoFormat::BGRx,
            VideoFormat::BGRx,
            VideoFormat::BGRA,
            VideoFormat::RGBx,
            VideoFormat::RGBA
        ),
        pod::property!(
            FormatProperties::VideoSize,
            Choice,
            Range,
            Rectangle,
            spa::utils::Rectangle { width: 1920, height: 1080 },
            spa::utils::Rectangle { width: 1, height: 1 },
            spa::utils::Rectangle { width: 8192, height: 8192 }
        ),
        pod::property!(
            FormatProperties::VideoFramerate,
            Choice,
            Range,
            Fraction,
            spa::utils::Fraction { num: 60, denom: 1 },
            spa::utils::Fraction { num: 0, denom: 1 },
            spa::utils::Fraction { num: 1000, denom: 1 }
        ),
    );
    let (cursor, _) = pod::serialize::PodSerializer::serialize(
        std::io::Cursor::new(Vec::new()),
        &pod::Value::Object(object),
    )
    .map_err(|e| CaptureError::platform(format!("serializing EnumFormat: {e:?}")))?;
    Ok(cursor.into_inner())
}

// ── Listener user data ────────────────────────────────────────────────────────

enum FrameSink {
    /// Streaming: hand frames to the user callback.
    Callback { state: Arc<StreamState>, callback: FrameCallback },
    /// Screenshot: keep the first frame and quit the loop.
    Once { slot: Rc<RefCell<Option<Result<Image>>>> },
}

struct StreamData {
    mainloop: MainLoop,
    info: VideoInfoRaw,
    format: Option<PlaneFormat>,
    region: Arc<Mutex<Rect>>,
    sink: FrameSink,
}

impl StreamData {
    fn on_param_changed(&mut self, id: u32, param: Option<&Pod>) {
        let Some(param) = param else { return };
        if id != spa::param::ParamType::Format.as_raw() {
            return;
        }
        let Ok((media_type, media_subtype)) = format_utils::parse_format(param) else { return };
        if media_type != MediaType::Video || media_subtype != MediaSubtype::Raw {
            return;
        }
        if let Err(e) = self.info.parse(param) {
            warn!("unparseable PipeWire video format: {e:?}");
            return;
        }
        let size = self.info.size();
        let format = PlaneFormat { layout: layout_for(self.info.format()), width: size.width, height: size.height };
        info!("PipeWire format {:?} {}x{}", self.info.format(), size.width, size.height);
        self.format = Some(format);
    }

    fn on_process(&mut self, stream: &pw::stream::StreamRef) {
        let Some(mut buffer) = stream.dequeue_buffer() else { return };
        // Dropping the buffer hands it back to the compositor.
        if let FrameSink::Callback { state, .. } = &self.sink {
            if state.is_paused() {
                return;
            }
        }
        let Some(format) = self.format else { return };

        let datas = buffer.datas_mut();
        let Some(plane) = datas.first_mut() else { return };
        let stride = plane.chunk().stride();
        let offset = plane.chunk().offset() as usize;
        let Some(bytes) = plane.data() else {
            debug!("PipeWire buffer without mapped data");
            return;
        };
        let bytes = bytes.get(offset..).unwrap_or_default();
        let region = *self.region.lock().unwrap_or_else(PoisonError::into_inner);
        let decoded = decode_plane(bytes, stride, format, region);
        drop(buffer);

        match (&self.sink, decoded) {
            (_, Err(e)) if e.is_transient() => debug!("PipeWire frame dropped: {e}"),
            (_, Ok(image)) if image.is_empty() => {}
            (FrameSink::Callback { state, callback }, Ok(image)) => {
                if state.is_paused() {
                    return;
                }
                let duration_ms = state.tick();
                callback(&Frame { image, duration_ms });
            }
            (FrameSink::Callback { .. }, Err(e)) => warn!("PipeWire frame rejected: {e}"),
            (FrameSink::Once { slot }, result) => {
                slot.borrow_mut().get_or_insert(result);
                self.mainloop.quit();
            }
        }
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// Loop, context, core and stream. Fields drop top to bottom, which is the
/// teardown order PipeWire expects.
struct Pipeline {
    _listener: StreamListener<StreamData>,
    _stream: Stream,
    _core: Core,
    _context: Context,
    mainloop: MainLoop,
}

impl Pipeline {
    fn open(
        fd: OwnedFd,
        node_id: u32,
        name: &str,
        region: Arc<Mutex<Rect>>,
        sink: FrameSink,
    ) -> Result<Self> {
        pw::init();
        let mainloop = MainLoop::new(None).map_err(|e| CaptureError::platform(format!("PipeWire main loop: {e}")))?;
        let context = Context::new(&mainloop).map_err(|e| CaptureError::platform(format!("PipeWire context: {e}")))?;
        let core = context
            .connect_fd(fd, None)
            .map_err(|e| CaptureError::platform(format!("PipeWire connect_fd: {e}")))?;

        let stream = Stream::new(
            &core,
            name,
            pw::properties::properties! {
                *pw::keys::MEDIA_TYPE => "Video",
                *pw::keys::MEDIA_CATEGORY => "Capture",
                *pw::keys::MEDIA_ROLE => "Screen",
            },
        )
        .map_err(|e| CaptureError::platform(format!("PipeWire stream: {e}")))?;

        let data = StreamData {
            mainloop: mainloop.clone(),
            info: VideoInfoRaw::new(),
            format: None,
            region,
            sink,
        };
        let listener = stream
            .add_local_listener_with_user_data(data)
            .state_changed(|_, data, old, new| {
                debug!("PipeWire stream {:?} -> {:?}", old, new);
                if let pw::stream::StreamState::Error(msg) = new {
                    error!("PipeWire stream failed: {msg}");
                    data.mainloop.quit();
                }
            })
            .param_changed(|_, data, id, param| data.on_param_changed(id, param))
            .process(|stream, data| data.on_process(stream))
            .register()
            .map_err(|e| CaptureError::platform(format!("PipeWire listener: {e}")))?;

        let values = format_param()?;
        let param = Pod::from_bytes(&values)
            .ok_or_else(|| CaptureError::platform("EnumFormat pod is malformed"))?;
        stream
            .connect(
                spa::utils::Direction::Input,
                Some(node_id),
                StreamFlags::AUTOCONNECT | StreamFlags::MAP_BUFFERS,
                &mut [param],
            )
            .map_err(|e| CaptureError::platform(format!("PipeWire connect to node {node_id}: {e}")))?;
        debug!("PipeWire stream '{}' connected to node {}", name, node_id);

        Ok(Self { _listener: listener, _stream: stream, _core: core, _context: context, mainloop })
    }
}

// ── Entry points ──────────────────────────────────────────────────────────────

/// Capture worker body: stream until a [`Terminate`] arrives.
///
/// Setup success or failure is reported once on `ready`.
pub(crate) fn run_stream(
    fd: OwnedFd,
    node_id: u32,
    region: Arc<Mutex<Rect>>,
    state: Arc<StreamState>,
    callback: FrameCallback,
    terminate: pw::channel::Receiver<Terminate>,
    ready: mpsc::Sender<Result<()>>,
) {
    let sink = FrameSink::Callback { state, callback };
    let pipeline = match Pipeline::open(fd, node_id, "frametap", region, sink) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let _terminate = terminate.attach(pipeline.mainloop.loop_(), {
        let mainloop = pipeline.mainloop.clone();
        move |Terminate| mainloop.quit()
    });
    let _ = ready.send(Ok(()));

    pipeline.mainloop.run();
    info!("PipeWire stream loop exited");
}

/// One frame from `node_id`, or `CaptureTimeout` after `timeout`.
pub(crate) fn grab_frame(fd: OwnedFd, node_id: u32, region: Rect, timeout: Duration) -> Result<Image> {
    let slot = Rc::new(RefCell::new(None));
    let sink = FrameSink::Once { slot: Rc::clone(&slot) };
    let pipeline = Pipeline::open(fd, node_id, "frametap-screenshot", Arc::new(Mutex::new(region)), sink)?;

    let timer = pipeline.mainloop.loop_().add_timer({
        let mainloop = pipeline.mainloop.clone();
        move |_| mainloop.quit()
    });
    timer
        .update_timer(Some(timeout), None)
        .into_result()
        .map_err(|e| CaptureError::platform(format!("PipeWire timer: {e}")))?;

    pipeline.mainloop.run();
    drop(timer);
    drop(pipeline);

    let frame = slot.borrow_mut().take();
    frame.unwrap_or(Err(CaptureError::CaptureTimeout { ms: timeout.as_millis() as u64 }))
}
