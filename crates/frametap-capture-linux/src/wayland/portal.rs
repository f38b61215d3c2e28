//! `org.freedesktop.portal.ScreenCast` handshake through `ashpd`.
//!
//! ```text
//! CreateSession ──► session
//! SelectSources ──► ()
//! Start         ──► streams: [(node_id, props)]   (picker dialog)
//! OpenPipeWireRemote ──► fd
//! ```
//!
//! The grant lasts as long as the portal session, so a task on a private
//! runtime holds the session and closes it when the [`PortalSession`]
//! handle is dropped.

use std::future::Future;
use std::os::fd::OwnedFd;
use std::time::Duration;

use ashpd::desktop::screencast::{CursorMode as PortalCursorMode, Screencast, SourceType};
use ashpd::desktop::{PersistMode, ResponseError};
use ashpd::enumflags2::BitFlags;
use ashpd::WindowIdentifier;
use frametap_core::{CaptureConfig, CaptureError, CursorMode, Result};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Granted node id and PipeWire remote, or why the handshake failed.
type Grant = Result<(u32, OwnedFd)>;

// ── Pure helpers ──────────────────────────────────────────────────────────────

fn portal_cursor_mode(mode: CursorMode) -> PortalCursorMode {
    match mode {
        CursorMode::Hidden => PortalCursorMode::Hidden,
        CursorMode::Embedded => PortalCursorMode::Embedded,
        CursorMode::Metadata => PortalCursorMode::Metadata,
    }
}

/// Cancellation and other negative answers are denials; anything else
/// means the portal could not be talked to.
fn portal_error(step: &'static str, e: ashpd::Error) -> CaptureError {
    match e {
        ashpd::Error::Response(ResponseError::Cancelled) => CaptureError::PortalDenied { step, status: 1 },
        ashpd::Error::Response(ResponseError::Other) => CaptureError::PortalDenied { step, status: 2 },
        other => CaptureError::PortalMissing { reason: format!("{step}: {other}") },
    }
}

/// Node of the first granted stream of a `wanted` kind. Streams that do not
/// report a kind count as wanted; if none qualifies the first stream wins.
pub(crate) fn pick_node(
    streams: impl IntoIterator<Item = (u32, Option<SourceType>)>,
    wanted: BitFlags<SourceType>,
) -> Option<u32> {
    let streams: Vec<_> = streams.into_iter().collect();
    streams
        .iter()
        .find(|(_, kind)| kind.map_or(true, |kind| wanted.contains(kind)))
        .or_else(|| streams.first())
        .map(|(node, _)| *node)
}

/// Await one portal step for at most `secs`.
async fn step<T>(
    name: &'static str,
    secs: u64,
    call: impl Future<Output = std::result::Result<T, ashpd::Error>>,
) -> Result<T> {
    match tokio::time::timeout(Duration::from_secs(secs), call).await {
        Ok(answer) => answer.map_err(|e| portal_error(name, e)),
        Err(_) => Err(CaptureError::PortalTimeout { step: name, secs }),
    }
}

// ── PortalSession ─────────────────────────────────────────────────────────────

/// A started ScreenCast session and the PipeWire remote it grants.
///
/// Must not be created or dropped from inside an async runtime.
pub(crate) struct PortalSession {
    fd: OwnedFd,
    node_id: u32,
    close: Option<oneshot::Sender<()>>,
    holder: Option<JoinHandle<()>>,
    runtime: tokio::runtime::Runtime,
}

impl PortalSession {
    /// Run the full handshake. Blocks while the user answers the picker.
    pub(crate) fn open(source_types: BitFlags<SourceType>, config: &CaptureConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("frametap-portal")
            .enable_all()
            .build()
            .map_err(|e| CaptureError::platform(format!("portal runtime: {e}")))?;

        let (grant_tx, grant_rx) = oneshot::channel();
        let (close_tx, close_rx) = oneshot::channel();
        let holder = runtime.spawn(hold_session(source_types, config.clone(), grant_tx, close_rx));

        let granted = runtime
            .block_on(grant_rx)
            .unwrap_or_else(|_| Err(CaptureError::platform("portal task ended without an answer")));
        let (node_id, fd) = match granted {
            Ok(grant) => grant,
            Err(e) => {
                drop(close_tx);
                if let Err(join) = runtime.block_on(holder) {
                    debug!("portal task: {join}");
                }
                return Err(e);
            }
        };
        info!("ScreenCast portal granted PipeWire node {}", node_id);
        Ok(Self { fd, node_id, close: Some(close_tx), holder: Some(holder), runtime })
    }

    pub(crate) fn node_id(&self) -> u32 {
        self.node_id
    }

    /// A fresh duplicate of the PipeWire remote for one `connect_fd`.
    pub(crate) fn remote_fd(&self) -> Result<OwnedFd> {
        self.fd
            .try_clone()
            .map_err(|e| CaptureError::platform(format!("dup PipeWire fd: {e}")))
    }
}

impl Drop for PortalSession {
    fn drop(&mut self) {
        if let Some(close) = self.close.take() {
            let _ = close.send(());
        }
        let Some(holder) = self.holder.take() else { return };
        let closed = self
            .runtime
            .block_on(async { tokio::time::timeout(Duration::from_secs(2), holder).await });
        if closed.is_err() {
            warn!("portal session close timed out");
        }
    }
}

/// Handshake, report the grant, then keep the session open until `close`
/// fires or its sender goes away.
async fn hold_session(
    source_types: BitFlags<SourceType>,
    config: CaptureConfig,
    grant: oneshot::Sender<Grant>,
    close: oneshot::Receiver<()>,
) {
    let secs = config.portal_timeout_secs;
    let opened = async {
        let proxy = step("ScreenCast", secs, Screencast::new()).await?;
        let session = step("CreateSession", secs, proxy.create_session()).await?;
        debug!("portal session created");

        step("SelectSources", secs, async {
            proxy
                .select_sources(
                    &session,
                    portal_cursor_mode(config.cursor_mode),
                    source_types,
                    false,
                    None,
                    PersistMode::DoNot,
                )
                .await?
                .response()
        })
        .await?;

        let streams = step("Start", config.picker_timeout_secs, async {
            proxy.start(&session, &WindowIdentifier::default()).await?.response()
        })
        .await?;
        let node_id = pick_node(
            streams.streams().iter().map(|s| (s.pipe_wire_node_id(), s.source_type())),
            source_types,
        )
        .ok_or_else(|| CaptureError::PortalMissing { reason: "Start response has no streams".into() })?;

        let fd = step("OpenPipeWireRemote", secs, proxy.open_pipe_wire_remote(&session)).await?;
        Ok::<_, CaptureError>((session, node_id, fd))
    }
    .await;

    let session = match opened {
        Ok((session, node_id, fd)) => {
            if grant.send(Ok((node_id, fd))).is_err() {
                debug!("portal grant arrived after the caller gave up");
            }
            session
        }
        Err(e) => {
            let _ = grant.send(Err(e));
            return;
        }
    };

    let _ = close.await;
    match tokio::time::timeout(Duration::from_secs(1), session.close()).await {
        Ok(Ok(())) => debug!("portal session closed"),
        Ok(Err(e)) => debug!("portal session close failed: {e}"),
        Err(_) => warn!("portal session close timed out"),
    }
}

/// Whether the portal service exports ScreenCast with at least one source type.
pub(crate) fn screencast_available() -> bool {
    let Ok(runtime) = tokio::runtime::Builder::new_current_thread().enable_all().build() else {
        return false;
    };
    runtime.block_on(async {
        let probe = async {
            let proxy = Screencast::new().await?;
            proxy.available_source_types().await
        };
        match tokio::time::timeout(Duration::from_secs(5), probe).await {
            Ok(Ok(types)) => !types.is_empty(),
            Ok(Err(e)) => {
                debug!("ScreenCast portal probe: {e}");
                false
            }
            Err(_) => false,
        }
    })
}
