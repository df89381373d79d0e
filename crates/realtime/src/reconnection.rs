//! Connection session for [`WsTransport`](crate::WsTransport): connect,
//! pump, and a bounded reconnection loop with exponential backoff.

use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use harborlink_protocol::constants::{WS_MAX_MESSAGE_SIZE, WS_OUTBOUND_BUFFER, WS_PING_PERIOD};

use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::pumps::{ping::ping_pump, read::read_pump, write::write_pump};
use crate::transport::{EventCallback, TransportEvent};

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Sender into the write pump of the live connection, if any.
pub(crate) type WriterSlot = Arc<Mutex<Option<mpsc::Sender<tungstenite::Message>>>>;

/// Everything one session task needs. A session lasts from `open` until
/// `close` or until reconnection gives up.
pub(crate) struct SessionContext {
    pub(crate) config: TransportConfig,
    pub(crate) credential: Option<String>,
    pub(crate) on_event: EventCallback,
    pub(crate) writer: WriterSlot,
    pub(crate) cancel: CancellationToken,
}

impl SessionContext {
    /// Raises an event unless the session was closed.
    fn emit(&self, event: TransportEvent) {
        if !self.cancel.is_cancelled() {
            (self.on_event)(event);
        }
    }

    fn set_writer(&self, tx: Option<mpsc::Sender<tungstenite::Message>>) {
        if let Ok(mut slot) = self.writer.lock() {
            *slot = tx;
        }
    }

    async fn connect(&self) -> Option<Result<WsStream, TransportError>> {
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            res = connect_once(&self.config, self.credential.as_deref()) => Some(res),
        }
    }
}

/// Opens one WebSocket connection, bounded by the connect timeout.
pub(crate) async fn connect_once(
    config: &TransportConfig,
    credential: Option<&str>,
) -> Result<WsStream, TransportError> {
    let mut request = config.url.as_str().into_client_request()?;
    if let Some(token) = credential {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| TransportError::InvalidCredential(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }

    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
    ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);

    let connecting = tokio_tungstenite::connect_async_with_config(request, Some(ws_config), false);
    let (stream, _) = tokio::time::timeout(config.connect_timeout, connecting)
        .await
        .map_err(|_| TransportError::Timeout)??;
    Ok(stream)
}

/// Runs a session: initial connect, then pump and reconnect until closed
/// or out of attempts.
pub(crate) async fn run_session(ctx: SessionContext) {
    let mut next = match ctx.connect().await {
        None => return,
        Some(Ok(stream)) => {
            info!(url = %ctx.config.url, "connected");
            Some((stream, TransportEvent::Connect))
        }
        Some(Err(e)) => {
            warn!(url = %ctx.config.url, error = %e, "connect failed");
            ctx.emit(TransportEvent::ConnectError {
                message: e.to_string(),
            });
            None
        }
    };

    loop {
        if let Some((stream, link_event)) = next.take() {
            let reason = serve(&ctx, stream, link_event).await;
            if ctx.cancel.is_cancelled() {
                return;
            }
            info!(%reason, "connection lost");
            ctx.emit(TransportEvent::Disconnect { reason });
        }

        match reconnect_loop(&ctx).await {
            Some((stream, attempt)) => next = Some((stream, TransportEvent::Reconnect { attempt })),
            None => return,
        }
    }
}

/// Pumps one live connection until it ends. Returns the disconnect reason.
async fn serve(ctx: &SessionContext, stream: WsStream, link_event: TransportEvent) -> String {
    let (write, read) = stream.split();
    let (write_tx, write_rx) = mpsc::channel(WS_OUTBOUND_BUFFER);
    let conn = ctx.cancel.child_token();

    let write_handle = tokio::spawn(write_pump(write, write_rx, conn.clone()));
    let ping_handle = tokio::spawn(ping_pump(write_tx.clone(), WS_PING_PERIOD, conn.clone()));

    // Writable before anyone hears about the link.
    ctx.set_writer(Some(write_tx.clone()));
    ctx.emit(link_event);

    let reason = read_pump(read, ctx.on_event.clone(), write_tx, conn.clone()).await;

    ctx.set_writer(None);
    conn.cancel();
    let _ = write_handle.await;
    let _ = ping_handle.await;
    reason
}

/// Retries the connection up to `max_reconnect_attempts` times. Returns
/// the new stream and the attempt that succeeded, or `None` when closed or
/// out of attempts (after raising `reconnect_failed`).
async fn reconnect_loop(ctx: &SessionContext) -> Option<(WsStream, u32)> {
    let max_attempts = ctx.config.max_reconnect_attempts;

    for attempt in 1..=max_attempts {
        if ctx.cancel.is_cancelled() {
            return None;
        }
        let delay = ctx.config.reconnect_backoff.delay(attempt - 1);
        ctx.emit(TransportEvent::ReconnectAttempt { attempt });
        info!(
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            "reconnecting"
        );

        tokio::select! {
            _ = ctx.cancel.cancelled() => {
                debug!("reconnect cancelled");
                return None;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        match ctx.connect().await? {
            Ok(stream) => {
                info!(attempt, "reconnected");
                return Some((stream, attempt));
            }
            Err(e) => {
                warn!(attempt, error = %e, "reconnect attempt failed");
                ctx.emit(TransportEvent::ReconnectError {
                    message: e.to_string(),
                });
            }
        }
    }

    if !ctx.cancel.is_cancelled() {
        warn!(attempts = max_attempts, "giving up reconnecting");
        ctx.emit(TransportEvent::ReconnectFailed);
    }
    None
}
