//! WebSocket implementation of [`Transport`].

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::reconnection::{SessionContext, WriterSlot, run_session};
use crate::transport::{EventCallback, Outbound, Transport};

/// WebSocket transport speaking JSON [`Envelope`](harborlink_protocol::Envelope)
/// frames.
///
/// `open` spawns a session task that connects (sending the credential as
/// a bearer `Authorization` header), pumps frames and reconnects with
/// backoff up to `max_reconnect_attempts` times.
pub struct WsTransport {
    config: TransportConfig,
    on_event: Option<EventCallback>,
    writer: WriterSlot,
    session: Option<CancellationToken>,
}

impl WsTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            on_event: None,
            writer: Arc::new(Mutex::new(None)),
            session: None,
        }
    }

    /// Returns `true` while a connection is live and writable.
    pub fn is_connected(&self) -> bool {
        self.writer
            .lock()
            .map(|slot| slot.as_ref().is_some_and(|tx| !tx.is_closed()))
            .unwrap_or(false)
    }
}

impl Transport for WsTransport {
    fn set_event_callback(&mut self, cb: EventCallback) {
        self.on_event = Some(cb);
    }

    fn open(&mut self, credential: Option<&str>) {
        self.close();
        let Some(on_event) = self.on_event.clone() else {
            warn!("no event callback set, not opening");
            return;
        };

        let cancel = CancellationToken::new();
        self.session = Some(cancel.clone());
        debug!(url = %self.config.url, "opening session");
        tokio::spawn(run_session(SessionContext {
            config: self.config.clone(),
            credential: credential.map(String::from),
            on_event,
            writer: self.writer.clone(),
            cancel,
        }));
    }

    fn close(&mut self) {
        if let Some(cancel) = self.session.take() {
            debug!("closing session");
            cancel.cancel();
        }
        if let Ok(mut slot) = self.writer.lock() {
            *slot = None;
        }
    }

    fn emit(&mut self, frame: Outbound) -> Result<(), TransportError> {
        let env = frame.into_envelope()?;
        let json = serde_json::to_string(&env)?;

        let slot = self.writer.lock().map_err(|_| TransportError::NotConnected)?;
        let tx = slot.as_ref().ok_or(TransportError::NotConnected)?;
        tx.try_send(tungstenite::Message::Text(json.into()))
            .map_err(|e| match e {
                TrySendError::Full(_) => TransportError::Backpressure,
                TrySendError::Closed(_) => TransportError::NotConnected,
            })?;

        trace!(event = %env.event, id = %env.id, "frame queued");
        Ok(())
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.close();
    }
}
