//! Read pump: decodes server frames into transport events.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use harborlink_protocol::Envelope;
use harborlink_protocol::constants::{WS_MAX_MESSAGE_SIZE, WS_PONG_WAIT};

use crate::transport::{EventCallback, TransportEvent};

/// Reads frames until the connection ends and returns the reason.
///
/// Any incoming frame resets a read deadline of [`WS_PONG_WAIT`]; if
/// nothing arrives in that window the peer is considered gone.
pub(crate) async fn read_pump<S>(
    mut read: S,
    on_event: EventCallback,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
) -> String
where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let deadline = tokio::time::sleep(WS_PONG_WAIT);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return "closed".into(),

            () = &mut deadline => {
                warn!("read deadline elapsed, connection considered dead");
                return "read deadline elapsed".into();
            }

            msg = read.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket read failed");
                        return format!("read error: {e}");
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        return "stream ended".into();
                    }
                };
                deadline.as_mut().reset(tokio::time::Instant::now() + WS_PONG_WAIT);

                match msg {
                    tungstenite::Message::Text(text) => {
                        if !cancel.is_cancelled() {
                            handle_text_message(&text, &on_event);
                        }
                    }
                    tungstenite::Message::Ping(data) => {
                        trace!("ping received");
                        let _ = write_tx.try_send(tungstenite::Message::Pong(data));
                    }
                    tungstenite::Message::Pong(_) => trace!("pong received"),
                    tungstenite::Message::Close(frame) => {
                        let reason = frame
                            .map(|f| format!("server closed connection ({}): {}", u16::from(f.code), f.reason.as_str()))
                            .unwrap_or_else(|| "server closed connection".into());
                        debug!(%reason, "close frame received");
                        return reason;
                    }
                    _ => trace!("ignoring binary frame"),
                }
            }
        }
    }
}

/// Decodes one text frame and hands the event to the callback.
fn handle_text_message(text: &str, on_event: &EventCallback) {
    if text.len() > WS_MAX_MESSAGE_SIZE {
        warn!(len = text.len(), "frame too large, dropping");
        return;
    }

    let env: Envelope = match serde_json::from_str(text) {
        Ok(env) => env,
        Err(e) => {
            warn!(error = %e, "failed to parse frame");
            return;
        }
    };
    trace!(event = %env.event, id = %env.id, "frame received");

    match TransportEvent::from_envelope(&env) {
        Ok(Some(event)) => on_event(event),
        Ok(None) => warn!(event = %env.event, "ignoring frame with reserved or missing payload"),
        Err(e) => warn!(event = %env.event, error = %e, "failed to decode frame payload"),
    }
}
