//! Write pump: the only writer of the socket.

use std::time::Duration;

use futures_util::SinkExt;
use harborlink_protocol::constants::WS_WRITE_WAIT;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Forwards queued frames to the socket until cancelled or the queue
/// closes, then sends a close frame.
///
/// Every write is bounded by [`WS_WRITE_WAIT`]. A write that stalls past it
/// cancels the connection, so the session can report the link as lost.
pub(crate) async fn write_pump<S>(
    write: S,
    write_rx: mpsc::Receiver<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    write_pump_with_deadline(write, write_rx, cancel, WS_WRITE_WAIT).await
}

async fn write_pump_with_deadline<S>(
    mut write: S,
    mut write_rx: mpsc::Receiver<tungstenite::Message>,
    cancel: CancellationToken,
    write_wait: Duration,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = write_rx.recv() => {
                let Some(msg) = msg else { break };
                match tokio::time::timeout(write_wait, write.send(msg)).await {
                    Ok(Ok(())) => trace!("frame written"),
                    Ok(Err(e)) => {
                        warn!(error = %e, "WebSocket write failed");
                        cancel.cancel();
                        break;
                    }
                    Err(_) => {
                        warn!(timeout_ms = write_wait.as_millis() as u64, "WebSocket write stalled");
                        cancel.cancel();
                        break;
                    }
                }
            }
        }
    }

    let close = write.send(tungstenite::Message::Close(None));
    if tokio::time::timeout(write_wait, close).await.is_err() {
        debug!("close frame not written before deadline");
    }
}
