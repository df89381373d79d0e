//! Keepalive pings for the live connection.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Queues a ping every `period` until cancelled or the write queue closes.
/// A silent peer is caught by the read pump's deadline, not here.
pub(crate) async fn ping_pump(
    write_tx: mpsc::Sender<Message>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticks = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticks.tick() => {}
        }
        // A full queue means the writer is stuck; stay cancellable while waiting.
        tokio::select! {
            _ = cancel.cancelled() => return,
            sent = write_tx.send(Message::Ping(Vec::new().into())) => {
                if sent.is_err() {
                    trace!("write queue closed, ping pump exiting");
                    return;
                }
            }
        }
    }
}
