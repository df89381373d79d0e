//! End-to-end tests against a local WebSocket server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

use harborlink_realtime::{
    BackoffConfig, ConnectionManager, ConnectionState, ManagerConfig, TransportConfig, WsTransport,
};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Default)]
struct Behavior {
    /// Close the first connection right after answering a room join.
    drop_after_join: bool,
    /// Answer the first `authenticate` with `unauthorized`.
    reject_first_auth: bool,
}

/// Frame received by the server: (connection index, event, data).
type Frame = (usize, String, Value);

struct TestServer {
    url: String,
    auth_headers: Arc<Mutex<Vec<String>>>,
    frames: mpsc::UnboundedReceiver<Frame>,
}

impl TestServer {
    async fn start(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/realtime", listener.local_addr().unwrap());
        let auth_headers = Arc::new(Mutex::new(Vec::new()));
        let (frames_tx, frames) = mpsc::unbounded_channel();

        let headers = auth_headers.clone();
        tokio::spawn(async move {
            let mut conn = 0;
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve_conn(
                    stream,
                    conn,
                    behavior,
                    headers.clone(),
                    frames_tx.clone(),
                ));
                conn += 1;
            }
        });

        Self {
            url,
            auth_headers,
            frames,
        }
    }

    /// Waits for the next frame with `event`, skipping others.
    async fn expect(&mut self, event: &str) -> Frame {
        tokio::time::timeout(WAIT, async {
            loop {
                let frame = self.frames.recv().await.expect("server stopped");
                if frame.1 == event {
                    return frame;
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("no {event} frame within {WAIT:?}"))
    }
}

fn envelope(event: &str, data: Value) -> Message {
    let frame = json!({ "id": "srv", "event": event, "data": data });
    Message::Text(frame.to_string().into())
}

async fn serve_conn(
    stream: TcpStream,
    conn: usize,
    behavior: Behavior,
    headers: Arc<Mutex<Vec<String>>>,
    frames: mpsc::UnboundedSender<Frame>,
) {
    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        let value = req
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        headers.lock().unwrap().push(value);
        Ok(resp)
    };
    let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
        return;
    };

    let mut auth_seen = 0;
    while let Some(Ok(msg)) = ws.next().await {
        let Message::Text(text) = msg else { continue };
        let frame: Value = serde_json::from_str(text.as_str()).unwrap();
        let event = frame["event"].as_str().unwrap_or_default().to_string();
        let data = frame["data"].clone();
        let _ = frames.send((conn, event.clone(), data.clone()));

        match event.as_str() {
            "authenticate" => {
                auth_seen += 1;
                let reply = if behavior.reject_first_auth && auth_seen == 1 {
                    envelope("unauthorized", json!({ "message": "token not yet valid" }))
                } else {
                    envelope("authenticated", json!({ "success": true, "userId": "u-1" }))
                };
                if ws.send(reply).await.is_err() {
                    return;
                }
            }
            "join_vessel_room" => {
                let id = data["id"].clone();
                let _ = ws
                    .send(envelope("room_joined", json!({ "room": id, "type": "vessel" })))
                    .await;
                let _ = ws
                    .send(envelope(
                        "vessel_position_update",
                        json!({ "vesselId": id, "lat": 51.9, "lon": 4.1 }),
                    ))
                    .await;
                if behavior.drop_after_join && conn == 0 {
                    let _ = ws.close(None).await;
                    return;
                }
            }
            _ => {}
        }
    }
}

fn manager_config(url: &str) -> ManagerConfig {
    let fast = BackoffConfig::new(Duration::from_millis(20), Duration::from_millis(50), 2.0, false);
    ManagerConfig {
        auth_backoff: fast.clone(),
        transport: TransportConfig {
            url: url.to_string(),
            connect_timeout: Duration::from_secs(2),
            max_reconnect_attempts: 3,
            reconnect_backoff: fast,
        },
        ..ManagerConfig::default()
    }
}

fn spawn(config: ManagerConfig) -> ConnectionManager {
    let transport = WsTransport::new(config.transport.clone());
    ConnectionManager::spawn(transport, config)
}

async fn wait_for_state(mgr: &ConnectionManager, state: ConnectionState) {
    let mut rx = mgr.watch_state();
    tokio::time::timeout(WAIT, rx.wait_for(|s| s.status == state))
        .await
        .unwrap_or_else(|_| panic!("never reached {state}"))
        .unwrap();
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Position {
    vessel_id: String,
}

#[tokio::test]
async fn authenticates_joins_and_receives_pushes() {
    let mut server = TestServer::start(Behavior::default()).await;
    let mgr = spawn(manager_config(&server.url));

    let (pos_tx, mut pos_rx) = mpsc::unbounded_channel();
    mgr.subscribe_payload("vessel_position_update", move |p: Position| {
        let _ = pos_tx.send(p);
    })
    .unwrap();

    mgr.join_vessel_room("V1").unwrap();
    mgr.connect(Some("tok")).unwrap();

    let (_, _, data) = server.expect("authenticate").await;
    assert_eq!(data["token"], "tok");
    let (_, _, data) = server.expect("join_vessel_room").await;
    assert_eq!(data["id"], "V1");

    let position = tokio::time::timeout(WAIT, pos_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(position.vessel_id, "V1");

    wait_for_state(&mgr, ConnectionState::Authenticated).await;
    assert_eq!(
        server.auth_headers.lock().unwrap().as_slice(),
        ["Bearer tok".to_string()]
    );
    assert_eq!(mgr.rooms().len(), 1);

    mgr.shutdown().await;
}

#[tokio::test]
async fn server_drop_reconnects_and_replays_rooms() {
    let mut server = TestServer::start(Behavior {
        drop_after_join: true,
        ..Behavior::default()
    })
    .await;
    let mgr = spawn(manager_config(&server.url));

    mgr.connect(Some("tok")).unwrap();
    wait_for_state(&mgr, ConnectionState::Authenticated).await;
    mgr.join_vessel_room("V1").unwrap();
    assert_eq!(server.expect("join_vessel_room").await.0, 0);

    // The second connection authenticates again and rejoins unprompted.
    let (conn, _, _) = server.expect("authenticate").await;
    assert_eq!(conn, 1);
    let (conn, _, data) = server.expect("join_vessel_room").await;
    assert_eq!(conn, 1);
    assert_eq!(data["id"], "V1");

    wait_for_state(&mgr, ConnectionState::Authenticated).await;
    assert_eq!(mgr.state().reconnect_attempts, 0);
    assert_eq!(server.auth_headers.lock().unwrap().len(), 2);

    mgr.shutdown().await;
}

#[tokio::test]
async fn rejected_authentication_is_retried_on_same_connection() {
    let mut server = TestServer::start(Behavior {
        reject_first_auth: true,
        ..Behavior::default()
    })
    .await;
    let mgr = spawn(manager_config(&server.url));

    mgr.connect(Some("tok")).unwrap();
    assert_eq!(server.expect("authenticate").await.0, 0);
    assert_eq!(server.expect("authenticate").await.0, 0);

    wait_for_state(&mgr, ConnectionState::Authenticated).await;
    assert_eq!(mgr.state().auth_retry_count, 0);

    mgr.shutdown().await;
}

#[tokio::test]
async fn disconnect_closes_connection() {
    let server = TestServer::start(Behavior::default()).await;
    let mgr = spawn(manager_config(&server.url));

    mgr.connect(Some("tok")).unwrap();
    wait_for_state(&mgr, ConnectionState::Authenticated).await;

    mgr.disconnect().unwrap();
    mgr.settled().await.unwrap();
    assert_eq!(mgr.status(), ConnectionState::Disconnected);

    // No reconnection follows a deliberate disconnect.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(mgr.status(), ConnectionState::Disconnected);
    assert_eq!(server.auth_headers.lock().unwrap().len(), 1);
}
