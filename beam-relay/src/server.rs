//! Rendezvous server: WebSocket connections feeding the shared `Relay`.
//! One task per connection owns its `Session`; outbound text goes through a
//! per-connection queue drained by a writer task.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use beam_core::{ConnectionId, Relay, RelayAction, Session};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

/// Messages queued per connection before further ones are dropped.
const OUTBOUND_QUEUE: usize = 64;

/// Outbound queues of the currently open connections.
pub type Senders = Arc<Mutex<HashMap<ConnectionId, mpsc::Sender<String>>>>;

/// Accept connections forever, one task each.
pub async fn run_server(listener: TcpListener, relay: Arc<Relay>) -> std::io::Result<()> {
    let senders: Senders = Arc::new(Mutex::new(HashMap::new()));
    info!(event = "relay_listening", addr = %listener.local_addr()?, "Relay listening");
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(event = "accept_failed", error = %e, "Accept failed");
                continue;
            }
        };
        let relay = relay.clone();
        let senders = senders.clone();
        tokio::spawn(async move {
            match tokio_tungstenite::accept_async(stream).await {
                Ok(ws) => run_connection(ws, addr, relay, senders).await,
                Err(e) => {
                    debug!(event = "handshake_failed", %addr, error = %e, "WebSocket handshake failed")
                }
            }
        });
    }
}

async fn run_connection(
    ws: WebSocketStream<TcpStream>,
    addr: SocketAddr,
    relay: Arc<Relay>,
    senders: Senders,
) {
    let mut session = Session::new();
    let id = session.id();
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_QUEUE);
    senders.lock().await.insert(id, tx);
    debug!(event = "connection_open", connection = %id, %addr, "Connection opened");

    let (mut sink, mut stream) = ws.split();
    // Ends once this connection's sender is removed from `senders` and the queue is flushed.
    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(msg) = stream.next().await {
        let actions = match msg {
            Ok(Message::Text(text)) => relay.on_message(&mut session, &text),
            Ok(Message::Binary(_)) => relay.on_binary(&session),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(event = "connection_error", connection = %id, error = %e, "Read failed");
                break;
            }
        };
        dispatch(&senders, actions).await;
    }

    senders.lock().await.remove(&id);
    let actions = relay.on_close(&mut session);
    dispatch(&senders, actions).await;
    let _ = writer.await;
    debug!(event = "connection_closed", connection = %id, %addr, "Connection closed");
}

/// Deliver relay actions at most once. Targets that are gone or not
/// reading fast enough lose the message.
async fn dispatch(senders: &Senders, actions: Vec<RelayAction>) {
    if actions.is_empty() {
        return;
    }
    let senders = senders.lock().await;
    for action in actions {
        match action {
            RelayAction::Send(to, text) => match senders.get(&to) {
                Some(tx) => match tx.try_send(text) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        debug!(event = "target_backlogged", connection = %to, "Dropping message, outbound queue full")
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        debug!(event = "target_gone", connection = %to, "Dropping message for closed connection")
                    }
                },
                None => debug!(event = "target_gone", connection = %to, "Dropping message for closed connection"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beam_core::RoomRegistry;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio_tungstenite::{connect_async, MaybeTlsStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn start() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(run_server(listener, Arc::new(Relay::new(RoomRegistry::new()))));
        addr
    }

    async fn client(addr: SocketAddr) -> Client {
        let (ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        ws
    }

    async fn send(ws: &mut Client, v: Value) {
        ws.send(Message::Text(v.to_string())).await.unwrap();
    }

    async fn recv(ws: &mut Client) -> Value {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("timed out waiting for message")
                .unwrap()
                .unwrap();
            if let Message::Text(text) = msg {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    async fn assert_silent(ws: &mut Client) {
        let r = tokio::time::timeout(Duration::from_millis(200), ws.next()).await;
        assert!(r.is_err(), "unexpected message: {r:?}");
    }

    #[tokio::test]
    async fn rendezvous_relay_and_disconnect() {
        let addr = start().await;
        let mut a = client(addr).await;
        let mut b = client(addr).await;
        let mut c = client(addr).await;

        send(&mut a, json!({"type": "create-room"})).await;
        let created = recv(&mut a).await;
        assert_eq!(created["type"], "room-created");
        let code = created["code"].as_str().unwrap().to_owned();
        assert_eq!(code.len(), 4);

        send(&mut b, json!({"type": "join-room", "code": code})).await;
        assert_eq!(recv(&mut b).await, json!({"type": "room-joined", "code": code}));
        assert_eq!(recv(&mut a).await, json!({"type": "peer-joined"}));

        send(&mut c, json!({"type": "join-room", "code": code})).await;
        assert_eq!(recv(&mut c).await, json!({"type": "error", "message": "Room is full"}));

        let offer = json!({"type": "offer", "offer": {"type": "offer", "sdp": "v=0\r\n"}});
        send(&mut a, offer.clone()).await;
        assert_eq!(recv(&mut b).await, offer);
        assert_silent(&mut c).await;

        let candidate = json!({"type": "ice-candidate", "candidate": {"candidate": "x", "sdpMid": "0"}});
        send(&mut b, candidate.clone()).await;
        assert_eq!(recv(&mut a).await, candidate);

        send(&mut a, json!({"type": "no-such-thing"})).await;
        ws_text(&mut a, "garbage").await;
        assert_eq!(
            recv(&mut a).await,
            json!({"type": "error", "message": "Invalid message format"})
        );

        b.close(None).await.unwrap();
        let gone = recv(&mut a).await;
        assert_eq!(gone["type"], "peer-disconnected");
        assert_eq!(gone["role"], "responder");

        send(&mut c, json!({"type": "join-room", "code": code})).await;
        assert_eq!(recv(&mut c).await, json!({"type": "error", "message": "Room not found"}));
    }

    #[tokio::test]
    async fn stalled_reader_loses_messages_instead_of_queueing() {
        let senders: Senders = Arc::new(Mutex::new(HashMap::new()));
        let slow = ConnectionId::new();
        let (tx, mut rx) = mpsc::channel(OUTBOUND_QUEUE);
        senders.lock().await.insert(slow, tx);

        let actions: Vec<RelayAction> = (0..OUTBOUND_QUEUE + 10)
            .map(|i| RelayAction::Send(slow, format!("m{i}")))
            .collect();
        dispatch(&senders, actions).await;
        dispatch(&senders, vec![RelayAction::Send(ConnectionId::new(), "x".into())]).await;

        let mut got = Vec::new();
        while let Ok(text) = rx.try_recv() {
            got.push(text);
        }
        assert_eq!(got.len(), OUTBOUND_QUEUE);
        assert_eq!(got.first().map(String::as_str), Some("m0"));

        dispatch(&senders, vec![RelayAction::Send(slow, "after".into())]).await;
        assert_eq!(rx.try_recv().unwrap(), "after");
    }

    async fn ws_text(ws: &mut Client, text: &str) {
        ws.send(Message::Text(text.to_owned())).await.unwrap();
    }
}
