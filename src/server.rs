//! WebSocket relay server.
//!
//! One tokio task per connection pair: the read loop parses inbound frames
//! and hands them to the registry; a write task drains the connection's
//! outbound channel, coalescing pending frames into a single flush.
//! No outbound send blocks and no inbound message is buffered -- every cache
//! mutation is an idempotent-mergeable delta, so the only per-connection
//! state is the channel itself.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::Error;
use crate::protocol::ClientMessage;
use crate::sync::registry::{ConnectionHandle, OutboundFrame, RoomRegistry};

/// How many queued frames a single flush may coalesce.
const COALESCE_BATCH: u32 = 64;

fn encode(frame: OutboundFrame) -> Option<Message> {
    match frame {
        OutboundFrame::Event(msg) => match serde_json::to_string(&msg) {
            Ok(text) => Some(Message::Text(text)),
            Err(e) => {
                debug!(error = %e, "dropping unencodable frame");
                None
            }
        },
        OutboundFrame::Pong(payload) => Some(Message::Pong(payload)),
    }
}

/// Bind and serve forever with a fresh registry.
pub async fn run(config: ServerConfig) -> Result<(), Error> {
    serve(config, Arc::new(RoomRegistry::new())).await
}

/// Accept loop over an externally-owned registry.
pub async fn serve(config: ServerConfig, registry: Arc<RoomRegistry>) -> Result<(), Error> {
    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "relay listening");
    let active = Arc::new(AtomicUsize::new(0));

    loop {
        let (stream, addr) = listener.accept().await?;
        tokio::spawn(handle_connection(
            stream,
            addr,
            registry.clone(),
            active.clone(),
            config.max_connections,
        ));
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    registry: Arc<RoomRegistry>,
    active: Arc<AtomicUsize>,
    max_connections: usize,
) {
    if active.fetch_add(1, Ordering::Relaxed) >= max_connections {
        warn!(%addr, "max connections reached, rejecting");
        active.fetch_sub(1, Ordering::Relaxed);
        return;
    }
    let _ = stream.set_nodelay(true);

    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!(%addr, error = %e, "websocket handshake failed");
            active.fetch_sub(1, Ordering::Relaxed);
            return;
        }
    };

    let conn_id = Uuid::now_v7().to_string();
    debug!(%addr, conn = %conn_id, "connection established");

    let (mut write_half, mut read_half) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundFrame>();
    let handle = ConnectionHandle::new(tx);

    // Write task: feed + batched try_recv + single flush.
    let write_task = tokio::spawn(async move {
        'conn: while let Some(frame) = rx.recv().await {
            if let Some(msg) = encode(frame) {
                if write_half.feed(msg).await.is_err() {
                    break 'conn;
                }
            }
            let mut count = 1u32;
            while count < COALESCE_BATCH {
                match rx.try_recv() {
                    Ok(frame) => {
                        if let Some(msg) = encode(frame) {
                            if write_half.feed(msg).await.is_err() {
                                break 'conn;
                            }
                        }
                        count += 1;
                    }
                    Err(_) => break,
                }
            }
            if write_half.flush().await.is_err() {
                break;
            }
        }
        let _ = write_half.close().await;
    });

    // Read loop. Malformed frames are dropped, never answered with an
    // error -- the protocol treats absence and nonsense alike.
    while let Some(Ok(msg)) = read_half.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(inbound) => registry.handle_message(&conn_id, &handle, inbound),
                Err(e) => {
                    debug!(conn = %conn_id, error = %e, "ignoring malformed frame");
                }
            },
            Message::Ping(payload) => handle.pong(payload),
            Message::Close(_) => break,
            Message::Binary(_) | Message::Pong(_) | Message::Frame(_) => {}
        }
    }

    // A dropped connection and a leaving participant are the same event.
    registry.leave(&conn_id);
    active.fetch_sub(1, Ordering::Relaxed);
    drop(handle);
    let _ = write_task.await;
    debug!(conn = %conn_id, "connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ServerMessage;

    #[test]
    fn test_encode_event_as_text_envelope() {
        let frame = OutboundFrame::Event(ServerMessage::ParticipantLeft {
            participant_id: "a".into(),
        });
        match encode(frame) {
            Some(Message::Text(text)) => {
                let val: serde_json::Value = serde_json::from_str(&text).unwrap();
                assert_eq!(val["t"], "participant_left");
                assert_eq!(val["p"]["participant_id"], "a");
            }
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[test]
    fn test_encode_pong_passthrough() {
        match encode(OutboundFrame::Pong(vec![1, 2, 3])) {
            Some(Message::Pong(payload)) => assert_eq!(payload, vec![1, 2, 3]),
            other => panic!("expected pong frame, got {other:?}"),
        }
    }
}
