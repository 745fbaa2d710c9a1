use thiserror::Error;

/// Errors surfaced by the relay server itself. Protocol-level oddities
/// (unknown rooms, malformed frames) are never errors -- absence is always
/// treated as "not yet created" and bad frames are dropped.
#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}
