use thiserror::Error;

/// Error type shared by the register codec, the transports and the sync engine.
///
/// Only two conditions are fatal to the bridge (transport open at startup and
/// a lost WebSocket); every other variant is logged and degrades to stale
/// data or a dropped command.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Serial open/read/write failure or a timed out response
    #[error("transport error: {0}")]
    Transport(String),

    /// The device answered with a Modbus exception
    #[error("modbus exception 0x{code:02X} (function 0x{function:02X})")]
    Protocol { function: u8, code: u8 },

    /// A queued command exhausted its write attempts
    #[error("command write failed after {attempts} attempts: {reason}")]
    CommandWrite { attempts: u32, reason: String },

    /// Malformed scaled or text block
    #[error("decode error: {0}")]
    Decode(String),

    #[error("unknown register field: {0}")]
    UnknownField(String),

    /// Inbound WebSocket message that failed validation
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// The WebSocket link is gone; publishing has stopped
    #[error("websocket disconnected: {0}")]
    Disconnected(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<serialport::Error> for BridgeError {
    fn from(err: serialport::Error) -> Self {
        BridgeError::Transport(err.to_string())
    }
}

impl From<tungstenite::Error> for BridgeError {
    fn from(err: tungstenite::Error) -> Self {
        BridgeError::Disconnected(err.to_string())
    }
}

/// Convenient alias over [`Result`] using [`BridgeError`]
pub type Result<T> = std::result::Result<T, BridgeError>;
