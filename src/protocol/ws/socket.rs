use flume::{Receiver, RecvTimeoutError, Sender};
use std::{io, net::TcpStream, time::Duration};

use tungstenite::{stream::MaybeTlsStream, Message, WebSocket};

use crate::error::{BridgeError, Result};

/// A text-message connection to the operator console.
///
/// `recv` blocks for at most the socket's read timeout so a single thread
/// can alternate between reading and writing.
pub trait MessageSocket: Send {
    /// Next inbound text frame, or `None` if nothing arrived in time
    fn recv(&mut self) -> Result<Option<String>>;

    fn send(&mut self, text: &str) -> Result<()>;

    fn close(&mut self);
}

/// Synchronous WebSocket client over plain TCP.
pub struct TungsteniteSocket {
    socket: WebSocket<MaybeTlsStream<TcpStream>>,
    url: String,
}

impl std::fmt::Debug for TungsteniteSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TungsteniteSocket")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl TungsteniteSocket {
    /// A send that cannot finish within `write_timeout` fails the link, so a
    /// console that stops reading cannot block shutdown.
    pub fn connect(url: &str, read_timeout: Duration, write_timeout: Duration) -> Result<Self> {
        let (mut socket, response) = tungstenite::connect(url)
            .map_err(|err| BridgeError::Disconnected(format!("connect to {url}: {err}")))?;
        if let MaybeTlsStream::Plain(stream) = socket.get_mut() {
            stream.set_read_timeout(Some(read_timeout))?;
            stream.set_write_timeout(Some(write_timeout))?;
        }
        log::info!("Connected to {url} (HTTP {})", response.status());
        Ok(Self {
            socket,
            url: url.to_string(),
        })
    }
}

impl MessageSocket for TungsteniteSocket {
    fn recv(&mut self) -> Result<Option<String>> {
        match self.socket.read() {
            Ok(Message::Text(text)) => Ok(Some(text)),
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => Ok(Some(text)),
                Err(_) => {
                    log::warn!("Ignoring non UTF-8 binary frame from {}", self.url);
                    Ok(None)
                }
            },
            Ok(Message::Close(frame)) => Err(BridgeError::Disconnected(format!(
                "{} closed the connection: {frame:?}",
                self.url
            ))),
            // Pings are answered by tungstenite on the next write or read
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => Ok(None),
            Err(tungstenite::Error::Io(err))
                if matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
            {
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn send(&mut self, text: &str) -> Result<()> {
        self.socket.send(Message::Text(text.to_string()))?;
        Ok(())
    }

    fn close(&mut self) {
        if let Err(err) = self.socket.close(None) {
            log::debug!("Closing {}: {err}", self.url);
        }
        // Push out the close frame; errors here only mean the peer is gone
        let _ = self.socket.flush();
    }
}

/// In-process socket backed by two channels.
///
/// The bridge holds the [`ChannelSocket`]; the other side holds a
/// [`ConsoleEnd`] and plays the operator console. Dropping either side reads
/// as a lost connection on the other.
#[derive(Debug)]
pub struct ChannelSocket {
    incoming: Receiver<String>,
    outgoing: Sender<String>,
    read_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ConsoleEnd {
    to_bridge: Sender<String>,
    from_bridge: Receiver<String>,
}

impl ChannelSocket {
    pub fn pair(read_timeout: Duration) -> (ChannelSocket, ConsoleEnd) {
        let (to_bridge, incoming) = flume::unbounded();
        let (outgoing, from_bridge) = flume::unbounded();
        (
            ChannelSocket {
                incoming,
                outgoing,
                read_timeout,
            },
            ConsoleEnd {
                to_bridge,
                from_bridge,
            },
        )
    }
}

impl MessageSocket for ChannelSocket {
    fn recv(&mut self) -> Result<Option<String>> {
        match self.incoming.recv_timeout(self.read_timeout) {
            Ok(text) => Ok(Some(text)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(BridgeError::Disconnected("console end dropped".to_string()))
            }
        }
    }

    fn send(&mut self, text: &str) -> Result<()> {
        self.outgoing
            .send(text.to_string())
            .map_err(|_| BridgeError::Disconnected("console end dropped".to_string()))
    }

    fn close(&mut self) {}
}

impl ConsoleEnd {
    pub fn send(&self, text: &str) -> bool {
        self.to_bridge.send(text.to_string()).is_ok()
    }

    /// Wait up to `timeout` for the next message from the bridge
    pub fn recv_timeout(&self, timeout: Duration) -> Option<serde_json::Value> {
        let text = self.from_bridge.recv_timeout(timeout).ok()?;
        serde_json::from_str(&text).ok()
    }

    /// Everything the bridge has sent so far
    pub fn drain(&self) -> Vec<serde_json::Value> {
        self.from_bridge
            .try_iter()
            .filter_map(|text| serde_json::from_str(&text).ok())
            .collect()
    }
}
