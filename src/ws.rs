//! Shared WebSocket transport.
//!
//! Thin wrapper around `tokio-tungstenite` providing a single-socket,
//! text-frame connection. All WebSocket consumers in the crate should
//! use this module rather than `tokio-tungstenite` directly.
//!
//! # Architecture
//!
//! A single [`connect`] function handles URL→request building and the
//! handshake, bounded by [`CONNECT_TIMEOUT`]. It returns a [`WsConnection`]
//! used strictly half-duplex: each `send_text` is followed by exactly one
//! `recv_text`, matching the UI service's answer-in-order contract, so the
//! stream is deliberately not split into reader/writer halves.
//!
//! By centralizing the connection logic, future enhancements (TLS config,
//! proxy support, metrics) automatically apply to all consumers.

// Rust guideline compliant 2026-02

use anyhow::{bail, Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;

use crate::constants::CONNECT_TIMEOUT;

/// Concrete WebSocket stream type (avoids repeating the generic everywhere).
type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// An established WebSocket connection to the UI service.
pub struct WsConnection {
    stream: WsStream,
}

impl std::fmt::Debug for WsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsConnection").finish_non_exhaustive()
    }
}

impl WsConnection {
    /// Send a UTF-8 text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the send fails (connection closed, I/O error).
    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        self.stream
            .send(tungstenite::Message::Text(text.to_string()))
            .await
            .context("WebSocket send_text failed")
    }

    /// Receive the next text frame.
    ///
    /// Ping/pong and raw frames are skipped internally (tungstenite queues
    /// the pong reply itself). A binary frame, a close frame, or end of
    /// stream is an error — the service speaks JSON text only.
    pub async fn recv_text(&mut self) -> Result<String> {
        loop {
            match self.stream.next().await {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    return Ok(text.to_string());
                }
                Some(Ok(tungstenite::Message::Binary(_))) => {
                    bail!("unexpected binary frame from service");
                }
                Some(Ok(tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_))) => {
                    continue;
                }
                Some(Ok(tungstenite::Message::Close(_))) => {
                    bail!("service closed the connection");
                }
                Some(Ok(tungstenite::Message::Frame(_))) => {
                    // Raw frames — skip
                    continue;
                }
                Some(Err(e)) => {
                    return Err(anyhow::anyhow!("WebSocket read error: {e}"));
                }
                None => bail!("connection closed before a response arrived"),
            }
        }
    }

    /// Send a close frame and flush. Best-effort — errors are ignored by
    /// callers tearing the connection down anyway.
    pub async fn close(&mut self) -> Result<()> {
        self.stream.close(None).await.context("WebSocket close failed")
    }
}

/// Connect to a WebSocket URL.
///
/// Builds an HTTP request from `url` and performs the WebSocket handshake,
/// bounded by [`CONNECT_TIMEOUT`].
///
/// # Errors
///
/// Returns an error if the URL is invalid, the handshake fails, or the
/// timeout elapses.
pub async fn connect(url: &str) -> Result<WsConnection> {
    use tungstenite::client::IntoClientRequest;

    let request = url
        .into_client_request()
        .with_context(|| format!("invalid WebSocket URL: {url}"))?;

    let (stream, _response) = tokio::time::timeout(
        CONNECT_TIMEOUT,
        tokio_tungstenite::connect_async(request),
    )
    .await
    .with_context(|| format!("WebSocket connect to {url} timed out"))?
    .context("WebSocket connect failed")?;

    Ok(WsConnection { stream })
}

/// Convert an HTTP(S) URL to WS(S) scheme.
///
/// Passes `ws://` and `wss://` through unchanged.
#[must_use]
pub fn http_to_ws_scheme(url: &str) -> String {
    if url.starts_with("wss://") || url.starts_with("ws://") {
        url.to_string()
    } else {
        url.replace("https://", "wss://")
            .replace("http://", "ws://")
    }
}
