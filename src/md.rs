//! Market-data publisher - best-effort UDP fan-out of book event lines.
//!
//! Write-only and off the correctness path: the TCP reply stream is the
//! authoritative record of matches. Receivers must tolerate drops.

use std::net::UdpSocket;

use tracing::warn;

/// One datagram per event line, no trailing newline. Send failures are
/// silent; when disabled every call is a no-op.
pub struct MarketDataPublisher {
    socket: Option<UdpSocket>,
}

impl MarketDataPublisher {
    /// Publisher aimed at `host:port`.
    ///
    /// Socket setup failure logs a warning and yields a disabled
    /// publisher; market data is not worth refusing to start over.
    pub fn new(host: &str, port: u16) -> Self {
        let socket = UdpSocket::bind(("0.0.0.0", 0)).and_then(|socket| {
            socket.connect((host, port))?;
            Ok(socket)
        });
        match socket {
            Ok(socket) => Self { socket: Some(socket) },
            Err(err) => {
                warn!(%err, host, port, "market data disabled: socket setup failed");
                Self { socket: None }
            }
        }
    }

    /// Publisher that drops everything (`--no-md`).
    pub fn disabled() -> Self {
        Self { socket: None }
    }

    pub fn enabled(&self) -> bool {
        self.socket.is_some()
    }

    /// Transmit one event line as a single datagram, best effort.
    pub fn send_line(&self, line: &str) {
        if let Some(socket) = &self.socket {
            let _ = socket.send(line.as_bytes());
        }
    }
}
