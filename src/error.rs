//! Setup-time error types.
//!
//! Only startup can fail hard. Once the exchange is serving, bad commands
//! become `ERROR` reply lines and I/O failures are absorbed by the session
//! or logged by the engine.

use std::io;

use thiserror::Error;

/// Fatal errors while bringing the server up.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind TCP listener on port {port}: {source}")]
    Bind { port: u16, source: io::Error },

    #[error("failed to read listener address: {0}")]
    LocalAddr(#[source] io::Error),

    #[error("failed to spawn engine thread: {0}")]
    SpawnEngine(#[source] io::Error),
}
