//! Runtime configuration and CLI flag parsing.
//!
//! Flags are parsed by hand; the surface is small enough that a parser
//! dependency would outweigh it.

use std::fmt;

pub const USAGE: &str =
    "usage: exchange [--port <port>] [--no-md] [--md-host <host>] [--md-port <port>] [--pin-core]";

/// Exchange server configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// TCP listen port (0 binds an ephemeral port)
    pub port: u16,
    /// UDP market-data fan-out on/off
    pub md_enabled: bool,
    /// Market-data destination host
    pub md_host: String,
    /// Market-data destination port
    pub md_port: u16,
    /// Pin the engine thread to the last CPU core
    pub pin_core: bool,
    /// Command queue capacity
    pub queue_capacity: usize,
    /// Maximum resting orders
    pub book_capacity: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            md_enabled: true,
            md_host: "127.0.0.1".to_owned(),
            md_port: 9001,
            pin_core: false,
            queue_capacity: 4096,
            book_capacity: 1 << 20,
        }
    }
}

/// A flag (or flag value) the parser did not understand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UsageError(pub String);

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for UsageError {}

impl Config {
    /// Parse command-line flags (without the program name).
    pub fn from_args<I, S>(args: I) -> Result<Self, UsageError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut config = Config::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_ref() {
                "--no-md" => config.md_enabled = false,
                "--pin-core" => config.pin_core = true,
                "--port" => config.port = numeric_value(&mut args, "--port")?,
                "--md-port" => config.md_port = numeric_value(&mut args, "--md-port")?,
                "--md-host" => {
                    config.md_host = args
                        .next()
                        .map(|value| value.as_ref().to_owned())
                        .ok_or_else(|| UsageError("--md-host requires a value".to_owned()))?;
                }
                other => return Err(UsageError(format!("unknown flag: {}", other))),
            }
        }
        Ok(config)
    }
}

fn numeric_value<I, S, T>(args: &mut I, flag: &str) -> Result<T, UsageError>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
    T: std::str::FromStr,
{
    args.next()
        .and_then(|value| value.as_ref().parse().ok())
        .ok_or_else(|| UsageError(format!("{} requires a numeric value", flag)))
}
