//! Ingress session - the per-connection text protocol.
//!
//! One thread per client. Each `\n`-terminated line is timestamped and
//! ACKed immediately (before matching, so clients can measure RTT), then
//! parsed into a command record and handed to the engine through the
//! bounded queue. The reply handle travels inside the record; the engine
//! writes event lines back through it.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::command::{Command, CommandRecord, Side};
use crate::queue::CommandQueue;
use crate::tick::TickFormat;

/// Longest accepted input line (excluding the newline). Oversized lines
/// terminate the session.
pub const MAX_LINE_BYTES: usize = 8192;

// ============================================================================
// Reply sink
// ============================================================================

/// Write half of a client connection, shared between the ingress thread
/// (ACK/ERROR/BYE) and the engine (event lines).
///
/// Every write happens under the lock as one `write_all`, so concurrent
/// writers never interleave inside a line.
pub struct ReplySink {
    inner: Mutex<Box<dyn Write + Send>>,
}

impl ReplySink {
    pub fn new(writer: impl Write + Send + 'static) -> Arc<Self> {
        Arc::new(Self { inner: Mutex::new(Box::new(writer)) })
    }

    /// Sink that drops everything (tests, benchmarks).
    pub fn discard() -> Arc<Self> {
        Self::new(io::sink())
    }

    /// Write a pre-assembled multi-line payload atomically.
    pub fn write_payload(&self, payload: &[u8]) -> io::Result<()> {
        let mut writer = self.inner.lock();
        writer.write_all(payload)?;
        writer.flush()
    }

    /// Write one line, appending the newline.
    pub fn write_line(&self, line: &str) -> io::Result<()> {
        let mut writer = self.inner.lock();
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()
    }
}

// ============================================================================
// Order id allocation
// ============================================================================

/// Server-side order id allocator: ids start at 1 and only grow, never
/// reused for the lifetime of the process.
///
/// Shared among ingress threads as an atomic, so ids are assigned at parse
/// time before the record is enqueued; uniqueness and monotonicity hold
/// regardless of queue interleaving.
pub struct OrderIds {
    next: AtomicI64,
}

impl OrderIds {
    pub fn new() -> Self {
        Self { next: AtomicI64::new(1) }
    }

    #[inline]
    pub fn next_id(&self) -> i64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for OrderIds {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Protocol parsing
// ============================================================================

/// One parsed client line, before id assignment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Request {
    New { side: Side, qty: i32, price_ticks: i64 },
    Cancel { id: i64 },
    Replace { id: i64, new_qty: i32, new_price_ticks: i64 },
    Quit,
}

const BAD_NEW: &str = "Invalid order. Expected: NEW BUY|SELL <qty> @ <price>";
const BAD_CXL: &str = "Invalid cancel. Expected: CXL <order_id>";
const BAD_MOD: &str = "Invalid replace. Expected: MOD <order_id> <new_qty> @ <new_price>";
const BAD_CMD: &str = "Unknown command";

/// Parse one client line. Tokens are case-sensitive and separated by one
/// or more spaces. The error is the reply text (minus the `ERROR ` tag).
pub fn parse_request(line: &str, fmt: &TickFormat) -> Result<Request, &'static str> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    match tokens.as_slice() {
        ["QUIT"] => Ok(Request::Quit),
        ["NEW", side, qty, "@", px] => {
            let side = Side::parse(side).ok_or(BAD_NEW)?;
            let qty: i32 = qty.parse().ok().filter(|q| *q > 0).ok_or(BAD_NEW)?;
            let price_ticks = fmt.to_ticks(px).ok_or(BAD_NEW)?;
            Ok(Request::New { side, qty, price_ticks })
        }
        ["NEW", ..] => Err(BAD_NEW),
        ["CXL", id] => {
            let id: i64 = id.parse().map_err(|_| BAD_CXL)?;
            Ok(Request::Cancel { id })
        }
        ["CXL", ..] => Err(BAD_CXL),
        ["MOD", id, qty, "@", px] => {
            let id: i64 = id.parse().map_err(|_| BAD_MOD)?;
            let new_qty: i32 = qty.parse().ok().filter(|q| *q > 0).ok_or(BAD_MOD)?;
            let new_price_ticks = fmt.to_ticks(px).ok_or(BAD_MOD)?;
            Ok(Request::Replace { id, new_qty, new_price_ticks })
        }
        ["MOD", ..] => Err(BAD_MOD),
        _ => Err(BAD_CMD),
    }
}

// ============================================================================
// Session loop
// ============================================================================

/// Read one line, enforcing the length cap. `Ok(None)` is end-of-stream;
/// an oversized line is an error.
fn read_line(reader: &mut BufReader<TcpStream>, buf: &mut Vec<u8>) -> io::Result<Option<String>> {
    buf.clear();
    let n = reader
        .by_ref()
        .take(MAX_LINE_BYTES as u64 + 1)
        .read_until(b'\n', buf)?;
    if n == 0 {
        return Ok(None);
    }
    if buf.last() != Some(&b'\n') {
        if n > MAX_LINE_BYTES {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "line too long"));
        }
        // EOF in the middle of a line
        return Ok(None);
    }
    buf.pop();
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

/// Serve one client until EOF, `QUIT`, an I/O failure, or engine shutdown.
///
/// The session never touches the book; everything book-affecting goes
/// through the queue. A stopped queue is answered with `ERROR Engine
/// offline` and the session ends without enqueueing.
pub fn run_session(stream: TcpStream, ids: Arc<OrderIds>, queue: Arc<CommandQueue>, fmt: TickFormat) {
    let peer = stream.peer_addr().ok();
    let reply = match stream.try_clone() {
        Ok(writer) => ReplySink::new(writer),
        Err(err) => {
            debug!(?peer, %err, "could not clone client stream");
            return;
        }
    };
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::with_capacity(256);

    info!(?peer, "client connected");

    loop {
        let line = match read_line(&mut reader, &mut buf) {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!(?peer, "client disconnected");
                break;
            }
            Err(err) => {
                debug!(?peer, %err, "session read failed");
                break;
            }
        };
        if line.is_empty() {
            debug!(?peer, "empty line, closing session");
            break;
        }

        // ACK before parse and enqueue: the client observes the ACK ahead
        // of any reply events for the same command.
        let ts_us = Utc::now().timestamp_micros();
        if reply.write_line(&format!("ACK {}", ts_us)).is_err() {
            break;
        }

        let request = match parse_request(&line, &fmt) {
            Ok(request) => request,
            Err(msg) => {
                if reply.write_line(&format!("ERROR {}", msg)).is_err() {
                    break;
                }
                continue;
            }
        };

        let cmd = match request {
            Request::Quit => {
                let _ = reply.write_line("BYE");
                debug!(?peer, "client quit");
                break;
            }
            Request::New { side, qty, price_ticks } => Command::New {
                side,
                qty,
                price_ticks,
                id: ids.next_id(),
            },
            Request::Cancel { id } => Command::Cancel { id },
            Request::Replace { id, new_qty, new_price_ticks } => Command::Replace {
                old_id: id,
                new_qty,
                new_price_ticks,
                new_id: ids.next_id(),
            },
        };

        if queue.push(CommandRecord { cmd, reply: reply.clone() }).is_err() {
            let _ = reply.write_line("ERROR Engine offline");
            debug!(?peer, "queue stopped, closing session");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt() -> TickFormat {
        TickFormat::default()
    }

    #[test]
    fn test_parse_new() {
        assert_eq!(
            parse_request("NEW BUY 100 @ 50.25", &fmt()),
            Ok(Request::New { side: Side::Buy, qty: 100, price_ticks: 5025 })
        );
        assert_eq!(
            parse_request("NEW SELL 60 @ 50.10", &fmt()),
            Ok(Request::New { side: Side::Sell, qty: 60, price_ticks: 5010 })
        );
    }

    #[test]
    fn test_parse_accepts_extra_spaces() {
        assert_eq!(
            parse_request("NEW   BUY  100   @  50.25", &fmt()),
            Ok(Request::New { side: Side::Buy, qty: 100, price_ticks: 5025 })
        );
    }

    #[test]
    fn test_parse_new_rejects_bad_fields() {
        for line in [
            "NEW BUY 0 @ 50.25",
            "NEW BUY -5 @ 50.25",
            "NEW BUY 100 @ 0",
            "NEW BUY 100 @ -1.50",
            "NEW BUY 100 @ abc",
            "NEW buy 100 @ 50.25",
            "NEW BUY 100 50.25",
            "NEW BUY",
        ] {
            assert_eq!(parse_request(line, &fmt()), Err(BAD_NEW), "line: {}", line);
        }
    }

    #[test]
    fn test_parse_cancel() {
        assert_eq!(parse_request("CXL 10", &fmt()), Ok(Request::Cancel { id: 10 }));
        assert_eq!(parse_request("CXL ten", &fmt()), Err(BAD_CXL));
        assert_eq!(parse_request("CXL", &fmt()), Err(BAD_CXL));
        assert_eq!(parse_request("CXL 1 2", &fmt()), Err(BAD_CXL));
    }

    #[test]
    fn test_parse_replace() {
        assert_eq!(
            parse_request("MOD 20 100 @ 50.10", &fmt()),
            Ok(Request::Replace { id: 20, new_qty: 100, new_price_ticks: 5010 })
        );
        assert_eq!(parse_request("MOD 20 0 @ 50.10", &fmt()), Err(BAD_MOD));
        assert_eq!(parse_request("MOD 20 100 50.10", &fmt()), Err(BAD_MOD));
    }

    #[test]
    fn test_parse_quit_and_unknown() {
        assert_eq!(parse_request("QUIT", &fmt()), Ok(Request::Quit));
        assert_eq!(parse_request("QUIT NOW", &fmt()), Err(BAD_CMD));
        assert_eq!(parse_request("HELLO", &fmt()), Err(BAD_CMD));
        assert_eq!(parse_request("", &fmt()), Err(BAD_CMD));
    }

    #[test]
    fn test_parse_rounds_price_to_tick() {
        assert_eq!(
            parse_request("NEW BUY 10 @ 50.255", &fmt()),
            Ok(Request::New { side: Side::Buy, qty: 10, price_ticks: 5026 })
        );
    }

    #[test]
    fn test_order_ids_monotonic() {
        let ids = OrderIds::new();
        let a = ids.next_id();
        let b = ids.next_id();
        let c = ids.next_id();
        assert_eq!((a, b, c), (1, 2, 3));
    }

    #[test]
    fn test_order_ids_unique_across_threads() {
        use std::collections::HashSet;
        use std::thread;

        let ids = Arc::new(OrderIds::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let ids = ids.clone();
            handles.push(thread::spawn(move || {
                (0..1000).map(|_| ids.next_id()).collect::<Vec<i64>>()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "id {} assigned twice", id);
            }
        }
        assert_eq!(seen.len(), 4000);
    }

    #[test]
    fn test_reply_sink_discard() {
        let sink = ReplySink::discard();
        assert!(sink.write_line("ACK 1").is_ok());
        assert!(sink.write_payload(b"TRADE 1 @ 50.25 against id 1\n").is_ok());
    }
}
