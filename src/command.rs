//! Command and event types plus the wire-line codec.
//!
//! Commands are inputs from ingress threads to the engine.
//! Events are outputs from the book, rendered as one ASCII line each for
//! both the TCP reply stream and the UDP market-data feed.

use std::fmt;
use std::sync::Arc;

use crate::session::ReplySink;
use crate::tick::TickFormat;

/// Order side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Returns the opposite side
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Wire token for this side.
    pub const fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

    /// Parse a wire token (case-sensitive).
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "BUY" => Some(Side::Buy),
            "SELL" => Some(Side::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Input Commands
// ============================================================================

/// Book-affecting work item carried from a network thread to the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Place a new limit order. `id` is server-assigned before enqueue.
    New {
        side: Side,
        qty: i32,
        price_ticks: i64,
        id: i64,
    },
    /// Cancel a resting order.
    Cancel { id: i64 },
    /// Cancel `old_id` and place a replacement on the same side under a
    /// fresh `new_id` (also assigned before enqueue).
    Replace {
        old_id: i64,
        new_qty: i32,
        new_price_ticks: i64,
        new_id: i64,
    },
}

/// A command plus the reply handle of the connection it came from.
///
/// The engine writes the resulting event lines back through `reply`.
#[derive(Clone)]
pub struct CommandRecord {
    pub cmd: Command,
    pub reply: Arc<ReplySink>,
}

impl fmt::Debug for CommandRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRecord").field("cmd", &self.cmd).finish()
    }
}

// ============================================================================
// Output Events
// ============================================================================

/// Error events the book can emit in place of (or alongside) success events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BookError {
    /// qty <= 0, price <= 0, or duplicate id on a new order
    InvalidOrder,
    /// Cancel/replace named an id that is not resting
    UnknownOrder(i64),
    /// Replace parameters failed validation after the cancel half ran
    InvalidReplace,
    /// The order slab has no free node for the residual add
    BookFull,
}

/// Book events, one wire line each.
///
/// Prices are carried in ticks; rendering goes through a [`TickFormat`]
/// so the event model stays independent of display.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BookEvent {
    /// A fill against the resting (maker) order `maker_id`
    Trade { qty: i32, price_ticks: i64, maker_id: i64 },
    /// Residual quantity now resting in the book
    OrderAdded {
        side: Side,
        qty: i32,
        price_ticks: i64,
        id: i64,
    },
    /// Resting order removed by cancel or replace
    Canceled { id: i64 },
    /// Replace succeeded in transferring the id
    Replaced { old_id: i64, new_id: i64 },
    /// Top-of-book snapshot, bid side
    BestBid { price_ticks: i64, qty: i64 },
    /// Top-of-book snapshot, ask side
    BestAsk { price_ticks: i64, qty: i64 },
    /// Error outcome
    Error(BookError),
}

impl BookEvent {
    /// Render as one wire line (no trailing newline).
    pub fn render(&self, fmt: &TickFormat) -> String {
        match *self {
            BookEvent::Trade { qty, price_ticks, maker_id } => {
                format!("TRADE {} @ {} against id {}", qty, fmt.fmt(price_ticks), maker_id)
            }
            BookEvent::OrderAdded { side, qty, price_ticks, id } => {
                format!("ORDER_ADDED {} {} @ {} id {}", side, qty, fmt.fmt(price_ticks), id)
            }
            BookEvent::Canceled { id } => format!("CANCELED id {}", id),
            BookEvent::Replaced { old_id, new_id } => {
                format!("REPLACED {} -> {}", old_id, new_id)
            }
            BookEvent::BestBid { price_ticks, qty } => {
                format!("BEST_BID {} x {}", fmt.fmt(price_ticks), qty)
            }
            BookEvent::BestAsk { price_ticks, qty } => {
                format!("BEST_ASK {} x {}", fmt.fmt(price_ticks), qty)
            }
            BookEvent::Error(err) => match err {
                BookError::InvalidOrder => "ERROR Invalid order".to_owned(),
                BookError::UnknownOrder(id) => format!("ERROR Unknown order id {}", id),
                BookError::InvalidReplace => "ERROR Invalid replace parameters".to_owned(),
                BookError::BookFull => "ERROR Book full".to_owned(),
            },
        }
    }

    /// Parse one wire line back into its logical event.
    ///
    /// Inverse of [`BookEvent::render`]; returns `None` for lines that are
    /// not book events (e.g. `ACK`, `BYE`).
    pub fn parse(line: &str, fmt: &TickFormat) -> Option<BookEvent> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            ["TRADE", qty, "@", px, "against", "id", maker_id] => Some(BookEvent::Trade {
                qty: qty.parse().ok()?,
                price_ticks: fmt.to_ticks(px)?,
                maker_id: maker_id.parse().ok()?,
            }),
            ["ORDER_ADDED", side, qty, "@", px, "id", id] => Some(BookEvent::OrderAdded {
                side: Side::parse(side)?,
                qty: qty.parse().ok()?,
                price_ticks: fmt.to_ticks(px)?,
                id: id.parse().ok()?,
            }),
            ["CANCELED", "id", id] => Some(BookEvent::Canceled { id: id.parse().ok()? }),
            ["REPLACED", old_id, "->", new_id] => Some(BookEvent::Replaced {
                old_id: old_id.parse().ok()?,
                new_id: new_id.parse().ok()?,
            }),
            ["BEST_BID", px, "x", qty] => Some(BookEvent::BestBid {
                price_ticks: fmt.to_ticks(px)?,
                qty: qty.parse().ok()?,
            }),
            ["BEST_ASK", px, "x", qty] => Some(BookEvent::BestAsk {
                price_ticks: fmt.to_ticks(px)?,
                qty: qty.parse().ok()?,
            }),
            ["ERROR", "Invalid", "order"] => Some(BookEvent::Error(BookError::InvalidOrder)),
            ["ERROR", "Unknown", "order", "id", id] => {
                Some(BookEvent::Error(BookError::UnknownOrder(id.parse().ok()?)))
            }
            ["ERROR", "Invalid", "replace", "parameters"] => {
                Some(BookEvent::Error(BookError::InvalidReplace))
            }
            ["ERROR", "Book", "full"] => Some(BookEvent::Error(BookError::BookFull)),
            _ => None,
        }
    }
}
