//! # Tickmatch
//!
//! A single-symbol limit order matching exchange over line-oriented TCP,
//! with best-effort UDP market-data fan-out.
//!
//! ## Design Principles
//!
//! - **Single-Writer**: one engine thread owns the order book exclusively
//! - **Integer ticks**: the book is numeric-only; price text is a policy
//!   injected at the edges
//! - **Bounded handoff**: ingress threads and the engine meet at one bounded
//!   blocking queue, which is the global serialization point
//! - **Arena allocation**: resting orders live in a pre-allocated slab
//!
//! ## Architecture
//!
//! ```text
//! [Ingress Threads] --> [Bounded Command Queue] --> [Engine Thread]
//!       |  ACK                                        |        |
//!       v                                             v        v
//!   [TCP client]  <----------- reply events ------ [TCP]   [UDP MD]
//! ```

pub mod arena;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod md;
pub mod order_book;
pub mod price_level;
pub mod queue;
pub mod server;
pub mod session;
pub mod tick;

// Re-exports for convenience
pub use arena::{Arena, ArenaIndex, OrderNode, NULL_INDEX};
pub use command::{BookError, BookEvent, Command, CommandRecord, Side};
pub use config::Config;
pub use engine::Engine;
pub use error::ServerError;
pub use md::MarketDataPublisher;
pub use order_book::OrderBook;
pub use price_level::PriceLevel;
pub use queue::{CommandQueue, PushError};
pub use server::ExchangeServer;
pub use session::{OrderIds, ReplySink};
pub use tick::TickFormat;
