//! Engine - the single consumer that owns the book.
//!
//! Drains the command queue, applies each command to the book, and routes
//! the resulting event lines: one newline-joined payload back to the
//! originating connection, and each bare line to the market-data
//! publisher. No other thread reads or writes the book.

use tracing::{debug, info};

use crate::command::{Command, CommandRecord};
use crate::md::MarketDataPublisher;
use crate::order_book::OrderBook;
use crate::queue::CommandQueue;
use crate::tick::TickFormat;

pub struct Engine {
    book: OrderBook,
    fmt: TickFormat,
    md: MarketDataPublisher,
}

impl Engine {
    pub fn new(book: OrderBook, fmt: TickFormat, md: MarketDataPublisher) -> Self {
        Self { book, fmt, md }
    }

    /// Drain the queue until it reports stopped-and-drained.
    pub fn run(&mut self, queue: &CommandQueue) {
        info!(md_enabled = self.md.enabled(), "engine started");
        while let Some(record) = queue.pop() {
            self.process_record(&record);
        }
        info!(resting_orders = self.book.order_count(), "engine drained, stopping");
    }

    /// Apply one command and route its events.
    pub fn process_record(&mut self, record: &CommandRecord) {
        let events = match record.cmd {
            Command::New { side, qty, price_ticks, id } => {
                self.book.process_new(side, qty, price_ticks, id)
            }
            Command::Cancel { id } => self.book.cancel(id),
            Command::Replace { old_id, new_qty, new_price_ticks, new_id } => {
                self.book.replace(old_id, new_qty, new_price_ticks, new_id)
            }
        };
        if events.is_empty() {
            return;
        }

        let mut payload = String::new();
        for event in &events {
            let line = event.render(&self.fmt);
            self.md.send_line(&line);
            payload.push_str(&line);
            payload.push('\n');
        }

        // A dead peer is the session's problem; the book already moved on.
        if let Err(err) = record.reply.write_payload(payload.as_bytes()) {
            debug!(%err, "reply write failed");
        }
    }

    /// Pin the engine thread to the last CPU core (typically the one the
    /// OS bothers least).
    pub fn pin_to_core(&self) {
        if let Some(core_ids) = core_affinity::get_core_ids() {
            if let Some(last_core) = core_ids.last() {
                core_affinity::set_for_current(*last_core);
            }
        }
    }

    /// Pre-fault the book's memory before trading starts.
    pub fn warm_up(&mut self) {
        self.book.warm_up();
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }
}
