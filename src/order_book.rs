//! Order book - price-time priority over integer ticks.
//!
//! Two ordered maps of price levels (bids highest-first, asks lowest-first),
//! an id index for O(1) cancel lookup, and the cross/rest matching
//! algorithm. Every operation returns the ordered event sequence it
//! produced; top-of-book snapshot events come last, bid before ask.
//!
//! The book is numeric-only: it never sees price text. One engine thread
//! owns it exclusively.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::arena::{Arena, ArenaIndex, OrderNode, NULL_INDEX};
use crate::command::{BookError, BookEvent, Side};
use crate::price_level::PriceLevel;

/// Where a resting order lives, kept alongside the id index.
#[derive(Clone, Copy, Debug)]
pub struct OrderInfo {
    /// Node in the arena
    pub arena_index: ArenaIndex,
    /// Book side holding the order
    pub side: Side,
    /// Price level holding the order
    pub price_ticks: i64,
}

/// The central limit order book.
///
/// Sides are `BTreeMap`s keyed by price ticks: the best bid is the last
/// key, the best ask the first. Each level is an arrival-order FIFO of
/// arena nodes; the id index points straight at the node so a cancel never
/// scans the level.
pub struct OrderBook {
    arena: Arena,
    bids: BTreeMap<i64, PriceLevel>,
    asks: BTreeMap<i64, PriceLevel>,
    /// OrderId -> location, present exactly while the order rests
    order_map: FxHashMap<i64, OrderInfo>,
}

impl OrderBook {
    /// Create a book holding up to `capacity` resting orders.
    pub fn new(capacity: u32) -> Self {
        Self {
            arena: Arena::new(capacity),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            order_map: FxHashMap::with_capacity_and_hasher(capacity as usize, Default::default()),
        }
    }

    // ========================================================================
    // Public operations
    // ========================================================================

    /// Process a new limit order: match against the opposite side while the
    /// limit crosses, then rest any residual at `price_ticks`.
    ///
    /// Rejects qty <= 0, price <= 0, and ids that are already resting with
    /// a single `ERROR Invalid order` event and no state change.
    pub fn process_new(&mut self, side: Side, qty: i32, price_ticks: i64, id: i64) -> Vec<BookEvent> {
        let mut events = Vec::new();

        if qty <= 0 || price_ticks <= 0 || self.order_map.contains_key(&id) {
            events.push(BookEvent::Error(BookError::InvalidOrder));
            return events;
        }

        let remaining = self.cross(side, qty, price_ticks, &mut events);
        if remaining > 0 {
            self.rest(side, remaining, price_ticks, id, &mut events);
        }

        self.refresh_snapshots(&mut events);
        events
    }

    /// Cancel a resting order by id.
    pub fn cancel(&mut self, id: i64) -> Vec<BookEvent> {
        let mut events = Vec::new();
        self.cancel_inner(id, &mut events);
        self.refresh_snapshots(&mut events);
        events
    }

    /// Cancel `old_id` and place a replacement on the same side.
    ///
    /// Emits the cancel outcome, then `REPLACED old -> new`, then the
    /// replacement add's events. Invalid replacement parameters skip the
    /// add and emit `ERROR Invalid replace parameters` instead; the cancel
    /// half stands either way.
    pub fn replace(&mut self, old_id: i64, new_qty: i32, new_price_ticks: i64, new_id: i64) -> Vec<BookEvent> {
        let mut events = Vec::new();

        let Some(info) = self.cancel_inner(old_id, &mut events) else {
            self.refresh_snapshots(&mut events);
            return events;
        };

        events.push(BookEvent::Replaced { old_id, new_id });

        if new_qty <= 0 || new_price_ticks <= 0 || self.order_map.contains_key(&new_id) {
            events.push(BookEvent::Error(BookError::InvalidReplace));
            self.refresh_snapshots(&mut events);
            return events;
        }

        // Replace preserves the side of the canceled order.
        let remaining = self.cross(info.side, new_qty, new_price_ticks, &mut events);
        if remaining > 0 {
            self.rest(info.side, remaining, new_price_ticks, new_id, &mut events);
        }

        self.refresh_snapshots(&mut events);
        events
    }

    // ========================================================================
    // Matching
    // ========================================================================

    /// Match an incoming order against the opposite side while its limit
    /// crosses the top level. Returns the unmatched remainder.
    fn cross(&mut self, side: Side, qty: i32, limit_ticks: i64, events: &mut Vec<BookEvent>) -> i32 {
        let mut remaining = qty;

        while remaining > 0 {
            let top = match side {
                Side::Buy => self.asks.first_key_value().map(|(&px, _)| px),
                Side::Sell => self.bids.last_key_value().map(|(&px, _)| px),
            };
            let Some(top) = top else { break };

            let crosses = match side {
                Side::Buy => top <= limit_ticks,
                Side::Sell => top >= limit_ticks,
            };
            if !crosses {
                break;
            }

            remaining = self.match_at_level(side.opposite(), top, remaining, events);
        }

        remaining
    }

    /// Trade against the FIFO at one opposite-side level, head first.
    fn match_at_level(
        &mut self,
        maker_side: Side,
        price_ticks: i64,
        mut remaining: i32,
        events: &mut Vec<BookEvent>,
    ) -> i32 {
        loop {
            if remaining == 0 {
                break;
            }

            let level = match maker_side {
                Side::Buy => self.bids.get_mut(&price_ticks),
                Side::Sell => self.asks.get_mut(&price_ticks),
            };
            let Some(level) = level else { break };
            let maker_idx = level.peek_head();
            if maker_idx == NULL_INDEX {
                break;
            }

            let (maker_id, maker_qty) = {
                let maker = self.arena.get(maker_idx);
                (maker.order_id, maker.qty)
            };

            let trade_qty = remaining.min(maker_qty);
            events.push(BookEvent::Trade { qty: trade_qty, price_ticks, maker_id });
            remaining -= trade_qty;
            let maker_left = maker_qty - trade_qty;

            if maker_left == 0 {
                // Maker fully filled: unlink, drop its index entry, free the node
                level.pop_front(&mut self.arena);
                let emptied = level.is_empty();
                self.arena.free(maker_idx);
                self.order_map.remove(&maker_id);
                if emptied {
                    match maker_side {
                        Side::Buy => self.bids.remove(&price_ticks),
                        Side::Sell => self.asks.remove(&price_ticks),
                    };
                }
            } else {
                // Partial fill leaves the maker in place (no re-queue)
                self.arena.get_mut(maker_idx).qty = maker_left;
                level.subtract_qty(trade_qty);
            }
        }

        remaining
    }

    /// Rest a residual at its limit price, creating the level if absent.
    fn rest(&mut self, side: Side, qty: i32, price_ticks: i64, id: i64, events: &mut Vec<BookEvent>) {
        let Some(arena_idx) = self.arena.alloc() else {
            events.push(BookEvent::Error(BookError::BookFull));
            return;
        };
        *self.arena.get_mut(arena_idx) = OrderNode::new(id, price_ticks, qty);

        let level = match side {
            Side::Buy => self.bids.entry(price_ticks).or_insert_with(PriceLevel::new),
            Side::Sell => self.asks.entry(price_ticks).or_insert_with(PriceLevel::new),
        };
        level.push_back(&mut self.arena, arena_idx);

        self.order_map.insert(id, OrderInfo { arena_index: arena_idx, side, price_ticks });

        events.push(BookEvent::OrderAdded { side, qty, price_ticks, id });
    }

    /// Remove a resting order; emits `CANCELED` or `ERROR Unknown order id`.
    /// Returns the removed order's location when it existed.
    fn cancel_inner(&mut self, id: i64, events: &mut Vec<BookEvent>) -> Option<OrderInfo> {
        let Some(info) = self.order_map.remove(&id) else {
            events.push(BookEvent::Error(BookError::UnknownOrder(id)));
            return None;
        };

        let level = match info.side {
            Side::Buy => self.bids.get_mut(&info.price_ticks),
            Side::Sell => self.asks.get_mut(&info.price_ticks),
        };
        if let Some(level) = level {
            let emptied = level.remove(&mut self.arena, info.arena_index);
            if emptied {
                match info.side {
                    Side::Buy => self.bids.remove(&info.price_ticks),
                    Side::Sell => self.asks.remove(&info.price_ticks),
                };
            }
        }
        self.arena.free(info.arena_index);

        events.push(BookEvent::Canceled { id });
        Some(info)
    }

    /// Append the top-of-book snapshot lines, bid before ask, skipping
    /// empty sides.
    fn refresh_snapshots(&self, events: &mut Vec<BookEvent>) {
        if let Some((&px, level)) = self.bids.last_key_value() {
            events.push(BookEvent::BestBid { price_ticks: px, qty: level.total_qty });
        }
        if let Some((&px, level)) = self.asks.first_key_value() {
            events.push(BookEvent::BestAsk { price_ticks: px, qty: level.total_qty });
        }
    }

    // ========================================================================
    // Read-only queries
    // ========================================================================

    #[inline]
    pub fn has_best_bid(&self) -> bool {
        !self.bids.is_empty()
    }

    #[inline]
    pub fn has_best_ask(&self) -> bool {
        !self.asks.is_empty()
    }

    /// Highest bid price, if any.
    #[inline]
    pub fn best_bid_ticks(&self) -> Option<i64> {
        self.bids.last_key_value().map(|(&px, _)| px)
    }

    /// Lowest ask price, if any.
    #[inline]
    pub fn best_ask_ticks(&self) -> Option<i64> {
        self.asks.first_key_value().map(|(&px, _)| px)
    }

    /// Total resting quantity at the best bid (0 when the side is empty).
    #[inline]
    pub fn best_bid_qty(&self) -> i64 {
        self.bids.last_key_value().map_or(0, |(_, level)| level.total_qty)
    }

    /// Total resting quantity at the best ask (0 when the side is empty).
    #[inline]
    pub fn best_ask_qty(&self) -> i64 {
        self.asks.first_key_value().map_or(0, |(_, level)| level.total_qty)
    }

    #[inline]
    pub fn contains_order(&self, id: i64) -> bool {
        self.order_map.contains_key(&id)
    }

    pub fn order_count(&self) -> usize {
        self.order_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order_map.is_empty()
    }

    /// Resting quantity and order count at one price.
    pub fn depth_at(&self, side: Side, price_ticks: i64) -> (i64, u32) {
        let level = match side {
            Side::Buy => self.bids.get(&price_ticks),
            Side::Sell => self.asks.get(&price_ticks),
        };
        level.map_or((0, 0), |l| (l.total_qty, l.count))
    }

    /// Total resting quantity on one side (diagnostic; sums the levels).
    pub fn side_qty(&self, side: Side) -> i64 {
        let levels = match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        };
        levels.values().map(|l| l.total_qty).sum()
    }

    /// Drop every resting order.
    pub fn clear(&mut self) {
        let capacity = self.arena.capacity();
        self.arena = Arena::new(capacity);
        self.bids.clear();
        self.asks.clear();
        self.order_map.clear();
    }

    /// Pre-fault the arena pages before trading starts.
    pub fn warm_up(&mut self) {
        self.arena.warm_up();
    }

    /// Digest of the observable book state, for determinism tests.
    pub fn state_hash(&self) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        self.best_bid_ticks().hash(&mut hasher);
        self.best_ask_ticks().hash(&mut hasher);
        self.best_bid_qty().hash(&mut hasher);
        self.best_ask_qty().hash(&mut hasher);
        self.order_count().hash(&mut hasher);
        self.arena.allocated().hash(&mut hasher);
        hasher.finish()
    }
}

impl std::fmt::Debug for OrderBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderBook")
            .field("best_bid", &self.best_bid_ticks())
            .field("best_ask", &self.best_ask_ticks())
            .field("bid_levels", &self.bids.len())
            .field("ask_levels", &self.asks.len())
            .field("order_count", &self.order_map.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tick::TickFormat;

    fn book() -> OrderBook {
        OrderBook::new(10_000)
    }

    fn lines(events: &[BookEvent]) -> Vec<String> {
        let fmt = TickFormat::default();
        events.iter().map(|e| e.render(&fmt)).collect()
    }

    #[test]
    fn test_add_without_cross() {
        let mut book = book();
        let events = book.process_new(Side::Buy, 100, 5025, 1);
        assert_eq!(
            lines(&events),
            vec!["ORDER_ADDED BUY 100 @ 50.25 id 1", "BEST_BID 50.25 x 100"]
        );
        assert_eq!(book.best_bid_ticks(), Some(5025));
        assert_eq!(book.best_ask_ticks(), None);
        assert_eq!(book.order_count(), 1);
    }

    #[test]
    fn test_cross_into_resting_bid() {
        let mut book = book();
        book.process_new(Side::Buy, 100, 5025, 1);

        let events = book.process_new(Side::Sell, 60, 5010, 2);
        assert_eq!(
            lines(&events),
            vec!["TRADE 60 @ 50.25 against id 1", "BEST_BID 50.25 x 40"]
        );
        assert_eq!(book.best_bid_qty(), 40);
        assert!(!book.has_best_ask());
        assert!(!book.contains_order(2));
    }

    #[test]
    fn test_partial_fill_residual_rests() {
        let mut book = book();
        book.process_new(Side::Buy, 50, 5025, 1);

        let events = book.process_new(Side::Sell, 120, 5020, 2);
        assert_eq!(
            lines(&events),
            vec![
                "TRADE 50 @ 50.25 against id 1",
                "ORDER_ADDED SELL 70 @ 50.20 id 2",
                "BEST_ASK 50.20 x 70",
            ]
        );
        assert_eq!(book.best_bid_ticks(), None);
        assert_eq!(book.best_ask_ticks(), Some(5020));
    }

    #[test]
    fn test_fifo_within_level() {
        let mut book = book();
        book.process_new(Side::Buy, 100, 5025, 1);
        book.process_new(Side::Buy, 50, 5025, 3);

        let events = book.process_new(Side::Sell, 120, 5020, 7);
        assert_eq!(
            lines(&events),
            vec![
                "TRADE 100 @ 50.25 against id 1",
                "TRADE 20 @ 50.25 against id 3",
                "BEST_BID 50.25 x 30",
            ]
        );
        assert!(!book.contains_order(1));
        assert!(book.contains_order(3));
    }

    #[test]
    fn test_cancel_empties_side() {
        let mut book = book();
        book.process_new(Side::Buy, 100, 5025, 10);

        let events = book.cancel(10);
        assert_eq!(lines(&events), vec!["CANCELED id 10"]);
        assert!(book.is_empty());
        assert!(!book.has_best_bid());
    }

    #[test]
    fn test_replace_that_crosses() {
        let mut book = book();
        book.process_new(Side::Sell, 100, 5040, 20);
        book.process_new(Side::Buy, 80, 5015, 11);

        let events = book.replace(20, 100, 5010, 21);
        assert_eq!(
            lines(&events),
            vec![
                "CANCELED id 20",
                "REPLACED 20 -> 21",
                "TRADE 80 @ 50.15 against id 11",
                "ORDER_ADDED SELL 20 @ 50.10 id 21",
                "BEST_ASK 50.10 x 20",
            ]
        );
        assert!(!book.contains_order(20));
        assert!(book.contains_order(21));
    }

    #[test]
    fn test_price_priority_across_levels() {
        let mut book = book();
        book.process_new(Side::Sell, 50, 5030, 1);
        book.process_new(Side::Sell, 50, 5010, 2);
        book.process_new(Side::Sell, 50, 5020, 3);

        let events = book.process_new(Side::Buy, 120, 5030, 4);
        let trades: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                BookEvent::Trade { qty, price_ticks, maker_id } => Some((*qty, *price_ticks, *maker_id)),
                _ => None,
            })
            .collect();
        assert_eq!(trades, vec![(50, 5010, 2), (50, 5020, 3), (20, 5030, 1)]);
        assert_eq!(book.depth_at(Side::Sell, 5030), (30, 1));
    }

    #[test]
    fn test_invalid_order_rejected() {
        let mut book = book();
        for (qty, px) in [(0, 5025), (-5, 5025), (10, 0), (10, -100)] {
            let events = book.process_new(Side::Buy, qty, px, 1);
            assert_eq!(lines(&events), vec!["ERROR Invalid order"]);
        }
        assert!(book.is_empty());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut book = book();
        book.process_new(Side::Buy, 100, 5025, 1);
        let events = book.process_new(Side::Sell, 50, 5040, 1);
        assert_eq!(lines(&events), vec!["ERROR Invalid order"]);
        assert_eq!(book.order_count(), 1);
    }

    #[test]
    fn test_cancel_unknown_refreshes_snapshots() {
        let mut book = book();
        book.process_new(Side::Buy, 100, 5025, 1);

        let events = book.cancel(999);
        assert_eq!(
            lines(&events),
            vec!["ERROR Unknown order id 999", "BEST_BID 50.25 x 100"]
        );
    }

    #[test]
    fn test_cancel_twice_reports_unknown() {
        let mut book = book();
        book.process_new(Side::Buy, 100, 5025, 10);

        let first = book.cancel(10);
        assert_eq!(lines(&first), vec!["CANCELED id 10"]);

        let second = book.cancel(10);
        assert_eq!(lines(&second), vec!["ERROR Unknown order id 10"]);
    }

    #[test]
    fn test_replace_unknown_old_id() {
        let mut book = book();
        let events = book.replace(404, 10, 5025, 405);
        assert_eq!(lines(&events), vec!["ERROR Unknown order id 404"]);
        assert!(book.is_empty());
    }

    #[test]
    fn test_replace_invalid_parameters_keep_cancel() {
        let mut book = book();
        book.process_new(Side::Buy, 100, 5025, 1);

        let events = book.replace(1, 0, 5030, 2);
        assert_eq!(
            lines(&events),
            vec!["CANCELED id 1", "REPLACED 1 -> 2", "ERROR Invalid replace parameters"]
        );
        assert!(book.is_empty());
        assert!(!book.contains_order(2));
    }

    #[test]
    fn test_replace_then_cancel_old_and_new() {
        let mut book = book();
        book.process_new(Side::Buy, 100, 5025, 1);
        book.replace(1, 80, 5020, 2);

        let old = book.cancel(1);
        assert_eq!(lines(&old), vec!["ERROR Unknown order id 1", "BEST_BID 50.20 x 80"]);

        let new = book.cancel(2);
        assert_eq!(lines(&new), vec!["CANCELED id 2"]);
        assert!(book.is_empty());
    }

    #[test]
    fn test_partial_fill_keeps_queue_position() {
        let mut book = book();
        book.process_new(Side::Sell, 100, 5030, 1);
        book.process_new(Side::Sell, 100, 5030, 2);

        // Nibble the head; it must stay in front
        book.process_new(Side::Buy, 30, 5030, 3);
        let events = book.process_new(Side::Buy, 100, 5030, 4);
        let trades: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                BookEvent::Trade { qty, maker_id, .. } => Some((*qty, *maker_id)),
                _ => None,
            })
            .collect();
        assert_eq!(trades, vec![(70, 1), (30, 2)]);
    }

    #[test]
    fn test_book_never_crossed() {
        let mut book = book();
        book.process_new(Side::Buy, 100, 5025, 1);
        book.process_new(Side::Sell, 60, 5010, 2);
        book.process_new(Side::Sell, 200, 5010, 3);
        book.process_new(Side::Buy, 50, 5005, 4);

        if let (Some(bid), Some(ask)) = (book.best_bid_ticks(), book.best_ask_ticks()) {
            assert!(bid < ask, "book is crossed: bid {} >= ask {}", bid, ask);
        }
    }

    #[test]
    fn test_book_full_residual_refused() {
        let mut book = OrderBook::new(2);
        book.process_new(Side::Buy, 10, 5000, 1);
        book.process_new(Side::Buy, 10, 5001, 2);

        let events = book.process_new(Side::Buy, 10, 5002, 3);
        let fmt = TickFormat::default();
        assert!(events.iter().any(|e| e.render(&fmt) == "ERROR Book full"));
        assert_eq!(book.order_count(), 2);
    }

    #[test]
    fn test_snapshot_order_bid_before_ask() {
        let mut book = book();
        book.process_new(Side::Sell, 10, 5030, 1);
        let events = book.process_new(Side::Buy, 10, 5020, 2);
        assert_eq!(
            lines(&events),
            vec![
                "ORDER_ADDED BUY 10 @ 50.20 id 2",
                "BEST_BID 50.20 x 10",
                "BEST_ASK 50.30 x 10",
            ]
        );
    }

    #[test]
    fn test_clear() {
        let mut book = book();
        book.process_new(Side::Buy, 100, 5025, 1);
        book.process_new(Side::Sell, 100, 5030, 2);
        book.clear();
        assert!(book.is_empty());
        assert_eq!(book.best_bid_ticks(), None);
        assert_eq!(book.best_ask_ticks(), None);

        // The book is usable again after a clear
        let events = book.process_new(Side::Buy, 10, 5025, 3);
        assert!(!events.is_empty());
        assert_eq!(book.order_count(), 1);
    }

    #[test]
    fn test_side_qty_matches_depth() {
        let mut book = book();
        book.process_new(Side::Buy, 100, 5025, 1);
        book.process_new(Side::Buy, 50, 5025, 2);
        book.process_new(Side::Buy, 30, 5020, 3);
        assert_eq!(book.side_qty(Side::Buy), 180);
        assert_eq!(book.depth_at(Side::Buy, 5025), (150, 2));
        assert_eq!(book.depth_at(Side::Buy, 5020), (30, 1));
    }
}
