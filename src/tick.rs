//! Tick formatter - integer ticks to and from decimal price text.
//!
//! The book operates in integer ticks. Converting ticks to a display string
//! (and price text back to ticks) is a policy captured here and injected
//! where lines are produced or parsed, keeping the book numeric-only.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Fixed-point price policy: `scale` fractional digits, `10^scale` ticks
/// per unit of currency. The default (scale 2) gives 100 ticks per unit,
/// i.e. one tick = one cent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickFormat {
    scale: u32,
}

impl TickFormat {
    pub const fn new(scale: u32) -> Self {
        Self { scale }
    }

    /// Ticks per unit currency (100 for two decimal places).
    #[inline]
    pub fn ticks_per_unit(&self) -> i64 {
        10i64.pow(self.scale)
    }

    /// Parse decimal price text into ticks.
    ///
    /// Rounds to the nearest tick, half away from zero. Returns `None` for
    /// unparsable text and for prices that round to zero ticks or below.
    pub fn to_ticks(&self, text: &str) -> Option<i64> {
        let px: Decimal = text.trim().parse().ok()?;
        let ticks = px
            .checked_mul(Decimal::from(self.ticks_per_unit()))?
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()?;
        (ticks > 0).then_some(ticks)
    }

    /// Render ticks as fixed-point text with exactly `scale` fractional
    /// digits, trailing zeros preserved ("50.20", "50.00").
    pub fn fmt(&self, ticks: i64) -> String {
        Decimal::new(ticks, self.scale).to_string()
    }
}

impl Default for TickFormat {
    fn default() -> Self {
        Self::new(2)
    }
}
