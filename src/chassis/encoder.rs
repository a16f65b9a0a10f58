// Per-wheel pulse counters.
//
// Pulse delivery is the only true preemption point in the system, so the
// increment path is a single relaxed atomic add and nothing else. The
// "count only while moving" guard lives in the caller (Chassis::on_encoder_pulse)
// where the movement state is visible.

use std::sync::atomic::{AtomicU32, Ordering};

use super::state::Wheel;

/// Monotonically-increasing tick counters, one per wheel, reset at the start
/// of every tick-bounded move.
#[derive(Debug, Default)]
pub struct EncoderCounters {
    left: AtomicU32,
    right: AtomicU32,
}

impl EncoderCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one detected pulse edge on the given wheel.
    pub fn increment(&self, wheel: Wheel) {
        match wheel {
            Wheel::Left => self.left.fetch_add(1, Ordering::Relaxed),
            Wheel::Right => self.right.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn count(&self, wheel: Wheel) -> u32 {
        match wheel {
            Wheel::Left => self.left.load(Ordering::Relaxed),
            Wheel::Right => self.right.load(Ordering::Relaxed),
        }
    }

    /// Both counters as (left, right).
    pub fn snapshot(&self) -> (u32, u32) {
        (self.count(Wheel::Left), self.count(Wheel::Right))
    }

    /// Zero both counters. Called at command issue, never by the loop.
    pub fn reset(&self) {
        self.left.store(0, Ordering::Relaxed);
        self.right.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let counters = EncoderCounters::new();
        assert_eq!(counters.snapshot(), (0, 0));
    }

    #[test]
    fn increments_are_per_wheel() {
        let counters = EncoderCounters::new();
        counters.increment(Wheel::Left);
        counters.increment(Wheel::Left);
        counters.increment(Wheel::Right);
        assert_eq!(counters.count(Wheel::Left), 2);
        assert_eq!(counters.count(Wheel::Right), 1);
    }

    #[test]
    fn reset_zeroes_both_sides() {
        let counters = EncoderCounters::new();
        for _ in 0..30 {
            counters.increment(Wheel::Left);
            counters.increment(Wheel::Right);
        }
        counters.reset();
        assert_eq!(counters.snapshot(), (0, 0));
    }
}
