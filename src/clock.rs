//! # Monotonic Clock Module
//!
//! Millisecond time source and the "fire at most once per interval" gate used
//! by every component to throttle work without blocking.
//!
//! All timestamps are `u32` milliseconds that wrap around after ~49.7 days.
//! Elapsed time is always computed with `wrapping_sub`, so comparisons stay
//! correct across the wrap.
//!
//! ## Usage
//!
//! ```
//! use rc_link::clock::{Clock, ClockGate, MockClock};
//!
//! let clock = MockClock::new();
//! let mut gate = ClockGate::new(20);
//!
//! assert!(gate.ready(clock.now_ms()));  // first call fires
//! clock.advance(10);
//! assert!(!gate.ready(clock.now_ms())); // too early
//! clock.advance(10);
//! assert!(gate.ready(clock.now_ms()));  // 20 ms elapsed
//! ```

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/// Monotonic millisecond time source.
pub trait Clock {
    /// Returns the current wrapped millisecond counter.
    fn now_ms(&self) -> u32;

    /// Milliseconds elapsed since `since`, safe across counter wrap.
    fn elapsed_since(&self, since: u32) -> u32 {
        self.now_ms().wrapping_sub(since)
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u32 {
        (**self).now_ms()
    }
}

/// Wall clock backed by [`Instant`], counting from construction.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u32 {
        // Truncation is the wrap.
        self.start.elapsed().as_millis() as u32
    }
}

/// Manually driven clock for tests and simulations.
///
/// Clones share the same counter, so one handle can be given to each
/// component while the test advances time through another.
#[derive(Debug, Clone, Default)]
pub struct MockClock {
    now: Rc<Cell<u32>>,
}

impl MockClock {
    /// Creates a clock starting at 0 ms.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a clock starting at `ms`.
    #[must_use]
    pub fn starting_at(ms: u32) -> Self {
        Self {
            now: Rc::new(Cell::new(ms)),
        }
    }

    /// Sets the absolute time.
    pub fn set(&self, ms: u32) {
        self.now.set(ms);
    }

    /// Advances time by `ms`, wrapping on overflow.
    pub fn advance(&self, ms: u32) {
        self.now.set(self.now.get().wrapping_add(ms));
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u32 {
        self.now.get()
    }
}

/// Fires at most once per interval.
///
/// A gate built with [`ClockGate::new`] starts due: its first check fires.
/// Use [`ClockGate::armed_at`] to start counting from a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockGate {
    interval_ms: u32,
    last_fire: u32,
    fired_once: bool,
}

impl ClockGate {
    /// Creates a gate that fires on its first check.
    #[must_use]
    pub fn new(interval_ms: u32) -> Self {
        Self {
            interval_ms,
            last_fire: 0,
            fired_once: false,
        }
    }

    /// Creates a gate whose interval starts counting at `now`.
    #[must_use]
    pub fn armed_at(interval_ms: u32, now: u32) -> Self {
        Self {
            interval_ms,
            last_fire: now,
            fired_once: true,
        }
    }

    /// Returns true (and restarts the interval) if the interval has elapsed.
    pub fn ready(&mut self, now: u32) -> bool {
        if !self.fired_once || now.wrapping_sub(self.last_fire) >= self.interval_ms {
            self.last_fire = now;
            self.fired_once = true;
            true
        } else {
            false
        }
    }

    /// Restarts the interval at `now` without firing.
    pub fn rearm(&mut self, now: u32) {
        self.last_fire = now;
        self.fired_once = true;
    }

    #[must_use]
    pub fn interval_ms(&self) -> u32 {
        self.interval_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_clock_shared_between_clones() {
        let clock = MockClock::new();
        let other = clock.clone();
        clock.advance(25);
        assert_eq!(other.now_ms(), 25);
    }

    #[test]
    fn test_mock_clock_wraps() {
        let clock = MockClock::starting_at(u32::MAX - 4);
        clock.advance(10);
        assert_eq!(clock.now_ms(), 5);
    }

    #[test]
    fn test_elapsed_since_across_wrap() {
        let clock = MockClock::starting_at(u32::MAX - 9);
        let start = clock.now_ms();
        clock.advance(30);
        assert_eq!(clock.elapsed_since(start), 30);
    }

    #[test]
    fn test_gate_fires_first_then_throttles() {
        let clock = MockClock::starting_at(1000);
        let mut gate = ClockGate::new(20);

        assert!(gate.ready(clock.now_ms()));
        for _ in 0..19 {
            clock.advance(1);
            assert!(!gate.ready(clock.now_ms()));
        }
        clock.advance(1);
        assert!(gate.ready(clock.now_ms()));
    }

    #[test]
    fn test_gate_armed_at_waits_full_interval() {
        let mut gate = ClockGate::armed_at(100, 50);
        assert!(!gate.ready(149));
        assert!(gate.ready(150));
    }

    #[test]
    fn test_gate_across_counter_wrap() {
        let mut gate = ClockGate::armed_at(20, u32::MAX - 5);
        assert!(!gate.ready(10));
        assert!(gate.ready(14));
    }

    #[test]
    fn test_gate_rearm_delays_next_fire() {
        let mut gate = ClockGate::new(10);
        assert!(gate.ready(0));
        gate.rearm(8);
        assert!(!gate.ready(12));
        assert!(gate.ready(18));
    }
}
