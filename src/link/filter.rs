//! # Telemetry Filter
//!
//! Shapes the raw telemetry value from ack payloads into a stable estimate:
//!
//! 1. **Snap**: clamp to `0..=100`, `<= 1` reads 0 and `>= 99` reads 100
//! 2. **Median of 3**: rejects single-sample glitches
//! 3. **EMA**: `smooth += (target - smooth) >> shift` in signed arithmetic
//!
//! When no ack has arrived for longer than the failsafe timeout, the target
//! is forced to 0 and the EMA decays toward it.
//!
//! ## Usage
//!
//! ```
//! use rc_link::link::TelemetryFilter;
//!
//! let mut filter = TelemetryFilter::new(120, 0);
//! filter.push(50, 0);
//! for t in 1..=40 {
//!     filter.step(t);
//! }
//! // Integer EMA settles up to 3 counts below a rising target
//! assert_eq!(filter.smoothed(), 47);
//! ```

/// Default failsafe timeout in milliseconds.
pub const DEFAULT_FAILSAFE_MS: u32 = 120;

/// Default EMA shift (alpha = 1/4).
pub const EMA_SHIFT: u32 = 2;

/// Clamps and snaps a raw telemetry value to `0..=100`.
///
/// # Examples
///
/// ```
/// use rc_link::link::snap_telemetry;
///
/// assert_eq!(snap_telemetry(1), 0);
/// assert_eq!(snap_telemetry(2), 2);
/// assert_eq!(snap_telemetry(99), 100);
/// assert_eq!(snap_telemetry(250), 100);
/// ```
#[must_use]
pub fn snap_telemetry(raw: u8) -> u8 {
    match raw.min(100) {
        0..=1 => 0,
        99..=100 => 100,
        v => v,
    }
}

/// Median of three values.
#[must_use]
pub fn median3(a: u8, b: u8, c: u8) -> u8 {
    a.max(b).min(a.min(b).max(c))
}

/// Median/EMA filter with link-loss failsafe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryFilter {
    history: Option<[u8; 3]>,
    target: u8,
    smooth: u8,
    last_rx: u32,
    failsafe_ms: u32,
    ema_shift: u32,
}

impl TelemetryFilter {
    /// Creates a filter with the link considered alive at `now`.
    #[must_use]
    pub fn new(failsafe_ms: u32, now: u32) -> Self {
        Self {
            history: None,
            target: 0,
            smooth: 0,
            last_rx: now,
            failsafe_ms,
            ema_shift: EMA_SHIFT,
        }
    }

    /// Feeds one received value and returns the new target.
    ///
    /// The first value fills the whole history, so the target follows it
    /// immediately.
    pub fn push(&mut self, raw: u8, now: u32) -> u8 {
        let value = snap_telemetry(raw);
        let history = match self.history {
            None => [value; 3],
            Some([_, b, c]) => [b, c, value],
        };
        self.history = Some(history);
        self.target = median3(history[0], history[1], history[2]);
        self.last_rx = now;
        self.target
    }

    /// Records that the link is alive without a new value.
    pub fn mark_alive(&mut self, now: u32) {
        self.last_rx = now;
    }

    /// True when the last ack is older than the failsafe timeout.
    #[must_use]
    pub fn failsafe_active(&self, now: u32) -> bool {
        now.wrapping_sub(self.last_rx) > self.failsafe_ms
    }

    /// Advances the EMA one step and returns the smoothed value.
    ///
    /// Call at a fixed rate; the failsafe check happens here.
    pub fn step(&mut self, now: u32) -> u8 {
        if self.failsafe_active(now) {
            self.target = 0;
        }

        let delta = i32::from(self.target) - i32::from(self.smooth);
        let next = i32::from(self.smooth) + (delta >> self.ema_shift);
        self.smooth = next.clamp(0, 100) as u8;
        self.smooth
    }

    /// Median output before smoothing.
    #[must_use]
    pub fn target(&self) -> u8 {
        self.target
    }

    #[must_use]
    pub fn smoothed(&self) -> u8 {
        self.smooth
    }

    /// Time of the last ack.
    #[must_use]
    pub fn last_rx(&self) -> u32 {
        self.last_rx
    }

    /// Forgets history and estimate; the link is considered alive at `now`.
    pub fn reset(&mut self, now: u32) {
        *self = Self::new(self.failsafe_ms, now);
    }
}
