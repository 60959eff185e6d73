//! # Keypad Input Engine
//!
//! Five keys on one analog line (resistor ladder). Each key pulls the line to
//! a distinct voltage; a sample decodes to the key whose threshold is the
//! highest one not exceeding it.
//!
//! Legacy naming: `Left` was `BTN1`, `Right` was `BTN2`.
//!
//! ## Usage
//!
//! ```
//! use rc_link::clock::MockClock;
//! use rc_link::input::SharedAnalog;
//! use rc_link::keypad::{Key, KeyThresholds, KeypadEngine, KeypadTiming};
//!
//! let clock = MockClock::new();
//! let line = SharedAnalog::new(8);
//! let mut keypad = KeypadEngine::new(
//!     line.clone(),
//!     clock.clone(),
//!     KeyThresholds::default(),
//!     KeypadTiming::default(),
//! );
//!
//! line.set(922);
//! keypad.tick();
//! clock.advance(30);
//! assert_eq!(keypad.current_key(), Key::Left);
//! ```

pub mod engine;

use std::fmt;

use tracing::debug;

use crate::error::Result;
use crate::input::ADC_MAX;
use crate::store::{layout, KeyThresholdRecord, ParameterStore};

pub use engine::{EventMode, KeypadEngine, LongPress};

/// Number of physical keys.
pub const KEY_COUNT: usize = 5;

/// Keys in decode scan order. On equal thresholds the later key wins.
pub const SCAN_ORDER: [Key; KEY_COUNT] = [Key::Down, Key::Up, Key::Right, Key::Center, Key::Left];

/// Key identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Key {
    #[default]
    None,
    /// Formerly `BTN1`.
    Left,
    /// Formerly `BTN2`.
    Right,
    Up,
    Down,
    Center,
}

impl Key {
    /// Per-key state slot (scan order); `None` has no slot.
    #[must_use]
    pub const fn slot(self) -> Option<usize> {
        match self {
            Key::Down => Some(0),
            Key::Up => Some(1),
            Key::Right => Some(2),
            Key::Center => Some(3),
            Key::Left => Some(4),
            Key::None => None,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Key::Left => "LEFT",
            Key::Right => "RIGHT",
            Key::Up => "UP",
            Key::Down => "DOWN",
            Key::Center => "CENTER",
            Key::None => "NONE",
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Default thresholds, midway between measured ladder levels.
pub const DEFAULT_THRESHOLDS: [u16; KEY_COUNT] = [550, 625, 700, 800, 875];

/// Per-key ADC crossing thresholds, each in `0..=1023`.
///
/// No ordering between keys is required; decode picks the highest threshold
/// crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyThresholds {
    values: [u16; KEY_COUNT],
}

impl Default for KeyThresholds {
    fn default() -> Self {
        Self {
            values: DEFAULT_THRESHOLDS,
        }
    }
}

impl KeyThresholds {
    /// Builds thresholds in scan order (Down, Up, Right, Center, Left),
    /// clamping each.
    #[must_use]
    pub fn new(values: [u16; KEY_COUNT]) -> Self {
        Self {
            values: values.map(|v| v.min(ADC_MAX)),
        }
    }

    /// Threshold for `key`; 0 for `Key::None`.
    #[must_use]
    pub fn get(&self, key: Key) -> u16 {
        key.slot().map_or(0, |i| self.values[i])
    }

    /// Sets the threshold for `key`, clamped to `0..=1023`. Ignores `Key::None`.
    pub fn set(&mut self, key: Key, value: i32) {
        if let Some(i) = key.slot() {
            self.values[i] = value.clamp(0, i32::from(ADC_MAX)) as u16;
        }
    }

    /// Shifts the threshold for `key` by `delta`, clamped.
    pub fn adjust(&mut self, key: Key, delta: i32) {
        let current = i32::from(self.get(key));
        self.set(key, current + delta);
    }

    /// Lowest of the five thresholds.
    #[must_use]
    pub fn lowest(&self) -> u16 {
        self.values.iter().copied().min().unwrap_or(0)
    }

    /// Decodes an averaged sample.
    ///
    /// Returns the key with the highest threshold `<=` `sample`, or
    /// `Key::None` when the sample is below every threshold.
    ///
    /// # Examples
    ///
    /// ```
    /// use rc_link::keypad::{Key, KeyThresholds};
    ///
    /// let thresholds = KeyThresholds::default();
    /// assert_eq!(thresholds.decode(8), Key::None);
    /// assert_eq!(thresholds.decode(603), Key::Down);
    /// assert_eq!(thresholds.decode(922), Key::Left);
    /// ```
    #[must_use]
    pub fn decode(&self, sample: u16) -> Key {
        let mut best = Key::None;
        let mut best_threshold: Option<u16> = None;

        for (key, &threshold) in SCAN_ORDER.iter().zip(self.values.iter()) {
            if sample >= threshold && best_threshold.map_or(true, |b| threshold >= b) {
                best = *key;
                best_threshold = Some(threshold);
            }
        }
        best
    }

    /// Loads thresholds from the store, falling back to defaults.
    pub fn load<S: ParameterStore + ?Sized>(store: &mut S) -> Self {
        match layout::KEY_THRESHOLDS.load(store) {
            Some(record) => {
                debug!("Loaded key thresholds: {:?}", record);
                Self::new([
                    record.down,
                    record.up,
                    record.right,
                    record.center,
                    record.left,
                ])
            }
            None => Self::default(),
        }
    }

    /// Persists thresholds.
    ///
    /// # Errors
    ///
    /// Propagates store backend errors.
    pub fn save<S: ParameterStore + ?Sized>(&self, store: &mut S) -> Result<()> {
        layout::KEY_THRESHOLDS.save(store, &self.to_record())
    }

    #[must_use]
    pub fn to_record(&self) -> KeyThresholdRecord {
        let [down, up, right, center, left] = self.values;
        KeyThresholdRecord {
            down,
            up,
            right,
            center,
            left,
        }
    }
}

/// Keypad timing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeypadTiming {
    /// A reading must persist this long to become stable.
    pub debounce_ms: u32,
    /// Samples averaged per read.
    pub adc_samples: u8,
    /// Default short-click limit.
    pub short_click_ms: u32,
    /// Default long-press threshold.
    pub long_press_ms: u32,
    /// Default long-press auto-repeat period.
    pub repeat_ms: u32,
}

impl Default for KeypadTiming {
    fn default() -> Self {
        Self {
            debounce_ms: 30,
            adc_samples: 8,
            short_click_ms: 800,
            long_press_ms: 800,
            repeat_ms: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    // ==================== Decode Tests ====================

    #[test]
    fn test_decode_below_all_thresholds_is_none() {
        let t = KeyThresholds::default();
        assert_eq!(t.decode(0), Key::None);
        assert_eq!(t.decode(549), Key::None);
    }

    #[test]
    fn test_decode_exact_threshold_selects_key() {
        let t = KeyThresholds::default();
        assert_eq!(t.decode(550), Key::Down);
        assert_eq!(t.decode(625), Key::Up);
        assert_eq!(t.decode(700), Key::Right);
        assert_eq!(t.decode(800), Key::Center);
        assert_eq!(t.decode(875), Key::Left);
        assert_eq!(t.decode(1023), Key::Left);
    }

    #[test]
    fn test_decode_picks_highest_crossed_regardless_of_order() {
        // Left lowest, Down highest
        let t = KeyThresholds::new([900, 700, 500, 300, 100]);
        assert_eq!(t.decode(150), Key::Left);
        assert_eq!(t.decode(350), Key::Center);
        assert_eq!(t.decode(950), Key::Down);
    }

    #[test]
    fn test_decode_tie_goes_to_last_in_scan_order() {
        let t = KeyThresholds::new([600, 600, 700, 600, 800]);
        // Down, Up and Center tie at 600; Center is scanned last
        assert_eq!(t.decode(650), Key::Center);

        let all_equal = KeyThresholds::new([500; KEY_COUNT]);
        assert_eq!(all_equal.decode(500), Key::Left);
    }

    #[test]
    fn test_decode_is_pure_over_full_range() {
        let t = KeyThresholds::default();
        for sample in 0..=ADC_MAX {
            let key = t.decode(sample);
            let expected = SCAN_ORDER
                .iter()
                .filter(|k| t.get(**k) <= sample)
                .max_by_key(|k| t.get(**k))
                .copied()
                .unwrap_or(Key::None);
            assert_eq!(key, expected, "sample {}", sample);
            assert_eq!(t.decode(sample), key);
        }
    }

    #[test]
    fn test_zero_threshold_always_crossed() {
        let t = KeyThresholds::new([0, 625, 700, 800, 875]);
        assert_eq!(t.decode(0), Key::Down);
    }

    // ==================== Setter Tests ====================

    #[test]
    fn test_set_clamps() {
        let mut t = KeyThresholds::default();
        t.set(Key::Up, 5000);
        assert_eq!(t.get(Key::Up), 1023);
        t.set(Key::Up, -3);
        assert_eq!(t.get(Key::Up), 0);
    }

    #[test]
    fn test_adjust_clamps_at_rails() {
        let mut t = KeyThresholds::default();
        t.adjust(Key::Left, 200);
        assert_eq!(t.get(Key::Left), 1023);
        t.adjust(Key::Down, -10);
        assert_eq!(t.get(Key::Down), 540);
    }

    #[test]
    fn test_none_key_is_ignored() {
        let mut t = KeyThresholds::default();
        t.set(Key::None, 10);
        assert_eq!(t, KeyThresholds::default());
        assert_eq!(t.get(Key::None), 0);
    }

    #[test]
    fn test_lowest() {
        let t = KeyThresholds::new([600, 200, 700, 800, 900]);
        assert_eq!(t.lowest(), 200);
    }

    // ==================== Persistence Tests ====================

    #[test]
    fn test_load_from_erased_store_gives_defaults() {
        let mut store = MemoryStore::new();
        assert_eq!(KeyThresholds::load(&mut store), KeyThresholds::default());
    }

    #[test]
    fn test_save_then_load() {
        let mut store = MemoryStore::new();
        let mut t = KeyThresholds::default();
        t.set(Key::Center, 810);
        t.save(&mut store).unwrap();
        assert_eq!(KeyThresholds::load(&mut store), t);
    }

    #[test]
    fn test_load_clamps_stored_values() {
        let mut store = MemoryStore::new();
        let record = KeyThresholdRecord {
            down: 2000,
            up: 625,
            right: 700,
            center: 800,
            left: 875,
        };
        layout::KEY_THRESHOLDS.save(&mut store, &record).unwrap();
        assert_eq!(KeyThresholds::load(&mut store).get(Key::Down), 1023);
    }

    #[test]
    fn test_key_display_names() {
        assert_eq!(Key::Left.to_string(), "LEFT");
        assert_eq!(Key::None.to_string(), "NONE");
    }
}
