//! Debounced key state and consumable input events.
//!
//! Every public query re-samples the analog line and runs one decode and
//! debounce step before answering, so the engine needs no background task:
//! polling it is what advances it.
//!
//! Three event kinds are tracked per key, each with its own pending flag:
//!
//! - **release**: every release, with its hold duration
//! - **short click**: a release during which no long press fired
//! - **long press**: the hold reaching a threshold, optionally repeating
//!
//! Consuming one kind never clears another, so one physical press can serve
//! several listeners. Within one kind, consumption is exactly-once.

use tracing::debug;

use super::{Key, KeyThresholds, KeypadTiming, KEY_COUNT};
use crate::clock::Clock;
use crate::error::Result;
use crate::input::AnalogInput;
use crate::store::ParameterStore;

/// Whether a query clears the event it reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventMode {
    Consume,
    /// Report without changing any state.
    Peek,
}

/// Long-press query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LongPress {
    /// Hold time before the first event.
    pub threshold_ms: u32,
    /// Fire again every `repeat_ms` while held.
    pub repeat: bool,
    pub repeat_ms: u32,
}

impl LongPress {
    /// Fires once per press.
    #[must_use]
    pub fn once(threshold_ms: u32) -> Self {
        Self {
            threshold_ms,
            repeat: false,
            repeat_ms: 0,
        }
    }

    /// Fires at the threshold, then every `repeat_ms`.
    #[must_use]
    pub fn repeating(threshold_ms: u32, repeat_ms: u32) -> Self {
        Self {
            threshold_ms,
            repeat: true,
            repeat_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct KeyEvents {
    release_pending: bool,
    release_duration: u32,
    short_pending: bool,
    long_fired: bool,
    last_repeat: u32,
}

/// Keypad engine over one analog line.
pub struct KeypadEngine<A, C> {
    input: A,
    clock: C,
    thresholds: KeyThresholds,
    timing: KeypadTiming,

    last_sample: u16,
    last_reading: Key,
    stable: Key,
    last_change: u32,
    press_start: Option<u32>,
    events: [KeyEvents; KEY_COUNT],

    last_release_duration: u32,
    last_release_key: Key,
}

impl<A, C> std::fmt::Debug for KeypadEngine<A, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeypadEngine")
            .field("thresholds", &self.thresholds)
            .field("stable", &self.stable)
            .field("last_reading", &self.last_reading)
            .field("press_start", &self.press_start)
            .finish_non_exhaustive()
    }
}

impl<A: AnalogInput, C: Clock> KeypadEngine<A, C> {
    /// Creates an engine with no key held.
    pub fn new(input: A, clock: C, thresholds: KeyThresholds, timing: KeypadTiming) -> Self {
        let now = clock.now_ms();
        Self {
            input,
            clock,
            thresholds,
            timing,
            last_sample: 0,
            last_reading: Key::None,
            stable: Key::None,
            last_change: now,
            press_start: None,
            events: [KeyEvents::default(); KEY_COUNT],
            last_release_duration: 0,
            last_release_key: Key::None,
        }
    }

    /// Samples the line and runs one decode/debounce step.
    pub fn tick(&mut self) {
        let sample = self.input.read_averaged(self.timing.adc_samples);
        self.last_sample = sample;
        let now = self.clock.now_ms();

        let mut reading = self.thresholds.decode(sample);

        // Ladder noise between keys: until the line drops below the lowest
        // threshold, any other key still counts as the held one.
        if self.stable != Key::None
            && reading != Key::None
            && reading != self.stable
            && sample >= self.thresholds.lowest()
        {
            reading = self.stable;
        }

        if reading != self.last_reading {
            self.last_change = now;
            self.last_reading = reading;
        }

        if now.wrapping_sub(self.last_change) >= self.timing.debounce_ms && reading != self.stable {
            let previous = self.stable;
            self.apply_transition(previous, reading, now);
        }
    }

    /// Moves the stable key from `previous` to `next`, releasing and pressing
    /// as needed. A direct key-to-key change does both in one step.
    fn apply_transition(&mut self, previous: Key, next: Key, now: u32) {
        self.stable = next;

        if let Some(slot) = previous.slot() {
            let duration = self.press_start.map_or(0, |start| now.wrapping_sub(start));
            let events = &mut self.events[slot];
            events.release_pending = true;
            events.release_duration = duration;
            if !events.long_fired {
                events.short_pending = true;
            }
            self.last_release_duration = duration;
            self.last_release_key = previous;
            self.press_start = None;
            debug!("Key {} RELEASED after {} ms", previous, duration);
        }

        if let Some(slot) = next.slot() {
            self.press_start = Some(now);
            let events = &mut self.events[slot];
            events.long_fired = false;
            events.last_repeat = 0;
            debug!("Key {} PRESSED", next);
        }
    }

    /// Current debounced key.
    pub fn current_key(&mut self) -> Key {
        self.tick();
        self.stable
    }

    /// Whether `key` is the current debounced key.
    pub fn is_held(&mut self, key: Key) -> bool {
        self.tick();
        self.stable == key
    }

    /// Short-click query with an explicit limit.
    ///
    /// A pending short click is reported as `true` only if the release came
    /// before `threshold_ms`. Consuming clears the pending click either way.
    pub fn short_click(&mut self, key: Key, threshold_ms: u32, mode: EventMode) -> bool {
        self.tick();
        let Some(slot) = key.slot() else {
            return false;
        };
        let events = &mut self.events[slot];
        if !events.short_pending {
            return false;
        }
        let is_short = events.release_duration < threshold_ms;
        if mode == EventMode::Consume {
            events.short_pending = false;
        }
        is_short
    }

    /// Consumes a short click using the configured limit.
    pub fn consume_short_click(&mut self, key: Key) -> bool {
        self.short_click(key, self.timing.short_click_ms, EventMode::Consume)
    }

    /// Reports a short click using the configured limit without consuming it.
    pub fn peek_short_click(&mut self, key: Key) -> bool {
        self.short_click(key, self.timing.short_click_ms, EventMode::Peek)
    }

    /// Long-press query.
    ///
    /// True once when `key` has been held for `threshold_ms`; with
    /// `repeat`, again every `repeat_ms` while still held.
    pub fn long_press(&mut self, key: Key, options: LongPress, mode: EventMode) -> bool {
        self.tick();
        let Some(slot) = key.slot() else {
            return false;
        };
        if self.stable != key {
            return false;
        }
        let Some(start) = self.press_start else {
            return false;
        };

        let now = self.clock.now_ms();
        if now.wrapping_sub(start) < options.threshold_ms {
            return false;
        }

        let events = &mut self.events[slot];
        if !events.long_fired {
            if mode == EventMode::Consume {
                events.long_fired = true;
                events.last_repeat = now;
            }
            return true;
        }

        if options.repeat && now.wrapping_sub(events.last_repeat) >= options.repeat_ms {
            if mode == EventMode::Consume {
                events.last_repeat = now;
            }
            return true;
        }

        false
    }

    /// Consumes a single long press using the configured threshold.
    pub fn consume_long_press(&mut self, key: Key) -> bool {
        let options = LongPress::once(self.timing.long_press_ms);
        self.long_press(key, options, EventMode::Consume)
    }

    /// Consumes a repeating long press using the configured timing.
    pub fn consume_long_press_repeat(&mut self, key: Key) -> bool {
        let options = LongPress::repeating(self.timing.long_press_ms, self.timing.repeat_ms);
        self.long_press(key, options, EventMode::Consume)
    }

    /// Reports a long press using the configured threshold without consuming it.
    pub fn peek_long_press(&mut self, key: Key) -> bool {
        let options = LongPress::once(self.timing.long_press_ms);
        self.long_press(key, options, EventMode::Peek)
    }

    /// Release query; yields the hold duration of a pending release.
    pub fn release(&mut self, key: Key, mode: EventMode) -> Option<u32> {
        self.tick();
        let events = &mut self.events[key.slot()?];
        if !events.release_pending {
            return None;
        }
        if mode == EventMode::Consume {
            events.release_pending = false;
        }
        Some(events.release_duration)
    }

    /// Consumes a pending release of `key`, returning its hold duration.
    pub fn consume_release(&mut self, key: Key) -> Option<u32> {
        self.release(key, EventMode::Consume)
    }

    /// Reports a pending release of `key` without consuming it.
    pub fn peek_release(&mut self, key: Key) -> Option<u32> {
        self.release(key, EventMode::Peek)
    }

    /// Hold duration of the most recent release of any key.
    pub fn last_release_duration(&mut self) -> u32 {
        self.tick();
        self.last_release_duration
    }

    /// Key of the most recent release.
    pub fn last_release_key(&mut self) -> Key {
        self.tick();
        self.last_release_key
    }

    /// Averaged sample, for live threshold tuning.
    pub fn raw_adc(&mut self) -> u16 {
        self.tick();
        self.last_sample
    }

    /// Clears all pending events and hold timing.
    ///
    /// The held key stays held (no synthetic release), but its press timer
    /// restarts from nothing, so it cannot long-press until pressed again.
    pub fn reset_all(&mut self) {
        let now = self.clock.now_ms();
        self.events = [KeyEvents::default(); KEY_COUNT];
        self.last_reading = self.stable;
        self.last_change = now;
        self.press_start = None;
        self.last_release_duration = 0;
        self.last_release_key = Key::None;
    }

    #[must_use]
    pub fn thresholds(&self) -> &KeyThresholds {
        &self.thresholds
    }

    #[must_use]
    pub fn threshold(&self, key: Key) -> u16 {
        self.thresholds.get(key)
    }

    /// Sets one threshold, clamped to `0..=1023`.
    pub fn set_threshold(&mut self, key: Key, value: i32) {
        self.thresholds.set(key, value);
    }

    /// Shifts one threshold, clamped to `0..=1023`.
    pub fn adjust_threshold(&mut self, key: Key, delta: i32) {
        self.thresholds.adjust(key, delta);
    }

    /// Replaces all thresholds.
    pub fn set_thresholds(&mut self, thresholds: KeyThresholds) {
        self.thresholds = thresholds;
    }

    /// Persists the current thresholds.
    ///
    /// # Errors
    ///
    /// Propagates store backend errors.
    pub fn save_thresholds<S: ParameterStore + ?Sized>(&self, store: &mut S) -> Result<()> {
        self.thresholds.save(store)
    }

    #[must_use]
    pub fn timing(&self) -> &KeypadTiming {
        &self.timing
    }
}
