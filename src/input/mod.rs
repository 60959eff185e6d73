//! # Analog Signal Source
//!
//! Abstract 10-bit analog lines feeding the keypad and joystick pipelines.
//!
//! Implementations provide single raw samples; averaging over several
//! consecutive samples is shared by every source through
//! [`AnalogInput::read_averaged`].
//!
//! ## Usage
//!
//! ```
//! use rc_link::input::{AnalogInput, SharedAnalog};
//!
//! let line = SharedAnalog::new(512);
//! let mut reader = line.clone();
//!
//! line.set(900);
//! assert_eq!(reader.read_averaged(8), 900);
//! ```

pub mod gamepad;

use std::cell::Cell;
use std::rc::Rc;

/// Largest 10-bit sample.
pub const ADC_MAX: u16 = 1023;

/// Mid-scale sample, the rest position of an uncalibrated stick.
pub const ADC_MID: u16 = 512;

/// A single analog input line.
pub trait AnalogInput {
    /// Reads one raw sample in `0..=ADC_MAX`.
    fn sample(&mut self) -> u16;

    /// Averages `samples` consecutive reads (at least one).
    fn read_averaged(&mut self, samples: u8) -> u16 {
        let count = u32::from(samples.max(1));
        let sum: u32 = (0..count).map(|_| u32::from(self.sample().min(ADC_MAX))).sum();
        // The mean of values <= ADC_MAX always fits in u16
        (sum / count) as u16
    }
}

impl<A: AnalogInput + ?Sized> AnalogInput for Box<A> {
    fn sample(&mut self) -> u16 {
        (**self).sample()
    }
}

/// Analog line whose value is set from elsewhere.
///
/// Clones share one value: the producer (a gamepad poller, a test) keeps one
/// handle and hands another to the consuming component.
#[derive(Debug, Clone, Default)]
pub struct SharedAnalog {
    value: Rc<Cell<u16>>,
}

impl SharedAnalog {
    #[must_use]
    pub fn new(value: u16) -> Self {
        Self {
            value: Rc::new(Cell::new(value.min(ADC_MAX))),
        }
    }

    /// Sets the value, clamped to `0..=ADC_MAX`.
    pub fn set(&self, value: u16) {
        self.value.set(value.min(ADC_MAX));
    }

    #[must_use]
    pub fn get(&self) -> u16 {
        self.value.get()
    }
}

impl AnalogInput for SharedAnalog {
    fn sample(&mut self) -> u16 {
        self.value.get()
    }
}

/// Analog line replaying a fixed sequence of samples, then holding the last.
#[derive(Debug, Clone)]
pub struct SampleSequence {
    samples: Vec<u16>,
    position: usize,
}

impl SampleSequence {
    #[must_use]
    pub fn new(samples: Vec<u16>) -> Self {
        Self {
            samples,
            position: 0,
        }
    }
}

impl AnalogInput for SampleSequence {
    fn sample(&mut self) -> u16 {
        let value = match self.samples.get(self.position) {
            Some(&v) => {
                self.position += 1;
                v
            }
            None => self.samples.last().copied().unwrap_or(0),
        };
        value.min(ADC_MAX)
    }
}
