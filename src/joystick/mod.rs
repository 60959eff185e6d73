//! # Joystick Analog Pipeline
//!
//! Turns raw 10-bit stick samples into signed proportional output:
//!
//! ```text
//! raw ──▶ invert ──▶ calibration (min/center/max) ──▶ deadzone ──▶ expo ──▶ -32767..32767
//! ```
//!
//! Each of the two sticks has two axes with independent inversion, deadzone
//! and expo. Calibration, deadzone and expo are loaded once from the
//! parameter store at boot and written back only on explicit request.
//!
//! ## Axis Indexing
//!
//! Per-axis settings are addressed by a flat index: `0` = left X,
//! `1` = left Y, `2` = right X, `3` = right Y.

pub mod curve;
pub mod pipeline;

use crate::input::{ADC_MAX, ADC_MID};
use crate::store::CalibrationRecord;

pub use curve::AxisCurve;
pub use pipeline::{Joystick, Joysticks};

/// Largest curve output magnitude.
pub const OUTPUT_MAX: i16 = 32767;

pub const DEFAULT_DEADZONE: u16 = 40;
pub const MAX_DEADZONE: u16 = 400;
pub const DEFAULT_EXPO: f32 = 1.8;
pub const MAX_EXPO: f32 = 3.0;

/// A calibration span this small means the stick was not moved.
const MIN_SPAN: i32 = 2;

/// Clamps a deadzone to `0..=400`.
#[must_use]
pub fn clamp_deadzone(deadzone: i32) -> u16 {
    deadzone.clamp(0, i32::from(MAX_DEADZONE)) as u16
}

/// Clamps an expo to `0.0..=3.0`. A non-finite value becomes the default.
#[must_use]
pub fn clamp_expo(expo: f32) -> f32 {
    if expo.is_finite() {
        expo.clamp(0.0, MAX_EXPO)
    } else {
        DEFAULT_EXPO
    }
}

/// Maps a raw sample to a centered percentage for diagnostics.
///
/// Uses the nominal center, ignoring calibration.
#[must_use]
pub fn raw_to_pct(raw: u16) -> i8 {
    let centered = i32::from(raw) - i32::from(ADC_MID);
    (centered * 100 / 511).clamp(-100, 100) as i8
}

/// One of the two axes of a stick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
}

/// One of the two sticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stick {
    Left,
    Right,
}

/// Flat axis address across both sticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisId {
    LeftX = 0,
    LeftY = 1,
    RightX = 2,
    RightY = 3,
}

impl AxisId {
    pub const ALL: [AxisId; 4] = [AxisId::LeftX, AxisId::LeftY, AxisId::RightX, AxisId::RightY];

    /// Looks up an axis by flat index; `None` outside `0..=3`.
    #[must_use]
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(usize::from(index)).copied()
    }

    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub fn stick(self) -> Stick {
        match self {
            AxisId::LeftX | AxisId::LeftY => Stick::Left,
            AxisId::RightX | AxisId::RightY => Stick::Right,
        }
    }

    #[must_use]
    pub fn axis(self) -> Axis {
        match self {
            AxisId::LeftX | AxisId::RightX => Axis::X,
            AxisId::LeftY | AxisId::RightY => Axis::Y,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            AxisId::LeftX => "LX",
            AxisId::LeftY => "LY",
            AxisId::RightX => "RX",
            AxisId::RightY => "RY",
        }
    }
}

/// Calibrated extent of one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisRange {
    pub min: u16,
    pub max: u16,
    pub center: u16,
}

impl Default for AxisRange {
    fn default() -> Self {
        Self::full()
    }
}

impl AxisRange {
    /// Whole ADC range, nominal center.
    #[must_use]
    pub const fn full() -> Self {
        Self {
            min: 0,
            max: ADC_MAX,
            center: ADC_MID,
        }
    }

    /// Range with its center at the midpoint.
    ///
    /// Bounds are clamped to `0..=1023`; a span of 2 or less becomes the full
    /// range.
    #[must_use]
    pub fn from_bounds(min: i32, max: i32) -> Self {
        let adc_max = i32::from(ADC_MAX);
        let (mut min, mut max) = (min.clamp(0, adc_max), max.clamp(0, adc_max));
        if max <= min + MIN_SPAN {
            min = 0;
            max = adc_max;
        }
        Self {
            min: min as u16,
            max: max as u16,
            center: ((min + max) / 2) as u16,
        }
    }

    /// Moves the center to `center` while keeping the current span.
    ///
    /// The shifted bounds are clipped to the ADC range and the center is
    /// clamped inside them.
    #[must_use]
    pub fn recentered(&self, center: i32) -> Self {
        let adc_max = i32::from(ADC_MAX);
        let mut span = i32::from(self.max) - i32::from(self.min);
        if span < MIN_SPAN {
            span = adc_max;
        }
        let half = span / 2;

        let mut min = (center - half).max(0);
        let mut max = (center + half).min(adc_max);
        if max <= min + MIN_SPAN {
            min = 0;
            max = adc_max;
        }

        Self {
            min: min as u16,
            max: max as u16,
            center: center.clamp(min, max) as u16,
        }
    }

    /// The range the curve actually uses: a collapsed range reads as full
    /// range, and a center outside the bounds reads as the midpoint.
    #[must_use]
    pub fn effective(&self) -> Self {
        let (mut min, mut max) = (i32::from(self.min), i32::from(self.max));
        if max <= min + MIN_SPAN {
            min = 0;
            max = i32::from(ADC_MAX);
        }
        let mut center = i32::from(self.center);
        if center < min || center > max {
            center = (min + max) / 2;
        }
        Self {
            min: min as u16,
            max: max as u16,
            center: center as u16,
        }
    }
}

/// Calibration of one stick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JoystickCalibration {
    pub x: AxisRange,
    pub y: AxisRange,
}

impl JoystickCalibration {
    #[must_use]
    pub fn axis(&self, axis: Axis) -> &AxisRange {
        match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
        }
    }

    /// Validates a stored record.
    ///
    /// Rejects collapsed or inverted bounds and bounds beyond 10 bits. A
    /// center outside its bounds is replaced by the midpoint.
    #[must_use]
    pub fn from_record(record: &CalibrationRecord) -> Option<Self> {
        let axis = |min: u16, max: u16, center: u16| {
            if min >= max || max > ADC_MAX {
                return None;
            }
            let center = if (min..=max).contains(&center) {
                center
            } else {
                ((u32::from(min) + u32::from(max)) / 2) as u16
            };
            Some(AxisRange { min, max, center })
        };

        Some(Self {
            x: axis(record.min_x, record.max_x, record.center_x)?,
            y: axis(record.min_y, record.max_y, record.center_y)?,
        })
    }

    #[must_use]
    pub fn to_record(&self) -> CalibrationRecord {
        CalibrationRecord {
            min_x: self.x.min,
            max_x: self.x.max,
            center_x: self.x.center,
            min_y: self.y.min,
            max_y: self.y.max,
            center_y: self.y.center,
        }
    }
}

/// Running extrema of an interactive calibration session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationExtents {
    pub min_x: u16,
    pub max_x: u16,
    pub min_y: u16,
    pub max_y: u16,
}

impl Default for CalibrationExtents {
    /// Inverted sentinel: the first sample updates both bounds.
    fn default() -> Self {
        Self {
            min_x: ADC_MAX,
            max_x: 0,
            min_y: ADC_MAX,
            max_y: 0,
        }
    }
}

impl CalibrationExtents {
    pub fn fold(&mut self, x: u16, y: u16) {
        self.min_x = self.min_x.min(x);
        self.max_x = self.max_x.max(x);
        self.min_y = self.min_y.min(y);
        self.max_y = self.max_y.max(y);
    }

    /// Calibration with centers at the extent midpoints; an axis that
    /// barely moved falls back to the full range.
    #[must_use]
    pub fn finish(&self) -> JoystickCalibration {
        JoystickCalibration {
            x: AxisRange::from_bounds(i32::from(self.min_x), i32::from(self.max_x)),
            y: AxisRange::from_bounds(i32::from(self.min_y), i32::from(self.max_y)),
        }
    }
}
