//! # Axis Response Curve
//!
//! Maps a raw (already inverted) sample to signed output using the axis
//! calibration, a deadzone and an expo exponent.
//!
//! ## Deadzone
//!
//! Deflections within `deadzone` raw counts of center read as 0. Beyond it,
//! the remaining travel up to the calibrated bound on that side is rescaled
//! to `0..1`, so full deflection still reaches full output.
//!
//! ## Expo
//!
//! The normalized deflection is raised to the power `1 + expo`:
//!
//! - `expo = 0.0`: linear response
//! - `expo = 1.8`: default, fine control near center
//! - `expo = 3.0`: maximum flattening
//!
//! Calibration previews and live transmission both evaluate this curve.
//!
//! ## Usage
//!
//! ```
//! use rc_link::joystick::{AxisCurve, AxisRange};
//!
//! let curve = AxisCurve::new(AxisRange::full(), 40, 1.8);
//!
//! // Within the deadzone
//! assert_eq!(curve.apply(530), 0);
//!
//! // Full deflection on both sides
//! assert_eq!(curve.apply(1023), 32767);
//! assert_eq!(curve.apply(0), -32767);
//! ```

use super::{clamp_deadzone, clamp_expo, AxisRange, OUTPUT_MAX};
use crate::input::ADC_MAX;

/// Response curve of one axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisCurve {
    range: AxisRange,
    deadzone: u16,
    expo: f32,
}

impl AxisCurve {
    /// Creates a curve; deadzone and expo are clamped to their valid ranges.
    ///
    /// # Arguments
    ///
    /// * `range` - Calibrated axis range (corrected on use if invalid)
    /// * `deadzone` - Deadzone radius in raw counts (0 to 400)
    /// * `expo` - Exponent offset (0.0 to 3.0)
    #[must_use]
    pub fn new(range: AxisRange, deadzone: u16, expo: f32) -> Self {
        Self {
            range,
            deadzone: clamp_deadzone(i32::from(deadzone)),
            expo: clamp_expo(expo),
        }
    }

    /// Creates a linear curve with no deadzone over the full range.
    ///
    /// # Examples
    ///
    /// ```
    /// use rc_link::joystick::AxisCurve;
    ///
    /// let curve = AxisCurve::linear();
    /// assert_eq!(curve.apply(512), 0);
    /// assert_eq!(curve.apply(1023), 32767);
    /// ```
    #[must_use]
    pub fn linear() -> Self {
        Self::new(AxisRange::full(), 0, 0.0)
    }

    #[must_use]
    pub fn deadzone(&self) -> u16 {
        self.deadzone
    }

    #[must_use]
    pub fn expo(&self) -> f32 {
        self.expo
    }

    #[must_use]
    pub fn range(&self) -> AxisRange {
        self.range
    }

    /// Applies calibration, deadzone and expo to a raw sample.
    ///
    /// # Arguments
    ///
    /// * `raw` - Inverted raw sample (clamped to 0..=1023)
    ///
    /// # Returns
    ///
    /// Signed output in `-32767..=32767`
    #[must_use]
    pub fn apply(&self, raw: u16) -> i16 {
        let range = self.range.effective();
        let raw = raw.min(ADC_MAX);

        let center = f32::from(range.center);
        let span_pos = f32::from(range.max - range.center).max(1.0);
        let span_neg = f32::from(range.center - range.min).max(1.0);

        let centered = f32::from(raw) - center;
        let sign = if centered >= 0.0 { 1.0 } else { -1.0 };
        let span = if centered >= 0.0 { span_pos } else { span_neg };

        let magnitude = self.shape(centered.abs(), span);
        (sign * magnitude) as i16
    }

    /// Output magnitude for a deflection of `offset` raw counts on a side
    /// spanning `span` counts.
    fn shape(&self, offset: f32, span: f32) -> f32 {
        let deadzone = f32::from(self.deadzone);
        if offset <= deadzone || span <= deadzone {
            return 0.0;
        }

        let norm = ((offset - deadzone) / (span - deadzone)).clamp(0.0, 1.0);
        let max = f32::from(OUTPUT_MAX);
        (max * norm.powf(1.0 + self.expo)).round().min(max)
    }

    /// Output in percent of full scale for a deflection given as a fraction
    /// of the span (`0.0..=1.0`), on the positive side.
    ///
    /// Used to draw the response curve for tuning screens.
    #[must_use]
    pub fn preview_pct(&self, fraction: f32) -> f32 {
        let range = self.range.effective();
        let span = f32::from(range.max - range.center).max(1.0);
        let offset = fraction.clamp(0.0, 1.0) * span;
        self.shape(offset, span) * 100.0 / f32::from(OUTPUT_MAX)
    }
}
