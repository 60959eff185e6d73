//! Per-stick pipelines and the two-stick set.
//!
//! A [`Joystick`] owns the analog lines of one stick together with its
//! calibration, inversion, deadzone and expo. [`Joysticks`] groups the left
//! and right stick, addresses per-axis settings by [`AxisId`], persists them
//! and runs the interactive calibration session.

use tracing::{debug, info, warn};

use super::{
    clamp_deadzone, clamp_expo, Axis, AxisCurve, AxisId, AxisRange, CalibrationExtents,
    JoystickCalibration, Stick, DEFAULT_DEADZONE, DEFAULT_EXPO,
};
use crate::error::Result;
use crate::input::{AnalogInput, ADC_MAX};
use crate::store::{layout, CalibrationRecord, DeadzoneRecord, ExpoRecord, ParameterStore, RecordSlot};

fn axis_slot(axis: Axis) -> usize {
    match axis {
        Axis::X => 0,
        Axis::Y => 1,
    }
}

/// One stick: two analog lines and their conditioning.
pub struct Joystick<A> {
    x: A,
    y: A,
    invert: [bool; 2],
    calibration: JoystickCalibration,
    deadzone: [u16; 2],
    expo: [f32; 2],
    adc_samples: u8,
    session: Option<CalibrationExtents>,
}

impl<A> std::fmt::Debug for Joystick<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Joystick")
            .field("invert", &self.invert)
            .field("calibration", &self.calibration)
            .field("deadzone", &self.deadzone)
            .field("expo", &self.expo)
            .field("calibrating", &self.session.is_some())
            .finish_non_exhaustive()
    }
}

impl<A: AnalogInput> Joystick<A> {
    /// Creates a stick with full-range calibration, default deadzone and
    /// expo, and no inversion.
    pub fn new(x: A, y: A) -> Self {
        Self {
            x,
            y,
            invert: [false, false],
            calibration: JoystickCalibration::default(),
            deadzone: [DEFAULT_DEADZONE; 2],
            expo: [DEFAULT_EXPO; 2],
            adc_samples: 1,
            session: None,
        }
    }

    /// Sets axis inversion (builder style).
    #[must_use]
    pub fn with_inversion(mut self, invert_x: bool, invert_y: bool) -> Self {
        self.invert = [invert_x, invert_y];
        self
    }

    /// Sets samples averaged per read (builder style).
    #[must_use]
    pub fn with_adc_samples(mut self, samples: u8) -> Self {
        self.adc_samples = samples.max(1);
        self
    }

    pub fn set_invert(&mut self, axis: Axis, invert: bool) {
        self.invert[axis_slot(axis)] = invert;
    }

    #[must_use]
    pub fn is_inverted(&self, axis: Axis) -> bool {
        self.invert[axis_slot(axis)]
    }

    fn invert_sample(&self, axis: Axis, raw: u16) -> u16 {
        let raw = raw.min(ADC_MAX);
        if self.is_inverted(axis) {
            ADC_MAX - raw
        } else {
            raw
        }
    }

    /// Raw sample, without inversion.
    pub fn read_raw_axis(&mut self, axis: Axis) -> u16 {
        let samples = self.adc_samples;
        let line = match axis {
            Axis::X => &mut self.x,
            Axis::Y => &mut self.y,
        };
        line.read_averaged(samples).min(ADC_MAX)
    }

    /// Raw sample in processing orientation (inversion applied).
    pub fn read_raw_inverted_axis(&mut self, axis: Axis) -> u16 {
        let raw = self.read_raw_axis(axis);
        self.invert_sample(axis, raw)
    }

    /// Conditioned output in `-32767..=32767`.
    pub fn read_axis(&mut self, axis: Axis) -> i16 {
        let raw = self.read_raw_inverted_axis(axis);
        self.curve(axis).apply(raw)
    }

    /// The response curve currently applied to `axis`.
    #[must_use]
    pub fn curve(&self, axis: Axis) -> AxisCurve {
        let i = axis_slot(axis);
        AxisCurve::new(*self.calibration.axis(axis), self.deadzone[i], self.expo[i])
    }

    #[must_use]
    pub fn calibration(&self) -> &JoystickCalibration {
        &self.calibration
    }

    /// Replaces the calibration as-is (used to restore a snapshot).
    pub fn apply_calibration(&mut self, calibration: JoystickCalibration) {
        self.calibration = calibration;
    }

    /// Sets both ranges with centers at their midpoints.
    ///
    /// Bounds are clamped to `0..=1023`; an axis spanning 2 counts or less
    /// falls back to the full range.
    pub fn set_calibration(&mut self, min_x: i32, max_x: i32, min_y: i32, max_y: i32) {
        self.calibration = JoystickCalibration {
            x: AxisRange::from_bounds(min_x, max_x),
            y: AxisRange::from_bounds(min_y, max_y),
        };
    }

    /// Overrides both centers, clamped to `0..=1023`.
    pub fn set_center(&mut self, center_x: i32, center_y: i32) {
        let clamp = |c: i32| c.clamp(0, i32::from(ADC_MAX)) as u16;
        self.calibration.x.center = clamp(center_x);
        self.calibration.y.center = clamp(center_y);
    }

    /// Moves the centers to a new rest position, keeping the measured spans.
    pub fn recenter_around(&mut self, center_x: i32, center_y: i32) {
        self.calibration.x = self.calibration.x.recentered(center_x);
        self.calibration.y = self.calibration.y.recentered(center_y);
    }

    /// Recenters on the stick's current (inverted) position.
    pub fn recenter_at_current(&mut self) {
        let cx = i32::from(self.read_raw_inverted_axis(Axis::X));
        let cy = i32::from(self.read_raw_inverted_axis(Axis::Y));
        self.recenter_around(cx, cy);
    }

    /// Begins an extents session with inverted sentinels.
    pub fn start_calibration(&mut self) {
        self.session = Some(CalibrationExtents::default());
    }

    #[must_use]
    pub fn is_calibrating(&self) -> bool {
        self.session.is_some()
    }

    /// Running extrema of the current session.
    #[must_use]
    pub fn calibration_extents(&self) -> Option<&CalibrationExtents> {
        self.session.as_ref()
    }

    /// Folds the current inverted samples into the session extrema.
    ///
    /// Does nothing outside a session.
    pub fn update_calibration_sample(&mut self) {
        if self.session.is_none() {
            return;
        }
        let x = self.read_raw_inverted_axis(Axis::X);
        let y = self.read_raw_inverted_axis(Axis::Y);
        if let Some(extents) = self.session.as_mut() {
            extents.fold(x, y);
        }
    }

    /// Ends the session and applies its extents.
    ///
    /// Without a session (or with an unmoved stick) this yields the full
    /// range.
    pub fn finish_calibration(&mut self) {
        let extents = self.session.take().unwrap_or_default();
        self.calibration = extents.finish();
    }

    /// Ends the session, keeping the previous calibration.
    pub fn cancel_calibration(&mut self) {
        self.session = None;
    }

    #[must_use]
    pub fn deadzone(&self, axis: Axis) -> u16 {
        self.deadzone[axis_slot(axis)]
    }

    /// Sets the deadzone, clamped to `0..=400`.
    pub fn set_deadzone(&mut self, axis: Axis, deadzone: i32) {
        self.deadzone[axis_slot(axis)] = clamp_deadzone(deadzone);
    }

    #[must_use]
    pub fn expo(&self, axis: Axis) -> f32 {
        self.expo[axis_slot(axis)]
    }

    /// Sets the expo, clamped to `0.0..=3.0`.
    pub fn set_expo(&mut self, axis: Axis, expo: f32) {
        self.expo[axis_slot(axis)] = clamp_expo(expo);
    }

    /// Loads calibration from `slot`.
    ///
    /// Returns false (leaving the calibration untouched) if the record is
    /// missing, corrupt or geometrically invalid.
    pub fn load_calibration<S: ParameterStore + ?Sized>(
        &mut self,
        store: &mut S,
        slot: RecordSlot<CalibrationRecord>,
    ) -> bool {
        match slot.load(store).as_ref().and_then(JoystickCalibration::from_record) {
            Some(calibration) => {
                self.calibration = calibration;
                true
            }
            None => false,
        }
    }

    /// Saves calibration to `slot`.
    ///
    /// # Errors
    ///
    /// Propagates store backend errors.
    pub fn save_calibration<S: ParameterStore + ?Sized>(
        &self,
        store: &mut S,
        slot: RecordSlot<CalibrationRecord>,
    ) -> Result<()> {
        slot.save(store, &self.calibration.to_record())
    }
}

/// Both sticks.
///
/// # Examples
///
/// ```
/// use rc_link::input::SharedAnalog;
/// use rc_link::joystick::{AxisId, Joystick, Joysticks};
/// use rc_link::store::MemoryStore;
///
/// let lx = SharedAnalog::new(512);
/// let mut sticks = Joysticks::new(
///     Joystick::new(lx.clone(), SharedAnalog::new(512)),
///     Joystick::new(SharedAnalog::new(512), SharedAnalog::new(512)),
/// );
///
/// let mut store = MemoryStore::new();
/// sticks.load(&mut store); // erased store: defaults
///
/// lx.set(1023);
/// assert_eq!(sticks.read_all()[AxisId::LeftX.index()], 32767);
/// ```
#[derive(Debug)]
pub struct Joysticks<A> {
    pub left: Joystick<A>,
    pub right: Joystick<A>,
    backup: Option<[JoystickCalibration; 2]>,
}

impl<A: AnalogInput> Joysticks<A> {
    pub fn new(left: Joystick<A>, right: Joystick<A>) -> Self {
        Self {
            left,
            right,
            backup: None,
        }
    }

    #[must_use]
    pub fn stick(&self, stick: Stick) -> &Joystick<A> {
        match stick {
            Stick::Left => &self.left,
            Stick::Right => &self.right,
        }
    }

    pub fn stick_mut(&mut self, stick: Stick) -> &mut Joystick<A> {
        match stick {
            Stick::Left => &mut self.left,
            Stick::Right => &mut self.right,
        }
    }

    fn calibration_slot(stick: Stick) -> RecordSlot<CalibrationRecord> {
        match stick {
            Stick::Left => layout::LEFT_CALIBRATION,
            Stick::Right => layout::RIGHT_CALIBRATION,
        }
    }

    /// Loads calibration, deadzone and expo.
    ///
    /// Each record falls back independently: invalid calibration becomes the
    /// full range, invalid deadzone or expo keeps the current values.
    pub fn load<S: ParameterStore + ?Sized>(&mut self, store: &mut S) {
        for stick in [Stick::Left, Stick::Right] {
            let slot = Self::calibration_slot(stick);
            let joystick = self.stick_mut(stick);
            if !joystick.load_calibration(store, slot) {
                warn!("{:?} joystick calibration missing or invalid, using full range", stick);
                joystick.finish_calibration();
            }
        }

        match layout::DEADZONE.load(store) {
            Some(record) => {
                debug!("Loaded deadzone: {:?}", record);
                self.left.set_deadzone(Axis::X, i32::from(record.left_x));
                self.left.set_deadzone(Axis::Y, i32::from(record.left_y));
                self.right.set_deadzone(Axis::X, i32::from(record.right_x));
                self.right.set_deadzone(Axis::Y, i32::from(record.right_y));
            }
            None => info!("No stored deadzone, keeping defaults"),
        }

        match layout::EXPO.load(store) {
            Some(record) => {
                debug!("Loaded expo: {:?}", record);
                self.left.set_expo(Axis::X, record.left_x);
                self.left.set_expo(Axis::Y, record.left_y);
                self.right.set_expo(Axis::X, record.right_x);
                self.right.set_expo(Axis::Y, record.right_y);
            }
            None => info!("No stored expo, keeping defaults"),
        }
    }

    /// Saves both calibrations.
    ///
    /// # Errors
    ///
    /// Propagates store backend errors.
    pub fn save_calibration<S: ParameterStore + ?Sized>(&self, store: &mut S) -> Result<()> {
        self.left.save_calibration(store, layout::LEFT_CALIBRATION)?;
        self.right.save_calibration(store, layout::RIGHT_CALIBRATION)
    }

    /// Saves all four deadzones.
    ///
    /// # Errors
    ///
    /// Propagates store backend errors.
    pub fn save_deadzone<S: ParameterStore + ?Sized>(&self, store: &mut S) -> Result<()> {
        let record = DeadzoneRecord {
            left_x: self.left.deadzone(Axis::X),
            left_y: self.left.deadzone(Axis::Y),
            right_x: self.right.deadzone(Axis::X),
            right_y: self.right.deadzone(Axis::Y),
        };
        layout::DEADZONE.save(store, &record)
    }

    fn live_expo(&self) -> ExpoRecord {
        ExpoRecord {
            left_x: self.left.expo(Axis::X),
            left_y: self.left.expo(Axis::Y),
            right_x: self.right.expo(Axis::X),
            right_y: self.right.expo(Axis::Y),
        }
    }

    /// Saves all four expo values.
    ///
    /// # Errors
    ///
    /// Propagates store backend errors.
    pub fn save_expo<S: ParameterStore + ?Sized>(&self, store: &mut S) -> Result<()> {
        layout::EXPO.save(store, &self.live_expo())
    }

    /// Saves one axis's expo, leaving the other stored axes as they are.
    ///
    /// If the stored record is invalid it is rebuilt from the live values.
    ///
    /// # Errors
    ///
    /// Propagates store backend errors.
    pub fn save_expo_axis<S: ParameterStore + ?Sized>(&self, store: &mut S, axis: AxisId) -> Result<()> {
        let mut record = layout::EXPO.load(store).unwrap_or_else(|| self.live_expo());
        let value = self.expo_axis(axis);
        match axis {
            AxisId::LeftX => record.left_x = value,
            AxisId::LeftY => record.left_y = value,
            AxisId::RightX => record.right_x = value,
            AxisId::RightY => record.right_y = value,
        }
        layout::EXPO.save(store, &record)
    }

    #[must_use]
    pub fn deadzone_axis(&self, axis: AxisId) -> u16 {
        self.stick(axis.stick()).deadzone(axis.axis())
    }

    pub fn set_deadzone_axis(&mut self, axis: AxisId, deadzone: i32) {
        self.stick_mut(axis.stick()).set_deadzone(axis.axis(), deadzone);
    }

    #[must_use]
    pub fn expo_axis(&self, axis: AxisId) -> f32 {
        self.stick(axis.stick()).expo(axis.axis())
    }

    pub fn set_expo_axis(&mut self, axis: AxisId, expo: f32) {
        self.stick_mut(axis.stick()).set_expo(axis.axis(), expo);
    }

    /// Response curve of one axis.
    #[must_use]
    pub fn curve_axis(&self, axis: AxisId) -> AxisCurve {
        self.stick(axis.stick()).curve(axis.axis())
    }

    /// Conditioned outputs in `AxisId` order.
    pub fn read_all(&mut self) -> [i16; 4] {
        [
            self.left.read_axis(Axis::X),
            self.left.read_axis(Axis::Y),
            self.right.read_axis(Axis::X),
            self.right.read_axis(Axis::Y),
        ]
    }

    /// Starts a calibration session on both sticks, remembering the current
    /// calibration for [`Joysticks::discard_calibration`].
    pub fn begin_calibration(&mut self) {
        self.backup = Some([self.left.calibration, self.right.calibration]);
        self.left.start_calibration();
        self.right.start_calibration();
        info!("Joystick calibration started");
    }

    #[must_use]
    pub fn is_calibrating(&self) -> bool {
        self.left.is_calibrating() || self.right.is_calibrating()
    }

    /// Folds current samples of both sticks into the session.
    pub fn sample_calibration(&mut self) {
        self.left.update_calibration_sample();
        self.right.update_calibration_sample();
    }

    /// Finishes the session and persists the result.
    ///
    /// # Errors
    ///
    /// Propagates store backend errors; the new calibration stays applied.
    pub fn commit_calibration<S: ParameterStore + ?Sized>(&mut self, store: &mut S) -> Result<()> {
        self.left.finish_calibration();
        self.right.finish_calibration();
        self.backup = None;
        info!(
            "Joystick calibration finished: left {:?}, right {:?}",
            self.left.calibration(),
            self.right.calibration()
        );
        self.save_calibration(store)
    }

    /// Ends the session and restores the calibration from before it.
    pub fn discard_calibration(&mut self) {
        self.left.cancel_calibration();
        self.right.cancel_calibration();
        if let Some([left, right]) = self.backup.take() {
            self.left.apply_calibration(left);
            self.right.apply_calibration(right);
        }
        info!("Joystick calibration discarded");
    }

    /// Resets both sticks to full-range calibration and default deadzone
    /// and expo, and persists all three records.
    ///
    /// # Errors
    ///
    /// Propagates store backend errors.
    pub fn force_defaults<S: ParameterStore + ?Sized>(&mut self, store: &mut S) -> Result<()> {
        for stick in [Stick::Left, Stick::Right] {
            let joystick = self.stick_mut(stick);
            for axis in [Axis::X, Axis::Y] {
                joystick.set_deadzone(axis, i32::from(DEFAULT_DEADZONE));
                joystick.set_expo(axis, DEFAULT_EXPO);
            }
            joystick.set_calibration(0, i32::from(ADC_MAX), 0, i32::from(ADC_MAX));
            joystick.set_center(512, 512);
        }
        self.save_calibration(store)?;
        self.save_deadzone(store)?;
        self.save_expo(store)
    }
}
