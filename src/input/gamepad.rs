//! # Gamepad Analog Source
//!
//! Runs the controller core on a desktop by borrowing a Linux evdev gamepad
//! as the analog front end.
//!
//! ## Mapping
//!
//! - Left stick: `ABS_X`, `ABS_Y`
//! - Right stick: `ABS_RX`, `ABS_RY` (or `ABS_Z`, `ABS_RZ` on older drivers)
//! - Keypad: d-pad (`ABS_HAT0X`, `ABS_HAT0Y`) and the south button, emulated
//!   as the voltage levels of the resistor ladder
//!
//! Stick values are rescaled from the device's reported range to 10 bits.

use evdev::{AbsoluteAxisType, Device, Key};
use std::path::Path;
use tracing::{debug, info};

use super::{SharedAnalog, ADC_MAX, ADC_MID};
use crate::error::{RcLinkError, Result};

/// Ladder voltage levels (10-bit) produced by each key.
pub mod ladder {
    pub const NONE: u16 = 8;
    pub const DOWN: u16 = 603;
    pub const UP: u16 = 693;
    pub const RIGHT: u16 = 763;
    pub const CENTER: u16 = 847;
    pub const LEFT: u16 = 922;
}

/// Rescales `value` from `[min, max]` to `0..=ADC_MAX`.
///
/// A degenerate range reads as mid-scale.
#[must_use]
pub fn scale_axis(value: i32, min: i32, max: i32) -> u16 {
    if max <= min {
        return ADC_MID;
    }
    let offset = i64::from(value.clamp(min, max) - min);
    let span = i64::from(max) - i64::from(min);
    (offset * i64::from(ADC_MAX) / span) as u16
}

/// Ladder level for the current d-pad / button state.
///
/// Only one key can sit on the ladder at a time; the south button wins over
/// the d-pad, then horizontal over vertical.
#[must_use]
pub fn ladder_level(hat_x: i32, hat_y: i32, south: bool) -> u16 {
    if south {
        ladder::CENTER
    } else if hat_x < 0 {
        ladder::LEFT
    } else if hat_x > 0 {
        ladder::RIGHT
    } else if hat_y < 0 {
        ladder::UP
    } else if hat_y > 0 {
        ladder::DOWN
    } else {
        ladder::NONE
    }
}

/// Analog lines fed by [`Gamepad::poll`].
#[derive(Debug, Clone, Default)]
pub struct GamepadInputs {
    pub left_x: SharedAnalog,
    pub left_y: SharedAnalog,
    pub right_x: SharedAnalog,
    pub right_y: SharedAnalog,
    pub keypad: SharedAnalog,
}

impl GamepadInputs {
    /// Lines at rest: sticks centered, no key pressed.
    #[must_use]
    pub fn at_rest() -> Self {
        Self {
            left_x: SharedAnalog::new(ADC_MID),
            left_y: SharedAnalog::new(ADC_MID),
            right_x: SharedAnalog::new(ADC_MID),
            right_y: SharedAnalog::new(ADC_MID),
            keypad: SharedAnalog::new(ladder::NONE),
        }
    }

    /// Returns every line to rest, e.g. after the device disappears.
    pub fn release(&self) {
        for stick in [&self.left_x, &self.left_y, &self.right_x, &self.right_y] {
            stick.set(ADC_MID);
        }
        self.keypad.set(ladder::NONE);
    }
}

/// An evdev gamepad with two analog sticks.
pub struct Gamepad {
    device: Device,
    device_path: String,
    right_axes: (AbsoluteAxisType, AbsoluteAxisType),
}

impl std::fmt::Debug for Gamepad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gamepad")
            .field("device_path", &self.device_path)
            .field("right_axes", &self.right_axes)
            .finish_non_exhaustive()
    }
}

impl Gamepad {
    /// Detects and opens the first event device with two analog sticks.
    ///
    /// Devices are scanned in path order so the choice is deterministic when
    /// several are connected.
    ///
    /// # Errors
    ///
    /// - `Controller`: `/dev/input` is missing or unreadable
    /// - `ControllerNotFound`: no suitable device found
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use rc_link::input::gamepad::Gamepad;
    ///
    /// let gamepad = Gamepad::open()?;
    /// println!("Using gamepad at: {}", gamepad.device_path());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open() -> Result<Self> {
        let input_dir = Path::new("/dev/input");

        if !input_dir.exists() {
            return Err(RcLinkError::Controller(
                "/dev/input directory not found".to_string(),
            ));
        }

        let mut entries: Vec<_> = std::fs::read_dir(input_dir)
            .map_err(|e| RcLinkError::Controller(format!("Failed to read /dev/input: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| RcLinkError::Controller(format!("Failed to read directory entry: {}", e)))?;

        entries.sort_by_key(|entry| entry.path());

        for entry in entries {
            let path = entry.path();

            let is_event = path
                .file_name()
                .map(|name| name.to_string_lossy().starts_with("event"))
                .unwrap_or(false);
            if !is_event {
                continue;
            }

            match Self::open_path(&path) {
                Ok(gamepad) => return Ok(gamepad),
                Err(e) => debug!("Skipping {}: {}", path.display(), e),
            }
        }

        Err(RcLinkError::ControllerNotFound)
    }

    /// Opens a specific event device.
    ///
    /// # Errors
    ///
    /// Returns `Controller` if the device cannot be opened or lacks two
    /// analog sticks.
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let device = Device::open(path)
            .map_err(|e| RcLinkError::Controller(format!("Failed to open {}: {}", path.display(), e)))?;

        let axes = device
            .supported_absolute_axes()
            .ok_or_else(|| RcLinkError::Controller("no absolute axes".to_string()))?;

        if !(axes.contains(AbsoluteAxisType::ABS_X) && axes.contains(AbsoluteAxisType::ABS_Y)) {
            return Err(RcLinkError::Controller("no left stick".to_string()));
        }

        let right_axes = if axes.contains(AbsoluteAxisType::ABS_RX)
            && axes.contains(AbsoluteAxisType::ABS_RY)
        {
            (AbsoluteAxisType::ABS_RX, AbsoluteAxisType::ABS_RY)
        } else if axes.contains(AbsoluteAxisType::ABS_Z) && axes.contains(AbsoluteAxisType::ABS_RZ) {
            (AbsoluteAxisType::ABS_Z, AbsoluteAxisType::ABS_RZ)
        } else {
            return Err(RcLinkError::Controller("no right stick".to_string()));
        };

        let device_path = path.to_string_lossy().to_string();
        info!(
            "Using gamepad '{}' at {}",
            device.name().unwrap_or("unknown"),
            device_path
        );

        Ok(Self {
            device,
            device_path,
            right_axes,
        })
    }

    #[must_use]
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.device.name()
    }

    /// Samples the current stick and button state into `inputs`.
    ///
    /// # Errors
    ///
    /// Returns `Controller` if the device state cannot be read (for example
    /// after a disconnect). `inputs` keeps its previous values.
    pub fn poll(&mut self, inputs: &GamepadInputs) -> Result<()> {
        let abs = self
            .device
            .get_abs_state()
            .map_err(|e| RcLinkError::Controller(format!("Failed to read axes: {}", e)))?;
        let keys = self
            .device
            .get_key_state()
            .map_err(|e| RcLinkError::Controller(format!("Failed to read buttons: {}", e)))?;

        let axis = |code: AbsoluteAxisType| {
            let info = &abs[usize::from(code.0)];
            scale_axis(info.value, info.minimum, info.maximum)
        };

        inputs.left_x.set(axis(AbsoluteAxisType::ABS_X));
        inputs.left_y.set(axis(AbsoluteAxisType::ABS_Y));
        inputs.right_x.set(axis(self.right_axes.0));
        inputs.right_y.set(axis(self.right_axes.1));

        let hat_x = abs[usize::from(AbsoluteAxisType::ABS_HAT0X.0)].value;
        let hat_y = abs[usize::from(AbsoluteAxisType::ABS_HAT0Y.0)].value;
        inputs
            .keypad
            .set(ladder_level(hat_x, hat_y, keys.contains(Key::BTN_SOUTH)));

        Ok(())
    }
}
