//! # RC Link Library
//!
//! Input conditioning and telemetry link core for a two-node radio remote
//! control.
//!
//! The controller node reads two analog joysticks and a resistor-ladder
//! keypad, conditions the sticks (calibration, deadzone, expo) and sends one
//! 4-byte control frame per link tick. The receiver node answers every frame
//! with an ack carrying one telemetry value, which the controller filters
//! (median of 3, EMA, failsafe) and shows on a status indicator.
//!
//! All timing goes through [`clock::Clock`], and all hardware sits behind
//! narrow traits ([`input::AnalogInput`], [`link::Transceiver`],
//! [`store::ParameterStore`], [`ui::TextSink`], [`ui::StatusIndicator`]), so
//! the whole core runs deterministically in tests.

pub mod clock;
pub mod config;
pub mod error;
pub mod input;
pub mod joystick;
pub mod keypad;
pub mod link;
pub mod scheduler;
pub mod store;
pub mod telemetry;
pub mod ui;
