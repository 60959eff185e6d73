//! # Control/Telemetry Link
//!
//! Two-node radio link: the controller sends one 4-byte [`ControlFrame`]
//! per 20 ms tick; the receiver answers each packet with an auto-ack whose
//! 2-byte payload carries one telemetry value (`0..=100`).
//!
//! - [`ControllerLink`] rate-limits transmission and filters telemetry
//!   (snap, median of 3, EMA, failsafe)
//! - [`ReceiverLink`] stages telemetry and returns the newest packet
//! - [`Transceiver`] abstracts the radio; [`LoopbackRadio`] and
//!   [`SerialRadio`] implement it
//!
//! ## Usage
//!
//! ```
//! use rc_link::clock::MockClock;
//! use rc_link::link::{
//!     ControlFrame, ControllerLink, LinkTiming, LoopbackRadio, RadioConfig, ReceiverLink,
//! };
//!
//! let (tx, rx) = LoopbackRadio::pair();
//! let config = RadioConfig::default();
//! let clock = MockClock::new();
//!
//! let mut receiver = ReceiverLink::new(rx, &config)?;
//! let mut controller = ControllerLink::new(tx, clock.clone(), &config, LinkTiming::default())?;
//!
//! receiver.send_telemetry(73);
//! let outcome = controller.send_frame(&ControlFrame::new(0, 50, 0, -50));
//! assert_eq!(outcome.telemetry(), Some(73));
//! assert_eq!(receiver.poll_frame(), Some(ControlFrame::new(0, 50, 0, -50)));
//! # Ok::<(), rc_link::error::RcLinkError>(())
//! ```

pub mod bridge;
pub mod controller;
pub mod crc;
pub mod filter;
pub mod protocol;
pub mod radio;
pub mod receiver;
pub mod serial_radio;

pub use bridge::{BridgeFrame, FrameReader};
pub use controller::{ControllerLink, LinkStats, LinkTiming, SendOutcome};
pub use filter::{median3, snap_telemetry, TelemetryFilter};
pub use protocol::{
    adc_to_percent, map_to_pct, parse_address, AckPayload, ControlFrame, RadioConfig,
};
pub use radio::{LoopbackLink, LoopbackRadio, Transceiver};
pub use receiver::{ReceiverLink, ReceiverNode};
pub use serial_radio::SerialRadio;
