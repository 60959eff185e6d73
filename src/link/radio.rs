//! # Transceiver Abstraction
//!
//! The operations the link needs from a packet radio with auto-ack and ack
//! payloads. Transient faults surface as `false` / `None`, never as errors;
//! only [`Transceiver::configure`] can fail.
//!
//! [`LoopbackRadio`] connects a controller end and a receiver end in
//! process, with a 3-deep receive FIFO and a switch to simulate link loss.
//!
//! ## Usage
//!
//! ```
//! use rc_link::link::{LoopbackRadio, RadioConfig, Transceiver};
//!
//! let (mut tx, mut rx) = LoopbackRadio::pair();
//! let config = RadioConfig::default();
//! tx.configure(&config).unwrap();
//! rx.configure(&config).unwrap();
//! rx.start_listening();
//!
//! assert!(rx.write_ack_payload(&[42, 0]));
//! assert!(tx.write(&[1, 2, 3, 4]));
//! assert_eq!(tx.read_ack_payload(), Some([42, 0]));
//! assert_eq!(rx.read_packet(), Some([1, 2, 3, 4]));
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use super::protocol::{RadioConfig, ACK_PAYLOAD_SIZE, CONTROL_PACKET_SIZE};
use crate::error::Result;

/// Receive FIFO depth of the radio.
pub const RX_FIFO_DEPTH: usize = 3;

/// Packet radio with auto-acknowledgment and ack payloads.
#[cfg_attr(test, mockall::automock)]
pub trait Transceiver {
    /// Applies channel, address, power and retry settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the radio does not respond.
    fn configure(&mut self, config: &RadioConfig) -> Result<()>;

    fn start_listening(&mut self);

    fn stop_listening(&mut self);

    /// Sends one packet, retrying per the configuration.
    ///
    /// Returns true when the peer acknowledged it.
    fn write(&mut self, packet: &[u8; CONTROL_PACKET_SIZE]) -> bool;

    /// Ack payload that came with the last acknowledged write, if any.
    fn read_ack_payload(&mut self) -> Option<[u8; ACK_PAYLOAD_SIZE]>;

    /// Oldest packet in the receive FIFO, if any.
    fn read_packet(&mut self) -> Option<[u8; CONTROL_PACKET_SIZE]>;

    /// Stages the payload attached to the next acknowledgment.
    ///
    /// Returns false if it could not be staged.
    fn write_ack_payload(&mut self, payload: &[u8; ACK_PAYLOAD_SIZE]) -> bool;
}

impl<T: Transceiver + ?Sized> Transceiver for Box<T> {
    fn configure(&mut self, config: &RadioConfig) -> Result<()> {
        (**self).configure(config)
    }

    fn start_listening(&mut self) {
        (**self).start_listening();
    }

    fn stop_listening(&mut self) {
        (**self).stop_listening();
    }

    fn write(&mut self, packet: &[u8; CONTROL_PACKET_SIZE]) -> bool {
        (**self).write(packet)
    }

    fn read_ack_payload(&mut self) -> Option<[u8; ACK_PAYLOAD_SIZE]> {
        (**self).read_ack_payload()
    }

    fn read_packet(&mut self) -> Option<[u8; CONTROL_PACKET_SIZE]> {
        (**self).read_packet()
    }

    fn write_ack_payload(&mut self, payload: &[u8; ACK_PAYLOAD_SIZE]) -> bool {
        (**self).write_ack_payload(payload)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum End {
    Controller,
    Receiver,
}

#[derive(Debug)]
struct Air {
    link_up: bool,
    controller: Option<RadioConfig>,
    receiver: Option<RadioConfig>,
    receiver_listening: bool,
    fifo: VecDeque<[u8; CONTROL_PACKET_SIZE]>,
    staged_ack: Option<[u8; ACK_PAYLOAD_SIZE]>,
}

impl Air {
    fn new() -> Self {
        Self {
            link_up: true,
            controller: None,
            receiver: None,
            receiver_listening: false,
            fifo: VecDeque::with_capacity(RX_FIFO_DEPTH),
            staged_ack: None,
        }
    }

    fn tuned(&self) -> bool {
        match (self.controller, self.receiver) {
            (Some(a), Some(b)) => a.channel == b.channel && a.address == b.address,
            _ => false,
        }
    }
}

/// One end of an in-process radio link.
pub struct LoopbackRadio {
    air: Rc<RefCell<Air>>,
    end: End,
    listening: bool,
    last_ack: Option<[u8; ACK_PAYLOAD_SIZE]>,
}

impl fmt::Debug for LoopbackRadio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackRadio")
            .field("end", &self.end)
            .field("listening", &self.listening)
            .finish_non_exhaustive()
    }
}

/// Handle to switch a loopback link up or down.
#[derive(Debug, Clone)]
pub struct LoopbackLink {
    air: Rc<RefCell<Air>>,
}

impl LoopbackLink {
    /// Brings the link up or down. While down, every write fails.
    pub fn set_up(&self, up: bool) {
        self.air.borrow_mut().link_up = up;
    }

    #[must_use]
    pub fn is_up(&self) -> bool {
        self.air.borrow().link_up
    }

    /// Packets waiting in the receiver FIFO.
    #[must_use]
    pub fn pending_packets(&self) -> usize {
        self.air.borrow().fifo.len()
    }
}

impl LoopbackRadio {
    /// Creates a connected (controller, receiver) pair.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let air = Rc::new(RefCell::new(Air::new()));
        let make = |end| Self {
            air: Rc::clone(&air),
            end,
            listening: false,
            last_ack: None,
        };
        (make(End::Controller), make(End::Receiver))
    }

    /// Link control handle shared by both ends.
    #[must_use]
    pub fn link(&self) -> LoopbackLink {
        LoopbackLink {
            air: Rc::clone(&self.air),
        }
    }
}

impl Transceiver for LoopbackRadio {
    fn configure(&mut self, config: &RadioConfig) -> Result<()> {
        let mut air = self.air.borrow_mut();
        match self.end {
            End::Controller => air.controller = Some(*config),
            End::Receiver => air.receiver = Some(*config),
        }
        debug!(
            "Loopback {:?} configured: channel {} address {}",
            self.end,
            config.channel,
            config.address_str()
        );
        Ok(())
    }

    fn start_listening(&mut self) {
        self.listening = true;
        if self.end == End::Receiver {
            self.air.borrow_mut().receiver_listening = true;
        }
    }

    fn stop_listening(&mut self) {
        self.listening = false;
        if self.end == End::Receiver {
            self.air.borrow_mut().receiver_listening = false;
        }
    }

    fn write(&mut self, packet: &[u8; CONTROL_PACKET_SIZE]) -> bool {
        self.last_ack = None;
        if self.end != End::Controller || self.listening {
            return false;
        }

        let mut air = self.air.borrow_mut();
        // A full FIFO means the receiver does not acknowledge.
        if !air.link_up || !air.tuned() || !air.receiver_listening || air.fifo.len() >= RX_FIFO_DEPTH {
            return false;
        }

        air.fifo.push_back(*packet);
        self.last_ack = air.staged_ack.take();
        true
    }

    fn read_ack_payload(&mut self) -> Option<[u8; ACK_PAYLOAD_SIZE]> {
        self.last_ack.take()
    }

    fn read_packet(&mut self) -> Option<[u8; CONTROL_PACKET_SIZE]> {
        if self.end != End::Receiver {
            return None;
        }
        self.air.borrow_mut().fifo.pop_front()
    }

    fn write_ack_payload(&mut self, payload: &[u8; ACK_PAYLOAD_SIZE]) -> bool {
        if self.end != End::Receiver {
            return false;
        }
        self.air.borrow_mut().staged_ack = Some(*payload);
        true
    }
}
