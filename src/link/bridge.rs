//! # Serial Bridge Framing
//!
//! Frames exchanged with a radio bridge over a serial line:
//!
//! ```text
//! [sync 0xC8][len][type][payload ...][crc8]
//! ```
//!
//! `len` counts type + payload + crc. The CRC8-DVB-S2 covers
//! len + type + payload.
//!
//! ## Usage
//!
//! ```
//! use rc_link::link::bridge::{decode_frame, BridgeFrame, FRAME_TRANSMIT};
//!
//! let frame = BridgeFrame::new(FRAME_TRANSMIT, vec![1, 2, 3, 4]).unwrap();
//! let bytes = frame.encode();
//! assert_eq!(bytes.len(), 8);
//! assert_eq!(decode_frame(&bytes).unwrap(), frame);
//! ```

use bytes::{Buf, BufMut, BytesMut};
use tracing::warn;

use super::crc::crc8_dvb_s2;
use crate::error::{RcLinkError, Result};

/// Frame sync byte.
pub const SYNC_BYTE: u8 = 0xC8;

/// Largest payload carried by a bridge frame.
pub const MAX_PAYLOAD_SIZE: usize = 16;

/// Smallest complete frame: sync + len + type + crc.
pub const MIN_FRAME_SIZE: usize = 4;

/// host→bridge: channel, pa_level, retry_delay, retry_count, address[5]
pub const FRAME_CONFIGURE: u8 = 0x01;
/// host→bridge: 1 = start listening, 0 = stop
pub const FRAME_LISTEN: u8 = 0x02;
/// host→bridge: 4-byte control packet
pub const FRAME_TRANSMIT: u8 = 0x10;
/// bridge→host: status (1 = acked), optional 2-byte ack payload
pub const FRAME_TX_RESULT: u8 = 0x11;
/// bridge→host: 4-byte inbound control packet
pub const FRAME_PACKET: u8 = 0x20;
/// host→bridge: 2-byte ack payload
pub const FRAME_STAGE_ACK: u8 = 0x21;

/// One bridge frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeFrame {
    pub frame_type: u8,
    pub payload: Vec<u8>,
}

impl BridgeFrame {
    /// Creates a frame.
    ///
    /// # Errors
    ///
    /// Returns `RcLinkError::Protocol` if the payload exceeds
    /// [`MAX_PAYLOAD_SIZE`].
    pub fn new(frame_type: u8, payload: Vec<u8>) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(RcLinkError::Protocol(format!(
                "Payload size {} exceeds maximum {}",
                payload.len(),
                MAX_PAYLOAD_SIZE
            )));
        }
        Ok(Self {
            frame_type,
            payload,
        })
    }

    /// Value of the length byte (type + payload + crc).
    #[must_use]
    pub fn length(&self) -> u8 {
        (self.payload.len() + 2) as u8
    }

    /// Serializes the frame including sync and CRC.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.payload.len() + MIN_FRAME_SIZE);
        buf.put_u8(SYNC_BYTE);
        buf.put_u8(self.length());
        buf.put_u8(self.frame_type);
        buf.put_slice(&self.payload);
        let crc = crc8_dvb_s2(&buf[1..]);
        buf.put_u8(crc);
        buf.to_vec()
    }
}

/// Decodes one complete frame.
///
/// # Errors
///
/// Returns `RcLinkError::Protocol` if:
/// - the frame is too short
/// - the sync byte is wrong
/// - the length byte is out of range or disagrees with the data
/// - the CRC does not match
pub fn decode_frame(frame: &[u8]) -> Result<BridgeFrame> {
    if frame.len() < MIN_FRAME_SIZE {
        return Err(RcLinkError::Protocol("Frame too short".to_string()));
    }

    if frame[0] != SYNC_BYTE {
        return Err(RcLinkError::Protocol(format!(
            "Invalid sync byte: 0x{:02X}",
            frame[0]
        )));
    }

    let length = frame[1] as usize;
    if !(2..=MAX_PAYLOAD_SIZE + 2).contains(&length) {
        return Err(RcLinkError::Protocol(format!("Invalid length byte: {}", length)));
    }

    if frame.len() < 2 + length {
        return Err(RcLinkError::Protocol(format!(
            "Frame too short: expected {} bytes, got {}",
            2 + length,
            frame.len()
        )));
    }

    let received_crc = frame[1 + length];
    let calculated_crc = crc8_dvb_s2(&frame[1..1 + length]);
    if calculated_crc != received_crc {
        return Err(RcLinkError::Protocol(format!(
            "CRC mismatch: expected 0x{:02X}, got 0x{:02X}",
            calculated_crc, received_crc
        )));
    }

    BridgeFrame::new(frame[2], frame[3..1 + length].to_vec())
}

/// Reassembles frames from a byte stream, resynchronizing after garbage.
#[derive(Debug, Default)]
pub struct FrameReader {
    buffer: BytesMut,
    dropped: u32,
}

impl FrameReader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends received bytes.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Next complete valid frame, skipping invalid data.
    pub fn next_frame(&mut self) -> Option<BridgeFrame> {
        loop {
            match self.buffer.iter().position(|&b| b == SYNC_BYTE) {
                Some(start) => self.buffer.advance(start),
                None => {
                    self.buffer.clear();
                    return None;
                }
            }

            if self.buffer.len() < 2 {
                return None;
            }

            let length = self.buffer[1] as usize;
            if !(2..=MAX_PAYLOAD_SIZE + 2).contains(&length) {
                self.reject(format!("Invalid length byte: {}", length));
                continue;
            }

            let total = 2 + length;
            if self.buffer.len() < total {
                return None;
            }

            match decode_frame(&self.buffer[..total]) {
                Ok(frame) => {
                    self.buffer.advance(total);
                    return Some(frame);
                }
                Err(e) => self.reject(e.to_string()),
            }
        }
    }

    /// Frames rejected so far.
    #[must_use]
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    /// Bytes waiting for the rest of a frame.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn reject(&mut self, reason: String) {
        warn!("Dropping bridge data: {}", reason);
        self.dropped = self.dropped.wrapping_add(1);
        // Skip this sync byte and search for the next one.
        self.buffer.advance(1);
    }
}
