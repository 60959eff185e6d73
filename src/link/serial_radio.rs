//! # Serial Radio Bridge
//!
//! [`Transceiver`] backed by a radio bridge on a serial port. The host sends
//! configuration, listen and transmit requests as bridge frames; the bridge
//! answers each transmit with a `TX_RESULT` and forwards inbound packets as
//! `PACKET` frames.
//!
//! Serial faults are transient: they are logged and reported as a failed
//! write or missing data.

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Read, Write};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::bridge::{
    BridgeFrame, FrameReader, FRAME_CONFIGURE, FRAME_LISTEN, FRAME_PACKET, FRAME_STAGE_ACK,
    FRAME_TRANSMIT, FRAME_TX_RESULT,
};
use super::protocol::{RadioConfig, ACK_PAYLOAD_SIZE, CONTROL_PACKET_SIZE};
use super::radio::{Transceiver, RX_FIFO_DEPTH};
use crate::error::{RcLinkError, Result};

/// Default bridge baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Device paths tried when none is configured.
pub const DEFAULT_DEVICE_PATHS: &[&str] = &["/dev/ttyACM0", "/dev/ttyUSB0"];

/// Per-read timeout of the serial port.
pub const READ_TIMEOUT: Duration = Duration::from_millis(5);

/// Reads attempted while waiting for a `TX_RESULT`.
pub const TX_RESULT_READS: usize = 4;

/// Radio bridge on a serial port.
pub struct SerialRadio<P> {
    port: P,
    device_path: String,
    reader: FrameReader,
    inbound: VecDeque<[u8; CONTROL_PACKET_SIZE]>,
    last_ack: Option<[u8; ACK_PAYLOAD_SIZE]>,
}

impl<P> fmt::Debug for SerialRadio<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialRadio")
            .field("device_path", &self.device_path)
            .field("inbound", &self.inbound.len())
            .finish_non_exhaustive()
    }
}

impl SerialRadio<Box<dyn tokio_serial::SerialPort>> {
    /// Opens the first bridge found at the default paths.
    ///
    /// # Errors
    ///
    /// Returns `RcLinkError::SerialPortNotFound` if no path can be opened.
    pub fn open(baud_rate: u32) -> Result<Self> {
        Self::open_with_paths(DEFAULT_DEVICE_PATHS, baud_rate)
    }

    /// Opens the first of `paths` that works.
    ///
    /// # Arguments
    ///
    /// * `paths` - Device paths to try in order (e.g. `&["/dev/ttyACM0"]`)
    /// * `baud_rate` - Bridge baud rate
    ///
    /// # Errors
    ///
    /// Returns `RcLinkError::SerialPortNotFound` if no path can be opened.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use rc_link::link::SerialRadio;
    ///
    /// let radio = SerialRadio::open_with_paths(&["/dev/ttyUSB0"], 115_200)?;
    /// println!("Bridge at {}", radio.device_path());
    /// # Ok::<(), rc_link::error::RcLinkError>(())
    /// ```
    pub fn open_with_paths(paths: &[&str], baud_rate: u32) -> Result<Self> {
        for path in paths {
            debug!("Trying to open radio bridge: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(port) => {
                    info!("Opened radio bridge at {} ({} baud)", path, baud_rate);
                    return Ok(Self::from_port(port, path));
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                }
            }
        }

        Err(RcLinkError::SerialPortNotFound(paths.join(", ")))
    }

    fn open_port(path: &str, baud_rate: u32) -> Result<Box<dyn tokio_serial::SerialPort>> {
        tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| RcLinkError::Serial(format!("Failed to open {}: {}", path, e)))
    }
}

impl<P: Read + Write> SerialRadio<P> {
    /// Wraps an already opened port.
    pub fn from_port(port: P, device_path: &str) -> Self {
        Self {
            port,
            device_path: device_path.to_string(),
            reader: FrameReader::new(),
            inbound: VecDeque::with_capacity(RX_FIFO_DEPTH),
            last_ack: None,
        }
    }

    #[must_use]
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Frames dropped for bad framing or CRC.
    #[must_use]
    pub fn dropped_frames(&self) -> u32 {
        self.reader.dropped()
    }

    /// Sends one bridge frame.
    ///
    /// # Errors
    ///
    /// Returns `RcLinkError::Serial` on write failure.
    pub fn send(&mut self, frame_type: u8, payload: &[u8]) -> Result<()> {
        let frame = BridgeFrame::new(frame_type, payload.to_vec())?;
        self.port
            .write_all(&frame.encode())
            .and_then(|()| self.port.flush())
            .map_err(|e| RcLinkError::Serial(format!("Failed to write frame: {}", e)))
    }

    /// Reads what the port has and dispatches complete frames.
    ///
    /// Returns the `TX_RESULT` payload if one arrived.
    fn pump(&mut self) -> Result<Option<Vec<u8>>> {
        let mut buf = [0u8; 64];
        let n = match self.port.read(&mut buf) {
            Ok(n) => n,
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => 0,
            Err(e) => return Err(RcLinkError::Serial(format!("Failed to read: {}", e))),
        };
        self.reader.push(&buf[..n]);

        let mut tx_result = None;
        while let Some(frame) = self.reader.next_frame() {
            match frame.frame_type {
                FRAME_PACKET => match <[u8; CONTROL_PACKET_SIZE]>::try_from(frame.payload.as_slice()) {
                    Ok(_) if self.inbound.len() >= RX_FIFO_DEPTH => {
                        debug!("Receive FIFO full, dropping packet");
                    }
                    Ok(packet) => self.inbound.push_back(packet),
                    Err(_) => warn!("PACKET frame with {} bytes", frame.payload.len()),
                },
                FRAME_TX_RESULT => tx_result = Some(frame.payload),
                other => debug!("Ignoring bridge frame type 0x{:02X}", other),
            }
        }
        Ok(tx_result)
    }

    fn set_listening(&mut self, listening: bool) {
        if let Err(e) = self.send(FRAME_LISTEN, &[u8::from(listening)]) {
            warn!("Radio bridge listen request failed: {}", e);
        }
    }
}

impl<P: Read + Write> Transceiver for SerialRadio<P> {
    fn configure(&mut self, config: &RadioConfig) -> Result<()> {
        let mut payload = vec![
            config.channel,
            config.pa_level,
            config.retry_delay,
            config.retry_count,
        ];
        payload.extend_from_slice(&config.address);
        self.send(FRAME_CONFIGURE, &payload)?;
        info!(
            "Radio bridge {} configured: channel {} address {}",
            self.device_path,
            config.channel,
            config.address_str()
        );
        Ok(())
    }

    fn start_listening(&mut self) {
        self.set_listening(true);
    }

    fn stop_listening(&mut self) {
        self.set_listening(false);
    }

    fn write(&mut self, packet: &[u8; CONTROL_PACKET_SIZE]) -> bool {
        self.last_ack = None;
        if let Err(e) = self.send(FRAME_TRANSMIT, packet) {
            warn!("Radio bridge transmit failed: {}", e);
            return false;
        }

        for _ in 0..TX_RESULT_READS {
            match self.pump() {
                Ok(Some(result)) => {
                    let acked = result.first() == Some(&1);
                    if acked {
                        self.last_ack = result
                            .get(1..1 + ACK_PAYLOAD_SIZE)
                            .and_then(|bytes| bytes.try_into().ok());
                    }
                    return acked;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Radio bridge read failed: {}", e);
                    return false;
                }
            }
        }

        debug!("No TX_RESULT from radio bridge");
        false
    }

    fn read_ack_payload(&mut self) -> Option<[u8; ACK_PAYLOAD_SIZE]> {
        self.last_ack.take()
    }

    fn read_packet(&mut self) -> Option<[u8; CONTROL_PACKET_SIZE]> {
        if self.inbound.is_empty() {
            if let Err(e) = self.pump() {
                warn!("Radio bridge read failed: {}", e);
            }
        }
        self.inbound.pop_front()
    }

    fn write_ack_payload(&mut self, payload: &[u8; ACK_PAYLOAD_SIZE]) -> bool {
        match self.send(FRAME_STAGE_ACK, payload) {
            Ok(()) => true,
            Err(e) => {
                warn!("Radio bridge ack staging failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::bridge::decode_frame;

    /// In-memory port: reads from a scripted input, records output.
    #[derive(Default)]
    struct ScriptedPort {
        input: VecDeque<u8>,
        output: Vec<u8>,
        fail_writes: bool,
    }

    impl ScriptedPort {
        fn reply(&mut self, frame_type: u8, payload: &[u8]) {
            let bytes = BridgeFrame::new(frame_type, payload.to_vec()).unwrap().encode();
            self.input.extend(bytes);
        }
    }

    impl Read for ScriptedPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.input.is_empty() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "timeout"));
            }
            let n = buf.len().min(self.input.len());
            for (slot, byte) in buf.iter_mut().zip(self.input.drain(..n)) {
                *slot = byte;
            }
            Ok(n)
        }
    }

    impl Write for ScriptedPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.fail_writes {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"));
            }
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn sent_frames(radio: &SerialRadio<ScriptedPort>) -> Vec<BridgeFrame> {
        let mut reader = FrameReader::new();
        reader.push(&radio.port.output);
        std::iter::from_fn(|| reader.next_frame()).collect()
    }

    // ==================== Request Tests ====================

    #[test]
    fn test_configure_frame() {
        let mut radio = SerialRadio::from_port(ScriptedPort::default(), "test");
        radio.configure(&RadioConfig::default()).unwrap();
        let frames = sent_frames(&radio);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].frame_type, FRAME_CONFIGURE);
        assert_eq!(frames[0].payload, vec![76, 0, 3, 5, b'R', b'C', b'0', b'0', b'1']);
    }

    #[test]
    fn test_listen_frames() {
        let mut radio = SerialRadio::from_port(ScriptedPort::default(), "test");
        radio.start_listening();
        radio.stop_listening();
        let frames = sent_frames(&radio);
        assert_eq!(frames[0].payload, vec![1]);
        assert_eq!(frames[1].payload, vec![0]);
        assert!(frames.iter().all(|f| f.frame_type == FRAME_LISTEN));
    }

    #[test]
    fn test_stage_ack_frame() {
        let mut radio = SerialRadio::from_port(ScriptedPort::default(), "test");
        assert!(radio.write_ack_payload(&[33, 0]));
        let output = radio.port.output.clone();
        let frame = decode_frame(&output).unwrap();
        assert_eq!(frame.frame_type, FRAME_STAGE_ACK);
        assert_eq!(frame.payload, vec![33, 0]);
    }

    // ==================== Transmit Tests ====================

    #[test]
    fn test_write_acked_with_payload() {
        let mut port = ScriptedPort::default();
        port.reply(FRAME_TX_RESULT, &[1, 61, 0]);
        let mut radio = SerialRadio::from_port(port, "test");

        assert!(radio.write(&[1, 2, 3, 4]));
        assert_eq!(radio.read_ack_payload(), Some([61, 0]));
        assert_eq!(radio.read_ack_payload(), None);

        let frames = sent_frames(&radio);
        assert_eq!(frames[0].frame_type, FRAME_TRANSMIT);
        assert_eq!(frames[0].payload, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_write_acked_without_payload() {
        let mut port = ScriptedPort::default();
        port.reply(FRAME_TX_RESULT, &[1]);
        let mut radio = SerialRadio::from_port(port, "test");
        assert!(radio.write(&[0; 4]));
        assert_eq!(radio.read_ack_payload(), None);
    }

    #[test]
    fn test_write_not_acked() {
        let mut port = ScriptedPort::default();
        port.reply(FRAME_TX_RESULT, &[0]);
        let mut radio = SerialRadio::from_port(port, "test");
        assert!(!radio.write(&[0; 4]));
    }

    #[test]
    fn test_write_times_out_without_result() {
        let mut radio = SerialRadio::from_port(ScriptedPort::default(), "test");
        assert!(!radio.write(&[0; 4]));
    }

    #[test]
    fn test_write_fails_on_port_error() {
        let port = ScriptedPort {
            fail_writes: true,
            ..ScriptedPort::default()
        };
        let mut radio = SerialRadio::from_port(port, "test");
        assert!(!radio.write(&[0; 4]));
        assert!(!radio.write_ack_payload(&[0, 0]));
        assert!(radio.configure(&RadioConfig::default()).is_err());
    }

    #[test]
    fn test_corrupt_tx_result_is_no_ack() {
        let mut port = ScriptedPort::default();
        let mut bytes = BridgeFrame::new(FRAME_TX_RESULT, vec![1, 50, 0]).unwrap().encode();
        bytes[3] ^= 0x40;
        port.input.extend(bytes);
        let mut radio = SerialRadio::from_port(port, "test");
        assert!(!radio.write(&[0; 4]));
        assert_eq!(radio.dropped_frames(), 1);
    }

    // ==================== Receive Tests ====================

    #[test]
    fn test_read_packet_collects_inbound() {
        let mut port = ScriptedPort::default();
        port.reply(FRAME_PACKET, &[1, 1, 1, 1]);
        port.reply(FRAME_PACKET, &[2, 2, 2, 2]);
        let mut radio = SerialRadio::from_port(port, "test");
        assert_eq!(radio.read_packet(), Some([1, 1, 1, 1]));
        assert_eq!(radio.read_packet(), Some([2, 2, 2, 2]));
        assert_eq!(radio.read_packet(), None);
    }

    #[test]
    fn test_packets_arriving_during_transmit_are_kept() {
        let mut port = ScriptedPort::default();
        port.reply(FRAME_PACKET, &[7, 7, 7, 7]);
        port.reply(FRAME_TX_RESULT, &[1]);
        let mut radio = SerialRadio::from_port(port, "test");
        assert!(radio.write(&[0; 4]));
        assert_eq!(radio.read_packet(), Some([7, 7, 7, 7]));
    }

    #[test]
    fn test_inbound_packets_capped_at_fifo_depth() {
        let mut port = ScriptedPort::default();
        for round in 0..5u8 {
            for i in 0..7u8 {
                port.reply(FRAME_PACKET, &[round, i, 0, 0]);
            }
            port.reply(FRAME_TX_RESULT, &[1]);
        }
        let mut radio = SerialRadio::from_port(port, "test");

        for _ in 0..5 {
            assert!(radio.write(&[0; 4]));
        }
        assert_eq!(radio.inbound.len(), RX_FIFO_DEPTH);

        // Oldest packets stay, later arrivals are dropped
        assert_eq!(radio.read_packet(), Some([0, 0, 0, 0]));
        assert_eq!(radio.read_packet(), Some([0, 1, 0, 0]));
        assert_eq!(radio.read_packet(), Some([0, 2, 0, 0]));
    }

    #[test]
    fn test_short_packet_frame_ignored() {
        let mut port = ScriptedPort::default();
        port.reply(FRAME_PACKET, &[1, 2]);
        let mut radio = SerialRadio::from_port(port, "test");
        assert_eq!(radio.read_packet(), None);
    }

    #[test]
    #[ignore] // Requires a radio bridge on a serial port
    fn test_open_real_bridge() {
        let mut radio = SerialRadio::open(DEFAULT_BAUD_RATE).unwrap();
        radio.configure(&RadioConfig::default()).unwrap();
    }
}
