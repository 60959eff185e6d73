//! # Receiver Link
//!
//! Receiving end: stages telemetry for the next acknowledgment and hands
//! out only the newest control packet from the receive FIFO.
//!
//! [`ReceiverNode`] is the complete receiver loop: it samples the aux
//! input, stages it as telemetry, polls for packets and logs radio
//! diagnostics once per second.

use std::fmt;

use tracing::{debug, info};

use super::protocol::{adc_to_percent, AckPayload, ControlFrame, RadioConfig};
use super::radio::Transceiver;
use crate::clock::{Clock, ClockGate};
use crate::error::Result;
use crate::input::AnalogInput;

/// Interval of the frame log line.
pub const FRAME_LOG_INTERVAL_MS: u32 = 250;

/// Interval of the radio diagnostics line.
pub const RADIO_DIAG_INTERVAL_MS: u32 = 1000;

/// Receiver end of the link.
pub struct ReceiverLink<T> {
    radio: T,
    packets: u32,
}

impl<T> fmt::Debug for ReceiverLink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceiverLink")
            .field("packets", &self.packets)
            .finish_non_exhaustive()
    }
}

impl<T: Transceiver> ReceiverLink<T> {
    /// Configures the radio and starts listening.
    ///
    /// # Errors
    ///
    /// Returns an error if the radio cannot be configured.
    pub fn new(mut radio: T, config: &RadioConfig) -> Result<Self> {
        radio.configure(config)?;
        radio.start_listening();
        info!(
            "Receiver link listening: channel {} address {}",
            config.channel,
            config.address_str()
        );
        Ok(Self { radio, packets: 0 })
    }

    /// Stages `value` (clamped to 100) as the next ack payload.
    pub fn send_telemetry(&mut self, value: u8) -> bool {
        self.radio
            .write_ack_payload(&AckPayload::telemetry(value).to_bytes())
    }

    /// Drains the receive FIFO and returns the newest packet, if any.
    pub fn poll_frame(&mut self) -> Option<ControlFrame> {
        let mut newest = None;
        while let Some(bytes) = self.radio.read_packet() {
            self.packets = self.packets.wrapping_add(1);
            newest = Some(bytes);
        }
        newest.map(ControlFrame::from_bytes)
    }

    /// Packets received so far, including drained older ones.
    #[must_use]
    pub fn packets_received(&self) -> u32 {
        self.packets
    }
}

/// Receiver loop: aux telemetry out, control frames in.
pub struct ReceiverNode<T, A, C> {
    link: ReceiverLink<T>,
    aux: A,
    clock: C,
    last_frame: Option<ControlFrame>,
    last_rx_at: Option<u32>,
    frame_log_gate: ClockGate,
    diag_gate: ClockGate,
    packets_at_last_diag: u32,
    rx_per_sec: u32,
}

impl<T, A, C> fmt::Debug for ReceiverNode<T, A, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceiverNode")
            .field("link", &self.link)
            .field("last_frame", &self.last_frame)
            .field("rx_per_sec", &self.rx_per_sec)
            .finish_non_exhaustive()
    }
}

impl<T: Transceiver, A: AnalogInput, C: Clock> ReceiverNode<T, A, C> {
    #[must_use]
    pub fn new(link: ReceiverLink<T>, aux: A, clock: C) -> Self {
        let now = clock.now_ms();
        Self {
            link,
            aux,
            clock,
            last_frame: None,
            last_rx_at: None,
            frame_log_gate: ClockGate::armed_at(FRAME_LOG_INTERVAL_MS, now),
            diag_gate: ClockGate::armed_at(RADIO_DIAG_INTERVAL_MS, now),
            packets_at_last_diag: 0,
            rx_per_sec: 0,
        }
    }

    /// One loop iteration. Returns the newest frame received this tick.
    pub fn tick(&mut self) -> Option<ControlFrame> {
        let now = self.clock.now_ms();
        let aux = adc_to_percent(self.aux.sample());
        self.link.send_telemetry(aux);

        let frame = self.link.poll_frame();
        if let Some(frame) = frame {
            self.last_frame = Some(frame);
            self.last_rx_at = Some(now);
        }

        if self.frame_log_gate.ready(now) {
            if let Some(f) = self.last_frame {
                debug!("RX lx={} ly={} rx={} ry={} aux={}", f.lx, f.ly, f.rx, f.ry, aux);
            }
        }

        if self.diag_gate.ready(now) {
            let packets = self.link.packets_received();
            self.rx_per_sec = packets.wrapping_sub(self.packets_at_last_diag);
            self.packets_at_last_diag = packets;
            debug!(
                "[RADIO] rx/s={} last_rx_age={:?}",
                self.rx_per_sec,
                self.last_rx_age()
            );
        }

        frame
    }

    /// Newest frame ever received.
    #[must_use]
    pub fn last_frame(&self) -> Option<ControlFrame> {
        self.last_frame
    }

    /// Milliseconds since the last packet.
    #[must_use]
    pub fn last_rx_age(&self) -> Option<u32> {
        self.last_rx_at.map(|at| self.clock.elapsed_since(at))
    }

    /// Packets counted over the last diagnostics second.
    #[must_use]
    pub fn rx_per_sec(&self) -> u32 {
        self.rx_per_sec
    }

    #[must_use]
    pub fn link(&self) -> &ReceiverLink<T> {
        &self.link
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::input::SharedAnalog;
    use crate::link::radio::MockTransceiver;
    use crate::link::{ControllerLink, LinkTiming, LoopbackRadio};

    fn mock_radio() -> MockTransceiver {
        let mut radio = MockTransceiver::new();
        radio.expect_configure().returning(|_| Ok(()));
        radio.expect_start_listening().return_const(());
        radio
    }

    // ==================== Receiver Link Tests ====================

    #[test]
    fn test_send_telemetry_stages_clamped_payload() {
        let mut radio = mock_radio();
        radio
            .expect_write_ack_payload()
            .withf(|payload| payload[..] == [100, 0])
            .times(1)
            .return_const(true);

        let mut link = ReceiverLink::new(radio, &RadioConfig::default()).unwrap();
        assert!(link.send_telemetry(180));
    }

    #[test]
    fn test_poll_frame_returns_newest() {
        let mut radio = mock_radio();
        let mut queue = vec![[3u8, 3, 3, 3], [2, 2, 2, 2], [1, 1, 1, 1]];
        radio.expect_read_packet().returning(move || queue.pop());

        let mut link = ReceiverLink::new(radio, &RadioConfig::default()).unwrap();
        assert_eq!(link.poll_frame(), Some(ControlFrame::new(3, 3, 3, 3)));
        assert_eq!(link.packets_received(), 3);
        assert_eq!(link.poll_frame(), None);
    }

    #[test]
    fn test_poll_frame_empty() {
        let mut radio = mock_radio();
        radio.expect_read_packet().returning(|| None);
        let mut link = ReceiverLink::new(radio, &RadioConfig::default()).unwrap();
        assert_eq!(link.poll_frame(), None);
        assert_eq!(link.packets_received(), 0);
    }

    // ==================== Receiver Node Tests ====================

    #[test]
    fn test_node_round_trip_over_loopback() {
        let (tx, rx) = LoopbackRadio::pair();
        let config = RadioConfig::default();
        let clock = MockClock::new();
        let aux = SharedAnalog::new(512);

        let mut node = ReceiverNode::new(ReceiverLink::new(rx, &config).unwrap(), aux.clone(), clock.clone());
        let mut controller = ControllerLink::new(tx, clock.clone(), &config, LinkTiming::default()).unwrap();

        node.tick();
        let outcome = controller.send_frame(&ControlFrame::new(10, -20, 30, -40));
        assert_eq!(outcome.telemetry(), Some(50));

        assert_eq!(node.tick(), Some(ControlFrame::new(10, -20, 30, -40)));
        assert_eq!(node.last_rx_age(), Some(0));
        clock.advance(15);
        assert_eq!(node.tick(), None);
        assert_eq!(node.last_rx_age(), Some(15));
        assert_eq!(node.last_frame(), Some(ControlFrame::new(10, -20, 30, -40)));

        aux.set(1023);
        clock.advance(5);
        node.tick();
        assert_eq!(controller.send_frame(&ControlFrame::default()).telemetry(), Some(100));
    }

    #[test]
    fn test_node_counts_packets_per_second() {
        let (tx, rx) = LoopbackRadio::pair();
        let config = RadioConfig::default();
        let clock = MockClock::new();

        let mut node = ReceiverNode::new(
            ReceiverLink::new(rx, &config).unwrap(),
            SharedAnalog::new(0),
            clock.clone(),
        );
        let mut controller = ControllerLink::new(tx, clock.clone(), &config, LinkTiming::default()).unwrap();

        for _ in 0..50 {
            controller.send_frame(&ControlFrame::default());
            node.tick();
            clock.advance(20);
        }
        node.tick();
        assert_eq!(node.rx_per_sec(), 50);
        assert_eq!(node.link().packets_received(), 50);
    }
}
