//! # Controller Link
//!
//! Transmitting end: sends one control packet per link tick and turns the
//! telemetry in ack payloads into a smoothed estimate.

use std::fmt;

use tracing::{debug, info};

use super::filter::{TelemetryFilter, DEFAULT_FAILSAFE_MS};
use super::protocol::{AckPayload, ControlFrame, RadioConfig};
use super::radio::Transceiver;
use crate::clock::{Clock, ClockGate};
use crate::error::Result;

/// Default transmit interval.
pub const DEFAULT_TX_INTERVAL_MS: u32 = 20;

/// Default smoothing / indicator interval.
pub const DEFAULT_INDICATOR_INTERVAL_MS: u32 = 10;

/// Interval of the periodic telemetry debug line.
pub const DIAGNOSTIC_INTERVAL_MS: u32 = 500;

/// Link timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTiming {
    pub tx_interval_ms: u32,
    pub indicator_interval_ms: u32,
    pub failsafe_timeout_ms: u32,
}

impl Default for LinkTiming {
    fn default() -> Self {
        Self {
            tx_interval_ms: DEFAULT_TX_INTERVAL_MS,
            indicator_interval_ms: DEFAULT_INDICATOR_INTERVAL_MS,
            failsafe_timeout_ms: DEFAULT_FAILSAFE_MS,
        }
    }
}

/// Result of [`ControllerLink::send_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Called again within the same tick; nothing was sent.
    RateLimited,
    /// Sent but not acknowledged.
    Lost,
    /// Acknowledged, with the telemetry value if the ack carried one.
    Acked { telemetry: Option<u8> },
}

impl SendOutcome {
    #[must_use]
    pub fn acknowledged(&self) -> bool {
        matches!(self, SendOutcome::Acked { .. })
    }

    #[must_use]
    pub fn telemetry(&self) -> Option<u8> {
        match self {
            SendOutcome::Acked { telemetry } => *telemetry,
            _ => None,
        }
    }
}

/// Transmission counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkStats {
    /// Packets handed to the radio.
    pub tx_attempts: u32,
    /// Packets acknowledged by the receiver.
    pub acks: u32,
    /// Time of the last acknowledgment.
    pub last_ack_at: Option<u32>,
}

impl LinkStats {
    /// Unacknowledged transmissions.
    #[must_use]
    pub fn lost(&self) -> u32 {
        self.tx_attempts.wrapping_sub(self.acks)
    }

    /// Milliseconds since the last ack, `None` before the first one.
    #[must_use]
    pub fn last_ack_age(&self, now: u32) -> Option<u32> {
        self.last_ack_at.map(|at| now.wrapping_sub(at))
    }

    /// Acknowledged share of attempts in percent.
    #[must_use]
    pub fn ack_rate_pct(&self) -> u8 {
        if self.tx_attempts == 0 {
            return 0;
        }
        (u64::from(self.acks) * 100 / u64::from(self.tx_attempts)) as u8
    }
}

/// Controller end of the link.
pub struct ControllerLink<T, C> {
    radio: T,
    clock: C,
    tx_gate: ClockGate,
    indicator_gate: ClockGate,
    diagnostic_gate: ClockGate,
    filter: TelemetryFilter,
    stats: LinkStats,
    last_raw: Option<u8>,
}

impl<T, C> fmt::Debug for ControllerLink<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerLink")
            .field("filter", &self.filter)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<T: Transceiver, C: Clock> ControllerLink<T, C> {
    /// Configures the radio, starts listening and arms the failsafe at the
    /// current time.
    ///
    /// # Errors
    ///
    /// Returns an error if the radio cannot be configured.
    pub fn new(mut radio: T, clock: C, config: &RadioConfig, timing: LinkTiming) -> Result<Self> {
        radio.configure(config)?;
        radio.start_listening();
        info!(
            "Controller link up: channel {} address {} tx every {} ms",
            config.channel,
            config.address_str(),
            timing.tx_interval_ms
        );

        let now = clock.now_ms();
        Ok(Self {
            radio,
            clock,
            tx_gate: ClockGate::new(timing.tx_interval_ms),
            indicator_gate: ClockGate::new(timing.indicator_interval_ms),
            diagnostic_gate: ClockGate::armed_at(DIAGNOSTIC_INTERVAL_MS, now),
            filter: TelemetryFilter::new(timing.failsafe_timeout_ms, now),
            stats: LinkStats::default(),
            last_raw: None,
        })
    }

    /// Sends `frame` unless a packet already went out this tick.
    ///
    /// An ack refreshes the failsafe timer; its payload, if any, feeds the
    /// telemetry filter.
    pub fn send_frame(&mut self, frame: &ControlFrame) -> SendOutcome {
        let now = self.clock.now_ms();
        if !self.tx_gate.ready(now) {
            return SendOutcome::RateLimited;
        }

        self.radio.stop_listening();
        let acked = self.radio.write(&frame.to_bytes());
        self.radio.start_listening();
        self.stats.tx_attempts = self.stats.tx_attempts.wrapping_add(1);

        if !acked {
            return SendOutcome::Lost;
        }

        self.stats.acks = self.stats.acks.wrapping_add(1);
        self.stats.last_ack_at = Some(now);

        let telemetry = self
            .radio
            .read_ack_payload()
            .map(|bytes| AckPayload::from_bytes(bytes).aux);
        match telemetry {
            Some(aux) => {
                self.last_raw = Some(aux);
                self.filter.push(aux, now);
            }
            None => self.filter.mark_alive(now),
        }

        SendOutcome::Acked { telemetry }
    }

    /// Runs one smoothing step if the indicator interval has elapsed.
    ///
    /// Returns the new smoothed value when a step ran.
    pub fn update_telemetry(&mut self) -> Option<u8> {
        let now = self.clock.now_ms();
        if !self.indicator_gate.ready(now) {
            return None;
        }

        let smoothed = self.filter.step(now);

        if self.diagnostic_gate.ready(now) {
            debug!(
                "[AUX] raw={} target={} smooth={} acks={}/{} last_ack_age={:?}",
                self.last_raw.map_or(-1, i16::from),
                self.filter.target(),
                smoothed,
                self.stats.acks,
                self.stats.tx_attempts,
                self.stats.last_ack_age(now)
            );
        }

        Some(smoothed)
    }

    /// Smoothed telemetry, `0..=100`.
    #[must_use]
    pub fn telemetry(&self) -> u8 {
        self.filter.smoothed()
    }

    /// Filter target before smoothing.
    #[must_use]
    pub fn telemetry_target(&self) -> u8 {
        self.filter.target()
    }

    /// Last unfiltered telemetry value received.
    #[must_use]
    pub fn last_raw_telemetry(&self) -> Option<u8> {
        self.last_raw
    }

    /// True while the failsafe timeout is exceeded.
    #[must_use]
    pub fn link_lost(&self) -> bool {
        self.filter.failsafe_active(self.clock.now_ms())
    }

    #[must_use]
    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    #[must_use]
    pub fn radio(&self) -> &T {
        &self.radio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::link::radio::MockTransceiver;
    use crate::link::LoopbackRadio;
    use mockall::Sequence;

    fn mock_radio() -> MockTransceiver {
        let mut radio = MockTransceiver::new();
        radio.expect_configure().returning(|_| Ok(()));
        radio.expect_start_listening().return_const(());
        radio.expect_stop_listening().return_const(());
        radio
    }

    fn link_with(radio: MockTransceiver, clock: &MockClock) -> ControllerLink<MockTransceiver, MockClock> {
        ControllerLink::new(radio, clock.clone(), &RadioConfig::default(), LinkTiming::default()).unwrap()
    }

    // ==================== Send Tests ====================

    #[test]
    fn test_send_sequence_stop_write_start() {
        let mut seq = Sequence::new();
        let mut radio = MockTransceiver::new();
        radio.expect_configure().times(1).in_sequence(&mut seq).returning(|_| Ok(()));
        radio.expect_start_listening().times(1).in_sequence(&mut seq).return_const(());
        radio.expect_stop_listening().times(1).in_sequence(&mut seq).return_const(());
        radio
            .expect_write()
            .withf(|packet| packet[..] == [100, 0, 0x9C, 5])
            .times(1)
            .in_sequence(&mut seq)
            .return_const(true);
        radio.expect_start_listening().times(1).in_sequence(&mut seq).return_const(());
        radio
            .expect_read_ack_payload()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Some([64, 0]));

        let clock = MockClock::new();
        let mut link = link_with(radio, &clock);
        let outcome = link.send_frame(&ControlFrame::new(100, 0, -100, 5));
        assert_eq!(outcome, SendOutcome::Acked { telemetry: Some(64) });
        assert!(outcome.acknowledged());
        assert_eq!(outcome.telemetry(), Some(64));
    }

    #[test]
    fn test_send_rate_limited_within_tick() {
        let mut radio = mock_radio();
        radio.expect_write().times(2).return_const(true);
        radio.expect_read_ack_payload().returning(|| None);

        let clock = MockClock::new();
        let mut link = link_with(radio, &clock);
        let frame = ControlFrame::default();

        assert!(link.send_frame(&frame).acknowledged());
        for _ in 0..19 {
            clock.advance(1);
            assert_eq!(link.send_frame(&frame), SendOutcome::RateLimited);
        }
        clock.advance(1);
        assert!(link.send_frame(&frame).acknowledged());
        assert_eq!(link.stats().tx_attempts, 2);
    }

    #[test]
    fn test_lost_packet_skips_ack_payload() {
        let mut radio = mock_radio();
        radio.expect_write().return_const(false);
        radio.expect_read_ack_payload().never();

        let clock = MockClock::new();
        let mut link = link_with(radio, &clock);
        let outcome = link.send_frame(&ControlFrame::default());
        assert_eq!(outcome, SendOutcome::Lost);
        assert!(!outcome.acknowledged());
        assert_eq!(link.stats().lost(), 1);
        assert_eq!(link.stats().last_ack_at, None);
    }

    #[test]
    fn test_configure_error_propagates() {
        let mut radio = MockTransceiver::new();
        radio
            .expect_configure()
            .returning(|_| Err(crate::error::RcLinkError::Serial("no response".to_string())));
        let result = ControllerLink::new(radio, MockClock::new(), &RadioConfig::default(), LinkTiming::default());
        assert!(result.is_err());
    }

    // ==================== Telemetry Tests ====================

    #[test]
    fn test_empty_ack_keeps_link_alive_without_sample() {
        let mut radio = mock_radio();
        radio.expect_write().return_const(true);
        radio.expect_read_ack_payload().returning(|| None);

        let clock = MockClock::new();
        let mut link = link_with(radio, &clock);
        for _ in 0..20 {
            assert_eq!(link.send_frame(&ControlFrame::default()).telemetry(), None);
            link.update_telemetry();
            clock.advance(20);
        }
        assert!(!link.link_lost());
        assert_eq!(link.last_raw_telemetry(), None);
        assert_eq!(link.telemetry(), 0);
    }

    #[test]
    fn test_update_telemetry_gated() {
        let radio = mock_radio();
        let clock = MockClock::new();
        let mut link = link_with(radio, &clock);
        assert!(link.update_telemetry().is_some());
        clock.advance(9);
        assert!(link.update_telemetry().is_none());
        clock.advance(1);
        assert!(link.update_telemetry().is_some());
    }

    #[test]
    fn test_end_to_end_telemetry_with_glitch() {
        let (tx, mut rx) = LoopbackRadio::pair();
        let config = RadioConfig::default();
        rx.configure(&config).unwrap();
        rx.start_listening();

        let clock = MockClock::new();
        let mut link = ControllerLink::new(tx, clock.clone(), &config, LinkTiming::default()).unwrap();

        let mut targets = Vec::new();
        for value in [50u8, 52, 4, 51, 50] {
            assert!(rx.write_ack_payload(&AckPayload::telemetry(value).to_bytes()));
            assert_eq!(link.send_frame(&ControlFrame::default()).telemetry(), Some(value));
            targets.push(link.telemetry_target());
            while rx.read_packet().is_some() {}
            for _ in 0..2 {
                link.update_telemetry();
                clock.advance(10);
            }
        }

        assert_eq!(targets, vec![50, 50, 50, 51, 50]);
        assert!(link.telemetry() <= 51);
        assert!(link.telemetry() > 4);
    }

    #[test]
    fn test_failsafe_after_link_loss() {
        let (tx, mut rx) = LoopbackRadio::pair();
        let config = RadioConfig::default();
        rx.configure(&config).unwrap();
        rx.start_listening();
        let control = tx.link();

        let clock = MockClock::new();
        let mut link = ControllerLink::new(tx, clock.clone(), &config, LinkTiming::default()).unwrap();

        for _ in 0..20 {
            rx.write_ack_payload(&[80, 0]);
            link.send_frame(&ControlFrame::default());
            while rx.read_packet().is_some() {}
            for _ in 0..2 {
                link.update_telemetry();
                clock.advance(10);
            }
        }
        assert!(link.telemetry() > 60);

        control.set_up(false);
        for _ in 0..60 {
            link.send_frame(&ControlFrame::default());
            link.update_telemetry();
            clock.advance(10);
        }
        assert!(link.link_lost());
        assert_eq!(link.telemetry_target(), 0);
        assert_eq!(link.telemetry(), 0);
        assert!(link.stats().lost() > 0);
    }

    // ==================== Stats Tests ====================

    #[test]
    fn test_stats_ack_age_and_rate() {
        let stats = LinkStats {
            tx_attempts: 8,
            acks: 6,
            last_ack_at: Some(100),
        };
        assert_eq!(stats.lost(), 2);
        assert_eq!(stats.ack_rate_pct(), 75);
        assert_eq!(stats.last_ack_age(160), Some(60));
        assert_eq!(LinkStats::default().ack_rate_pct(), 0);
        assert_eq!(LinkStats::default().last_ack_age(5), None);
    }
}
