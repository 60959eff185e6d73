//! # Link Protocol Definitions
//!
//! Wire formats shared by the controller and the receiver:
//!
//! - **Control packet** (4 bytes): `{lx, ly, rx, ry}` as `i8` percentages
//! - **Ack payload** (2 bytes): `{aux, flags}`, aux in `0..=100`, flags 0
//!
//! Plus the radio parameters both ends must agree on.

use crate::input::ADC_MAX;
use crate::joystick::OUTPUT_MAX;

/// Size of the control packet on the air.
pub const CONTROL_PACKET_SIZE: usize = 4;

/// Size of the acknowledgment payload.
pub const ACK_PAYLOAD_SIZE: usize = 2;

/// Full-scale percentage.
pub const PERCENT_MAX: i8 = 100;

/// Default RF channel.
pub const DEFAULT_CHANNEL: u8 = 76;

/// Default shared pipe address.
pub const DEFAULT_ADDRESS: [u8; ADDRESS_LEN] = *b"RC001";

/// Pipe address length.
pub const ADDRESS_LEN: usize = 5;

/// Maps signed axis output (`-32767..=32767`) to a percentage.
///
/// Truncates toward zero and clamps to `-100..=100`.
///
/// # Examples
///
/// ```
/// use rc_link::link::map_to_pct;
///
/// assert_eq!(map_to_pct(32767), 100);
/// assert_eq!(map_to_pct(-32767), -100);
/// assert_eq!(map_to_pct(16383), 49);
/// assert_eq!(map_to_pct(-32768), -100);
/// ```
#[must_use]
pub fn map_to_pct(value: i16) -> i8 {
    let pct = i32::from(value) * i32::from(PERCENT_MAX) / i32::from(OUTPUT_MAX);
    pct.clamp(-i32::from(PERCENT_MAX), i32::from(PERCENT_MAX)) as i8
}

/// Maps a 10-bit ADC sample to `0..=100`, rounding to nearest.
///
/// Used by the receiver to turn its aux input into telemetry.
///
/// # Examples
///
/// ```
/// use rc_link::link::adc_to_percent;
///
/// assert_eq!(adc_to_percent(0), 0);
/// assert_eq!(adc_to_percent(512), 50);
/// assert_eq!(adc_to_percent(1023), 100);
/// ```
#[must_use]
pub fn adc_to_percent(raw: u16) -> u8 {
    let raw = u32::from(raw.min(ADC_MAX));
    let max = u32::from(ADC_MAX);
    ((raw * 100 + max / 2) / max) as u8
}

/// One control packet: four signed stick percentages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlFrame {
    pub lx: i8,
    pub ly: i8,
    pub rx: i8,
    pub ry: i8,
}

impl ControlFrame {
    /// Builds a frame from percentages, clamping each to `-100..=100`.
    #[must_use]
    pub fn new(lx: i8, ly: i8, rx: i8, ry: i8) -> Self {
        let clamp = |v: i8| v.clamp(-PERCENT_MAX, PERCENT_MAX);
        Self {
            lx: clamp(lx),
            ly: clamp(ly),
            rx: clamp(rx),
            ry: clamp(ry),
        }
    }

    /// Builds a frame from axis outputs in `lx, ly, rx, ry` order.
    ///
    /// # Examples
    ///
    /// ```
    /// use rc_link::link::ControlFrame;
    ///
    /// let frame = ControlFrame::from_axes([32767, 0, -32767, 3276]);
    /// assert_eq!(frame, ControlFrame::new(100, 0, -100, 9));
    /// ```
    #[must_use]
    pub fn from_axes(axes: [i16; 4]) -> Self {
        let [lx, ly, rx, ry] = axes.map(map_to_pct);
        Self { lx, ly, rx, ry }
    }

    /// Packs the frame for transmission.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; CONTROL_PACKET_SIZE] {
        [self.lx as u8, self.ly as u8, self.rx as u8, self.ry as u8]
    }

    /// Unpacks a received packet.
    ///
    /// Out-of-range bytes (e.g. `-128`) are passed through unclamped; the
    /// receiver reports what it got.
    #[must_use]
    pub fn from_bytes(bytes: [u8; CONTROL_PACKET_SIZE]) -> Self {
        Self {
            lx: bytes[0] as i8,
            ly: bytes[1] as i8,
            rx: bytes[2] as i8,
            ry: bytes[3] as i8,
        }
    }

    /// True when all sticks read zero.
    #[must_use]
    pub fn is_neutral(&self) -> bool {
        *self == Self::default()
    }
}

/// Acknowledgment payload carrying one telemetry value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AckPayload {
    /// Telemetry value, `0..=100`.
    pub aux: u8,
    /// Reserved, always 0 when sent.
    pub flags: u8,
}

impl AckPayload {
    /// Payload for `aux`, clamped to 100.
    #[must_use]
    pub fn telemetry(aux: u8) -> Self {
        Self {
            aux: aux.min(PERCENT_MAX as u8),
            flags: 0,
        }
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; ACK_PAYLOAD_SIZE] {
        [self.aux, self.flags]
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; ACK_PAYLOAD_SIZE]) -> Self {
        Self {
            aux: bytes[0],
            flags: bytes[1],
        }
    }
}

/// Parses a pipe address; it must be exactly five bytes.
///
/// # Examples
///
/// ```
/// use rc_link::link::parse_address;
///
/// assert_eq!(parse_address("RC001"), Some(*b"RC001"));
/// assert_eq!(parse_address("RC01"), None);
/// ```
#[must_use]
pub fn parse_address(address: &str) -> Option<[u8; ADDRESS_LEN]> {
    address.as_bytes().try_into().ok()
}

/// Radio parameters. Both nodes must be configured identically.
///
/// Data rate (250 kbps), 16-bit CRC, auto-ack with ack payloads and the
/// static payload size are fixed by the protocol and not configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioConfig {
    /// RF channel (0..=125).
    pub channel: u8,
    /// Shared address of the writing pipe and reading pipe 1.
    pub address: [u8; ADDRESS_LEN],
    /// Power amplifier level, 0 = lowest.
    pub pa_level: u8,
    /// Auto-retransmit delay in 250 us steps.
    pub retry_delay: u8,
    /// Auto-retransmit count.
    pub retry_count: u8,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL,
            address: DEFAULT_ADDRESS,
            pa_level: 0,
            retry_delay: 3,
            retry_count: 5,
        }
    }
}

impl RadioConfig {
    /// Address as text for logging.
    #[must_use]
    pub fn address_str(&self) -> String {
        String::from_utf8_lossy(&self.address).into_owned()
    }
}
