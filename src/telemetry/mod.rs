//! # Telemetry Module
//!
//! Link telemetry logging to JSONL files with rotation.
//!
//! This module handles:
//! - Snapshotting controller link state as a [`LinkRecord`]
//! - Formatting records as JSONL (JSON Lines)
//! - Rotating files after N records and keeping only the last M files

pub mod logger;

use serde::{Deserialize, Serialize};

use crate::link::{ControlFrame, LinkStats};

pub use logger::TelemetryLogger;

/// One logged snapshot of the controller link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    /// Wall-clock time (RFC 3339, UTC)
    pub timestamp: String,
    /// Controller uptime in milliseconds
    pub uptime_ms: u32,
    /// Sticks as sent: lx, ly, rx, ry in percent
    pub sticks: [i8; 4],
    /// Last telemetry value received, before filtering
    pub aux_raw: Option<u8>,
    /// Median filter output
    pub aux_target: u8,
    /// Smoothed telemetry
    pub aux_smoothed: u8,
    pub link_lost: bool,
    pub tx_attempts: u32,
    pub acks: u32,
    pub last_ack_age_ms: Option<u32>,
}

impl LinkRecord {
    /// Builds a record stamped with the current UTC time.
    #[must_use]
    pub fn capture(
        uptime_ms: u32,
        frame: &ControlFrame,
        aux_raw: Option<u8>,
        aux_target: u8,
        aux_smoothed: u8,
        link_lost: bool,
        stats: &LinkStats,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            uptime_ms,
            sticks: [frame.lx, frame.ly, frame.rx, frame.ry],
            aux_raw,
            aux_target,
            aux_smoothed,
            link_lost,
            tx_attempts: stats.tx_attempts,
            acks: stats.acks,
            last_ack_age_ms: stats.last_ack_age(uptime_ms),
        }
    }
}
