//! Persisted record formats.
//!
//! All multi-byte fields are little-endian and packed without padding.

use bytes::{Buf, BufMut, BytesMut};

use super::Record;

/// Joystick calibration for one stick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationRecord {
    pub min_x: u16,
    pub max_x: u16,
    pub center_x: u16,
    pub min_y: u16,
    pub max_y: u16,
    pub center_y: u16,
}

impl Record for CalibrationRecord {
    const MAGIC: u16 = 0xCA11;
    const SIZE: usize = 16;

    fn put_fields(&self, buf: &mut BytesMut) {
        buf.put_u16_le(self.min_x);
        buf.put_u16_le(self.max_x);
        buf.put_u16_le(self.center_x);
        buf.put_u16_le(self.min_y);
        buf.put_u16_le(self.max_y);
        buf.put_u16_le(self.center_y);
    }

    fn get_fields(buf: &mut &[u8]) -> Self {
        Self {
            min_x: buf.get_u16_le(),
            max_x: buf.get_u16_le(),
            center_x: buf.get_u16_le(),
            min_y: buf.get_u16_le(),
            max_y: buf.get_u16_le(),
            center_y: buf.get_u16_le(),
        }
    }

    fn checksum(&self) -> u16 {
        Self::MAGIC
            ^ self.min_x
            ^ self.max_x
            ^ self.center_x
            ^ self.min_y
            ^ self.max_y
            ^ self.center_y
            ^ 0xA55A
    }
}

/// Deadzone per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadzoneRecord {
    pub left_x: u16,
    pub left_y: u16,
    pub right_x: u16,
    pub right_y: u16,
}

impl Record for DeadzoneRecord {
    const MAGIC: u16 = 0xD00D;
    const SIZE: usize = 12;

    fn put_fields(&self, buf: &mut BytesMut) {
        buf.put_u16_le(self.left_x);
        buf.put_u16_le(self.left_y);
        buf.put_u16_le(self.right_x);
        buf.put_u16_le(self.right_y);
    }

    fn get_fields(buf: &mut &[u8]) -> Self {
        Self {
            left_x: buf.get_u16_le(),
            left_y: buf.get_u16_le(),
            right_x: buf.get_u16_le(),
            right_y: buf.get_u16_le(),
        }
    }

    fn checksum(&self) -> u16 {
        Self::MAGIC ^ self.left_x ^ self.left_y ^ self.right_x ^ self.right_y ^ 0x5AA5
    }
}

/// Expo exponent per axis.
///
/// The checksum folds the IEEE-754 bit patterns, so two records compare
/// equal on disk only if every float is bit-identical.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpoRecord {
    pub left_x: f32,
    pub left_y: f32,
    pub right_x: f32,
    pub right_y: f32,
}

impl Record for ExpoRecord {
    const MAGIC: u16 = 0xE202;
    const SIZE: usize = 20;

    fn put_fields(&self, buf: &mut BytesMut) {
        buf.put_f32_le(self.left_x);
        buf.put_f32_le(self.left_y);
        buf.put_f32_le(self.right_x);
        buf.put_f32_le(self.right_y);
    }

    fn get_fields(buf: &mut &[u8]) -> Self {
        Self {
            left_x: buf.get_f32_le(),
            left_y: buf.get_f32_le(),
            right_x: buf.get_f32_le(),
            right_y: buf.get_f32_le(),
        }
    }

    fn checksum(&self) -> u16 {
        let mix = self.left_x.to_bits()
            ^ self.left_y.to_bits()
            ^ self.right_x.to_bits()
            ^ self.right_y.to_bits()
            ^ 0xBEEF;
        Self::MAGIC ^ (((mix >> 16) ^ (mix & 0xFFFF)) as u16)
    }
}

/// Keypad ladder thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyThresholdRecord {
    pub down: u16,
    pub up: u16,
    pub right: u16,
    pub center: u16,
    pub left: u16,
}

impl Record for KeyThresholdRecord {
    const MAGIC: u16 = 0x4B59;
    const SIZE: usize = 14;

    fn put_fields(&self, buf: &mut BytesMut) {
        buf.put_u16_le(self.down);
        buf.put_u16_le(self.up);
        buf.put_u16_le(self.right);
        buf.put_u16_le(self.center);
        buf.put_u16_le(self.left);
    }

    fn get_fields(buf: &mut &[u8]) -> Self {
        Self {
            down: buf.get_u16_le(),
            up: buf.get_u16_le(),
            right: buf.get_u16_le(),
            center: buf.get_u16_le(),
            left: buf.get_u16_le(),
        }
    }

    fn checksum(&self) -> u16 {
        Self::MAGIC ^ self.down ^ self.up ^ self.right ^ self.center ^ self.left ^ 0xA55A
    }
}
