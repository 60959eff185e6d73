//! # Persisted Parameter Store
//!
//! Typed, checksum-guarded records in a flat non-volatile address space.
//!
//! Every record is laid out as:
//!
//! ```text
//! [magic: u16][fields...][checksum: u16]      (little-endian, no padding)
//! ```
//!
//! A record is only accepted when both the magic value and the checksum
//! match. Anything else (erased memory, a record from an older layout, a
//! torn write) reads back as `None` and the owning component falls back to
//! its compiled-in defaults.
//!
//! ## Memory Layout
//!
//! Records are stored back to back; each offset is derived from the size of
//! the record before it:
//!
//! ```text
//! [Left joystick calibration]   0   (16 bytes)
//! [Right joystick calibration]  16  (16 bytes)
//! [Per-axis deadzone]           32  (12 bytes)
//! [Per-axis expo]               44  (20 bytes)
//! [Key thresholds]              64  (14 bytes)
//! ```

pub mod records;

use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut, BytesMut};
use tracing::{debug, warn};

use crate::error::{RcLinkError, Result};

pub use records::{CalibrationRecord, DeadzoneRecord, ExpoRecord, KeyThresholdRecord};

/// Default store capacity (matches a 4 KiB EEPROM).
pub const DEFAULT_CAPACITY: usize = 4096;

/// Value of erased storage cells.
pub const ERASED_BYTE: u8 = 0xFF;

/// Byte-addressable non-volatile storage.
pub trait ParameterStore {
    /// Total addressable bytes.
    fn capacity(&self) -> usize;

    /// Reads `buf.len()` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `RcLinkError::Store` if the range is out of bounds, or an I/O
    /// error from the backend.
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<()>;

    /// Writes `data` starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `RcLinkError::Store` if the range is out of bounds, or an I/O
    /// error from the backend.
    fn write(&mut self, offset: usize, data: &[u8]) -> Result<()>;
}

fn check_range(capacity: usize, offset: usize, len: usize) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= capacity => Ok(()),
        _ => Err(RcLinkError::Store(format!(
            "range {}..{} exceeds capacity {}",
            offset,
            offset.saturating_add(len),
            capacity
        ))),
    }
}

/// A fixed-layout record guarded by a magic value and a checksum.
pub trait Record: Sized {
    /// Magic value stored in the first two bytes.
    const MAGIC: u16;

    /// Encoded size in bytes, including magic and checksum.
    const SIZE: usize;

    /// Appends the record fields (without magic and checksum).
    fn put_fields(&self, buf: &mut BytesMut);

    /// Reads the record fields (without magic and checksum).
    fn get_fields(buf: &mut &[u8]) -> Self;

    /// XOR-fold checksum over magic and fields.
    fn checksum(&self) -> u16;

    /// Encodes the full record.
    fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_u16_le(Self::MAGIC);
        self.put_fields(&mut buf);
        buf.put_u16_le(self.checksum());
        buf
    }

    /// Decodes a full record, returning `None` on bad magic, bad checksum or
    /// short input.
    fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        let mut buf = &bytes[..Self::SIZE];
        let magic = buf.get_u16_le();
        if magic != Self::MAGIC {
            return None;
        }
        let record = Self::get_fields(&mut buf);
        let stored = buf.get_u16_le();
        (stored == record.checksum()).then_some(record)
    }
}

/// A record of type `T` at a fixed offset.
#[derive(Debug)]
pub struct RecordSlot<T> {
    offset: usize,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for RecordSlot<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for RecordSlot<T> {}

impl<T: Record> RecordSlot<T> {
    #[must_use]
    pub const fn at(offset: usize) -> Self {
        Self {
            offset,
            _record: PhantomData,
        }
    }

    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// First byte after this record; the offset of the next one.
    #[must_use]
    pub const fn end(&self) -> usize {
        self.offset + T::SIZE
    }

    /// Loads and validates the record.
    ///
    /// Backend errors are logged and reported as an absent record.
    pub fn load<S: ParameterStore + ?Sized>(&self, store: &mut S) -> Option<T> {
        let mut raw = vec![0u8; T::SIZE];
        if let Err(e) = store.read(self.offset, &mut raw) {
            warn!("Failed to read record at {}: {}", self.offset, e);
            return None;
        }
        let record = T::decode(&raw);
        if record.is_none() {
            debug!("No valid record at offset {}", self.offset);
        }
        record
    }

    /// Encodes and writes the record.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn save<S: ParameterStore + ?Sized>(&self, store: &mut S, record: &T) -> Result<()> {
        store.write(self.offset, &record.encode())
    }
}

/// Fixed record positions.
pub mod layout {
    use super::RecordSlot;
    use super::records::{CalibrationRecord, DeadzoneRecord, ExpoRecord, KeyThresholdRecord};

    pub const LEFT_CALIBRATION: RecordSlot<CalibrationRecord> = RecordSlot::at(0);
    pub const RIGHT_CALIBRATION: RecordSlot<CalibrationRecord> =
        RecordSlot::at(LEFT_CALIBRATION.end());
    pub const DEADZONE: RecordSlot<DeadzoneRecord> = RecordSlot::at(RIGHT_CALIBRATION.end());
    pub const EXPO: RecordSlot<ExpoRecord> = RecordSlot::at(DEADZONE.end());
    pub const KEY_THRESHOLDS: RecordSlot<KeyThresholdRecord> = RecordSlot::at(EXPO.end());

    /// Bytes used by all records.
    pub const USED_BYTES: usize = KEY_THRESHOLDS.end();
}

/// In-memory store, initialised to the erased state.
///
/// # Examples
///
/// ```
/// use rc_link::store::{layout, MemoryStore, DeadzoneRecord};
///
/// let mut store = MemoryStore::new();
/// assert!(layout::DEADZONE.load(&mut store).is_none());
///
/// let record = DeadzoneRecord { left_x: 40, left_y: 40, right_x: 30, right_y: 30 };
/// layout::DEADZONE.save(&mut store, &record).unwrap();
/// assert_eq!(layout::DEADZONE.load(&mut store), Some(record));
/// ```
#[derive(Debug, Clone)]
pub struct MemoryStore {
    cells: Vec<u8>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cells: vec![ERASED_BYTE; capacity],
        }
    }

    /// Raw contents (for test verification).
    #[must_use]
    pub fn contents(&self, offset: usize, len: usize) -> &[u8] {
        &self.cells[offset..offset + len]
    }

    /// Overwrites a range with a corrupt pattern.
    pub fn inject_corruption(&mut self, offset: usize, len: usize) {
        for cell in &mut self.cells[offset..offset + len] {
            *cell = 0xAA;
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterStore for MemoryStore {
    fn capacity(&self) -> usize {
        self.cells.len()
    }

    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<()> {
        check_range(self.cells.len(), offset, buf.len())?;
        buf.copy_from_slice(&self.cells[offset..offset + buf.len()]);
        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        check_range(self.cells.len(), offset, data.len())?;
        self.cells[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }
}

/// File-backed store holding an image of the whole address space.
///
/// A missing file reads as erased storage; every write rewrites the image.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    image: Vec<u8>,
}

impl FileStore {
    /// Opens (or lazily creates) an image file of `capacity` bytes.
    ///
    /// A shorter existing file is padded with erased cells; a longer one is
    /// truncated in memory.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if an existing file cannot be read.
    pub fn open<P: AsRef<Path>>(path: P, capacity: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut image = if path.exists() {
            fs::read(&path)?
        } else {
            debug!("Parameter image {} not found, starting erased", path.display());
            Vec::new()
        };
        image.resize(capacity, ERASED_BYTE);
        Ok(Self { path, image })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ParameterStore for FileStore {
    fn capacity(&self) -> usize {
        self.image.len()
    }

    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<()> {
        check_range(self.image.len(), offset, buf.len())?;
        buf.copy_from_slice(&self.image[offset..offset + buf.len()]);
        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        check_range(self.image.len(), offset, data.len())?;
        self.image[offset..offset + data.len()].copy_from_slice(data);
        fs::write(&self.path, &self.image)?;
        Ok(())
    }
}
