// Copyright (c) 2024-present, cask-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;
use varint_rs::{VarintReader, VarintWriter};

/// Length of the fixed header prefix (checksum + type tag).
const FIXED_PREFIX_LEN: usize = 5;

/// Maximum encoded length of a u32 varint.
const MAX_VARINT_U32_LEN: usize = 5;

/// Maximum encoded header length: checksum, type tag and two size varints.
pub const MAX_HEADER_LEN: usize = FIXED_PREFIX_LEN + 2 * MAX_VARINT_U32_LEN;

/// Sequence number carried by records written outside of a batch.
pub const NON_TXN_SEQ: u64 = 0;

/// Key of the record that commits a batch.
pub const TXN_FIN_KEY: &[u8] = b"txn_fin";

/// Kind of a log record
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum RecordType {
    /// A live key-value pair
    Normal = 0,

    /// A tombstone
    Deleted = 1,

    /// Batch commit marker
    TxnFin = 2,
}

impl From<RecordType> for u8 {
    fn from(value: RecordType) -> Self {
        value as Self
    }
}

impl TryFrom<u8> for RecordType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Normal),
            1 => Ok(Self::Deleted),
            2 => Ok(Self::TxnFin),
            _ => Err(()),
        }
    }
}

/// One logical entry in the log
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LogRecord {
    /// Key as stored on disk (sequence-number prefix included)
    pub key: Vec<u8>,

    /// Value payload, possibly empty
    pub value: Vec<u8>,

    /// Record kind
    pub record_type: RecordType,
}

/// Decoded record header
#[derive(Debug)]
pub struct RecordHeader {
    pub(crate) crc: u32,
    pub(crate) record_type: RecordType,
    pub(crate) key_len: u32,
    pub(crate) val_len: u32,
}

impl LogRecord {
    /// Encodes the record into a single contiguous buffer:
    ///
    /// \<crc: u32 LE\> \<type: u8\> \<varint key len\> \<varint val len\> \<key\> \<value\>
    ///
    /// The checksum covers everything after the checksum field itself.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    #[allow(clippy::cast_possible_wrap)]
    pub fn encode(&self) -> crate::Result<Vec<u8>> {
        let mut body = Vec::with_capacity(MAX_HEADER_LEN - 4 + self.key.len() + self.value.len());

        body.write_u8(u8::from(self.record_type))?;
        body.write_i64_varint(self.key.len() as i64)?;
        body.write_i64_varint(self.value.len() as i64)?;
        body.extend_from_slice(&self.key);
        body.extend_from_slice(&self.value);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&body);
        let crc = hasher.finalize();

        let mut buf = Vec::with_capacity(4 + body.len());
        buf.write_u32::<LittleEndian>(crc)?;
        buf.extend_from_slice(&body);

        Ok(buf)
    }
}

/// Parses a record header from the start of `buf`.
///
/// Returns the header and the number of bytes it occupies, or `None` when
/// fewer than five bytes remain (end of file).
///
/// # Errors
///
/// Will return `Err` if the header is malformed or an IO error occurs.
pub fn decode_header(buf: &[u8]) -> crate::Result<Option<(RecordHeader, usize)>> {
    if buf.len() < FIXED_PREFIX_LEN {
        return Ok(None);
    }

    let mut cursor = Cursor::new(buf);

    let crc = cursor.read_u32::<LittleEndian>()?;
    let tag = cursor.read_u8()?;

    // An unknown tag never came out of the encoder, so the read fails the
    // same way any other corrupted record does.
    let Ok(record_type) = RecordType::try_from(tag) else {
        return Err(crate::Error::InvalidCrc);
    };

    let key_len =
        u32::try_from(cursor.read_i64_varint()?).map_err(|_| crate::Error::InvalidCrc)?;
    let val_len =
        u32::try_from(cursor.read_i64_varint()?).map_err(|_| crate::Error::InvalidCrc)?;

    // NOTE: Truncation is fine, the header never exceeds 15 bytes
    #[allow(clippy::cast_possible_truncation)]
    let header_len = cursor.position() as usize;

    Ok(Some((
        RecordHeader {
            crc,
            record_type,
            key_len,
            val_len,
        },
        header_len,
    )))
}

/// Computes the record checksum over the header tail (everything after the
/// checksum field) followed by key and value.
#[must_use]
pub fn checksum(header_tail: &[u8], key: &[u8], value: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(header_tail);
    hasher.update(key);
    hasher.update(value);
    hasher.finalize()
}

/// Prefixes `key` with the unsigned varint encoding of `seq`.
///
/// Every record's on-disk key carries this prefix; records written outside
/// of a batch use [`NON_TXN_SEQ`].
pub fn key_with_seq(key: &[u8], seq: u64) -> Vec<u8> {
    let mut enc = Vec::with_capacity(10 + key.len());

    // NOTE: Writing into a Vec cannot fail
    #[allow(clippy::expect_used)]
    enc.write_u64_varint(seq)
        .expect("vec write should not fail");

    enc.extend_from_slice(key);
    enc
}

/// Splits an on-disk key into the user key and its sequence number.
///
/// # Errors
///
/// Will return `Err` if the varint prefix is malformed.
pub fn parse_record_key(enc: &[u8]) -> crate::Result<(Vec<u8>, u64)> {
    let mut cursor = Cursor::new(enc);
    let seq = cursor.read_u64_varint()?;

    // NOTE: Truncation is fine, the prefix is at most 10 bytes
    #[allow(clippy::cast_possible_truncation)]
    let consumed = cursor.position() as usize;

    Ok((enc.get(consumed..).unwrap_or_default().to_vec(), seq))
}

/// Position of the authoritative record for a key
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RecordPosition {
    /// Segment file ID
    pub fid: u32,

    /// Offset of the record in the segment
    pub offset: u64,
}

impl RecordPosition {
    /// Serializes the position into a varint buffer.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn encode(&self) -> crate::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(15);
        buf.write_u32_varint(self.fid)?;
        buf.write_u64_varint(self.offset)?;
        Ok(buf)
    }

    /// Deserializes a position from a varint buffer.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the buffer is malformed.
    pub fn decode(bytes: &[u8]) -> crate::Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let fid = cursor.read_u32_varint()?;
        let offset = cursor.read_u64_varint()?;
        Ok(Self { fid, offset })
    }
}
