//! # Entry Codec
//!
//! The on-disk record format. Every entry is a fixed 16-byte header
//! followed by the payload:
//!
//! ```text
//! Offset  Size  Field      Description
//! ------  ----  ---------  -------------------------------------
//! 0       4     param_id   Series identifier
//! 4       8     time       Microseconds since epoch (signed)
//! 12      4     length     Total record size, header included
//! ```
//!
//! Two construction paths produce identical bytes:
//!
//! - **pre-encoded records**: the caller packs header + payload into one
//!   buffer with [`encode_entry`] and appends the whole range;
//! - **borrowed payloads**: the caller hands the page a `(param, time,
//!   &[u8])` triple and the page writes the header and payload
//!   separately ([`super::page::PageMut::add_payload`]).
//!
//! All multi-byte fields are little-endian; the zerocopy `U32`/`I64`
//! wrappers handle conversion and make the struct safe to overlay on
//! unaligned mmap bytes.

use eyre::{ensure, Result};
use zerocopy::little_endian::{I64, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::types::{ParamId, TimeStamp};

/// Size of the fixed entry prefix on disk.
pub const ENTRY_HEADER_SIZE: usize = 16;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct EntryHeader {
    param_id: U32,
    time: I64,
    length: U32,
}

const _: () = assert!(std::mem::size_of::<EntryHeader>() == ENTRY_HEADER_SIZE);

impl EntryHeader {
    pub fn new(param_id: ParamId, time: TimeStamp, length: u32) -> Self {
        Self {
            param_id: U32::new(param_id),
            time: I64::new(time.0),
            length: U32::new(length),
        }
    }

    pub fn ref_from_prefix(bytes: &[u8]) -> Result<&Self> {
        ensure!(
            bytes.len() >= ENTRY_HEADER_SIZE,
            "buffer too small for EntryHeader: {} < {}",
            bytes.len(),
            ENTRY_HEADER_SIZE
        );

        Self::ref_from_bytes(&bytes[..ENTRY_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to read EntryHeader: {:?}", e))
    }

    pub fn param_id(&self) -> ParamId {
        self.param_id.get()
    }

    pub fn time(&self) -> TimeStamp {
        TimeStamp(self.time.get())
    }

    /// Total record size including this header.
    pub fn length(&self) -> u32 {
        self.length.get()
    }

    pub fn payload_len(&self) -> usize {
        (self.length.get() as usize).saturating_sub(ENTRY_HEADER_SIZE)
    }
}

/// Record size for a payload of `payload_len` bytes.
pub fn record_size(payload_len: usize) -> usize {
    ENTRY_HEADER_SIZE + payload_len
}

/// Packs a shape-A record (header + payload) into `out`, replacing its
/// contents. Returns the record length.
pub fn encode_entry(param: ParamId, time: TimeStamp, payload: &[u8], out: &mut Vec<u8>) -> u32 {
    let length = record_size(payload.len()) as u32;
    let header = EntryHeader::new(param, time, length);

    out.clear();
    out.reserve(length as usize);
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(payload);
    length
}

/// Splits a record into its header view and payload slice. Fails when the
/// buffer cannot hold the header or the length field overruns it.
pub fn decode_entry(bytes: &[u8]) -> Result<(&EntryHeader, &[u8])> {
    let header = EntryHeader::ref_from_prefix(bytes)?;
    let length = header.length() as usize;

    ensure!(
        length >= ENTRY_HEADER_SIZE && length <= bytes.len(),
        "entry length {} inconsistent with buffer of {} bytes",
        length,
        bytes.len()
    );

    Ok((header, &bytes[ENTRY_HEADER_SIZE..length]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_16_bytes() {
        assert_eq!(std::mem::size_of::<EntryHeader>(), 16);
    }

    #[test]
    fn encode_then_decode_recovers_fields() {
        let mut buf = Vec::new();
        let len = encode_entry(7, TimeStamp(123_456), b"abcd", &mut buf);

        assert_eq!(len, 20);
        assert_eq!(buf.len(), 20);

        let (header, payload) = decode_entry(&buf).unwrap();
        assert_eq!(header.param_id(), 7);
        assert_eq!(header.time(), TimeStamp(123_456));
        assert_eq!(header.length(), 20);
        assert_eq!(payload, b"abcd");
    }

    #[test]
    fn encode_empty_payload_is_header_only() {
        let mut buf = Vec::new();
        let len = encode_entry(1, TimeStamp(0), b"", &mut buf);

        assert_eq!(len as usize, ENTRY_HEADER_SIZE);
        let (header, payload) = decode_entry(&buf).unwrap();
        assert_eq!(header.payload_len(), 0);
        assert!(payload.is_empty());
    }

    #[test]
    fn decode_rejects_truncated_record() {
        let mut buf = Vec::new();
        encode_entry(1, TimeStamp(5), b"payload", &mut buf);
        buf.truncate(ENTRY_HEADER_SIZE + 2);

        assert!(decode_entry(&buf).is_err());
    }

    #[test]
    fn decode_rejects_short_buffer() {
        assert!(decode_entry(&[0u8; 8]).is_err());
    }

    #[test]
    fn fields_are_little_endian_on_disk() {
        let mut buf = Vec::new();
        encode_entry(0x0102_0304, TimeStamp(0x05), b"", &mut buf);

        assert_eq!(&buf[0..4], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(buf[4], 0x05);
    }
}
