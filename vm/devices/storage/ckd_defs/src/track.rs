// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Track image layout.
//!
//! A track image starts with a 5-byte home address, followed by records
//! (an 8-byte count field, then key, then data) and ends with an 8-byte
//! end-of-track marker of all ones. Bytes after the marker are padding.

use crate::U16BE;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

pub const TRACK_HEADER_SIZE: usize = 5;
pub const RECORD_HEADER_SIZE: usize = 8;
pub const END_OF_TRACK: [u8; RECORD_HEADER_SIZE] = [0xFF; RECORD_HEADER_SIZE];

/// Data length of the standard record zero written to a null track.
pub const R0_DATA_LEN: usize = 8;

/// Image tracks are padded to this granularity.
pub const TRACK_ALIGNMENT: usize = 512;

/// Home address: `0CCHH`.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct TrackHeader {
    pub bin: u8,
    pub cyl: U16BE,
    pub head: U16BE,
}

impl TrackHeader {
    pub fn new(cyl: u16, head: u16) -> Self {
        Self {
            bin: 0,
            cyl: cyl.into(),
            head: head.into(),
        }
    }

    /// Whether this header belongs at `(cyl, head)`.
    pub fn matches(&self, cyl: u32, head: u32) -> bool {
        self.bin == 0 && u32::from(self.cyl.get()) == cyl && u32::from(self.head.get()) == head
    }
}

/// Record count field: `CCHHRKDD`.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct RecordHeader {
    pub cyl: U16BE,
    pub head: U16BE,
    pub record: u8,
    pub key_len: u8,
    pub data_len: U16BE,
}

/// High bit of the cylinder field marks a record continued on the next
/// track.
const TRACK_OVERFLOW: u16 = 0x8000;

impl RecordHeader {
    pub fn new(cyl: u16, head: u16, record: u8, key_len: u8, data_len: u16) -> Self {
        Self {
            cyl: cyl.into(),
            head: head.into(),
            record,
            key_len,
            data_len: data_len.into(),
        }
    }

    pub fn is_end_of_track(&self) -> bool {
        self.as_bytes() == END_OF_TRACK
    }

    /// Whether the record continues on the next track. Never set on the
    /// end-of-track marker.
    pub fn track_overflow(&self) -> bool {
        !self.is_end_of_track() && self.cyl.get() & TRACK_OVERFLOW != 0
    }

    /// The `CCHHR` identifier as compared by searches.
    pub fn id(&self) -> &[u8] {
        &self.as_bytes()[..5]
    }

    /// Key plus data length.
    pub fn key_data_len(&self) -> usize {
        usize::from(self.key_len) + usize::from(self.data_len.get())
    }

    /// Count field plus key plus data.
    pub fn record_len(&self) -> usize {
        RECORD_HEADER_SIZE + self.key_data_len()
    }
}

/// Returns the number of meaningful bytes in `track`, through the
/// end-of-track marker.
///
/// The scan walks count fields from the home address. If the chain of
/// records runs past `track_size - 8` without reaching the marker, the
/// result is truncated at `track_size - 8`.
pub fn track_len(track: &[u8], track_size: usize) -> usize {
    let track_size = track_size.min(track.len());
    let limit = track_size.saturating_sub(RECORD_HEADER_SIZE);
    let mut len = TRACK_HEADER_SIZE;
    loop {
        let Some(bytes) = track.get(len..len + RECORD_HEADER_SIZE) else {
            return limit;
        };
        if bytes == END_OF_TRACK {
            return (len + RECORD_HEADER_SIZE).min(track_size);
        }
        let Ok(header) = RecordHeader::read_from_bytes(bytes) else {
            return limit;
        };
        len += header.record_len();
        if len > limit {
            return limit;
        }
    }
}

/// Formats `track` as a null track: home address, an 8-byte record zero,
/// and the end-of-track marker. The rest of the buffer is zeroed.
///
/// Panics if `track` is shorter than the 29 bytes a null track occupies.
pub fn format_null_track(track: &mut [u8], cyl: u16, head: u16) {
    track.fill(0);
    let mut offset = 0;
    let mut put = |bytes: &[u8]| {
        track[offset..offset + bytes.len()].copy_from_slice(bytes);
        offset += bytes.len();
    };
    put(TrackHeader::new(cyl, head).as_bytes());
    put(RecordHeader::new(cyl, head, 0, 0, R0_DATA_LEN as u16).as_bytes());
    put(&[0; R0_DATA_LEN]);
    put(&END_OF_TRACK);
}

/// Size of one track in an image file for a device whose maximum R1 data
/// length is `r1_capacity`.
pub fn image_track_size(r1_capacity: u32) -> usize {
    let raw = TRACK_HEADER_SIZE
        + RECORD_HEADER_SIZE
        + R0_DATA_LEN
        + RECORD_HEADER_SIZE
        + r1_capacity as usize
        + END_OF_TRACK.len();
    raw.div_ceil(TRACK_ALIGNMENT) * TRACK_ALIGNMENT
}
