// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Locate Record and Locate Record Extended parameter blocks.

use crate::open_u8;
use crate::U16BE;
use bitfield_struct::bitfield;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

/// Byte 0 of the parameter block.
#[bitfield(u8)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes, PartialEq, Eq)]
pub struct LocateOperation {
    #[bits(6)]
    pub code: u8,
    /// Values in the `orientation` module.
    #[bits(2)]
    pub orientation: u8,
}

impl LocateOperation {
    pub fn operation(&self) -> LocateOperationCode {
        LocateOperationCode(self.code())
    }
}

pub mod orientation {
    pub const COUNT: u8 = 0;
    pub const HOME: u8 = 1;
    pub const DATA: u8 = 2;
    pub const INDEX: u8 = 3;
}

open_u8! {
    /// Operation code in the low six bits of byte 0.
    pub struct LocateOperationCode {
        ORIENT = 0x00,
        WRITE_DATA = 0x01,
        FORMAT_WRITE = 0x03,
        READ_DATA = 0x06,
        WRITE_TRACK = 0x0B,
        READ_TRACKS = 0x0C,
        READ = 0x16,
        /// Locate Record Extended only; byte 16 holds the real operation.
        EXTENDED = 0x3F,
    }
}

impl LocateOperationCode {
    pub fn is_write(self) -> bool {
        matches!(self, Self::WRITE_DATA | Self::FORMAT_WRITE | Self::WRITE_TRACK)
    }
}

open_u8! {
    /// Extended operation code in byte 16 of Locate Record Extended.
    pub struct ExtendedOperation {
        WRITE_ANY = 0x09,
        READ_ANY = 0x0A,
        READ_TRACKSET = 0x0E,
    }
}

impl ExtendedOperation {
    /// Accepted extended parameter lengths.
    pub fn parameter_lengths(self) -> &'static [u8] {
        match self {
            Self::WRITE_ANY | Self::READ_ANY => &[1],
            Self::READ_TRACKSET => &[1, 2],
            _ => &[],
        }
    }
}

/// Byte 1 of the parameter block.
#[bitfield(u8)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes, PartialEq, Eq)]
pub struct LocateAuxiliary {
    /// A Read Count command is chained at the end of the domain.
    pub read_count_suffix: bool,
    #[bits(6)]
    pub reserved: u8,
    /// Bytes 14-15 hold a transfer length factor.
    pub transfer_length_valid: bool,
}

/// Search argument: `CCHHR`.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct SearchArgument {
    pub cyl: U16BE,
    pub head: U16BE,
    pub record: u8,
}

/// Locate Record parameters.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct LocateRecordParams {
    pub operation: LocateOperation,
    pub auxiliary: LocateAuxiliary,
    /// Must be zero.
    pub reserved: u8,
    /// Number of records or tracks in the domain.
    pub count: u8,
    pub seek_cyl: U16BE,
    pub seek_head: U16BE,
    pub search: SearchArgument,
    pub sector: u8,
    pub transfer_length_factor: U16BE,
}

const _: () = assert!(size_of::<LocateRecordParams>() == 16);

/// Locate Record Extended parameters, followed by
/// `extended_parameter_length` bytes of extended parameters.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct LocateRecordExtendedParams {
    pub base: LocateRecordParams,
    pub extended_operation: ExtendedOperation,
    pub extended_parameter_length: u8,
    pub reserved: [u8; 2],
}

const _: () = assert!(size_of::<LocateRecordExtendedParams>() == 20);

/// Sector value meaning "no sector positioning".
pub const SECTOR_NONE: u8 = 0xFF;
