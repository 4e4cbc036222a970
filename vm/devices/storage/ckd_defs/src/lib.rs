// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Channel command, status, and on-disk record definitions for Count-Key-Data
//! direct access storage devices.
//!
//! Everything in this crate describes bytes as the channel or the track image
//! sees them. Multi-byte fields are big-endian.

#![forbid(unsafe_code)]

pub mod locate;
pub mod sense;
pub mod track;

use bitfield_struct::bitfield;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

type U16BE = zerocopy::byteorder::U16<zerocopy::byteorder::BigEndian>;

/// Defines a transparent `u8` newtype with named constants that still
/// accepts every other value.
macro_rules! open_u8 {
    (
        $(#[$attr:meta])*
        $vis:vis struct $name:ident {
            $($(#[$cattr:meta])* $konst:ident = $value:expr,)*
        }
    ) => {
        $(#[$attr])*
        #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        #[derive(
            zerocopy::IntoBytes,
            zerocopy::Immutable,
            zerocopy::KnownLayout,
            zerocopy::FromBytes,
        )]
        #[repr(transparent)]
        $vis struct $name(pub u8);

        impl $name {
            $($(#[$cattr])* pub const $konst: $name = $name($value);)*

            /// The symbolic name of this value, if it has one.
            pub fn name(&self) -> Option<&'static str> {
                match *self {
                    $(Self::$konst => Some(stringify!($konst)),)*
                    _ => None,
                }
            }
        }

        impl core::fmt::Debug for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                match self.name() {
                    Some(name) => f.pad(name),
                    None => write!(f, "{:#04x}", self.0),
                }
            }
        }
    };
}

pub(crate) use open_u8;

open_u8! {
    /// A channel command word operation code.
    pub struct CcwOp {
        WRITE_SPECIAL_CKD = 0x01,
        READ_IPL = 0x02,
        NOP = 0x03,
        SENSE = 0x04,
        WRITE_DATA = 0x05,
        READ_DATA = 0x06,
        SEEK = 0x07,
        SEEK_CYLINDER = 0x0B,
        WRITE_KEY_DATA = 0x0D,
        READ_KEY_DATA = 0x0E,
        ERASE = 0x11,
        READ_COUNT = 0x12,
        RECALIBRATE = 0x13,
        UNCONDITIONAL_RESERVE = 0x14,
        WRITE_R0 = 0x15,
        READ_R0 = 0x16,
        WRITE_HA = 0x19,
        READ_HA = 0x1A,
        SEEK_HEAD = 0x1B,
        WRITE_CKD = 0x1D,
        READ_CKD = 0x1E,
        SET_FILE_MASK = 0x1F,
        READ_SECTOR = 0x22,
        SET_SECTOR = 0x23,
        /// Perform Subsystem Function on controllers that support it,
        /// otherwise Seek and Set Sector.
        PERFORM_SUBSYSTEM_FUNCTION = 0x27,
        SEARCH_KEY_EQUAL = 0x29,
        SEARCH_ID_EQUAL = 0x31,
        SENSE_PATH_GROUP_ID = 0x34,
        SEARCH_HA_EQUAL = 0x39,
        READ_SUBSYSTEM_DATA = 0x3E,
        LOCATE_RECORD = 0x47,
        SEARCH_KEY_HIGH = 0x49,
        LOCATE_RECORD_EXTENDED = 0x4B,
        SEARCH_ID_HIGH = 0x51,
        READ_MULTIPLE_CKD = 0x5E,
        DEFINE_EXTENT = 0x63,
        READ_DEVICE_CHARACTERISTICS = 0x64,
        SEARCH_KEY_EQUAL_HIGH = 0x69,
        SEARCH_ID_EQUAL_HIGH = 0x71,
        WRITE_UPDATE_DATA = 0x85,
        READ_DATA_MT = 0x86,
        WRITE_UPDATE_KEY_DATA = 0x8D,
        READ_KEY_DATA_MT = 0x8E,
        READ_COUNT_MT = 0x92,
        DEVICE_RELEASE = 0x94,
        READ_R0_MT = 0x96,
        READ_HA_MT = 0x9A,
        WRITE_CKD_NEXT_TRACK = 0x9D,
        READ_CKD_MT = 0x9E,
        SEARCH_KEY_EQUAL_MT = 0xA9,
        SET_PATH_GROUP_ID = 0xAF,
        SEARCH_ID_EQUAL_MT = 0xB1,
        DEVICE_RESERVE = 0xB4,
        SEARCH_HA_EQUAL_MT = 0xB9,
        SEARCH_KEY_HIGH_MT = 0xC9,
        SEARCH_ID_HIGH_MT = 0xD1,
        READ_TRACK = 0xDE,
        SENSE_ID = 0xE4,
        SEARCH_KEY_EQUAL_HIGH_MT = 0xE9,
        SEARCH_ID_EQUAL_HIGH_MT = 0xF1,
        DIAGNOSTIC_CONTROL = 0xF3,
        READ_CONFIGURATION_DATA = 0xFA,
    }
}

impl CcwOp {
    /// The opcode with the multitrack bit cleared.
    pub fn base(self) -> u8 {
        self.0 & 0x7F
    }

    /// Whether the multitrack bit is set.
    pub fn multitrack(self) -> bool {
        self.0 & 0x80 != 0
    }

    /// Whether this is a read-type command by its low-order bits.
    pub fn is_read(self) -> bool {
        self.0 & 0x03 == 0x02
    }

    /// Search ID or Search Key in any of their comparison variants.
    pub fn is_search_id_or_key(self) -> bool {
        matches!(self.base(), 0x29 | 0x31 | 0x49 | 0x51 | 0x69 | 0x71)
    }

    /// Any search command, including Search Home Address.
    pub fn is_search(self) -> bool {
        self.is_search_id_or_key() || self.base() == 0x39
    }

    /// Whether the command may position onto record zero when scanning
    /// count fields. Everything else skips over R0.
    pub fn reads_record_zero(self) -> bool {
        self == Self::READ_TRACK
            || matches!(self.base(), 0x16 | 0x31 | 0x51 | 0x71)
            || self == Self::LOCATE_RECORD
            || self == Self::WRITE_CKD_NEXT_TRACK
    }

    /// Sense, control and write commands clear the index-marker flag at
    /// the start of the command. Searches never do.
    pub fn resets_index_marker(self) -> bool {
        if self.is_search() {
            return false;
        }
        match self.0 & 0x03 {
            // Write or control.
            0x01 | 0x03 => true,
            // Sense.
            0x00 => self.0 & 0x0F == 0x04,
            _ => false,
        }
    }
}

/// CCW flag byte.
#[bitfield(u8)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes, PartialEq, Eq)]
pub struct CcwFlags {
    /// Modified indirect data addressing.
    pub mida: bool,
    /// Suspend.
    pub suspend: bool,
    /// Indirect data addressing.
    pub ida: bool,
    /// Program-controlled interruption.
    pub pci: bool,
    /// Skip data transfer.
    pub skip: bool,
    /// Suppress incorrect length.
    pub sli: bool,
    /// Command chaining.
    pub cc: bool,
    /// Data chaining.
    pub cd: bool,
}

/// Unit status byte presented at the end of a CCW.
#[bitfield(u8)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes, PartialEq, Eq)]
pub struct UnitStatus {
    pub unit_exception: bool,
    pub unit_check: bool,
    pub device_end: bool,
    pub channel_end: bool,
    pub busy: bool,
    pub control_unit_end: bool,
    pub status_modifier: bool,
    pub attention: bool,
}

impl UnitStatus {
    /// Channel end and device end, the normal completion.
    pub const fn normal() -> Self {
        Self::new().with_channel_end(true).with_device_end(true)
    }
}

/// File mask established by Define Extent or Set File Mask.
#[bitfield(u8)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes, PartialEq, Eq)]
pub struct FileMask {
    /// PCI fetch mode.
    pub pci_fetch: bool,
    /// Values in the `access_authority` module.
    #[bits(2)]
    pub access_authority: u8,
    /// Values in the `seek_control` module.
    #[bits(2)]
    pub seek_control: u8,
    /// Must be zero.
    pub reserved: bool,
    /// Values in the `write_control` module.
    #[bits(2)]
    pub write_control: u8,
}

pub mod write_control {
    pub const INHIBIT_HA_R0: u8 = 0;
    pub const INHIBIT_ALL: u8 = 1;
    pub const ALLOW_UPDATE: u8 = 2;
    pub const ALLOW_ALL: u8 = 3;
}

pub mod seek_control {
    pub const ALLOW_ALL: u8 = 0;
    pub const CYLINDER_AND_HEAD: u8 = 1;
    pub const HEAD_ONLY: u8 = 2;
    pub const INHIBIT_ALL: u8 = 3;
}

pub mod access_authority {
    pub const NORMAL: u8 = 0;
    pub const DEVICE_SUPPORT: u8 = 1;
    pub const DIAGNOSTIC: u8 = 2;
    pub const RESERVED: u8 = 3;
}

/// Define Extent global attributes byte.
#[bitfield(u8)]
#[derive(IntoBytes, Immutable, KnownLayout, FromBytes, PartialEq, Eq)]
pub struct GlobalAttributes {
    #[bits(3)]
    pub cache_control: u8,
    #[bits(2)]
    pub subsystem_mode: u8,
    /// CKD conversion mode. When clear, record data lengths inside a Locate
    /// Record domain must match the transfer length factor.
    pub ckd_conversion: bool,
    #[bits(2)]
    pub architecture: u8,
}

/// Define Extent parameter block.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct DefineExtentParams {
    pub mask: FileMask,
    pub global_attributes: GlobalAttributes,
    pub block_size: U16BE,
    pub reserved: [u8; 4],
    pub begin_cyl: U16BE,
    pub begin_head: U16BE,
    pub end_cyl: U16BE,
    pub end_head: U16BE,
}

const _: () = assert!(size_of::<DefineExtentParams>() == 16);

/// Seek argument: `BBCCHH`.
#[repr(C)]
#[derive(Debug, Copy, Clone, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct SeekArgument {
    pub bin: U16BE,
    pub cyl: U16BE,
    pub head: U16BE,
}
