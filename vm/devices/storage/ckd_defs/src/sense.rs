// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Sense byte definitions.

/// Bytes kept for sense data. Controllers transfer either 24 or all 32.
pub const SENSE_SIZE: usize = 32;

// Sense byte 0
pub const SENSE0_COMMAND_REJECT: u8 = 0x80;
pub const SENSE0_INTERVENTION_REQUIRED: u8 = 0x40;
pub const SENSE0_BUS_OUT_CHECK: u8 = 0x20;
pub const SENSE0_EQUIPMENT_CHECK: u8 = 0x10;
pub const SENSE0_DATA_CHECK: u8 = 0x08;
pub const SENSE0_OVERRUN: u8 = 0x04;
pub const SENSE0_TRACK_CONDITION: u8 = 0x02;
pub const SENSE0_OPERATION_INCOMPLETE: u8 = 0x01;

// Sense byte 1
pub const SENSE1_PERMANENT_ERROR: u8 = 0x80;
pub const SENSE1_INVALID_TRACK_FORMAT: u8 = 0x40;
pub const SENSE1_END_OF_CYLINDER: u8 = 0x20;
pub const SENSE1_MESSAGE_TO_OPERATOR: u8 = 0x10;
pub const SENSE1_NO_RECORD_FOUND: u8 = 0x08;
pub const SENSE1_FILE_PROTECTED: u8 = 0x04;
pub const SENSE1_WRITE_INHIBITED: u8 = 0x02;
pub const SENSE1_IMPRECISE_ENDING: u8 = 0x01;

/// Byte 7 format codes (high nibble).
pub mod format {
    pub const PROGRAM_OR_SYSTEM_CHECK: u8 = 0;
    pub const EQUIPMENT_CHECK: u8 = 1;
    pub const CONTROL_UNIT_CHECK: u8 = 2;
    pub const RECOVERY_ACTION: u8 = 3;
    /// Data check without displacement information. Bytes 8-12 carry the
    /// failing record's `CCHHR`.
    pub const DATA_CHECK: u8 = 4;
    pub const DATA_CHECK_WITH_DISPLACEMENT: u8 = 5;
}

/// Byte 7 format 0 message codes (low nibble).
pub mod message {
    pub const NO_MESSAGE: u8 = 0;
    pub const INVALID_COMMAND: u8 = 1;
    pub const INVALID_SEQUENCE: u8 = 2;
    pub const COUNT_TOO_SMALL: u8 = 3;
    pub const INVALID_PARAMETER: u8 = 4;
    pub const DIAGNOSTIC_NOT_PERMITTED: u8 = 5;
}

/// Byte 27 bit 0: the first 24 bytes are 24-byte compatible sense.
pub const SENSE27_COMPATIBLE: u8 = 0x80;
