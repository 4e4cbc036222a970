// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Guest-visible failure conditions.

use ckd_cache::RetryAsync;
use ckd_defs::sense::*;
use std::fmt;
use thiserror::Error;

/// The sense conditions for a unit check, before they are laid out into
/// sense bytes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SenseCode {
    pub sense0: u8,
    pub sense1: u8,
    pub sense2: u8,
    pub format: u8,
    pub message: u8,
}

impl SenseCode {
    const fn new(sense0: u8, sense1: u8, format: u8, message: u8) -> Self {
        Self {
            sense0,
            sense1,
            sense2: 0,
            format,
            message,
        }
    }

    /// Command reject, format 0, with a message from
    /// [`ckd_defs::sense::message`].
    pub const fn command_reject(message: u8) -> Self {
        Self::new(SENSE0_COMMAND_REJECT, 0, format::PROGRAM_OR_SYSTEM_CHECK, message)
    }

    pub const fn invalid_command() -> Self {
        Self::command_reject(message::INVALID_COMMAND)
    }

    pub const fn invalid_sequence() -> Self {
        Self::command_reject(message::INVALID_SEQUENCE)
    }

    pub const fn count_too_small() -> Self {
        Self::command_reject(message::COUNT_TOO_SMALL)
    }

    pub const fn invalid_parameter() -> Self {
        Self::command_reject(message::INVALID_PARAMETER)
    }

    pub const fn file_protected() -> Self {
        Self::new(0, SENSE1_FILE_PROTECTED, format::PROGRAM_OR_SYSTEM_CHECK, 0)
    }

    /// A multitrack operation outside a domain tried to leave the cylinder.
    pub const fn end_of_cylinder() -> Self {
        Self::new(
            0,
            SENSE1_FILE_PROTECTED | SENSE1_END_OF_CYLINDER,
            format::PROGRAM_OR_SYSTEM_CHECK,
            0,
        )
    }

    pub const fn equipment_check() -> Self {
        Self::new(SENSE0_EQUIPMENT_CHECK, 0, format::EQUIPMENT_CHECK, 0)
    }

    pub const fn write_inhibited() -> Self {
        Self::new(
            SENSE0_EQUIPMENT_CHECK,
            SENSE1_WRITE_INHIBITED,
            format::EQUIPMENT_CHECK,
            0,
        )
    }

    pub const fn invalid_track_format() -> Self {
        Self::new(0, SENSE1_INVALID_TRACK_FORMAT, format::PROGRAM_OR_SYSTEM_CHECK, 0)
    }

    pub const fn no_record_found() -> Self {
        Self::new(0, SENSE1_NO_RECORD_FOUND, format::PROGRAM_OR_SYSTEM_CHECK, 0)
    }

    pub const fn overrun() -> Self {
        Self::new(SENSE0_OVERRUN, 0, format::PROGRAM_OR_SYSTEM_CHECK, 0)
    }

    /// Chaining stopped while a Locate Record domain still expected
    /// commands.
    pub const fn incomplete_domain() -> Self {
        Self::new(
            SENSE0_COMMAND_REJECT | SENSE0_OPERATION_INCOMPLETE,
            0,
            format::PROGRAM_OR_SYSTEM_CHECK,
            0,
        )
    }

    /// Adds the imprecise-ending bit, which makes sense byte 3 carry the
    /// remaining domain count.
    pub const fn imprecise(mut self) -> Self {
        self.sense1 |= SENSE1_IMPRECISE_ENDING;
        self
    }

    fn kind(&self) -> &'static str {
        if self.sense0 & SENSE0_OPERATION_INCOMPLETE != 0 {
            "incomplete domain"
        } else if self.sense0 & SENSE0_COMMAND_REJECT != 0 {
            "command reject"
        } else if self.sense1 & SENSE1_WRITE_INHIBITED != 0 {
            "write inhibited"
        } else if self.sense0 & SENSE0_EQUIPMENT_CHECK != 0 {
            "equipment check"
        } else if self.sense0 & SENSE0_OVERRUN != 0 {
            "overrun"
        } else if self.sense1 & SENSE1_END_OF_CYLINDER != 0 {
            "end of cylinder"
        } else if self.sense1 & SENSE1_FILE_PROTECTED != 0 {
            "file protected"
        } else if self.sense1 & SENSE1_NO_RECORD_FOUND != 0 {
            "no record found"
        } else if self.sense1 & SENSE1_INVALID_TRACK_FORMAT != 0 {
            "invalid track format"
        } else {
            "unit check"
        }
    }
}

impl fmt::Display for SenseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (sense {:02x} {:02x} {:02x}, format {:x} message {:x})",
            self.kind(),
            self.sense0,
            self.sense1,
            self.sense2,
            self.format,
            self.message
        )
    }
}

/// Why a CCW did not complete normally.
#[derive(Debug, Error)]
pub(crate) enum DasdError {
    #[error(transparent)]
    RetryAsync(#[from] RetryAsync),
    #[error("{0}")]
    Check(SenseCode),
}

impl From<SenseCode> for DasdError {
    fn from(code: SenseCode) -> Self {
        Self::Check(code)
    }
}
