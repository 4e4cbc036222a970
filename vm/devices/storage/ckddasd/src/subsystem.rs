// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Path groups, reserve and release, and the subsystem function commands.

use crate::dispatch::consumed;
use crate::dispatch::transfer;
use crate::dispatch::Ccw;
use crate::error::DasdError;
use crate::error::SenseCode;
use crate::CcwCompletion;
use crate::CkdDasd;
use ckd_defs::access_authority;
use ckd_defs::sense::message;
use ckd_defs::sense::SENSE_SIZE;
use ckd_defs::CcwOp;

/// Length of a path group ID.
const PGID_LEN: usize = 11;

/// Path state byte of Sense Path Group ID.
mod path_state {
    pub const RESET: u8 = 0x00;
    pub const GROUPED: u8 = 0x80;
    pub const MULTIPATH: u8 = 0x20;
}

/// Function control bits of Set Path Group ID.
mod pgid_function {
    pub const MASK: u8 = 0x60;
    pub const ESTABLISH: u8 = 0x00;
    pub const DISBAND: u8 = 0x20;
    pub const RESIGN: u8 = 0x40;
    pub const MULTIPATH: u8 = 0x80;
}

/// Perform Subsystem Function orders.
mod psf_order {
    pub const PREPARE_READ_SUBSYSTEM_DATA: u8 = 0x18;
    pub const SET_SPECIAL_INTERCEPT: u8 = 0x1B;
    pub const SET_SUBSYSTEM_CHARACTERISTICS: u8 = 0x1D;
    pub const SET_INTERFACE_IDENTIFIER: u8 = 0xB0;
}

/// Prepare for Read Subsystem Data suborders, in byte 6 of the parameters.
mod rsd_suborder {
    pub const PERFORMANCE_STATISTICS: u8 = 0x00;
    pub const UNIT_ADDRESS_CONFIGURATION: u8 = 0x0E;
}

const PERFORMANCE_STATISTICS_LEN: usize = 96;
const UNIT_ADDRESS_CONFIGURATION_LEN: usize = 512;
const UNIT_ADDRESS_BASE: u8 = 0x01;

/// Diagnostic Control subcommand this device accepts.
const DIAG_INHIBIT_WRITE: u8 = 0x02;

/// Per-device subsystem state that outlives individual chains.
#[derive(Debug, Default)]
pub(crate) struct SubsystemState {
    path_state: u8,
    pgid: [u8; PGID_LEN],
    reserved: bool,
    /// Data staged by Prepare for Read Subsystem Data.
    prepared: Option<Vec<u8>>,
    special_intercept: bool,
    interface_id: u16,
}

impl CkdDasd {
    /// Whether Device Reserve or Unconditional Reserve is in effect.
    pub fn is_reserved(&self) -> bool {
        self.subsystem.reserved
    }

    pub(crate) fn reserve_release(
        &mut self,
        ccw: &Ccw,
        data: &mut [u8],
    ) -> Result<CcwCompletion, DasdError> {
        // Must be the only command of its chain position.
        if ccw.sequence != 0 {
            return Err(SenseCode::invalid_sequence().into());
        }
        self.subsystem.reserved = ccw.code != CcwOp::DEVICE_RELEASE;
        tracing::debug!(
            devnum = self.devnum,
            reserved = self.subsystem.reserved,
            "reserve state"
        );
        let len = self.control_unit.features.sense_len;
        let completion = transfer(ccw, data, &self.state.sense[..len]);
        self.state.sense = [0; SENSE_SIZE];
        Ok(completion)
    }

    pub(crate) fn sense_path_group_id(
        &mut self,
        ccw: &Ccw,
        data: &mut [u8],
    ) -> Result<CcwCompletion, DasdError> {
        if !self.control_unit.features.eckd {
            return Err(SenseCode::invalid_command().into());
        }
        let mut out = [0; 1 + PGID_LEN];
        out[0] = self.subsystem.path_state;
        out[1..].copy_from_slice(&self.subsystem.pgid);
        Ok(transfer(ccw, data, &out))
    }

    pub(crate) fn set_path_group_id(
        &mut self,
        ccw: &Ccw,
        data: &mut [u8],
    ) -> Result<CcwCompletion, DasdError> {
        if !self.control_unit.features.eckd {
            return Err(SenseCode::invalid_command().into());
        }
        if ccw.count < 1 + PGID_LEN {
            return Err(SenseCode::count_too_small().into());
        }
        let function = data[0];
        let subsystem = &mut self.subsystem;
        match function & pgid_function::MASK {
            pgid_function::ESTABLISH => {
                subsystem.path_state = path_state::GROUPED
                    | if function & pgid_function::MULTIPATH != 0 {
                        path_state::MULTIPATH
                    } else {
                        0
                    };
                subsystem.pgid.copy_from_slice(&data[1..1 + PGID_LEN]);
            }
            pgid_function::DISBAND => subsystem.path_state = path_state::RESET,
            pgid_function::RESIGN => {
                subsystem.path_state = path_state::RESET;
                subsystem.pgid = [0; PGID_LEN];
            }
            _ => return Err(SenseCode::invalid_parameter().into()),
        }
        tracing::debug!(
            devnum = self.devnum,
            function,
            path_state = self.subsystem.path_state,
            "set path group id"
        );
        Ok(consumed(ccw, 1 + PGID_LEN))
    }

    pub(crate) fn perform_subsystem_function(
        &mut self,
        ccw: &Ccw,
        data: &mut [u8],
    ) -> Result<CcwCompletion, DasdError> {
        if ccw.count < 2 {
            return Err(SenseCode::count_too_small().into());
        }
        let data = &data[..ccw.count];
        let order = data[0];
        match order {
            psf_order::PREPARE_READ_SUBSYSTEM_DATA => {
                let suborder = *data.get(6).ok_or(SenseCode::count_too_small())?;
                let prepared = match suborder {
                    rsd_suborder::PERFORMANCE_STATISTICS => vec![0; PERFORMANCE_STATISTICS_LEN],
                    rsd_suborder::UNIT_ADDRESS_CONFIGURATION => {
                        let mut config = vec![0; UNIT_ADDRESS_CONFIGURATION_LEN];
                        let ua = usize::from(self.devnum as u8);
                        config[ua * 2] = UNIT_ADDRESS_BASE;
                        config[ua * 2 + 1] = ua as u8;
                        config
                    }
                    _ => return Err(SenseCode::invalid_parameter().into()),
                };
                self.subsystem.prepared = Some(prepared);
            }
            psf_order::SET_SPECIAL_INTERCEPT => self.subsystem.special_intercept = true,
            psf_order::SET_SUBSYSTEM_CHARACTERISTICS => {}
            psf_order::SET_INTERFACE_IDENTIFIER => {
                let id = data.get(2..4).ok_or(SenseCode::count_too_small())?;
                self.subsystem.interface_id = u16::from_be_bytes([id[0], id[1]]);
            }
            _ => return Err(SenseCode::invalid_parameter().into()),
        }
        tracing::debug!(
            devnum = self.devnum,
            order,
            special_intercept = self.subsystem.special_intercept,
            interface_id = self.subsystem.interface_id,
            "perform subsystem function"
        );
        Ok(consumed(ccw, ccw.count))
    }

    pub(crate) fn read_subsystem_data(
        &mut self,
        ccw: &Ccw,
        data: &mut [u8],
    ) -> Result<CcwCompletion, DasdError> {
        if !self.control_unit.features.subsystem_function {
            return Err(SenseCode::invalid_command().into());
        }
        let prepared = self
            .subsystem
            .prepared
            .take()
            .ok_or(SenseCode::invalid_sequence())?;
        Ok(transfer(ccw, data, &prepared))
    }

    pub(crate) fn diagnostic_control(
        &mut self,
        ccw: &Ccw,
        data: &mut [u8],
    ) -> Result<CcwCompletion, DasdError> {
        if !self.control_unit.features.subsystem_function {
            return Err(SenseCode::invalid_command().into());
        }
        if self.state.file_mask.access_authority() != access_authority::DIAGNOSTIC {
            return Err(SenseCode::command_reject(message::DIAGNOSTIC_NOT_PERMITTED).into());
        }
        if ccw.count < 4 {
            return Err(SenseCode::count_too_small().into());
        }
        if data[0] != DIAG_INHIBIT_WRITE {
            return Err(SenseCode::invalid_parameter().into());
        }
        Ok(consumed(ccw, 4))
    }
}
