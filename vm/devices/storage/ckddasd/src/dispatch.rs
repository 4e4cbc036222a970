// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-CCW dispatch and chain bookkeeping.

use crate::characteristics;
use crate::error::DasdError;
use crate::error::SenseCode;
use crate::sense::build_sense;
use crate::state::DomainOperation;
use crate::state::Extent;
use crate::state::Orientation;
use crate::state::Position;
use crate::CcwCompletion;
use crate::CcwRequest;
use crate::CkdDasd;
use ckd_cache::RetryAsync;
use ckd_defs::access_authority;
use ckd_defs::locate::SECTOR_NONE;
use ckd_defs::seek_control;
use ckd_defs::sense::SENSE_SIZE;
use ckd_defs::track::RecordHeader;
use ckd_defs::track::TrackHeader;
use ckd_defs::track::END_OF_TRACK;
use ckd_defs::track::TRACK_HEADER_SIZE;
use ckd_defs::write_control;
use ckd_defs::CcwFlags;
use ckd_defs::CcwOp;
use ckd_defs::DefineExtentParams;
use ckd_defs::FileMask;
use ckd_defs::SeekArgument;
use ckd_defs::UnitStatus;
use std::cmp::Ordering;
use zerocopy::FromBytes;
use zerocopy::IntoBytes;

/// The parts of a request that handlers look at, with the count clamped to
/// the data area.
#[derive(Debug, Copy, Clone)]
pub(crate) struct Ccw {
    pub code: CcwOp,
    pub flags: CcwFlags,
    pub chained: bool,
    pub prev_code: CcwOp,
    pub sequence: u32,
    pub count: usize,
}

type CcwResult = Result<CcwCompletion, DasdError>;

/// Completes a read of `bytes` into the channel area.
pub(crate) fn transfer(ccw: &Ccw, data: &mut [u8], bytes: &[u8]) -> CcwCompletion {
    let n = ccw.count.min(bytes.len());
    data[..n].copy_from_slice(&bytes[..n]);
    CcwCompletion {
        unit_status: UnitStatus::normal(),
        residual: (ccw.count - n) as u32,
        more: ccw.count < bytes.len(),
    }
}

/// Completes a command that consumed `used` bytes of the channel area.
pub(crate) fn consumed(ccw: &Ccw, used: usize) -> CcwCompletion {
    CcwCompletion::normal(ccw.count - ccw.count.min(used))
}

/// Completes a read of record data, flagging empty data fields with unit
/// exception.
fn transfer_data(ccw: &Ccw, data: &mut [u8], bytes: &[u8], data_len: u16) -> CcwCompletion {
    let mut completion = transfer(ccw, data, bytes);
    if data_len == 0 {
        completion.unit_status.set_unit_exception(true);
    }
    completion
}

impl CkdDasd {
    /// Executes one CCW.
    ///
    /// Returns [`RetryAsync`] only in synchronous mode, when the CCW would
    /// need to block. The device is then unchanged.
    pub fn execute_ccw(&mut self, request: CcwRequest<'_>) -> Result<CcwCompletion, RetryAsync> {
        let CcwRequest {
            code,
            flags,
            chained,
            prev_code,
            sequence,
            count,
            data,
            mode,
        } = request;
        let ccw = Ccw {
            code,
            flags,
            chained,
            prev_code,
            sequence,
            count: (count as usize).min(data.len()),
        };
        tracing::debug!(
            devnum = self.devnum,
            ?code,
            count = ccw.count,
            chained,
            sync = mode.is_sync(),
            "ccw"
        );

        let snapshot = mode
            .is_sync()
            .then(|| (self.state.clone(), self.current_track()));
        self.mode = mode;
        if !chained {
            self.state.start_chain(self.cylinders, self.heads);
        }
        if code.resets_index_marker() {
            self.state.flags.index_mark = false;
        }

        let result = self
            .check_domain(code)
            .and_then(|()| self.dispatch(&ccw, data));
        let mut completion = match result {
            Ok(completion) => completion,
            Err(DasdError::RetryAsync(retry)) => {
                if let Some((state, track)) = snapshot {
                    self.state = state;
                    self.restore_track(track);
                }
                tracing::debug!(devnum = self.devnum, ?code, "retrying asynchronously");
                return Err(retry);
            }
            Err(DasdError::Check(sense)) => self.unit_check(&ccw, sense),
        };
        self.release_parked();
        self.finish_ccw(&ccw, &mut completion);
        Ok(completion)
    }

    fn unit_check(&mut self, ccw: &Ccw, code: SenseCode) -> CcwCompletion {
        tracing::debug!(
            devnum = self.devnum,
            code = ?ccw.code,
            cyl = self.state.position.cyl,
            head = self.state.position.head,
            %code,
            "unit check"
        );
        self.state.sense = build_sense(&self.state, self.device, self.devnum, self.cylinders, code);
        CcwCompletion {
            unit_status: UnitStatus::normal().with_unit_check(true),
            residual: ccw.count as u32,
            more: false,
        }
    }

    /// Rejects commands an open Locate Record domain does not allow.
    fn check_domain(&self, code: CcwOp) -> Result<(), DasdError> {
        let Some(locate) = &self.state.locate else {
            return Ok(());
        };
        if code == CcwOp::LOCATE_RECORD
            || code == CcwOp::LOCATE_RECORD_EXTENDED
            || !locate.permits(code)
        {
            return Err(SenseCode::invalid_sequence().into());
        }
        Ok(())
    }

    /// End-of-CCW flag resets and domain countdown.
    fn finish_ccw(&mut self, ccw: &Ccw, completion: &mut CcwCompletion) {
        let code = ccw.code;
        let flags = &mut self.state.flags;
        if !matches!(code.base(), 0x39 | 0x19) {
            flags.search_ha_equal = false;
        }
        if !matches!(code.base(), 0x31 | 0x0E | 0x0D | 0x06 | 0x05) {
            flags.search_id_equal = false;
        }
        if !matches!(code.base(), 0x29 | 0x06 | 0x05) {
            flags.search_key_equal = false;
        }
        if code != CcwOp::WRITE_R0 && code != CcwOp::WRITE_CKD {
            flags.write_ckd = false;
        }
        if code != CcwOp::WRITE_HA {
            flags.write_ha_done = false;
        }

        if completion.unit_status.unit_check()
            || code == CcwOp::LOCATE_RECORD
            || code == CcwOp::LOCATE_RECORD_EXTENDED
        {
            return;
        }
        let Some(locate) = self.state.locate.as_mut() else {
            return;
        };
        locate.count_pending = false;
        locate.count = locate.count.saturating_sub(1);
        if locate.count == 0 {
            self.state.locate = None;
        } else if !ccw.flags.cc() {
            let sense = SenseCode::incomplete_domain();
            self.unit_check(ccw, sense);
            completion.unit_status.set_unit_check(true);
        }
    }

    fn dispatch(&mut self, ccw: &Ccw, data: &mut [u8]) -> CcwResult {
        match ccw.code {
            CcwOp::NOP => Ok(consumed(ccw, 0)),
            CcwOp::SENSE => Ok(self.sense_ccw(ccw, data)),
            CcwOp::SENSE_ID => self.sense_id(ccw, data),
            CcwOp::READ_DEVICE_CHARACTERISTICS => self.read_device_characteristics(ccw, data),
            CcwOp::READ_CONFIGURATION_DATA => self.read_configuration_data(ccw, data),
            CcwOp::SEEK | CcwOp::SEEK_CYLINDER | CcwOp::SEEK_HEAD => self.seek_ccw(ccw, data),
            CcwOp::RECALIBRATE => self.recalibrate(ccw),
            CcwOp::SET_FILE_MASK => self.set_file_mask(ccw, data),
            CcwOp::DEFINE_EXTENT => self.define_extent(ccw, data),
            CcwOp::LOCATE_RECORD => self.locate_record(ccw, data, false),
            CcwOp::LOCATE_RECORD_EXTENDED => self.locate_record(ccw, data, true),
            CcwOp::PERFORM_SUBSYSTEM_FUNCTION => {
                if self.control_unit.features.subsystem_function {
                    self.perform_subsystem_function(ccw, data)
                } else {
                    self.seek_and_set_sector(ccw, data)
                }
            }
            CcwOp::SET_SECTOR => self.set_sector(ccw, data),
            CcwOp::READ_SECTOR => self.read_sector(ccw, data),
            CcwOp::READ_IPL => self.read_ipl(ccw, data),
            CcwOp::SEARCH_HA_EQUAL | CcwOp::SEARCH_HA_EQUAL_MT => self.search_ha(ccw, data),
            code if matches!(code.base(), 0x31 | 0x51 | 0x71) => self.search_id(ccw, data),
            code if matches!(code.base(), 0x29 | 0x49 | 0x69) => self.search_key(ccw, data),
            CcwOp::READ_HA | CcwOp::READ_HA_MT => self.read_ha(ccw, data),
            CcwOp::READ_R0 | CcwOp::READ_R0_MT => self.read_r0(ccw, data),
            CcwOp::READ_COUNT | CcwOp::READ_COUNT_MT => self.read_count_ccw(ccw, data),
            CcwOp::READ_DATA | CcwOp::READ_DATA_MT => self.read_data_ccw(ccw, data),
            CcwOp::READ_KEY_DATA | CcwOp::READ_KEY_DATA_MT => self.read_key_data_ccw(ccw, data),
            CcwOp::READ_CKD | CcwOp::READ_CKD_MT => self.read_ckd_ccw(ccw, data),
            CcwOp::READ_MULTIPLE_CKD => self.read_multiple_ckd(ccw, data),
            CcwOp::READ_TRACK => self.read_track_ccw(ccw, data),
            CcwOp::WRITE_DATA | CcwOp::WRITE_UPDATE_DATA => self.write_data_ccw(ccw, data),
            CcwOp::WRITE_KEY_DATA | CcwOp::WRITE_UPDATE_KEY_DATA => {
                self.write_key_data_ccw(ccw, data)
            }
            CcwOp::WRITE_CKD | CcwOp::WRITE_SPECIAL_CKD => self.write_ckd_ccw(ccw, data),
            CcwOp::WRITE_R0 => self.write_r0(ccw, data),
            CcwOp::WRITE_HA => self.write_ha(ccw, data),
            CcwOp::ERASE => self.erase_ccw(ccw, data),
            CcwOp::WRITE_CKD_NEXT_TRACK => self.write_ckd_next_track(ccw, data),
            CcwOp::DEVICE_RESERVE | CcwOp::DEVICE_RELEASE | CcwOp::UNCONDITIONAL_RESERVE => {
                self.reserve_release(ccw, data)
            }
            CcwOp::SENSE_PATH_GROUP_ID => self.sense_path_group_id(ccw, data),
            CcwOp::SET_PATH_GROUP_ID => self.set_path_group_id(ccw, data),
            CcwOp::READ_SUBSYSTEM_DATA => self.read_subsystem_data(ccw, data),
            CcwOp::DIAGNOSTIC_CONTROL => self.diagnostic_control(ccw, data),
            _ => Err(SenseCode::invalid_command().into()),
        }
    }

    /// Rejects data transfer before any positioning on controllers that
    /// enforce command sequencing.
    fn check_positioned(&self) -> Result<(), DasdError> {
        if self.control_unit.features.requires_positioning && !self.state.flags.positioned() {
            return Err(SenseCode::invalid_sequence().into());
        }
        Ok(())
    }

    pub(crate) fn check_writable(&self) -> Result<(), DasdError> {
        if self.read_only && !self.fake_write {
            return Err(SenseCode::write_inhibited().into());
        }
        Ok(())
    }

    /// Inside a domain without CKD conversion mode, every record must have
    /// the transfer length factor as its data length.
    fn check_transfer_length(&self, data_len: u16) -> Result<(), DasdError> {
        if let Some(locate) = &self.state.locate {
            if !self.state.global_attributes.ckd_conversion()
                && locate.transfer_length_factor != data_len
            {
                return Err(SenseCode::invalid_track_format().into());
            }
        }
        Ok(())
    }

    fn sense_ccw(&mut self, ccw: &Ccw, data: &mut [u8]) -> CcwCompletion {
        let len = self.control_unit.features.sense_len;
        let completion = transfer(ccw, data, &self.state.sense[..len]);
        self.state.sense = [0; SENSE_SIZE];
        completion
    }

    fn sense_id(&mut self, ccw: &Ccw, data: &mut [u8]) -> CcwResult {
        if !self.control_unit.features.sense_id {
            return Err(SenseCode::invalid_command().into());
        }
        let id = characteristics::sense_id(self.control_unit, self.device);
        Ok(transfer(ccw, data, &id))
    }

    fn read_device_characteristics(&mut self, ccw: &Ccw, data: &mut [u8]) -> CcwResult {
        if !self.control_unit.features.eckd {
            return Err(SenseCode::invalid_command().into());
        }
        let rdc = characteristics::device_characteristics(
            self.control_unit,
            self.device,
            self.cylinders,
        );
        Ok(transfer(ccw, data, &rdc))
    }

    fn read_configuration_data(&mut self, ccw: &Ccw, data: &mut [u8]) -> CcwResult {
        if !self.control_unit.features.configuration_data {
            return Err(SenseCode::invalid_command().into());
        }
        let rcd = characteristics::configuration_data(self.control_unit, self.device, self.devnum);
        Ok(transfer(ccw, data, &rcd))
    }

    /// Checks a seek command against the file mask.
    fn check_seek_permitted(&self, code: CcwOp) -> Result<(), DasdError> {
        let control = self.state.file_mask.seek_control();
        let permitted = match code {
            CcwOp::SEEK_CYLINDER => matches!(
                control,
                seek_control::ALLOW_ALL | seek_control::CYLINDER_AND_HEAD
            ),
            CcwOp::SEEK_HEAD => control != seek_control::INHIBIT_ALL,
            _ => control == seek_control::ALLOW_ALL,
        };
        if !permitted {
            return Err(SenseCode::file_protected().into());
        }
        Ok(())
    }

    fn do_seek(&mut self, code: CcwOp, data: &[u8]) -> Result<(), DasdError> {
        self.check_seek_permitted(code)?;
        let (arg, _) =
            SeekArgument::read_from_prefix(data).map_err(|_| SenseCode::count_too_small())?;
        if arg.bin.get() != 0 {
            return Err(SenseCode::invalid_parameter().into());
        }
        let cyl = if code == CcwOp::SEEK_HEAD {
            self.state.position.cyl
        } else {
            arg.cyl.get().into()
        };
        self.seek(cyl, arg.head.get().into())?;
        if code == CcwOp::SEEK_CYLINDER {
            self.state.flags.seek_cylinder = true;
        } else {
            self.state.flags.seek = true;
        }
        Ok(())
    }

    fn seek_ccw(&mut self, ccw: &Ccw, data: &mut [u8]) -> CcwResult {
        if ccw.count < size_of::<SeekArgument>() {
            return Err(SenseCode::count_too_small().into());
        }
        self.do_seek(ccw.code, &data[..ccw.count])?;
        Ok(consumed(ccw, size_of::<SeekArgument>()))
    }

    /// X'27' on controllers without subsystem functions.
    fn seek_and_set_sector(&mut self, ccw: &Ccw, data: &mut [u8]) -> CcwResult {
        const LEN: usize = size_of::<SeekArgument>() + 1;
        if ccw.count < LEN {
            return Err(SenseCode::count_too_small().into());
        }
        self.check_sector(data[LEN - 1])?;
        self.do_seek(CcwOp::SEEK, &data[..ccw.count])?;
        Ok(consumed(ccw, LEN))
    }

    pub(crate) fn check_sector(&self, sector: u8) -> Result<(), DasdError> {
        if sector != SECTOR_NONE && sector >= self.device.sectors.max(1) {
            return Err(SenseCode::invalid_parameter().into());
        }
        Ok(())
    }

    fn set_sector(&mut self, ccw: &Ccw, data: &mut [u8]) -> CcwResult {
        if !self.device.has_sectors() {
            return Err(SenseCode::invalid_command().into());
        }
        if ccw.count < 1 {
            return Err(SenseCode::count_too_small().into());
        }
        self.check_sector(data[0])?;
        self.ensure_track()?;
        Ok(consumed(ccw, 1))
    }

    fn read_sector(&mut self, ccw: &Ccw, data: &mut [u8]) -> CcwResult {
        if !self.device.has_sectors() {
            return Err(SenseCode::invalid_command().into());
        }
        self.ensure_track()?;
        // Rotational position is not modelled.
        Ok(transfer(ccw, data, &[0]))
    }

    fn recalibrate(&mut self, ccw: &Ccw) -> CcwResult {
        if self.state.file_mask.seek_control() != seek_control::ALLOW_ALL {
            return Err(SenseCode::file_protected().into());
        }
        self.seek(0, 0)?;
        self.state.flags.recalibrate = true;
        Ok(consumed(ccw, 0))
    }

    fn check_file_mask(mask: FileMask) -> Result<(), DasdError> {
        if mask.reserved() || mask.access_authority() == access_authority::RESERVED {
            return Err(SenseCode::invalid_parameter().into());
        }
        Ok(())
    }

    fn set_file_mask(&mut self, ccw: &Ccw, data: &mut [u8]) -> CcwResult {
        if self.state.flags.define_extent || self.state.flags.set_file_mask {
            return Err(SenseCode::invalid_sequence().into());
        }
        if ccw.count < 1 {
            return Err(SenseCode::count_too_small().into());
        }
        let mask = FileMask::from(data[0]);
        Self::check_file_mask(mask)?;
        self.state.file_mask = mask;
        self.state.flags.set_file_mask = true;
        Ok(consumed(ccw, 1))
    }

    fn define_extent(&mut self, ccw: &Ccw, data: &mut [u8]) -> CcwResult {
        if !self.control_unit.features.eckd {
            return Err(SenseCode::invalid_command().into());
        }
        if self.state.flags.define_extent || self.state.flags.set_file_mask {
            return Err(SenseCode::invalid_sequence().into());
        }
        let (params, _) = DefineExtentParams::read_from_prefix(&data[..ccw.count])
            .map_err(|_| SenseCode::count_too_small())?;
        Self::check_file_mask(params.mask)?;

        let (begin_cyl, begin_head) = (params.begin_cyl.get(), params.begin_head.get());
        let (end_cyl, end_head) = (params.end_cyl.get(), params.end_head.get());
        if (begin_cyl, begin_head) > (end_cyl, end_head)
            || u32::from(end_cyl) >= self.cylinders
            || u32::from(begin_head) >= self.heads
            || u32::from(end_head) >= self.heads
        {
            return Err(SenseCode::invalid_parameter().into());
        }

        self.state.file_mask = params.mask;
        self.state.global_attributes = params.global_attributes;
        self.state.block_size = params.block_size.get();
        self.state.extent = Extent {
            begin_cyl: begin_cyl.into(),
            begin_head: begin_head.into(),
            end_cyl: end_cyl.into(),
            end_head: end_head.into(),
        };
        self.state.flags.define_extent = true;
        tracing::trace!(devnum = self.devnum, extent = ?self.state.extent, "define extent");
        Ok(consumed(ccw, size_of::<DefineExtentParams>()))
    }

    fn read_ipl(&mut self, ccw: &Ccw, data: &mut [u8]) -> CcwResult {
        self.seek(0, 0)?;
        self.state.flags.read_ipl = true;
        self.read_count(ccw.code)?;
        let mut out = Vec::new();
        self.read_data(ccw.code, &mut out)?;
        Ok(transfer(ccw, data, &out))
    }

    /// Multitrack home address commands move to the next track when chained
    /// from a command that left the device past index.
    fn home_address_advance(&mut self, ccw: &Ccw) -> Result<(), DasdError> {
        if ccw.code.multitrack()
            && self.state.locate.is_none()
            && ccw.chained
            && self.state.orientation != Orientation::Index
        {
            self.advance_tracks(1)?;
        }
        Ok(())
    }

    /// Reorients the current track to index and returns its home address.
    fn reread_home_address(&mut self) -> Result<[u8; TRACK_HEADER_SIZE], DasdError> {
        let Position { cyl, head, .. } = self.state.position;
        self.seek(cyl, head)?;
        self.state.flags.index_mark = false;
        self.home_address()
    }

    fn search_ha(&mut self, ccw: &Ccw, data: &mut [u8]) -> CcwResult {
        self.check_positioned()?;
        self.ensure_track()?;
        self.home_address_advance(ccw)?;
        let ha = self.reread_home_address()?;
        let n = ccw.count.min(4);
        let mut completion = consumed(ccw, n);
        if ha[1..1 + n] == data[..n] {
            self.state.flags.search_ha_equal = true;
            completion.unit_status.set_status_modifier(true);
        }
        Ok(completion)
    }

    fn search_id(&mut self, ccw: &Ccw, data: &mut [u8]) -> CcwResult {
        self.check_positioned()?;
        self.ensure_track()?;
        let header = self.read_count(ccw.code)?;
        let n = ccw.count.min(5);
        let ordering = header.id()[..n].cmp(&data[..n]);
        let satisfied = match ccw.code.base() {
            0x31 => ordering == Ordering::Equal,
            0x51 => ordering == Ordering::Greater,
            _ => ordering != Ordering::Less,
        };
        let mut completion = consumed(ccw, n);
        if satisfied {
            if ccw.code.base() == 0x31 {
                self.state.flags.search_id_equal = true;
            }
            completion.unit_status.set_status_modifier(true);
        }
        Ok(completion)
    }

    fn search_key(&mut self, ccw: &Ccw, data: &mut [u8]) -> CcwResult {
        self.check_positioned()?;
        self.ensure_track()?;
        let key = self.read_key(ccw.code)?;
        if key.is_empty() {
            return Ok(consumed(ccw, 0));
        }
        let n = ccw.count.min(key.len());
        let ordering = key[..n].cmp(&data[..n]);
        let satisfied = match ccw.code.base() {
            0x29 => ordering == Ordering::Equal,
            0x49 => ordering == Ordering::Greater,
            _ => ordering != Ordering::Less,
        };
        let mut completion = consumed(ccw, n);
        if satisfied {
            if ccw.code.base() == 0x29 {
                self.state.flags.search_key_equal = true;
            }
            completion.unit_status.set_status_modifier(true);
        }
        Ok(completion)
    }

    fn read_ha(&mut self, ccw: &Ccw, data: &mut [u8]) -> CcwResult {
        self.check_positioned()?;
        self.ensure_track()?;
        self.home_address_advance(ccw)?;
        let ha = self.reread_home_address()?;
        Ok(transfer(ccw, data, &ha))
    }

    fn read_r0(&mut self, ccw: &Ccw, data: &mut [u8]) -> CcwResult {
        self.check_positioned()?;
        self.ensure_track()?;
        self.home_address_advance(ccw)?;
        let Position { cyl, head, .. } = self.state.position;
        self.seek(cyl, head)?;
        let header = self.read_count(ccw.code)?;
        let mut out = header.as_bytes().to_vec();
        out.extend(self.read_key(ccw.code)?);
        self.read_data(ccw.code, &mut out)?;
        Ok(transfer_data(ccw, data, &out, header.data_len.get()))
    }

    fn read_count_ccw(&mut self, ccw: &Ccw, data: &mut [u8]) -> CcwResult {
        self.check_positioned()?;
        self.ensure_track()?;
        let header = self.read_count(ccw.code)?;
        Ok(transfer(ccw, data, header.as_bytes()))
    }

    fn read_data_ccw(&mut self, ccw: &Ccw, data: &mut [u8]) -> CcwResult {
        self.check_positioned()?;
        self.ensure_track()?;
        let mut out = Vec::new();
        self.read_data(ccw.code, &mut out)?;
        let data_len = self.state.position.data_len;
        self.read_overflow(ccw.code, &mut out)?;
        Ok(transfer_data(ccw, data, &out, data_len))
    }

    fn read_key_data_ccw(&mut self, ccw: &Ccw, data: &mut [u8]) -> CcwResult {
        self.check_positioned()?;
        self.ensure_track()?;
        let mut out = self.read_key(ccw.code)?;
        self.read_data(ccw.code, &mut out)?;
        let data_len = self.state.position.data_len;
        self.read_overflow(ccw.code, &mut out)?;
        Ok(transfer_data(ccw, data, &out, data_len))
    }

    fn read_ckd_ccw(&mut self, ccw: &Ccw, data: &mut [u8]) -> CcwResult {
        self.check_positioned()?;
        self.ensure_track()?;
        let header = self.read_count(ccw.code)?;
        let mut out = header.as_bytes().to_vec();
        out.extend(self.read_key(ccw.code)?);
        self.read_data(ccw.code, &mut out)?;
        self.read_overflow(ccw.code, &mut out)?;
        Ok(transfer_data(ccw, data, &out, header.data_len.get()))
    }

    fn read_multiple_ckd(&mut self, ccw: &Ccw, data: &mut [u8]) -> CcwResult {
        self.check_positioned()?;
        self.ensure_track()?;
        let mut out = Vec::new();
        loop {
            let header = self.read_count(ccw.code)?;
            if self.state.orientation == Orientation::EndOfTrack {
                break;
            }
            out.extend_from_slice(header.as_bytes());
            out.extend(self.read_key(ccw.code)?);
            self.read_data(ccw.code, &mut out)?;
        }
        Ok(transfer(ccw, data, &out))
    }

    fn read_track_ccw(&mut self, ccw: &Ccw, data: &mut [u8]) -> CcwResult {
        let Some(locate) = self.state.locate.as_mut() else {
            return Err(SenseCode::invalid_sequence().into());
        };
        if ccw.prev_code == CcwOp::READ_TRACK {
            let tracks = match locate.trackset.as_mut() {
                Some(trackset) => trackset.next().ok_or(SenseCode::invalid_sequence())?,
                None => 1,
            };
            self.advance_tracks(tracks)?;
        }
        self.ensure_track()?;
        let mut out = Vec::new();
        loop {
            let header = self.read_count(ccw.code)?;
            if self.state.orientation == Orientation::EndOfTrack {
                break;
            }
            out.extend_from_slice(header.as_bytes());
            out.extend(self.read_key(ccw.code)?);
            self.read_data(ccw.code, &mut out)?;
        }
        Ok(transfer(ccw, data, &out))
    }

    /// Write Data and Write Update Data.
    fn write_data_ccw(&mut self, ccw: &Ccw, data: &mut [u8]) -> CcwResult {
        self.check_positioned()?;
        self.check_writable()?;
        let in_domain = self.state.locate.is_some();
        if !in_domain
            && (ccw.code == CcwOp::WRITE_UPDATE_DATA
                || !(self.state.flags.search_id_equal || self.state.flags.search_key_equal))
        {
            return Err(SenseCode::invalid_sequence().into());
        }
        if self.state.file_mask.write_control() == write_control::INHIBIT_ALL {
            return Err(SenseCode::file_protected().into());
        }
        self.ensure_track()?;
        if in_domain {
            if !matches!(
                self.state.orientation,
                Orientation::Count | Orientation::Key
            ) {
                self.read_count(ccw.code)?;
            }
            self.check_transfer_length(self.state.position.data_len)?;
        }
        let data_len = self.state.position.data_len.into();
        if ccw.flags.cd() && ccw.count < data_len {
            return Err(SenseCode::overrun().into());
        }
        let len = self.write_data(&data[..ccw.count])?;
        Ok(consumed(ccw, len))
    }

    /// Write Key and Data and Write Update Key and Data.
    fn write_key_data_ccw(&mut self, ccw: &Ccw, data: &mut [u8]) -> CcwResult {
        self.check_positioned()?;
        self.check_writable()?;
        let in_domain = self.state.locate.is_some();
        if !in_domain
            && (ccw.code == CcwOp::WRITE_UPDATE_KEY_DATA
                || !(self.state.flags.search_id_equal || self.state.flags.search_key_equal))
        {
            return Err(SenseCode::invalid_sequence().into());
        }
        if self.state.file_mask.write_control() == write_control::INHIBIT_ALL {
            return Err(SenseCode::file_protected().into());
        }
        self.ensure_track()?;
        if in_domain {
            if self.state.orientation != Orientation::Count {
                self.read_count(ccw.code)?;
            }
            self.check_transfer_length(self.state.position.data_len)?;
        }
        let pos = self.state.position;
        if ccw.flags.cd() && ccw.count < usize::from(pos.key_len) + usize::from(pos.data_len) {
            return Err(SenseCode::overrun().into());
        }
        let len = self.write_key_data(&data[..ccw.count])?;
        Ok(consumed(ccw, len))
    }

    /// Checks the sequencing and file mask for commands that format a
    /// track after the current record.
    fn check_format_write(&self) -> Result<(), DasdError> {
        let flags = &self.state.flags;
        if self.state.locate.is_none()
            && !(flags.search_id_equal || flags.search_key_equal || flags.write_ckd)
        {
            return Err(SenseCode::invalid_sequence().into());
        }
        if !matches!(
            self.state.file_mask.write_control(),
            write_control::ALLOW_ALL | write_control::INHIBIT_HA_R0
        ) {
            return Err(SenseCode::file_protected().into());
        }
        Ok(())
    }

    /// Reads the count field a format write is about to lay down, for the
    /// overrun and transfer length checks.
    fn new_record_header(&self, ccw: &Ccw, data: &[u8]) -> Result<RecordHeader, DasdError> {
        let (header, _) = RecordHeader::read_from_prefix(&data[..ccw.count])
            .map_err(|_| SenseCode::count_too_small())?;
        if ccw.flags.cd() && ccw.count < header.record_len() {
            return Err(SenseCode::overrun().into());
        }
        self.check_transfer_length(header.data_len.get())?;
        Ok(header)
    }

    /// Write CKD and Write Special CKD.
    fn write_ckd_ccw(&mut self, ccw: &Ccw, data: &mut [u8]) -> CcwResult {
        self.check_positioned()?;
        self.check_writable()?;
        self.check_format_write()?;
        self.ensure_track()?;
        self.new_record_header(ccw, data)?;
        self.skip_record_zero()?;
        let header = self.write_ckd(&data[..ccw.count], ccw.code == CcwOp::WRITE_SPECIAL_CKD)?;
        self.state.flags.write_ckd = true;
        Ok(consumed(ccw, header.record_len()))
    }

    fn write_r0(&mut self, ccw: &Ccw, data: &mut [u8]) -> CcwResult {
        self.check_positioned()?;
        self.check_writable()?;
        if self.state.locate.is_none()
            && !(self.state.flags.search_ha_equal || self.state.flags.write_ha_done)
        {
            return Err(SenseCode::invalid_sequence().into());
        }
        if self.state.file_mask.write_control() != write_control::ALLOW_ALL {
            return Err(SenseCode::file_protected().into());
        }
        self.ensure_track()?;
        if self.state.orientation != Orientation::Index {
            return Err(SenseCode::invalid_sequence().into());
        }
        self.new_record_header(ccw, data)?;
        let header = self.write_ckd(&data[..ccw.count], false)?;
        self.state.flags.write_ckd = true;
        Ok(consumed(ccw, header.record_len()))
    }

    fn write_ha(&mut self, ccw: &Ccw, data: &mut [u8]) -> CcwResult {
        self.check_positioned()?;
        self.check_writable()?;
        if self.state.file_mask.write_control() != write_control::ALLOW_ALL {
            return Err(SenseCode::file_protected().into());
        }
        if ccw.count < TRACK_HEADER_SIZE {
            return Err(SenseCode::count_too_small().into());
        }
        self.ensure_track()?;
        let Position { cyl, head, .. } = self.state.position;
        let ha = TrackHeader::new(cyl as u16, head as u16);
        if data[1..TRACK_HEADER_SIZE] != ha.as_bytes()[1..] {
            return Err(SenseCode::invalid_parameter().into());
        }
        let mut image = ha.as_bytes().to_vec();
        image.extend_from_slice(&END_OF_TRACK);
        self.write_home_address(&image)?;
        self.state.flags.write_ha_done = true;
        Ok(consumed(ccw, TRACK_HEADER_SIZE))
    }

    fn erase_ccw(&mut self, ccw: &Ccw, data: &mut [u8]) -> CcwResult {
        self.check_positioned()?;
        self.check_writable()?;
        self.check_format_write()?;
        self.ensure_track()?;
        self.skip_record_zero()?;
        let len = self.erase(&data[..ccw.count])?;
        Ok(consumed(ccw, len))
    }

    fn write_ckd_next_track(&mut self, ccw: &Ccw, data: &mut [u8]) -> CcwResult {
        // Only valid inside a Write Track domain.
        if self.state.locate.map(|locate| locate.operation) != Some(DomainOperation::WriteTrack) {
            return Err(SenseCode::invalid_sequence().into());
        }
        self.check_writable()?;
        self.check_format_write()?;
        self.ensure_track()?;
        self.new_record_header(ccw, data)?;
        self.advance_tracks(1)?;
        self.read_count(ccw.code)?;
        let header = self.write_ckd(&data[..ccw.count], false)?;
        self.state.flags.write_ckd = true;
        Ok(consumed(ccw, header.record_len()))
    }
}
