// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Locate Record and Locate Record Extended.

use crate::dispatch::consumed;
use crate::dispatch::Ccw;
use crate::error::DasdError;
use crate::error::SenseCode;
use crate::state::DomainOperation;
use crate::state::LocateState;
use crate::state::Orientation;
use crate::state::Trackset;
use crate::CcwCompletion;
use crate::CkdDasd;
use ckd_defs::locate::orientation;
use ckd_defs::locate::ExtendedOperation;
use ckd_defs::locate::LocateOperationCode;
use ckd_defs::locate::LocateRecordExtendedParams;
use ckd_defs::locate::LocateRecordParams;
use ckd_defs::write_control;
use ckd_defs::CcwOp;
use zerocopy::FromBytes;
use zerocopy::IntoBytes;

/// Whether `code` may be combined with the orientation field `orient`.
fn valid_orientation(orient: u8, code: LocateOperationCode) -> bool {
    use LocateOperationCode as Op;
    match orient {
        orientation::HOME => matches!(
            code,
            Op::ORIENT | Op::FORMAT_WRITE | Op::READ_DATA | Op::READ_TRACKS | Op::READ
        ),
        orientation::DATA => matches!(
            code,
            Op::ORIENT | Op::WRITE_DATA | Op::READ_DATA | Op::READ
        ),
        orientation::INDEX => matches!(code, Op::FORMAT_WRITE | Op::READ),
        _ => true,
    }
}

/// Whether an extended operation may be combined with the orientation
/// field `orient`.
fn valid_extended_orientation(orient: u8, extended: ExtendedOperation) -> bool {
    match extended {
        ExtendedOperation::WRITE_ANY | ExtendedOperation::READ_ANY => {
            orient == orientation::COUNT
        }
        ExtendedOperation::READ_TRACKSET => {
            matches!(orient, orientation::HOME | orientation::INDEX)
        }
        _ => false,
    }
}

impl CkdDasd {
    pub(crate) fn locate_record(
        &mut self,
        ccw: &Ccw,
        data: &mut [u8],
        extended: bool,
    ) -> Result<CcwCompletion, DasdError> {
        let features = self.control_unit.features;
        if !features.eckd || (extended && !features.locate_extended) {
            return Err(SenseCode::invalid_command().into());
        }
        let data = &data[..ccw.count];

        let (params, ext_op, ext_params, used) = if extended {
            let (lre, rest) = LocateRecordExtendedParams::read_from_prefix(data)
                .map_err(|_| SenseCode::count_too_small())?;
            let len = usize::from(lre.extended_parameter_length);
            let ext_params = rest.get(..len).ok_or(SenseCode::count_too_small())?;
            (
                lre.base,
                lre.extended_operation,
                ext_params,
                size_of::<LocateRecordExtendedParams>() + len,
            )
        } else {
            let (lr, _) = LocateRecordParams::read_from_prefix(data)
                .map_err(|_| SenseCode::count_too_small())?;
            (
                lr,
                ExtendedOperation(0),
                &[][..],
                size_of::<LocateRecordParams>(),
            )
        };

        if !self.state.flags.define_extent {
            return Err(SenseCode::invalid_sequence().into());
        }

        let code = params.operation.operation();
        let orient = params.operation.orientation();
        let aux = params.auxiliary;
        let count = params.count;

        // Operation and orientation.
        let operation = if code == LocateOperationCode::ORIENT {
            None
        } else {
            if code == LocateOperationCode::EXTENDED {
                if !extended
                    || !ext_op
                        .parameter_lengths()
                        .contains(&(ext_params.len() as u8))
                    || !valid_extended_orientation(orient, ext_op)
                {
                    return Err(SenseCode::invalid_parameter().into());
                }
            } else if ext_op.0 != 0 || !ext_params.is_empty() {
                return Err(SenseCode::invalid_parameter().into());
            }
            Some(
                DomainOperation::from_locate(code, ext_op)
                    .ok_or(SenseCode::invalid_parameter())?,
            )
        };
        if code != LocateOperationCode::EXTENDED && !valid_orientation(orient, code) {
            return Err(SenseCode::invalid_parameter().into());
        }

        // Write authorization.
        if let Some(op) = operation.filter(|op| op.is_write()) {
            self.check_writable()?;
            let permitted = match op {
                DomainOperation::FormatWrite | DomainOperation::WriteTrack => matches!(
                    self.state.file_mask.write_control(),
                    write_control::ALLOW_ALL | write_control::INHIBIT_HA_R0
                ),
                _ => self.state.file_mask.write_control() != write_control::INHIBIT_ALL,
            };
            if !permitted {
                return Err(SenseCode::file_protected().into());
            }
        }

        // Auxiliary byte and count.
        if aux.reserved() != 0 || params.reserved != 0 {
            return Err(SenseCode::invalid_parameter().into());
        }
        if aux.read_count_suffix()
            && (!matches!(
                operation,
                Some(DomainOperation::WriteTrack | DomainOperation::Read)
            ) || count < 2)
        {
            return Err(SenseCode::invalid_parameter().into());
        }
        if (count == 0) != operation.is_none() {
            return Err(SenseCode::invalid_parameter().into());
        }

        // Seek address.
        let cyl = u32::from(params.seek_cyl.get());
        let head = u32::from(params.seek_head.get());
        if cyl >= self.cylinders || head >= self.heads {
            return Err(SenseCode::invalid_parameter().into());
        }
        if !self.state.extent.contains(cyl, head) {
            return Err(SenseCode::file_protected().into());
        }
        self.check_sector(params.sector)?;

        // Transfer length factor.
        let factor = params.transfer_length_factor.get();
        let transfer_length_factor = if aux.transfer_length_valid() {
            if factor == 0 || factor > self.state.block_size {
                return Err(SenseCode::invalid_parameter().into());
            }
            factor
        } else {
            if factor != 0 {
                return Err(SenseCode::invalid_parameter().into());
            }
            self.state.block_size
        };

        let trackset = if operation == Some(DomainOperation::ReadTrackset) {
            Some(self.check_trackset(ext_params, count, cyl, head)?)
        } else {
            None
        };

        tracing::trace!(
            devnum = self.devnum,
            ?code,
            ?ext_op,
            orient,
            count,
            cyl,
            head,
            "locate record"
        );

        self.state.flags.index_mark = false;
        self.seek(cyl, head)?;
        self.state.flags.locate = true;

        let search = params.search;
        let searched = !matches!(
            operation,
            Some(
                DomainOperation::WriteAny
                    | DomainOperation::ReadAny
                    | DomainOperation::ReadTrackset
            )
        );
        if searched {
            match orient {
                orientation::HOME => {
                    let ha = self.home_address()?;
                    if ha[1..] != search.as_bytes()[..4] {
                        return Err(SenseCode::no_record_found().into());
                    }
                }
                orientation::COUNT | orientation::DATA => {
                    loop {
                        let header = self.read_count(CcwOp::LOCATE_RECORD)?;
                        if header.id() == search.as_bytes() {
                            break;
                        }
                    }
                    if orient == orientation::DATA {
                        let pos = self.state.position;
                        self.state
                            .cursor
                            .advance(usize::from(pos.key_len) + usize::from(pos.data_len));
                        self.state.orientation = Orientation::Data;
                    }
                }
                _ => {}
            }
        }

        if let Some(operation) = operation {
            self.state.locate = Some(LocateState {
                operation,
                auxiliary: aux,
                count,
                transfer_length_factor,
                trackset,
                count_pending: operation == DomainOperation::Read
                    && orient == orientation::COUNT,
            });
        }
        Ok(consumed(ccw, used))
    }

    /// Validates a Read Trackset bitmap against the domain count and the
    /// extent.
    fn check_trackset(
        &self,
        ext_params: &[u8],
        count: u8,
        cyl: u32,
        head: u32,
    ) -> Result<Trackset, DasdError> {
        let (mask, bits) = match *ext_params {
            [byte] => (u16::from(byte), 8),
            [high, low] => (u16::from_be_bytes([high, low]), 16),
            _ => return Err(SenseCode::invalid_parameter().into()),
        };
        let trackset = Trackset {
            mask,
            bits,
            index: 0,
        };
        if mask & (1 << (bits - 1)) == 0 || mask.count_ones() != u32::from(count) {
            return Err(SenseCode::invalid_parameter().into());
        }
        let mut walk = trackset;
        let mut offset = 0;
        while let Some(delta) = walk.next() {
            offset += delta;
            let head = head + offset;
            let (cyl, head) = (cyl + head / self.heads, head % self.heads);
            if cyl >= self.cylinders || !self.state.extent.contains(cyl, head) {
                return Err(SenseCode::file_protected().into());
            }
        }
        Ok(trackset)
    }
}
