// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Sense byte construction.

use crate::error::SenseCode;
use crate::state::DeviceChannelState;
use crate::tables::DeviceType;
use ckd_defs::sense::format;
use ckd_defs::sense::SENSE1_IMPRECISE_ENDING;
use ckd_defs::sense::SENSE27_COMPATIBLE;
use ckd_defs::sense::SENSE_SIZE;

/// Cylinder numbers above this do not fit the 24-byte sense layout.
const MAX_COMPATIBLE_CYLINDER: u32 = 4095;

/// Lays out `code` as sense bytes using the position in `state`.
pub(crate) fn build_sense(
    state: &DeviceChannelState,
    device: &DeviceType,
    devnum: u16,
    cylinders: u32,
    code: SenseCode,
) -> [u8; SENSE_SIZE] {
    let mut sense = [0; SENSE_SIZE];
    let pos = &state.position;

    sense[0] = code.sense0;
    sense[1] = code.sense1;
    sense[2] = code.sense2;
    if code.sense1 & SENSE1_IMPRECISE_ENDING != 0 {
        sense[3] = state.locate.map_or(0, |locate| locate.count);
    }
    sense[4] = device.sense.byte4(devnum);
    if cylinders > MAX_COMPATIBLE_CYLINDER {
        sense[5] = 0xFF;
        sense[6] = 0xFF;
    } else {
        sense[5] = pos.cyl as u8;
        sense[6] = device.sense.byte6(pos.cyl, pos.head);
    }
    sense[7] = (code.format << 4) | (code.message & 0x0F);
    if matches!(
        code.format,
        format::DATA_CHECK | format::DATA_CHECK_WITH_DISPLACEMENT
    ) {
        sense[8..10].copy_from_slice(&(pos.cyl as u16).to_be_bytes());
        sense[10..12].copy_from_slice(&(pos.head as u16).to_be_bytes());
        sense[12] = pos.record;
    }
    sense[27] = SENSE27_COMPATIBLE;
    sense[29..31].copy_from_slice(&(pos.cyl as u16).to_be_bytes());
    sense[31] = pos.head as u8;
    sense
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::DomainOperation;
    use crate::state::LocateState;
    use crate::state::Position;
    use crate::tables::device_type;
    use ckd_defs::locate::LocateAuxiliary;

    fn state_at(cyl: u32, head: u32, record: u8) -> DeviceChannelState {
        let mut state = DeviceChannelState::new(2000, 15);
        state.position = Position {
            cyl,
            head,
            record,
            key_len: 0,
            data_len: 0,
        };
        state
    }

    #[test]
    fn command_reject_layout() {
        let device = device_type(0x3390, None).unwrap();
        let state = state_at(0x234, 7, 3);
        let sense = build_sense(
            &state,
            device,
            0x0191,
            1113,
            SenseCode::invalid_parameter(),
        );
        assert_eq!(sense[0], 0x80);
        assert_eq!(sense[3], 0);
        assert_eq!(sense[4], 0x11);
        assert_eq!(sense[5], 0x34);
        assert_eq!(sense[6], 0x27);
        assert_eq!(sense[7], 0x04);
        assert_eq!(&sense[8..13], &[0; 5]);
        assert_eq!(sense[27], 0x80);
        assert_eq!(&sense[29..32], &[0x02, 0x34, 7]);
    }

    #[test]
    fn large_volume_hides_cylinder() {
        let device = device_type(0x3390, Some(0x0C)).unwrap();
        let state = state_at(5000, 1, 0);
        let sense = build_sense(&state, device, 0, 10017, SenseCode::no_record_found());
        assert_eq!(&sense[5..7], &[0xFF, 0xFF]);
        assert_eq!(sense[1], 0x08);
        assert_eq!(&sense[29..32], &[0x13, 0x88, 1]);
    }

    #[test]
    fn head_only_devices() {
        let device = device_type(0x2314, None).unwrap();
        let state = state_at(150, 19, 0);
        let sense = build_sense(&state, device, 0x235, 200, SenseCode::file_protected());
        assert_eq!(sense[4], 0x05);
        assert_eq!(sense[5], 150);
        assert_eq!(sense[6], 19);
        assert_eq!(sense[1], 0x04);
    }

    #[test]
    fn data_check_carries_record_id() {
        let device = device_type(0x3380, None).unwrap();
        let state = state_at(0x101, 14, 9);
        let code = SenseCode {
            sense0: ckd_defs::sense::SENSE0_DATA_CHECK,
            sense1: 0,
            sense2: 0,
            format: format::DATA_CHECK,
            message: 0,
        };
        let sense = build_sense(&state, device, 0x12, 885, code);
        assert_eq!(sense[7], 0x40);
        assert_eq!(&sense[8..13], &[0x01, 0x01, 0x00, 0x0E, 9]);
    }

    #[test]
    fn imprecise_ending_reports_domain_count() {
        let device = device_type(0x3390, None).unwrap();
        let mut state = state_at(1, 1, 1);
        state.locate = Some(LocateState {
            operation: DomainOperation::Read,
            auxiliary: LocateAuxiliary::new(),
            count: 6,
            transfer_length_factor: 0,
            trackset: None,
            count_pending: false,
        });
        let sense = build_sense(
            &state,
            device,
            0,
            1113,
            SenseCode::file_protected().imprecise(),
        );
        assert_eq!(sense[1], 0x05);
        assert_eq!(sense[3], 6);
    }
}
