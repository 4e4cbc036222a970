// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Locate Record domains.

use super::test_helpers::ckd;
use super::test_helpers::define_extent;
use super::test_helpers::format_track;
use super::test_helpers::locate_record;
use super::test_helpers::new_3390;
use super::test_helpers::pattern;
use super::test_helpers::record_id;
use super::test_helpers::seek_arg;
use super::test_helpers::Chain;
use crate::Orientation;
use ckd_defs::locate::orientation;
use ckd_defs::sense::message;
use ckd_defs::sense::SENSE0_COMMAND_REJECT;
use ckd_defs::sense::SENSE0_OPERATION_INCOMPLETE;
use ckd_defs::sense::SENSE1_FILE_PROTECTED;
use ckd_defs::sense::SENSE1_INVALID_TRACK_FORMAT;
use ckd_defs::sense::SENSE1_NO_RECORD_FOUND;
use ckd_defs::CcwOp;

const OP_WRITE_DATA: u8 = 0x01;
const OP_FORMAT_WRITE: u8 = 0x03;
const OP_READ_DATA: u8 = 0x06;
const OP_WRITE_TRACK: u8 = 0x0B;
const OP_READ_TRACKS: u8 = 0x0C;
const OP_READ: u8 = 0x16;
const OP_EXTENDED: u8 = 0x3F;
const EXT_WRITE_ANY: u8 = 0x09;
const EXT_READ_ANY: u8 = 0x0A;
const EXT_READ_TRACKSET: u8 = 0x0E;

const AUX_TRANSFER_LENGTH_VALID: u8 = 0x80;
const AUX_READ_COUNT_SUFFIX: u8 = 0x01;

fn op(code: u8, orient: u8) -> u8 {
    (orient << 6) | code
}

fn whole_volume() -> Vec<u8> {
    define_extent(0, 4096, (0, 0), (9, 14))
}

/// Read Trackset parameters for a track bitmap starting at `seek`.
fn read_trackset(count: u8, seek: (u16, u16), mask: &[u8]) -> Vec<u8> {
    let mut out = locate_record(
        op(OP_EXTENDED, orientation::HOME),
        0,
        count,
        seek,
        [0; 5],
        0,
    );
    out.extend_from_slice(&[EXT_READ_TRACKSET, mask.len() as u8, 0, 0]);
    out.extend_from_slice(mask);
    out
}

/// Write Any or Read Any parameters for one record of
/// `transfer_length` bytes.
fn any_record(extended: u8, orient: u8, seek: (u16, u16), transfer_length: u16) -> Vec<u8> {
    let mut out = locate_record(
        op(OP_EXTENDED, orient),
        AUX_TRANSFER_LENGTH_VALID,
        1,
        seek,
        [0; 5],
        transfer_length,
    );
    out.extend_from_slice(&[extended, 1, 0, 0, 0]);
    out
}

/// Write Track parameters located on record zero of `seek`.
fn write_track(auxiliary: u8, count: u8, seek: (u16, u16), transfer_length: u16) -> Vec<u8> {
    locate_record(
        op(OP_WRITE_TRACK, orientation::COUNT),
        auxiliary,
        count,
        seek,
        record_id(seek.0, seek.1, 0),
        transfer_length,
    )
}

#[test]
fn locate_then_read_count() {
    let mut dev = new_3390();
    format_track(&mut dev.dasd, 2, 3, &[&pattern(32, 1), &pattern(32, 2)]);

    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::DEFINE_EXTENT, &mut whole_volume());
    chain.ok(
        CcwOp::LOCATE_RECORD,
        &mut locate_record(
            op(OP_READ, orientation::COUNT),
            0,
            1,
            (2, 3),
            record_id(2, 3, 2),
            0,
        ),
    );
    let mut count = [0; 8];
    let completion = chain.last(CcwOp::READ_COUNT, &mut count);
    assert!(!completion.unit_status.unit_check());
    assert_eq!(count, [0, 2, 0, 3, 2, 0, 0, 32]);

    let state = chain.dasd.channel_state();
    assert_eq!(state.orientation, Orientation::Count);
    assert_eq!(state.position.record, 2);
    assert!(state.locate.is_none());
    assert!(chain.dasd.sense().iter().all(|&b| b == 0));
}

#[test]
fn locate_read_data_domain() {
    let mut dev = new_3390();
    format_track(
        &mut dev.dasd,
        1,
        0,
        &[&pattern(16, 1), &pattern(16, 2), &pattern(16, 3)],
    );

    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::DEFINE_EXTENT, &mut whole_volume());
    chain.ok(
        CcwOp::LOCATE_RECORD,
        &mut locate_record(
            op(OP_READ_DATA, orientation::COUNT),
            0,
            2,
            (1, 0),
            record_id(1, 0, 2),
            0,
        ),
    );
    let mut buf = [0; 16];
    chain.ok(CcwOp::READ_DATA, &mut buf);
    assert_eq!(buf[..], pattern(16, 2));
    chain.last(CcwOp::READ_DATA, &mut buf);
    assert_eq!(buf[..], pattern(16, 3));
    assert!(chain.dasd.channel_state().locate.is_none());
}

#[test]
fn data_orientation_skips_located_record() {
    let mut dev = new_3390();
    format_track(&mut dev.dasd, 1, 1, &[&pattern(16, 1), &pattern(16, 2)]);

    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::DEFINE_EXTENT, &mut whole_volume());
    chain.ok(
        CcwOp::LOCATE_RECORD,
        &mut locate_record(
            op(OP_READ_DATA, orientation::DATA),
            0,
            1,
            (1, 1),
            record_id(1, 1, 1),
            0,
        ),
    );
    assert_eq!(chain.dasd.channel_state().orientation, Orientation::Data);
    let mut buf = [0; 16];
    chain.last(CcwOp::READ_DATA, &mut buf);
    assert_eq!(buf[..], pattern(16, 2));
}

#[test]
fn commands_outside_the_domain_operation_are_rejected() {
    let mut dev = new_3390();
    format_track(&mut dev.dasd, 0, 5, &[&pattern(16, 1)]);

    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::DEFINE_EXTENT, &mut whole_volume());
    chain.ok(
        CcwOp::LOCATE_RECORD,
        &mut locate_record(
            op(OP_READ_DATA, orientation::COUNT),
            0,
            1,
            (0, 5),
            record_id(0, 5, 1),
            0,
        ),
    );
    let sense = chain.check(CcwOp::READ_COUNT, &mut [0; 8]);
    assert_eq!(sense[0], SENSE0_COMMAND_REJECT);
    assert_eq!(sense[7], message::INVALID_SEQUENCE);
}

#[test]
fn write_data_domain_checks_transfer_length() {
    let mut dev = new_3390();
    format_track(&mut dev.dasd, 3, 3, &[&[0; 64], &[0; 32]]);

    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::DEFINE_EXTENT, &mut define_extent(0, 64, (0, 0), (9, 14)));
    chain.ok(
        CcwOp::LOCATE_RECORD,
        &mut locate_record(
            op(OP_WRITE_DATA, orientation::COUNT),
            AUX_TRANSFER_LENGTH_VALID,
            2,
            (3, 3),
            record_id(3, 3, 1),
            64,
        ),
    );
    chain.ok(CcwOp::WRITE_DATA, &mut [0xAB; 64]);
    // Record 2 holds 32 bytes, not the 64 the domain was set up for.
    let sense = chain.check(CcwOp::WRITE_DATA, &mut [0xCD; 64]);
    assert_eq!(sense[1] & SENSE1_INVALID_TRACK_FORMAT, SENSE1_INVALID_TRACK_FORMAT);
    chain.end();

    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::DEFINE_EXTENT, &mut whole_volume());
    chain.ok(
        CcwOp::LOCATE_RECORD,
        &mut locate_record(
            op(OP_READ_DATA, orientation::COUNT),
            0,
            1,
            (3, 3),
            record_id(3, 3, 1),
            0,
        ),
    );
    let mut buf = [0; 64];
    chain.last(CcwOp::READ_DATA, &mut buf);
    assert_eq!(buf, [0xAB; 64]);
}

#[test]
fn format_write_domain_writes_after_record_zero() {
    let mut dev = new_3390();
    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::DEFINE_EXTENT, &mut define_extent(0, 48, (0, 0), (9, 14)));
    chain.ok(
        CcwOp::LOCATE_RECORD,
        &mut locate_record(
            op(OP_FORMAT_WRITE, orientation::INDEX),
            AUX_TRANSFER_LENGTH_VALID,
            2,
            (6, 6),
            [0; 5],
            48,
        ),
    );
    chain.ok(
        CcwOp::WRITE_CKD,
        &mut ckd(6, 6, 1, &[], &pattern(48, 1)),
    );
    chain.last(
        CcwOp::WRITE_CKD,
        &mut ckd(6, 6, 2, &[], &pattern(48, 2)),
    );
    chain.end();

    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::SEEK, &mut seek_arg(6, 6));
    let mut count = [0; 8];
    chain.ok(CcwOp::READ_COUNT, &mut count);
    assert_eq!(count, [0, 6, 0, 6, 1, 0, 0, 48]);
    let mut buf = [0; 48];
    chain.ok(CcwOp::READ_DATA, &mut buf);
    chain.ok(CcwOp::READ_DATA, &mut buf);
    assert_eq!(buf[..], pattern(48, 2));
}

#[test]
fn write_track_domain_continues_on_next_track() {
    let mut dev = new_3390();
    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::DEFINE_EXTENT, &mut whole_volume());
    chain.ok(
        CcwOp::LOCATE_RECORD,
        &mut write_track(AUX_TRANSFER_LENGTH_VALID, 2, (2, 0), 32),
    );
    chain.ok(CcwOp::WRITE_CKD, &mut ckd(2, 0, 1, &[], &pattern(32, 1)));
    let completion = chain.last(
        CcwOp::WRITE_CKD_NEXT_TRACK,
        &mut ckd(2, 1, 1, &[], &pattern(32, 2)),
    );
    assert!(!completion.unit_status.unit_check());
    assert_eq!(chain.dasd.current_track(), Some(2 * 15 + 1));
    assert!(chain.dasd.channel_state().locate.is_none());
    chain.end();

    for (head, seed) in [(0, 1), (1, 2)] {
        let mut chain = Chain::new(&mut dev.dasd);
        chain.ok(CcwOp::SEEK, &mut seek_arg(2, head));
        let mut count = [0; 8];
        chain.ok(CcwOp::READ_COUNT, &mut count);
        assert_eq!(count, [0, 2, 0, head as u8, 1, 0, 0, 32]);
        let mut buf = [0; 32];
        chain.ok(CcwOp::READ_DATA, &mut buf);
        assert_eq!(buf[..], pattern(32, seed));
        chain.end();
    }
}

#[test]
fn write_ckd_next_track_needs_write_track_domain() {
    let mut dev = new_3390();

    // Outside any domain, whatever the file mask allows.
    for mask in [0x40, 0xC0] {
        let mut chain = Chain::new(&mut dev.dasd);
        chain.ok(CcwOp::SET_FILE_MASK, &mut [mask]);
        chain.ok(CcwOp::SEEK, &mut seek_arg(0, 0));
        let sense = chain.check(
            CcwOp::WRITE_CKD_NEXT_TRACK,
            &mut ckd(0, 1, 1, &[], &[0xAB; 32]),
        );
        assert_eq!(sense[0], SENSE0_COMMAND_REJECT);
        assert_eq!(sense[7], message::INVALID_SEQUENCE);
        assert_eq!(chain.dasd.channel_state().position.head, 0);
        chain.end();
    }

    // Inside a Format Write domain.
    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::DEFINE_EXTENT, &mut define_extent(0, 32, (0, 0), (9, 14)));
    chain.ok(
        CcwOp::LOCATE_RECORD,
        &mut locate_record(
            op(OP_FORMAT_WRITE, orientation::INDEX),
            0,
            1,
            (0, 0),
            [0; 5],
            0,
        ),
    );
    let sense = chain.check(
        CcwOp::WRITE_CKD_NEXT_TRACK,
        &mut ckd(0, 1, 1, &[], &[0xAB; 32]),
    );
    assert_eq!(sense[7], message::INVALID_SEQUENCE);
    chain.end();

    assert_eq!(dev.storage.writes(), 0);
    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::SEEK, &mut seek_arg(0, 1));
    let sense = chain.check(CcwOp::READ_DATA, &mut [0; 32]);
    assert_eq!(sense[1] & SENSE1_NO_RECORD_FOUND, SENSE1_NO_RECORD_FOUND);
}

#[test]
fn write_track_needs_format_write_authority() {
    let mut dev = new_3390();
    let mut chain = Chain::new(&mut dev.dasd);
    // Update writes only.
    chain.ok(CcwOp::DEFINE_EXTENT, &mut define_extent(0x80, 32, (0, 0), (9, 14)));
    let sense = chain.check(CcwOp::LOCATE_RECORD, &mut write_track(0, 2, (0, 0), 0));
    assert_eq!(sense[1] & SENSE1_FILE_PROTECTED, SENSE1_FILE_PROTECTED);
}

#[test]
fn read_count_suffix_ends_write_track_domain() {
    let mut dev = new_3390();
    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::DEFINE_EXTENT, &mut whole_volume());
    chain.ok(
        CcwOp::LOCATE_RECORD,
        &mut write_track(
            AUX_TRANSFER_LENGTH_VALID | AUX_READ_COUNT_SUFFIX,
            2,
            (4, 4),
            16,
        ),
    );
    chain.ok(CcwOp::WRITE_CKD, &mut ckd(4, 4, 1, &[], &pattern(16, 1)));
    let mut count = [0; 8];
    let completion = chain.last(CcwOp::READ_COUNT, &mut count);
    assert!(!completion.unit_status.unit_check());
    assert_eq!(count, [0, 4, 0, 4, 1, 0, 0, 16]);
    chain.end();

    // Without the suffix bit the domain only takes writes.
    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::DEFINE_EXTENT, &mut whole_volume());
    chain.ok(
        CcwOp::LOCATE_RECORD,
        &mut write_track(AUX_TRANSFER_LENGTH_VALID, 2, (4, 4), 16),
    );
    chain.ok(CcwOp::WRITE_CKD, &mut ckd(4, 4, 1, &[], &pattern(16, 2)));
    let sense = chain.check(CcwOp::READ_COUNT, &mut [0; 8]);
    assert_eq!(sense[7], message::INVALID_SEQUENCE);
    chain.end();

    // Nor may a data-only domain ask for it.
    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::DEFINE_EXTENT, &mut whole_volume());
    let sense = chain.check(
        CcwOp::LOCATE_RECORD,
        &mut locate_record(
            op(OP_READ_DATA, orientation::COUNT),
            AUX_READ_COUNT_SUFFIX,
            2,
            (4, 4),
            record_id(4, 4, 1),
            0,
        ),
    );
    assert_eq!(sense[7], message::INVALID_PARAMETER);
}

#[test]
fn read_tracks_domain_reads_consecutive_tracks() {
    let mut dev = new_3390();
    format_track(&mut dev.dasd, 0, 2, &[&pattern(24, 2)]);

    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::DEFINE_EXTENT, &mut whole_volume());
    chain.ok(
        CcwOp::LOCATE_RECORD,
        &mut locate_record(
            op(OP_READ_TRACKS, orientation::HOME),
            0,
            2,
            (0, 1),
            record_id(0, 1, 0),
            0,
        ),
    );
    let mut buf = vec![0; 128];
    let completion = chain.ok(CcwOp::READ_TRACK, &mut buf);
    assert_eq!(completion.residual, 128 - 16);
    assert_eq!(&buf[..8], &[0, 0, 0, 1, 0, 0, 0, 8]);

    let completion = chain.last(CcwOp::READ_TRACK, &mut buf);
    assert!(!completion.unit_status.unit_check());
    assert_eq!(completion.residual, 128 - (16 + 8 + 24));
    assert_eq!(&buf[16..24], &[0, 0, 0, 2, 1, 0, 0, 24]);
    assert_eq!(buf[24..48], pattern(24, 2));
    chain.end();

    // Only Read Track belongs in the domain.
    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::DEFINE_EXTENT, &mut whole_volume());
    chain.ok(
        CcwOp::LOCATE_RECORD,
        &mut locate_record(
            op(OP_READ_TRACKS, orientation::HOME),
            0,
            2,
            (0, 1),
            record_id(0, 1, 0),
            0,
        ),
    );
    let sense = chain.check(CcwOp::READ_COUNT, &mut [0; 8]);
    assert_eq!(sense[7], message::INVALID_SEQUENCE);
    chain.end();

    // And Read Track only belongs in a domain.
    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::SEEK, &mut seek_arg(0, 2));
    let sense = chain.check(CcwOp::READ_TRACK, &mut buf);
    assert_eq!(sense[7], message::INVALID_SEQUENCE);
}

#[test]
fn read_any_reads_without_a_search() {
    let mut dev = new_3390();
    format_track(&mut dev.dasd, 0, 3, &[&pattern(16, 5)]);

    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::DEFINE_EXTENT, &mut whole_volume());
    chain.ok(
        CcwOp::LOCATE_RECORD_EXTENDED,
        &mut any_record(EXT_READ_ANY, orientation::COUNT, (0, 3), 16),
    );
    assert_eq!(chain.dasd.channel_state().orientation, Orientation::Index);
    let mut buf = [0; 16];
    chain.last(CcwOp::READ_DATA, &mut buf);
    assert_eq!(buf[..], pattern(16, 5));
    chain.end();

    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::DEFINE_EXTENT, &mut whole_volume());
    chain.ok(
        CcwOp::LOCATE_RECORD_EXTENDED,
        &mut any_record(EXT_READ_ANY, orientation::COUNT, (0, 3), 16),
    );
    let sense = chain.check(CcwOp::WRITE_DATA, &mut [0; 16]);
    assert_eq!(sense[7], message::INVALID_SEQUENCE);
    chain.end();

    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::DEFINE_EXTENT, &mut whole_volume());
    let sense = chain.check(
        CcwOp::LOCATE_RECORD_EXTENDED,
        &mut any_record(EXT_READ_ANY, orientation::HOME, (0, 3), 16),
    );
    assert_eq!(sense[7], message::INVALID_PARAMETER);
}

#[test]
fn write_any_updates_first_record() {
    let mut dev = new_3390();
    format_track(&mut dev.dasd, 0, 4, &[&[0; 16]]);

    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::DEFINE_EXTENT, &mut define_extent(0, 16, (0, 0), (9, 14)));
    chain.ok(
        CcwOp::LOCATE_RECORD_EXTENDED,
        &mut any_record(EXT_WRITE_ANY, orientation::COUNT, (0, 4), 16),
    );
    chain.last(CcwOp::WRITE_DATA, &mut [0x5A; 16]);
    chain.end();

    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::SEEK, &mut seek_arg(0, 4));
    let mut buf = [0; 16];
    chain.ok(CcwOp::READ_DATA, &mut buf);
    assert_eq!(buf, [0x5A; 16]);
    chain.end();

    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::DEFINE_EXTENT, &mut define_extent(0, 16, (0, 0), (9, 14)));
    let sense = chain.check(
        CcwOp::LOCATE_RECORD_EXTENDED,
        &mut any_record(EXT_WRITE_ANY, orientation::INDEX, (0, 4), 16),
    );
    assert_eq!(sense[7], message::INVALID_PARAMETER);
    chain.end();

    // Write Any is refused when the mask inhibits writes.
    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::DEFINE_EXTENT, &mut define_extent(0x40, 16, (0, 0), (9, 14)));
    let sense = chain.check(
        CcwOp::LOCATE_RECORD_EXTENDED,
        &mut any_record(EXT_WRITE_ANY, orientation::COUNT, (0, 4), 16),
    );
    assert_eq!(sense[1] & SENSE1_FILE_PROTECTED, SENSE1_FILE_PROTECTED);
}

#[test]
fn locate_without_match_is_no_record_found() {
    let mut dev = new_3390();
    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::DEFINE_EXTENT, &mut whole_volume());
    let sense = chain.check(
        CcwOp::LOCATE_RECORD,
        &mut locate_record(
            op(OP_READ, orientation::COUNT),
            0,
            1,
            (0, 0),
            record_id(0, 0, 5),
            0,
        ),
    );
    assert_eq!(sense[1] & SENSE1_NO_RECORD_FOUND, SENSE1_NO_RECORD_FOUND);
    assert!(chain.dasd.channel_state().locate.is_none());
}

#[test]
fn locate_needs_define_extent() {
    let mut dev = new_3390();
    let mut chain = Chain::new(&mut dev.dasd);
    let sense = chain.check(
        CcwOp::LOCATE_RECORD,
        &mut locate_record(
            op(OP_READ, orientation::COUNT),
            0,
            1,
            (0, 0),
            record_id(0, 0, 0),
            0,
        ),
    );
    assert_eq!(sense[7], message::INVALID_SEQUENCE);
}

#[test]
fn locate_validates_parameters() {
    let mut dev = new_3390();
    let cases = [
        // Zero count with a real operation.
        locate_record(op(OP_READ, orientation::COUNT), 0, 0, (0, 0), [0; 5], 0),
        // Index orientation only formats or reads.
        locate_record(op(OP_READ_DATA, orientation::INDEX), 0, 1, (0, 0), [0; 5], 0),
        // Transfer length factor without the auxiliary bit.
        locate_record(op(OP_READ, orientation::COUNT), 0, 1, (0, 0), [0; 5], 8),
        // Transfer length factor above the block size.
        locate_record(
            op(OP_READ, orientation::COUNT),
            AUX_TRANSFER_LENGTH_VALID,
            1,
            (0, 0),
            [0; 5],
            8192,
        ),
        // Read count suffix with a one-record domain.
        locate_record(op(OP_READ, orientation::COUNT), 0x01, 1, (0, 0), [0; 5], 0),
        // Seek past the end of the volume.
        locate_record(op(OP_READ, orientation::COUNT), 0, 1, (10, 0), [0; 5], 0),
    ];
    for mut params in cases {
        let mut chain = Chain::new(&mut dev.dasd);
        chain.ok(CcwOp::DEFINE_EXTENT, &mut whole_volume());
        let sense = chain.check(CcwOp::LOCATE_RECORD, &mut params);
        assert_eq!(sense[0], SENSE0_COMMAND_REJECT, "{params:02x?}");
        assert_eq!(sense[7], message::INVALID_PARAMETER, "{params:02x?}");
    }
}

#[test]
fn locate_outside_extent_is_file_protected() {
    let mut dev = new_3390();
    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::DEFINE_EXTENT, &mut define_extent(0, 4096, (1, 0), (1, 14)));
    let sense = chain.check(
        CcwOp::LOCATE_RECORD,
        &mut locate_record(op(OP_READ, orientation::COUNT), 0, 1, (2, 0), [0; 5], 0),
    );
    assert_eq!(sense[1] & SENSE1_FILE_PROTECTED, SENSE1_FILE_PROTECTED);
}

#[test]
fn unchained_domain_is_incomplete() {
    let mut dev = new_3390();
    format_track(&mut dev.dasd, 0, 1, &[&pattern(8, 1), &pattern(8, 2)]);

    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::DEFINE_EXTENT, &mut whole_volume());
    chain.ok(
        CcwOp::LOCATE_RECORD,
        &mut locate_record(
            op(OP_READ, orientation::COUNT),
            0,
            2,
            (0, 1),
            record_id(0, 1, 1),
            0,
        ),
    );
    let completion = chain.last(CcwOp::READ_DATA, &mut [0; 8]);
    assert!(completion.unit_status.unit_check());
    let sense = chain.dasd.sense();
    assert_eq!(
        sense[0],
        SENSE0_COMMAND_REJECT | SENSE0_OPERATION_INCOMPLETE
    );
}

#[test]
fn locate_inside_domain_is_rejected() {
    let mut dev = new_3390();
    format_track(&mut dev.dasd, 0, 1, &[&pattern(8, 1)]);
    let mut params = locate_record(
        op(OP_READ, orientation::COUNT),
        0,
        2,
        (0, 1),
        record_id(0, 1, 1),
        0,
    );
    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::DEFINE_EXTENT, &mut whole_volume());
    chain.ok(CcwOp::LOCATE_RECORD, &mut params.clone());
    let sense = chain.check(CcwOp::LOCATE_RECORD, &mut params);
    assert_eq!(sense[7], message::INVALID_SEQUENCE);
}

#[test]
fn trackset_without_leading_bit_is_rejected() {
    let mut dev = new_3390();
    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::DEFINE_EXTENT, &mut whole_volume());
    let sense = chain.check(
        CcwOp::LOCATE_RECORD_EXTENDED,
        &mut read_trackset(1, (0, 0), &[0x40]),
    );
    assert_eq!(sense[0], SENSE0_COMMAND_REJECT);
    assert_eq!(sense[7], 0x04);
}

#[test]
fn trackset_count_must_match_bitmap() {
    let mut dev = new_3390();
    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::DEFINE_EXTENT, &mut whole_volume());
    let sense = chain.check(
        CcwOp::LOCATE_RECORD_EXTENDED,
        &mut read_trackset(3, (0, 0), &[0xA0]),
    );
    assert_eq!(sense[7], message::INVALID_PARAMETER);
}

#[test]
fn trackset_reads_selected_tracks() {
    let mut dev = new_3390();
    format_track(&mut dev.dasd, 0, 2, &[&pattern(24, 2)]);

    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::DEFINE_EXTENT, &mut whole_volume());
    chain.ok(
        CcwOp::LOCATE_RECORD_EXTENDED,
        &mut read_trackset(2, (0, 0), &[0xA0]),
    );

    let mut buf = vec![0; 128];
    let completion = chain.ok(CcwOp::READ_TRACK, &mut buf);
    // Record zero only.
    assert_eq!(completion.residual, 128 - 16);
    assert_eq!(&buf[..8], &[0, 0, 0, 0, 0, 0, 0, 8]);

    let completion = chain.last(CcwOp::READ_TRACK, &mut buf);
    assert!(!completion.unit_status.unit_check());
    assert_eq!(completion.residual, 128 - (16 + 8 + 24));
    assert_eq!(&buf[..8], &[0, 0, 0, 2, 0, 0, 0, 8]);
    assert_eq!(&buf[16..24], &[0, 0, 0, 2, 1, 0, 0, 24]);
    assert_eq!(buf[24..48], pattern(24, 2));
    assert!(chain.dasd.channel_state().locate.is_none());
}

#[test]
fn trackset_outside_extent_is_file_protected() {
    let mut dev = new_3390();
    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::DEFINE_EXTENT, &mut define_extent(0, 4096, (0, 0), (0, 3)));
    let sense = chain.check(
        CcwOp::LOCATE_RECORD_EXTENDED,
        &mut read_trackset(2, (0, 0), &[0x81]),
    );
    assert_eq!(sense[1] & SENSE1_FILE_PROTECTED, SENSE1_FILE_PROTECTED);
}
