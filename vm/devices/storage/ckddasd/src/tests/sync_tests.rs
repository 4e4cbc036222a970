// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The synchronous path: CCWs that would block ask to be retried and leave
//! everything as it was.

use super::test_helpers::ckd;
use super::test_helpers::format_track;
use super::test_helpers::new_3390;
use super::test_helpers::pattern;
use super::test_helpers::record_id;
use super::test_helpers::seek_arg;
use super::test_helpers::Chain;
use super::test_helpers::TestDevice;
use super::test_helpers::CYLINDERS;
use super::test_helpers::DEVNUM;
use super::test_helpers::HEADS;
use crate::CkdDasd;
use crate::IoMode;
use crate::Orientation;
use ckd_cache::TrackCache;
use ckd_cache::TrackCacheConfig;
use ckd_defs::CcwOp;
use ckddasd_resources::CkdDeviceParameters;
use std::sync::Arc;

/// Formats a track through a device with its own cache, so `dev`'s cache
/// has never seen it.
fn format_uncached(dev: &TestDevice, cyl: u16, head: u16, records: &[&[u8]]) {
    let params = CkdDeviceParameters {
        devnum: DEVNUM,
        cylinders: Some(CYLINDERS),
        ..Default::default()
    };
    let cache = Arc::new(TrackCache::new(TrackCacheConfig::default()));
    let mut other = CkdDasd::new(&params, dev.storage.clone(), cache).unwrap();
    format_track(&mut other, cyl, head, records);
    other.close();
}

fn active_tracks(cache: &TrackCache) -> usize {
    cache.entries().iter().filter(|e| e.active).count()
}

#[test]
fn uncached_seek_retries_without_side_effects() {
    let mut dev = new_3390();
    let state = dev.dasd.channel_state().clone();
    let entries = dev.cache.entries();

    let mut chain = Chain::with_mode(&mut dev.dasd, IoMode::Synchronous);
    chain
        .try_ccw(CcwOp::SEEK, &mut seek_arg(1, 2), true)
        .unwrap_err();
    assert_eq!(*chain.dasd.channel_state(), state);
    assert_eq!(dev.cache.entries(), entries);
    assert_eq!(dev.storage.reads(), 0);

    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::SEEK, &mut seek_arg(1, 2));
    assert_eq!(chain.dasd.channel_state().orientation, Orientation::Index);
    assert_eq!(dev.storage.reads(), 1);
}

#[test]
fn pinned_track_runs_synchronously() {
    let mut dev = new_3390();
    format_track(&mut dev.dasd, 0, 0, &[&pattern(16, 1)]);

    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::SEEK, &mut seek_arg(0, 0));
    let reads = dev.storage.reads();

    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::SEEK, &mut seek_arg(0, 0));
    chain.set_mode(IoMode::Synchronous);
    let mut count = [0; 8];
    chain.ok(CcwOp::READ_COUNT, &mut count);
    assert_eq!(&count[..5], &record_id(0, 0, 1));
    let mut buf = [0; 16];
    chain.ok(CcwOp::READ_DATA, &mut buf);
    assert_eq!(buf[..], pattern(16, 1));
    assert_eq!(dev.storage.reads(), reads);
}

#[test]
fn cached_track_switch_runs_synchronously() {
    let mut dev = new_3390();
    format_track(&mut dev.dasd, 1, 1, &[&pattern(16, 4)]);
    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::SEEK, &mut seek_arg(1, 2));
    chain.end();
    let reads = dev.storage.reads();

    let mut chain = Chain::with_mode(&mut dev.dasd, IoMode::Synchronous);
    chain.ok(CcwOp::SEEK, &mut seek_arg(1, 1));
    let mut buf = [0; 16];
    chain.ok(CcwOp::READ_DATA, &mut buf);
    assert_eq!(buf[..], pattern(16, 4));
    // From one pinned track to another cached one.
    chain.ok(CcwOp::SEEK, &mut seek_arg(1, 2));
    assert_eq!(chain.dasd.current_track(), Some(HEADS + 2));
    chain.end();

    assert_eq!(dev.storage.reads(), reads);
    assert_eq!(active_tracks(&dev.cache), 0);
}

#[test]
fn track_switch_retries_then_completes_asynchronously() {
    let mut dev = new_3390();
    format_uncached(&dev, 0, 7, &[&pattern(8, 3)]);
    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::SEEK, &mut seek_arg(0, 6));
    chain.ok(CcwOp::SEEK, &mut seek_arg(0, 5));
    chain.set_mode(IoMode::Synchronous);

    let state = chain.dasd.channel_state().clone();
    let reads = dev.storage.reads();
    // Tracks 5 and 6 are empty. The multitrack read passes the cached
    // track 6 and misses on track 7.
    let mut buf = [0; 8];
    chain
        .try_ccw(CcwOp::READ_DATA_MT, &mut buf, true)
        .unwrap_err();
    assert_eq!(*chain.dasd.channel_state(), state);
    assert_eq!(chain.dasd.current_track(), Some(5));
    assert_eq!(dev.storage.reads(), reads);
    assert_eq!(active_tracks(&dev.cache), 1);

    chain.set_mode(IoMode::Asynchronous);
    chain.ok(CcwOp::READ_DATA_MT, &mut buf);
    assert_eq!(buf[..], pattern(8, 3));
    assert_eq!(chain.dasd.channel_state().position.head, 7);
    assert_eq!(chain.dasd.current_track(), Some(7));
    assert_eq!(dev.storage.reads(), reads + 1);
}

#[test]
fn dirty_track_switch_retries() {
    let mut dev = new_3390();
    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::SEEK, &mut seek_arg(2, 1));
    chain.end();

    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::SEEK, &mut seek_arg(2, 0));
    chain.ok(CcwOp::SEARCH_ID_EQUAL, &mut record_id(2, 0, 0));
    chain.ok(CcwOp::WRITE_CKD, &mut ckd(2, 0, 1, &[], &[7; 20]));
    chain.set_mode(IoMode::Synchronous);
    // Track (2,1) is cached, but leaving (2,0) needs a flush.
    chain
        .try_ccw(CcwOp::SEEK, &mut seek_arg(2, 1), true)
        .unwrap_err();
    assert_eq!(chain.dasd.current_track(), Some(2 * HEADS));
    assert_eq!(dev.storage.writes(), 0);

    chain.set_mode(IoMode::Asynchronous);
    chain.ok(CcwOp::SEEK, &mut seek_arg(2, 1));
    assert_eq!(dev.storage.writes(), 1);
}

#[test]
fn dirty_track_needs_asynchronous_end_of_chain() {
    let mut dev = new_3390();
    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::SEEK, &mut seek_arg(2, 0));
    chain.ok(CcwOp::SEARCH_ID_EQUAL, &mut record_id(2, 0, 0));
    chain.ok(CcwOp::WRITE_CKD, &mut ckd(2, 0, 1, &[], &[7; 20]));

    assert!(dev.dasd.end_chain(IoMode::Synchronous).is_err());
    assert_eq!(dev.storage.writes(), 0);
    assert!(dev.dasd.current_track().is_some());

    dev.dasd.end_chain(IoMode::Asynchronous).unwrap();
    assert_eq!(dev.storage.writes(), 1);
    assert!(dev.dasd.current_track().is_none());
}

#[test]
fn clean_track_ends_chain_synchronously() {
    let mut dev = new_3390();
    let mut chain = Chain::new(&mut dev.dasd);
    chain.ok(CcwOp::SEEK, &mut seek_arg(2, 0));
    dev.dasd.end_chain(IoMode::Synchronous).unwrap();
    assert!(dev.dasd.current_track().is_none());
    assert_eq!(dev.cache.entries().len(), 1);
}
