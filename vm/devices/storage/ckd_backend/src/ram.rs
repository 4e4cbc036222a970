// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! RAM-backed CKD volumes.

use crate::check_range;
use crate::StorageError;
use crate::TrackStorage;
use ckd_defs::track::format_null_track;
use parking_lot::RwLock;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// A volume held in memory.
///
/// Only tracks that have been written take up space. Every other track reads
/// back as a freshly formatted null track.
#[derive(Debug)]
pub struct RamVolume {
    tracks: RwLock<BTreeMap<u32, Box<[u8]>>>,
    heads: u32,
    track_count: u32,
    track_size: usize,
    read_only: bool,
}

impl RamVolume {
    /// Creates an empty volume of `cylinders * heads` tracks.
    pub fn new(cylinders: u32, heads: u32, track_size: usize, read_only: bool) -> Self {
        Self {
            tracks: RwLock::new(BTreeMap::new()),
            heads,
            track_count: cylinders * heads,
            track_size,
            read_only,
        }
    }

    /// Number of tracks that have been written.
    pub fn committed_tracks(&self) -> usize {
        self.tracks.read().len()
    }

    fn null_track(&self, track: u32, buf: &mut [u8]) {
        format_null_track(
            buf,
            (track / self.heads) as u16,
            (track % self.heads) as u16,
        );
    }
}

impl TrackStorage for RamVolume {
    fn track_size(&self) -> usize {
        self.track_size
    }

    fn track_count(&self) -> u32 {
        self.track_count
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn read_track(&self, track: u32, buf: &mut [u8]) -> Result<(), StorageError> {
        check_range(track, self.track_count, 0, buf.len(), self.track_size)?;
        match self.tracks.read().get(&track) {
            Some(data) => buf.copy_from_slice(&data[..buf.len()]),
            None => self.null_track(track, buf),
        }
        Ok(())
    }

    fn write_track(&self, track: u32, offset: usize, data: &[u8]) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        check_range(track, self.track_count, offset, data.len(), self.track_size)?;
        let mut tracks = self.tracks.write();
        let image = match tracks.entry(track) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let mut image = vec![0; self.track_size].into_boxed_slice();
                self.null_track(track, &mut image);
                entry.insert(image)
            }
        };
        image[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }
}
