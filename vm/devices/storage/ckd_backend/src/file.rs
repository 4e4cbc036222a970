// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! File-backed CKD volumes spanning one or more image files.

use crate::check_range;
use crate::readwriteat::ReadWriteAt;
use crate::StorageError;
use crate::TrackStorage;
use ckd_defs::track::format_null_track;
use std::fs;

/// Bytes reserved at the start of each image file before track 0 of that
/// file.
pub const DEFAULT_HEADER_SIZE: u64 = 512;

/// One image file and the number of tracks it holds.
#[derive(Debug)]
pub struct VolumeFile {
    file: fs::File,
    tracks: u32,
}

impl VolumeFile {
    /// Wraps `file`, which holds `tracks` consecutive tracks.
    pub fn new(file: fs::File, tracks: u32) -> Self {
        Self { file, tracks }
    }
}

#[derive(Debug)]
struct Segment {
    file: fs::File,
    /// First track of the next segment.
    high_track: u32,
}

/// A volume stored as consecutive tracks across several files.
///
/// Each file starts with a header of `header_size` bytes that this type
/// leaves alone. A track number is mapped to a file by the cumulative track
/// boundaries of the files that precede it.
#[derive(Debug)]
pub struct FileVolume {
    segments: Vec<Segment>,
    track_size: usize,
    header_size: u64,
    read_only: bool,
}

impl FileVolume {
    /// Creates a volume over `files`, in track order.
    pub fn new(
        files: Vec<VolumeFile>,
        track_size: usize,
        header_size: u64,
        read_only: bool,
    ) -> Self {
        let mut high_track = 0;
        let segments = files
            .into_iter()
            .map(|VolumeFile { file, tracks }| {
                high_track += tracks;
                Segment { file, high_track }
            })
            .collect();
        Self {
            segments,
            track_size,
            header_size,
            read_only,
        }
    }

    /// Writes the header area and `tracks` null tracks to `file`, starting
    /// at volume track `first_track`.
    pub fn format_file(
        file: &fs::File,
        header_size: u64,
        first_track: u32,
        tracks: u32,
        heads: u32,
        track_size: usize,
    ) -> std::io::Result<()> {
        file.write_all_at(&vec![0; header_size as usize], 0)?;
        let mut buf = vec![0; track_size];
        for i in 0..tracks {
            let track = first_track + i;
            format_null_track(&mut buf, (track / heads) as u16, (track % heads) as u16);
            file.write_all_at(&buf, header_size + u64::from(i) * track_size as u64)?;
        }
        Ok(())
    }

    /// Returns the file and byte offset holding `track`.
    fn locate(&self, track: u32) -> Result<(&fs::File, u64), StorageError> {
        let index = self
            .segments
            .partition_point(|segment| segment.high_track <= track);
        let segment = self
            .segments
            .get(index)
            .ok_or(StorageError::TrackOutOfRange {
                track,
                count: self.track_count(),
            })?;
        let base = index
            .checked_sub(1)
            .map_or(0, |prev| self.segments[prev].high_track);
        let offset = self.header_size + u64::from(track - base) * self.track_size as u64;
        Ok((&segment.file, offset))
    }
}

impl TrackStorage for FileVolume {
    fn track_size(&self) -> usize {
        self.track_size
    }

    fn track_count(&self) -> u32 {
        self.segments.last().map_or(0, |segment| segment.high_track)
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn read_track(&self, track: u32, buf: &mut [u8]) -> Result<(), StorageError> {
        check_range(track, self.track_count(), 0, buf.len(), self.track_size)?;
        let (file, offset) = self.locate(track)?;
        let n = file.read_full_at(buf, offset).map_err(StorageError::Io)?;
        if n < buf.len() {
            tracing::warn!(track, n, "short read from volume file");
            return Err(StorageError::ShortRead { track });
        }
        Ok(())
    }

    fn write_track(&self, track: u32, offset: usize, data: &[u8]) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        check_range(track, self.track_count(), offset, data.len(), self.track_size)?;
        let (file, base) = self.locate(track)?;
        file.write_all_at(data, base + offset as u64)
            .map_err(StorageError::Io)
    }
}
