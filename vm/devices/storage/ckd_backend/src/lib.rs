// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Track storage for CKD volumes.
//!
//! The device model never touches files directly. It reads and writes whole
//! tracks (or byte ranges within a track) through [`TrackStorage`], which
//! hides how the volume is split across files or memory.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod file;
mod ram;
mod readwriteat;

pub use file::FileVolume;
pub use file::VolumeFile;
pub use file::DEFAULT_HEADER_SIZE;
pub use ram::RamVolume;

use thiserror::Error;

/// A storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The underlying file operation failed.
    #[error("track i/o failed")]
    Io(#[source] std::io::Error),
    /// The track number is past the end of the volume.
    #[error("track {track} is out of range (volume has {count} tracks)")]
    TrackOutOfRange {
        /// The requested track.
        track: u32,
        /// Tracks in the volume.
        count: u32,
    },
    /// A write range does not fit within one track.
    #[error("range {offset:#x}+{len:#x} does not fit in a track of {track_size:#x} bytes")]
    InvalidRange {
        /// Offset within the track.
        offset: usize,
        /// Length of the range.
        len: usize,
        /// The track size.
        track_size: usize,
    },
    /// The volume is read only.
    #[error("volume is read only")]
    ReadOnly,
    /// The file ended before the whole track was read.
    #[error("short read of track {track}")]
    ShortRead {
        /// The track being read.
        track: u32,
    },
}

/// Whole-track access to a CKD volume.
///
/// Tracks are numbered `cylinder * heads + head`. Every track occupies
/// exactly [`track_size`](Self::track_size) bytes.
pub trait TrackStorage: Send + Sync {
    /// Bytes per track image.
    fn track_size(&self) -> usize;

    /// Number of tracks in the volume.
    fn track_count(&self) -> u32;

    /// Whether writes are rejected.
    fn is_read_only(&self) -> bool;

    /// Reads the full track image into `buf`, which is exactly
    /// `track_size()` bytes long.
    fn read_track(&self, track: u32, buf: &mut [u8]) -> Result<(), StorageError>;

    /// Writes `data` at `offset` within the track.
    fn write_track(&self, track: u32, offset: usize, data: &[u8]) -> Result<(), StorageError>;
}

/// Validates a track number and write range against a volume's geometry.
fn check_range(
    track: u32,
    track_count: u32,
    offset: usize,
    len: usize,
    track_size: usize,
) -> Result<(), StorageError> {
    if track >= track_count {
        return Err(StorageError::TrackOutOfRange {
            track,
            count: track_count,
        });
    }
    if offset.checked_add(len).is_none_or(|end| end > track_size) {
        return Err(StorageError::InvalidRange {
            offset,
            len,
            track_size,
        });
    }
    Ok(())
}
