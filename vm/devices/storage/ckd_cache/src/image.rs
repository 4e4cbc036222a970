// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-memory track images and bounded cursors over them.

use ckd_backend::StorageError;
use ckd_backend::TrackStorage;
use ckd_defs::track::track_len;
use std::ops::Range;
use thiserror::Error;

/// An access outside the meaningful part of a track image.
#[derive(Debug, Error)]
#[error("track access {offset:#x}+{len:#x} beyond {limit:#x}")]
pub struct TrackBoundsError {
    pub offset: usize,
    pub len: usize,
    pub limit: usize,
}

/// The bytes of one track, how many of them are meaningful, and which range
/// has been modified since the last flush.
#[derive(Debug)]
pub struct TrackImage {
    bytes: Vec<u8>,
    valid_len: usize,
    dirty: Option<Range<usize>>,
}

impl TrackImage {
    pub(crate) fn new(bytes: Vec<u8>) -> Self {
        let valid_len = track_len(&bytes, bytes.len());
        Self {
            bytes,
            valid_len,
            dirty: None,
        }
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Total track image size.
    pub fn track_size(&self) -> usize {
        self.bytes.len()
    }

    /// Bytes up to and including the end-of-track marker.
    pub fn valid_len(&self) -> usize {
        self.valid_len
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.is_some()
    }

    pub fn dirty_range(&self) -> Option<Range<usize>> {
        self.dirty.clone()
    }

    /// Returns `len` bytes at `offset`, which must lie within the valid
    /// length.
    pub fn read(&self, offset: usize, len: usize) -> Result<&[u8], TrackBoundsError> {
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= self.valid_len)
            .ok_or(TrackBoundsError {
                offset,
                len,
                limit: self.valid_len,
            })?;
        Ok(&self.bytes[offset..end])
    }

    /// Overwrites bytes at `offset`, which must lie within the track size,
    /// and widens the dirty range to cover them.
    pub fn update(&mut self, offset: usize, data: &[u8]) -> Result<(), TrackBoundsError> {
        let end = offset
            .checked_add(data.len())
            .filter(|&end| end <= self.bytes.len())
            .ok_or(TrackBoundsError {
                offset,
                len: data.len(),
                limit: self.bytes.len(),
            })?;
        self.bytes[offset..end].copy_from_slice(data);
        self.dirty = Some(match self.dirty.take() {
            Some(dirty) => dirty.start.min(offset)..dirty.end.max(end),
            None => offset..end,
        });
        self.valid_len = track_len(&self.bytes, self.bytes.len());
        Ok(())
    }

    /// Writes exactly the dirty range back to `storage`.
    pub fn flush(&mut self, track: u32, storage: &dyn TrackStorage) -> Result<(), StorageError> {
        if let Some(dirty) = self.dirty.clone() {
            tracing::trace!(track, start = dirty.start, end = dirty.end, "flushing track");
            storage.write_track(track, dirty.start, &self.bytes[dirty.clone()])?;
            self.dirty = None;
        }
        Ok(())
    }
}

/// A position within a track image.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct TrackCursor {
    offset: usize,
}

impl TrackCursor {
    pub fn at(offset: usize) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn advance(&mut self, n: usize) {
        self.offset += n;
    }

    /// Reads `len` bytes at the cursor and moves past them.
    pub fn take<'a>(
        &mut self,
        image: &'a TrackImage,
        len: usize,
    ) -> Result<&'a [u8], TrackBoundsError> {
        let bytes = image.read(self.offset, len)?;
        self.offset += len;
        Ok(bytes)
    }
}
