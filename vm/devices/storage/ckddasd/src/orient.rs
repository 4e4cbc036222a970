// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Movement through tracks: seeks, multitrack advance, and reading and
//! writing count, key and data fields at the current orientation.
//!
//! Nothing here writes to a track and then moves to another one within the
//! same call, so a retry raised by a track switch never follows a track
//! modification in the same CCW.

use crate::error::DasdError;
use crate::error::SenseCode;
use crate::state::Orientation;
use crate::state::Position;
use crate::CkdDasd;
use ckd_cache::AcquireError;
use ckd_cache::CacheError;
use ckd_cache::CacheKey;
use ckd_cache::PinnedTrack;
use ckd_cache::RetryAsync;
use ckd_cache::TrackCursor;
use ckd_defs::seek_control;
use ckd_defs::track::RecordHeader;
use ckd_defs::track::END_OF_TRACK;
use ckd_defs::track::RECORD_HEADER_SIZE;
use ckd_defs::track::TRACK_HEADER_SIZE;
use ckd_defs::CcwOp;
use zerocopy::FromZeros;
use zerocopy::IntoBytes;

/// Bit in the first count byte marking a record continued on the next
/// track.
const OVERFLOW_FLAG: u8 = 0x80;

impl CkdDasd {
    /// Pins the track at `(cyl, head)` as the current track, flushing and
    /// releasing the previous one.
    ///
    /// In synchronous mode a clean cache hit switches tracks in place. The
    /// previous track stays parked until the CCW ends so a later retry can
    /// restore it. A miss or a pending flush retries with nothing changed.
    pub(crate) fn read_track(&mut self, cyl: u32, head: u32) -> Result<(), DasdError> {
        let track = cyl * self.heads + head;
        if self.current_track() == Some(track) {
            return Ok(());
        }
        if self.mode.is_sync() {
            if self.track.as_ref().is_some_and(|pinned| pinned.is_dirty()) {
                return Err(RetryAsync.into());
            }
            let pinned = match self.parked.iter().position(|p| p.track() == track) {
                Some(index) => self.parked.swap_remove(index),
                None => self.acquire_track(track, cyl, head)?,
            };
            if let Some(previous) = self.track.replace(pinned) {
                self.parked.push(previous);
            }
            return Ok(());
        }
        self.release_track()?;
        self.track = Some(self.acquire_track(track, cyl, head)?);
        Ok(())
    }

    fn acquire_track(
        &mut self,
        track: u32,
        cyl: u32,
        head: u32,
    ) -> Result<PinnedTrack, DasdError> {
        let key = CacheKey {
            devnum: self.devnum,
            track,
        };
        match self
            .cache
            .acquire(key, cyl, head, self.storage.as_ref(), self.mode)
        {
            Ok(pinned) => Ok(pinned),
            Err(AcquireError::RetryAsync(retry)) => Err(retry.into()),
            Err(AcquireError::Cache(err)) => {
                tracing::warn!(
                    devnum = self.devnum,
                    cyl,
                    head,
                    error = &err as &dyn std::error::Error,
                    "failed to load track"
                );
                self.state.orientation = Orientation::None;
                Err(match err {
                    CacheError::InvalidTrackHeader { .. } => SenseCode::invalid_track_format(),
                    CacheError::Storage { .. } | CacheError::AlreadyPinned(_) => {
                        SenseCode::equipment_check()
                    }
                }
                .into())
            }
        }
    }

    /// Hands back the tracks a synchronous CCW moved away from.
    pub(crate) fn release_parked(&mut self) {
        for track in self.parked.drain(..) {
            self.cache.release(track);
        }
    }

    /// Undoes the track switches of a synchronous CCW that is about to
    /// retry, so the track it started on is pinned again. Every track
    /// involved is clean.
    pub(crate) fn restore_track(&mut self, started_on: Option<u32>) {
        let mut pins = std::mem::take(&mut self.parked);
        pins.extend(self.track.take());
        for pinned in pins {
            if self.track.is_none() && Some(pinned.track()) == started_on {
                self.track = Some(pinned);
            } else {
                self.cache.release(pinned);
            }
        }
    }

    /// Flushes and unpins the current track.
    pub(crate) fn release_track(&mut self) -> Result<(), DasdError> {
        let Some(mut track) = self.track.take() else {
            return Ok(());
        };
        if let Err(err) = track.flush(self.storage.as_ref()) {
            tracing::warn!(
                devnum = self.devnum,
                track = track.track(),
                error = &err as &dyn std::error::Error,
                "failed to flush track"
            );
            self.cache.discard(track);
            self.state.orientation = Orientation::None;
            return Err(SenseCode::equipment_check().into());
        }
        self.cache.release(track);
        Ok(())
    }

    /// Moves to `(cyl, head)` and orients to index.
    pub(crate) fn seek(&mut self, cyl: u32, head: u32) -> Result<(), DasdError> {
        if cyl >= self.cylinders || head >= self.heads {
            return Err(SenseCode::invalid_parameter().into());
        }
        if !self.state.extent.contains(cyl, head) {
            return Err(SenseCode::file_protected().into());
        }
        tracing::trace!(devnum = self.devnum, cyl, head, "seek");
        // Record the target first so sense reflects it if the load fails.
        self.state.position = Position {
            cyl,
            head,
            ..Default::default()
        };
        self.read_track(cyl, head)?;
        self.orient_index();
        Ok(())
    }

    pub(crate) fn orient_index(&mut self) {
        self.state.orientation = Orientation::Index;
        self.state.cursor = TrackCursor::at(TRACK_HEADER_SIZE);
        self.state.position.record = 0;
        self.state.position.key_len = 0;
        self.state.position.data_len = 0;
    }

    /// Makes sure the current position has a pinned track behind it,
    /// reloading it at index after the previous chain released it.
    pub(crate) fn ensure_track(&mut self) -> Result<(), DasdError> {
        if self.state.orientation == Orientation::None {
            return Err(SenseCode::invalid_sequence().into());
        }
        if self.track.is_none() {
            let Position { cyl, head, .. } = self.state.position;
            self.seek(cyl, head)?;
        }
        Ok(())
    }

    /// Advances `tracks` tracks for a multitrack operation.
    pub(crate) fn advance_tracks(&mut self, tracks: u32) -> Result<(), DasdError> {
        let overflow = self.state.flags.track_overflow;
        let fail = |code: SenseCode| -> DasdError {
            if overflow {
                code.imprecise().into()
            } else {
                code.into()
            }
        };
        let Position { cyl, head, .. } = self.state.position;
        if self.state.locate.is_none() {
            if self.state.file_mask.seek_control() == seek_control::INHIBIT_ALL {
                return Err(fail(SenseCode::file_protected()));
            }
            // Ran off the cylinder rather than out of the extent.
            if head + tracks >= self.heads {
                return Err(fail(SenseCode::end_of_cylinder()));
            }
        }
        let head = head + tracks;
        let (cyl, head) = (cyl + head / self.heads, head % self.heads);
        if !self.state.extent.contains(cyl, head) {
            return Err(fail(SenseCode::file_protected()));
        }
        self.seek(cyl, head)
    }

    /// Reads `len` bytes at the cursor and moves past them.
    fn take(&mut self, len: usize) -> Result<&[u8], DasdError> {
        let track = self
            .track
            .as_ref()
            .ok_or(SenseCode::invalid_sequence())?;
        self.state
            .cursor
            .take(track.image(), len)
            .map_err(|err| {
                tracing::warn!(
                    devnum = self.devnum,
                    error = &err as &dyn std::error::Error,
                    "read past end of track"
                );
                SenseCode::equipment_check().into()
            })
    }

    /// The count field at `offset`.
    pub(crate) fn header_at(&self, offset: usize) -> Result<RecordHeader, DasdError> {
        let track = self
            .track
            .as_ref()
            .ok_or(SenseCode::invalid_sequence())?;
        let bytes = track
            .image()
            .read(offset, RECORD_HEADER_SIZE)
            .map_err(|_| SenseCode::equipment_check())?;
        let mut header = RecordHeader::new_zeroed();
        header.as_mut_bytes().copy_from_slice(bytes);
        Ok(header)
    }

    /// The home address of the current track.
    pub(crate) fn home_address(&self) -> Result<[u8; TRACK_HEADER_SIZE], DasdError> {
        let track = self
            .track
            .as_ref()
            .ok_or(SenseCode::invalid_sequence())?;
        let mut ha = [0; TRACK_HEADER_SIZE];
        ha.copy_from_slice(
            track
                .image()
                .read(0, TRACK_HEADER_SIZE)
                .map_err(|_| SenseCode::equipment_check())?,
        );
        Ok(ha)
    }

    /// Moves the cursor past whatever fields of the current record have not
    /// been passed yet. On the end-of-track marker, backs up onto it.
    fn skip_current_fields(&mut self) {
        let pos = self.state.position;
        match self.state.orientation {
            Orientation::Count => self
                .state
                .cursor
                .advance(usize::from(pos.key_len) + usize::from(pos.data_len)),
            Orientation::Key => self.state.cursor.advance(pos.data_len.into()),
            Orientation::EndOfTrack => {
                let offset = self.state.cursor.offset();
                self.state.cursor = TrackCursor::at(offset.saturating_sub(RECORD_HEADER_SIZE));
            }
            Orientation::None | Orientation::Index | Orientation::Data => {}
        }
    }

    /// Reads the next count field.
    ///
    /// Record zero is skipped unless `code` may address it. Reaching the
    /// end-of-track marker the first time wraps to index on the same track
    /// or, for multitrack commands, moves on to the next track; reaching it
    /// again is a no-record-found condition.
    pub(crate) fn read_count(&mut self, code: CcwOp) -> Result<RecordHeader, DasdError> {
        // A Locate Record search already consumed the located count field.
        if let Some(locate) = self.state.locate.as_mut().filter(|l| l.count_pending) {
            locate.count_pending = false;
            if self.state.orientation == Orientation::Count {
                let offset = self.state.cursor.offset() - RECORD_HEADER_SIZE;
                return self.header_at(offset);
            }
        }

        let skip_r0 = !code.reads_record_zero();
        if self.state.orientation == Orientation::EndOfTrack {
            self.advance_tracks(1)?;
        }

        loop {
            if self.state.orientation != Orientation::EndOfTrack {
                self.skip_current_fields();
            }
            let mut header = RecordHeader::new_zeroed();
            header
                .as_mut_bytes()
                .copy_from_slice(self.take(RECORD_HEADER_SIZE)?);

            self.state.orientation = Orientation::Count;
            self.state.position.record = header.record;
            self.state.position.key_len = header.key_len;
            self.state.position.data_len = header.data_len.get();
            self.state.flags.track_overflow = header.track_overflow();
            tracing::trace!(
                devnum = self.devnum,
                record = header.record,
                key_len = header.key_len,
                data_len = header.data_len.get(),
                "count"
            );

            if !header.is_end_of_track() {
                if skip_r0 && header.record == 0 {
                    continue;
                }
                return Ok(header);
            }

            self.state.orientation = Orientation::EndOfTrack;
            if code == CcwOp::READ_TRACK || code == CcwOp::READ_MULTIPLE_CKD {
                return Ok(header);
            }

            // Multitrack reads and key searches outside a domain keep going
            // across tracks regardless of earlier end-of-track markers.
            let multitrack_exempt = self.state.locate.is_none()
                && ((code.is_read() && code.multitrack())
                    || matches!(
                        code,
                        CcwOp::SEARCH_KEY_EQUAL_MT
                            | CcwOp::SEARCH_KEY_HIGH_MT
                            | CcwOp::SEARCH_KEY_EQUAL_HIGH_MT
                    ));
            if code == CcwOp::LOCATE_RECORD
                || code == CcwOp::WRITE_CKD_NEXT_TRACK
                || (self.state.flags.index_mark && !multitrack_exempt)
            {
                return Err(SenseCode::no_record_found().into());
            }

            if code.multitrack() {
                self.advance_tracks(1)?;
                if !code.is_search_id_or_key() {
                    self.state.flags.index_mark = true;
                }
            } else {
                let Position { cyl, head, .. } = self.state.position;
                self.seek(cyl, head)?;
                self.state.flags.index_mark = true;
            }
        }
    }

    /// Reads the key of the current record, reading its count first if
    /// needed.
    pub(crate) fn read_key(&mut self, code: CcwOp) -> Result<Vec<u8>, DasdError> {
        if self.state.orientation != Orientation::Count {
            self.read_count(code)?;
        }
        let len = self.state.position.key_len.into();
        let key = self.take(len)?.to_vec();
        self.state.orientation = Orientation::Key;
        Ok(key)
    }

    /// Appends the data of the current record to `out`, reading its count
    /// first if needed.
    pub(crate) fn read_data(&mut self, code: CcwOp, out: &mut Vec<u8>) -> Result<(), DasdError> {
        if !matches!(self.state.orientation, Orientation::Count | Orientation::Key) {
            self.read_count(code)?;
        }
        if self.state.orientation == Orientation::Count {
            self.state
                .cursor
                .advance(self.state.position.key_len.into());
        }
        let len = self.state.position.data_len.into();
        out.extend_from_slice(self.take(len)?);
        self.state.orientation = Orientation::Data;
        Ok(())
    }

    /// Follows track overflow continuations, appending each continuation
    /// record's data.
    pub(crate) fn read_overflow(&mut self, code: CcwOp, out: &mut Vec<u8>) -> Result<(), DasdError> {
        while self.state.flags.track_overflow {
            self.advance_tracks(1)?;
            self.read_count(code)?;
            self.read_data(code, out)?;
        }
        Ok(())
    }

    /// Skips record zero when positioned at index, so formatting writes
    /// land after it.
    pub(crate) fn skip_record_zero(&mut self) -> Result<(), DasdError> {
        if self.state.orientation != Orientation::Index {
            return Ok(());
        }
        let header = self.header_at(self.state.cursor.offset())?;
        if !header.is_end_of_track() && header.record == 0 {
            self.state.cursor.advance(header.record_len());
            self.state.position.record = 0;
            self.state.position.key_len = header.key_len;
            self.state.position.data_len = header.data_len.get();
            self.state.orientation = Orientation::Data;
        }
        Ok(())
    }

    /// Writes through to the pinned track image.
    fn update_track(&mut self, offset: usize, data: &[u8]) -> Result<(), DasdError> {
        if self.read_only {
            // Fake writes are accepted and dropped.
            return if self.fake_write {
                Ok(())
            } else {
                Err(SenseCode::write_inhibited().into())
            };
        }
        let track = self
            .track
            .as_mut()
            .ok_or(SenseCode::invalid_sequence())?;
        track.image_mut().update(offset, data).map_err(|err| {
            tracing::warn!(
                devnum = self.devnum,
                error = &err as &dyn std::error::Error,
                "write past end of track"
            );
            SenseCode::invalid_track_format().into()
        })
    }

    /// Pads or truncates `buf` to `len` bytes.
    fn field(buf: &[u8], len: usize) -> Vec<u8> {
        let mut field = vec![0; len];
        let n = buf.len().min(len);
        field[..n].copy_from_slice(&buf[..n]);
        field
    }

    /// Writes a new record after the current one and terminates the track
    /// after it. `buf` holds the count, key and data.
    pub(crate) fn write_ckd(
        &mut self,
        buf: &[u8],
        overflow: bool,
    ) -> Result<RecordHeader, DasdError> {
        self.skip_current_fields();
        let mut header = RecordHeader::new_zeroed();
        let n = buf.len().min(RECORD_HEADER_SIZE);
        header.as_mut_bytes()[..n].copy_from_slice(&buf[..n]);

        let len = header.record_len();
        let offset = self.state.cursor.offset();
        if offset + len + RECORD_HEADER_SIZE >= self.track_size {
            return Err(SenseCode::invalid_parameter().into());
        }

        let mut record = Self::field(buf, len);
        if overflow {
            record[0] |= OVERFLOW_FLAG;
        }
        self.update_track(offset, &record)?;
        self.update_track(offset + len, &END_OF_TRACK)?;
        self.state.cursor.advance(len);

        self.state.position.record = header.record;
        self.state.position.key_len = header.key_len;
        self.state.position.data_len = header.data_len.get();
        self.state.orientation = Orientation::Data;
        self.state.flags.track_overflow = overflow;
        Ok(header)
    }

    /// Rewrites the key and data of the current record. Requires count
    /// orientation.
    pub(crate) fn write_key_data(&mut self, buf: &[u8]) -> Result<usize, DasdError> {
        if self.state.orientation != Orientation::Count {
            return Err(SenseCode::invalid_sequence().into());
        }
        let pos = self.state.position;
        let len = usize::from(pos.key_len) + usize::from(pos.data_len);
        let offset = self.state.cursor.offset();
        self.update_track(offset, &Self::field(buf, len))?;
        self.state.cursor.advance(len);
        self.state.orientation = Orientation::Data;
        Ok(len)
    }

    /// Rewrites the data of the current record. Requires count or key
    /// orientation.
    pub(crate) fn write_data(&mut self, buf: &[u8]) -> Result<usize, DasdError> {
        match self.state.orientation {
            Orientation::Count => self
                .state
                .cursor
                .advance(self.state.position.key_len.into()),
            Orientation::Key => {}
            _ => return Err(SenseCode::invalid_sequence().into()),
        }
        let len = self.state.position.data_len.into();
        let offset = self.state.cursor.offset();
        self.update_track(offset, &Self::field(buf, len))?;
        self.state.cursor.advance(len);
        self.state.orientation = Orientation::Data;
        Ok(len)
    }

    /// Erases the rest of the track after the current record. `buf` holds
    /// the count field of the record that would have been written; its
    /// length must still fit on the track.
    pub(crate) fn erase(&mut self, buf: &[u8]) -> Result<usize, DasdError> {
        self.skip_current_fields();
        let mut header = RecordHeader::new_zeroed();
        let n = buf.len().min(RECORD_HEADER_SIZE);
        header.as_mut_bytes()[..n].copy_from_slice(&buf[..n]);

        let len = header.record_len();
        let offset = self.state.cursor.offset();
        if offset + len + RECORD_HEADER_SIZE >= self.track_size {
            return Err(SenseCode::invalid_parameter().into());
        }
        self.update_track(offset, &END_OF_TRACK)?;
        self.state.orientation = Orientation::Data;
        Ok(len)
    }

    /// Rewrites the home address, leaving an empty track behind it.
    pub(crate) fn write_home_address(&mut self, image: &[u8]) -> Result<(), DasdError> {
        self.update_track(0, image)?;
        self.orient_index();
        Ok(())
    }
}
