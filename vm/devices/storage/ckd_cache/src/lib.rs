// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A bounded cache of CKD track images shared by every device on a
//! controller.
//!
//! A device pins at most one track at a time. While pinned, the slot is
//! marked active and the image buffer is owned by the returned
//! [`PinnedTrack`], so the pinning device has exclusive access without
//! holding the cache lock. Misses are filled outside the lock; when every
//! slot is active, callers wait on a condition variable for a release.
//!
//! Synchronous callers never wait and never do I/O. A miss in synchronous
//! mode returns [`RetryAsync`] without changing the cache.

#![forbid(unsafe_code)]

mod image;

pub use image::TrackBoundsError;
pub use image::TrackCursor;
pub use image::TrackImage;

use ckd_backend::StorageError;
use ckd_backend::TrackStorage;
use ckd_defs::track::TrackHeader;
use parking_lot::Condvar;
use parking_lot::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use thiserror::Error;
use zerocopy::FromBytes;

/// Whether a request runs on the caller's synchronous path, where blocking
/// is not allowed, or on an asynchronous worker.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum IoMode {
    Synchronous,
    #[default]
    Asynchronous,
}

impl IoMode {
    pub fn is_sync(self) -> bool {
        self == Self::Synchronous
    }
}

/// The request needs I/O or waiting and must be reissued asynchronously.
/// Nothing was changed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
#[error("operation must be retried asynchronously")]
pub struct RetryAsync;

/// A cache fill failure.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to read track {track}")]
    Storage {
        track: u32,
        #[source]
        err: StorageError,
    },
    #[error("track {track} header is {found:02x?}, expected cylinder {cyl} head {head}")]
    InvalidTrackHeader {
        track: u32,
        cyl: u32,
        head: u32,
        found: [u8; 5],
    },
    #[error("track {0:?} is already pinned")]
    AlreadyPinned(CacheKey),
}

/// Why a track could not be pinned.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error(transparent)]
    RetryAsync(#[from] RetryAsync),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Identifies a track of a device.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub devnum: u16,
    pub track: u32,
}

/// Cache sizing.
#[derive(Debug, Copy, Clone)]
pub struct TrackCacheConfig {
    /// Number of track images held. At least one.
    pub slots: usize,
}

impl Default for TrackCacheConfig {
    fn default() -> Self {
        Self { slots: 16 }
    }
}

/// Counters since the cache was created.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub waits: u64,
}

/// A point-in-time view of one occupied slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub active: bool,
    pub age: u64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum SlotState {
    Free,
    /// Holds `image`; nobody has it pinned.
    Cached,
    /// Pinned by a device, or being filled. `image` is checked out.
    Active,
}

#[derive(Debug)]
struct Slot {
    state: SlotState,
    key: Option<CacheKey>,
    age: u64,
    image: Option<Vec<u8>>,
}

impl Slot {
    fn free(&mut self) {
        self.state = SlotState::Free;
        self.key = None;
    }
}

#[derive(Debug)]
struct CacheInner {
    slots: Vec<Slot>,
    clock: u64,
}

impl CacheInner {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn lookup(&self, key: CacheKey) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.state != SlotState::Free && slot.key == Some(key))
    }

    /// Picks a free slot, or else the least recently used inactive one.
    fn allocate(&self) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.state == SlotState::Free)
            .or_else(|| {
                self.slots
                    .iter()
                    .enumerate()
                    .filter(|(_, slot)| slot.state == SlotState::Cached)
                    .min_by_key(|(_, slot)| slot.age)
                    .map(|(index, _)| index)
            })
    }
}

/// The shared track cache.
#[derive(Debug)]
pub struct TrackCache {
    inner: Mutex<CacheInner>,
    released: Condvar,
    hits: AtomicU64,
    misses: AtomicU64,
    waits: AtomicU64,
}

impl TrackCache {
    pub fn new(config: TrackCacheConfig) -> Self {
        let slots = (0..config.slots.max(1))
            .map(|_| Slot {
                state: SlotState::Free,
                key: None,
                age: 0,
                image: None,
            })
            .collect();
        Self {
            inner: Mutex::new(CacheInner { slots, clock: 0 }),
            released: Condvar::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            waits: AtomicU64::new(0),
        }
    }

    /// Pins the track `key`, which lives at `(cyl, head)`, reading it from
    /// `storage` on a miss.
    ///
    /// In synchronous mode a miss returns [`AcquireError::RetryAsync`] and
    /// leaves the cache untouched.
    pub fn acquire(
        &self,
        key: CacheKey,
        cyl: u32,
        head: u32,
        storage: &dyn TrackStorage,
        mode: IoMode,
    ) -> Result<PinnedTrack, AcquireError> {
        let mut inner = self.inner.lock();
        let (index, buffer) = loop {
            if let Some(index) = inner.lookup(key) {
                if inner.slots[index].state == SlotState::Active {
                    return Err(CacheError::AlreadyPinned(key).into());
                }
                let age = inner.tick();
                let slot = &mut inner.slots[index];
                slot.state = SlotState::Active;
                slot.age = age;
                let bytes = slot.image.take().unwrap_or_default();
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(devnum = key.devnum, track = key.track, "track cache hit");
                return Ok(PinnedTrack {
                    slot: index,
                    key,
                    image: TrackImage::new(bytes),
                });
            }

            if mode.is_sync() {
                return Err(RetryAsync.into());
            }

            if let Some(index) = self.reserve(&mut inner, key) {
                let buffer = inner.slots[index].image.take().unwrap_or_default();
                break (index, buffer);
            }

            self.waits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(devnum = key.devnum, track = key.track, "track cache full, waiting");
            self.released.wait(&mut inner);
        };
        drop(inner);

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(devnum = key.devnum, track = key.track, "track cache miss");
        match Self::fill(buffer, key, cyl, head, storage) {
            Ok(image) => Ok(PinnedTrack {
                slot: index,
                key,
                image,
            }),
            Err(err) => {
                self.free_slot(index, None);
                Err(err.into())
            }
        }
    }

    /// Reserves a slot for `key` as active so concurrent lookups see it.
    fn reserve(&self, inner: &mut CacheInner, key: CacheKey) -> Option<usize> {
        let index = inner.allocate()?;
        let age = inner.tick();
        let slot = &mut inner.slots[index];
        if let Some(old) = slot.key {
            tracing::trace!(devnum = old.devnum, track = old.track, "evicting track");
        }
        slot.state = SlotState::Active;
        slot.key = Some(key);
        slot.age = age;
        Some(index)
    }

    fn fill(
        mut buffer: Vec<u8>,
        key: CacheKey,
        cyl: u32,
        head: u32,
        storage: &dyn TrackStorage,
    ) -> Result<TrackImage, CacheError> {
        buffer.resize(storage.track_size(), 0);
        storage
            .read_track(key.track, &mut buffer)
            .map_err(|err| CacheError::Storage {
                track: key.track,
                err,
            })?;
        let header = TrackHeader::read_from_prefix(&buffer)
            .ok()
            .map(|(header, _)| header);
        if !header.is_some_and(|header| header.matches(cyl, head)) {
            let mut found = [0; 5];
            let n = buffer.len().min(5);
            found[..n].copy_from_slice(&buffer[..n]);
            return Err(CacheError::InvalidTrackHeader {
                track: key.track,
                cyl,
                head,
                found,
            });
        }
        Ok(TrackImage::new(buffer))
    }

    /// Returns a clean pinned track to the cache, making it eligible for
    /// reuse. A track that still has unflushed changes is dropped instead.
    pub fn release(&self, track: PinnedTrack) {
        if track.image.is_dirty() {
            tracing::warn!(
                devnum = track.key.devnum,
                track = track.key.track,
                "releasing unflushed track, discarding"
            );
            self.discard(track);
            return;
        }
        let mut inner = self.inner.lock();
        let slot = &mut inner.slots[track.slot];
        debug_assert_eq!(slot.key, Some(track.key));
        slot.state = SlotState::Cached;
        slot.image = Some(track.image.into_bytes());
        drop(inner);
        self.released.notify_one();
    }

    /// Drops a pinned track without keeping its contents, for use after an
    /// I/O failure.
    pub fn discard(&self, track: PinnedTrack) {
        self.free_slot(track.slot, Some(track.image.into_bytes()));
    }

    fn free_slot(&self, index: usize, buffer: Option<Vec<u8>>) {
        let mut inner = self.inner.lock();
        let slot = &mut inner.slots[index];
        slot.free();
        slot.image = buffer;
        drop(inner);
        self.released.notify_one();
    }

    /// Whether `key` is currently cached or pinned.
    pub fn contains(&self, key: CacheKey) -> bool {
        self.inner.lock().lookup(key).is_some()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            waits: self.waits.load(Ordering::Relaxed),
        }
    }

    /// The occupied slots, in slot order.
    pub fn entries(&self) -> Vec<CacheEntry> {
        let inner = self.inner.lock();
        inner
            .slots
            .iter()
            .filter_map(|slot| {
                Some(CacheEntry {
                    key: slot.key?,
                    active: slot.state == SlotState::Active,
                    age: slot.age,
                })
            })
            .collect()
    }
}

/// A track pinned by one device.
///
/// Dropping a pinned track without handing it back through
/// [`TrackCache::release`] or [`TrackCache::discard`] leaves its slot
/// permanently active.
#[derive(Debug)]
#[must_use]
pub struct PinnedTrack {
    slot: usize,
    key: CacheKey,
    image: TrackImage,
}

impl PinnedTrack {
    pub fn track(&self) -> u32 {
        self.key.track
    }

    pub fn image(&self) -> &TrackImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut TrackImage {
        &mut self.image
    }

    pub fn is_dirty(&self) -> bool {
        self.image.is_dirty()
    }

    /// Writes the dirty range back to `storage`.
    pub fn flush(&mut self, storage: &dyn TrackStorage) -> Result<(), StorageError> {
        self.image.flush(self.key.track, storage)
    }
}
