// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Emulation of Count-Key-Data direct access storage devices.
//!
//! [`CkdDasd`] executes channel programs one CCW at a time. It keeps the
//! device's orientation within the current track, the chain's extent and
//! file mask, and any open Locate Record domain, and it reads and writes
//! track images through a [`TrackCache`] shared with other devices.
//!
//! Errors the guest can see are reported the way the hardware does: unit
//! check status, with sense bytes describing the failure available to a
//! following Sense command.
//!
//! CCWs can be issued on a synchronous path that must not block. If a CCW
//! would need storage I/O there, it returns [`RetryAsync`] and leaves the
//! device exactly as it found it, so the caller can issue it again from an
//! asynchronous context.

#![forbid(unsafe_code)]

mod characteristics;
mod dispatch;
mod error;
mod locate;
mod orient;
mod sense;
mod state;
mod subsystem;
mod tables;

#[cfg(test)]
mod tests;

pub use ckd_cache::IoMode;
pub use ckd_cache::RetryAsync;
pub use error::SenseCode;
pub use state::ChainFlags;
pub use state::DeviceChannelState;
pub use state::Extent;
pub use state::LocateState;
pub use state::Orientation;
pub use state::Position;
pub use tables::ControlUnit;
pub use tables::DeviceType;

use ckd_backend::TrackStorage;
use ckd_cache::PinnedTrack;
use ckd_cache::TrackCache;
use ckd_defs::track::image_track_size;
use ckd_defs::CcwFlags;
use ckd_defs::CcwOp;
use ckd_defs::UnitStatus;
use ckddasd_resources::CkdDeviceParameters;
use std::sync::Arc;
use subsystem::SubsystemState;
use thiserror::Error;

/// An error creating a CKD device.
#[derive(Debug, Error)]
pub enum NewDeviceError {
    #[error("unknown device type {device_type:04x} model {model:?}")]
    UnknownDeviceType { device_type: u16, model: Option<u8> },
    #[error("unknown control unit {0:04x}")]
    UnknownControlUnit(u16),
    #[error("invalid cylinder count {0}")]
    InvalidCylinders(u32),
    #[error("volume has {actual} tracks, device needs {required}")]
    TooFewTracks { required: u32, actual: u32 },
    #[error("volume track size {actual} is smaller than {required}")]
    TrackTooSmall { required: usize, actual: usize },
}

/// One CCW as presented by the channel.
#[derive(Debug)]
pub struct CcwRequest<'a> {
    pub code: CcwOp,
    pub flags: CcwFlags,
    /// The CCW was reached by command chaining from the previous one.
    pub chained: bool,
    /// Opcode of the previous CCW in the chain.
    pub prev_code: CcwOp,
    /// Position of this CCW in the chain, starting at zero.
    pub sequence: u32,
    /// Byte count from the CCW.
    pub count: u32,
    /// Channel data area. Reads fill it, writes consume it.
    pub data: &'a mut [u8],
    pub mode: IoMode,
}

/// How a CCW ended.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CcwCompletion {
    pub unit_status: UnitStatus,
    /// Count bytes not transferred.
    pub residual: u32,
    /// The device had more data than the count allowed.
    pub more: bool,
}

impl CcwCompletion {
    fn normal(residual: usize) -> Self {
        Self {
            unit_status: UnitStatus::normal(),
            residual: residual as u32,
            more: false,
        }
    }
}

/// An emulated CKD device.
pub struct CkdDasd {
    devnum: u16,
    device: &'static DeviceType,
    control_unit: &'static ControlUnit,
    cylinders: u32,
    heads: u32,
    track_size: usize,
    read_only: bool,
    fake_write: bool,
    storage: Arc<dyn TrackStorage>,
    cache: Arc<TrackCache>,
    track: Option<PinnedTrack>,
    /// Clean tracks a synchronous CCW has moved away from, held until it
    /// completes.
    parked: Vec<PinnedTrack>,
    state: DeviceChannelState,
    subsystem: SubsystemState,
    mode: IoMode,
}

impl std::fmt::Debug for CkdDasd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CkdDasd")
            .field("devnum", &format_args!("{:04x}", self.devnum))
            .field("device_type", &format_args!("{:04x}", self.device.device_type))
            .field("control_unit", &format_args!("{:04x}", self.control_unit.cu_type))
            .field("cylinders", &self.cylinders)
            .field("track", &self.track.as_ref().map(|track| track.track()))
            .field("state", &self.state)
            .finish()
    }
}

impl CkdDasd {
    /// Creates a device over `storage`, sharing `cache` with other devices.
    pub fn new(
        params: &CkdDeviceParameters,
        storage: Arc<dyn TrackStorage>,
        cache: Arc<TrackCache>,
    ) -> Result<Self, NewDeviceError> {
        let device = tables::device_type(params.device_type, params.model).ok_or(
            NewDeviceError::UnknownDeviceType {
                device_type: params.device_type,
                model: params.model,
            },
        )?;
        let cu_type = params.control_unit.unwrap_or(device.control_unit);
        let control_unit =
            tables::control_unit(cu_type).ok_or(NewDeviceError::UnknownControlUnit(cu_type))?;

        let cylinders = params.cylinders.unwrap_or(device.cylinders);
        if cylinders == 0 || cylinders > u16::MAX.into() {
            return Err(NewDeviceError::InvalidCylinders(cylinders));
        }
        let heads = device.heads;
        let required = cylinders * heads;
        if storage.track_count() < required {
            return Err(NewDeviceError::TooFewTracks {
                required,
                actual: storage.track_count(),
            });
        }
        let required = image_track_size(device.r1_capacity);
        if storage.track_size() < required {
            return Err(NewDeviceError::TrackTooSmall {
                required,
                actual: storage.track_size(),
            });
        }

        tracing::debug!(
            devnum = params.devnum,
            device_type = device.device_type,
            cu_type,
            cylinders,
            "creating ckd device"
        );
        Ok(Self {
            devnum: params.devnum,
            device,
            control_unit,
            cylinders,
            heads,
            track_size: storage.track_size(),
            read_only: params.read_only || storage.is_read_only(),
            fake_write: params.fake_write,
            storage,
            cache,
            track: None,
            parked: Vec::new(),
            state: DeviceChannelState::new(cylinders, heads),
            subsystem: SubsystemState::default(),
            mode: IoMode::Asynchronous,
        })
    }

    pub fn devnum(&self) -> u16 {
        self.devnum
    }

    pub fn device_type(&self) -> &'static DeviceType {
        self.device
    }

    pub fn control_unit(&self) -> &'static ControlUnit {
        self.control_unit
    }

    pub fn cylinders(&self) -> u32 {
        self.cylinders
    }

    pub fn heads(&self) -> u32 {
        self.heads
    }

    /// The device's channel program state.
    pub fn channel_state(&self) -> &DeviceChannelState {
        &self.state
    }

    /// The sense bytes a Sense command would return.
    pub fn sense(&self) -> &[u8] {
        &self.state.sense[..self.control_unit.features.sense_len]
    }

    /// The track currently pinned in the cache, if any.
    pub fn current_track(&self) -> Option<u32> {
        self.track.as_ref().map(|track| track.track())
    }

    /// Ends the channel program: flushes and unpins the current track. The
    /// access arm stays put, so the next chain starts at index.
    ///
    /// On the synchronous path, a track with unflushed changes needs a
    /// retry.
    pub fn end_chain(&mut self, mode: IoMode) -> Result<(), RetryAsync> {
        if mode.is_sync() && self.track.as_ref().is_some_and(|track| track.is_dirty()) {
            return Err(RetryAsync);
        }
        self.unpin(mode);
        if self.state.orientation != Orientation::None {
            self.state.orientation = Orientation::Index;
        }
        Ok(())
    }

    /// Detaches the device: flushes and unpins the current track and drops
    /// the position.
    pub fn close(&mut self) {
        self.unpin(IoMode::Asynchronous);
        self.state.orientation = Orientation::None;
    }

    fn unpin(&mut self, mode: IoMode) {
        self.mode = mode;
        if let Err(err) = self.release_track() {
            // The failure is already logged; leave sense for the next Sense.
            if let error::DasdError::Check(code) = err {
                self.state.sense = sense::build_sense(
                    &self.state,
                    self.device,
                    self.devnum,
                    self.cylinders,
                    code,
                );
            }
        }
    }
}

impl Drop for CkdDasd {
    fn drop(&mut self) {
        if self.track.is_some() {
            self.close();
        }
    }
}
