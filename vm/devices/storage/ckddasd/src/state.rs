// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-device channel program state.

use ckd_cache::TrackCursor;
use ckd_defs::locate::ExtendedOperation;
use ckd_defs::locate::LocateAuxiliary;
use ckd_defs::locate::LocateOperationCode;
use ckd_defs::sense::SENSE_SIZE;
use ckd_defs::CcwOp;
use ckd_defs::FileMask;
use ckd_defs::GlobalAttributes;

/// Where the device is within the current track.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Orientation {
    /// No valid position. Set at attach, on close, and after an I/O failure.
    #[default]
    None,
    /// Just past the home address.
    Index,
    /// Just past a count field.
    Count,
    /// Just past a key field.
    Key,
    /// Just past a data field.
    Data,
    /// On the end-of-track marker.
    EndOfTrack,
}

/// The cylinder and head range a channel program may access.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Extent {
    pub begin_cyl: u32,
    pub begin_head: u32,
    pub end_cyl: u32,
    pub end_head: u32,
}

impl Extent {
    pub fn whole_volume(cylinders: u32, heads: u32) -> Self {
        Self {
            begin_cyl: 0,
            begin_head: 0,
            end_cyl: cylinders.saturating_sub(1),
            end_head: heads.saturating_sub(1),
        }
    }

    pub fn contains(&self, cyl: u32, head: u32) -> bool {
        !(cyl < self.begin_cyl
            || cyl > self.end_cyl
            || (cyl == self.begin_cyl && head < self.begin_head)
            || (cyl == self.end_cyl && head > self.end_head))
    }
}

/// The current record, as last read or written.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Position {
    pub cyl: u32,
    pub head: u32,
    pub record: u8,
    pub key_len: u8,
    pub data_len: u16,
}

/// What an open Locate Record domain permits.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DomainOperation {
    WriteData,
    FormatWrite,
    ReadData,
    WriteTrack,
    ReadTracks,
    Read,
    WriteAny,
    ReadAny,
    ReadTrackset,
}

impl DomainOperation {
    pub fn from_locate(
        code: LocateOperationCode,
        extended: ExtendedOperation,
    ) -> Option<Self> {
        Some(match code {
            LocateOperationCode::WRITE_DATA => Self::WriteData,
            LocateOperationCode::FORMAT_WRITE => Self::FormatWrite,
            LocateOperationCode::READ_DATA => Self::ReadData,
            LocateOperationCode::WRITE_TRACK => Self::WriteTrack,
            LocateOperationCode::READ_TRACKS => Self::ReadTracks,
            LocateOperationCode::READ => Self::Read,
            LocateOperationCode::EXTENDED => match extended {
                ExtendedOperation::WRITE_ANY => Self::WriteAny,
                ExtendedOperation::READ_ANY => Self::ReadAny,
                ExtendedOperation::READ_TRACKSET => Self::ReadTrackset,
                _ => return None,
            },
            _ => return None,
        })
    }

    pub fn is_write(self) -> bool {
        matches!(
            self,
            Self::WriteData | Self::FormatWrite | Self::WriteTrack | Self::WriteAny
        )
    }

    fn permits(self, code: CcwOp) -> bool {
        match self {
            Self::WriteData | Self::WriteAny => matches!(
                code,
                CcwOp::WRITE_DATA | CcwOp::WRITE_UPDATE_DATA | CcwOp::WRITE_UPDATE_KEY_DATA
            ),
            Self::FormatWrite => matches!(
                code,
                CcwOp::WRITE_CKD | CcwOp::WRITE_SPECIAL_CKD | CcwOp::WRITE_R0 | CcwOp::ERASE
            ),
            Self::WriteTrack => matches!(
                code,
                CcwOp::WRITE_CKD
                    | CcwOp::WRITE_SPECIAL_CKD
                    | CcwOp::WRITE_R0
                    | CcwOp::WRITE_CKD_NEXT_TRACK
                    | CcwOp::ERASE
            ),
            Self::ReadData => matches!(code, CcwOp::READ_DATA | CcwOp::READ_DATA_MT),
            Self::ReadTracks | Self::ReadTrackset => code == CcwOp::READ_TRACK,
            Self::Read => matches!(
                code,
                CcwOp::READ_DATA
                    | CcwOp::READ_DATA_MT
                    | CcwOp::READ_KEY_DATA
                    | CcwOp::READ_KEY_DATA_MT
                    | CcwOp::READ_COUNT
                    | CcwOp::READ_COUNT_MT
                    | CcwOp::READ_R0
                    | CcwOp::READ_R0_MT
                    | CcwOp::READ_HA
                    | CcwOp::READ_HA_MT
                    | CcwOp::READ_CKD
                    | CcwOp::READ_CKD_MT
                    | CcwOp::READ_MULTIPLE_CKD
            ),
            Self::ReadAny => matches!(
                code,
                CcwOp::READ_DATA
                    | CcwOp::READ_DATA_MT
                    | CcwOp::READ_KEY_DATA
                    | CcwOp::READ_KEY_DATA_MT
                    | CcwOp::READ_COUNT
                    | CcwOp::READ_COUNT_MT
                    | CcwOp::READ_CKD
                    | CcwOp::READ_CKD_MT
            ),
        }
    }
}

/// Tracks selected by a Read Trackset bitmap, relative to the seek address.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Trackset {
    /// The bitmap, most significant bit first.
    pub mask: u16,
    /// Number of meaningful bits in `mask`, 8 or 16.
    pub bits: u8,
    /// Bit index of the current track.
    pub index: u8,
}

impl Trackset {
    fn selected(&self, index: u8) -> bool {
        index < self.bits && self.mask & (1 << (self.bits - 1 - index)) != 0
    }

    /// Moves to the next selected track, returning how many tracks to
    /// advance.
    pub fn next(&mut self) -> Option<u32> {
        let next = (self.index + 1..self.bits).find(|&i| self.selected(i))?;
        let delta = next - self.index;
        self.index = next;
        Some(delta.into())
    }
}

/// An open Locate Record domain.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LocateState {
    pub operation: DomainOperation,
    pub auxiliary: LocateAuxiliary,
    /// Commands remaining in the domain.
    pub count: u8,
    pub transfer_length_factor: u16,
    pub trackset: Option<Trackset>,
    /// The search already read the count field of the located record; the
    /// next Read Count returns it instead of the following one.
    pub count_pending: bool,
}

impl LocateState {
    pub fn permits(&self, code: CcwOp) -> bool {
        self.operation.permits(code)
            || (code == CcwOp::READ_COUNT && self.auxiliary.read_count_suffix() && self.count == 1)
    }
}

/// Things the current chain has already done. These gate later commands.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct ChainFlags {
    pub seek: bool,
    pub seek_cylinder: bool,
    pub recalibrate: bool,
    pub read_ipl: bool,
    pub locate: bool,
    pub define_extent: bool,
    pub set_file_mask: bool,
    pub search_id_equal: bool,
    pub search_key_equal: bool,
    pub search_ha_equal: bool,
    pub write_ckd: bool,
    pub write_ha_done: bool,
    /// An end-of-track marker has been passed since the last command that
    /// clears it.
    pub index_mark: bool,
    /// The current record continues on the next track.
    pub track_overflow: bool,
}

impl ChainFlags {
    /// Whether the chain has positioned the device, as 3990-style
    /// controllers require before data transfer.
    pub fn positioned(&self) -> bool {
        self.seek || self.seek_cylinder || self.locate || self.read_ipl || self.recalibrate
    }
}

/// Everything a device remembers between CCWs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceChannelState {
    pub orientation: Orientation,
    pub position: Position,
    pub cursor: TrackCursor,
    pub extent: Extent,
    pub block_size: u16,
    pub file_mask: FileMask,
    pub global_attributes: GlobalAttributes,
    pub locate: Option<LocateState>,
    pub flags: ChainFlags,
    pub sense: [u8; SENSE_SIZE],
}

impl DeviceChannelState {
    pub fn new(cylinders: u32, heads: u32) -> Self {
        Self {
            orientation: Orientation::None,
            position: Position::default(),
            cursor: TrackCursor::default(),
            extent: Extent::whole_volume(cylinders, heads),
            block_size: 0,
            file_mask: FileMask::new(),
            global_attributes: GlobalAttributes::new(),
            locate: None,
            flags: ChainFlags::default(),
            sense: [0; SENSE_SIZE],
        }
    }

    /// Resets chain-scoped state at the first CCW of a chain. Position and
    /// sense carry over.
    pub fn start_chain(&mut self, cylinders: u32, heads: u32) {
        self.flags = ChainFlags::default();
        self.extent = Extent::whole_volume(cylinders, heads);
        self.block_size = 0;
        self.file_mask = FileMask::new();
        self.global_attributes = GlobalAttributes::new();
        self.locate = None;
    }
}
