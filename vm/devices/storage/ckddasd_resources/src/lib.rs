// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Configuration for emulated CKD disks.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Parameters controlling CKD disk behavior.
///
/// Optional fields fall back to the device type's defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CkdDeviceParameters {
    /// The device number, used in sense bytes and cache keys.
    pub devnum: u16,
    /// The device type, written as its hex digits (`0x3390` for a 3390).
    pub device_type: u16,
    /// The model to report. Defaults to the first model of the device type.
    pub model: Option<u8>,
    /// Number of primary cylinders to present instead of the model's.
    pub cylinders: Option<u32>,
    /// The control unit type to attach to, written as hex digits. Defaults
    /// to the device type's usual control unit.
    pub control_unit: Option<u16>,
    /// Reject writes with write-inhibited sense.
    pub read_only: bool,
    /// Accept writes but discard them. Only meaningful with `read_only`.
    pub fake_write: bool,
}

impl Default for CkdDeviceParameters {
    fn default() -> Self {
        Self {
            devnum: 0,
            device_type: 0x3390,
            model: None,
            cylinders: None,
            control_unit: None,
            read_only: false,
            fake_write: false,
        }
    }
}

impl CkdDeviceParameters {
    /// Parameters for `device_type` at `devnum`.
    pub fn new(devnum: u16, device_type: u16) -> Self {
        Self {
            devnum,
            device_type,
            ..Default::default()
        }
    }
}
