// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Device type and control unit characteristics.

/// How sense byte 6 packs the cylinder and head.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HeadLayout {
    /// Byte 6 is the head number.
    HeadOnly,
    /// Byte 6 is the high nibble of a 12-bit cylinder and the low nibble
    /// of the head.
    CylinderHighHead,
}

/// Device-dependent sense bytes 4 and 6.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SenseLayout {
    /// Device number bits reported in byte 4.
    pub unit_address_mask: u8,
    pub head_layout: HeadLayout,
}

impl SenseLayout {
    pub fn byte4(&self, devnum: u16) -> u8 {
        devnum as u8 & self.unit_address_mask
    }

    pub fn byte6(&self, cyl: u32, head: u32) -> u8 {
        match self.head_layout {
            HeadLayout::HeadOnly => head as u8,
            HeadLayout::CylinderHighHead => ((cyl >> 4) as u8 & 0xF0) | (head as u8 & 0x0F),
        }
    }
}

const SENSE_2311: SenseLayout = SenseLayout {
    unit_address_mask: 0x07,
    head_layout: HeadLayout::HeadOnly,
};
const SENSE_33XX: SenseLayout = SenseLayout {
    unit_address_mask: 0x07,
    head_layout: HeadLayout::CylinderHighHead,
};
const SENSE_3380: SenseLayout = SenseLayout {
    unit_address_mask: 0x0F,
    head_layout: HeadLayout::CylinderHighHead,
};
const SENSE_3390: SenseLayout = SenseLayout {
    unit_address_mask: 0x3F,
    head_layout: HeadLayout::CylinderHighHead,
};

/// One model of a CKD device type.
#[derive(Debug, PartialEq, Eq)]
pub struct DeviceType {
    pub device_type: u16,
    pub model: u8,
    /// Device type code reported by Read Device Characteristics.
    pub code: u8,
    pub cylinders: u32,
    pub alternate_cylinders: u32,
    pub heads: u32,
    pub r0_capacity: u32,
    /// Largest single-record data length.
    pub r1_capacity: u32,
    pub ha_r0_length: u16,
    /// Physical track length.
    pub track_length: u32,
    /// Rotational position sectors, zero when the device has no RPS.
    pub sectors: u8,
    /// Track capacity formula and factors reported by Read Device
    /// Characteristics.
    pub formula: u8,
    pub factors: [u16; 6],
    pub control_unit: u16,
    pub sense: SenseLayout,
}

impl DeviceType {
    /// Whether the device has rotational position sensing.
    pub fn has_sectors(&self) -> bool {
        self.sectors != 0
    }
}

macro_rules! device {
    (
        $ty:literal $model:literal code $code:literal,
        $cyls:literal + $alt:literal x $heads:literal,
        r0 $r0:literal r1 $r1:literal har0 $har0:literal len $len:literal sectors $sectors:literal,
        formula $formula:literal $factors:expr,
        cu $cu:literal, $sense:ident
    ) => {
        DeviceType {
            device_type: $ty,
            model: $model,
            code: $code,
            cylinders: $cyls,
            alternate_cylinders: $alt,
            heads: $heads,
            r0_capacity: $r0,
            r1_capacity: $r1,
            ha_r0_length: $har0,
            track_length: $len,
            sectors: $sectors,
            formula: $formula,
            factors: $factors,
            control_unit: $cu,
            sense: $sense,
        }
    };
}

pub static DEVICE_TYPES: &[DeviceType] = &[
    device!(0x2311 0x01 code 0x11, 200 + 3 x 10,
        r0 3625 r1 3625 har0 0 len 3625 sectors 0,
        formula 0 [0; 6], cu 0x2841, SENSE_2311),
    device!(0x2314 0x01 code 0x14, 200 + 3 x 20,
        r0 7294 r1 7294 har0 0 len 7294 sectors 0,
        formula 0 [0; 6], cu 0x2314, SENSE_2311),
    device!(0x3330 0x01 code 0x30, 404 + 7 x 19,
        r0 13165 r1 13030 har0 135 len 13165 sectors 128,
        formula 0 [0; 6], cu 0x3830, SENSE_33XX),
    device!(0x3330 0x11 code 0x30, 808 + 7 x 19,
        r0 13165 r1 13030 har0 135 len 13165 sectors 128,
        formula 0 [0; 6], cu 0x3830, SENSE_33XX),
    device!(0x3340 0x01 code 0x40, 348 + 1 x 12,
        r0 8535 r1 8368 har0 167 len 8535 sectors 64,
        formula 0 [0; 6], cu 0x3830, SENSE_33XX),
    device!(0x3350 0x00 code 0x50, 555 + 5 x 30,
        r0 19254 r1 19069 har0 185 len 19254 sectors 128,
        formula 0 [0; 6], cu 0x3830, SENSE_33XX),
    device!(0x3375 0x02 code 0x24, 959 + 3 x 12,
        r0 36000 r1 35616 har0 832 len 36000 sectors 196,
        formula 1 [32, 384, 160, 0, 0, 0], cu 0x3880, SENSE_3380),
    device!(0x3380 0x02 code 0x23, 885 + 1 x 15,
        r0 47968 r1 47476 har0 1088 len 47968 sectors 222,
        formula 1 [32, 492, 236, 0, 0, 0], cu 0x3880, SENSE_3380),
    device!(0x3380 0x1E code 0x23, 1770 + 1 x 15,
        r0 47968 r1 47476 har0 1088 len 47968 sectors 222,
        formula 1 [32, 492, 236, 0, 0, 0], cu 0x3880, SENSE_3380),
    device!(0x3380 0x0A code 0x23, 2655 + 1 x 15,
        r0 47968 r1 47476 har0 1088 len 47968 sectors 222,
        formula 1 [32, 492, 236, 0, 0, 0], cu 0x3880, SENSE_3380),
    device!(0x3390 0x02 code 0x26, 1113 + 1 x 15,
        r0 57326 r1 56664 har0 1428 len 58786 sectors 224,
        formula 2 [34, 19, 9, 6, 116, 6], cu 0x3990, SENSE_3390),
    device!(0x3390 0x06 code 0x26, 2226 + 1 x 15,
        r0 57326 r1 56664 har0 1428 len 58786 sectors 224,
        formula 2 [34, 19, 9, 6, 116, 6], cu 0x3990, SENSE_3390),
    device!(0x3390 0x0A code 0x26, 3339 + 1 x 15,
        r0 57326 r1 56664 har0 1428 len 58786 sectors 224,
        formula 2 [34, 19, 9, 6, 116, 6], cu 0x3990, SENSE_3390),
    device!(0x3390 0x0C code 0x26, 10017 + 3 x 15,
        r0 57326 r1 56664 har0 1428 len 58786 sectors 224,
        formula 2 [34, 19, 9, 6, 116, 6], cu 0x3990, SENSE_3390),
    device!(0x9345 0x04 code 0x04, 1440 + 0 x 15,
        r0 48280 r1 46456 har0 1184 len 48280 sectors 213,
        formula 2 [34, 18, 7, 6, 116, 6], cu 0x9343, SENSE_3390),
    device!(0x9345 0x06 code 0x04, 2156 + 0 x 15,
        r0 48280 r1 46456 har0 1184 len 48280 sectors 213,
        formula 2 [34, 18, 7, 6, 116, 6], cu 0x9343, SENSE_3390),
];

/// Looks up a device type, preferring `model` when given.
pub fn device_type(device_type: u16, model: Option<u8>) -> Option<&'static DeviceType> {
    let mut models = DEVICE_TYPES
        .iter()
        .filter(|entry| entry.device_type == device_type);
    match model {
        Some(model) => models.find(|entry| entry.model == model),
        None => models.next(),
    }
}

/// What a control unit can do.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ControlUnitFeatures {
    pub sense_id: bool,
    /// Define Extent, Locate Record, and Read Device Characteristics.
    pub eckd: bool,
    pub locate_extended: bool,
    /// Perform Subsystem Function, Read Subsystem Data, Diagnostic
    /// Control. Without it, X'27' is Seek and Set Sector.
    pub subsystem_function: bool,
    pub configuration_data: bool,
    /// Data transfer requires a positioning command earlier in the chain.
    pub requires_positioning: bool,
    /// Sense bytes transferred by a Sense command.
    pub sense_len: usize,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ControlUnit {
    pub cu_type: u16,
    pub model: u8,
    /// Control unit code reported by Read Device Characteristics.
    pub code: u8,
    /// Subsystem facilities reported in device characteristics bytes 6-9.
    pub facilities: u32,
    pub features: ControlUnitFeatures,
}

const BASIC: ControlUnitFeatures = ControlUnitFeatures {
    sense_id: false,
    eckd: false,
    locate_extended: false,
    subsystem_function: false,
    configuration_data: false,
    requires_positioning: false,
    sense_len: 24,
};

pub static CONTROL_UNITS: &[ControlUnit] = &[
    ControlUnit {
        cu_type: 0x2841,
        model: 0x01,
        code: 0x01,
        facilities: 0,
        features: BASIC,
    },
    ControlUnit {
        cu_type: 0x2314,
        model: 0x01,
        code: 0x02,
        facilities: 0,
        features: BASIC,
    },
    ControlUnit {
        cu_type: 0x3830,
        model: 0x02,
        code: 0x03,
        facilities: 0,
        features: BASIC,
    },
    ControlUnit {
        cu_type: 0x3880,
        model: 0x13,
        code: 0x10,
        facilities: 0x8000_0000,
        features: ControlUnitFeatures {
            sense_id: true,
            eckd: true,
            ..BASIC
        },
    },
    ControlUnit {
        cu_type: 0x3990,
        model: 0xC2,
        code: 0x15,
        facilities: 0xD000_0002,
        features: ControlUnitFeatures {
            sense_id: true,
            eckd: true,
            locate_extended: true,
            subsystem_function: true,
            configuration_data: true,
            requires_positioning: true,
            sense_len: 32,
        },
    },
    ControlUnit {
        cu_type: 0x9343,
        model: 0xE0,
        code: 0x20,
        facilities: 0x8000_0000,
        features: ControlUnitFeatures {
            sense_id: true,
            eckd: true,
            configuration_data: true,
            sense_len: 32,
            ..BASIC
        },
    },
];

pub fn control_unit(cu_type: u16) -> Option<&'static ControlUnit> {
    CONTROL_UNITS.iter().find(|entry| entry.cu_type == cu_type)
}
