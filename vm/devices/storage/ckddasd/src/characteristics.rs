// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Sense ID, Read Device Characteristics, and Read Configuration Data
//! responses.

use crate::tables::ControlUnit;
use crate::tables::DeviceType;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

type U16BE = zerocopy::byteorder::U16<zerocopy::byteorder::BigEndian>;
type U32BE = zerocopy::byteorder::U32<zerocopy::byteorder::BigEndian>;

const DEVICE_CLASS_DASD: u8 = 0x20;
/// Cylinder counts at or above this are reported in the large cylinder
/// field.
const LARGE_CYLINDERS: u32 = 0xFFF7;
const CYLINDERS_IN_LARGE_FIELD: u16 = 0xFFFE;

/// Read Device Characteristics response.
#[repr(C)]
#[derive(Debug, IntoBytes, Immutable, KnownLayout)]
struct DeviceCharacteristics {
    cu_type: U16BE,
    cu_model: u8,
    device_type: U16BE,
    device_model: u8,
    facilities: U32BE,
    device_class: u8,
    device_code: u8,
    cylinders: U16BE,
    heads: U16BE,
    sectors: u8,
    track_length: [u8; 3],
    ha_r0_length: U16BE,
    formula: u8,
    factors: [u8; 5],
    alternate_cylinder: U16BE,
    alternate_tracks: U16BE,
    diagnostic_cylinder: U16BE,
    diagnostic_tracks: U16BE,
    support_cylinder: U16BE,
    support_tracks: U16BE,
    mdr_id: u8,
    obr_id: u8,
    cu_code: u8,
    parameter_length: u8,
    r0_capacity: U16BE,
    reserved1: u8,
    track_set: u8,
    factor6: u8,
    rps_factor: U16BE,
    reserved2: u8,
    large_cylinders: U32BE,
    reserved3: [u8; 8],
}

const _: () = assert!(size_of::<DeviceCharacteristics>() == 64);

pub(crate) fn device_characteristics(
    cu: &ControlUnit,
    device: &DeviceType,
    cylinders: u32,
) -> [u8; 64] {
    let f = device.factors;
    let factors = match device.formula {
        1 => {
            let [f2_hi, f2_lo] = f[1].to_be_bytes();
            let [f3_hi, f3_lo] = f[2].to_be_bytes();
            [f[0] as u8, f2_hi, f2_lo, f3_hi, f3_lo]
        }
        2 => [f[0] as u8, f[1] as u8, f[2] as u8, f[3] as u8, f[4] as u8],
        _ => [0; 5],
    };
    let [_, track_length @ ..] = device.track_length.to_be_bytes();
    let alternate_tracks = device.alternate_cylinders * device.heads;
    let (reported_cylinders, large_cylinders) = if cylinders >= LARGE_CYLINDERS {
        (CYLINDERS_IN_LARGE_FIELD, cylinders)
    } else {
        (cylinders as u16, 0)
    };

    let rdc = DeviceCharacteristics {
        cu_type: cu.cu_type.into(),
        cu_model: cu.model,
        device_type: device.device_type.into(),
        device_model: device.model,
        facilities: cu.facilities.into(),
        device_class: DEVICE_CLASS_DASD,
        device_code: device.code,
        cylinders: reported_cylinders.into(),
        heads: (device.heads as u16).into(),
        sectors: device.sectors,
        track_length,
        ha_r0_length: device.ha_r0_length.into(),
        formula: device.formula,
        factors,
        alternate_cylinder: (cylinders as u16).into(),
        alternate_tracks: (alternate_tracks as u16).into(),
        diagnostic_cylinder: ((cylinders + device.alternate_cylinders) as u16).into(),
        diagnostic_tracks: U16BE::ZERO,
        support_cylinder: ((cylinders + device.alternate_cylinders) as u16).into(),
        support_tracks: U16BE::ZERO,
        mdr_id: if cu.features.subsystem_function { 0x06 } else { 0 },
        obr_id: if cu.features.subsystem_function { 0x06 } else { 0 },
        cu_code: cu.code,
        parameter_length: 0,
        r0_capacity: (device.r0_capacity as u16).into(),
        reserved1: 0,
        track_set: 0,
        factor6: f[5] as u8,
        rps_factor: U16BE::ZERO,
        reserved2: 0,
        large_cylinders: large_cylinders.into(),
        reserved3: [0; 8],
    };
    let mut bytes = [0; 64];
    bytes.copy_from_slice(rdc.as_bytes());
    bytes
}

/// Sense ID response. Controllers with configuration data append a command
/// information word for Read Configuration Data.
pub(crate) fn sense_id(cu: &ControlUnit, device: &DeviceType) -> Vec<u8> {
    let mut id = vec![0xFF];
    id.extend_from_slice(&cu.cu_type.to_be_bytes());
    id.push(cu.model);
    id.extend_from_slice(&device.device_type.to_be_bytes());
    id.push(device.model);
    id.push(0);
    if cu.features.configuration_data {
        // CIW: type RCD, command X'FA', count 256.
        id.extend_from_slice(&[0x40, 0xFA, 0x01, 0x00]);
    }
    id
}

/// Node element descriptor in configuration data.
#[repr(C)]
#[derive(Debug, IntoBytes, Immutable, KnownLayout)]
struct NodeElement {
    flags: u8,
    node_type: u8,
    class: u8,
    reserved: u8,
    type_number: [u8; 6],
    model_number: [u8; 3],
    manufacturer: [u8; 3],
    plant: [u8; 2],
    sequence: [u8; 12],
    tag: U16BE,
}

const _: () = assert!(size_of::<NodeElement>() == 32);

/// General node element qualifier.
#[repr(C)]
#[derive(Debug, IntoBytes, Immutable, KnownLayout)]
struct NodeQualifier {
    flags: u8,
    record_selector: u8,
    interface_id: U16BE,
    device_timeout: u8,
    reserved1: [u8; 3],
    subsystem_id: U16BE,
    reserved2: u8,
    unit_address: u8,
    reserved3: [u8; 20],
}

const _: () = assert!(size_of::<NodeQualifier>() == 32);

const NED_FLAGS: u8 = 0xC4;
const TOKEN_NED_FLAGS: u8 = 0xF0;
const NEQ_GENERAL: u8 = 0x80;
const NODE_DEVICE: u8 = 0x01;
const NODE_CONTROL_UNIT: u8 = 0x02;
const CLASS_DASD: u8 = 0x01;

/// Converts printable ASCII to EBCDIC. Characters outside digits, capital
/// letters, and space become `?`.
fn ebcdic<const N: usize>(s: &str) -> [u8; N] {
    let mut out = [0x40; N];
    for (dst, c) in out.iter_mut().zip(s.bytes()) {
        *dst = match c {
            b'0'..=b'9' => 0xF0 + (c - b'0'),
            b'A'..=b'I' => 0xC1 + (c - b'A'),
            b'J'..=b'R' => 0xD1 + (c - b'J'),
            b'S'..=b'Z' => 0xE2 + (c - b'S'),
            b' ' => 0x40,
            _ => 0x6F,
        };
    }
    out
}

fn node_element(
    flags: u8,
    node_type: u8,
    type_number: u16,
    model: u8,
    devnum: u16,
    tag: u16,
) -> NodeElement {
    NodeElement {
        flags,
        node_type,
        class: CLASS_DASD,
        reserved: 0,
        type_number: ebcdic(&format!("{type_number:06X}")),
        model_number: ebcdic(&format!("{model:03X}")),
        manufacturer: ebcdic("HRC"),
        plant: ebcdic("ZZ"),
        sequence: ebcdic(&format!("{devnum:012X}")),
        tag: tag.into(),
    }
}

/// Read Configuration Data response: device, string, control unit, and
/// token node element descriptors followed by the general qualifier.
pub(crate) fn configuration_data(cu: &ControlUnit, device: &DeviceType, devnum: u16) -> Vec<u8> {
    let nodes = [
        node_element(
            NED_FLAGS,
            NODE_DEVICE,
            device.device_type,
            device.model,
            devnum,
            devnum & 0xFF,
        ),
        node_element(NED_FLAGS, 0, device.device_type, device.model, devnum, 0),
        node_element(
            NED_FLAGS,
            NODE_CONTROL_UNIT,
            cu.cu_type,
            cu.model,
            devnum,
            devnum & 0xFF00,
        ),
        node_element(
            TOKEN_NED_FLAGS,
            NODE_CONTROL_UNIT,
            cu.cu_type,
            cu.model,
            devnum,
            0,
        ),
    ];
    let neq = NodeQualifier {
        flags: NEQ_GENERAL,
        record_selector: 0,
        interface_id: U16BE::ZERO,
        device_timeout: 0,
        reserved1: [0; 3],
        subsystem_id: (devnum & 0xFF00).into(),
        reserved2: 0,
        unit_address: devnum as u8,
        reserved3: [0; 20],
    };

    let mut rcd = Vec::with_capacity(256);
    for node in &nodes {
        rcd.extend_from_slice(node.as_bytes());
    }
    rcd.extend_from_slice(neq.as_bytes());
    rcd.resize(256, 0);
    rcd
}
