//! Wire-format USB descriptor structs (USB 2.0 chapter 9), laid out the way
//! `cotton-usb-host`'s `wire` module does: `#[repr(C)]` structs that are
//! interpreted directly over a raw descriptor buffer rather than hand-rolled
//! per-field parsing.

#![allow(dead_code)]

use packed_struct::prelude::*;

pub const DESC_TYPE_DEVICE: u8 = 0x01;
pub const DESC_TYPE_CONFIGURATION: u8 = 0x02;
pub const DESC_TYPE_INTERFACE: u8 = 0x04;
pub const DESC_TYPE_ENDPOINT: u8 = 0x05;
pub const DESC_TYPE_HID: u8 = 0x21;
pub const DESC_TYPE_HID_REPORT: u8 = 0x22;

/// The class-specific tail of a HID descriptor, laid out the way the
/// teacher crate's `HidDescriptorBody` packs its own class descriptor:
/// the common `bLength`/`bDescriptorType` header is parsed generically by
/// the configuration walker, leaving this 7-byte body.
#[derive(PackedStruct, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[packed_struct(endian = "lsb")]
pub struct HidDescriptorBody {
    pub bcd_hid: u16,
    pub b_country_code: u8,
    pub b_num_descriptors: u8,
    pub b_report_descriptor_type: u8,
    pub w_report_descriptor_length: u16,
}

impl HidDescriptorBody {
    pub fn parse(raw: &[u8]) -> Option<Self> {
        if raw.len() < 7 {
            return None;
        }
        let mut arr = [0u8; 7];
        arr.copy_from_slice(&raw[..7]);
        Self::unpack(&arr).ok()
    }
}

/// The eight bytes that open every control transfer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupPacket {
    pub bm_request_type: u8,
    pub b_request: u8,
    pub w_value: u16,
    pub w_index: u16,
    pub w_length: u16,
}

impl SetupPacket {
    pub const GET_DESCRIPTOR: u8 = 0x06;
    pub const SET_ADDRESS: u8 = 0x05;
    pub const SET_CONFIGURATION: u8 = 0x09;
    pub const SET_IDLE: u8 = 0x0A;
    pub const SET_REPORT: u8 = 0x09;
    pub const CLEAR_FEATURE: u8 = 0x01;
    pub const ENDPOINT_HALT: u16 = 0x00;

    pub const HOST_TO_DEVICE: u8 = 0x00;
    pub const DEVICE_TO_HOST: u8 = 0x80;
    pub const CLASS_INTERFACE_OUT: u8 = 0x21;

    pub fn to_bytes(self) -> [u8; 8] {
        let mut buf = [0u8; 8];
        buf[0] = self.bm_request_type;
        buf[1] = self.b_request;
        buf[2..4].copy_from_slice(&self.w_value.to_le_bytes());
        buf[4..6].copy_from_slice(&self.w_index.to_le_bytes());
        buf[6..8].copy_from_slice(&self.w_length.to_le_bytes());
        buf
    }

    /// HID class `GET_DESCRIPTOR(REPORT)`, recipient = interface.
    pub fn get_hid_report_descriptor(interface: u8, length: u16) -> Self {
        Self {
            bm_request_type: Self::DEVICE_TO_HOST | 0x01,
            b_request: Self::GET_DESCRIPTOR,
            w_value: u16::from(DESC_TYPE_HID_REPORT) << 8,
            w_index: u16::from(interface),
            w_length: length,
        }
    }

    pub fn get_descriptor(desc_type: u8, index: u8, length: u16) -> Self {
        Self {
            bm_request_type: Self::DEVICE_TO_HOST,
            b_request: Self::GET_DESCRIPTOR,
            w_value: (u16::from(desc_type) << 8) | u16::from(index),
            w_index: 0,
            w_length: length,
        }
    }

    pub fn set_address(addr: u8) -> Self {
        Self {
            bm_request_type: Self::HOST_TO_DEVICE,
            b_request: Self::SET_ADDRESS,
            w_value: u16::from(addr),
            w_index: 0,
            w_length: 0,
        }
    }

    pub fn set_configuration(value: u8) -> Self {
        Self {
            bm_request_type: Self::HOST_TO_DEVICE,
            b_request: Self::SET_CONFIGURATION,
            w_value: u16::from(value),
            w_index: 0,
            w_length: 0,
        }
    }

    pub fn set_idle(interface: u8) -> Self {
        Self {
            bm_request_type: Self::CLASS_INTERFACE_OUT,
            b_request: Self::SET_IDLE,
            w_value: 0,
            w_index: u16::from(interface),
            w_length: 0,
        }
    }

    pub fn set_report_output(interface: u8, length: u16) -> Self {
        Self {
            bm_request_type: Self::CLASS_INTERFACE_OUT,
            b_request: Self::SET_REPORT,
            w_value: 0x0200,
            w_index: u16::from(interface),
            w_length: length,
        }
    }

    pub fn clear_endpoint_halt(ep_addr: u8) -> Self {
        Self {
            bm_request_type: 0x02,
            b_request: Self::CLEAR_FEATURE,
            w_value: Self::ENDPOINT_HALT,
            w_index: u16::from(ep_addr),
            w_length: 0,
        }
    }
}

/// First 8 bytes of the device descriptor, enough to learn EP0's max
/// packet size before the rest is read.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceDescriptorHead {
    pub b_length: u8,
    pub b_descriptor_type: u8,
    pub bcd_usb: u16,
    pub b_device_class: u8,
    pub b_device_sub_class: u8,
    pub b_device_protocol: u8,
    pub b_max_packet_size0: u8,
}

impl DeviceDescriptorHead {
    pub fn parse(raw: &[u8]) -> Option<Self> {
        if raw.len() < 8 {
            return None;
        }
        Some(Self {
            b_length: raw[0],
            b_descriptor_type: raw[1],
            bcd_usb: u16::from_le_bytes([raw[2], raw[3]]),
            b_device_class: raw[4],
            b_device_sub_class: raw[5],
            b_device_protocol: raw[6],
            b_max_packet_size0: raw[7],
        })
    }
}

/// Full 18-byte device descriptor.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceDescriptor {
    pub head: DeviceDescriptorHead,
    pub id_vendor: u16,
    pub id_product: u16,
    pub bcd_device: u16,
    pub b_num_configurations: u8,
}

impl DeviceDescriptor {
    pub fn parse(raw: &[u8]) -> Option<Self> {
        if raw.len() < 18 {
            return None;
        }
        Some(Self {
            head: DeviceDescriptorHead::parse(raw)?,
            id_vendor: u16::from_le_bytes([raw[8], raw[9]]),
            id_product: u16::from_le_bytes([raw[10], raw[11]]),
            bcd_device: u16::from_le_bytes([raw[12], raw[13]]),
            b_num_configurations: raw[17],
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigurationDescriptorHead {
    pub b_length: u8,
    pub b_descriptor_type: u8,
    pub w_total_length: u16,
    pub b_num_interfaces: u8,
    pub b_configuration_value: u8,
}

impl ConfigurationDescriptorHead {
    pub fn parse(raw: &[u8]) -> Option<Self> {
        if raw.len() < 9 {
            return None;
        }
        Some(Self {
            b_length: raw[0],
            b_descriptor_type: raw[1],
            w_total_length: u16::from_le_bytes([raw[2], raw[3]]),
            b_num_interfaces: raw[4],
            b_configuration_value: raw[5],
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InterfaceDescriptor {
    pub b_interface_number: u8,
    pub b_num_endpoints: u8,
    pub b_interface_class: u8,
    pub b_interface_sub_class: u8,
    pub b_interface_protocol: u8,
}

impl InterfaceDescriptor {
    pub fn parse(raw: &[u8]) -> Option<Self> {
        if raw.len() < 9 {
            return None;
        }
        Some(Self {
            b_interface_number: raw[2],
            b_num_endpoints: raw[4],
            b_interface_class: raw[5],
            b_interface_sub_class: raw[6],
            b_interface_protocol: raw[7],
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EndpointDescriptor {
    pub b_endpoint_address: u8,
    pub bm_attributes: u8,
    pub w_max_packet_size: u16,
    pub b_interval: u8,
}

impl EndpointDescriptor {
    pub fn parse(raw: &[u8]) -> Option<Self> {
        if raw.len() < 7 {
            return None;
        }
        Some(Self {
            b_endpoint_address: raw[2],
            bm_attributes: raw[3],
            w_max_packet_size: u16::from_le_bytes([raw[4], raw[5]]),
            b_interval: raw[6],
        })
    }
}
