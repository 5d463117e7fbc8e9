//! The enumerated device model: bounded interface/endpoint tables the same
//! way the teacher bounds its interface list with `heapless::Vec` rather
//! than a heap-growable `Vec`.

use alloc::vec::Vec;

use heapless::Vec as HVec;

use crate::error::{ProtocolError, Result};

pub const MAX_INTERFACES: usize = 4;
pub const MAX_ENDPOINTS: usize = 4;

/// Fixed address assigned to every enumerated device; this host never pools
/// addresses because each channel drives exactly one downstream device.
pub const FIXED_DEVICE_ADDRESS: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSpeed {
    Low,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferType {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

impl TransferType {
    pub fn from_attributes(attrs: u8) -> Self {
        match attrs & 0x03 {
            0 => TransferType::Control,
            1 => TransferType::Isochronous,
            2 => TransferType::Bulk,
            _ => TransferType::Interrupt,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub address: u8,
    pub transfer_type: TransferType,
    pub max_packet: u16,
    pub interval: u8,
    pub data_toggle: bool,
}

impl Endpoint {
    pub fn is_in(&self) -> bool {
        self.address & 0x80 != 0
    }

    pub fn number(&self) -> u8 {
        self.address & 0x0F
    }

    pub fn reset_toggle(&mut self) {
        self.data_toggle = false;
    }

    pub fn flip_toggle(&mut self) {
        self.data_toggle = !self.data_toggle;
    }
}

#[derive(Debug, Clone, Default)]
pub struct Interface {
    pub number: u8,
    pub class: u8,
    pub sub_class: u8,
    pub protocol: u8,
    pub endpoints: HVec<Endpoint, MAX_ENDPOINTS>,
    /// `wDescriptorLength` of the interface's embedded HID descriptor, if
    /// one was present in the configuration tree.
    pub hid_report_length: Option<u16>,
}

impl Interface {
    pub fn push_endpoint(&mut self, ep: Endpoint) -> Result<()> {
        self.endpoints.push(ep).map_err(|_| ProtocolError::NotSupported)
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            address: 0,
            transfer_type: TransferType::Control,
            max_packet: 0,
            interval: 0,
            data_toggle: false,
        }
    }
}

pub struct UsbDevice {
    pub vendor_id: u16,
    pub product_id: u16,
    pub speed: DeviceSpeed,
    pub ep0_max_packet: u16,
    pub address: u8,
    pub configuration_value: u8,
    pub raw_device_descriptor: [u8; 18],
    pub raw_configuration_descriptor: Vec<u8>,
    pub interfaces: HVec<Interface, MAX_INTERFACES>,
    pub connected: bool,
    pub configured: bool,
}

impl UsbDevice {
    pub fn empty() -> Self {
        Self {
            vendor_id: 0,
            product_id: 0,
            speed: DeviceSpeed::Full,
            ep0_max_packet: 8,
            address: 0,
            configuration_value: 0,
            raw_device_descriptor: [0; 18],
            raw_configuration_descriptor: Vec::new(),
            interfaces: HVec::new(),
            connected: false,
            configured: false,
        }
    }

    pub fn push_interface(&mut self, iface: Interface) -> Result<()> {
        self.interfaces
            .push(iface)
            .map_err(|_| ProtocolError::NotSupported)
    }

    /// Linear search for an endpoint by address, direction bit included.
    /// `ep_addr == 0` is rejected: EP0 is implicit and never appears here.
    pub fn get_endpoint_mut(&mut self, ep_addr: u8) -> Result<&mut Endpoint> {
        if ep_addr == 0 {
            return Err(ProtocolError::ParamInvalid);
        }
        for iface in self.interfaces.iter_mut() {
            for ep in iface.endpoints.iter_mut() {
                if ep.address == ep_addr {
                    return Ok(ep);
                }
            }
        }
        Err(ProtocolError::NotFound)
    }

    pub fn get_endpoint(&self, ep_addr: u8) -> Result<&Endpoint> {
        if ep_addr == 0 {
            return Err(ProtocolError::ParamInvalid);
        }
        for iface in self.interfaces.iter() {
            for ep in iface.endpoints.iter() {
                if ep.address == ep_addr {
                    return Ok(ep);
                }
            }
        }
        Err(ProtocolError::NotFound)
    }

    pub fn reset(&mut self) {
        *self = Self::empty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_endpoint_rejects_zero() {
        let dev = UsbDevice::empty();
        assert_eq!(dev.get_endpoint(0), Err(ProtocolError::ParamInvalid));
    }

    #[test]
    fn get_endpoint_distinguishes_direction() {
        let mut dev = UsbDevice::empty();
        let mut iface = Interface::default();
        iface
            .push_endpoint(Endpoint {
                address: 0x81,
                transfer_type: TransferType::Interrupt,
                max_packet: 8,
                interval: 10,
                data_toggle: false,
            })
            .unwrap();
        iface
            .push_endpoint(Endpoint {
                address: 0x01,
                transfer_type: TransferType::Interrupt,
                max_packet: 8,
                interval: 10,
                data_toggle: false,
            })
            .unwrap();
        dev.push_interface(iface).unwrap();
        assert!(dev.get_endpoint(0x81).unwrap().is_in());
        assert!(!dev.get_endpoint(0x01).unwrap().is_in());
    }

    #[test]
    fn flip_toggle_alternates() {
        let mut ep = Endpoint::default();
        assert!(!ep.data_toggle);
        ep.flip_toggle();
        assert!(ep.data_toggle);
        ep.flip_toggle();
        assert!(!ep.data_toggle);
    }
}
