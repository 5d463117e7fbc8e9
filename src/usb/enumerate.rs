//! `Enum`: drives a freshly reset link through the fixed enumeration
//! sequence down to a configured `UsbDevice`. Grounded on the
//! `configure()` walk in `vapor-keeb-async-usb-host`'s keyboard driver,
//! generalized to both mouse and keyboard interfaces and extended with the
//! supplemental idle/LED-init step pulled from the original firmware's
//! device bring-up.

use alloc::vec;

use log::{info, warn};

use crate::chip::opcodes::UsbMode;
use crate::chip::{ChipCtx, Clock};
use crate::error::{ProtocolError, Result};
use crate::link::ChipLink;
use crate::usb::descriptors::{
    ConfigurationDescriptorHead, DeviceDescriptorHead, EndpointDescriptor, HidDescriptorBody,
    InterfaceDescriptor, DESC_TYPE_CONFIGURATION, DESC_TYPE_DEVICE, DESC_TYPE_ENDPOINT,
    DESC_TYPE_HID, DESC_TYPE_INTERFACE,
};
use crate::usb::device::{DeviceSpeed, Endpoint, Interface, TransferType, UsbDevice, FIXED_DEVICE_ADDRESS};
use crate::usb::xfer::{HostXfer, XferDirection};

/// All-zero output report used to clear a keyboard's LEDs on attach. Best
/// effort: a device that rejects SET_REPORT here is not held back.
const LED_INIT_REPORT: [u8; 1] = [0x00];

pub struct Enumerator<'a, L: ChipLink, C: Clock> {
    chip: &'a ChipCtx<L, C>,
}

impl<'a, L: ChipLink, C: Clock> Enumerator<'a, L, C> {
    pub fn new(chip: &'a ChipCtx<L, C>) -> Self {
        Self { chip }
    }

    /// Runs the full reset/describe/address/configure sequence. On any
    /// failure the device struct is reset so the caller sees a clean,
    /// unconfigured state rather than a half-built one.
    pub fn open(&self, is_keyboard_channel: bool) -> Result<UsbDevice> {
        match self.try_open(is_keyboard_channel) {
            Ok(dev) => Ok(dev),
            Err(e) => {
                warn!("enumeration failed: {:?}", e);
                Err(e)
            }
        }
    }

    fn try_open(&self, is_keyboard_channel: bool) -> Result<UsbDevice> {
        self.reset_sequence()?;

        let mut dev = UsbDevice::empty();
        dev.connected = true;

        let mut xfer = HostXfer::new(self.chip);

        let mut head_buf = [0u8; 8];
        xfer.get_descriptor_into(DESC_TYPE_DEVICE, 8, &mut head_buf)?;
        let head = DeviceDescriptorHead::parse(&head_buf).ok_or(ProtocolError::IoError)?;
        dev.ep0_max_packet = u16::from(head.b_max_packet_size0.max(8));
        xfer.set_ep0_max_packet(dev.ep0_max_packet);

        let mut full_buf = [0u8; 18];
        xfer.get_descriptor_into(DESC_TYPE_DEVICE, 18, &mut full_buf)?;
        let full = crate::usb::descriptors::DeviceDescriptor::parse(&full_buf)
            .ok_or(ProtocolError::IoError)?;
        dev.vendor_id = full.id_vendor;
        dev.product_id = full.id_product;

        xfer.set_address(FIXED_DEVICE_ADDRESS)?;
        self.chip.set_usb_addr(FIXED_DEVICE_ADDRESS)?;
        dev.address = FIXED_DEVICE_ADDRESS;

        let mut cfg_head_buf = [0u8; 9];
        xfer.get_descriptor_into(DESC_TYPE_CONFIGURATION, 9, &mut cfg_head_buf)?;
        let cfg_head =
            ConfigurationDescriptorHead::parse(&cfg_head_buf).ok_or(ProtocolError::IoError)?;
        let total_len = cfg_head.w_total_length as usize;
        if total_len < 9 {
            return Err(ProtocolError::IoError);
        }

        let mut raw_cfg = vec![0u8; total_len];
        xfer.get_descriptor_into(DESC_TYPE_CONFIGURATION, total_len as u16, &mut raw_cfg)?;

        self.walk_configuration(&raw_cfg, &mut dev)?;
        dev.raw_configuration_descriptor = raw_cfg;
        dev.raw_device_descriptor = full_buf;

        xfer.set_configuration(cfg_head.b_configuration_value)?;
        dev.configuration_value = cfg_head.b_configuration_value;
        dev.configured = true;

        for iface in dev.interfaces.iter() {
            if let Err(e) = xfer.set_idle(iface.number) {
                warn!("SET_IDLE failed on interface {}: {:?}", iface.number, e);
            }
        }
        if is_keyboard_channel {
            if let Some(iface) = dev.interfaces.first() {
                if let Err(e) = xfer.set_report_output(iface.number, &LED_INIT_REPORT) {
                    warn!("keyboard LED init failed (tolerated): {:?}", e);
                }
            }
        }

        info!(
            "enumerated device vid={:#06x} pid={:#06x}, {} interface(s)",
            dev.vendor_id,
            dev.product_id,
            dev.interfaces.len()
        );
        Ok(dev)
    }

    /// Fetches the HID report descriptor for `interface` once enumeration
    /// has recorded its `wDescriptorLength`. `ep0_max_packet` should be the
    /// value `try_open` recorded on the `UsbDevice` for this channel.
    pub fn fetch_report_descriptor(
        &self,
        interface: u8,
        length: u16,
        ep0_max_packet: u16,
    ) -> Result<alloc::vec::Vec<u8>> {
        let mut xfer = HostXfer::new(self.chip);
        xfer.set_ep0_max_packet(ep0_max_packet);
        let mut buf = vec![0u8; length as usize];
        let setup = crate::usb::descriptors::SetupPacket::get_hid_report_descriptor(interface, length);
        xfer.control_transfer(setup, &mut buf, crate::usb::xfer::XferDirection::In)?;
        Ok(buf)
    }

    fn reset_sequence(&self) -> Result<()> {
        self.chip.set_usb_mode(UsbMode::Reset)?;
        self.sleep(20);
        self.chip.set_usb_mode(UsbMode::SofAuto)?;
        let _ = self.chip.wait_int(1_000);
        self.sleep(40);
        if self.chip.get_dev_speed()? == crate::chip::opcodes::Speed::Low {
            self.chip.set_dev_speed(crate::chip::opcodes::Speed::Low)?;
        }
        Ok(())
    }

    fn sleep(&self, ms: u32) {
        self.chip.sleep_ms(ms);
    }

    fn walk_configuration(&self, raw: &[u8], dev: &mut UsbDevice) -> Result<()> {
        let total = raw.len();
        let mut offset = 0usize;
        let mut current_iface: Option<Interface> = None;

        while offset < total {
            if offset + 2 > total {
                break;
            }
            let b_length = raw[offset] as usize;
            let b_type = raw[offset + 1];
            if b_length == 0 || offset + b_length > total {
                return Err(ProtocolError::IoError);
            }
            let item = &raw[offset..offset + b_length];

            match b_type {
                DESC_TYPE_INTERFACE => {
                    if let Some(done) = current_iface.take() {
                        dev.push_interface(done)?;
                    }
                    let id = InterfaceDescriptor::parse(item).ok_or(ProtocolError::IoError)?;
                    current_iface = Some(Interface {
                        number: id.b_interface_number,
                        class: id.b_interface_class,
                        sub_class: id.b_interface_sub_class,
                        protocol: id.b_interface_protocol,
                        endpoints: heapless::Vec::new(),
                        hid_report_length: None,
                    });
                }
                DESC_TYPE_HID => {
                    // Body starts after the 2-byte common header.
                    if let Some(body) = HidDescriptorBody::parse(&item[2..]) {
                        if let Some(iface) = current_iface.as_mut() {
                            iface.hid_report_length = Some(body.w_report_descriptor_length);
                        }
                    }
                }
                DESC_TYPE_ENDPOINT => {
                    let ed = EndpointDescriptor::parse(item).ok_or(ProtocolError::IoError)?;
                    let ep = Endpoint {
                        address: ed.b_endpoint_address,
                        transfer_type: TransferType::from_attributes(ed.bm_attributes),
                        max_packet: ed.w_max_packet_size,
                        interval: ed.b_interval,
                        data_toggle: false,
                    };
                    match current_iface.as_mut() {
                        Some(iface) => iface.push_endpoint(ep)?,
                        None => return Err(ProtocolError::IoError),
                    }
                }
                _ => {
                    // Unknown descriptor type within the configuration tree:
                    // skip, per the fixed-length-prefix walk.
                }
            }

            offset += b_length;
        }

        if let Some(done) = current_iface.take() {
            dev.push_interface(done)?;
        }
        Ok(())
    }
}

/// `UsbDevice::speed` is informational only in dialect-B chips that don't
/// expose a speed query; callers that need it should prefer
/// `ChipCtx::get_dev_speed` directly during enumeration.
pub fn speed_from_chip(low: bool) -> DeviceSpeed {
    if low {
        DeviceSpeed::Low
    } else {
        DeviceSpeed::Full
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chip::opcodes::*;
    use alloc::collections::VecDeque;

    struct MockLink {
        to_read: VecDeque<u8>,
    }
    impl ChipLink for MockLink {
        fn write_cmd(&mut self, _cmd: u8) -> Result<()> {
            Ok(())
        }
        fn write_data(&mut self, _data: u8) -> Result<()> {
            Ok(())
        }
        fn read_byte(&mut self) -> Result<u8> {
            self.to_read.pop_front().ok_or(ProtocolError::Timeout)
        }
        fn query_int(&mut self) -> bool {
            false
        }
        fn set_baud(&mut self, _baud: u32) -> Result<()> {
            Ok(())
        }
    }

    struct FakeClock;
    impl Clock for FakeClock {
        fn now_ms(&self) -> u32 {
            0
        }
        fn busy_wait_us(&self, _us: u32) {}
    }

    #[test]
    fn walk_configuration_rejects_zero_length_item() {
        let chip = ChipCtx::new(
            MockLink {
                to_read: VecDeque::new(),
            },
            FakeClock,
            9_600,
        );
        let en = Enumerator::new(&chip);
        let mut dev = UsbDevice::empty();
        let raw = [9, DESC_TYPE_CONFIGURATION, 9, 0, 1, 1, 0, 0x80, 50, 0, 0];
        assert_eq!(
            en.walk_configuration(&raw, &mut dev),
            Err(ProtocolError::IoError)
        );
    }

    #[test]
    fn walk_configuration_builds_interface_and_endpoint() {
        let chip = ChipCtx::new(
            MockLink {
                to_read: VecDeque::new(),
            },
            FakeClock,
            9_600,
        );
        let en = Enumerator::new(&chip);
        let mut dev = UsbDevice::empty();
        #[rustfmt::skip]
        let raw: [u8; 9 + 9 + 7] = [
            9, DESC_TYPE_CONFIGURATION, 25, 0, 1, 1, 0, 0x80, 50,
            9, DESC_TYPE_INTERFACE, 0, 0, 1, 3, 1, 2, 0,
            7, DESC_TYPE_ENDPOINT, 0x81, 0x03, 8, 0, 10,
        ];
        en.walk_configuration(&raw, &mut dev).unwrap();
        assert_eq!(dev.interfaces.len(), 1);
        assert_eq!(dev.interfaces[0].endpoints.len(), 1);
        assert_eq!(dev.interfaces[0].endpoints[0].address, 0x81);
    }
}
