//! `UsbHidDevice` / `HidDecoder`: the double-buffered report reader and
//! field accessors sitting on top of a parsed descriptor.

use alloc::vec::Vec;

use crate::chip::Clock;
use crate::error::{ProtocolError, Result};
use crate::hid::parser::{DataDescriptor, DeviceClass, MouseFields};
use crate::link::ChipLink;
use crate::usb::device::Endpoint;
use crate::usb::xfer::HostXfer;

const MAX_KEYS: usize = 6;

pub struct UsbHidDevice {
    pub class: DeviceClass,
    pub report_descriptor: Vec<u8>,
    report_len: usize,
    buffer: Vec<u8>,
    current_half: bool,
    mouse_fields: Option<MouseFields>,
    report_id_offset: Option<u32>,
}

impl UsbHidDevice {
    pub fn new(class: DeviceClass, report_descriptor: Vec<u8>, report_len: usize, mouse_fields: Option<MouseFields>) -> Self {
        Self {
            class,
            report_descriptor,
            report_len,
            buffer: alloc::vec![0u8; 2 * report_len],
            current_half: false,
            mouse_fields,
            report_id_offset: if mouse_fields.map(|f| f.report_id_declared).unwrap_or(false) {
                None
            } else {
                Some(0)
            },
        }
    }

    fn current_slice(&self) -> &[u8] {
        let (start, _) = self.halves();
        &self.buffer[start..start + self.report_len]
    }

    fn current_slice_mut(&mut self) -> &mut [u8] {
        let (start, _) = self.halves();
        &mut self.buffer[start..start + self.report_len]
    }

    fn halves(&self) -> (usize, usize) {
        if self.current_half {
            (self.report_len, 0)
        } else {
            (0, self.report_len)
        }
    }

    /// The most recently completed report.
    pub fn last_report(&self) -> &[u8] {
        self.current_slice()
    }

    /// The report before that, for edge/delta comparisons.
    pub fn previous_report(&self) -> &[u8] {
        let (_, prev_start) = self.halves();
        &self.buffer[prev_start..prev_start + self.report_len]
    }

    /// Issues an IN transaction on `ep` with `retry = None`. A NAK (idle
    /// device) surfaces as `WouldBlock`, not an error.
    pub fn fetch_report<L: ChipLink, C: Clock>(
        &mut self,
        xfer: &HostXfer<'_, L, C>,
        ep: &mut Endpoint,
    ) -> Result<()> {
        let mut scratch = [0u8; 64];
        if self.report_len > scratch.len() {
            return Err(ProtocolError::BufferNotReady);
        }
        match xfer.interrupt_in(ep, &mut scratch[..self.report_len], 0) {
            Ok(n) => {
                self.current_half = !self.current_half;
                let len = self.report_len;
                let dst = self.current_slice_mut();
                let take = n.min(len);
                dst[..take].copy_from_slice(&scratch[..take]);
                self.resolve_report_id_offset();
                Ok(())
            }
            Err(ProtocolError::Timeout) => Err(ProtocolError::WouldBlock),
            Err(e) => Err(e),
        }
    }

    /// On the first report after a declared REPORT_ID whose placement is
    /// still unknown, sniff byte 0 against byte 1 to decide whether the
    /// link preserved the ID prefix.
    fn resolve_report_id_offset(&mut self) {
        if self.report_id_offset.is_some() {
            return;
        }
        let report = self.current_slice();
        if report.len() < 2 {
            return;
        }
        self.report_id_offset = Some(if report[0] == 1 && report[1] <= 0x1F { 1 } else { 0 });
    }

    pub fn get_button(&self, n: u8) -> Result<bool> {
        let field = self.button_field()?;
        let (byte_off, bit_off) = (n / 8, n % 8);
        let idx = field.byte_offset as usize + byte_off as usize;
        let byte = *self.current_slice().get(idx).ok_or(ProtocolError::ParamInvalid)?;
        Ok(byte & (1 << bit_off) != 0)
    }

    pub fn set_button(&mut self, n: u8, v: bool) -> Result<()> {
        let field = self.button_field()?;
        let (byte_off, bit_off) = (n / 8, n % 8);
        let idx = field.byte_offset as usize + byte_off as usize;
        let slot = self
            .current_slice_mut()
            .get_mut(idx)
            .ok_or(ProtocolError::ParamInvalid)?;
        if v {
            *slot |= 1 << bit_off;
        } else {
            *slot &= !(1 << bit_off);
        }
        Ok(())
    }

    fn button_field(&self) -> Result<DataDescriptor> {
        let fields = self.mouse_fields.ok_or(ProtocolError::NotSupported)?;
        let mut field = fields.button.ok_or(ProtocolError::NotSupported)?;
        field.byte_offset += self.report_id_offset.unwrap_or(0);
        Ok(field)
    }

    fn orientation_field(&self) -> Result<DataDescriptor> {
        let fields = self.mouse_fields.ok_or(ProtocolError::NotSupported)?;
        let mut field = fields.orientation.ok_or(ProtocolError::NotSupported)?;
        field.byte_offset += self.report_id_offset.unwrap_or(0);
        Ok(field)
    }

    pub fn get_orientation(&self, axis: u8) -> Result<i32> {
        let field = self.orientation_field()?;
        let stride = (field.size_bits / 8) as usize;
        let start = field.byte_offset as usize + axis as usize * stride;
        let bytes = self
            .current_slice()
            .get(start..start + stride)
            .ok_or(ProtocolError::ParamInvalid)?;
        Ok(sign_extend_le(bytes))
    }

    fn wheel_field(&self) -> Result<DataDescriptor> {
        let fields = self.mouse_fields.ok_or(ProtocolError::NotSupported)?;
        let mut field = fields.wheel.ok_or(ProtocolError::NotSupported)?;
        field.byte_offset += self.report_id_offset.unwrap_or(0);
        Ok(field)
    }

    pub fn get_wheel(&self) -> Result<i8> {
        let field = self.wheel_field()?;
        let stride = (field.size_bits / 8).max(1) as usize;
        let start = field.byte_offset as usize;
        let bytes = self
            .current_slice()
            .get(start..start + stride)
            .ok_or(ProtocolError::ParamInvalid)?;
        Ok(sign_extend_le(bytes).clamp(i8::MIN as i32, i8::MAX as i32) as i8)
    }

    pub fn set_orientation(&mut self, axis: u8, v: i32) -> Result<()> {
        let field = self.orientation_field()?;
        let stride = (field.size_bits / 8) as usize;
        let start = field.byte_offset as usize + axis as usize * stride;
        let slice = self
            .current_slice_mut()
            .get_mut(start..start + stride)
            .ok_or(ProtocolError::ParamInvalid)?;
        let bytes = v.to_le_bytes();
        slice.copy_from_slice(&bytes[..stride]);
        Ok(())
    }

    pub fn get_modifier(&self, bit: u8) -> Result<bool> {
        if bit >= 8 {
            return Err(ProtocolError::ParamInvalid);
        }
        let idx = self.report_id_offset.unwrap_or(0) as usize;
        let byte = *self.current_slice().get(idx).ok_or(ProtocolError::ParamInvalid)?;
        Ok(byte & (1 << bit) != 0)
    }

    pub fn set_modifier(&mut self, bit: u8, v: bool) -> Result<()> {
        if bit >= 8 {
            return Err(ProtocolError::ParamInvalid);
        }
        let idx = self.report_id_offset.unwrap_or(0) as usize;
        let slot = self
            .current_slice_mut()
            .get_mut(idx)
            .ok_or(ProtocolError::ParamInvalid)?;
        if v {
            *slot |= 1 << bit;
        } else {
            *slot &= !(1 << bit);
        }
        Ok(())
    }

    fn key_array_offset(&self) -> usize {
        self.report_id_offset.unwrap_or(0) as usize + 2
    }

    /// Linear scan of the 6-key array. Insert goes into the first empty
    /// slot; duplicates are coalesced. A full array silently ignores the
    /// 7th press (six-key rollover).
    pub fn set_key(&mut self, code: u8, down: bool) -> Result<()> {
        let off = self.key_array_offset();
        let slice = self
            .current_slice_mut()
            .get_mut(off..off + MAX_KEYS)
            .ok_or(ProtocolError::ParamInvalid)?;

        if down {
            if slice.iter().any(|&k| k == code) {
                return Ok(());
            }
            if let Some(empty) = slice.iter_mut().find(|k| **k == 0) {
                *empty = code;
            }
        } else {
            if let Some(pos) = slice.iter().position(|&k| k == code) {
                for i in pos..MAX_KEYS - 1 {
                    slice[i] = slice[i + 1];
                }
                slice[MAX_KEYS - 1] = 0;
            }
        }
        Ok(())
    }

    pub fn get_key(&self, code: u8) -> Result<bool> {
        let off = self.key_array_offset();
        let slice = self
            .current_slice()
            .get(off..off + MAX_KEYS)
            .ok_or(ProtocolError::ParamInvalid)?;
        Ok(slice.iter().any(|&k| k == code))
    }

    /// Translates the current report into the normalized 6-byte mouse
    /// output layout: `[buttons, x_lo, x_hi, y_lo, y_hi, wheel]`.
    pub fn to_normalized_mouse(&self) -> Result<[u8; 6]> {
        let buttons = (0..8)
            .map(|n| self.get_button(n).unwrap_or(false) as u8)
            .enumerate()
            .fold(0u8, |acc, (i, b)| acc | (b << i));
        let x = self.get_orientation(0)?.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        let y = self.get_orientation(1)?.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        let wheel = self.get_wheel().unwrap_or(0);

        let mut out = [0u8; 6];
        out[0] = buttons;
        out[1..3].copy_from_slice(&x.to_le_bytes());
        out[3..5].copy_from_slice(&y.to_le_bytes());
        out[5] = wheel as u8;
        Ok(out)
    }
}

fn sign_extend_le(bytes: &[u8]) -> i32 {
    match bytes.len() {
        1 => i32::from(bytes[0] as i8),
        2 => i32::from(i16::from_le_bytes([bytes[0], bytes[1]])),
        4 => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hid::parser::DataDescriptor;

    fn fields() -> MouseFields {
        MouseFields {
            button: Some(DataDescriptor {
                logical_min: 0,
                logical_max: 1,
                size_bits: 1,
                count: 3,
                byte_offset: 0,
            }),
            orientation: Some(DataDescriptor {
                logical_min: -127,
                logical_max: 127,
                size_bits: 8,
                count: 2,
                byte_offset: 1,
            }),
            wheel: None,
            report_id_declared: false,
        }
    }

    #[test]
    fn set_then_get_button_round_trips() {
        let mut dev = UsbHidDevice::new(DeviceClass::Mouse, alloc::vec![], 3, Some(fields()));
        dev.set_button(0, true).unwrap();
        assert!(dev.get_button(0).unwrap());
        assert!(!dev.get_button(1).unwrap());
        dev.set_button(0, false).unwrap();
        assert!(!dev.get_button(0).unwrap());
    }

    #[test]
    fn set_button_does_not_disturb_others() {
        let mut dev = UsbHidDevice::new(DeviceClass::Mouse, alloc::vec![], 3, Some(fields()));
        dev.set_button(0, true).unwrap();
        dev.set_button(2, true).unwrap();
        assert!(dev.get_button(0).unwrap());
        assert!(!dev.get_button(1).unwrap());
        assert!(dev.get_button(2).unwrap());
    }

    #[test]
    fn orientation_round_trips_signed_8_bit() {
        let mut dev = UsbHidDevice::new(DeviceClass::Mouse, alloc::vec![], 3, Some(fields()));
        dev.set_orientation(0, -5).unwrap();
        assert_eq!(dev.get_orientation(0).unwrap(), -5);
        dev.set_orientation(1, 100).unwrap();
        assert_eq!(dev.get_orientation(1).unwrap(), 100);
    }

    #[test]
    fn six_key_rollover_scenario() {
        let mut dev = UsbHidDevice::new(DeviceClass::Keyboard, alloc::vec![], 8, None);
        for c in [4u8, 5, 6, 7, 8, 9] {
            dev.set_key(c, true).unwrap();
        }
        let off = dev.key_array_offset();
        assert_eq!(&dev.current_slice()[off..off + 6], &[4, 5, 6, 7, 8, 9]);

        dev.set_key(10, true).unwrap(); // 7th key ignored
        assert_eq!(&dev.current_slice()[off..off + 6], &[4, 5, 6, 7, 8, 9]);

        dev.set_key(5, false).unwrap(); // release 'b'
        assert_eq!(&dev.current_slice()[off..off + 6], &[4, 6, 7, 8, 9, 0]);
    }

    #[test]
    fn report_id_drift_detection_shifts_button_offset() {
        let mut f = fields();
        f.report_id_declared = true;
        let mut dev = UsbHidDevice::new(DeviceClass::Mouse, alloc::vec![], 4, Some(f));
        assert_eq!(dev.report_id_offset, None);

        {
            let slice = dev.current_slice_mut();
            slice[0] = 0x01;
            slice[1] = 0x02;
        }
        dev.resolve_report_id_offset();
        assert_eq!(dev.report_id_offset, Some(1));
        assert!(dev.get_button(1).unwrap());
    }

    #[test]
    fn to_normalized_mouse_decodes_wheel_byte() {
        let mut f = fields();
        f.wheel = Some(DataDescriptor {
            logical_min: -127,
            logical_max: 127,
            size_bits: 8,
            count: 1,
            byte_offset: 3,
        });
        let mut dev = UsbHidDevice::new(DeviceClass::Mouse, alloc::vec![], 4, Some(f));
        dev.current_slice_mut()[3] = (-7i8) as u8;
        let report = dev.to_normalized_mouse().unwrap();
        assert_eq!(report[5] as i8, -7);
    }

    #[test]
    fn modifier_bit_leaves_others_unchanged() {
        let mut dev = UsbHidDevice::new(DeviceClass::Keyboard, alloc::vec![], 8, None);
        dev.set_modifier(0, true).unwrap();
        dev.set_modifier(3, true).unwrap();
        assert!(dev.get_modifier(0).unwrap());
        assert!(!dev.get_modifier(1).unwrap());
        assert!(dev.get_modifier(3).unwrap());
        assert_eq!(dev.get_modifier(8), Err(ProtocolError::ParamInvalid));
    }
}
