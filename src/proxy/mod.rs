//! `Proxy`: the top-level cooperative scheduler tying both channels, the
//! HID decoders, the recoil sequencer, and the output sink together.
//!
//! Grounded on the `run()` poll loop in `vapor-keeb-async-usb-host`'s
//! keyboard driver (issue transfer, handle NAK, dispatch on result) and on
//! `main.c`'s `loopHandleDevices`/`waitAllDevicesConnect` structure from
//! the original firmware for the connect-wait state machine and the
//! channel layout (`IFACE_MOUSE = 0`, `IFACE_KEYBOARD = 1`).

pub mod hotkeys;

use log::{info, warn};

use crate::chip::{ChipCtx, Clock};
use crate::error::{ProtocolError, Result};
use crate::hid::{self, DeviceClass, UsbHidDevice};
use crate::link::ChipLink;
use crate::recoil::RecoilSequence;
use crate::sink::{OutputSink, ReportTransport, SinkInterface};
use crate::usb::enumerate::Enumerator;
use crate::usb::xfer::HostXfer;
use crate::usb::UsbDevice;

/// One host-controller channel: its chip link, the device it has
/// enumerated (if any), and the HID decoder bound to that device's report
/// endpoint. Exclusively owned; never shared across channels.
pub struct ChannelCtx<L: ChipLink, C: Clock> {
    chip: ChipCtx<L, C>,
    device: Option<UsbDevice>,
    hid: Option<UsbHidDevice>,
    is_keyboard: bool,
}

impl<L: ChipLink, C: Clock> ChannelCtx<L, C> {
    pub fn new(chip: ChipCtx<L, C>, is_keyboard: bool) -> Self {
        Self {
            chip,
            device: None,
            hid: None,
            is_keyboard,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.device.is_some()
    }

    fn try_open(&mut self) -> Result<()> {
        self.chip.check_exist()?;
        let enumerator = Enumerator::new(&self.chip);
        let device = enumerator.open(self.is_keyboard)?;

        let (iface_number, report_len, hid_report_length) = {
            let iface = device
                .interfaces
                .first()
                .ok_or(ProtocolError::NotSupported)?;
            let in_ep = iface
                .endpoints
                .iter()
                .find(|ep| ep.is_in())
                .ok_or(ProtocolError::NotSupported)?;
            (iface.number, in_ep.max_packet as usize, iface.hid_report_length)
        };

        let report_descriptor = match hid_report_length {
            Some(len) if len > 0 => enumerator
                .fetch_report_descriptor(iface_number, len, device.ep0_max_packet)
                .unwrap_or_default(),
            _ => alloc::vec::Vec::new(),
        };

        let mouse_fields = if !self.is_keyboard && !report_descriptor.is_empty() {
            hid::locate_mouse_fields(&report_descriptor).ok()
        } else {
            None
        };
        let class = if report_descriptor.is_empty() {
            if self.is_keyboard {
                DeviceClass::Keyboard
            } else {
                DeviceClass::Mouse
            }
        } else {
            hid::detect_class(&report_descriptor)
        };

        let hid_device = UsbHidDevice::new(class, report_descriptor, report_len, mouse_fields);

        self.device = Some(device);
        self.hid = Some(hid_device);
        Ok(())
    }

    /// Binds a HID device built from an externally-fetched report
    /// descriptor, once one is available. Kept separate from `try_open`
    /// so channels without a report-descriptor fetch path (tests, bare
    /// boot-protocol devices) still enumerate correctly.
    pub fn bind_hid(&mut self, hid: UsbHidDevice) {
        self.hid = Some(hid);
    }

    pub fn close(&mut self) {
        self.device = None;
        self.hid = None;
    }

    fn poll_report(&mut self) -> Result<()> {
        let device = self.device.as_mut().ok_or(ProtocolError::Disconnected)?;
        let hid = self.hid.as_mut().ok_or(ProtocolError::Disconnected)?;
        let iface = device
            .interfaces
            .first_mut()
            .ok_or(ProtocolError::Disconnected)?;
        let ep = iface
            .endpoints
            .iter_mut()
            .find(|ep| ep.is_in())
            .ok_or(ProtocolError::Disconnected)?;
        let xfer = HostXfer::new(&self.chip);
        hid.fetch_report(&xfer, ep)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectState {
    WaitingForBoth,
    Ready,
}

/// Owns both channels, the recoil sequencer, and the output sink. Advances
/// one round-robin tick at a time; the caller's main loop sleeps 1 ms
/// between ticks.
pub struct Proxy<Lm, Cm, Lk, Ck, T>
where
    Lm: ChipLink,
    Cm: Clock,
    Lk: ChipLink,
    Ck: Clock,
    T: ReportTransport,
{
    mouse: ChannelCtx<Lm, Cm>,
    keyboard: ChannelCtx<Lk, Ck>,
    sink: OutputSink<T>,
    recoil: RecoilSequence,
    state: ConnectState,
}

impl<Lm, Cm, Lk, Ck, T> Proxy<Lm, Cm, Lk, Ck, T>
where
    Lm: ChipLink,
    Cm: Clock,
    Lk: ChipLink,
    Ck: Clock,
    T: ReportTransport,
{
    pub fn new(mouse_chip: ChipCtx<Lm, Cm>, keyboard_chip: ChipCtx<Lk, Ck>, transport: T) -> Self {
        Self {
            mouse: ChannelCtx::new(mouse_chip, false),
            keyboard: ChannelCtx::new(keyboard_chip, true),
            sink: OutputSink::new(transport),
            recoil: RecoilSequence::new(),
            state: ConnectState::WaitingForBoth,
        }
    }

    /// Distilled from the original firmware's `waitAllDevicesConnect`
    /// banner loop: attempts to enumerate any channel not yet connected,
    /// and transitions to `Ready` once both are.
    pub fn wait_all_connected(&mut self) -> bool {
        if !self.mouse.is_connected() {
            match self.mouse.try_open() {
                Ok(()) => info!("mouse channel enumerated"),
                Err(ProtocolError::NotFound) => {}
                Err(e) => warn!("mouse enumeration attempt failed: {:?}", e),
            }
        }
        if !self.keyboard.is_connected() {
            match self.keyboard.try_open() {
                Ok(()) => info!("keyboard channel enumerated"),
                Err(ProtocolError::NotFound) => {}
                Err(e) => warn!("keyboard enumeration attempt failed: {:?}", e),
            }
        }

        if self.mouse.is_connected() && self.keyboard.is_connected() {
            self.state = ConnectState::Ready;
            self.sink.mark_configured();
            true
        } else {
            false
        }
    }

    /// One round-robin step: service the mouse channel, then the keyboard
    /// channel. On disconnect, both channels are torn down and recoil
    /// state resets, per the error-handling design.
    pub fn tick(&mut self, now_ms: u32) {
        if self.state != ConnectState::Ready {
            self.wait_all_connected();
            return;
        }

        if let Err(e) = self.service_mouse(now_ms) {
            if e == ProtocolError::Disconnected {
                self.teardown();
                return;
            }
        }
        if let Err(e) = self.service_keyboard() {
            if e == ProtocolError::Disconnected {
                self.teardown();
            }
        }
    }

    fn service_mouse(&mut self, now_ms: u32) -> Result<()> {
        match self.mouse.poll_report() {
            Ok(()) => {}
            Err(ProtocolError::WouldBlock) => {}
            Err(e) => return Err(e),
        }

        if self.recoil.is_enabled() {
            if let Some((dx, dy)) = self.recoil.next(now_ms) {
                if let Some(hid) = self.mouse.hid.as_mut() {
                    // Compensation adds to the player's own motion, it does
                    // not replace it.
                    if let Ok(x) = hid.get_orientation(0) {
                        let _ = hid.set_orientation(0, x.saturating_add(dx));
                    }
                    if let Ok(y) = hid.get_orientation(1) {
                        let _ = hid.set_orientation(1, y.saturating_add(dy));
                    }
                }
            }
        }

        if let Some(hid) = self.mouse.hid.as_ref() {
            if let Ok(report) = hid.to_normalized_mouse() {
                let _ = self.sink.send_report(SinkInterface::Mouse, &report);
            }
        }
        Ok(())
    }

    fn service_keyboard(&mut self) -> Result<()> {
        match self.keyboard.poll_report() {
            Ok(()) => {}
            Err(ProtocolError::WouldBlock) => return Ok(()),
            Err(e) => return Err(e),
        }

        if let Some(hid) = self.keyboard.hid.as_ref() {
            let report = hid.last_report();
            for code in 0..=255u8 {
                if hid.get_key(code).unwrap_or(false) {
                    hotkeys::dispatch(code, &mut self.recoil);
                }
            }
            let _ = self.sink.send_report(SinkInterface::Keyboard, report);
        }
        Ok(())
    }

    fn teardown(&mut self) {
        warn!("device disconnected, tearing down both channels");
        self.mouse.close();
        self.keyboard.close();
        self.recoil.reset();
        self.recoil.disable();
        self.sink.cleanup();
        self.state = ConnectState::WaitingForBoth;
    }

    pub fn recoil(&self) -> &RecoilSequence {
        &self.recoil
    }
}
