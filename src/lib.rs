//! Dual-channel USB host protocol core for a serial-attached HID proxy.
//!
//! This crate implements the host-chip link framing, the chip command
//! contract, USB control/bulk/interrupt transfer handling, device
//! enumeration, HID report descriptor parsing and decoding, a recoil
//! compensation tick sequencer, and the cooperative scheduler that ties
//! two independent channels (mouse, keyboard) to a downstream output
//! sink. It does not own a UART/PIO driver, a USB device-class stack, or
//! platform bring-up; those are supplied by the firmware embedding this
//! crate through the traits in [`link`], [`chip::Clock`], and [`sink`].
#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod chip;
pub mod error;
pub mod hid;
pub mod link;
pub mod proxy;
pub mod recoil;
pub mod sink;
pub mod usb;

pub use error::{ProtocolError, Result};
