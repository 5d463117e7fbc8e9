//! USB host-side protocol layer: descriptors, the enumerated device model,
//! and the transfer/enumeration engines built on top of `ChipCtl`.

pub mod descriptors;
pub mod device;
pub mod enumerate;
pub mod xfer;

pub use descriptors::SetupPacket;
pub use device::{DeviceSpeed, Endpoint, Interface, TransferType, UsbDevice};
pub use enumerate::Enumerator;
pub use xfer::HostXfer;
