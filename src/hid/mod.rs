//! HID report descriptor parsing and report decoding.

pub mod decoder;
pub mod parser;

pub use decoder::UsbHidDevice;
pub use parser::{detect_class, fetch_item, locate_mouse_fields, DataDescriptor, DeviceClass, HidItem, MouseFields};
