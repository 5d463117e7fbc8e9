//! HID report descriptor item walker and field locator.
//!
//! Grounded on the HID usage-table walking style in
//! `usbd-human-interface-device`'s mouse/keyboard report descriptors
//! (`HID_BOOT_MOUSE_REPORT_DESCRIPTOR` et al.), generalized here into a
//! runtime walker since this host parses descriptors it does not control
//! rather than emitting a fixed one.

use crate::error::{ProtocolError, Result};

const TAG_BEGIN_COLLECTION: u8 = 0x0A; // item tag bits 4-7 == 0xA, type == Main
const TAG_INPUT: u8 = 0x08;
const TAG_OUTPUT: u8 = 0x09;
const TAG_USAGE_PAGE: u8 = 0x00; // type == Global
const TAG_USAGE: u8 = 0x00; // type == Local
const TAG_LOGICAL_MIN: u8 = 0x01;
const TAG_LOGICAL_MAX: u8 = 0x02;
const TAG_REPORT_SIZE: u8 = 0x07;
const TAG_REPORT_ID: u8 = 0x08;
const TAG_REPORT_COUNT: u8 = 0x09;

const TYPE_MAIN: u8 = 0;
const TYPE_GLOBAL: u8 = 1;
const TYPE_LOCAL: u8 = 2;

const USAGE_PAGE_GENERIC_DESKTOP: u32 = 0x01;
const USAGE_PAGE_BUTTON: u32 = 0x09;

const USAGE_GENERIC_DESKTOP_X: u32 = 0x30;
const USAGE_GENERIC_DESKTOP_Y: u32 = 0x31;
const USAGE_GENERIC_DESKTOP_WHEEL: u32 = 0x38;
const USAGE_GENERIC_DESKTOP_MOUSE: u32 = 0x02;
const USAGE_GENERIC_DESKTOP_KEYBOARD: u32 = 0x06;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Mouse,
    Keyboard,
    NotSupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HidItem {
    pub item_type: u8,
    pub tag: u8,
    pub size: usize,
    pub payload: u32,
}

/// Walks one short or long item starting at `cursor`. Returns the item and
/// the offset of the next item. `None` on any overrun.
pub fn fetch_item(buf: &[u8], cursor: usize) -> Option<(HidItem, usize)> {
    if cursor >= buf.len() {
        return None;
    }
    let prefix = buf[cursor];
    let tag_bits = (prefix >> 4) & 0x0F;
    let type_bits = (prefix >> 2) & 0x03;
    let size_code = prefix & 0x03;

    if tag_bits == 0x0F && type_bits == 0x03 {
        // Long item: prefix(1) + data_len(1) + tag(1) + data[data_len]
        let len_off = cursor + 1;
        if len_off >= buf.len() {
            return None;
        }
        let data_len = buf[len_off] as usize;
        let tag_off = len_off + 1;
        if tag_off >= buf.len() {
            return None;
        }
        let tag = buf[tag_off];
        let body_start = tag_off + 1;
        let body_end = body_start + data_len;
        if body_end > buf.len() {
            return None;
        }
        return Some((
            HidItem {
                item_type: 3,
                tag,
                size: data_len,
                payload: body_start as u32,
            },
            body_end,
        ));
    }

    let size = match size_code {
        0 => 0,
        1 => 1,
        2 => 2,
        _ => 4,
    };
    let start = cursor + 1;
    let end = start + size;
    if end > buf.len() {
        return None;
    }
    let mut payload = 0u32;
    for (i, &b) in buf[start..end].iter().enumerate() {
        payload |= u32::from(b) << (8 * i);
    }
    Some((
        HidItem {
            item_type: type_bits,
            tag: tag_bits,
            size,
            payload,
        },
        end,
    ))
}

#[derive(Debug, Clone, Copy, Default)]
struct GlobalState {
    usage_page: u32,
    logical_min: i32,
    logical_max: i32,
    report_size: u32,
    report_count: u32,
    report_id_present: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct DataDescriptor {
    pub logical_min: i32,
    pub logical_max: i32,
    pub size_bits: u32,
    pub count: u32,
    pub byte_offset: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MouseFields {
    pub button: Option<DataDescriptor>,
    pub orientation: Option<DataDescriptor>,
    pub wheel: Option<DataDescriptor>,
    pub report_id_declared: bool,
}

/// Detects whether a report descriptor describes a mouse, a keyboard, or
/// neither. Prefers the collection-usage signal; falls back to the
/// input/output-item heuristic when no mouse/keyboard collection is found.
pub fn detect_class(buf: &[u8]) -> DeviceClass {
    let mut cursor = 0usize;
    let mut usage_page = 0u32;
    let mut last_usage = 0u32;
    let mut saw_input = false;
    let mut saw_output = false;

    while let Some((item, next)) = fetch_item(buf, cursor) {
        match (item.item_type, item.tag) {
            (TYPE_GLOBAL, TAG_USAGE_PAGE) => usage_page = item.payload,
            (TYPE_LOCAL, TAG_USAGE) => last_usage = item.payload,
            (TYPE_MAIN, TAG_BEGIN_COLLECTION) => {
                if usage_page == USAGE_PAGE_GENERIC_DESKTOP {
                    if last_usage == USAGE_GENERIC_DESKTOP_MOUSE {
                        return DeviceClass::Mouse;
                    }
                    if last_usage == USAGE_GENERIC_DESKTOP_KEYBOARD {
                        return DeviceClass::Keyboard;
                    }
                }
            }
            (TYPE_MAIN, TAG_INPUT) => saw_input = true,
            (TYPE_MAIN, TAG_OUTPUT) => saw_output = true,
            _ => {}
        }
        cursor = next;
    }

    if saw_input && saw_output {
        DeviceClass::Keyboard
    } else if saw_input {
        DeviceClass::Mouse
    } else {
        DeviceClass::NotSupported
    }
}

/// Locates the button/orientation/wheel fields for a mouse application
/// collection. A single linear pass accumulates global state and a local
/// usage ring that is cleared at every INPUT item, per the HID item model.
pub fn locate_mouse_fields(buf: &[u8]) -> Result<MouseFields> {
    let mut cursor = 0usize;
    let mut global = GlobalState::default();
    let mut usages: heapless::Vec<u32, 8> = heapless::Vec::new();
    let mut bit_offset: u32 = 0;
    let mut fields = MouseFields::default();

    while let Some((item, next)) = fetch_item(buf, cursor) {
        match (item.item_type, item.tag) {
            (TYPE_GLOBAL, TAG_USAGE_PAGE) => global.usage_page = item.payload,
            (TYPE_GLOBAL, TAG_LOGICAL_MIN) => global.logical_min = item.payload as i32,
            (TYPE_GLOBAL, TAG_LOGICAL_MAX) => global.logical_max = item.payload as i32,
            (TYPE_GLOBAL, TAG_REPORT_SIZE) => global.report_size = item.payload,
            (TYPE_GLOBAL, TAG_REPORT_COUNT) => global.report_count = item.payload,
            (TYPE_GLOBAL, TAG_REPORT_ID) => {
                global.report_id_present = true;
                fields.report_id_declared = true;
            }
            (TYPE_LOCAL, TAG_USAGE) => {
                let _ = usages.push(item.payload);
            }
            (TYPE_MAIN, TAG_INPUT) => {
                let is_button = global.usage_page == USAGE_PAGE_BUTTON;
                let has_x = usages.contains(&USAGE_GENERIC_DESKTOP_X);
                let has_y = usages.contains(&USAGE_GENERIC_DESKTOP_Y);
                let has_wheel = usages.contains(&USAGE_GENERIC_DESKTOP_WHEEL);

                if is_button && fields.button.is_none() {
                    fields.button = Some(DataDescriptor {
                        logical_min: global.logical_min,
                        logical_max: global.logical_max,
                        size_bits: global.report_size,
                        count: global.report_count,
                        byte_offset: bit_offset / 8,
                    });
                } else if global.usage_page == USAGE_PAGE_GENERIC_DESKTOP && has_x && has_y {
                    fields.orientation = Some(DataDescriptor {
                        logical_min: global.logical_min,
                        logical_max: global.logical_max,
                        size_bits: global.report_size,
                        count: 2,
                        byte_offset: bit_offset / 8,
                    });
                    if has_wheel && global.report_count >= 3 {
                        let wheel_bit = bit_offset + global.report_size * 2;
                        fields.wheel = Some(DataDescriptor {
                            logical_min: global.logical_min,
                            logical_max: global.logical_max,
                            size_bits: global.report_size,
                            count: 1,
                            byte_offset: wheel_bit / 8,
                        });
                    }
                } else if global.usage_page == USAGE_PAGE_GENERIC_DESKTOP
                    && has_wheel
                    && fields.wheel.is_none()
                {
                    fields.wheel = Some(DataDescriptor {
                        logical_min: global.logical_min,
                        logical_max: global.logical_max,
                        size_bits: global.report_size,
                        count: 1,
                        byte_offset: bit_offset / 8,
                    });
                }

                bit_offset += global.report_size * global.report_count;
                usages.clear();
            }
            _ => {}
        }
        cursor = next;
    }

    if fields.button.is_none() && fields.orientation.is_none() {
        return Err(ProtocolError::NotSupported);
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A minimal boot-mouse report descriptor: usage page Generic Desktop,
    /// usage Mouse, collection application > collection physical, button
    /// page input (3 buits + 5 pad), X/Y input (8-bit signed, count 2).
    #[rustfmt::skip]
    const BOOT_MOUSE: [u8; 34] = [
        0x05, 0x01,       // Usage Page (Generic Desktop)
        0x09, 0x02,       // Usage (Mouse)
        0xA1, 0x01,       // Collection (Application)
        0x09, 0x01,       //   Usage (Pointer)
        0xA1, 0x00,       //   Collection (Physical)
        0x05, 0x09,       //     Usage Page (Button)
        0x19, 0x01,       //     Usage Minimum (1)
        0x29, 0x03,       //     Usage Maximum (3)
        0x15, 0x00,       //     Logical Minimum (0)
        0x25, 0x01,       //     Logical Maximum (1)
        0x95, 0x03,       //     Report Count (3)
        0x75, 0x01,       //     Report Size (1)
        0x81, 0x02,       //     Input (Data,Var,Abs)
        0x95, 0x01,       //     Report Count (1)
        0x75, 0x05,       //     Report Size (5)
        0x81, 0x03,       //     Input (Const,Var,Abs) -- padding
        0xC0,             //   End Collection
        0xC0,             // End Collection
    ];

    #[test]
    fn fetch_item_consumes_exact_prefix_and_payload() {
        let (item, next) = fetch_item(&BOOT_MOUSE, 0).unwrap();
        assert_eq!(item.item_type, TYPE_GLOBAL);
        assert_eq!(item.payload, 0x01);
        assert_eq!(next, 2);
    }

    #[test]
    fn detect_class_finds_mouse_collection() {
        assert_eq!(detect_class(&BOOT_MOUSE), DeviceClass::Mouse);
    }

    #[test]
    fn walker_never_overruns_buffer() {
        let mut cursor = 0;
        let mut total = 0;
        while let Some((item, next)) = fetch_item(&BOOT_MOUSE, cursor) {
            total += next - cursor;
            cursor = next;
            let _ = item;
        }
        assert_eq!(total, BOOT_MOUSE.len());
    }
}
