//! Raw preset tables. Values and `firerounds_sampling` derivations are
//! carried over verbatim from the firmware's pattern tables; only the
//! representation (Rust const arrays instead of C globals) changed.

use num_traits::float::FloatCore;

pub const USB_REPORT_INTERVAL_MS: f32 = 8.0;

#[derive(Debug, Clone, Copy)]
pub struct RawTick {
    pub x: f32,
    pub y: f32,
    pub t_ms: f32,
}

pub struct Preset {
    pub name: &'static str,
    pub raw: &'static [RawTick],
    pub nominal_t_ms: f32,
}

impl Preset {
    pub fn firerounds_sampling(&self) -> u32 {
        (self.nominal_t_ms / USB_REPORT_INTERVAL_MS).round() as u32
    }
}

macro_rules! tick {
    ($x:expr, $y:expr, $t:expr) => {
        RawTick {
            x: $x,
            y: $y,
            t_ms: $t,
        }
    };
}

#[rustfmt::skip]
pub static OW2_SOLDIER76_RAW: [RawTick; 10] = [
    tick!(0.0, -2.0, 111.0), tick!(0.0, -2.5, 111.0), tick!(0.2, -3.0, 111.0),
    tick!(0.3, -3.2, 111.0), tick!(0.3, -3.4, 111.0), tick!(0.2, -3.4, 111.0),
    tick!(0.0, -3.2, 111.0), tick!(-0.2, -3.0, 111.0), tick!(-0.3, -2.8, 111.0),
    tick!(-0.3, -2.6, 111.0),
];

pub static OW2_SOLDIER76: Preset = Preset {
    name: "OW2_Soldier76",
    raw: &OW2_SOLDIER76_RAW,
    nominal_t_ms: 111.0,
};

#[rustfmt::skip]
pub static OW2_CASSIDY_RAW: [RawTick; 2] = [
    tick!(0.0, -6.0, 150.0),
    tick!(0.5, -8.0, 300.0),
];

pub static OW2_CASSIDY: Preset = Preset {
    name: "OW2_Cassidy",
    raw: &OW2_CASSIDY_RAW,
    nominal_t_ms: 150.0,
};

pub fn by_index(idx: u8) -> Option<&'static Preset> {
    match idx {
        0 => Some(&OW2_SOLDIER76),
        1 => Some(&OW2_CASSIDY),
        _ => None,
    }
}
