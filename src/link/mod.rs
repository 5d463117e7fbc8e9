//! Byte framing to and from the host-controller chip.
//!
//! The chip speaks one of two wire dialects. Both expose the same
//! [`ChipLink`] operation set so everything above this layer (`chip`,
//! `usb`, ...) is dialect-agnostic -- the "one trait, two implementations"
//! collapse called for instead of duplicating the chip layer per dialect.

pub mod dialect_a;
pub mod dialect_b;

use crate::error::Result;

/// Per-byte read timeout floor (ms). Platforms may wait longer but never
/// shorter without risking spurious timeouts on a slow link.
pub const READ_TIMEOUT_MS: u32 = 50;
/// FIFO-full write timeout floor (ms).
pub const WRITE_TIMEOUT_MS: u32 = 100;

/// Platform-provided transport for dialect A: a 9-bit-wide bus where bit 8
/// marks a word as command (1) or data (0).
pub trait NineBitBus {
    fn write_word(&mut self, val: u16) -> Result<()>;
    fn read_word(&mut self, timeout_ms: u32) -> Result<u16>;
    /// Returns whether the optional interrupt line is asserted. May always
    /// return `false` on platforms without one wired up.
    fn query_int(&mut self) -> bool {
        false
    }
    /// Reconfigures the link. Only valid while no operation is in flight.
    fn set_baud(&mut self, baud: u32) -> Result<()>;
}

/// Platform-provided transport for dialect B: a plain byte-oriented bus.
/// Commands are marked by a sync prefix at the `ChipLink` layer, not here.
pub trait SerialBus {
    fn write_byte(&mut self, b: u8) -> Result<()>;
    fn read_byte(&mut self, timeout_ms: u32) -> Result<u8>;
    fn query_int(&mut self) -> bool {
        false
    }
    fn set_baud(&mut self, baud: u32) -> Result<()>;
}

/// The dialect-agnostic operation set every chip-link implementation
/// exposes to `ChipCtx`. Every command write is atomic: a caller never
/// observes a command word interleaved with another caller's data word.
pub trait ChipLink {
    fn write_cmd(&mut self, cmd: u8) -> Result<()>;
    fn write_data(&mut self, data: u8) -> Result<()>;
    fn read_byte(&mut self) -> Result<u8>;
    fn query_int(&mut self) -> bool;
    fn set_baud(&mut self, baud: u32) -> Result<()>;

    /// Distinguishes dialect B (minimum baud table, `WR_HOST_DATA` for
    /// block writes) from dialect A at the one or two points above this
    /// layer that cannot stay dialect-agnostic. Defaults to dialect A.
    fn is_dialect_b(&self) -> bool {
        false
    }
}
