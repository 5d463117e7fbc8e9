//! Crate-wide error type shared by every layer of the protocol stack.
//!
//! Mirrors the way `usbd-human-interface-device` keeps a single
//! `UsbHidError` and converts into it with `From` impls rather than letting
//! every layer invent its own error enum.

/// Semantic failure categories shared by the link, chip, transfer, and HID
/// layers. Never a panic path: every fallible operation in this crate
/// returns `Result<_, ProtocolError>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Caller-supplied parameter outside the set the operation accepts
    /// (unsupported baud, out-of-range bit index, ...).
    ParamInvalid,
    /// Byte-level link failure (write FIFO full, unexpected echo byte).
    IoError,
    /// No completion within the operation's time budget. Normal for
    /// interrupt IN polling, not for control transfers.
    Timeout,
    /// Lookup failure (no such endpoint, chip absent).
    NotFound,
    /// Descriptor or device shape this crate does not implement (hub,
    /// isochronous endpoint, multi-interface claim, ...).
    NotSupported,
    /// Non-error "nothing to do yet" outcome, e.g. idle interrupt IN NAK.
    WouldBlock,
    /// Endpoint returned STALL; recoverable via `clear_stall`.
    Stall,
    /// Device disconnected mid-transfer; channel must re-enumerate.
    Disconnected,
    /// Heap allocation failed.
    AllocFailed,
    /// Caller accessed a report buffer before the first fetch populated it.
    BufferNotReady,
}

pub type Result<T> = core::result::Result<T, ProtocolError>;
