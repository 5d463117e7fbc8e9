//! Chip command opcode and status-byte tables. Bit-exact; do not renumber.

use num_enum::TryFromPrimitive;

pub const GET_VERSION: u8 = 0x01;
pub const SET_BAUD: u8 = 0x02;
pub const SET_SPEED: u8 = 0x04;
pub const CHECK_EXIST: u8 = 0x06;
pub const GET_DEV_RATE: u8 = 0x0A;
pub const SET_RETRY: u8 = 0x0B;
pub const SET_ADDR: u8 = 0x13;
pub const SET_MODE: u8 = 0x15;
pub const TEST_CONNECT: u8 = 0x16;
pub const ABORT_NAK: u8 = 0x17;
pub const GET_STATUS: u8 = 0x22;
pub const UNLOCK: u8 = 0x23;
pub const RD_DATA: u8 = 0x28;
pub const WR_USB_DATA7: u8 = 0x2B;
pub const WR_HOST_DATA: u8 = 0x2C;
pub const ISSUE_TKN_X: u8 = 0x4E;
pub const CMD_RET_OK: u8 = 0x51;
pub const CMD_RET_FAIL: u8 = 0x5F;

/// `check_exist` always probes with this byte; the chip must echo its
/// bitwise complement.
pub const CHECK_EXIST_PROBE: u8 = 0x65;

/// Status byte semantics (`ChipCtl::get_status` / `wait_int`).
pub const INT_SUCCESS: u8 = 0x14;
pub const INT_CONNECT: u8 = 0x15;
pub const INT_DISCONNECT: u8 = 0x16;
pub const INT_BUF_OVER: u8 = 0x17;
pub const INT_USB_READY: u8 = 0x18;

/// Any status of the form `pid | 0x20` encodes a PID-specific result.
pub const PID_STATUS_MASK: u8 = 0x20;

pub const PID_SETUP: u8 = 0x0D;
pub const PID_IN: u8 = 0x09;
pub const PID_OUT: u8 = 0x01;
pub const PID_NAK: u8 = 0x0A;
pub const PID_STALL: u8 = 0x0E;
pub const PID_ACK: u8 = 0x02;

pub const fn pid_status(pid: u8) -> u8 {
    pid | PID_STATUS_MASK
}

/// The PID-specific status byte decoded back into a typed value, for
/// callers that want to `match` rather than compare against
/// `pid_status(..)` constants one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum RawPid {
    Setup = PID_SETUP,
    In = PID_IN,
    Out = PID_OUT,
    Nak = PID_NAK,
    Stall = PID_STALL,
    Ack = PID_ACK,
}

impl RawPid {
    pub fn from_status(status: u8) -> Option<Self> {
        if status & PID_STATUS_MASK == 0 {
            return None;
        }
        Self::try_from_primitive(status & !PID_STATUS_MASK).ok()
    }
}

/// Fixed baud table, Dialect A. Every entry must be reachable -- the
/// original driver has an unreachable `921600` case from a missing
/// `break`; that bug is not reproduced here.
pub const BAUD_TABLE_DIALECT_A: [u32; 8] = [
    9_600, 19_200, 57_600, 115_200, 460_800, 921_600, 1_000_000, 2_000_000,
];

/// Minimum baud table, Dialect B.
pub const BAUD_TABLE_DIALECT_B: [u32; 2] = [9_600, 115_200];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsbMode {
    NoSof,
    SofAuto,
    Reset,
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speed {
    Low,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryLevel {
    None,
    RetryShort,
    RetryInfinite,
}

impl RetryLevel {
    /// Exact wire encoding for `SET_RETRY`: sentinel `0x25` followed by the
    /// level byte.
    pub const fn encode(self) -> [u8; 2] {
        let level = match self {
            RetryLevel::None => 0x05,
            RetryLevel::RetryShort => 0xC0,
            RetryLevel::RetryInfinite => 0x85,
        };
        [0x25, level]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectState {
    Connected,
    Disconnected,
    UsbReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pid {
    Setup,
    In,
    Out,
}

impl Pid {
    pub const fn wire(self) -> u8 {
        match self {
            Pid::Setup => PID_SETUP,
            Pid::In => PID_IN,
            Pid::Out => PID_OUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_pid_decodes_status_byte() {
        assert_eq!(RawPid::from_status(pid_status(PID_NAK)), Some(RawPid::Nak));
        assert_eq!(RawPid::from_status(pid_status(PID_STALL)), Some(RawPid::Stall));
    }

    #[test]
    fn raw_pid_rejects_non_pid_status() {
        assert_eq!(RawPid::from_status(INT_SUCCESS), None);
    }

    #[test]
    fn retry_level_encodes_with_sentinel_prefix() {
        assert_eq!(RetryLevel::None.encode(), [0x25, 0x05]);
        assert_eq!(RetryLevel::RetryShort.encode(), [0x25, 0xC0]);
        assert_eq!(RetryLevel::RetryInfinite.encode(), [0x25, 0x85]);
    }
}
