//! `ChipCtl`: the command/response contract shared by both chip dialects.
//!
//! `ChipCtx` wraps a [`ChipLink`] in a [`spin::Mutex`] the same way the
//! teacher crate's logger wraps its display behind a
//! `cortex_m::interrupt::Mutex<RefCell<..>>` -- a single owner, serialized
//! through interior mutability, so a `&ChipCtx` is enough to issue a
//! command/response pair without the caller needing `&mut`.

pub mod opcodes;

use embedded_time::duration::Microseconds;
use log::{trace, warn};
use spin::Mutex;

use crate::error::{ProtocolError, Result};
use crate::link::ChipLink;
use opcodes::*;

/// Adaptive back-off schedule for `wait_int`: (poll_count, wait). Typed in
/// `embedded-time` microseconds rather than a bare `u32` so the unit can't
/// drift silently if a future tier is added.
const BACKOFF_SCHEDULE: [(u32, Microseconds<u32>); 3] = [
    (100, Microseconds(500)),
    (900, Microseconds(1_000)),
    (u32::MAX, Microseconds(2_000)),
];

/// Turnaround delay inserted before the first status read on non-IN
/// tokens (`send_token`).
const TOKEN_TURNAROUND: Microseconds<u32> = Microseconds(500);

/// Platform clock the chip layer needs for timeouts and busy-waits. Kept
/// narrow and out of the `no_std` critical path -- the firmware supplies a
/// monotonic millisecond/microsecond source.
pub trait Clock {
    fn now_ms(&self) -> u32;
    fn busy_wait_us(&self, us: u32);

    fn sleep_ms(&self, ms: u32) {
        self.busy_wait_us(ms.saturating_mul(1_000));
    }
}

struct ChipInner<L: ChipLink> {
    link: L,
    baud: u32,
}

pub struct ChipCtx<L: ChipLink, C: Clock> {
    inner: Mutex<ChipInner<L>>,
    clock: C,
}

impl<L: ChipLink, C: Clock> ChipCtx<L, C> {
    pub fn new(link: L, clock: C, initial_baud: u32) -> Self {
        Self {
            inner: Mutex::new(ChipInner {
                link,
                baud: initial_baud,
            }),
            clock,
        }
    }

    fn with_link<T>(&self, f: impl FnOnce(&mut L) -> Result<T>) -> Result<T> {
        let mut guard = self.inner.lock();
        f(&mut guard.link)
    }

    /// Passthrough to the owned `Clock` for layers above this one
    /// (`HostXfer`'s NAK backoff, `Enumerator`'s reset timing) that need
    /// a real wait but have no clock of their own.
    pub fn sleep_ms(&self, ms: u32) {
        self.clock.sleep_ms(ms);
    }

    /// `check_exist`: send `{CHECK_EXIST, b}`, require the echo `~b`.
    pub fn check_exist(&self) -> Result<()> {
        self.with_link(|link| {
            link.write_cmd(CHECK_EXIST)?;
            link.write_data(CHECK_EXIST_PROBE)?;
            let echo = link.read_byte()?;
            if echo == !CHECK_EXIST_PROBE {
                Ok(())
            } else {
                warn!("check_exist: unexpected echo {:#x}", echo);
                Err(ProtocolError::NotFound)
            }
        })
    }

    pub fn get_version(&self) -> Result<u8> {
        self.with_link(|link| {
            link.write_cmd(GET_VERSION)?;
            let v = link.read_byte()?;
            Ok(v & 0x3F)
        })
    }

    pub fn set_baud(&self, baud: u32) -> Result<()> {
        let mut guard = self.inner.lock();
        let table: &[u32] = if guard.link.is_dialect_b() {
            &BAUD_TABLE_DIALECT_B
        } else {
            &BAUD_TABLE_DIALECT_A
        };
        if !table.contains(&baud) {
            return Err(ProtocolError::ParamInvalid);
        }
        let bytes = baud.to_le_bytes();
        guard.link.write_cmd(SET_BAUD)?;
        guard.link.write_data(bytes[0])?;
        guard.link.write_data(bytes[1])?;
        guard.link.set_baud(baud)?;
        guard.baud = baud;
        Ok(())
    }

    pub fn set_usb_mode(&self, mode: opcodes::UsbMode) -> Result<()> {
        let code = match mode {
            opcodes::UsbMode::NoSof => 0x00,
            opcodes::UsbMode::SofAuto => 0x07,
            opcodes::UsbMode::Reset => 0x05,
            opcodes::UsbMode::Invalid => 0xFF,
        };
        self.with_link(|link| {
            link.write_cmd(SET_MODE)?;
            link.write_data(code)?;
            let resp = link.read_byte()?;
            if resp == CMD_RET_OK {
                Ok(())
            } else {
                Err(ProtocolError::IoError)
            }
        })
    }

    pub fn set_usb_addr(&self, addr: u8) -> Result<()> {
        self.with_link(|link| {
            link.write_cmd(SET_ADDR)?;
            link.write_data(addr)
        })
    }

    pub fn set_dev_speed(&self, speed: opcodes::Speed) -> Result<()> {
        let code = match speed {
            opcodes::Speed::Low => 0x02,
            opcodes::Speed::Full => 0x00,
        };
        self.with_link(|link| {
            link.write_cmd(SET_SPEED)?;
            link.write_data(code)
        })
    }

    pub fn get_dev_speed(&self) -> Result<opcodes::Speed> {
        self.with_link(|link| {
            link.write_cmd(GET_DEV_RATE)?;
            let v = link.read_byte()?;
            Ok(if v & 0x01 != 0 {
                opcodes::Speed::Low
            } else {
                opcodes::Speed::Full
            })
        })
    }

    pub fn set_retry(&self, level: opcodes::RetryLevel) -> Result<()> {
        let [sentinel, value] = level.encode();
        self.with_link(|link| {
            link.write_cmd(SET_RETRY)?;
            link.write_data(sentinel)?;
            link.write_data(value)
        })
    }

    pub fn test_connect(&self) -> Result<opcodes::ConnectState> {
        self.with_link(|link| {
            link.write_cmd(TEST_CONNECT)?;
            let v = link.read_byte()?;
            Ok(match v {
                INT_CONNECT | 0x01 => opcodes::ConnectState::Connected,
                INT_USB_READY => opcodes::ConnectState::UsbReady,
                _ => opcodes::ConnectState::Disconnected,
            })
        })
    }

    pub fn get_status(&self) -> Result<u8> {
        self.with_link(|link| {
            link.write_cmd(GET_STATUS)?;
            link.read_byte()
        })
    }

    fn is_completion_status(status: u8) -> bool {
        matches!(
            status,
            INT_SUCCESS | INT_CONNECT | INT_DISCONNECT | INT_USB_READY
        ) || status == pid_status(PID_NAK)
            || status == pid_status(PID_STALL)
            || status == pid_status(PID_ACK)
    }

    /// Poll `get_status` with an adaptive back-off until a completion
    /// status is observed or `timeout_ms` elapses. Cancellation-safe: a
    /// timeout leaves the chip's own state untouched, since the chip
    /// completes or abandons the transaction on its own clock regardless
    /// of whether the host kept polling.
    pub fn wait_int(&self, timeout_ms: u32) -> Result<u8> {
        let start = self.clock.now_ms();
        let status = self.get_status()?;
        if Self::is_completion_status(status) {
            return Ok(status);
        }

        let mut polls: u32 = 0;
        loop {
            if self.clock.now_ms().wrapping_sub(start) >= timeout_ms {
                return Err(ProtocolError::Timeout);
            }
            let wait = BACKOFF_SCHEDULE
                .iter()
                .find(|(count, _)| polls < *count)
                .map(|(_, us)| *us)
                .unwrap_or(Microseconds(2_000));
            self.clock.busy_wait_us(wait.0);
            polls = polls.saturating_add(1);

            let status = self.get_status()?;
            if Self::is_completion_status(status) {
                return Ok(status);
            }
        }
    }

    /// Issues a token and waits for the chip's completion status. For
    /// SETUP/OUT PIDs a 500 us busy-wait is inserted before the first
    /// status read to absorb the chip's internal turnaround.
    pub fn send_token(&self, ep: u8, toggle: bool, pid: opcodes::Pid) -> Result<u8> {
        if ep > 15 {
            return Err(ProtocolError::ParamInvalid);
        }
        let tog_bit = if toggle { 0x80 } else { 0x00 };
        let byte0 = (ep << 4) | pid.wire();
        let byte1 = tog_bit;

        {
            let mut guard = self.inner.lock();
            guard.link.write_cmd(ISSUE_TKN_X)?;
            guard.link.write_data(byte0)?;
            guard.link.write_data(byte1)?;
        }

        if !matches!(pid, opcodes::Pid::In) {
            self.clock.busy_wait_us(TOKEN_TURNAROUND.0);
        }

        trace!("send_token ep={} pid={:?} toggle={}", ep, pid, toggle);
        self.wait_int(timeout_from_schedule())
    }

    /// Dialect A writes via `WR_USB_DATA7`; dialect B via `WR_HOST_DATA`.
    pub fn write_block(&self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > 64 {
            return Err(ProtocolError::ParamInvalid);
        }
        self.with_link(|link| {
            let cmd = if link.is_dialect_b() {
                WR_HOST_DATA
            } else {
                WR_USB_DATA7
            };
            link.write_cmd(cmd)?;
            link.write_data(bytes.len() as u8)?;
            for &b in bytes {
                link.write_data(b)?;
            }
            Ok(())
        })
    }

    /// Reads a block of up to `buf.len()` bytes. A short packet is normal
    /// termination, not an error; the actual length is returned.
    pub fn read_block(&self, buf: &mut [u8]) -> Result<usize> {
        self.with_link(|link| {
            link.write_cmd(RD_DATA)?;
            let len = link.read_byte()? as usize;
            let n = len.min(buf.len());
            for slot in buf.iter_mut().take(n) {
                *slot = link.read_byte()?;
            }
            // Drain any bytes the chip reports beyond the caller's buffer.
            for _ in n..len {
                link.read_byte()?;
            }
            Ok(n)
        })
    }
}

/// Upper bound on how long a single `wait_int` call may legitimately
/// spend polling before the caller should consider the transaction
/// abandoned. Individual higher-layer operations (control transfer
/// stages, bulk NAK loop) use their own, usually much shorter, budgets;
/// this is only the ceiling used by `send_token`'s embedded `wait_int`.
const fn timeout_from_schedule() -> u32 {
    5_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::ChipLink;
    use alloc::collections::VecDeque;

    struct MockLink {
        written: VecDeque<u8>,
        to_read: VecDeque<u8>,
    }

    impl MockLink {
        fn new() -> Self {
            Self {
                written: VecDeque::new(),
                to_read: VecDeque::new(),
            }
        }
    }

    impl ChipLink for MockLink {
        fn write_cmd(&mut self, cmd: u8) -> Result<()> {
            self.written.push_back(cmd);
            Ok(())
        }
        fn write_data(&mut self, data: u8) -> Result<()> {
            self.written.push_back(data);
            Ok(())
        }
        fn read_byte(&mut self) -> Result<u8> {
            self.to_read.pop_front().ok_or(ProtocolError::Timeout)
        }
        fn query_int(&mut self) -> bool {
            false
        }
        fn set_baud(&mut self, _baud: u32) -> Result<()> {
            Ok(())
        }
    }

    struct MockLinkB {
        written: VecDeque<u8>,
    }
    impl ChipLink for MockLinkB {
        fn write_cmd(&mut self, cmd: u8) -> Result<()> {
            self.written.push_back(cmd);
            Ok(())
        }
        fn write_data(&mut self, data: u8) -> Result<()> {
            self.written.push_back(data);
            Ok(())
        }
        fn read_byte(&mut self) -> Result<u8> {
            Err(ProtocolError::Timeout)
        }
        fn query_int(&mut self) -> bool {
            false
        }
        fn set_baud(&mut self, _baud: u32) -> Result<()> {
            Ok(())
        }
        fn is_dialect_b(&self) -> bool {
            true
        }
    }

    struct FakeClock;
    impl Clock for FakeClock {
        fn now_ms(&self) -> u32 {
            0
        }
        fn busy_wait_us(&self, _us: u32) {}
    }

    fn chip_with(to_read: &[u8]) -> ChipCtx<MockLink, FakeClock> {
        let mut link = MockLink::new();
        link.to_read.extend(to_read.iter().copied());
        ChipCtx::new(link, FakeClock, 9_600)
    }

    #[test]
    fn check_exist_accepts_complement() {
        let chip = chip_with(&[!CHECK_EXIST_PROBE]);
        assert!(chip.check_exist().is_ok());
    }

    #[test]
    fn check_exist_rejects_other_values() {
        let chip = chip_with(&[0x00]);
        assert_eq!(chip.check_exist(), Err(ProtocolError::NotFound));
    }

    #[test]
    fn set_baud_rejects_unsupported_value() {
        let chip = chip_with(&[]);
        assert_eq!(chip.set_baud(12_345), Err(ProtocolError::ParamInvalid));
    }

    #[test]
    fn set_baud_sends_table_entry_exactly() {
        let chip = chip_with(&[]);
        chip.set_baud(115_200).unwrap();
        let guard = chip.inner.lock();
        let bytes = 115_200u32.to_le_bytes();
        let written: alloc::vec::Vec<u8> = guard.link.written.iter().copied().collect();
        assert_eq!(written, alloc::vec![SET_BAUD, bytes[0], bytes[1]]);
    }

    #[test]
    fn wait_int_returns_immediately_on_completion_status() {
        let chip = chip_with(&[INT_SUCCESS]);
        assert_eq!(chip.wait_int(1_000), Ok(INT_SUCCESS));
    }

    #[test]
    fn wait_int_times_out_immediately_when_budget_is_zero() {
        // FakeClock::now_ms always returns 0, so with a zero budget the
        // first non-completion status must fail fast rather than spin.
        let chip = chip_with(&[0x00]);
        assert_eq!(chip.wait_int(0), Err(ProtocolError::Timeout));
    }

    #[test]
    fn set_baud_rejects_dialect_b_table_entry_outside_minimum_pair() {
        let chip = ChipCtx::new(MockLinkB { written: VecDeque::new() }, FakeClock, 9_600);
        assert_eq!(chip.set_baud(460_800), Err(ProtocolError::ParamInvalid));
        assert!(chip.set_baud(115_200).is_ok());
    }

    #[test]
    fn write_block_uses_wr_host_data_on_dialect_b() {
        let chip = ChipCtx::new(MockLinkB { written: VecDeque::new() }, FakeClock, 9_600);
        chip.write_block(&[0xAB]).unwrap();
        let guard = chip.inner.lock();
        assert_eq!(guard.link.written.front().copied(), Some(WR_HOST_DATA));
    }

    #[test]
    fn write_block_uses_wr_usb_data7_on_dialect_a() {
        let chip = chip_with(&[]);
        chip.write_block(&[0xAB]).unwrap();
        let guard = chip.inner.lock();
        assert_eq!(guard.link.written.front().copied(), Some(WR_USB_DATA7));
    }

    #[test]
    fn read_block_reports_short_packet_as_actual_len() {
        let chip = chip_with(&[4, 0x11, 0x22, 0x33, 0x44]);
        let mut buf = [0u8; 8];
        let n = chip.read_block(&mut buf).unwrap();
        assert_eq!(n, 4);
        assert_eq!(&buf[..4], &[0x11, 0x22, 0x33, 0x44]);
    }
}
