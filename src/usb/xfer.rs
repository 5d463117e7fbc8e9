//! `HostXfer`: the control and bulk/interrupt transfer engines built on top
//! of `ChipCtl`. Grounded on the token/NAK/STALL handling in
//! `vapor-keeb-async-usb-host`'s keyboard driver (`try_attach` / `run`
//! loop), adapted to this crate's synchronous, polling `ChipCtx`.

use log::{debug, trace, warn};

use crate::chip::opcodes::{self, pid_status, PID_NAK, PID_STALL, RetryLevel};
use crate::chip::{ChipCtx, Clock};
use crate::error::{ProtocolError, Result};
use crate::link::ChipLink;
use crate::usb::descriptors::SetupPacket;
use crate::usb::device::Endpoint;

const EP0_ADDR: u8 = 0;

/// Control-transfer direction, used only to pick the STATUS-stage PID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    In,
    Out,
}

/// Runs control and bulk/interrupt transfers against a single `ChipCtx`.
/// Does not own the `UsbDevice`; callers pass the endpoint/toggle state in
/// and the updated toggle out via `&mut Endpoint`.
pub struct HostXfer<'a, L: ChipLink, C: Clock> {
    chip: &'a ChipCtx<L, C>,
    /// EP0's max packet size, used only to decide when a DATA-stage IN
    /// packet shorter than a full packet means "transfer done". Starts at
    /// the USB-guaranteed minimum and is refined once the device's real
    /// descriptor has been read.
    ep0_max_packet: u16,
}

impl<'a, L: ChipLink, C: Clock> HostXfer<'a, L, C> {
    pub fn new(chip: &'a ChipCtx<L, C>) -> Self {
        Self {
            chip,
            ep0_max_packet: 8,
        }
    }

    pub fn set_ep0_max_packet(&mut self, max_packet: u16) {
        self.ep0_max_packet = max_packet.max(8);
    }

    /// Full control transfer: SETUP, optional DATA, STATUS. `buf` is both
    /// the source (OUT) and destination (IN) for the DATA stage; returns
    /// the number of bytes actually transferred in that stage.
    pub fn control_transfer(
        &self,
        setup: SetupPacket,
        buf: &mut [u8],
        direction: Direction,
    ) -> Result<usize> {
        let retry = if setup.b_request == SetupPacket::GET_DESCRIPTOR {
            RetryLevel::RetryShort
        } else {
            RetryLevel::RetryInfinite
        };
        self.chip.set_retry(retry)?;

        self.setup_stage(setup)?;

        let data_len = if setup.w_length == 0 {
            0
        } else {
            match direction {
                Direction::In => self.data_in(&mut buf[..setup.w_length as usize])?,
                Direction::Out => self.data_out(&buf[..setup.w_length as usize])?,
            }
        };

        match self.status_stage(direction) {
            Ok(()) => Ok(data_len),
            Err(e) if data_len > 0 => {
                warn!("control_transfer: STATUS stage failed ({:?}), keeping {} partial bytes", e, data_len);
                Ok(data_len)
            }
            Err(e) => Err(e),
        }
    }

    fn setup_stage(&self, setup: SetupPacket) -> Result<()> {
        let bytes = setup.to_bytes();
        self.chip.write_block(&bytes)?;
        let status = self.chip.send_token(EP0_ADDR, false, opcodes::Pid::Setup)?;
        if status == opcodes::INT_SUCCESS {
            return Ok(());
        }
        if status == pid_status(PID_STALL) {
            return Err(ProtocolError::Stall);
        }
        if status == opcodes::INT_DISCONNECT {
            return Err(ProtocolError::Disconnected);
        }
        Err(ProtocolError::IoError)
    }

    fn data_in(&self, buf: &mut [u8]) -> Result<usize> {
        let mut toggle = true; // DATA1
        let mut received = 0usize;
        let mut progressed = false;
        loop {
            if received >= buf.len() {
                break;
            }
            let status = self.chip.send_token(EP0_ADDR, toggle, opcodes::Pid::In)?;
            if status == opcodes::INT_SUCCESS {
                let mut chunk = [0u8; 64];
                let n = match self.chip.read_block(&mut chunk) {
                    Ok(n) => n,
                    Err(e) => {
                        if received > 0 {
                            return Ok(received);
                        }
                        return Err(e);
                    }
                };
                let take = n.min(buf.len() - received);
                buf[received..received + take].copy_from_slice(&chunk[..take]);
                received += take;
                progressed = true;
                toggle = !toggle;
                if n < self.ep0_max_packet as usize {
                    break;
                }
            } else if status == pid_status(PID_NAK) {
                self.busy_wait_after(progressed);
            } else if status == pid_status(PID_STALL) {
                return Err(ProtocolError::Stall);
            } else if status == opcodes::INT_DISCONNECT {
                return Err(ProtocolError::Disconnected);
            } else {
                return Err(ProtocolError::IoError);
            }
        }
        Ok(received)
    }

    fn data_out(&self, buf: &[u8]) -> Result<usize> {
        let mut toggle = true;
        let mut sent = 0usize;
        while sent < buf.len() {
            let end = (sent + 64).min(buf.len());
            self.chip.write_block(&buf[sent..end])?;
            let status = self.chip.send_token(EP0_ADDR, toggle, opcodes::Pid::Out)?;
            if status == opcodes::INT_SUCCESS {
                sent = end;
                toggle = !toggle;
            } else if status == pid_status(PID_NAK) {
                self.busy_wait_after(sent > 0);
            } else if status == pid_status(PID_STALL) {
                return Err(ProtocolError::Stall);
            } else if status == opcodes::INT_DISCONNECT {
                return Err(ProtocolError::Disconnected);
            } else {
                return Err(ProtocolError::IoError);
            }
        }
        Ok(sent)
    }

    fn busy_wait_after(&self, _progressed: bool) {
        // NAK is itself a completion status for wait_int, so it returns on
        // the first poll with no backoff spent; the retry here needs its
        // own short wait or this becomes a tight send_token loop.
        self.chip.sleep_ms(1);
    }

    fn status_stage(&self, direction: Direction) -> Result<()> {
        let pid = match direction {
            Direction::In => opcodes::Pid::Out,
            Direction::Out => opcodes::Pid::In,
        };
        let status = self.chip.send_token(EP0_ADDR, true, pid)?;
        if status == opcodes::INT_SUCCESS {
            Ok(())
        } else if status == pid_status(PID_STALL) {
            Err(ProtocolError::Stall)
        } else if status == opcodes::INT_DISCONNECT {
            Err(ProtocolError::Disconnected)
        } else {
            Err(ProtocolError::IoError)
        }
    }

    pub fn get_descriptor_into(&self, desc_type: u8, length: u16, buf: &mut [u8]) -> Result<usize> {
        let setup = SetupPacket::get_descriptor(desc_type, 0, length);
        self.control_transfer(setup, buf, Direction::In)
    }

    pub fn set_address(&self, addr: u8) -> Result<()> {
        let mut empty = [];
        self.control_transfer(SetupPacket::set_address(addr), &mut empty, Direction::Out)?;
        Ok(())
    }

    pub fn set_configuration(&self, value: u8) -> Result<()> {
        let mut empty = [];
        self.control_transfer(
            SetupPacket::set_configuration(value),
            &mut empty,
            Direction::Out,
        )?;
        Ok(())
    }

    pub fn set_idle(&self, interface: u8) -> Result<()> {
        let mut empty = [];
        self.control_transfer(SetupPacket::set_idle(interface), &mut empty, Direction::Out)?;
        Ok(())
    }

    pub fn set_report_output(&self, interface: u8, report: &[u8]) -> Result<()> {
        let mut buf = [0u8; 16];
        buf[..report.len()].copy_from_slice(report);
        self.control_transfer(
            SetupPacket::set_report_output(interface, report.len() as u16),
            &mut buf[..report.len()],
            Direction::Out,
        )?;
        Ok(())
    }

    /// Clears a stalled endpoint and resets its data toggle to DATA0.
    pub fn clear_stall(&self, ep: &mut Endpoint) -> Result<()> {
        let mut empty = [];
        self.control_transfer(
            SetupPacket::clear_endpoint_halt(ep.address),
            &mut empty,
            Direction::Out,
        )?;
        ep.reset_toggle();
        Ok(())
    }

    /// Bulk/interrupt IN: reads up to `buf.len()` bytes, obeying the
    /// endpoint's toggle. A NAK is normal back-pressure, not an error; it
    /// decrements `timeout_ms` and retries after a 1 ms sleep.
    pub fn interrupt_in(&self, ep: &mut Endpoint, buf: &mut [u8], mut timeout_ms: u32) -> Result<usize> {
        self.chip.set_retry(RetryLevel::None)?;
        let mut received = 0usize;
        loop {
            let status = self.chip.send_token(ep.number(), ep.data_toggle, opcodes::Pid::In)?;
            if status == opcodes::INT_SUCCESS {
                let n = self.chip.read_block(buf)?;
                received = n;
                ep.flip_toggle();
                return Ok(received);
            } else if status == pid_status(PID_NAK) {
                if timeout_ms == 0 {
                    return Err(ProtocolError::Timeout);
                }
                timeout_ms -= 1;
                self.sleep_one_ms();
            } else if status == pid_status(PID_STALL) {
                return Err(ProtocolError::Stall);
            } else if status == opcodes::INT_DISCONNECT {
                return Err(ProtocolError::Disconnected);
            } else {
                return Err(ProtocolError::IoError);
            }
        }
    }

    pub fn interrupt_out(&self, ep: &mut Endpoint, buf: &[u8], mut timeout_ms: u32) -> Result<usize> {
        self.chip.set_retry(RetryLevel::None)?;
        loop {
            let end = (buf.len()).min(ep.max_packet as usize);
            self.chip.write_block(&buf[..end])?;
            let status = self.chip.send_token(ep.number(), ep.data_toggle, opcodes::Pid::Out)?;
            if status == opcodes::INT_SUCCESS {
                ep.flip_toggle();
                trace!("interrupt_out: sent {} bytes on ep {:#x}", end, ep.address);
                return Ok(end);
            } else if status == pid_status(PID_NAK) {
                if timeout_ms == 0 {
                    return Err(ProtocolError::Timeout);
                }
                timeout_ms -= 1;
                self.sleep_one_ms();
            } else if status == pid_status(PID_STALL) {
                return Err(ProtocolError::Stall);
            } else if status == opcodes::INT_DISCONNECT {
                return Err(ProtocolError::Disconnected);
            } else {
                return Err(ProtocolError::IoError);
            }
        }
    }

    fn sleep_one_ms(&self) {
        debug!("interrupt transfer NAK, backing off 1ms");
        self.chip.sleep_ms(1);
    }
}

pub(crate) use Direction as XferDirection;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chip::opcodes::*;
    use alloc::collections::VecDeque;

    struct MockLink {
        to_read: VecDeque<u8>,
    }
    impl ChipLink for MockLink {
        fn write_cmd(&mut self, _cmd: u8) -> Result<()> {
            Ok(())
        }
        fn write_data(&mut self, _data: u8) -> Result<()> {
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

    struct FakeClock;
    impl Clock for FakeClock {
        fn now_ms(&self) -> u32 {
            0
        }
        fn busy_wait_us(&self, _us: u32) {}
    }

    fn status_stream(statuses: &[u8]) -> ChipCtx<MockLink, FakeClock> {
        let mut link = MockLink {
            to_read: VecDeque::new(),
        };
        for &s in statuses {
            link.to_read.push_back(s);
        }
        ChipCtx::new(link, FakeClock, 9_600)
    }

    #[test]
    fn setup_stage_succeeds_on_int_success() {
        let chip = status_stream(&[INT_SUCCESS]);
        let xfer = HostXfer::new(&chip);
        let setup = SetupPacket::get_descriptor(crate::usb::descriptors::DESC_TYPE_DEVICE, 0, 8);
        assert!(xfer.setup_stage(setup).is_ok());
    }

    #[test]
    fn setup_stage_reports_stall() {
        let chip = status_stream(&[pid_status(PID_STALL)]);
        let xfer = HostXfer::new(&chip);
        let setup = SetupPacket::set_address(1);
        assert_eq!(xfer.setup_stage(setup), Err(ProtocolError::Stall));
    }

    #[test]
    fn data_in_does_not_terminate_early_on_full_packet_at_ep0_max() {
        // wLength 18 over an 8-byte-max-packet EP0: three IN tokens, the
        // first two returning a full 8-byte packet and the last a 2-byte
        // remainder. With the old `n < wLength.min(64)` check, the first
        // full 8-byte packet (8 < 18) would have ended the transfer early
        // and left bytes 8..18 (VID/PID in a device descriptor) as zero.
        let mut bytes = alloc::vec![INT_SUCCESS, 8];
        bytes.extend(1..=8u8);
        bytes.push(INT_SUCCESS);
        bytes.push(8);
        bytes.extend(9..=16u8);
        bytes.push(INT_SUCCESS);
        bytes.push(2);
        bytes.extend([17u8, 18]);

        let chip = status_stream(&bytes);
        let mut xfer = HostXfer::new(&chip);
        xfer.set_ep0_max_packet(8);

        let mut buf = [0u8; 18];
        let n = xfer.data_in(&mut buf).unwrap();
        assert_eq!(n, 18);
        assert_eq!(buf, core::array::from_fn::<u8, 18, _>(|i| i as u8 + 1));
    }
}
