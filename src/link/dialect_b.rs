//! Dialect B: plain bytes with a two-byte sync prefix (`0x57 0xAB`) ahead of
//! every command. Data writes are bare bytes. Because there is no
//! direction bit on the wire, [`DialectB`] remembers the tag of the most
//! recently written command so `ChipCtx` can disambiguate a `GET_STATUS`
//! response from a generic data read.

use super::{ChipLink, SerialBus, READ_TIMEOUT_MS};
use crate::error::Result;

const SYNC_0: u8 = 0x57;
const SYNC_1: u8 = 0xAB;

pub struct DialectB<T: SerialBus> {
    bus: T,
    last_cmd: Option<u8>,
}

impl<T: SerialBus> DialectB<T> {
    pub fn new(bus: T) -> Self {
        Self {
            bus,
            last_cmd: None,
        }
    }

    pub fn into_inner(self) -> T {
        self.bus
    }

    /// Tag of the most recently issued command, for the read-dispatch
    /// quirk: a caller expecting a `GET_STATUS` reply needs to know it
    /// really is replying to that command and not a stale data read.
    pub fn last_cmd(&self) -> Option<u8> {
        self.last_cmd
    }
}

impl<T: SerialBus> ChipLink for DialectB<T> {
    fn write_cmd(&mut self, cmd: u8) -> Result<()> {
        self.bus.write_byte(SYNC_0)?;
        self.bus.write_byte(SYNC_1)?;
        self.bus.write_byte(cmd)?;
        self.last_cmd = Some(cmd);
        Ok(())
    }

    fn write_data(&mut self, data: u8) -> Result<()> {
        self.bus.write_byte(data)
    }

    fn read_byte(&mut self) -> Result<u8> {
        self.bus.read_byte(READ_TIMEOUT_MS)
    }

    fn query_int(&mut self) -> bool {
        self.bus.query_int()
    }

    fn set_baud(&mut self, baud: u32) -> Result<()> {
        self.bus.set_baud(baud)
    }

    fn is_dialect_b(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::collections::VecDeque;

    struct MockBus {
        written: VecDeque<u8>,
        to_read: VecDeque<u8>,
    }

    impl MockBus {
        fn new() -> Self {
            Self {
                written: VecDeque::new(),
                to_read: VecDeque::new(),
            }
        }
    }

    impl SerialBus for MockBus {
        fn write_byte(&mut self, b: u8) -> Result<()> {
            self.written.push_back(b);
            Ok(())
        }

        fn read_byte(&mut self, _timeout_ms: u32) -> Result<u8> {
            self.to_read
                .pop_front()
                .ok_or(crate::error::ProtocolError::Timeout)
        }

        fn set_baud(&mut self, _baud: u32) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_cmd_emits_sync_prefix() {
        let mut link = DialectB::new(MockBus::new());
        link.write_cmd(0x06).unwrap();
        assert_eq!(
            link.bus.written.iter().copied().collect::<alloc::vec::Vec<_>>(),
            alloc::vec![0x57, 0xAB, 0x06]
        );
        assert_eq!(link.last_cmd(), Some(0x06));
    }

    #[test]
    fn write_data_has_no_prefix() {
        let mut link = DialectB::new(MockBus::new());
        link.write_data(0x42).unwrap();
        assert_eq!(
            link.bus.written.iter().copied().collect::<alloc::vec::Vec<_>>(),
            alloc::vec![0x42]
        );
        assert_eq!(link.last_cmd(), None);
    }
}
