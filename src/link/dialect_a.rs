//! Dialect A: 9-bit flagged words. Bit 8 of every word marks it as a
//! command (1) or data (0); there is no separate sync sequence.

use super::{ChipLink, NineBitBus, READ_TIMEOUT_MS};
use crate::error::Result;

const CMD_FLAG: u16 = 1 << 8;

pub struct DialectA<T: NineBitBus> {
    bus: T,
}

impl<T: NineBitBus> DialectA<T> {
    pub fn new(bus: T) -> Self {
        Self { bus }
    }

    pub fn into_inner(self) -> T {
        self.bus
    }
}

impl<T: NineBitBus> ChipLink for DialectA<T> {
    fn write_cmd(&mut self, cmd: u8) -> Result<()> {
        self.bus.write_word(CMD_FLAG | u16::from(cmd))
    }

    fn write_data(&mut self, data: u8) -> Result<()> {
        self.bus.write_word(u16::from(data))
    }

    fn read_byte(&mut self) -> Result<u8> {
        let word = self.bus.read_word(READ_TIMEOUT_MS)?;
        Ok((word & 0xFF) as u8)
    }

    fn query_int(&mut self) -> bool {
        self.bus.query_int()
    }

    fn set_baud(&mut self, baud: u32) -> Result<()> {
        self.bus.set_baud(baud)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;
    use alloc::collections::VecDeque;

    struct MockBus {
        written: VecDeque<u16>,
        to_read: VecDeque<u16>,
    }

    impl MockBus {
        fn new() -> Self {
            Self {
                written: VecDeque::new(),
                to_read: VecDeque::new(),
            }
        }
    }

    impl NineBitBus for MockBus {
        fn write_word(&mut self, val: u16) -> Result<()> {
            self.written.push_back(val);
            Ok(())
        }

        fn read_word(&mut self, _timeout_ms: u32) -> Result<u16> {
            self.to_read.pop_front().ok_or(ProtocolError::Timeout)
        }

        fn set_baud(&mut self, _baud: u32) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_cmd_sets_bit_8() {
        let mut link = DialectA::new(MockBus::new());
        link.write_cmd(0x06).unwrap();
        assert_eq!(link.bus.written.pop_back(), Some(0x106));
    }

    #[test]
    fn write_data_clears_bit_8() {
        let mut link = DialectA::new(MockBus::new());
        link.write_data(0xFF).unwrap();
        assert_eq!(link.bus.written.pop_back(), Some(0x0FF));
    }

    #[test]
    fn read_byte_drops_high_bits() {
        let mut link = DialectA::new(MockBus::new());
        link.bus.to_read.push_back(0x1AB);
        assert_eq!(link.read_byte().unwrap(), 0xAB);
    }

    #[test]
    fn read_byte_timeout_propagates() {
        let mut link = DialectA::new(MockBus::new());
        assert_eq!(link.read_byte(), Err(ProtocolError::Timeout));
    }
}
