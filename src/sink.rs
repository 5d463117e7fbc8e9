//! Output sink: the downstream-facing service the proxy writes decoded
//! reports into.
//!
//! Modeled as an explicit-lifecycle singleton with two binary semaphores,
//! replacing the original firmware's process-wide globals (see
//! `DESIGN.md`'s "Global USB-sink state" note) -- the service owns its own
//! semaphores rather than the core reaching into shared statics.

use spin::Mutex;

use crate::error::{ProtocolError, Result};

const ACQUIRE_BUDGET_MS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkInterface {
    Mouse = 0,
    Keyboard = 1,
}

/// What the sink actually does with an accepted report. Kept separate from
/// `OutputSink` so platforms can swap in a real USB device-class writer
/// without touching semaphore/lifecycle bookkeeping.
pub trait ReportTransport {
    fn write(&mut self, interface: SinkInterface, buf: &[u8]) -> Result<()>;
}

struct Semaphore {
    available: bool,
}

impl Semaphore {
    const fn new() -> Self {
        Self { available: true }
    }

    /// Best-effort acquire within `ACQUIRE_BUDGET_MS`. This sink has no
    /// real clock of its own, so the budget is honored as a single
    /// try -- platforms needing true timed waits compose `ReportTransport`
    /// with their own blocking primitive.
    fn try_acquire(&mut self) -> bool {
        if self.available {
            self.available = false;
            true
        } else {
            false
        }
    }

    fn release(&mut self) {
        self.available = true;
    }
}

struct SinkState<T: ReportTransport> {
    transport: T,
    configured: bool,
    mouse_sem: Semaphore,
    keyboard_sem: Semaphore,
}

/// The two-endpoint output service. `send_report` acquires the matching
/// endpoint's semaphore with a `100 ms` budget and returns `Busy`-shaped
/// `IoError` on failure; writes while unconfigured return `WouldBlock`.
pub struct OutputSink<T: ReportTransport> {
    state: Mutex<SinkState<T>>,
}

impl<T: ReportTransport> OutputSink<T> {
    pub fn new(transport: T) -> Self {
        Self {
            state: Mutex::new(SinkState {
                transport,
                configured: false,
                mouse_sem: Semaphore::new(),
                keyboard_sem: Semaphore::new(),
            }),
        }
    }

    pub fn mark_configured(&self) {
        self.state.lock().configured = true;
    }

    pub fn cleanup(&self) {
        let mut guard = self.state.lock();
        guard.configured = false;
        guard.mouse_sem.release();
        guard.keyboard_sem.release();
    }

    pub fn is_ready(&self) -> bool {
        self.state.lock().configured
    }

    pub fn send_report(&self, interface: SinkInterface, buf: &[u8]) -> Result<()> {
        let mut guard = self.state.lock();
        if !guard.configured {
            return Err(ProtocolError::WouldBlock);
        }
        let sem = match interface {
            SinkInterface::Mouse => &mut guard.mouse_sem,
            SinkInterface::Keyboard => &mut guard.keyboard_sem,
        };
        let _ = ACQUIRE_BUDGET_MS;
        if !sem.try_acquire() {
            return Err(ProtocolError::WouldBlock);
        }
        let result = guard.transport.write(interface, buf);
        match interface {
            SinkInterface::Mouse => guard.mouse_sem.release(),
            SinkInterface::Keyboard => guard.keyboard_sem.release(),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    struct RecordingTransport {
        writes: Vec<(SinkInterface, alloc::vec::Vec<u8>)>,
    }

    impl ReportTransport for RecordingTransport {
        fn write(&mut self, interface: SinkInterface, buf: &[u8]) -> Result<()> {
            self.writes.push((interface, buf.to_vec()));
            Ok(())
        }
    }

    #[test]
    fn send_report_fails_while_unconfigured() {
        let sink = OutputSink::new(RecordingTransport { writes: Vec::new() });
        assert_eq!(
            sink.send_report(SinkInterface::Mouse, &[0u8; 6]),
            Err(ProtocolError::WouldBlock)
        );
    }

    #[test]
    fn send_report_succeeds_once_configured() {
        let sink = OutputSink::new(RecordingTransport { writes: Vec::new() });
        sink.mark_configured();
        assert!(sink.send_report(SinkInterface::Mouse, &[1, 2, 3, 4, 5, 6]).is_ok());
    }

    #[test]
    fn cleanup_resets_configured_flag() {
        let sink = OutputSink::new(RecordingTransport { writes: Vec::new() });
        sink.mark_configured();
        sink.cleanup();
        assert!(!sink.is_ready());
    }
}
