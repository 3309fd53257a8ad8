//! Device session for a Launchpad-style pad controller.
//!
//! Handles port discovery, programmer-mode framing, LED output and
//! press-state tracking.

mod session;
mod state;

use std::sync::Arc;

use parking_lot::Mutex;

pub use session::{DeviceError, DeviceSession, InboundCallback, MidiSink, PortDirection, PortListing};
pub use state::DeviceState;

/// Sink that keeps every outbound message in memory.
///
/// Clones share the same buffer, so a test can hand one clone to a session
/// and inspect the traffic through another.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    messages: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far.
    pub fn messages(&self) -> Vec<Vec<u8>> {
        self.messages.lock().clone()
    }

    /// Everything sent so far, emptying the buffer.
    pub fn take(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.messages.lock())
    }
}

impl MidiSink for RecordingSink {
    fn send(&mut self, message: &[u8]) -> Result<(), DeviceError> {
        self.messages.lock().push(message.to_vec());
        Ok(())
    }
}
