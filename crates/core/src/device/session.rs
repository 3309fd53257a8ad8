//! Device session: the MIDI channel pair plus the live grid bookkeeping.
//!
//! Outbound traffic goes through a [`MidiSink`], which is a `midir` output
//! connection in production and an in-memory recorder in tests. Inbound
//! traffic enters through [`DeviceSession::handle_inbound`], which the `midir`
//! input callback calls for every message.

use std::sync::Arc;

use midir::{MidiIO, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;
use thiserror::Error;

use super::state::DeviceState;
use crate::grid::{self, GridPosition, LedColor, GRID_SIZE};
use crate::midi::midi::MidiMessage;

const CLIENT_NAME: &str = "launchgrid";

/// Which half of the port pair an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

impl std::fmt::Display for PortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortDirection::Input => write!(f, "input"),
            PortDirection::Output => write!(f, "output"),
        }
    }
}

/// Errors that can occur while talking to the device.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("MIDI {direction} port '{name}' not found (available: {available:?})")]
    EndpointNotFound {
        direction: PortDirection,
        name: String,
        available: Vec<String>,
    },

    #[error("MIDI initialization failed: {0}")]
    Init(#[from] midir::InitError),

    #[error("failed to connect MIDI {direction} port: {message}")]
    Connect {
        direction: PortDirection,
        message: String,
    },

    #[error("failed to send MIDI: {0}")]
    Send(String),

    #[error("MIDI output not connected")]
    Closed,
}

/// Destination for outbound MIDI bytes.
pub trait MidiSink: Send {
    fn send(&mut self, message: &[u8]) -> Result<(), DeviceError>;
}

impl MidiSink for MidiOutputConnection {
    fn send(&mut self, message: &[u8]) -> Result<(), DeviceError> {
        MidiOutputConnection::send(self, message).map_err(|e| DeviceError::Send(e.to_string()))
    }
}

/// Consumer of inbound messages, installed with [`DeviceSession::register_callback`].
pub type InboundCallback = Arc<dyn Fn(&MidiMessage) + Send + Sync>;

/// Names of the MIDI ports visible to this process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortListing {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

/// State shared with the `midir` input thread.
struct SessionInner {
    state: Mutex<DeviceState>,
    output: Mutex<Option<Box<dyn MidiSink>>>,
    callback: Mutex<Option<InboundCallback>>,
}

impl SessionInner {
    fn send(&self, message: &[u8]) {
        let mut output = self.output.lock();
        let result = match output.as_mut() {
            Some(sink) => sink.send(message),
            None => Err(DeviceError::Closed),
        };
        if let Err(e) = result {
            log::warn!("Dropped outbound MIDI {:02X?}: {}", message, e);
        }
    }

    fn handle_inbound(&self, bytes: &[u8]) {
        let message = MidiMessage::parse(bytes);

        // Press bookkeeping happens regardless of what the consumer does
        if message.is_press_or_release() {
            if let Some(pos) = message.position() {
                self.state.lock().toggle_pressed(pos);
            }
        }

        let callback = self.callback.lock().clone();
        if let Some(callback) = callback {
            callback(&message);
        }
    }
}

/// An open connection to the pad controller.
pub struct DeviceSession {
    inner: Arc<SessionInner>,
    input: Mutex<Option<MidiInputConnection<()>>>,
}

impl DeviceSession {
    /// Create a session writing to an arbitrary sink, with no input port.
    ///
    /// Inbound messages can still be delivered through [`Self::handle_inbound`].
    pub fn new(sink: Box<dyn MidiSink>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                state: Mutex::new(DeviceState::new()),
                output: Mutex::new(Some(sink)),
                callback: Mutex::new(None),
            }),
            input: Mutex::new(None),
        }
    }

    /// Open the named input and output ports.
    ///
    /// Names must match exactly one of the names reported by [`Self::list_ports`].
    pub fn open(input_name: &str, output_name: &str) -> Result<Self, DeviceError> {
        let midi_in = MidiInput::new(CLIENT_NAME)?;
        let midi_out = MidiOutput::new(CLIENT_NAME)?;

        let in_port = find_port(&midi_in, input_name).ok_or_else(|| DeviceError::EndpointNotFound {
            direction: PortDirection::Input,
            name: input_name.to_string(),
            available: port_names(&midi_in),
        })?;
        let out_port =
            find_port(&midi_out, output_name).ok_or_else(|| DeviceError::EndpointNotFound {
                direction: PortDirection::Output,
                name: output_name.to_string(),
                available: port_names(&midi_out),
            })?;

        let output = midi_out
            .connect(&out_port, "launchgrid-output")
            .map_err(|e| DeviceError::Connect {
                direction: PortDirection::Output,
                message: e.to_string(),
            })?;

        let session = Self::new(Box::new(output));

        let inner = Arc::clone(&session.inner);
        let input = midi_in
            .connect(
                &in_port,
                "launchgrid-input",
                move |_timestamp, message, _| inner.handle_inbound(message),
                (),
            )
            .map_err(|e| DeviceError::Connect {
                direction: PortDirection::Input,
                message: e.to_string(),
            })?;
        *session.input.lock() = Some(input);

        log::info!(
            "Opened MIDI ports in='{}' out='{}'",
            input_name,
            output_name
        );
        Ok(session)
    }

    /// Enumerate the MIDI ports currently available.
    pub fn list_ports() -> Result<PortListing, DeviceError> {
        let midi_in = MidiInput::new(CLIENT_NAME)?;
        let midi_out = MidiOutput::new(CLIENT_NAME)?;
        Ok(PortListing {
            inputs: port_names(&midi_in),
            outputs: port_names(&midi_out),
        })
    }

    /// Switch the device into programmer mode (direct pad addressing).
    pub fn enter_control_mode(&self) {
        self.inner.send(&grid::control_mode_frame(true));
    }

    /// Return the device to its default layout.
    pub fn exit_control_mode(&self) {
        self.inner.send(&grid::control_mode_frame(false));
    }

    /// Light a pad. The frame is always sent, even if the pad already shows `color`.
    pub fn set_color(&self, pos: GridPosition, color: LedColor) {
        let mut output = self.inner.output.lock();
        let frame = grid::color_frame(pos, color);
        let result = match output.as_mut() {
            Some(sink) => sink.send(&frame),
            None => Err(DeviceError::Closed),
        };
        if let Err(e) = result {
            log::warn!("Failed to set pad {} to {}: {}", pos, color.value(), e);
        }
        self.inner.state.lock().set_led(pos, color);
    }

    /// Turn every pad off, one message per pad.
    pub fn clear_all(&self) {
        for pos in GridPosition::all() {
            self.set_color(pos, LedColor::OFF);
        }
    }

    /// Install the single downstream consumer of inbound messages.
    pub fn register_callback<F>(&self, callback: F)
    where
        F: Fn(&MidiMessage) + Send + Sync + 'static,
    {
        *self.inner.callback.lock() = Some(Arc::new(callback));
    }

    /// Remove the inbound consumer. Press bookkeeping continues.
    pub fn clear_callback(&self) {
        *self.inner.callback.lock() = None;
    }

    /// Process one inbound message: update the press flags, then forward it.
    pub fn handle_inbound(&self, bytes: &[u8]) {
        self.inner.handle_inbound(bytes);
    }

    pub fn led(&self, pos: GridPosition) -> LedColor {
        self.inner.state.lock().led(pos)
    }

    pub fn leds(&self) -> [[LedColor; GRID_SIZE]; GRID_SIZE] {
        self.inner.state.lock().leds()
    }

    pub fn is_pressed(&self, pos: GridPosition) -> bool {
        self.inner.state.lock().is_pressed(pos)
    }

    pub fn pressed_count(&self) -> usize {
        self.inner.state.lock().pressed_count()
    }

    /// Release both ports.
    pub fn close(&self) {
        // Dropping the connections closes the underlying ports
        if self.input.lock().take().is_some() {
            log::info!("Closed MIDI input");
        }
        if self.inner.output.lock().take().is_some() {
            log::info!("Closed MIDI output");
        }
        self.clear_callback();
    }
}

fn port_names<T: MidiIO>(io: &T) -> Vec<String> {
    io.ports()
        .iter()
        .filter_map(|port| io.port_name(port).ok())
        .collect()
}

fn find_port<T: MidiIO>(io: &T, name: &str) -> Option<T::Port> {
    io.ports()
        .into_iter()
        .find(|port| io.port_name(port).map(|n| n == name).unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::RecordingSink;

    fn pos(row: u8, col: u8) -> GridPosition {
        GridPosition::new(row, col).unwrap()
    }

    #[test]
    fn test_set_color_always_sends() {
        let sink = RecordingSink::new();
        let session = DeviceSession::new(Box::new(sink.clone()));
        let color = LedColor::new(9).unwrap();

        session.set_color(pos(0, 1), color);
        session.set_color(pos(0, 1), color);

        assert_eq!(sink.messages(), vec![vec![0x90, 12, 9], vec![0x90, 12, 9]]);
        assert_eq!(session.led(pos(0, 1)), color);
    }

    #[test]
    fn test_clear_all_sends_one_message_per_pad() {
        let sink = RecordingSink::new();
        let session = DeviceSession::new(Box::new(sink.clone()));
        session.set_color(pos(4, 4), LedColor::new(60).unwrap());
        sink.take();

        session.clear_all();

        let messages = sink.take();
        assert_eq!(messages.len(), 64);
        assert!(messages.iter().all(|m| m[0] == 0x90 && m[2] == 0));
        assert!(session.led(pos(4, 4)).is_off());
    }

    #[test]
    fn test_control_mode_frames() {
        let sink = RecordingSink::new();
        let session = DeviceSession::new(Box::new(sink.clone()));
        session.enter_control_mode();
        session.exit_control_mode();

        let messages = sink.messages();
        assert_eq!(messages[0], grid::control_mode_frame(true).to_vec());
        assert_eq!(messages[1], grid::control_mode_frame(false).to_vec());
    }

    #[test]
    fn test_inbound_toggles_before_forwarding() {
        let session = Arc::new(DeviceSession::new(Box::new(RecordingSink::new())));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let observer = Arc::clone(&session);
        let seen_clone = Arc::clone(&seen);
        session.register_callback(move |message| {
            seen_clone
                .lock()
                .push((message.clone(), observer.pressed_count()));
        });

        session.handle_inbound(&[0x90, 11, 100]);
        session.handle_inbound(&[0x90, 11, 0]);
        session.handle_inbound(&[0x90, 19, 100]);

        let seen = seen.lock();
        assert_eq!(seen[0], (MidiMessage::NoteOn(11, 100), 1));
        assert_eq!(seen[1], (MidiMessage::NoteOff(11), 0));
        // Side buttons are forwarded but never counted
        assert_eq!(seen[2], (MidiMessage::NoteOn(19, 100), 0));
    }

    #[test]
    fn test_toggle_without_consumer() {
        let session = DeviceSession::new(Box::new(RecordingSink::new()));
        session.handle_inbound(&[0x90, 88, 127]);
        assert!(session.is_pressed(pos(7, 7)));
        session.handle_inbound(&[0x80, 88, 0]);
        assert!(!session.is_pressed(pos(7, 7)));
    }

    #[test]
    fn test_close_drops_output() {
        let sink = RecordingSink::new();
        let session = DeviceSession::new(Box::new(sink.clone()));
        session.close();
        session.set_color(pos(0, 0), LedColor::new(3).unwrap());
        assert!(sink.messages().is_empty());
        // Bookkeeping still tracks what we attempted to show
        assert_eq!(session.led(pos(0, 0)).value(), 3);
    }
}
