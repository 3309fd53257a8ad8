use crate::grid::{self, GridPosition};

// MIDI message types we care about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn(u8, u8),        // (note, velocity)
    NoteOff(u8),           // note
    ControlChange(u8, u8), // (controller number, value)
    Other(Vec<u8>),
}

impl MidiMessage {
    /// Decode raw bytes as delivered by the input port.
    pub fn parse(bytes: &[u8]) -> Self {
        match bytes {
            [status, note, velocity, ..] if status & 0xF0 == grid::NOTE_ON => {
                // Note On with velocity 0 is how the pads report a release
                if *velocity > 0 {
                    MidiMessage::NoteOn(*note, *velocity)
                } else {
                    MidiMessage::NoteOff(*note)
                }
            }
            [status, note, ..] if status & 0xF0 == grid::NOTE_OFF => MidiMessage::NoteOff(*note),
            [status, cc, value, ..] if status & 0xF0 == 0xB0 => {
                MidiMessage::ControlChange(*cc, *value)
            }
            other => MidiMessage::Other(other.to_vec()),
        }
    }

    /// A pad going down.
    pub fn is_press(&self) -> bool {
        matches!(self, MidiMessage::NoteOn(_, _))
    }

    /// A pad going down or coming back up.
    pub fn is_press_or_release(&self) -> bool {
        matches!(self, MidiMessage::NoteOn(_, _) | MidiMessage::NoteOff(_))
    }

    pub fn note(&self) -> Option<u8> {
        match self {
            MidiMessage::NoteOn(note, _) | MidiMessage::NoteOff(note) => Some(*note),
            _ => None,
        }
    }

    /// Grid pad addressed by a note message, if any.
    pub fn position(&self) -> Option<GridPosition> {
        self.note().and_then(grid::decode)
    }
}
