//! Grid coordinate codec.
//!
//! The Launchpad in programmer mode numbers its 8x8 pads with two-digit notes:
//! the tens digit is the row (1 = bottom) and the units digit is the column
//! (1 = left).
//!
//! ```text
//! Row 8: 81 82 83 84 85 86 87 88
//! ...
//! Row 1: 11 12 13 14 15 16 17 18
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of rows and columns on the pad grid.
pub const GRID_SIZE: usize = 8;

/// Status byte for a channel 1 Note On.
pub const NOTE_ON: u8 = 0x90;

/// Status byte for a channel 1 Note Off.
pub const NOTE_OFF: u8 = 0x80;

/// Novation SysEx header addressing the Launchpad X.
const SYSEX_HEADER: [u8; 6] = [0xF0, 0x00, 0x20, 0x29, 0x02, 0x0C];

/// Programmer/live mode toggle command.
const SYSEX_MODE_COMMAND: u8 = 0x0E;

const SYSEX_END: u8 = 0xF7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("grid position ({row}, {col}) is outside the 8x8 grid")]
    OutOfBounds { row: i64, col: i64 },

    #[error("LED color {0} is outside 0..=127")]
    InvalidColor(i64),
}

/// A pad on the grid, 0-indexed from the bottom-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "[u8; 2]", into = "[u8; 2]")]
pub struct GridPosition {
    row: u8,
    col: u8,
}

impl GridPosition {
    pub fn new(row: u8, col: u8) -> Result<Self, GridError> {
        if (row as usize) < GRID_SIZE && (col as usize) < GRID_SIZE {
            Ok(Self { row, col })
        } else {
            Err(GridError::OutOfBounds {
                row: row.into(),
                col: col.into(),
            })
        }
    }

    pub fn row(&self) -> u8 {
        self.row
    }

    pub fn col(&self) -> u8 {
        self.col
    }

    /// Every pad, row by row.
    pub fn all() -> impl Iterator<Item = GridPosition> {
        (0..GRID_SIZE as u8).flat_map(|row| (0..GRID_SIZE as u8).map(move |col| Self { row, col }))
    }
}

impl fmt::Display for GridPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

impl TryFrom<[u8; 2]> for GridPosition {
    type Error = GridError;

    fn try_from([row, col]: [u8; 2]) -> Result<Self, Self::Error> {
        Self::new(row, col)
    }
}

impl From<GridPosition> for [u8; 2] {
    fn from(pos: GridPosition) -> Self {
        [pos.row, pos.col]
    }
}

/// Palette index sent as the note velocity. 0 turns the pad off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct LedColor(u8);

impl LedColor {
    pub const OFF: LedColor = LedColor(0);
    pub const RED: LedColor = LedColor(5);
    pub const MAX: u8 = 127;

    pub fn new(value: u8) -> Result<Self, GridError> {
        if value <= Self::MAX {
            Ok(Self(value))
        } else {
            Err(GridError::InvalidColor(value.into()))
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    pub fn is_off(&self) -> bool {
        self.0 == 0
    }
}

impl TryFrom<u8> for LedColor {
    type Error = GridError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LedColor> for u8 {
    fn from(color: LedColor) -> Self {
        color.0
    }
}

/// Pad position to programmer-mode note number (11..=88).
pub fn encode(pos: GridPosition) -> u8 {
    (pos.row + 1) * 10 + (pos.col + 1)
}

/// Programmer-mode note number to pad position.
///
/// Returns `None` for notes that are not grid pads (side buttons, the logo,
/// anything with a 0 or 9 digit).
pub fn decode(note: u8) -> Option<GridPosition> {
    let tens = note / 10;
    let units = note % 10;
    if (1..=8).contains(&tens) && (1..=8).contains(&units) {
        Some(GridPosition {
            row: tens - 1,
            col: units - 1,
        })
    } else {
        None
    }
}

/// Note On frame lighting a single pad.
pub fn color_frame(pos: GridPosition, color: LedColor) -> [u8; 3] {
    [NOTE_ON, encode(pos), color.value()]
}

/// SysEx frame switching programmer mode on or off.
pub fn control_mode_frame(enter: bool) -> [u8; 9] {
    let mut frame = [0u8; 9];
    frame[..6].copy_from_slice(&SYSEX_HEADER);
    frame[6] = SYSEX_MODE_COMMAND;
    frame[7] = enter as u8;
    frame[8] = SYSEX_END;
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_every_pad() {
        for pos in GridPosition::all() {
            assert_eq!(decode(encode(pos)), Some(pos));
        }
        assert_eq!(GridPosition::all().count(), 64);
    }

    #[test]
    fn test_corner_notes() {
        assert_eq!(encode(GridPosition::new(0, 0).unwrap()), 11);
        assert_eq!(encode(GridPosition::new(7, 7).unwrap()), 88);
        assert_eq!(encode(GridPosition::new(2, 5).unwrap()), 36);
    }

    #[test]
    fn test_decode_rejects_non_grid_notes() {
        for note in [0, 9, 10, 19, 20, 89, 90, 91, 99, 127] {
            assert_eq!(decode(note), None, "note {} should not decode", note);
        }
    }

    #[test]
    fn test_bounds_are_enforced() {
        assert_eq!(
            GridPosition::new(8, 0),
            Err(GridError::OutOfBounds { row: 8, col: 0 })
        );
        assert!(GridPosition::new(0, 8).is_err());
        assert!(LedColor::new(128).is_err());
        assert_eq!(LedColor::new(127).unwrap().value(), 127);
    }

    #[test]
    fn test_frames() {
        let pos = GridPosition::new(1, 2).unwrap();
        assert_eq!(color_frame(pos, LedColor::new(5).unwrap()), [0x90, 23, 5]);

        let enter = control_mode_frame(true);
        assert_eq!(enter.len(), 9);
        assert_eq!(enter[7], 0x01);
        assert_eq!(control_mode_frame(false)[7], 0x00);
        assert_eq!(enter[0], 0xF0);
        assert_eq!(enter[8], 0xF7);
    }

    #[test]
    fn test_position_serde() {
        let pos: GridPosition = serde_json::from_str("[3, 4]").unwrap();
        assert_eq!(pos, GridPosition::new(3, 4).unwrap());
        assert!(serde_json::from_str::<GridPosition>("[3, 9]").is_err());
        assert!(serde_json::from_str::<LedColor>("200").is_err());
    }
}
