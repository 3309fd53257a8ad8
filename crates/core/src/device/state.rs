//! LED and press bookkeeping for the pad grid.

use crate::grid::{GridPosition, LedColor, GRID_SIZE};

/// What the device is showing and which pads are currently toggled down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceState {
    /// Last color sent to each pad
    leds: [[LedColor; GRID_SIZE]; GRID_SIZE],

    /// Flipped on every press and every release
    pressed: [[bool; GRID_SIZE]; GRID_SIZE],
}

impl DeviceState {
    pub fn new() -> Self {
        Self {
            leds: [[LedColor::OFF; GRID_SIZE]; GRID_SIZE],
            pressed: [[false; GRID_SIZE]; GRID_SIZE],
        }
    }

    pub fn led(&self, pos: GridPosition) -> LedColor {
        self.leds[pos.row() as usize][pos.col() as usize]
    }

    /// Record an outbound color. No deduplication: the caller always sends.
    pub fn set_led(&mut self, pos: GridPosition, color: LedColor) {
        self.leds[pos.row() as usize][pos.col() as usize] = color;
    }

    pub fn leds(&self) -> [[LedColor; GRID_SIZE]; GRID_SIZE] {
        self.leds
    }

    pub fn is_pressed(&self, pos: GridPosition) -> bool {
        self.pressed[pos.row() as usize][pos.col() as usize]
    }

    /// Flip the press flag for a pad.
    pub fn toggle_pressed(&mut self, pos: GridPosition) {
        let cell = &mut self.pressed[pos.row() as usize][pos.col() as usize];
        *cell = !*cell;
    }

    /// Number of pads whose toggle flag is set.
    pub fn pressed_count(&self) -> usize {
        self.pressed
            .iter()
            .map(|row| row.iter().filter(|p| **p).count())
            .sum()
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new()
    }
}
