//! Action registry: which pad runs what, and in which color.
//!
//! Mutations take an optional display. The dispatch engine passes the device
//! only while the registry owns the grid (startup done, no exclusive session),
//! so the grid is repainted exactly when it should mirror the registry.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::device::DeviceSession;
use crate::grid::{GridPosition, LedColor};

/// A zero-argument action body.
pub type Handler = Arc<dyn Fn() + Send + Sync>;

/// Position → color view of the registry, ordered row by row.
pub type RegistrySnapshot = BTreeMap<GridPosition, LedColor>;

/// What a pad does when pressed.
#[derive(Clone)]
pub struct ActionRecord {
    pub handler: Handler,
    pub color: LedColor,
    /// Takes over input and display until it returns
    pub exclusive: bool,
}

impl ActionRecord {
    pub fn new(color: LedColor, exclusive: bool, handler: Handler) -> Self {
        Self {
            handler,
            color,
            exclusive,
        }
    }
}

impl fmt::Debug for ActionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRecord")
            .field("color", &self.color)
            .field("exclusive", &self.exclusive)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct ActionRegistry {
    actions: HashMap<GridPosition, ActionRecord>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a pad, replacing any previous binding.
    ///
    /// With a display, the whole grid is cleared and repainted: registrations
    /// usually arrive in bulk, so one full paint beats tracking diffs.
    pub fn register(
        &mut self,
        pos: GridPosition,
        record: ActionRecord,
        display: Option<&DeviceSession>,
    ) -> Option<ActionRecord> {
        log::debug!(
            "Registering {} action at {} (color {})",
            if record.exclusive { "exclusive" } else { "fire-and-forget" },
            pos,
            record.color.value()
        );
        let previous = self.actions.insert(pos, record);
        if let Some(device) = display {
            self.repaint(device);
        }
        previous
    }

    /// Unbind a pad. With a display, only that pad is turned off.
    pub fn revoke(
        &mut self,
        pos: GridPosition,
        display: Option<&DeviceSession>,
    ) -> Option<ActionRecord> {
        let removed = self.actions.remove(&pos);
        if let Some(device) = display {
            device.set_color(pos, LedColor::OFF);
        }
        removed
    }

    /// Change a bound pad's color. Returns `false` if nothing is bound there.
    pub fn recolor(
        &mut self,
        pos: GridPosition,
        color: LedColor,
        display: Option<&DeviceSession>,
    ) -> bool {
        let Some(record) = self.actions.get_mut(&pos) else {
            log::debug!("Ignoring recolor of unbound pad {}", pos);
            return false;
        };
        record.color = color;
        if let Some(device) = display {
            device.set_color(pos, color);
        }
        true
    }

    pub fn get(&self, pos: GridPosition) -> Option<&ActionRecord> {
        self.actions.get(&pos)
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        self.actions
            .iter()
            .map(|(pos, record)| (*pos, record.color))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Blank the grid, then light every bound pad.
    pub fn repaint(&self, device: &DeviceSession) {
        device.clear_all();
        for (pos, color) in self.snapshot() {
            device.set_color(pos, color);
        }
    }
}
