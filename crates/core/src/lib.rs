//! Core of the launchgrid pad launcher: grid codec, device session, action
//! registry and the dispatch engine.

pub use action::{
    parse_args, unknown_action, ActionCatalog, ActionContext, ActionError, ActionGroup,
    ActionSlot, LoadReport,
};
pub use config::{
    ActionEntry, ConfigError, ConflictingModeFlags, DeviceConfig, LaunchConfig, MacroDescriptor,
    DEFAULT_CONFIG_PATH,
};
pub use device::{
    DeviceError, DeviceSession, DeviceState, InboundCallback, MidiSink, PortDirection,
    PortListing, RecordingSink,
};
pub use dispatch::{
    DispatchMode, FaultHook, HandlerFault, Launcher, LauncherHandle, PendingQueue, StopSignal,
    EXIT_GESTURE_PADS,
};
pub use grid::{
    color_frame, control_mode_frame, decode, encode, GridError, GridPosition, LedColor, GRID_SIZE,
};
pub use midi::midi::MidiMessage;
pub use registry::{ActionRecord, ActionRegistry, Handler, RegistrySnapshot};

mod action;
mod config;
mod device;
mod dispatch;
pub mod grid;
mod midi;
mod registry;
