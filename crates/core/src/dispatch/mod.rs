//! Action dispatch: the Idle / ExclusiveRunning state machine and the
//! signals it shares with running actions.

mod engine;
mod queue;
mod signal;

pub use engine::{
    DispatchMode, FaultHook, HandlerFault, Launcher, LauncherHandle, EXIT_GESTURE_PADS,
};
pub use queue::PendingQueue;
pub use signal::StopSignal;
