//! Dispatch engine: routes pad presses to actions and arbitrates between
//! fire-and-forget and exclusive execution.
//!
//! # States
//!
//! ```text
//!            press on exclusive pad
//!   Idle ─────────────────────────────▶ ExclusiveRunning
//!    ▲                                        │
//!    └──── handler returned / exit gesture ◀──┘
//! ```
//!
//! While `Idle`, a press on a fire-and-forget pad spawns a detached thread and
//! a press on an exclusive pad blanks the grid and starts the exclusive
//! thread. While `ExclusiveRunning`, every inbound message is queued for the
//! exclusive action; holding three or more pads raises the stop signal and
//! waits for the action to return.
//!
//! # Locking
//!
//! Locks are always taken in the order dispatch state → registry → device, and
//! no lock is held while joining the exclusive thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex, MutexGuard};

use super::queue::PendingQueue;
use super::signal::StopSignal;
use crate::device::DeviceSession;
use crate::grid::{GridPosition, LedColor};
use crate::midi::midi::MidiMessage;
use crate::registry::{ActionRecord, ActionRegistry, Handler, RegistrySnapshot};

/// Number of simultaneously toggled pads that aborts an exclusive action.
pub const EXIT_GESTURE_PADS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    Idle,
    ExclusiveRunning,
}

/// A handler that panicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFault {
    pub position: GridPosition,
    pub exclusive: bool,
    pub message: String,
}

/// Observer notified whenever a handler panics.
pub type FaultHook = Arc<dyn Fn(&HandlerFault) + Send + Sync>;

struct DispatchState {
    mode: DispatchMode,
    /// Incremented for every exclusive session
    session: u64,
    exclusive: Option<JoinHandle<()>>,
}

struct Shared {
    device: Arc<DeviceSession>,
    state: Mutex<DispatchState>,
    /// Notified whenever an exclusive session returns to Idle
    session_ended: Condvar,
    registry: Mutex<ActionRegistry>,
    pending: PendingQueue,
    stop: StopSignal,
    started: AtomicBool,
    fault_hook: Mutex<Option<FaultHook>>,
}

impl Shared {
    /// Leave the given exclusive session, if it is still the active one.
    fn finish_exclusive(&self, session: u64) {
        let mut state = self.state.lock();
        if state.mode != DispatchMode::ExclusiveRunning || state.session != session {
            return;
        }
        state.mode = DispatchMode::Idle;
        // Either the joiner already took the handle or we are that thread
        state.exclusive = None;

        self.registry.lock().repaint(&self.device);
        self.stop.set();
        self.session_ended.notify_all();
        log::info!("Exclusive session {} ended", session);
    }

    /// Block until the running exclusive session, if any, has ended.
    ///
    /// Only one caller can own the join handle; any other caller waits for
    /// the owner's session to reach Idle instead. The lock is released while
    /// waiting either way.
    fn wait_exclusive(&self, mut state: MutexGuard<'_, DispatchState>) {
        match state.exclusive.take() {
            Some(handle) => {
                drop(state);
                if handle.join().is_err() {
                    log::error!("Exclusive action thread terminated abnormally");
                }
            }
            None => {
                while state.mode == DispatchMode::ExclusiveRunning {
                    self.session_ended.wait(&mut state);
                }
            }
        }
    }

    fn report_fault(&self, fault: HandlerFault) {
        log::error!(
            "Action at {} panicked{}: {}",
            fault.position,
            if fault.exclusive { " (exclusive)" } else { "" },
            fault.message
        );
        let hook = self.fault_hook.lock().clone();
        if let Some(hook) = hook {
            hook(&fault);
        }
    }
}

/// Run a handler, turning a panic into a [`HandlerFault`].
fn run_guarded(shared: &Shared, pos: GridPosition, exclusive: bool, handler: &Handler) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| (handler.as_ref())())) {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        shared.report_fault(HandlerFault {
            position: pos,
            exclusive,
            message,
        });
    }
}

/// The action launcher: registry, dispatch state machine and shared signals.
///
/// Cloning is cheap; all clones drive the same engine.
#[derive(Clone)]
pub struct Launcher {
    shared: Arc<Shared>,
}

impl Launcher {
    pub fn new(device: Arc<DeviceSession>) -> Self {
        Self {
            shared: Arc::new(Shared {
                device,
                state: Mutex::new(DispatchState {
                    mode: DispatchMode::Idle,
                    session: 0,
                    exclusive: None,
                }),
                session_ended: Condvar::new(),
                registry: Mutex::new(ActionRegistry::new()),
                pending: PendingQueue::new(),
                stop: StopSignal::new(),
                started: AtomicBool::new(false),
                fault_hook: Mutex::new(None),
            }),
        }
    }

    /// Mark startup complete and start consuming inbound messages.
    pub fn start(&self) {
        self.shared.started.store(true, Ordering::SeqCst);

        let weak = Arc::downgrade(&self.shared);
        self.shared.device.register_callback(move |message| {
            if let Some(shared) = weak.upgrade() {
                Launcher { shared }.handle_message(message);
            }
        });
        log::info!("Launcher started");
    }

    pub fn is_started(&self) -> bool {
        self.shared.started.load(Ordering::SeqCst)
    }

    /// Bind a pad to an action.
    ///
    /// Once started, and while no exclusive session owns the grid, the whole
    /// grid is repainted.
    pub fn register(&self, pos: GridPosition, color: LedColor, exclusive: bool, handler: Handler) {
        let state = self.shared.state.lock();
        let live = self.is_started() && state.mode == DispatchMode::Idle;
        self.shared.registry.lock().register(
            pos,
            ActionRecord::new(color, exclusive, handler),
            live.then_some(&*self.shared.device),
        );
    }

    /// Unbind a pad, turning its LED off unless an exclusive session owns the grid.
    pub fn revoke(&self, pos: GridPosition) -> bool {
        let state = self.shared.state.lock();
        let idle = state.mode == DispatchMode::Idle;
        self.shared
            .registry
            .lock()
            .revoke(pos, idle.then_some(&*self.shared.device))
            .is_some()
    }

    /// Change a bound pad's color. Returns `false` if the pad is unbound.
    pub fn recolor(&self, pos: GridPosition, color: LedColor) -> bool {
        let state = self.shared.state.lock();
        let idle = state.mode == DispatchMode::Idle;
        self.shared
            .registry
            .lock()
            .recolor(pos, color, idle.then_some(&*self.shared.device))
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        self.shared.registry.lock().snapshot()
    }

    /// Clear the grid and light every bound pad.
    pub fn repaint(&self) {
        let _state = self.shared.state.lock();
        self.shared.registry.lock().repaint(&self.shared.device);
    }

    pub fn mode(&self) -> DispatchMode {
        self.shared.state.lock().mode
    }

    pub fn is_exclusive_active(&self) -> bool {
        self.mode() == DispatchMode::ExclusiveRunning
    }

    pub fn device(&self) -> &Arc<DeviceSession> {
        &self.shared.device
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.shared.stop
    }

    pub fn pending(&self) -> &PendingQueue {
        &self.shared.pending
    }

    /// Install an observer for panicking handlers.
    pub fn set_fault_hook<F>(&self, hook: F)
    where
        F: Fn(&HandlerFault) + Send + Sync + 'static,
    {
        *self.shared.fault_hook.lock() = Some(Arc::new(hook));
    }

    /// A handle that does not keep the launcher alive.
    pub fn downgrade(&self) -> LauncherHandle {
        LauncherHandle {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Route one inbound message. Returns quickly except when the exit
    /// gesture fires, in which case it waits for the exclusive action.
    pub fn handle_message(&self, message: &MidiMessage) {
        let mut state = self.shared.state.lock();

        if state.mode == DispatchMode::ExclusiveRunning {
            self.shared.pending.push(message.clone());

            if !message.is_press_or_release()
                || self.shared.device.pressed_count() < EXIT_GESTURE_PADS
            {
                return;
            }

            log::info!("Exit gesture detected, stopping exclusive action");
            self.shared.stop.set();
            let session = state.session;
            self.shared.wait_exclusive(state);
            self.shared.finish_exclusive(session);
            return;
        }

        if !message.is_press() {
            return;
        }
        let Some(pos) = message.position() else {
            return;
        };
        let Some(record) = self.shared.registry.lock().get(pos).cloned() else {
            log::debug!("No action bound at {}", pos);
            return;
        };

        if record.exclusive {
            self.begin_exclusive(&mut state, pos, record.handler);
        } else {
            self.spawn_detached(pos, record.handler);
        }
    }

    fn spawn_detached(&self, pos: GridPosition, handler: Handler) {
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(format!("action {}", pos))
            .spawn(move || run_guarded(&shared, pos, false, &handler));

        match spawned {
            Ok(_) => log::debug!("Launched action at {}", pos),
            Err(e) => log::error!("Failed to spawn action at {}: {}", pos, e),
        }
    }

    fn begin_exclusive(&self, state: &mut DispatchState, pos: GridPosition, handler: Handler) {
        state.mode = DispatchMode::ExclusiveRunning;
        state.session += 1;
        let session = state.session;

        self.shared.pending.clear();
        self.shared.stop.clear();
        self.shared.device.clear_all();

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(format!("exclusive {}", pos))
            .spawn(move || {
                run_guarded(&shared, pos, true, &handler);
                shared.finish_exclusive(session);
            });

        match spawned {
            Ok(handle) => {
                log::info!("Exclusive session {} started at {}", session, pos);
                state.exclusive = Some(handle);
            }
            Err(e) => {
                log::error!("Failed to spawn exclusive action at {}: {}", pos, e);
                state.mode = DispatchMode::Idle;
                self.shared.registry.lock().repaint(&self.shared.device);
                self.shared.stop.set();
            }
        }
    }

    /// Stop dispatching, signal the exclusive action and wait for it.
    ///
    /// Fire-and-forget actions are not waited for. Clearing the grid and
    /// closing the device is left to the caller.
    pub fn shutdown(&self) {
        self.shared.device.clear_callback();
        self.shared.stop.set();

        let state = self.shared.state.lock();
        if state.mode == DispatchMode::ExclusiveRunning {
            log::info!("Waiting for exclusive action to finish...");
        }
        self.shared.wait_exclusive(state);
        log::info!("Launcher shutdown complete");
    }
}

/// Weak reference to a [`Launcher`], for actions that rebind or recolor pads.
#[derive(Clone)]
pub struct LauncherHandle {
    shared: Weak<Shared>,
}

impl LauncherHandle {
    pub fn upgrade(&self) -> Option<Launcher> {
        self.shared.upgrade().map(|shared| Launcher { shared })
    }

    pub fn register(&self, pos: GridPosition, color: LedColor, exclusive: bool, handler: Handler) {
        if let Some(launcher) = self.upgrade() {
            launcher.register(pos, color, exclusive, handler);
        }
    }

    pub fn revoke(&self, pos: GridPosition) -> bool {
        self.upgrade().is_some_and(|launcher| launcher.revoke(pos))
    }

    pub fn recolor(&self, pos: GridPosition, color: LedColor) -> bool {
        self.upgrade()
            .is_some_and(|launcher| launcher.recolor(pos, color))
    }
}
