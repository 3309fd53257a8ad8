//! Action groups and the catalog that instantiates them from configuration.
//!
//! An [`ActionGroup`] is a statically linked family of actions (for example
//! "Paint") that decodes its own typed arguments and produces one handler per
//! configured pad. The [`ActionCatalog`] maps group identifiers to groups and
//! registers the resulting handlers with a [`Launcher`].

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::{ConflictingModeFlags, LaunchConfig, MacroDescriptor};
use crate::device::DeviceSession;
use crate::dispatch::{Launcher, LauncherHandle, PendingQueue, StopSignal};
use crate::grid::{GridError, GridPosition, LedColor};
use crate::registry::Handler;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("unknown action group '{0}'")]
    UnknownGroup(String),

    #[error("action group '{group}' has no action named '{action}'")]
    UnknownAction { group: String, action: String },

    #[error("invalid arguments for '{group}': {message}")]
    InvalidArgs { group: String, message: String },

    #[error("invalid binding '{group}.{action}': {source}")]
    InvalidBinding {
        group: String,
        action: String,
        #[source]
        source: GridError,
    },

    #[error("invalid mode for '{group}.{action}': {source}")]
    InvalidMode {
        group: String,
        action: String,
        #[source]
        source: ConflictingModeFlags,
    },
}

/// A configured pad, validated against the grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSlot {
    pub name: String,
    pub position: GridPosition,
    pub color: LedColor,
    pub exclusive: bool,
}

/// Everything an action may touch while it runs.
#[derive(Clone)]
pub struct ActionContext {
    launcher: LauncherHandle,
    device: Arc<DeviceSession>,
    stop: StopSignal,
    pending: PendingQueue,
}

impl ActionContext {
    pub fn new(launcher: &Launcher) -> Self {
        Self {
            launcher: launcher.downgrade(),
            device: Arc::clone(launcher.device()),
            stop: launcher.stop_signal().clone(),
            pending: launcher.pending().clone(),
        }
    }

    /// For rebinding or recoloring pads from inside an action.
    pub fn launcher(&self) -> &LauncherHandle {
        &self.launcher
    }

    pub fn device(&self) -> &DeviceSession {
        &self.device
    }

    /// Exclusive actions must return soon after this is set.
    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    /// Input captured while an exclusive action owns the grid.
    pub fn pending(&self) -> &PendingQueue {
        &self.pending
    }
}

/// A family of actions selectable by name from configuration.
pub trait ActionGroup: Send + Sync {
    /// Identifier used in the configuration's `name` field.
    fn name(&self) -> &'static str;

    /// Decode `args` and build one handler per slot, in slot order.
    fn build(
        &self,
        args: &serde_json::Value,
        slots: &[ActionSlot],
        context: &ActionContext,
    ) -> Result<Vec<Handler>, ActionError>;
}

/// Decode a group's arguments into its typed form.
///
/// Missing arguments (`null`) decode as an empty object, so groups whose
/// fields all have defaults need no `args` at all.
pub fn parse_args<T: DeserializeOwned>(
    group: &str,
    args: &serde_json::Value,
) -> Result<T, ActionError> {
    let args = if args.is_null() {
        serde_json::Value::Object(Default::default())
    } else {
        args.clone()
    };
    serde_json::from_value(args).map_err(|e| ActionError::InvalidArgs {
        group: group.to_string(),
        message: e.to_string(),
    })
}

/// Error for a slot naming an action the group does not provide.
pub fn unknown_action(group: &str, slot: &ActionSlot) -> ActionError {
    ActionError::UnknownAction {
        group: group.to_string(),
        action: slot.name.clone(),
    }
}

/// Outcome of loading a configuration into a launcher.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub registered: usize,
    pub errors: Vec<ActionError>,
}

/// Known action groups, keyed by identifier.
#[derive(Default)]
pub struct ActionCatalog {
    groups: BTreeMap<&'static str, Arc<dyn ActionGroup>>,
}

impl ActionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<G: ActionGroup + 'static>(mut self, group: G) -> Self {
        self.insert(Arc::new(group));
        self
    }

    pub fn insert(&mut self, group: Arc<dyn ActionGroup>) {
        if self.groups.insert(group.name(), Arc::clone(&group)).is_some() {
            log::warn!("Action group '{}' registered twice", group.name());
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ActionGroup>> {
        self.groups.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.groups.keys().copied()
    }

    /// Register every macro in `config` with `launcher`.
    ///
    /// Problems are reported per descriptor: the offending descriptor is
    /// skipped and loading continues with the next one.
    pub fn load(&self, config: &LaunchConfig, launcher: &Launcher) -> LoadReport {
        let context = ActionContext::new(launcher);
        let mut report = LoadReport::default();

        for descriptor in &config.macros {
            match self.instantiate(descriptor, &context) {
                Ok(bindings) => {
                    for (slot, handler) in bindings {
                        launcher.register(slot.position, slot.color, slot.exclusive, handler);
                        report.registered += 1;
                    }
                }
                Err(e) => {
                    log::error!("Skipping macro '{}': {}", descriptor.name, e);
                    report.errors.push(e);
                }
            }
        }

        log::info!(
            "Registered {} actions from {} macros ({} skipped)",
            report.registered,
            config.macros.len(),
            report.errors.len()
        );
        report
    }

    fn instantiate(
        &self,
        descriptor: &MacroDescriptor,
        context: &ActionContext,
    ) -> Result<Vec<(ActionSlot, Handler)>, ActionError> {
        let group = self
            .get(&descriptor.name)
            .ok_or_else(|| ActionError::UnknownGroup(descriptor.name.clone()))?;

        let slots = descriptor
            .actions
            .iter()
            .map(|entry| {
                let invalid = |source| ActionError::InvalidBinding {
                    group: descriptor.name.clone(),
                    action: entry.name.clone(),
                    source,
                };
                let exclusive =
                    entry
                        .is_exclusive()
                        .map_err(|source| ActionError::InvalidMode {
                            group: descriptor.name.clone(),
                            action: entry.name.clone(),
                            source,
                        })?;
                Ok(ActionSlot {
                    name: entry.name.clone(),
                    position: entry.grid_position().map_err(invalid)?,
                    color: entry.led_color().map_err(invalid)?,
                    exclusive,
                })
            })
            .collect::<Result<Vec<_>, ActionError>>()?;

        let handlers = group.build(&descriptor.args, &slots, context)?;
        debug_assert_eq!(handlers.len(), slots.len());
        Ok(slots.into_iter().zip(handlers).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde::Deserialize;

    use super::*;
    use crate::device::RecordingSink;

    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    struct CounterArgs {
        #[serde(default)]
        step: usize,
    }

    struct Counter {
        total: Arc<AtomicUsize>,
    }

    impl ActionGroup for Counter {
        fn name(&self) -> &'static str {
            "Counter"
        }

        fn build(
            &self,
            args: &serde_json::Value,
            slots: &[ActionSlot],
            _context: &ActionContext,
        ) -> Result<Vec<Handler>, ActionError> {
            let args: CounterArgs = parse_args(self.name(), args)?;
            slots
                .iter()
                .map(|slot| match slot.name.as_str() {
                    "bump" => {
                        let total = Arc::clone(&self.total);
                        let step = args.step;
                        Ok(Arc::new(move || {
                            total.fetch_add(step, Ordering::SeqCst);
                        }) as Handler)
                    }
                    _ => Err(unknown_action(self.name(), slot)),
                })
                .collect()
        }
    }

    fn launcher() -> Launcher {
        Launcher::new(Arc::new(DeviceSession::new(Box::new(RecordingSink::new()))))
    }

    fn catalog() -> (ActionCatalog, Arc<AtomicUsize>) {
        let total = Arc::new(AtomicUsize::new(0));
        let catalog = ActionCatalog::new().with(Counter {
            total: Arc::clone(&total),
        });
        (catalog, total)
    }

    #[test]
    fn test_load_registers_known_groups_and_skips_the_rest() {
        let (catalog, _total) = catalog();
        let launcher = launcher();
        let config = LaunchConfig::from_json(
            r#"{ "macros": [
                { "name": "Counter", "actions": [
                    { "name": "bump", "position": [0, 0], "color": 5 },
                    { "name": "bump", "position": [0, 1], "color": 6, "blocking": true }
                ], "args": { "step": 2 } },
                { "name": "Missing", "actions": [{ "name": "run", "position": [1, 1], "color": 1 }] },
                { "name": "Counter", "actions": [{ "name": "bump", "position": [2, 2], "color": 1 }],
                  "args": { "stpe": 2 } },
                { "name": "Counter", "actions": [{ "name": "jump", "position": [3, 3], "color": 1 }] },
                { "name": "Counter", "actions": [{ "name": "bump", "position": [9, 3], "color": 1 }] },
                { "name": "Counter", "actions": [{ "name": "bump", "position": [5, 5], "color": 1,
                  "exclusive": true, "blocking": false }] }
            ] }"#,
        )
        .unwrap();

        let report = catalog.load(&config, &launcher);

        assert_eq!(report.registered, 2);
        assert_eq!(report.errors.len(), 5);
        assert!(matches!(&report.errors[0], ActionError::UnknownGroup(name) if name == "Missing"));
        assert!(matches!(&report.errors[1], ActionError::InvalidArgs { .. }));
        assert!(matches!(&report.errors[2], ActionError::UnknownAction { action, .. } if action == "jump"));
        assert!(matches!(
            &report.errors[3],
            ActionError::InvalidBinding { source: GridError::OutOfBounds { row: 9, col: 3 }, .. }
        ));
        assert!(matches!(&report.errors[4], ActionError::InvalidMode { .. }));

        let snapshot = launcher.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(
            snapshot[&GridPosition::new(0, 1).unwrap()],
            LedColor::new(6).unwrap()
        );
    }

    #[test]
    fn test_loaded_handlers_run_on_press() {
        let (catalog, total) = catalog();
        let launcher = launcher();
        let config = LaunchConfig::from_json(
            r#"{ "macros": [{ "name": "Counter",
                 "actions": [{ "name": "bump", "position": [4, 4], "color": 9 }],
                 "args": { "step": 3 } }] }"#,
        )
        .unwrap();
        catalog.load(&config, &launcher);
        launcher.start();

        launcher.device().handle_inbound(&[0x90, 55, 127]);

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while total.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        assert_eq!(total.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_null_args_use_defaults() {
        let args: CounterArgs = parse_args("Counter", &serde_json::Value::Null).unwrap();
        assert_eq!(args.step, 0);
    }
}
