//! Paint: the grid becomes a canvas while the action owns it.
//!
//! Every press toggles the pad between off and the configured color. Presses
//! arrive through the launcher's pending queue, so this is only useful bound
//! as an exclusive action.

use std::sync::Arc;
use std::time::Duration;

use launchgrid_core::{
    parse_args, unknown_action, ActionContext, ActionError, ActionGroup, ActionSlot, GridPosition,
    Handler, LedColor, MidiMessage,
};
use serde::Deserialize;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaintArgs {
    pub color: LedColor,
}

pub struct Paint;

impl ActionGroup for Paint {
    fn name(&self) -> &'static str {
        "Paint"
    }

    fn build(
        &self,
        args: &serde_json::Value,
        slots: &[ActionSlot],
        context: &ActionContext,
    ) -> Result<Vec<Handler>, ActionError> {
        let args: PaintArgs = parse_args(self.name(), args)?;
        if args.color.is_off() {
            return Err(ActionError::InvalidArgs {
                group: self.name().to_string(),
                message: "paint color must not be off".to_string(),
            });
        }

        slots
            .iter()
            .map(|slot| match slot.name.as_str() {
                "run" => {
                    if !slot.exclusive {
                        log::warn!(
                            "Paint at {} needs the grid to itself; bind it as exclusive",
                            slot.position
                        );
                    }
                    let context = context.clone();
                    let color = args.color;
                    Ok(Arc::new(move || run(&context, color)) as Handler)
                }
                _ => Err(unknown_action(self.name(), slot)),
            })
            .collect()
    }
}

fn run(context: &ActionContext, color: LedColor) {
    let device = context.device();
    let stop = context.stop_signal();
    device.clear_all();

    while !stop.is_set() {
        let Some(message) = context.pending().pop_timeout(POLL_INTERVAL) else {
            continue;
        };
        if let Some(pos) = press_position(&message) {
            let next = if device.led(pos).is_off() {
                color
            } else {
                LedColor::OFF
            };
            device.set_color(pos, next);
        }
    }
}

fn press_position(message: &MidiMessage) -> Option<GridPosition> {
    if message.is_press() {
        message.position()
    } else {
        None
    }
}
