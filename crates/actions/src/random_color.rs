//! RandomColor: light random pads with random colors until stopped.

use std::sync::Arc;
use std::time::Duration;

use launchgrid_core::{
    parse_args, unknown_action, ActionContext, ActionError, ActionGroup, ActionSlot,
    GridPosition, Handler, LedColor,
};
use rand::Rng;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RandomColorArgs {
    /// Pad updates per second
    pub speed: f64,
}

pub struct RandomColor;

impl ActionGroup for RandomColor {
    fn name(&self) -> &'static str {
        "RandomColor"
    }

    fn build(
        &self,
        args: &serde_json::Value,
        slots: &[ActionSlot],
        context: &ActionContext,
    ) -> Result<Vec<Handler>, ActionError> {
        let args: RandomColorArgs = parse_args(self.name(), args)?;
        if !(args.speed.is_finite() && args.speed > 0.0) {
            return Err(ActionError::InvalidArgs {
                group: self.name().to_string(),
                message: format!("speed must be positive, got {}", args.speed),
            });
        }
        let interval = Duration::from_secs_f64(1.0 / args.speed);

        slots
            .iter()
            .map(|slot| match slot.name.as_str() {
                "run" => {
                    if !slot.exclusive {
                        log::warn!(
                            "RandomColor at {} runs until stopped; bind it as exclusive",
                            slot.position
                        );
                    }
                    let context = context.clone();
                    Ok(Arc::new(move || run(&context, interval)) as Handler)
                }
                _ => Err(unknown_action(self.name(), slot)),
            })
            .collect()
    }
}

fn run(context: &ActionContext, interval: Duration) {
    let mut rng = rand::rng();
    let stop = context.stop_signal();
    while !stop.is_set() {
        let pos = random_position(&mut rng);
        let color = LedColor::new(rng.random_range(1..=LedColor::MAX)).unwrap_or(LedColor::OFF);
        context.device().set_color(pos, color);
        stop.wait_timeout(interval);
    }
}

fn random_position<R: Rng>(rng: &mut R) -> GridPosition {
    loop {
        if let Ok(pos) = GridPosition::new(rng.random_range(0..8), rng.random_range(0..8)) {
            return pos;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use launchgrid_core::{DeviceSession, Launcher, RecordingSink};

    use super::*;

    #[test]
    fn test_rejects_non_positive_speed() {
        let launcher = Launcher::new(Arc::new(DeviceSession::new(Box::new(RecordingSink::new()))));
        let context = ActionContext::new(&launcher);
        let result = RandomColor.build(&serde_json::json!({ "speed": 0 }), &[], &context);
        assert!(matches!(result, Err(ActionError::InvalidArgs { .. })));
    }

    #[test]
    fn test_paints_until_stopped() {
        let sink = RecordingSink::new();
        let launcher = Launcher::new(Arc::new(DeviceSession::new(Box::new(sink.clone()))));
        let context = ActionContext::new(&launcher);

        let worker = {
            let context = context.clone();
            thread::spawn(move || run(&context, Duration::from_millis(1)))
        };
        thread::sleep(Duration::from_millis(30));
        context.stop_signal().set();
        worker.join().unwrap();

        let messages = sink.messages();
        assert!(!messages.is_empty());
        assert!(messages
            .iter()
            .all(|m| m[0] == 0x90 && launchgrid_core::decode(m[1]).is_some() && m[2] >= 1));
    }
}
