//! stagegridd: the Stagegrid rollout controller daemon.
//!
//! Wires the state store, the stage controller, the work queue and its
//! background loops, and the REST API into one process.

pub mod control;
pub mod queue;
pub mod reconciler;

use std::sync::Arc;

use stagegrid_core::StagegridConfig;
use stagegrid_rollout::{CommandDispatcher, ControllerSettings, StageController, SyncDispatcher};
use stagegrid_state::StateStore;

/// File name of the state database inside the data directory.
pub const DB_FILE: &str = "stagegrid.redb";

pub fn controller_settings(config: &StagegridConfig) -> ControllerSettings {
    ControllerSettings {
        requeue_delay: config.requeue_delay(),
        rounding: config.controller.rounding,
    }
}

/// The external sync command described by `[dispatch]`.
pub fn command_dispatcher(config: &StagegridConfig) -> CommandDispatcher {
    CommandDispatcher::new(&config.dispatch.program, config.dispatch.args.clone())
        .with_already_running_exit_code(config.dispatch.already_running_exit_code)
        .with_timeout(config.dispatch_timeout())
}

/// A controller backed by `store` for cluster and unit lookups.
pub fn build_controller(
    config: &StagegridConfig,
    store: &StateStore,
    dispatcher: Arc<dyn SyncDispatcher>,
) -> StageController {
    let shared = Arc::new(store.clone());
    StageController::new(shared.clone(), shared, dispatcher).with_settings(controller_settings(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use stagegrid_core::RoundingMode;

    #[test]
    fn settings_follow_config() {
        let config = StagegridConfig::parse(
            "[controller]\nrequeue_delay_secs = 10\nrounding = \"up\"\n[dispatch]\nargs = [\"sync\", \"{unit}\"]",
        )
        .unwrap();
        let settings = controller_settings(&config);
        assert_eq!(settings.requeue_delay, Duration::from_secs(10));
        assert_eq!(settings.rounding, RoundingMode::Up);

        let dispatcher = command_dispatcher(&config);
        assert_eq!(dispatcher.args_for("web"), vec!["sync", "web"]);
    }
}
