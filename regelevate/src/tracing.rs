use regelevate_events::RegElevateEvents;

// tl:{3c1d2a7e-9b64-5f0e-8a41-6d2f7c9e0b15}
static REGELEVATE_EVENTS: std::sync::OnceLock<RegElevateEvents> = std::sync::OnceLock::new();

pub fn regelevate_events() -> &'static RegElevateEvents {
    REGELEVATE_EVENTS.get_or_init(RegElevateEvents::new)
}

use crate::helpers::StartupMode;
use crate::launcher::LaunchError;
use crate::messages::*;

pub fn enable_tracing() {
    regelevate_events();
}

pub fn trace_log_message(message: &str) {
    regelevate_events().message(None, message);
}

pub fn trace_startup_mode(mode: StartupMode, arg_count: usize) {
    regelevate_events().startup_mode(None, mode.into(), arg_count.try_into().unwrap_or(u32::MAX));
}

pub fn trace_stage(stage: EscalationStage, status: StageStatus) {
    regelevate_events().stage(None, stage.into(), status as u32);
}

/// Logs what we're about to launch. The credentials themselves are never
/// logged, only whether there were any.
pub fn trace_launch(spec: &ProcessLaunchSpec) {
    regelevate_events().launch(
        None,
        &spec.executable_path().to_string_lossy(),
        spec.elevate(),
        spec.credentials().is_some(),
        spec.startup_mode() == StartupMode::ProbeOnly,
    );
}

pub fn trace_launch_result<T>(result: &Result<T, LaunchError>) {
    match result {
        Ok(_) => regelevate_events().launch_result(None, true, 0),
        Err(err) => regelevate_events().launch_result(None, false, err.native_code()),
    }
}

pub fn trace_helper_exit(exited: bool, exit_code: i32) {
    regelevate_events().helper_exit(None, exited, exit_code);
}

pub fn trace_outcome(outcome: EscalationOutcome, last_stage: EscalationStage) {
    regelevate_events().outcome(None, outcome.code(), last_stage.into());
}

pub fn trace_probe_step(step: &str, succeeded: bool) {
    regelevate_events().probe_step(None, step, succeeded);
}
