use win_etw_macros::trace_logging_provider;
// Note: Generate GUID using TlgGuid.exe tool
#[trace_logging_provider(
    name = "RegElevate.Escalation",
    guid = "3c1d2a7e-9b64-5f0e-8a41-6d2f7c9e0b15",
    provider_group_guid = "ffffffff-ffff-ffff-ffff-ffffffffffff"
)]
// tl:{3c1d2a7e-9b64-5f0e-8a41-6d2f7c9e0b15}

pub trait RegElevateEvents {
    fn message(message: &str);

    // startup_mode:
    //   * 0: probe-only helper
    //   * 1: relaunched elevated
    //   * 2: relaunched as a different user
    //   * 3: full escalation
    fn startup_mode(startup_mode: u32, arg_count: u32);

    // stage: 1..=3, in escalation order.
    // status: 0 pending, 1 running, 2 succeeded, 3 failed
    fn stage(stage: u32, status: u32);

    // Never include the credentials themselves, only whether there were any.
    fn launch(exe_name: &str, elevate: bool, with_credentials: bool, probe_only: bool);

    // native_error is 0 when the launch itself succeeded.
    fn launch_result(succeeded: bool, native_error: u32);

    fn helper_exit(exited: bool, exit_code: i32);

    // outcome:
    //   * 0: granted in this process
    //   * 1: relaunched into a privileged instance
    //   * 2: exhausted
    //   * 3: cancelled
    fn outcome(outcome: u32, stage: u32);

    fn probe_step(step: &str, succeeded: bool);
}
