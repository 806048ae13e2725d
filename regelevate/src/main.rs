#![cfg_attr(not(windows), allow(dead_code))]

mod credential_prompt;
mod escalation;
mod helpers;
mod launcher;
mod messages;
mod payload;
mod presentation;
mod probe;
mod r;
mod tests;
mod tracing;

use clap::{Arg, ArgAction, ArgMatches, Command};
use helpers::*;
use payload::{PayloadError, PayloadOperation, PayloadTarget};
use std::ffi::OsString;

#[cfg(windows)]
use {
    credential_prompt::Win32CredentialPrompt,
    escalation::EscalationStateMachine,
    launcher::Win32Launcher,
    messages::EscalationOutcome,
    payload::{run_payload, RegistryEnvironmentStore},
    presentation::ConsoleObserver,
    probe::{RegistryProbe, ResourceProbe},
};

fn mode_tag_arg(tag: &'static str) -> Arg {
    // Only we ever pass these, when we relaunch ourselves. StartupMode reads
    // them before clap does; clap just has to not choke on them.
    Arg::new(tag.trim_start_matches('-'))
        .long(tag.trim_start_matches('-'))
        .action(ArgAction::SetTrue)
        .global(true)
        .hide(true)
}

fn name_arg() -> Arg {
    Arg::new("name").help(r::IDS_NAME_HELP.get())
}

fn scope_arg() -> Arg {
    Arg::new("scope")
        .long("scope")
        .value_parser(["user", "system", "both"])
        .default_value("user")
        .help(r::IDS_SCOPE_HELP.get())
}

fn regelevate_cli() -> Command {
    Command::new(env!("CARGO_CRATE_NAME"))
        .about(r::IDS_ABOUT.get())
        .version(env!("CARGO_PKG_VERSION"))
        .disable_help_subcommand(true)
        .arg(mode_tag_arg(PROBE_ONLY_TAG))
        .arg(mode_tag_arg(ELEVATED_TAG))
        .arg(mode_tag_arg(DIFFERENT_USER_TAG))
        .subcommand(Command::new("check").about(r::IDS_CHECK_ABOUT.get()))
        .subcommand(
            Command::new("set")
                .about(r::IDS_SET_ABOUT.get())
                .arg(name_arg())
                .arg(Arg::new("value").help(r::IDS_VALUE_HELP.get()))
                .arg(scope_arg()),
        )
        .subcommand(
            Command::new("remove")
                .about(r::IDS_REMOVE_ABOUT.get())
                .arg(name_arg())
                .arg(scope_arg()),
        )
        .subcommand(
            Command::new("show")
                .about(r::IDS_SHOW_ABOUT.get())
                .arg(name_arg())
                .arg(scope_arg()),
        )
}

/// Turns the parsed command line into the operation to run once we're
/// allowed to. Anything left off comes from `defaults`.
fn operation_from_matches(
    matches: &ArgMatches,
    defaults: &PayloadDefaults,
) -> std::result::Result<PayloadOperation, PayloadError> {
    let (command, sub_matches) = match matches.subcommand() {
        Some(("set", m)) => ("set", m),
        Some(("remove", m)) => ("remove", m),
        Some(("show", m)) => ("show", m),
        _ => return Ok(PayloadOperation::Check),
    };

    let name = sub_matches
        .get_one::<String>("name")
        .cloned()
        .unwrap_or_else(|| defaults.name.clone());
    if name.trim().is_empty() {
        return Err(PayloadError::EmptyName);
    }
    let scope = match sub_matches.get_one::<String>("scope") {
        Some(scope) => scope.parse()?,
        None => PayloadTarget::User,
    };

    Ok(match command {
        "set" => {
            let value = match sub_matches.get_one::<String>("value") {
                Some(value) => value.clone(),
                None if !defaults.value.is_empty() => defaults.value.clone(),
                None => return Err(PayloadError::MissingValue(name)),
            };
            PayloadOperation::Set { name, value, scope }
        }
        "remove" => PayloadOperation::Remove { name, scope },
        _ => PayloadOperation::Show { name, scope },
    })
}

/// Works out the payload operation. A privileged instance takes everything
/// from its command line and never reads config: it may be running as someone
/// else, with a different HKCU than the instance that started it.
fn resolve_operation(
    mode: StartupMode,
    matches: &ArgMatches,
    config: &impl ConfigProvider,
) -> std::result::Result<PayloadOperation, PayloadError> {
    let defaults = if mode.is_privileged() {
        PayloadDefaults::default()
    } else {
        get_payload_defaults(config)
    };
    operation_from_matches(matches, &defaults)
}

#[cfg(windows)]
fn run_probe_only() -> bool {
    RegistryProbe.probe()
}

#[cfg(not(windows))]
fn run_probe_only() -> bool {
    false
}

#[cfg(windows)]
fn escalate(operation: &PayloadOperation) -> EscalationOutcome {
    // Stage 1 doesn't need this, so a failure here only rules out 2 and 3.
    let executable = match std::env::current_exe() {
        Ok(path) => Some(path),
        Err(err) => {
            tracing::trace_log_message(&format!("current_exe failed: {err}"));
            None
        }
    };

    let cancel = CancellationToken::default();
    install_cancel_handler(&cancel);

    let mut machine = EscalationStateMachine::new(
        executable,
        operation.to_args(),
        RegistryProbe,
        Win32Launcher,
        Win32CredentialPrompt::new(current_domain()),
        ConsoleObserver::new(),
        cancel,
    );
    #[cfg(feature = "Feature_skip_redundant_elevation")]
    {
        machine = machine.with_elevation_query(escalation::TokenElevationQuery);
    }
    machine.run()
}

#[cfg(windows)]
fn run_requested(mode: StartupMode, matches: &ArgMatches) -> i32 {
    // Validate before escalating, so a typo doesn't cost anyone a UAC prompt.
    let operation = match resolve_operation(mode, matches, &RegistryConfigProvider) {
        Ok(operation) => operation,
        Err(err) => {
            eprintln!("{err}");
            return 1;
        }
    };

    if !mode.is_privileged() {
        match escalate(&operation) {
            EscalationOutcome::Granted(_) => {}
            // The privileged instance does the work from here.
            EscalationOutcome::Relaunched(_) => return 0,
            EscalationOutcome::Exhausted | EscalationOutcome::Cancelled => return 1,
        }
    }

    match run_payload(&RegistryEnvironmentStore, &operation) {
        Ok(report) => {
            println!("{report}");
            0
        }
        Err(err) => {
            tracing::trace_log_message(&err.to_string());
            eprintln!("{err}");
            1
        }
    }
}

#[cfg(windows)]
fn real_main(mode: StartupMode, matches: &ArgMatches) -> i32 {
    let code = run_requested(mode, matches);
    if should_pause_before_exit(mode, console_process_count()) {
        eprint!("{}", r::IDS_PRESS_ENTER.get());
        _ = std::io::stdin().read_line(&mut String::new());
    }
    code
}

#[cfg(not(windows))]
fn real_main(_mode: StartupMode, _matches: &ArgMatches) -> i32 {
    eprintln!("{}", r::IDS_UNSUPPORTED_PLATFORM.get());
    1
}

fn main() {
    tracing::enable_tracing();

    let args: Vec<OsString> = std::env::args_os().skip(1).collect();
    let mode = StartupMode::detect(&args);
    tracing::trace_startup_mode(mode, args.len());

    if mode == StartupMode::ProbeOnly {
        // No parsing, no output. The parent only looks at the exit code, and
        // it has to be 0 or 1.
        std::process::exit(if run_probe_only() { 0 } else { 1 });
    }

    let matches = regelevate_cli().get_matches();
    std::process::exit(real_main(mode, &matches));
}
