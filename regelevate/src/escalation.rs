//! The escalation state machine: try the current user, then an elevated
//! helper, then a helper running under credentials the user types in. The
//! first one that can write the registry wins.
//!
//! Stages 2 and 3 never probe in this process. They start a copy of us in
//! probe-only mode under the new authority, and only if _that_ exits 0 do we
//! start the real, privileged instance and step aside.

use crate::credential_prompt::{CredentialPrompt, PromptResult};
use crate::helpers::*;
use crate::launcher::{LaunchError, LaunchedProcess, ProcessLauncher};
use crate::messages::*;
use crate::probe::ResourceProbe;
use crate::r;
use crate::tracing;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How long we'll wait on a helper. Long enough for someone to read a UAC
/// prompt, short enough that a wedged helper doesn't wedge us.
pub const HELPER_TIMEOUT: Duration = Duration::from_secs(15);

/// How often we look up from a helper wait to check for cancellation.
pub const WAIT_SLICE: Duration = Duration::from_millis(250);

/// Receives everything the user should see while the escalation runs.
pub trait EscalationObserver {
    fn stage_status(&mut self, stage: EscalationStage, status: StageStatus);
    fn status(&mut self, title: &str, message: &str, severity: Severity);
    /// Called exactly once per run.
    fn finished(&mut self, outcome: EscalationOutcome);
}

pub trait ElevationQuery {
    fn is_elevated(&self) -> bool;
}

/// Asks our own process token. If we can't tell, assume we aren't elevated,
/// which just means we'll ask for it.
#[cfg(windows)]
#[derive(Default)]
pub struct TokenElevationQuery;

#[cfg(windows)]
impl ElevationQuery for TokenElevationQuery {
    fn is_elevated(&self) -> bool {
        is_running_elevated().unwrap_or_else(|err| {
            tracing::trace_log_message(&format!("elevation query failed: {:?}", err.code().0));
            false
        })
    }
}

/// Holds the credentials a stage-3 helper proved can write the registry,
/// between that probe and the real relaunch. At most one triple, and it's
/// dropped (zeroing the secret) the moment it's taken or cleared.
#[derive(Default, Debug)]
pub struct ValidatedCredentials(Option<CredentialTriple>);

impl ValidatedCredentials {
    pub fn store(&mut self, credentials: CredentialTriple) {
        self.0 = Some(credentials);
    }

    pub fn take(&mut self) -> Option<CredentialTriple> {
        self.0.take()
    }

    pub fn is_held(&self) -> bool {
        self.0.is_some()
    }

    pub fn clear(&mut self) {
        if let Some(mut credentials) = self.0.take() {
            credentials.wipe();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EscalationState {
    Running(EscalationStage),
    StageFailed(EscalationStage),
    Done(EscalationOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HelperExit {
    Exited(i32),
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AlternateProbe {
    /// The helper exited 0. The credentials are in the validated slot.
    Validated,
    /// The account can't write the registry, the helper couldn't start, or
    /// the user closed the prompt.
    Rejected,
    Cancelled,
}

pub struct EscalationStateMachine<P, L, C, O>
where
    P: ResourceProbe,
    L: ProcessLauncher,
    C: CredentialPrompt,
    O: EscalationObserver,
{
    executable: Option<PathBuf>,
    forwarded_args: Vec<String>,
    probe: P,
    launcher: L,
    prompt: C,
    observer: O,
    cancel: CancellationToken,
    elevation_query: Option<Box<dyn ElevationQuery>>,
    helper_timeout: Duration,
    validated: ValidatedCredentials,
    current_stage: EscalationStage,
    outcome: Option<EscalationOutcome>,
}

impl<P, L, C, O> EscalationStateMachine<P, L, C, O>
where
    P: ResourceProbe,
    L: ProcessLauncher,
    C: CredentialPrompt,
    O: EscalationObserver,
{
    /// `executable` is what we relaunch (ourselves). Without it only stage 1
    /// can run. `forwarded_args` is the fully resolved payload command line,
    /// which the real privileged instance gets after its mode tag.
    pub fn new(
        executable: Option<PathBuf>,
        forwarded_args: Vec<String>,
        probe: P,
        launcher: L,
        prompt: C,
        observer: O,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            executable,
            forwarded_args,
            probe,
            launcher,
            prompt,
            observer,
            cancel,
            elevation_query: None,
            helper_timeout: HELPER_TIMEOUT,
            validated: ValidatedCredentials::default(),
            current_stage: EscalationStage::Normal,
            outcome: None,
        }
    }

    /// With this set, stage 2 is skipped when we're already elevated. An
    /// elevated helper would just have our token, which stage 1 already
    /// tried.
    pub fn with_elevation_query(mut self, query: impl ElevationQuery + 'static) -> Self {
        self.elevation_query = Some(Box::new(query));
        self
    }

    #[cfg(test)]
    pub fn with_helper_timeout(mut self, timeout: Duration) -> Self {
        self.helper_timeout = timeout;
        self
    }

    /// Runs the stages in order until one of them gets us write access, they
    /// all fail, or we're cancelled. Calling this again just returns the
    /// outcome of the first run.
    pub fn run(&mut self) -> EscalationOutcome {
        if let Some(outcome) = self.outcome {
            return outcome;
        }

        for stage in EscalationStage::ALL {
            self.set_stage_status(stage, StageStatus::Pending);
        }

        let mut state = EscalationState::Running(EscalationStage::Normal);
        let outcome = loop {
            state = match state {
                EscalationState::Done(outcome) => break outcome,
                // Every state change follows a blocking call, so this is where
                // a cancel request is noticed.
                _ if self.cancel.is_cancelled() => {
                    EscalationState::Done(EscalationOutcome::Cancelled)
                }
                EscalationState::Running(stage) => {
                    self.current_stage = stage;
                    self.set_stage_status(stage, StageStatus::Running);
                    self.run_stage(stage)
                }
                EscalationState::StageFailed(stage) => {
                    self.set_stage_status(stage, StageStatus::Failed);
                    match stage.next() {
                        Some(next) => {
                            self.report_fall_through(stage);
                            EscalationState::Running(next)
                        }
                        None => EscalationState::Done(EscalationOutcome::Exhausted),
                    }
                }
            };
        };

        self.finish(outcome)
    }

    fn run_stage(&mut self, stage: EscalationStage) -> EscalationState {
        match stage {
            EscalationStage::Normal => self.run_normal(),
            EscalationStage::Elevated => self.run_elevated(),
            EscalationStage::AlternateUser => self.run_alternate_user(),
        }
    }

    fn run_normal(&mut self) -> EscalationState {
        self.info(&r::IDS_MSG_CHECKING_NORMAL);
        if self.probe.probe() {
            EscalationState::Done(EscalationOutcome::Granted(EscalationStage::Normal))
        } else {
            EscalationState::StageFailed(EscalationStage::Normal)
        }
    }

    fn run_elevated(&mut self) -> EscalationState {
        let stage = EscalationStage::Elevated;
        let already_elevated = self
            .elevation_query
            .as_ref()
            .is_some_and(|query| query.is_elevated());
        if already_elevated {
            self.warn(&r::IDS_MSG_ALREADY_ELEVATED);
            return EscalationState::StageFailed(stage);
        }

        let Some(executable) = self.executable.clone() else {
            self.warn(&r::IDS_MSG_NO_EXECUTABLE);
            return EscalationState::StageFailed(stage);
        };

        self.info(&r::IDS_MSG_CHECKING_ELEVATED);
        let helper = ProcessLaunchSpec::builder(&executable)
            .arg(PROBE_ONLY_TAG)
            .elevate(true)
            .suppress_window(true)
            .build();
        match self.probe_via_helper(&helper) {
            None => return EscalationState::Done(EscalationOutcome::Cancelled),
            Some(outcome) if !outcome.succeeded => return EscalationState::StageFailed(stage),
            Some(_) => {}
        }

        let real = ProcessLaunchSpec::builder(&executable)
            .arg(ELEVATED_TAG)
            .args(&self.forwarded_args)
            .elevate(true)
            .build();
        match self.launcher.launch(&real) {
            Ok(_) => EscalationState::Done(EscalationOutcome::Relaunched(stage)),
            Err(err) => {
                // The helper proved it works, but we still couldn't start the
                // real thing (the user can decline the second UAC prompt).
                // Stage 3 may yet get there.
                self.warn(&r::IDS_MSG_RELAUNCH_FAILED.format(&[&err.to_string()]));
                EscalationState::StageFailed(stage)
            }
        }
    }

    fn run_alternate_user(&mut self) -> EscalationState {
        // No point asking for a password we'd have nothing to use with.
        let Some(executable) = self.executable.clone() else {
            self.warn(&r::IDS_MSG_NO_EXECUTABLE);
            return EscalationState::StageFailed(EscalationStage::AlternateUser);
        };

        self.info(&r::IDS_MSG_CHECKING_ALTERNATE_USER);
        match self.probe_alternate_user(&executable) {
            AlternateProbe::Validated => self.relaunch_with_validated(&executable),
            AlternateProbe::Rejected => {
                EscalationState::StageFailed(EscalationStage::AlternateUser)
            }
            AlternateProbe::Cancelled => EscalationState::Done(EscalationOutcome::Cancelled),
        }
    }

    /// Prompts for credentials and tests them with a probe-only helper. Bad
    /// credentials get another prompt (with the failure shown); anything else
    /// ends the stage.
    fn probe_alternate_user(&mut self, executable: &Path) -> AlternateProbe {
        let mut retry = None;
        loop {
            let credentials = match self.prompt.prompt(retry) {
                PromptResult::Captured(credentials) => credentials,
                PromptResult::Cancelled => {
                    self.warn(&r::IDS_MSG_PROMPT_CANCELLED);
                    return AlternateProbe::Rejected;
                }
            };
            if self.cancel.is_cancelled() {
                return AlternateProbe::Cancelled;
            }

            let account = credentials.display_name();
            self.info(&r::IDS_MSG_TESTING_ACCOUNT.format(&[&account]));
            let helper = ProcessLaunchSpec::builder(executable)
                .arg(PROBE_ONLY_TAG)
                .credentials(credentials)
                .suppress_window(true)
                .build();

            match self.probe_via_helper(&helper) {
                None => return AlternateProbe::Cancelled,
                Some(outcome) if outcome.succeeded => {
                    return match helper.into_credentials() {
                        Some(credentials) => {
                            self.validated.store(credentials);
                            AlternateProbe::Validated
                        }
                        None => AlternateProbe::Rejected,
                    };
                }
                Some(ProbeOutcome {
                    auth_failure_code: Some(code),
                    ..
                }) => {
                    // `helper` goes out of scope at the end of this iteration,
                    // and the secret with it.
                    self.warn(&r::IDS_MSG_CREDENTIALS_REJECTED);
                    retry = Some(code);
                }
                Some(_) => {
                    self.warn(&r::IDS_MSG_ACCOUNT_LACKS_RIGHTS.format(&[&account]));
                    return AlternateProbe::Rejected;
                }
            }
        }
    }

    /// Starts the real instance under the validated credentials. The slot is
    /// empty afterwards whether or not the launch worked.
    fn relaunch_with_validated(&mut self, executable: &Path) -> EscalationState {
        let stage = EscalationStage::AlternateUser;
        let Some(credentials) = self.validated.take() else {
            return EscalationState::StageFailed(stage);
        };

        let real = ProcessLaunchSpec::builder(executable)
            .arg(DIFFERENT_USER_TAG)
            .args(&self.forwarded_args)
            .credentials(credentials)
            .build();
        let result = self.launcher.launch(&real);
        drop(real);

        match result {
            Ok(_) => EscalationState::Done(EscalationOutcome::Relaunched(stage)),
            Err(err) => {
                self.warn(&r::IDS_MSG_RELAUNCH_FAILED.format(&[&err.to_string()]));
                EscalationState::StageFailed(stage)
            }
        }
    }

    /// Launches a probe-only helper and waits for its verdict. None means we
    /// were cancelled while waiting.
    fn probe_via_helper(&mut self, spec: &ProcessLaunchSpec) -> Option<ProbeOutcome> {
        let launched = self.launcher.launch(spec);
        if self.cancel.is_cancelled() {
            return None;
        }

        // Not being able to start the helper at all is the same as the helper
        // saying no. Only bad credentials are worth telling apart.
        let mut process = match launched {
            Ok(process) => process,
            Err(LaunchError::AuthenticationFailed(code)) => {
                return Some(ProbeOutcome::auth_failed(code))
            }
            Err(LaunchError::ConsentDenied) => {
                self.warn(&r::IDS_MSG_CONSENT_DENIED);
                return Some(ProbeOutcome::failed());
            }
            Err(err) => {
                self.warn(&r::IDS_MSG_LAUNCH_FAILED.format(&[&err.to_string()]));
                return Some(ProbeOutcome::failed());
            }
        };

        match self.wait_for_helper(process.as_mut()) {
            HelperExit::Exited(0) => Some(ProbeOutcome::passed()),
            HelperExit::Exited(_) => Some(ProbeOutcome::failed()),
            HelperExit::TimedOut => {
                self.warn(&r::IDS_MSG_HELPER_TIMED_OUT);
                Some(ProbeOutcome::failed())
            }
            HelperExit::Cancelled => None,
        }
    }

    /// Waits for the helper in short slices, so a cancel doesn't have to sit
    /// out the whole timeout. A helper still running at the end is left alone.
    fn wait_for_helper(&mut self, process: &mut dyn LaunchedProcess) -> HelperExit {
        let mut waited = Duration::ZERO;
        while waited < self.helper_timeout {
            let slice = WAIT_SLICE.min(self.helper_timeout - waited);
            let exited = process.wait_for_exit(slice);
            if self.cancel.is_cancelled() {
                return HelperExit::Cancelled;
            }
            if exited {
                // Couldn't read the code? Then we can't call it a success.
                let code = process.exit_code().unwrap_or(-1);
                tracing::trace_helper_exit(true, code);
                return HelperExit::Exited(code);
            }
            waited += slice;
        }
        tracing::trace_helper_exit(false, 0);
        HelperExit::TimedOut
    }

    fn report_fall_through(&mut self, failed: EscalationStage) {
        match failed {
            EscalationStage::Normal => self.warn(&r::IDS_MSG_NORMAL_FAILED),
            EscalationStage::Elevated => self.warn(&r::IDS_MSG_ELEVATED_FAILED),
            EscalationStage::AlternateUser => {}
        }
    }

    fn finish(&mut self, outcome: EscalationOutcome) -> EscalationOutcome {
        // Normally empty by now. If we got cancelled between the probe and the
        // relaunch, this is where the secret goes away.
        if self.validated.is_held() {
            tracing::trace_log_message("discarding unused credentials");
            self.validated.clear();
        }

        match outcome {
            EscalationOutcome::Granted(stage) => {
                self.set_stage_status(stage, StageStatus::Succeeded);
                self.observer
                    .status(&r::IDS_TITLE_GRANTED, &r::IDS_MSG_GRANTED, Severity::Success);
            }
            EscalationOutcome::Relaunched(stage) => {
                self.set_stage_status(stage, StageStatus::Succeeded);
                self.observer.status(
                    &r::IDS_TITLE_GRANTED,
                    &r::IDS_MSG_RELAUNCHED,
                    Severity::Success,
                );
            }
            EscalationOutcome::Exhausted => {
                self.observer
                    .status(&r::IDS_TITLE_EXHAUSTED, &r::IDS_MSG_EXHAUSTED, Severity::Error);
            }
            EscalationOutcome::Cancelled => {
                self.observer.status(
                    &r::IDS_TITLE_CANCELLED,
                    &r::IDS_MSG_CANCELLED,
                    Severity::Warning,
                );
            }
        }

        tracing::trace_outcome(outcome, self.current_stage);
        self.outcome = Some(outcome);
        self.observer.finished(outcome);
        outcome
    }

    fn set_stage_status(&mut self, stage: EscalationStage, status: StageStatus) {
        tracing::trace_stage(stage, status);
        self.observer.stage_status(stage, status);
    }

    fn info(&mut self, message: &str) {
        self.observer
            .status(&r::IDS_TITLE_CHECKING, message, Severity::Info);
    }

    fn warn(&mut self, message: &str) {
        tracing::trace_log_message(message);
        self.observer
            .status(&r::IDS_TITLE_STAGE_FAILED, message, Severity::Warning);
    }
}
