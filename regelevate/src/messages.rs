use crate::helpers::StartupMode;
use std::fmt;
use std::path::{Path, PathBuf};
use zeroize::{Zeroize, Zeroizing};

/// The privilege-acquisition stages, in the order we try them.
#[derive(PartialEq, Eq, Debug, Clone, Copy, PartialOrd, Ord)]
pub enum EscalationStage {
    Normal = 1,
    Elevated = 2,
    AlternateUser = 3,
}

impl EscalationStage {
    pub const ALL: [EscalationStage; 3] = [
        EscalationStage::Normal,
        EscalationStage::Elevated,
        EscalationStage::AlternateUser,
    ];

    pub fn index(self) -> u32 {
        self as u32
    }

    /// The stage to fall through to when this one fails. There's nothing after
    /// AlternateUser.
    pub fn next(self) -> Option<EscalationStage> {
        match self {
            EscalationStage::Normal => Some(EscalationStage::Elevated),
            EscalationStage::Elevated => Some(EscalationStage::AlternateUser),
            EscalationStage::AlternateUser => None,
        }
    }
}

impl From<EscalationStage> for u32 {
    fn from(value: EscalationStage) -> Self {
        value.index()
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum StageStatus {
    Pending = 0,
    Running = 1,
    Succeeded = 2,
    Failed = 3,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// How a run of the escalation state machine ended.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum EscalationOutcome {
    /// This process can write the resource. Carry on here.
    Granted(EscalationStage),
    /// A privileged instance was started and now owns all further work. This
    /// process should exit.
    Relaunched(EscalationStage),
    /// Every stage failed. The only thing left is to tell the user to go find
    /// an administrator.
    Exhausted,
    /// The user asked us to stop.
    Cancelled,
}

impl EscalationOutcome {
    pub fn code(self) -> u32 {
        match self {
            EscalationOutcome::Granted(_) => 0,
            EscalationOutcome::Relaunched(_) => 1,
            EscalationOutcome::Exhausted => 2,
            EscalationOutcome::Cancelled => 3,
        }
    }
}

/// Result of asking some authority context whether it can write the resource.
///
/// `auth_failure_code` is only set when we never got as far as running the
/// probe because the OS rejected the credentials. That's the one failure the
/// alternate-user stage will re-prompt for.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct ProbeOutcome {
    pub succeeded: bool,
    pub auth_failure_code: Option<u32>,
}

impl ProbeOutcome {
    pub fn passed() -> Self {
        Self {
            succeeded: true,
            auth_failure_code: None,
        }
    }

    pub fn failed() -> Self {
        Self {
            succeeded: false,
            auth_failure_code: None,
        }
    }

    pub fn auth_failed(code: u32) -> Self {
        Self {
            succeeded: false,
            auth_failure_code: Some(code),
        }
    }
}

/// A password, held as a null-terminated UTF-16 buffer (which is what the
/// logon APIs want), zeroed when dropped or when `wipe` is called.
pub struct Secret(Zeroizing<Vec<u16>>);

impl Secret {
    /// Copies `buffer` up to (not including) its first null.
    pub fn from_wide(buffer: &[u16]) -> Self {
        let len = buffer.iter().position(|&c| c == 0).unwrap_or(buffer.len());
        let mut wide = Zeroizing::new(Vec::with_capacity(len + 1));
        wide.extend_from_slice(&buffer[..len]);
        wide.push(0);
        Secret(wide)
    }

    #[cfg(test)]
    pub fn from_text(s: &str) -> Self {
        let mut wide = Zeroizing::new(Vec::with_capacity(s.len() + 1));
        wide.extend(s.encode_utf16());
        wide.push(0);
        Secret(wide)
    }

    /// The secret, including the trailing null.
    pub fn as_wide_with_nul(&self) -> &[u16] {
        &self.0
    }

    pub fn wipe(&mut self) {
        self.0.zeroize();
    }

    #[cfg(test)]
    pub fn is_wiped(&self) -> bool {
        self.0.iter().all(|&c| c == 0)
    }

    #[cfg(test)]
    pub fn reveal(&self) -> String {
        let len = self.0.iter().position(|&c| c == 0).unwrap_or(self.0.len());
        String::from_utf16_lossy(&self.0[..len])
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// Credentials captured from the user. Deliberately not `Clone`: there should
/// only ever be one copy of the secret, and whoever holds it is responsible
/// for dropping it as soon as it's been used.
#[derive(Debug)]
pub struct CredentialTriple {
    pub domain: String,
    pub user_name: String,
    secret: Secret,
}

impl CredentialTriple {
    pub fn new(domain: String, user_name: String, secret: Secret) -> Self {
        Self {
            domain,
            user_name,
            secret,
        }
    }

    pub fn secret(&self) -> &Secret {
        &self.secret
    }

    pub fn wipe(&mut self) {
        self.secret.wipe();
    }

    /// `DOMAIN\user`, for status messages. Never includes the secret.
    pub fn display_name(&self) -> String {
        format!(r"{}\{}", self.domain, self.user_name)
    }
}

/// Everything needed to start another copy of ourselves. Built once with
/// [`ProcessLaunchSpec::builder`], then only read.
#[derive(Debug)]
pub struct ProcessLaunchSpec {
    executable_path: PathBuf,
    arguments: Vec<String>,
    elevate: bool,
    credentials: Option<CredentialTriple>,
    suppress_window: bool,
}

impl ProcessLaunchSpec {
    pub fn builder(executable_path: &Path) -> ProcessLaunchSpecBuilder {
        ProcessLaunchSpecBuilder {
            spec: ProcessLaunchSpec {
                executable_path: executable_path.to_path_buf(),
                arguments: Vec::new(),
                elevate: false,
                credentials: None,
                suppress_window: false,
            },
        }
    }

    pub fn executable_path(&self) -> &Path {
        &self.executable_path
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    pub fn elevate(&self) -> bool {
        self.elevate
    }

    pub fn credentials(&self) -> Option<&CredentialTriple> {
        self.credentials.as_ref()
    }

    pub fn suppress_window(&self) -> bool {
        self.suppress_window
    }

    /// The mode tag this spec will launch with, if it has one.
    pub fn startup_mode(&self) -> StartupMode {
        StartupMode::detect(self.arguments.iter().take(1))
    }

    /// Hands the credentials back to the caller, consuming the spec. This is
    /// how validated credentials move from the probe launch to the real one
    /// without ever being copied.
    pub fn into_credentials(self) -> Option<CredentialTriple> {
        self.credentials
    }
}

pub struct ProcessLaunchSpecBuilder {
    spec: ProcessLaunchSpec,
}

impl ProcessLaunchSpecBuilder {
    pub fn arg(mut self, arg: &str) -> Self {
        self.spec.arguments.push(arg.to_string());
        self
    }

    pub fn args<T: AsRef<str>>(mut self, args: &[T]) -> Self {
        self.spec
            .arguments
            .extend(args.iter().map(|a| a.as_ref().to_string()));
        self
    }

    pub fn elevate(mut self, elevate: bool) -> Self {
        self.spec.elevate = elevate;
        self
    }

    pub fn credentials(mut self, credentials: CredentialTriple) -> Self {
        self.spec.credentials = Some(credentials);
        self
    }

    pub fn suppress_window(mut self, suppress: bool) -> Self {
        self.spec.suppress_window = suppress;
        self
    }

    pub fn build(self) -> ProcessLaunchSpec {
        self.spec
    }
}
