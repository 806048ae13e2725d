use crate::tracing::trace_log_message;
use std::ffi::OsStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[cfg(windows)]
use windows::{
    core::*, Win32::Foundation::*, Win32::Security::*, Win32::System::Console::*,
    Win32::System::Threading::*,
};

pub const PROBE_ONLY_TAG: &str = "--check-permission-only";
pub const ELEVATED_TAG: &str = "--elevated";
pub const DIFFERENT_USER_TAG: &str = "--different-user";

// From winerror.h. These are the logon failures where it makes sense to ask
// for the credentials again, rather than giving up.
pub const ERROR_LOGON_FAILURE: u32 = 1326;
pub const ERROR_ACCOUNT_RESTRICTION: u32 = 1327;
pub const ERROR_INVALID_LOGON_HOURS: u32 = 1328;
pub const ERROR_INVALID_WORKSTATION: u32 = 1329;
pub const ERROR_PASSWORD_EXPIRED: u32 = 1330;
pub const ERROR_ACCOUNT_DISABLED: u32 = 1331;
pub const ERROR_ACCOUNT_EXPIRED: u32 = 1793;
pub const ERROR_PASSWORD_MUST_CHANGE: u32 = 1907;
// What ShellExecuteEx reports when the user says "No" on the UAC prompt.
pub const ERROR_CANCELLED_BY_USER: u32 = 1223;

pub const DEFAULT_VARIABLE_NAME: &str = "KeeperConfig";

/// How this process was started. Decided exactly once, at process entry.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum StartupMode {
    /// We're a helper: run the probe, exit 0 or 1, show nothing.
    ProbeOnly = 0,
    /// We're the real instance, relaunched through UAC.
    Elevated = 1,
    /// We're the real instance, relaunched under someone else's credentials.
    DifferentUser = 2,
    /// Nobody has checked anything yet. Run the whole escalation.
    Escalate = 3,
}

impl StartupMode {
    /// Looks for our mode tags in `args` (which should NOT include argv[0]).
    ///
    /// The probe-only tag wins over everything else, because helpers must
    /// never do anything but probe. Between `--elevated` and
    /// `--different-user`, whichever comes first wins; both mean "someone
    /// already checked, just run".
    ///
    /// This never fails. Probe-only helpers must exit with 0 or 1, so we
    /// can't let an argument parser bail out with its own exit code first.
    pub fn detect<I, S>(args: I) -> StartupMode
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut privileged = None;
        for arg in args {
            let arg = arg.as_ref();
            // Past "--" it's a variable name or value, whatever it looks like.
            if arg == "--" {
                break;
            }
            if arg == PROBE_ONLY_TAG {
                return StartupMode::ProbeOnly;
            }
            if privileged.is_none() {
                if arg == ELEVATED_TAG {
                    privileged = Some(StartupMode::Elevated);
                } else if arg == DIFFERENT_USER_TAG {
                    privileged = Some(StartupMode::DifferentUser);
                }
            }
        }
        privileged.unwrap_or(StartupMode::Escalate)
    }

    /// True if a parent process already established that we have the rights
    /// we need.
    pub fn is_privileged(self) -> bool {
        matches!(self, StartupMode::Elevated | StartupMode::DifferentUser)
    }
}

impl From<StartupMode> for u32 {
    fn from(value: StartupMode) -> Self {
        value as u32
    }
}

pub fn is_authentication_error(code: u32) -> bool {
    matches!(
        code,
        ERROR_LOGON_FAILURE
            | ERROR_ACCOUNT_RESTRICTION
            | ERROR_INVALID_LOGON_HOURS
            | ERROR_INVALID_WORKSTATION
            | ERROR_PASSWORD_EXPIRED
            | ERROR_ACCOUNT_DISABLED
            | ERROR_ACCOUNT_EXPIRED
            | ERROR_PASSWORD_MUST_CHANGE
    )
}

/// Unwraps an HRESULT_FROM_WIN32 back into the plain Win32 error code. Any
/// other HRESULT is returned as-is.
pub fn win32_code_from_hresult(hr: i32) -> u32 {
    let hr = hr as u32;
    if hr & 0xFFFF_0000 == 0x8007_0000 {
        hr & 0xFFFF
    } else {
        hr
    }
}

/// Splits what the user typed in the credential dialog into (domain, user).
/// Accepts `DOMAIN\user`, `user@domain`, or just `user` (which gets
/// `default_domain`). Returns None if there's no actual user name in there,
/// like when they just left our pre-filled `DOMAIN\` alone.
pub fn parse_user_name(input: &str, default_domain: &str) -> Option<(String, String)> {
    let input = input.trim();
    let (domain, user) = if let Some((domain, user)) = input.split_once('\\') {
        (domain, user)
    } else if let Some((user, domain)) = input.split_once('@') {
        (domain, user)
    } else {
        (default_domain, input)
    };

    if user.is_empty() {
        return None;
    }
    let domain = if domain.is_empty() {
        default_domain
    } else {
        domain
    };
    Some((domain.to_string(), user.to_string()))
}

/// The domain we pre-fill in the credential dialog. Falls back to the machine
/// name, then to "." (the local machine, as far as logon APIs care).
pub fn current_domain() -> String {
    std::env::var("USERDOMAIN")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .ok()
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| ".".to_string())
}

/// How many processes are attached to our console, us included.
#[cfg(windows)]
pub fn console_process_count() -> u32 {
    let mut ids = [0u32; 4];
    unsafe { GetConsoleProcessList(&mut ids) }
}

/// A privileged instance gets a console of its own (runas and
/// CreateProcessWithLogonW both open one), and that console closes the moment
/// we exit. If nobody else is attached, wait before exiting so the report
/// can actually be read.
pub fn should_pause_before_exit(mode: StartupMode, console_processes: u32) -> bool {
    mode.is_privileged() && console_processes == 1
}

/// Windows does not actually support distinct command line parameters. They're all just given as a single string.
/// We can't just use `.join(" ")` either, because this breaks arguments with whitespaces. This function handles these details.
pub fn join_args<T: AsRef<str>>(args: &[T]) -> String {
    let mut accumulator = String::with_capacity(
        args.iter()
            .map(|s| s.as_ref().len().saturating_add(3))
            .fold(0usize, usize::saturating_add),
    );

    // Same rules as CommandLineToArgvW: backslashes are only special when
    // they're followed by a quote, or when they end an argument we had to
    // wrap in quotes.
    for (idx, arg) in args.iter().enumerate() {
        if idx != 0 {
            accumulator.push(' ');
        }

        let str = arg.as_ref();
        let quote = str.is_empty() || str.contains(' ') || str.contains('\t');
        if quote {
            accumulator.push('"');
        }

        let mut backslashes: usize = 0;
        for x in str.chars() {
            if x == '\\' {
                backslashes += 1;
            } else {
                if x == '"' {
                    accumulator.extend((0..=backslashes).map(|_| '\\'));
                }
                backslashes = 0;
            }
            accumulator.push(x);
        }

        if quote {
            accumulator.extend((0..backslashes).map(|_| '\\'));
            accumulator.push('"');
        }
    }

    accumulator
}

/// A flag the escalation checks after every blocking call. Once it's set,
/// nothing else gets probed or launched.
#[derive(Clone, Default, Debug)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(windows)]
static CTRL_C_TOKEN: std::sync::OnceLock<CancellationToken> = std::sync::OnceLock::new();

#[cfg(windows)]
unsafe extern "system" fn cancel_on_ctrl_c(ctrl_type: u32) -> BOOL {
    match ctrl_type {
        CTRL_C_EVENT | CTRL_BREAK_EVENT | CTRL_CLOSE_EVENT => {
            if let Some(token) = CTRL_C_TOKEN.get() {
                token.cancel();
            }
            TRUE
        }
        _ => FALSE,
    }
}

/// Routes Ctrl+C (and closing the console) into `token`, instead of killing us
/// halfway through a probe. Only the first token registered is used.
#[cfg(windows)]
pub fn install_cancel_handler(token: &CancellationToken) {
    if CTRL_C_TOKEN.set(token.clone()).is_err() {
        trace_log_message("cancel handler already installed");
        return;
    }
    unsafe {
        _ = SetConsoleCtrlHandler(Some(cancel_on_ctrl_c), true);
    }
}

#[cfg(windows)]
fn current_process_token() -> Result<Owned<HANDLE>> {
    let mut token = Owned::default();
    unsafe {
        OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut *token)?;
    }
    Ok(token)
}

// helper trait to get the TOKEN_INFORMATION_CLASS for a given type
#[cfg(windows)]
trait TokenInfo {
    fn info_class() -> TOKEN_INFORMATION_CLASS;
}
#[cfg(windows)]
impl TokenInfo for TOKEN_ELEVATION {
    fn info_class() -> TOKEN_INFORMATION_CLASS {
        TokenElevation
    }
}

#[cfg(windows)]
fn get_token_info<T: TokenInfo>(token: HANDLE) -> Result<T> {
    unsafe {
        let mut info: T = std::mem::zeroed();
        let size = std::mem::size_of::<T>() as u32;
        let mut ret_size = size;
        GetTokenInformation(
            token,
            T::info_class(),
            Some(&mut info as *mut _ as _),
            size,
            &mut ret_size,
        )?;
        Ok(info)
    }
}

#[cfg(windows)]
pub fn is_running_elevated() -> Result<bool> {
    let current_token = current_process_token()?;
    let elevation: TOKEN_ELEVATION = get_token_info(*current_token)?;
    Ok(elevation.TokenIsElevated != 0)
}

/// Generates a random nonce, using `RtlGenRandom`. This is how the core
/// language does it: https://github.com/rust-lang/rust/pull/45370
#[cfg(windows)]
pub fn random_nonce() -> u32 {
    #[link(name = "advapi32")]
    extern "system" {
        // This function's real name is `RtlGenRandom`.
        fn SystemFunction036(RandomBuffer: *mut u8, RandomBufferLength: u32) -> BOOLEAN;
    }

    let mut nonce = 0u32;
    unsafe {
        SystemFunction036(
            (&mut nonce as *mut u32) as *mut u8,
            std::mem::size_of::<u32>() as _,
        );
    }
    nonce
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("setting not found")]
    NotFound,
    #[error("failed to read setting: {0}")]
    Unreadable(String),
}

pub trait ConfigProvider {
    fn get_variable_name(&self) -> std::result::Result<String, ConfigError>;
    fn get_variable_value(&self) -> std::result::Result<String, ConfigError>;
}

#[cfg(windows)]
#[derive(Default)]
pub struct RegistryConfigProvider;

#[cfg(windows)]
impl RegistryConfigProvider {
    const SETTINGS_KEY: &'static str = "Software\\RegElevate";

    fn read_string(&self, name: &str) -> std::result::Result<String, ConfigError> {
        windows_registry::CURRENT_USER
            .open(Self::SETTINGS_KEY)
            .and_then(|key| key.get_string(name))
            .map_err(|e| {
                if e.code() == ERROR_FILE_NOT_FOUND.to_hresult() {
                    ConfigError::NotFound
                } else {
                    ConfigError::Unreadable(e.to_string())
                }
            })
    }
}

#[cfg(windows)]
impl ConfigProvider for RegistryConfigProvider {
    fn get_variable_name(&self) -> std::result::Result<String, ConfigError> {
        self.read_string("VariableName")
    }
    fn get_variable_value(&self) -> std::result::Result<String, ConfigError> {
        self.read_string("VariableValue")
    }
}

/// What `set`/`remove`/`show` operate on when the command line doesn't say.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayloadDefaults {
    pub name: String,
    pub value: String,
}

/// Reads the payload defaults from config.
/// * If a setting isn't there (or is empty, for the name), we use the
///   built-in default.
/// * If we fail to read it for any other reason, we log that and also use
///   the built-in default. A broken config shouldn't stop anyone from
///   passing the name on the command line.
pub fn get_payload_defaults(config: &impl ConfigProvider) -> PayloadDefaults {
    let name = match config.get_variable_name() {
        Ok(v) if !v.trim().is_empty() => v,
        Ok(_) | Err(ConfigError::NotFound) => DEFAULT_VARIABLE_NAME.to_string(),
        Err(e) => {
            trace_log_message(&format!("VariableName: {e}"));
            DEFAULT_VARIABLE_NAME.to_string()
        }
    };
    let value = match config.get_variable_value() {
        Ok(v) => v,
        Err(ConfigError::NotFound) => String::new(),
        Err(e) => {
            trace_log_message(&format!("VariableValue: {e}"));
            String::new()
        }
    };
    PayloadDefaults { name, value }
}
