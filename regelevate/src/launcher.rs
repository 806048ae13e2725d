use crate::helpers::*;
use crate::messages::ProcessLaunchSpec;
use std::time::Duration;

#[cfg(windows)]
use crate::messages::CredentialTriple;
#[cfg(windows)]
use crate::tracing;
#[cfg(windows)]
use std::os::windows::io::IntoRawHandle;
#[cfg(windows)]
use std::os::windows::process::CommandExt;
#[cfg(windows)]
use windows::{
    core::*, Win32::Foundation::*, Win32::System::Threading::*, Win32::UI::Shell::*,
    Win32::UI::WindowsAndMessaging::*,
};

/// Why we couldn't start a process. The escalation only ever needs to tell
/// these three apart.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LaunchError {
    /// The user declined the UAC prompt.
    #[error("the elevation request was declined")]
    ConsentDenied,
    /// The OS rejected the credentials we tried to launch with.
    #[error("the credentials were rejected (error {0})")]
    AuthenticationFailed(u32),
    /// Anything else. 0 when there's no native error code to report.
    #[error("the process could not be started (error {0})")]
    Other(u32),
}

impl LaunchError {
    pub fn native_code(&self) -> u32 {
        match self {
            LaunchError::ConsentDenied => ERROR_CANCELLED_BY_USER,
            LaunchError::AuthenticationFailed(code) | LaunchError::Other(code) => *code,
        }
    }
}

/// Sorts a Win32 error code from a failed launch into a [`LaunchError`].
pub fn classify_launch_error(code: u32) -> LaunchError {
    if code == ERROR_CANCELLED_BY_USER {
        LaunchError::ConsentDenied
    } else if is_authentication_error(code) {
        LaunchError::AuthenticationFailed(code)
    } else {
        LaunchError::Other(code)
    }
}

/// A process we started.
pub trait LaunchedProcess {
    /// Waits up to `timeout` for the process to exit. Returns false if it's
    /// still running, in which case it's left alone.
    fn wait_for_exit(&mut self, timeout: Duration) -> bool;

    /// The exit code, or None if the process hasn't exited (or we couldn't
    /// ask).
    fn exit_code(&self) -> Option<i32>;
}

/// Starts copies of ourselves.
pub trait ProcessLauncher {
    fn launch(&self, spec: &ProcessLaunchSpec) -> std::result::Result<Box<dyn LaunchedProcess>, LaunchError>;
}

#[cfg(windows)]
struct Win32Process {
    handle: Owned<HANDLE>,
}

#[cfg(windows)]
impl LaunchedProcess for Win32Process {
    fn wait_for_exit(&mut self, timeout: Duration) -> bool {
        // INFINITE is u32::MAX, so clamp below it. Callers always bound this.
        let ms = u32::try_from(timeout.as_millis()).unwrap_or(INFINITE - 1);
        unsafe { WaitForSingleObject(*self.handle, ms) == WAIT_OBJECT_0 }
    }

    fn exit_code(&self) -> Option<i32> {
        let mut status = 0u32;
        unsafe { GetExitCodeProcess(*self.handle, &mut status) }.ok()?;
        if status == STILL_ACTIVE.0 as u32 {
            return None;
        }
        Some(status as i32)
    }
}

/// Launches processes with ShellExecuteEx ("runas") for elevation, and
/// CreateProcessWithLogonW for alternate credentials.
#[cfg(windows)]
#[derive(Default)]
pub struct Win32Launcher;

#[cfg(windows)]
impl ProcessLauncher for Win32Launcher {
    fn launch(&self, spec: &ProcessLaunchSpec) -> std::result::Result<Box<dyn LaunchedProcess>, LaunchError> {
        tracing::trace_launch(spec);
        debug_assert!(
            !(spec.elevate() && spec.credentials().is_some()),
            "can't elevate and switch users in one launch"
        );

        let result = if spec.elevate() {
            runas_admin(spec)
        } else if let Some(credentials) = spec.credentials() {
            launch_with_logon(spec, credentials)
        } else {
            spawn_plain(spec)
        };

        tracing::trace_launch_result(&result);
        result
    }
}

#[cfg(windows)]
fn launch_error_from(err: &Error) -> LaunchError {
    classify_launch_error(win32_code_from_hresult(err.code().0))
}

#[cfg(windows)]
fn runas_admin(spec: &ProcessLaunchSpec) -> std::result::Result<Box<dyn LaunchedProcess>, LaunchError> {
    let cwd = std::env::current_dir().map_err(|e| LaunchError::Other(os_error_code(&e)))?;
    let h_exe = HSTRING::from(spec.executable_path().as_os_str());
    let h_commandline = HSTRING::from(join_args(spec.arguments()).as_str());
    let h_cwd = HSTRING::from(cwd.as_os_str());
    let show = if spec.suppress_window() {
        SW_HIDE
    } else {
        SW_NORMAL
    };
    let mut sei = SHELLEXECUTEINFOW {
        cbSize: std::mem::size_of::<SHELLEXECUTEINFOW>() as u32,
        // NOCLOSEPROCESS so we get a handle to wait on, NOASYNC because we
        // return as soon as this does.
        fMask: SEE_MASK_NOCLOSEPROCESS | SEE_MASK_NOASYNC,
        lpVerb: w!("runas"),
        lpFile: PCWSTR(h_exe.as_ptr()),
        lpParameters: PCWSTR(h_commandline.as_ptr()),
        lpDirectory: PCWSTR(h_cwd.as_ptr()),
        nShow: show.0,
        ..Default::default()
    };
    unsafe { ShellExecuteExW(&mut sei) }.map_err(|e| launch_error_from(&e))?;

    // ShellExecuteEx can succeed without handing back a process, e.g. when
    // the request got routed to some other already-running handler.
    if sei.hProcess.is_invalid() {
        return Err(LaunchError::Other(0));
    }
    Ok(Box::new(Win32Process {
        handle: unsafe { Owned::new(sei.hProcess) },
    }))
}

#[cfg(windows)]
const LOGON_WITH_PROFILE: u32 = 0x0000_0001;

#[cfg(windows)]
#[link(name = "advapi32")]
extern "system" {
    fn CreateProcessWithLogonW(
        lpUsername: PCWSTR,
        lpDomain: PCWSTR,
        lpPassword: PCWSTR,
        dwLogonFlags: u32,
        lpApplicationName: PCWSTR,
        lpCommandLine: PWSTR,
        dwCreationFlags: u32,
        lpEnvironment: *const std::ffi::c_void,
        lpCurrentDirectory: PCWSTR,
        lpStartupInfo: *const STARTUPINFOW,
        lpProcessInformation: *mut PROCESS_INFORMATION,
    ) -> BOOL;
}

/// Starts the process as another user. LOGON_WITH_PROFILE loads their profile
/// first, so HKEY_CURRENT_USER in the child is _their_ hive, not ours.
#[cfg(windows)]
fn launch_with_logon(
    spec: &ProcessLaunchSpec,
    credentials: &CredentialTriple,
) -> std::result::Result<Box<dyn LaunchedProcess>, LaunchError> {
    let user = HSTRING::from(credentials.user_name.as_str());
    let domain = HSTRING::from(credentials.domain.as_str());
    let application = HSTRING::from(spec.executable_path().as_os_str());

    // The other user might not be able to see our current directory. Start
    // them next to the exe instead.
    let directory = spec
        .executable_path()
        .parent()
        .map(|p| HSTRING::from(p.as_os_str()))
        .unwrap_or_default();

    // lpCommandLine has to be writable, and argv[0] is on us.
    let mut command_line_args = vec![spec.executable_path().to_string_lossy().into_owned()];
    command_line_args.extend(spec.arguments().iter().cloned());
    let mut command_line: Vec<u16> = join_args(&command_line_args)
        .encode_utf16()
        .chain(std::iter::once(0))
        .collect();

    let mut startup_info = STARTUPINFOW {
        cb: std::mem::size_of::<STARTUPINFOW>() as u32,
        ..Default::default()
    };
    let mut creation_flags = CREATE_UNICODE_ENVIRONMENT;
    if spec.suppress_window() {
        startup_info.dwFlags = STARTF_USESHOWWINDOW;
        startup_info.wShowWindow = SW_HIDE.0 as u16;
        creation_flags |= CREATE_NO_WINDOW;
    }

    let mut process_info = PROCESS_INFORMATION::default();
    let ok = unsafe {
        CreateProcessWithLogonW(
            PCWSTR(user.as_ptr()),
            PCWSTR(domain.as_ptr()),
            PCWSTR(credentials.secret().as_wide_with_nul().as_ptr()),
            LOGON_WITH_PROFILE,
            PCWSTR(application.as_ptr()),
            PWSTR(command_line.as_mut_ptr()),
            creation_flags.0,
            std::ptr::null(),
            if directory.is_empty() {
                PCWSTR::null()
            } else {
                PCWSTR(directory.as_ptr())
            },
            &startup_info,
            &mut process_info,
        )
    };
    if !ok.as_bool() {
        return Err(launch_error_from(&Error::from_win32()));
    }

    unsafe {
        _ = CloseHandle(process_info.hThread);
        Ok(Box::new(Win32Process {
            handle: Owned::new(process_info.hProcess),
        }))
    }
}

#[cfg(windows)]
fn os_error_code(err: &std::io::Error) -> u32 {
    err.raw_os_error().map(|c| c as u32).unwrap_or(0)
}

/// Plain CreateProcess, same user, same token.
#[cfg(windows)]
fn spawn_plain(spec: &ProcessLaunchSpec) -> std::result::Result<Box<dyn LaunchedProcess>, LaunchError> {
    let mut command = std::process::Command::new(spec.executable_path());
    command.args(spec.arguments());
    if spec.suppress_window() {
        command.creation_flags(CREATE_NO_WINDOW.0);
    }
    let child = command
        .spawn()
        .map_err(|e| classify_launch_error(os_error_code(&e)))?;
    Ok(Box::new(Win32Process {
        handle: unsafe { Owned::new(HANDLE(child.into_raw_handle() as _)) },
    }))
}
