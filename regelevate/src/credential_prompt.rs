use crate::messages::CredentialTriple;

#[cfg(windows)]
use crate::helpers::{parse_user_name, ERROR_LOGON_FAILURE};
#[cfg(windows)]
use crate::messages::Secret;
#[cfg(windows)]
use crate::{r, tracing};
#[cfg(windows)]
use windows::{core::*, Win32::Foundation::*};
#[cfg(windows)]
use zeroize::Zeroizing;

#[derive(Debug)]
pub enum PromptResult {
    Captured(CredentialTriple),
    Cancelled,
}

pub trait CredentialPrompt {
    /// Asks the user for credentials. `retry` is the logon error from the
    /// previous attempt, if there was one; the dialog should say the last
    /// try didn't work.
    ///
    /// The caller owns whatever comes back and must drop it (which zeroes
    /// the secret) as soon as the launch it was captured for is done.
    fn prompt(&mut self, retry: Option<u32>) -> PromptResult;
}

// Documented maximums, from wincred.h. The buffers need one more for the
// terminating null.
#[cfg(windows)]
const CREDUI_MAX_USERNAME_LENGTH: usize = 513;
#[cfg(windows)]
const CREDUI_MAX_PASSWORD_LENGTH: usize = 256;

#[cfg(windows)]
const CREDUI_FLAGS_DO_NOT_PERSIST: u32 = 0x0000_0002;
#[cfg(windows)]
const CREDUI_FLAGS_EXCLUDE_CERTIFICATES: u32 = 0x0000_0008;
#[cfg(windows)]
const CREDUI_FLAGS_ALWAYS_SHOW_UI: u32 = 0x0000_0080;
#[cfg(windows)]
const CREDUI_FLAGS_GENERIC_CREDENTIALS: u32 = 0x0004_0000;

#[cfg(windows)]
const PROMPT_FLAGS: u32 = CREDUI_FLAGS_GENERIC_CREDENTIALS
    | CREDUI_FLAGS_DO_NOT_PERSIST
    | CREDUI_FLAGS_ALWAYS_SHOW_UI
    | CREDUI_FLAGS_EXCLUDE_CERTIFICATES;

#[cfg(windows)]
#[allow(non_snake_case)]
#[repr(C)]
struct CREDUI_INFOW {
    cbSize: u32,
    hwndParent: HWND,
    pszMessageText: PCWSTR,
    pszCaptionText: PCWSTR,
    hbmBanner: *mut std::ffi::c_void,
}

#[cfg(windows)]
#[link(name = "credui")]
extern "system" {
    fn CredUIPromptForCredentialsW(
        pUiInfo: *const CREDUI_INFOW,
        pszTargetName: PCWSTR,
        Reserved: *const std::ffi::c_void,
        dwAuthError: u32,
        pszUserName: PWSTR,
        ulUserNameBufferSize: u32,
        pszPassword: PWSTR,
        ulPasswordBufferSize: u32,
        save: *mut BOOL,
        dwFlags: u32,
    ) -> u32;
}

/// The stock Windows credential dialog.
#[cfg(windows)]
pub struct Win32CredentialPrompt {
    default_domain: String,
}

#[cfg(windows)]
impl Win32CredentialPrompt {
    pub fn new(default_domain: String) -> Self {
        Self { default_domain }
    }

    fn show(&self, auth_error: u32) -> Option<(String, Secret)> {
        // Pre-fill "DOMAIN\" so the user only has to type their name.
        let mut user_name = vec![0u16; CREDUI_MAX_USERNAME_LENGTH + 1];
        let prefill: Vec<u16> = format!(r"{}\", self.default_domain).encode_utf16().collect();
        let prefill_len = prefill.len().min(CREDUI_MAX_USERNAME_LENGTH);
        user_name[..prefill_len].copy_from_slice(&prefill[..prefill_len]);

        let mut password = Zeroizing::new(vec![0u16; CREDUI_MAX_PASSWORD_LENGTH + 1]);

        let message = HSTRING::from(if auth_error != 0 {
            r::IDS_PROMPT_RETRY.get()
        } else {
            r::IDS_PROMPT_MESSAGE.get()
        });
        let caption = HSTRING::from(r::IDS_PROMPT_CAPTION.get());
        let info = CREDUI_INFOW {
            cbSize: std::mem::size_of::<CREDUI_INFOW>() as u32,
            hwndParent: HWND::default(),
            pszMessageText: PCWSTR(message.as_ptr()),
            pszCaptionText: PCWSTR(caption.as_ptr()),
            hbmBanner: std::ptr::null_mut(),
        };

        // We never want Windows to remember these, and with DO_NOT_PERSIST the
        // "remember me" box isn't even shown. Still has to point somewhere.
        let mut save = FALSE;
        let result = unsafe {
            CredUIPromptForCredentialsW(
                &info,
                w!("RegElevate"),
                std::ptr::null(),
                auth_error,
                PWSTR(user_name.as_mut_ptr()),
                user_name.len() as u32,
                PWSTR(password.as_mut_ptr()),
                password.len() as u32,
                &mut save,
                PROMPT_FLAGS,
            )
        };
        if result != NO_ERROR.0 {
            // ERROR_CANCELLED, or the dialog couldn't be shown at all. Either
            // way there's nobody to ask.
            tracing::trace_log_message(&format!("credential prompt returned {result}"));
            return None;
        }

        let len = user_name.iter().position(|&c| c == 0).unwrap_or(user_name.len());
        let typed = String::from_utf16_lossy(&user_name[..len]);
        Some((typed, Secret::from_wide(&password)))
    }
}

#[cfg(windows)]
impl CredentialPrompt for Win32CredentialPrompt {
    fn prompt(&mut self, retry: Option<u32>) -> PromptResult {
        let mut auth_error = retry.unwrap_or(0);
        loop {
            let Some((typed, secret)) = self.show(auth_error) else {
                return PromptResult::Cancelled;
            };
            match parse_user_name(&typed, &self.default_domain) {
                Some((domain, user_name)) => {
                    return PromptResult::Captured(CredentialTriple::new(domain, user_name, secret))
                }
                None => {
                    // No user name at all. There's nothing to try, so ask again
                    // without spending a launch on it. `secret` is dropped (and
                    // zeroed) here.
                    tracing::trace_log_message("empty user name");
                    auth_error = ERROR_LOGON_FAILURE;
                }
            }
        }
    }
}
