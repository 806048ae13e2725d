//! The one question everything else is built around: can _this_ process,
//! with _this_ token, write to HKEY_LOCAL_MACHINE?

#[cfg(windows)]
use crate::helpers::random_nonce;
#[cfg(windows)]
use crate::tracing;
#[cfg(windows)]
use windows::{core::*, Win32::Foundation::*};

pub const PROBE_KEY_PREFIX: &str = r"SOFTWARE\RegElevate.PermissionTest";
pub const PROBE_VALUE_NAME: &str = "PermissionTestValue";

pub trait ResourceProbe {
    /// Returns true only if we could create, write, and clean up a marker in
    /// the protected resource. Never panics, never returns an error: any
    /// failure just means "no".
    fn probe(&self) -> bool;
}

/// Each probe gets its own key, so two helpers (or a helper and a previous
/// run that crashed mid-probe) never trip over each other.
pub fn probe_key_path(pid: u32, nonce: u32) -> String {
    format!("{PROBE_KEY_PREFIX}.{pid}.{nonce:08x}")
}

#[cfg(windows)]
#[derive(Default)]
pub struct RegistryProbe;

#[cfg(windows)]
impl ResourceProbe for RegistryProbe {
    fn probe(&self) -> bool {
        let path = probe_key_path(std::process::id(), random_nonce());
        match write_and_remove_marker(&path) {
            Ok(()) => true,
            Err(err) if is_access_denied(&err) => {
                tracing::trace_log_message("probe: access denied");
                false
            }
            Err(err) => {
                tracing::trace_log_message(&format!("probe failed: {:?}", err.code().0));
                false
            }
        }
    }
}

#[cfg(windows)]
fn traced<T>(step: &str, result: Result<T>) -> Result<T> {
    tracing::trace_probe_step(step, result.is_ok());
    result
}

#[cfg(windows)]
fn write_and_remove_marker(path: &str) -> Result<()> {
    let hklm = windows_registry::LOCAL_MACHINE;
    let key = traced("create", hklm.create(path))?;

    // Something unique, so we know it's our write that landed.
    let marker = format!("{:?}", GUID::new()?);
    let written = traced("write", key.set_string(PROBE_VALUE_NAME, marker.as_str()))
        .and_then(|_| traced("delete-value", key.remove_value(PROBE_VALUE_NAME)));
    drop(key);

    // Take the key out even if the value steps failed, so we don't leave
    // anything behind.
    let removed = traced("delete-key", hklm.remove_tree(path));
    written.and(removed)
}

#[cfg(windows)]
fn is_access_denied(err: &Error) -> bool {
    err.code() == E_ACCESSDENIED || err.code() == ERROR_ACCESS_DENIED.to_hresult()
}
