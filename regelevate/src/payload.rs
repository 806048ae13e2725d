//! What we actually do once we're allowed to: plain create/update/delete of a
//! named environment variable: the user's, the machine's, or both. Nothing
//! here retries; by the time we get here the escalation already proved we
//! have the rights.

use crate::r;
use std::str::FromStr;

#[cfg(windows)]
use windows::{core::*, Win32::Foundation::*, Win32::UI::WindowsAndMessaging::*};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadScope {
    User,
    System,
}

impl PayloadScope {
    /// Where the variables for this scope live, relative to HKEY_CURRENT_USER
    /// or HKEY_LOCAL_MACHINE respectively.
    pub fn subkey(self) -> &'static str {
        match self {
            PayloadScope::User => "Environment",
            PayloadScope::System => {
                r"SYSTEM\CurrentControlSet\Control\Session Manager\Environment"
            }
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PayloadScope::User => r::IDS_SCOPE_USER.get(),
            PayloadScope::System => r::IDS_SCOPE_SYSTEM.get(),
        }
    }
}

/// What `--scope` selects: one environment, or both of them in one go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadTarget {
    User,
    System,
    Both,
}

impl PayloadTarget {
    /// The environments this target touches, user first.
    pub fn scopes(self) -> &'static [PayloadScope] {
        match self {
            PayloadTarget::User => &[PayloadScope::User],
            PayloadTarget::System => &[PayloadScope::System],
            PayloadTarget::Both => &[PayloadScope::User, PayloadScope::System],
        }
    }

    /// The `--scope` value that selects this target.
    pub fn as_arg(self) -> &'static str {
        match self {
            PayloadTarget::User => "user",
            PayloadTarget::System => "system",
            PayloadTarget::Both => "both",
        }
    }
}

impl FromStr for PayloadTarget {
    type Err = PayloadError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(PayloadTarget::User),
            "system" | "machine" => Ok(PayloadTarget::System),
            "both" => Ok(PayloadTarget::Both),
            _ => Err(PayloadError::UnknownScope(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadOperation {
    /// Just the escalation, no changes.
    Check,
    Set {
        name: String,
        value: String,
        scope: PayloadTarget,
    },
    Remove {
        name: String,
        scope: PayloadTarget,
    },
    Show {
        name: String,
        scope: PayloadTarget,
    },
}

impl PayloadOperation {
    /// A command line that asks for exactly this operation, with nothing left
    /// to defaults. This is what a privileged instance we start gets, since
    /// it may not see the same config we did.
    pub fn to_args(&self) -> Vec<String> {
        let (command, name, value, scope) = match self {
            PayloadOperation::Check => return vec!["check".to_string()],
            PayloadOperation::Set { name, value, scope } => ("set", name, Some(value), scope),
            PayloadOperation::Remove { name, scope } => ("remove", name, None, scope),
            PayloadOperation::Show { name, scope } => ("show", name, None, scope),
        };
        // Everything after "--" is positional, so a name or value that starts
        // with a dash can't be mistaken for an option.
        let mut args = vec![
            command.to_string(),
            "--scope".to_string(),
            scope.as_arg().to_string(),
            "--".to_string(),
            name.clone(),
        ];
        args.extend(value.cloned());
        args
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("unknown scope '{0}', expected 'user', 'system' or 'both'")]
    UnknownScope(String),
    #[error("the variable name can't be empty")]
    EmptyName,
    #[error("no value given for {0}, and no default value is configured")]
    MissingValue(String),
    #[error("couldn't update {name}: {message}")]
    Store { name: String, message: String },
}

pub trait EnvironmentStore {
    /// Creates or overwrites the variable. Returns true if it was already
    /// there.
    fn set(&self, scope: PayloadScope, name: &str, value: &str) -> std::result::Result<bool, PayloadError>;
    /// Returns false if there was nothing to remove.
    fn remove(&self, scope: PayloadScope, name: &str) -> std::result::Result<bool, PayloadError>;
    fn get(&self, scope: PayloadScope, name: &str) -> std::result::Result<Option<String>, PayloadError>;
}

/// Runs `line` for each scope in `target`, stopping at the first error, and
/// joins the results one per line.
fn for_each_scope(
    target: PayloadTarget,
    line: impl FnMut(&PayloadScope) -> std::result::Result<String, PayloadError>,
) -> std::result::Result<String, PayloadError> {
    let lines = target
        .scopes()
        .iter()
        .map(line)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(lines.join("\n"))
}

/// Performs `operation` and returns what to tell the user about it.
pub fn run_payload(
    store: &impl EnvironmentStore,
    operation: &PayloadOperation,
) -> std::result::Result<String, PayloadError> {
    match operation {
        PayloadOperation::Check => Ok(r::IDS_MSG_GRANTED.to_string()),
        PayloadOperation::Set { name, value, scope } => for_each_scope(*scope, |&scope| {
            let message = if store.set(scope, name, value)? {
                &r::IDS_PAYLOAD_OVERWRITTEN
            } else {
                &r::IDS_PAYLOAD_CREATED
            };
            Ok(message.format(&[name.as_str(), value.as_str(), scope.label()]))
        }),
        PayloadOperation::Remove { name, scope } => for_each_scope(*scope, |&scope| {
            if store.remove(scope, name)? {
                Ok(r::IDS_PAYLOAD_REMOVED.format(&[name.as_str(), scope.label()]))
            } else {
                Ok(r::IDS_PAYLOAD_NOT_PRESENT.format(&[name.as_str(), scope.label()]))
            }
        }),
        PayloadOperation::Show { name, scope } => for_each_scope(*scope, |&scope| {
            match store.get(scope, name)? {
                Some(value) => Ok(r::IDS_PAYLOAD_SHOW.format(&[name.as_str(), value.as_str(), scope.label()])),
                None => Ok(r::IDS_PAYLOAD_NOT_PRESENT.format(&[name.as_str(), scope.label()])),
            }
        }),
    }
}

/// The real environment, in the registry.
#[cfg(windows)]
#[derive(Default)]
pub struct RegistryEnvironmentStore;

#[cfg(windows)]
impl RegistryEnvironmentStore {
    fn root(scope: PayloadScope) -> &'static windows_registry::Key {
        match scope {
            PayloadScope::User => windows_registry::CURRENT_USER,
            PayloadScope::System => windows_registry::LOCAL_MACHINE,
        }
    }

    /// Lets Explorer (and everything it starts from now on) know the
    /// environment changed. Best effort: if some window doesn't answer in
    /// time, the value is still written.
    fn broadcast_change() {
        unsafe {
            _ = SendMessageTimeoutW(
                HWND_BROADCAST,
                WM_SETTINGCHANGE,
                WPARAM(0),
                LPARAM(w!("Environment").as_ptr() as isize),
                SMTO_ABORTIFHUNG,
                5000,
                None,
            );
        }
    }
}

#[cfg(windows)]
fn store_error(name: &str, err: &Error) -> PayloadError {
    PayloadError::Store {
        name: name.to_string(),
        message: err.to_string(),
    }
}

#[cfg(windows)]
fn is_not_found(err: &Error) -> bool {
    err.code() == ERROR_FILE_NOT_FOUND.to_hresult()
}

#[cfg(windows)]
impl EnvironmentStore for RegistryEnvironmentStore {
    fn set(&self, scope: PayloadScope, name: &str, value: &str) -> std::result::Result<bool, PayloadError> {
        let key = Self::root(scope)
            .create(scope.subkey())
            .map_err(|e| store_error(name, &e))?;
        // Anything already under that name counts, string or not.
        let existed = match key.get_string(name) {
            Ok(_) => true,
            Err(e) => !is_not_found(&e),
        };
        key.set_string(name, value)
            .map_err(|e| store_error(name, &e))?;
        Self::broadcast_change();
        Ok(existed)
    }

    fn remove(&self, scope: PayloadScope, name: &str) -> std::result::Result<bool, PayloadError> {
        // `open` is read-only, and we need to delete.
        let key = Self::root(scope)
            .create(scope.subkey())
            .map_err(|e| store_error(name, &e))?;
        match key.remove_value(name) {
            Ok(()) => {
                Self::broadcast_change();
                Ok(true)
            }
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(store_error(name, &e)),
        }
    }

    fn get(&self, scope: PayloadScope, name: &str) -> std::result::Result<Option<String>, PayloadError> {
        match Self::root(scope)
            .open(scope.subkey())
            .and_then(|key| key.get_string(name))
        {
            Ok(value) => Ok(Some(value)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(store_error(name, &e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MemoryStore {
        values: RefCell<HashMap<(PayloadScope, String), String>>,
        read_only: Option<PayloadScope>,
    }

    impl EnvironmentStore for MemoryStore {
        fn set(&self, scope: PayloadScope, name: &str, value: &str) -> std::result::Result<bool, PayloadError> {
            if self.read_only == Some(scope) {
                return Err(PayloadError::Store {
                    name: name.to_string(),
                    message: "Access is denied.".to_string(),
                });
            }
            Ok(self
                .values
                .borrow_mut()
                .insert((scope, name.to_string()), value.to_string())
                .is_some())
        }

        fn remove(&self, scope: PayloadScope, name: &str) -> std::result::Result<bool, PayloadError> {
            Ok(self
                .values
                .borrow_mut()
                .remove(&(scope, name.to_string()))
                .is_some())
        }

        fn get(&self, scope: PayloadScope, name: &str) -> std::result::Result<Option<String>, PayloadError> {
            Ok(self.values.borrow().get(&(scope, name.to_string())).cloned())
        }
    }

    fn set(name: &str, value: &str, scope: PayloadTarget) -> PayloadOperation {
        PayloadOperation::Set {
            name: name.to_string(),
            value: value.to_string(),
            scope,
        }
    }

    fn show(name: &str, scope: PayloadTarget) -> PayloadOperation {
        PayloadOperation::Show {
            name: name.to_string(),
            scope,
        }
    }

    #[test]
    fn test_parse_scope() {
        assert_eq!("user".parse::<PayloadTarget>(), Ok(PayloadTarget::User));
        assert_eq!("SYSTEM".parse::<PayloadTarget>(), Ok(PayloadTarget::System));
        assert_eq!("machine".parse::<PayloadTarget>(), Ok(PayloadTarget::System));
        assert_eq!("Both".parse::<PayloadTarget>(), Ok(PayloadTarget::Both));
        assert_eq!(
            "site".parse::<PayloadTarget>(),
            Err(PayloadError::UnknownScope("site".to_string()))
        );
    }

    #[test]
    fn test_scope_keys() {
        assert_eq!(PayloadScope::User.subkey(), "Environment");
        assert!(PayloadScope::System
            .subkey()
            .ends_with(r"Session Manager\Environment"));
        assert_eq!(
            PayloadTarget::Both.scopes(),
            [PayloadScope::User, PayloadScope::System]
        );
        for target in [PayloadTarget::User, PayloadTarget::System, PayloadTarget::Both] {
            assert_eq!(target.as_arg().parse::<PayloadTarget>(), Ok(target));
        }
    }

    #[test]
    fn test_set_then_show() {
        let store = MemoryStore::default();
        let report = run_payload(&store, &set("KeeperConfig", "abc", PayloadTarget::User)).unwrap();
        assert_eq!(report, "KeeperConfig was created as \"abc\" (user).");

        assert_eq!(
            run_payload(&store, &show("KeeperConfig", PayloadTarget::User)).unwrap(),
            "KeeperConfig = abc (user)"
        );

        // Scopes are separate.
        assert_eq!(
            run_payload(&store, &show("KeeperConfig", PayloadTarget::System)).unwrap(),
            "KeeperConfig isn't set (system)."
        );
    }

    #[test]
    fn test_set_overwrites() {
        let store = MemoryStore::default();
        run_payload(&store, &set("Name", "one", PayloadTarget::System)).unwrap();
        let report = run_payload(&store, &set("Name", "two", PayloadTarget::System)).unwrap();
        assert_eq!(report, "Name was overwritten with \"two\" (system).");
        assert_eq!(
            store.get(PayloadScope::System, "Name").unwrap().as_deref(),
            Some("two")
        );
        assert_eq!(store.values.borrow().len(), 1);
    }

    #[test]
    fn test_set_both_reports_each_scope() {
        let store = MemoryStore::default();
        store.set(PayloadScope::System, "KeeperConfig", "old").unwrap();

        let report = run_payload(&store, &set("KeeperConfig", "new", PayloadTarget::Both)).unwrap();
        assert_eq!(
            report,
            "KeeperConfig was created as \"new\" (user).\n\
             KeeperConfig was overwritten with \"new\" (system)."
        );
        for scope in [PayloadScope::User, PayloadScope::System] {
            assert_eq!(
                store.get(scope, "KeeperConfig").unwrap().as_deref(),
                Some("new")
            );
        }

        assert_eq!(
            run_payload(&store, &show("KeeperConfig", PayloadTarget::Both)).unwrap(),
            "KeeperConfig = new (user)\nKeeperConfig = new (system)"
        );
    }

    #[test]
    fn test_set_both_stops_at_first_failure() {
        let store = MemoryStore {
            read_only: Some(PayloadScope::System),
            ..Default::default()
        };
        let err = run_payload(&store, &set("Name", "v", PayloadTarget::Both)).unwrap_err();
        assert_eq!(err.to_string(), "couldn't update Name: Access is denied.");
        // The user scope was already written by then.
        assert_eq!(
            store.get(PayloadScope::User, "Name").unwrap().as_deref(),
            Some("v")
        );
    }

    #[test]
    fn test_remove_is_idempotent() {
        let store = MemoryStore::default();
        run_payload(&store, &set("Name", "v", PayloadTarget::User)).unwrap();
        let remove = PayloadOperation::Remove {
            name: "Name".to_string(),
            scope: PayloadTarget::Both,
        };
        assert_eq!(
            run_payload(&store, &remove).unwrap(),
            "Name was removed (user).\nName isn't set (system)."
        );
        assert_eq!(
            run_payload(&store, &remove).unwrap(),
            "Name isn't set (user).\nName isn't set (system)."
        );
    }

    #[test]
    fn test_check_changes_nothing() {
        let store = MemoryStore::default();
        assert_eq!(
            run_payload(&store, &PayloadOperation::Check).unwrap(),
            "You can make changes to the registry."
        );
        assert!(store.values.borrow().is_empty());
    }

    #[test]
    fn test_store_errors_propagate() {
        let store = MemoryStore {
            read_only: Some(PayloadScope::System),
            ..Default::default()
        };
        let err = run_payload(&store, &set("Name", "v", PayloadTarget::System)).unwrap_err();
        assert_eq!(err.to_string(), "couldn't update Name: Access is denied.");
    }

    #[test]
    fn test_operation_args_leave_nothing_to_defaults() {
        assert_eq!(PayloadOperation::Check.to_args(), ["check"]);
        assert_eq!(
            set("-odd", "a value", PayloadTarget::Both).to_args(),
            ["set", "--scope", "both", "--", "-odd", "a value"]
        );
        assert_eq!(
            show("Path", PayloadTarget::System).to_args(),
            ["show", "--scope", "system", "--", "Path"]
        );
    }
}
