//! This file includes all our resource IDs, and the code to load them. The
//! handy string_resources macro does the magic to create a StaticStringResource
//! for each of the resource IDs, and then we can use them in code.
//!
//! build.rs reads this file to generate the STRINGTABLE, so the IDs and the
//! English text only live here. Keep each entry on one line.
//!
//! Example usage:
//! let title = r::IDS_TITLE_GRANTED.get();
//! println!("Hello: {}", title);

#![allow(dead_code)]
use win32resources::StaticStringResource;
macro_rules! string_resources {
    (
        $(
            $name:ident = $id:expr , $fallback:expr ;
        )*
    ) => {
        $(
            pub static $name: StaticStringResource = StaticStringResource::new($id, $fallback);
        )*
    }
}

string_resources! {
    IDS_ABOUT = 1000, "Checks that you can write to the machine registry, asking for more rights if you can't, then updates an environment variable.";
    IDS_UNSUPPORTED_PLATFORM = 1001, "regelevate only runs on Windows.";

    IDS_STAGE_NORMAL = 1100, "Current user";
    IDS_STAGE_ELEVATED = 1101, "Administrator";
    IDS_STAGE_ALTERNATE_USER = 1102, "Different user";
    IDS_STATUS_PENDING = 1110, "pending";
    IDS_STATUS_RUNNING = 1111, "checking";
    IDS_STATUS_SUCCEEDED = 1112, "ok";
    IDS_STATUS_FAILED = 1113, "failed";

    IDS_TITLE_CHECKING = 1200, "Checking permissions";
    IDS_MSG_CHECKING_NORMAL = 1201, "Testing whether the current user can make changes to the registry.";
    IDS_MSG_CHECKING_ELEVATED = 1202, "Testing whether the administrator account can make changes to the registry.";
    IDS_MSG_CHECKING_ALTERNATE_USER = 1203, "Testing whether the credentials you provide can make changes to the registry.";
    IDS_MSG_TESTING_ACCOUNT = 1204, "Testing {0}...";
    IDS_TITLE_GRANTED = 1210, "Permission granted";
    IDS_MSG_GRANTED = 1211, "You can make changes to the registry.";
    IDS_MSG_RELAUNCHED = 1212, "Continuing in a new process with the rights it needs.";
    IDS_TITLE_STAGE_FAILED = 1220, "Insufficient permissions";
    IDS_MSG_NORMAL_FAILED = 1221, "The current user can't make changes to the registry. Asking for administrator rights...";
    IDS_MSG_ELEVATED_FAILED = 1222, "Administrator rights weren't enough, or weren't granted. Asking for a different user...";
    IDS_MSG_ALREADY_ELEVATED = 1223, "Already running as administrator, so there's no point asking for it again.";
    IDS_MSG_CONSENT_DENIED = 1224, "The administrator request was declined.";
    IDS_MSG_HELPER_TIMED_OUT = 1225, "Gave up waiting for the permission check to finish.";
    IDS_MSG_CREDENTIALS_REJECTED = 1226, "Those credentials didn't work. Try again.";
    IDS_MSG_ACCOUNT_LACKS_RIGHTS = 1227, "{0} can't make changes to the registry either.";
    IDS_MSG_PROMPT_CANCELLED = 1228, "No credentials were entered.";
    IDS_MSG_LAUNCH_FAILED = 1229, "Couldn't start the permission check: {0}";
    IDS_MSG_RELAUNCH_FAILED = 1230, "Couldn't restart with the new rights: {0}";
    IDS_MSG_NO_EXECUTABLE = 1231, "Couldn't find regelevate.exe itself, so there's nothing to restart with more rights.";
    IDS_TITLE_EXHAUSTED = 1240, "Permission denied";
    IDS_MSG_EXHAUSTED = 1241, "None of the accounts tried can make changes to the registry. Please contact your system administrator.";
    IDS_TITLE_CANCELLED = 1250, "Cancelled";
    IDS_MSG_CANCELLED = 1251, "Stopped before anything was changed.";
    IDS_PRESS_ENTER = 1260, "Press Enter to close this window.";

    IDS_PROMPT_CAPTION = 1300, "RegElevate - User Credentials";
    IDS_PROMPT_MESSAGE = 1301, "Enter credentials for an account that can make changes to the registry.";
    IDS_PROMPT_RETRY = 1302, "The user name or password is incorrect, or the account can't sign in right now. Try again.";

    IDS_SCOPE_USER = 1400, "user";
    IDS_SCOPE_SYSTEM = 1401, "system";
    IDS_PAYLOAD_CREATED = 1410, "{0} was created as \"{1}\" ({2}).";
    IDS_PAYLOAD_REMOVED = 1411, "{0} was removed ({1}).";
    IDS_PAYLOAD_NOT_PRESENT = 1412, "{0} isn't set ({1}).";
    IDS_PAYLOAD_SHOW = 1413, "{0} = {1} ({2})";
    IDS_PAYLOAD_OVERWRITTEN = 1414, "{0} was overwritten with \"{1}\" ({2}).";

    IDS_CHECK_ABOUT = 1500, "Only check for write access to the registry, asking for more rights if needed.";
    IDS_SET_ABOUT = 1501, "Set an environment variable.";
    IDS_REMOVE_ABOUT = 1502, "Remove an environment variable.";
    IDS_SHOW_ABOUT = 1503, "Show the current value of an environment variable.";
    IDS_NAME_HELP = 1504, "The variable to work on. Defaults to the configured VariableName, or KeeperConfig.";
    IDS_VALUE_HELP = 1505, "The value to store. Defaults to the configured VariableValue.";
    IDS_SCOPE_HELP = 1506, "Whose environment to change: the current user's, the whole machine's, or both.";
}
