//! Provides APIs for accessing Win32 string-table resources.
//!
//! Every resource carries an English fallback, which is what `get()` returns
//! when the string table entry is missing (or when we're not on Windows at
//! all, which is how the unit tests run).
use std::borrow::Cow;
use std::ops::Deref;
use std::sync::OnceLock;

#[cfg(windows)]
mod loader {
    use std::ffi::c_void;
    use std::ptr::null_mut;
    use std::slice::from_raw_parts;

    #[allow(clippy::upper_case_acronyms)]
    type HINSTANCE = *const c_void;

    #[link(name = "user32")]
    extern "system" {
        fn LoadStringW(hInstance: HINSTANCE, uID: u32, lpBuffer: *mut u16, cchBufferMax: i32)
            -> i32;
    }

    extern "C" {
        static __ImageBase: [u8; 0];
    }

    fn module_base() -> *const c_void {
        unsafe { (&__ImageBase) as *const [u8; 0] as *const c_void }
    }

    pub fn load(id: u32) -> Option<String> {
        // With cchBufferMax == 0, LoadStringW hands back a read-only pointer
        // straight into the mapped image instead of copying. 0 means not found.
        let mut base: *const u16 = null_mut();
        let len = unsafe { LoadStringW(module_base(), id, &mut base as *mut _ as *mut _, 0) };
        if len <= 0 || base.is_null() {
            return None;
        }
        Some(String::from_utf16_lossy(unsafe {
            from_raw_parts(base, len as usize)
        }))
    }
}

#[cfg(not(windows))]
mod loader {
    pub fn load(_id: u32) -> Option<String> {
        None
    }
}

pub struct StaticStringResource {
    id: u32,
    value: OnceLock<Cow<'static, str>>,
    fallback: &'static str,
}

impl StaticStringResource {
    pub const fn new(id: u32, fallback: &'static str) -> Self {
        Self {
            id,
            value: OnceLock::new(),
            fallback,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn get(&self) -> &str {
        self.value.get_or_init(|| match loader::load(self.id) {
            Some(s) => Cow::Owned(s),
            None => Cow::Borrowed(self.fallback),
        })
    }

    /// Replaces `{0}`, `{1}`, ... in the loaded string with `args`, in order.
    /// Translators get to move the placeholders around, so we can't use
    /// `format!` here.
    pub fn format(&self, args: &[&str]) -> String {
        args.iter()
            .enumerate()
            .fold(self.get().to_string(), |acc, (idx, arg)| {
                acc.replace(&format!("{{{idx}}}"), arg)
            })
    }
}

impl Deref for StaticStringResource {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.get()
    }
}
