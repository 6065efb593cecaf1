//! Engine descriptors.
//!
//! An engine describes itself during `engine_load` by filling in a
//! [`RawEngineDescriptor`]. The host copies the strings into an owned
//! [`EngineDescriptor`] as soon as the call returns, so the plugin only has
//! to keep them alive for the duration of that call.

use crate::error::{AbiError, AbiResult};
use std::ffi::{c_char, c_uint, CStr, CString};

/// Immutable metadata an engine supplies during load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineDescriptor {
    pub id: u32,
    pub name: String,
    pub version: String,
    pub script_language: String,
    pub script_suffix: String,
}

impl EngineDescriptor {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        script_language: impl Into<String>,
        script_suffix: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            name: name.into(),
            version: version.into(),
            script_language: script_language.into(),
            script_suffix: script_suffix.into(),
        }
    }
}

/// C layout of the descriptor handed to `engine_load`.
#[derive(Debug)]
#[repr(C)]
pub struct RawEngineDescriptor {
    pub id: c_uint,
    pub name: *const c_char,
    pub version: *const c_char,
    pub script_language: *const c_char,
    pub script_suffix: *const c_char,
}

impl Default for RawEngineDescriptor {
    fn default() -> Self {
        Self {
            id: 0,
            name: std::ptr::null(),
            version: std::ptr::null(),
            script_language: std::ptr::null(),
            script_suffix: std::ptr::null(),
        }
    }
}

impl RawEngineDescriptor {
    /// Copy the descriptor into owned strings.
    ///
    /// # Safety
    ///
    /// Every non-null pointer must reference a valid NUL-terminated string.
    pub unsafe fn to_descriptor(&self) -> AbiResult<EngineDescriptor> {
        Ok(EngineDescriptor {
            id: self.id,
            name: copy_field("name", self.name)?,
            version: copy_field("version", self.version)?,
            script_language: copy_field("script_language", self.script_language)?,
            script_suffix: copy_field("script_suffix", self.script_suffix)?,
        })
    }
}

unsafe fn copy_field(field: &str, ptr: *const c_char) -> AbiResult<String> {
    if ptr.is_null() {
        return Err(AbiError::InvalidString(format!(
            "descriptor field '{}' was not set",
            field
        )));
    }

    CStr::from_ptr(ptr)
        .to_str()
        .map(str::to_owned)
        .map_err(|e| AbiError::InvalidString(format!("descriptor field '{}': {}", field, e)))
}

/// C strings backing a [`RawEngineDescriptor`] on the engine side.
#[derive(Debug)]
pub struct DescriptorStrings {
    name: CString,
    version: CString,
    script_language: CString,
    script_suffix: CString,
}

impl DescriptorStrings {
    pub fn new(descriptor: &EngineDescriptor) -> AbiResult<Self> {
        let c = |field: &str, value: &str| {
            CString::new(value).map_err(|e| {
                AbiError::InvalidString(format!("descriptor field '{}': {}", field, e))
            })
        };

        Ok(Self {
            name: c("name", &descriptor.name)?,
            version: c("version", &descriptor.version)?,
            script_language: c("script_language", &descriptor.script_language)?,
            script_suffix: c("script_suffix", &descriptor.script_suffix)?,
        })
    }

    /// Point `raw` at these strings. `raw` is only valid while `self` lives.
    pub fn fill(&self, raw: &mut RawEngineDescriptor) {
        raw.name = self.name.as_ptr();
        raw.version = self.version.as_ptr();
        raw.script_language = self.script_language.as_ptr();
        raw.script_suffix = self.script_suffix.as_ptr();
    }
}
