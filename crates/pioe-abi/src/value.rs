//! Tagged values carried across the host/plugin boundary.

use crate::error::AbiError;
use std::ffi::c_void;

/// Type tag of a parameter slot.
///
/// The discriminants are part of the C ABI and must not be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ParamType {
    Integer = 0,
    Float = 1,
    String = 2,
    Object = 3,
    IntegerArray = 4,
    FloatArray = 5,
    StringArray = 6,
    ObjectArray = 7,
    /// Reserved for engine relays; carries no value on the host side.
    Class = 8,
    /// Reserved for engine relays; carries no value on the host side.
    Instance = 9,
}

impl ParamType {
    /// Get the raw tag as it appears in a C record.
    pub fn as_raw(self) -> i32 {
        self as i32
    }

    /// Whether this tag holds a scalar that fits a single C union member.
    pub fn is_scalar(self) -> bool {
        matches!(
            self,
            ParamType::Integer | ParamType::Float | ParamType::String | ParamType::Object
        )
    }
}

impl TryFrom<i32> for ParamType {
    type Error = AbiError;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        Ok(match raw {
            0 => ParamType::Integer,
            1 => ParamType::Float,
            2 => ParamType::String,
            3 => ParamType::Object,
            4 => ParamType::IntegerArray,
            5 => ParamType::FloatArray,
            6 => ParamType::StringArray,
            7 => ParamType::ObjectArray,
            8 => ParamType::Class,
            9 => ParamType::Instance,
            other => return Err(AbiError::InvalidType(other)),
        })
    }
}

/// Opaque, non-owning reference to an object living in a script runtime.
///
/// The host never dereferences it; it is only handed back to the plugin
/// that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef(*mut c_void);

// SAFETY: the pointer is an opaque token; the host never dereferences it.
unsafe impl Send for ObjectRef {}
unsafe impl Sync for ObjectRef {}

impl ObjectRef {
    pub fn new(ptr: *mut c_void) -> Self {
        Self(ptr)
    }

    pub fn null() -> Self {
        Self(std::ptr::null_mut())
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.0
    }

    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }
}

/// A single tagged value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i32),
    Float(f32),
    String(String),
    Object(ObjectRef),
    IntegerArray(Vec<i32>),
    FloatArray(Vec<f32>),
    StringArray(Vec<String>),
    ObjectArray(Vec<ObjectRef>),
}

impl Value {
    /// The type tag matching the populated variant.
    pub fn param_type(&self) -> ParamType {
        match self {
            Value::Integer(_) => ParamType::Integer,
            Value::Float(_) => ParamType::Float,
            Value::String(_) => ParamType::String,
            Value::Object(_) => ParamType::Object,
            Value::IntegerArray(_) => ParamType::IntegerArray,
            Value::FloatArray(_) => ParamType::FloatArray,
            Value::StringArray(_) => ParamType::StringArray,
            Value::ObjectArray(_) => ParamType::ObjectArray,
        }
    }

    pub fn as_integer(&self) -> Option<i32> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<ObjectRef> {
        match self {
            Value::Object(o) => Some(*o),
            _ => None,
        }
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i)
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<ObjectRef> for Value {
    fn from(o: ObjectRef) -> Self {
        Value::Object(o)
    }
}
