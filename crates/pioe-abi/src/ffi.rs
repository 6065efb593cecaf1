//! C layout of the engine and parameter ABI.
//!
//! Every engine shared library exports the eight functions named in
//! [`symbols`]. Parameter records cross the boundary as [`RawParameters`];
//! C plugins read arguments with [`pe_plugin_param`] and write the return
//! value with [`pe_plugin_return`].

use crate::class::MethodCallback;
use crate::error::{AbiError, AbiResult};
use crate::params::{ParameterRecord, MAX_PARAMS};
use crate::status::Status;
use crate::value::{ObjectRef, ParamType, Value};
use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::sync::Arc;
use tracing::warn;

/// Exported symbol names of the engine ABI.
pub mod symbols {
    pub const ENGINE_LOAD: &str = "engine_load";
    pub const ENGINE_UNLOAD: &str = "engine_unload";
    pub const ENGINE_INIT: &str = "engine_init";
    pub const ENGINE_FRAME: &str = "engine_frame";
    pub const ENGINE_START: &str = "engine_start";
    pub const ENGINE_STOP: &str = "engine_stop";
    pub const ENGINE_LOAD_SCRIPT: &str = "engine_load_script";
    pub const ENGINE_EXECUTE_CODE: &str = "engine_execute_code";

    /// Every symbol an engine library must export.
    pub const REQUIRED: [&str; 8] = [
        ENGINE_LOAD,
        ENGINE_UNLOAD,
        ENGINE_INIT,
        ENGINE_FRAME,
        ENGINE_START,
        ENGINE_STOP,
        ENGINE_LOAD_SCRIPT,
        ENGINE_EXECUTE_CODE,
    ];
}

/// Tag of a return slot that has not been written.
pub const RETURN_UNSET: c_int = -1;

/// C union holding one scalar parameter.
#[derive(Clone, Copy)]
#[repr(C)]
pub union RawValue {
    pub i: c_int,
    pub f: f32,
    pub s: *mut c_char,
    pub o: *mut c_void,
}

impl Default for RawValue {
    fn default() -> Self {
        RawValue {
            o: std::ptr::null_mut(),
        }
    }
}

/// C layout of a parameter record.
#[repr(C)]
pub struct RawParameters {
    pub size: usize,
    pub params: [RawValue; MAX_PARAMS],
    pub types: [c_int; MAX_PARAMS],
    pub rval: RawValue,
    pub rtype: c_int,
}

impl Default for RawParameters {
    fn default() -> Self {
        Self {
            size: 0,
            params: [RawValue::default(); MAX_PARAMS],
            types: [ParamType::Integer.as_raw(); MAX_PARAMS],
            rval: RawValue::default(),
            rtype: RETURN_UNSET,
        }
    }
}

impl RawParameters {
    /// Decode the return slot.
    ///
    /// # Safety
    ///
    /// A string return slot must hold a valid NUL-terminated string.
    pub unsafe fn return_value(&self) -> AbiResult<Option<Value>> {
        if self.rtype == RETURN_UNSET {
            return Ok(None);
        }

        let value = match ParamType::try_from(self.rtype)? {
            ParamType::Integer => Value::Integer(self.rval.i),
            ParamType::Float => Value::Float(self.rval.f),
            ParamType::String => {
                if self.rval.s.is_null() {
                    return Err(AbiError::InvalidString("null return string".to_string()));
                }
                let s = CStr::from_ptr(self.rval.s)
                    .to_str()
                    .map_err(|e| AbiError::InvalidString(e.to_string()))?;
                Value::String(s.to_string())
            }
            ParamType::Object => Value::Object(ObjectRef::new(self.rval.o)),
            _ => return Err(AbiError::InvalidType(self.rtype)),
        };

        Ok(Some(value))
    }

    /// Release the return slot, reclaiming a string written by
    /// [`pe_plugin_return`].
    pub fn clear_return(&mut self) {
        if self.rtype == ParamType::String.as_raw() {
            // SAFETY: string return slots are only ever written by
            // `pe_plugin_return`, which allocates them with `CString::into_raw`.
            unsafe {
                let s = self.rval.s;
                if !s.is_null() {
                    drop(CString::from_raw(s));
                }
            }
        }
        self.rval = RawValue::default();
        self.rtype = RETURN_UNSET;
    }
}

/// A [`RawParameters`] together with the C strings its argument slots point to.
pub struct RawCall {
    raw: Box<RawParameters>,
    _strings: Vec<CString>,
}

impl RawCall {
    /// Lower a record into C layout. Only scalar values can be lowered.
    pub fn from_record(record: &ParameterRecord) -> AbiResult<Self> {
        let mut raw = Box::<RawParameters>::default();
        let mut strings = Vec::new();

        for (slot, value) in record.args().iter().enumerate() {
            raw.params[slot] = match value {
                Value::Integer(i) => RawValue { i: *i },
                Value::Float(f) => RawValue { f: *f },
                Value::String(s) => {
                    let c = CString::new(s.as_str())
                        .map_err(|e| AbiError::InvalidString(e.to_string()))?;
                    let ptr = c.as_ptr() as *mut c_char;
                    strings.push(c);
                    RawValue { s: ptr }
                }
                Value::Object(o) => RawValue { o: o.as_ptr() },
                other => return Err(AbiError::InvalidType(other.param_type().as_raw())),
            };
            raw.types[slot] = value.param_type().as_raw();
        }
        raw.size = record.len();

        Ok(Self {
            raw,
            _strings: strings,
        })
    }

    pub fn as_ptr(&self) -> *const RawParameters {
        &*self.raw
    }

    pub fn as_mut_ptr(&mut self) -> *mut RawParameters {
        &mut *self.raw
    }

    /// Decode the value written by the callee, if any.
    pub fn return_value(&self) -> AbiResult<Option<Value>> {
        // SAFETY: the return slot is only written through `pe_plugin_return`.
        unsafe { self.raw.return_value() }
    }
}

impl Drop for RawCall {
    fn drop(&mut self) {
        self.raw.clear_return();
    }
}

/// Signature of a method callback implemented in C.
pub type RawMethod = unsafe extern "C" fn(*mut RawParameters) -> c_int;

/// Wrap a C callback so it can be registered as a [`MethodCallback`].
///
/// The record is lowered to C layout for the call and the value the callback
/// wrote with [`pe_plugin_return`] is copied back into the record.
pub fn raw_method(method: RawMethod) -> MethodCallback {
    Arc::new(move |record: &mut ParameterRecord| {
        let mut call = match RawCall::from_record(record) {
            Ok(call) => call,
            Err(e) => {
                warn!("Cannot lower parameters: {}", e);
                return Status::FAILED;
            }
        };

        // SAFETY: `call` owns a valid record for the duration of the call.
        let status = Status(unsafe { method(call.as_mut_ptr()) });
        if !status.is_ok() {
            return status;
        }

        match call.return_value() {
            Ok(Some(value)) => match record.write_return(value) {
                Ok(()) => Status::OK,
                Err(e) => {
                    warn!("{}", e);
                    Status::FAILED
                }
            },
            Ok(None) => Status::OK,
            Err(e) => {
                warn!("Invalid return value: {}", e);
                Status::FAILED
            }
        }
    })
}

/// Read parameter `index` of `params` into `out`.
///
/// Integers and floats are written by value, strings are copied (including
/// the terminating NUL) into the buffer at `out`, objects are written as a
/// pointer. Returns `false` on a null record, an out-of-range index or an
/// unsupported tag.
///
/// # Safety
///
/// `params` must point to a valid record and `out` to storage large enough
/// for the slot's type.
#[no_mangle]
pub unsafe extern "C" fn pe_plugin_param(
    params: *const RawParameters,
    index: usize,
    out: *mut c_void,
) -> bool {
    let Some(params) = params.as_ref() else {
        warn!("pe_plugin_param called with a null record");
        return false;
    };
    if out.is_null() {
        warn!("pe_plugin_param called with a null destination");
        return false;
    }

    if index >= params.size || index >= MAX_PARAMS {
        warn!(
            "{}",
            AbiError::IndexOutOfBounds {
                index,
                size: params.size
            }
        );
        return false;
    }

    let raw_tag = params.types[index];
    let value = params.params[index];

    match ParamType::try_from(raw_tag) {
        Ok(ParamType::Integer) => *(out as *mut c_int) = value.i,
        Ok(ParamType::Float) => *(out as *mut f32) = value.f,
        Ok(ParamType::String) => {
            if value.s.is_null() {
                warn!("String parameter {} is null", index);
                return false;
            }
            let bytes = CStr::from_ptr(value.s).to_bytes_with_nul();
            std::ptr::copy_nonoverlapping(bytes.as_ptr() as *const c_char, out as *mut c_char, bytes.len());
        }
        Ok(ParamType::Object) => *(out as *mut *mut c_void) = value.o,
        _ => {
            warn!("{}", AbiError::InvalidType(raw_tag));
            return false;
        }
    }

    true
}

/// Write the return value of `params`.
///
/// Strings are duplicated into storage owned by the record. The slot can be
/// written once; unknown tags fail.
///
/// # Safety
///
/// `params` must point to a valid record and `value` to a value of the
/// type named by `tag` (any pointer for objects).
#[no_mangle]
pub unsafe extern "C" fn pe_plugin_return(
    params: *mut RawParameters,
    value: *const c_void,
    tag: c_int,
) -> bool {
    let Some(params) = params.as_mut() else {
        warn!("pe_plugin_return called with a null record");
        return false;
    };

    if params.rtype != RETURN_UNSET {
        warn!("{}", AbiError::ReturnAlreadySet);
        return false;
    }

    let param_type = match ParamType::try_from(tag) {
        Ok(t) if t.is_scalar() => t,
        _ => {
            warn!("{}", AbiError::InvalidType(tag));
            return false;
        }
    };

    if value.is_null() && param_type != ParamType::Object {
        warn!("pe_plugin_return called with a null value");
        return false;
    }

    params.rval = match param_type {
        ParamType::Integer => RawValue {
            i: *(value as *const c_int),
        },
        ParamType::Float => RawValue {
            f: *(value as *const f32),
        },
        ParamType::String => RawValue {
            s: CStr::from_ptr(value as *const c_char).to_owned().into_raw(),
        },
        _ => RawValue {
            o: value as *mut c_void,
        },
    };
    params.rtype = param_type.as_raw();

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ParameterRecord {
        ParameterRecord::with_args(vec![
            Value::from(11),
            Value::from(1.25f32),
            Value::from("text"),
            Value::from(ObjectRef::new(0x20 as *mut c_void)),
        ])
        .unwrap()
    }

    #[test]
    fn test_read_through_c_abi() {
        let call = RawCall::from_record(&record()).unwrap();

        unsafe {
            let mut i: c_int = 0;
            assert!(pe_plugin_param(call.as_ptr(), 0, &mut i as *mut c_int as *mut c_void));
            assert_eq!(i, 11);

            let mut f: f32 = 0.0;
            assert!(pe_plugin_param(call.as_ptr(), 1, &mut f as *mut f32 as *mut c_void));
            assert_eq!(f, 1.25);

            let mut buf = [0 as c_char; 16];
            assert!(pe_plugin_param(call.as_ptr(), 2, buf.as_mut_ptr() as *mut c_void));
            assert_eq!(CStr::from_ptr(buf.as_ptr()).to_str().unwrap(), "text");

            let mut o: *mut c_void = std::ptr::null_mut();
            assert!(pe_plugin_param(call.as_ptr(), 3, &mut o as *mut *mut c_void as *mut c_void));
            assert_eq!(o as usize, 0x20);
        }
    }

    #[test]
    fn test_read_out_of_bounds_and_bad_tag() {
        let mut call = RawCall::from_record(&record()).unwrap();
        let mut i: c_int = 0;
        let out = &mut i as *mut c_int as *mut c_void;

        unsafe {
            for index in 4..=MAX_PARAMS {
                assert!(!pe_plugin_param(call.as_ptr(), index, out));
            }

            (*call.as_mut_ptr()).types[0] = 42;
            assert!(!pe_plugin_param(call.as_ptr(), 0, out));
        }
    }

    #[test]
    fn test_return_string_is_duplicated() {
        let mut call = RawCall::from_record(&ParameterRecord::new()).unwrap();
        let source = CString::new("result").unwrap();

        unsafe {
            assert!(pe_plugin_return(
                call.as_mut_ptr(),
                source.as_ptr() as *const c_void,
                ParamType::String.as_raw()
            ));
            assert_ne!((*call.as_ptr()).rval.s as *const c_char, source.as_ptr());
        }

        assert_eq!(
            call.return_value().unwrap(),
            Some(Value::String("result".to_string()))
        );
    }

    #[test]
    fn test_return_rules() {
        let mut call = RawCall::from_record(&ParameterRecord::new()).unwrap();
        let value: c_int = 9;
        let ptr = &value as *const c_int as *const c_void;

        unsafe {
            assert!(!pe_plugin_return(call.as_mut_ptr(), ptr, 77));
            assert!(!pe_plugin_return(call.as_mut_ptr(), ptr, ParamType::IntegerArray.as_raw()));
            assert!(pe_plugin_return(call.as_mut_ptr(), ptr, ParamType::Integer.as_raw()));
            assert!(!pe_plugin_return(call.as_mut_ptr(), ptr, ParamType::Integer.as_raw()));
        }

        assert_eq!(call.return_value().unwrap(), Some(Value::Integer(9)));
    }

    #[test]
    fn test_arrays_do_not_lower() {
        let record = ParameterRecord::with_args(vec![Value::IntegerArray(vec![1, 2])]).unwrap();
        assert!(matches!(
            RawCall::from_record(&record),
            Err(AbiError::InvalidType(4))
        ));
    }
}
