//! Parameter records.
//!
//! A [`ParameterRecord`] marshals the arguments and the single return value of
//! one cross-boundary call. Arguments are fixed when the record is built; the
//! return slot is written at most once by the callee.

use crate::error::{AbiError, AbiResult};
use crate::value::{ParamType, Value};
use tracing::warn;

/// Maximum number of argument slots in a record.
pub const MAX_PARAMS: usize = 64;

/// Arguments and return slot of a single call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterRecord {
    args: Vec<Value>,
    ret: Option<Value>,
}

impl ParameterRecord {
    /// Create a record without arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a record from a list of arguments.
    ///
    /// Fails if more than [`MAX_PARAMS`] arguments are supplied.
    pub fn with_args<I>(args: I) -> AbiResult<Self>
    where
        I: IntoIterator<Item = Value>,
    {
        let mut collected = Vec::new();
        for arg in args {
            if collected.len() == MAX_PARAMS {
                return Err(AbiError::CapacityExceeded {
                    what: "parameter record",
                    max: MAX_PARAMS,
                });
            }
            collected.push(arg);
        }

        Ok(Self {
            args: collected,
            ret: None,
        })
    }

    /// Number of populated argument slots.
    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Get an argument by index.
    pub fn param(&self, index: usize) -> AbiResult<&Value> {
        self.args.get(index).ok_or(AbiError::IndexOutOfBounds {
            index,
            size: self.args.len(),
        })
    }

    /// Copy argument `index` into `out`.
    ///
    /// Scalars are copied by value, strings are copied byte-for-byte into the
    /// storage already held by `out` when it is a string, objects are handed
    /// out as the same opaque reference. Returns `false` and logs when the
    /// index is out of bounds.
    pub fn read_parameter(&self, index: usize, out: &mut Value) -> bool {
        let value = match self.param(index) {
            Ok(value) => value,
            Err(e) => {
                warn!("{}", e);
                return false;
            }
        };

        match (value, &mut *out) {
            (Value::String(src), Value::String(dst)) => {
                dst.clear();
                dst.push_str(src);
            }
            (value, out) => *out = value.clone(),
        }

        true
    }

    /// Write the return value.
    ///
    /// The slot is write-once; a second write fails with
    /// [`AbiError::ReturnAlreadySet`].
    pub fn write_return(&mut self, value: Value) -> AbiResult<()> {
        if self.ret.is_some() {
            return Err(AbiError::ReturnAlreadySet);
        }
        self.ret = Some(value);
        Ok(())
    }

    /// Whether the callee populated the return slot.
    pub fn has_return(&self) -> bool {
        self.ret.is_some()
    }

    pub fn return_value(&self) -> Option<&Value> {
        self.ret.as_ref()
    }

    pub fn return_type(&self) -> Option<ParamType> {
        self.ret.as_ref().map(Value::param_type)
    }

    /// Take the return value out of the record.
    pub fn take_return(&mut self) -> Option<Value> {
        self.ret.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ObjectRef;

    #[test]
    fn test_capacity() {
        let full = ParameterRecord::with_args((0..MAX_PARAMS as i32).map(Value::from)).unwrap();
        assert_eq!(full.len(), MAX_PARAMS);

        let over = ParameterRecord::with_args((0..=MAX_PARAMS as i32).map(Value::from));
        assert!(matches!(over, Err(AbiError::CapacityExceeded { .. })));
    }

    #[test]
    fn test_read_out_of_bounds_for_every_size() {
        for size in 0..=MAX_PARAMS {
            let record = ParameterRecord::with_args((0..size as i32).map(Value::from)).unwrap();
            let mut out = Value::Integer(-1);
            for index in size..MAX_PARAMS + 2 {
                assert!(!record.read_parameter(index, &mut out));
            }
            assert_eq!(out, Value::Integer(-1));
        }
    }

    #[test]
    fn test_read_scalars() {
        let obj = ObjectRef::new(0x10 as *mut _);
        let record = ParameterRecord::with_args(vec![
            Value::from(7),
            Value::from(2.5f32),
            Value::from("hello"),
            Value::from(obj),
        ])
        .unwrap();

        let mut out = Value::Integer(0);
        assert!(record.read_parameter(0, &mut out));
        assert_eq!(out, Value::Integer(7));

        assert!(record.read_parameter(1, &mut out));
        assert_eq!(out, Value::Float(2.5));

        assert!(record.read_parameter(3, &mut out));
        assert_eq!(out.as_object(), Some(obj));
    }

    #[test]
    fn test_read_string_reuses_caller_storage() {
        let record = ParameterRecord::with_args(vec![Value::from("abc")]).unwrap();

        let mut out = Value::String(String::with_capacity(32));
        let before = match &out {
            Value::String(s) => s.as_ptr(),
            _ => unreachable!(),
        };

        assert!(record.read_parameter(0, &mut out));
        match (&out, record.param(0).unwrap()) {
            (Value::String(dst), Value::String(src)) => {
                assert_eq!(dst, "abc");
                assert_eq!(dst.as_ptr(), before);
                assert_ne!(dst.as_ptr(), src.as_ptr());
            }
            _ => panic!("expected strings"),
        }
    }

    #[test]
    fn test_return_round_trip() {
        let mut record = ParameterRecord::new();
        record.write_return(Value::from(42)).unwrap();
        assert_eq!(record.return_value(), Some(&Value::Integer(42)));

        let mut record = ParameterRecord::new();
        record.write_return(Value::from(0.25f32)).unwrap();
        assert_eq!(record.return_value(), Some(&Value::Float(0.25)));

        let original = String::from("returned");
        let mut record = ParameterRecord::new();
        record.write_return(Value::from(original.as_str())).unwrap();
        match record.return_value() {
            Some(Value::String(s)) => {
                assert_eq!(s, &original);
                assert_ne!(s.as_ptr(), original.as_ptr());
            }
            other => panic!("unexpected return value: {:?}", other),
        }
    }

    #[test]
    fn test_return_is_write_once() {
        let mut record = ParameterRecord::new();
        record.write_return(Value::from(1)).unwrap();
        assert_eq!(
            record.write_return(Value::from(2)),
            Err(AbiError::ReturnAlreadySet)
        );
        assert_eq!(record.return_type(), Some(ParamType::Integer));
        assert_eq!(record.take_return(), Some(Value::Integer(1)));
    }
}
