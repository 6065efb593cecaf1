//! Class and method descriptors.
//!
//! A plugin describes a callable surface as classes with a single optional
//! parent and two method tables. The engine-specific relay turns these into
//! definitions inside its script runtime.

use crate::error::{AbiError, AbiResult};
use crate::params::ParameterRecord;
use crate::status::Status;
use crate::value::{ObjectRef, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Identifies a registered plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PluginId(pub(crate) usize);

impl PluginId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Identifies a class within the plugin registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId {
    pub(crate) plugin: PluginId,
    pub(crate) index: usize,
}

impl ClassId {
    pub fn plugin(&self) -> PluginId {
        self.plugin
    }
}

/// Native callback behind a method.
///
/// Receives a fully populated record, must populate the return slot before
/// returning and reports success with [`Status::OK`].
pub type MethodCallback = Arc<dyn Fn(&mut ParameterRecord) -> Status + Send + Sync>;

/// Which method table a method lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Class,
    Instance,
}

/// A named native method with a declared arity.
#[derive(Clone)]
pub struct MethodDescriptor {
    name: String,
    arity: usize,
    kind: MethodKind,
    callback: MethodCallback,
}

impl MethodDescriptor {
    pub fn new(
        name: impl Into<String>,
        arity: usize,
        kind: MethodKind,
        callback: MethodCallback,
    ) -> Self {
        Self {
            name: name.into(),
            arity,
            kind,
            callback,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn kind(&self) -> MethodKind {
        self.kind
    }

    /// Call the native callback with `args` and return its result.
    ///
    /// Enforces the callback contract: the argument count must match the
    /// declared arity, the status must be zero and the return slot must be
    /// populated.
    pub fn invoke(&self, args: Vec<Value>) -> AbiResult<Value> {
        if args.len() != self.arity {
            return Err(AbiError::ArityMismatch {
                method: self.name.clone(),
                expected: self.arity,
                actual: args.len(),
            });
        }

        let mut record = ParameterRecord::with_args(args)?;
        let status = (self.callback)(&mut record);
        if !status.is_ok() {
            return Err(AbiError::CallbackFailed {
                method: self.name.clone(),
                status: status.code(),
            });
        }

        record
            .take_return()
            .ok_or_else(|| AbiError::MissingReturn(self.name.clone()))
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// A class exposed by a plugin.
#[derive(Debug, Clone)]
pub struct ClassDescriptor {
    name: String,
    parent: Option<ClassId>,
    pub(crate) instance_methods: HashMap<String, MethodDescriptor>,
    pub(crate) class_methods: HashMap<String, MethodDescriptor>,
    pub(crate) instances: Vec<ObjectRef>,
}

impl ClassDescriptor {
    pub(crate) fn new(name: impl Into<String>, parent: Option<ClassId>) -> Self {
        Self {
            name: name.into(),
            parent,
            instance_methods: HashMap::new(),
            class_methods: HashMap::new(),
            instances: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The parent class, if any. Parents never enumerate their children.
    pub fn parent(&self) -> Option<ClassId> {
        self.parent
    }

    pub fn instance_method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.instance_methods.get(name)
    }

    pub fn class_method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.class_methods.get(name)
    }

    pub fn instance_methods(&self) -> impl Iterator<Item = &MethodDescriptor> {
        self.instance_methods.values()
    }

    pub fn class_methods(&self) -> impl Iterator<Item = &MethodDescriptor> {
        self.class_methods.values()
    }

    pub fn instances(&self) -> &[ObjectRef] {
        &self.instances
    }
}
