//! # pioe-abi
//!
//! The contract shared by the pioe host and its engine plugins.
//!
//! This crate provides:
//! - The engine ABI: [`Frame`], [`Status`], engine descriptors and the
//!   exported symbol names every engine library must provide
//! - Engine-side helpers: the [`ScriptEngine`] trait and [`export_engine!`]
//! - Parameter marshaling: [`ParameterRecord`] and its C layout
//!   ([`ffi::RawParameters`], [`ffi::pe_plugin_param`], [`ffi::pe_plugin_return`])
//! - Plugin, class and method registries ([`PluginRegistry`])
//!
//! ## Parameter Records
//!
//! A record holds up to [`MAX_PARAMS`] tagged arguments and one return slot.
//! Arguments are fixed at construction; the callee writes the return slot at
//! most once.

pub mod class;
pub mod descriptor;
pub mod error;
pub mod export;
pub mod ffi;
pub mod frame;
pub mod logging;
pub mod params;
pub mod plugin;
pub mod status;
pub mod value;

pub use class::{ClassDescriptor, ClassId, MethodCallback, MethodDescriptor, MethodKind, PluginId};
pub use descriptor::{DescriptorStrings, EngineDescriptor, RawEngineDescriptor};
pub use error::{AbiError, AbiResult};
pub use export::{EngineExport, ScriptEngine};
pub use frame::Frame;
pub use params::{ParameterRecord, MAX_PARAMS};
pub use plugin::{PluginDescriptor, PluginRegistry, MAX_PLUGINS};
pub use status::Status;
pub use value::{ObjectRef, ParamType, Value};
