//! # pioe-runtime
//!
//! Host runtime for pioe engine plugins.
//!
//! This crate provides:
//! - Engine discovery from well-known paths
//! - Engine library loading and ABI validation
//! - The engine registry and lifecycle ([`Host`])
//! - The frame scheduler
//!
//! ## Engine Libraries
//!
//! An engine is a shared library named `libpioe<key>engine.so` (platform
//! naming applies) exporting the eight `engine_*` entry points listed in
//! [`pioe_abi::ffi::symbols`]. A library missing any of them is rejected.
//!
//! ## Scheduling
//!
//! Every tick, each engine that is not still busy with an earlier frame
//! receives the current frame on a task of its own. Busy engines skip the
//! tick.

pub mod discovery;
pub mod error;
pub mod frame;
pub mod library;
pub mod lifecycle;
pub mod registry;
pub mod scheduler;

pub use discovery::{find_engines, DiscoveredEngine, SearchPath};
pub use error::{ErrorKind, HostError, HostResult};
pub use frame::FrameClock;
pub use library::{EngineApi, EngineLibrary, InProcessLoader, LibraryLoader, NativeLoader};
pub use lifecycle::{Host, HostOptions, LifecycleState, ShutdownHandle, DEFAULT_FRAME_RESOLUTION};
pub use registry::{EngineHandle, EngineRegistry};
pub use scheduler::Dispatch;
