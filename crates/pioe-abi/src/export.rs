//! Engine-side half of the ABI.
//!
//! Engine crates implement [`ScriptEngine`] and call [`export_engine!`] once
//! to emit the eight `extern "C"` entry points the host binds.
//!
//! ```ignore
//! #[derive(Default)]
//! struct MyEngine;
//!
//! impl pioe_abi::ScriptEngine for MyEngine { /* ... */ }
//!
//! pioe_abi::export_engine!(MyEngine, MyEngine::default);
//! ```

use crate::descriptor::{DescriptorStrings, EngineDescriptor, RawEngineDescriptor};
use crate::frame::Frame;
use crate::status::Status;
use std::ffi::{c_char, c_int, CStr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, TryLockError};
use tracing::{debug, error, warn};

/// A scripting-language runtime hosted as an engine plugin.
pub trait ScriptEngine: Send + 'static {
    /// Metadata reported to the host from `engine_load`.
    fn describe(&self) -> EngineDescriptor;

    fn unload(&mut self) -> Result<(), Status> {
        Ok(())
    }

    fn init(&mut self) -> Result<(), Status>;

    /// Called once per dispatched tick.
    fn frame(&mut self, frame: Frame) -> Result<(), Status>;

    fn start(&mut self) -> Result<(), Status> {
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Status> {
        Ok(())
    }

    /// Receive the full contents of a script file.
    fn load_script(&mut self, source: &str) -> Result<(), Status>;

    fn execute_code(&mut self, code: &str) -> Result<(), Status>;
}

/// Process-wide state behind the exported entry points of one engine library.
///
/// Entry points share the engine through a slot. `engine_unload` detaches the
/// slot without waiting for a call in progress; the engine's unload hook then
/// runs when that call returns.
pub struct EngineExport<E: ScriptEngine> {
    factory: fn() -> E,
    slot: Mutex<Option<Arc<EngineSlot<E>>>>,
    strings: Mutex<Option<DescriptorStrings>>,
}

struct EngineSlot<E: ScriptEngine> {
    engine: Mutex<Option<E>>,
}

impl<E: ScriptEngine> Drop for EngineSlot<E> {
    fn drop(&mut self) {
        let engine = self
            .engine
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(engine) = engine {
            debug!(target: "engine", "running deferred engine_unload");
            teardown(engine);
        }
    }
}

impl<E: ScriptEngine> EngineExport<E> {
    pub const fn new(factory: fn() -> E) -> Self {
        Self {
            factory,
            slot: Mutex::new(None),
            strings: Mutex::new(None),
        }
    }

    /// `engine_load`: construct the engine and describe it into `raw`.
    ///
    /// # Safety
    ///
    /// `raw` must be null or point to a writable descriptor.
    pub unsafe fn load(&self, raw: *mut RawEngineDescriptor) -> c_int {
        crate::logging::init();

        let Some(raw) = raw.as_mut() else {
            error!(target: "engine", "engine_load called with a null descriptor");
            return Status::FAILED.code();
        };

        let result = catch_unwind(AssertUnwindSafe(|| {
            let engine = (self.factory)();
            let descriptor = engine.describe();
            (engine, descriptor)
        }));
        let Ok((engine, descriptor)) = result else {
            error!(target: "engine", "engine constructor panicked");
            return Status::FAILED.code();
        };

        let strings = match DescriptorStrings::new(&descriptor) {
            Ok(strings) => strings,
            Err(e) => {
                error!(target: "engine", "Invalid engine descriptor: {}", e);
                return Status::FAILED.code();
            }
        };

        raw.id = descriptor.id;
        strings.fill(raw);

        *lock(&self.strings) = Some(strings);
        *lock(&self.slot) = Some(Arc::new(EngineSlot {
            engine: Mutex::new(Some(engine)),
        }));
        Status::OK.code()
    }

    /// `engine_unload`: run the engine's unload hook and drop it.
    ///
    /// Never waits for a call in progress. If one holds the engine, unload
    /// returns OK at once and the hook runs when that call returns.
    pub fn unload(&self) -> c_int {
        let Some(slot) = lock(&self.slot).take() else {
            warn!(target: "engine", "engine_unload called before engine_load");
            return Status::FAILED.code();
        };

        let status = match slot.engine.try_lock() {
            Ok(mut guard) => guard.take().map_or(Status::OK.code(), teardown),
            Err(TryLockError::Poisoned(poisoned)) => poisoned
                .into_inner()
                .take()
                .map_or(Status::OK.code(), teardown),
            Err(TryLockError::WouldBlock) => {
                debug!(target: "engine", "engine busy, deferring engine_unload");
                Status::OK.code()
            }
        };
        status
    }

    pub fn init(&self) -> c_int {
        self.call("engine_init", |e| e.init())
    }

    pub fn frame(&self, frame: Frame) -> c_int {
        self.call("engine_frame", |e| e.frame(frame))
    }

    pub fn start(&self) -> c_int {
        self.call("engine_start", |e| e.start())
    }

    pub fn stop(&self) -> c_int {
        self.call("engine_stop", |e| e.stop())
    }

    /// # Safety
    ///
    /// `source` must be null or a valid NUL-terminated string.
    pub unsafe fn load_script(&self, source: *const c_char) -> c_int {
        match text("engine_load_script", source) {
            Some(source) => self.call("engine_load_script", |e| e.load_script(source)),
            None => Status::FAILED.code(),
        }
    }

    /// # Safety
    ///
    /// `code` must be null or a valid NUL-terminated string.
    pub unsafe fn execute_code(&self, code: *const c_char) -> c_int {
        match text("engine_execute_code", code) {
            Some(code) => self.call("engine_execute_code", |e| e.execute_code(code)),
            None => Status::FAILED.code(),
        }
    }

    fn call<F>(&self, entry: &str, f: F) -> c_int
    where
        F: FnOnce(&mut E) -> Result<(), Status>,
    {
        let Some(slot) = lock(&self.slot).clone() else {
            warn!(target: "engine", "{} called before engine_load", entry);
            return Status::FAILED.code();
        };

        let mut guard = lock(&slot.engine);
        let Some(engine) = guard.as_mut() else {
            warn!(target: "engine", "{} called after engine_unload", entry);
            return Status::FAILED.code();
        };

        // Panics must not unwind into the host.
        match catch_unwind(AssertUnwindSafe(|| f(engine))) {
            Ok(result) => Status::from(result).code(),
            Err(_) => {
                error!(target: "engine", "{} panicked", entry);
                Status::FAILED.code()
            }
        }
    }
}

fn teardown<E: ScriptEngine>(mut engine: E) -> c_int {
    match catch_unwind(AssertUnwindSafe(|| engine.unload())) {
        Ok(result) => Status::from(result).code(),
        Err(_) => {
            error!(target: "engine", "engine_unload panicked");
            Status::FAILED.code()
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

unsafe fn text<'a>(entry: &str, ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        warn!(target: "engine", "{} called with a null string", entry);
        return None;
    }
    match CStr::from_ptr(ptr).to_str() {
        Ok(s) => Some(s),
        Err(e) => {
            warn!(target: "engine", "{} received invalid UTF-8: {}", entry, e);
            None
        }
    }
}

/// Export the engine ABI for a [`ScriptEngine`] implementation.
///
/// Takes the engine type and a constructor `fn() -> Engine`.
#[macro_export]
macro_rules! export_engine {
    ($engine:ty, $factory:expr $(,)?) => {
        static __PIOE_ENGINE: $crate::EngineExport<$engine> =
            $crate::EngineExport::new($factory);

        #[no_mangle]
        pub unsafe extern "C" fn engine_load(
            descriptor: *mut $crate::RawEngineDescriptor,
        ) -> ::std::ffi::c_int {
            __PIOE_ENGINE.load(descriptor)
        }

        #[no_mangle]
        pub extern "C" fn engine_unload() -> ::std::ffi::c_int {
            __PIOE_ENGINE.unload()
        }

        #[no_mangle]
        pub extern "C" fn engine_init() -> ::std::ffi::c_int {
            __PIOE_ENGINE.init()
        }

        #[no_mangle]
        pub extern "C" fn engine_frame(frame: $crate::Frame) -> ::std::ffi::c_int {
            __PIOE_ENGINE.frame(frame)
        }

        #[no_mangle]
        pub extern "C" fn engine_start() -> ::std::ffi::c_int {
            __PIOE_ENGINE.start()
        }

        #[no_mangle]
        pub extern "C" fn engine_stop() -> ::std::ffi::c_int {
            __PIOE_ENGINE.stop()
        }

        #[no_mangle]
        pub unsafe extern "C" fn engine_load_script(
            source: *const ::std::ffi::c_char,
        ) -> ::std::ffi::c_int {
            __PIOE_ENGINE.load_script(source)
        }

        #[no_mangle]
        pub unsafe extern "C" fn engine_execute_code(
            code: *const ::std::ffi::c_char,
        ) -> ::std::ffi::c_int {
            __PIOE_ENGINE.execute_code(code)
        }
    };
}
