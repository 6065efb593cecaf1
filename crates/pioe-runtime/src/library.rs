//! Engine library loading.
//!
//! Loading an engine happens in two steps: a [`LibraryLoader`] opens the file
//! as an [`EngineLibrary`], whose export table the registry validates before
//! binding it into an [`EngineApi`]. The API object keeps the library mapped
//! for as long as any reference to it is alive.

use crate::error::{HostError, HostResult};
use pioe_abi::ffi::symbols;
use pioe_abi::{EngineDescriptor, Frame, RawEngineDescriptor, Status};
use std::collections::HashMap;
use std::ffi::{c_char, c_int, c_void, CString, OsString};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// The eight entry points every engine exports.
///
/// Implementations must be callable from any thread. The host serializes
/// `frame` calls per engine; the remaining entry points are only called from
/// the lifecycle owner.
pub trait EngineApi: Send + Sync {
    /// Run the engine's load hook and fill in `descriptor`.
    fn load(&self, descriptor: &mut EngineDescriptor) -> Status;

    fn unload(&self) -> Status;

    fn init(&self) -> Status;

    fn frame(&self, frame: Frame) -> Status;

    fn start(&self) -> Status;

    fn stop(&self) -> Status;

    fn load_script(&self, source: &str) -> Status;

    fn execute_code(&self, code: &str) -> Status;
}

/// An opened but not yet bound engine library.
pub trait EngineLibrary: Send {
    fn path(&self) -> &Path;

    /// Whether the library exports `symbol`.
    fn exports(&self, symbol: &str) -> bool;

    /// Bind the entry points. Callers check [`exports`](Self::exports) first.
    fn bind(self: Box<Self>) -> HostResult<Arc<dyn EngineApi>>;
}

/// Opens engine libraries.
pub trait LibraryLoader: Send + Sync {
    fn open(&self, path: &Path) -> HostResult<Box<dyn EngineLibrary>>;
}

// ============================================================================
// Native shared libraries
// ============================================================================

type LoadFn = unsafe extern "C" fn(*mut RawEngineDescriptor) -> c_int;
type HookFn = unsafe extern "C" fn() -> c_int;
type FrameFn = unsafe extern "C" fn(Frame) -> c_int;
type TextFn = unsafe extern "C" fn(*const c_char) -> c_int;

/// Loads engines from shared libraries with `libloading`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeLoader;

impl LibraryLoader for NativeLoader {
    fn open(&self, path: &Path) -> HostResult<Box<dyn EngineLibrary>> {
        debug!("Opening engine library {:?}", path);

        // SAFETY: loading a library runs its initializers; engine libraries
        // are trusted code.
        let library = unsafe { libloading::Library::new(path) }.map_err(|e| {
            HostError::LoadFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;

        Ok(Box::new(NativeLibrary {
            path: path.to_path_buf(),
            library,
        }))
    }
}

struct NativeLibrary {
    path: PathBuf,
    library: libloading::Library,
}

impl NativeLibrary {
    fn symbol<T: Copy>(&self, name: &str) -> HostResult<T> {
        // SAFETY: `T` is the function type the engine ABI declares for `name`.
        unsafe { self.library.get::<T>(name.as_bytes()) }
            .map(|symbol| *symbol)
            .map_err(|_| HostError::MissingSymbol {
                path: self.path.clone(),
                symbol: name.to_string(),
            })
    }
}

impl EngineLibrary for NativeLibrary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn exports(&self, symbol: &str) -> bool {
        // SAFETY: the symbol is only looked up, never called.
        unsafe { self.library.get::<*const c_void>(symbol.as_bytes()) }.is_ok()
    }

    fn bind(self: Box<Self>) -> HostResult<Arc<dyn EngineApi>> {
        let this = *self;
        let engine = NativeEngine {
            load: this.symbol(symbols::ENGINE_LOAD)?,
            unload: this.symbol(symbols::ENGINE_UNLOAD)?,
            init: this.symbol(symbols::ENGINE_INIT)?,
            frame: this.symbol(symbols::ENGINE_FRAME)?,
            start: this.symbol(symbols::ENGINE_START)?,
            stop: this.symbol(symbols::ENGINE_STOP)?,
            load_script: this.symbol(symbols::ENGINE_LOAD_SCRIPT)?,
            execute_code: this.symbol(symbols::ENGINE_EXECUTE_CODE)?,
            path: this.path,
            _library: this.library,
        };
        Ok(Arc::new(engine))
    }
}

/// Entry points bound from a shared library.
///
/// The function pointers are only valid while `_library` stays mapped.
struct NativeEngine {
    load: LoadFn,
    unload: HookFn,
    init: HookFn,
    frame: FrameFn,
    start: HookFn,
    stop: HookFn,
    load_script: TextFn,
    execute_code: TextFn,
    path: PathBuf,
    _library: libloading::Library,
}

impl NativeEngine {
    fn call_text(&self, entry: TextFn, text: &str) -> Status {
        let Ok(text) = CString::new(text) else {
            warn!("Text for {:?} contains an interior NUL byte", self.path);
            return Status::FAILED;
        };
        // SAFETY: `text` is NUL-terminated and outlives the call.
        Status(unsafe { entry(text.as_ptr()) })
    }
}

impl EngineApi for NativeEngine {
    fn load(&self, descriptor: &mut EngineDescriptor) -> Status {
        let mut raw = RawEngineDescriptor::default();
        // SAFETY: `raw` is a valid, writable descriptor.
        let status = Status(unsafe { (self.load)(&mut raw) });
        if !status.is_ok() {
            return status;
        }

        // SAFETY: the engine fills the descriptor with NUL-terminated strings
        // that stay valid until engine_load returns to us.
        match unsafe { raw.to_descriptor() } {
            Ok(owned) => {
                *descriptor = owned;
                Status::OK
            }
            Err(e) => {
                warn!("Engine {:?} returned an invalid descriptor: {}", self.path, e);
                Status::FAILED
            }
        }
    }

    fn unload(&self) -> Status {
        Status(unsafe { (self.unload)() })
    }

    fn init(&self) -> Status {
        Status(unsafe { (self.init)() })
    }

    fn frame(&self, frame: Frame) -> Status {
        Status(unsafe { (self.frame)(frame) })
    }

    fn start(&self) -> Status {
        Status(unsafe { (self.start)() })
    }

    fn stop(&self) -> Status {
        Status(unsafe { (self.stop)() })
    }

    fn load_script(&self, source: &str) -> Status {
        self.call_text(self.load_script, source)
    }

    fn execute_code(&self, code: &str) -> Status {
        self.call_text(self.execute_code, code)
    }
}

// ============================================================================
// In-process engines
// ============================================================================

struct InProcessEntry {
    api: Arc<dyn EngineApi>,
    exports: Vec<String>,
}

/// Serves engines linked into the host process.
///
/// Engines are registered under a library file name. Opening a path succeeds
/// when a file exists there and its file name matches a registration, so the
/// search-path rules behave exactly as with [`NativeLoader`].
#[derive(Default)]
pub struct InProcessLoader {
    engines: HashMap<OsString, InProcessEntry>,
}

impl InProcessLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an engine exporting the full ABI.
    pub fn register(&mut self, file_name: impl Into<OsString>, api: Arc<dyn EngineApi>) {
        self.register_partial(file_name, api, &symbols::REQUIRED);
    }

    /// Register an engine exporting only `exports`.
    pub fn register_partial(
        &mut self,
        file_name: impl Into<OsString>,
        api: Arc<dyn EngineApi>,
        exports: &[&str],
    ) {
        self.engines.insert(
            file_name.into(),
            InProcessEntry {
                api,
                exports: exports.iter().map(|s| s.to_string()).collect(),
            },
        );
    }
}

impl LibraryLoader for InProcessLoader {
    fn open(&self, path: &Path) -> HostResult<Box<dyn EngineLibrary>> {
        let load_failed = |reason: &str| HostError::LoadFailed {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        if !path.is_file() {
            return Err(load_failed("No such file"));
        }

        let entry = path
            .file_name()
            .and_then(|name| self.engines.get(name))
            .ok_or_else(|| load_failed("not an in-process engine"))?;

        Ok(Box::new(InProcessLibrary {
            path: path.to_path_buf(),
            api: Arc::clone(&entry.api),
            exports: entry.exports.clone(),
        }))
    }
}

struct InProcessLibrary {
    path: PathBuf,
    api: Arc<dyn EngineApi>,
    exports: Vec<String>,
}

impl EngineLibrary for InProcessLibrary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn exports(&self, symbol: &str) -> bool {
        self.exports.iter().any(|s| s == symbol)
    }

    fn bind(self: Box<Self>) -> HostResult<Arc<dyn EngineApi>> {
        Ok(self.api)
    }
}
