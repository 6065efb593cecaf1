//! Engine registry for managing loaded engines.
//!
//! The registry handles engine loading and validation, and owns the ordered
//! collection of [`EngineHandle`]s. Registration order is the order in which
//! engines are initialized, scheduled and unloaded.

use crate::discovery::{self, DiscoveredEngine, SearchPath};
use crate::error::{HostError, HostResult};
use crate::library::{EngineApi, LibraryLoader, NativeLoader};
use pioe_abi::ffi::symbols;
use pioe_abi::{EngineDescriptor, Frame, Status};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A loaded engine.
pub struct EngineHandle {
    pub(crate) descriptor: EngineDescriptor,
    pub(crate) path: PathBuf,
    pub(crate) api: Arc<dyn EngineApi>,

    /// Held by the in-flight frame task, if any.
    pub(crate) lock: Arc<Mutex<()>>,

    /// Last dispatched frame task.
    pub(crate) task: Option<JoinHandle<()>>,

    /// Frame snapshot of the last dispatch.
    pub(crate) frame: Frame,

    pub(crate) unloaded: bool,
}

impl EngineHandle {
    pub fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    pub fn id(&self) -> u32 {
        self.descriptor.id
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn script_suffix(&self) -> &str {
        &self.descriptor.script_suffix
    }

    /// Library the engine was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Frame handed to the most recent frame task.
    pub fn last_frame(&self) -> Frame {
        self.frame
    }

    /// Whether a frame task still holds this engine.
    pub fn is_busy(&self) -> bool {
        self.lock.try_lock().is_err()
    }

    pub fn is_unloaded(&self) -> bool {
        self.unloaded
    }

    /// Call an entry point, mapping a non-zero status to an error.
    pub(crate) fn call(
        &self,
        entry: &'static str,
        f: impl FnOnce(&dyn EngineApi) -> Status,
    ) -> HostResult<()> {
        let status = f(self.api.as_ref());
        if status.is_ok() {
            Ok(())
        } else {
            Err(HostError::Engine {
                engine: self.descriptor.name.clone(),
                entry,
                status: status.code(),
            })
        }
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("descriptor", &self.descriptor)
            .field("path", &self.path)
            .field("frame", &self.frame)
            .field("unloaded", &self.unloaded)
            .finish_non_exhaustive()
    }
}

/// Registry for managing engine plugins.
pub struct EngineRegistry {
    loader: Box<dyn LibraryLoader>,
    search: SearchPath,
    engines: Vec<EngineHandle>,
}

impl EngineRegistry {
    /// Create an empty registry loading native shared libraries.
    pub fn new(search: SearchPath) -> Self {
        Self::with_loader(search, NativeLoader)
    }

    /// Create an empty registry with a custom library loader.
    pub fn with_loader(search: SearchPath, loader: impl LibraryLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            search,
            engines: Vec::new(),
        }
    }

    pub fn search_path(&self) -> &SearchPath {
        &self.search
    }

    /// Load an engine from a library path.
    ///
    /// Loading the same library twice yields two independent handles.
    pub fn load(&mut self, path: impl AsRef<Path>) -> HostResult<&EngineHandle> {
        let index = self.load_at(path.as_ref())?;
        Ok(&self.engines[index])
    }

    /// Load an engine by key or path.
    ///
    /// A key starting with `.` or `/` is loaded as a path. Any other key is
    /// turned into a library file name and looked up along the search path; the
    /// first candidate that loads wins.
    pub fn load_by_name(&mut self, key: &str) -> HostResult<&EngineHandle> {
        if discovery::looks_like_path(key) {
            if !Path::new(key).exists() {
                return Err(HostError::NotFound(format!(
                    "No such file or directory: {}",
                    key
                )));
            }
            return self.load(key);
        }

        let mut loaded = None;
        for candidate in self.search.candidates(key) {
            match self.load_at(&candidate) {
                Ok(index) => {
                    loaded = Some(index);
                    break;
                }
                // A broken engine is not a missing one.
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => debug!("Candidate {:?} not loaded: {}", candidate, e),
            }
        }

        match loaded {
            Some(index) => Ok(&self.engines[index]),
            None => Err(HostError::NotFound(format!(
                "engine {} ({})",
                key,
                self.search.file_name(key)
            ))),
        }
    }

    fn load_at(&mut self, path: &Path) -> HostResult<usize> {
        let library = self.loader.open(path)?;

        for symbol in symbols::REQUIRED {
            if !library.exports(symbol) {
                return Err(HostError::MissingSymbol {
                    path: path.to_path_buf(),
                    symbol: symbol.to_string(),
                });
            }
        }

        debug!("Loading engine from {:?}", path);
        let api = library.bind()?;

        let mut descriptor = EngineDescriptor::default();
        let status = api.load(&mut descriptor);
        if !status.is_ok() {
            return Err(HostError::LoadFailed {
                path: path.to_path_buf(),
                reason: format!("engine_load failed with status {}", status),
            });
        }
        descriptor.id = self.engines.len() as u32;

        info!(
            "Engine {} ({}) loaded. Script language: {}, Script suffix: {}",
            descriptor.name,
            descriptor.version,
            descriptor.script_language,
            descriptor.script_suffix
        );

        self.engines.push(EngineHandle {
            descriptor,
            path: path.to_path_buf(),
            api,
            lock: Arc::new(Mutex::new(())),
            task: None,
            frame: Frame::default(),
            unloaded: false,
        });
        Ok(self.engines.len() - 1)
    }

    /// List engine libraries on the search path without loading them.
    pub fn find_engines(&self) -> Vec<DiscoveredEngine> {
        discovery::find_engines(&self.search)
    }

    /// Stop and unload the engine at `index`.
    ///
    /// The handle stays in the registry, marked unloaded; its library is
    /// released once the registry is dropped and no frame task still
    /// references it.
    pub fn unload(&mut self, index: usize) -> HostResult<()> {
        let handle = self
            .engines
            .get_mut(index)
            .ok_or_else(|| HostError::NotFound(format!("engine #{}", index)))?;

        if handle.unloaded {
            return Ok(());
        }

        debug!(engine = %handle.descriptor.name, "Unloading engine");
        handle.unloaded = true;

        // Both hooks run even if stop fails.
        let stopped = handle.call("engine_stop", |api| api.stop());
        let unloaded = handle.call("engine_unload", |api| api.unload());
        if let Err(e) = &stopped {
            warn!("{}", e);
        }
        stopped.and(unloaded)
    }

    /// First engine whose script suffix equals `suffix`.
    pub fn find_by_suffix(&self, suffix: &str) -> Option<&EngineHandle> {
        if suffix.is_empty() {
            return None;
        }
        self.engines
            .iter()
            .find(|e| !e.unloaded && e.descriptor.script_suffix == suffix)
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// Engines in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &EngineHandle> {
        self.engines.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut EngineHandle> {
        self.engines.iter_mut()
    }

    pub fn get(&self, index: usize) -> Option<&EngineHandle> {
        self.engines.get(index)
    }
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("search", &self.search)
            .field("engines", &self.engines)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::InProcessLoader;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Default)]
    struct Stub {
        suffix: &'static str,
        fail_load: bool,
        stops: AtomicUsize,
        unloads: AtomicUsize,
    }

    impl EngineApi for Stub {
        fn load(&self, descriptor: &mut EngineDescriptor) -> Status {
            if self.fail_load {
                return Status(2);
            }
            *descriptor = EngineDescriptor::new("Stub", "1.0", "stub", self.suffix);
            descriptor.id = 99;
            Status::OK
        }
        fn unload(&self) -> Status {
            self.unloads.fetch_add(1, Ordering::SeqCst);
            Status::OK
        }
        fn init(&self) -> Status {
            Status::OK
        }
        fn frame(&self, _frame: Frame) -> Status {
            Status::OK
        }
        fn start(&self) -> Status {
            Status::OK
        }
        fn stop(&self) -> Status {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Status::FAILED
        }
        fn load_script(&self, _source: &str) -> Status {
            Status::OK
        }
        fn execute_code(&self, _code: &str) -> Status {
            Status::OK
        }
    }

    fn setup(stub: Arc<Stub>) -> (TempDir, EngineRegistry, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let search = SearchPath::with_directories([temp_dir.path()]);
        let file_name = search.file_name("stub");
        let path = temp_dir.path().join(&file_name);
        std::fs::write(&path, b"").unwrap();

        let mut loader = InProcessLoader::new();
        loader.register(file_name, stub);
        (temp_dir, EngineRegistry::with_loader(search, loader), path)
    }

    #[test]
    fn test_ids_follow_load_order() {
        let stub = Arc::new(Stub {
            suffix: "pr",
            ..Default::default()
        });
        let (_temp_dir, mut registry, path) = setup(stub);

        assert_eq!(registry.load(&path).unwrap().id(), 0);
        assert_eq!(registry.load(&path).unwrap().id(), 1);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.find_by_suffix("pr").unwrap().id(), 0);
    }

    #[test]
    fn test_failed_load_hook_registers_nothing() {
        let stub = Arc::new(Stub {
            fail_load: true,
            ..Default::default()
        });
        let (_temp_dir, mut registry, path) = setup(stub);

        let err = registry.load(&path).unwrap_err();
        assert!(matches!(err, HostError::LoadFailed { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unload_calls_stop_then_unload_once() {
        let stub = Arc::new(Stub {
            suffix: "pr",
            ..Default::default()
        });
        let (_temp_dir, mut registry, path) = setup(Arc::clone(&stub));
        registry.load(&path).unwrap();

        // stop fails but unload still runs
        assert!(registry.unload(0).is_err());
        assert_eq!(stub.stops.load(Ordering::SeqCst), 1);
        assert_eq!(stub.unloads.load(Ordering::SeqCst), 1);

        assert!(registry.get(0).unwrap().is_unloaded());
        assert!(registry.find_by_suffix("pr").is_none());

        registry.unload(0).unwrap();
        assert_eq!(stub.unloads.load(Ordering::SeqCst), 1);
        assert!(registry.unload(5).is_err());
    }

    #[test]
    fn test_empty_suffix_never_matches() {
        let stub = Arc::new(Stub::default());
        let (_temp_dir, mut registry, path) = setup(stub);
        registry.load(&path).unwrap();

        assert!(registry.find_by_suffix("").is_none());
    }
}
