//! Host lifecycle.
//!
//! A [`Host`] coordinates every registered engine as one logical unit:
//!
//! ```text
//! STOPPED --run()--> RUNNING --quit() / request_stop()--> STOPPED
//! ```
//!
//! `init()` prepares the engines while STOPPED. `run()` drives the frame
//! loop until the state leaves RUNNING; it never drains in-flight frames
//! itself. `quit()` cancels outstanding frame tasks and unloads every engine.
//!
//! A stop requested after `init()` is kept until the next `init()`: a `run()`
//! started after it returns at once instead of entering RUNNING.
//!
//! # Example
//!
//! ```no_run
//! use pioe_runtime::{Host, HostOptions};
//!
//! # async fn example() -> pioe_runtime::HostResult<()> {
//! let mut host = Host::new(HostOptions::default());
//! host.load_engine("ruby")?;
//! host.init()?;
//! host.load_script("main.rb")?;
//!
//! // Returns once Ctrl+C or a ShutdownHandle stops the host
//! host.run().await?;
//! host.quit()?;
//! # Ok(())
//! # }
//! ```

use crate::discovery::{DiscoveredEngine, SearchPath};
use crate::error::{HostError, HostResult};
use crate::frame::FrameClock;
use crate::library::{EngineApi, LibraryLoader};
use crate::registry::EngineRegistry;
use crate::scheduler::{self, Dispatch};
use pioe_abi::{
    ClassId, EngineDescriptor, Frame, MethodCallback, ObjectRef, PluginId, PluginRegistry, Status,
};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Default scheduler tick resolution.
pub const DEFAULT_FRAME_RESOLUTION: Duration = Duration::from_millis(10);

/// Runtime configuration of a [`Host`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostOptions {
    /// Sleep between two ticks.
    pub frame_resolution: Duration,

    /// Where engine libraries are looked up.
    pub search: SearchPath,

    /// Whether `init()` installs a Ctrl+C handler requesting shutdown.
    pub handle_interrupts: bool,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            frame_resolution: DEFAULT_FRAME_RESOLUTION,
            search: SearchPath::default(),
            handle_interrupts: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Running,
}

/// Requests a running [`Host`] to stop from anywhere.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    state: Arc<watch::Sender<LifecycleState>>,
    stop_requested: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Leave RUNNING; the frame loop exits after the current tick. Before
    /// `run()` starts, the request makes it return immediately.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.state.send_replace(LifecycleState::Stopped);
    }

    /// Whether a stop was requested since the last `init()`.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }
}

/// The engine host.
pub struct Host {
    options: HostOptions,
    engines: EngineRegistry,
    plugins: PluginRegistry,
    clock: FrameClock,
    state: Arc<watch::Sender<LifecycleState>>,
    stop_requested: Arc<AtomicBool>,
    interrupt: Option<JoinHandle<()>>,
}

impl Host {
    /// Create a host loading native engine libraries.
    pub fn new(options: HostOptions) -> Self {
        let engines = EngineRegistry::new(options.search.clone());
        Self::with_registry(options, engines)
    }

    /// Create a host with a custom library loader.
    pub fn with_loader(options: HostOptions, loader: impl LibraryLoader + 'static) -> Self {
        let engines = EngineRegistry::with_loader(options.search.clone(), loader);
        Self::with_registry(options, engines)
    }

    fn with_registry(options: HostOptions, engines: EngineRegistry) -> Self {
        let (state, _) = watch::channel(LifecycleState::Stopped);
        Self {
            options,
            engines,
            plugins: PluginRegistry::new(),
            clock: FrameClock::new(),
            state: Arc::new(state),
            stop_requested: Arc::new(AtomicBool::new(false)),
            interrupt: None,
        }
    }

    pub fn options(&self) -> &HostOptions {
        &self.options
    }

    pub fn engines(&self) -> &EngineRegistry {
        &self.engines
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            state: Arc::clone(&self.state),
            stop_requested: Arc::clone(&self.stop_requested),
        }
    }

    pub fn current_frame(&self) -> Frame {
        self.clock.current()
    }

    // ========================================================================
    // Engines
    // ========================================================================

    /// Load an engine from a library path.
    pub fn load_engine_path(&mut self, path: impl AsRef<Path>) -> HostResult<&EngineDescriptor> {
        Ok(self.engines.load(path)?.descriptor())
    }

    /// Load an engine by key (`ruby` resolves to `libpioerubyengine.so`) or path.
    pub fn load_engine(&mut self, key: &str) -> HostResult<&EngineDescriptor> {
        Ok(self.engines.load_by_name(key)?.descriptor())
    }

    pub fn find_engines(&self) -> Vec<DiscoveredEngine> {
        self.engines.find_engines()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Initialize every registered engine, in registration order.
    ///
    /// An engine failing to initialize does not stop the remaining engines
    /// from being initialized; all failures are returned together.
    pub fn init(&mut self) -> HostResult<()> {
        self.require_engine()?;

        if self.options.handle_interrupts && self.interrupt.is_none() {
            self.install_interrupt_handler();
        }
        self.clock.reset();
        self.stop_requested.store(false, Ordering::SeqCst);

        self.fan_out("engine_init", |api| api.init())
    }

    /// Call every engine's start entry point.
    pub fn start_engines(&mut self) -> HostResult<()> {
        self.require_engine()?;
        self.fan_out("engine_start", |api| api.start())
    }

    /// Call every engine's stop entry point.
    pub fn stop_engines(&mut self) -> HostResult<()> {
        self.require_engine()?;
        self.fan_out("engine_stop", |api| api.stop())
    }

    fn fan_out<F>(&self, entry: &'static str, f: F) -> HostResult<()>
    where
        F: Fn(&dyn EngineApi) -> Status,
    {
        let failures: Vec<HostError> = self
            .engines
            .iter()
            .filter(|handle| !handle.is_unloaded())
            .filter_map(|handle| handle.call(entry, &f).err())
            .collect();

        for failure in &failures {
            error!("{}", failure);
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(HostError::FanOut { entry, failures })
        }
    }

    fn install_interrupt_handler(&mut self) {
        let Ok(runtime) = Handle::try_current() else {
            warn!("No async runtime; interrupts will not stop the host");
            return;
        };

        let shutdown = self.shutdown_handle();
        self.interrupt = Some(runtime.spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Failed to listen for interrupts: {}", e);
                    return;
                }
                info!("Interrupt received, stopping");
                shutdown.request_stop();
            }
        }));
    }

    /// Drive the frame loop until the host leaves RUNNING.
    pub async fn run(&mut self) -> HostResult<()> {
        self.require_engine()?;

        let mut state = self.state.subscribe();
        // Checked under the channel lock, so a concurrent request_stop either
        // is seen here or lands after RUNNING and ends the loop.
        let stop_requested = &self.stop_requested;
        let started = self.state.send_if_modified(|current| {
            if stop_requested.load(Ordering::SeqCst) {
                return false;
            }
            *current = LifecycleState::Running;
            true
        });
        if !started {
            info!("Stop requested before the frame loop started");
            return Ok(());
        }
        state.borrow_and_update();

        info!(
            engines = self.engines.len(),
            resolution_ms = self.options.frame_resolution.as_millis() as u64,
            "Entering frame loop"
        );

        while *state.borrow() == LifecycleState::Running {
            if let Err(e) = self.tick().await {
                self.state.send_replace(LifecycleState::Stopped);
                return Err(e);
            }

            tokio::select! {
                _ = tokio::time::sleep(self.options.frame_resolution) => {}
                changed = state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            self.clock.advance();
        }

        info!(frame = self.clock.current().id, "Frame loop stopped");
        Ok(())
    }

    /// Dispatch the current frame once, without advancing the clock.
    pub async fn tick(&mut self) -> HostResult<Vec<Dispatch>> {
        scheduler::tick(&mut self.engines, self.clock.current()).await
    }

    /// Wait for every in-flight frame task.
    pub async fn settle(&mut self) {
        scheduler::settle(&mut self.engines).await
    }

    /// Stop the host: cancel frame tasks and unload every engine.
    pub fn quit(&mut self) -> HostResult<()> {
        self.shutdown_handle().request_stop();

        if let Some(interrupt) = self.interrupt.take() {
            interrupt.abort();
        }

        let cancelled = scheduler::cancel(&mut self.engines);
        if cancelled > 0 {
            debug!("Cancelled {} frame task(s)", cancelled);
        }

        let mut result = Ok(());
        for index in 0..self.engines.len() {
            if let Err(e) = self.engines.unload(index) {
                warn!("{}", e);
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        info!("Host stopped");
        result
    }

    // ========================================================================
    // Scripts
    // ========================================================================

    /// Hand a script file to the engine owning its suffix.
    pub fn load_script(&self, path: impl AsRef<Path>) -> HostResult<()> {
        self.require_engine()?;
        let path = path.as_ref();

        if !path.exists() {
            return Err(HostError::NotFound(format!(
                "No such file or directory: {}",
                path.display()
            )));
        }

        let suffix = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        let handle = self.engines.find_by_suffix(suffix).ok_or_else(|| {
            HostError::NotFound(format!("no engine for {}", path.display()))
        })?;

        let source = read_script(path)?;
        debug!(engine = %handle.name(), "Loading script {:?}", path);
        handle.call("engine_load_script", |api| api.load_script(&source))
    }

    /// Run a code string in the engine owning `suffix`.
    pub fn execute_code(&self, suffix: &str, code: &str) -> HostResult<()> {
        self.require_engine()?;
        let handle = self
            .engines
            .find_by_suffix(suffix)
            .ok_or_else(|| HostError::NotFound(format!("no engine for .{} code", suffix)))?;
        handle.call("engine_execute_code", |api| api.execute_code(code))
    }

    // ========================================================================
    // Plugins
    // ========================================================================

    pub fn register_plugin(&mut self, name: &str, version: &str) -> HostResult<PluginId> {
        Ok(self.plugins.register_plugin(name, version)?)
    }

    /// Define a class. Needs at least one loaded engine to relay it to.
    pub fn define_class(
        &mut self,
        plugin: PluginId,
        name: &str,
        parent: Option<ClassId>,
    ) -> HostResult<ClassId> {
        self.require_engine()?;
        Ok(self.plugins.define_class(plugin, name, parent)?)
    }

    pub fn define_class_method(
        &mut self,
        class: ClassId,
        name: &str,
        arity: usize,
        callback: MethodCallback,
    ) -> HostResult<()> {
        self.require_engine()?;
        self.plugins
            .define_class_method(class, name, arity, callback)?;
        Ok(())
    }

    pub fn define_instance_method(
        &mut self,
        class: ClassId,
        name: &str,
        arity: usize,
        callback: MethodCallback,
    ) -> HostResult<()> {
        self.require_engine()?;
        self.plugins
            .define_instance_method(class, name, arity, callback)?;
        Ok(())
    }

    /// Record an instance created by an engine for `class`.
    pub fn add_instance(&mut self, class: ClassId, object: ObjectRef) -> HostResult<()> {
        Ok(self.plugins.add_instance(class, object)?)
    }

    fn require_engine(&self) -> HostResult<()> {
        if self.engines.is_empty() {
            Err(HostError::NoEngineAvailable)
        } else {
            Ok(())
        }
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        if let Some(interrupt) = self.interrupt.take() {
            interrupt.abort();
        }
    }
}

/// Read a whole script, reporting allocation failure instead of aborting.
fn read_script(path: &Path) -> HostResult<String> {
    let mut file = File::open(path)?;
    let len = usize::try_from(file.metadata()?.len()).unwrap_or(usize::MAX);

    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|e| HostError::OutOfMemory(format!("{}: {}", path.display(), e)))?;
    file.read_to_end(&mut buf)?;

    String::from_utf8(buf)
        .map_err(|e| HostError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_host_refuses_work() {
        let host_options = HostOptions {
            handle_interrupts: false,
            ..Default::default()
        };
        let mut host = Host::new(host_options);

        assert!(matches!(host.init(), Err(HostError::NoEngineAvailable)));
        assert!(matches!(
            host.load_script("main.rb"),
            Err(HostError::NoEngineAvailable)
        ));

        let plugin = host.register_plugin("math", "1.0").unwrap();
        assert!(matches!(
            host.define_class(plugin, "Math", None),
            Err(HostError::NoEngineAvailable)
        ));
        assert_eq!(host.state(), LifecycleState::Stopped);
    }

    #[test]
    fn test_read_script() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("main.rb");
        std::fs::write(&path, "puts 'hi'\n").unwrap();

        assert_eq!(read_script(&path).unwrap(), "puts 'hi'\n");

        std::fs::write(&path, [0xff, 0xfe]).unwrap();
        assert!(matches!(read_script(&path), Err(HostError::Io(_))));
    }

    #[test]
    fn test_shutdown_handle() {
        let host = Host::new(HostOptions::default());
        let shutdown = host.shutdown_handle();

        host.state.send_replace(LifecycleState::Running);
        assert_eq!(shutdown.state(), LifecycleState::Running);

        shutdown.request_stop();
        assert_eq!(host.state(), LifecycleState::Stopped);
        assert!(shutdown.is_stop_requested());
        assert!(host.shutdown_handle().is_stop_requested());
    }
}
