//! The reload supervisor
//!
//! [`Supervisor`] owns the lifecycle state machine:
//!
//! ```text
//! init ──first tick──▶ normal ◀──successful swap── error
//!                        │                           ▲
//!                        └──failed swap / dispatch───┘
//! ```
//!
//! The host calls [`Supervisor::tick`] once per frame and routes every
//! callback through [`Supervisor::dispatch`]. In the error state real
//! application code is frozen: only the overlay animates and draws, and
//! the quit key still works. Saving a fix to the file that failed brings
//! the application back.

mod config;

pub use config::SupervisorConfig;

use crate::dispatch::{Bindings, EntryPoint, ProtectedDispatcher};
use crate::error::Result;
use crate::fs::{FileSystem, OsFileSystem};
use crate::hmr::{HotSwapper, ModuleVersion, PostSwapHook, PreSwapHook, SwapContext, SwapOutcome, SwapReport};
use crate::host::{Clock, Host, NullHost, SystemClock};
use crate::loader::{module_not_found, ModuleId, ModuleLoader, ModuleRegistry, ScriptLoader};
use crate::overlay::{ErrorOverlay, ErrorReport};
use crate::runtime::{Interpreter, Value};
use crate::scanner::{ChangeScanner, FileRegistry};
use std::cell::RefCell;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Constructed, wrappers not yet installed
    Init,
    /// Application code runs behind the protected dispatcher
    Normal,
    /// Frozen on a failure until the failing file reloads cleanly
    Error,
}

impl SupervisorState {
    fn can_transition_to(self, next: SupervisorState) -> bool {
        use SupervisorState::*;
        matches!(
            (self, next),
            (Init, Normal) | (Init, Error) | (Normal, Error) | (Error, Normal) | (Error, Error)
        )
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorState::Init => write!(f, "init"),
            SupervisorState::Normal => write!(f, "normal"),
            SupervisorState::Error => write!(f, "error"),
        }
    }
}

/// Wires collaborators into a [`Supervisor`]
pub struct SupervisorBuilder {
    config: SupervisorConfig,
    fs: Option<Box<dyn FileSystem>>,
    clock: Option<Box<dyn Clock>>,
    loader: Option<Box<dyn ModuleLoader>>,
    host: Option<Box<dyn Host>>,
    pre_swap: Option<PreSwapHook>,
    post_swap: Option<PostSwapHook>,
}

impl SupervisorBuilder {
    pub fn file_system(mut self, fs: impl FileSystem + 'static) -> Self {
        self.fs = Some(Box::new(fs));
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Box::new(clock));
        self
    }

    pub fn loader(mut self, loader: impl ModuleLoader + 'static) -> Self {
        self.loader = Some(Box::new(loader));
        self
    }

    pub fn host(mut self, host: impl Host + 'static) -> Self {
        self.host = Some(Box::new(host));
        self
    }

    /// Hook run before each swap; return `true` to skip the swap
    pub fn pre_swap<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&Path) -> bool + 'static,
    {
        self.pre_swap = Some(Box::new(hook));
        self
    }

    /// Hook run after each successful swap
    pub fn post_swap<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&Path) + 'static,
    {
        self.post_swap = Some(Box::new(hook));
        self
    }

    /// Validate the configuration, record every existing module file and
    /// load the entry module if it exists
    pub fn build(self) -> Result<Supervisor> {
        self.config.validate()?;

        let fs = self.fs.unwrap_or_else(|| Box::new(OsFileSystem));
        let clock = self.clock.unwrap_or_else(|| Box::new(SystemClock::new()));
        let loader = self.loader.unwrap_or_else(|| Box::new(ScriptLoader::new()));
        let host = self.host.unwrap_or_else(|| Box::new(NullHost));

        let mut swapper = HotSwapper::new(loader);
        swapper.set_pre_swap(self.pre_swap);
        swapper.set_post_swap(self.post_swap);

        let config = self.config;
        let scanner = ChangeScanner::new(config.watch_path.clone(), config.normalized_extension());
        let dispatcher = ProtectedDispatcher::new(config.entry_points.iter().copied());
        let overlay = ErrorOverlay::new(config.quit_key.clone());
        let last_scan = clock.now();

        let mut supervisor = Supervisor {
            config,
            state: SupervisorState::Init,
            fs,
            clock,
            host,
            scanner,
            files: FileRegistry::new(),
            modules: ModuleRegistry::new(),
            swapper,
            interpreter: Interpreter::new(),
            bindings: Bindings::new(),
            dispatcher,
            overlay,
            last_scan,
            last_error: None,
            error_report: None,
            quit_requested: false,
        };

        for path in supervisor.scanner.module_files(&*supervisor.fs) {
            supervisor.files.reset(&path, &*supervisor.fs);
        }

        if let Some(name) = supervisor.config.entry_module.clone() {
            let id = ModuleId::new(name.as_str());
            let path = id.to_path(supervisor.scanner.root(), supervisor.scanner.extension());
            if supervisor.fs.modified(&path).is_some() {
                supervisor.require(&name)?;
                supervisor.rebind_entry_points();
            } else {
                tracing::debug!(module = %id, "entry module not present yet");
            }
        }

        tracing::info!(
            root = %supervisor.scanner.root().display(),
            files = supervisor.files.len(),
            protected = supervisor.config.protected_mode,
            "supervisor ready"
        );
        Ok(supervisor)
    }
}

/// Live reload and crash recovery for one watch root
pub struct Supervisor {
    config: SupervisorConfig,
    state: SupervisorState,
    fs: Box<dyn FileSystem>,
    clock: Box<dyn Clock>,
    host: Box<dyn Host>,
    scanner: ChangeScanner,
    files: FileRegistry,
    modules: ModuleRegistry,
    swapper: HotSwapper,
    interpreter: Interpreter,
    bindings: Bindings,
    dispatcher: ProtectedDispatcher,
    overlay: ErrorOverlay,
    last_scan: Duration,
    /// File whose reload failed last, with the report it produced
    last_error: Option<(PathBuf, ErrorReport)>,
    error_report: Option<ErrorReport>,
    quit_requested: bool,
}

impl Supervisor {
    pub fn builder(config: SupervisorConfig) -> SupervisorBuilder {
        SupervisorBuilder {
            config,
            fs: None,
            clock: None,
            loader: None,
            host: None,
            pre_swap: None,
            post_swap: None,
        }
    }

    /// Supervisor over the real file system with default collaborators
    pub fn new(config: SupervisorConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Per-frame entry: leave init on the first call, then scan whenever
    /// the scan interval has elapsed
    pub fn tick(&mut self) -> Vec<SwapReport> {
        if self.state == SupervisorState::Init {
            self.exit_init();
        }

        let now = self.clock.now();
        if now.saturating_sub(self.last_scan) < self.config.scan_interval() {
            return Vec::new();
        }
        self.last_scan = now;
        self.scan()
    }

    /// Tick a supervisor shared through a `RefCell`; a nested call made
    /// while a tick is already running returns `None`
    pub fn tick_shared(supervisor: &RefCell<Supervisor>) -> Option<Vec<SwapReport>> {
        match supervisor.try_borrow_mut() {
            Ok(mut supervisor) => Some(supervisor.tick()),
            Err(_) => {
                tracing::trace!("nested tick ignored");
                None
            }
        }
    }

    /// Swap every changed file
    ///
    /// When any file changed and a previous reload failed, the failed
    /// file is retried first even if it did not change itself.
    pub fn scan(&mut self) -> Vec<SwapReport> {
        let changed = self.scanner.scan(&*self.fs, &self.files);
        if changed.is_empty() {
            return Vec::new();
        }

        let mut reports = Vec::with_capacity(changed.len() + 1);
        let retried = self.last_error.take();
        if let Some((path, report)) = &retried {
            tracing::info!(path = %path.display(), "retrying last failed file");
            let swap = self.hotswap_file(path);
            if swap.is_aborted() && self.last_error.is_none() {
                self.last_error = Some((path.clone(), report.clone()));
            }
            reports.push(swap);
        }

        let retried = retried.map(|(path, _)| path);
        for path in changed {
            if retried.as_ref() == Some(&path) {
                continue;
            }
            reports.push(self.hotswap_file(&path));
        }

        // swaps of other files leave the error state on their way in;
        // an unresolved failure puts it back
        if self.state != SupervisorState::Error {
            if let Some(report) = self.last_error.as_ref().map(|(_, r)| r.clone()) {
                self.enter_error(report);
            }
        }

        reports
    }

    /// Reload one file and merge it into its active module
    pub fn hotswap_file(&mut self, path: &Path) -> SwapReport {
        if self.state == SupervisorState::Error {
            self.exit_error();
        }

        let report = self.swapper.swap(
            path,
            SwapContext {
                root: self.scanner.root(),
                fs: &*self.fs,
                modules: &mut self.modules,
                files: &mut self.files,
            },
        );

        match &report.outcome {
            SwapOutcome::Swapped => {
                if self.last_error.as_ref().is_some_and(|(p, _)| p == path) {
                    self.last_error = None;
                }
                self.rebind_entry_points();
                if self.config.protected_mode {
                    self.dispatcher.sync(&self.bindings);
                }
            }
            SwapOutcome::Failed(err) => {
                if self.config.protected_mode && !self.config.quiet_mode {
                    let error_report = ErrorReport::load(path, err);
                    self.last_error = Some((path.to_path_buf(), error_report.clone()));
                    self.enter_error(error_report);
                } else {
                    tracing::warn!(
                        path = %path.display(),
                        error = %err,
                        "keeping the previous module"
                    );
                }
            }
            SwapOutcome::Aborted => {}
        }

        report
    }

    /// Record the file's current modification time without swapping it
    pub fn reset_file(&mut self, path: &Path) {
        self.files.reset(path, &*self.fs);
    }

    /// Call an entry point the way the current state allows
    ///
    /// In unprotected mode, and for entry points that are not wrapped,
    /// errors are returned to the caller.
    pub fn dispatch(&mut self, entry: EntryPoint, args: &[Value]) -> Result<Value> {
        match self.state {
            SupervisorState::Init => self.call_binding(entry, args),
            SupervisorState::Normal => {
                if !self.config.protected_mode || !self.dispatcher.is_wrapped(entry) {
                    return self.call_binding(entry, args);
                }
                match self.dispatcher.call(&self.interpreter, entry, args) {
                    Ok(value) => Ok(value),
                    Err(err) => {
                        self.enter_error(ErrorReport::dispatch(entry, &err));
                        Ok(Value::Nil)
                    }
                }
            }
            SupervisorState::Error => {
                self.dispatch_in_error(entry, args);
                Ok(Value::Nil)
            }
        }
    }

    /// Load a module by name on first use, or return its active generation
    pub fn require(&mut self, name: &str) -> Result<Value> {
        let id = ModuleId::new(name);
        if let Some(module) = self.modules.get(&id) {
            return Ok(module.clone());
        }

        let path = id.to_path(self.scanner.root(), self.scanner.extension());
        if self.fs.modified(&path).is_none() {
            return Err(module_not_found(&id, &path));
        }
        let module = self.swapper.loader().load(&id, &path, &*self.fs)?;
        self.modules.insert(id.clone(), module.clone());
        self.swapper.mark_loaded(&id);
        self.files.reset(&path, &*self.fs);
        tracing::debug!(module = %id, "required module");
        Ok(module)
    }

    /// Replace one entry point's real implementation
    pub fn set_binding(&mut self, entry: EntryPoint, target: Value) {
        self.bindings.set(entry, target);
        if self.dispatcher.is_installed() {
            self.dispatcher.sync(&self.bindings);
        }
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn last_error_file(&self) -> Option<&Path> {
        self.last_error.as_ref().map(|(path, _)| path.as_path())
    }

    /// The failure currently shown, while in the error state
    pub fn error_report(&self) -> Option<&ErrorReport> {
        self.error_report.as_ref()
    }

    pub fn overlay(&self) -> &ErrorOverlay {
        &self.overlay
    }

    /// Whether the quit key was pressed in the error state
    pub fn quit_requested(&self) -> bool {
        self.quit_requested
    }

    /// The active generation of a loaded module
    pub fn module(&self, name: &str) -> Option<Value> {
        self.modules.get(&ModuleId::new(name)).cloned()
    }

    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    pub fn module_version(&self, name: &str) -> Option<ModuleVersion> {
        self.swapper.version(&ModuleId::new(name))
    }

    pub fn files(&self) -> &FileRegistry {
        &self.files
    }

    /// Interpreter for calling module functions outside dispatch
    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    fn transition(&mut self, next: SupervisorState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::warn!(from = %self.state, to = %next, "ignored invalid state transition");
            return false;
        }
        tracing::debug!(from = %self.state, to = %next, "state transition");
        self.state = next;
        true
    }

    fn exit_init(&mut self) {
        if !self.transition(SupervisorState::Normal) {
            return;
        }
        if self.config.protected_mode {
            self.dispatcher.install(&self.bindings);
        }
    }

    fn enter_error(&mut self, report: ErrorReport) {
        if !self.transition(SupervisorState::Error) {
            return;
        }
        tracing::error!(kind = %report.kind, "{}", report);
        self.host.release_input_capture();
        self.overlay.show(report.clone());
        self.error_report = Some(report);
    }

    fn exit_error(&mut self) {
        if !self.transition(SupervisorState::Normal) {
            return;
        }
        tracing::info!("leaving error state");
        self.overlay.clear();
        self.error_report = None;
        if self.config.protected_mode && !self.dispatcher.install(&self.bindings) {
            self.dispatcher.sync(&self.bindings);
        }
    }

    fn call_binding(&self, entry: EntryPoint, args: &[Value]) -> Result<Value> {
        match self.bindings.get(entry) {
            Some(target) => self.interpreter.call(target, args),
            None => Ok(Value::Nil),
        }
    }

    fn dispatch_in_error(&mut self, entry: EntryPoint, args: &[Value]) {
        match entry {
            EntryPoint::Update => {
                let dt = args.first().and_then(Value::as_number).unwrap_or(0.0);
                self.overlay.update(dt);
            }
            EntryPoint::Draw => {
                if let Some(canvas) = self.host.canvas() {
                    self.overlay.draw(canvas);
                }
            }
            EntryPoint::KeyPressed => {
                let key = args.first().and_then(Value::as_str);
                if key == Some(self.config.quit_key.as_str()) {
                    tracing::info!("quit requested from error state");
                    self.quit_requested = true;
                    self.host.quit();
                }
            }
            _ => {}
        }
    }

    fn rebind_entry_points(&mut self) {
        let Some(name) = &self.config.entry_module else {
            return;
        };
        if let Some(module) = self.modules.get(&ModuleId::new(name.as_str())) {
            let bound = self.bindings.bind_from_module(module);
            tracing::trace!(bound, "bound entry points");
        }
    }
}
