//! Hot module swapping
//!
//! One swap reloads one file: the pre-swap hook may veto it, the module
//! is loaded fresh, and the new value graph is merged into the active
//! generation so live references keep working under the new code. A
//! failed load never reaches the merge, leaving the active generation
//! untouched.

use crate::error::Error;
use crate::fs::FileSystem;
use crate::loader::{ModuleId, ModuleLoader, ModuleRegistry};
use crate::merge::{merge_values, MergeStats};
use crate::scanner::FileRegistry;
use rustc_hash::FxHashMap as HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Called before a swap; returning `true` aborts it
pub type PreSwapHook = Box<dyn FnMut(&Path) -> bool>;

/// Called after a successful swap
pub type PostSwapHook = Box<dyn FnMut(&Path)>;

/// Number of times a module has been loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ModuleVersion(pub u64);

impl ModuleVersion {
    pub fn new() -> Self {
        Self(1)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl Default for ModuleVersion {
    fn default() -> Self {
        Self::new()
    }
}

/// How a swap ended
#[derive(Debug)]
pub enum SwapOutcome {
    /// The module was reloaded and merged
    Swapped,
    /// The pre-swap hook vetoed the swap
    Aborted,
    /// Loading failed; the active generation is unchanged
    Failed(Error),
}

/// Result of one swap attempt
#[derive(Debug)]
pub struct SwapReport {
    pub path: PathBuf,
    pub module: ModuleId,
    pub outcome: SwapOutcome,
    /// Time spent loading and merging
    pub elapsed: Duration,
    /// Merge counters; `None` when nothing was merged
    pub stats: Option<MergeStats>,
    /// Version now active, on success
    pub version: Option<ModuleVersion>,
}

impl SwapReport {
    pub fn is_swapped(&self) -> bool {
        matches!(self.outcome, SwapOutcome::Swapped)
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.outcome, SwapOutcome::Aborted)
    }

    pub fn error(&self) -> Option<&Error> {
        match &self.outcome {
            SwapOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for SwapReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            SwapOutcome::Swapped => write!(
                f,
                "swapped {} ({}) in {:.3}ms",
                self.module,
                self.path.display(),
                self.elapsed.as_secs_f64() * 1000.0
            ),
            SwapOutcome::Aborted => write!(f, "aborted swap of {}", self.path.display()),
            SwapOutcome::Failed(e) => write!(f, "failed to swap {}: {}", self.path.display(), e),
        }
    }
}

/// State a swap reads and updates, borrowed from the supervisor
pub struct SwapContext<'a> {
    pub root: &'a Path,
    pub fs: &'a dyn FileSystem,
    pub modules: &'a mut ModuleRegistry,
    pub files: &'a mut FileRegistry,
}

/// Reloads files and merges them into the active generation
pub struct HotSwapper {
    loader: Box<dyn ModuleLoader>,
    pre_swap: Option<PreSwapHook>,
    post_swap: Option<PostSwapHook>,
    versions: HashMap<ModuleId, ModuleVersion>,
}

impl HotSwapper {
    pub fn new(loader: Box<dyn ModuleLoader>) -> Self {
        Self {
            loader,
            pre_swap: None,
            post_swap: None,
            versions: HashMap::default(),
        }
    }

    pub fn set_pre_swap(&mut self, hook: Option<PreSwapHook>) {
        self.pre_swap = hook;
    }

    pub fn set_post_swap(&mut self, hook: Option<PostSwapHook>) {
        self.post_swap = hook;
    }

    pub fn loader(&self) -> &dyn ModuleLoader {
        self.loader.as_ref()
    }

    pub fn version(&self, id: &ModuleId) -> Option<ModuleVersion> {
        self.versions.get(id).copied()
    }

    /// Record a load that happened outside a swap
    pub fn mark_loaded(&mut self, id: &ModuleId) {
        self.versions.entry(id.clone()).or_default();
    }

    /// Reload `path` and merge it into its active generation
    ///
    /// The file record is reset whatever the outcome so an unchanged
    /// broken file is not retried every scan.
    pub fn swap(&mut self, path: &Path, ctx: SwapContext<'_>) -> SwapReport {
        let module = ModuleId::from_path(ctx.root, path);

        if let Some(hook) = self.pre_swap.as_mut() {
            if hook(path) {
                tracing::info!(path = %path.display(), "swap aborted by pre-swap hook");
                ctx.files.reset(path, ctx.fs);
                return SwapReport {
                    path: path.to_path_buf(),
                    module,
                    outcome: SwapOutcome::Aborted,
                    elapsed: Duration::ZERO,
                    stats: None,
                    version: None,
                };
            }
        }

        tracing::debug!(module = %module, path = %path.display(), "swapping");
        let start = Instant::now();
        let loaded = self.loader.load(&module, path, ctx.fs);
        let mut stats = None;
        let outcome = match loaded {
            Ok(new) => {
                stats = ctx
                    .modules
                    .get(&module)
                    .and_then(|old| merge_values(old, &new));
                if stats.is_none() {
                    ctx.modules.insert(module.clone(), new);
                }
                SwapOutcome::Swapped
            }
            Err(e) => SwapOutcome::Failed(e),
        };
        let elapsed = start.elapsed();

        ctx.files.reset(path, ctx.fs);

        let version = match &outcome {
            SwapOutcome::Swapped => {
                let version = match self.versions.get(&module) {
                    Some(v) => v.next(),
                    None => ModuleVersion::new(),
                };
                self.versions.insert(module.clone(), version);
                Some(version)
            }
            _ => None,
        };

        let report = SwapReport {
            path: path.to_path_buf(),
            module,
            outcome,
            elapsed,
            stats,
            version,
        };

        match &report.outcome {
            SwapOutcome::Swapped => {
                tracing::info!(
                    module = %report.module,
                    elapsed_ms = report.elapsed.as_secs_f64() * 1000.0,
                    "{}",
                    report
                );
                if let Some(hook) = self.post_swap.as_mut() {
                    hook(path);
                }
            }
            SwapOutcome::Failed(e) => {
                tracing::warn!(module = %report.module, error = %e, "swap failed");
            }
            SwapOutcome::Aborted => {}
        }

        report
    }
}
