//! Prelude module for convenient imports
//!
//! ```no_run
//! use lazarus::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let mut supervisor = Supervisor::new(SupervisorConfig::default())?;
//!     supervisor.tick();
//!     Ok(())
//! }
//! ```

// Supervisor and configuration
pub use crate::supervisor::{Supervisor, SupervisorBuilder, SupervisorConfig, SupervisorState};

// Hot swapping
pub use crate::hmr::{ModuleVersion, SwapOutcome, SwapReport};
pub use crate::merge::{merge_values, MergeStats, StateMerger};
pub use crate::scanner::{ChangeScanner, FileRegistry, ModuleRecord};

// Modules
pub use crate::loader::{ModuleId, ModuleLoader, ModuleRegistry, ScriptLoader};
pub use crate::runtime::{Interpreter, Table, TableRef, Value};

// Dispatch and error state
pub use crate::dispatch::{Bindings, EntryPoint, ProtectedDispatcher};
pub use crate::overlay::{Canvas, Color, ErrorOverlay, ErrorReport, FailureKind, TextCanvas};

// Collaborators
pub use crate::fs::{FileSystem, MemoryFileSystem, OsFileSystem};
pub use crate::host::{Clock, Host, ManualClock, NullHost, SystemClock};

// Error handling
pub use crate::error::{Error, ErrorKind, FrameSite, Result, SourceLocation, StackFrame, StackTrace};

// Version constant
pub use crate::VERSION;
