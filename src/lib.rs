//! Lazarus: live module reloading and crash recovery for frame-driven applications
//!
//! Lazarus watches a directory of module files, reloads the ones that
//! change while the host keeps running, and merges the previous runtime
//! state into the new definitions so live objects keep working under new
//! code. Every host callback passes through a protected boundary: an
//! uncaught failure freezes the application on a diagnostic overlay
//! instead of crashing it, and the application resumes by itself once
//! the broken module is fixed and saved.
//!
//! # Quick Start
//!
//! ```no_run
//! use lazarus::{EntryPoint, Supervisor, SupervisorConfig, Value};
//!
//! fn main() -> lazarus::Result<()> {
//!     let config = SupervisorConfig {
//!         watch_path: "game".into(),
//!         ..SupervisorConfig::default()
//!     };
//!     let mut supervisor = Supervisor::new(config)?;
//!     loop {
//!         supervisor.tick();
//!         supervisor.dispatch(EntryPoint::Update, &[Value::Number(1.0 / 60.0)])?;
//!         supervisor.dispatch(EntryPoint::Draw, &[])?;
//!     }
//! }
//! ```
//!
//! # Module Overview
//!
//! Modules are loaded through Source → [`lexer`] → [`parser`] → [`ast`] → [`runtime`] → value graph.
//!
//! | Category | Modules |
//! |----------|---------|
//! | **Module language** | [`lexer`], [`parser`], [`ast`], [`runtime`] |
//! | **Reloading** | [`scanner`], [`loader`], [`merge`], [`hmr`] |
//! | **Recovery** | [`dispatch`], [`supervisor`], [`overlay`] |
//! | **Collaborators** | [`fs`], [`host`] |
#![allow(clippy::enum_variant_names)]

pub mod ast;
pub mod dispatch;
pub mod fs;
pub mod hmr;
pub mod host;
pub mod lexer;
pub mod loader;
pub mod merge;
pub mod overlay;
pub mod parser;
pub mod prelude;
pub mod runtime;
pub mod scanner;
pub mod supervisor;

mod error;

pub use dispatch::{Bindings, EntryPoint, ProtectedDispatcher};
pub use error::{Error, ErrorKind, FrameSite, Result, SourceLocation, StackFrame, StackTrace};
pub use hmr::{SwapOutcome, SwapReport};
pub use runtime::{Interpreter, Value};
pub use supervisor::{Supervisor, SupervisorConfig, SupervisorState};

/// Lazarus version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
