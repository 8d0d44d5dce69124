//! Shared test helpers for integration tests

#![allow(dead_code)]

use lazarus::host::ManualClock;
use lazarus::{Interpreter, Supervisor, SupervisorConfig, Value};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

/// Evaluate module source and return its root table
pub fn run_module(source: &str) -> lazarus::Result<Value> {
    Interpreter::new().load_module(source, "test.mod")
}

/// Evaluate `result = <expr>` and return the result field
pub fn eval_expr(expr: &str) -> lazarus::Result<Value> {
    run_module(&format!("result = {}", expr)).map(|m| m.get("result"))
}

/// A fixed point in time `secs` seconds after the epoch
pub fn at(secs: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
}

/// A temporary watch directory with explicit file modification times
pub struct ModuleDir {
    dir: TempDir,
}

impl ModuleDir {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write `source` to `name` and stamp it with `modified`
    pub fn write(&self, name: &str, source: &str, modified: SystemTime) -> PathBuf {
        let path = self.file(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dir");
        }
        std::fs::write(&path, source).expect("write module");
        self.touch(name, modified);
        path
    }

    pub fn touch(&self, name: &str, modified: SystemTime) {
        let file = File::options()
            .write(true)
            .open(self.file(name))
            .expect("open module");
        file.set_modified(modified).expect("set mtime");
    }

    pub fn config(&self) -> SupervisorConfig {
        SupervisorConfig {
            watch_path: self.path().to_path_buf(),
            scan_interval_seconds: 1.0,
            ..SupervisorConfig::default()
        }
    }

    /// Supervisor over this directory driven by `clock`
    pub fn supervisor(&self, clock: &ManualClock) -> Supervisor {
        Supervisor::builder(self.config())
            .clock(clock.clone())
            .build()
            .expect("build supervisor")
    }
}

/// Advance past the scan interval and tick
pub fn tick_past_interval(supervisor: &mut Supervisor, clock: &ManualClock) -> Vec<lazarus::SwapReport> {
    clock.advance(Duration::from_secs(1));
    supervisor.tick()
}
