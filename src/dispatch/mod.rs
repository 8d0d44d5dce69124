//! Host entry points and the protected call boundary
//!
//! The host never calls application code directly. It calls a fixed
//! [`ProtectedDispatcher`] whose targets are re-captured from the current
//! [`Bindings`] after every successful reload.

use crate::error::{Error, Result};
use crate::runtime::{Interpreter, Value};
use rustc_hash::FxHashMap as HashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;

/// Callbacks the host invokes each frame or on input events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryPoint {
    Update,
    Draw,
    KeyPressed,
    KeyReleased,
    TextInput,
    MousePressed,
    MouseReleased,
    MouseMoved,
    WheelMoved,
    Focus,
    Visible,
    Resize,
    Quit,
}

impl EntryPoint {
    pub const ALL: [EntryPoint; 13] = [
        EntryPoint::Update,
        EntryPoint::Draw,
        EntryPoint::KeyPressed,
        EntryPoint::KeyReleased,
        EntryPoint::TextInput,
        EntryPoint::MousePressed,
        EntryPoint::MouseReleased,
        EntryPoint::MouseMoved,
        EntryPoint::WheelMoved,
        EntryPoint::Focus,
        EntryPoint::Visible,
        EntryPoint::Resize,
        EntryPoint::Quit,
    ];

    /// Name used in module source and configuration
    pub fn name(&self) -> &'static str {
        match self {
            EntryPoint::Update => "update",
            EntryPoint::Draw => "draw",
            EntryPoint::KeyPressed => "keypressed",
            EntryPoint::KeyReleased => "keyreleased",
            EntryPoint::TextInput => "textinput",
            EntryPoint::MousePressed => "mousepressed",
            EntryPoint::MouseReleased => "mousereleased",
            EntryPoint::MouseMoved => "mousemoved",
            EntryPoint::WheelMoved => "wheelmoved",
            EntryPoint::Focus => "focus",
            EntryPoint::Visible => "visible",
            EntryPoint::Resize => "resize",
            EntryPoint::Quit => "quit",
        }
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EntryPoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        EntryPoint::ALL
            .iter()
            .copied()
            .find(|e| e.name() == s)
            .ok_or_else(|| Error::ConfigError(format!("unknown entry point '{}'", s)))
    }
}

/// The real implementations currently registered for each entry point
#[derive(Debug, Default, Clone)]
pub struct Bindings {
    targets: HashMap<EntryPoint, Value>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, entry: EntryPoint) -> Option<&Value> {
        self.targets.get(&entry)
    }

    pub fn set(&mut self, entry: EntryPoint, target: Value) {
        self.targets.insert(entry, target);
    }

    pub fn remove(&mut self, entry: EntryPoint) -> Option<Value> {
        self.targets.remove(&entry)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Bind every entry point whose name is a callable field of `module`
    ///
    /// Entry points the module does not define keep their current binding.
    pub fn bind_from_module(&mut self, module: &Value) -> usize {
        let mut bound = 0;
        for entry in EntryPoint::ALL {
            let target = module.get(entry.name());
            if target.is_callable() {
                self.targets.insert(entry, target);
                bound += 1;
            }
        }
        bound
    }
}

/// Wraps a fixed set of entry points in a failure-isolating call
#[derive(Debug)]
pub struct ProtectedDispatcher {
    wrapped: Vec<EntryPoint>,
    targets: HashMap<EntryPoint, Value>,
    installed: bool,
}

impl ProtectedDispatcher {
    pub fn new(wrapped: impl IntoIterator<Item = EntryPoint>) -> Self {
        let mut wrapped: Vec<EntryPoint> = wrapped.into_iter().collect();
        wrapped.sort();
        wrapped.dedup();
        Self {
            wrapped,
            targets: HashMap::default(),
            installed: false,
        }
    }

    /// Install the wrappers; returns false if they were already installed
    pub fn install(&mut self, bindings: &Bindings) -> bool {
        if self.installed {
            return false;
        }
        self.installed = true;
        self.sync(bindings);
        tracing::debug!(count = self.wrapped.len(), "installed protected entry points");
        true
    }

    /// Re-capture the latest real implementations
    pub fn sync(&mut self, bindings: &Bindings) {
        self.targets.clear();
        for entry in &self.wrapped {
            if let Some(target) = bindings.get(*entry) {
                self.targets.insert(*entry, target.clone());
            }
        }
    }

    pub fn is_installed(&self) -> bool {
        self.installed
    }

    pub fn is_wrapped(&self, entry: EntryPoint) -> bool {
        self.wrapped.contains(&entry)
    }

    pub fn wrapped(&self) -> &[EntryPoint] {
        &self.wrapped
    }

    /// Target the wrapper forwards to
    pub fn target(&self, entry: EntryPoint) -> Option<&Value> {
        self.targets.get(&entry)
    }

    /// Forward to the captured target; script errors and Rust panics
    /// both come back as `Err`
    pub fn call(&self, interpreter: &Interpreter, entry: EntryPoint, args: &[Value]) -> Result<Value> {
        let Some(target) = self.targets.get(&entry) else {
            return Ok(Value::Nil);
        };
        match catch_unwind(AssertUnwindSafe(|| interpreter.call(target, args))) {
            Ok(result) => result,
            Err(panic_info) => {
                let msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_info.downcast_ref::<String>() {
                    s.clone()
                } else {
                    format!("{} panicked", entry)
                };
                Err(Error::Panic(msg))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter_binding(label: &'static str) -> Value {
        Value::native(label, move |_| Ok(Value::from(label)))
    }

    #[test]
    fn test_entry_point_names_round_trip() {
        for entry in EntryPoint::ALL {
            assert_eq!(entry.name().parse::<EntryPoint>().unwrap(), entry);
        }
        assert!("tick".parse::<EntryPoint>().is_err());
        let json = serde_json::to_string(&EntryPoint::KeyPressed).unwrap();
        assert_eq!(json, "\"keypressed\"");
    }

    #[test]
    fn test_install_is_idempotent_and_sync_recaptures() {
        let interp = Interpreter::new();
        let mut bindings = Bindings::new();
        bindings.set(EntryPoint::Update, counter_binding("v1"));

        let mut dispatcher = ProtectedDispatcher::new([EntryPoint::Update, EntryPoint::Draw]);
        assert!(dispatcher.install(&bindings));

        bindings.set(EntryPoint::Update, counter_binding("v2"));
        assert!(!dispatcher.install(&bindings));
        assert_eq!(
            dispatcher.call(&interp, EntryPoint::Update, &[]).unwrap(),
            Value::from("v1")
        );

        dispatcher.sync(&bindings);
        assert_eq!(
            dispatcher.call(&interp, EntryPoint::Update, &[]).unwrap(),
            Value::from("v2")
        );
        assert!(dispatcher.call(&interp, EntryPoint::Draw, &[]).unwrap().is_nil());
    }

    #[test]
    fn test_unwrapped_entry_points_are_not_captured() {
        let mut bindings = Bindings::new();
        bindings.set(EntryPoint::Quit, counter_binding("q"));
        let mut dispatcher = ProtectedDispatcher::new([EntryPoint::Update]);
        dispatcher.install(&bindings);
        assert!(dispatcher.target(EntryPoint::Quit).is_none());
        assert!(!dispatcher.is_wrapped(EntryPoint::Quit));
    }

    #[test]
    fn test_script_error_is_returned() {
        let interp = Interpreter::new();
        let module = interp
            .load_module("update = fn(dt) => error('bad frame')", "main.mod")
            .unwrap();
        let mut bindings = Bindings::new();
        assert_eq!(bindings.bind_from_module(&module), 1);

        let mut dispatcher = ProtectedDispatcher::new(EntryPoint::ALL);
        dispatcher.install(&bindings);
        let err = dispatcher
            .call(&interp, EntryPoint::Update, &[Value::Number(0.1)])
            .unwrap_err();
        assert!(err.to_string().contains("bad frame"));
        assert!(err.stack_trace().is_some());
    }

    #[test]
    fn test_panic_is_caught() {
        let interp = Interpreter::new();
        let mut bindings = Bindings::new();
        bindings.set(
            EntryPoint::Draw,
            Value::native("draw", |_| panic!("renderer exploded")),
        );
        let mut dispatcher = ProtectedDispatcher::new([EntryPoint::Draw]);
        dispatcher.install(&bindings);

        let err = dispatcher.call(&interp, EntryPoint::Draw, &[]).unwrap_err();
        assert_eq!(err.to_string(), "Panic: renderer exploded");
    }
}
