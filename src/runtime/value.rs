//! Module value types
//!
//! A loaded module is a graph of [`Value`]s. Tables are the only composite
//! variant: they carry named fields and an optional shape link and are
//! compared by identity. Everything else is an opaque scalar or callable.

use crate::ast::FunctionDef;
use crate::error::{messages, Error, Result};
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

/// Shared handle to a table node
pub type TableRef = Rc<RefCell<Table>>;

/// Type alias for native function implementations
pub type NativeFn = Rc<dyn Fn(&[Value]) -> Result<Value>>;

/// Shape chains longer than this are treated as ending there
pub const MAX_SHAPE_DEPTH: usize = 64;

/// A module value
#[derive(Clone)]
pub enum Value {
    /// Absence of a value
    Nil,
    /// Boolean value
    Boolean(bool),
    /// Number (IEEE 754 double)
    Number(f64),
    /// String
    String(String),
    /// Composite node with named fields
    Table(TableRef),
    /// Script closure or native function
    Function(Rc<Function>),
}

impl Value {
    /// Create an empty table value
    pub fn new_table() -> Self {
        Value::Table(Rc::new(RefCell::new(Table::new())))
    }

    /// Wrap a Rust closure as a callable value
    pub fn native<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + 'static,
    {
        Value::Function(Rc::new(Function::Native {
            name: name.into(),
            func: Rc::new(func),
        }))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Whether the merger recurses into this value
    pub fn is_composite(&self) -> bool {
        matches!(self, Value::Table(_))
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    /// Truthiness: only `nil` and `false` are falsy
    pub fn to_boolean(&self) -> bool {
        !matches!(self, Value::Nil | Value::Boolean(false))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableRef> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Rc<Function>> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Name of the value's type, as used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Table(_) => "table",
            Value::Function(_) => "function",
        }
    }

    /// Stable identity of a composite or callable node
    pub fn identity(&self) -> Option<usize> {
        match self {
            Value::Table(t) => Some(Rc::as_ptr(t) as *const () as usize),
            Value::Function(f) => Some(Rc::as_ptr(f) as *const () as usize),
            _ => None,
        }
    }

    /// Read a field, following the shape chain; `Nil` for non-tables
    pub fn get(&self, key: &str) -> Value {
        match self {
            Value::Table(t) => t.borrow().get(key),
            _ => Value::Nil,
        }
    }

    /// Read a dotted path such as `player.stats.hp`
    pub fn get_path(&self, path: &str) -> Value {
        path.split('.')
            .fold(self.clone(), |value, key| value.get(key))
    }

    /// Write an own field
    pub fn set(&self, key: impl Into<String>, value: Value) -> Result<()> {
        let key = key.into();
        match self {
            Value::Table(t) => {
                t.borrow_mut().set(key, value);
                Ok(())
            }
            other => Err(Error::type_error(messages::cannot_set_property(
                &key,
                other.type_name(),
            ))),
        }
    }

    /// Render the value for diagnostics; cycles print as `<cycle>`
    pub fn to_display_string(&self) -> String {
        let mut out = String::new();
        let mut seen = HashSet::default();
        write_value(&mut out, self, &mut seen);
        out
    }
}

fn write_value(out: &mut String, value: &Value, seen: &mut HashSet<usize>) {
    match value {
        Value::Nil => out.push_str("nil"),
        Value::Boolean(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&format_number(*n)),
        Value::String(s) => out.push_str(s),
        Value::Function(f) => out.push_str(&format!("<fn {}>", f.name())),
        Value::Table(t) => {
            let id = Rc::as_ptr(t) as *const () as usize;
            if !seen.insert(id) {
                out.push_str("<cycle>");
                return;
            }
            let table = t.borrow();
            out.push('{');
            for (i, key) in table.field_names().iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(key);
                out.push_str(" = ");
                let field = table.get_own(key).unwrap_or(Value::Nil);
                if let Value::String(s) = &field {
                    out.push_str(&format!("{:?}", s));
                } else {
                    write_value(out, &field, seen);
                }
            }
            out.push('}');
            seen.remove(&id);
        }
    }
}

/// Format a number without a trailing `.0` for integral values
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "nan".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Table(t) => match t.try_borrow() {
                Ok(table) => write!(f, "[Table: {}]", table.field_names().join(", ")),
                Err(_) => write!(f, "[Table: <borrowed>]"),
            },
            Value::Function(func) => write!(f, "[Function: {}]", func.name()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

/// A composite node: named fields plus an optional shape link
#[derive(Default)]
pub struct Table {
    fields: HashMap<String, Value>,
    shape: Option<TableRef>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table whose lookups fall back to `shape`
    pub fn with_shape(shape: TableRef) -> Self {
        Self {
            fields: HashMap::default(),
            shape: Some(shape),
        }
    }

    /// Own field only
    pub fn get_own(&self, key: &str) -> Option<Value> {
        self.fields.get(key).cloned()
    }

    /// Own field, then the shape chain
    pub fn get(&self, key: &str) -> Value {
        if let Some(value) = self.fields.get(key) {
            return value.clone();
        }
        let mut shape = self.shape.clone();
        for _ in 0..MAX_SHAPE_DEPTH {
            let Some(current) = shape else { break };
            let Ok(node) = current.try_borrow() else { break };
            if let Some(value) = node.fields.get(key) {
                return value.clone();
            }
            shape = node.shape.clone();
        }
        Value::Nil
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Own fields in unspecified order
    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Own field names, sorted
    pub fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.fields.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn shape(&self) -> Option<TableRef> {
        self.shape.clone()
    }

    pub fn set_shape(&mut self, shape: Option<TableRef>) {
        self.shape = shape;
    }
}

/// A callable value
pub enum Function {
    /// Closure defined in module source
    Script(ScriptFunction),
    /// Host-provided function
    Native { name: String, func: NativeFn },
}

impl Function {
    pub fn name(&self) -> &str {
        match self {
            Function::Script(f) => f.name(),
            Function::Native { name, .. } => name,
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Script(s) => write!(f, "[Function: {} ({})]", s.name(), s.file),
            Function::Native { name, .. } => write!(f, "[Native: {}]", name),
        }
    }
}

/// A closure over its module's root table
pub struct ScriptFunction {
    pub def: Rc<FunctionDef>,
    /// Module file the function was defined in
    pub file: Rc<str>,
    /// Module root used to resolve free names; weak so module graphs
    /// holding their own functions do not leak
    env: RefCell<Weak<RefCell<Table>>>,
}

impl ScriptFunction {
    pub fn new(def: Rc<FunctionDef>, file: Rc<str>, env: &TableRef) -> Self {
        Self {
            def,
            file,
            env: RefCell::new(Rc::downgrade(env)),
        }
    }

    pub fn name(&self) -> &str {
        self.def.name.as_deref().unwrap_or("<anonymous>")
    }

    /// The module root, if it is still alive
    pub fn env(&self) -> Option<TableRef> {
        self.env.borrow().upgrade()
    }

    /// Identity of the environment node, even if it has been dropped
    pub fn env_identity(&self) -> usize {
        self.env.borrow().as_ptr() as *const () as usize
    }

    /// Point free-name resolution at another root
    pub fn rebind(&self, env: &TableRef) {
        *self.env.borrow_mut() = Rc::downgrade(env);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_lookup_falls_back() {
        let base = Value::new_table();
        base.set("speed", Value::Number(3.0)).unwrap();
        let thing = Value::Table(Rc::new(RefCell::new(Table::with_shape(
            base.as_table().unwrap().clone(),
        ))));
        thing.set("hp", Value::Number(10.0)).unwrap();

        assert_eq!(thing.get("speed"), Value::Number(3.0));
        assert_eq!(thing.get("hp"), Value::Number(10.0));
        assert!(thing.get("missing").is_nil());
    }

    #[test]
    fn test_cyclic_shape_lookup_terminates() {
        let a = Rc::new(RefCell::new(Table::new()));
        let b = Rc::new(RefCell::new(Table::with_shape(a.clone())));
        a.borrow_mut().set_shape(Some(b.clone()));
        assert!(b.borrow().get("nothing").is_nil());
    }

    #[test]
    fn test_tables_compare_by_identity() {
        let a = Value::new_table();
        let b = Value::new_table();
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_eq!(Value::from("x"), Value::String("x".into()));
    }

    #[test]
    fn test_display_handles_cycles() {
        let a = Value::new_table();
        let b = Value::new_table();
        a.set("peer", b.clone()).unwrap();
        b.set("peer", a.clone()).unwrap();
        b.set("n", Value::Number(2.0)).unwrap();
        assert_eq!(a.to_display_string(), "{peer = {n = 2, peer = <cycle>}}");
    }

    #[test]
    fn test_set_on_scalar_fails() {
        let err = Value::Number(1.0).set("x", Value::Nil).unwrap_err();
        assert!(err.to_string().contains("Cannot set property 'x' of number"));
    }

    #[test]
    fn test_get_path() {
        let root = Value::new_table();
        let player = Value::new_table();
        player.set("hp", Value::Number(7.0)).unwrap();
        root.set("player", player).unwrap();
        assert_eq!(root.get_path("player.hp"), Value::Number(7.0));
        assert!(root.get_path("player.hp.deeper").is_nil());
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(2.0), "2");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(-0.0), "0");
    }
}
