//! Runtime for module source
//!
//! Values, builtins and the tree-walking interpreter that turns a parsed
//! module into a value graph.

mod builtins;
mod interpreter;
mod value;

pub use interpreter::{Interpreter, MAX_CALL_DEPTH};
pub use value::{
    format_number, Function, NativeFn, ScriptFunction, Table, TableRef, Value, MAX_SHAPE_DEPTH,
};
