//! Built-in functions visible to every module

use super::value::Value;
use crate::error::{Error, ErrorKind, Result};
use rustc_hash::FxHashMap as HashMap;

/// Build the builtin table consulted after module fields
pub fn globals() -> HashMap<&'static str, Value> {
    let mut globals = HashMap::default();
    globals.insert("error", Value::native("error", error));
    globals.insert("str", Value::native("str", str));
    globals.insert("len", Value::native("len", len));
    globals.insert("print", Value::native("print", print));
    globals
}

/// `error(msg)` raises a script error
fn error(args: &[Value]) -> Result<Value> {
    let message = match args.first() {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_display_string(),
        None => "error".to_string(),
    };
    Err(Error::runtime(ErrorKind::GenericError, message))
}

fn str(args: &[Value]) -> Result<Value> {
    Ok(Value::String(
        args.first().map(Value::to_display_string).unwrap_or_default(),
    ))
}

fn len(args: &[Value]) -> Result<Value> {
    match args.first() {
        Some(Value::String(s)) => Ok(Value::Number(s.chars().count() as f64)),
        Some(Value::Table(t)) => Ok(Value::Number(t.borrow().len() as f64)),
        Some(other) => Err(Error::type_error(format!(
            "len expects a string or table, got {}",
            other.type_name()
        ))),
        None => Err(Error::type_error("len expects one argument")),
    }
}

fn print(args: &[Value]) -> Result<Value> {
    let line = args
        .iter()
        .map(Value::to_display_string)
        .collect::<Vec<_>>()
        .join(" ");
    tracing::info!(target: "lazarus::script", "{}", line);
    Ok(Value::Nil)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_builtin_raises() {
        let err = error(&[Value::from("boom")]).unwrap_err();
        assert_eq!(err.to_string(), "Error: boom");
    }

    #[test]
    fn test_len() {
        assert_eq!(len(&[Value::from("héllo")]).unwrap(), Value::Number(5.0));
        assert!(len(&[Value::Nil]).is_err());
    }
}
