//! Tree-walking evaluator for module source

use super::builtins;
use super::value::{Function, ScriptFunction, Table, TableRef, Value};
use crate::ast::*;
use crate::error::{messages, Error, Result, SourceLocation, StackFrame};
use rustc_hash::FxHashMap as HashMap;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Maximum nested function calls before a RangeError
pub const MAX_CALL_DEPTH: usize = 128;

/// Name resolution context for one evaluation
struct Scope<'a> {
    params: &'a [String],
    args: &'a [Value],
    env: &'a TableRef,
    file: &'a Rc<str>,
}

/// Evaluates modules and calls module functions
pub struct Interpreter {
    globals: HashMap<&'static str, Value>,
    depth: Cell<usize>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self {
            globals: builtins::globals(),
            depth: Cell::new(0),
        }
    }

    /// Parse and evaluate module source into a fresh root table
    pub fn load_module(&self, source: &str, file: &str) -> Result<Value> {
        let program = crate::parser::parse(source)?;
        self.eval_program(&program, Rc::from(file))
    }

    /// Evaluate a parsed module into a fresh root table
    pub fn eval_program(&self, program: &Program, file: Rc<str>) -> Result<Value> {
        let root: TableRef = Rc::new(RefCell::new(Table::new()));
        let scope = Scope {
            params: &[],
            args: &[],
            env: &root,
            file: &file,
        };

        for assignment in &program.body {
            self.exec_assignment(assignment, &scope).map_err(|e| {
                e.with_frame(
                    StackFrame::new("<module>", assignment.location.line, assignment.location.column)
                        .with_file(file.as_ref()),
                )
            })?;
        }

        Ok(Value::Table(root))
    }

    /// Call a function value with arguments
    pub fn call(&self, callee: &Value, args: &[Value]) -> Result<Value> {
        let Value::Function(function) = callee else {
            return Err(Error::type_error(messages::not_a_function(
                &callee.to_display_string(),
            )));
        };

        let depth = self.depth.get();
        if depth >= MAX_CALL_DEPTH {
            return Err(Error::range_error(messages::MAXIMUM_CALL_STACK));
        }
        let _guard = DepthGuard::enter(&self.depth);
        self.call_function(function, args)
    }

    fn call_function(&self, function: &Function, args: &[Value]) -> Result<Value> {
        match function {
            Function::Native { name, func } => {
                func(args).map_err(|e| e.with_frame(StackFrame::native(name.as_str())))
            }
            Function::Script(script) => {
                let frame = || {
                    StackFrame::new(
                        script.name(),
                        script.def.location.line,
                        script.def.location.column,
                    )
                    .with_file(script.file.as_ref())
                };
                let env = script.env().ok_or_else(|| {
                    Error::type_error(format!(
                        "module environment of '{}' is no longer loaded",
                        script.name()
                    ))
                    .with_frame(frame())
                })?;
                let scope = Scope {
                    params: &script.def.params,
                    args,
                    env: &env,
                    file: &script.file,
                };
                self.eval(&script.def.body, &scope)
                    .map_err(|e| e.with_frame(frame()))
            }
        }
    }

    fn exec_assignment(&self, assignment: &Assignment, scope: &Scope<'_>) -> Result<()> {
        let value = self.eval(&assignment.value, scope)?;
        let (last, parents) = match assignment.target.split_last() {
            Some(split) => split,
            None => return Ok(()),
        };

        let mut target = Value::Table(scope.env.clone());
        for (i, name) in parents.iter().enumerate() {
            let next = target.get(name);
            if !next.is_composite() {
                let path = assignment.target[..=i].join(".");
                return Err(Error::type_error(messages::cannot_set_property(
                    &assignment.target[i + 1],
                    &format!("{} ({})", path, next.type_name()),
                )));
            }
            target = next;
        }

        target.set(last.clone(), value)
    }

    fn lookup(&self, name: &str, location: SourceLocation, scope: &Scope<'_>) -> Result<Value> {
        if let Some(i) = scope.params.iter().position(|p| p == name) {
            return Ok(scope.args.get(i).cloned().unwrap_or(Value::Nil));
        }
        {
            let env = scope.env.borrow();
            if env.contains(name) {
                return Ok(env.get(name));
            }
        }
        if let Some(global) = self.globals.get(name) {
            return Ok(global.clone());
        }
        Err(Error::reference_error(format!(
            "{} at {}",
            messages::not_defined(name),
            location
        )))
    }

    fn eval(&self, expr: &Expr, scope: &Scope<'_>) -> Result<Value> {
        match expr {
            Expr::Nil => Ok(Value::Nil),
            Expr::Boolean(b) => Ok(Value::Boolean(*b)),
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::String(s) => Ok(Value::String(s.clone())),
            Expr::Identifier { name, location } => self.lookup(name, *location, scope),
            Expr::Table {
                shape,
                fields,
                location,
            } => {
                let mut table = match shape {
                    Some(shape_expr) => match self.eval(shape_expr, scope)? {
                        Value::Table(shape) => Table::with_shape(shape),
                        other => {
                            return Err(Error::type_error(format!(
                                "shape must be a table, got {} at {}",
                                other.type_name(),
                                location
                            )))
                        }
                    },
                    None => Table::new(),
                };
                for (key, value_expr) in fields {
                    let value = self.eval(value_expr, scope)?;
                    table.set(key.clone(), value);
                }
                Ok(Value::Table(Rc::new(RefCell::new(table))))
            }
            Expr::Function(def) => Ok(Value::Function(Rc::new(Function::Script(
                ScriptFunction::new(def.clone(), scope.file.clone(), scope.env),
            )))),
            Expr::Field {
                object,
                name,
                location,
            } => {
                let object = self.eval(object, scope)?;
                if !object.is_composite() {
                    return Err(Error::type_error(format!(
                        "{} at {}",
                        messages::cannot_read_property(name, object.type_name()),
                        location
                    )));
                }
                Ok(object.get(name))
            }
            Expr::Call {
                callee,
                args,
                location,
            } => {
                let function = self.eval(callee, scope)?;
                if !function.is_callable() {
                    return Err(Error::type_error(format!(
                        "{} at {}",
                        messages::not_a_function(&describe(callee)),
                        location
                    )));
                }
                let args = self.eval_args(args, scope)?;
                self.call(&function, &args)
            }
            Expr::MethodCall {
                object,
                name,
                args,
                location,
            } => {
                let receiver = self.eval(object, scope)?;
                if !receiver.is_composite() {
                    return Err(Error::type_error(format!(
                        "{} at {}",
                        messages::cannot_read_property(name, receiver.type_name()),
                        location
                    )));
                }
                let method = receiver.get(name);
                if !method.is_callable() {
                    return Err(Error::type_error(format!(
                        "{} at {}",
                        messages::not_a_function(&format!("{}:{}", describe(object), name)),
                        location
                    )));
                }
                let mut call_args = Vec::with_capacity(args.len() + 1);
                call_args.push(receiver);
                call_args.extend(self.eval_args(args, scope)?);
                self.call(&method, &call_args)
            }
            Expr::Unary {
                operator,
                operand,
                location,
            } => {
                let value = self.eval(operand, scope)?;
                match operator {
                    UnaryOperator::Not => Ok(Value::Boolean(!value.to_boolean())),
                    UnaryOperator::Negate => match value {
                        Value::Number(n) => Ok(Value::Number(-n)),
                        other => Err(Error::type_error(format!(
                            "Cannot negate {} at {}",
                            other.type_name(),
                            location
                        ))),
                    },
                }
            }
            Expr::Binary {
                operator,
                left,
                right,
                location,
            } => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                binary(*operator, left, right, *location)
            }
            Expr::Logical {
                operator,
                left,
                right,
            } => {
                let left = self.eval(left, scope)?;
                match (operator, left.to_boolean()) {
                    (LogicalOperator::And, false) | (LogicalOperator::Or, true) => Ok(left),
                    _ => self.eval(right, scope),
                }
            }
            Expr::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.eval(condition, scope)?.to_boolean() {
                    self.eval(then_branch, scope)
                } else {
                    self.eval(else_branch, scope)
                }
            }
        }
    }

    fn eval_args(&self, args: &[Expr], scope: &Scope<'_>) -> Result<Vec<Value>> {
        args.iter().map(|arg| self.eval(arg, scope)).collect()
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

/// Restores the call depth on return or unwind
struct DepthGuard<'a> {
    depth: &'a Cell<usize>,
    saved: usize,
}

impl<'a> DepthGuard<'a> {
    fn enter(depth: &'a Cell<usize>) -> Self {
        let saved = depth.get();
        depth.set(saved + 1);
        Self { depth, saved }
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.depth.set(self.saved);
    }
}

/// Short source-like description of a callee for error messages
fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Identifier { name, .. } => name.clone(),
        Expr::Field { object, name, .. } => format!("{}.{}", describe(object), name),
        _ => "expression".to_string(),
    }
}

fn binary(operator: BinaryOperator, left: Value, right: Value, location: SourceLocation) -> Result<Value> {
    use BinaryOperator::*;

    match (operator, &left, &right) {
        (Eq, _, _) => Ok(Value::Boolean(left == right)),
        (NotEq, _, _) => Ok(Value::Boolean(left != right)),
        (Add, Value::String(_), _) | (Add, _, Value::String(_)) => Ok(Value::String(format!(
            "{}{}",
            left.to_display_string(),
            right.to_display_string()
        ))),
        (_, Value::Number(a), Value::Number(b)) => {
            let (a, b) = (*a, *b);
            Ok(match operator {
                Add => Value::Number(a + b),
                Sub => Value::Number(a - b),
                Mul => Value::Number(a * b),
                Div => Value::Number(a / b),
                Rem => Value::Number(a % b),
                Less => Value::Boolean(a < b),
                LessEq => Value::Boolean(a <= b),
                Greater => Value::Boolean(a > b),
                GreaterEq => Value::Boolean(a >= b),
                Eq | NotEq => unreachable!("equality handled above"),
            })
        }
        (Less | LessEq | Greater | GreaterEq, Value::String(a), Value::String(b)) => {
            Ok(Value::Boolean(match operator {
                Less => a < b,
                LessEq => a <= b,
                Greater => a > b,
                _ => a >= b,
            }))
        }
        _ => Err(Error::type_error(format!(
            "Cannot apply '{}' to {} and {} at {}",
            operator.symbol(),
            left.type_name(),
            right.type_name(),
            location
        ))),
    }
}
