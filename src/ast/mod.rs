//! Abstract Syntax Tree for module source
//!
//! A module is a sequence of assignments; every right-hand side is an
//! expression. Function bodies are single expressions.

use crate::error::SourceLocation;
use std::rc::Rc;

/// A parsed module
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    /// Top-level assignments in source order
    pub body: Vec<Assignment>,
}

/// `a.b.c = expr`
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// Root name followed by zero or more field names
    pub target: Vec<String>,
    /// Assigned value
    pub value: Expr,
    /// Location of the target
    pub location: SourceLocation,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
}

impl BinaryOperator {
    /// Operator as written in source
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Rem => "%",
            BinaryOperator::Eq => "==",
            BinaryOperator::NotEq => "!=",
            BinaryOperator::Less => "<",
            BinaryOperator::LessEq => "<=",
            BinaryOperator::Greater => ">",
            BinaryOperator::GreaterEq => ">=",
        }
    }
}

/// Short-circuit operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Negate,
    Not,
}

/// A function literal; shared between every closure created from it
#[derive(Debug, PartialEq)]
pub struct FunctionDef {
    /// Name of the field the function was first assigned to, if any
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Expr,
    pub location: SourceLocation,
}

/// Expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Nil,
    Boolean(bool),
    Number(f64),
    String(String),
    Identifier {
        name: String,
        location: SourceLocation,
    },
    /// `{ k = v, ... }` or `Shape { k = v, ... }`
    Table {
        shape: Option<Box<Expr>>,
        fields: Vec<(String, Expr)>,
        location: SourceLocation,
    },
    Function(Rc<FunctionDef>),
    Field {
        object: Box<Expr>,
        name: String,
        location: SourceLocation,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        location: SourceLocation,
    },
    /// `obj:name(args)`
    MethodCall {
        object: Box<Expr>,
        name: String,
        args: Vec<Expr>,
        location: SourceLocation,
    },
    Unary {
        operator: UnaryOperator,
        operand: Box<Expr>,
        location: SourceLocation,
    },
    Binary {
        operator: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
        location: SourceLocation,
    },
    Logical {
        operator: LogicalOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    If {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
}
