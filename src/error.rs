//! Error types for the lazarus supervisor and its module language

use std::fmt::{self, Write as _};
use thiserror::Error;

/// Source location in a module file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceLocation {
    /// Line number (1-indexed)
    pub line: u32,
    /// Column number (1-indexed)
    pub column: u32,
    /// Byte offset in source
    pub offset: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Render the offending line, the line before it and a caret under the column
///
/// ```text
///   1 | a = 1
///   2 | b = )
///     |     ^
/// ```
pub fn format_error_context(source: &str, location: &SourceLocation) -> String {
    let Some(index) = (location.line as usize).checked_sub(1) else {
        return String::new();
    };
    let Some(line) = source.lines().nth(index) else {
        return String::new();
    };

    let gutter = (location.line + 1).to_string().len().max(3);
    let mut out = String::new();
    if let Some(previous) = index.checked_sub(1).and_then(|i| source.lines().nth(i)) {
        let _ = writeln!(out, "{:>gutter$} | {}", location.line - 1, previous);
    }
    let _ = writeln!(out, "{:>gutter$} | {}", location.line, line);
    let caret = " ".repeat(location.column.saturating_sub(1) as usize);
    let _ = writeln!(out, "{:>gutter$} | {}^", "", caret);
    out
}

/// Where a stack frame's code lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameSite {
    /// A builtin or host function
    Native,
    /// Module source at a known position
    Source {
        file: Option<String>,
        line: u32,
        column: u32,
    },
}

/// One function activation in a module stack trace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub function: String,
    pub site: FrameSite,
}

impl StackFrame {
    pub fn new(function: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            function: function.into(),
            site: FrameSite::Source {
                file: None,
                line,
                column,
            },
        }
    }

    pub fn native(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            site: FrameSite::Native,
        }
    }

    /// Attach the defining file; no effect on native frames
    pub fn with_file(mut self, name: impl Into<String>) -> Self {
        if let FrameSite::Source { file, .. } = &mut self.site {
            *file = Some(name.into());
        }
        self
    }

    pub fn file(&self) -> Option<&str> {
        match &self.site {
            FrameSite::Source { file, .. } => file.as_deref(),
            FrameSite::Native => None,
        }
    }

    pub fn line(&self) -> Option<u32> {
        match self.site {
            FrameSite::Source { line, .. } => Some(line),
            FrameSite::Native => None,
        }
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.site {
            FrameSite::Native => write!(f, "    at {} (native)", self.function),
            FrameSite::Source { file, line, column } => write!(
                f,
                "    at {} ({}:{}:{})",
                self.function,
                file.as_deref().unwrap_or("<module>"),
                line,
                column
            ),
        }
    }
}

/// Frames collected while an error unwinds, innermost first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackTrace(Vec<StackFrame>);

impl StackTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: StackFrame) {
        self.0.push(frame);
    }

    pub fn frames(&self) -> &[StackFrame] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for StackTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|frame| writeln!(f, "{}", frame))
    }
}

fn with_context(context: &str) -> String {
    if context.is_empty() {
        String::new()
    } else {
        format!("\n{}", context)
    }
}

/// Main error type for lazarus
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// Invalid character or malformed literal
    #[error("SyntaxError: {message} at {location}{}", with_context(source_context))]
    LexerError {
        message: String,
        location: SourceLocation,
        source_context: String,
    },

    /// Token sequence that does not form a module
    #[error("SyntaxError: {message} at {location}{}", with_context(source_context))]
    ParseError {
        message: String,
        location: SourceLocation,
        source_context: String,
    },

    /// Runtime error raised while evaluating a module or calling a function
    #[error("{kind}: {message}")]
    RuntimeError {
        kind: ErrorKind,
        message: String,
        stack_trace: StackTrace,
    },

    #[error("IOError: {0}")]
    IoError(#[from] std::io::Error),

    /// A module name that does not resolve to a file
    #[error("ModuleError: {0}")]
    ModuleError(String),

    /// Invalid supervisor configuration
    #[error("ConfigError: {0}")]
    ConfigError(String),

    /// A Rust panic caught at the dispatch boundary
    #[error("Panic: {0}")]
    Panic(String),
}

/// Runtime error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::enum_variant_names)]
pub enum ErrorKind {
    /// Wrong type for an operation
    TypeError,
    /// Unknown name
    ReferenceError,
    /// Value out of range (including call depth)
    RangeError,
    /// Raised by the `error` builtin
    GenericError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::TypeError => write!(f, "TypeError"),
            ErrorKind::ReferenceError => write!(f, "ReferenceError"),
            ErrorKind::RangeError => write!(f, "RangeError"),
            ErrorKind::GenericError => write!(f, "Error"),
        }
    }
}

impl Error {
    /// Lexer failure with a caret snippet of `source`
    pub fn lex_error(
        message: impl Into<String>,
        location: SourceLocation,
        source: &str,
    ) -> Self {
        Error::LexerError {
            message: message.into(),
            source_context: format_error_context(source, &location),
            location,
        }
    }

    /// Parser failure with a caret snippet of `source`
    pub fn parse_error(
        message: impl Into<String>,
        location: SourceLocation,
        source: &str,
    ) -> Self {
        Error::ParseError {
            message: message.into(),
            source_context: format_error_context(source, &location),
            location,
        }
    }

    /// Create a runtime error with an empty stack trace
    pub fn runtime(kind: ErrorKind, message: impl Into<String>) -> Self {
        Error::RuntimeError {
            kind,
            message: message.into(),
            stack_trace: StackTrace::new(),
        }
    }

    /// Create a TypeError
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::runtime(ErrorKind::TypeError, message)
    }

    /// Create a ReferenceError
    pub fn reference_error(message: impl Into<String>) -> Self {
        Self::runtime(ErrorKind::ReferenceError, message)
    }

    /// Create a RangeError
    pub fn range_error(message: impl Into<String>) -> Self {
        Self::runtime(ErrorKind::RangeError, message)
    }

    /// Append a frame to a runtime error's trace; other errors pass through
    pub fn with_frame(mut self, frame: StackFrame) -> Self {
        if let Error::RuntimeError { stack_trace, .. } = &mut self {
            stack_trace.push(frame);
        }
        self
    }

    /// The captured stack trace, if this error carries one
    pub fn stack_trace(&self) -> Option<&StackTrace> {
        match self {
            Error::RuntimeError { stack_trace, .. } if !stack_trace.is_empty() => Some(stack_trace),
            _ => None,
        }
    }

    /// Whether this is a syntax error (lexer or parser)
    pub fn is_syntax_error(&self) -> bool {
        matches!(self, Error::LexerError { .. } | Error::ParseError { .. })
    }
}

/// Result type alias for lazarus
pub type Result<T> = std::result::Result<T, Error>;

/// Message texts shared by the lexer, parser and interpreter
pub mod messages {
    pub const MAXIMUM_CALL_STACK: &str = "Maximum call stack size exceeded";
    pub const UNEXPECTED_END: &str = "Unexpected end of input";
    pub const UNTERMINATED_STRING: &str = "Unterminated string literal";
    pub const NESTED_TOO_DEEPLY: &str = "Expression nested too deeply";

    pub fn not_a_function(callee: &str) -> String {
        format!("'{callee}' is not a function")
    }

    pub fn not_defined(name: &str) -> String {
        format!("'{name}' is not defined")
    }

    pub fn cannot_read_property(key: &str, of: &str) -> String {
        format!("Cannot read property '{key}' of {of}")
    }

    pub fn cannot_set_property(key: &str, of: &str) -> String {
        format!("Cannot set property '{key}' of {of}")
    }
}
