//! Error types for the template toolchain
//!
//! Every phase has its own diagnostic: lexing, parsing, code generation and
//! rendering. A miss (unknown variable or member) is never an error; it
//! resolves to the handler's empty value.

use miette::{Diagnostic, NamedSource, SourceSpan};
use std::sync::Arc;
use thiserror::Error;

/// A named template source, shared between the lexer, the parser and every
/// diagnostic raised for this template.
#[derive(Debug, Clone)]
pub struct TemplateSource {
    name: String,
    source: Arc<String>,
}

impl TemplateSource {
    pub fn new(name: impl Into<String>, source: Arc<String>) -> Self {
        Self {
            name: name.into(),
            source,
        }
    }

    /// Name shown in diagnostics
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw template text
    pub fn source(&self) -> &Arc<String> {
        &self.source
    }

    /// Build a `NamedSource` for a diagnostic
    pub fn named_source(&self) -> NamedSource<String> {
        NamedSource::new(&self.name, (*self.source).clone())
    }
}

/// Malformed token: unterminated string or directive, invalid character.
#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(tarragon::lex))]
pub struct LexError {
    pub message: String,
    #[label("here")]
    pub span: SourceSpan,
    #[source_code]
    pub src: NamedSource<String>,
}

/// Unexpected token, with a description of what would have been accepted.
#[derive(Debug, Error, Diagnostic)]
#[error("unexpected {found}, expected {expected}")]
#[diagnostic(code(tarragon::syntax))]
pub struct SyntaxError {
    pub found: String,
    pub expected: String,
    #[label("unexpected token")]
    pub span: SourceSpan,
    #[source_code]
    pub src: NamedSource<String>,
}

/// Expression nesting exceeded the parser's depth limit.
#[derive(Debug, Error, Diagnostic)]
#[error("expression nesting exceeds the maximum depth of {limit}")]
#[diagnostic(code(tarragon::stack_overflow))]
pub struct StackOverflow {
    pub limit: usize,
    #[label("nested too deeply")]
    pub span: SourceSpan,
    #[source_code]
    pub src: NamedSource<String>,
}

/// The back end could not lower the syntax tree, e.g. a comparison between
/// operands of different concrete types.
#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(tarragon::compile))]
pub struct CompileError {
    pub message: String,
    #[label("in this expression")]
    pub span: SourceSpan,
    #[source_code]
    pub src: NamedSource<String>,
}

/// Error raised while a compiled template executes. Carries no source span:
/// these surface from emitted code, far away from the template text. They
/// abort the current `process` call and nothing else.
#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(tarragon::runtime))]
pub struct RuntimeError {
    pub message: String,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_source() {
        let src = TemplateSource::new("greeting", Arc::new("hi {$name}".to_string()));
        assert_eq!(src.name(), "greeting");
        assert_eq!(src.source().as_str(), "hi {$name}");
    }

    #[test]
    fn test_runtime_error_message() {
        let err = RuntimeError::new("Division by zero");
        assert_eq!(err.to_string(), "Division by zero");
    }
}
