//! Templates and executors
//!
//! A [`Template`] owns a compiled rendition of its source behind the
//! [`Executor`] seam. The bundled executor interprets bytecode; an executor
//! wrapping a pre-compiled shared object would implement the same trait, but
//! dynamic loading is the embedder's business, not this crate's.

use crate::bytecode::Bytecode;
use crate::data::Data;
use crate::error::{RuntimeError, TemplateSource};
use crate::escaper::Escaper;
use crate::handler::Handler;
use crate::parser::Parser;
use miette::Result;
use std::sync::Arc;
use tracing::debug;

/// A compiled template, ready to render.
pub trait Executor: Send + Sync {
    /// Render into the handler
    fn process(&self, handler: &mut Handler<'_>) -> Result<(), RuntimeError>;

    /// Emit the C rendition of this template
    fn compile(&self) -> Result<String>;

    /// Does the template reference any variable?
    fn personalized(&self) -> bool;

    /// Escaper chosen by the template's `{mode ...}` directive
    fn encoding(&self) -> Option<&str>;
}

/// A parsed and compiled template. Immutable once constructed, and safe to
/// render from many threads at once, each with its own data object.
pub struct Template {
    executor: Box<dyn Executor>,
}

impl Template {
    /// Parse and compile a template
    pub fn new(source: impl Into<String>) -> Result<Self> {
        Self::named("template", source)
    }

    /// Parse and compile a template with a name for diagnostics
    pub fn named(name: impl Into<String>, source: impl Into<String>) -> Result<Self> {
        let source = TemplateSource::new(name, Arc::new(source.into()));
        let tree = Parser::new(source.clone()).parse()?;
        let executor = Bytecode::new(tree, source)?;
        Ok(Self {
            executor: Box::new(executor),
        })
    }

    /// Wrap a pre-compiled executor, e.g. a loaded shared object
    pub fn from_executor(executor: Box<dyn Executor>) -> Self {
        Self { executor }
    }

    /// Does the template reference any variable? Rendering a template that
    /// does not is independent of the data object.
    pub fn personalized(&self) -> bool {
        self.executor.personalized()
    }

    /// The output encoding requested by the template itself
    pub fn encoding(&self) -> Option<&str> {
        self.executor.encoding()
    }

    /// Emit the template as C source that can be compiled into a shared
    /// object exposing `show_template`
    pub fn compile(&self) -> Result<String> {
        self.executor.compile()
    }

    /// Render with the template's own encoding (or none)
    pub fn process(&self, data: &Data) -> Result<String> {
        self.process_internal(data, self.executor.encoding())
    }

    /// Render with an explicit output encoding, overriding the template's
    /// `{mode ...}` directive
    pub fn process_with_encoding(&self, data: &Data, encoding: &str) -> Result<String> {
        self.process_internal(data, Some(encoding))
    }

    fn process_internal(&self, data: &Data, encoding: Option<&str>) -> Result<String> {
        let escaper = encoding.map(Escaper::get).unwrap_or_default();
        let mut handler = Handler::new(data, escaper);
        self.executor.process(&mut handler)?;
        debug!(bytes = handler.output_so_far().len(), "template rendered");
        Ok(handler.into_output())
    }
}
