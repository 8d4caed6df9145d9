//! tarragon - a Smarty-style template engine
//!
//! Templates mix literal text with brace-delimited directives. A template is
//! compiled once into bytecode and rendered many times against a data
//! environment; it can also be emitted as C source for ahead-of-time
//! compilation into a loadable shared object.
//!
//! # Syntax overview
//!
//! ```text
//! {$var}                         - variable output (escaped per {mode})
//! {$a.b[$i]|modifier:arg}        - members, subscripts, modifier chains
//! {if ...}{elseif ...}{else}{/if}
//! {foreach $v in $list}...{foreachelse}...{/foreach}
//! {foreach $map as $value => $key}...{/foreach}
//! {assign expr to $v}  {$v=expr} - local assignments
//! {mode html}  {escape}          - output escaper selection
//! {literal}...{/literal}         - verbatim text
//! ```
//!
//! # Example
//!
//! ```
//! use tarragon::{Data, Template};
//!
//! fn run() -> miette::Result<()> {
//! let template = Template::new("Hello, {$name}!")?;
//! let mut data = Data::new();
//! data.assign("name", "World");
//!
//! assert_eq!(template.process(&data)?, "Hello, World!");
//! assert!(template.personalized());
//! # Ok(())
//! # }
//! # run().unwrap();
//! ```

pub mod ast;
pub mod bytecode;
pub mod callbacks;
pub mod ccode;
pub mod data;
pub mod error;
pub mod escaper;
pub mod generator;
pub mod handler;
pub mod lexer;
pub mod modifier;
pub mod parser;
pub mod program;
pub mod template;
pub mod value;

pub use data::Data;
pub use error::{CompileError, LexError, RuntimeError, StackOverflow, SyntaxError};
pub use escaper::Escaper;
pub use handler::Handler;
pub use modifier::Modifier;
pub use template::{Executor, Template};
pub use value::{CustomValue, Value, ValueIterator, VariantValue};
