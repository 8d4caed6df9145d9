//! The code-generator interface
//!
//! [`Generator`] is the only coupling point between the syntax tree and a
//! back end: the tree drives the generator through the `generate` methods in
//! [`ast`](crate::ast), and adding a back end requires no tree change.
//!
//! # Stack discipline
//!
//! Back ends compose sub-expressions over an operand stack. Every
//! implementation honors the same contract:
//!
//! - `var_pointer*` and `modifiers` leave one value handle.
//! - `string_*` leave one string operand, carrying buffer and length (the
//!   C back end materializes the pair as two locals).
//! - `numeric_*` and `boolean_*` leave one integer; booleans are the
//!   integers zero and one.
//! - `double_*` leave one double.
//! - Binary operations consume two operands and leave one.
//! - `raw`, `output`, `write`, `condition`, `foreach` and `assign` consume
//!   their operands and leave nothing.
//! - When a statement finishes, the stack is empty.
//!
//! Methods return a `Result` so a back end can refuse a construct it cannot
//! lower (a [`CompileError`](crate::error::CompileError), e.g. comparing a
//! number against a string).

use crate::ast::{Expression, Modifiers, Statements, Variable};
use miette::Result;

pub trait Generator {
    /// Emit literal output
    fn raw(&mut self, text: &str) -> Result<()>;

    /// Emit a variable through the active escaper
    fn output(&mut self, variable: &Variable) -> Result<()>;

    /// Emit an expression's string form without escaping
    fn write(&mut self, expression: &Expression) -> Result<()>;

    /// Emit an if/else
    fn condition(
        &mut self,
        condition: &Expression,
        true_statements: &Statements,
        false_statements: Option<&Statements>,
    ) -> Result<()>;

    /// Resolve a variable by name
    fn var_pointer(&mut self, name: &str) -> Result<()>;

    /// Resolve a member of a variable by literal name
    fn var_pointer_member(&mut self, parent: &Variable, name: &str) -> Result<()>;

    /// Resolve a member of a variable by computed subscript
    fn var_pointer_expression(&mut self, parent: &Variable, index: &Expression) -> Result<()>;

    // Literal constants
    fn string_literal(&mut self, value: &str) -> Result<()>;
    fn numeric_literal(&mut self, value: i64) -> Result<()>;
    fn double_literal(&mut self, value: f64) -> Result<()>;

    // Coerce a resolved variable to a primitive
    fn string_variable(&mut self, variable: &Variable) -> Result<()>;
    fn numeric_variable(&mut self, variable: &Variable) -> Result<()>;
    fn boolean_variable(&mut self, variable: &Variable) -> Result<()>;
    fn double_variable(&mut self, variable: &Variable) -> Result<()>;

    // Bridges between primitive representations
    fn numeric_to_string(&mut self, expression: &Expression) -> Result<()>;
    fn double_to_string(&mut self, expression: &Expression) -> Result<()>;
    fn boolean_to_string(&mut self, expression: &Expression) -> Result<()>;
    fn string_to_numeric(&mut self, expression: &Expression) -> Result<()>;
    fn double_to_numeric(&mut self, expression: &Expression) -> Result<()>;
    fn numeric_to_double(&mut self, expression: &Expression) -> Result<()>;
    fn double_to_boolean(&mut self, expression: &Expression) -> Result<()>;

    // Arithmetic
    fn plus(&mut self, left: &Expression, right: &Expression) -> Result<()>;
    fn minus(&mut self, left: &Expression, right: &Expression) -> Result<()>;
    fn multiply(&mut self, left: &Expression, right: &Expression) -> Result<()>;
    fn divide(&mut self, left: &Expression, right: &Expression) -> Result<()>;
    fn modulo(&mut self, left: &Expression, right: &Expression) -> Result<()>;

    // Comparison
    fn equals(&mut self, left: &Expression, right: &Expression) -> Result<()>;
    fn not_equals(&mut self, left: &Expression, right: &Expression) -> Result<()>;
    fn greater(&mut self, left: &Expression, right: &Expression) -> Result<()>;
    fn greater_equals(&mut self, left: &Expression, right: &Expression) -> Result<()>;
    fn lesser(&mut self, left: &Expression, right: &Expression) -> Result<()>;
    fn lesser_equals(&mut self, left: &Expression, right: &Expression) -> Result<()>;

    // Boolean, with short-circuit evaluation of the right operand
    fn boolean_and(&mut self, left: &Expression, right: &Expression) -> Result<()>;
    fn boolean_or(&mut self, left: &Expression, right: &Expression) -> Result<()>;
    fn not(&mut self, expression: &Expression) -> Result<()>;

    /// Apply a chain of modifiers to a variable
    fn modifiers(&mut self, modifiers: &Modifiers, variable: &Variable) -> Result<()>;

    /// Emit iteration over a variable
    fn foreach(
        &mut self,
        source: &Variable,
        value_name: &str,
        key_name: Option<&str>,
        body: &Statements,
        else_body: Option<&Statements>,
    ) -> Result<()>;

    /// Emit an assignment into the local scope
    fn assign(&mut self, name: &str, expression: &Expression) -> Result<()>;
}
