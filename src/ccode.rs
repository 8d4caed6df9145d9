//! The C-source back end
//!
//! Walks the syntax tree through the same generator interface as the
//! bytecode back end, but emits portable C that mirrors the tree one-to-one
//! with a numbered local per sub-expression. Compiled into a shared object,
//! the artifact exposes `show_template` plus a `personalized` flag and calls
//! back into the engine through the `tarragon_callbacks` record; loading it
//! is the embedder's business.
//!
//! Iteration is emitted as a `member_iter` while-loop, the keyed-loop half
//! of the callback ABI (the bytecode back end uses the explicit iterator
//! half).

use crate::ast::{
    Expression, Modifiers, StaticType, Statements, SyntaxTree, Variable, comparison_type,
};
use crate::error::{CompileError, TemplateSource};
use crate::generator::Generator;
use miette::Result;

/// One operand on the emission stack: the names of the locals holding it
enum COperand {
    Value(String),
    Int(String),
    Double(String),
    Str { data: String, len: String },
}

/// C source emitter.
pub struct CCode {
    source: TemplateSource,
    out: String,
    indent: usize,
    next_local: usize,
    stack: Vec<COperand>,
}

impl CCode {
    /// Emit the C rendition of a template
    pub fn generate(tree: &SyntaxTree, source: TemplateSource) -> Result<String> {
        let mut code = CCode {
            source,
            out: String::new(),
            indent: 0,
            next_local: 0,
            stack: Vec::new(),
        };
        code.prologue(tree);
        tree.statements.generate(&mut code)?;
        code.epilogue();
        debug_assert!(code.stack.is_empty());
        Ok(code.out)
    }

    fn prologue(&mut self, tree: &SyntaxTree) {
        self.line("#include <math.h>");
        self.line("#include <stdint.h>");
        self.line("#include <stdio.h>");
        self.line("#include <stdlib.h>");
        self.line("");
        self.line("#include <tarragon/callbacks.h>");
        self.line("");
        self.line(&format!(
            "unsigned char personalized = {};",
            u8::from(tree.personalized)
        ));
        self.line(&format!(
            "const char *template_encoding = \"{}\";",
            tree.mode.as_deref().unwrap_or("raw")
        ));
        self.line("");
        self.line("void show_template(const struct tarragon_callbacks *callbacks, void *userdata) {");
        self.indent = 1;
    }

    fn epilogue(&mut self) {
        self.indent = 0;
        self.line("}");
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn local(&mut self) -> usize {
        self.next_local += 1;
        self.next_local
    }

    // stack plumbing; generation is structural, so a shape mismatch here is
    // a bug in the generator dispatch, not in the template

    fn pop_value(&mut self) -> String {
        match self.stack.pop() {
            Some(COperand::Value(name)) => name,
            _ => unreachable!("expected a value operand"),
        }
    }

    fn pop_int(&mut self) -> String {
        match self.stack.pop() {
            Some(COperand::Int(name)) => name,
            _ => unreachable!("expected an integer operand"),
        }
    }

    fn pop_double(&mut self) -> String {
        match self.stack.pop() {
            Some(COperand::Double(name)) => name,
            _ => unreachable!("expected a double operand"),
        }
    }

    fn pop_str(&mut self) -> (String, String) {
        match self.stack.pop() {
            Some(COperand::Str { data, len }) => (data, len),
            _ => unreachable!("expected a string operand"),
        }
    }

    /// Emit `int64_t nN = <expr>;` and push the operand
    fn push_int_expr(&mut self, expr: &str) {
        let id = self.local();
        self.line(&format!("int64_t n{id} = {expr};"));
        self.stack.push(COperand::Int(format!("n{id}")));
    }

    /// Emit `double dN = <expr>;` and push the operand
    fn push_double_expr(&mut self, expr: &str) {
        let id = self.local();
        self.line(&format!("double d{id} = {expr};"));
        self.stack.push(COperand::Double(format!("d{id}")));
    }

    /// Emit `void *vN = <expr>;` and push the operand
    fn push_value_expr(&mut self, expr: &str) {
        let id = self.local();
        self.line(&format!("void *v{id} = {expr};"));
        self.stack.push(COperand::Value(format!("v{id}")));
    }

    fn compile_error(&self, message: String, span: crate::ast::Span) -> miette::Report {
        CompileError {
            message,
            span,
            src: self.source.named_source(),
        }
        .into()
    }

    fn arithmetic(
        &mut self,
        left: &Expression,
        right: &Expression,
        operator: char,
    ) -> Result<()> {
        let double = left.static_type() == StaticType::Double
            || right.static_type() == StaticType::Double;
        if double {
            left.double(self)?;
            right.double(self)?;
            let b = self.pop_double();
            let a = self.pop_double();
            if operator == '%' {
                // no % on doubles in C
                self.push_double_expr(&format!("fmod({a}, {b})"));
            } else {
                self.push_double_expr(&format!("({a} {operator} {b})"));
            }
        } else {
            left.numeric(self)?;
            right.numeric(self)?;
            let b = self.pop_int();
            let a = self.pop_int();
            self.push_int_expr(&format!("({a} {operator} {b})"));
        }
        Ok(())
    }

    fn comparison(&mut self, operator: &str, left: &Expression, right: &Expression) -> Result<()> {
        let span = crate::ast::span(
            left.span().offset(),
            right.span().offset() + right.span().len() - left.span().offset(),
        );
        let Some(unified) = comparison_type(left, right) else {
            return Err(self.compile_error("cannot compare operands of different types".to_string(), span));
        };
        match unified {
            StaticType::String => {
                if operator != "==" && operator != "!=" {
                    return Err(self.compile_error(
                        "string comparison supports == and != only".to_string(),
                        span,
                    ));
                }
                left.string(self)?;
                right.string(self)?;
                let (b, bl) = self.pop_str();
                let (a, al) = self.pop_str();
                let bang = if operator == "!=" { "!" } else { "" };
                self.push_int_expr(&format!(
                    "{bang}callbacks->strcmp(userdata, {a}, {al}, {b}, {bl})"
                ));
            }
            StaticType::Double => {
                left.double(self)?;
                right.double(self)?;
                let b = self.pop_double();
                let a = self.pop_double();
                self.push_int_expr(&format!("({a} {operator} {b})"));
            }
            StaticType::Boolean => {
                left.boolean(self)?;
                right.boolean(self)?;
                let b = self.pop_int();
                let a = self.pop_int();
                self.push_int_expr(&format!("({a} {operator} {b})"));
            }
            _ => {
                left.numeric(self)?;
                right.numeric(self)?;
                let b = self.pop_int();
                let a = self.pop_int();
                self.push_int_expr(&format!("({a} {operator} {b})"));
            }
        }
        Ok(())
    }
}

/// Quote a string for a C source file; the raw byte length is what gets
/// passed next to it.
fn c_quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    for &b in text.as_bytes() {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\{b:03o}")),
        }
    }
    out
}

impl Generator for CCode {
    fn raw(&mut self, text: &str) -> Result<()> {
        self.line(&format!(
            "callbacks->write(userdata, \"{}\", {});",
            c_quote(text),
            text.len()
        ));
        Ok(())
    }

    fn output(&mut self, variable: &Variable) -> Result<()> {
        variable.pointer(self)?;
        let value = self.pop_value();
        self.line(&format!("callbacks->output(userdata, {value});"));
        Ok(())
    }

    fn write(&mut self, expression: &Expression) -> Result<()> {
        expression.string(self)?;
        let (data, len) = self.pop_str();
        self.line(&format!("callbacks->write(userdata, {data}, {len});"));
        Ok(())
    }

    fn condition(
        &mut self,
        condition: &Expression,
        true_statements: &Statements,
        false_statements: Option<&Statements>,
    ) -> Result<()> {
        condition.boolean(self)?;
        let cond = self.pop_int();
        self.line(&format!("if ({cond}) {{"));
        self.indent += 1;
        true_statements.generate(self)?;
        self.indent -= 1;
        if let Some(false_statements) = false_statements {
            self.line("} else {");
            self.indent += 1;
            false_statements.generate(self)?;
            self.indent -= 1;
        }
        self.line("}");
        Ok(())
    }

    fn var_pointer(&mut self, name: &str) -> Result<()> {
        let expr = format!(
            "callbacks->variable(userdata, \"{}\", {})",
            c_quote(name),
            name.len()
        );
        self.push_value_expr(&expr);
        Ok(())
    }

    fn var_pointer_member(&mut self, parent: &Variable, name: &str) -> Result<()> {
        parent.pointer(self)?;
        let value = self.pop_value();
        let expr = format!(
            "callbacks->member(userdata, {value}, \"{}\", {})",
            c_quote(name),
            name.len()
        );
        self.push_value_expr(&expr);
        Ok(())
    }

    fn var_pointer_expression(&mut self, parent: &Variable, index: &Expression) -> Result<()> {
        parent.pointer(self)?;
        match index.static_type() {
            StaticType::Integer | StaticType::Double => {
                index.numeric(self)?;
                let position = self.pop_int();
                let value = self.pop_value();
                let expr = format!("callbacks->member_at(userdata, {value}, {position})");
                self.push_value_expr(&expr);
            }
            _ => {
                index.string(self)?;
                let (data, len) = self.pop_str();
                let value = self.pop_value();
                let expr = format!("callbacks->member(userdata, {value}, {data}, {len})");
                self.push_value_expr(&expr);
            }
        }
        Ok(())
    }

    fn string_literal(&mut self, value: &str) -> Result<()> {
        let id = self.local();
        self.line(&format!("const char *s{id} = \"{}\";", c_quote(value)));
        self.line(&format!("uint64_t l{id} = {};", value.len()));
        self.stack.push(COperand::Str {
            data: format!("s{id}"),
            len: format!("l{id}"),
        });
        Ok(())
    }

    fn numeric_literal(&mut self, value: i64) -> Result<()> {
        self.push_int_expr(&format!("INT64_C({value})"));
        Ok(())
    }

    fn double_literal(&mut self, value: f64) -> Result<()> {
        self.push_double_expr(&format!("{value:?}"));
        Ok(())
    }

    fn string_variable(&mut self, variable: &Variable) -> Result<()> {
        variable.pointer(self)?;
        let value = self.pop_value();
        let id = self.local();
        self.line(&format!(
            "const char *s{id} = callbacks->to_string(userdata, {value});"
        ));
        self.line(&format!(
            "uint64_t l{id} = callbacks->size(userdata, {value});"
        ));
        self.stack.push(COperand::Str {
            data: format!("s{id}"),
            len: format!("l{id}"),
        });
        Ok(())
    }

    fn numeric_variable(&mut self, variable: &Variable) -> Result<()> {
        variable.pointer(self)?;
        let value = self.pop_value();
        self.push_int_expr(&format!("callbacks->to_numeric(userdata, {value})"));
        Ok(())
    }

    fn boolean_variable(&mut self, variable: &Variable) -> Result<()> {
        variable.pointer(self)?;
        let value = self.pop_value();
        self.push_int_expr(&format!("callbacks->to_boolean(userdata, {value})"));
        Ok(())
    }

    fn double_variable(&mut self, variable: &Variable) -> Result<()> {
        variable.pointer(self)?;
        let value = self.pop_value();
        self.push_double_expr(&format!("callbacks->to_double(userdata, {value})"));
        Ok(())
    }

    fn numeric_to_string(&mut self, expression: &Expression) -> Result<()> {
        expression.numeric(self)?;
        let value = self.pop_int();
        let id = self.local();
        self.line(&format!("char b{id}[32];"));
        self.line(&format!(
            "uint64_t l{id} = (uint64_t)snprintf(b{id}, sizeof(b{id}), \"%lld\", (long long){value});"
        ));
        self.stack.push(COperand::Str {
            data: format!("b{id}"),
            len: format!("l{id}"),
        });
        Ok(())
    }

    fn double_to_string(&mut self, expression: &Expression) -> Result<()> {
        expression.double(self)?;
        let value = self.pop_double();
        let id = self.local();
        self.line(&format!("char b{id}[32];"));
        self.line(&format!(
            "uint64_t l{id} = (uint64_t)snprintf(b{id}, sizeof(b{id}), \"%g\", {value});"
        ));
        self.stack.push(COperand::Str {
            data: format!("b{id}"),
            len: format!("l{id}"),
        });
        Ok(())
    }

    fn boolean_to_string(&mut self, expression: &Expression) -> Result<()> {
        expression.boolean(self)?;
        let value = self.pop_int();
        let id = self.local();
        self.line(&format!(
            "const char *s{id} = {value} ? \"true\" : \"false\";"
        ));
        self.line(&format!("uint64_t l{id} = {value} ? 4 : 5;"));
        self.stack.push(COperand::Str {
            data: format!("s{id}"),
            len: format!("l{id}"),
        });
        Ok(())
    }

    fn string_to_numeric(&mut self, expression: &Expression) -> Result<()> {
        expression.string(self)?;
        let (data, _len) = self.pop_str();
        self.push_int_expr(&format!("(int64_t)strtoll({data}, 0, 10)"));
        Ok(())
    }

    fn double_to_numeric(&mut self, expression: &Expression) -> Result<()> {
        expression.double(self)?;
        let value = self.pop_double();
        self.push_int_expr(&format!("(int64_t){value}"));
        Ok(())
    }

    fn numeric_to_double(&mut self, expression: &Expression) -> Result<()> {
        expression.numeric(self)?;
        let value = self.pop_int();
        self.push_double_expr(&format!("(double){value}"));
        Ok(())
    }

    fn double_to_boolean(&mut self, expression: &Expression) -> Result<()> {
        expression.double(self)?;
        let value = self.pop_double();
        self.push_int_expr(&format!("({value} != 0.0)"));
        Ok(())
    }

    fn plus(&mut self, left: &Expression, right: &Expression) -> Result<()> {
        self.arithmetic(left, right, '+')
    }

    fn minus(&mut self, left: &Expression, right: &Expression) -> Result<()> {
        self.arithmetic(left, right, '-')
    }

    fn multiply(&mut self, left: &Expression, right: &Expression) -> Result<()> {
        self.arithmetic(left, right, '*')
    }

    fn divide(&mut self, left: &Expression, right: &Expression) -> Result<()> {
        self.arithmetic(left, right, '/')
    }

    fn modulo(&mut self, left: &Expression, right: &Expression) -> Result<()> {
        self.arithmetic(left, right, '%')
    }

    fn equals(&mut self, left: &Expression, right: &Expression) -> Result<()> {
        self.comparison("==", left, right)
    }

    fn not_equals(&mut self, left: &Expression, right: &Expression) -> Result<()> {
        self.comparison("!=", left, right)
    }

    fn greater(&mut self, left: &Expression, right: &Expression) -> Result<()> {
        self.comparison(">", left, right)
    }

    fn greater_equals(&mut self, left: &Expression, right: &Expression) -> Result<()> {
        self.comparison(">=", left, right)
    }

    fn lesser(&mut self, left: &Expression, right: &Expression) -> Result<()> {
        self.comparison("<", left, right)
    }

    fn lesser_equals(&mut self, left: &Expression, right: &Expression) -> Result<()> {
        self.comparison("<=", left, right)
    }

    fn boolean_and(&mut self, left: &Expression, right: &Expression) -> Result<()> {
        let id = self.local();
        self.line(&format!("int64_t n{id} = 0;"));
        left.boolean(self)?;
        let a = self.pop_int();
        self.line(&format!("if ({a}) {{"));
        self.indent += 1;
        right.boolean(self)?;
        let b = self.pop_int();
        self.line(&format!("n{id} = ({b} != 0);"));
        self.indent -= 1;
        self.line("}");
        self.stack.push(COperand::Int(format!("n{id}")));
        Ok(())
    }

    fn boolean_or(&mut self, left: &Expression, right: &Expression) -> Result<()> {
        let id = self.local();
        self.line(&format!("int64_t n{id} = 1;"));
        left.boolean(self)?;
        let a = self.pop_int();
        self.line(&format!("if (!{a}) {{"));
        self.indent += 1;
        right.boolean(self)?;
        let b = self.pop_int();
        self.line(&format!("n{id} = ({b} != 0);"));
        self.indent -= 1;
        self.line("}");
        self.stack.push(COperand::Int(format!("n{id}")));
        Ok(())
    }

    fn not(&mut self, expression: &Expression) -> Result<()> {
        expression.boolean(self)?;
        let value = self.pop_int();
        self.push_int_expr(&format!("!{value}"));
        Ok(())
    }

    fn modifiers(&mut self, modifiers: &Modifiers, variable: &Variable) -> Result<()> {
        variable.pointer(self)?;
        for application in &modifiers.applications {
            if !application.params.is_empty() {
                return Err(self.compile_error(
                    "modifier parameters are not representable in generated source".to_string(),
                    application.span,
                ));
            }
            let value = self.pop_value();
            let id = self.local();
            self.line(&format!(
                "void *m{id} = callbacks->modifier(userdata, \"{}\", {});",
                c_quote(&application.name),
                application.name.len()
            ));
            let expr = format!("callbacks->modify_variable(userdata, m{id}, {value})");
            self.push_value_expr(&expr);
        }
        Ok(())
    }

    fn foreach(
        &mut self,
        source: &Variable,
        value_name: &str,
        key_name: Option<&str>,
        body: &Statements,
        else_body: Option<&Statements>,
    ) -> Result<()> {
        source.pointer(self)?;
        let value = self.pop_value();

        let keyvar = match key_name {
            Some(name) => format!("\"{}\", {}", c_quote(name), name.len()),
            None => "0, 0".to_string(),
        };
        let iterate = format!(
            "callbacks->member_iter(userdata, {value}, \"{}\", {}, {keyvar})",
            c_quote(value_name),
            value_name.len()
        );

        match else_body {
            None => {
                self.line(&format!("while ({iterate}) {{"));
                self.indent += 1;
                body.generate(self)?;
                self.indent -= 1;
                self.line("}");
            }
            Some(else_body) => {
                let guard = self.local();
                self.line(&format!("int64_t g{guard} = 0;"));
                self.line(&format!("while ({iterate}) {{"));
                self.indent += 1;
                self.line(&format!("g{guard} = 1;"));
                body.generate(self)?;
                self.indent -= 1;
                self.line("}");
                self.line(&format!("if (!g{guard}) {{"));
                self.indent += 1;
                else_body.generate(self)?;
                self.indent -= 1;
                self.line("}");
            }
        }
        Ok(())
    }

    fn assign(&mut self, name: &str, expression: &Expression) -> Result<()> {
        let quoted = c_quote(name);
        let name_len = name.len();
        match expression.static_type() {
            StaticType::Value => {
                let Expression::Variable(variable) = expression else {
                    unreachable!("only variables have the Value static type");
                };
                variable.pointer(self)?;
                let value = self.pop_value();
                self.line(&format!(
                    "callbacks->assign(userdata, \"{quoted}\", {name_len}, {value});"
                ));
            }
            StaticType::Integer => {
                expression.numeric(self)?;
                let value = self.pop_int();
                self.line(&format!(
                    "callbacks->assign_numeric(userdata, {value}, \"{quoted}\", {name_len});"
                ));
            }
            StaticType::Double => {
                expression.double(self)?;
                let value = self.pop_double();
                self.line(&format!(
                    "callbacks->assign_double(userdata, {value}, \"{quoted}\", {name_len});"
                ));
            }
            StaticType::Boolean => {
                expression.boolean(self)?;
                let value = self.pop_int();
                self.line(&format!(
                    "callbacks->assign_boolean(userdata, ({value} != 0), \"{quoted}\", {name_len});"
                ));
            }
            StaticType::String => {
                expression.string(self)?;
                let (data, len) = self.pop_str();
                self.line(&format!(
                    "callbacks->assign_string(userdata, {data}, {len}, \"{quoted}\", {name_len});"
                ));
            }
        }
        Ok(())
    }
}
