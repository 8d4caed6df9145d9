//! The bytecode back end
//!
//! Walks the syntax tree through the generator interface and lowers it to a
//! [`Program`] executed by the stack machine in [`program`](crate::program).
//! Labels are created while emitting branches and patched to instruction
//! indexes once generation finishes.
//!
//! Comparison operands are unified over their static types here, at lowering
//! time: comparing a number against a string is a [`CompileError`], as is
//! ordering two strings (only equality goes through the `strcmp` callback).

use crate::ast::{
    Expression, Modifiers, StaticType, Statements, SyntaxTree, Variable, comparison_type,
};
use crate::callbacks::CALLBACKS;
use crate::ccode::CCode;
use crate::error::{CompileError, RuntimeError, TemplateSource};
use crate::generator::Generator;
use crate::handler::Handler;
use crate::program::{Instr, Program};
use crate::template::Executor;
use miette::Result;
use std::collections::HashMap;
use tracing::debug;

/// A template lowered to bytecode, ready to render.
#[derive(Debug)]
pub struct Bytecode {
    tree: SyntaxTree,
    source: TemplateSource,
    program: Program,
}

impl Bytecode {
    pub fn new(tree: SyntaxTree, source: TemplateSource) -> Result<Self> {
        let mut builder = ProgramBuilder::new(source.clone());
        tree.statements.generate(&mut builder)?;
        let program = builder.finish();
        debug!(
            template = source.name(),
            instructions = program.len(),
            "template lowered to bytecode"
        );
        Ok(Self {
            tree,
            source,
            program,
        })
    }
}

impl Executor for Bytecode {
    fn process(&self, handler: &mut Handler<'_>) -> Result<(), RuntimeError> {
        self.program.run(handler, &CALLBACKS)
    }

    fn compile(&self) -> Result<String> {
        CCode::generate(&self.tree, self.source.clone())
    }

    fn personalized(&self) -> bool {
        self.tree.personalized
    }

    fn encoding(&self) -> Option<&str> {
        self.tree.mode.as_deref()
    }
}

/// Generator state while lowering one template
struct ProgramBuilder {
    source: TemplateSource,
    consts: Vec<String>,
    const_ids: HashMap<String, u32>,
    params: Vec<Vec<crate::value::VariantValue>>,
    instrs: Vec<Instr>,
    /// Bound position of each label; patched into jumps at the end
    labels: Vec<u32>,
}

impl ProgramBuilder {
    fn new(source: TemplateSource) -> Self {
        Self {
            source,
            consts: Vec::new(),
            const_ids: HashMap::new(),
            params: Vec::new(),
            instrs: Vec::new(),
            labels: Vec::new(),
        }
    }

    fn constant(&mut self, text: &str) -> u32 {
        if let Some(id) = self.const_ids.get(text) {
            return *id;
        }
        let id = self.consts.len() as u32;
        self.consts.push(text.to_string());
        self.const_ids.insert(text.to_string(), id);
        id
    }

    fn emit(&mut self, instr: Instr) {
        self.instrs.push(instr);
    }

    fn new_label(&mut self) -> u32 {
        self.labels.push(u32::MAX);
        (self.labels.len() - 1) as u32
    }

    fn bind(&mut self, label: u32) {
        self.labels[label as usize] = self.instrs.len() as u32;
    }

    /// Patch jump targets from label ids to instruction indexes
    fn finish(mut self) -> Program {
        for instr in &mut self.instrs {
            match instr {
                Instr::Jump(target) | Instr::JumpIfZero(target) | Instr::JumpIfNonZero(target) => {
                    *target = self.labels[*target as usize];
                }
                _ => {}
            }
        }
        Program {
            consts: self.consts,
            params: self.params,
            instrs: self.instrs,
        }
    }

    fn compile_error(&self, message: String, span: crate::ast::Span) -> miette::Report {
        CompileError {
            message,
            span,
            src: self.source.named_source(),
        }
        .into()
    }

    /// Emit an arithmetic operation, promoting to doubles when either
    /// operand is a double
    fn arithmetic(
        &mut self,
        left: &Expression,
        right: &Expression,
        int_op: Instr,
        double_op: Instr,
    ) -> Result<()> {
        let double = left.static_type() == StaticType::Double
            || right.static_type() == StaticType::Double;
        if double {
            left.double(self)?;
            right.double(self)?;
            self.emit(double_op);
        } else {
            left.numeric(self)?;
            right.numeric(self)?;
            self.emit(int_op);
        }
        Ok(())
    }

    /// Emit a comparison after unifying the operand types
    fn comparison(&mut self, op: CompareOp, left: &Expression, right: &Expression) -> Result<()> {
        let span = crate::ast::span(
            left.span().offset(),
            right.span().offset() + right.span().len() - left.span().offset(),
        );
        let Some(unified) = comparison_type(left, right) else {
            return Err(self.compile_error(
                format!(
                    "cannot compare {} against {}",
                    type_name(left.static_type()),
                    type_name(right.static_type())
                ),
                span,
            ));
        };
        match unified {
            StaticType::Boolean => {
                left.boolean(self)?;
                right.boolean(self)?;
                self.emit(op.int_instr());
            }
            StaticType::Double => {
                left.double(self)?;
                right.double(self)?;
                self.emit(op.double_instr());
            }
            StaticType::String => {
                let Some(instr) = op.string_instr() else {
                    return Err(self.compile_error(
                        "string comparison supports == and != only".to_string(),
                        span,
                    ));
                };
                left.string(self)?;
                right.string(self)?;
                self.emit(instr);
            }
            _ => {
                left.numeric(self)?;
                right.numeric(self)?;
                self.emit(op.int_instr());
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn int_instr(self) -> Instr {
        match self {
            CompareOp::Eq => Instr::EqInt,
            CompareOp::Ne => Instr::NeInt,
            CompareOp::Lt => Instr::LtInt,
            CompareOp::Le => Instr::LeInt,
            CompareOp::Gt => Instr::GtInt,
            CompareOp::Ge => Instr::GeInt,
        }
    }

    fn double_instr(self) -> Instr {
        match self {
            CompareOp::Eq => Instr::EqDouble,
            CompareOp::Ne => Instr::NeDouble,
            CompareOp::Lt => Instr::LtDouble,
            CompareOp::Le => Instr::LeDouble,
            CompareOp::Gt => Instr::GtDouble,
            CompareOp::Ge => Instr::GeDouble,
        }
    }

    fn string_instr(self) -> Option<Instr> {
        match self {
            CompareOp::Eq => Some(Instr::EqString),
            CompareOp::Ne => Some(Instr::NeString),
            _ => None,
        }
    }
}

fn type_name(static_type: StaticType) -> &'static str {
    match static_type {
        StaticType::Integer => "a number",
        StaticType::Double => "a floating point number",
        StaticType::String => "a string",
        StaticType::Boolean => "a boolean",
        StaticType::Value => "a value",
    }
}

impl Generator for ProgramBuilder {
    fn raw(&mut self, text: &str) -> Result<()> {
        let text = self.constant(text);
        self.emit(Instr::WriteRaw(text));
        Ok(())
    }

    fn output(&mut self, variable: &Variable) -> Result<()> {
        variable.pointer(self)?;
        self.emit(Instr::Output);
        Ok(())
    }

    fn write(&mut self, expression: &Expression) -> Result<()> {
        expression.string(self)?;
        self.emit(Instr::WriteString);
        Ok(())
    }

    fn condition(
        &mut self,
        condition: &Expression,
        true_statements: &Statements,
        false_statements: Option<&Statements>,
    ) -> Result<()> {
        condition.boolean(self)?;
        match false_statements {
            Some(false_statements) => {
                let else_label = self.new_label();
                let end_label = self.new_label();
                self.emit(Instr::JumpIfZero(else_label));
                true_statements.generate(self)?;
                self.emit(Instr::Jump(end_label));
                self.bind(else_label);
                false_statements.generate(self)?;
                self.bind(end_label);
            }
            None => {
                let end_label = self.new_label();
                self.emit(Instr::JumpIfZero(end_label));
                true_statements.generate(self)?;
                self.bind(end_label);
            }
        }
        Ok(())
    }

    fn var_pointer(&mut self, name: &str) -> Result<()> {
        let name = self.constant(name);
        self.emit(Instr::Variable(name));
        Ok(())
    }

    fn var_pointer_member(&mut self, parent: &Variable, name: &str) -> Result<()> {
        parent.pointer(self)?;
        let name = self.constant(name);
        self.emit(Instr::Member(name));
        Ok(())
    }

    fn var_pointer_expression(&mut self, parent: &Variable, index: &Expression) -> Result<()> {
        parent.pointer(self)?;
        match index.static_type() {
            StaticType::Integer | StaticType::Double => {
                index.numeric(self)?;
                self.emit(Instr::MemberAt);
            }
            // string and dynamic subscripts go through member-by-name
            _ => {
                index.string(self)?;
                self.emit(Instr::MemberStr);
            }
        }
        Ok(())
    }

    fn string_literal(&mut self, value: &str) -> Result<()> {
        let value = self.constant(value);
        self.emit(Instr::PushConstStr(value));
        Ok(())
    }

    fn numeric_literal(&mut self, value: i64) -> Result<()> {
        self.emit(Instr::PushConstInt(value));
        Ok(())
    }

    fn double_literal(&mut self, value: f64) -> Result<()> {
        self.emit(Instr::PushConstDouble(value));
        Ok(())
    }

    fn string_variable(&mut self, variable: &Variable) -> Result<()> {
        variable.pointer(self)?;
        self.emit(Instr::ToString);
        Ok(())
    }

    fn numeric_variable(&mut self, variable: &Variable) -> Result<()> {
        variable.pointer(self)?;
        self.emit(Instr::ToNumeric);
        Ok(())
    }

    fn boolean_variable(&mut self, variable: &Variable) -> Result<()> {
        variable.pointer(self)?;
        self.emit(Instr::ToBoolean);
        Ok(())
    }

    fn double_variable(&mut self, variable: &Variable) -> Result<()> {
        variable.pointer(self)?;
        self.emit(Instr::ToDouble);
        Ok(())
    }

    fn numeric_to_string(&mut self, expression: &Expression) -> Result<()> {
        expression.numeric(self)?;
        self.emit(Instr::NumericToString);
        Ok(())
    }

    fn double_to_string(&mut self, expression: &Expression) -> Result<()> {
        expression.double(self)?;
        self.emit(Instr::DoubleToString);
        Ok(())
    }

    fn boolean_to_string(&mut self, expression: &Expression) -> Result<()> {
        expression.boolean(self)?;
        self.emit(Instr::BooleanToString);
        Ok(())
    }

    fn string_to_numeric(&mut self, expression: &Expression) -> Result<()> {
        expression.string(self)?;
        self.emit(Instr::StringToNumeric);
        Ok(())
    }

    fn double_to_numeric(&mut self, expression: &Expression) -> Result<()> {
        expression.double(self)?;
        self.emit(Instr::DoubleToNumeric);
        Ok(())
    }

    fn numeric_to_double(&mut self, expression: &Expression) -> Result<()> {
        expression.numeric(self)?;
        self.emit(Instr::IntToDouble);
        Ok(())
    }

    fn double_to_boolean(&mut self, expression: &Expression) -> Result<()> {
        expression.double(self)?;
        self.emit(Instr::DoubleToBoolean);
        Ok(())
    }

    fn plus(&mut self, left: &Expression, right: &Expression) -> Result<()> {
        self.arithmetic(left, right, Instr::AddInt, Instr::AddDouble)
    }

    fn minus(&mut self, left: &Expression, right: &Expression) -> Result<()> {
        self.arithmetic(left, right, Instr::SubInt, Instr::SubDouble)
    }

    fn multiply(&mut self, left: &Expression, right: &Expression) -> Result<()> {
        self.arithmetic(left, right, Instr::MulInt, Instr::MulDouble)
    }

    fn divide(&mut self, left: &Expression, right: &Expression) -> Result<()> {
        self.arithmetic(left, right, Instr::DivInt, Instr::DivDouble)
    }

    fn modulo(&mut self, left: &Expression, right: &Expression) -> Result<()> {
        self.arithmetic(left, right, Instr::ModInt, Instr::ModDouble)
    }

    fn equals(&mut self, left: &Expression, right: &Expression) -> Result<()> {
        self.comparison(CompareOp::Eq, left, right)
    }

    fn not_equals(&mut self, left: &Expression, right: &Expression) -> Result<()> {
        self.comparison(CompareOp::Ne, left, right)
    }

    fn greater(&mut self, left: &Expression, right: &Expression) -> Result<()> {
        self.comparison(CompareOp::Gt, left, right)
    }

    fn greater_equals(&mut self, left: &Expression, right: &Expression) -> Result<()> {
        self.comparison(CompareOp::Ge, left, right)
    }

    fn lesser(&mut self, left: &Expression, right: &Expression) -> Result<()> {
        self.comparison(CompareOp::Lt, left, right)
    }

    fn lesser_equals(&mut self, left: &Expression, right: &Expression) -> Result<()> {
        self.comparison(CompareOp::Le, left, right)
    }

    fn boolean_and(&mut self, left: &Expression, right: &Expression) -> Result<()> {
        let false_label = self.new_label();
        let end_label = self.new_label();
        left.boolean(self)?;
        self.emit(Instr::JumpIfZero(false_label));
        right.boolean(self)?;
        self.emit(Instr::JumpIfZero(false_label));
        self.emit(Instr::PushConstInt(1));
        self.emit(Instr::Jump(end_label));
        self.bind(false_label);
        self.emit(Instr::PushConstInt(0));
        self.bind(end_label);
        Ok(())
    }

    fn boolean_or(&mut self, left: &Expression, right: &Expression) -> Result<()> {
        let true_label = self.new_label();
        let end_label = self.new_label();
        left.boolean(self)?;
        self.emit(Instr::JumpIfNonZero(true_label));
        right.boolean(self)?;
        self.emit(Instr::JumpIfNonZero(true_label));
        self.emit(Instr::PushConstInt(0));
        self.emit(Instr::Jump(end_label));
        self.bind(true_label);
        self.emit(Instr::PushConstInt(1));
        self.bind(end_label);
        Ok(())
    }

    fn not(&mut self, expression: &Expression) -> Result<()> {
        expression.boolean(self)?;
        self.emit(Instr::Not);
        Ok(())
    }

    fn modifiers(&mut self, modifiers: &Modifiers, variable: &Variable) -> Result<()> {
        variable.pointer(self)?;
        for application in &modifiers.applications {
            let name = self.constant(&application.name);
            let params = self.params.len() as u32;
            self.params.push(
                application
                    .params
                    .iter()
                    .map(|param| param.to_value())
                    .collect(),
            );
            self.emit(Instr::ApplyModifier { name, params });
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
        let value_const = self.constant(value_name);
        let key_const = key_name.map(|name| self.constant(name));

        source.pointer(self)?;
        self.emit(Instr::CreateIterator);

        let loop_label = self.new_label();
        let else_label = self.new_label();
        let end_label = self.new_label();

        self.emit(Instr::IterValid);
        self.emit(Instr::JumpIfZero(else_label));

        self.bind(loop_label);
        self.emit(Instr::IterValue(value_const));
        if let Some(key_const) = key_const {
            self.emit(Instr::IterKey(key_const));
        }
        body.generate(self)?;
        self.emit(Instr::IterNext);
        self.emit(Instr::IterValid);
        self.emit(Instr::JumpIfNonZero(loop_label));

        // bindings only exist when the body ran at least once
        self.emit(Instr::ReleaseIterator {
            value: Some(value_const),
            key: key_const,
        });
        self.emit(Instr::Jump(end_label));

        self.bind(else_label);
        self.emit(Instr::ReleaseIterator {
            value: None,
            key: None,
        });
        if let Some(else_body) = else_body {
            else_body.generate(self)?;
        }
        self.bind(end_label);
        Ok(())
    }

    fn assign(&mut self, name: &str, expression: &Expression) -> Result<()> {
        let name = self.constant(name);
        match expression.static_type() {
            StaticType::Value => {
                let Expression::Variable(variable) = expression else {
                    unreachable!("only variables have the Value static type");
                };
                variable.pointer(self)?;
                self.emit(Instr::AssignValue(name));
            }
            StaticType::Integer => {
                expression.numeric(self)?;
                self.emit(Instr::AssignNumeric(name));
            }
            StaticType::Double => {
                expression.double(self)?;
                self.emit(Instr::AssignDouble(name));
            }
            StaticType::Boolean => {
                expression.boolean(self)?;
                self.emit(Instr::AssignBoolean(name));
            }
            StaticType::String => {
                expression.string(self)?;
                self.emit(Instr::AssignString(name));
            }
        }
        Ok(())
    }
}
