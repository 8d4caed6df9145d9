//! The instruction set and its stack machine
//!
//! A [`Program`] is what the bytecode back end lowers a template to: a
//! constant pool, per-chain modifier parameter lists, and a flat vector of
//! instructions. Execution drives a small operand stack against a
//! [`Handler`] through the callbacks record; when the last instruction
//! retires the stack is empty.
//!
//! Arithmetic is checked. Division by zero, the corner cases of 64-bit
//! signed arithmetic and a corrupted operand stack all surface as
//! [`RuntimeError`]s that abort only the current render.

use crate::callbacks::Callbacks;
use crate::error::RuntimeError;
use crate::handler::Handler;
use crate::value::VariantValue;

/// One instruction. String and name operands index the constant pool.
#[derive(Debug, Clone)]
pub(crate) enum Instr {
    /// Write a constant straight to the output
    WriteRaw(u32),
    /// Pop a string, write it unescaped
    WriteString,
    /// Pop a value, emit it through the escaper
    Output,

    PushConstStr(u32),
    PushConstInt(i64),
    PushConstDouble(f64),

    /// Push the variable with the given name
    Variable(u32),
    /// Pop a value, push its member with the given name
    Member(u32),
    /// Pop an index then a value, push the member at that position
    MemberAt,
    /// Pop a name string then a value, push the member with that name
    MemberStr,

    // Value coercions
    ToString,
    ToNumeric,
    ToBoolean,
    ToDouble,

    // Primitive bridges
    NumericToString,
    DoubleToString,
    BooleanToString,
    StringToNumeric,
    DoubleToNumeric,
    IntToDouble,
    DoubleToBoolean,

    // Integer arithmetic
    AddInt,
    SubInt,
    MulInt,
    DivInt,
    ModInt,

    // Double arithmetic
    AddDouble,
    SubDouble,
    MulDouble,
    DivDouble,
    ModDouble,

    // Integer (and boolean) comparison
    EqInt,
    NeInt,
    LtInt,
    LeInt,
    GtInt,
    GeInt,

    // Double comparison
    EqDouble,
    NeDouble,
    LtDouble,
    LeDouble,
    GtDouble,
    GeDouble,

    // String equality through the strcmp callback
    EqString,
    NeString,

    Not,

    // Control flow; targets are instruction indexes after patching
    Jump(u32),
    JumpIfZero(u32),
    JumpIfNonZero(u32),

    /// Pop a value, apply the named modifier with the given parameter list,
    /// push the result. A missing modifier passes the value through.
    ApplyModifier { name: u32, params: u32 },

    // Assignments into the local scope
    AssignValue(u32),
    AssignNumeric(u32),
    AssignBoolean(u32),
    AssignDouble(u32),
    AssignString(u32),

    /// Pop a value, push an iterator over it
    CreateIterator,
    /// Push 1 when the top iterator has a current element
    IterValid,
    /// Bind the top iterator's current value to the named local
    IterValue(u32),
    /// Bind the top iterator's current key to the named local, if it has one
    IterKey(u32),
    /// Advance the top iterator
    IterNext,
    /// Pop the top iterator and remove the named loop bindings
    ReleaseIterator { value: Option<u32>, key: Option<u32> },
}

/// A compiled template body
#[derive(Debug)]
pub struct Program {
    pub(crate) consts: Vec<String>,
    pub(crate) params: Vec<Vec<VariantValue>>,
    pub(crate) instrs: Vec<Instr>,
}

/// A runtime operand
enum Slot {
    Value(VariantValue),
    Int(i64),
    Double(f64),
    Str(String),
    Iter(usize),
}

impl Program {
    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    /// Execute against a handler through the callbacks record
    pub fn run(&self, handler: &mut Handler<'_>, cb: &Callbacks) -> Result<(), RuntimeError> {
        let mut stack: Vec<Slot> = Vec::new();
        let mut pc = 0usize;

        while pc < self.instrs.len() {
            match &self.instrs[pc] {
                Instr::WriteRaw(text) => (cb.write)(handler, &self.consts[*text as usize]),
                Instr::WriteString => {
                    let text = pop_str(&mut stack)?;
                    (cb.write)(handler, &text);
                }
                Instr::Output => {
                    let value = pop_value(&mut stack)?;
                    (cb.output)(handler, &value);
                }
                Instr::PushConstStr(index) => {
                    stack.push(Slot::Str(self.consts[*index as usize].clone()))
                }
                Instr::PushConstInt(value) => stack.push(Slot::Int(*value)),
                Instr::PushConstDouble(value) => stack.push(Slot::Double(*value)),
                Instr::Variable(name) => {
                    let value = (cb.variable)(handler, &self.consts[*name as usize]);
                    stack.push(Slot::Value(value));
                }
                Instr::Member(name) => {
                    let value = pop_value(&mut stack)?;
                    let member = (cb.member)(handler, &value, &self.consts[*name as usize]);
                    stack.push(Slot::Value(member));
                }
                Instr::MemberAt => {
                    let index = pop_int(&mut stack)?;
                    let value = pop_value(&mut stack)?;
                    stack.push(Slot::Value((cb.member_at)(handler, &value, index)));
                }
                Instr::MemberStr => {
                    let name = pop_str(&mut stack)?;
                    let value = pop_value(&mut stack)?;
                    stack.push(Slot::Value((cb.member)(handler, &value, &name)));
                }
                Instr::ToString => {
                    let value = pop_value(&mut stack)?;
                    stack.push(Slot::Str((cb.to_string)(handler, &value)));
                }
                Instr::ToNumeric => {
                    let value = pop_value(&mut stack)?;
                    stack.push(Slot::Int((cb.to_numeric)(handler, &value)));
                }
                Instr::ToBoolean => {
                    let value = pop_value(&mut stack)?;
                    stack.push(Slot::Int(i64::from((cb.to_boolean)(handler, &value))));
                }
                Instr::ToDouble => {
                    let value = pop_value(&mut stack)?;
                    stack.push(Slot::Double((cb.to_double)(handler, &value)));
                }
                Instr::NumericToString => {
                    let value = pop_int(&mut stack)?;
                    stack.push(Slot::Str(value.to_string()));
                }
                Instr::DoubleToString => {
                    let value = pop_double(&mut stack)?;
                    stack.push(Slot::Str(value.to_string()));
                }
                Instr::BooleanToString => {
                    let value = pop_int(&mut stack)?;
                    stack.push(Slot::Str(
                        if value != 0 { "true" } else { "false" }.to_string(),
                    ));
                }
                Instr::StringToNumeric => {
                    let text = pop_str(&mut stack)?;
                    stack.push(Slot::Int(crate::value::leading_numeric(&text)));
                }
                Instr::DoubleToNumeric => {
                    let value = pop_double(&mut stack)?;
                    stack.push(Slot::Int(value as i64));
                }
                Instr::IntToDouble => {
                    let value = pop_int(&mut stack)?;
                    stack.push(Slot::Double(value as f64));
                }
                Instr::DoubleToBoolean => {
                    let value = pop_double(&mut stack)?;
                    stack.push(Slot::Int(i64::from(value != 0.0)));
                }
                Instr::AddInt => int_op(&mut stack, i64::checked_add)?,
                Instr::SubInt => int_op(&mut stack, i64::checked_sub)?,
                Instr::MulInt => int_op(&mut stack, i64::checked_mul)?,
                Instr::DivInt => {
                    let right = pop_int(&mut stack)?;
                    let left = pop_int(&mut stack)?;
                    if right == 0 {
                        return Err(RuntimeError::new("Division by zero"));
                    }
                    let value = left.checked_div(right).ok_or_else(|| {
                        RuntimeError::new("Arithmetic exception (dividing the minimum integer by -1)")
                    })?;
                    stack.push(Slot::Int(value));
                }
                Instr::ModInt => {
                    let right = pop_int(&mut stack)?;
                    let left = pop_int(&mut stack)?;
                    if right == 0 {
                        return Err(RuntimeError::new("Modulo by zero"));
                    }
                    let value = left.checked_rem(right).ok_or_else(|| {
                        RuntimeError::new("Arithmetic exception (dividing the minimum integer by -1)")
                    })?;
                    stack.push(Slot::Int(value));
                }
                Instr::AddDouble => double_op(&mut stack, |a, b| a + b)?,
                Instr::SubDouble => double_op(&mut stack, |a, b| a - b)?,
                Instr::MulDouble => double_op(&mut stack, |a, b| a * b)?,
                Instr::DivDouble => {
                    let right = pop_double(&mut stack)?;
                    let left = pop_double(&mut stack)?;
                    if right == 0.0 {
                        return Err(RuntimeError::new("Division by zero"));
                    }
                    stack.push(Slot::Double(left / right));
                }
                Instr::ModDouble => {
                    let right = pop_double(&mut stack)?;
                    let left = pop_double(&mut stack)?;
                    if right == 0.0 {
                        return Err(RuntimeError::new("Modulo by zero"));
                    }
                    stack.push(Slot::Double(left % right));
                }
                Instr::EqInt => int_cmp(&mut stack, |a, b| a == b)?,
                Instr::NeInt => int_cmp(&mut stack, |a, b| a != b)?,
                Instr::LtInt => int_cmp(&mut stack, |a, b| a < b)?,
                Instr::LeInt => int_cmp(&mut stack, |a, b| a <= b)?,
                Instr::GtInt => int_cmp(&mut stack, |a, b| a > b)?,
                Instr::GeInt => int_cmp(&mut stack, |a, b| a >= b)?,
                Instr::EqDouble => double_cmp(&mut stack, |a, b| a == b)?,
                Instr::NeDouble => double_cmp(&mut stack, |a, b| a != b)?,
                Instr::LtDouble => double_cmp(&mut stack, |a, b| a < b)?,
                Instr::LeDouble => double_cmp(&mut stack, |a, b| a <= b)?,
                Instr::GtDouble => double_cmp(&mut stack, |a, b| a > b)?,
                Instr::GeDouble => double_cmp(&mut stack, |a, b| a >= b)?,
                Instr::EqString => {
                    let right = pop_str(&mut stack)?;
                    let left = pop_str(&mut stack)?;
                    let equal = (cb.strcmp)(handler, &left, &right);
                    stack.push(Slot::Int(i64::from(equal)));
                }
                Instr::NeString => {
                    let right = pop_str(&mut stack)?;
                    let left = pop_str(&mut stack)?;
                    let equal = (cb.strcmp)(handler, &left, &right);
                    stack.push(Slot::Int(i64::from(!equal)));
                }
                Instr::Not => {
                    let value = pop_int(&mut stack)?;
                    stack.push(Slot::Int(i64::from(value == 0)));
                }
                Instr::Jump(target) => {
                    pc = *target as usize;
                    continue;
                }
                Instr::JumpIfZero(target) => {
                    if pop_int(&mut stack)? == 0 {
                        pc = *target as usize;
                        continue;
                    }
                }
                Instr::JumpIfNonZero(target) => {
                    if pop_int(&mut stack)? != 0 {
                        pc = *target as usize;
                        continue;
                    }
                }
                Instr::ApplyModifier { name, params } => {
                    let value = pop_value(&mut stack)?;
                    let result = match (cb.modifier)(handler, &self.consts[*name as usize]) {
                        Some(modifier) => (cb.modify_variable)(
                            handler,
                            &modifier,
                            &value,
                            &self.params[*params as usize],
                        ),
                        // unknown modifier: pass the value through unchanged
                        None => value,
                    };
                    stack.push(Slot::Value(result));
                }
                Instr::AssignValue(name) => {
                    let value = pop_value(&mut stack)?;
                    (cb.assign)(handler, &self.consts[*name as usize], value);
                }
                Instr::AssignNumeric(name) => {
                    let value = pop_int(&mut stack)?;
                    (cb.assign_numeric)(handler, value, &self.consts[*name as usize]);
                }
                Instr::AssignBoolean(name) => {
                    let value = pop_int(&mut stack)?;
                    (cb.assign_boolean)(handler, value != 0, &self.consts[*name as usize]);
                }
                Instr::AssignDouble(name) => {
                    let value = pop_double(&mut stack)?;
                    (cb.assign_double)(handler, value, &self.consts[*name as usize]);
                }
                Instr::AssignString(name) => {
                    let value = pop_str(&mut stack)?;
                    (cb.assign_string)(handler, &value, &self.consts[*name as usize]);
                }
                Instr::CreateIterator => {
                    let value = pop_value(&mut stack)?;
                    let id = (cb.create_iterator)(handler, &value);
                    stack.push(Slot::Iter(id));
                }
                Instr::IterValid => {
                    let id = peek_iter(&stack)?;
                    let valid = (cb.valid_iterator)(handler, id);
                    stack.push(Slot::Int(i64::from(valid)));
                }
                Instr::IterValue(name) => {
                    let id = peek_iter(&stack)?;
                    let value = (cb.iterator_value)(handler, id);
                    (cb.assign)(handler, &self.consts[*name as usize], value);
                }
                Instr::IterKey(name) => {
                    let id = peek_iter(&stack)?;
                    if let Some(key) = (cb.iterator_key)(handler, id) {
                        (cb.assign)(handler, &self.consts[*name as usize], key);
                    }
                }
                Instr::IterNext => {
                    let id = peek_iter(&stack)?;
                    (cb.iterator_next)(handler, id);
                }
                Instr::ReleaseIterator { value, key } => {
                    let id = match stack.pop() {
                        Some(Slot::Iter(id)) => id,
                        _ => return Err(corrupted()),
                    };
                    handler.release_iterator(id);
                    if let Some(name) = value {
                        handler.remove_local(&self.consts[*name as usize]);
                    }
                    if let Some(name) = key {
                        handler.remove_local(&self.consts[*name as usize]);
                    }
                }
            }
            pc += 1;
        }

        if !stack.is_empty() {
            return Err(corrupted());
        }
        Ok(())
    }
}

fn corrupted() -> RuntimeError {
    RuntimeError::new("value stack corrupted")
}

fn pop_value(stack: &mut Vec<Slot>) -> Result<VariantValue, RuntimeError> {
    match stack.pop() {
        Some(Slot::Value(value)) => Ok(value),
        _ => Err(corrupted()),
    }
}

fn pop_int(stack: &mut Vec<Slot>) -> Result<i64, RuntimeError> {
    match stack.pop() {
        Some(Slot::Int(value)) => Ok(value),
        _ => Err(corrupted()),
    }
}

fn pop_double(stack: &mut Vec<Slot>) -> Result<f64, RuntimeError> {
    match stack.pop() {
        Some(Slot::Double(value)) => Ok(value),
        _ => Err(corrupted()),
    }
}

fn pop_str(stack: &mut Vec<Slot>) -> Result<String, RuntimeError> {
    match stack.pop() {
        Some(Slot::Str(value)) => Ok(value),
        _ => Err(corrupted()),
    }
}

fn peek_iter(stack: &[Slot]) -> Result<usize, RuntimeError> {
    match stack.last() {
        Some(Slot::Iter(id)) => Ok(*id),
        _ => Err(corrupted()),
    }
}

fn int_op(
    stack: &mut Vec<Slot>,
    op: impl Fn(i64, i64) -> Option<i64>,
) -> Result<(), RuntimeError> {
    let right = pop_int(stack)?;
    let left = pop_int(stack)?;
    let value = op(left, right)
        .ok_or_else(|| RuntimeError::new("Overflow during checked arithmetic operation"))?;
    stack.push(Slot::Int(value));
    Ok(())
}

fn double_op(stack: &mut Vec<Slot>, op: impl Fn(f64, f64) -> f64) -> Result<(), RuntimeError> {
    let right = pop_double(stack)?;
    let left = pop_double(stack)?;
    stack.push(Slot::Double(op(left, right)));
    Ok(())
}

fn int_cmp(stack: &mut Vec<Slot>, op: impl Fn(i64, i64) -> bool) -> Result<(), RuntimeError> {
    let right = pop_int(stack)?;
    let left = pop_int(stack)?;
    stack.push(Slot::Int(i64::from(op(left, right))));
    Ok(())
}

fn double_cmp(stack: &mut Vec<Slot>, op: impl Fn(f64, f64) -> bool) -> Result<(), RuntimeError> {
    let right = pop_double(stack)?;
    let left = pop_double(stack)?;
    stack.push(Slot::Int(i64::from(op(left, right))));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::CALLBACKS;
    use crate::data::Data;
    use crate::escaper::Escaper;

    fn run(program: &Program) -> Result<String, RuntimeError> {
        let data = Data::new();
        let mut handler = Handler::new(&data, Escaper::Raw);
        program.run(&mut handler, &CALLBACKS)?;
        Ok(handler.into_output())
    }

    #[test]
    fn test_write_raw() {
        let program = Program {
            consts: vec!["hi".to_string()],
            params: vec![],
            instrs: vec![Instr::WriteRaw(0)],
        };
        assert_eq!(run(&program).unwrap(), "hi");
    }

    #[test]
    fn test_integer_arithmetic() {
        let program = Program {
            consts: vec![],
            params: vec![],
            instrs: vec![
                Instr::PushConstInt(6),
                Instr::PushConstInt(7),
                Instr::MulInt,
                Instr::NumericToString,
                Instr::WriteString,
            ],
        };
        assert_eq!(run(&program).unwrap(), "42");
    }

    #[test]
    fn test_division_by_zero() {
        let program = Program {
            consts: vec![],
            params: vec![],
            instrs: vec![Instr::PushConstInt(1), Instr::PushConstInt(0), Instr::DivInt],
        };
        let err = run(&program).unwrap_err();
        assert_eq!(err.to_string(), "Division by zero");
    }

    #[test]
    fn test_overflow_is_reported() {
        let program = Program {
            consts: vec![],
            params: vec![],
            instrs: vec![
                Instr::PushConstInt(i64::MAX),
                Instr::PushConstInt(1),
                Instr::AddInt,
            ],
        };
        let err = run(&program).unwrap_err();
        assert!(err.to_string().contains("Overflow"));
    }

    #[test]
    fn test_jump_skips() {
        let program = Program {
            consts: vec!["skipped".to_string(), "kept".to_string()],
            params: vec![],
            instrs: vec![
                Instr::PushConstInt(0),
                Instr::JumpIfZero(3),
                Instr::WriteRaw(0),
                Instr::WriteRaw(1),
            ],
        };
        assert_eq!(run(&program).unwrap(), "kept");
    }

    #[test]
    fn test_stack_leak_is_an_error() {
        let program = Program {
            consts: vec![],
            params: vec![],
            instrs: vec![Instr::PushConstInt(1)],
        };
        assert!(run(&program).is_err());
    }
}
