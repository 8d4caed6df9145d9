//! The runtime callback ABI
//!
//! Emitted code never touches engine internals directly; it goes through
//! this fixed set of functions, each taking the render's [`Handler`]. The
//! set is built once per back end as a versioned record of function
//! pointers, so the runtime can substitute entries (a different escaper, a
//! tracing hook) without touching the emitted code.
//!
//! Lookup functions never return a missing value: `member*` and `variable`
//! resolve misses to the handler's empty value. `modifier` may miss, which
//! the caller treats as "pass the value through unchanged".

use crate::handler::Handler;
use crate::modifier::Modifier;
use crate::value::VariantValue;
use std::sync::Arc;

/// Version of the callback record layout
pub const ABI_VERSION: u32 = 1;

/// The record of callback functions handed to emitted code.
pub struct Callbacks {
    pub version: u32,
    /// Append raw bytes to the output
    pub write: fn(&mut Handler<'_>, &str),
    /// Append a value through the active escaper
    pub output: fn(&mut Handler<'_>, &VariantValue),
    /// Member lookup by name
    pub member: fn(&mut Handler<'_>, &VariantValue, &str) -> VariantValue,
    /// Member lookup by position
    pub member_at: fn(&mut Handler<'_>, &VariantValue, i64) -> VariantValue,
    /// Advance a keyed loop; `false` means the loop is done
    pub member_iter: fn(&mut Handler<'_>, &VariantValue, &str, Option<&str>) -> bool,
    /// Variable lookup: local scope, then data
    pub variable: fn(&mut Handler<'_>, &str) -> VariantValue,
    pub to_string: fn(&mut Handler<'_>, &VariantValue) -> String,
    pub to_numeric: fn(&mut Handler<'_>, &VariantValue) -> i64,
    pub to_boolean: fn(&mut Handler<'_>, &VariantValue) -> bool,
    pub to_double: fn(&mut Handler<'_>, &VariantValue) -> f64,
    /// Length of a value's string form
    pub size: fn(&mut Handler<'_>, &VariantValue) -> i64,
    /// Modifier lookup; `None` means no-op
    pub modifier: fn(&mut Handler<'_>, &str) -> Option<Arc<dyn Modifier>>,
    /// Apply a modifier; the result is owned by the handler
    pub modify_variable:
        fn(&mut Handler<'_>, &Arc<dyn Modifier>, &VariantValue, &[VariantValue]) -> VariantValue,
    /// String equality
    pub strcmp: fn(&mut Handler<'_>, &str, &str) -> bool,
    pub assign: fn(&mut Handler<'_>, &str, VariantValue),
    pub assign_numeric: fn(&mut Handler<'_>, i64, &str),
    pub assign_boolean: fn(&mut Handler<'_>, bool, &str),
    pub assign_double: fn(&mut Handler<'_>, f64, &str),
    pub assign_string: fn(&mut Handler<'_>, &str, &str),
    pub create_iterator: fn(&mut Handler<'_>, &VariantValue) -> usize,
    pub valid_iterator: fn(&mut Handler<'_>, usize) -> bool,
    pub iterator_key: fn(&mut Handler<'_>, usize) -> Option<VariantValue>,
    pub iterator_value: fn(&mut Handler<'_>, usize) -> VariantValue,
    pub iterator_next: fn(&mut Handler<'_>, usize),
}

/// The default record, used by the bytecode back end.
pub static CALLBACKS: Callbacks = Callbacks {
    version: ABI_VERSION,
    write: cb_write,
    output: cb_output,
    member: cb_member,
    member_at: cb_member_at,
    member_iter: cb_member_iter,
    variable: cb_variable,
    to_string: cb_to_string,
    to_numeric: cb_to_numeric,
    to_boolean: cb_to_boolean,
    to_double: cb_to_double,
    size: cb_size,
    modifier: cb_modifier,
    modify_variable: cb_modify_variable,
    strcmp: cb_strcmp,
    assign: cb_assign,
    assign_numeric: cb_assign_numeric,
    assign_boolean: cb_assign_boolean,
    assign_double: cb_assign_double,
    assign_string: cb_assign_string,
    create_iterator: cb_create_iterator,
    valid_iterator: cb_valid_iterator,
    iterator_key: cb_iterator_key,
    iterator_value: cb_iterator_value,
    iterator_next: cb_iterator_next,
};

fn cb_write(handler: &mut Handler<'_>, data: &str) {
    handler.write(data);
}

fn cb_output(handler: &mut Handler<'_>, value: &VariantValue) {
    handler.output(value);
}

fn cb_member(handler: &mut Handler<'_>, value: &VariantValue, name: &str) -> VariantValue {
    handler.member(value, name)
}

fn cb_member_at(handler: &mut Handler<'_>, value: &VariantValue, index: i64) -> VariantValue {
    handler.member_at(value, index)
}

fn cb_member_iter(
    handler: &mut Handler<'_>,
    value: &VariantValue,
    key: &str,
    keyvar: Option<&str>,
) -> bool {
    handler.iterate(value, key, keyvar)
}

fn cb_variable(handler: &mut Handler<'_>, name: &str) -> VariantValue {
    handler.variable(name)
}

fn cb_to_string(_handler: &mut Handler<'_>, value: &VariantValue) -> String {
    value.to_display_string()
}

fn cb_to_numeric(_handler: &mut Handler<'_>, value: &VariantValue) -> i64 {
    value.to_numeric()
}

fn cb_to_boolean(_handler: &mut Handler<'_>, value: &VariantValue) -> bool {
    value.to_boolean()
}

fn cb_to_double(_handler: &mut Handler<'_>, value: &VariantValue) -> f64 {
    value.to_double()
}

fn cb_size(_handler: &mut Handler<'_>, value: &VariantValue) -> i64 {
    value.size()
}

fn cb_modifier(handler: &mut Handler<'_>, name: &str) -> Option<Arc<dyn Modifier>> {
    handler.modifier(name)
}

fn cb_modify_variable(
    handler: &mut Handler<'_>,
    modifier: &Arc<dyn Modifier>,
    value: &VariantValue,
    params: &[VariantValue],
) -> VariantValue {
    handler.modify(modifier, value, params)
}

fn cb_strcmp(_handler: &mut Handler<'_>, a: &str, b: &str) -> bool {
    a.len() == b.len() && a == b
}

fn cb_assign(handler: &mut Handler<'_>, name: &str, value: VariantValue) {
    handler.assign(name, value);
}

fn cb_assign_numeric(handler: &mut Handler<'_>, value: i64, name: &str) {
    handler.assign_numeric(value, name);
}

fn cb_assign_boolean(handler: &mut Handler<'_>, value: bool, name: &str) {
    handler.assign_boolean(value, name);
}

fn cb_assign_double(handler: &mut Handler<'_>, value: f64, name: &str) {
    handler.assign_double(value, name);
}

fn cb_assign_string(handler: &mut Handler<'_>, value: &str, name: &str) {
    handler.assign_string(value, name);
}

fn cb_create_iterator(handler: &mut Handler<'_>, value: &VariantValue) -> usize {
    handler.create_iterator(value)
}

fn cb_valid_iterator(handler: &mut Handler<'_>, id: usize) -> bool {
    handler.iterator_valid(id)
}

fn cb_iterator_key(handler: &mut Handler<'_>, id: usize) -> Option<VariantValue> {
    handler.iterator_key(id)
}

fn cb_iterator_value(handler: &mut Handler<'_>, id: usize) -> VariantValue {
    handler.iterator_value(id)
}

fn cb_iterator_next(handler: &mut Handler<'_>, id: usize) {
    handler.iterator_next(id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Data;
    use crate::escaper::Escaper;

    #[test]
    fn test_record_version() {
        assert_eq!(CALLBACKS.version, ABI_VERSION);
    }

    #[test]
    fn test_lookups_never_miss() {
        let data = Data::new();
        let mut handler = Handler::new(&data, Escaper::Raw);
        let missing = (CALLBACKS.variable)(&mut handler, "nope");
        assert!(missing.is_null());
        let deeper = (CALLBACKS.member)(&mut handler, &missing, "x");
        assert!(deeper.is_null());
        assert!((CALLBACKS.modifier)(&mut handler, "nope").is_none());
    }

    #[test]
    fn test_coercion_callbacks() {
        let data = Data::new();
        let mut handler = Handler::new(&data, Escaper::Raw);
        let v: VariantValue = 12.into();
        assert_eq!((CALLBACKS.to_string)(&mut handler, &v), "12");
        assert_eq!((CALLBACKS.to_numeric)(&mut handler, &v), 12);
        assert_eq!((CALLBACKS.to_double)(&mut handler, &v), 12.0);
        assert!((CALLBACKS.to_boolean)(&mut handler, &v));
        assert_eq!((CALLBACKS.size)(&mut handler, &v), 2);
    }

    #[test]
    fn test_strcmp_is_equality() {
        let data = Data::new();
        let mut handler = Handler::new(&data, Escaper::Raw);
        assert!((CALLBACKS.strcmp)(&mut handler, "abc", "abc"));
        assert!(!(CALLBACKS.strcmp)(&mut handler, "abc", "abd"));
        assert!(!(CALLBACKS.strcmp)(&mut handler, "abc", "ab"));
    }
}
