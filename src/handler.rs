//! Per-render execution context
//!
//! A [`Handler`] captures the output while one template render runs. It owns
//! the output buffer, the local variable scope, the iterator stack and the
//! arena of values allocated during the render; all of it is released when
//! the handler goes away, no later than the end of `process`.

use crate::data::Data;
use crate::escaper::Escaper;
use crate::modifier::Modifier;
use crate::value::{ValueIterator, VariantValue};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One frame of the `member_iter` loop stack: which magic key the loop binds
/// and how far it has advanced.
struct LoopFrame {
    key: String,
    pos: i64,
}

/// Per-render state.
pub struct Handler<'d> {
    buffer: String,
    data: &'d Data,
    escaper: Escaper,
    /// Values assigned during the render; consulted before `data`
    locals: BTreeMap<String, VariantValue>,
    /// Frames for `member_iter`-style loops, keyed by binding name
    loop_stack: Vec<LoopFrame>,
    /// Explicitly created iterators, a stack addressed by index
    iterators: Vec<ValueIterator>,
    /// Values allocated during this render; dropped with the handler
    arena: Vec<VariantValue>,
    /// The empty value every miss resolves to; one allocation per render
    empty: VariantValue,
}

impl<'d> Handler<'d> {
    pub fn new(data: &'d Data, escaper: Escaper) -> Self {
        Self {
            buffer: String::with_capacity(4096),
            data,
            escaper,
            locals: BTreeMap::new(),
            loop_stack: Vec::new(),
            iterators: Vec::new(),
            arena: Vec::new(),
            empty: VariantValue::null(),
        }
    }

    /// Append raw bytes to the output
    pub fn write(&mut self, data: &str) {
        self.buffer.push_str(data);
    }

    /// Append a value's string form through the active escaper
    pub fn output(&mut self, value: &VariantValue) {
        let text = value.to_display_string();
        self.buffer.push_str(&self.escaper.apply(&text));
    }

    /// Look up a variable: local scope first, then the data object. A miss
    /// yields the render's empty value, never an error.
    pub fn variable(&self, name: &str) -> VariantValue {
        if let Some(value) = self.locals.get(name) {
            return value.clone();
        }
        self.data.value(name).unwrap_or_else(|| self.empty.clone())
    }

    /// Look up a member by name; misses yield the empty value
    pub fn member(&self, value: &VariantValue, name: &str) -> VariantValue {
        value.member(name).unwrap_or_else(|| self.empty.clone())
    }

    /// Look up a member by position; misses yield the empty value
    pub fn member_at(&self, value: &VariantValue, index: i64) -> VariantValue {
        value.member_at(index).unwrap_or_else(|| self.empty.clone())
    }

    /// Look up a modifier in the data object
    pub fn modifier(&self, name: &str) -> Option<Arc<dyn Modifier>> {
        self.data.modifier_by_name(name)
    }

    /// Apply a modifier. The result, when distinct from the input, is owned
    /// by this handler from here on.
    pub fn modify(
        &mut self,
        modifier: &Arc<dyn Modifier>,
        value: &VariantValue,
        params: &[VariantValue],
    ) -> VariantValue {
        let result = modifier.apply(value, params);
        if !result.ptr_eq(value) {
            self.arena.push(result.clone());
        }
        result
    }

    /// Bind an existing value to a local variable
    pub fn assign(&mut self, name: &str, value: VariantValue) {
        self.locals.insert(name.to_string(), value);
    }

    pub fn assign_numeric(&mut self, value: i64, name: &str) {
        self.assign_managed(name, value.into());
    }

    pub fn assign_boolean(&mut self, value: bool, name: &str) {
        self.assign_managed(name, value.into());
    }

    pub fn assign_double(&mut self, value: f64, name: &str) {
        self.assign_managed(name, value.into());
    }

    pub fn assign_string(&mut self, value: &str, name: &str) {
        self.assign_managed(name, value.into());
    }

    fn assign_managed(&mut self, name: &str, value: VariantValue) {
        self.arena.push(value.clone());
        self.locals.insert(name.to_string(), value);
    }

    /// Remove a local binding, if present
    pub fn remove_local(&mut self, name: &str) {
        self.locals.remove(name);
    }

    /// Advance a `member_iter`-style loop.
    ///
    /// If the top of the loop stack already belongs to `key`, the loop
    /// advances; on exhaustion the frame is popped, the bindings are removed
    /// and `false` tells the caller to stop. Any other state starts a fresh
    /// loop at position zero.
    pub fn iterate(&mut self, value: &VariantValue, key: &str, keyvar: Option<&str>) -> bool {
        let len = value.member_count() as i64;
        if len == 0 {
            return false;
        }

        match self.loop_stack.last_mut() {
            Some(frame) if frame.key == key => {
                frame.pos += 1;
                if frame.pos >= len {
                    self.loop_stack.pop();
                    self.locals.remove(key);
                    if let Some(keyvar) = keyvar {
                        self.locals.remove(keyvar);
                    }
                    return false;
                }
                let pos = frame.pos;
                self.bind_loop_locals(value, pos, key, keyvar);
                true
            }
            _ => {
                self.loop_stack.push(LoopFrame {
                    key: key.to_string(),
                    pos: 0,
                });
                self.bind_loop_locals(value, 0, key, keyvar);
                true
            }
        }
    }

    fn bind_loop_locals(&mut self, value: &VariantValue, pos: i64, key: &str, keyvar: Option<&str>) {
        let member = self.member_at(value, pos);
        self.locals.insert(key.to_string(), member);
        if let Some(keyvar) = keyvar {
            // values are not required to expose keys
            if let Some(k) = value.key_at(pos) {
                self.locals.insert(keyvar.to_string(), k);
            }
        }
    }

    /// Create an iterator over a value and push it onto the iterator stack
    pub fn create_iterator(&mut self, value: &VariantValue) -> usize {
        self.iterators.push(value.iterator());
        self.iterators.len() - 1
    }

    pub fn iterator_valid(&self, id: usize) -> bool {
        self.iterators.get(id).is_some_and(ValueIterator::valid)
    }

    pub fn iterator_value(&self, id: usize) -> VariantValue {
        self.iterators
            .get(id)
            .and_then(ValueIterator::current_value)
            .unwrap_or_else(|| self.empty.clone())
    }

    pub fn iterator_key(&self, id: usize) -> Option<VariantValue> {
        self.iterators.get(id).and_then(ValueIterator::current_key)
    }

    pub fn iterator_next(&mut self, id: usize) {
        if let Some(iter) = self.iterators.get_mut(id) {
            iter.next();
        }
    }

    /// Release an iterator. Iterators are released in stack order.
    pub fn release_iterator(&mut self, id: usize) {
        debug_assert_eq!(id + 1, self.iterators.len());
        self.iterators.truncate(id);
    }

    /// Number of values currently held by the managed arena
    pub fn managed_count(&self) -> usize {
        self.arena.len()
    }

    /// The output produced so far
    pub fn output_so_far(&self) -> &str {
        &self.buffer
    }

    /// Finish the render: the buffer survives, everything else is released
    pub fn into_output(self) -> String {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_output_escaped() {
        let data = Data::new();
        let mut handler = Handler::new(&data, Escaper::Html);
        handler.write("<raw>");
        handler.output(&"<b>".into());
        assert_eq!(handler.into_output(), "<raw>&lt;b&gt;");
    }

    #[test]
    fn test_variable_prefers_locals() {
        let mut data = Data::new();
        data.assign("x", "data");
        let mut handler = Handler::new(&data, Escaper::Raw);
        assert_eq!(handler.variable("x").to_display_string(), "data");
        handler.assign("x", "local".into());
        assert_eq!(handler.variable("x").to_display_string(), "local");
        handler.remove_local("x");
        assert_eq!(handler.variable("x").to_display_string(), "data");
    }

    #[test]
    fn test_miss_is_address_stable_empty() {
        let data = Data::new();
        let handler = Handler::new(&data, Escaper::Raw);
        let a = handler.variable("nope");
        let b = handler.member(&a, "deeper");
        assert!(a.is_null());
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn test_iterate_walks_and_unbinds() {
        let data = Data::new();
        let mut handler = Handler::new(&data, Escaper::Raw);
        let list: VariantValue = vec![1, 2].into();

        assert!(handler.iterate(&list, "item", None));
        assert_eq!(handler.variable("item").to_numeric(), 1);
        assert!(handler.iterate(&list, "item", None));
        assert_eq!(handler.variable("item").to_numeric(), 2);
        assert!(!handler.iterate(&list, "item", None));
        // binding removed on exhaustion
        assert!(handler.variable("item").is_null());
    }

    #[test]
    fn test_iterate_empty_value() {
        let data = Data::new();
        let mut handler = Handler::new(&data, Escaper::Raw);
        let list: VariantValue = Vec::<i64>::new().into();
        assert!(!handler.iterate(&list, "item", None));
    }

    #[test]
    fn test_iterate_binds_keys() {
        let mut map = std::collections::BTreeMap::new();
        map.insert("a".to_string(), VariantValue::from(1));
        let data = Data::new();
        let mut handler = Handler::new(&data, Escaper::Raw);
        let map: VariantValue = map.into();

        assert!(handler.iterate(&map, "v", Some("k")));
        assert_eq!(handler.variable("k").to_display_string(), "a");
        assert!(!handler.iterate(&map, "v", Some("k")));
        assert!(handler.variable("k").is_null());
    }

    #[test]
    fn test_assigns_are_managed() {
        let data = Data::new();
        let mut handler = Handler::new(&data, Escaper::Raw);
        handler.assign_numeric(7, "n");
        handler.assign_string("s", "t");
        assert_eq!(handler.managed_count(), 2);
        assert_eq!(handler.variable("n").to_numeric(), 7);
    }

    #[test]
    fn test_iterator_stack() {
        let data = Data::new();
        let mut handler = Handler::new(&data, Escaper::Raw);
        let list: VariantValue = vec!["x"].into();
        let id = handler.create_iterator(&list);
        assert!(handler.iterator_valid(id));
        assert_eq!(handler.iterator_value(id).to_display_string(), "x");
        assert!(handler.iterator_key(id).is_none());
        handler.iterator_next(id);
        assert!(!handler.iterator_valid(id));
        handler.release_iterator(id);
    }
}
