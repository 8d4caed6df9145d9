//! Runtime value model
//!
//! Values are a tagged union rather than a class hierarchy: every coercion
//! and member access dispatches on the tag. Embedders plug in their own
//! polymorphic values through the [`CustomValue`] trait.
//!
//! All coercions are total. Nothing here panics or errors; a conversion that
//! makes no sense degrades to the neutral element of the target type.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Embedder-supplied polymorphic value.
///
/// Only [`render`](CustomValue::render) is required; the remaining
/// capabilities default to the behavior of an empty value.
pub trait CustomValue: fmt::Debug + Send + Sync {
    /// The string form of the value
    fn render(&self) -> String;

    fn to_numeric(&self) -> i64 {
        0
    }

    fn to_double(&self) -> f64 {
        0.0
    }

    fn to_boolean(&self) -> bool {
        false
    }

    /// Length of the string form
    fn size(&self) -> i64 {
        self.render().len() as i64
    }

    fn member(&self, _name: &str) -> Option<VariantValue> {
        None
    }

    fn member_at(&self, _index: usize) -> Option<VariantValue> {
        None
    }

    fn key_at(&self, _index: usize) -> Option<VariantValue> {
        None
    }

    fn member_count(&self) -> usize {
        0
    }
}

/// A runtime value
#[derive(Debug)]
pub enum Value {
    /// The empty value; what a failed lookup resolves to
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    List(Vec<VariantValue>),
    /// Key-ordered so iteration is deterministic
    Map(BTreeMap<String, VariantValue>),
    Custom(Box<dyn CustomValue>),
}

/// Shared handle to a [`Value`].
///
/// This is what the engine passes around: cloning is cheap, and the same
/// handle compares pointer-equal wherever it flows (the empty-value
/// singleton relies on this).
#[derive(Debug, Clone)]
pub struct VariantValue {
    inner: Arc<Value>,
}

impl VariantValue {
    /// The empty value
    pub fn null() -> Self {
        Value::Null.into()
    }

    /// Wrap an embedder-defined value
    pub fn custom(value: impl CustomValue + 'static) -> Self {
        Value::Custom(Box::new(value)).into()
    }

    pub fn value(&self) -> &Value {
        &self.inner
    }

    /// Do two handles refer to the same allocation?
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_null(&self) -> bool {
        matches!(*self.inner, Value::Null)
    }

    /// The string form of the value
    pub fn to_display_string(&self) -> String {
        match self.value() {
            Value::Null => String::new(),
            Value::Bool(b) => if *b { "true" } else { "false" }.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Double(d) => d.to_string(),
            Value::String(s) => s.clone(),
            Value::List(_) | Value::Map(_) => String::new(),
            Value::Custom(c) => c.render(),
        }
    }

    /// Integer form; strings parse their leading integer, collections count
    /// their members
    pub fn to_numeric(&self) -> i64 {
        match self.value() {
            Value::Null => 0,
            Value::Bool(b) => i64::from(*b),
            Value::Int(i) => *i,
            Value::Double(d) => *d as i64,
            Value::String(s) => leading_numeric(s),
            Value::List(items) => items.len() as i64,
            Value::Map(map) => map.len() as i64,
            Value::Custom(c) => c.to_numeric(),
        }
    }

    pub fn to_double(&self) -> f64 {
        match self.value() {
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Int(i) => *i as f64,
            Value::Double(d) => *d,
            Value::String(s) => leading_double(s),
            Value::List(items) => items.len() as f64,
            Value::Map(map) => map.len() as f64,
            Value::Custom(c) => c.to_double(),
        }
    }

    pub fn to_boolean(&self) -> bool {
        match self.value() {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Double(d) => *d != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::Custom(c) => c.to_boolean(),
        }
    }

    /// Length of the string form
    pub fn size(&self) -> i64 {
        match self.value() {
            Value::Custom(c) => c.size(),
            _ => self.to_display_string().len() as i64,
        }
    }

    /// Look up a member by name. Lists accept decimal names as indexes so
    /// that a dynamic subscript works on both maps and lists.
    pub fn member(&self, name: &str) -> Option<VariantValue> {
        match self.value() {
            Value::Map(map) => map.get(name).cloned(),
            Value::List(items) => {
                let index: usize = name.parse().ok()?;
                items.get(index).cloned()
            }
            Value::Custom(c) => c.member(name),
            _ => None,
        }
    }

    /// Look up a member by position
    pub fn member_at(&self, index: i64) -> Option<VariantValue> {
        let index = usize::try_from(index).ok()?;
        match self.value() {
            Value::List(items) => items.get(index).cloned(),
            Value::Map(map) => map.values().nth(index).cloned(),
            Value::Custom(c) => c.member_at(index),
            _ => None,
        }
    }

    /// The key belonging to the member at a position. Lists have no keys.
    pub fn key_at(&self, index: i64) -> Option<VariantValue> {
        let index = usize::try_from(index).ok()?;
        match self.value() {
            Value::Map(map) => map.keys().nth(index).map(|k| k.as_str().into()),
            Value::Custom(c) => c.key_at(index),
            _ => None,
        }
    }

    pub fn member_count(&self) -> usize {
        match self.value() {
            Value::List(items) => items.len(),
            Value::Map(map) => map.len(),
            Value::Custom(c) => c.member_count(),
            _ => 0,
        }
    }

    /// Create an iterator over the members of this value
    pub fn iterator(&self) -> ValueIterator {
        ValueIterator::new(self)
    }
}

/// Iterator over the members of a value.
///
/// The (key, value) pairs are snapshotted at creation, so the iterator stays
/// consistent regardless of what the loop body does.
#[derive(Debug)]
pub struct ValueIterator {
    entries: Vec<(Option<VariantValue>, VariantValue)>,
    pos: usize,
}

impl ValueIterator {
    pub fn new(value: &VariantValue) -> Self {
        let entries = match value.value() {
            Value::List(items) => items.iter().map(|v| (None, v.clone())).collect(),
            Value::Map(map) => map
                .iter()
                .map(|(k, v)| (Some(k.as_str().into()), v.clone()))
                .collect(),
            Value::Custom(c) => (0..c.member_count())
                .map(|i| {
                    (
                        c.key_at(i),
                        c.member_at(i).unwrap_or_else(VariantValue::null),
                    )
                })
                .collect(),
            _ => Vec::new(),
        };
        Self { entries, pos: 0 }
    }

    pub fn valid(&self) -> bool {
        self.pos < self.entries.len()
    }

    pub fn current_value(&self) -> Option<VariantValue> {
        self.entries.get(self.pos).map(|(_, v)| v.clone())
    }

    pub fn current_key(&self) -> Option<VariantValue> {
        self.entries.get(self.pos).and_then(|(k, _)| k.clone())
    }

    pub fn next(&mut self) {
        self.pos += 1;
    }
}

/// Parse the leading integer of a string, `atoi` style: optional sign,
/// decimal digits, anything after is ignored.
pub(crate) fn leading_numeric(s: &str) -> i64 {
    let t = s.trim_start();
    let bytes = t.as_bytes();
    let mut i = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        i += 1;
    }
    let digits_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i == digits_start {
        return 0;
    }
    t[..i].parse().unwrap_or(0)
}

/// Parse the leading floating point number of a string, `strtod` style.
pub(crate) fn leading_double(s: &str) -> f64 {
    let t = s.trim_start();
    let bytes = t.as_bytes();
    let mut i = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        i += 1;
    }
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
    }
    t[..i].parse().unwrap_or(0.0)
}

// === Conversions ===

impl From<Value> for VariantValue {
    fn from(value: Value) -> Self {
        Self {
            inner: Arc::new(value),
        }
    }
}

impl From<()> for VariantValue {
    fn from(_: ()) -> Self {
        Value::Null.into()
    }
}

impl From<bool> for VariantValue {
    fn from(b: bool) -> Self {
        Value::Bool(b).into()
    }
}

impl From<i32> for VariantValue {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i)).into()
    }
}

impl From<i64> for VariantValue {
    fn from(i: i64) -> Self {
        Value::Int(i).into()
    }
}

impl From<f64> for VariantValue {
    fn from(d: f64) -> Self {
        Value::Double(d).into()
    }
}

impl From<&str> for VariantValue {
    fn from(s: &str) -> Self {
        Value::String(s.to_string()).into()
    }
}

impl From<String> for VariantValue {
    fn from(s: String) -> Self {
        Value::String(s).into()
    }
}

impl<T: Into<VariantValue>> From<Vec<T>> for VariantValue {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect()).into()
    }
}

impl<T: Into<VariantValue>> From<BTreeMap<String, T>> for VariantValue {
    fn from(map: BTreeMap<String, T>) -> Self {
        Value::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_coercions() {
        let v: VariantValue = 42.into();
        assert_eq!(v.to_display_string(), "42");
        assert_eq!(v.to_numeric(), 42);
        assert_eq!(v.to_double(), 42.0);
        assert!(v.to_boolean());
        assert_eq!(v.size(), 2);
    }

    #[test]
    fn test_null_coercions() {
        let v = VariantValue::null();
        assert_eq!(v.to_display_string(), "");
        assert_eq!(v.to_numeric(), 0);
        assert!(!v.to_boolean());
    }

    #[test]
    fn test_string_to_numeric() {
        assert_eq!(VariantValue::from("17 items").to_numeric(), 17);
        assert_eq!(VariantValue::from("-3").to_numeric(), -3);
        assert_eq!(VariantValue::from("items").to_numeric(), 0);
        assert_eq!(VariantValue::from("2.75x").to_double(), 2.75);
    }

    #[test]
    fn test_list_members() {
        let v: VariantValue = vec![10, 20, 30].into();
        assert_eq!(v.member_count(), 3);
        assert_eq!(v.member_at(1).unwrap().to_numeric(), 20);
        assert!(v.member_at(3).is_none());
        assert!(v.key_at(0).is_none());
        // decimal names act as indexes
        assert_eq!(v.member("2").unwrap().to_numeric(), 30);
    }

    #[test]
    fn test_map_members_are_key_ordered() {
        let mut map = BTreeMap::new();
        map.insert("b".to_string(), VariantValue::from(2));
        map.insert("a".to_string(), VariantValue::from(1));
        let v: VariantValue = map.into();
        assert_eq!(v.key_at(0).unwrap().to_display_string(), "a");
        assert_eq!(v.member_at(0).unwrap().to_numeric(), 1);
        assert_eq!(v.member("b").unwrap().to_numeric(), 2);
    }

    #[test]
    fn test_iterator_snapshot() {
        let v: VariantValue = vec!["x", "y"].into();
        let mut iter = v.iterator();
        assert!(iter.valid());
        assert_eq!(iter.current_value().unwrap().to_display_string(), "x");
        iter.next();
        assert_eq!(iter.current_value().unwrap().to_display_string(), "y");
        iter.next();
        assert!(!iter.valid());
        assert!(iter.current_value().is_none());
    }

    #[derive(Debug)]
    struct Pair;

    impl CustomValue for Pair {
        fn render(&self) -> String {
            "pair".to_string()
        }

        fn member_count(&self) -> usize {
            2
        }

        fn member_at(&self, index: usize) -> Option<VariantValue> {
            [VariantValue::from("left"), VariantValue::from("right")]
                .get(index)
                .cloned()
        }

        fn key_at(&self, index: usize) -> Option<VariantValue> {
            ["l", "r"].get(index).map(|k| VariantValue::from(*k))
        }
    }

    #[test]
    fn test_custom_value() {
        let v = VariantValue::custom(Pair);
        assert_eq!(v.to_display_string(), "pair");
        assert_eq!(v.member_count(), 2);
        let mut iter = v.iterator();
        assert_eq!(iter.current_key().unwrap().to_display_string(), "l");
        iter.next();
        assert_eq!(iter.current_value().unwrap().to_display_string(), "right");
    }
}
