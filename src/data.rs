//! The data environment
//!
//! A [`Data`] object holds everything a template can reach at render time:
//! variables, callback variables that are computed on first use, and the
//! modifier registry. It is filled before rendering and read-only while a
//! render runs, so one `Data` may back many concurrent renders.

use crate::modifier::{Modifier, ToLower, ToUpper};
use crate::value::VariantValue;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

/// A variable that is computed when the template first reads it
struct CallbackVariable {
    callback: Box<dyn Fn() -> VariantValue + Send + Sync>,
    cache: bool,
    cached: OnceLock<VariantValue>,
}

/// Variable and modifier environment for a render.
pub struct Data {
    variables: BTreeMap<String, VariantValue>,
    callbacks: BTreeMap<String, CallbackVariable>,
    modifiers: BTreeMap<String, Arc<dyn Modifier>>,
}

impl Data {
    /// An environment with the built-in `toupper` and `tolower` modifiers
    /// pre-registered.
    pub fn new() -> Self {
        let mut data = Self {
            variables: BTreeMap::new(),
            callbacks: BTreeMap::new(),
            modifiers: BTreeMap::new(),
        };
        data.modifier("toupper", ToUpper);
        data.modifier("tolower", ToLower);
        data
    }

    /// Assign a variable
    pub fn assign(&mut self, name: impl Into<String>, value: impl Into<VariantValue>) -> &mut Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Register a callback variable. The closure runs when a template reads
    /// the variable; with `cache` set, only the first read runs it.
    pub fn callback(
        &mut self,
        name: impl Into<String>,
        callback: impl Fn() -> VariantValue + Send + Sync + 'static,
        cache: bool,
    ) -> &mut Self {
        self.callbacks.insert(
            name.into(),
            CallbackVariable {
                callback: Box::new(callback),
                cache,
                cached: OnceLock::new(),
            },
        );
        self
    }

    /// Register a modifier
    pub fn modifier(&mut self, name: impl Into<String>, modifier: impl Modifier + 'static) -> &mut Self {
        self.modifiers.insert(name.into(), Arc::new(modifier));
        self
    }

    /// Look up a variable; callback variables are invoked here
    pub fn value(&self, name: &str) -> Option<VariantValue> {
        if let Some(value) = self.variables.get(name) {
            return Some(value.clone());
        }
        let entry = self.callbacks.get(name)?;
        if entry.cache {
            Some(entry.cached.get_or_init(|| (entry.callback)()).clone())
        } else {
            Some((entry.callback)())
        }
    }

    /// Look up a modifier
    pub fn modifier_by_name(&self, name: &str) -> Option<Arc<dyn Modifier>> {
        self.modifiers.get(name).cloned()
    }
}

impl Default for Data {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_assign_and_lookup() {
        let mut data = Data::new();
        data.assign("name", "world").assign("count", 3);
        assert_eq!(data.value("name").unwrap().to_display_string(), "world");
        assert_eq!(data.value("count").unwrap().to_numeric(), 3);
        assert!(data.value("missing").is_none());
    }

    #[test]
    fn test_builtin_modifiers() {
        let data = Data::new();
        assert!(data.modifier_by_name("toupper").is_some());
        assert!(data.modifier_by_name("tolower").is_some());
        assert!(data.modifier_by_name("sha512").is_none());
    }

    #[test]
    fn test_callback_without_cache_runs_every_time() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let mut data = Data::new();
        data.callback(
            "ticker",
            || VariantValue::from(CALLS.fetch_add(1, Ordering::SeqCst) as i64),
            false,
        );
        assert_eq!(data.value("ticker").unwrap().to_numeric(), 0);
        assert_eq!(data.value("ticker").unwrap().to_numeric(), 1);
    }

    #[test]
    fn test_callback_with_cache_runs_once() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let mut data = Data::new();
        data.callback(
            "fixed",
            || VariantValue::from(CALLS.fetch_add(1, Ordering::SeqCst) as i64),
            true,
        );
        assert_eq!(data.value("fixed").unwrap().to_numeric(), 0);
        assert_eq!(data.value("fixed").unwrap().to_numeric(), 0);
    }
}
