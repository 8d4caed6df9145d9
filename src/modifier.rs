//! Variable modifiers
//!
//! A modifier is a named transformer chained after `|` in an expression:
//! `{$name|toupper}`. Modifiers are registered on the [`Data`](crate::Data)
//! object; the two case modifiers below come pre-registered.
//!
//! Modifiers must be pure: they may allocate new values but never mutate the
//! data environment.

use crate::value::VariantValue;

/// A named value transformer.
pub trait Modifier: Send + Sync {
    /// Transform a value. `params` holds the literal arguments of the
    /// `|name:arg:arg` syntax, in order; most modifiers ignore them.
    fn apply(&self, input: &VariantValue, params: &[VariantValue]) -> VariantValue;
}

/// `{$x|toupper}`
pub struct ToUpper;

impl Modifier for ToUpper {
    fn apply(&self, input: &VariantValue, _params: &[VariantValue]) -> VariantValue {
        input.to_display_string().to_uppercase().into()
    }
}

/// `{$x|tolower}`
pub struct ToLower;

impl Modifier for ToLower {
    fn apply(&self, input: &VariantValue, _params: &[VariantValue]) -> VariantValue {
        input.to_display_string().to_lowercase().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toupper() {
        let out = ToUpper.apply(&"hello".into(), &[]);
        assert_eq!(out.to_display_string(), "HELLO");
    }

    #[test]
    fn test_tolower_coerces_first() {
        // non-string input goes through its string form
        let out = ToLower.apply(&true.into(), &[]);
        assert_eq!(out.to_display_string(), "true");
    }
}
