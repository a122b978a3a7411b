//! Layered name → value store consulted by expression evaluation.
//!
//! Lookup precedence:
//! 1. the active template-group context binding, if any
//! 2. the current scope's resource values
//! 3. outer scopes saved while a group body runs, most recently pushed first

use super::types::{Value, ValueMap};

/// Read-only lookup capability handed to expressions.
pub trait ValueLookup {
    fn lookup(&self, name: &str) -> Option<&Value>;
}

/// The value store of one run.
#[derive(Debug, Default)]
pub struct Scope {
    context: Option<ValueMap>,
    values: ValueMap,
    outer: Vec<ValueMap>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scope whose current map is pre-populated (top-level parameters).
    pub fn with_values(values: ValueMap) -> Self {
        Self {
            values,
            ..Self::default()
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        if let Some(v) = self.context.as_ref().and_then(|c| c.get(name)) {
            return Some(v);
        }
        if let Some(v) = self.values.get(name) {
            return Some(v);
        }
        self.outer.iter().rev().find_map(|m| m.get(name))
    }

    /// Publish a value in the current scope. Outer maps are never written.
    pub fn set(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    pub fn push_scope(&mut self, values: ValueMap) {
        self.outer.push(values);
    }

    pub fn pop_scope(&mut self) -> Option<ValueMap> {
        self.outer.pop()
    }

    /// Swap out the current map for an empty one, returning the old map.
    pub fn take_values(&mut self) -> ValueMap {
        std::mem::take(&mut self.values)
    }

    /// Install `values` as the current map, returning the previous one.
    pub fn replace_values(&mut self, values: ValueMap) -> ValueMap {
        std::mem::replace(&mut self.values, values)
    }

    pub fn set_context(&mut self, context: Option<ValueMap>) {
        self.context = context;
    }

    pub fn values(&self) -> &ValueMap {
        &self.values
    }

    pub fn depth(&self) -> usize {
        self.outer.len()
    }
}

impl ValueLookup for Scope {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

impl ValueLookup for ValueMap {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, Value)]) -> ValueMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_scope_set_and_get() {
        let mut s = Scope::new();
        assert!(s.get("a").is_none());
        s.set("a", Value::Int(5));
        assert_eq!(s.get("a"), Some(&Value::Int(5)));
    }

    #[test]
    fn test_scope_context_wins_over_values() {
        let mut s = Scope::new();
        s.set("n", Value::Int(1));
        s.set_context(Some(map(&[("n", Value::Int(2))])));
        assert_eq!(s.get("n"), Some(&Value::Int(2)));
        s.set_context(None);
        assert_eq!(s.get("n"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_scope_outer_maps_most_recent_first() {
        let mut s = Scope::new();
        s.push_scope(map(&[("x", Value::Int(1)), ("y", Value::Int(10))]));
        s.push_scope(map(&[("x", Value::Int(2))]));
        assert_eq!(s.get("x"), Some(&Value::Int(2)));
        assert_eq!(s.get("y"), Some(&Value::Int(10)));
        s.set("x", Value::Int(3));
        assert_eq!(s.get("x"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_scope_save_and_restore_round() {
        let mut s = Scope::with_values(map(&[("pool", Value::Int(9))]));
        let saved = s.take_values();
        s.push_scope(saved);
        assert_eq!(s.depth(), 1);
        s.set("vol", Value::Int(1));
        assert_eq!(s.get("pool"), Some(&Value::Int(9)));

        let inner = s.take_values();
        let outer = s.pop_scope().unwrap();
        s.replace_values(outer);
        assert_eq!(inner.len(), 1);
        assert!(s.get("vol").is_none());
        assert_eq!(s.get("pool"), Some(&Value::Int(9)));
    }

    #[test]
    fn test_scope_pop_empty_is_none() {
        let mut s = Scope::new();
        assert!(s.pop_scope().is_none());
    }
}
