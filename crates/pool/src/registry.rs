use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::RegistryError;

/// A callable exposed by dedicated workers.
pub type MethodFn = Arc<dyn Fn(Vec<Value>) -> Result<Value, String> + Send + Sync>;

/// Built-in method listing every callable name.
pub const METHODS: &str = "methods";

/// Reserved for inline functions.
pub const RUN: &str = "run";

/// Maps method names to the implementations a worker exposes.
///
/// The registry is shared read-only by every worker of a pool once the pool
/// is constructed.
#[derive(Clone, Default)]
pub struct MethodRegistry {
    methods: HashMap<String, MethodFn>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method. Fails on duplicate or reserved names.
    pub fn register<F>(&mut self, name: impl Into<String>, method: F) -> Result<(), RegistryError>
    where
        F: Fn(Vec<Value>) -> Result<Value, String> + Send + Sync + 'static,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if name == METHODS || name == RUN {
            return Err(RegistryError::Reserved(name));
        }
        if self.methods.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }
        self.methods.insert(name, Arc::new(method));
        Ok(())
    }

    /// Look up a registered method.
    pub fn get(&self, name: &str) -> Option<MethodFn> {
        self.methods.get(name).cloned()
    }

    /// Whether `name` can be called on a worker, built-ins included.
    pub fn resolves(&self, name: &str) -> bool {
        name == METHODS || self.methods.contains_key(name)
    }

    /// Sorted callable names, built-ins included.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.keys().cloned().collect();
        names.push(METHODS.to_string());
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl std::fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodRegistry")
            .field("methods", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo(args: Vec<Value>) -> Result<Value, String> {
        Ok(Value::Array(args))
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = MethodRegistry::new();
        registry.register("echo", echo).unwrap();

        assert_eq!(registry.len(), 1);
        let method = registry.get("echo").unwrap();
        assert_eq!(method(vec![json!(1)]).unwrap(), json!([1]));
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = MethodRegistry::new();
        registry.register("echo", echo).unwrap();
        assert!(matches!(
            registry.register("echo", echo),
            Err(RegistryError::DuplicateName(_))
        ));
    }

    #[test]
    fn test_reserved_and_empty_names() {
        let mut registry = MethodRegistry::new();
        assert!(matches!(registry.register(METHODS, echo), Err(RegistryError::Reserved(_))));
        assert!(matches!(registry.register(RUN, echo), Err(RegistryError::Reserved(_))));
        assert!(matches!(registry.register("  ", echo), Err(RegistryError::EmptyName)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_builtins_resolve() {
        let mut registry = MethodRegistry::new();
        registry.register("fib", echo).unwrap();

        assert!(registry.resolves("methods"));
        assert!(registry.resolves("fib"));
        assert!(!registry.resolves("run"));
        assert_eq!(registry.names(), vec!["fib".to_string(), "methods".to_string()]);
    }
}
