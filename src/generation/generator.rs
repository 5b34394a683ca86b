//! Generator trait and registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::GenerationError;
use crate::generation::GenerationRequest;

// == Generator Trait ==
/// Produces the output artifact for one request.
///
/// Generators are synchronous and may be CPU heavy; the orchestrator runs them
/// on blocking threads. They must be safe to call from several threads at once.
pub trait Generator: Send + Sync {
    fn generate(&self, request: &GenerationRequest) -> Result<Value, GenerationError>;
}

impl<F> Generator for F
where
    F: Fn(&GenerationRequest) -> Result<Value, GenerationError> + Send + Sync,
{
    fn generate(&self, request: &GenerationRequest) -> Result<Value, GenerationError> {
        self(request)
    }
}

// == Generator Registry ==
/// Maps request types to generators.
#[derive(Clone, Default)]
pub struct GeneratorRegistry {
    generators: HashMap<String, Arc<dyn Generator>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `generator` for `request_type`, replacing any previous one.
    pub fn register(&mut self, request_type: impl Into<String>, generator: impl Generator + 'static) {
        self.generators.insert(request_type.into(), Arc::new(generator));
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, request_type: impl Into<String>, generator: impl Generator + 'static) -> Self {
        self.register(request_type, generator);
        self
    }

    pub fn get(&self, request_type: &str) -> Option<Arc<dyn Generator>> {
        self.generators.get(request_type).cloned()
    }

    /// Registered types, sorted.
    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.generators.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.generators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }
}

impl fmt::Debug for GeneratorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorRegistry")
            .field("types", &self.types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo(request: &GenerationRequest) -> Result<Value, GenerationError> {
        Ok(request.payload.clone())
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = GeneratorRegistry::new()
            .with("echo", echo)
            .with("fail", |_: &GenerationRequest| Err::<Value, _>(GenerationError::failed("nope")));

        assert_eq!(registry.types(), vec!["echo", "fail"]);
        assert!(registry.get("missing").is_none());

        let request = GenerationRequest::new("r1", "echo", json!({"a": 1}), Value::Null);
        let output = registry.get("echo").unwrap().generate(&request).unwrap();
        assert_eq!(output, json!({"a": 1}));

        let err = registry.get("fail").unwrap().generate(&request).unwrap_err();
        assert_eq!(err, GenerationError::failed("nope"));
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = GeneratorRegistry::new();
        registry.register("x", |_: &GenerationRequest| Ok::<_, GenerationError>(json!(1)));
        registry.register("x", |_: &GenerationRequest| Ok::<_, GenerationError>(json!(2)));

        let request = GenerationRequest::new("r1", "x", Value::Null, Value::Null);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("x").unwrap().generate(&request).unwrap(), json!(2));
    }
}
