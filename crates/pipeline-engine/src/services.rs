//! Injected collaborators for a pipeline run.
//!
//! `Services` carries the LLM capability, the graph registry and a typed
//! extension map. Runners and registered functions receive it by reference,
//! so hosts can hand their own runtime objects (API clients, stores) to
//! custom functions without process-wide singletons.
//!
//! # Example
//!
//! ```ignore
//! use pipeline_engine::{EchoLlm, ServiceExtensions, Services};
//! use std::sync::Arc;
//!
//! struct WordList(Vec<&'static str>);
//!
//! let services = Services::new()
//!     .with_llm(Arc::new(EchoLlm))
//!     .with_extensions(ServiceExtensions::new().with(WordList(vec!["ash", "oak"])));
//!
//! // In a PipelineFunction:
//! if let Some(WordList(words)) = services.extensions().get::<WordList>() {
//!     // ...
//! }
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{EngineError, Result};
use crate::graph_registry::GraphRegistry;
use crate::llm::LlmCapability;

/// Host objects keyed by their type, one value per type
#[derive(Default)]
pub struct ServiceExtensions {
    values: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl ServiceExtensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value`, replacing any previous value of the same type
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        self.values.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn with<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.insert(value);
        self
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }

    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.values.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Collaborators available to runners and functions
#[derive(Clone, Default)]
pub struct Services {
    llm: Option<Arc<dyn LlmCapability>>,
    graphs: Option<Arc<dyn GraphRegistry>>,
    extensions: Arc<ServiceExtensions>,
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmCapability>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_graphs(mut self, graphs: Arc<dyn GraphRegistry>) -> Self {
        self.graphs = Some(graphs);
        self
    }

    pub fn with_extensions(mut self, extensions: ServiceExtensions) -> Self {
        self.extensions = Arc::new(extensions);
        self
    }

    /// The LLM capability, or a provider error if none was configured
    pub fn llm(&self) -> Result<&Arc<dyn LlmCapability>> {
        self.llm
            .as_ref()
            .ok_or_else(|| EngineError::Provider("no LLM capability configured".into()))
    }

    pub fn graphs(&self) -> Option<&Arc<dyn GraphRegistry>> {
        self.graphs.as_ref()
    }

    pub fn extensions(&self) -> &ServiceExtensions {
        &self.extensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::EchoLlm;

    #[derive(Debug, PartialEq)]
    struct Budget(u32);

    #[test]
    fn test_values_are_keyed_by_type() {
        let mut ext = ServiceExtensions::new();
        ext.insert(Budget(3));
        ext.insert(Budget(42));
        assert_eq!(ext.get::<Budget>(), Some(&Budget(42)));
        assert_eq!(ext.get::<String>(), None);
        assert!(ext.contains::<Budget>());
        assert_eq!(ext.len(), 1);
    }

    #[test]
    fn test_missing_llm_is_provider_error() {
        let services = Services::new();
        assert!(matches!(services.llm(), Err(EngineError::Provider(_))));

        let services = services.with_llm(Arc::new(EchoLlm));
        assert!(services.llm().is_ok());
    }

    #[test]
    fn test_with_extensions() {
        let services =
            Services::new().with_extensions(ServiceExtensions::new().with("ash".to_string()));
        assert_eq!(
            services.extensions().get::<String>().map(String::as_str),
            Some("ash")
        );
        assert!(Services::new().extensions().is_empty());
    }
}
