use std::sync::Arc;

use tracing::warn;

use crate::backend::Backend;

/// The set of backends available to a [`DocumentLoader`](crate::DocumentLoader).
///
/// Documents keep their own handle to the backend that opened them, so the
/// registry may be dropped while documents are still open.
#[derive(Debug, Default)]
pub struct BackendRegistry {
    backends: Vec<Arc<Backend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a backend. When two backends claim the same content type, the one
    /// registered first keeps it.
    pub fn register(&mut self, backend: Backend) -> Arc<Backend> {
        for content_type in backend.content_types() {
            if let Some(existing) = self.lookup(content_type) {
                warn!(
                    content_type = %content_type,
                    existing = existing.name(),
                    ignored = backend.name(),
                    "content type already handled by another backend"
                );
            }
        }
        let backend = Arc::new(backend);
        self.backends.push(Arc::clone(&backend));
        backend
    }

    pub fn lookup(&self, content_type: &str) -> Option<Arc<Backend>> {
        self.backends
            .iter()
            .find(|backend| backend.handles(content_type))
            .cloned()
    }

    /// Every content type claimed by a registered backend, without duplicates.
    pub fn content_types(&self) -> Vec<&str> {
        let mut content_types: Vec<&str> = Vec::new();
        for content_type in self.backends.iter().flat_map(|b| b.content_types()) {
            if !content_types.contains(&content_type.as_str()) {
                content_types.push(content_type);
            }
        }
        content_types
    }

    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
