//! [`Backends`]: the facade's [`chronos_core::BackendResolver`] implementation.
//!
//! Holds every configured `(DocumentStore, ObjectStore)` pair keyed by
//! backend id, the concrete registry the router's abstract backend ids
//! resolve against.

use std::sync::Arc;

use chronos_core::{BackendResolver, DocumentStore, ObjectStore};
use dashmap::DashMap;

#[derive(Clone, Default)]
pub struct Backends {
    entries: Arc<DashMap<String, (Arc<dyn DocumentStore>, Arc<dyn ObjectStore>)>>,
}

impl Backends {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: impl Into<String>, doc_store: Arc<dyn DocumentStore>, object_store: Arc<dyn ObjectStore>) {
        self.entries.insert(id.into(), (doc_store, object_store));
    }

    /// Every registered backend's document store, for the background tasks
    /// that need to iterate backends directly (fallback worker, retention).
    pub fn document_stores(&self) -> Vec<(String, Arc<dyn DocumentStore>)> {
        self.entries.iter().map(|entry| (entry.key().clone(), entry.value().0.clone())).collect()
    }
}

impl BackendResolver for Backends {
    fn resolve(&self, backend_id: &str) -> Option<(Arc<dyn DocumentStore>, Arc<dyn ObjectStore>)> {
        self.entries.get(backend_id).map(|entry| entry.value().clone())
    }
}
