// SPDX-License-Identifier: MIT OR Apache-2.0
//! The provider registry: a single owned value holding every registered
//! adapter, with source/target facet queries.
//!
//! Registration happens at startup, unregistration at shutdown; there is
//! no hot reload.

use crate::traits::{Provider, SourceProvider, TargetProvider};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// An adapter plus its optional read/write facets.
///
/// The same `Arc` backs all three fields; the facets are just the same
/// adapter coerced to its facet traits.
#[derive(Clone)]
pub struct ProviderHandle {
    provider: Arc<dyn Provider>,
    source: Option<Arc<dyn SourceProvider>>,
    target: Option<Arc<dyn TargetProvider>>,
}

impl ProviderHandle {
    /// Handle for an adapter implementing both facets.
    #[must_use]
    pub fn source_and_target<P>(adapter: Arc<P>) -> Self
    where
        P: SourceProvider + TargetProvider + 'static,
    {
        Self {
            provider: adapter.clone(),
            source: Some(adapter.clone()),
            target: Some(adapter),
        }
    }

    /// Handle for a read-only adapter.
    #[must_use]
    pub fn source_only<P>(adapter: Arc<P>) -> Self
    where
        P: SourceProvider + 'static,
    {
        Self {
            provider: adapter.clone(),
            source: Some(adapter),
            target: None,
        }
    }

    /// Handle for a write-only adapter.
    #[must_use]
    pub fn target_only<P>(adapter: Arc<P>) -> Self
    where
        P: TargetProvider + 'static,
    {
        Self {
            provider: adapter.clone(),
            source: None,
            target: Some(adapter),
        }
    }

    /// The base facet.
    #[must_use]
    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// The read facet, when implemented.
    #[must_use]
    pub fn source(&self) -> Option<&Arc<dyn SourceProvider>> {
        self.source.as_ref()
    }

    /// The write facet, when implemented.
    #[must_use]
    pub fn target(&self) -> Option<&Arc<dyn TargetProvider>> {
        self.target.as_ref()
    }
}

/// Owned registry of adapters, keyed by provider id.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, ProviderHandle>,
}

impl ProviderRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter, replacing any previous entry with the same id.
    pub fn register(&mut self, handle: ProviderHandle) {
        let id = handle.provider().id().to_string();
        info!(target: "skb.registry", provider = %id, "provider registered");
        self.providers.insert(id, handle);
    }

    /// Remove an adapter by id, returning its handle if it was present.
    pub fn unregister(&mut self, id: &str) -> Option<ProviderHandle> {
        let removed = self.providers.remove(id);
        if removed.is_some() {
            info!(target: "skb.registry", provider = %id, "provider unregistered");
        }
        removed
    }

    /// Look up an adapter by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ProviderHandle> {
        self.providers.get(id)
    }

    /// Every registered adapter, sorted by id.
    #[must_use]
    pub fn all(&self) -> Vec<&ProviderHandle> {
        let mut handles: Vec<_> = self.providers.values().collect();
        handles.sort_by(|a, b| a.provider().id().cmp(b.provider().id()));
        handles
    }

    /// Adapters exposing the read facet, sorted by id.
    #[must_use]
    pub fn source_providers(&self) -> Vec<Arc<dyn SourceProvider>> {
        let mut out: Vec<_> = self
            .providers
            .values()
            .filter_map(|h| h.source().cloned())
            .collect();
        out.sort_by(|a, b| a.id().cmp(b.id()));
        out
    }

    /// Adapters exposing the write facet, sorted by id.
    #[must_use]
    pub fn target_providers(&self) -> Vec<Arc<dyn TargetProvider>> {
        let mut out: Vec<_> = self
            .providers
            .values()
            .filter_map(|h| h.target().cloned())
            .collect();
        out.sort_by(|a, b| a.id().cmp(b.id()));
        out
    }

    /// Number of registered adapters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.providers.keys().collect();
        ids.sort();
        f.debug_struct("ProviderRegistry")
            .field("providers", &ids)
            .finish()
    }
}
