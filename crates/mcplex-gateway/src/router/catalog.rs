//! Aggregate capability catalog
//!
//! Rebuilt from the Ready connections whenever one of them enters or leaves
//! `Ready`; readers get a cheap `Arc` clone of the current version.

use std::sync::Arc;

use mcplex_core::{
    CapabilityCounts, CapabilityEntry, CapabilityKind, CapabilitySnapshot, DomainEvent,
    EventSender, PublicName,
};
use parking_lot::RwLock;
use tracing::debug;

/// Union of every Ready backend's capabilities under public names
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    entries: Vec<CapabilityEntry>,
}

impl Catalog {
    /// Merge `(owner, snapshot)` pairs; order follows the input
    pub fn build(sources: &[(String, CapabilitySnapshot)]) -> Self {
        let entries = sources
            .iter()
            .flat_map(|(owner, snapshot)| {
                snapshot
                    .iter()
                    .map(move |(kind, descriptor)| {
                        CapabilityEntry::from_descriptor(owner, kind, descriptor)
                    })
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[CapabilityEntry] {
        &self.entries
    }

    pub fn of_kind(&self, kind: CapabilityKind) -> impl Iterator<Item = &CapabilityEntry> {
        self.entries.iter().filter(move |e| e.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn counts(&self) -> CapabilityCounts {
        CapabilityCounts {
            tools: self.of_kind(CapabilityKind::Tool).count(),
            resources: self.of_kind(CapabilityKind::Resource).count(),
            prompts: self.of_kind(CapabilityKind::Prompt).count(),
        }
    }

    pub fn find(&self, kind: CapabilityKind, name: &PublicName) -> Option<&CapabilityEntry> {
        self.entries
            .iter()
            .find(|e| e.kind == kind && &e.public_name == name)
    }

    /// Resource URIs are opaque, so the first owner in name order wins
    pub fn resource_by_uri(&self, uri: &str) -> Option<&CapabilityEntry> {
        self.of_kind(CapabilityKind::Resource)
            .filter(|e| e.uri.as_deref() == Some(uri))
            .min_by(|a, b| a.owner().cmp(b.owner()))
    }
}

/// Holder of the current catalog version
pub struct CatalogAggregate {
    current: RwLock<Arc<Catalog>>,
    event_tx: EventSender,
}

impl CatalogAggregate {
    pub fn new(event_tx: EventSender) -> Self {
        Self {
            current: RwLock::new(Arc::new(Catalog::default())),
            event_tx,
        }
    }

    pub fn current(&self) -> Arc<Catalog> {
        self.current.read().clone()
    }

    /// Swap in a catalog built from `sources`
    ///
    /// Emits `CatalogRebuilt` and returns `true` only if the contents changed.
    pub fn rebuild(&self, sources: &[(String, CapabilitySnapshot)]) -> bool {
        let catalog = Catalog::build(sources);

        let entries = {
            let mut current = self.current.write();
            if **current == catalog {
                return false;
            }
            let entries = catalog.len();
            *current = Arc::new(catalog);
            entries
        };

        debug!(
            entries = entries,
            backends = sources.len(),
            "[CatalogAggregate] Catalog rebuilt"
        );
        self.event_tx.emit(DomainEvent::CatalogRebuilt { entries });
        true
    }
}
