//! Type registry: which provisioner kinds can run, and how their config looks.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::id::ProvisionerKind;
use crate::payload::{ConfigPayload, DummySchema, SchemaFactory, schema_of};

/// Lookup service consulted when a declaration is constructed.
///
/// Implementations are read-only from the declaration's point of view and
/// may be shared across threads.
pub trait TypeRegistry: Send + Sync {
    /// Whether an executor is registered for `kind`.
    fn has_executor(&self, kind: &ProvisionerKind) -> bool;

    /// The config schema registered for `kind`, if any.
    fn schema_factory(&self, kind: &ProvisionerKind) -> Option<Arc<dyn SchemaFactory>>;

    /// Like [`TypeRegistry::schema_factory`], falling back to [`DummySchema`].
    fn schema_factory_for(&self, kind: &ProvisionerKind) -> Arc<dyn SchemaFactory> {
        self.schema_factory(kind)
            .unwrap_or_else(|| Arc::new(DummySchema))
    }
}

/// In-memory registry, immutable once built.
#[derive(Clone, Default)]
pub struct KindRegistry {
    executors: BTreeSet<ProvisionerKind>,
    schemas: HashMap<ProvisionerKind, Arc<dyn SchemaFactory>>,
}

impl KindRegistry {
    pub fn builder() -> KindRegistryBuilder {
        KindRegistryBuilder::new()
    }

    /// Kinds with a registered executor, sorted.
    pub fn kinds(&self) -> impl Iterator<Item = &ProvisionerKind> {
        self.executors.iter()
    }

    pub fn has_schema(&self, kind: &ProvisionerKind) -> bool {
        self.schemas.contains_key(kind)
    }
}

impl TypeRegistry for KindRegistry {
    fn has_executor(&self, kind: &ProvisionerKind) -> bool {
        self.executors.contains(kind)
    }

    fn schema_factory(&self, kind: &ProvisionerKind) -> Option<Arc<dyn SchemaFactory>> {
        self.schemas.get(kind).cloned()
    }
}

impl fmt::Debug for KindRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut schemas: Vec<_> = self.schemas.keys().collect();
        schemas.sort();
        f.debug_struct("KindRegistry")
            .field("executors", &self.executors)
            .field("schemas", &schemas)
            .finish()
    }
}

/// Builder for [`KindRegistry`].
pub struct KindRegistryBuilder {
    registry: KindRegistry,
}

impl KindRegistryBuilder {
    pub fn new() -> Self {
        Self {
            registry: KindRegistry::default(),
        }
    }

    /// Mark `kind` as having an executor.
    pub fn executor(mut self, kind: impl Into<ProvisionerKind>) -> Self {
        self.registry.executors.insert(kind.into());
        self
    }

    /// Register `T::default()` as the config schema for `kind`.
    pub fn schema<T: ConfigPayload + Default>(self, kind: impl Into<ProvisionerKind>) -> Self {
        self.schema_with(kind, schema_of::<T>())
    }

    /// Register an arbitrary schema factory for `kind`.
    pub fn schema_with(
        mut self,
        kind: impl Into<ProvisionerKind>,
        factory: Arc<dyn SchemaFactory>,
    ) -> Self {
        self.registry.schemas.insert(kind.into(), factory);
        self
    }

    /// Register both an executor and a `T::default()` schema for `kind`.
    pub fn provisioner<T: ConfigPayload + Default>(self, kind: impl Into<ProvisionerKind>) -> Self {
        let kind = kind.into();
        self.executor(kind.clone()).schema::<T>(kind)
    }

    pub fn build(self) -> KindRegistry {
        self.registry
    }
}

impl Default for KindRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::DummyConfig;

    #[test]
    fn test_executor_lookup() {
        let registry = KindRegistry::builder().executor("shell").build();
        assert!(registry.has_executor(&"shell".into()));
        assert!(!registry.has_executor(&"chef".into()));
    }

    #[test]
    fn test_schema_without_executor() {
        let registry = KindRegistry::builder()
            .schema::<DummyConfig>("orphan")
            .build();
        assert!(!registry.has_executor(&"orphan".into()));
        assert!(registry.schema_factory(&"orphan".into()).is_some());
    }

    #[test]
    fn test_schema_factory_for_falls_back_to_dummy() {
        let registry = KindRegistry::builder().executor("bare").build();
        assert!(registry.schema_factory(&"bare".into()).is_none());

        let payload = registry.schema_factory_for(&"bare".into()).instantiate();
        assert!(payload.is::<DummyConfig>());
    }

    #[test]
    fn test_kinds_sorted() {
        let registry = KindRegistry::builder()
            .executor("shell")
            .executor("ansible")
            .provisioner::<DummyConfig>("file")
            .build();
        let kinds: Vec<_> = registry.kinds().map(|k| k.as_str()).collect();
        assert_eq!(kinds, vec!["ansible", "file", "shell"]);
        assert!(registry.has_schema(&"file".into()));
    }
}
