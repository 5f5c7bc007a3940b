//! Class schemas and the host-side class lookup

use crate::class::ClassPart;
use midl_ndr::NdrUuid;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::trace;

/// Class part that instances are decoded against
///
/// `class_id` is known when the schema arrived with an instance or from a
/// provider; a bare class-definition record does not carry one.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassSchema {
    class_id: Option<NdrUuid>,
    class: ClassPart,
}

impl ClassSchema {
    pub fn new(class_id: Option<NdrUuid>, class: ClassPart) -> Self {
        Self { class_id, class }
    }

    pub fn class_id(&self) -> Option<NdrUuid> {
        self.class_id
    }

    pub fn class(&self) -> &ClassPart {
        &self.class
    }

    pub fn name(&self) -> Option<&str> {
        self.class.name()
    }

    /// Whether an instance tagged with `class_id` may use this schema
    pub(crate) fn accepts(&self, class_id: &NdrUuid) -> bool {
        self.class_id.map_or(true, |own| own == *class_id)
    }
}

/// Supplies class schemas that an object batch refers to without carrying
pub trait ClassProvider {
    fn class_for(&self, class_id: &NdrUuid) -> Option<Arc<ClassSchema>>;
}

/// Provider that knows no classes; batches must be self-contained
#[derive(Debug, Clone, Copy, Default)]
pub struct NoClassProvider;

impl ClassProvider for NoClassProvider {
    fn class_for(&self, _class_id: &NdrUuid) -> Option<Arc<ClassSchema>> {
        None
    }
}

impl ClassProvider for HashMap<NdrUuid, Arc<ClassSchema>> {
    fn class_for(&self, class_id: &NdrUuid) -> Option<Arc<ClassSchema>> {
        self.get(class_id).cloned()
    }
}

impl<P: ClassProvider + ?Sized> ClassProvider for &P {
    fn class_for(&self, class_id: &NdrUuid) -> Option<Arc<ClassSchema>> {
        (**self).class_for(class_id)
    }
}

impl<P: ClassProvider + ?Sized> ClassProvider for Arc<P> {
    fn class_for(&self, class_id: &NdrUuid) -> Option<Arc<ClassSchema>> {
        (**self).class_for(class_id)
    }
}

/// Thread-safe class table filled from earlier batches
///
/// Later batches on the same connection may send instances without their
/// class once the peer has transmitted it.
#[derive(Debug, Default)]
pub struct ClassCache {
    entries: RwLock<HashMap<NdrUuid, Arc<ClassSchema>>>,
}

impl ClassCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema under its class id. Schemas without an id are ignored.
    pub fn register(&self, schema: Arc<ClassSchema>) -> bool {
        let Some(class_id) = schema.class_id() else {
            return false;
        };
        trace!(%class_id, "caching class schema");
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(class_id, schema);
        true
    }

    /// Register every identified class schema a batch carried
    pub fn remember(&self, batch: &crate::ObjectBatch) -> usize {
        batch
            .records()
            .iter()
            .filter(|record| record.kind() == crate::ObjectKind::InstanceWithClass)
            .filter(|record| self.register(Arc::clone(record.class())))
            .count()
    }

    pub fn remove(&self, class_id: &NdrUuid) -> Option<Arc<ClassSchema>> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(class_id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ClassProvider for ClassCache {
    fn class_for(&self, class_id: &NdrUuid) -> Option<Arc<ClassSchema>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(class_id).cloned()
    }
}
