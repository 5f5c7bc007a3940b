//! Object stream error types

use crate::value::CimType;
use midl_ndr::{NdrError, NdrUuid};
use thiserror::Error;

/// Object stream errors
#[derive(Debug, Error)]
pub enum WmioError {
    /// An instance record omitted its class and no schema for it is in scope
    #[error("object {index}: no class schema in scope for instance of class {class_id}")]
    MissingSchemaContext { index: usize, class_id: NdrUuid },

    /// The class declares no property of that name
    #[error("class {class:?} has no property {property:?}")]
    UnknownProperty { class: String, property: String },

    /// A value was assigned to a property of another CIM type
    #[error("property {property} is declared {expected}")]
    TypeMismatch { property: String, expected: CimType },

    /// Framing error from the underlying codec
    #[error(transparent)]
    Ndr(#[from] NdrError),
}

impl WmioError {
    /// True for record, version or type tags this decoder does not implement
    pub fn is_unsupported(&self) -> bool {
        matches!(self, WmioError::Ndr(e) if e.is_unsupported())
    }
}

/// Result type for object stream operations
pub type Result<T> = std::result::Result<T, WmioError>;
