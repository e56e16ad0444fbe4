#![forbid(unsafe_code)]

//! Shared value, enum and error types.

mod enums;
mod error;
mod value;

pub use enums::{ArtifactState, EventType, ExecutionState, NodeKind, PropertyType, TypeKind};
pub use error::{CatalogError, ErrorCode, Result, ResultExt};
pub use value::{decode_struct, encode_struct, PropertyValue, ValueColumn, STRUCT_VALUE_PREFIX};
