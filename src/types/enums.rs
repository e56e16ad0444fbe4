#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Closed enumerations stored as integer ordinals.

use serde::{Deserialize, Serialize};

/// Kind column of the `Type` table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i64)]
pub enum TypeKind {
    Execution = 0,
    Artifact = 1,
    Context = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i64)]
pub enum ArtifactState {
    Unknown = 0,
    Pending = 1,
    Live = 2,
    MarkedForDeletion = 3,
    Deleted = 4,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i64)]
pub enum ExecutionState {
    Unknown = 0,
    New = 1,
    Running = 2,
    Complete = 3,
    Failed = 4,
    Cached = 5,
    Canceled = 6,
}

/// Declared data type of a type property.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i64)]
pub enum PropertyType {
    Unknown = 0,
    Int = 1,
    Double = 2,
    String = 3,
    Struct = 4,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i64)]
pub enum EventType {
    Unknown = 0,
    DeclaredOutput = 1,
    DeclaredInput = 2,
    Input = 3,
    Output = 4,
    InternalInput = 5,
    InternalOutput = 6,
}

/// Node tables that support listing and property storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Artifact,
    Execution,
    Context,
}

impl NodeKind {
    /// Table holding rows of this kind.
    pub const fn table_name(self) -> &'static str {
        match self {
            NodeKind::Artifact => "Artifact",
            NodeKind::Execution => "Execution",
            NodeKind::Context => "Context",
        }
    }

    /// Matching value of the `type_kind` column.
    pub const fn type_kind(self) -> TypeKind {
        match self {
            NodeKind::Artifact => TypeKind::Artifact,
            NodeKind::Execution => TypeKind::Execution,
            NodeKind::Context => TypeKind::Context,
        }
    }
}

macro_rules! ordinal {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $ty {
                /// Integer ordinal stored in the database.
                pub const fn ordinal(self) -> i64 {
                    self as i64
                }
            }
        )*
    };
}

ordinal!(TypeKind, ArtifactState, ExecutionState, PropertyType, EventType);
