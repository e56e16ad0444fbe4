#![forbid(unsafe_code)]

//! Conversion of typed values into SQL literal text.

use serde_json::Value as JsonValue;

use crate::source::MetadataSource;
use crate::types::{
    encode_struct, ArtifactState, EventType, ExecutionState, PropertyType, PropertyValue, TypeKind,
    ValueColumn,
};

/// Renders a value as an SQL literal. Text goes through the backend's escaping.
pub trait Bind {
    /// Literal text for this value.
    fn bind(&self, source: &dyn MetadataSource) -> String;
}

fn quoted(source: &dyn MetadataSource, text: &str) -> String {
    format!("'{}'", source.escape_string(text))
}

impl<T: Bind + ?Sized> Bind for &T {
    fn bind(&self, source: &dyn MetadataSource) -> String {
        (**self).bind(source)
    }
}

/// `None` renders as `null`.
impl<T: Bind> Bind for Option<T> {
    fn bind(&self, source: &dyn MetadataSource) -> String {
        match self {
            Some(value) => value.bind(source),
            None => "null".to_string(),
        }
    }
}

impl Bind for str {
    fn bind(&self, source: &dyn MetadataSource) -> String {
        quoted(source, self)
    }
}

impl Bind for String {
    fn bind(&self, source: &dyn MetadataSource) -> String {
        quoted(source, self)
    }
}

macro_rules! bind_display {
    ($($ty:ty),*) => {
        $(
            impl Bind for $ty {
                fn bind(&self, _: &dyn MetadataSource) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

bind_display!(i32, i64, u32, usize);

/// SQLite reads `9e999` as infinity and stores NaN as NULL.
fn double_literal(value: f64) -> String {
    if value.is_nan() {
        "null".to_string()
    } else if value.is_infinite() {
        let literal = if value > 0.0 { "9e999" } else { "-9e999" };
        literal.to_string()
    } else {
        value.to_string()
    }
}

impl Bind for f64 {
    fn bind(&self, _: &dyn MetadataSource) -> String {
        double_literal(*self)
    }
}

impl Bind for bool {
    fn bind(&self, _: &dyn MetadataSource) -> String {
        let literal = if *self { "1" } else { "0" };
        literal.to_string()
    }
}

/// Byte spans are stored as (lossy) text.
impl Bind for [u8] {
    fn bind(&self, source: &dyn MetadataSource) -> String {
        quoted(source, &String::from_utf8_lossy(self))
    }
}

/// Id spans render comma separated, for use inside `IN (...)`.
impl Bind for [i64] {
    fn bind(&self, _: &dyn MetadataSource) -> String {
        self.iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Bind for Vec<i64> {
    fn bind(&self, source: &dyn MetadataSource) -> String {
        self.as_slice().bind(source)
    }
}

/// Structured values are quoted JSON.
impl Bind for JsonValue {
    fn bind(&self, source: &dyn MetadataSource) -> String {
        quoted(source, &self.to_string())
    }
}

macro_rules! bind_ordinal {
    ($($ty:ty),*) => {
        $(
            impl Bind for $ty {
                fn bind(&self, _: &dyn MetadataSource) -> String {
                    self.ordinal().to_string()
                }
            }
        )*
    };
}

bind_ordinal!(TypeKind, ArtifactState, ExecutionState, PropertyType, EventType);

impl Bind for PropertyValue {
    fn bind(&self, source: &dyn MetadataSource) -> String {
        match self {
            PropertyValue::Int(v) => v.to_string(),
            PropertyValue::Double(v) => double_literal(*v),
            PropertyValue::String(v) => quoted(source, v),
            PropertyValue::Struct(v) => quoted(source, &encode_struct(v)),
        }
    }
}

/// An identifier substituted verbatim, for placeholders that sit inside backticks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ident<'a>(pub &'a str);

impl Bind for Ident<'_> {
    fn bind(&self, _: &dyn MetadataSource) -> String {
        self.0.to_string()
    }
}

/// Column identifiers are substituted unquoted, inside the template's backticks.
impl Bind for ValueColumn {
    fn bind(&self, _: &dyn MetadataSource) -> String {
        self.name().to_string()
    }
}
