#![forbid(unsafe_code)]

use serde_json::Value as JsonValue;

/// Prefix marking an encoded structured value in the `string_value` column.
pub const STRUCT_VALUE_PREFIX: &str = "mlmd-struct::";

/// Value stored in one of the `*Property` tables.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Double(f64),
    /// Text value.
    String(String),
    /// Structured value encoded as JSON.
    Struct(JsonValue),
}

/// Storage column a property value is written to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueColumn {
    /// `int_value`
    Int,
    /// `double_value`
    Double,
    /// `string_value`
    String,
}

impl ValueColumn {
    /// Column name as it appears in the property tables.
    pub const fn name(self) -> &'static str {
        match self {
            ValueColumn::Int => "int_value",
            ValueColumn::Double => "double_value",
            ValueColumn::String => "string_value",
        }
    }
}

impl PropertyValue {
    /// Column this value is stored in. Text and structured values share `string_value`.
    pub fn column(&self) -> ValueColumn {
        match self {
            PropertyValue::Int(_) => ValueColumn::Int,
            PropertyValue::Double(_) => ValueColumn::Double,
            PropertyValue::String(_) | PropertyValue::Struct(_) => ValueColumn::String,
        }
    }
}

/// Canonical text form of a structured value: prefix plus compact JSON with sorted keys.
pub fn encode_struct(value: &JsonValue) -> String {
    // serde_json::Map is ordered by key without the preserve_order feature.
    format!("{STRUCT_VALUE_PREFIX}{value}")
}

/// Reverses [`encode_struct`]. Returns `None` for unprefixed or malformed input.
pub fn decode_struct(text: &str) -> Option<JsonValue> {
    let body = text.strip_prefix(STRUCT_VALUE_PREFIX)?;
    serde_json::from_str(body).ok()
}
