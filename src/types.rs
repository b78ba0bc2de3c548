//! Column type codes and recursive type descriptors.
//!
//! The server describes every result column with a descriptor. Scalars carry
//! a small integer code, arrays wrap another descriptor to any depth:
//!
//! ```text
//! {"kind":"base","type":9}                                   INTEGER
//! {"kind":"array","elementType":{"kind":"base","type":4}}    TEXT[]
//! [100, [100, 9]]                                            INTEGER[][] (compact form)
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::fmt;

/// Scalar type codes reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataType {
    Null,
    NotSupported,
    Char,
    Boolean,
    Text,
    Ip,
    Double,
    Real,
    SmallInt,
    Integer,
    BigInt,
    TimestampWithTz,
    Object,
    GeoPoint,
    GeoShape,
    TimestampWithoutTz,
    UncheckedObject,
    RegProc,
    Time,
    OidVector,
    Numeric,
    RegClass,
    Date,
    Bit,
    Json,
    Character,
    /// Array marker. Only meaningful as the outer tag of an array descriptor.
    Array,
}

impl DataType {
    /// All known codes, in code order.
    pub const ALL: [DataType; 27] = [
        DataType::Null,
        DataType::NotSupported,
        DataType::Char,
        DataType::Boolean,
        DataType::Text,
        DataType::Ip,
        DataType::Double,
        DataType::Real,
        DataType::SmallInt,
        DataType::Integer,
        DataType::BigInt,
        DataType::TimestampWithTz,
        DataType::Object,
        DataType::GeoPoint,
        DataType::GeoShape,
        DataType::TimestampWithoutTz,
        DataType::UncheckedObject,
        DataType::RegProc,
        DataType::Time,
        DataType::OidVector,
        DataType::Numeric,
        DataType::RegClass,
        DataType::Date,
        DataType::Bit,
        DataType::Json,
        DataType::Character,
        DataType::Array,
    ];

    /// Wire code of this type.
    pub fn code(self) -> i64 {
        match self {
            DataType::Null => 0,
            DataType::NotSupported => 1,
            DataType::Char => 2,
            DataType::Boolean => 3,
            DataType::Text => 4,
            DataType::Ip => 5,
            DataType::Double => 6,
            DataType::Real => 7,
            DataType::SmallInt => 8,
            DataType::Integer => 9,
            DataType::BigInt => 10,
            DataType::TimestampWithTz => 11,
            DataType::Object => 12,
            DataType::GeoPoint => 13,
            DataType::GeoShape => 14,
            DataType::TimestampWithoutTz => 15,
            DataType::UncheckedObject => 16,
            DataType::RegProc => 19,
            DataType::Time => 20,
            DataType::OidVector => 21,
            DataType::Numeric => 22,
            DataType::RegClass => 23,
            DataType::Date => 24,
            DataType::Bit => 25,
            DataType::Json => 26,
            DataType::Character => 27,
            DataType::Array => 100,
        }
    }

    /// Look up a wire code. Unknown codes return `None`.
    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.code() == code)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Null => "NULL",
            DataType::NotSupported => "NOT_SUPPORTED",
            DataType::Char => "CHAR",
            DataType::Boolean => "BOOLEAN",
            DataType::Text => "TEXT",
            DataType::Ip => "IP",
            DataType::Double => "DOUBLE",
            DataType::Real => "REAL",
            DataType::SmallInt => "SMALLINT",
            DataType::Integer => "INTEGER",
            DataType::BigInt => "BIGINT",
            DataType::TimestampWithTz => "TIMESTAMP WITH TIME ZONE",
            DataType::Object => "OBJECT",
            DataType::GeoPoint => "GEO_POINT",
            DataType::GeoShape => "GEO_SHAPE",
            DataType::TimestampWithoutTz => "TIMESTAMP WITHOUT TIME ZONE",
            DataType::UncheckedObject => "UNCHECKED_OBJECT",
            DataType::RegProc => "REGPROC",
            DataType::Time => "TIME",
            DataType::OidVector => "OIDVECTOR",
            DataType::Numeric => "NUMERIC",
            DataType::RegClass => "REGCLASS",
            DataType::Date => "DATE",
            DataType::Bit => "BIT",
            DataType::Json => "JSON",
            DataType::Character => "CHARACTER",
            DataType::Array => "ARRAY",
        };
        f.write_str(name)
    }
}

/// Type of a result column: a scalar, or an array of another descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    Base(DataType),
    Array(Box<TypeDescriptor>),
}

impl TypeDescriptor {
    /// Shorthand for `Array(Box::new(element))`.
    pub fn array(element: TypeDescriptor) -> Self {
        TypeDescriptor::Array(Box::new(element))
    }

    /// Number of array levels wrapping the scalar.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self;
        while let TypeDescriptor::Array(inner) = current {
            depth += 1;
            current = inner;
        }
        depth
    }

    /// Decode a descriptor from either the tagged or the compact wire form.
    pub fn from_json(value: &JsonValue) -> Result<Self, String> {
        match value {
            JsonValue::Number(n) => {
                let code = n.as_i64().ok_or_else(|| format!("invalid type code: {}", n))?;
                base_from_code(code)
            }
            JsonValue::Array(items) => match items.as_slice() {
                [tag, inner] if tag.as_i64() == Some(DataType::Array.code()) => {
                    Ok(TypeDescriptor::array(Self::from_json(inner)?))
                }
                _ => Err(format!("invalid compact type descriptor: {}", value)),
            },
            JsonValue::Object(map) => match map.get("kind").and_then(JsonValue::as_str) {
                Some("base") => {
                    let code = map
                        .get("type")
                        .and_then(JsonValue::as_i64)
                        .ok_or_else(|| format!("base descriptor without type code: {}", value))?;
                    base_from_code(code)
                }
                Some("array") => {
                    let inner = map
                        .get("elementType")
                        .ok_or_else(|| format!("array descriptor without elementType: {}", value))?;
                    Ok(TypeDescriptor::array(Self::from_json(inner)?))
                }
                Some(other) => Err(format!("unknown descriptor kind: {}", other)),
                None => Err(format!("descriptor without kind: {}", value)),
            },
            _ => Err(format!("invalid type descriptor: {}", value)),
        }
    }

    /// Encode as the tagged wire form.
    pub fn to_json(&self) -> JsonValue {
        match self {
            TypeDescriptor::Base(t) => serde_json::json!({"kind": "base", "type": t.code()}),
            TypeDescriptor::Array(inner) => {
                serde_json::json!({"kind": "array", "elementType": inner.to_json()})
            }
        }
    }
}

fn base_from_code(code: i64) -> Result<TypeDescriptor, String> {
    DataType::from_code(code)
        .map(TypeDescriptor::Base)
        .ok_or_else(|| format!("unknown type code: {}", code))
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Base(t) => write!(f, "{}", t),
            TypeDescriptor::Array(inner) => write!(f, "ARRAY({})", inner),
        }
    }
}

impl<'de> Deserialize<'de> for TypeDescriptor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = JsonValue::deserialize(deserializer)?;
        TypeDescriptor::from_json(&raw).map_err(serde::de::Error::custom)
    }
}

impl Serialize for TypeDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}
