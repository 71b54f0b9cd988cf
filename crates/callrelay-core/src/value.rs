// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Value representations on both sides of the bridge.
//
// `NativeValue` is the closed set of shapes the platform bridges can lift out
// of an Android `Bundle` / `Intent` or an iOS `NSDictionary` push payload.
// `CanonicalValue` is the only shape allowed to cross into the application
// layer.  `normalize::normalize` is the one-way conversion between them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A value captured from the OS before normalization.
///
/// Platform bridges map every runtime type they meet onto one of these
/// variants.  Types with no structural counterpart are captured as
/// [`NativeValue::Opaque`] together with their description string.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Null,
    Bool(bool),
    /// `java.lang.Integer`, `NSNumber` carrying a 32-bit int.
    Int(i32),
    /// `java.lang.Long`, `NSNumber` carrying a 64-bit int.
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    /// Key/value container (`Bundle`, `NSDictionary`). Insertion order is kept.
    Map(Vec<(String, NativeValue)>),
    /// Growable ordered collection (`ArrayList`, `NSArray`).
    List(Vec<NativeValue>),
    /// Fixed-size platform array (`Object[]`).
    Array(Vec<NativeValue>),
    /// Raw bytes (`byte[]`, `NSData`).
    Bytes(Vec<u8>),
    /// Anything else the bridge could not decompose.
    Opaque {
        type_name: String,
        description: String,
    },
}

impl NativeValue {
    /// Build a [`NativeValue::Map`] from key/value pairs.
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, NativeValue)>,
    {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Platform-style type name, used in fallback diagnostics.
    pub fn type_name(&self) -> &str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "Boolean",
            Self::Int(_) => "Integer",
            Self::Long(_) => "Long",
            Self::Float(_) => "Float",
            Self::Double(_) => "Double",
            Self::String(_) => "String",
            Self::Map(_) => "Bundle",
            Self::List(_) => "ArrayList",
            Self::Array(_) => "Array",
            Self::Bytes(_) => "ByteArray",
            Self::Opaque { type_name, .. } => type_name,
        }
    }

    /// Look up a key in a map value.  Returns `None` for non-map values.
    pub fn get(&self, key: &str) -> Option<&NativeValue> {
        match self {
            Self::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Lift a JSON document (recorded push payload, replayed intent extras)
    /// into the native representation.
    ///
    /// Integers that fit in 32 bits become [`NativeValue::Int`], wider ones
    /// [`NativeValue::Long`], so recorded Android extras keep their types.
    pub fn from_json(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    match i32::try_from(i) {
                        Ok(small) => Self::Int(small),
                        Err(_) => Self::Long(i),
                    }
                } else if let Some(f) = n.as_f64() {
                    Self::Double(f)
                } else {
                    // u64 beyond i64::MAX has no native counterpart
                    Self::Opaque {
                        type_name: "BigInteger".into(),
                        description: n.to_string(),
                    }
                }
            }
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from_json).collect()),
            Value::Object(obj) => {
                Self::Map(obj.into_iter().map(|(k, v)| (k, Self::from_json(v))).collect())
            }
        }
    }
}

impl From<&str> for NativeValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for NativeValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

/// Canonical key/value mapping that crosses the bridge.
pub type CanonicalPayload = BTreeMap<String, CanonicalValue>;

/// A bridge-safe value.  No other shape may reach the application layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CanonicalValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<CanonicalValue>),
    Map(CanonicalPayload),
}

impl CanonicalValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&CanonicalPayload> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Look up a key in a map value.
    pub fn get(&self, key: &str) -> Option<&CanonicalValue> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// Serialize to a JSON string for transports that only carry text
    /// (JNI `String`, C string across the iOS shim).
    pub fn to_json_string(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl From<&str> for CanonicalValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for CanonicalValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for CanonicalValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for CanonicalValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<CanonicalPayload> for CanonicalValue {
    fn from(m: CanonicalPayload) -> Self {
        Self::Map(m)
    }
}
