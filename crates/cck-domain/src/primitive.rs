use std::cmp::Ordering;

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Primitive ─────────────────────────────────────────────────────────────────

/// The scalar value type shared by the memory, database and pub/sub layers.
///
/// Serializes to a self-describing JSON form, e.g.
/// `{"kind": "integer", "value": 42}`; byte payloads travel base64-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Primitive {
    String(String),
    Integer(i64),
    Double(f64),
    Boolean(bool),
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    String,
    Integer,
    Double,
    Boolean,
    Bytes,
}

impl Primitive {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Primitive::String(_) => PrimitiveKind::String,
            Primitive::Integer(_) => PrimitiveKind::Integer,
            Primitive::Double(_) => PrimitiveKind::Double,
            Primitive::Boolean(_) => PrimitiveKind::Boolean,
            Primitive::Bytes(_) => PrimitiveKind::Bytes,
        }
    }

    /// Canonical text rendering. Cross-kind ordering falls back to comparing
    /// these strings lexicographically.
    pub fn canonical_string(&self) -> String {
        match self {
            Primitive::String(s) => s.clone(),
            Primitive::Integer(i) => i.to_string(),
            Primitive::Double(d) => d.to_string(),
            Primitive::Boolean(b) => b.to_string(),
            Primitive::Bytes(b) => base64::engine::general_purpose::STANDARD.encode(b),
        }
    }

    /// Coerce a JSON value into a primitive by token type.
    ///
    /// Strings, integral numbers, other numbers and booleans map naturally;
    /// null, arrays and objects stringify.
    pub fn from_json(value: &Value) -> Primitive {
        match value {
            Value::String(s) => Primitive::String(s.clone()),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Primitive::Integer(i),
                None => Primitive::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::Bool(b) => Primitive::Boolean(*b),
            other => Primitive::String(other.to_string()),
        }
    }

    /// Render as a plain JSON value (bytes become a base64 string).
    pub fn to_json(&self) -> Value {
        match self {
            Primitive::String(s) => Value::String(s.clone()),
            Primitive::Integer(i) => Value::from(*i),
            Primitive::Double(d) => {
                serde_json::Number::from_f64(*d).map(Value::Number).unwrap_or(Value::Null)
            }
            Primitive::Boolean(b) => Value::Bool(*b),
            Primitive::Bytes(b) => {
                Value::String(base64::engine::general_purpose::STANDARD.encode(b))
            }
        }
    }
}

// Same-kind comparisons are natural; cross-kind comparisons use the canonical
// string rendering so that ordering is total and stable across backends.
impl Ord for Primitive {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Primitive::String(a), Primitive::String(b)) => a.cmp(b),
            (Primitive::Integer(a), Primitive::Integer(b)) => a.cmp(b),
            (Primitive::Double(a), Primitive::Double(b)) => a.total_cmp(b),
            (Primitive::Boolean(a), Primitive::Boolean(b)) => a.cmp(b),
            (Primitive::Bytes(a), Primitive::Bytes(b)) => a.cmp(b),
            (a, b) => a.canonical_string().cmp(&b.canonical_string()),
        }
    }
}

impl PartialOrd for Primitive {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Primitive {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Primitive {}

impl std::fmt::Display for Primitive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.canonical_string())
    }
}

impl From<&str> for Primitive {
    fn from(s: &str) -> Self {
        Primitive::String(s.to_string())
    }
}

impl From<String> for Primitive {
    fn from(s: String) -> Self {
        Primitive::String(s)
    }
}

impl From<i64> for Primitive {
    fn from(i: i64) -> Self {
        Primitive::Integer(i)
    }
}

impl From<f64> for Primitive {
    fn from(d: f64) -> Self {
        Primitive::Double(d)
    }
}

impl From<bool> for Primitive {
    fn from(b: bool) -> Self {
        Primitive::Boolean(b)
    }
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        base64::engine::general_purpose::STANDARD
            .decode(s.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_kind_ordering_is_natural() {
        assert!(Primitive::Integer(2) < Primitive::Integer(10));
        assert!(Primitive::Double(1.5) < Primitive::Double(2.0));
        assert!(Primitive::String("a".into()) < Primitive::String("b".into()));
    }

    #[test]
    fn cross_kind_falls_back_to_canonical_strings() {
        // "10" < "true" lexicographically.
        assert!(Primitive::Integer(10) < Primitive::Boolean(true));
        // Whole-valued doubles render without a fraction, so they equal
        // the matching integer under the canonical-string fallback.
        assert_eq!(Primitive::Integer(3), Primitive::Double(3.0));
    }

    #[test]
    fn json_round_trip_is_self_describing() {
        let p = Primitive::Bytes(vec![1, 2, 3]);
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("\"kind\":\"bytes\""));
        let back: Primitive = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }

    #[test]
    fn coercion_by_json_token_type() {
        assert_eq!(Primitive::from_json(&serde_json::json!(5)), Primitive::Integer(5));
        assert_eq!(Primitive::from_json(&serde_json::json!(5.5)), Primitive::Double(5.5));
        assert_eq!(Primitive::from_json(&serde_json::json!(true)), Primitive::Boolean(true));
        assert_eq!(
            Primitive::from_json(&serde_json::json!({"a": 1})),
            Primitive::String("{\"a\":1}".into())
        );
    }
}
