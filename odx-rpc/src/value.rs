//! Wire value model shared by both transports.
//!
//! XML-RPC distinguishes integers from doubles, so the model keeps them
//! apart; the JSON conversions preserve that split (a JSON number that fits
//! an i64 stays an integer).

use std::collections::BTreeMap;

/// A value as sent to / received from the ERP.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Double(f64),
    Bool(bool),
    Str(String),
    Array(Vec<Value>),
    Struct(BTreeMap<String, Value>),
    Nil,
}

impl Value {
    /// Integer content, if this is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Float content; integers widen.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(d) => Some(*d),
            #[allow(clippy::cast_precision_loss)]
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// String content. Odoo returns `false` for empty char fields; that is
    /// deliberately `None` here so lookups skip it.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Struct(map) => Some(map),
            _ => None,
        }
    }

    /// Struct field access.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_struct().and_then(|map| map.get(key))
    }

    /// The id of a many2one field, which Odoo returns as `[id, display_name]`
    /// or `false` when unset.
    pub fn many2one_id(&self) -> Option<i64> {
        self.as_array().and_then(|items| items.first()).and_then(Value::as_i64)
    }

    /// Convert from a `serde_json::Value` built at the call site.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Nil,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map_or_else(|| Self::Double(n.as_f64().unwrap_or(0.0)), Self::Int),
            serde_json::Value::String(s) => Self::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Self::Array(items.iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => Self::Struct(
                map.iter().map(|(k, v)| (k.clone(), Self::from_json(v))).collect(),
            ),
        }
    }

    /// Convert to a `serde_json::Value` (used by the JSON-RPC transport).
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Double(d) => serde_json::Value::from(*d),
            Self::Bool(b) => serde_json::Value::from(*b),
            Self::Str(s) => serde_json::Value::from(s.clone()),
            Self::Array(items) => {
                serde_json::Value::Array(items.iter().map(Self::to_json).collect())
            }
            Self::Struct(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Self::Nil => serde_json::Value::Null,
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_integers_stay_integers() {
        let value = Value::from_json(&json!([1, 2.5, "x", true, null]));
        assert_eq!(
            value,
            Value::Array(vec![
                Value::Int(1),
                Value::Double(2.5),
                Value::Str("x".into()),
                Value::Bool(true),
                Value::Nil,
            ])
        );
    }

    #[test]
    fn json_round_trip_preserves_structs() {
        let json = json!({"name": "IVA 21%", "amount": 21.0, "active": true});
        let value = Value::from_json(&json);
        assert_eq!(value.get("name").and_then(Value::as_str), Some("IVA 21%"));
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn many2one_resolves_id_and_ignores_false() {
        let set = Value::Array(vec![Value::Int(42), Value::Str("All / Bebidas".into())]);
        assert_eq!(set.many2one_id(), Some(42));
        assert_eq!(Value::Bool(false).many2one_id(), None);
    }

    #[test]
    fn false_char_field_is_not_a_string() {
        assert_eq!(Value::Bool(false).as_str(), None);
    }
}
