//! Backend state value model.
//!
//! Backend stores hold loosely typed scalars. [`StateValue`] is the common
//! currency between the gateway, properties, and protocol front-ends.

use serde::{Deserialize, Serialize};

/// A single backend state value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    Bool(bool),
    Number(f64),
    Text(String),
    Null,
}

impl StateValue {
    /// Numeric view of the value. Booleans coerce to 0.0/1.0, numeric
    /// strings parse; anything else is `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Null => None,
        }
    }

    /// Boolean view using numeric truthiness: any nonzero number is `true`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Number(v) => Some(*v != 0.0),
            Self::Text(s) => match s.as_str() {
                "true" | "on" => Some(true),
                "false" | "off" => Some(false),
                _ => s.trim().parse::<f64>().ok().map(|v| v != 0.0),
            },
            Self::Null => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::Text(_) => "text",
            Self::Null => "null",
        }
    }

    /// Convert to a JSON value for wire payloads.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::Null => serde_json::Value::Null,
        }
    }

    /// Build from a JSON value. Objects and arrays are not state values.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => n.as_f64().map(Self::Number),
            serde_json::Value::String(s) => Some(Self::Text(s.clone())),
            serde_json::Value::Null => Some(Self::Null),
            _ => None,
        }
    }
}

impl From<bool> for StateValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for StateValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i64> for StateValue {
    fn from(v: i64) -> Self {
        Self::Number(v as f64)
    }
}

impl From<&str> for StateValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for StateValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(StateValue::Number(42.0).as_f64(), Some(42.0));
        assert_eq!(StateValue::Bool(true).as_f64(), Some(1.0));
        assert_eq!(StateValue::Text("3.5".into()).as_f64(), Some(3.5));
        assert_eq!(StateValue::Null.as_f64(), None);
    }

    #[test]
    fn test_bool_truthiness() {
        assert_eq!(StateValue::Number(0.0).as_bool(), Some(false));
        assert_eq!(StateValue::Number(875.0).as_bool(), Some(true));
        assert_eq!(StateValue::Text("on".into()).as_bool(), Some(true));
        assert_eq!(StateValue::Text("garbage".into()).as_bool(), None);
    }

    #[test]
    fn test_json_round_trip() {
        let v = StateValue::Number(12.5);
        assert_eq!(StateValue::from_json(&v.to_json()), Some(v));
        assert_eq!(
            StateValue::from_json(&serde_json::json!({"nested": 1})),
            None
        );
    }
}
