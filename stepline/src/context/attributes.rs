//! Immutable attribute bundle supplied to each invocation.

use crate::errors::SteplineError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The read-only input of one pipeline invocation.
///
/// Steps read attributes but never write them; results go to the
/// [`Bindings`](super::Bindings) table instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes {
    values: Map<String, Value>,
}

impl Attributes {
    /// Creates an empty attribute bundle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates attributes from a JSON object map.
    #[must_use]
    pub const fn from_map(values: Map<String, Value>) -> Self {
        Self { values }
    }

    /// Creates attributes from a JSON value.
    ///
    /// `null` yields an empty bundle.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAttributes` if the value is neither an object nor null.
    pub fn from_value(value: Value) -> Result<Self, SteplineError> {
        match value {
            Value::Object(values) => Ok(Self { values }),
            Value::Null => Ok(Self::new()),
            other => Err(SteplineError::InvalidAttributes(format!(
                "expected a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Returns a copy with one more attribute.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    /// Gets an attribute.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Gets an attribute deserialized into `T`.
    ///
    /// # Errors
    ///
    /// Returns a serialization step error if the value does not fit `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SteplineError> {
        self.values
            .get(key)
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()
            .map_err(SteplineError::from)
    }

    /// Checks if an attribute exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Returns all attribute keys.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    /// Returns the number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if there are no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the underlying map.
    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Deserializes the whole bundle into `T`.
    ///
    /// # Errors
    ///
    /// Returns a serialization step error if the bundle does not fit `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, SteplineError> {
        serde_json::from_value(Value::Object(self.values.clone())).map_err(SteplineError::from)
    }
}

impl From<Map<String, Value>> for Attributes {
    fn from(values: Map<String, Value>) -> Self {
        Self::from_map(values)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl TryFrom<Value> for Attributes {
    type Error = SteplineError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Signup {
        first_name: String,
        role: Option<String>,
    }

    #[test]
    fn test_from_value_object() {
        let attrs = Attributes::from_value(json!({"first_name": "foo", "age": 3})).unwrap();

        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs.get("first_name"), Some(&json!("foo")));
        assert!(attrs.contains_key("age"));
        assert!(attrs.get("missing").is_none());
    }

    #[test]
    fn test_from_value_null_is_empty() {
        let attrs = Attributes::from_value(Value::Null).unwrap();
        assert!(attrs.is_empty());
    }

    #[test]
    fn test_from_value_rejects_scalars() {
        let err = Attributes::from_value(json!([1, 2])).unwrap_err();
        assert!(matches!(err, SteplineError::InvalidAttributes(_)));
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn test_typed_access() {
        let attrs = Attributes::new().with("count", json!(4)).with("name", json!("x"));

        assert_eq!(attrs.get_as::<u32>("count").unwrap(), Some(4));
        assert_eq!(attrs.get_as::<u32>("missing").unwrap(), None);
        assert!(attrs.get_as::<u32>("name").is_err());
    }

    #[test]
    fn test_deserialize_whole_bundle() {
        let attrs: Attributes = [("first_name", json!("foo"))].into_iter().collect();
        let signup: Signup = attrs.deserialize().unwrap();

        assert_eq!(
            signup,
            Signup {
                first_name: "foo".to_string(),
                role: None
            }
        );
    }
}
