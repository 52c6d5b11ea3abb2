//! Removal of sensitive keys from JSON request bodies
//!
//! Matching keys are dropped entirely rather than blanked. Key comparison
//! folds case over Unicode, so `Password`, `PASSWORD` and `paſſword` go too.
//! Everything else, numbers included, is written back with its original text.

use serde_json::{Map, Value};

/// Recursively strips sensitive keys from JSON values
#[derive(Debug, Clone)]
pub struct Redactor {
    keys: Vec<String>,
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new(["password"])
    }
}

impl Redactor {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Case-insensitive match under Unicode case folding (`paſſword` matches)
    pub fn is_sensitive(&self, key: &str) -> bool {
        self.keys.iter().any(|k| fold_case(k).eq(fold_case(key)))
    }

    /// Redact any JSON value
    ///
    /// Objects lose their sensitive keys at every depth. Array elements that
    /// are objects are redacted; other elements pass through. Scalars are
    /// returned as-is.
    pub fn redact(&self, value: Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(self.redact_object(map)),
            Value::Array(items) => Value::Array(self.redact_array(items)),
            scalar => scalar,
        }
    }

    fn redact_object(&self, map: Map<String, Value>) -> Map<String, Value> {
        map.into_iter()
            .filter(|(key, _)| !self.is_sensitive(key))
            .map(|(key, value)| {
                let value = match value {
                    Value::Object(inner) => Value::Object(self.redact_object(inner)),
                    Value::Array(items) => Value::Array(self.redact_array(items)),
                    other => other,
                };
                (key, value)
            })
            .collect()
    }

    fn redact_array(&self, items: Vec<Value>) -> Vec<Value> {
        items
            .into_iter()
            .map(|item| match item {
                Value::Object(inner) => Value::Object(self.redact_object(inner)),
                other => other,
            })
            .collect()
    }

    /// Redact a raw request body that should hold a JSON object
    ///
    /// Returns `Err` when the body does not parse as a JSON object; callers
    /// then use the raw bytes. If the redacted tree cannot be serialized
    /// again, the raw bytes come back unchanged.
    pub fn redact_body(&self, body: &[u8]) -> Result<Vec<u8>, serde_json::Error> {
        let parsed: Map<String, Value> = serde_json::from_slice(body)?;
        let redacted = self.redact_object(parsed);

        Ok(serde_json::to_vec(&redacted).unwrap_or_else(|_| body.to_vec()))
    }
}

fn fold_case(s: &str) -> impl Iterator<Item = char> + '_ {
    s.chars().flat_map(char::to_uppercase).flat_map(char::to_lowercase)
}
