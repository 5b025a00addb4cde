use std::{fmt, sync::Arc};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::trace;

use crate::ApiError;

/// Field-name fragments that mark an integer-encoded boolean.
const BOOL_MARKERS: &[&str] = &[
    "local",
    "online",
    "quorate",
    "enabled",
    "active",
    "running",
    "locked",
    "protected",
];

/// Field names that are integer-encoded booleans only on an exact match.
const BOOL_NAMES: &[&str] = &["ha", "template", "shared"];

/// A pure rewrite applied to every decoded payload before it reaches the entity decoder.
pub trait ResponseTransformer: Send + Sync {
    fn transform(&self, value: Value) -> Value;
}

/// Coerces integer-encoded boolean fields (`"online": 1`) into JSON booleans at any depth.
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanFields;

impl BooleanFields {
    pub fn is_marked(key: &str) -> bool {
        let key = key.to_ascii_lowercase();
        BOOL_NAMES.contains(&key.as_str()) || BOOL_MARKERS.iter().any(|m| key.contains(m))
    }

    fn coerce(value: Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| {
                        let v = match v {
                            Value::Number(n) if Self::is_marked(&k) => {
                                Value::Bool(n.as_f64() == Some(1.0))
                            }
                            other => Self::coerce(other),
                        };
                        (k, v)
                    })
                    .collect(),
            ),
            Value::Array(items) => Value::Array(items.into_iter().map(Self::coerce).collect()),
            other => other,
        }
    }
}

impl ResponseTransformer for BooleanFields {
    fn transform(&self, value: Value) -> Value {
        Self::coerce(value)
    }
}

/// Strips one level of the `{ "data": ... }` envelope.
///
/// A nested envelope is returned as-is; `{ "data": null }` becomes `null`.
pub fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("data") => {
            trace!(target: "pve.core.normalize", "envelope unwrapped");
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Response pipeline: envelope unwrap, then every transformer in registration order.
#[derive(Clone)]
pub struct Normalizer {
    transformers: Vec<Arc<dyn ResponseTransformer>>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            transformers: vec![Arc::new(BooleanFields)],
        }
    }
}

impl fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Normalizer")
            .field("transformers", &self.transformers.len())
            .finish()
    }
}

impl Normalizer {
    /// Normalizer with the built-in boolean-field transformer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalizer that only unwraps the envelope.
    pub fn bare() -> Self {
        Self {
            transformers: Vec::new(),
        }
    }

    /// Append a transformer; it runs after the ones already registered.
    pub fn with_transformer<T: ResponseTransformer + 'static>(mut self, transformer: T) -> Self {
        self.transformers.push(Arc::new(transformer));
        self
    }

    pub fn normalize(&self, value: Value) -> Value {
        self.transformers
            .iter()
            .fold(unwrap_envelope(value), |v, t| t.transform(v))
    }

    /// Parse a raw body, normalize it and decode into `T`.
    ///
    /// An empty body decodes as `null`.
    pub fn decode<T: DeserializeOwned>(&self, body: &str) -> Result<T, ApiError> {
        let raw = if body.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(body)?
        };
        Ok(serde_json::from_value(self.normalize(raw))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn markers_match_by_fragment_or_exact_name() {
        for key in ["online", "local", "quorate", "enabled", "inactive", "running", "locked"] {
            assert!(BooleanFields::is_marked(key), "{key}");
        }
        for key in ["protected", "Online", "isLocal", "ha", "template", "shared", "HA"] {
            assert!(BooleanFields::is_marked(key), "{key}");
        }
        for key in ["hash", "templates", "shares", "vmid", "status", "cpus"] {
            assert!(!BooleanFields::is_marked(key), "{key}");
        }
    }

    #[test]
    fn coercion_is_depth_independent() {
        let n = Normalizer::new();
        let out = n.normalize(json!({
            "data": {
                "online": 1,
                "node": { "local": 0, "inner": [ { "enabled": 1, "quorate": 0 } ] },
                "vmid": 1
            }
        }));

        assert_eq!(
            out,
            json!({
                "online": true,
                "node": { "local": false, "inner": [ { "enabled": true, "quorate": false } ] },
                "vmid": 1
            })
        );
    }

    #[test]
    fn non_numeric_markers_pass_through() {
        let out = Normalizer::new().normalize(json!({"running": "yes", "template": true, "ha": 2}));
        assert_eq!(out, json!({"running": "yes", "template": true, "ha": false}));
    }

    #[test]
    fn float_one_is_true() {
        let out = BooleanFields.transform(json!({"shared": 1.0}));
        assert_eq!(out, json!({"shared": true}));
    }

    #[test]
    fn envelope_unwraps_one_level() {
        assert_eq!(unwrap_envelope(json!({"data": {"data": 5}})), json!({"data": 5}));
        assert_eq!(unwrap_envelope(json!({"data": null})), Value::Null);
        assert_eq!(unwrap_envelope(json!({"other": 1})), json!({"other": 1}));
        assert_eq!(unwrap_envelope(json!("UPID:x")), json!("UPID:x"));
    }

    #[test]
    fn custom_transformers_run_after_builtin() {
        struct Rename;
        impl ResponseTransformer for Rename {
            fn transform(&self, value: Value) -> Value {
                match value {
                    Value::Object(mut map) => {
                        if let Some(v) = map.remove("online") {
                            map.insert("up".into(), v);
                        }
                        Value::Object(map)
                    }
                    other => other,
                }
            }
        }

        let out = Normalizer::new()
            .with_transformer(Rename)
            .normalize(json!({"data": {"online": 1}}));
        assert_eq!(out, json!({"up": true}));
    }

    #[test]
    fn decode_typed_entity() {
        #[derive(Deserialize)]
        struct Node {
            node: String,
            online: bool,
        }

        let node: Node = Normalizer::new()
            .decode(r#"{"data":{"node":"pve","online":1}}"#)
            .unwrap();
        assert_eq!(node.node, "pve");
        assert!(node.online);
    }

    #[test]
    fn decode_failures_are_decode_errors() {
        let err = Normalizer::new().decode::<Value>("{not json").unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));

        let err = Normalizer::new().decode::<u32>(r#"{"data":"x"}"#).unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));

        let v: Value = Normalizer::new().decode("").unwrap();
        assert_eq!(v, Value::Null);
    }
}
