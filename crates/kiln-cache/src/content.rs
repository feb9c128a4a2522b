use crate::error::{CacheError, CacheResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// What identifies an artifact: who produced it and with which parameters.
///
/// Two contents are equivalent when their creators are equal and their
/// descriptions are the same JSON value; object key order is irrelevant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub creator: String,
    pub description: Value,
}

impl Content {
    pub fn new(creator: impl Into<String>, description: Value) -> Self {
        Self { creator: creator.into(), description }
    }

    /// Content for `creator`, named by [`Creator::describe`].
    pub fn for_creator<A>(creator: &dyn Creator<A>, description: Value) -> Self {
        Self::new(creator.describe(), description)
    }

    #[must_use]
    pub fn is_equivalent(&self, other: &Self) -> bool {
        self.creator == other.creator && json_equivalent(&self.description, &other.description)
    }
}

/// JSON value equality, independent of object key order.
#[must_use]
pub fn json_equivalent(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len() && x.iter().all(|(k, v)| y.get(k).is_some_and(|w| json_equivalent(v, w)))
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(v, w)| json_equivalent(v, w))
        }
        _ => a == b,
    }
}

/// Something that produces artifacts from parameters.
pub trait Creator<A> {
    /// Stable name recorded in the lookup table.
    fn describe(&self) -> String;

    fn create(&self, params: &Value) -> anyhow::Result<A>;
}

/// A [`Creator`] made of a name and a closure.
pub struct FnCreator<F> {
    name: String,
    f: F,
}

impl<F> FnCreator<F> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

impl<A, F> Creator<A> for FnCreator<F>
where
    F: Fn(&Value) -> anyhow::Result<A>,
{
    fn describe(&self) -> String {
        self.name.clone()
    }

    fn create(&self, params: &Value) -> anyhow::Result<A> {
        (self.f)(params)
    }
}

/// Artifacts that can carry a copy of the content they were created for.
pub trait Stamp {
    fn stamp(&mut self, key: &str, content: &Value) -> CacheResult<()>;
}

impl Stamp for Value {
    fn stamp(&mut self, key: &str, content: &Value) -> CacheResult<()> {
        match self {
            Self::Object(map) => {
                map.insert(key.to_string(), content.clone());
                Ok(())
            }
            other => Err(CacheError::Stamp(format!("expected a JSON object, got `{other}`"))),
        }
    }
}

impl Stamp for serde_json::Map<String, Value> {
    fn stamp(&mut self, key: &str, content: &Value) -> CacheResult<()> {
        self.insert(key.to_string(), content.clone());
        Ok(())
    }
}

impl Stamp for BTreeMap<String, Value> {
    fn stamp(&mut self, key: &str, content: &Value) -> CacheResult<()> {
        self.insert(key.to_string(), content.clone());
        Ok(())
    }
}

impl<S: std::hash::BuildHasher> Stamp for HashMap<String, Value, S> {
    fn stamp(&mut self, key: &str, content: &Value) -> CacheResult<()> {
        self.insert(key.to_string(), content.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_does_not_matter() {
        let a: Value =
            serde_json::from_str(r#"{"lr": 0.01, "layers": 3, "opt": {"name": "adam", "beta": 0.9}}"#).unwrap();
        let b: Value =
            serde_json::from_str(r#"{"opt": {"beta": 0.9, "name": "adam"}, "layers": 3, "lr": 0.01}"#).unwrap();
        assert!(json_equivalent(&a, &b));
    }

    #[test]
    fn test_array_order_matters() {
        assert!(!json_equivalent(&json!([1, 2]), &json!([2, 1])));
        assert!(!json_equivalent(&json!({"a": 1}), &json!({"a": 1, "b": null})));
    }

    #[test]
    fn test_content_equivalence_includes_creator() {
        let a = Content::new("resnet", json!({"depth": 50}));
        let b = Content::new("vgg", json!({"depth": 50}));
        assert!(!a.is_equivalent(&b));
        assert!(a.is_equivalent(&a.clone()));
    }

    #[test]
    fn test_fn_creator() {
        let creator = FnCreator::new("doubler", |params: &Value| {
            Ok::<_, anyhow::Error>(params["x"].as_i64().unwrap_or(0) * 2)
        });
        assert_eq!(Creator::<i64>::describe(&creator), "doubler");
        assert_eq!(creator.create(&json!({"x": 21})).unwrap(), 42);

        let content = Content::for_creator(&creator as &dyn Creator<i64>, json!({"x": 21}));
        assert_eq!(content.creator, "doubler");
    }

    #[test]
    fn test_stamp_value() {
        let mut artifact = json!({"weights": [1, 2]});
        artifact.stamp("content", &json!({"creator": "c"})).unwrap();
        assert_eq!(artifact["content"]["creator"], "c");

        let mut scalar = json!(3);
        assert!(matches!(scalar.stamp("content", &json!({})), Err(CacheError::Stamp(_))));
    }
}
