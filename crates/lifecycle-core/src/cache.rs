use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// EvaluationContext
// ---------------------------------------------------------------------------

/// Precomputed data for one subject, shared by every action in one
/// evaluation call. Actions only ever see it by shared reference.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationContext {
    values: HashMap<String, Value>,
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Deserialize the value under `key`. Returns `None` when the key is
    /// absent or has the wrong shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

impl FromIterator<(String, Value)> for EvaluationContext {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// ActionResultCache
// ---------------------------------------------------------------------------

/// Supplies the [`EvaluationContext`] for a subject. Called at most once per
/// evaluation; the snapshot it returns is reused for every action.
pub trait ActionResultCache<S>: Send + Sync {
    fn context_for(&self, subject: &S) -> EvaluationContext;
}

impl<S, F> ActionResultCache<S> for F
where
    F: Fn(&S) -> EvaluationContext + Send + Sync,
{
    fn context_for(&self, subject: &S) -> EvaluationContext {
        self(subject)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
