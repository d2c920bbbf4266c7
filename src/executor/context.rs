//! Binding tables handed to generated code.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

/// An async function callable from an action script.
#[async_trait]
pub trait ActionFn: Send + Sync {
    async fn call(&self, args: Vec<Value>) -> anyhow::Result<Value>;
}

struct AsyncFn<F>(F);

#[async_trait]
impl<F, Fut> ActionFn for AsyncFn<F>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn call(&self, args: Vec<Value>) -> anyhow::Result<Value> {
        (self.0)(args).await
    }
}

/// A name visible to generated code
#[derive(Clone)]
pub enum Binding {
    /// A plain value, referenced as `"$name"`
    Value(Value),
    /// A callable, invoked with `{"op": "call", "fn": "name"}`
    Function(Arc<dyn ActionFn>),
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Binding::Value(v) => write!(f, "Value({})", v),
            Binding::Function(_) => write!(f, "Function"),
        }
    }
}

/// The variable and function scope injected into generated code.
///
/// Only names registered here can be called; there is no other way for a
/// script to reach the host.
#[derive(Debug, Clone, Default)]
pub struct ActionContext {
    bindings: BTreeMap<String, Binding>,
}

impl ActionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.bindings.insert(name.into(), Binding::Value(value));
        self
    }

    pub fn function<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.bindings.insert(name.into(), Binding::Function(Arc::new(AsyncFn(f))));
        self
    }

    pub fn action(mut self, name: impl Into<String>, f: Arc<dyn ActionFn>) -> Self {
        self.bindings.insert(name.into(), Binding::Function(f));
        self
    }

    /// Merge another scope into this one; names in `other` win
    pub fn extend(mut self, other: ActionContext) -> Self {
        self.bindings.extend(other.bindings);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }
}

/// Mutable state carried from one execution to the next within a run.
///
/// Owned by the run and passed by `&mut` to every execution, so writes made
/// by one step are visible to the next and nothing leaks between runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SharedContext(Map<String, Value>);

impl SharedContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Look up a dotted path such as `user.name`
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.0.get(parts.next()?)?;
        for part in parts {
            current = match current {
                Value::Object(map) => map.get(part)?,
                Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}
