//! Capability handler trait and validated argument access.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Validated, defaulted arguments handed to a capability body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments(Map<String, Value>);

impl Arguments {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn str(&self, name: &str) -> anyhow::Result<&str> {
        self.0
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("argument '{name}' is not a string"))
    }

    pub fn i64(&self, name: &str) -> anyhow::Result<i64> {
        self.0
            .get(name)
            .and_then(Value::as_i64)
            .ok_or_else(|| anyhow::anyhow!("argument '{name}' is not an integer"))
    }

    pub fn opt_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// Deserialize the whole argument map into a typed struct.
    pub fn deserialize<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
        Ok(serde_json::from_value(Value::Object(self.0.clone()))?)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// The body of a tool, resource, or prompt.
///
/// Handlers report failure by returning `Err`; the dispatcher turns that
/// (and any panic) into a `HandlerError` result.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    async fn call(&self, args: Arguments) -> anyhow::Result<Value>;
}

pub type SharedHandler = Arc<dyn CapabilityHandler>;

/// Adapter that lets an async closure act as a handler.
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> CapabilityHandler for FnHandler<F>
where
    F: Fn(Arguments) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn call(&self, args: Arguments) -> anyhow::Result<Value> {
        (self.0)(args).await
    }
}

/// Wrap an async closure as a shared handler.
pub fn handler_fn<F, Fut>(f: F) -> SharedHandler
where
    F: Fn(Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct ForecastArgs {
        location: String,
        days: u32,
    }

    fn args(value: Value) -> Arguments {
        match value {
            Value::Object(map) => Arguments::new(map),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_typed_accessors() {
        let a = args(json!({"location": "Paris", "days": 2}));
        assert_eq!(a.str("location").unwrap(), "Paris");
        assert_eq!(a.i64("days").unwrap(), 2);
        assert!(a.str("days").is_err());
        assert!(a.opt_str("missing").is_none());

        let typed: ForecastArgs = a.deserialize().unwrap();
        assert_eq!(typed.location, "Paris");
        assert_eq!(typed.days, 2);
    }

    #[tokio::test]
    async fn test_handler_fn() {
        let h = handler_fn(|a: Arguments| async move { Ok(json!({"echo": a.into_value()})) });
        let out = h.call(args(json!({"x": 1}))).await.unwrap();
        assert_eq!(out, json!({"echo": {"x": 1}}));
    }
}
