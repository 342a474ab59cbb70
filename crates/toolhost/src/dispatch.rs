//! Invocation dispatcher — lookup, validation, isolated execution.

use std::any::Any;
use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::registry::CapabilityRegistry;
use crate::types::{CapabilityKind, ErrorKind, InvocationResult};
use crate::validate::validate_arguments;

/// Routes invocations to registered handlers.
///
/// Cheap to clone; every clone shares the same frozen registry.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<CapabilityRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Invoke a capability and fold every failure into an [`InvocationResult`].
    ///
    /// For [`CapabilityKind::Resource`], `name` is a concrete URI matched
    /// against registered templates in registration order; the extracted
    /// variables are merged into `arguments`.
    ///
    /// The handler runs on its own task, so a panicking body surfaces as a
    /// `HandlerError` instead of unwinding through the caller.
    pub async fn dispatch(
        &self,
        kind: CapabilityKind,
        name: &str,
        arguments: Option<Value>,
    ) -> InvocationResult {
        let span = tracing::debug_span!("dispatch", %kind, name);
        self.dispatch_inner(kind, name, arguments)
            .instrument(span)
            .await
    }

    async fn dispatch_inner(
        &self,
        kind: CapabilityKind,
        name: &str,
        arguments: Option<Value>,
    ) -> InvocationResult {
        let (descriptor, handler, arguments) = match kind {
            CapabilityKind::Resource => {
                let Some((descriptor, handler, vars)) = self.registry.match_resource(name) else {
                    return InvocationResult::failure(
                        ErrorKind::UnknownCapability,
                        format!("No resource matches URI: {name}"),
                    );
                };
                let arguments = match merge_uri_variables(arguments, vars) {
                    Ok(a) => a,
                    Err(message) => {
                        return InvocationResult::failure(ErrorKind::InvalidArguments, message)
                    }
                };
                (descriptor, handler, arguments)
            }
            _ => match self.registry.lookup(kind, name) {
                Ok((descriptor, handler)) => (descriptor, handler, arguments),
                Err(e) => {
                    return InvocationResult::failure(ErrorKind::UnknownCapability, e.to_string())
                }
            },
        };

        let args = match validate_arguments(descriptor, arguments) {
            Ok(args) => args,
            Err(message) => {
                tracing::debug!("Rejected arguments: {message}");
                return InvocationResult::failure(ErrorKind::InvalidArguments, message);
            }
        };

        let handler = handler.clone();
        let mut task = AbortOnDrop(tokio::spawn(async move { handler.call(args).await }));

        match (&mut task.0).await {
            Ok(Ok(payload)) => InvocationResult::success(payload),
            Ok(Err(e)) => {
                tracing::warn!("{kind} '{}' failed: {e:#}", descriptor.name);
                InvocationResult::failure(ErrorKind::HandlerError, format!("{e:#}"))
            }
            Err(join_err) if join_err.is_panic() => {
                let message = panic_message(join_err.into_panic());
                tracing::error!("{kind} '{}' panicked: {message}", descriptor.name);
                InvocationResult::failure(
                    ErrorKind::HandlerError,
                    format!("handler panicked: {message}"),
                )
            }
            Err(join_err) => InvocationResult::failure(
                ErrorKind::HandlerError,
                format!("handler task aborted: {join_err}"),
            ),
        }
    }
}

/// Aborts the handler task if the dispatch future is dropped before it
/// finishes, so cancelling a request also stops its handler body.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn merge_uri_variables(
    arguments: Option<Value>,
    vars: Vec<(String, String)>,
) -> Result<Option<Value>, String> {
    let mut map = match arguments {
        None | Some(Value::Null) => serde_json::Map::new(),
        Some(Value::Object(map)) => map,
        Some(_) => return Err("arguments must be an object".to_string()),
    };
    for (name, value) in vars {
        map.insert(name, Value::String(value));
    }
    Ok(Some(Value::Object(map)))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{CapabilityDescriptor, ParamType};
    use crate::handler::{handler_fn, Arguments};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn build(counter: Arc<AtomicUsize>) -> Dispatcher {
        let mut registry = CapabilityRegistry::new();

        let echo = CapabilityDescriptor::tool("echo")
            .required("text", ParamType::String)
            .build()
            .unwrap();
        registry
            .register(
                echo,
                handler_fn(move |args: Arguments| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(json!({"text": args.str("text")?}))
                    }
                }),
            )
            .unwrap();

        let failing = CapabilityDescriptor::tool("fail").build().unwrap();
        registry
            .register(
                failing,
                handler_fn(|_| async { Err(anyhow::anyhow!("upstream connection refused")) }),
            )
            .unwrap();

        let panicking = CapabilityDescriptor::tool("boom").build().unwrap();
        registry
            .register(
                panicking,
                handler_fn(|_| async {
                    if true {
                        panic!("kaboom");
                    }
                    Ok(Value::Null)
                }),
            )
            .unwrap();

        let weather = CapabilityDescriptor::resource("weather", "weather://{location}")
            .build()
            .unwrap();
        registry
            .register(
                weather,
                handler_fn(|args: Arguments| async move {
                    Ok(json!(format!("Weather for {}", args.str("location")?)))
                }),
            )
            .unwrap();

        let greeting = CapabilityDescriptor::prompt("greet")
            .with_default("name", ParamType::String, json!("friend"))
            .build()
            .unwrap();
        registry
            .register(
                greeting,
                handler_fn(|args: Arguments| async move {
                    Ok(json!(format!("Hello, {}!", args.str("name")?)))
                }),
            )
            .unwrap();

        Dispatcher::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn test_echo_success() {
        let counter = Arc::new(AtomicUsize::new(0));
        let d = build(counter.clone());
        let result = d
            .dispatch(CapabilityKind::Tool, "echo", Some(json!({"text": "hi"})))
            .await;
        assert_eq!(result, InvocationResult::success(json!({"text": "hi"})));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_argument_never_invokes_handler() {
        let counter = Arc::new(AtomicUsize::new(0));
        let d = build(counter.clone());
        let result = d.dispatch(CapabilityKind::Tool, "echo", None).await;
        assert_eq!(result.error_kind(), Some(ErrorKind::InvalidArguments));
        let result = d
            .dispatch(CapabilityKind::Tool, "echo", Some(json!({"text": 5})))
            .await;
        assert_eq!(result.error_kind(), Some(ErrorKind::InvalidArguments));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_capability() {
        let d = build(Arc::new(AtomicUsize::new(0)));
        let result = d.dispatch(CapabilityKind::Tool, "ping", None).await;
        assert_eq!(result.error_kind(), Some(ErrorKind::UnknownCapability));
        // Tool names are not visible to other kinds.
        let result = d.dispatch(CapabilityKind::Prompt, "echo", None).await;
        assert_eq!(result.error_kind(), Some(ErrorKind::UnknownCapability));
    }

    #[tokio::test]
    async fn test_handler_error_and_panic_are_contained() {
        let counter = Arc::new(AtomicUsize::new(0));
        let d = build(counter.clone());

        let result = d.dispatch(CapabilityKind::Tool, "fail", None).await;
        assert_eq!(result.error_kind(), Some(ErrorKind::HandlerError));
        assert!(result
            .into_result()
            .unwrap_err()
            .message
            .contains("connection refused"));

        let result = d.dispatch(CapabilityKind::Tool, "boom", None).await;
        assert_eq!(result.error_kind(), Some(ErrorKind::HandlerError));
        assert!(result.into_result().unwrap_err().message.contains("kaboom"));

        // Still serving afterwards.
        let result = d
            .dispatch(CapabilityKind::Tool, "echo", Some(json!({"text": "still here"})))
            .await;
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn test_resource_uri_matching() {
        let d = build(Arc::new(AtomicUsize::new(0)));
        let result = d
            .dispatch(CapabilityKind::Resource, "weather://Salem", None)
            .await;
        assert_eq!(result, InvocationResult::success(json!("Weather for Salem")));

        // URI variables win over explicit arguments.
        let result = d
            .dispatch(
                CapabilityKind::Resource,
                "weather://Salem",
                Some(json!({"location": "Elsewhere"})),
            )
            .await;
        assert_eq!(result, InvocationResult::success(json!("Weather for Salem")));

        let result = d
            .dispatch(CapabilityKind::Resource, "weather", None)
            .await;
        assert_eq!(result.error_kind(), Some(ErrorKind::UnknownCapability));
    }

    #[tokio::test]
    async fn test_dropped_dispatch_stops_handler() {
        let finished = Arc::new(AtomicUsize::new(0));
        let mut registry = CapabilityRegistry::new();
        let slow = CapabilityDescriptor::tool("slow").build().unwrap();
        let counter = finished.clone();
        registry
            .register(
                slow,
                handler_fn(move |_| {
                    let counter = counter.clone();
                    async move {
                        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(Value::Null)
                    }
                }),
            )
            .unwrap();
        let d = Dispatcher::new(Arc::new(registry));

        let outcome = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            d.dispatch(CapabilityKind::Tool, "slow", None),
        )
        .await;
        assert!(outcome.is_err());

        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_prompt_default() {
        let d = build(Arc::new(AtomicUsize::new(0)));
        let result = d.dispatch(CapabilityKind::Prompt, "greet", None).await;
        assert_eq!(result, InvocationResult::success(json!("Hello, friend!")));
    }
}
