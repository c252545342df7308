use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::RpcError;

type Handler = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, RpcError>> + Send + Sync>;

/// Reflected view of one callable method (spec §3, §4.3). Rust has no
/// runtime reflection, so the "arg/reply zero-value constructors and
/// invocation thunk" the original derives from type metadata are instead
/// supplied directly by the caller of [`ServiceBuilder::method`]: a typed
/// closure erased into a `Value -> Value` handler, plus the per-method call
/// counter the descriptor is responsible for.
pub struct MethodDescriptor {
    name: String,
    handler: Handler,
    calls: AtomicU64,
}

impl MethodDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of times this method has been invoked through the service,
    /// mirroring the source's per-method call counter.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Invokes the erased handler, counting the call first so a call that
    /// panics partway through handler setup still counts (spec §4.3).
    pub async fn invoke(&self, args: Value) -> Result<Value, RpcError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        (self.handler)(args).await
    }
}

/// A registered object plus the set of its exported methods (spec §3, §4.3).
pub struct Service {
    name: String,
    methods: HashMap<String, MethodDescriptor>,
}

impl Service {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.get(name)
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }
}

/// Builds a [`Service`] one method at a time. Stands in for the source's
/// reflective enumeration of a type's exported methods (spec §4.3): the
/// caller supplies, per method, a typed closure taking `(receiver, arg)` and
/// returning `Result<reply, RpcError>` — the manual-trait/closure strategy
/// spec.md §9's Design Notes call out as the statically-typed alternative to
/// derive-macro codegen.
pub struct ServiceBuilder {
    name: String,
    methods: HashMap<String, MethodDescriptor>,
}

impl ServiceBuilder {
    /// `name` must be "exported": start with an uppercase ASCII letter, the
    /// language-neutral restatement spec.md §4.3 gives for "visible to
    /// external callers" when there is no real visibility modifier to check.
    pub fn new(name: impl Into<String>) -> Result<Self, RpcError> {
        let name = name.into();
        let exported = name
            .chars()
            .next()
            .map(|c| c.is_ascii_uppercase())
            .unwrap_or(false);
        if !exported {
            return Err(RpcError::ServiceNotExported(name));
        }
        Ok(ServiceBuilder {
            name,
            methods: HashMap::new(),
        })
    }

    /// Registers one method. `A` and `R` are the argument and reply types;
    /// both must round-trip through `serde_json`, the Rust binding of
    /// spec.md §4.3's "exported or built-in primitive" constraint. The
    /// method's own error type `E` only needs to be displayable: whatever it
    /// returns becomes `RpcError::CallUser(err.to_string())`, the spec §7
    /// `CallUserError` case, so ordinary application errors (`String`,
    /// `anyhow::Error`, a custom `thiserror` enum) all plug in directly
    /// without depending on this crate's error type.
    pub fn method<S, A, R, E, F, Fut>(mut self, name: impl Into<String>, receiver: Arc<S>, f: F) -> Self
    where
        S: Send + Sync + 'static,
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        E: std::fmt::Display + Send + 'static,
        F: Fn(Arc<S>, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        let name = name.into();
        let f = Arc::new(f);
        let handler: Handler = Arc::new(move |args: Value| {
            let receiver = receiver.clone();
            let f = f.clone();
            Box::pin(async move {
                let arg: A = serde_json::from_value(args)
                    .map_err(|err| RpcError::BodyDecode(err.to_string()))?;
                let reply = f(receiver, arg)
                    .await
                    .map_err(|err| RpcError::CallUser(err.to_string()))?;
                serde_json::to_value(reply).map_err(|err| RpcError::BodyDecode(err.to_string()))
            })
        });
        self.methods.insert(
            name.clone(),
            MethodDescriptor {
                name,
                handler,
                calls: AtomicU64::new(0),
            },
        );
        self
    }

    pub fn build(self) -> Service {
        Service {
            name: self.name,
            methods: self.methods,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Arith;

    #[derive(serde::Deserialize)]
    struct Args {
        a: i64,
        b: i64,
    }

    #[tokio::test]
    async fn invokes_registered_method_and_counts_calls() {
        let service = ServiceBuilder::new("Arith")
            .unwrap()
            .method("Sum", Arc::new(Arith), |_recv, args: Args| async move {
                Ok::<i64, RpcError>(args.a + args.b)
            })
            .build();

        let method = service.method("Sum").unwrap();
        assert_eq!(method.call_count(), 0);
        let reply = method
            .invoke(serde_json::json!({"a": 3, "b": 4}))
            .await
            .unwrap();
        assert_eq!(reply, serde_json::json!(7));
        assert_eq!(method.call_count(), 1);
    }

    #[test]
    fn rejects_unexported_service_name() {
        let err = ServiceBuilder::new("arith").unwrap_err();
        assert!(matches!(err, RpcError::ServiceNotExported(name) if name == "arith"));
    }
}
