//! Service bundles: the registration contract for handler authors.
//!
//! A bundle names a service, says how to obtain a handler instance, and lists
//! the operations it exposes. Each operation method is bound here, once,
//! into a plain call function according to its input shape.

use std::fmt;
use std::sync::Arc;

use http::Method;
use osapi_core::{PathTemplate, RequestItem, TemplateError, TypedRequest};
use serde::de::DeserializeOwned;

use super::operation::{HandlerResult, InputShape, OperationDescriptor};

/// A bound handler method: one canonical call signature for every shape.
pub(crate) type CallFn = Arc<dyn Fn(&RequestItem) -> HandlerResult + Send + Sync>;

type Factory<H> = Arc<dyn Fn() -> Arc<H> + Send + Sync>;

/// Programming errors detected while registering a bundle.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("service name must be a non-empty path segment, got `{name}`")]
    InvalidServiceName { name: String },
    #[error("service `{service}` declares no operations")]
    NoOperations { service: String },
    #[error("service `{service}` declares an operation without a name")]
    EmptyOperationName { service: String },
    #[error("invalid path template `{template}` for `{operation}`: {source}")]
    Template {
        operation: String,
        template: String,
        #[source]
        source: TemplateError,
    },
}

/// Declaration of one operation: name, verbs, and optional path/body names.
#[derive(Debug, Clone)]
pub struct OperationSpec {
    name: String,
    verbs: Vec<Method>,
    path: Option<String>,
    body_param: Option<String>,
}

impl OperationSpec {
    /// An operation answering the given verbs. With no verbs it is reachable
    /// over RPC only.
    #[must_use]
    pub fn new(name: impl Into<String>, verbs: impl IntoIterator<Item = Method>) -> Self {
        let mut unique: Vec<Method> = Vec::new();
        for verb in verbs {
            if !unique.contains(&verb) {
                unique.push(verb);
            }
        }
        Self {
            name: name.into(),
            verbs: unique,
            path: None,
            body_param: None,
        }
    }

    #[must_use]
    pub fn get(name: impl Into<String>) -> Self {
        Self::new(name, [Method::GET])
    }

    #[must_use]
    pub fn post(name: impl Into<String>) -> Self {
        Self::new(name, [Method::POST])
    }

    #[must_use]
    pub fn put(name: impl Into<String>) -> Self {
        Self::new(name, [Method::PUT])
    }

    #[must_use]
    pub fn delete(name: impl Into<String>) -> Self {
        Self::new(name, [Method::DELETE])
    }

    /// An operation with no REST route.
    #[must_use]
    pub fn rpc_only(name: impl Into<String>) -> Self {
        Self::new(name, [])
    }

    /// Path template, relative to `/{service}`. Overrides the bundle prefix.
    #[must_use]
    pub fn path(mut self, template: impl Into<String>) -> Self {
        self.path = Some(template.into());
        self
    }

    /// Parameter under which a REST body is stored.
    #[must_use]
    pub fn body_param(mut self, name: impl Into<String>) -> Self {
        self.body_param = Some(name.into());
        self
    }
}

struct OperationEntry {
    spec: OperationSpec,
    shape: InputShape,
    call: CallFn,
}

/// A named group of operations backed by one handler type.
///
/// The factory decides handler lifecycle: return a shared `Arc` for a
/// singleton, or build a fresh instance per call.
pub struct ServiceBundle<H> {
    name: String,
    path_prefix: Option<String>,
    factory: Factory<H>,
    operations: Vec<OperationEntry>,
}

impl<H: Send + Sync + 'static> ServiceBundle<H> {
    #[must_use]
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Arc<H> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            path_prefix: None,
            factory: Arc::new(factory),
            operations: Vec::new(),
        }
    }

    /// A bundle whose every call shares `handler`.
    #[must_use]
    pub fn singleton(name: impl Into<String>, handler: Arc<H>) -> Self {
        Self::new(name, move || Arc::clone(&handler))
    }

    /// Default path template (relative to `/{service}`) for operations that
    /// do not declare their own.
    #[must_use]
    pub fn path_prefix(mut self, template: impl Into<String>) -> Self {
        self.path_prefix = Some(template.into());
        self
    }

    /// Registers a method taking the canonical request item.
    #[must_use]
    pub fn operation<F>(self, spec: OperationSpec, method: F) -> Self
    where
        F: Fn(&H, &RequestItem) -> HandlerResult + Send + Sync + 'static,
    {
        let factory = Arc::clone(&self.factory);
        let call: CallFn = Arc::new(move |item: &RequestItem| {
            let handler = factory();
            method(handler.as_ref(), item)
        });
        self.push(spec, InputShape::RequestItem, call)
    }

    /// Registers a method taking a typed payload.
    #[must_use]
    pub fn typed_operation<T, F>(self, spec: OperationSpec, method: F) -> Self
    where
        T: DeserializeOwned + 'static,
        F: Fn(&H, TypedRequest<'_, T>) -> HandlerResult + Send + Sync + 'static,
    {
        let factory = Arc::clone(&self.factory);
        let call: CallFn = Arc::new(move |item: &RequestItem| {
            let handler = factory();
            method(handler.as_ref(), TypedRequest::new(item))
        });
        self.push(spec, InputShape::Typed, call)
    }

    /// Registers a method that takes no input.
    #[must_use]
    pub fn unit_operation<F>(self, spec: OperationSpec, method: F) -> Self
    where
        F: Fn(&H) -> HandlerResult + Send + Sync + 'static,
    {
        let factory = Arc::clone(&self.factory);
        let call: CallFn = Arc::new(move |_item: &RequestItem| {
            let handler = factory();
            method(handler.as_ref())
        });
        self.push(spec, InputShape::None, call)
    }

    fn push(mut self, spec: OperationSpec, shape: InputShape, call: CallFn) -> Self {
        self.operations.push(OperationEntry { spec, shape, call });
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Validates the bundle and compiles one descriptor per operation.
    pub(crate) fn into_bound(self) -> Result<Vec<(OperationDescriptor, CallFn)>, RegistrationError> {
        if self.name.is_empty() || self.name.contains('/') {
            return Err(RegistrationError::InvalidServiceName { name: self.name });
        }
        if self.operations.is_empty() {
            return Err(RegistrationError::NoOperations { service: self.name });
        }

        let mut bound = Vec::with_capacity(self.operations.len());
        for OperationEntry { spec, shape, call } in self.operations {
            if spec.name.is_empty() {
                return Err(RegistrationError::EmptyOperationName {
                    service: self.name,
                });
            }
            let relative = spec
                .path
                .as_deref()
                .or(self.path_prefix.as_deref())
                .unwrap_or("");
            let template = compose_template(&self.name, relative);
            let path = PathTemplate::parse(&template).map_err(|source| {
                RegistrationError::Template {
                    operation: format!("{}.{}", self.name, spec.name),
                    template: template.clone(),
                    source,
                }
            })?;
            let descriptor = OperationDescriptor {
                service: self.name.clone(),
                operation: spec.name,
                verbs: spec.verbs,
                path,
                body_param: spec.body_param,
                input_shape: shape,
            };
            bound.push((descriptor, call));
        }
        Ok(bound)
    }
}

impl<H> fmt::Debug for ServiceBundle<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceBundle")
            .field("name", &self.name)
            .field("path_prefix", &self.path_prefix)
            .field(
                "operations",
                &self.operations.iter().map(|o| &o.spec.name).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

fn compose_template(service: &str, relative: &str) -> String {
    if relative.is_empty() || relative.starts_with('/') {
        format!("/{service}{relative}")
    } else {
        format!("/{service}/{relative}")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use osapi_core::RequestContext;
    use serde::Deserialize;

    use super::*;
    use crate::service::operation::Reply;

    #[derive(Default)]
    struct Counter {
        calls: AtomicU32,
    }

    impl Counter {
        fn bump(&self, _item: &RequestItem) -> HandlerResult {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Reply::value(&n)
        }

        fn ping(&self) -> HandlerResult {
            Reply::value("pong")
        }
    }

    #[derive(Deserialize)]
    struct Greeting {
        name: String,
    }

    fn greet(_h: &Counter, req: TypedRequest<'_, Greeting>) -> HandlerResult {
        let greeting = req.payload()?;
        Reply::value(&format!("hello {}", greeting.name))
    }

    fn item(params: serde_json::Value) -> RequestItem {
        let serde_json::Value::Object(map) = params else {
            panic!("object expected")
        };
        RequestItem::rpc("counter", "op", map, RequestContext::default())
    }

    fn immediate(result: HandlerResult) -> serde_json::Value {
        match result.unwrap() {
            Reply::Immediate(v) => v,
            Reply::Deferred(_) => panic!("expected immediate reply"),
        }
    }

    #[test]
    fn default_template_is_service_plus_prefix() {
        let bound = ServiceBundle::new("people", || Arc::new(Counter::default()))
            .path_prefix("/{userId}+/{groupId}")
            .operation(OperationSpec::get("get"), Counter::bump)
            .operation(OperationSpec::post("create").path("{userId}"), Counter::bump)
            .into_bound()
            .unwrap();
        assert_eq!(bound[0].0.path.as_str(), "/people/{userId}+/{groupId}");
        assert_eq!(bound[1].0.path.as_str(), "/people/{userId}");
        assert_eq!(bound[0].0.input_shape, InputShape::RequestItem);
    }

    #[test]
    fn bare_service_template_without_prefix() {
        let bound = ServiceBundle::new("test", || Arc::new(Counter::default()))
            .unit_operation(OperationSpec::get("ping"), Counter::ping)
            .into_bound()
            .unwrap();
        assert_eq!(bound[0].0.path.as_str(), "/test");
        assert_eq!(bound[0].0.input_shape, InputShape::None);
    }

    #[test]
    fn verbs_are_deduplicated() {
        let spec = OperationSpec::new("x", [Method::GET, Method::PUT, Method::GET]);
        assert_eq!(spec.verbs, vec![Method::GET, Method::PUT]);
        assert!(OperationSpec::rpc_only("y").verbs.is_empty());
    }

    #[test]
    fn per_call_factory_builds_fresh_handlers() {
        let bound = ServiceBundle::new("counter", || Arc::new(Counter::default()))
            .operation(OperationSpec::get("bump"), Counter::bump)
            .into_bound()
            .unwrap();
        let call = &bound[0].1;
        assert_eq!(immediate(call(&item(serde_json::json!({})))), 1);
        assert_eq!(immediate(call(&item(serde_json::json!({})))), 1);
    }

    #[test]
    fn singleton_factory_shares_one_handler() {
        let shared = Arc::new(Counter::default());
        let bound = ServiceBundle::singleton("counter", Arc::clone(&shared))
            .operation(OperationSpec::get("bump"), Counter::bump)
            .into_bound()
            .unwrap();
        let call = &bound[0].1;
        immediate(call(&item(serde_json::json!({}))));
        assert_eq!(immediate(call(&item(serde_json::json!({})))), 2);
        assert_eq!(shared.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn typed_operation_decodes_payload() {
        let bound = ServiceBundle::new("counter", || Arc::new(Counter::default()))
            .typed_operation(OperationSpec::post("greet"), greet)
            .into_bound()
            .unwrap();
        assert_eq!(bound[0].0.input_shape, InputShape::Typed);
        let value = immediate(bound[0].1(&item(serde_json::json!({"name": "ann"}))));
        assert_eq!(value, "hello ann");
    }

    #[test]
    fn invalid_bundles_fail_fast() {
        let empty = ServiceBundle::<Counter>::new("", || Arc::new(Counter::default()))
            .unit_operation(OperationSpec::get("ping"), Counter::ping)
            .into_bound();
        assert!(matches!(empty, Err(RegistrationError::InvalidServiceName { .. })));

        let no_ops = ServiceBundle::<Counter>::new("svc", || Arc::new(Counter::default())).into_bound();
        assert!(matches!(no_ops, Err(RegistrationError::NoOperations { .. })));

        let unnamed = ServiceBundle::new("svc", || Arc::new(Counter::default()))
            .unit_operation(OperationSpec::get(""), Counter::ping)
            .into_bound();
        assert!(matches!(unnamed, Err(RegistrationError::EmptyOperationName { .. })));

        let bad_path = ServiceBundle::new("svc", || Arc::new(Counter::default()))
            .unit_operation(OperationSpec::get("ping").path("/{open"), Counter::ping)
            .into_bound();
        assert!(matches!(
            bad_path,
            Err(RegistrationError::Template { operation, .. }) if operation == "svc.ping"
        ));
    }
}
