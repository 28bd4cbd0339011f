use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use http::Method;
use osapi_core::{split_request_path, ParamMap, PathTemplate, ProtocolError, RequestContext};
use serde_json::Value;
use tracing::{debug, warn};

use super::binder::BoundHandler;
use super::bundle::{RegistrationError, ServiceBundle};
use super::config::RegistryConfig;
use super::invocation::{RestInvocation, RpcCall, RpcInvocation};
use super::listener::{ExecutionListener, TracingListener};
use super::operation::{DispatchError, OutcomeFuture};
use super::system::{ServiceListing, SystemHandler};

// ---------------------------------------------------------------------------
// RestRoute
// ---------------------------------------------------------------------------

/// One entry of the per-verb route set, ordered by template specificity.
#[derive(Debug, Clone)]
pub struct RestRoute {
    template: PathTemplate,
    handler: Arc<BoundHandler>,
}

impl RestRoute {
    #[must_use]
    pub fn template(&self) -> &PathTemplate {
        &self.template
    }

    #[must_use]
    pub fn handler(&self) -> &Arc<BoundHandler> {
        &self.handler
    }
}

impl Ord for RestRoute {
    fn cmp(&self, other: &Self) -> Ordering {
        self.template.cmp(&other.template)
    }
}

impl PartialOrd for RestRoute {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for RestRoute {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RestRoute {}

type RestIndex = HashMap<String, HashMap<Method, BTreeSet<RestRoute>>>;

// ---------------------------------------------------------------------------
// HandlerRegistryBuilder
// ---------------------------------------------------------------------------

/// Collects service bundles; [`build`](Self::build) freezes them into a
/// [`HandlerRegistry`].
#[derive(Debug)]
pub struct HandlerRegistryBuilder {
    config: RegistryConfig,
    listener: Arc<dyn ExecutionListener>,
    rest: RestIndex,
    rpc: HashMap<String, Arc<BoundHandler>>,
}

impl HandlerRegistryBuilder {
    fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            listener: Arc::new(TracingListener),
            rest: HashMap::new(),
            rpc: HashMap::new(),
        }
    }

    /// Replaces the default [`TracingListener`].
    #[must_use]
    pub fn listener(mut self, listener: Arc<dyn ExecutionListener>) -> Self {
        self.listener = listener;
        self
    }

    /// Indexes every operation of `bundle`.
    ///
    /// A later RPC registration under an existing `"service.operation"` key
    /// replaces the earlier one. A REST template ranking equal to one already
    /// registered for the same service and verb is dropped. Both cases log a
    /// warning.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError`] if the bundle is malformed.
    pub fn register<H: Send + Sync + 'static>(
        mut self,
        bundle: ServiceBundle<H>,
    ) -> Result<Self, RegistrationError> {
        for (descriptor, call) in bundle.into_bound()? {
            let handler = Arc::new(BoundHandler::new(descriptor, call));
            let descriptor = handler.descriptor();

            for verb in &descriptor.verbs {
                let route = RestRoute {
                    template: descriptor.path.clone(),
                    handler: Arc::clone(&handler),
                };
                let inserted = self
                    .rest
                    .entry(descriptor.service.clone())
                    .or_default()
                    .entry(verb.clone())
                    .or_default()
                    .insert(route);
                if inserted {
                    debug!(
                        verb = %verb,
                        path = %descriptor.path,
                        operation = handler.rpc_key(),
                        "registered route"
                    );
                } else {
                    warn!(
                        verb = %verb,
                        path = %descriptor.path,
                        operation = handler.rpc_key(),
                        "path template collides with an existing route; keeping the first"
                    );
                }
            }

            let key = handler.rpc_key().to_string();
            if self.rpc.insert(key, Arc::clone(&handler)).is_some() {
                warn!(method = handler.rpc_key(), "RPC method registered twice; replacing");
            } else {
                debug!(method = handler.rpc_key(), "registered method");
            }
        }
        Ok(self)
    }

    /// Freezes the indices, registering the `system` service if enabled.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError`] if the system bundle cannot be
    /// registered, which only happens if it is misdeclared.
    pub fn build(self) -> Result<HandlerRegistry, RegistrationError> {
        let system = Arc::new(SystemHandler::default());
        let builder = if self.config.expose_system_service {
            self.register(SystemHandler::bundle(Arc::clone(&system)))?
        } else {
            self
        };

        let registry = HandlerRegistry {
            config: builder.config,
            listener: builder.listener,
            rest: builder.rest,
            rpc: builder.rpc,
        };
        system.publish(ServiceListing {
            rest: registry.supported_rest_services(),
            rpc: registry.supported_rpc_services(),
        });
        debug!(
            routes = registry.rest.values().flat_map(HashMap::values).map(BTreeSet::len).sum::<usize>(),
            methods = registry.rpc.len(),
            "handler registry built"
        );
        Ok(registry)
    }
}

// ---------------------------------------------------------------------------
// HandlerRegistry
// ---------------------------------------------------------------------------

/// Immutable route and method indices over bound handlers.
///
/// Built once through [`HandlerRegistry::builder`]; shared afterwards behind
/// an `Arc`. Every lookup is a read.
#[derive(Debug)]
pub struct HandlerRegistry {
    config: RegistryConfig,
    listener: Arc<dyn ExecutionListener>,
    rest: RestIndex,
    rpc: HashMap<String, Arc<BoundHandler>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn builder(config: RegistryConfig) -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::new(config)
    }

    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Resolves a REST request to the most specific accepting route.
    ///
    /// The first path segment names the service. An unknown service or verb,
    /// or a path no template accepts, resolves to a `501` placeholder. A list
    /// value in a single-valued position resolves to a `400` placeholder.
    #[must_use]
    pub fn resolve_rest(&self, path: &str, verb: &str) -> RestInvocation {
        RestInvocation::new(
            self.find_route(path, verb),
            Arc::clone(&self.listener),
            self.config.collection_defaults(),
        )
    }

    fn find_route(
        &self,
        path: &str,
        verb: &str,
    ) -> Result<(Arc<BoundHandler>, ParamMap), ProtocolError> {
        let not_found = || ProtocolError::not_implemented(format!("No service defined for path {path}"));

        let segments = split_request_path(path);
        let Some(service) = segments.first() else {
            return Err(not_found());
        };
        let Ok(verb) = Method::from_bytes(verb.to_ascii_uppercase().as_bytes()) else {
            return Err(not_found());
        };
        let Some(routes) = self.rest.get(*service).and_then(|by_verb| by_verb.get(&verb)) else {
            return Err(not_found());
        };

        for route in routes {
            if let Some(params) = route.template.accept(&segments)? {
                return Ok((Arc::clone(&route.handler), params));
            }
        }
        Err(not_found())
    }

    /// Resolves an RPC method name; unknown methods resolve to a `501`
    /// placeholder.
    #[must_use]
    pub fn resolve_rpc(&self, method: &str) -> RpcInvocation {
        let target = self.rpc.get(method).map(Arc::clone).ok_or_else(|| {
            ProtocolError::not_implemented(format!("The method {method} is not implemented"))
        });
        RpcInvocation::new(
            target,
            Arc::clone(&self.listener),
            self.config.collection_defaults(),
        )
    }

    #[must_use]
    pub fn rpc_handler(&self, method: &str) -> Option<&Arc<BoundHandler>> {
        self.rpc.get(method)
    }

    /// All registered routes as `"VERB path"` strings.
    #[must_use]
    pub fn supported_rest_services(&self) -> BTreeSet<String> {
        self.rest
            .values()
            .flat_map(|by_verb| {
                by_verb.iter().flat_map(|(verb, routes)| {
                    routes
                        .iter()
                        .map(move |route| format!("{verb} {}", route.template))
                })
            })
            .collect()
    }

    /// All registered `"service.operation"` names.
    #[must_use]
    pub fn supported_rpc_services(&self) -> BTreeSet<String> {
        self.rpc.keys().cloned().collect()
    }

    /// Resolves and runs one REST request.
    pub fn dispatch_rest(
        &self,
        path: &str,
        verb: &str,
        params: &ParamMap,
        body: Option<&str>,
        context: RequestContext,
    ) -> OutcomeFuture {
        self.resolve_rest(path, verb).execute(params, body, context)
    }

    /// Validates, resolves, and runs one RPC request object.
    pub fn dispatch_rpc(&self, request: &Value, context: RequestContext) -> OutcomeFuture {
        match RpcCall::parse(request) {
            Ok(call) => self.resolve_rpc(&call.method).execute(call.params, context),
            Err(err) => Box::pin(futures_util::future::ready(Err(DispatchError::Protocol(err)))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
