//! Resolved-but-not-yet-run calls.
//!
//! Resolution never fails outright: an unknown route or method resolves to a
//! placeholder whose execution yields the routing error. Callers handle
//! every request the same way.

use std::sync::Arc;

use futures_util::future;
use osapi_core::{CollectionDefaults, ParamMap, ProtocolError, RequestContext};
use serde_json::{Map, Value};

use super::binder::BoundHandler;
use super::listener::ExecutionListener;
use super::operation::{DispatchError, OperationDescriptor, OutcomeFuture};

/// A REST request matched against the path index.
#[derive(Debug)]
pub struct RestInvocation {
    target: Result<(Arc<BoundHandler>, ParamMap), ProtocolError>,
    listener: Arc<dyn ExecutionListener>,
    defaults: CollectionDefaults,
}

impl RestInvocation {
    pub(crate) fn new(
        target: Result<(Arc<BoundHandler>, ParamMap), ProtocolError>,
        listener: Arc<dyn ExecutionListener>,
        defaults: CollectionDefaults,
    ) -> Self {
        Self {
            target,
            listener,
            defaults,
        }
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.target.is_ok()
    }

    #[must_use]
    pub fn descriptor(&self) -> Option<&OperationDescriptor> {
        self.target.as_ref().ok().map(|(h, _)| h.descriptor())
    }

    /// Parameters captured from the path by the winning template.
    #[must_use]
    pub fn path_parameters(&self) -> Option<&ParamMap> {
        self.target.as_ref().ok().map(|(_, params)| params)
    }

    /// The routing error, for placeholders.
    #[must_use]
    pub fn error(&self) -> Option<&ProtocolError> {
        self.target.as_ref().err()
    }

    /// Binds the request and invokes the handler.
    pub fn execute(
        self,
        query: &ParamMap,
        body: Option<&str>,
        context: RequestContext,
    ) -> OutcomeFuture {
        match self.target {
            Ok((handler, path_params)) => {
                let item = handler.bind_rest(path_params, query, body, context, self.defaults);
                handler.invoke(item, self.listener.as_ref())
            }
            Err(err) => Box::pin(future::ready(Err(DispatchError::Protocol(err)))),
        }
    }
}

/// An RPC method name looked up in the method index.
#[derive(Debug)]
pub struct RpcInvocation {
    target: Result<Arc<BoundHandler>, ProtocolError>,
    listener: Arc<dyn ExecutionListener>,
    defaults: CollectionDefaults,
}

impl RpcInvocation {
    pub(crate) fn new(
        target: Result<Arc<BoundHandler>, ProtocolError>,
        listener: Arc<dyn ExecutionListener>,
        defaults: CollectionDefaults,
    ) -> Self {
        Self {
            target,
            listener,
            defaults,
        }
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.target.is_ok()
    }

    #[must_use]
    pub fn descriptor(&self) -> Option<&OperationDescriptor> {
        self.target.as_ref().ok().map(|h| h.descriptor())
    }

    #[must_use]
    pub fn error(&self) -> Option<&ProtocolError> {
        self.target.as_ref().err()
    }

    /// Binds `params` and invokes the handler.
    pub fn execute(self, params: Map<String, Value>, context: RequestContext) -> OutcomeFuture {
        match self.target {
            Ok(handler) => {
                let item = handler.bind_rpc(params, context, self.defaults);
                handler.invoke(item, self.listener.as_ref())
            }
            Err(err) => Box::pin(future::ready(Err(DispatchError::Protocol(err)))),
        }
    }
}

/// A validated RPC request object: `{method, id?, params?}`.
#[derive(Debug, Clone)]
pub struct RpcCall {
    pub method: String,
    pub id: Option<Value>,
    pub params: Map<String, Value>,
}

impl RpcCall {
    /// Validates one RPC request object.
    ///
    /// # Errors
    ///
    /// A non-object request, a missing or non-string `method`, or a
    /// non-object `params` is a `400`.
    pub fn parse(request: &Value) -> Result<Self, ProtocolError> {
        let Value::Object(fields) = request else {
            return Err(ProtocolError::bad_request("RPC request must be a JSON object"));
        };
        let method = match fields.get("method") {
            Some(Value::String(method)) if !method.is_empty() => method.clone(),
            Some(_) => {
                return Err(ProtocolError::bad_request("RPC method must be a non-empty string"))
            }
            None => return Err(ProtocolError::bad_request("Missing method in RPC request")),
        };
        let params = match fields.get("params") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(params)) => params.clone(),
            Some(_) => {
                return Err(ProtocolError::bad_request(format!(
                    "params of {method} must be a JSON object"
                )))
            }
        };
        Ok(Self {
            method,
            id: fields.get("id").cloned(),
            params,
        })
    }
}
