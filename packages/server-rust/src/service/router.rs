//! `tower` entry point over a built [`HandlerRegistry`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use osapi_core::{ParamMap, RequestContext};
use serde_json::Value;
use tower::Service;

use super::operation::DispatchError;
use super::registry::HandlerRegistry;

// ---------------------------------------------------------------------------
// DispatchRequest
// ---------------------------------------------------------------------------

/// One request as handed over by a transport front end.
#[derive(Debug)]
pub enum DispatchRequest {
    Rest {
        path: String,
        verb: String,
        /// Query and form parameters.
        params: ParamMap,
        body: Option<String>,
        ctx: RequestContext,
    },
    /// A single RPC request object.
    Rpc { request: Value, ctx: RequestContext },
    /// An RPC envelope that may hold several requests. Never fails as a
    /// whole; errors are reported per entry.
    Batch { envelope: Value, ctx: RequestContext },
}

// ---------------------------------------------------------------------------
// RegistryService
// ---------------------------------------------------------------------------

/// Dispatches [`DispatchRequest`] values through a shared registry.
///
/// Always ready: the registry is immutable and does no I/O of its own.
#[derive(Debug, Clone)]
pub struct RegistryService {
    registry: Arc<HandlerRegistry>,
}

impl RegistryService {
    #[must_use]
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }
}

impl Service<DispatchRequest> for RegistryService {
    type Response = Value;
    type Error = DispatchError;
    type Future = Pin<Box<dyn Future<Output = Result<Value, DispatchError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: DispatchRequest) -> Self::Future {
        match req {
            DispatchRequest::Rest {
                path,
                verb,
                params,
                body,
                ctx,
            } => self
                .registry
                .dispatch_rest(&path, &verb, &params, body.as_deref(), ctx),
            DispatchRequest::Rpc { request, ctx } => self.registry.dispatch_rpc(&request, ctx),
            DispatchRequest::Batch { envelope, ctx } => {
                let batch = self.registry.dispatch_batch(&envelope, &ctx);
                Box::pin(async move { Ok(batch.await) })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
