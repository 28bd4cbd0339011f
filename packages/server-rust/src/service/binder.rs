//! Bound handlers: request-item construction and instrumented invocation.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use futures_util::{future, FutureExt};
use osapi_core::{CollectionDefaults, ParamMap, RequestContext, RequestItem};
use serde_json::{Map, Value};
use tracing::{field, info_span, Instrument, Span};

use super::bundle::CallFn;
use super::listener::{ExecutionListener, ExecutionScope};
use super::operation::{DispatchError, OperationDescriptor, OutcomeFuture, Reply};

/// One registered operation, ready to be invoked.
pub struct BoundHandler {
    descriptor: OperationDescriptor,
    call: CallFn,
    rpc_key: String,
}

impl BoundHandler {
    pub(crate) fn new(descriptor: OperationDescriptor, call: CallFn) -> Self {
        let rpc_key = descriptor.rpc_key();
        Self {
            descriptor,
            call,
            rpc_key,
        }
    }

    #[must_use]
    pub fn descriptor(&self) -> &OperationDescriptor {
        &self.descriptor
    }

    /// `"service.operation"`.
    #[must_use]
    pub fn rpc_key(&self) -> &str {
        &self.rpc_key
    }

    /// Builds the request item for a REST call.
    ///
    /// Query parameters overwrite path captures of the same name. The body is
    /// stored as text under the declared body parameter and dropped when the
    /// operation declares none.
    #[must_use]
    pub fn bind_rest(
        &self,
        path_params: ParamMap,
        query: &ParamMap,
        body: Option<&str>,
        context: RequestContext,
        defaults: CollectionDefaults,
    ) -> RequestItem {
        let mut params = path_params;
        for (name, values) in query {
            params.insert(name.clone(), values.clone());
        }
        let body_param = self.descriptor.body_param.clone();
        if let (Some(name), Some(body)) = (&body_param, body) {
            params.insert(name.clone(), vec![body.to_owned()]);
        }
        RequestItem::rest(
            self.descriptor.service.as_str(),
            self.descriptor.operation.as_str(),
            params,
            context,
        )
        .with_body_param(body_param)
        .with_defaults(defaults)
    }

    /// Builds the request item for an RPC call from its `params` object. The
    /// payload, if any, is the field named by the body parameter.
    #[must_use]
    pub fn bind_rpc(
        &self,
        params: Map<String, Value>,
        context: RequestContext,
        defaults: CollectionDefaults,
    ) -> RequestItem {
        RequestItem::rpc(
            self.descriptor.service.as_str(),
            self.descriptor.operation.as_str(),
            params,
            context,
        )
        .with_body_param(self.descriptor.body_param.clone())
        .with_defaults(defaults)
    }

    /// Calls the handler and normalizes whatever it returned.
    ///
    /// The handler runs synchronously inside this call, wrapped by the
    /// listener hooks. A deferred reply is returned as-is and polled by the
    /// caller; the `dispatch` span stays attached until it completes. A
    /// panic in the handler or in its deferred reply becomes an internal
    /// error for this call only.
    pub fn invoke(&self, item: RequestItem, listener: &dyn ExecutionListener) -> OutcomeFuture {
        let span = info_span!(
            "dispatch",
            operation = %self.rpc_key,
            transport = %item.transport(),
            duration_ms = field::Empty,
            outcome = field::Empty,
        );
        let start = Instant::now();

        let result = {
            let _entered = span.enter();
            let _scope = ExecutionScope::enter(listener, &self.rpc_key, &item);
            panic::catch_unwind(AssertUnwindSafe(|| (self.call)(&item)))
                .unwrap_or_else(|payload| Err(panicked(payload.as_ref())))
        };

        match result {
            Ok(Reply::Immediate(value)) => {
                record(&span, start, "ok");
                Box::pin(future::ready(Ok(value)))
            }
            Ok(Reply::Deferred(pending)) => Box::pin(
                async move {
                    let outcome = AssertUnwindSafe(pending)
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|payload| Err(panicked(payload.as_ref())))
                        .map_err(DispatchError::from_handler);
                    record(
                        &Span::current(),
                        start,
                        if outcome.is_ok() { "ok" } else { "error" },
                    );
                    outcome
                }
                .instrument(span),
            ),
            Err(err) => {
                record(&span, start, "error");
                Box::pin(future::ready(Err(DispatchError::from_handler(err))))
            }
        }
    }
}

fn panicked(payload: &(dyn Any + Send)) -> anyhow::Error {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned());
    match detail {
        Some(detail) => anyhow::anyhow!("handler panicked: {detail}"),
        None => anyhow::anyhow!("handler panicked"),
    }
}

fn record(span: &Span, start: Instant, outcome: &'static str) {
    let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    span.record("duration_ms", duration_ms);
    span.record("outcome", outcome);
}

impl fmt::Debug for BoundHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundHandler")
            .field("rpc_key", &self.rpc_key)
            .field("verbs", &self.descriptor.verbs)
            .field("path", &self.descriptor.path.as_str())
            .finish_non_exhaustive()
    }
}
