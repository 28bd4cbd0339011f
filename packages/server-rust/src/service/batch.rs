//! RPC batch coordination.
//!
//! Every sub-request is resolved and invoked independently. A failing or
//! malformed item only fills its own slot.

use std::future::Future;

use futures_util::future::{self, join_all};
use osapi_core::{ProtocolError, RequestContext};
use serde_json::{Map, Value};
use tracing::debug;

use super::invocation::RpcCall;
use super::operation::{DispatchError, Outcome, OutcomeFuture};
use super::registry::HandlerRegistry;

/// The response entry for one RPC call.
#[derive(Debug)]
pub struct RpcReply {
    pub id: Option<Value>,
    pub result: Outcome,
}

impl RpcReply {
    /// `{"id": .., "data": ..}` or `{"id": .., "error": {"message", "code"}}`.
    /// `id` is omitted when the request carried none.
    #[must_use]
    pub fn into_value(self) -> Value {
        let mut entry = Map::new();
        if let Some(id) = self.id {
            entry.insert("id".to_string(), id);
        }
        match self.result {
            Ok(data) => {
                entry.insert("data".to_string(), data);
            }
            Err(err) => {
                entry.insert("error".to_string(), err.to_wire().wire_body());
            }
        }
        Value::Object(entry)
    }
}

enum Shape {
    Single,
    Positional,
    Keyed(Vec<String>),
}

impl HandlerRegistry {
    /// Runs an RPC envelope: a single request object, an array of requests,
    /// or an object mapping correlation ids to requests. An object is a
    /// single request only when its `method` field is a string, so `method`
    /// can also serve as a correlation id.
    ///
    /// All calls are resolved and started in input order before the returned
    /// future is polled. The output mirrors the input shape. An envelope that
    /// is none of the above yields a single `400` entry.
    pub fn dispatch_batch(
        &self,
        envelope: &Value,
        context: &RequestContext,
    ) -> impl Future<Output = Value> + Send + 'static {
        let (shape, pending): (Shape, Vec<(Option<Value>, OutcomeFuture)>) = match envelope {
            Value::Array(requests) => (
                Shape::Positional,
                requests
                    .iter()
                    .map(|request| self.start(request, None, context))
                    .collect(),
            ),
            Value::Object(fields) if matches!(fields.get("method"), Some(Value::String(_))) => {
                (Shape::Single, vec![self.start(envelope, None, context)])
            }
            Value::Object(requests) => {
                let keys = requests.keys().cloned().collect();
                let pending = requests
                    .iter()
                    .map(|(key, request)| self.start(request, Some(key), context))
                    .collect();
                (Shape::Keyed(keys), pending)
            }
            _ => (
                Shape::Single,
                vec![(
                    None,
                    failed(ProtocolError::bad_request(
                        "RPC body must be a JSON object or array",
                    )),
                )],
            ),
        };
        debug!(calls = pending.len(), "dispatching rpc batch");

        let (ids, futures): (Vec<_>, Vec<_>) = pending.into_iter().unzip();
        async move {
            let mut replies = join_all(futures)
                .await
                .into_iter()
                .zip(ids)
                .map(|(result, id)| RpcReply { id, result }.into_value());
            match shape {
                Shape::Single => replies.next().unwrap_or(Value::Null),
                Shape::Positional => Value::Array(replies.collect()),
                Shape::Keyed(keys) => Value::Object(keys.into_iter().zip(replies).collect()),
            }
        }
    }

    /// Resolves and invokes one sub-request. Keyed entries use their key as
    /// the id.
    fn start(
        &self,
        request: &Value,
        key: Option<&String>,
        context: &RequestContext,
    ) -> (Option<Value>, OutcomeFuture) {
        let echoed = request.get("id").cloned();
        let id = key.map(|k| Value::String(k.clone())).or(echoed);
        match RpcCall::parse(request) {
            Ok(call) => {
                let outcome = self
                    .resolve_rpc(&call.method)
                    .execute(call.params, context.clone());
                (id, outcome)
            }
            Err(err) => (id, failed(err)),
        }
    }
}

fn failed(err: ProtocolError) -> OutcomeFuture {
    Box::pin(future::ready(Err(DispatchError::Protocol(err))))
}
