//! Operation metadata, handler replies, and normalized dispatch outcomes.

use std::fmt;
use std::future::Future;

use futures_util::future::BoxFuture;
use http::{Method, StatusCode};
use osapi_core::{ErrorKind, PathTemplate, ProtocolError};
use serde::Serialize;
use serde_json::Value;

/// How a handler wants its input delivered. Fixed at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputShape {
    /// The handler takes no request argument.
    None,
    /// The handler takes the canonical [`osapi_core::RequestItem`].
    RequestItem,
    /// The handler takes a [`osapi_core::TypedRequest`] and decodes its
    /// payload on demand.
    Typed,
}

/// Registration-time metadata for one exposed operation.
#[derive(Debug, Clone)]
pub struct OperationDescriptor {
    pub service: String,
    pub operation: String,
    /// REST verbs answered by this operation. Empty for RPC-only operations.
    pub verbs: Vec<Method>,
    pub path: PathTemplate,
    /// Parameter under which a REST body is stored.
    pub body_param: Option<String>,
    pub input_shape: InputShape,
}

impl OperationDescriptor {
    /// The `"service.operation"` key used by the RPC surface.
    #[must_use]
    pub fn rpc_key(&self) -> String {
        format!("{}.{}", self.service, self.operation)
    }
}

/// What a handler returns on success: a value now, or a future resolving to
/// one later.
pub enum Reply {
    Immediate(Value),
    Deferred(BoxFuture<'static, anyhow::Result<Value>>),
}

/// The return type of every registered handler method.
///
/// An `Err` here is a synchronous failure; a [`Reply::Deferred`] may still
/// fail later.
pub type HandlerResult = anyhow::Result<Reply>;

impl Reply {
    /// Serializes `value` into an immediate reply.
    ///
    /// # Errors
    ///
    /// Fails if `value` cannot be represented as JSON.
    pub fn value<T: Serialize + ?Sized>(value: &T) -> HandlerResult {
        Ok(Self::Immediate(serde_json::to_value(value)?))
    }

    /// An immediate `null` reply.
    #[must_use]
    pub fn empty() -> Self {
        Self::Immediate(Value::Null)
    }

    /// Wraps a future whose output is serialized when it completes.
    pub fn deferred<F, T>(future: F) -> Self
    where
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Serialize,
    {
        Self::Deferred(Box::pin(async move {
            let value = future.await?;
            Ok(serde_json::to_value(value)?)
        }))
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate(value) => f.debug_tuple("Immediate").field(value).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// Failure half of an [`Outcome`].
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// A protocol error: routing/binding failures, or one declared by the
    /// handler. Its code and message are used verbatim.
    #[error(transparent)]
    Protocol(ProtocolError),
    /// Any other handler error. No status code is assigned at this layer.
    #[error("handler failed: {0:#}")]
    Internal(anyhow::Error),
}

impl DispatchError {
    /// Classifies a handler error, unwrapping to a [`ProtocolError`] anywhere
    /// in its cause chain.
    #[must_use]
    pub fn from_handler(err: anyhow::Error) -> Self {
        match err.downcast::<ProtocolError>() {
            Ok(protocol) => Self::Protocol(protocol),
            Err(err) => match err
                .chain()
                .find_map(|cause| cause.downcast_ref::<ProtocolError>())
            {
                Some(protocol) => Self::Protocol(protocol.clone()),
                None => Self::Internal(err),
            },
        }
    }

    #[must_use]
    pub fn protocol(&self) -> Option<&ProtocolError> {
        match self {
            Self::Protocol(p) => Some(p),
            Self::Internal(_) => None,
        }
    }

    /// The handler's own error, for failures that were not protocol errors.
    #[must_use]
    pub fn internal(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Internal(e) => Some(e),
            Self::Protocol(_) => None,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Protocol(p) => p.kind(),
            Self::Internal(_) => ErrorKind::Handler,
        }
    }

    /// Declared status code. `None` for internal errors.
    #[must_use]
    pub fn code(&self) -> Option<StatusCode> {
        self.protocol().map(ProtocolError::code)
    }

    /// The error as it should appear on the wire; internal errors map to 500.
    #[must_use]
    pub fn to_wire(&self) -> ProtocolError {
        match self {
            Self::Protocol(p) => p.clone(),
            Self::Internal(e) => ProtocolError::internal(format!("{e:#}")),
        }
    }
}

impl From<ProtocolError> for DispatchError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err)
    }
}

impl From<anyhow::Error> for DispatchError {
    fn from(err: anyhow::Error) -> Self {
        Self::from_handler(err)
    }
}

/// Result of one dispatched call.
pub type Outcome = Result<Value, DispatchError>;

/// An [`Outcome`] that may not be available yet.
pub type OutcomeFuture = BoxFuture<'static, Outcome>;

#[cfg(test)]
mod tests {
    use anyhow::Context;
    use serde_json::json;

    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("store offline")]
    struct StoreOffline;

    fn descriptor() -> OperationDescriptor {
        OperationDescriptor {
            service: "people".to_string(),
            operation: "get".to_string(),
            verbs: vec![Method::GET],
            path: PathTemplate::parse("/people/{userId}+").unwrap(),
            body_param: None,
            input_shape: InputShape::RequestItem,
        }
    }

    #[test]
    fn rpc_key_joins_service_and_operation() {
        assert_eq!(descriptor().rpc_key(), "people.get");
    }

    #[test]
    fn protocol_error_is_unwrapped_from_anyhow() {
        let err = anyhow::Error::new(ProtocolError::new(StatusCode::FORBIDDEN, "denied"));
        let classified = DispatchError::from_handler(err);
        assert_eq!(classified.code(), Some(StatusCode::FORBIDDEN));
        assert_eq!(classified.to_wire().message(), "denied");
    }

    #[test]
    fn protocol_error_is_found_beneath_context() {
        let err = Err::<(), _>(ProtocolError::bad_request("bad id"))
            .context("loading person")
            .unwrap_err();
        let classified = DispatchError::from_handler(err);
        assert_eq!(classified.kind(), ErrorKind::MalformedRequest);
    }

    #[test]
    fn other_errors_stay_internal_and_keep_their_type() {
        let classified = DispatchError::from_handler(anyhow::Error::new(StoreOffline));
        assert_eq!(classified.code(), None);
        assert!(classified
            .internal()
            .is_some_and(|e| e.downcast_ref::<StoreOffline>().is_some()));
        assert_eq!(classified.to_wire().code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn deferred_reply_serializes_on_completion() {
        let Reply::Deferred(fut) = Reply::deferred(async { Ok(json!({"foo": "bar"})) }) else {
            panic!("expected deferred reply")
        };
        assert_eq!(fut.await.unwrap(), json!({"foo": "bar"}));
    }

    #[test]
    fn value_reply_is_immediate() {
        let reply = Reply::value(&["a", "b"]).unwrap();
        assert!(matches!(reply, Reply::Immediate(v) if v == json!(["a", "b"])));
    }
}
