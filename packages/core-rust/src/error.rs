//! Protocol-level error taxonomy shared by both request surfaces.
//!
//! A [`ProtocolError`] is the only error shape that crosses the wire. Its
//! `code` follows HTTP status numbering: `400` for malformed input, `501` for
//! an unresolved route or method, anything else for handler-declared errors.

use http::StatusCode;
use serde_json::{Map, Value};

/// Coarse classification of a [`ProtocolError`] by its status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unparseable envelope, missing method, cardinality violation (400).
    MalformedRequest,
    /// No route or RPC method answers the request (501).
    NotImplemented,
    /// Any other code, declared by a handler.
    Handler,
}

/// An error carrying its own status code, message, and optional payload.
///
/// Handlers return this (usually through `anyhow`) to control exactly what
/// the caller sees. The code is used verbatim by the wire layers.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} ({code})")]
pub struct ProtocolError {
    code: StatusCode,
    message: String,
    payload: Option<Value>,
}

impl ProtocolError {
    /// Creates an error with an explicit status code. A success code is
    /// replaced by `500`.
    #[must_use]
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        let code = if code.is_success() {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            code
        };
        Self {
            code,
            message: message.into(),
            payload: None,
        }
    }

    /// A `400 Bad Request` error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// A `501 Not Implemented` error.
    #[must_use]
    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_IMPLEMENTED, message)
    }

    /// A `500 Internal Server Error`.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Attaches a structured payload, emitted as `data` in the wire body.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    #[must_use]
    pub fn code(&self) -> StatusCode {
        self.code
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self.code {
            StatusCode::BAD_REQUEST => ErrorKind::MalformedRequest,
            StatusCode::NOT_IMPLEMENTED => ErrorKind::NotImplemented,
            _ => ErrorKind::Handler,
        }
    }

    /// The wire error body: `{"message": .., "code": ..}` plus `data` when a
    /// payload is attached.
    #[must_use]
    pub fn wire_body(&self) -> Value {
        let mut body = Map::new();
        body.insert("message".to_string(), Value::String(self.message.clone()));
        body.insert("code".to_string(), Value::from(self.code.as_u16()));
        if let Some(payload) = &self.payload {
            body.insert("data".to_string(), payload.clone());
        }
        Value::Object(body)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn kind_follows_status_code() {
        assert_eq!(
            ProtocolError::bad_request("x").kind(),
            ErrorKind::MalformedRequest
        );
        assert_eq!(
            ProtocolError::not_implemented("x").kind(),
            ErrorKind::NotImplemented
        );
        assert_eq!(
            ProtocolError::new(StatusCode::FORBIDDEN, "no").kind(),
            ErrorKind::Handler
        );
    }

    #[test]
    fn wire_body_omits_absent_payload() {
        let err = ProtocolError::not_implemented("The method x.y is not implemented");
        assert_eq!(
            err.wire_body(),
            json!({"message": "The method x.y is not implemented", "code": 501})
        );
    }

    #[test]
    fn wire_body_includes_payload_as_data() {
        let err = ProtocolError::new(StatusCode::CONFLICT, "taken")
            .with_payload(json!({"field": "id"}));
        assert_eq!(
            err.wire_body(),
            json!({"message": "taken", "code": 409, "data": {"field": "id"}})
        );
    }

    #[test]
    fn success_code_becomes_internal_error() {
        let err = ProtocolError::new(StatusCode::OK, "not an error");
        assert_eq!(err.code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.kind(), ErrorKind::Handler);
        assert_eq!(err.message(), "not an error");
    }

    #[test]
    fn display_includes_code() {
        let err = ProtocolError::bad_request("bad");
        assert_eq!(err.to_string(), "bad (400 Bad Request)");
    }
}
