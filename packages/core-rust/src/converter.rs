//! Body and result conversion capability handed to each request.

use std::fmt;

use serde_json::Value;

use crate::error::ProtocolError;

/// Converts request bodies to structured values and results back to text.
///
/// The front end picks the converter from the negotiated content type; the
/// registry only ever calls through this trait.
pub trait BodyConverter: Send + Sync + fmt::Debug {
    /// Content type produced by [`to_text`](Self::to_text).
    fn content_type(&self) -> &'static str;

    /// Parses request text into a structured value.
    ///
    /// # Errors
    ///
    /// Returns a `400` [`ProtocolError`] when the text does not parse.
    fn to_value(&self, text: &str) -> Result<Value, ProtocolError>;

    /// Renders a value as response text.
    ///
    /// # Errors
    ///
    /// Returns a `500` [`ProtocolError`] when the value cannot be rendered.
    fn to_text(&self, value: &Value) -> Result<String, ProtocolError>;
}

/// `application/json` via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonConverter;

impl BodyConverter for JsonConverter {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn to_value(&self, text: &str) -> Result<Value, ProtocolError> {
        serde_json::from_str(text)
            .map_err(|e| ProtocolError::bad_request(format!("Malformed JSON body: {e}")))
    }

    fn to_text(&self, value: &Value) -> Result<String, ProtocolError> {
        serde_json::to_string(value)
            .map_err(|e| ProtocolError::internal(format!("Cannot render result: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn json_converter_parses_objects() {
        let value = JsonConverter.to_value(r#"{"name":"x","n":1}"#).unwrap();
        assert_eq!(value, json!({"name": "x", "n": 1}));
    }

    #[test]
    fn json_converter_reports_bad_input_as_400() {
        let err = JsonConverter.to_value("{not json").unwrap_err();
        assert_eq!(err.code(), http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn json_converter_renders_text() {
        assert_eq!(JsonConverter.to_text(&json!([1, 2])).unwrap(), "[1,2]");
        assert_eq!(JsonConverter.content_type(), "application/json");
    }
}
