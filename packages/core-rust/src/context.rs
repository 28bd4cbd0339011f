use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;

use crate::converter::{BodyConverter, JsonConverter};
use crate::token::{AnonymousToken, SecurityToken};

/// Per-request material shared by every call in one wire request: the
/// decoded token, the negotiated converter, and any named binary parts that
/// arrived alongside an RPC body.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub token: Arc<dyn SecurityToken>,
    pub converter: Arc<dyn BodyConverter>,
    /// Multipart form items, addressable by name from RPC handlers.
    pub form_parts: HashMap<String, Bytes>,
}

impl RequestContext {
    #[must_use]
    pub fn new(token: Arc<dyn SecurityToken>, converter: Arc<dyn BodyConverter>) -> Self {
        Self {
            token,
            converter,
            form_parts: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_form_part(mut self, name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.form_parts.insert(name.into(), data.into());
        self
    }
}

impl Default for RequestContext {
    /// Anonymous caller, JSON converter, no form parts.
    fn default() -> Self {
        Self::new(Arc::new(AnonymousToken), Arc::new(JsonConverter))
    }
}
