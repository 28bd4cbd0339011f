//! Opaque authentication context.

use std::fmt;

/// Decoded security token. The registry only passes it through to handlers.
pub trait SecurityToken: Send + Sync + fmt::Debug {
    fn owner_id(&self) -> Option<&str>;

    fn viewer_id(&self) -> Option<&str>;

    fn app_id(&self) -> Option<&str>;

    /// Container the request originated from.
    fn container(&self) -> &str {
        "default"
    }

    fn is_anonymous(&self) -> bool {
        self.viewer_id().is_none()
    }
}

/// Token for unauthenticated callers.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousToken;

impl SecurityToken for AnonymousToken {
    fn owner_id(&self) -> Option<&str> {
        None
    }

    fn viewer_id(&self) -> Option<&str> {
        None
    }

    fn app_id(&self) -> Option<&str> {
        None
    }
}

/// A token with fixed identities, as produced by a simple decoder.
#[derive(Debug, Clone, Default)]
pub struct BasicToken {
    pub owner: Option<String>,
    pub viewer: Option<String>,
    pub app: Option<String>,
    pub container: Option<String>,
}

impl SecurityToken for BasicToken {
    fn owner_id(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    fn viewer_id(&self) -> Option<&str> {
        self.viewer.as_deref()
    }

    fn app_id(&self) -> Option<&str> {
        self.app.as_deref()
    }

    fn container(&self) -> &str {
        self.container.as_deref().unwrap_or("default")
    }
}
