//! Built-in `system` service: method discovery.

use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use osapi_core::{RequestItem, Transport};

use super::bundle::{OperationSpec, ServiceBundle};
use super::operation::{HandlerResult, Reply};

pub const SYSTEM_SERVICE: &str = "system";

/// Everything the registry exposes, captured once registration completes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceListing {
    /// `"VERB path"` strings.
    pub rest: BTreeSet<String>,
    /// `"service.operation"` strings.
    pub rpc: BTreeSet<String>,
}

#[derive(Debug, Default)]
pub struct SystemHandler {
    listing: OnceLock<ServiceListing>,
}

impl SystemHandler {
    /// Sets the listing. Later calls are ignored.
    pub(crate) fn publish(&self, listing: ServiceListing) {
        let _ = self.listing.set(listing);
    }

    /// Lists REST routes for REST callers and RPC methods for RPC callers.
    ///
    /// # Errors
    ///
    /// Never fails once the registry is built.
    pub fn list_methods(&self, item: &RequestItem) -> HandlerResult {
        let Some(listing) = self.listing.get() else {
            return Reply::value(&Vec::<String>::new());
        };
        match item.transport() {
            Transport::Rest => Reply::value(&listing.rest),
            Transport::Rpc => Reply::value(&listing.rpc),
        }
    }

    pub(crate) fn bundle(handler: Arc<Self>) -> ServiceBundle<Self> {
        ServiceBundle::singleton(SYSTEM_SERVICE, handler).operation(
            OperationSpec::get("listMethods").path("/listMethods"),
            Self::list_methods,
        )
    }
}

#[cfg(test)]
mod tests {
    use osapi_core::{ParamMap, RequestContext};
    use serde_json::json;

    use super::*;

    fn listed(handler: &SystemHandler, item: &RequestItem) -> serde_json::Value {
        match handler.list_methods(item).unwrap() {
            Reply::Immediate(v) => v,
            Reply::Deferred(_) => panic!("listing is immediate"),
        }
    }

    #[test]
    fn listing_depends_on_transport() {
        let handler = SystemHandler::default();
        handler.publish(ServiceListing {
            rest: BTreeSet::from(["GET /system/listMethods".to_string()]),
            rpc: BTreeSet::from(["system.listMethods".to_string()]),
        });

        let rest = RequestItem::rest("system", "listMethods", ParamMap::new(), RequestContext::default());
        let rpc = RequestItem::rpc("system", "listMethods", serde_json::Map::new(), RequestContext::default());
        assert_eq!(listed(&handler, &rest), json!(["GET /system/listMethods"]));
        assert_eq!(listed(&handler, &rpc), json!(["system.listMethods"]));
    }

    #[test]
    fn first_publish_wins() {
        let handler = SystemHandler::default();
        handler.publish(ServiceListing {
            rpc: BTreeSet::from(["a.b".to_string()]),
            ..ServiceListing::default()
        });
        handler.publish(ServiceListing::default());
        let rpc = RequestItem::rpc("system", "listMethods", serde_json::Map::new(), RequestContext::default());
        assert_eq!(listed(&handler, &rpc), json!(["a.b"]));
    }
}
