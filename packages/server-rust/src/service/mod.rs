//! Handler registration and dispatch.
//!
//! The request path through this module:
//!
//! 1. **Registration** (`bundle`): handler authors declare a [`ServiceBundle`]
//!    whose methods are bound once into plain call functions
//! 2. **Indexing** (`registry`): bundles are frozen into a [`HandlerRegistry`]
//!    holding a ranked REST route set per service and verb, and a flat RPC
//!    method map
//! 3. **Resolution** (`invocation`): a path or method name resolves to a
//!    bound handler or to a placeholder carrying the routing error
//! 4. **Invocation** (`binder`): a request item is built and the handler is
//!    called under the execution listener (`listener`)
//! 5. **Batching** (`batch`): many RPC calls share one context and fail
//!    independently
//!
//! [`RegistryService`] exposes all of this as a `tower::Service`.

pub mod batch;
pub mod binder;
pub mod bundle;
pub mod config;
pub mod invocation;
pub mod listener;
pub mod operation;
pub mod registry;
pub mod router;
pub mod system;

// Re-export key types for convenient access.
pub use batch::RpcReply;
pub use binder::BoundHandler;
pub use bundle::{OperationSpec, RegistrationError, ServiceBundle};
pub use config::RegistryConfig;
pub use invocation::{RestInvocation, RpcCall, RpcInvocation};
pub use listener::{ExecutionListener, TracingListener};
pub use operation::{
    DispatchError, HandlerResult, InputShape, OperationDescriptor, Outcome, OutcomeFuture, Reply,
};
pub use registry::{HandlerRegistry, HandlerRegistryBuilder, RestRoute};
pub use router::{DispatchRequest, RegistryService};
pub use system::{ServiceListing, SystemHandler, SYSTEM_SERVICE};
