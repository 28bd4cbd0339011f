//! OpenSocial API server: handler registry, REST/RPC dispatch, and batching.

pub mod sample;
pub mod service;

pub use service::{
    DispatchError, DispatchRequest, HandlerRegistry, HandlerResult, OperationSpec,
    RegistryConfig, RegistryService, Reply, ServiceBundle,
};
