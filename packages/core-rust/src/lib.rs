//! `osapi` Core: route templates, canonical request items, and the protocol
//! error taxonomy shared by the REST and RPC request surfaces.

pub mod context;
pub mod converter;
pub mod error;
pub mod item;
pub mod path;
pub mod token;

pub use context::RequestContext;
pub use converter::{BodyConverter, JsonConverter};
pub use error::{ErrorKind, ProtocolError};
pub use item::{CollectionDefaults, FilterOp, RequestItem, SortOrder, Transport, TypedRequest};
pub use path::{split_request_path, ParamMap, PathTemplate, Segment, TemplateError, LIST_SEPARATOR};
pub use token::{AnonymousToken, BasicToken, SecurityToken};
