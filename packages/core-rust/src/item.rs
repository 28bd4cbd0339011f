//! The canonical, transport-independent view of one call.
//!
//! A [`RequestItem`] is built fresh for every invocation from either a REST
//! parameter multimap or an RPC `params` object. Handlers read parameters
//! through the same accessors regardless of which surface the call came in
//! on.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::str::FromStr;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::context::RequestContext;
use crate::converter::BodyConverter;
use crate::error::ProtocolError;
use crate::path::{ParamMap, LIST_SEPARATOR};
use crate::token::SecurityToken;

/// Well-known collection parameter names.
pub mod param {
    pub const FIELDS: &str = "fields";
    pub const START_INDEX: &str = "startIndex";
    pub const COUNT: &str = "count";
    pub const SORT_BY: &str = "sortBy";
    pub const SORT_ORDER: &str = "sortOrder";
    pub const FILTER_BY: &str = "filterBy";
    pub const FILTER_OP: &str = "filterOp";
    pub const FILTER_VALUE: &str = "filterValue";
    pub const UPDATED_SINCE: &str = "updatedSince";
    pub const USER_ID: &str = "userId";
    pub const GROUP_ID: &str = "groupId";
    pub const APP_ID: &str = "appId";
}

/// Which request surface produced the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Rest,
    Rpc,
}

impl Transport {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rest => "rest",
            Self::Rpc => "rpc",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Values used when a request omits the paging parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionDefaults {
    pub start_index: u32,
    pub count: u32,
    /// Upper bound applied to `count`. Zero means unbounded.
    pub max_count: u32,
}

impl Default for CollectionDefaults {
    fn default() -> Self {
        Self {
            start_index: 0,
            count: 20,
            max_count: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl FromStr for SortOrder {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("ascending") {
            Ok(Self::Ascending)
        } else if s.eq_ignore_ascii_case("descending") {
            Ok(Self::Descending)
        } else {
            Err(ProtocolError::bad_request(format!("Unknown sort order {s}")))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Contains,
    Equals,
    StartsWith,
    Present,
}

impl FromStr for FilterOp {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contains" => Ok(Self::Contains),
            "equals" => Ok(Self::Equals),
            "startsWith" => Ok(Self::StartsWith),
            "present" => Ok(Self::Present),
            other => Err(ProtocolError::bad_request(format!(
                "Unknown filter operation {other}"
            ))),
        }
    }
}

#[derive(Debug)]
enum Params {
    Rest(ParamMap),
    Rpc(Map<String, Value>),
}

/// Parameters, auth context, and converter for exactly one invocation.
#[derive(Debug)]
pub struct RequestItem {
    service: String,
    operation: String,
    params: Params,
    body_param: Option<String>,
    context: RequestContext,
    defaults: CollectionDefaults,
    attributes: HashMap<String, Value>,
}

impl RequestItem {
    /// Builds an item from a merged REST parameter multimap.
    #[must_use]
    pub fn rest(
        service: impl Into<String>,
        operation: impl Into<String>,
        params: ParamMap,
        context: RequestContext,
    ) -> Self {
        Self::with_params(service.into(), operation.into(), Params::Rest(params), context)
    }

    /// Builds an item from the `params` object of an RPC request.
    #[must_use]
    pub fn rpc(
        service: impl Into<String>,
        operation: impl Into<String>,
        params: Map<String, Value>,
        context: RequestContext,
    ) -> Self {
        Self::with_params(service.into(), operation.into(), Params::Rpc(params), context)
    }

    fn with_params(
        service: String,
        operation: String,
        params: Params,
        context: RequestContext,
    ) -> Self {
        Self {
            service,
            operation,
            params,
            body_param: None,
            context,
            defaults: CollectionDefaults::default(),
            attributes: HashMap::new(),
        }
    }

    /// Names the parameter that carries the request payload.
    #[must_use]
    pub fn with_body_param(mut self, name: Option<String>) -> Self {
        self.body_param = name;
        self
    }

    #[must_use]
    pub fn with_defaults(mut self, defaults: CollectionDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    #[must_use]
    pub fn transport(&self) -> Transport {
        match self.params {
            Params::Rest(_) => Transport::Rest,
            Params::Rpc(_) => Transport::Rpc,
        }
    }

    #[must_use]
    pub fn body_param(&self) -> Option<&str> {
        self.body_param.as_deref()
    }

    #[must_use]
    pub fn token(&self) -> &dyn SecurityToken {
        &*self.context.token
    }

    #[must_use]
    pub fn converter(&self) -> &dyn BodyConverter {
        &*self.context.converter
    }

    #[must_use]
    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    #[must_use]
    pub fn has_parameter(&self, name: &str) -> bool {
        match &self.params {
            Params::Rest(p) => p.contains_key(name),
            Params::Rpc(p) => p.get(name).is_some_and(|v| !v.is_null()),
        }
    }

    #[must_use]
    pub fn parameter_names(&self) -> Vec<&str> {
        match &self.params {
            Params::Rest(p) => p.keys().map(String::as_str).collect(),
            Params::Rpc(p) => p.keys().map(String::as_str).collect(),
        }
    }

    /// First value of a parameter as text. RPC arrays are joined with commas.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<String> {
        match &self.params {
            Params::Rest(p) => p.get(name).and_then(|v| v.first()).cloned(),
            Params::Rpc(p) => p.get(name).and_then(value_to_text),
        }
    }

    #[must_use]
    pub fn parameter_or(&self, name: &str, default: &str) -> String {
        self.parameter(name).unwrap_or_else(|| default.to_string())
    }

    /// All values of a parameter. A single REST value containing commas is
    /// split into its pieces.
    #[must_use]
    pub fn list_parameter(&self, name: &str) -> Vec<String> {
        match &self.params {
            Params::Rest(p) => match p.get(name).map(Vec::as_slice) {
                None => Vec::new(),
                Some([single]) if single.contains(LIST_SEPARATOR) => single
                    .split(LIST_SEPARATOR)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
                    .collect(),
                Some(values) => values.to_vec(),
            },
            Params::Rpc(p) => match p.get(name) {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(items)) => items.iter().filter_map(value_to_text).collect(),
                Some(other) => value_to_text(other).into_iter().collect(),
            },
        }
    }

    /// Decodes one parameter into `T`.
    ///
    /// Text values are first tried as a plain string, then parsed through the
    /// request's converter.
    ///
    /// # Errors
    ///
    /// A value that does not decode into `T` is a `400`.
    pub fn typed_parameter<T: DeserializeOwned>(
        &self,
        name: &str,
    ) -> Result<Option<T>, ProtocolError> {
        let value = match &self.params {
            Params::Rest(p) => match p.get(name).and_then(|v| v.first()) {
                Some(raw) => Value::String(raw.clone()),
                None => return Ok(None),
            },
            Params::Rpc(p) => match p.get(name) {
                None | Some(Value::Null) => return Ok(None),
                Some(value) => value.clone(),
            },
        };
        self.decode(name, value).map(Some)
    }

    /// Decodes the whole parameter set into `T`. REST parameters with one
    /// value become strings, the rest become string arrays.
    ///
    /// # Errors
    ///
    /// A parameter set that does not decode into `T` is a `400`.
    pub fn typed_request<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        let value = match &self.params {
            Params::Rest(p) => Value::Object(
                p.iter()
                    .map(|(name, values)| {
                        let value = match values.as_slice() {
                            [single] => Value::String(single.clone()),
                            many => Value::Array(many.iter().cloned().map(Value::String).collect()),
                        };
                        (name.clone(), value)
                    })
                    .collect(),
            ),
            Params::Rpc(p) => Value::Object(p.clone()),
        };
        serde_json::from_value(value)
            .map_err(|e| ProtocolError::bad_request(format!("Malformed request: {e}")))
    }

    /// Decodes the operation's payload: the body parameter when one is
    /// declared and present, the whole parameter set otherwise.
    ///
    /// # Errors
    ///
    /// A payload that does not decode into `T` is a `400`.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        if let Some(name) = self.body_param.as_deref() {
            if self.has_parameter(name) {
                return self.typed_parameter(name)?.ok_or_else(|| {
                    ProtocolError::bad_request(format!("Missing request body {name}"))
                });
            }
        }
        self.typed_request()
    }

    fn decode<T: DeserializeOwned>(&self, name: &str, value: Value) -> Result<T, ProtocolError> {
        let invalid =
            |e: serde_json::Error| ProtocolError::bad_request(format!("Invalid value for {name}: {e}"));
        match value {
            Value::String(text) => match serde_json::from_value(Value::String(text.clone())) {
                Ok(decoded) => Ok(decoded),
                Err(_) => {
                    let parsed = self.context.converter.to_value(&text)?;
                    serde_json::from_value(parsed).map_err(invalid)
                }
            },
            other => serde_json::from_value(other).map_err(invalid),
        }
    }

    /// A binary part attached to the request under `name`.
    #[must_use]
    pub fn form_part(&self, name: &str) -> Option<&Bytes> {
        self.context.form_parts.get(name)
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: Value) {
        self.attributes.insert(name.into(), value);
    }

    // ----- Collection parameters -----

    /// # Errors
    ///
    /// A non-numeric `startIndex` is a `400`.
    pub fn start_index(&self) -> Result<u32, ProtocolError> {
        Ok(self
            .typed_parameter(param::START_INDEX)?
            .unwrap_or(self.defaults.start_index))
    }

    /// Requested page size, clamped to the configured maximum.
    ///
    /// # Errors
    ///
    /// A non-numeric `count` is a `400`.
    pub fn count(&self) -> Result<u32, ProtocolError> {
        let count = self
            .typed_parameter(param::COUNT)?
            .unwrap_or(self.defaults.count);
        Ok(match self.defaults.max_count {
            0 => count,
            max => count.min(max),
        })
    }

    #[must_use]
    pub fn fields(&self) -> BTreeSet<String> {
        self.list_parameter(param::FIELDS).into_iter().collect()
    }

    #[must_use]
    pub fn sort_by(&self) -> Option<String> {
        self.parameter(param::SORT_BY)
    }

    /// # Errors
    ///
    /// An unknown order is a `400`.
    pub fn sort_order(&self) -> Result<SortOrder, ProtocolError> {
        self.parameter(param::SORT_ORDER)
            .map_or(Ok(SortOrder::default()), |s| s.parse())
    }

    #[must_use]
    pub fn filter_by(&self) -> Option<String> {
        self.parameter(param::FILTER_BY)
    }

    /// # Errors
    ///
    /// An unknown operation is a `400`.
    pub fn filter_op(&self) -> Result<Option<FilterOp>, ProtocolError> {
        self.parameter(param::FILTER_OP)
            .map(|s| s.parse())
            .transpose()
    }

    #[must_use]
    pub fn filter_value(&self) -> Option<String> {
        self.parameter(param::FILTER_VALUE)
    }

    #[must_use]
    pub fn updated_since(&self) -> Option<String> {
        self.parameter(param::UPDATED_SINCE)
    }

    #[must_use]
    pub fn user_ids(&self) -> Vec<String> {
        self.list_parameter(param::USER_ID)
    }

    #[must_use]
    pub fn group_id(&self) -> Option<String> {
        self.parameter(param::GROUP_ID)
    }

    #[must_use]
    pub fn app_id(&self) -> Option<String> {
        self.parameter(param::APP_ID)
    }
}

fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(value_to_text)
                .collect::<Vec<_>>()
                .join(","),
        ),
        other => Some(other.to_string()),
    }
}

/// A request item whose payload is materialized as `T` on demand.
///
/// Dereferences to the underlying [`RequestItem`], so handlers taking a
/// typed request still see every other parameter.
pub struct TypedRequest<'a, T> {
    item: &'a RequestItem,
    _payload: PhantomData<fn() -> T>,
}

impl<'a, T: DeserializeOwned> TypedRequest<'a, T> {
    #[must_use]
    pub fn new(item: &'a RequestItem) -> Self {
        Self {
            item,
            _payload: PhantomData,
        }
    }

    /// Converts the payload. Nothing is decoded until this is called.
    ///
    /// # Errors
    ///
    /// A payload that does not decode into `T` is a `400`.
    pub fn payload(&self) -> Result<T, ProtocolError> {
        self.item.payload()
    }

    #[must_use]
    pub fn item(&self) -> &'a RequestItem {
        self.item
    }
}

impl<T> Deref for TypedRequest<'_, T> {
    type Target = RequestItem;

    fn deref(&self) -> &RequestItem {
        self.item
    }
}

impl<T> fmt::Debug for TypedRequest<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedRequest")
            .field("item", self.item)
            .field("payload", &std::any::type_name::<T>())
            .finish()
    }
}
