use std::fmt;

use derive_ex::derive_ex;
use ordered_float::OrderedFloat;
use parse_display::Display;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::utils::write_list_no_escape;


pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Serialize, Deserialize, Clone, Display)]
#[derive_ex(Eq, PartialEq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    #[display("{0}")]
    Number(i64),
    /// Integer beyond `i64::MAX`.
    #[display("{0}")]
    UNumber(u64),
    #[display("{0}")]
    Float(#[eq(key = OrderedFloat($))] f64),
    #[display("\"{0}\"")]
    String(String),
}
impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        RequestId::Number(id)
    }
}
impl From<i32> for RequestId {
    fn from(id: i32) -> Self {
        RequestId::Number(id.into())
    }
}
impl From<u32> for RequestId {
    fn from(id: u32) -> Self {
        RequestId::Number(id.into())
    }
}
impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        match i64::try_from(id) {
            Ok(id) => RequestId::Number(id),
            Err(_) => RequestId::UNumber(id),
        }
    }
}
impl From<String> for RequestId {
    fn from(id: String) -> Self {
        RequestId::String(id)
    }
}
impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        RequestId::String(id.to_string())
    }
}

/// Request parameters: named (object) or positional (array).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Params {
    Array(Vec<Value>),
    Object(Map<String, Value>),
}
impl Params {
    pub fn len(&self) -> usize {
        match self {
            Params::Array(values) => values.len(),
            Params::Object(map) => map.len(),
        }
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries whose value is not `null`.
    pub fn non_null_len(&self) -> usize {
        match self {
            Params::Array(values) => values.iter().filter(|v| !v.is_null()).count(),
            Params::Object(map) => map.values().filter(|v| !v.is_null()).count(),
        }
    }

    /// Looks up by `index` for positional params and by `name` for named params.
    pub fn lookup(&self, index: usize, name: &str) -> Option<&Value> {
        match self {
            Params::Array(values) => values.get(index),
            Params::Object(map) => map.get(name),
        }
    }
}
impl Default for Params {
    fn default() -> Self {
        Params::Object(Map::new())
    }
}
impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Params::Array(values)
    }
}
impl From<Map<String, Value>> for Params {
    fn from(map: Map<String, Value>) -> Self {
        Params::Object(map)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Params>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
}
impl Request {
    pub fn new(id: Option<RequestId>, method: impl Into<String>, params: Option<Params>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id,
        }
    }
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// Loosely typed request, accepted before envelope validation.
#[derive(Debug, Deserialize)]
pub(crate) struct RawRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    /// `None` when the member is absent, `Some(None)` for an explicit `null`.
    #[serde(default, deserialize_with = "present")]
    pub id: Option<Option<RequestId>>,
}

fn present<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Option<RequestId>>, D::Error> {
    Option::<RequestId>::deserialize(d).map(Some)
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InvalidRequest {
    #[display("unsupported protocol version")]
    Version,
    #[display("method is missing")]
    MissingMethod,
    #[display("params must be an object, an array or null")]
    ParamsShape,
}

impl RawRequest {
    /// A notification has no `id` member at all; `"id": null` still gets a response.
    pub(crate) fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    pub(crate) fn try_into_request(self) -> Result<Request, InvalidRequest> {
        match self.jsonrpc.as_deref() {
            Some(JSONRPC_VERSION) => {}
            _ => return Err(InvalidRequest::Version),
        }
        let Some(method) = self.method else {
            return Err(InvalidRequest::MissingMethod);
        };
        let params = match self.params {
            None | Some(Value::Null) => None,
            Some(Value::Array(values)) => Some(Params::Array(values)),
            Some(Value::Object(map)) => Some(Params::Object(map)),
            Some(_) => return Err(InvalidRequest::ParamsShape),
        };
        Ok(Request {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method,
            params,
            id: self.id.flatten(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(transparent)]
#[display("{0}")]
pub struct ErrorCode(pub i64);

impl ErrorCode {
    pub const PARSE_ERROR: Self = Self(-32700);
    pub const INVALID_REQUEST: Self = Self(-32600);
    pub const METHOD_NOT_FOUND: Self = Self(-32601);
    pub const INVALID_PARAMS: Self = Self(-32602);
    pub const INTERNAL_ERROR: Self = Self(-32603);

    pub const APPLICATION_MIN: i64 = -32099;
    pub const APPLICATION_MAX: i64 = -32000;

    pub fn message(self) -> &'static str {
        match self {
            Self::PARSE_ERROR => "Parse error",
            Self::INVALID_REQUEST => "Invalid Request",
            Self::METHOD_NOT_FOUND => "Method not found",
            Self::INVALID_PARAMS => "Invalid params",
            Self::INTERNAL_ERROR => "Internal error",
            _ => "Server error",
        }
    }

    /// Whether the code lies in the range reserved for application errors.
    pub fn is_application(self) -> bool {
        (Self::APPLICATION_MIN..=Self::APPLICATION_MAX).contains(&self.0)
    }
}
impl From<i64> for ErrorCode {
    fn from(code: i64) -> Self {
        Self(code)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtendedAttributes {
    pub code: String,
    #[serde(default)]
    pub args: Vec<Value>,
}
impl fmt::Display for ExtendedAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)?;
        if !self.args.is_empty() {
            write_list_no_escape(&self.args, f)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extended: Option<ExtendedAttributes>,
}
impl ErrorMessage {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            extended: None,
        }
    }
    pub fn with_extended(mut self, extended: ExtendedAttributes) -> Self {
        self.extended = Some(extended);
        self
    }
    pub fn parse_error() -> Self {
        Self::from(ErrorCode::PARSE_ERROR)
    }
    pub fn invalid_request() -> Self {
        Self::from(ErrorCode::INVALID_REQUEST)
    }
    pub fn method_not_found() -> Self {
        Self::from(ErrorCode::METHOD_NOT_FOUND)
    }
}
impl From<ErrorCode> for ErrorMessage {
    fn from(code: ErrorCode) -> Self {
        Self::new(code, code.message())
    }
}
impl fmt::Display for ErrorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)?;
        if let Some(extended) = &self.extended {
            write!(f, " [{extended}]")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub jsonrpc: String,
    pub id: Option<RequestId>,
    pub result: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub jsonrpc: String,
    pub id: Option<RequestId>,
    pub error: ErrorMessage,
    #[serde(skip, default = "default_error_status")]
    pub http_status: u16,
}
fn default_error_status() -> u16 {
    500
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Success(SuccessResponse),
    Error(ErrorResponse),
}
impl Response {
    pub fn success(id: Option<RequestId>, result: Value) -> Self {
        Response::Success(SuccessResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result,
        })
    }
    pub fn error(id: Option<RequestId>, error: ErrorMessage, http_status: u16) -> Self {
        Response::Error(ErrorResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            error,
            http_status,
        })
    }

    pub fn id(&self) -> Option<&RequestId> {
        match self {
            Response::Success(r) => r.id.as_ref(),
            Response::Error(r) => r.id.as_ref(),
        }
    }
    pub fn http_status(&self) -> u16 {
        match self {
            Response::Success(_) => 200,
            Response::Error(r) => r.http_status,
        }
    }
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Response::Success(_) => None,
            Response::Error(r) => Some(r.error.code),
        }
    }
    pub fn result(&self) -> Option<&Value> {
        match self {
            Response::Success(r) => Some(&r.result),
            Response::Error(_) => None,
        }
    }
}

/// One message or a JSON array of messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Batch<T> {
    Single(T),
    Many(Vec<T>),
}
impl<T> Batch<T> {
    pub fn len(&self) -> usize {
        match self {
            Batch::Single(_) => 1,
            Batch::Many(items) => items.len(),
        }
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
impl<T> From<T> for Batch<T> {
    fn from(item: T) -> Self {
        Batch::Single(item)
    }
}
