use std::{fmt, io, marker::PhantomData, sync::Arc};

use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::{
    BoxTransport, ErrorMessage, JSONRPC_VERSION, Params, Request, RequestId, Transport,
};

/// Failure of a client call.
///
/// Only [`CallError::Rpc`] comes from the server; every other variant is
/// raised locally.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("{0}")]
    Rpc(ErrorMessage),
    #[error("transport failed: {0}")]
    Io(#[from] io::Error),
    #[error("failed to serialize request: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to parse response: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("positional and named params cannot be mixed in one request")]
    MixedParams,
    #[error("response result is null")]
    NullResult,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid service contract: {0}")]
    Config(String),
}

impl CallError {
    /// Error object returned by the server, if any.
    pub fn rpc(&self) -> Option<&ErrorMessage> {
        match self {
            CallError::Rpc(e) => Some(e),
            _ => None,
        }
    }
}

/// Immutable builder of one request.
///
/// Every mutator returns a new builder, so a partly configured builder can
/// be shared and specialized freely. `T` is the expected result type.
pub struct RequestBuilder<T> {
    transport: BoxTransport,
    id: Option<RequestId>,
    method: String,
    named: Map<String, Value>,
    positional: Vec<Value>,
    void: bool,
    deferred: Option<Arc<str>>,
    _result: PhantomData<fn() -> T>,
}

impl<T> Clone for RequestBuilder<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            id: self.id.clone(),
            method: self.method.clone(),
            named: self.named.clone(),
            positional: self.positional.clone(),
            void: self.void,
            deferred: self.deferred.clone(),
            _result: PhantomData,
        }
    }
}
impl<T> fmt::Debug for RequestBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("named", &self.named)
            .field("positional", &self.positional)
            .field("void", &self.void)
            .finish_non_exhaustive()
    }
}

impl RequestBuilder<Value> {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: transport.boxed(),
            id: None,
            method: String::new(),
            named: Map::new(),
            positional: Vec::new(),
            void: false,
            deferred: None,
            _result: PhantomData,
        }
    }
}

impl<T> RequestBuilder<T> {
    fn map_result<U>(&self, void: bool) -> RequestBuilder<U> {
        RequestBuilder {
            transport: self.transport.clone(),
            id: self.id.clone(),
            method: self.method.clone(),
            named: self.named.clone(),
            positional: self.positional.clone(),
            void,
            deferred: self.deferred.clone(),
            _result: PhantomData,
        }
    }

    pub fn id(&self, id: impl Into<RequestId>) -> Self {
        let mut b = self.clone();
        b.id = Some(id.into());
        b
    }
    pub fn method(&self, method: impl Into<String>) -> Self {
        let mut b = self.clone();
        b.method = method.into();
        b
    }

    /// Adds a named parameter.
    ///
    /// A value that fails to serialize is reported when the request is built.
    pub fn param(&self, name: impl Into<String>, value: impl Serialize) -> Self {
        let mut b = self.clone();
        let name = name.into();
        match serde_json::to_value(value) {
            Ok(value) => {
                b.named.insert(name, value);
            }
            Err(e) => b.defer(format!("param `{name}`: {e}")),
        }
        b
    }

    /// Replaces the positional parameters.
    pub fn params<I>(&self, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Serialize,
    {
        let mut b = self.clone();
        b.positional.clear();
        for (index, value) in values.into_iter().enumerate() {
            match serde_json::to_value(value) {
                Ok(value) => b.positional.push(value),
                Err(e) => b.defer(format!("param {index}: {e}")),
            }
        }
        b
    }

    fn defer(&mut self, message: String) {
        if self.deferred.is_none() {
            self.deferred = Some(message.into());
        }
    }

    pub fn returns<U: DeserializeOwned>(&self) -> RequestBuilder<U> {
        self.map_result(false)
    }
    /// Expects no meaningful result; any result the server sends is discarded.
    pub fn returns_void(&self) -> RequestBuilder<()> {
        self.map_result(true)
    }

    /// Builds the request envelope without sending it.
    pub fn build(&self) -> Result<Request, CallError> {
        if !self.named.is_empty() && !self.positional.is_empty() {
            return Err(CallError::MixedParams);
        }
        if let Some(message) = &self.deferred {
            return Err(CallError::InvalidArgument(message.to_string()));
        }
        if self.method.is_empty() {
            return Err(CallError::InvalidArgument("method is not set".into()));
        }
        let params = if !self.positional.is_empty() {
            Some(Params::Array(self.positional.clone()))
        } else if !self.named.is_empty() {
            Some(Params::Object(self.named.clone()))
        } else {
            None
        };
        Ok(Request::new(self.id.clone(), self.method.clone(), params))
    }

    /// Sends the request as a notification. Any reply body is ignored.
    pub async fn notify(&self) -> Result<(), CallError> {
        let mut request = self.build()?;
        request.id = None;
        let text = serde_json::to_string(&request).map_err(CallError::Serialize)?;
        self.transport.pass(text).await?;
        Ok(())
    }

    pub(crate) async fn execute_raw(&self) -> Result<Value, CallError> {
        let request = self.build()?;
        let Some(id) = &request.id else {
            return Err(CallError::InvalidArgument("request id is not set".into()));
        };
        let text = serde_json::to_string(&request).map_err(CallError::Serialize)?;
        tracing::debug!(id = %id, method = %request.method, "sending request");
        let reply = self.transport.pass(text).await?;
        decode_response(&reply, id)
    }
}

impl<T: DeserializeOwned> RequestBuilder<T> {
    /// Executes the request and requires a non-null result.
    pub async fn execute(&self) -> Result<T, CallError> {
        match self.execute_nullable().await? {
            Some(value) => Ok(value),
            None if self.void => T::deserialize(Value::Null).map_err(CallError::Parse),
            None => Err(CallError::NullResult),
        }
    }

    /// Executes the request; a `null` result becomes `None`.
    pub async fn execute_nullable(&self) -> Result<Option<T>, CallError> {
        let result = self.execute_raw().await?;
        if self.void || result.is_null() {
            return Ok(None);
        }
        T::deserialize(result).map(Some).map_err(CallError::Parse)
    }
}

/// Validates a single response to the request `sent` and extracts its result.
pub(crate) fn decode_response(text: &str, sent: &RequestId) -> Result<Value, CallError> {
    let value: Value = serde_json::from_str(text).map_err(CallError::Parse)?;
    let Value::Object(mut response) = value else {
        return Err(CallError::Malformed(format!("not a JSON-RPC response: {text}")));
    };
    match response.get("jsonrpc") {
        Some(Value::String(v)) if v == JSONRPC_VERSION => {}
        Some(_) => {
            return Err(CallError::Malformed(format!(
                "bad protocol version in a response: {text}"
            )));
        }
        None => {
            return Err(CallError::Malformed(format!("not a JSON-RPC response: {text}")));
        }
    }
    let id = match response.remove("id") {
        None => return Err(CallError::Malformed(format!("unspecified id in a response: {text}"))),
        Some(Value::Null) => None,
        Some(id) => Some(serde_json::from_value::<RequestId>(id).map_err(CallError::Parse)?),
    };
    if let Some(id) = &id {
        if id != sent {
            return Err(CallError::Malformed(format!(
                "response id {id} does not match request id {sent}"
            )));
        }
    }
    if let Some(error) = response.remove("error") {
        let error: ErrorMessage = serde_json::from_value(error).map_err(CallError::Parse)?;
        return Err(CallError::Rpc(error));
    }
    if id.is_none() {
        return Err(CallError::Malformed(format!("null id in a success response: {text}")));
    }
    match response.remove("result") {
        Some(result) => Ok(result),
        None => Err(CallError::Malformed(format!(
            "neither result nor error in a response: {text}"
        ))),
    }
}
