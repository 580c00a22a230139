use std::{
    any::Any,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use futures::future::join_all;
use serde_json::{Map, Value};
use tokio::task::{JoinError, JoinHandle};

use crate::{
    Batch, DispatcherOptions, Error, ErrorCode, ErrorMessage, ErrorRegistry, Params, Request,
    RequestContext, RequestScope, Response, ServiceLocator,
    context::{ScopeGuard, split_management},
    message::RawRequest,
    resolver::resolve,
    utils::truncate_depth,
};

/// Server side of the protocol: turns request payloads into replies.
#[derive(Clone)]
pub struct Dispatcher {
    locator: Arc<dyn ServiceLocator>,
    errors: Arc<ErrorRegistry>,
    options: DispatcherOptions,
}

/// Outcome of one inbound payload.
///
/// `body` is `None` when every request was a suppressed notification; the
/// transport then sends no body at all.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub body: Option<Batch<Response>>,
    pub http_status: u16,
}

impl Reply {
    fn none() -> Self {
        Self {
            body: None,
            http_status: 200,
        }
    }
    fn single(response: Option<Response>) -> Self {
        match response {
            Some(r) => Self {
                http_status: r.http_status(),
                body: Some(Batch::Single(r)),
            },
            None => Self::none(),
        }
    }
    fn batch(responses: Vec<Response>) -> Self {
        if responses.is_empty() {
            return Self::none();
        }
        Self {
            http_status: batch_status(&responses),
            body: Some(Batch::Many(responses)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_none()
    }

    /// Serialized body; empty when there is nothing to send.
    pub fn to_json_string(&self) -> serde_json::Result<String> {
        match &self.body {
            Some(body) => serde_json::to_string(body),
            None => Ok(String::new()),
        }
    }
}

/// HTTP status of a batch: 403 or 500 win outright, otherwise the highest non-200 status.
pub fn batch_status(responses: &[Response]) -> u16 {
    let mut status = 200;
    for r in responses {
        match r.http_status() {
            200 => {}
            s @ (403 | 500) => return s,
            s => status = status.max(s),
        }
    }
    status
}

impl Dispatcher {
    pub fn new(locator: impl ServiceLocator + 'static) -> Self {
        Self {
            locator: Arc::new(locator),
            errors: Arc::new(ErrorRegistry::new()),
            options: DispatcherOptions::default(),
        }
    }
    pub fn with_errors(mut self, errors: ErrorRegistry) -> Self {
        self.errors = Arc::new(errors);
        self
    }
    pub fn with_options(mut self, options: DispatcherOptions) -> Self {
        self.options = options;
        self
    }
    pub fn options(&self) -> &DispatcherOptions {
        &self.options
    }

    pub async fn handle_text(&self, text: &str) -> Reply {
        self.handle_text_in(text, RequestScope::new()).await
    }

    /// Handles `text` in a scope prepared by the host, e.g. with transport
    /// data inserted as extensions. The scope is released on return.
    pub async fn handle_text_in(&self, text: &str, scope: Arc<RequestScope>) -> Reply {
        let _guard = ScopeGuard(scope.clone());
        tracing::debug!(payload = text, "incoming request");
        match serde_json::from_str(text) {
            Ok(value) => self.handle_root(value, &scope).await,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable request");
                Reply::single(Some(Response::error(
                    None,
                    ErrorMessage::parse_error(),
                    self.options.parse_error_status,
                )))
            }
        }
    }

    pub async fn handle_value(&self, value: Value) -> Reply {
        self.handle_value_in(value, RequestScope::new()).await
    }
    pub async fn handle_value_in(&self, value: Value, scope: Arc<RequestScope>) -> Reply {
        let _guard = ScopeGuard(scope.clone());
        self.handle_root(value, &scope).await
    }

    async fn handle_root(&self, value: Value, scope: &Arc<RequestScope>) -> Reply {
        match value {
            Value::Object(_) => Reply::single(self.handle_object(value, scope).await),
            Value::Array(items) if !items.is_empty() => {
                let items = items.into_iter().map(|item| self.handle_item(item, scope));
                let responses = if self.options.concurrent_batch {
                    join_all(items).await
                } else {
                    let mut responses = Vec::new();
                    for item in items {
                        responses.push(item.await);
                    }
                    responses
                };
                Reply::batch(responses.into_iter().flatten().collect())
            }
            _ => {
                tracing::warn!("request is neither an object nor a non-empty array");
                Reply::single(Some(self.invalid_request(None)))
            }
        }
    }

    async fn handle_item(&self, item: Value, scope: &Arc<RequestScope>) -> Option<Response> {
        if item.is_object() {
            self.handle_object(item, scope).await
        } else {
            tracing::warn!("batch element is not an object");
            Some(self.invalid_request(None))
        }
    }

    /// Returns `None` for a suppressed notification.
    async fn handle_object(&self, value: Value, scope: &Arc<RequestScope>) -> Option<Response> {
        let raw: RawRequest = match serde_json::from_value(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "malformed request");
                return Some(self.invalid_request(None));
            }
        };
        let id = raw.id.clone().flatten();
        let is_notification = raw.is_notification();
        let request = match raw.try_into_request() {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(id = ?id, "invalid request: {e}");
                return Some(self.invalid_request(id));
            }
        };
        let response = self.call(request, scope).await;
        let suppress = is_notification
            && !matches!(
                response.error_code(),
                Some(ErrorCode::PARSE_ERROR | ErrorCode::INVALID_REQUEST)
            );
        (!suppress).then_some(response)
    }

    async fn call(&self, request: Request, scope: &Arc<RequestScope>) -> Response {
        let Request {
            method, params, id, ..
        } = request;
        let (params, management) = match params {
            Some(Params::Object(mut map)) => {
                let management = split_management(&mut map);
                (Params::Object(map), management)
            }
            Some(params) => (params, Map::new()),
            None => (Params::default(), Map::new()),
        };
        let Some(resolved) = resolve(&*self.locator, &method, &params) else {
            tracing::debug!(method = %method, "method not found");
            return Response::error(
                id,
                ErrorMessage::method_not_found(),
                self.options.method_not_found_status,
            );
        };
        let cx = RequestContext::new(id.clone(), &method, management, scope);
        let depth = cx.depth().unwrap_or(self.options.default_depth);
        let target = resolved.method;
        let args = resolved.args;
        let task = AbortOnDrop(tokio::spawn(async move { target.invoke(cx, args).await }));
        let result = match task.await {
            Ok(result) => result,
            Err(e) => Err(panic_error(e)),
        };
        match result {
            Ok(value) => Response::success(id, truncate_depth(value, depth)),
            Err(e) => {
                let (error, status) = self.errors.map(&e);
                tracing::debug!(method = %method, error = %e, code = error.code.0, status, "method failed");
                Response::error(id, error, status)
            }
        }
    }

    fn invalid_request(&self, id: Option<crate::RequestId>) -> Response {
        Response::error(
            id,
            ErrorMessage::invalid_request(),
            self.options.invalid_request_status,
        )
    }
}

fn panic_error(e: JoinError) -> Error {
    if !e.is_panic() {
        return Error::msg("method was cancelled");
    }
    let message = panic_message(e.into_panic());
    tracing::error!(panic = %message, "method panicked");
    Error::msg(format_args!("method panicked: {message}"))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Aborts the method task when the caller stops waiting for it.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Future for AbortOnDrop<T> {
    type Output = Result<T, JoinError>;
    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}
impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}
