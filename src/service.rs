use std::{collections::HashMap, fmt, future::Future, sync::Arc};

use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;

use crate::{Args, ParamSpec, RequestContext, Result};

pub type MethodFuture = BoxFuture<'static, Result<Value>>;
type RawHandler = dyn Fn(RequestContext, Args) -> MethodFuture + Send + Sync;

fn to_result(result: Result<impl Serialize>) -> Result<Value> {
    Ok(serde_json::to_value(result?)?)
}

/// One callable overload: a name, its parameter list and the handler.
pub struct MethodDescriptor {
    name: String,
    params: Vec<ParamSpec>,
    handler: Arc<RawHandler>,
}
impl MethodDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }
    pub(crate) fn invoke(&self, cx: RequestContext, args: Args) -> MethodFuture {
        (self.handler)(cx, args)
    }
}
impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Registration table of one service.
///
/// Methods sharing a name are overloads, tried in registration order.
#[derive(Debug)]
pub struct Service {
    name: String,
    methods: Vec<Arc<MethodDescriptor>>,
}

impl Service {
    pub fn builder(name: &str) -> ServiceBuilder {
        ServiceBuilder {
            name: normalize_service_name(name),
            methods: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Overloads named `name`, in registration order.
    pub fn methods<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Arc<MethodDescriptor>> {
        self.methods.iter().filter(move |m| m.name == name)
    }
    pub fn all_methods(&self) -> &[Arc<MethodDescriptor>] {
        &self.methods
    }
}

pub struct ServiceBuilder {
    name: String,
    methods: Vec<Arc<MethodDescriptor>>,
}

impl ServiceBuilder {
    /// Registers a synchronous overload.
    pub fn method<F, R>(
        self,
        name: impl Into<String>,
        params: impl IntoIterator<Item = ParamSpec>,
        f: F,
    ) -> Self
    where
        F: Fn(RequestContext, Args) -> Result<R> + Send + Sync + 'static,
        R: Serialize,
    {
        let f = Arc::new(f);
        self.push(
            name.into(),
            params,
            Arc::new(move |cx: RequestContext, args: Args| -> MethodFuture {
                let f = f.clone();
                Box::pin(async move { to_result(f(cx, args)) })
            }),
        )
    }

    /// Registers an asynchronous overload.
    pub fn method_async<F, Fut, R>(
        self,
        name: impl Into<String>,
        params: impl IntoIterator<Item = ParamSpec>,
        f: F,
    ) -> Self
    where
        F: Fn(RequestContext, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
        R: Serialize,
    {
        self.push(
            name.into(),
            params,
            Arc::new(move |cx: RequestContext, args: Args| -> MethodFuture {
                let fut = f(cx, args);
                Box::pin(async move { to_result(fut.await) })
            }),
        )
    }

    fn push(
        mut self,
        name: String,
        params: impl IntoIterator<Item = ParamSpec>,
        handler: Arc<RawHandler>,
    ) -> Self {
        self.methods.push(Arc::new(MethodDescriptor {
            name,
            params: params.into_iter().collect(),
            handler,
        }));
        self
    }

    pub fn build(self) -> Arc<Service> {
        Arc::new(Service {
            name: self.name,
            methods: self.methods,
        })
    }
}

/// Resolves a `service#method` reference to a service and a method name.
pub trait ServiceLocator: Send + Sync {
    fn service(&self, reference: &str) -> Option<Arc<Service>>;
    fn method_name(&self, reference: &str) -> Option<String>;
}

fn normalize_service_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Splits `reference` on its single `#`; both sides must be non-empty.
pub fn split_reference(reference: &str) -> Option<(String, &str)> {
    let (service, method) = reference.split_once('#')?;
    let service = normalize_service_name(service);
    if service.is_empty() || method.is_empty() || method.contains('#') {
        return None;
    }
    Some((service, method))
}

/// Services keyed by their case-insensitive name.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: HashMap<String, Arc<Service>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with(mut self, service: Arc<Service>) -> Self {
        self.insert(service);
        self
    }
    /// Adds `service`, replacing any service registered under the same name.
    pub fn insert(&mut self, service: Arc<Service>) -> Option<Arc<Service>> {
        self.services.insert(service.name.clone(), service)
    }
    pub fn get(&self, name: &str) -> Option<&Arc<Service>> {
        self.services.get(&normalize_service_name(name))
    }
}

impl ServiceLocator for ServiceRegistry {
    fn service(&self, reference: &str) -> Option<Arc<Service>> {
        let (service, _) = split_reference(reference)?;
        self.services.get(&service).cloned()
    }
    fn method_name(&self, reference: &str) -> Option<String> {
        let (_, method) = split_reference(reference)?;
        Some(method.to_string())
    }
}

impl<T: ServiceLocator + ?Sized> ServiceLocator for Arc<T> {
    fn service(&self, reference: &str) -> Option<Arc<Service>> {
        (**self).service(reference)
    }
    fn method_name(&self, reference: &str) -> Option<String> {
        (**self).method_name(reference)
    }
}
