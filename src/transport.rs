use std::{future::Future, io, pin::Pin, sync::Arc};

use crate::Dispatcher;

/// Carries one serialized request to a server and returns the reply text.
///
/// An empty reply means the server sent no body.
pub trait Transport: Send + Sync {
    fn pass(&self, request: String) -> impl Future<Output = io::Result<String>> + Send;

    fn boxed(self) -> BoxTransport
    where
        Self: Sized + 'static,
    {
        BoxTransport(Arc::new(self))
    }
}

#[derive(Clone)]
pub struct BoxTransport(Arc<dyn DynTransport + Send + Sync + 'static>);
impl Transport for BoxTransport {
    async fn pass(&self, request: String) -> io::Result<String> {
        self.0.dyn_pass(request).await
    }
    fn boxed(self) -> BoxTransport
    where
        Self: Sized + 'static,
    {
        self
    }
}

trait DynTransport {
    fn dyn_pass<'a>(
        &'a self,
        request: String,
    ) -> Pin<Box<dyn Future<Output = io::Result<String>> + Send + 'a>>;
}
impl<T: Transport> DynTransport for T {
    fn dyn_pass<'a>(
        &'a self,
        request: String,
    ) -> Pin<Box<dyn Future<Output = io::Result<String>> + Send + 'a>> {
        Box::pin(self.pass(request))
    }
}

pub struct FnTransport<F>(F);

/// Creates a transport from an async function.
pub fn transport_fn<F, Fut>(f: F) -> FnTransport<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = io::Result<String>> + Send,
{
    FnTransport(f)
}
impl<F, Fut> Transport for FnTransport<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = io::Result<String>> + Send,
{
    fn pass(&self, request: String) -> impl Future<Output = io::Result<String>> + Send {
        (self.0)(request)
    }
}

/// Connects a client to a [`Dispatcher`] in the same process.
#[derive(Clone)]
pub struct LocalTransport(Dispatcher);

impl LocalTransport {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self(dispatcher)
    }
}
impl Transport for LocalTransport {
    async fn pass(&self, request: String) -> io::Result<String> {
        let reply = self.0.handle_text(&request).await;
        reply.to_json_string().map_err(io::Error::other)
    }
}
