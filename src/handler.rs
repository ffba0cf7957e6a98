use crate::context::RequestContext;
use crate::middleware::guard::{run_guards, Middleware};
use crate::response::Response;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// An async request handler.
///
/// Implemented for every `Fn(Arc<RequestContext>) -> impl Future<Output = Response>`.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, ctx: Arc<RequestContext>) -> BoxFuture<'static, Response>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Arc<RequestContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Arc<RequestContext>) -> BoxFuture<'static, Response> {
        Box::pin(self(ctx))
    }
}

/// A handler bundled with the guards that were in scope when it was
/// registered.
#[derive(Clone)]
pub struct Endpoint {
    guards: Arc<[Middleware]>,
    handler: Arc<dyn Handler>,
}

impl Endpoint {
    pub fn new<H: Handler>(guards: Vec<Middleware>, handler: H) -> Self {
        Self {
            guards: guards.into(),
            handler: Arc::new(handler),
        }
    }

    pub fn guard_count(&self) -> usize {
        self.guards.len()
    }

    /// Runs the guards in order, then the handler unless a guard stopped
    /// dispatch.
    pub async fn call(&self, ctx: Arc<RequestContext>) -> Response {
        if let Some(response) = run_guards(&self.guards, &ctx) {
            return response;
        }
        self.handler.call(ctx).await
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("guards", &self.guards.len())
            .finish_non_exhaustive()
    }
}
