use crate::context::RequestContext;
use crate::response::{Response, ResponseBody, ResponseKind};
use std::sync::Arc;
use tracing::{debug, warn};

/// A synchronous check run before a handler.
///
/// Returning `true` passes the request on. A guard that wants to stop
/// dispatch records a response on the [`Responder`] and returns `false`.
pub type Middleware = Arc<dyn Fn(&RequestContext, &mut Responder) -> bool + Send + Sync>;

/// Wrap a closure as [`Middleware`].
pub fn middleware<F>(guard: F) -> Middleware
where
    F: Fn(&RequestContext, &mut Responder) -> bool + Send + Sync + 'static,
{
    Arc::new(guard)
}

/// Collects the short-circuit response of a guard. Only the first response
/// recorded is kept.
#[derive(Debug, Default)]
pub struct Responder {
    response: Option<Response>,
}

impl Responder {
    pub fn respond(&mut self, response: Response) {
        if self.response.is_none() {
            self.response = Some(response);
        }
    }

    pub fn has_responded(&self) -> bool {
        self.response.is_some()
    }
}

/// Runs `guards` in order and returns the response of the first one that
/// stops dispatch.
pub(crate) fn run_guards(guards: &[Middleware], ctx: &RequestContext) -> Option<Response> {
    for (index, guard) in guards.iter().enumerate() {
        let mut responder = Responder::default();
        let proceed = guard(ctx, &mut responder);

        if let Some(response) = responder.response {
            debug!(guard = index, path = %ctx.path(), "Middleware responded");
            return Some(response);
        }

        if !proceed {
            warn!(
                guard = index,
                path = %ctx.path(),
                "Middleware halted dispatch without responding"
            );
            return Some(Response::new(ResponseKind::PlainText, ResponseBody::Empty));
        }
    }

    None
}
