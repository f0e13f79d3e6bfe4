use crate::error::ServerError;
use crate::http::HttpContext;
use futures::future::BoxFuture;
use std::sync::Arc;

/// User request logic. Receives the request context for the duration of the
/// returned future; responses are written through the context.
///
/// Closures of the shape `|ctx| Box::pin(async move { ... })` implement this
/// trait directly.
pub trait Handler: Send + Sync + 'static {
    fn call<'a>(&'a self, ctx: &'a mut HttpContext) -> BoxFuture<'a, ()>;
}

impl<F> Handler for F
where
    F: for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut HttpContext) -> BoxFuture<'a, ()> {
        (self)(ctx)
    }
}

pub(crate) type SharedHandler = Arc<dyn Handler>;

/// Server-level fault callback. Replaces the default 500 body when a hook or
/// handler panics on the standard path.
pub type ExceptionHandler = Arc<dyn Fn(&mut HttpContext, &ServerError) + Send + Sync>;
