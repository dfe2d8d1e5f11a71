//! Interceptors — code that runs around the rest of a route's chain.
//!
//! An interceptor's `before` part runs when the request reaches it and
//! returns the `after` part as an [`AfterHandle`]. The rest of the chain
//! (later middleware and the handler) runs in between, and the after-hook
//! runs exactly once when it completes.
//!
//! The after-hook is tied to the handle's lifetime: if the downstream chain
//! panics or the request future is dropped, the hook still runs while the
//! handle is dropped.
//!
//! ```rust,no_run
//! use std::time::Instant;
//! use routeway::{get, interceptor::{InterceptorContext, use_interceptor}};
//!
//! let route = get("/logger", |_ctx| async { "logged" })
//!     .with(use_interceptor(|ctx: &mut InterceptorContext<'_>| {
//!         let path = ctx.request().path().to_owned();
//!         let start = Instant::now();
//!         move || tracing::info!(%path, elapsed = ?start.elapsed(), "after handler")
//!     }));
//! ```

use std::sync::Arc;

use crate::{
    Request,
    context::{Context, Extensions, PathParams},
    middleware::{BoxFuture, Middleware, MiddlewareHandler, Next, from_middleware},
};

/// What an interceptor may see and touch of the current request.
pub struct InterceptorContext<'a> {
    ctx: &'a mut Context,
}

impl<'a> InterceptorContext<'a> {
    pub fn new(ctx: &'a mut Context) -> Self {
        Self { ctx }
    }

    pub fn request(&self) -> &Request {
        self.ctx.request()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.ctx.header(name)
    }

    pub fn params(&self) -> &PathParams {
        self.ctx.params()
    }

    pub fn extensions(&self) -> &Extensions {
        self.ctx.extensions()
    }

    /// Values inserted here are visible to later steps and the handler.
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        self.ctx.extensions_mut()
    }
}

/// The pending after-hook of an interceptor. Runs once, on [`run`](Self::run)
/// or on drop, whichever comes first.
pub struct AfterHandle(Option<Box<dyn FnOnce() + Send>>);

impl AfterHandle {
    pub fn new(after: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(after)))
    }

    /// A handle with nothing to run afterwards.
    pub fn noop() -> Self {
        Self(None)
    }

    pub fn run(mut self) {
        if let Some(after) = self.0.take() {
            after();
        }
    }
}

impl Drop for AfterHandle {
    fn drop(&mut self) {
        if let Some(after) = self.0.take() {
            after();
        }
    }
}

impl std::fmt::Debug for AfterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AfterHandle")
            .field(&if self.0.is_some() { "pending" } else { "done" })
            .finish()
    }
}

/// A before/after pair around the downstream chain.
///
/// Closures of the form `|ctx: &mut InterceptorContext<'_>| { /* before */;
/// move || { /* after */ } }` implement this automatically.
pub trait Interceptor: Send + Sync + 'static {
    fn intercept(&self, ctx: &mut InterceptorContext<'_>) -> AfterHandle;
}

impl<F, A> Interceptor for F
where
    F: Fn(&mut InterceptorContext<'_>) -> A + Send + Sync + 'static,
    A: FnOnce() + Send + 'static,
{
    fn intercept(&self, ctx: &mut InterceptorContext<'_>) -> AfterHandle {
        AfterHandle::new(self(ctx))
    }
}

/// Chain step running an [`Interceptor`] around the rest of the chain.
pub struct InterceptorMiddleware<I> {
    interceptor: I,
}

impl<I: Interceptor> InterceptorMiddleware<I> {
    pub fn new(interceptor: I) -> Self {
        Self { interceptor }
    }
}

impl<I: Interceptor> Middleware for InterceptorMiddleware<I> {
    fn handle(&self, mut ctx: Context, next: Next) -> BoxFuture {
        let after = self.interceptor.intercept(&mut InterceptorContext::new(&mut ctx));

        Box::pin(async move {
            let response = next.run(ctx).await;
            after.run();
            response
        })
    }
}

/// Wraps `interceptor` as a chain step.
pub fn use_interceptor(interceptor: impl Interceptor) -> MiddlewareHandler {
    from_middleware(Arc::new(InterceptorMiddleware::new(interceptor)))
}
