//! Middleware pipeline — the ordered chain every request walks.
//!
//! A route's chain is a slice of [`MiddlewareHandler`]s: global middleware
//! first, then route middleware (guards, interceptors, render markers), then
//! the normalized handler as the terminal step. [`Next`] is the cursor that
//! advances through it.
//!
//! ## Core types
//!
//! - [`Middleware`] — trait implemented by stateful middleware.
//! - [`Next`] — cursor into the remaining chain; call [`Next::run`] to advance.
//! - [`MiddlewareHandler`] — type-erased, cheaply-cloneable chain step.
//! - [`from_middleware`] / [`from_fn`] — build a [`MiddlewareHandler`].
//! - [`LoggerMiddleware`] — per-request log line.
//! - [`RecoveryMiddleware`] — turns a panicking chain into a `500`.

use std::{future::Future, pin::Pin, sync::Arc};
use tokio::time::Instant;

use crate::{Response, context::Context, exception::HttpException, http::StatusCode};

/// The boxed future every chain step returns.
pub type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// A type-erased, reference-counted chain step.
///
/// A step either produces the response itself (short-circuit) or forwards
/// to `next` and optionally decorates what comes back.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use routeway::{context::Context, middleware::{BoxFuture, MiddlewareHandler, Next}};
///
/// let step: MiddlewareHandler = Arc::new(|ctx: Context, next: Next| -> BoxFuture {
///     Box::pin(async move { next.run(ctx).await })
/// });
/// ```
pub type MiddlewareHandler = Arc<dyn Fn(Context, Next) -> BoxFuture + Send + Sync + 'static>;

/// A composed, immutable chain as stored in the routing table.
pub type Chain = Arc<[MiddlewareHandler]>;

/// A cursor into the remaining chain for a single request.
///
/// `Next` is consumed by [`run`](Self::run), so a step cannot forward the same
/// request twice.
pub struct Next {
    chain: Chain,
    index: usize,
}

impl Next {
    /// Positions a cursor at the start of `chain`.
    pub fn new(chain: Chain) -> Self {
        Self { chain, index: 0 }
    }

    /// Number of steps not yet run, including the one `run` would invoke.
    pub fn remaining(&self) -> usize {
        self.chain.len().saturating_sub(self.index)
    }

    /// Invokes the next step and returns its response.
    ///
    /// A chain that runs out without any step producing a response yields a
    /// `500`; routed chains always end in a terminal step, so this only
    /// happens for hand-built chains.
    pub async fn run(mut self, ctx: Context) -> Response {
        let step = self.chain.get(self.index).cloned();
        match step {
            Some(step) => {
                self.index += 1;
                step(ctx, self).await
            }
            None => HttpException::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "No response generated by middleware pipeline",
            )
            .into_response(),
        }
    }
}

/// The trait for stateful middleware.
///
/// Implementors receive the [`Context`] and a [`Next`] cursor. They may pass
/// through, short-circuit by returning a response without calling `next`, or
/// decorate the downstream response.
///
/// Implementations must be `Send + Sync` since one instance serves every
/// request, and the returned future must not borrow `self`: copy what the
/// future needs before boxing it.
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture;
}

/// Converts a [`Middleware`] into a chain step.
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

/// Converts an async closure `(Context, Next) -> Response` into a chain step.
///
/// ```rust,no_run
/// use routeway::middleware::from_fn;
///
/// let tag = from_fn(|ctx, next| async move {
///     let mut res = next.run(ctx).await;
///     res.add_header("X-Served-By", "routeway");
///     res
/// });
/// ```
pub fn from_fn<F, Fut>(f: F) -> MiddlewareHandler
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(move |ctx: Context, next: Next| -> BoxFuture { Box::pin(f(ctx, next)) })
}

/// A terminal step that ignores the rest of the chain and answers with `f()`.
pub fn respond_with<F>(f: F) -> MiddlewareHandler
where
    F: Fn() -> Response + Send + Sync + 'static,
{
    Arc::new(move |_ctx: Context, _next: Next| -> BoxFuture {
        let response = f();
        Box::pin(async move { response })
    })
}

/// Logs each request's method, path, status, and duration.
///
/// Emits one `tracing::info!` record after the downstream chain completes:
///
/// ```text
/// METHOD /path - STATUS (duration)
/// ```
///
/// Installed automatically when the server runs in debug mode.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().to_string();
            let path = ctx.request().path().to_owned();

            let response = next.run(ctx).await;

            tracing::info!(
                "{} {} - {} ({:?})",
                method,
                path,
                response.status().as_u16(),
                start.elapsed()
            );
            response
        })
    }
}

/// Runs the rest of the chain on its own task so a panicking handler
/// becomes a structured `500` instead of a dropped connection.
///
/// Always the outermost step of every chain built by
/// [`create_server`](crate::create_server). Unwinding drops the downstream
/// futures, so interceptor after-hooks still fire.
pub struct RecoveryMiddleware;

impl Middleware for RecoveryMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture {
        Box::pin(async move {
            let method = ctx.request().method().to_string();
            let path = ctx.request().path().to_owned();

            match tokio::spawn(next.run(ctx)).await {
                Ok(response) => response,
                Err(e) => {
                    if e.is_panic() {
                        tracing::error!(%method, %path, "handler panicked; responding 500");
                    } else {
                        tracing::error!(%method, %path, error = %e, "request task cancelled");
                    }
                    HttpException::from_status(StatusCode::INTERNAL_SERVER_ERROR).into_response()
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Method, Request};
    use std::sync::Mutex;

    fn ctx() -> Context {
        Context::new(Request::new(Method::Get, "/"))
    }

    fn recording(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> MiddlewareHandler {
        let log = Arc::clone(log);
        from_fn(move |ctx, next| {
            log.lock().unwrap().push(name);
            next.run(ctx)
        })
    }

    #[tokio::test]
    async fn steps_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain: Chain = Arc::from(vec![
            recording(&log, "first"),
            recording(&log, "second"),
            respond_with(|| Response::new(StatusCode::OK)),
        ]);

        let res = Next::new(chain).run(ctx()).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn short_circuit_skips_the_rest() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain: Chain = Arc::from(vec![
            respond_with(|| Response::new(StatusCode::FORBIDDEN)),
            recording(&log, "unreachable"),
        ]);

        let res = Next::new(chain).run(ctx()).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn exhausted_chain_is_a_500() {
        let chain: Chain = Arc::from(Vec::<MiddlewareHandler>::new());
        let res = Next::new(chain).run(ctx()).await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn logger_passes_response_through() {
        let chain: Chain = Arc::from(vec![
            from_middleware(Arc::new(LoggerMiddleware)),
            respond_with(|| Response::new(StatusCode::ACCEPTED)),
        ]);
        let res = Next::new(chain).run(ctx()).await;
        assert_eq!(res.status(), StatusCode::ACCEPTED);
    }

    async fn panicking(_ctx: Context, _next: Next) -> Response {
        panic!("boom")
    }

    #[tokio::test]
    async fn recovery_turns_panic_into_500() {
        let chain: Chain = Arc::from(vec![
            from_middleware(Arc::new(RecoveryMiddleware)),
            from_fn(panicking),
        ]);

        let res = Next::new(chain).run(ctx()).await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = serde_json::from_slice(res.body_bytes_ref()).unwrap();
        assert_eq!(body["status"], 500);
        assert_eq!(body["message"], "Internal Server Error");
    }
}
