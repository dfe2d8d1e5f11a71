//! Guards — boolean predicates that decide whether a request may proceed.
//!
//! A guard sees the request [`Context`] and answers yes or no. On "no" the
//! chain stops right there: nothing downstream (other middleware, the
//! handler) runs and the client receives the denial, `403
//! {"status":403,"message":"Forbidden"}` unless configured otherwise.
//!
//! ```rust,no_run
//! use routeway::{Context, get, guard::use_guard};
//!
//! let route = get("/protected", |_ctx| async { "secret" })
//!     .with(use_guard(|ctx: &Context| ctx.header("Authorization").is_some()));
//! ```

use std::sync::Arc;

use crate::{
    context::Context,
    exception::HttpException,
    http::StatusCode,
    middleware::{BoxFuture, Middleware, MiddlewareHandler, Next, from_middleware},
};

/// A synchronous access check.
pub trait Guard: Send + Sync + 'static {
    fn can_activate(&self, ctx: &Context) -> bool;
}

impl<F> Guard for F
where
    F: Fn(&Context) -> bool + Send + Sync + 'static,
{
    fn can_activate(&self, ctx: &Context) -> bool {
        self(ctx)
    }
}

/// Chain step that evaluates a [`Guard`] and short-circuits on denial.
pub struct GuardMiddleware<G> {
    guard: G,
    denial: HttpException,
}

impl<G: Guard> GuardMiddleware<G> {
    pub fn new(guard: G) -> Self {
        Self {
            guard,
            denial: HttpException::from_status(StatusCode::FORBIDDEN),
        }
    }

    /// Answers denied requests with `denial` instead of `403 Forbidden`.
    #[must_use]
    pub fn deny_with(mut self, denial: HttpException) -> Self {
        self.denial = denial;
        self
    }

    pub fn into_step(self) -> MiddlewareHandler {
        from_middleware(Arc::new(self))
    }
}

impl<G: Guard> Middleware for GuardMiddleware<G> {
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture {
        if self.guard.can_activate(&ctx) {
            return Box::pin(next.run(ctx));
        }

        tracing::debug!(
            method = %ctx.request().method(),
            path = ctx.request().path(),
            status = self.denial.status().as_u16(),
            "guard denied request"
        );
        let response = self.denial.clone().into_response();
        Box::pin(async move { response })
    }
}

/// Wraps `guard` as a chain step with the default `403` denial.
pub fn use_guard(guard: impl Guard) -> MiddlewareHandler {
    GuardMiddleware::new(guard).into_step()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Method, Request, Response,
        middleware::{Chain, from_fn},
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_handler(calls: &Arc<AtomicUsize>) -> MiddlewareHandler {
        let calls = Arc::clone(calls);
        from_fn(move |_ctx, _next| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Response::new(StatusCode::OK) }
        })
    }

    async fn run(chain: Vec<MiddlewareHandler>, request: Request) -> Response {
        let chain: Chain = Arc::from(chain);
        Next::new(chain).run(Context::new(request)).await
    }

    #[tokio::test]
    async fn denial_never_reaches_the_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let res = run(
            vec![use_guard(|_: &Context| false), counting_handler(&calls)],
            Request::new(Method::Get, "/"),
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert_eq!(res.body_text(), r#"{"status":403,"message":"Forbidden"}"#);
    }

    #[tokio::test]
    async fn approval_runs_the_handler_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let res = run(
            vec![use_guard(|_: &Context| true), counting_handler(&calls)],
            Request::new(Method::Get, "/"),
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn guard_reads_headers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = || {
            vec![
                use_guard(|ctx: &Context| ctx.header("authorization").is_some()),
                counting_handler(&calls),
            ]
        };

        let denied = run(chain(), Request::new(Method::Get, "/")).await;
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);

        let allowed = run(
            chain(),
            Request::new(Method::Get, "/").with_header("Authorization", "Bearer t"),
        )
        .await;
        assert_eq!(allowed.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    struct Never;

    impl Guard for Never {
        fn can_activate(&self, _ctx: &Context) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn custom_denial() {
        let step = GuardMiddleware::new(Never)
            .deny_with(HttpException::unauthorized("token required"))
            .into_step();
        let calls = Arc::new(AtomicUsize::new(0));
        let res = run(vec![step, counting_handler(&calls)], Request::new(Method::Get, "/")).await;

        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(res.body_text(), r#"{"status":401,"message":"token required"}"#);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
