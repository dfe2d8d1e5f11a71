//! The response normalizer — the terminal step of every routed chain.
//!
//! It runs the route's handler and turns the [`Reply`] into a [`Response`].
//! The checks form a strict priority chain; the first that applies wins:
//!
//! The handler runs first; the render marker is read once it has returned, so
//! a handler may choose its own view with [`Context::render`].
//!
//! 1. the request carries a [`RenderView`] marker — render it (`200`, HTML),
//!    or answer `404 {"status":404,"message":"Cannot find view: <name>"}` when
//!    no view set is loaded or the view is not in it;
//! 2. the reply is an [`HttpException`] — `{status, message}` with its status;
//! 3. the reply is a JSON object with an integer `status` (a final code in
//!    `200..=599` other than `204`/`304`) and a string `message` —
//!    `{status, message}` with that status;
//! 4. anything else — the JSON value verbatim with `200`.

use std::{future::Future, pin::Pin, sync::Arc};

use serde_json::Value;

use crate::{
    context::Context,
    exception::{HttpException, status_response},
    http::{Response, StatusCode},
    middleware::{BoxFuture, Middleware, MiddlewareHandler, Next, from_middleware},
    reply::{IntoReply, Reply},
    view::{RenderState, RenderView},
};

/// Boxed future resolving to a handler's [`Reply`].
pub type ReplyFuture = Pin<Box<dyn Future<Output = Reply> + Send>>;

/// A route handler: an async function from [`Context`] to anything that
/// implements [`IntoReply`].
///
/// Implemented automatically for every
/// `Fn(Context) -> impl Future<Output = impl IntoReply>` that is
/// `Send + Sync + 'static`:
///
/// ```rust,no_run
/// use routeway::{Context, HttpException};
///
/// async fn hello(_ctx: Context) -> &'static str {
///     "Hello World"
/// }
///
/// async fn user(ctx: Context) -> Result<String, HttpException> {
///     let id = ctx.param("id").ok_or_else(|| HttpException::bad_request("missing id"))?;
///     Ok(format!("user {id}"))
/// }
/// ```
pub trait Handler: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> ReplyFuture;
}

impl<T, F, R> Handler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = R> + Send + 'static,
    R: IntoReply + 'static,
{
    fn call(&self, ctx: Context) -> ReplyFuture {
        let fut = (self)(ctx);
        Box::pin(async move { fut.await.into_reply() })
    }
}

/// Shared, type-erased handler as stored on a route.
pub type BoxedHandler = Arc<dyn Handler>;

/// Wraps a handler as the terminal step of a chain.
///
/// `render` is consulted per request, so views loaded after the route was
/// registered are picked up.
pub struct Normalizer {
    handler: BoxedHandler,
    render: RenderState,
}

impl Normalizer {
    pub fn new(handler: BoxedHandler, render: RenderState) -> Self {
        Self { handler, render }
    }

    pub fn into_step(self) -> MiddlewareHandler {
        from_middleware(Arc::new(self))
    }
}

impl Middleware for Normalizer {
    fn handle(&self, ctx: Context, _next: Next) -> BoxFuture {
        let slot = ctx.render_slot().clone();
        let reply = self.handler.call(ctx);
        let render = self.render.clone();

        Box::pin(async move {
            let reply = reply.await;
            let view = slot.take();
            normalize(reply, view.as_ref(), &render)
        })
    }
}

/// Maps a reply (and the request's render marker, if any) to a response.
pub fn normalize(reply: Reply, view: Option<&RenderView>, render: &RenderState) -> Response {
    if let Some(RenderView(name)) = view {
        return render_view(name, &reply, render);
    }

    match reply {
        Reply::Exception(e) => e.into_response(),
        Reply::Json(value) => match status_message(&value) {
            Some((status, message)) => status_response(status, message),
            None => Response::json(StatusCode::OK, &value),
        },
    }
}

fn render_view(name: &str, reply: &Reply, render: &RenderState) -> Response {
    let Some(engine) = render.engine() else {
        return view_not_found(name);
    };

    match engine.render(name, &reply.to_value()) {
        Ok(html) => Response::html(StatusCode::OK, html),
        Err(e) => {
            tracing::warn!(view = name, error = %e, "view render failed");
            view_not_found(name)
        }
    }
}

fn view_not_found(name: &str) -> Response {
    HttpException::not_found(format!("Cannot find view: {name}")).into_response()
}

/// Recognizes `{"status": <int>, "message": <string>, ..}`. Only final
/// statuses that may carry a body count: `200..=599` except `204` and `304`.
fn status_message(value: &Value) -> Option<(StatusCode, &str)> {
    let map = value.as_object()?;
    let status = map.get("status")?.as_u64()?;
    let message = map.get("message")?.as_str()?;
    let status = u16::try_from(status).ok()?;
    if !(200..=599).contains(&status) || matches!(status, 204 | 304) {
        return None;
    }
    Some((StatusCode::from_u16(status)?, message))
}
