//! Controllers — groups of routes registered under a common base path.
//!
//! A [`Route`] pairs a method and a relative path with a handler and any
//! route middleware (guards, interceptors, render markers). Routes are built
//! with [`get`], [`post`], [`put`], [`delete`] and [`patch`] and registered
//! in bulk with [`App::controller`]:
//!
//! ```rust,no_run
//! use routeway::{App, Context, get, post};
//!
//! fn users(app: &mut App) {
//!     app.controller("/users", [
//!         get("/", |_ctx| async { serde_json::json!([]) }),
//!         post("/", |ctx: Context| async move { ctx.json::<serde_json::Value>() }),
//!     ]);
//! }
//! ```
//!
//! Each route's chain is fixed at registration: the app's global middleware,
//! then the route's own middleware in declaration order, then the handler
//! behind the response normalizer.

use std::{fmt, sync::Arc};

use tracing::{debug, info, warn};

use crate::{
    Method,
    app::{App, Mode},
    middleware::{Chain, MiddlewareHandler},
    normalize::{BoxedHandler, Handler, Normalizer},
    router::Router,
};

/// One route of a controller: method, path relative to the controller's base
/// path, handler and route middleware.
pub struct Route {
    method: Method,
    path: String,
    handler: BoxedHandler,
    middlewares: Vec<MiddlewareHandler>,
}

impl Route {
    /// A route for any method. Only `GET`, `POST`, `PUT`, `DELETE` and `PATCH`
    /// can be registered; others are skipped with a warning.
    pub fn new(method: Method, path: impl Into<String>, handler: impl Handler) -> Self {
        Self {
            method,
            path: path.into(),
            handler: Arc::new(handler),
            middlewares: Vec::new(),
        }
    }

    /// Appends a route middleware. Middleware runs in the order added, before
    /// the handler.
    #[must_use]
    pub fn with(mut self, step: MiddlewareHandler) -> Self {
        self.middlewares.push(step);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("middlewares", &self.middlewares.len())
            .finish_non_exhaustive()
    }
}

pub fn get(path: impl Into<String>, handler: impl Handler) -> Route {
    Route::new(Method::Get, path, handler)
}

pub fn post(path: impl Into<String>, handler: impl Handler) -> Route {
    Route::new(Method::Post, path, handler)
}

pub fn put(path: impl Into<String>, handler: impl Handler) -> Route {
    Route::new(Method::Put, path, handler)
}

pub fn delete(path: impl Into<String>, handler: impl Handler) -> Route {
    Route::new(Method::Delete, path, handler)
}

pub fn patch(path: impl Into<String>, handler: impl Handler) -> Route {
    Route::new(Method::Patch, path, handler)
}

impl App {
    /// Registers `routes` under `base_path` (itself joined onto the app's path
    /// root), in iteration order.
    ///
    /// A route with a method the router does not support is logged and
    /// skipped; the remaining routes are still registered.
    pub fn controller(
        &mut self,
        base_path: &str,
        routes: impl IntoIterator<Item = Route>,
    ) -> &mut Self {
        let group = join_paths(&self.path_root, base_path);
        for route in routes {
            self.register(&group, route);
        }
        self
    }

    fn register(&mut self, group: &str, route: Route) {
        let Route {
            method,
            path,
            handler,
            middlewares,
        } = route;
        let full_path = join_paths(group, &path);

        let add: fn(&mut Router, &str, Chain) = match method {
            Method::Get => Router::get,
            Method::Post => Router::post,
            Method::Put => Router::put,
            Method::Delete => Router::delete,
            Method::Patch => Router::patch,
            _ => {
                warn!(%method, path = %full_path, "unsupported HTTP method; route skipped");
                return;
            }
        };

        let terminal = Normalizer::new(handler, self.render.clone()).into_step();
        let chain: Chain = self
            .global
            .iter()
            .cloned()
            .chain(middlewares)
            .chain([terminal])
            .collect();
        add(&mut self.router, &full_path, chain);

        match self.mode {
            Mode::Debug => info!(%method, path = %full_path, "route mapped"),
            Mode::Release => debug!(%method, path = %full_path, "route mapped"),
        }
    }
}

/// Joins two path fragments with exactly one `/` between segments and a
/// leading `/`. A trailing `/` on `path` is kept.
pub(crate) fn join_paths(base: &str, path: &str) -> String {
    let mut joined = String::with_capacity(base.len() + path.len() + 1);
    for segment in base.split('/').chain(path.split('/')).filter(|s| !s.is_empty()) {
        joined.push('/');
        joined.push_str(segment);
    }
    if joined.is_empty() || path.ends_with('/') {
        joined.push('/');
    }
    joined
}
