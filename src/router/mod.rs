//! Request routing — map URL patterns and HTTP methods to composed chains.
//!
//! This module provides [`Router`], which dispatches incoming HTTP requests to the
//! [`Chain`] registered for the request method and URL path. Three pattern styles are
//! supported:
//!
//! | Pattern              | Example match              | Captured params              |
//! |----------------------|----------------------------|------------------------------|
//! | `/users`             | `/users`                   | *(none)*                     |
//! | `/users/:id`         | `/users/42`                | `id → "42"`                  |
//! | `/files/*`           | `/files/docs/readme.txt`   | `wildcard → "/docs/readme.txt"` |
//!
//! Trailing slashes are normalized on both patterns and incoming paths, so `/users/` and
//! `/users` are treated as equivalent.
//!
//! Routes are matched in registration order; the first route whose method and pattern both
//! match the incoming request wins. A request whose path matches some route but whose
//! method matches none goes to the *no-method* chain (with an `Allow` header); anything
//! else goes to the *no-route* chain.

use std::sync::Arc;

use crate::context::{Context, PathParams};
use crate::exception::status_response;
use crate::middleware::{Chain, Next, respond_with};
use crate::{Method, Request, Response, StatusCode};

// A single path segment, either a literal string or a named capture (`:name`).
#[derive(Debug, Clone)]
enum Segment {
    Static(String),
    Parameter(String),
}

// Compiled representation of a route pattern string.
#[derive(Debug, Clone)]
enum Pattern {
    // Matches one exact path string, e.g. `/users`.
    Exact(String),
    // Matches a fixed number of segments where some may be named captures, e.g. `/users/:id`.
    Parameterized { segments: Vec<Segment> },
    // Matches any path that starts with the given prefix, e.g. `/files/*`.
    Wildcard(String),
}

impl Pattern {
    /// Parse a route pattern string into a `Pattern`.
    ///
    /// The pattern is classified as follows (checked in order):
    ///
    /// 1. Ends with `/*` → [`Pattern::Wildcard`] — matches any path sharing the prefix.
    /// 2. Contains `:` → [`Pattern::Parameterized`] — one or more named captures.
    /// 3. Otherwise → [`Pattern::Exact`] — literal path match.
    ///
    /// A trailing slash (other than on the root `/`) is stripped before classification so
    /// that `/users/` and `/users` compile to identical patterns.
    fn parse(pattern: &str) -> Self {
        let pattern = trim_trailing_slash(pattern);

        if let Some(prefix) = pattern.strip_suffix("/*") {
            return Pattern::Wildcard(prefix.to_string());
        }

        if pattern.contains(':') {
            let segments = pattern
                .split('/')
                .filter(|s| !s.is_empty())
                .map(|s| match s.strip_prefix(':') {
                    Some(p) => Segment::Parameter(p.to_string()),
                    None => Segment::Static(s.to_string()),
                })
                .collect();

            return Pattern::Parameterized { segments };
        }

        Pattern::Exact(pattern.to_string())
    }

    // Try to match `path` against this pattern, returning extracted [`PathParams`] on success.
    fn matches(&self, path: &str) -> Option<PathParams> {
        let path = trim_trailing_slash(path);

        match self {
            Pattern::Exact(p) => (p == path).then(PathParams::new),
            Pattern::Parameterized { segments } => {
                let mut params = PathParams::new();
                let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

                if segments.len() != path_segments.len() {
                    return None;
                }

                for (seg, path_seg) in segments.iter().zip(path_segments) {
                    match seg {
                        Segment::Static(s) if s != path_seg => return None,
                        Segment::Static(_) => {}
                        Segment::Parameter(name) => {
                            params.insert(name.clone(), path_seg.to_string());
                        }
                    }
                }

                Some(params)
            }
            Pattern::Wildcard(prefix) => {
                let suffix = path.strip_prefix(prefix.as_str())?;
                // The prefix must end on a segment boundary.
                if !suffix.is_empty() && !suffix.starts_with('/') {
                    return None;
                }
                let mut params = PathParams::new();
                params.insert("wildcard".to_string(), suffix.to_string());
                Some(params)
            }
        }
    }
}

fn trim_trailing_slash(path: &str) -> &str {
    if path != "/" && path.ends_with('/') {
        &path[..path.len() - 1]
    } else {
        path
    }
}

// A registered route: method + compiled pattern bound to its composed chain.
struct Entry {
    method: Method,
    path: String,
    pattern: Pattern,
    chain: Chain,
}

/// Routing table mapping `(method, pattern)` to a composed [`Chain`].
///
/// Routes are evaluated in registration order; registering the same method and
/// pattern twice keeps both entries, and the first one answers. When no route
/// matches, the no-route chain answers (`404` by default); when only the method
/// is wrong, the no-method chain answers (`405` by default).
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use routeway::{Response, StatusCode, middleware::respond_with, router::Router};
///
/// let mut router = Router::new();
/// router.get("/ping", Arc::from(vec![respond_with(|| Response::new(StatusCode::OK))]));
/// assert_eq!(router.len(), 1);
/// ```
pub struct Router {
    routes: Vec<Entry>,
    no_route: Chain,
    no_method: Chain,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Create a new, empty `Router` with the plain `404`/`405` fallbacks.
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            no_route: fallback(StatusCode::NOT_FOUND),
            no_method: fallback(StatusCode::METHOD_NOT_ALLOWED),
        }
    }

    /// Register `chain` for `GET` requests matching `path`.
    pub fn get(&mut self, path: &str, chain: Chain) {
        self.add_route(Method::Get, path, chain);
    }

    /// Register `chain` for `POST` requests matching `path`.
    pub fn post(&mut self, path: &str, chain: Chain) {
        self.add_route(Method::Post, path, chain);
    }

    /// Register `chain` for `PUT` requests matching `path`.
    pub fn put(&mut self, path: &str, chain: Chain) {
        self.add_route(Method::Put, path, chain);
    }

    /// Register `chain` for `DELETE` requests matching `path`.
    pub fn delete(&mut self, path: &str, chain: Chain) {
        self.add_route(Method::Delete, path, chain);
    }

    /// Register `chain` for `PATCH` requests matching `path`.
    pub fn patch(&mut self, path: &str, chain: Chain) {
        self.add_route(Method::Patch, path, chain);
    }

    fn add_route(&mut self, method: Method, path: &str, chain: Chain) {
        self.routes.push(Entry {
            method,
            path: path.to_owned(),
            pattern: Pattern::parse(path),
            chain,
        });
    }

    /// Replace the chain answering requests that match no route.
    pub fn no_route(&mut self, chain: Chain) {
        self.no_route = chain;
    }

    /// Replace the chain answering requests whose path matches but whose
    /// method does not.
    pub fn no_method(&mut self, chain: Chain) {
        self.no_method = chain;
    }

    /// Return the number of routes registered in this router.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Return `true` if no routes have been registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// The registered `(method, path)` pairs in registration order.
    pub fn routes(&self) -> impl Iterator<Item = (&Method, &str)> {
        self.routes.iter().map(|e| (&e.method, e.path.as_str()))
    }

    /// Dispatch `request` through the first matching chain and return its response.
    ///
    /// Routes are tested in registration order. The first route whose HTTP method and path
    /// pattern both match wins. Otherwise the no-method chain answers if any route matched
    /// the path alone (adding an `Allow` header listing the methods that would have
    /// matched), and the no-route chain answers if none did.
    pub async fn route(&self, request: Request) -> Response {
        let mut allowed: Vec<&Method> = Vec::new();

        for entry in &self.routes {
            let Some(params) = entry.pattern.matches(request.path()) else {
                continue;
            };
            if &entry.method == request.method() {
                let ctx = Context::with_params(request, params);
                return Next::new(Arc::clone(&entry.chain)).run(ctx).await;
            }
            if !allowed.contains(&&entry.method) {
                allowed.push(&entry.method);
            }
        }

        if allowed.is_empty() {
            return Next::new(Arc::clone(&self.no_route))
                .run(Context::new(request))
                .await;
        }

        let allow = allowed
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let mut response = Next::new(Arc::clone(&self.no_method))
            .run(Context::new(request))
            .await;
        response.add_header("Allow", allow);
        response
    }
}

fn fallback(status: StatusCode) -> Chain {
    Arc::from(vec![respond_with(move || {
        status_response(status, status.canonical_reason())
    })])
}
