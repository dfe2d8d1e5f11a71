//! The application: routing table, global middleware and view state, plus
//! the bootstrap that assembles them.
//!
//! An [`App`] is built once by [`create_server`], mutated only while
//! controllers register their routes, and then moved into the
//! [`Server`](crate::server::Server), which shares it read-only across
//! connections.

mod config;

pub use config::{ConfigError, ControllerFn, ServerConfig, Settings};

use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    Request, Response,
    exception::status_response,
    http::StatusCode,
    middleware::{Chain, LoggerMiddleware, MiddlewareHandler, RecoveryMiddleware, from_middleware, respond_with},
    router::Router,
    server::{Server, ServerError},
    view::{DEFAULT_VIEW_DIR, RenderState, TemplateDir, ViewEngine, ViewError},
};

/// Logging verbosity of an [`App`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Logs every request and announces each mapped route at `info`.
    Debug,
    #[default]
    Release,
}

/// Routing table plus everything route registration needs.
pub struct App {
    pub(crate) router: Router,
    pub(crate) global: Vec<MiddlewareHandler>,
    pub(crate) path_root: String,
    pub(crate) render: RenderState,
    pub(crate) mode: Mode,
    base_view_dir: String,
}

impl App {
    /// An empty app. The panic-recovery step is always the first global
    /// middleware; in [`Mode::Debug`] the request logger follows it.
    pub fn new(mode: Mode) -> Self {
        let mut global = vec![from_middleware(Arc::new(RecoveryMiddleware))];
        if mode == Mode::Debug {
            global.push(from_middleware(Arc::new(LoggerMiddleware)));
        }

        Self {
            router: Router::new(),
            global,
            path_root: "/".to_owned(),
            render: RenderState::new(),
            mode,
            base_view_dir: DEFAULT_VIEW_DIR.to_owned(),
        }
    }

    /// Appends a global middleware.
    ///
    /// Chains are composed when a route is registered, so a global middleware
    /// applies to the routes (and fallbacks) registered after it.
    pub fn use_middleware(&mut self, name: &str, step: MiddlewareHandler) -> &mut Self {
        info!(middleware = name, "middleware applied");
        self.global.push(step);
        self
    }

    /// Sets the prefix joined in front of every controller base path.
    pub fn set_path_root(&mut self, root: &str) -> &mut Self {
        self.path_root = root.to_owned();
        self
    }

    /// Loads the templates matching `pattern` and enables rendering.
    ///
    /// # Errors
    ///
    /// Propagates the [`ViewError`] from [`TemplateDir::load`]; rendering
    /// stays disabled.
    pub fn load_views(&mut self, pattern: &str) -> Result<(), ViewError> {
        let views = TemplateDir::load(pattern)?;
        let count = views.len();
        if self.render.enable(views) {
            self.base_view_dir = pattern.to_owned();
            info!(pattern, count, "views loaded");
        } else {
            warn!(pattern, "a view engine is already installed; ignoring");
        }
        Ok(())
    }

    /// Enables rendering with a custom engine. Returns `false` if rendering
    /// was already enabled.
    pub fn use_view_engine(&mut self, engine: impl ViewEngine) -> bool {
        self.render.enable(engine)
    }

    /// Replaces the router's fallbacks with the structured
    /// `{"status":404,"message":"Not Found"}` and
    /// `{"status":405,"message":"Method Not Allowed"}` responses, run through
    /// the global middleware.
    pub fn install_fallbacks(&mut self) {
        let no_route = self.fallback_chain(StatusCode::NOT_FOUND);
        let no_method = self.fallback_chain(StatusCode::METHOD_NOT_ALLOWED);
        self.router.no_route(no_route);
        self.router.no_method(no_method);
    }

    fn fallback_chain(&self, status: StatusCode) -> Chain {
        let answer = respond_with(move || status_response(status, status.canonical_reason()));
        self.global.iter().cloned().chain([answer]).collect()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn path_root(&self) -> &str {
        &self.path_root
    }

    /// The loaded view pattern, or `"views/*"` while none is loaded.
    pub fn base_view_dir(&self) -> &str {
        &self.base_view_dir
    }

    pub fn is_render_enabled(&self) -> bool {
        self.render.is_enabled()
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Runs one request through the routing table.
    pub async fn handle(&self, request: Request) -> Response {
        self.router.route(request).await
    }

    /// Binds `addr` and serves until Ctrl-C or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] if binding or the listener fails.
    pub async fn serve(self, addr: &str) -> Result<(), ServerError> {
        Server::bind(addr).await?.serve(self).await
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new(Mode::default())
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("routes", &self.router.len())
            .field("global", &self.global.len())
            .field("path_root", &self.path_root)
            .field("base_view_dir", &self.base_view_dir)
            .field("render", &self.render)
            .field("mode", &self.mode)
            .finish()
    }
}

/// Builds an [`App`] from `config`:
///
/// 1. debug mode if `debug_logger` is set;
/// 2. recovery (and, in debug mode, the request logger) as the first global
///    middleware, then the configured middleware in order;
/// 3. `path_root`, unless empty or `"/"`;
/// 4. every controller callback in order;
/// 5. the view set from `base_view_dir`, unless empty or `"/"`; a load
///    failure is logged and leaves rendering disabled;
/// 6. the structured `404`/`405` fallbacks.
///
/// The caller starts listening with [`App::serve`] or
/// [`Server::serve`](crate::server::Server::serve).
pub fn create_server(config: ServerConfig) -> App {
    let (controllers, middlewares, settings) = config.into_parts();

    let mode = if settings.debug_logger {
        Mode::Debug
    } else {
        Mode::Release
    };
    let mut app = App::new(mode);

    for (name, step) in middlewares {
        app.use_middleware(&name, step);
    }

    if is_set(&settings.path_root) {
        app.set_path_root(&settings.path_root);
    }

    for controller in controllers {
        controller(&mut app);
    }

    if is_set(&settings.base_view_dir) {
        if let Err(e) = app.load_views(&settings.base_view_dir) {
            warn!(pattern = %settings.base_view_dir, error = %e, "failed to load views; rendering disabled");
        }
    }

    app.install_fallbacks();
    app
}

fn is_set(value: &str) -> bool {
    !value.is_empty() && value != "/"
}
