//! Bootstrap configuration.
//!
//! [`ServerConfig`] is the builder handed to
//! [`create_server`](crate::create_server). Its plain settings also exist as
//! the serde-deserializable [`Settings`], so they can come from a JSON file.

use std::{fmt, fs, path::Path};

use serde::Deserialize;
use thiserror::Error;

use super::App;
use crate::middleware::MiddlewareHandler;

/// A controller callback: registers routes on the app under construction.
pub type ControllerFn = Box<dyn FnOnce(&mut App)>;

/// Errors raised while loading [`Settings`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings: {0}")]
    Parse(#[from] serde_json::Error),
}

/// The plain-data part of the bootstrap configuration.
///
/// Every field is optional in JSON; missing fields take the defaults below.
///
/// ```
/// use routeway::Settings;
///
/// let settings = Settings::from_json(r#"{"debug_logger": true, "path_root": "/api"}"#).unwrap();
/// assert!(settings.debug_logger);
/// assert_eq!(settings.path_root, "/api");
/// assert_eq!(settings.base_view_dir, "");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Debug mode: per-request log lines and `info`-level route mapping.
    pub debug_logger: bool,
    /// Prefix for every controller's base path. Default `"/"`.
    pub path_root: String,
    /// View pattern to load, e.g. `"views/*"`. Empty means no views.
    pub base_view_dir: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug_logger: false,
            path_root: "/".to_owned(),
            base_view_dir: String::new(),
        }
    }
}

impl Settings {
    /// Parses settings from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON or mistyped fields.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON settings file.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::Io`] — the file cannot be read.
    /// - [`ConfigError::Parse`] — the contents are not valid settings.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }
}

/// Builder for [`create_server`](crate::create_server).
///
/// Controllers and middleware are applied in the order they are added.
///
/// ```rust,no_run
/// use routeway::{ServerConfig, get, middleware::from_fn};
///
/// let config = ServerConfig::new()
///     .debug_logger(true)
///     .path_root("/api")
///     .middleware("powered-by", from_fn(|ctx, next| async move {
///         let mut res = next.run(ctx).await;
///         res.add_header("X-Powered-By", "routeway");
///         res
///     }))
///     .controller(|app| {
///         app.controller("/", [get("/hello", |_ctx| async { "Hello World" })]);
///     });
/// ```
#[derive(Default)]
pub struct ServerConfig {
    controllers: Vec<ControllerFn>,
    middlewares: Vec<(String, MiddlewareHandler)>,
    settings: Settings,
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a controller callback, run once during bootstrap.
    #[must_use]
    pub fn controller(mut self, controller: impl FnOnce(&mut App) + 'static) -> Self {
        self.controllers.push(Box::new(controller));
        self
    }

    /// Adds a global middleware. `name` is used for logging only.
    #[must_use]
    pub fn middleware(mut self, name: impl Into<String>, step: MiddlewareHandler) -> Self {
        self.middlewares.push((name.into(), step));
        self
    }

    #[must_use]
    pub fn debug_logger(mut self, enabled: bool) -> Self {
        self.settings.debug_logger = enabled;
        self
    }

    #[must_use]
    pub fn path_root(mut self, root: impl Into<String>) -> Self {
        self.settings.path_root = root.into();
        self
    }

    #[must_use]
    pub fn base_view_dir(mut self, pattern: impl Into<String>) -> Self {
        self.settings.base_view_dir = pattern.into();
        self
    }

    /// Replaces all plain settings at once.
    #[must_use]
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub(crate) fn into_parts(self) -> (Vec<ControllerFn>, Vec<(String, MiddlewareHandler)>, Settings) {
        (self.controllers, self.middlewares, self.settings)
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("controllers", &self.controllers.len())
            .field(
                "middlewares",
                &self.middlewares.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .field("settings", &self.settings)
            .finish()
    }
}
