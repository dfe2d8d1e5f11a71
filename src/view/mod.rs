//! Views — the render side channel and the engine it talks to.
//!
//! A route opts into rendering with the [`render`] step, which stores a
//! [`RenderView`] marker in the request's [`RenderSlot`]. A handler may also
//! choose a view itself with [`Context::render`]. Once the handler has
//! returned, the normalizer takes the marker out and, if a view set is loaded
//! ([`RenderState`]), renders the named view with the handler's reply as data.
//!
//! The engine is a trait ([`ViewEngine`]). [`TemplateDir`] is the built-in
//! one: it loads every file matching a pattern such as `views/*` or
//! `templates/*.tmpl` and substitutes `{{ .key }}` placeholders from the data.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, OnceLock, PoisonError},
};

use serde_json::Value;
use thiserror::Error;

use crate::{
    context::Context,
    middleware::{MiddlewareHandler, Next, from_fn},
};

/// Default view pattern reported until a view set has been loaded.
pub const DEFAULT_VIEW_DIR: &str = "views/*";

/// Errors raised while loading or rendering views.
#[derive(Debug, Error)]
pub enum ViewError {
    #[error("failed to read views from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("view pattern `{pattern}` matches no files")]
    NoMatch { pattern: String },

    #[error("view `{name}` is not loaded")]
    NotFound { name: String },
}

/// Renders a named view with JSON data.
pub trait ViewEngine: Send + Sync + 'static {
    fn render(&self, name: &str, data: &Value) -> Result<String, ViewError>;
}

/// Marker placed on a request by [`render`]: the view chosen for this request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderView(pub String);

/// The request's render marker, shared by every clone.
///
/// The context handed down the chain and the normalizer hold the same slot,
/// so a marker set anywhere before the handler returns is seen by the
/// normalizer even though the handler consumed the context.
#[derive(Debug, Clone, Default)]
pub struct RenderSlot {
    view: Arc<Mutex<Option<RenderView>>>,
}

impl RenderSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `view`, returning the marker it replaced.
    pub fn set(&self, view: RenderView) -> Option<RenderView> {
        self.lock().replace(view)
    }

    pub fn get(&self) -> Option<RenderView> {
        self.lock().clone()
    }

    /// Takes the marker out; later calls see `None`.
    pub fn take(&self) -> Option<RenderView> {
        self.lock().take()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<RenderView>> {
        self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A chain step that marks the request for rendering with `view`.
///
/// ```rust,no_run
/// use routeway::{get, view::render};
///
/// let route = get("/hello", |_ctx| async { serde_json::json!({"message": "Hello World"}) })
///     .with(render("index.tmpl"));
/// ```
pub fn render(view: impl Into<String>) -> MiddlewareHandler {
    let marker = RenderView(view.into());
    from_fn(move |ctx: Context, next: Next| {
        ctx.render_slot().set(marker.clone());
        next.run(ctx)
    })
}

/// The write-once slot holding the loaded view engine.
///
/// Cloned into every normalizer at registration time and filled (at most
/// once) afterwards, when the view set is loaded. Rendering is enabled exactly
/// when the slot is filled.
#[derive(Clone, Default)]
pub struct RenderState {
    engine: Arc<OnceLock<Box<dyn ViewEngine>>>,
}

impl RenderState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `engine`. Returns `false` (and drops `engine`) if one is
    /// already installed.
    pub fn enable(&self, engine: impl ViewEngine) -> bool {
        self.engine.set(Box::new(engine)).is_ok()
    }

    pub fn is_enabled(&self) -> bool {
        self.engine.get().is_some()
    }

    pub fn engine(&self) -> Option<&dyn ViewEngine> {
        self.engine.get().map(|engine| engine.as_ref())
    }
}

impl std::fmt::Debug for RenderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderState")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Templates loaded from the files matching a pattern, keyed by file name.
#[derive(Debug, Clone, Default)]
pub struct TemplateDir {
    templates: HashMap<String, String>,
}

impl TemplateDir {
    /// Loads every regular file matching `pattern`.
    ///
    /// The pattern is a directory followed by a file-name glob where `*`
    /// matches any run of characters and `?` any single character, e.g.
    /// `views/*` or `site/templates/*.html`. Only the last path component may
    /// contain wildcards.
    ///
    /// # Errors
    ///
    /// - [`ViewError::Io`] — the directory or a matching file cannot be read.
    /// - [`ViewError::NoMatch`] — nothing matched.
    pub fn load(pattern: &str) -> Result<Self, ViewError> {
        let pattern_path = Path::new(pattern);
        let file_glob = pattern_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("*");
        let dir = match pattern_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| ViewError::Io { path, source }
        };

        let mut templates = HashMap::new();
        for entry in fs::read_dir(&dir).map_err(io_err(&dir))? {
            let entry = entry.map_err(io_err(&dir))?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !path.is_file() || !wildcard_match(file_glob, name) {
                continue;
            }
            let source = fs::read_to_string(&path).map_err(io_err(&path))?;
            templates.insert(name.to_owned(), source);
        }

        if templates.is_empty() {
            return Err(ViewError::NoMatch {
                pattern: pattern.to_owned(),
            });
        }

        tracing::debug!(pattern, count = templates.len(), "loaded view templates");
        Ok(Self { templates })
    }

    /// Registers a template from a string.
    #[must_use]
    pub fn with_template(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.templates.insert(name.into(), source.into());
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl ViewEngine for TemplateDir {
    fn render(&self, name: &str, data: &Value) -> Result<String, ViewError> {
        let source = self.templates.get(name).ok_or_else(|| ViewError::NotFound {
            name: name.to_owned(),
        })?;
        Ok(substitute(source, data))
    }
}

/// Replaces each `{{ .a.b }}` (or `{{ a.b }}`, or `{{ . }}` for the whole
/// value) with the looked-up data. Strings are inserted raw, other values as
/// JSON, missing keys as nothing. An unterminated `{{` is copied through.
fn substitute(source: &str, data: &Value) -> String {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };

        let key = after[..end].trim();
        match lookup(data, key) {
            Some(Value::String(s)) => out.push_str(s),
            Some(Value::Null) | None => {}
            Some(other) => out.push_str(&other.to_string()),
        }
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    out
}

fn lookup<'a>(data: &'a Value, key: &str) -> Option<&'a Value> {
    let key = key.strip_prefix('.').unwrap_or(key);
    if key.is_empty() {
        return Some(data);
    }
    key.split('.').try_fold(data, |value, segment| match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => items.get(segment.parse::<usize>().ok()?),
        _ => None,
    })
}

fn wildcard_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();

    // Greedy match with single-star backtracking.
    let (mut p, mut n) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while n < name.len() {
        match pattern.get(p) {
            Some('*') => {
                star = Some((p, n));
                p += 1;
            }
            Some(&c) if c == '?' || c == name[n] => {
                p += 1;
                n += 1;
            }
            _ => match star {
                Some((sp, sn)) => {
                    p = sp + 1;
                    n = sn + 1;
                    star = Some((sp, sn + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wildcards() {
        assert!(wildcard_match("*", "index.tmpl"));
        assert!(wildcard_match("*.tmpl", "index.tmpl"));
        assert!(!wildcard_match("*.tmpl", "index.html"));
        assert!(wildcard_match("page-?.html", "page-1.html"));
        assert!(wildcard_match("a*b*c", "axxbyyc"));
        assert!(!wildcard_match("a*b*c", "axxbyy"));
    }

    #[test]
    fn substitutes_dotted_keys() {
        let data = json!({"message": "Hello", "user": {"id": 7, "tags": ["a", "b"]}});
        let out = substitute(
            "<h1>{{ .message }}</h1><p>{{ user.id }} {{ .user.tags.1 }} {{ .missing }}</p>",
            &data,
        );
        assert_eq!(out, "<h1>Hello</h1><p>7 b </p>");
    }

    #[test]
    fn unterminated_placeholder_is_kept() {
        assert_eq!(substitute("a {{ .x", &json!({"x": 1})), "a {{ .x");
    }

    #[test]
    fn whole_value_placeholder() {
        assert_eq!(substitute("[{{ . }}]", &json!("Hello World")), "[Hello World]");
    }

    #[test]
    fn load_matches_pattern_by_file_name() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.tmpl"), "<p>{{ .message }}</p>").unwrap();
        fs::write(dir.path().join("notes.txt"), "skip me").unwrap();
        fs::create_dir(dir.path().join("nested.tmpl")).unwrap();

        let pattern = format!("{}/*.tmpl", dir.path().display());
        let views = TemplateDir::load(&pattern).unwrap();
        assert_eq!(views.len(), 1);
        assert!(views.contains("index.tmpl"));

        let html = views.render("index.tmpl", &json!({"message": "hi"})).unwrap();
        assert_eq!(html, "<p>hi</p>");
    }

    #[test]
    fn load_without_matches_fails() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = format!("{}/*", dir.path().display());
        assert!(matches!(
            TemplateDir::load(&pattern),
            Err(ViewError::NoMatch { .. })
        ));
    }

    #[test]
    fn load_missing_dir_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = format!("{}/absent/*", dir.path().display());
        assert!(matches!(TemplateDir::load(&pattern), Err(ViewError::Io { .. })));
    }

    #[test]
    fn unknown_view_is_not_found() {
        let views = TemplateDir::default().with_template("a", "x");
        assert!(matches!(
            views.render("b", &Value::Null),
            Err(ViewError::NotFound { name }) if name == "b"
        ));
    }

    #[test]
    fn render_state_is_write_once() {
        let state = RenderState::new();
        assert!(!state.is_enabled());
        assert!(state.enable(TemplateDir::default().with_template("a", "1")));
        assert!(!state.enable(TemplateDir::default()));
        assert!(state.is_enabled());
        let clone = state.clone();
        assert_eq!(clone.engine().unwrap().render("a", &Value::Null).unwrap(), "1");
    }
}
