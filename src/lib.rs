//! # routeway
//!
//! Controller-style routing over an async HTTP/1.1 server: group routes
//! under base paths, guard them, wrap them in interceptors, render views,
//! and let handlers return plain values that are normalized into responses.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use routeway::{Context, ServerConfig, create_server, get, guard::use_guard};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let app = create_server(
//!         ServerConfig::new()
//!             .debug_logger(true)
//!             .controller(|app| {
//!                 app.controller("/", [
//!                     get("/hello-world", |_ctx| async { "Hello World" }),
//!                     get("/protected", |_ctx| async { "secret" })
//!                         .with(use_guard(|ctx: &Context| ctx.header("Authorization").is_some())),
//!                 ]);
//!             }),
//!     );
//!
//!     app.serve("127.0.0.1:8080").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Responses
//!
//! A handler's return value becomes the response body:
//!
//! - a rendered view, when the route carries [`view::render`] and views are loaded;
//! - `{"status", "message"}` with that status, for an [`HttpException`] or a JSON
//!   object with an integer `status` and a string `message`;
//! - the value as JSON with `200`, otherwise.

pub mod app;
pub mod context;
pub mod controller;
pub mod exception;
pub mod guard;
pub mod http;
pub mod interceptor;
pub mod middleware;
pub mod normalize;
pub mod reply;
pub mod router;
pub mod server;
pub mod view;

pub use app::{App, ConfigError, Mode, ServerConfig, Settings, create_server};
pub use context::Context;
pub use controller::{Route, delete, get, patch, post, put};
pub use exception::HttpException;
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use reply::{IntoReply, Json, Reply};
pub use server::{Server, ServerError};
