//! A small app with two controllers: plain JSON routes (one guarded, one
//! intercepted) and a rendered page.
//!
//! Run from the crate root:
//!
//! ```text
//! RUST_LOG=info cargo run --example boilerplate
//! curl localhost:3000/hello-world
//! curl -H 'Authorization: Bearer x' localhost:3000/protected
//! curl localhost:3000/render/hello-world
//! ```

use std::time::Instant;

use routeway::{
    App, Context, ServerConfig, create_server, get,
    guard::use_guard,
    interceptor::{InterceptorContext, use_interceptor},
    view::render,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

fn protected(ctx: &Context) -> bool {
    ctx.header("Authorization").is_some_and(|value| !value.is_empty())
}

fn timing(ctx: &mut InterceptorContext<'_>) -> impl FnOnce() + Send + use<> {
    let path = ctx.request().path().to_owned();
    tracing::info!(%path, "before");
    let start = Instant::now();
    move || tracing::info!(%path, elapsed = ?start.elapsed(), "after")
}

fn app_controller(app: &mut App) {
    app.controller(
        "/",
        [
            get("/hello-world", |_ctx| async { "Hello World" }),
            get("/protected", |_ctx| async { "Hello World" }).with(use_guard(protected)),
            get("/logger", |_ctx| async { "Logger is working" }).with(use_interceptor(timing)),
        ],
    );
}

fn render_controller(app: &mut App) {
    app.controller(
        "render",
        [get("/hello-world", |_ctx| async { json!({"message": "Hello World"}) })
            .with(render("index.tmpl"))],
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let app = create_server(
        ServerConfig::new()
            .debug_logger(true)
            .controller(app_controller)
            .controller(render_controller)
            .base_view_dir("demos/views/*"),
    );

    app.serve("127.0.0.1:3000").await?;
    Ok(())
}
