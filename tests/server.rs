//! End-to-end tests over a real TCP socket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use routeway::guard::use_guard;
use routeway::interceptor::{InterceptorContext, use_interceptor};
use routeway::{Context, HttpException, ServerConfig, create_server, get, post, server::Server};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct Running {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Running {
    async fn shutdown(self) {
        let _ = self.stop.send(());
        self.task.await.unwrap();
    }
}

async fn start(config: ServerConfig) -> Running {
    let app = create_server(config);
    let server = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr();
    let (stop, stopped) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        server
            .serve_with_shutdown(app, async {
                let _ = stopped.await;
            })
            .await
            .unwrap();
    });

    Running { addr, stop, task }
}

/// Sends one request with `Connection: close` and returns the raw response.
async fn send(addr: SocketAddr, head: &str, body: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let raw = format!(
        "{head}\r\nHost: localhost\r\nConnection: close\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(raw.as_bytes()).await.unwrap();

    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    String::from_utf8(out).unwrap()
}

fn body_of(response: &str) -> &str {
    response.split_once("\r\n\r\n").map_or("", |(_, body)| body)
}

fn app_config(secure_calls: Arc<AtomicUsize>, after_calls: Arc<AtomicUsize>) -> ServerConfig {
    ServerConfig::new().controller(move |app| {
        app.controller(
            "/",
            [
                get("/hello", |_ctx| async { "Hello World" }),
                get("/secure", move |_ctx| {
                    secure_calls.fetch_add(1, Ordering::SeqCst);
                    async { "secret" }
                })
                .with(use_guard(|ctx: &Context| ctx.header("Authorization").is_some())),
                get("/logger", |_ctx| async { serde_json::json!({"logged": true}) }).with(
                    use_interceptor(move |_ctx: &mut InterceptorContext<'_>| {
                        let after_calls = Arc::clone(&after_calls);
                        move || {
                            after_calls.fetch_add(1, Ordering::SeqCst);
                        }
                    }),
                ),
                post("/echo", |ctx: Context| async move {
                    ctx.json::<serde_json::Value>().map_err(HttpException::from)
                }),
            ],
        );
    })
}

#[tokio::test]
async fn serves_controller_routes_over_tcp() {
    let secure_calls = Arc::new(AtomicUsize::new(0));
    let after_calls = Arc::new(AtomicUsize::new(0));
    let server = start(app_config(Arc::clone(&secure_calls), Arc::clone(&after_calls))).await;

    let hello = send(server.addr, "GET /hello HTTP/1.1", "").await;
    assert!(hello.starts_with("HTTP/1.1 200 OK\r\n"), "{hello}");
    assert!(hello.contains("Content-Type: application/json; charset=utf-8\r\n"));
    assert_eq!(body_of(&hello), r#""Hello World""#);

    let secure = send(server.addr, "GET /secure HTTP/1.1", "").await;
    assert!(secure.starts_with("HTTP/1.1 403 Forbidden\r\n"), "{secure}");
    assert_eq!(body_of(&secure), r#"{"status":403,"message":"Forbidden"}"#);
    assert_eq!(secure_calls.load(Ordering::SeqCst), 0);

    let logger = send(server.addr, "GET /logger HTTP/1.1", "").await;
    assert_eq!(body_of(&logger), r#"{"logged":true}"#);
    assert_eq!(after_calls.load(Ordering::SeqCst), 1);

    let echo = send(server.addr, "POST /echo HTTP/1.1", r#"{"name":"routeway"}"#).await;
    assert_eq!(body_of(&echo), r#"{"name":"routeway"}"#);

    let bad = send(server.addr, "POST /echo HTTP/1.1", "{").await;
    assert!(bad.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{bad}");

    server.shutdown().await;
}

#[tokio::test]
async fn fallbacks_over_tcp() {
    let server = start(app_config(Arc::default(), Arc::default())).await;

    let missing = send(server.addr, "GET /nope HTTP/1.1", "").await;
    assert!(missing.starts_with("HTTP/1.1 404 Not Found\r\n"), "{missing}");
    assert_eq!(body_of(&missing), r#"{"status":404,"message":"Not Found"}"#);

    let wrong = send(server.addr, "DELETE /hello HTTP/1.1", "").await;
    assert!(wrong.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"), "{wrong}");
    assert!(wrong.contains("Allow: GET\r\n"));
    assert_eq!(body_of(&wrong), r#"{"status":405,"message":"Method Not Allowed"}"#);

    server.shutdown().await;
}

#[tokio::test]
async fn keep_alive_serves_several_requests_on_one_connection() {
    let server = start(app_config(Arc::default(), Arc::default())).await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream
        .write_all(b"GET /hello HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    let mut buf = vec![0u8; 1024];
    let n = stream.read(&mut buf).await.unwrap();
    let first = String::from_utf8_lossy(&buf[..n]).into_owned();
    assert!(first.contains("Connection: keep-alive\r\n"), "{first}");

    stream
        .write_all(b"GET /nope HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).await.unwrap();
    let second = String::from_utf8(rest).unwrap();
    assert!(second.starts_with("HTTP/1.1 404 Not Found\r\n"), "{second}");

    server.shutdown().await;
}

#[tokio::test]
async fn malformed_request_gets_structured_400() {
    let server = start(ServerConfig::new()).await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream.write_all(b"GET /\x01 HTTP/1.1\r\n\r\n").await.unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    let response = String::from_utf8_lossy(&out).into_owned();

    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{response}");
    assert!(body_of(&response).starts_with(r#"{"status":400,"message":"Bad Request: "#));

    server.shutdown().await;
}

#[tokio::test]
async fn pipelined_requests_in_one_segment_are_all_answered() {
    let server = start(app_config(Arc::default(), Arc::default())).await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream
        .write_all(
            b"GET /hello HTTP/1.1\r\nHost: localhost\r\n\r\n\
              GET /nope HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        )
        .await
        .unwrap();
    let mut out = Vec::new();
    tokio::time::timeout(std::time::Duration::from_secs(5), stream.read_to_end(&mut out))
        .await
        .expect("both pipelined requests should be answered")
        .unwrap();
    let responses = String::from_utf8(out).unwrap();

    let first = responses.find("HTTP/1.1 200 OK\r\n").expect(&responses);
    let second = responses.find("HTTP/1.1 404 Not Found\r\n").expect(&responses);
    assert!(first < second, "{responses}");
    assert_eq!(responses.matches("HTTP/1.1 ").count(), 2);

    server.shutdown().await;
}

#[tokio::test]
async fn oversized_content_length_gets_413() {
    let server = start(app_config(Arc::default(), Arc::default())).await;

    for declared in [usize::MAX.to_string(), (64 * 1024 * 1024).to_string()] {
        let mut stream = TcpStream::connect(server.addr).await.unwrap();
        let head = format!(
            "POST /echo HTTP/1.1\r\nHost: localhost\r\nContent-Length: {declared}\r\n\r\n{{}}"
        );
        stream.write_all(head.as_bytes()).await.unwrap();
        let mut out = Vec::new();
        tokio::time::timeout(std::time::Duration::from_secs(5), stream.read_to_end(&mut out))
            .await
            .expect("oversized declaration should be rejected without waiting for the body")
            .unwrap();
        let response = String::from_utf8_lossy(&out).into_owned();

        assert!(response.starts_with("HTTP/1.1 413 Payload Too Large\r\n"), "{response}");
        assert_eq!(
            body_of(&response),
            r#"{"status":413,"message":"Request entity too large"}"#
        );
    }

    server.shutdown().await;
}

#[tokio::test]
async fn non_utf8_header_gets_400_instead_of_reaching_the_guard() {
    let secure_calls = Arc::new(AtomicUsize::new(0));
    let server = start(app_config(Arc::clone(&secure_calls), Arc::default())).await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream
        .write_all(b"GET /secure HTTP/1.1\r\nHost: localhost\r\nAuthorization: Bearer \xff\r\n\r\n")
        .await
        .unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    let response = String::from_utf8_lossy(&out).into_owned();

    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{response}");
    assert_eq!(
        body_of(&response),
        r#"{"status":400,"message":"Bad Request: header `Authorization` is not valid UTF-8"}"#
    );
    assert_eq!(secure_calls.load(Ordering::SeqCst), 0);

    server.shutdown().await;
}
