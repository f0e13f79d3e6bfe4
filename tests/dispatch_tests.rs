//! End-to-end tests of the standard HTTP path: hooks, handlers, panic
//! containment, hijacking, routing errors and keep-alive.

mod common;

use common::{exchange, exchange_without_hijack, split, Events};
use portico::{json, Application, BoxFuture, Connection, HttpContext, Module, ServerConfig};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

fn boom(_ctx: &mut HttpContext) -> BoxFuture<'_, ()> {
    Box::pin(async { panic!("boom") })
}

fn ok(ctx: &mut HttpContext) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        ctx.write_header(200);
        let _ = ctx.write_string("ok");
    })
}

fn recording_module(events: &Events, name: &'static str) -> Module {
    let begin = events.clone();
    let end = events.clone();
    Module::new()
        .on_begin_request(move |_ctx| begin.push(&format!("{}:begin", name)))
        .on_end_request(move |_ctx| end.push(&format!("{}:end", name)))
}

/// Pins a closure to the handler signature.
fn handler<F>(f: F) -> F
where
    F: for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    f
}

fn recording_handler(
    events: &Events,
) -> impl for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, ()> + Send + Sync + 'static {
    let events = events.clone();
    handler(move |ctx| {
        let events = events.clone();
        Box::pin(async move {
            events.push("handler");
            let _ = ctx.write_string("ok");
        })
    })
}

const GET_PING: &str = "GET /ping HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n";

#[tokio::test]
async fn end_hook_header_reaches_the_client() {
    let mut app = Application::new();
    app.module(Module::new().on_end_request(|ctx| ctx.set_header("X-Module", "on")));
    app.get("/ping", ok);
    let state = app.state();

    let (status, head, body) = split(&exchange(&app, GET_PING).await);
    assert_eq!(status, 200);
    assert!(head.contains("Server: portico"));
    assert!(head.contains("X-Module: on"));
    assert!(head.contains("Content-Length: 2"));
    assert_eq!(body, "ok");
    assert_eq!(state.request_count(), 1);
    assert_eq!(state.error_count(), 0);
}

#[tokio::test]
async fn handler_panic_becomes_a_plain_500() {
    let mut app = Application::new();
    app.get("/boom", boom);
    let state = app.state();

    let raw = "GET /boom HTTP/1.1\r\nConnection: close\r\n\r\n";
    let (status, head, body) = split(&exchange(&app, raw).await);
    assert_eq!(status, 500);
    assert!(head.contains("Content-Type: text/plain; charset=utf-8"));
    assert_eq!(body, "boom");
    assert_eq!(state.error_count(), 1);
    assert_eq!(state.request_count(), 1);
}

#[tokio::test]
async fn failed_hijack_degrades_and_the_handler_still_runs() {
    let events = Events::default();
    let mut app = Application::new();
    let seen = events.clone();
    app.hijack("/raw", move |ctx| {
        let seen = seen.clone();
        Box::pin(async move {
            if !ctx.is_hijacked() {
                seen.push("handler");
            }
        })
    });
    let state = app.state();

    let raw = "GET /raw HTTP/1.1\r\nConnection: close\r\n\r\n";
    let (status, head, body) = split(&exchange_without_hijack(&app, raw).await);
    assert_eq!(status, 500);
    assert!(head.contains("Content-Type: text/plain; charset=utf-8"));
    assert!(body.starts_with("Hijack unsupported"), "{}", body);
    assert_eq!(events.take(), ["handler"]);
    assert_eq!(state.error_count(), 0);
    assert_eq!(state.request_count(), 1);
}

#[tokio::test]
async fn hijacked_connection_belongs_to_the_handler() {
    let mut app = Application::new();
    app.hijack("/raw", |ctx| {
        Box::pin(async move {
            if let Some(conn) = ctx.hijacked() {
                let _ = conn.write_all(b"RAW BYTES").await;
            }
        })
    });

    let raw = "GET /raw HTTP/1.1\r\n\r\n";
    assert_eq!(exchange(&app, raw).await, "RAW BYTES");
}

#[tokio::test]
async fn upgrade_requests_never_reach_the_router() {
    let events = Events::default();
    let mut app = Application::new();
    app.get("/ping", recording_handler(&events));
    let state = app.state();

    let raw = "GET /ping HTTP/1.1\r\nConnection: Upgrade\r\nUpgrade: websocket\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n";
    let (status, _, _) = split(&exchange(&app, raw).await);
    assert_eq!(status, 404);
    assert!(events.take().is_empty());
    assert_eq!(state.request_count(), 0);
}

#[tokio::test]
async fn lowercase_upgrade_token_goes_to_the_router() {
    let events = Events::default();
    let mut app = Application::new();
    app.get("/ping", recording_handler(&events));

    let raw = "GET /ping HTTP/1.1\r\nConnection: upgrade\r\n\r\n";
    // `upgrade` is not the `close` token, so the connection stays open;
    // a second request closes it.
    let raw = format!("{}{}", raw, GET_PING);
    let response = exchange(&app, &raw).await;
    assert_eq!(response.matches("HTTP/1.1 200 OK").count(), 2);
    assert_eq!(events.take(), ["handler", "handler"]);
}

#[tokio::test]
async fn hooks_wrap_the_handler_in_registration_order() {
    let events = Events::default();
    let mut app = Application::new();
    app.module(recording_module(&events, "a"));
    app.module(recording_module(&events, "b"));
    app.get("/ping", recording_handler(&events));

    exchange(&app, GET_PING).await;
    assert_eq!(
        events.take(),
        ["a:begin", "b:begin", "handler", "a:end", "b:end"]
    );
}

#[tokio::test]
async fn panicking_begin_hook_skips_the_rest_of_the_request() {
    let events = Events::default();
    let mut app = Application::new();
    app.module({
        let events = events.clone();
        Module::new().on_begin_request(move |_ctx| {
            events.push("a:begin");
            panic!("hook failed");
        })
    });
    app.module(recording_module(&events, "b"));
    app.get("/ping", recording_handler(&events));
    let state = app.state();

    let (status, _, body) = split(&exchange(&app, GET_PING).await);
    assert_eq!(status, 500);
    assert_eq!(body, "hook failed");
    assert_eq!(events.take(), ["a:begin"]);
    assert_eq!(state.error_count(), 1);
}

#[tokio::test]
async fn panicking_end_hook_replaces_the_handler_output() {
    let events = Events::default();
    let mut app = Application::new();
    app.module(Module::new().on_end_request(|_ctx| panic!("end failed")));
    app.module(recording_module(&events, "b"));
    app.get("/ping", recording_handler(&events));

    let (status, _, body) = split(&exchange(&app, GET_PING).await);
    assert_eq!(status, 500);
    assert_eq!(body, "end failed");
    assert_eq!(events.take(), ["b:begin", "handler"]);
}

#[tokio::test]
async fn exception_handler_writes_the_fault_response() {
    let mut app = Application::new();
    app.on_exception(|ctx, err| {
        ctx.write_header(503);
        ctx.set_header("Content-Type", "text/plain; charset=utf-8");
        let _ = ctx.write_string(&format!("custom: {}", err));
    });
    app.get("/boom", boom);
    let state = app.state();

    let raw = "GET /boom HTTP/1.1\r\nConnection: close\r\n\r\n";
    let (status, _, body) = split(&exchange(&app, raw).await);
    assert_eq!(status, 503);
    assert_eq!(body, "custom: boom");
    assert_eq!(state.error_count(), 1);
}

#[tokio::test]
async fn panicking_exception_handler_falls_back_to_the_default_500() {
    let mut app = Application::new();
    app.on_exception(|_ctx, _err| panic!("handler of handlers"));
    app.get("/boom", boom);

    let raw = "GET /boom HTTP/1.1\r\nConnection: close\r\n\r\n";
    let (status, _, body) = split(&exchange(&app, raw).await);
    assert_eq!(status, 500);
    assert_eq!(body, "boom");
}

#[tokio::test]
async fn every_acquire_is_matched_by_a_release() {
    let mut app = Application::new();
    app.get("/ping", ok).get("/boom", boom);

    exchange(&app, GET_PING).await;
    exchange(&app, "GET /boom HTTP/1.1\r\nConnection: close\r\n\r\n").await;
    exchange(&app, "GET /missing HTTP/1.1\r\nConnection: close\r\n\r\n").await;

    let responses = app.response_pool_stats();
    let contexts = app.context_pool_stats();
    assert_eq!(responses.acquired, 3);
    assert_eq!(responses.acquired, responses.released);
    assert_eq!(contexts.acquired, 2);
    assert_eq!(contexts.acquired, contexts.released);
}

#[tokio::test]
async fn reused_contexts_start_clean() {
    let config = ServerConfig {
        pool_prefill: 1,
        pool_max_idle: 1,
        ..ServerConfig::default()
    };
    let mut app = Application::with_config(config);
    app.get("/users/:id", ok);
    app.get("/inspect", |ctx| {
        Box::pin(async move {
            let report = format!(
                "params={} websocket={} url={}",
                ctx.params().len(),
                ctx.is_websocket(),
                ctx.url()
            );
            let _ = ctx.write_string(&report);
        })
    });

    let raw = "GET /users/7 HTTP/1.1\r\n\r\nGET /inspect HTTP/1.1\r\nConnection: close\r\n\r\n";
    let response = exchange(&app, raw).await;
    assert!(response.ends_with("params=0 websocket=false url=/inspect"), "{}", response);
    assert_eq!(app.context_pool_stats().created, 1);
}

#[tokio::test]
async fn keep_alive_serves_several_requests() {
    let mut app = Application::new();
    app.get("/ping", ok);
    let state = app.state();

    let raw = format!("GET /ping HTTP/1.1\r\n\r\n{}", GET_PING);
    let response = exchange(&app, &raw).await;
    assert_eq!(response.matches("HTTP/1.1 200 OK").count(), 2);
    assert_eq!(response.matches("Connection: close").count(), 1);
    assert_eq!(state.request_count(), 2);
}

#[tokio::test]
async fn http_1_0_closes_after_one_response() {
    let mut app = Application::new();
    app.get("/ping", ok);

    let raw = "GET /ping HTTP/1.0\r\n\r\nGET /ping HTTP/1.0\r\n\r\n";
    let response = exchange(&app, raw).await;
    assert_eq!(response.matches("HTTP/1.1 200 OK").count(), 1);
    assert!(response.contains("Connection: close"));
}

#[tokio::test]
async fn routing_misses_get_404_and_405() {
    let mut app = Application::new();
    app.get("/ping", ok);

    let (status, head, body) = split(&exchange(&app, "GET /nope HTTP/1.1\r\nConnection: close\r\n\r\n").await);
    assert_eq!(status, 404);
    assert!(head.contains("Server: portico"));
    assert_eq!(body, "404 page not found");

    let (status, head, _) = split(&exchange(&app, "POST /ping HTTP/1.1\r\nConnection: close\r\n\r\n").await);
    assert_eq!(status, 405);
    assert!(head.contains("Allow: GET"));
}

#[tokio::test]
async fn head_uses_the_get_route_without_a_body() {
    let mut app = Application::new();
    app.get("/ping", ok);

    let (status, head, body) = split(&exchange(&app, "HEAD /ping HTTP/1.1\r\nConnection: close\r\n\r\n").await);
    assert_eq!(status, 200);
    assert!(head.contains("Content-Length: 2"));
    assert!(body.is_empty());
}

#[tokio::test]
async fn malformed_and_oversized_requests_are_rejected() {
    let mut app = Application::new();
    app.max_body_size(4);
    app.post("/upload", ok);

    let (status, _, _) = split(&exchange(&app, "BREW /pot HTTP/1.1\r\n\r\n").await);
    assert_eq!(status, 400);

    let raw = "POST /upload HTTP/1.1\r\nContent-Length: 10\r\n\r\n0123456789";
    let (status, _, _) = split(&exchange(&app, raw).await);
    assert_eq!(status, 413);
    assert_eq!(app.state().request_count(), 0);
}

#[tokio::test]
async fn json_bodies_round_trip_through_the_context() {
    let mut app = Application::new();
    app.server_name("edge");
    app.post("/echo", |ctx| {
        Box::pin(async move {
            let value: Option<serde_json::Value> = ctx.request().body.json();
            match value {
                Some(value) => {
                    let _ = ctx.write_json(&json!({ "got": value }));
                }
                None => ctx.write_header(400),
            }
        })
    });

    let body = r#"{"name":"ann"}"#;
    let raw = format!(
        "POST /echo HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let (status, head, body) = split(&exchange(&app, &raw).await);
    assert_eq!(status, 200);
    assert!(head.contains("Server: edge"));
    assert!(head.contains("Content-Type: application/json"));
    assert_eq!(body, r#"{"got":{"name":"ann"}}"#);
}

#[tokio::test]
async fn chunked_requests_are_refused_and_the_connection_closed() {
    let events = Events::default();
    let mut app = Application::new();
    app.post("/upload", recording_handler(&events)).get("/ping", ok);

    let raw = format!(
        "POST /upload HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n0\r\n\r\n{}",
        GET_PING
    );
    let response = exchange(&app, &raw).await;
    let (status, _, _) = split(&response);
    assert_eq!(status, 400);
    assert_eq!(response.matches("HTTP/1.1").count(), 1, "{}", response);
    assert!(events.take().is_empty());
    assert_eq!(app.state().request_count(), 0);
}

#[tokio::test]
async fn silent_clients_are_dropped_after_the_read_timeout() {
    let config = ServerConfig {
        read_timeout_ms: 50,
        ..ServerConfig::default()
    };
    let app = Application::with_config(config);
    let (client, server) = tokio::io::duplex(1024);
    let conn = Connection::new(server, common::PEER.parse().ok());

    let served = tokio::time::timeout(Duration::from_secs(5), app.serve_connection(conn)).await;
    assert!(matches!(served, Ok(Ok(()))));
    drop(client);
}

#[tokio::test]
async fn renaming_the_server_keeps_the_pools() {
    let mut app = Application::new();
    app.get("/ping", ok);
    exchange(&app, GET_PING).await;

    app.server_name("edge");
    assert_eq!(app.response_pool_stats().acquired, 1);
    assert_eq!(app.context_pool_stats().released, 1);

    let (_, head, _) = split(&exchange(&app, GET_PING).await);
    assert!(head.contains("Server: edge"));
    assert_eq!(app.response_pool_stats().acquired, 2);
}
