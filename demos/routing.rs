//! Routing example for portico
//!
//! Demonstrates path parameters, query parameters, JSON bodies, mounted
//! routers, static files and a hijacked route.

use portico::{json, Application, Router};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

#[derive(Serialize, Deserialize)]
struct User {
    name: String,
    role: String,
}

fn main() {
    portico::logging::init("portico=debug");

    let mut app = Application::new();

    app.get("/", |ctx| {
        Box::pin(async move {
            let _ = ctx.write_string("Welcome to the portico demo server!");
        })
    });

    // Route with path parameter
    app.get("/users/:id", |ctx| {
        Box::pin(async move {
            let id = ctx.param("id").unwrap_or_default().to_string();
            let _ = ctx.write_string(&format!("User ID: {}", id));
        })
    });

    // Query parameter: /search?q=rust
    app.get("/search", |ctx| {
        Box::pin(async move {
            let q = ctx.query("q").unwrap_or("nothing").to_string();
            let _ = ctx.write_json(&json!({ "query": q }));
        })
    });

    // POST request with JSON body
    app.post("/users", |ctx| {
        Box::pin(async move {
            match ctx.request().body.json::<User>() {
                Some(user) => {
                    ctx.write_header(201);
                    let _ = ctx.write_json(&user);
                }
                None => {
                    ctx.write_header(400);
                    let _ = ctx.write_string("Invalid JSON body");
                }
            }
        })
    });

    // Group routes under /api prefix
    let mut api = Router::new();
    api.get("/status", |ctx| {
        Box::pin(async move {
            let _ = ctx.write_json(&json!({ "status": "operational", "version": "1.0.0" }));
        })
    });
    app.mount("/api", api);

    app.serve_files("/static/*filepath", "public");

    // Writes a raw HTTP response on the hijacked connection.
    app.hijack("/raw", |ctx| {
        Box::pin(async move {
            if let Some(conn) = ctx.hijacked() {
                let _ = conn
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\nConnection: close\r\n\r\nraw")
                    .await;
            }
        })
    });

    app.listen("127.0.0.1:3000")
        .expect("Server failed to start")
}
