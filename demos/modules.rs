//! Modules and fault handling
//!
//! A logging module tags every response, a panicking route shows the
//! exception handler, and `/stats` reports the global counters.

use portico::{json, Application, Module};

fn main() {
    portico::logging::init("portico=debug");

    let mut app = Application::new();
    let state = app.state();

    app.module(
        Module::new()
            .on_begin_request(|ctx| {
                tracing::info!(path = %ctx.request().path, "request started");
            })
            .on_end_request(|ctx| {
                ctx.set_header("X-Powered-By", "portico");
            }),
    );

    app.on_exception(|ctx, err| {
        ctx.write_header(500);
        ctx.set_header("Content-Type", "application/json");
        let _ = ctx.write_json(&json!({ "error": err.to_string() }));
    });

    app.get("/boom", |_ctx| {
        Box::pin(async move {
            panic!("something went wrong");
        })
    });

    app.get("/stats", move |ctx| {
        let state = state.clone();
        Box::pin(async move {
            let _ = ctx.write_json(&json!({
                "requests": state.request_count(),
                "errors": state.error_count(),
            }));
        })
    });

    app.listen("127.0.0.1:3000")
        .expect("Server failed to start");
}
