//! A minimal "Hello, World!" server using portico
//!
//! Responds with "Hello, World!" on `/`, and echoes text frames on the
//! `/echo` WebSocket.

use portico::Application;

fn main() {
    portico::logging::init("portico=debug");

    let mut app = Application::new();

    app.get("/", |ctx| {
        Box::pin(async move {
            let _ = ctx.write_string("Hello, World!");
        })
    });

    app.websocket("/echo", |ctx| {
        Box::pin(async move {
            let Some(socket) = ctx.websocket() else {
                return;
            };
            while let Some(Ok(message)) = socket.recv().await {
                if socket.send(message).await.is_err() {
                    break;
                }
            }
        })
    });

    app.listen("127.0.0.1:3000")
        .expect("Server failed to start");
}
