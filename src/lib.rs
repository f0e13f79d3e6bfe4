//! # Portico
//!
//! The request-dispatch core of an embeddable HTTP/1.x and WebSocket server.
//!
//! ## Features
//!
//! - Method + path routing with `:name` and `*name` segments
//! - Lifecycle modules with begin/end request hooks
//! - Panic containment with an optional exception handler
//! - Pooled request contexts and response writers
//! - WebSocket upgrade on a separate handler table
//! - Connection hijacking and static file serving
//! - Access and fault logging through `tracing`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use portico::{Application, Module};
//!
//! fn main() {
//!     portico::logging::init("portico=debug");
//!
//!     let mut app = Application::new();
//!     app.module(Module::new().on_end_request(|ctx| {
//!         ctx.set_header("X-Served-By", "portico");
//!     }));
//!     app.get("/ping", |ctx| Box::pin(async move {
//!         let _ = ctx.write_string("pong");
//!     }));
//!
//!     app.listen("127.0.0.1:3000").unwrap();
//! }
//! ```

pub mod app;
pub mod config;
mod dispatcher;
pub mod error;
pub mod handler;
pub mod http;
pub mod logging;
pub mod module;
pub mod pool;
pub mod router;
pub mod state;

pub use app::Application;
pub use config::{ServerConfig, TlsConfig};
pub use dispatcher::{access_log_line, LogJson};
pub use error::{ServerError, ServerResult};
pub use handler::{ExceptionHandler, Handler};
pub use http::{Connection, HttpContext, Method, Request, Response, WebSocket};
pub use module::Module;
pub use router::{Params, Router};
pub use state::GlobalState;

// Handlers return boxed futures; re-export the alias so callers can name it.
pub use futures::future::BoxFuture;
pub use serde_json::{json, Value};
pub use tokio_tungstenite::tungstenite::Message;
