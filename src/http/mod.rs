pub(crate) mod connection;
pub(crate) mod context;
pub(crate) mod parse;
pub(crate) mod request;
pub mod response;
pub(crate) mod websocket;

pub use connection::{Connection, Io};
pub use context::HttpContext;
pub use request::{Body, Method, Request};
pub use response::Response;
pub use websocket::WebSocket;
