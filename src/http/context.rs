use crate::error::{ServerError, ServerResult};
use crate::http::response::HEADER_CONTENT_TYPE;
use crate::http::{Connection, Request, Response, WebSocket};
use crate::pool::{Poolable, Pooled};
use crate::router::Params;
use serde::Serialize;
use std::io;
use std::net::IpAddr;

/// Everything a handler or module sees about one request.
///
/// Contexts are pooled: the dispatcher resets one right after acquiring it
/// and it goes back to the pool once the request is logged.
#[derive(Debug, Default)]
pub struct HttpContext {
    request: Request,
    response: Option<Pooled<Response>>,
    params: Params,
    websocket: Option<WebSocket>,
    is_websocket: bool,
    hijacked: Option<Connection>,
}

impl Poolable for HttpContext {
    fn recycle(&mut self) {
        // Hands the response back to its own pool and closes any upgraded or
        // hijacked connection.
        self.response = None;
        self.websocket = None;
        self.hijacked = None;
    }
}

impl HttpContext {
    /// Reinitializes every field for a new request.
    pub fn reset(
        &mut self,
        response: Option<Pooled<Response>>,
        request: Request,
        params: Params,
    ) {
        self.request = request;
        self.response = response;
        self.params = params;
        self.websocket = None;
        self.is_websocket = false;
        self.hijacked = None;
    }

    pub(crate) fn attach_websocket(&mut self, socket: WebSocket) {
        self.websocket = Some(socket);
        self.is_websocket = true;
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    /// The response wrapper; `None` on WebSocket connections.
    pub fn response(&self) -> Option<&Response> {
        self.response.as_deref()
    }

    pub fn response_mut(&mut self) -> Option<&mut Response> {
        self.response.as_deref_mut()
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.request.get_query(name)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.get_header(name)
    }

    pub fn is_websocket(&self) -> bool {
        self.is_websocket
    }

    pub fn websocket(&mut self) -> Option<&mut WebSocket> {
        self.websocket.as_mut()
    }

    /// Request target as sent by the client.
    pub fn url(&self) -> &str {
        &self.request.uri
    }

    pub fn remote_ip(&self) -> Option<IpAddr> {
        self.request.remote_addr.map(|addr| addr.ip())
    }

    /// Takes raw control of the connection. The response wrapper is unbound
    /// afterwards, so nothing is written on the handler's behalf; the handler
    /// owns the framing from here on.
    pub fn hijack(&mut self) -> ServerResult<&mut Connection> {
        if self.is_websocket {
            return Err(ServerError::HijackUnsupported(
                "connection was upgraded to websocket".into(),
            ));
        }
        if self.hijacked.is_some() {
            return Err(ServerError::HijackUnsupported(
                "connection already hijacked".into(),
            ));
        }
        let response = self.response.as_deref_mut().ok_or_else(|| {
            ServerError::HijackUnsupported("no response bound to this request".into())
        })?;
        match response.take_sink() {
            Some(conn) if conn.is_hijackable() => Ok(self.hijacked.insert(conn)),
            Some(conn) => {
                response.restore_sink(conn);
                Err(ServerError::HijackUnsupported(
                    "transport does not expose raw connection control".into(),
                ))
            }
            None => Err(ServerError::HijackUnsupported(
                "response is not bound to a connection".into(),
            )),
        }
    }

    /// The hijacked connection, if [`hijack`](Self::hijack) succeeded.
    pub fn hijacked(&mut self) -> Option<&mut Connection> {
        self.hijacked.as_mut()
    }

    pub fn is_hijacked(&self) -> bool {
        self.hijacked.is_some()
    }

    pub fn write_header(&mut self, code: u16) {
        if let Some(response) = self.response_mut() {
            response.write_header(code);
        }
    }

    pub fn set_header(&mut self, name: &str, value: &str) {
        if let Some(response) = self.response_mut() {
            response.set_header(name, value);
        }
    }

    pub fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        match self.response_mut() {
            Some(response) => response.write(bytes),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "no response bound to this request",
            )),
        }
    }

    pub fn write_string(&mut self, s: &str) -> io::Result<usize> {
        self.write(s.as_bytes())
    }

    pub fn write_json<T: Serialize>(&mut self, value: &T) -> ServerResult<usize> {
        let body = serde_json::to_vec(value)?;
        self.set_header(HEADER_CONTENT_TYPE, "application/json");
        Ok(self.write(&body)?)
    }

    pub(crate) fn take_hijacked(&mut self) -> Option<Connection> {
        self.hijacked.take()
    }
}
