use crate::http::Connection;
use crate::pool::Poolable;
use std::io;
use tokio::io::AsyncWriteExt;

pub const HEADER_SERVER: &str = "Server";
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
pub const CHARSET_UTF8: &str = "text/plain; charset=utf-8";

/// Outbound side of a standard HTTP request.
///
/// Tracks the status code and the number of body bytes written so the access
/// log can report them. The body is held until [`finish`](Response::finish)
/// commits status line, headers and body to the connection in one go.
#[derive(Debug, Default)]
pub struct Response {
    sink: Option<Connection>,
    status: u16,
    size: u64,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Poolable for Response {
    fn recycle(&mut self) {
        self.sink = None;
    }
}

impl Response {
    /// Binds the wrapper to a new connection and clears everything left over
    /// from a previous request.
    pub fn reset(&mut self, sink: Connection) {
        self.sink = Some(sink);
        self.status = 0;
        self.size = 0;
        self.headers.clear();
        self.body.clear();
    }

    /// Effective status: 200 until a handler records another code.
    pub fn status(&self) -> u16 {
        if self.status == 0 {
            200
        } else {
            self.status
        }
    }

    /// Body bytes written so far.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Records the status code. The first call wins.
    pub fn write_header(&mut self, code: u16) {
        if self.status != 0 {
            tracing::warn!(
                target: crate::logging::LOG_TARGET_SERVER,
                current = self.status,
                ignored = code,
                "superfluous write_header call"
            );
            return;
        }
        self.status = code;
    }

    pub fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        if self.sink.is_none() {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "response is not bound to a connection",
            ));
        }
        self.body.extend_from_slice(bytes);
        self.size += bytes.len() as u64;
        Ok(bytes.len())
    }

    pub fn write_string(&mut self, s: &str) -> io::Result<usize> {
        self.write(s.as_bytes())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Replaces every value of `name` with `value`.
    pub fn set_header<K: AsRef<str>, V: AsRef<str>>(&mut self, name: K, value: V) -> &mut Self {
        let name = name.as_ref();
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.as_ref().to_string()));
        self
    }

    pub fn add_header<K: AsRef<str>, V: AsRef<str>>(&mut self, name: K, value: V) -> &mut Self {
        self.headers
            .push((name.as_ref().to_string(), value.as_ref().to_string()));
        self
    }

    /// The header block as it would go on the wire, one `Name: value` per line.
    pub fn header_block(&self) -> String {
        let mut block = String::new();
        for (name, value) in &self.headers {
            block.push_str(name);
            block.push_str(": ");
            block.push_str(value);
            block.push_str("\r\n");
        }
        block
    }

    /// Drops the uncommitted status and body. Headers stay.
    pub fn discard(&mut self) {
        self.status = 0;
        self.size = 0;
        self.body.clear();
    }

    pub fn is_bound(&self) -> bool {
        self.sink.is_some()
    }

    pub(crate) fn take_sink(&mut self) -> Option<Connection> {
        self.sink.take()
    }

    /// Puts back a connection taken with `take_sink`, keeping status and body.
    pub(crate) fn restore_sink(&mut self, sink: Connection) {
        self.sink = Some(sink);
    }

    /// Writes the response to the connection. With `head_only` the body is
    /// withheld but `Content-Length` still describes it. A wrapper whose sink
    /// has been taken (hijack) has nothing to commit.
    pub async fn finish(&mut self, keep_alive: bool, head_only: bool) -> io::Result<()> {
        let Some(sink) = self.sink.as_mut() else {
            return Ok(());
        };
        let status = if self.status == 0 { 200 } else { self.status };
        let mut head = format!("HTTP/1.1 {} {}\r\n", status, reason_phrase(status));
        for (name, value) in &self.headers {
            head.push_str(&format!("{}: {}\r\n", name, value));
        }
        head.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        if !keep_alive {
            head.push_str("Connection: close\r\n");
        }
        head.push_str("\r\n");

        sink.write_all(head.as_bytes()).await?;
        if !head_only {
            sink.write_all(&self.body).await?;
        }
        sink.flush().await
    }
}

pub(crate) fn reason_phrase(status: u16) -> &'static str {
    match status {
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        413 => "Payload Too Large",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}
