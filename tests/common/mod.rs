//! Shared helpers: drive `serve_connection` over an in-memory duplex pipe.

use portico::{Application, Connection};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[allow(dead_code)]
pub const PEER: &str = "127.0.0.1:40000";

#[allow(dead_code)]
/// Sends `raw` on a fresh connection and returns everything the server wrote
/// until it closed its end.
pub async fn exchange(app: &Application, raw: &str) -> String {
    exchange_on(app, |conn| conn, raw).await
}

/// Like [`exchange`], on a transport that refuses hijacking.
#[allow(dead_code)]
pub async fn exchange_without_hijack(app: &Application, raw: &str) -> String {
    exchange_on(app, |conn| conn.without_hijack(), raw).await
}

async fn exchange_on<F>(app: &Application, wrap: F, raw: &str) -> String
where
    F: FnOnce(Connection) -> Connection,
{
    let (mut client, server) = tokio::io::duplex(64 * 1024);
    let conn = wrap(Connection::new(server, PEER.parse().ok()));

    let talk = async {
        client.write_all(raw.as_bytes()).await.unwrap();
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        String::from_utf8_lossy(&out).into_owned()
    };
    let (served, response) = tokio::join!(app.serve_connection(conn), talk);
    served.unwrap();
    response
}

/// Splits a single response into status code, header block and body.
#[allow(dead_code)]
pub fn split(response: &str) -> (u16, String, String) {
    let (head, body) = response.split_once("\r\n\r\n").unwrap_or((response, ""));
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap_or(0);
    (status, head.to_string(), body.to_string())
}

/// Shared event log for ordering assertions.
#[derive(Clone, Default)]
pub struct Events(Arc<Mutex<Vec<String>>>);

#[allow(dead_code)]
impl Events {
    pub fn push(&self, event: &str) {
        self.0.lock().unwrap().push(event.to_string());
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}
