use crate::error::{ServerError, ServerResult};
use crate::http::Connection;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// An upgraded connection, handed to WebSocket handlers through the context.
pub struct WebSocket {
    stream: WebSocketStream<Connection>,
}

impl WebSocket {
    /// Wraps a connection whose `101 Switching Protocols` has already been sent.
    pub(crate) async fn from_upgraded(conn: Connection) -> Self {
        WebSocket {
            stream: WebSocketStream::from_raw_socket(conn, Role::Server, None).await,
        }
    }

    /// Next data message. Ping/pong are answered by the protocol layer and
    /// skipped here; `None` once the peer closes.
    pub async fn recv(&mut self) -> Option<ServerResult<Message>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
                Ok(Message::Close(_)) => return None,
                Ok(message) => return Some(Ok(message)),
                Err(err) => return Some(Err(err.into())),
            }
        }
    }

    pub async fn send(&mut self, message: Message) -> ServerResult<()> {
        self.stream.send(message).await.map_err(ServerError::from)
    }

    pub async fn send_text(&mut self, text: &str) -> ServerResult<()> {
        self.send(Message::text(text.to_string())).await
    }

    pub async fn send_binary(&mut self, data: Vec<u8>) -> ServerResult<()> {
        self.send(Message::binary(data)).await
    }

    pub async fn close(&mut self) -> ServerResult<()> {
        self.stream.close(None).await.map_err(ServerError::from)
    }

    pub fn get_mut(&mut self) -> &mut WebSocketStream<Connection> {
        &mut self.stream
    }
}

impl std::fmt::Debug for WebSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocket").finish_non_exhaustive()
    }
}

/// Value for `Sec-WebSocket-Accept` answering the client's key.
pub(crate) fn accept_key(client_key: &str) -> String {
    derive_accept_key(client_key.trim().as_bytes())
}
