use std::fmt;
use std::io;

#[derive(Debug)]
pub enum ServerError {
    IoError(io::Error),
    BadRequest(String),
    PayloadTooLarge(usize),
    HijackUnsupported(String),
    HandlerPanic(String),
    WebSocket(String),
    InternalError(String),
}

impl ServerError {
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::BadRequest(_) => 400,
            ServerError::PayloadTooLarge(_) => 413,
            ServerError::IoError(_)
            | ServerError::HijackUnsupported(_)
            | ServerError::HandlerPanic(_)
            | ServerError::WebSocket(_)
            | ServerError::InternalError(_) => 500,
        }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::IoError(err) => write!(f, "IO error: {}", err),
            ServerError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ServerError::PayloadTooLarge(limit) => {
                write!(f, "Payload too large: body exceeds {} bytes", limit)
            }
            ServerError::HijackUnsupported(reason) => write!(f, "Hijack unsupported: {}", reason),
            // The panic payload is the fault description; it is written verbatim
            // as the 500 body, so no prefix here.
            ServerError::HandlerPanic(msg) => write!(f, "{}", msg),
            ServerError::WebSocket(msg) => write!(f, "WebSocket error: {}", msg),
            ServerError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ServerError {
    fn from(err: io::Error) -> Self {
        ServerError::IoError(err)
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        ServerError::InternalError(format!("JSON serialization error: {}", err))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ServerError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ServerError::WebSocket(err.to_string())
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
