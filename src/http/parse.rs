use crate::error::{ServerError, ServerResult};
use crate::http::{Body, Connection, Method, Request};
use std::collections::HashMap;
use std::io;
use tokio::io::{AsyncBufReadExt, AsyncReadExt};

const MAX_HEAD_LINE: usize = 8 * 1024;
const MAX_HEADERS: usize = 100;

/// Reads one HTTP/1.x request. `Ok(None)` means the peer closed the
/// connection before sending anything.
pub(crate) async fn read_request(
    conn: &mut Connection,
    max_body_size: usize,
) -> ServerResult<Option<Request>> {
    let mut request_line = String::new();
    // Tolerate stray CRLFs between pipelined requests.
    loop {
        request_line.clear();
        if read_line(conn, &mut request_line).await? == 0 {
            return Ok(None);
        }
        if !request_line.trim().is_empty() {
            break;
        }
    }

    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| ServerError::BadRequest("invalid request line".into()))?;
    let method = Method::from_string(method)
        .ok_or_else(|| ServerError::BadRequest(format!("unsupported method {}", method)))?;
    let uri = parts
        .next()
        .ok_or_else(|| ServerError::BadRequest("invalid request line".into()))?
        .to_string();
    let proto = parts.next().unwrap_or("HTTP/1.0").to_string();
    if !proto.starts_with("HTTP/1.") {
        return Err(ServerError::BadRequest(format!("unsupported protocol {}", proto)));
    }

    // Split path and query
    let (path, query) = match uri.split_once('?') {
        Some((path, query)) => (path.to_string(), Request::parse_query(query)),
        None => (uri.clone(), HashMap::new()),
    };

    let mut headers = HashMap::new();
    loop {
        let mut line = String::new();
        if read_line(conn, &mut line).await? == 0 {
            return Err(ServerError::BadRequest("connection closed inside headers".into()));
        }
        if line.trim().is_empty() {
            break;
        }
        if headers.len() >= MAX_HEADERS {
            return Err(ServerError::BadRequest("too many headers".into()));
        }
        match line.trim_end().split_once(':') {
            Some((key, value)) => {
                headers.insert(key.trim().to_lowercase(), value.trim().to_string());
            }
            None => return Err(ServerError::BadRequest(format!("malformed header {:?}", line))),
        }
    }

    // Only Content-Length framing is read; anything else would leave the
    // body on the wire to be parsed as the next request.
    if headers.contains_key("transfer-encoding") {
        return Err(ServerError::BadRequest("transfer-encoding is not supported".into()));
    }

    let content_length = match headers.get("content-length") {
        Some(value) => value
            .parse::<u64>()
            .map_err(|_| ServerError::BadRequest("invalid content-length".into()))?,
        None => 0,
    };
    if content_length > max_body_size as u64 {
        return Err(ServerError::PayloadTooLarge(max_body_size));
    }

    let mut data = Vec::with_capacity(content_length as usize);
    if content_length > 0 {
        (&mut conn.stream)
            .take(content_length)
            .read_to_end(&mut data)
            .await?;
        if (data.len() as u64) < content_length {
            return Err(ServerError::BadRequest("body shorter than content-length".into()));
        }
    }
    let content_type = headers.get("content-type").cloned().unwrap_or_default();

    Ok(Some(Request {
        method,
        uri,
        path,
        query,
        proto,
        headers,
        content_length,
        remote_addr: conn.peer_addr(),
        body: Body {
            content_type,
            data,
        },
    }))
}

async fn read_line(conn: &mut Connection, line: &mut String) -> ServerResult<usize> {
    let read = (&mut conn.stream)
        .take(MAX_HEAD_LINE as u64)
        .read_line(line)
        .await
        .map_err(|e| match e.kind() {
            io::ErrorKind::InvalidData => ServerError::BadRequest("request head is not valid UTF-8".into()),
            _ => ServerError::IoError(e),
        })?;
    if read == MAX_HEAD_LINE && !line.ends_with('\n') {
        return Err(ServerError::BadRequest("header line too long".into()));
    }
    Ok(read)
}
