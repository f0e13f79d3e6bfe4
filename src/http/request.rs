use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

#[derive(Eq, Hash, PartialEq, Copy, Clone, Debug, Default)]
pub enum Method {
    #[default]
    GET,
    POST,
    PUT,
    DELETE,
    HEAD,
    CONNECT,
    OPTIONS,
    TRACE,
    PATCH,
}

impl Method {
    /// Parses a request-line method token. Method names are case-sensitive.
    pub fn from_string(s: &str) -> Option<Method> {
        match s {
            "GET" => Some(Method::GET),
            "POST" => Some(Method::POST),
            "PUT" => Some(Method::PUT),
            "DELETE" => Some(Method::DELETE),
            "HEAD" => Some(Method::HEAD),
            "CONNECT" => Some(Method::CONNECT),
            "OPTIONS" => Some(Method::OPTIONS),
            "TRACE" => Some(Method::TRACE),
            "PATCH" => Some(Method::PATCH),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::CONNECT => "CONNECT",
            Method::OPTIONS => "OPTIONS",
            Method::TRACE => "TRACE",
            Method::PATCH => "PATCH",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
pub struct Body {
    pub(crate) content_type: String,
    pub(crate) data: Vec<u8>,
}

impl Body {
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn json<T>(&self) -> Option<T>
    where
        T: serde::de::DeserializeOwned,
    {
        if self.content_type.starts_with("application/json") {
            serde_json::from_slice(&self.data).ok()
        } else {
            None
        }
    }

    pub fn x_www_form_urlencoded<T>(&self) -> Option<T>
    where
        T: serde::de::DeserializeOwned,
    {
        if self.content_type.starts_with("application/x-www-form-urlencoded") {
            serde_json::from_value(Self::parse_urlencoded(&self.data)?).ok()
        } else {
            None
        }
    }

    fn parse_urlencoded(data: &[u8]) -> Option<Value> {
        let data_str = String::from_utf8_lossy(data);
        let mut json = Map::new();
        for pair in data_str.split('&').filter(|s| !s.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = decode_component(key)?;
            let value = decode_component(value)?;
            json.insert(key, Value::String(value));
        }
        Some(Value::Object(json))
    }
}

/// Decodes one `application/x-www-form-urlencoded` component.
pub(crate) fn decode_component(raw: &str) -> Option<String> {
    let raw = raw.replace('+', " ");
    urlencoding::decode(&raw).ok().map(|s| s.into_owned())
}

/// An inbound HTTP request as read off the connection.
#[derive(Debug, Default)]
pub struct Request {
    pub method: Method,
    /// Request target exactly as sent, path plus query.
    pub uri: String,
    pub path: String,
    pub query: HashMap<String, String>,
    /// Protocol token from the request line, e.g. `HTTP/1.1`.
    pub proto: String,
    /// Header names are stored lower-cased.
    pub headers: HashMap<String, String>,
    pub content_length: u64,
    pub remote_addr: Option<SocketAddr>,
    pub body: Body,
}

impl Request {
    pub fn get_header(&self, key: &str) -> Option<&str> {
        match self.headers.get(key) {
            Some(v) => Some(v),
            None => self
                .headers
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(key))
                .map(|(_, v)| v.as_str()),
        }
    }

    pub fn get_query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// Whether the client expects the connection to stay open after this
    /// request: on by default for HTTP/1.1, off for HTTP/1.0.
    pub fn wants_keep_alive(&self) -> bool {
        let connection = self.get_header("connection").unwrap_or("");
        let has = |token: &str| {
            connection
                .split(',')
                .any(|t| t.trim().eq_ignore_ascii_case(token))
        };
        if self.proto == "HTTP/1.0" {
            has("keep-alive")
        } else {
            !has("close")
        }
    }

    pub(crate) fn parse_query(query: &str) -> HashMap<String, String> {
        query
            .split('&')
            .filter(|s| !s.is_empty())
            .filter_map(|pair| {
                let mut parts = pair.splitn(2, '=');
                Some((
                    decode_component(parts.next()?)?,
                    decode_component(parts.next().unwrap_or(""))?,
                ))
            })
            .collect()
    }
}
