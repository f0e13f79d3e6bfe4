use crate::error::ServerResult;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader as StdBufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SERVER_NAME: &str = "portico";

/// Server tuning. Every field has a default, so a partial JSON document is
/// enough to override a few values.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub max_connections: usize,
    /// How long an idle keep-alive connection waits for its next request.
    pub keep_alive_secs: u64,
    /// Bound on reading the first request of a new connection.
    pub read_timeout_ms: u64,
    pub max_body_size: usize,
    /// Value of the `Server` header on standard responses.
    pub server_name: String,
    /// Contexts and responses built before the first request.
    pub pool_prefill: usize,
    pub pool_max_idle: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_connections: 256,
            keep_alive_secs: 5,
            read_timeout_ms: 10_000,
            max_body_size: 2 * 1024 * 1024,
            server_name: DEFAULT_SERVER_NAME.to_string(),
            pool_prefill: 16,
            pool_max_idle: 1024,
        }
    }
}

impl ServerConfig {
    pub fn from_json(json: &str) -> ServerResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// TLS configuration for HTTPS support
pub struct TlsConfig {
    cert_file: PathBuf,
    key_file: PathBuf,
}

impl TlsConfig {
    pub fn new<P: AsRef<Path>>(cert_file: P, key_file: P) -> Self {
        Self {
            cert_file: cert_file.as_ref().to_path_buf(),
            key_file: key_file.as_ref().to_path_buf(),
        }
    }

    pub(crate) fn load_certs(&self) -> Result<Vec<CertificateDer<'static>>, Box<dyn std::error::Error>> {
        let cert_file = File::open(&self.cert_file)?;
        let mut reader = StdBufReader::new(cert_file);
        let certs = rustls_pemfile::certs(&mut reader).collect::<Result<Vec<_>, _>>()?;
        if certs.is_empty() {
            return Err(format!("no certificates found in {}", self.cert_file.display()).into());
        }
        Ok(certs)
    }

    pub(crate) fn load_key(&self) -> Result<PrivateKeyDer<'static>, Box<dyn std::error::Error>> {
        let key_file = File::open(&self.key_file)?;
        let mut reader = StdBufReader::new(key_file);
        let key = rustls_pemfile::private_key(&mut reader)?.ok_or("No private key found")?;
        Ok(key)
    }
}
