//! Application is the entry point for a portico server.
//!
//! It owns the router, the WebSocket handler table, the module chain and the
//! global counters, and runs the accept loop. Every accepted connection is
//! read request by request; each request is classified as a WebSocket upgrade
//! or a standard request and handed to the dispatcher.
//!
//! # Examples
//!
//! ```rust,no_run
//! use portico::Application;
//!
//! let mut app = Application::new();
//! app.get("/", |ctx| Box::pin(async move {
//!     let _ = ctx.write_string("Hello!");
//! }));
//! app.listen("127.0.0.1:3000").unwrap();
//! ```

use crate::config::{ServerConfig, TlsConfig};
use crate::dispatcher::Dispatcher;
use crate::error::{ServerError, ServerResult};
use crate::handler::{ExceptionHandler, Handler, SharedHandler};
use crate::http::parse::read_request;
use crate::http::response::{CHARSET_UTF8, HEADER_CONTENT_TYPE, HEADER_SERVER};
use crate::http::websocket::accept_key;
use crate::http::{Connection, HttpContext, Method, Request, WebSocket};
use crate::logging::LOG_TARGET_SERVER;
use crate::module::Module;
use crate::pool::PoolStats;
use crate::router::{RouteMatch, Router};
use crate::state::GlobalState;
use futures::future::BoxFuture;
use rustls::ServerConfig as RustlsConfig;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::runtime::Runtime;
use tokio::sync::Semaphore;
use tokio_rustls::TlsAcceptor;

/// The main application struct that represents your web server.
///
/// Routes, WebSocket handlers, modules and the exception handler are all
/// registered before [`Application::listen`] or [`Application::serve`] is
/// called; after that the application is shared read-only between
/// connection tasks.
pub struct Application {
    config: ServerConfig,
    router: Router,
    websockets: HashMap<String, SharedHandler>,
    dispatcher: Dispatcher,
    tls_config: Option<Arc<TlsConfig>>,
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

impl Application {
    /// Creates a new Application instance with the default configuration.
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        let dispatcher = Dispatcher::new(&config, Arc::new(GlobalState::new()));
        Self {
            config,
            router: Router::new(),
            websockets: HashMap::new(),
            dispatcher,
            tls_config: None,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn max_connections(&mut self, max_connections: usize) -> &mut Self {
        self.config.max_connections = max_connections;
        self
    }

    pub fn keep_alive(&mut self, keep_alive: Duration) -> &mut Self {
        self.config.keep_alive_secs = keep_alive.as_secs();
        self
    }

    pub fn max_body_size(&mut self, max_body_size: usize) -> &mut Self {
        self.config.max_body_size = max_body_size;
        self
    }

    /// Sets the value of the `Server` header.
    pub fn server_name(&mut self, name: &str) -> &mut Self {
        self.config.server_name = name.to_string();
        self.dispatcher.server_name = self.config.server_name.clone();
        self
    }

    /// Configure TLS for HTTPS support
    pub fn with_tls<P: AsRef<Path>>(&mut self, cert_file: P, key_file: P) -> &mut Self {
        self.tls_config = Some(Arc::new(TlsConfig::new(cert_file, key_file)));
        self
    }

    /// Request and error counters, shared with the running server.
    pub fn state(&self) -> Arc<GlobalState> {
        Arc::clone(&self.dispatcher.state)
    }

    /// Counters of the response pool.
    pub fn response_pool_stats(&self) -> PoolStats {
        self.dispatcher.responses.stats()
    }

    /// Counters of the request context pool.
    pub fn context_pool_stats(&self) -> PoolStats {
        self.dispatcher.contexts.stats()
    }

    pub fn get<F>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, ()> + Send + Sync + 'static,
    {
        self.router.get(path, handler);
        self
    }

    pub fn head<F>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, ()> + Send + Sync + 'static,
    {
        self.router.head(path, handler);
        self
    }

    pub fn options<F>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, ()> + Send + Sync + 'static,
    {
        self.router.options(path, handler);
        self
    }

    pub fn post<F>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, ()> + Send + Sync + 'static,
    {
        self.router.post(path, handler);
        self
    }

    pub fn put<F>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, ()> + Send + Sync + 'static,
    {
        self.router.put(path, handler);
        self
    }

    pub fn patch<F>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, ()> + Send + Sync + 'static,
    {
        self.router.patch(path, handler);
        self
    }

    pub fn delete<F>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, ()> + Send + Sync + 'static,
    {
        self.router.delete(path, handler);
        self
    }

    pub fn handle<F>(&mut self, method: Method, path: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, ()> + Send + Sync + 'static,
    {
        self.router.handle(method, path, handler);
        self
    }

    /// Registers any [`Handler`] implementation.
    pub fn route<H: Handler>(&mut self, method: Method, path: &str, handler: H) -> &mut Self {
        self.router.route(method, path, handler);
        self
    }

    /// Registers a GET route whose handler takes over the raw connection.
    /// When the transport cannot be hijacked the request gets a 500 and the
    /// handler still runs.
    pub fn hijack<F>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, ()> + Send + Sync + 'static,
    {
        self.router.hijack(path, handler);
        self
    }

    /// Serves the files below `dir`; `pattern` must end with `*name`.
    ///
    /// ```rust,no_run
    /// # let mut app = portico::Application::new();
    /// app.serve_files("/static/*filepath", "public");
    /// ```
    pub fn serve_files<P: Into<PathBuf>>(&mut self, pattern: &str, dir: P) -> &mut Self {
        self.router.serve_files(pattern, dir);
        self
    }

    /// Mounts a router at a specific path prefix.
    pub fn mount(&mut self, prefix: &str, router: Router) -> &mut Self {
        self.router.mount(prefix, router);
        self
    }

    /// Registers a WebSocket handler for an exact path. Upgrade requests never
    /// reach the router and modules do not run for them.
    pub fn websocket<F>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, ()> + Send + Sync + 'static,
    {
        self.websockets.insert(path.to_string(), Arc::new(handler));
        self
    }

    /// Appends a module; hooks run in registration order.
    pub fn module(&mut self, module: Module) -> &mut Self {
        self.dispatcher.modules.add(module);
        self
    }

    /// Replaces the default 500 body written when a handler or hook panics.
    pub fn on_exception<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&mut HttpContext, &ServerError) + Send + Sync + 'static,
    {
        let handler: ExceptionHandler = Arc::new(handler);
        self.dispatcher.exception_handler = Some(handler);
        self
    }

    /// Starts the server on its own runtime and blocks.
    ///
    /// # Arguments
    /// * `addr` - Address to listen on (e.g. "127.0.0.1:3000")
    pub fn listen(self, addr: &str) -> Result<(), Box<dyn std::error::Error>> {
        let runtime = Runtime::new()?;
        runtime.block_on(async {
            let listener = TcpListener::bind(addr).await?;
            self.serve(listener).await
        })
    }

    /// Runs the accept loop on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), Box<dyn std::error::Error>> {
        let tls_acceptor = match &self.tls_config {
            Some(tls_config) => {
                let certs = tls_config.load_certs()?;
                let key = tls_config.load_key()?;
                let config = RustlsConfig::builder()
                    .with_no_client_auth()
                    .with_single_cert(certs, key)?;
                Some(TlsAcceptor::from(Arc::new(config)))
            }
            None => None,
        };

        let addr = listener.local_addr()?;
        tracing::info!(
            target: LOG_TARGET_SERVER,
            modules = self.dispatcher.modules.len(),
            websockets = self.websockets.len(),
            "server running on {}://{}",
            if tls_acceptor.is_some() { "https" } else { "http" },
            addr
        );

        let app = Arc::new(self);
        let slots = Arc::new(Semaphore::new(app.config.max_connections));
        loop {
            // Wait for a free slot before accepting.
            let permit = Arc::clone(&slots).acquire_owned().await?;
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!(target: LOG_TARGET_SERVER, error = %e, "accept failed");
                    continue;
                }
            };

            let app = Arc::clone(&app);
            let acceptor = tls_acceptor.clone();
            tokio::spawn(async move {
                let result = match acceptor {
                    Some(acceptor) => match acceptor.accept(stream).await {
                        Ok(tls_stream) => {
                            let conn = Connection::new(tls_stream, Some(peer)).without_hijack();
                            app.serve_connection(conn).await
                        }
                        Err(e) => {
                            tracing::warn!(
                                target: LOG_TARGET_SERVER,
                                peer = %peer,
                                error = %e,
                                "TLS handshake failed"
                            );
                            Ok(())
                        }
                    },
                    None => app.serve_connection(Connection::new(stream, Some(peer))).await,
                };

                if let Err(e) = result {
                    tracing::debug!(target: LOG_TARGET_SERVER, peer = %peer, error = %e, "connection error");
                }
                drop(permit);
            });
        }
    }

    /// Serves requests from one connection until it closes, goes idle for
    /// longer than the keep-alive timeout, opts out of keep-alive, is
    /// upgraded to a WebSocket or is hijacked.
    pub async fn serve_connection(&self, mut conn: Connection) -> ServerResult<()> {
        let mut first = true;
        loop {
            let wait = if first {
                self.config.read_timeout()
            } else {
                self.config.keep_alive()
            };
            let next = match tokio::time::timeout(wait, read_request(&mut conn, self.config.max_body_size)).await {
                Ok(next) => next,
                Err(_) => return Ok(()),
            };
            first = false;

            let request = match next {
                Ok(Some(request)) => request,
                Ok(None) => return Ok(()),
                Err(ServerError::IoError(e)) => return Err(ServerError::IoError(e)),
                Err(e) => {
                    tracing::debug!(target: LOG_TARGET_SERVER, error = %e, "rejected request");
                    self.respond(conn, e.status_code(), &e.to_string(), &[], false, false)
                        .await;
                    return Ok(());
                }
            };

            if is_upgrade(&request) {
                self.serve_websocket(conn, request).await;
                return Ok(());
            }

            match self.serve_http(conn, request).await {
                Some(next) => conn = next,
                None => return Ok(()),
            }
        }
    }

    async fn serve_http(&self, conn: Connection, request: Request) -> Option<Connection> {
        let keep_alive = request.wants_keep_alive();
        let head_only = request.method == Method::HEAD;
        match self.router.lookup(request.method, &request.path) {
            RouteMatch::Found(route, params) => {
                self.dispatcher
                    .dispatch(route, conn, request, params, keep_alive)
                    .await
                    .filter(|_| keep_alive)
            }
            RouteMatch::MethodNotAllowed(allowed) => {
                let allow = allowed
                    .iter()
                    .map(Method::as_str)
                    .collect::<Vec<_>>()
                    .join(", ");
                self.respond(
                    conn,
                    405,
                    "Method Not Allowed",
                    &[("Allow", allow.as_str())],
                    keep_alive,
                    head_only,
                )
                .await
            }
            RouteMatch::NotFound => {
                self.respond(conn, 404, "404 page not found", &[], keep_alive, head_only)
                    .await
            }
        }
    }

    async fn serve_websocket(&self, mut conn: Connection, request: Request) {
        let Some(handler) = self.websockets.get(&request.path) else {
            self.respond(conn, 404, "404 page not found", &[], false, false)
                .await;
            return;
        };
        let Some(key) = request.get_header("sec-websocket-key") else {
            self.respond(conn, 400, "missing Sec-WebSocket-Key", &[], false, false)
                .await;
            return;
        };

        let handshake = format!(
            "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {}\r\n\r\n",
            accept_key(key)
        );
        let written = async {
            conn.write_all(handshake.as_bytes()).await?;
            conn.flush().await
        }
        .await;
        if let Err(e) = written {
            tracing::debug!(target: LOG_TARGET_SERVER, error = %e, "websocket handshake failed");
            return;
        }

        let socket = WebSocket::from_upgraded(conn).await;
        self.dispatcher
            .dispatch_websocket(handler.as_ref(), socket, request)
            .await;
    }

    /// Writes a server-generated plain-text response through a pooled
    /// response.
    async fn respond(
        &self,
        conn: Connection,
        status: u16,
        body: &str,
        headers: &[(&str, &str)],
        keep_alive: bool,
        head_only: bool,
    ) -> Option<Connection> {
        let mut response = self.dispatcher.responses.acquire();
        response.reset(conn);
        response.set_header(HEADER_SERVER, &self.config.server_name);
        response.write_header(status);
        response.set_header(HEADER_CONTENT_TYPE, CHARSET_UTF8);
        for (name, value) in headers {
            response.set_header(name, value);
        }
        if let Err(e) = response.write_string(body) {
            tracing::debug!(target: LOG_TARGET_SERVER, error = %e, "response body not written");
        }
        match response.finish(keep_alive, head_only).await {
            Ok(()) if keep_alive => response.take_sink(),
            Ok(()) => None,
            Err(e) => {
                tracing::debug!(target: LOG_TARGET_SERVER, error = %e, "response write failed");
                None
            }
        }
    }
}

/// A request is a WebSocket upgrade only when its `Connection` header is
/// exactly `Upgrade`.
fn is_upgrade(request: &Request) -> bool {
    request.get_header("connection") == Some("Upgrade")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with_connection(value: Option<&str>) -> Request {
        let mut request = Request::default();
        if let Some(value) = value {
            request.headers.insert("connection".into(), value.into());
        }
        request
    }

    #[test]
    fn upgrade_classification_is_exact() {
        assert!(is_upgrade(&request_with_connection(Some("Upgrade"))));
        assert!(!is_upgrade(&request_with_connection(Some("upgrade"))));
        assert!(!is_upgrade(&request_with_connection(Some("keep-alive, Upgrade"))));
        assert!(!is_upgrade(&request_with_connection(Some("keep-alive"))));
        assert!(!is_upgrade(&request_with_connection(None)));
    }

    #[test]
    fn builder_setters_update_the_config() {
        let mut app = Application::new();
        app.max_connections(8)
            .keep_alive(Duration::from_secs(30))
            .max_body_size(1024)
            .server_name("edge");
        let config = app.config();
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.keep_alive_secs, 30);
        assert_eq!(config.max_body_size, 1024);
        assert_eq!(config.server_name, "edge");
        assert_eq!(app.dispatcher.server_name, "edge");
    }

    #[test]
    fn prefilled_pools_start_idle() {
        let config = ServerConfig {
            pool_prefill: 4,
            ..ServerConfig::default()
        };
        let app = Application::with_config(config);
        assert_eq!(app.response_pool_stats().created, 4);
        assert_eq!(app.context_pool_stats().acquired, 0);
    }
}
