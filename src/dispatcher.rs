//! Per-request lifecycle.
//!
//! Standard requests go through: acquire a response and a context from their
//! pools and reset them, optionally hijack the connection, run the module
//! begin hooks, the handler, the module end hooks, then recover from any
//! panic, write the response, log, count, and release. WebSocket requests
//! skip the response wrapper and the modules.
//!
//! Panics from hooks and handlers never leave the dispatcher. On the standard
//! path they become a 500 response (or whatever the exception handler
//! writes); on the WebSocket path they only produce a log record.

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::handler::{ExceptionHandler, Handler};
use crate::http::response::{CHARSET_UTF8, HEADER_CONTENT_TYPE, HEADER_SERVER};
use crate::http::{Connection, HttpContext, Method, Request, Response, WebSocket};
use crate::logging::{LOG_TARGET_REQUEST, LOG_TARGET_SERVER};
use crate::module::ModuleChain;
use crate::pool::Pool;
use crate::router::{Params, Route};
use crate::state::GlobalState;
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

/// Diagnostic record emitted for every contained fault.
#[derive(Debug, Serialize)]
pub struct LogJson {
    #[serde(rename = "RequestUrl")]
    pub request_url: String,
    #[serde(rename = "HttpHeader")]
    pub http_header: String,
    #[serde(rename = "HttpBody")]
    pub http_body: String,
}

pub(crate) struct Dispatcher {
    pub(crate) modules: ModuleChain,
    pub(crate) exception_handler: Option<ExceptionHandler>,
    pub(crate) state: Arc<GlobalState>,
    pub(crate) responses: Pool<Response>,
    pub(crate) contexts: Pool<HttpContext>,
    pub(crate) server_name: String,
}

impl Dispatcher {
    pub fn new(config: &ServerConfig, state: Arc<GlobalState>) -> Self {
        Dispatcher {
            modules: ModuleChain::new(),
            exception_handler: None,
            state,
            responses: Pool::with_prefill(config.pool_prefill, config.pool_max_idle),
            contexts: Pool::with_prefill(config.pool_prefill, config.pool_max_idle),
            server_name: config.server_name.clone(),
        }
    }

    /// Runs one standard request. Returns the connection when it can serve
    /// another request, `None` when it was hijacked or the write failed.
    pub async fn dispatch(
        &self,
        route: &Route,
        conn: Connection,
        request: Request,
        params: Params,
        keep_alive: bool,
    ) -> Option<Connection> {
        let started = Instant::now();
        let head_only = request.method == Method::HEAD;

        let mut response = self.responses.acquire();
        response.reset(conn);
        response.set_header(HEADER_SERVER, &self.server_name);
        let mut ctx = self.contexts.acquire();
        ctx.reset(Some(response), request, params);

        if route.hijack {
            // A failed hijack degrades to a 500 and the request carries on.
            if let Some(err) = ctx.hijack().err() {
                write_error_body(&mut ctx, &err.to_string());
            }
        }

        let outcome = AssertUnwindSafe(self.run(route.handler.as_ref(), &mut ctx))
            .catch_unwind()
            .await;
        if let Err(panic) = outcome {
            let fault = ServerError::HandlerPanic(panic_message(panic.as_ref()));
            self.recover(&mut ctx, &fault);
        }

        let mut conn = None;
        if let Some(response) = ctx.response_mut() {
            match response.finish(keep_alive, head_only).await {
                Ok(()) => conn = response.take_sink(),
                Err(err) => tracing::debug!(
                    target: LOG_TARGET_SERVER,
                    error = %err,
                    "response write failed"
                ),
            }
        }

        let elapsed = started.elapsed().as_millis();
        tracing::debug!(
            target: LOG_TARGET_REQUEST,
            url = %ctx.url(),
            "{}",
            access_log_line(&ctx, elapsed)
        );
        self.state.add_request_count(1);

        // Dropping `ctx` hands the context and its response back to their
        // pools; a hijacked connection is closed with it.
        if ctx.take_hijacked().is_some() {
            return None;
        }
        conn
    }

    /// Runs one WebSocket request. The connection is consumed.
    pub async fn dispatch_websocket(&self, handler: &dyn Handler, socket: WebSocket, request: Request) {
        let started = Instant::now();

        let mut ctx = self.contexts.acquire();
        ctx.reset(None, request, Params::new());
        ctx.attach_websocket(socket);

        let outcome = AssertUnwindSafe(handler.call(&mut ctx)).catch_unwind().await;
        if let Err(panic) = outcome {
            let fault = ServerError::HandlerPanic(panic_message(panic.as_ref()));
            let record = LogJson {
                request_url: ctx.url().to_string(),
                http_header: request_header_block(&ctx),
                http_body: fault.to_string(),
            };
            self.log_fault(&record);
        }

        let elapsed = started.elapsed().as_millis();
        tracing::debug!(
            target: LOG_TARGET_REQUEST,
            url = %ctx.url(),
            "{}",
            access_log_line(&ctx, elapsed)
        );
        self.state.add_request_count(1);
    }

    async fn run(&self, handler: &dyn Handler, ctx: &mut HttpContext) {
        self.modules.begin_request(ctx);
        handler.call(ctx).await;
        self.modules.end_request(ctx);
    }

    fn recover(&self, ctx: &mut HttpContext, fault: &ServerError) {
        let record = LogJson {
            request_url: ctx.url().to_string(),
            http_header: ctx
                .response()
                .map(Response::header_block)
                .unwrap_or_default(),
            http_body: fault.to_string(),
        };

        if let Some(response) = ctx.response_mut() {
            response.discard();
        }
        match &self.exception_handler {
            Some(handler) => {
                let handled =
                    std::panic::catch_unwind(AssertUnwindSafe(|| handler(ctx, fault)));
                if let Err(panic) = handled {
                    tracing::error!(
                        target: LOG_TARGET_SERVER,
                        panic = %panic_message(panic.as_ref()),
                        "exception handler panicked"
                    );
                    write_error_body(ctx, &record.http_body);
                }
            }
            None => write_error_body(ctx, &record.http_body),
        }

        self.log_fault(&record);
    }

    fn log_fault(&self, record: &LogJson) {
        let json = serde_json::to_string(record).unwrap_or_else(|err| err.to_string());
        tracing::error!(target: LOG_TARGET_SERVER, "{}", json);
        self.state.add_error_count(1);
    }
}

/// Replaces whatever the handler buffered with a 500 plain-text body. Write
/// failures are dropped: there is nowhere left to report them.
fn write_error_body(ctx: &mut HttpContext, message: &str) {
    if let Some(response) = ctx.response_mut() {
        response.discard();
        response.write_header(500);
        response.set_header(HEADER_CONTENT_TYPE, CHARSET_UTF8);
        if let Err(err) = response.write_string(message) {
            tracing::debug!(target: LOG_TARGET_SERVER, error = %err, "error body not written");
        }
    }
}

fn request_header_block(ctx: &HttpContext) -> String {
    let mut block = String::new();
    for (name, value) in &ctx.request().headers {
        block.push_str(name);
        block.push_str(": ");
        block.push_str(value);
        block.push_str("\r\n");
    }
    block
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// `METHOD REMOTE_IP PROTOCOL STATUS REQ_BYTES RES_BYTES ELAPSED_MS`.
/// WebSocket requests report status and response bytes as 0.
pub fn access_log_line(ctx: &HttpContext, elapsed_ms: u128) -> String {
    let request = ctx.request();
    let (status, res_bytes) = match ctx.response() {
        Some(response) if !ctx.is_websocket() => (response.status(), response.size()),
        _ => (0, 0),
    };
    let remote_ip = ctx
        .remote_ip()
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{} {} {} {} {} {} {}",
        request.method,
        remote_ip,
        request.proto,
        status,
        request.content_length,
        res_bytes,
        elapsed_ms
    )
}
