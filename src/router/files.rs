use crate::handler::Handler;
use crate::http::HttpContext;
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Serves files from a directory. The file path comes from the catch-all
/// route parameter; anything resolving outside the root is a 404.
pub struct FileServer {
    root: PathBuf,
    param: String,
}

impl FileServer {
    pub fn new<P: Into<PathBuf>>(root: P, param: &str) -> Self {
        FileServer {
            root: root.into(),
            param: param.to_string(),
        }
    }

    async fn serve(&self, ctx: &mut HttpContext) {
        let relative = ctx.param(&self.param).unwrap_or("/").to_string();
        match self.resolve(&relative).await {
            Some(path) => match tokio::fs::read(&path).await {
                Ok(contents) => {
                    self.set_file_headers(ctx, &path).await;
                    if let Err(err) = ctx.write(&contents) {
                        tracing::debug!(
                            target: crate::logging::LOG_TARGET_SERVER,
                            error = %err,
                            "static file body not written"
                        );
                    }
                }
                Err(_) => not_found(ctx),
            },
            None => not_found(ctx),
        }
    }

    async fn resolve(&self, relative: &str) -> Option<PathBuf> {
        let root = tokio::fs::canonicalize(&self.root).await.ok()?;
        let candidate = tokio::fs::canonicalize(root.join(relative.trim_start_matches('/')))
            .await
            .ok()?;
        let metadata = tokio::fs::metadata(&candidate).await.ok()?;
        if candidate.starts_with(&root) && metadata.is_file() {
            Some(candidate)
        } else {
            None
        }
    }

    async fn set_file_headers(&self, ctx: &mut HttpContext, path: &Path) {
        let content_type = match path.extension().and_then(|e| e.to_str()) {
            Some("html") => "text/html",
            Some("css") => "text/css",
            Some("js") => "text/javascript",
            Some("json") => "application/json",
            Some("txt") => "text/plain; charset=utf-8",
            Some("png") => "image/png",
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("gif") => "image/gif",
            Some("svg") => "image/svg+xml",
            Some("ico") => "image/x-icon",
            _ => "application/octet-stream",
        };
        ctx.set_header("Content-Type", content_type);
        ctx.set_header("Cache-Control", "public, max-age=31536000");

        if let Ok(metadata) = tokio::fs::metadata(path).await {
            if let Ok(modified) = metadata.modified() {
                ctx.set_header("Last-Modified", &httpdate::fmt_http_date(modified));
                let secs = modified
                    .duration_since(SystemTime::UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                ctx.set_header("ETag", &format!("\"{}-{}\"", metadata.len(), secs));
            }
        }
    }
}

fn not_found(ctx: &mut HttpContext) {
    ctx.write_header(404);
    ctx.set_header("Content-Type", crate::http::response::CHARSET_UTF8);
    if let Err(err) = ctx.write_string("404 page not found") {
        tracing::debug!(
            target: crate::logging::LOG_TARGET_SERVER,
            error = %err,
            "not-found body not written"
        );
    }
}

impl Handler for FileServer {
    fn call<'a>(&'a self, ctx: &'a mut HttpContext) -> BoxFuture<'a, ()> {
        Box::pin(self.serve(ctx))
    }
}
