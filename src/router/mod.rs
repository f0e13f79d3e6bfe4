mod files;
mod params;

pub use files::FileServer;
pub use params::Params;

use crate::handler::{Handler, SharedHandler};
use crate::http::{HttpContext, Method};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct Route {
    pub(crate) handler: SharedHandler,
    /// Hijack the connection before hooks and handler run.
    pub(crate) hijack: bool,
}

pub(crate) enum RouteMatch<'r> {
    Found(&'r Route, Params),
    MethodNotAllowed(Vec<Method>),
    NotFound,
}

/// Method + path routing table.
///
/// Patterns are made of static segments, `:name` segments matching exactly
/// one segment, and an optional trailing `*name` segment matching the rest of
/// the path. Static patterns are tried first, then patterned ones in
/// registration order.
#[derive(Clone, Default)]
pub struct Router {
    pub(crate) routes: HashMap<String, HashMap<Method, Route>>,
    pub(crate) dynamic_routes: Vec<String>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<F>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, ()> + Send + Sync + 'static,
    {
        self.add(Method::GET, path, handler, false);
        self
    }

    pub fn head<F>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, ()> + Send + Sync + 'static,
    {
        self.add(Method::HEAD, path, handler, false);
        self
    }

    pub fn options<F>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, ()> + Send + Sync + 'static,
    {
        self.add(Method::OPTIONS, path, handler, false);
        self
    }

    pub fn post<F>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, ()> + Send + Sync + 'static,
    {
        self.add(Method::POST, path, handler, false);
        self
    }

    pub fn put<F>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, ()> + Send + Sync + 'static,
    {
        self.add(Method::PUT, path, handler, false);
        self
    }

    pub fn patch<F>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, ()> + Send + Sync + 'static,
    {
        self.add(Method::PATCH, path, handler, false);
        self
    }

    pub fn delete<F>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, ()> + Send + Sync + 'static,
    {
        self.add(Method::DELETE, path, handler, false);
        self
    }

    pub fn handle<F>(&mut self, method: Method, path: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, ()> + Send + Sync + 'static,
    {
        self.add(method, path, handler, false);
        self
    }

    /// Registers any [`Handler`] implementation, e.g. a struct holding state.
    pub fn route<H: Handler>(&mut self, method: Method, path: &str, handler: H) -> &mut Self {
        self.add(method, path, handler, false);
        self
    }

    /// Adds every route of `other` below `prefix`.
    pub fn mount(&mut self, prefix: &str, other: Router) {
        let prefix = prefix.trim_end_matches('/');
        let Router {
            mut routes,
            dynamic_routes,
        } = other;
        // Patterned routes first, in their registration order.
        let statics: Vec<String> = routes
            .keys()
            .filter(|p| !dynamic_routes.contains(*p))
            .cloned()
            .collect();
        for path in dynamic_routes.into_iter().chain(statics) {
            let Some(methods) = routes.remove(&path) else {
                continue;
            };
            let full = normalize(&format!("{}{}", prefix, path));
            for (method, route) in methods {
                self.insert(method, full.clone(), route);
            }
        }
    }

    /// Registers a GET route that takes over the raw connection.
    pub fn hijack<F>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, ()> + Send + Sync + 'static,
    {
        self.add(Method::GET, path, handler, true);
        self
    }

    /// Serves files below `dir` for GET requests matching `pattern`, which must
    /// end in a catch-all segment, e.g. `/static/*filepath`.
    pub fn serve_files<P: Into<PathBuf>>(&mut self, pattern: &str, dir: P) -> &mut Self {
        let param = pattern
            .rsplit('/')
            .next()
            .and_then(|last| last.strip_prefix('*'))
            .filter(|name| !name.is_empty());
        match param {
            Some(param) => {
                let server = FileServer::new(dir, param);
                self.add(Method::GET, pattern, server, false);
            }
            None => {
                tracing::warn!(
                    target: crate::logging::LOG_TARGET_SERVER,
                    pattern,
                    "serve_files pattern must end with a *name segment; route ignored"
                );
            }
        }
        self
    }

    fn add<H: Handler>(&mut self, method: Method, path: &str, handler: H, hijack: bool) {
        let route = Route {
            handler: Arc::new(handler),
            hijack,
        };
        self.insert(method, normalize(path), route);
    }

    fn insert(&mut self, method: Method, path: String, route: Route) {
        let is_dynamic = path.split('/').any(|s| s.starts_with(':') || s.starts_with('*'));
        let methods = self.routes.entry(path.clone()).or_default();
        if methods.is_empty() && is_dynamic {
            self.dynamic_routes.push(path);
        }
        methods.insert(method, route);
    }

    pub(crate) fn lookup(&self, method: Method, path: &str) -> RouteMatch<'_> {
        let path = normalize(path);
        let mut allowed = Vec::new();

        if let Some(methods) = self.routes.get(&path) {
            if !self.dynamic_routes.contains(&path) {
                match Self::pick(methods, method) {
                    Some(route) => return RouteMatch::Found(route, Params::new()),
                    None => allowed.extend(methods.keys().copied()),
                }
            }
        }

        for pattern in &self.dynamic_routes {
            let Some(params) = match_pattern(pattern, &path) else {
                continue;
            };
            if let Some(methods) = self.routes.get(pattern) {
                match Self::pick(methods, method) {
                    Some(route) => return RouteMatch::Found(route, params),
                    None => allowed.extend(methods.keys().copied()),
                }
            }
        }

        if allowed.is_empty() {
            RouteMatch::NotFound
        } else {
            allowed.sort_by_key(|m| m.as_str());
            allowed.dedup();
            RouteMatch::MethodNotAllowed(allowed)
        }
    }

    // HEAD falls back to the GET route.
    fn pick(methods: &HashMap<Method, Route>, method: Method) -> Option<&Route> {
        methods.get(&method).or_else(|| {
            if method == Method::HEAD {
                methods.get(&Method::GET)
            } else {
                None
            }
        })
    }
}

fn normalize(path: &str) -> String {
    let path = path.trim_end_matches('/');
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

fn match_pattern(pattern: &str, path: &str) -> Option<Params> {
    let pattern_parts: Vec<&str> = pattern.split('/').collect();
    let path_parts: Vec<&str> = path.split('/').collect();
    let mut params = Params::new();

    for (i, pattern_part) in pattern_parts.iter().enumerate() {
        if let Some(name) = pattern_part.strip_prefix('*') {
            let rest = path_parts.get(i..).unwrap_or(&[]).join("/");
            params.push(name, decode_segment(&format!("/{}", rest)));
            return Some(params);
        }
        let path_part = path_parts.get(i)?;
        if let Some(name) = pattern_part.strip_prefix(':') {
            if path_part.is_empty() {
                return None;
            }
            params.push(name, decode_segment(path_part));
        } else if pattern_part != path_part {
            return None;
        }
    }

    if pattern_parts.len() == path_parts.len() {
        Some(params)
    } else {
        None
    }
}

fn decode_segment(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop<'a>(_ctx: &'a mut HttpContext) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }

    fn found<'r>(m: RouteMatch<'r>) -> Option<(&'r Route, Params)> {
        match m {
            RouteMatch::Found(route, params) => Some((route, params)),
            _ => None,
        }
    }

    #[test]
    fn static_routes_match_with_or_without_trailing_slash() {
        let mut router = Router::new();
        router.get("/ping/", noop);
        assert!(found(router.lookup(Method::GET, "/ping")).is_some());
        assert!(found(router.lookup(Method::GET, "/ping/")).is_some());
        assert!(matches!(router.lookup(Method::GET, "/pong"), RouteMatch::NotFound));
    }

    #[test]
    fn named_segments_capture_in_order() {
        let mut router = Router::new();
        router.get("/users/:user/posts/:post", noop);
        let (_, params) = found(router.lookup(Method::GET, "/users/ann/posts/7")).unwrap();
        let pairs: Vec<_> = params.iter().collect();
        assert_eq!(pairs, [("user", "ann"), ("post", "7")]);
        assert!(matches!(
            router.lookup(Method::GET, "/users/ann/posts"),
            RouteMatch::NotFound
        ));
    }

    #[test]
    fn catch_all_takes_the_rest_of_the_path() {
        let mut router = Router::new();
        router.get("/src/*filepath", noop);
        let (_, params) = found(router.lookup(Method::GET, "/src/css/site%20main.css")).unwrap();
        assert_eq!(params.get("filepath"), Some("/css/site main.css"));
        let (_, params) = found(router.lookup(Method::GET, "/src")).unwrap();
        assert_eq!(params.get("filepath"), Some("/"));
    }

    #[test]
    fn wrong_method_reports_allowed_methods() {
        let mut router = Router::new();
        router.get("/items/:id", noop).delete("/items/:id", noop);
        match router.lookup(Method::POST, "/items/3") {
            RouteMatch::MethodNotAllowed(allowed) => {
                assert_eq!(allowed, vec![Method::DELETE, Method::GET])
            }
            _ => panic!("expected 405"),
        }
    }

    #[test]
    fn head_falls_back_to_get_and_hijack_routes_are_flagged() {
        let mut router = Router::new();
        router.get("/page", noop).hijack("/raw", noop);
        assert!(found(router.lookup(Method::HEAD, "/page")).is_some());
        let (route, _) = found(router.lookup(Method::GET, "/raw")).unwrap();
        assert!(route.hijack);
    }

    #[test]
    fn mount_prefixes_every_route() {
        let mut api = Router::new();
        api.get("/", noop).get("/users/:id", noop);
        let mut router = Router::new();
        router.mount("/api/", api);
        assert!(found(router.lookup(Method::GET, "/api")).is_some());
        let (_, params) = found(router.lookup(Method::GET, "/api/users/5")).unwrap();
        assert_eq!(params.get("id"), Some("5"));
    }

    #[test]
    fn serve_files_requires_a_catch_all() {
        let mut router = Router::new();
        router.serve_files("/static", "/tmp");
        assert!(router.routes.is_empty());
        router.serve_files("/static/*filepath", "/tmp");
        assert!(found(router.lookup(Method::GET, "/static/a.txt")).is_some());
    }
}
