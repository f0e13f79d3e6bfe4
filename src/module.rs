//! Request lifecycle modules.
//!
//! A [`Module`] is a pair of optional hooks run around every standard HTTP
//! request: all begin hooks in registration order, then the handler, then all
//! end hooks in registration order. Hooks run inline on the request task. A
//! panicking hook unwinds to the dispatcher like a panicking handler, so the
//! remaining hooks of that request are skipped.

use crate::http::HttpContext;
use std::sync::Arc;

pub type Hook = Arc<dyn Fn(&mut HttpContext) + Send + Sync>;

#[derive(Clone, Default)]
pub struct Module {
    on_begin_request: Option<Hook>,
    on_end_request: Option<Hook>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs before the handler.
    pub fn on_begin_request<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut HttpContext) + Send + Sync + 'static,
    {
        self.on_begin_request = Some(Arc::new(hook));
        self
    }

    /// Runs after the handler returns normally.
    pub fn on_end_request<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut HttpContext) + Send + Sync + 'static,
    {
        self.on_end_request = Some(Arc::new(hook));
        self
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("on_begin_request", &self.on_begin_request.is_some())
            .field("on_end_request", &self.on_end_request.is_some())
            .finish()
    }
}

#[derive(Clone, Default, Debug)]
pub(crate) struct ModuleChain {
    modules: Vec<Module>,
}

impl ModuleChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, module: Module) {
        self.modules.push(module);
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn begin_request(&self, ctx: &mut HttpContext) {
        for hook in self.modules.iter().filter_map(|m| m.on_begin_request.as_ref()) {
            hook(ctx);
        }
    }

    pub fn end_request(&self, ctx: &mut HttpContext) {
        for hook in self.modules.iter().filter_map(|m| m.on_end_request.as_ref()) {
            hook(ctx);
        }
    }
}
