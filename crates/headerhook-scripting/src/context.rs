//! Per-request hook state and the request handle scripts operate on

use headerhook_core::{HeaderMap, HttpRequest, StatusCode};
use parking_lot::Mutex;
use rhai::{Dynamic, Map};
use std::sync::Arc;

/// Optional per-request value
#[derive(Debug, Clone, PartialEq)]
pub enum Slot<T> {
    /// Nothing stored yet
    Unset,
    /// Stored value
    Set(T),
}

impl<T> Slot<T> {
    /// Whether a value is stored
    pub fn is_set(&self) -> bool {
        matches!(self, Self::Set(_))
    }

    /// Stored value, if any
    pub fn get(&self) -> Option<&T> {
        match self {
            Self::Set(value) => Some(value),
            Self::Unset => None,
        }
    }
}

/// Hook state carried in the request extensions for the lifetime of one request
#[derive(Debug, Clone)]
pub struct HookContext {
    request_id: String,
    continuation: Slot<String>,
    ctx: Slot<Map>,
    invocations: u32,
}

impl HookContext {
    fn new(request_id: &str) -> Self {
        Self {
            request_id: request_id.to_string(),
            continuation: Slot::Unset,
            ctx: Slot::Unset,
            invocations: 0,
        }
    }

    /// Hook context of `req`, created on first access
    pub fn ensure(req: &mut HttpRequest) -> &mut HookContext {
        if req.extensions().get::<HookContext>().is_none() {
            let ctx = HookContext::new(&req.request_id);
            req.extensions_mut().insert(ctx);
        }
        req.extensions_mut()
            .get_mut::<HookContext>()
            .unwrap_or_else(|| unreachable!("hook context inserted above"))
    }

    /// Hook context of `req`, if one was created
    pub fn get(req: &HttpRequest) -> Option<&HookContext> {
        req.extensions().get::<HookContext>()
    }

    /// Request this context belongs to
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Record the name of the stage the hook delegates to
    pub fn set_continuation(&mut self, stage: impl Into<String>) {
        self.continuation = Slot::Set(stage.into());
    }

    /// Stage the hook delegates to, if recorded
    pub fn continuation(&self) -> Option<&str> {
        self.continuation.get().map(String::as_str)
    }

    /// Script-visible `http.ctx` table, if any entry was ever written
    pub fn ctx(&self) -> Option<&Map> {
        self.ctx.get()
    }

    /// Script-visible `http.ctx` table, created on first write
    pub fn ctx_mut(&mut self) -> &mut Map {
        if let Slot::Unset = self.ctx {
            self.ctx = Slot::Set(Map::new());
        }
        match &mut self.ctx {
            Slot::Set(map) => map,
            Slot::Unset => unreachable!("ctx slot set above"),
        }
    }

    /// Count one hook invocation
    pub fn record_invocation(&mut self) -> u32 {
        self.invocations += 1;
        self.invocations
    }

    /// Number of hook invocations seen by this request
    pub fn invocations(&self) -> u32 {
        self.invocations
    }
}

/// Shared handle to the request currently attached to a sandbox
///
/// The request is moved into the handle for the duration of one script run
/// and moved back when the [`AttachedRequest`] guard drops.
#[derive(Debug, Clone, Default)]
pub struct RequestHandle(Arc<Mutex<HttpRequest>>);

impl RequestHandle {
    /// Move `req` behind a handle until the returned guard drops
    pub fn attach(req: &mut HttpRequest) -> AttachedRequest<'_> {
        let handle = RequestHandle(Arc::new(Mutex::new(std::mem::take(req))));
        AttachedRequest { req, handle }
    }

    /// Read the attached request
    pub fn with<R>(&self, f: impl FnOnce(&HttpRequest) -> R) -> R {
        f(&self.0.lock())
    }

    /// Modify the attached request
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut HttpRequest) -> R) -> R {
        f(&mut self.0.lock())
    }
}

/// Guard returning the request to its owner on drop
#[derive(Debug)]
pub struct AttachedRequest<'a> {
    req: &'a mut HttpRequest,
    handle: RequestHandle,
}

impl AttachedRequest<'_> {
    /// Handle to bind into a sandbox
    pub fn handle(&self) -> RequestHandle {
        self.handle.clone()
    }
}

impl Drop for AttachedRequest<'_> {
    fn drop(&mut self) {
        *self.req = std::mem::take(&mut *self.handle.0.lock());
    }
}

/// Response state captured before a hook runs
#[derive(Debug, Clone)]
pub struct ResponseSnapshot {
    status: StatusCode,
    headers_out: HeaderMap,
}

impl ResponseSnapshot {
    /// Capture the response status and headers
    pub fn capture(req: &HttpRequest) -> Self {
        Self {
            status: req.status,
            headers_out: req.headers_out.clone(),
        }
    }

    /// Put the captured state back, discarding partial script writes
    pub fn restore(self, req: &mut HttpRequest) {
        req.status = self.status;
        req.headers_out = self.headers_out;
    }
}

/// Read a `http.ctx` entry
pub(crate) fn ctx_value(req: &HttpRequest, key: &str) -> Dynamic {
    HookContext::get(req)
        .and_then(HookContext::ctx)
        .and_then(|map| map.get(key))
        .cloned()
        .unwrap_or(Dynamic::UNIT)
}
