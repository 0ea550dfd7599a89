//! `http.ctx`: per-request scratch table

use super::capabilities::{Capability, Namespace};
use super::headers::HeaderProxy;
use super::proxy::{register_proxy, ProxyMapping};
#[cfg(feature = "regex")]
use super::re::RegexApi;
use super::vars::VarProxy;
use super::HttpApi;
use crate::context::{ctx_value, HookContext, RequestHandle};
use crate::error::ProxyError;
use rhai::{Array, Dynamic, FnPtr, Map};

/// View of the request's `http.ctx` table, kept in the request extensions
#[derive(Debug, Clone)]
pub struct CtxProxy {
    request: RequestHandle,
}

impl CtxProxy {
    pub(crate) fn new(request: RequestHandle) -> Self {
        Self { request }
    }
}

/// Values that hold per-invocation state must not outlive the invocation
///
/// Looks inside arrays, maps and curried function pointers.
fn holds_request(value: &Dynamic) -> bool {
    if value.is::<HttpApi>()
        || value.is::<HeaderProxy>()
        || value.is::<VarProxy>()
        || value.is::<CtxProxy>()
    {
        return true;
    }
    #[cfg(feature = "regex")]
    if value.is::<RegexApi>() {
        return true;
    }

    if value.is_array() {
        return value
            .read_lock::<Array>()
            .is_some_and(|items| items.iter().any(holds_request));
    }
    if value.is_map() {
        return value
            .read_lock::<Map>()
            .is_some_and(|map| map.values().any(holds_request));
    }
    if value.is::<FnPtr>() {
        return value
            .read_lock::<FnPtr>()
            .is_some_and(|f| f.curry().iter().any(holds_request));
    }
    false
}

impl ProxyMapping for CtxProxy {
    const TYPE_NAME: &'static str = "CtxProxy";

    fn get(&self, key: &str) -> Dynamic {
        self.request.with(|req| ctx_value(req, key))
    }

    fn set(&self, key: &str, value: Dynamic) -> Result<(), ProxyError> {
        if holds_request(&value) {
            return Err(ProxyError::new(format!(
                "cannot store '{}' in http.ctx",
                value.type_name()
            )));
        }
        self.request.with_mut(|req| {
            let ctx = HookContext::ensure(req).ctx_mut();
            if value.is_unit() {
                ctx.remove(key);
            } else {
                ctx.insert(key.into(), value);
            }
        });
        Ok(())
    }
}

pub(crate) fn capabilities() -> Vec<Capability> {
    vec![Capability::new("ctx", Namespace::Http, |engine| {
        register_proxy::<CtxProxy>(engine);
        engine.register_get("ctx", |api: &mut HttpApi| api.ctx());
    })]
}
