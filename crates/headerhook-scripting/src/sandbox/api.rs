//! The `http` object bound into every sandbox

use super::capabilities::{Capability, Namespace};
use super::ctx::CtxProxy;
use super::headers::HeaderProxy;
#[cfg(feature = "regex")]
use super::re::{RegexApi, RegexScope};
use super::vars::VarProxy;
use crate::context::RequestHandle;
use headerhook_core::StatusCode;
use rhai::plugin::*;
use rhai::{Engine, EvalAltResult};

/// Script entry point to the attached request and host helpers
///
/// Carries the request handle as a private field. Scripts cannot construct
/// one; the only instance they see is the one bound as `http`.
#[derive(Debug, Clone)]
pub struct HttpApi {
    request: RequestHandle,
    #[cfg(feature = "regex")]
    regex: RegexScope,
}

impl HttpApi {
    pub(crate) fn new(request: RequestHandle) -> Self {
        Self {
            request,
            #[cfg(feature = "regex")]
            regex: RegexScope::new(),
        }
    }

    /// Handle of the attached request
    pub fn request(&self) -> &RequestHandle {
        &self.request
    }

    pub(crate) fn header(&self) -> HeaderProxy {
        HeaderProxy::new(self.request.clone())
    }

    pub(crate) fn vars(&self) -> VarProxy {
        VarProxy::new(self.request.clone())
    }

    pub(crate) fn ctx(&self) -> CtxProxy {
        CtxProxy::new(self.request.clone())
    }

    /// Compiled-pattern cache of this invocation
    #[cfg(feature = "regex")]
    pub fn regex_scope(&self) -> &RegexScope {
        &self.regex
    }

    #[cfg(feature = "regex")]
    pub(crate) fn re(&self) -> RegexApi {
        RegexApi::new(self.regex.clone())
    }

    fn status(&self) -> i64 {
        self.request.with(|req| i64::from(req.status.as_u16()))
    }

    fn set_status(&self, status: i64) -> Result<(), Box<EvalAltResult>> {
        let code = u16::try_from(status)
            .ok()
            .filter(|c| (100..=999).contains(c))
            .and_then(|c| StatusCode::from_u16(c).ok())
            .ok_or_else(|| format!("invalid response status {status}"))?;

        self.request.with_mut(|req| {
            if req.header_sent() {
                return Err("attempt to set status after sending out response headers".into());
            }
            req.status = code;
            Ok(())
        })
    }
}

pub(crate) fn register_types(engine: &mut Engine) {
    engine.register_type_with_name::<HttpApi>("HttpApi");
}

// `http` is bound as a constant, so the setter has to be marked pure
#[export_module]
mod status_api {
    use super::HttpApi;
    use rhai::EvalAltResult;

    /// Response status of the attached request
    #[rhai_fn(get = "status", pure)]
    pub fn get_status(api: &mut HttpApi) -> i64 {
        api.status()
    }

    /// Replace the response status
    #[rhai_fn(set = "status", pure, return_raw)]
    pub fn set_status(api: &mut HttpApi, status: i64) -> Result<(), Box<EvalAltResult>> {
        api.set_status(status)
    }
}

pub(crate) fn capabilities() -> Vec<Capability> {
    vec![Capability::new("status", Namespace::Http, |engine| {
        engine.register_global_module(exported_module!(status_api).into());
    })]
}
