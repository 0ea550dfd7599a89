//! `http.vars`: named request variables

use super::capabilities::{Capability, Namespace};
use super::proxy::{register_proxy, scalar_to_string, ProxyMapping};
use super::HttpApi;
use crate::context::RequestHandle;
use crate::error::ProxyError;
use rhai::Dynamic;

/// Live view of the named variables of the attached request
#[derive(Debug, Clone)]
pub struct VarProxy {
    request: RequestHandle,
}

impl VarProxy {
    pub(crate) fn new(request: RequestHandle) -> Self {
        Self { request }
    }
}

impl ProxyMapping for VarProxy {
    const TYPE_NAME: &'static str = "VarProxy";

    fn get(&self, key: &str) -> Dynamic {
        self.request
            .with(|req| req.variable(key))
            .map_or(Dynamic::UNIT, Dynamic::from)
    }

    fn set(&self, key: &str, value: Dynamic) -> Result<(), ProxyError> {
        let value = if value.is_unit() {
            None
        } else {
            Some(scalar_to_string(&value, "variable")?)
        };
        self.request
            .with_mut(|req| req.set_variable(key, value))
            .map_err(|e| ProxyError::new(e.to_string()))
    }
}

pub(crate) fn capabilities() -> Vec<Capability> {
    vec![Capability::new("vars", Namespace::Http, |engine| {
        register_proxy::<VarProxy>(engine);
        engine.register_get("vars", |api: &mut HttpApi| api.vars());
    })]
}
