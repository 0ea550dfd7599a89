//! Sandbox environment builder
//!
//! Every invocation gets a fresh [`Environment`]: an empty child scope with
//! the `http` object bound into it. Names the scope does not define resolve
//! through the engine's read-only host globals; assignments always land in
//! the child scope, which is dropped when the invocation ends.

mod api;
mod capabilities;
mod ctx;
mod headers;
mod log;
mod proxy;
#[cfg(feature = "regex")]
mod re;
mod strings;
mod time;
mod vars;

pub use api::HttpApi;
pub use capabilities::{Capability, CapabilityTable, Namespace};
pub use ctx::CtxProxy;
pub use headers::HeaderProxy;
pub use log::{level, SCRIPT_LOG_TARGET};
pub use proxy::ProxyMapping;
#[cfg(feature = "regex")]
pub use re::{RegexApi, RegexScope, RegexScopeGuard};
pub use strings::{
    decode_base64, encode_base64, escape_uri, md5_bin, md5_hex, quote_sql_str, unescape_uri,
};
pub use time::{cookie_time, http_time, localtime, now, parse_http_time, today, utctime};
pub use vars::VarProxy;

use crate::cache::CompiledUnit;
use crate::context::RequestHandle;
use crate::engine::ScriptEngine;
use crate::error::FaultInfo;
use headerhook_config::validator::RESERVED_GLOBAL;
use rhai::{Dynamic, Scope};
use std::panic::{self, AssertUnwindSafe};

/// Builds per-invocation environments
#[derive(Debug, Clone, Copy, Default)]
pub struct SandboxBuilder;

impl SandboxBuilder {
    /// Create a builder
    pub fn new() -> Self {
        Self
    }

    /// Fresh environment bound to `request`
    pub fn build(&self, request: RequestHandle) -> Environment {
        let api = HttpApi::new(request);
        let mut scope = Scope::new();
        scope.push_constant(RESERVED_GLOBAL, api.clone());
        Environment { scope, api }
    }
}

/// Child scope of one invocation
#[derive(Debug)]
pub struct Environment {
    scope: Scope<'static>,
    api: HttpApi,
}

impl Environment {
    /// Bind to the compiled unit it will run
    pub fn bind(self, unit: CompiledUnit) -> BoundChunk {
        BoundChunk { env: self, unit }
    }

    /// The child scope
    pub fn scope(&self) -> &Scope<'static> {
        &self.scope
    }

    /// The bound `http` object
    pub fn api(&self) -> &HttpApi {
        &self.api
    }
}

/// A compiled unit bound to its environment, ready to run once
#[derive(Debug)]
pub struct BoundChunk {
    env: Environment,
    unit: CompiledUnit,
}

impl BoundChunk {
    /// Run the chunk behind the fault barrier
    ///
    /// Engine errors and panics raised by capability code both come back as
    /// a [`FaultInfo`]. The environment is dropped before this returns.
    pub fn execute(self, engine: &ScriptEngine) -> Result<Dynamic, FaultInfo> {
        let BoundChunk { mut env, unit } = self;

        #[cfg(feature = "regex")]
        let regex_open = env.api.regex_scope().open();

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            engine.eval(&mut env.scope, unit.ast())
        }));

        #[cfg(feature = "regex")]
        drop(regex_open);
        drop(env);

        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(FaultInfo::from(err)),
            Err(payload) => Err(FaultInfo::panic(payload)),
        }
    }
}
