//! Invocation driver
//!
//! Runs one configured handler against one request:
//!
//! ```text
//! Idle -> Loading -> Bound -> Running -> Completed
//!            |                   |
//!            +----> Faulted <----+
//! ```
//!
//! Loading resolves the script identity and gets a compiled unit from the
//! cache. Bound builds a fresh sandbox around the request. Running executes
//! the unit behind the fault barrier. Every exit path releases the sandbox
//! and hands the request back to the caller.

use crate::cache::{ArtifactCache, CompiledUnit, ScriptIdentity};
use crate::context::{HookContext, RequestHandle, ResponseSnapshot};
use crate::engine::ScriptEngine;
use crate::error::FrameworkError;
use crate::outcome::InvocationOutcome;
use crate::sandbox::SandboxBuilder;
use headerhook_config::{CacheKey, HandlerDescriptor, HandlerSource};
use headerhook_core::HttpRequest;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{error, info_span, trace, Instrument, Span};

/// Invocation state, traced on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    /// Not started
    Idle,
    /// Resolving and loading the script
    Loading,
    /// Sandbox built and bound to the unit
    Bound,
    /// Script executing
    Running,
    /// Script returned normally
    Completed,
    /// Load failure or script fault
    Faulted,
}

/// Runs handlers against requests
#[derive(Debug)]
pub struct InvocationDriver {
    engine: Arc<ScriptEngine>,
    cache: Arc<ArtifactCache>,
    sandbox: SandboxBuilder,
    script_prefix: Option<PathBuf>,
    in_flight: AtomicUsize,
}

impl InvocationDriver {
    /// Create a driver loading scripts through `cache`
    pub fn new(cache: Arc<ArtifactCache>) -> Self {
        Self {
            engine: Arc::clone(cache.engine()),
            cache,
            sandbox: SandboxBuilder::new(),
            script_prefix: None,
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Rebase relative script paths onto `prefix`
    pub fn with_script_prefix(mut self, prefix: Option<PathBuf>) -> Self {
        self.script_prefix = prefix;
        self
    }

    /// Artifact cache in use
    pub fn cache(&self) -> &Arc<ArtifactCache> {
        &self.cache
    }

    /// Invocations currently executing
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Run `handler` against `req`
    pub async fn run(&self, handler: &HandlerDescriptor, req: &mut HttpRequest) -> InvocationOutcome {
        let span = info_span!(
            "header_filter",
            request_id = %req.request_id,
            method = %req.method,
            uri = %req.uri,
        );
        trace!(parent: &span, state = ?InvocationState::Idle, handler = %handler.describe());

        trace!(parent: &span, state = ?InvocationState::Loading);
        let identity = match self.resolve(handler, req) {
            Ok(identity) => identity,
            Err(err) => return self.framework_error(&span, req, err),
        };

        let unit = match self
            .cache
            .load(&identity, handler.code_cache)
            .instrument(span.clone())
            .await
        {
            Ok(unit) => unit,
            Err(err) => return self.framework_error(&span, req, err.into()),
        };

        self.execute(&span, unit, req)
    }

    /// Script identity for `handler` in the context of `req`
    ///
    /// File paths have their placeholders evaluated against the request and
    /// relative results rebased onto the script prefix.
    pub fn resolve(
        &self,
        handler: &HandlerDescriptor,
        req: &HttpRequest,
    ) -> Result<ScriptIdentity, FrameworkError> {
        match &handler.source {
            HandlerSource::Inline { code, key } => Ok(ScriptIdentity::Inline {
                key: key.clone(),
                code: Arc::clone(code),
            }),
            HandlerSource::File { path, key } => {
                let evaluated = path
                    .evaluate(req)
                    .map_err(|e| FrameworkError::PathResolution(e.to_string()))?;
                if evaluated.is_empty() {
                    return Err(FrameworkError::PathResolution(format!(
                        "\"{path}\" evaluated to an empty path"
                    )));
                }
                let resolved = self.rebase(&evaluated);
                let key = key
                    .clone()
                    .unwrap_or_else(|| CacheKey::file(&resolved.display().to_string()));
                Ok(ScriptIdentity::File {
                    key,
                    path: resolved,
                })
            }
        }
    }

    /// Identity of `handler` when it does not depend on the request
    pub fn static_identity(&self, handler: &HandlerDescriptor) -> Option<ScriptIdentity> {
        match &handler.source {
            HandlerSource::Inline { code, key } => Some(ScriptIdentity::Inline {
                key: key.clone(),
                code: Arc::clone(code),
            }),
            HandlerSource::File {
                path,
                key: Some(key),
            } => Some(ScriptIdentity::File {
                key: key.clone(),
                path: self.rebase(path.as_str()),
            }),
            HandlerSource::File { key: None, .. } => None,
        }
    }

    fn rebase(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        match &self.script_prefix {
            Some(prefix) if path.is_relative() => prefix.join(path),
            _ => path.to_path_buf(),
        }
    }

    fn execute(&self, span: &Span, unit: CompiledUnit, req: &mut HttpRequest) -> InvocationOutcome {
        let _entered = span.enter();
        let _in_flight = InFlight::enter(&self.in_flight);

        HookContext::ensure(req).record_invocation();
        let snapshot = ResponseSnapshot::capture(req);

        let result = {
            let attached = RequestHandle::attach(req);
            let env = self.sandbox.build(attached.handle());
            trace!(state = ?InvocationState::Bound, chunk = unit.chunk_name());
            let chunk = env.bind(unit);
            trace!(state = ?InvocationState::Running);
            chunk.execute(&self.engine)
        };

        match result {
            Ok(value) => {
                trace!(
                    state = ?InvocationState::Completed,
                    returned = value.type_name(),
                    "Header filter script finished"
                );
                InvocationOutcome::Success
            }
            Err(fault) => {
                snapshot.restore(req);
                let message = fault.message_or_placeholder();
                trace!(state = ?InvocationState::Faulted, kind = ?fault.kind, line = fault.line);
                error!(
                    request_id = %req.request_id,
                    method = %req.method,
                    uri = %req.uri,
                    "(script-error) {message}"
                );
                InvocationOutcome::ScriptFault(message)
            }
        }
    }

    fn framework_error(&self, span: &Span, req: &HttpRequest, err: FrameworkError) -> InvocationOutcome {
        trace!(parent: span, state = ?InvocationState::Faulted);
        error!(
            parent: span,
            request_id = %req.request_id,
            method = %req.method,
            uri = %req.uri,
            "{err}"
        );
        InvocationOutcome::FrameworkError(err)
    }
}

/// Counts an invocation as in flight until dropped
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(gauge: &'a AtomicUsize) -> Self {
        gauge.fetch_add(1, Ordering::SeqCst);
        Self(gauge)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
