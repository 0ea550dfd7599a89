//! Header filter stage running configured scripts

use crate::context::HookContext;
use crate::driver::InvocationDriver;
use async_trait::async_trait;
use headerhook_config::LocationTable;
use headerhook_core::{FilterStatus, HeaderFilter, HttpRequest, Next};
use std::sync::Arc;
use tracing::trace;

/// Stage name the script filter installs under
pub const SCRIPT_FILTER_NAME: &str = "script_header_filter";

/// Continuation recorded when the script stage is the last one
const END_OF_CHAIN: &str = "<end>";

/// Runs the handler configured for the request's location, then delegates
///
/// Requests without a handler pass straight to the next stage. A failed
/// invocation aborts the response with the outcome's status and the rest
/// of the chain does not run.
#[derive(Debug)]
pub struct ScriptHeaderFilter {
    locations: Arc<LocationTable>,
    driver: Arc<InvocationDriver>,
}

impl ScriptHeaderFilter {
    /// Create the stage
    pub fn new(locations: Arc<LocationTable>, driver: Arc<InvocationDriver>) -> Self {
        Self { locations, driver }
    }

    /// Driver used for invocations
    pub fn driver(&self) -> &Arc<InvocationDriver> {
        &self.driver
    }
}

#[async_trait]
impl HeaderFilter for ScriptHeaderFilter {
    fn name(&self) -> &str {
        SCRIPT_FILTER_NAME
    }

    async fn filter(&self, req: &mut HttpRequest, next: Next) -> FilterStatus {
        let Some(handler) = self.locations.handler_for(req.path()).cloned() else {
            trace!(path = %req.path(), "No header filter handler, delegating");
            return next.run(req).await;
        };

        let continuation = next.stage_name().unwrap_or(END_OF_CHAIN).to_string();
        HookContext::ensure(req).set_continuation(continuation);

        match self.driver.run(&handler, req).await.into_abort() {
            None => next.run(req).await,
            Some(status) => status,
        }
    }
}
