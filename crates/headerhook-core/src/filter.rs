//! Header filter chain
//!
//! Filter stages run once per request when the response header is about to
//! be emitted. The chain is built once at startup: every installed stage
//! becomes the new top of the chain and hands off to the stage that was on
//! top before it, so the stage installed last runs first.

use crate::request::HttpRequest;
use crate::{Error, Result};
use async_trait::async_trait;
use http::StatusCode;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// What the host should do after the header filter chain returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum FilterStatus {
    /// Continue emitting the response header
    Continue,
    /// Stop header transmission and fail the response with this status
    Abort(StatusCode),
}

impl FilterStatus {
    /// Whether processing continues
    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue)
    }
}

/// A stage of the header filter chain
#[async_trait]
pub trait HeaderFilter: Send + Sync + fmt::Debug {
    /// Stage name, unique within a chain
    fn name(&self) -> &str;

    /// Process the response header of `req`
    ///
    /// A stage that wants the remaining stages to run returns
    /// `next.run(req).await`; returning without calling `next` ends the chain.
    async fn filter(&self, req: &mut HttpRequest, next: Next) -> FilterStatus;
}

/// Represents the rest of the chain below the current stage
pub struct Next {
    stages: Arc<[Arc<dyn HeaderFilter>]>,
    index: usize,
}

impl Next {
    /// Create a new Next positioned at the top of `stages`
    pub fn new(stages: Arc<[Arc<dyn HeaderFilter>]>) -> Self {
        Self { stages, index: 0 }
    }

    /// Run the next stage, or finish the chain
    pub async fn run(self, req: &mut HttpRequest) -> FilterStatus {
        if let Some(stage) = self.stages.get(self.index) {
            trace!(stage = stage.name(), index = self.index, "Running header filter");
            let next = Self {
                stages: Arc::clone(&self.stages),
                index: self.index + 1,
            };
            stage.filter(req, next).await
        } else {
            FilterStatus::Continue
        }
    }

    /// Name of the stage `run` would invoke
    pub fn stage_name(&self) -> Option<&str> {
        self.stages.get(self.index).map(|s| s.name())
    }
}

impl Clone for Next {
    fn clone(&self) -> Self {
        Self {
            stages: Arc::clone(&self.stages),
            index: self.index,
        }
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("index", &self.index)
            .field("remaining", &(self.stages.len() - self.index))
            .finish()
    }
}

/// Builds a [`FilterChain`] by installing stages on top of each other
#[derive(Debug, Default)]
pub struct FilterChainBuilder {
    // Top of the chain first
    stages: Vec<Arc<dyn HeaderFilter>>,
}

impl FilterChainBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `stage` as the new top of the chain
    ///
    /// Fails if a stage with the same name is already installed.
    pub fn install(mut self, stage: Arc<dyn HeaderFilter>) -> Result<Self> {
        if self.stages.iter().any(|s| s.name() == stage.name()) {
            return Err(Error::filter(
                stage.name(),
                "header filter is already installed",
            ));
        }
        self.stages.insert(0, stage);
        Ok(self)
    }

    /// Build the chain
    pub fn build(self) -> FilterChain {
        FilterChain {
            stages: self.stages.into(),
        }
    }
}

/// An immutable, ordered header filter chain
#[derive(Clone)]
pub struct FilterChain {
    stages: Arc<[Arc<dyn HeaderFilter>]>,
}

impl FilterChain {
    /// Start building a chain
    pub fn builder() -> FilterChainBuilder {
        FilterChainBuilder::new()
    }

    /// Run the whole chain for `req`
    pub async fn run(&self, req: &mut HttpRequest) -> FilterStatus {
        Next::new(Arc::clone(&self.stages)).run(req).await
    }

    /// Stage names from top to bottom
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterChain")
            .field("stages", &self.stage_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct RecordingFilter {
        name: String,
        log: Arc<Mutex<Vec<String>>>,
        abort: bool,
    }

    impl RecordingFilter {
        fn new(name: &str, log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                log: Arc::clone(log),
                abort: false,
            })
        }
    }

    #[async_trait]
    impl HeaderFilter for RecordingFilter {
        fn name(&self) -> &str {
            &self.name
        }

        async fn filter(&self, req: &mut HttpRequest, next: Next) -> FilterStatus {
            self.log.lock().unwrap().push(self.name.clone());
            if self.abort {
                return FilterStatus::Abort(StatusCode::INTERNAL_SERVER_ERROR);
            }
            next.run(req).await
        }
    }

    #[tokio::test]
    async fn test_last_installed_runs_first() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = FilterChain::builder()
            .install(RecordingFilter::new("writer", &log))
            .unwrap()
            .install(RecordingFilter::new("gzip", &log))
            .unwrap()
            .install(RecordingFilter::new("script", &log))
            .unwrap()
            .build();

        assert_eq!(chain.stage_names(), vec!["script", "gzip", "writer"]);

        let mut req = HttpRequest::get("/").unwrap();
        assert_eq!(chain.run(&mut req).await, FilterStatus::Continue);
        assert_eq!(*log.lock().unwrap(), vec!["script", "gzip", "writer"]);
    }

    #[tokio::test]
    async fn test_abort_stops_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let aborting = Arc::new(RecordingFilter {
            name: "guard".to_string(),
            log: Arc::clone(&log),
            abort: true,
        });
        let chain = FilterChain::builder()
            .install(RecordingFilter::new("writer", &log))
            .unwrap()
            .install(aborting)
            .unwrap()
            .build();

        let mut req = HttpRequest::get("/").unwrap();
        let status = chain.run(&mut req).await;
        assert_eq!(status, FilterStatus::Abort(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!status.is_continue());
        assert_eq!(*log.lock().unwrap(), vec!["guard"]);
    }

    #[test]
    fn test_duplicate_install_rejected() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let result = FilterChain::builder()
            .install(RecordingFilter::new("script", &log))
            .unwrap()
            .install(RecordingFilter::new("script", &log));
        assert!(matches!(result, Err(Error::Filter { .. })));
    }

    #[tokio::test]
    async fn test_empty_chain_continues() {
        let chain = FilterChain::builder().build();
        let mut req = HttpRequest::get("/").unwrap();
        assert!(chain.run(&mut req).await.is_continue());
    }
}
