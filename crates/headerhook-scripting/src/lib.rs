//! # Headerhook Scripting
//!
//! Runs Rhai scripts in the response-header phase of a request.
//!
//! ## Pieces
//!
//! - **Artifact cache** - compiled scripts keyed by source digest or path
//! - **Sandbox** - a fresh scope per invocation with the `http` object and
//!   read-only fallback to host globals
//! - **Invocation driver** - load, bind, run behind a fault barrier and
//!   normalize the outcome
//! - **Filter splice** - the [`ScriptHeaderFilter`] stage for the host chain
//!
//! ## Example
//!
//! ```no_run
//! use headerhook_config::{ConfigBuilder, HeaderFilterConfig};
//! use headerhook_core::{FilterChain, HttpRequest};
//! use headerhook_scripting::HookRuntime;
//!
//! # async fn example() -> headerhook_core::Result<()> {
//! let config = ConfigBuilder::new()
//!     .header_filter(HeaderFilterConfig::inline(r#"http.header["X-Test"] = "1";"#))
//!     .build()?;
//! let runtime = HookRuntime::from_config(&config)?;
//! let chain = runtime.install(FilterChain::builder())?.build();
//!
//! let mut req = HttpRequest::get("/")?;
//! let status = chain.run(&mut req).await;
//! assert!(status.is_continue());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod cache;
pub mod context;
pub mod driver;
pub mod engine;
pub mod error;
pub mod filter;
pub mod outcome;
pub mod runtime;
pub mod sandbox;

pub use cache::{ArtifactCache, CacheStats, CompiledUnit, ScriptIdentity};
pub use context::{HookContext, RequestHandle, ResponseSnapshot, Slot};
pub use driver::{InvocationDriver, InvocationState};
pub use engine::{HostGlobals, ScriptEngine, ScriptEngineBuilder};
pub use error::{FaultInfo, FaultKind, FrameworkError, LoadError, ProxyError};
pub use filter::{ScriptHeaderFilter, SCRIPT_FILTER_NAME};
pub use outcome::InvocationOutcome;
pub use runtime::{HookRuntime, PrecompileReport};
pub use sandbox::{CapabilityTable, Environment, SandboxBuilder};

/// Prelude with commonly used types
pub mod prelude {
    pub use crate::cache::{ArtifactCache, CompiledUnit, ScriptIdentity};
    pub use crate::driver::InvocationDriver;
    pub use crate::engine::ScriptEngine;
    pub use crate::error::{FrameworkError, LoadError};
    pub use crate::filter::ScriptHeaderFilter;
    pub use crate::outcome::InvocationOutcome;
    pub use crate::runtime::HookRuntime;
}
