//! # Headerhook Core
//!
//! Host-side abstractions shared by the headerhook crates:
//! - The per-request host object ([`HttpRequest`]) with its response headers
//!   and named variables
//! - The ordered header filter chain ([`HeaderFilter`], [`Next`], [`FilterChain`])
//! - Error types

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod error;
pub mod filter;
pub mod request;
pub mod variables;

pub use error::{Error, Result};
pub use filter::{FilterChain, FilterChainBuilder, FilterStatus, HeaderFilter, Next};
pub use request::HttpRequest;

// Re-export commonly used HTTP types
pub use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::filter::{FilterChain, FilterChainBuilder, FilterStatus, HeaderFilter, Next};
    pub use crate::request::HttpRequest;
}
