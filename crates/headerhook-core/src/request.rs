//! Per-request host object

use crate::{Error, Result};
use http::{Extensions, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, Version};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;
use uuid::Uuid;

/// An in-flight request as seen by the header filter phase.
///
/// Holds the parsed request line and headers, the response status and
/// headers that are about to be emitted, the named variables declared for
/// this request and an extension map where filter stages keep their own
/// per-request state. Anything stored in the extensions is dropped together
/// with the request.
#[derive(Debug, Default)]
pub struct HttpRequest {
    /// Unique request ID for tracing
    pub request_id: String,

    /// HTTP method
    pub method: Method,

    /// Request URI
    pub uri: Uri,

    /// HTTP version
    pub version: Version,

    /// Request headers
    pub headers_in: HeaderMap,

    /// Client address, when known
    pub remote_addr: Option<SocketAddr>,

    /// Response status
    pub status: StatusCode,

    /// Response headers, not yet sent
    pub headers_out: HeaderMap,

    pub(crate) variables: HashMap<String, Option<String>>,

    extensions: Extensions,

    header_sent: bool,
}

impl HttpRequest {
    /// Create a new request with a fresh request ID
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            method,
            uri,
            version: Version::HTTP_11,
            ..Self::default()
        }
    }

    /// Create a `GET` request for the given URI string
    pub fn get(uri: &str) -> Result<Self> {
        let uri = Uri::from_str(uri)
            .map_err(|e| Error::InvalidRequest(format!("Invalid URI '{uri}': {e}")))?;
        Ok(Self::new(Method::GET, uri))
    }

    /// Create from an HTTP request (the body is ignored)
    pub fn from_request<B>(req: &http::Request<B>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            method: req.method().clone(),
            uri: req.uri().clone(),
            version: req.version(),
            headers_in: req.headers().clone(),
            ..Self::default()
        }
    }

    /// Add a request header
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_str(name)
            .map_err(|e| Error::InvalidHeader(format!("Invalid header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::InvalidHeader(format!("Invalid header value for '{name}': {e}")))?;
        self.headers_in.append(name, value);
        Ok(self)
    }

    /// Set the client address
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Set the response status
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Request path without the query string
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Raw query string, if any
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// First value of a request header as a string
    pub fn header_in(&self, name: &str) -> Option<&str> {
        self.headers_in.get(name).and_then(|v| v.to_str().ok())
    }

    /// First value of a response header as a string
    pub fn header_out(&self, name: &str) -> Option<&str> {
        self.headers_out.get(name).and_then(|v| v.to_str().ok())
    }

    /// Per-request extension map
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Mutable per-request extension map
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Whether the response header has already been emitted
    pub fn header_sent(&self) -> bool {
        self.header_sent
    }

    /// Mark the response header as emitted
    pub fn mark_header_sent(&mut self) {
        self.header_sent = true;
    }
}
