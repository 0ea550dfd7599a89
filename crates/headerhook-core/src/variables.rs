//! Named request variables
//!
//! Built-in variables are computed from the request on every read and are
//! read-only. User variables must be declared on the request before they can
//! be written; a declared variable may hold no value.

use crate::request::HttpRequest;
use crate::{Error, Result};

const BUILTIN_VARIABLES: &[&str] = &[
    "uri",
    "document_uri",
    "request_uri",
    "args",
    "query_string",
    "is_args",
    "request_method",
    "scheme",
    "host",
    "server_protocol",
    "remote_addr",
    "status",
    "request_id",
    "content_type",
    "content_length",
];

const BUILTIN_PREFIXES: &[&str] = &["arg_", "http_", "sent_http_", "cookie_"];

/// Whether `name` is served by the request itself rather than declared
pub fn is_builtin(name: &str) -> bool {
    BUILTIN_VARIABLES.contains(&name)
        || BUILTIN_PREFIXES
            .iter()
            .any(|p| name.len() > p.len() && name.starts_with(p))
}

impl HttpRequest {
    /// Declare a user variable with an initial value
    pub fn declare_variable(
        &mut self,
        name: impl Into<String>,
        value: Option<String>,
    ) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::Variable("variable name cannot be empty".to_string()));
        }
        if is_builtin(&name) {
            return Err(Error::Variable(format!(
                "variable \"{name}\" is built-in and cannot be declared"
            )));
        }
        self.variables.insert(name, value);
        Ok(())
    }

    /// Whether a variable with this name exists for the request
    pub fn has_variable(&self, name: &str) -> bool {
        is_builtin(name) || self.variables.contains_key(name)
    }

    /// Resolve a variable; `None` when unknown or without a value
    pub fn variable(&self, name: &str) -> Option<String> {
        if let Some(value) = self.variables.get(name) {
            return value.clone();
        }

        match name {
            "uri" | "document_uri" => return Some(self.uri.path().to_string()),
            "request_uri" => {
                return Some(
                    self.uri
                        .path_and_query()
                        .map(|pq| pq.as_str().to_string())
                        .unwrap_or_else(|| self.uri.path().to_string()),
                )
            }
            "args" | "query_string" => return self.uri.query().map(str::to_string),
            "is_args" => {
                return Some(if self.uri.query().is_some() { "?" } else { "" }.to_string())
            }
            "request_method" => return Some(self.method.as_str().to_string()),
            "scheme" => return Some(self.uri.scheme_str().unwrap_or("http").to_string()),
            "host" => return self.host(),
            "server_protocol" => return Some(format!("{:?}", self.version)),
            "remote_addr" => return self.remote_addr.map(|a| a.ip().to_string()),
            "status" => return Some(self.status.as_u16().to_string()),
            "request_id" => return Some(self.request_id.clone()),
            "content_type" => return self.header_in("content-type").map(str::to_string),
            "content_length" => return self.header_in("content-length").map(str::to_string),
            _ => {}
        }

        if let Some(arg) = name.strip_prefix("arg_") {
            return self.query_arg(arg);
        }
        if let Some(header) = name.strip_prefix("sent_http_") {
            return joined_header(&self.headers_out, header);
        }
        if let Some(header) = name.strip_prefix("http_") {
            return joined_header(&self.headers_in, header);
        }
        if let Some(cookie) = name.strip_prefix("cookie_") {
            return self.cookie(cookie);
        }

        None
    }

    /// Write a declared user variable; `None` clears its value
    pub fn set_variable(&mut self, name: &str, value: Option<String>) -> Result<()> {
        if is_builtin(name) {
            return Err(Error::Variable(format!(
                "variable \"{name}\" is read-only"
            )));
        }
        match self.variables.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(Error::Variable(format!(
                "variable \"{name}\" not found for writing; declare it first"
            ))),
        }
    }

    fn host(&self) -> Option<String> {
        let raw = self
            .header_in("host")
            .map(str::to_string)
            .or_else(|| self.uri.host().map(str::to_string))?;
        let host = match raw.rsplit_once(':') {
            Some((h, port)) if port.chars().all(|c| c.is_ascii_digit()) => h.to_string(),
            _ => raw,
        };
        Some(host.to_ascii_lowercase())
    }

    fn query_arg(&self, arg: &str) -> Option<String> {
        self.uri.query()?.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            key.eq_ignore_ascii_case(arg).then(|| value.to_string())
        })
    }

    fn cookie(&self, cookie: &str) -> Option<String> {
        self.headers_in
            .get_all(http::header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .find_map(|pair| {
                let (key, value) = pair.trim().split_once('=')?;
                (key == cookie).then(|| value.to_string())
            })
    }
}

fn joined_header(headers: &http::HeaderMap, name: &str) -> Option<String> {
    let name = name.replace('_', "-");
    let values: Vec<&str> = headers
        .get_all(name.as_str())
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    fn request() -> HttpRequest {
        HttpRequest::get("/api/items?page=2&Sort=desc")
            .unwrap()
            .with_header("Host", "Example.com:8080")
            .unwrap()
            .with_header("Cookie", "session=abc; theme=dark")
            .unwrap()
            .with_header("X-Real-IP", "10.1.1.1")
            .unwrap()
            .with_remote_addr("192.168.0.9:51000".parse().unwrap())
    }

    #[test]
    fn test_builtin_variables() {
        let req = request();
        assert_eq!(req.variable("uri").as_deref(), Some("/api/items"));
        assert_eq!(
            req.variable("request_uri").as_deref(),
            Some("/api/items?page=2&Sort=desc")
        );
        assert_eq!(req.variable("args").as_deref(), Some("page=2&Sort=desc"));
        assert_eq!(req.variable("is_args").as_deref(), Some("?"));
        assert_eq!(req.variable("request_method").as_deref(), Some("GET"));
        assert_eq!(req.variable("host").as_deref(), Some("example.com"));
        assert_eq!(req.variable("server_protocol").as_deref(), Some("HTTP/1.1"));
        assert_eq!(req.variable("remote_addr").as_deref(), Some("192.168.0.9"));
        assert_eq!(req.variable("status").as_deref(), Some("200"));
    }

    #[test]
    fn test_prefixed_variables() {
        let mut req = request();
        req.headers_out
            .insert("x-cache", http::HeaderValue::from_static("HIT"));

        assert_eq!(req.variable("arg_page").as_deref(), Some("2"));
        assert_eq!(req.variable("arg_sort").as_deref(), Some("desc"));
        assert_eq!(req.variable("arg_missing"), None);
        assert_eq!(req.variable("http_x_real_ip").as_deref(), Some("10.1.1.1"));
        assert_eq!(req.variable("sent_http_x_cache").as_deref(), Some("HIT"));
        assert_eq!(req.variable("cookie_theme").as_deref(), Some("dark"));
        assert_eq!(req.variable("cookie_missing"), None);
    }

    #[test]
    fn test_builtins_are_read_only() {
        let mut req = request();
        let err = req.set_variable("uri", Some("/other".to_string())).unwrap_err();
        assert!(err.to_string().contains("read-only"));
        assert!(req.set_variable("http_host", None).is_err());
    }

    #[test]
    fn test_user_variables_must_be_declared() {
        let mut req = request();
        assert!(!req.has_variable("backend"));
        assert!(req.set_variable("backend", Some("a".to_string())).is_err());

        req.declare_variable("backend", None).unwrap();
        assert!(req.has_variable("backend"));
        assert_eq!(req.variable("backend"), None);

        req.set_variable("backend", Some("pool-b".to_string())).unwrap();
        assert_eq!(req.variable("backend").as_deref(), Some("pool-b"));
    }

    #[test]
    fn test_cannot_declare_builtin() {
        let mut req = request();
        assert!(req.declare_variable("uri", None).is_err());
        assert!(req.declare_variable("arg_x", None).is_err());
        assert!(req.declare_variable("", None).is_err());
    }

    #[test]
    fn test_status_variable_tracks_response() {
        let req = request().with_status(StatusCode::NOT_FOUND);
        assert_eq!(req.variable("status").as_deref(), Some("404"));
    }
}
