//! `http.header`: the outgoing response headers

use super::capabilities::{Capability, Namespace};
use super::proxy::{register_proxy, scalar_to_string, ProxyMapping};
use super::HttpApi;
use crate::context::RequestHandle;
use crate::error::ProxyError;
use headerhook_core::{HeaderMap, HeaderName, HeaderValue};
use rhai::{Array, Dynamic};

/// Live view of the response headers of the attached request
#[derive(Debug, Clone)]
pub struct HeaderProxy {
    request: RequestHandle,
}

impl HeaderProxy {
    pub(crate) fn new(request: RequestHandle) -> Self {
        Self { request }
    }
}

/// `_` in script-side names stands for `-`
fn header_name(key: &str) -> Result<HeaderName, ProxyError> {
    HeaderName::from_bytes(key.replace('_', "-").as_bytes())
        .map_err(|_| ProxyError::new(format!("invalid header name '{key}'")))
}

fn header_value(key: &str, value: &Dynamic) -> Result<HeaderValue, ProxyError> {
    let text = scalar_to_string(value, "header")?;
    HeaderValue::from_str(&text)
        .map_err(|_| ProxyError::new(format!("invalid value for header '{key}'")))
}

fn read(headers: &HeaderMap, name: &HeaderName) -> Dynamic {
    let mut values: Vec<Dynamic> = headers
        .get_all(name)
        .iter()
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned().into())
        .collect();
    match values.len() {
        0 => Dynamic::UNIT,
        1 => values.remove(0),
        _ => Dynamic::from_array(values),
    }
}

impl ProxyMapping for HeaderProxy {
    const TYPE_NAME: &'static str = "HeaderProxy";

    fn get(&self, key: &str) -> Dynamic {
        match header_name(key) {
            Ok(name) => self.request.with(|req| read(&req.headers_out, &name)),
            Err(_) => Dynamic::UNIT,
        }
    }

    fn set(&self, key: &str, value: Dynamic) -> Result<(), ProxyError> {
        let name = header_name(key)?;

        let values: Vec<HeaderValue> = if value.is_unit() {
            Vec::new()
        } else if value.is_array() {
            let items: Array = value.cast();
            items
                .iter()
                .map(|item| header_value(key, item))
                .collect::<Result<_, _>>()?
        } else {
            vec![header_value(key, &value)?]
        };

        self.request.with_mut(|req| {
            if req.header_sent() {
                return Err(ProxyError::new(format!(
                    "attempt to set response header '{key}' after it was sent"
                )));
            }
            req.headers_out.remove(&name);
            for v in values {
                req.headers_out.append(name.clone(), v);
            }
            Ok(())
        })
    }
}

pub(crate) fn capabilities() -> Vec<Capability> {
    vec![Capability::new("header", Namespace::Http, |engine| {
        register_proxy::<HeaderProxy>(engine);
        engine.register_get("header", |api: &mut HttpApi| api.header());
    })]
}

#[cfg(test)]
mod tests {
    use super::*;
    use headerhook_core::HttpRequest;

    fn proxy(req: &mut HttpRequest, f: impl FnOnce(&HeaderProxy)) {
        let attached = RequestHandle::attach(req);
        f(&HeaderProxy::new(attached.handle()));
    }

    #[test]
    fn test_set_and_get() {
        let mut req = HttpRequest::get("/").unwrap();
        proxy(&mut req, |p| {
            p.set("X-Test", "1".into()).unwrap();
            assert_eq!(p.get("x-test").into_string().unwrap(), "1");
            // Underscores map to hyphens
            assert_eq!(p.get("X_Test").into_string().unwrap(), "1");
        });
        assert_eq!(req.header_out("x-test"), Some("1"));
    }

    #[test]
    fn test_multi_value_and_removal() {
        let mut req = HttpRequest::get("/").unwrap();
        proxy(&mut req, |p| {
            let cookies: Array = vec!["a=1".into(), "b=2".into()];
            p.set("Set-Cookie", cookies.into()).unwrap();
            let got = p.get("set-cookie");
            assert!(got.is_array());
            assert_eq!(got.cast::<Array>().len(), 2);

            p.set("Set-Cookie", Dynamic::UNIT).unwrap();
            assert!(p.get("set-cookie").is_unit());
        });
        assert!(req.headers_out.is_empty());
    }

    #[test]
    fn test_numbers_are_stringified() {
        let mut req = HttpRequest::get("/").unwrap();
        proxy(&mut req, |p| p.set("Content-Length", Dynamic::from(42_i64)).unwrap());
        assert_eq!(req.header_out("content-length"), Some("42"));
    }

    #[test]
    fn test_invalid_input_rejected() {
        let mut req = HttpRequest::get("/").unwrap();
        proxy(&mut req, |p| {
            assert!(p.set("bad name", "1".into()).is_err());
            assert!(p.set("X-Test", "line\nbreak".into()).is_err());
            assert!(p.set("X-Test", Dynamic::from(rhai::Map::new())).is_err());
            assert!(p.get("bad name").is_unit());
        });
    }

    #[test]
    fn test_set_after_header_sent() {
        let mut req = HttpRequest::get("/").unwrap();
        req.mark_header_sent();
        proxy(&mut req, |p| {
            let err = p.set("X-Late", "1".into()).unwrap_err();
            assert!(err.to_string().contains("after it was sent"));
        });
    }
}
