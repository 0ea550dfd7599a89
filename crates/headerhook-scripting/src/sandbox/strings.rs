//! URI, SQL, base64 and digest helpers

use super::capabilities::{Capability, Namespace};
use super::HttpApi;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use md5::{Digest, Md5};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rhai::{Blob, Dynamic};

/// Bytes left as-is by `escape_uri`: RFC 3986 unreserved characters
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encode a URI component
pub fn escape_uri(s: &str) -> String {
    utf8_percent_encode(s, URI_COMPONENT).to_string()
}

/// Decode a URI component; `+` decodes to a space and malformed escapes are kept
pub fn unescape_uri(s: &str) -> String {
    let plus_decoded = s.replace('+', " ");
    percent_decode_str(&plus_decoded)
        .decode_utf8_lossy()
        .into_owned()
}

/// Quote `s` as a MySQL string literal
pub fn quote_sql_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\0' => out.push_str("\\0"),
            '\u{8}' => out.push_str("\\b"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{1a}' => out.push_str("\\Z"),
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Standard base64 with padding
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode standard base64, `None` when malformed
pub fn decode_base64(s: &str) -> Option<Vec<u8>> {
    STANDARD.decode(s.as_bytes()).ok()
}

/// Lowercase hex MD5 digest
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Raw 16-byte MD5 digest
pub fn md5_bin(data: &[u8]) -> Vec<u8> {
    Md5::digest(data).to_vec()
}

/// Bytes of a string or blob argument
fn bytes_of(value: &Dynamic) -> Option<Vec<u8>> {
    if value.is_string() {
        return value
            .clone()
            .into_immutable_string()
            .ok()
            .map(|s| s.as_bytes().to_vec());
    }
    value.clone().try_cast::<Blob>()
}

fn bytes_arg(value: &Dynamic, func: &str) -> Result<Vec<u8>, Box<rhai::EvalAltResult>> {
    bytes_of(value).ok_or_else(|| {
        format!(
            "bad argument to '{func}': string expected, got {}",
            value.type_name()
        )
        .into()
    })
}

pub(crate) fn capabilities() -> Vec<Capability> {
    vec![
        Capability::new("escape_uri", Namespace::Http, |engine| {
            engine.register_fn("escape_uri", |_: &mut HttpApi, s: &str| escape_uri(s));
        }),
        Capability::new("unescape_uri", Namespace::Http, |engine| {
            engine.register_fn("unescape_uri", |_: &mut HttpApi, s: &str| unescape_uri(s));
        }),
        Capability::new("quote_sql_str", Namespace::Http, |engine| {
            engine.register_fn("quote_sql_str", |_: &mut HttpApi, s: &str| quote_sql_str(s));
        }),
        Capability::new("encode_base64", Namespace::Http, |engine| {
            engine.register_fn("encode_base64", |_: &mut HttpApi, v: Dynamic| {
                bytes_arg(&v, "encode_base64").map(|b| encode_base64(&b))
            });
        }),
        Capability::new("decode_base64", Namespace::Http, |engine| {
            engine.register_fn("decode_base64", |_: &mut HttpApi, s: &str| -> Dynamic {
                match decode_base64(s) {
                    Some(bytes) => match String::from_utf8(bytes) {
                        Ok(text) => text.into(),
                        Err(e) => Dynamic::from_blob(e.into_bytes()),
                    },
                    None => Dynamic::UNIT,
                }
            });
        }),
        Capability::new("md5", Namespace::Http, |engine| {
            engine.register_fn("md5", |_: &mut HttpApi, v: Dynamic| {
                bytes_arg(&v, "md5").map(|b| md5_hex(&b))
            });
        }),
        Capability::new("md5_bin", Namespace::Http, |engine| {
            engine.register_fn("md5_bin", |_: &mut HttpApi, v: Dynamic| {
                bytes_arg(&v, "md5_bin").map(|b| Dynamic::from_blob(md5_bin(&b)))
            });
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_escape_uri() {
        assert_eq!(escape_uri("a b&c=d/é"), "a%20b%26c%3Dd%2F%C3%A9");
        assert_eq!(escape_uri("safe-._~"), "safe-._~");
    }

    #[test]
    fn test_unescape_uri() {
        assert_eq!(unescape_uri("b%20r56+7"), "b r56 7");
        assert_eq!(unescape_uri("100%zz"), "100%zz");
    }

    #[test]
    fn test_quote_sql_str() {
        assert_eq!(quote_sql_str("it's"), "'it\\'s'");
        assert_eq!(quote_sql_str("a\nb\\"), "'a\\nb\\\\'");
        assert_eq!(quote_sql_str(""), "''");
    }

    #[test]
    fn test_base64() {
        assert_eq!(encode_base64(b"hello"), "aGVsbG8=");
        assert_eq!(decode_base64("aGVsbG8=").unwrap(), b"hello");
        assert!(decode_base64("not base64!").is_none());
    }

    #[test]
    fn test_md5() {
        assert_eq!(md5_hex(b"hello"), "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(md5_bin(b"hello").len(), 16);
    }

    proptest! {
        #[test]
        fn escape_then_unescape_is_identity(s in "\\PC*") {
            prop_assert_eq!(unescape_uri(&escape_uri(&s)), s);
        }

        #[test]
        fn escaped_output_is_uri_safe(s in "\\PC*") {
            let escaped = escape_uri(&s);
            prop_assert!(escaped
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b"-._~%".contains(&b)));
        }
    }
}
