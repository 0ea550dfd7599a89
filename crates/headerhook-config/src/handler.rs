//! Handler descriptors built from configuration

use crate::complex_value::ComplexValue;
use crate::types::HeaderFilterConfig;
use headerhook_core::{Error, Result};
use md5::{Digest, Md5};
use std::fmt;
use std::sync::Arc;

const INLINE_KEY_PREFIX: &str = "hf_inline_";
const FILE_KEY_PREFIX: &str = "hf_file_";

/// Key under which a compiled script is cached
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(Arc<str>);

impl CacheKey {
    /// Key for inline source: digest of the source text
    pub fn inline(code: &str) -> Self {
        Self(format!("{INLINE_KEY_PREFIX}{}", md5_hex(code.as_bytes())).into())
    }

    /// Key for a script file: digest of its path
    pub fn file(path: &str) -> Self {
        Self(format!("{FILE_KEY_PREFIX}{}", md5_hex(path.as_bytes())).into())
    }

    /// Key as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Where a handler's code comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerSource {
    /// Inline code with a key derived from its text
    Inline {
        /// Script code
        code: Arc<str>,
        /// Cache key
        key: CacheKey,
    },
    /// Script file
    File {
        /// Path expression, evaluated per request
        path: ComplexValue,
        /// Cache key, known up front only when `path` is constant
        key: Option<CacheKey>,
    },
}

/// A configured header filter handler, immutable after load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerDescriptor {
    /// Code source
    pub source: HandlerSource,
    /// Whether compiled units may be reused
    pub code_cache: bool,
}

impl HandlerDescriptor {
    /// Build from a handler config entry
    pub fn from_config(config: &HeaderFilterConfig, code_cache: bool) -> Result<Self> {
        let source = match (&config.inline, &config.file) {
            (Some(code), None) => HandlerSource::Inline {
                code: Arc::from(code.as_str()),
                key: CacheKey::inline(code),
            },
            (None, Some(path)) => {
                let path = ComplexValue::parse(path)?;
                let key = path.is_constant().then(|| CacheKey::file(path.as_str()));
                HandlerSource::File { path, key }
            }
            (Some(_), Some(_)) => {
                return Err(Error::Config(
                    "header_filter must set only one of 'inline' or 'file'".to_string(),
                ))
            }
            (None, None) => {
                return Err(Error::Config(
                    "header_filter must set 'inline' or 'file'".to_string(),
                ))
            }
        };

        Ok(Self { source, code_cache })
    }

    /// Short description for logs
    pub fn describe(&self) -> String {
        match &self.source {
            HandlerSource::Inline { key, .. } => format!("inline:{key}"),
            HandlerSource::File { path, .. } => format!("file:{path}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_key_is_stable_digest() {
        let a = CacheKey::inline("http.header[\"X-Test\"] = \"1\";");
        let b = CacheKey::inline("http.header[\"X-Test\"] = \"1\";");
        let c = CacheKey::inline("http.header[\"X-Test\"] = \"2\";");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.as_str().starts_with("hf_inline_"));
        assert_eq!(a.as_str().len(), "hf_inline_".len() + 32);
    }

    #[test]
    fn test_inline_and_file_keys_differ() {
        assert_ne!(CacheKey::inline("a"), CacheKey::file("a"));
    }

    #[test]
    fn test_file_with_placeholders_has_no_static_key() {
        let handler =
            HandlerDescriptor::from_config(&HeaderFilterConfig::file("hooks/$host.rhai"), true)
                .unwrap();
        match handler.source {
            HandlerSource::File { key, .. } => assert!(key.is_none()),
            HandlerSource::Inline { .. } => panic!("expected file source"),
        }

        let handler =
            HandlerDescriptor::from_config(&HeaderFilterConfig::file("hooks/main.rhai"), false)
                .unwrap();
        assert!(!handler.code_cache);
        match handler.source {
            HandlerSource::File { key, .. } => {
                assert_eq!(key, Some(CacheKey::file("hooks/main.rhai")))
            }
            HandlerSource::Inline { .. } => panic!("expected file source"),
        }
    }

    #[test]
    fn test_exactly_one_source_required() {
        let both = HeaderFilterConfig {
            inline: Some("1".to_string()),
            file: Some("a.rhai".to_string()),
        };
        assert!(HandlerDescriptor::from_config(&both, true).is_err());
        assert!(HandlerDescriptor::from_config(&HeaderFilterConfig::default(), true).is_err());
    }
}
