//! Table-like views over request state
//!
//! A proxy looks like a map to scripts: `proxy["key"]` and `proxy.key`
//! read through [`ProxyMapping::get`], assignments go through
//! [`ProxyMapping::set`]. Nothing is copied into the script; every access
//! hits the live request.

use crate::error::ProxyError;
use rhai::{Dynamic, Engine, EvalAltResult, ImmutableString};

/// Key/value view bound to live request state
pub trait ProxyMapping: Clone + Send + Sync + 'static {
    /// Type name shown in script error messages
    const TYPE_NAME: &'static str;

    /// Current value for `key`, `()` when absent
    fn get(&self, key: &str) -> Dynamic;

    /// Store `value` under `key`; `()` removes the entry
    fn set(&self, key: &str, value: Dynamic) -> Result<(), ProxyError>;
}

/// Register `P` with index and property-fallback access
pub(crate) fn register_proxy<P: ProxyMapping>(engine: &mut Engine) {
    engine
        .register_type_with_name::<P>(P::TYPE_NAME)
        .register_indexer_get(|proxy: &mut P, key: ImmutableString| proxy.get(&key))
        .register_indexer_set(
            |proxy: &mut P,
             key: ImmutableString,
             value: Dynamic|
             -> Result<(), Box<EvalAltResult>> { Ok(proxy.set(&key, value)?) },
        );
}

/// Render a scalar script value as text, rejecting anything else
pub(crate) fn scalar_to_string(value: &Dynamic, what: &str) -> Result<String, ProxyError> {
    if value.is_string() || value.is_int() || value.is_float() || value.is_bool() {
        Ok(value.to_string())
    } else {
        Err(ProxyError::new(format!(
            "bad {what} value type '{}'",
            value.type_name()
        )))
    }
}
