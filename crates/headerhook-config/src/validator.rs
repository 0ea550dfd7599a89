//! Configuration validation

use crate::handler::HandlerDescriptor;
use crate::types::HeaderFilterConfig;
use crate::Config;
use headerhook_core::{Error, Result};
use std::collections::HashSet;

/// Name under which the request API object is bound in every sandbox
pub const RESERVED_GLOBAL: &str = "http";

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_limits(config)?;

    validate_globals(config)?;

    validate_locations(config)?;

    Ok(())
}

fn validate_limits(config: &Config) -> Result<()> {
    let limits = &config.limits;

    if limits.max_operations == 0 {
        return Err(Error::Config("limits.max_operations must be > 0".to_string()));
    }
    if limits.max_call_levels == 0 {
        return Err(Error::Config("limits.max_call_levels must be > 0".to_string()));
    }
    if limits.max_expr_depth == 0 || limits.max_function_expr_depth == 0 {
        return Err(Error::Config("limits expression depths must be > 0".to_string()));
    }
    if limits.max_string_size == 0 || limits.max_array_size == 0 || limits.max_map_size == 0 {
        return Err(Error::Config("limits collection sizes must be > 0".to_string()));
    }

    if limits.max_operations > 10_000_000 {
        tracing::warn!(
            max_operations = limits.max_operations,
            "max_operations is very high; runaway scripts will hold workers for long"
        );
    }

    Ok(())
}

fn validate_globals(config: &Config) -> Result<()> {
    if config.init_script.is_some() && config.init_script_file.is_some() {
        return Err(Error::Config(
            "only one of init_script or init_script_file may be set".to_string(),
        ));
    }

    for name in config.globals.keys() {
        if !is_identifier(name) {
            return Err(Error::Config(format!(
                "global name '{name}' is not a valid identifier"
            )));
        }
        if name == RESERVED_GLOBAL {
            return Err(Error::Config(format!(
                "global name '{RESERVED_GLOBAL}' is reserved"
            )));
        }
    }

    Ok(())
}

fn validate_locations(config: &Config) -> Result<()> {
    if let Some(handler) = &config.header_filter {
        validate_handler(handler, "header_filter")?;
    }

    let mut seen = HashSet::new();
    for location in &config.locations {
        if !location.path.starts_with('/') {
            return Err(Error::Config(format!(
                "location path '{}' must start with '/'",
                location.path
            )));
        }
        if !seen.insert(location.path.as_str()) {
            return Err(Error::Config(format!(
                "duplicate location path '{}'",
                location.path
            )));
        }
        if let Some(handler) = &location.header_filter {
            validate_handler(handler, &location.path)?;
        } else if config.header_filter.is_none() {
            tracing::debug!(location = %location.path, "Location has no header filter");
        }
    }

    Ok(())
}

fn validate_handler(handler: &HeaderFilterConfig, scope: &str) -> Result<()> {
    let blank = |s: &Option<String>| s.as_deref().is_some_and(|s| s.trim().is_empty());
    if blank(&handler.inline) || blank(&handler.file) {
        return Err(Error::Config(format!(
            "header_filter source for '{scope}' cannot be empty"
        )));
    }

    HandlerDescriptor::from_config(handler, true)
        .map_err(|e| Error::Config(format!("invalid header_filter for '{scope}': {e}")))?;

    Ok(())
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
