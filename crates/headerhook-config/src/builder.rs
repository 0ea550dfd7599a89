//! Configuration builder

use crate::types::{Config, HeaderFilterConfig, LocationConfig, ScriptLimits};
use std::path::PathBuf;

/// Builder for constructing configuration programmatically
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the compiled script cache
    pub fn code_cache(mut self, enabled: bool) -> Self {
        self.config.code_cache = enabled;
        self
    }

    /// Set the directory relative script paths resolve against
    pub fn script_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.config.script_prefix = Some(prefix.into());
        self
    }

    /// Set the server-level handler
    pub fn header_filter(mut self, handler: HeaderFilterConfig) -> Self {
        self.config.header_filter = Some(handler);
        self
    }

    /// Set the init script
    pub fn init_script(mut self, code: impl Into<String>) -> Self {
        self.config.init_script = Some(code.into());
        self
    }

    /// Add a read-only global value
    pub fn global(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.config.globals.insert(name.into(), value);
        self
    }

    /// Set engine limits
    pub fn limits(mut self, limits: ScriptLimits) -> Self {
        self.config.limits = limits;
        self
    }

    /// Add a location
    pub fn location(mut self, location: LocationConfig) -> Self {
        self.config.locations.push(location);
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> headerhook_core::Result<Config> {
        crate::validator::validate_config(&self.config)?;
        Ok(self.config)
    }
}
