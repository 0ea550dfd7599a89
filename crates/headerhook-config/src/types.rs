//! Configuration types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Reuse compiled scripts across requests (default: true)
    ///
    /// Turning this off recompiles the handler on every request so edits
    /// to script files are picked up immediately.
    #[serde(default = "default_true")]
    pub code_cache: bool,

    /// Directory relative script paths are resolved against
    #[serde(default)]
    pub script_prefix: Option<PathBuf>,

    /// Server-level handler, inherited by locations without their own
    #[serde(default)]
    pub header_filter: Option<HeaderFilterConfig>,

    /// Inline script evaluated once at startup; its functions and exported
    /// variables form the host global namespace
    #[serde(default)]
    pub init_script: Option<String>,

    /// File variant of `init_script`
    #[serde(default)]
    pub init_script_file: Option<PathBuf>,

    /// Read-only values visible to every handler
    #[serde(default)]
    pub globals: BTreeMap<String, serde_json::Value>,

    /// Script engine limits
    #[serde(default)]
    pub limits: ScriptLimits,

    /// Request-matching scopes
    #[serde(default)]
    pub locations: Vec<LocationConfig>,
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            code_cache: true,
            script_prefix: None,
            header_filter: None,
            init_script: None,
            init_script_file: None,
            globals: BTreeMap::new(),
            limits: ScriptLimits::default(),
            locations: Vec::new(),
        }
    }
}

/// A request-matching scope
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationConfig {
    /// Path prefix this location matches
    pub path: String,

    /// Overrides the server-level `code_cache`
    #[serde(default)]
    pub code_cache: Option<bool>,

    /// Overrides the server-level `header_filter`
    #[serde(default)]
    pub header_filter: Option<HeaderFilterConfig>,
}

impl LocationConfig {
    /// Create a location with no handler of its own
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            code_cache: None,
            header_filter: None,
        }
    }

    /// Attach a handler
    pub fn with_header_filter(mut self, handler: HeaderFilterConfig) -> Self {
        self.header_filter = Some(handler);
        self
    }

    /// Override the code cache flag
    pub fn with_code_cache(mut self, enabled: bool) -> Self {
        self.code_cache = Some(enabled);
        self
    }
}

/// Header filter handler source
///
/// Exactly one of `inline` or `file` must be set. `file` may contain
/// `$name` or `${name}` request variable placeholders.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HeaderFilterConfig {
    /// Inline script code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline: Option<String>,

    /// Script file path expression
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl HeaderFilterConfig {
    /// Inline handler
    pub fn inline<S: Into<String>>(code: S) -> Self {
        Self {
            inline: Some(code.into()),
            file: None,
        }
    }

    /// File handler
    pub fn file<S: Into<String>>(path: S) -> Self {
        Self {
            inline: None,
            file: Some(path.into()),
        }
    }
}

/// Limits applied to the script engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScriptLimits {
    /// Maximum number of operations per invocation
    #[serde(default = "default_max_operations")]
    pub max_operations: u64,

    /// Maximum function call depth
    #[serde(default = "default_max_call_levels")]
    pub max_call_levels: usize,

    /// Maximum expression nesting depth
    #[serde(default = "default_max_expr_depth")]
    pub max_expr_depth: usize,

    /// Maximum expression nesting depth inside functions
    #[serde(default = "default_max_function_expr_depth")]
    pub max_function_expr_depth: usize,

    /// Maximum string size in bytes
    #[serde(default = "default_max_string_size")]
    pub max_string_size: usize,

    /// Maximum array length
    #[serde(default = "default_max_collection_size")]
    pub max_array_size: usize,

    /// Maximum map size
    #[serde(default = "default_max_collection_size")]
    pub max_map_size: usize,
}

fn default_max_operations() -> u64 {
    100_000
}

fn default_max_call_levels() -> usize {
    32
}

fn default_max_expr_depth() -> usize {
    64
}

fn default_max_function_expr_depth() -> usize {
    32
}

fn default_max_string_size() -> usize {
    1024 * 1024
}

fn default_max_collection_size() -> usize {
    10_000
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            max_operations: default_max_operations(),
            max_call_levels: default_max_call_levels(),
            max_expr_depth: default_max_expr_depth(),
            max_function_expr_depth: default_max_function_expr_depth(),
            max_string_size: default_max_string_size(),
            max_array_size: default_max_collection_size(),
            max_map_size: default_max_collection_size(),
        }
    }
}
