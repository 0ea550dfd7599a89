//! Table of host capabilities exposed to scripts

use rhai::Engine;
use std::fmt;

/// Where a capability appears in script code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Engine-level hook such as `print`
    Root,
    /// Property or method of `http`
    Http,
    /// Method of `http.re`
    Re,
}

impl Namespace {
    /// Script-side path prefix
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Root => "",
            Self::Http => "http.",
            Self::Re => "http.re.",
        }
    }
}

/// One host capability and how to register it with an engine
#[derive(Clone, Copy)]
pub struct Capability {
    /// Name as seen by scripts
    pub name: &'static str,
    /// Namespace the name lives in
    pub namespace: Namespace,
    /// Kept for compatibility; newer names exist
    pub deprecated: bool,
    install: fn(&mut Engine),
}

impl Capability {
    /// Create a capability entry
    pub fn new(name: &'static str, namespace: Namespace, install: fn(&mut Engine)) -> Self {
        Self {
            name,
            namespace,
            deprecated: false,
            install,
        }
    }

    /// Mark as a deprecated alias
    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    /// Script-side name including its namespace
    pub fn qualified_name(&self) -> String {
        format!("{}{}", self.namespace.prefix(), self.name)
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capability")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("deprecated", &self.deprecated)
            .finish()
    }
}

/// Every capability available to scripts, built once per engine
#[derive(Debug, Clone)]
pub struct CapabilityTable {
    entries: Vec<Capability>,
}

impl CapabilityTable {
    /// Standard capability set
    pub fn standard() -> Self {
        let mut entries = Vec::new();
        entries.extend(super::api::capabilities());
        entries.extend(super::headers::capabilities());
        entries.extend(super::vars::capabilities());
        entries.extend(super::ctx::capabilities());
        entries.extend(super::strings::capabilities());
        entries.extend(super::time::capabilities());
        entries.extend(super::log::capabilities());
        #[cfg(feature = "regex")]
        entries.extend(super::re::capabilities());
        Self { entries }
    }

    /// Register the API types and every capability with `engine`
    pub fn install(&self, engine: &mut Engine) {
        super::api::register_types(engine);
        for entry in &self.entries {
            (entry.install)(engine);
        }
    }

    /// All entries
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.entries.iter()
    }

    /// Qualified names of all entries
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(Capability::qualified_name).collect()
    }

    /// Whether `name` exists in `namespace`
    pub fn contains(&self, namespace: Namespace, name: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.namespace == namespace && e.name == name)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CapabilityTable {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table() {
        let table = CapabilityTable::standard();
        assert!(table.contains(Namespace::Root, "print"));
        assert!(table.contains(Namespace::Http, "header"));
        assert!(table.contains(Namespace::Http, "escape_uri"));
        assert!(table.contains(Namespace::Http, "log"));
        assert!(!table.contains(Namespace::Http, "exec"));
        #[cfg(feature = "regex")]
        assert!(table.contains(Namespace::Re, "gsub"));
    }

    #[test]
    fn test_deprecated_aliases_marked() {
        let table = CapabilityTable::standard();
        let deprecated: Vec<_> = table
            .iter()
            .filter(|c| c.deprecated)
            .map(|c| c.name)
            .collect();
        assert_eq!(deprecated, vec!["get_now_ts", "get_now", "get_today"]);
    }

    #[test]
    fn test_qualified_names() {
        let names = CapabilityTable::standard().names();
        assert!(names.contains(&"http.md5".to_string()));
        assert!(names.contains(&"print".to_string()));
    }
}
