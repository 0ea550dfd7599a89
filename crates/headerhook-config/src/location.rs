//! Runtime lookup of the handler for a request path

use crate::handler::HandlerDescriptor;
use crate::types::Config;
use headerhook_core::Result;
use std::sync::Arc;

/// A resolved request-matching scope
#[derive(Debug, Clone)]
pub struct LocationScope {
    /// Path prefix, empty for the server-level scope
    pub path: String,
    /// Effective handler after inheritance
    pub handler: Option<Arc<HandlerDescriptor>>,
}

/// Locations ordered for longest-prefix matching
#[derive(Debug, Clone)]
pub struct LocationTable {
    server: LocationScope,
    // Longest path first
    locations: Vec<LocationScope>,
}

impl LocationTable {
    /// Resolve every scope of `config`, applying server-level inheritance
    pub fn from_config(config: &Config) -> Result<Self> {
        let server_handler = config
            .header_filter
            .as_ref()
            .map(|h| HandlerDescriptor::from_config(h, config.code_cache))
            .transpose()?
            .map(Arc::new);

        let mut locations = Vec::with_capacity(config.locations.len());
        for location in &config.locations {
            let code_cache = location.code_cache.unwrap_or(config.code_cache);
            let handler = match (&location.header_filter, &config.header_filter) {
                (Some(own), _) => Some(Arc::new(HandlerDescriptor::from_config(own, code_cache)?)),
                (None, Some(inherited)) if location.code_cache.is_some() => Some(Arc::new(
                    HandlerDescriptor::from_config(inherited, code_cache)?,
                )),
                (None, _) => server_handler.clone(),
            };
            locations.push(LocationScope {
                path: location.path.clone(),
                handler,
            });
        }
        locations.sort_by(|a, b| b.path.len().cmp(&a.path.len()));

        Ok(Self {
            server: LocationScope {
                path: String::new(),
                handler: server_handler,
            },
            locations,
        })
    }

    /// Scope matching `path` by longest prefix, or the server-level scope
    pub fn find(&self, path: &str) -> &LocationScope {
        self.locations
            .iter()
            .find(|l| path.starts_with(l.path.as_str()))
            .unwrap_or(&self.server)
    }

    /// Handler for `path`, if one is configured
    pub fn handler_for(&self, path: &str) -> Option<&Arc<HandlerDescriptor>> {
        self.find(path).handler.as_ref()
    }

    /// All scopes, server-level first
    pub fn scopes(&self) -> impl Iterator<Item = &LocationScope> {
        std::iter::once(&self.server).chain(self.locations.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerSource;
    use crate::types::{HeaderFilterConfig, LocationConfig};

    fn config() -> Config {
        Config {
            header_filter: Some(HeaderFilterConfig::inline("http.header[\"X-Server\"] = \"1\";")),
            locations: vec![
                LocationConfig::new("/api")
                    .with_header_filter(HeaderFilterConfig::inline("http.header[\"X-Api\"] = \"1\";")),
                LocationConfig::new("/api/internal"),
                LocationConfig::new("/static").with_code_cache(false),
            ],
            ..Config::default()
        }
    }

    fn inline_code(handler: &HandlerDescriptor) -> &str {
        match &handler.source {
            HandlerSource::Inline { code, .. } => code.as_ref(),
            HandlerSource::File { .. } => panic!("expected inline source"),
        }
    }

    #[test]
    fn test_longest_prefix_wins() {
        let table = LocationTable::from_config(&config()).unwrap();
        assert_eq!(table.find("/api/internal/x").path, "/api/internal");
        assert_eq!(table.find("/api/users").path, "/api");
        assert_eq!(table.find("/other").path, "");
    }

    #[test]
    fn test_inheritance() {
        let table = LocationTable::from_config(&config()).unwrap();

        let api = table.handler_for("/api/users").unwrap();
        assert!(inline_code(api).contains("X-Api"));

        // No own handler: inherits the server-level one
        let internal = table.handler_for("/api/internal/x").unwrap();
        assert!(inline_code(internal).contains("X-Server"));
        assert!(internal.code_cache);

        // Own code_cache override applies to the inherited handler
        let assets = table.handler_for("/static/app.js").unwrap();
        assert!(inline_code(assets).contains("X-Server"));
        assert!(!assets.code_cache);
    }

    #[test]
    fn test_no_handler_anywhere() {
        let config = Config {
            locations: vec![LocationConfig::new("/api")],
            ..Config::default()
        };
        let table = LocationTable::from_config(&config).unwrap();
        assert!(table.handler_for("/api/x").is_none());
        assert!(table.handler_for("/").is_none());
        assert_eq!(table.scopes().count(), 2);
    }
}
