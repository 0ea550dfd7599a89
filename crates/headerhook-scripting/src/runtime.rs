//! Wiring from a loaded configuration to an installable filter stage

use crate::cache::ArtifactCache;
use crate::driver::InvocationDriver;
use crate::engine::ScriptEngine;
use crate::error::LoadError;
use crate::filter::ScriptHeaderFilter;
use headerhook_config::{Config, LocationTable};
use headerhook_core::{Error, FilterChainBuilder, Result};
use std::sync::Arc;
use tracing::{debug, info};

/// Result of precompiling one statically known handler
#[derive(Debug)]
pub struct PrecompileReport {
    /// Location path, empty for the server scope
    pub scope: String,
    /// Handler description
    pub handler: String,
    /// Compilation result
    pub result: std::result::Result<(), LoadError>,
}

/// Everything a host needs to run header filter scripts
#[derive(Debug, Clone)]
pub struct HookRuntime {
    engine: Arc<ScriptEngine>,
    cache: Arc<ArtifactCache>,
    driver: Arc<InvocationDriver>,
    locations: Arc<LocationTable>,
}

impl HookRuntime {
    /// Build the engine, cache, driver and location table for `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let engine = Arc::new(
            ScriptEngine::from_config(config)
                .map_err(|e| Error::Config(format!("Failed to build script engine: {e}")))?,
        );
        let cache = Arc::new(ArtifactCache::new(Arc::clone(&engine)));
        let driver = Arc::new(
            InvocationDriver::new(Arc::clone(&cache))
                .with_script_prefix(config.script_prefix.clone()),
        );
        let locations = Arc::new(LocationTable::from_config(config)?);

        info!(
            scopes = locations.scopes().count(),
            code_cache = config.code_cache,
            "Header filter runtime initialized"
        );

        Ok(Self {
            engine,
            cache,
            driver,
            locations,
        })
    }

    /// The filter stage
    pub fn header_filter(&self) -> Arc<ScriptHeaderFilter> {
        Arc::new(ScriptHeaderFilter::new(
            Arc::clone(&self.locations),
            Arc::clone(&self.driver),
        ))
    }

    /// Install the filter stage on top of `chain`
    pub fn install(&self, chain: FilterChainBuilder) -> Result<FilterChainBuilder> {
        chain.install(self.header_filter())
    }

    /// Compile every handler whose source is known without a request
    ///
    /// Handlers with `code_cache` enabled are left in the cache.
    pub async fn precompile(&self) -> Vec<PrecompileReport> {
        let mut reports = Vec::new();
        for scope in self.locations.scopes() {
            let Some(handler) = &scope.handler else {
                continue;
            };
            let Some(identity) = self.driver.static_identity(handler) else {
                debug!(scope = %scope.path, handler = %handler.describe(), "Handler resolved per request, skipping");
                continue;
            };
            let result = self
                .cache
                .load(&identity, handler.code_cache)
                .await
                .map(|_| ());
            reports.push(PrecompileReport {
                scope: scope.path.clone(),
                handler: handler.describe(),
                result,
            });
        }
        reports
    }

    /// Script engine
    pub fn engine(&self) -> &Arc<ScriptEngine> {
        &self.engine
    }

    /// Artifact cache
    pub fn cache(&self) -> &Arc<ArtifactCache> {
        &self.cache
    }

    /// Invocation driver
    pub fn driver(&self) -> &Arc<InvocationDriver> {
        &self.driver
    }

    /// Location table
    pub fn locations(&self) -> &Arc<LocationTable> {
        &self.locations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use headerhook_config::{ConfigBuilder, HeaderFilterConfig, LocationConfig};
    use headerhook_core::FilterChain;

    #[tokio::test]
    async fn test_precompile_reports_static_handlers() {
        let config = ConfigBuilder::new()
            .header_filter(HeaderFilterConfig::inline("let x = 1;"))
            .location(
                LocationConfig::new("/broken")
                    .with_header_filter(HeaderFilterConfig::inline("let = ;")),
            )
            .location(
                LocationConfig::new("/dynamic")
                    .with_header_filter(HeaderFilterConfig::file("hooks/$host.rhai")),
            )
            .build()
            .unwrap();
        let runtime = HookRuntime::from_config(&config).unwrap();

        let reports = runtime.precompile().await;
        // Server and /broken; /dynamic depends on the request
        assert_eq!(reports.len(), 2);
        assert_eq!(reports.iter().filter(|r| r.result.is_err()).count(), 1);
        assert_eq!(runtime.cache().len().await, 1);
    }

    #[test]
    fn test_install_once() {
        let runtime = HookRuntime::from_config(&Config::default()).unwrap();
        let chain = runtime.install(FilterChain::builder()).unwrap();
        assert!(runtime.install(chain).is_err());
    }

    #[test]
    fn test_bad_init_script_fails_startup() {
        let config = Config {
            init_script: Some("fn broken( {".to_string()),
            ..Config::default()
        };
        let err = HookRuntime::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("script engine"));
    }
}
